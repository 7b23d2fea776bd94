//! Number verification: classify candidate recipients as registered or not.
//!
//! Runs independently of any broadcast job and is independently stoppable.
//! A short fixed delay follows every item, groups included, to bound the
//! existence-check request rate.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use {
    wablast_common::{is_group_address, normalize_number},
    wablast_events::{CheckProgress, Event, EventBus},
    wablast_transport::Transport,
};

/// Delay after a group candidate (no transport round-trip).
const GROUP_ITEM_DELAY: Duration = Duration::from_millis(50);
/// Delay after a personal-number existence check.
const NUMBER_ITEM_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub valid: u32,
    pub invalid: u32,
    /// Raw inputs that turned out to be unregistered or unresolvable.
    pub invalid_numbers: Vec<String>,
    pub stopped: bool,
}

/// Walk `candidates` in order, emitting per-item progress events.
pub async fn run_check(
    session_id: &str,
    transport: &Arc<dyn Transport>,
    bus: &Arc<EventBus>,
    stop: &CancellationToken,
    candidates: Vec<String>,
    country_code: &str,
) -> CheckOutcome {
    let total = candidates.len() as u32;
    let mut outcome = CheckOutcome::default();
    let mut processed = 0u32;

    for raw in candidates {
        if stop.is_cancelled() {
            bus.publish_log(format!("[{session_id}] number check stopped by operator"));
            outcome.stopped = true;
            break;
        }
        processed += 1;

        if is_group_address(&raw) {
            // Group ids are taken at face value.
            outcome.valid += 1;
            publish_progress(bus, session_id, processed, total, format!("{raw} (group)"));
            tokio::time::sleep(GROUP_ITEM_DELAY).await;
            continue;
        }

        let number = normalize_number(&raw, country_code);
        publish_progress(bus, session_id, processed, total, raw.clone());

        match transport.resolve_number(session_id, &number).await {
            Ok(Some(_)) => outcome.valid += 1,
            Ok(None) | Err(_) => {
                outcome.invalid += 1;
                outcome.invalid_numbers.push(raw);
            },
        }
        tokio::time::sleep(NUMBER_ITEM_DELAY).await;
    }

    outcome
}

fn publish_progress(
    bus: &Arc<EventBus>,
    session_id: &str,
    processed: u32,
    total: u32,
    current: String,
) {
    bus.publish(Event::CheckProgress {
        session_id: session_id.to_string(),
        data: CheckProgress {
            processed,
            total,
            current,
        },
    });
}
