//! The broadcast job loop: walks a recipient list under pacing and operator
//! control, records one outcome per attempted target, and emits progress
//! after every attempt.
//!
//! Stop semantics are bounded-latency: the flag is honored at the next check
//! point, never mid-dispatch, so at most one inter-message delay can elapse
//! after a stop request.

use std::sync::{Arc, Mutex};

use {chrono::Utc, tracing::debug};

use {
    wablast_common::{DeliveryRecord, Target, normalize_number},
    wablast_events::{Event, EventBus, Progress},
    wablast_transport::{MediaPayload, Presence, Transport},
};

use crate::{control::JobControl, pacing};

/// What a job sends. At least one of text/attachment/location must be set.
#[derive(Debug, Clone, Default)]
pub struct BroadcastContent {
    pub text: Option<String>,
    pub attachment: Option<MediaPayload>,
    /// `(latitude, longitude)`; when set, text becomes the location caption.
    pub location: Option<(f64, f64)>,
    /// Appended to the text after personalization.
    pub footer: Option<String>,
}

impl BroadcastContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn has_payload(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
            || self.attachment.is_some()
            || self.location.is_some()
    }
}

/// Everything a job loop needs besides the target list itself.
pub struct JobContext {
    pub session_id: String,
    pub transport: Arc<dyn Transport>,
    pub bus: Arc<EventBus>,
    pub control: Arc<JobControl>,
    /// Shared report slot owned by the session; reset before the job starts.
    pub report: Arc<Mutex<Vec<DeliveryRecord>>>,
    pub country_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub succeeded: u32,
    pub failed: u32,
    pub total: u32,
    /// Whether the loop ended on an operator stop rather than list exhaustion.
    pub stopped: bool,
}

/// Execute one broadcast to completion (or stop).
///
/// The caller owns the session's `broadcasting` flag and the start/end
/// events; this loop only emits progress and log events.
pub async fn run_job(
    ctx: &JobContext,
    mut targets: Vec<Target>,
    content: BroadcastContent,
    pacing: pacing::Pacing,
) -> JobSummary {
    if pacing.shuffle {
        pacing::shuffle_targets(&mut targets);
        ctx.bus
            .publish_log(format!("send order shuffled ({} targets)", targets.len()));
    }

    let total = targets.len() as u32;
    let started_at = Utc::now().timestamp_millis();
    let mut succeeded = 0u32;
    let mut failed = 0u32;
    let mut stopped = false;

    ctx.bus.publish_log(format!(
        "[{}] starting broadcast to {total} targets",
        ctx.session_id
    ));

    for target in &targets {
        if ctx.control.stop_requested() {
            stopped = true;
            break;
        }
        ctx.control.wait_while_paused().await;
        if ctx.control.stop_requested() {
            stopped = true;
            break;
        }

        if pacing.batch_rest_due(succeeded) {
            ctx.bus.publish_log(format!(
                "[{}] batch rest: sleeping {}s",
                ctx.session_id, pacing.batch_rest_secs
            ));
            tokio::time::sleep(std::time::Duration::from_secs(pacing.batch_rest_secs)).await;
        }

        // Resolve the target to a dispatchable chat id.
        let chat_id = if target.is_group() {
            target.raw.clone()
        } else {
            let number = normalize_number(&target.raw, &ctx.country_code);
            match ctx
                .transport
                .resolve_number(&ctx.session_id, &number)
                .await
            {
                Ok(Some(id)) => id,
                Ok(None) => {
                    // Unregistered numbers are skipped without consuming the
                    // inter-message delay.
                    ctx.bus.publish_log(format!(
                        "[{}] not registered on the platform: {}",
                        ctx.session_id, target.raw
                    ));
                    failed += 1;
                    record(ctx, DeliveryRecord::failed(&target.raw, &target.name_hint, "not registered"));
                    publish_progress(ctx, succeeded, failed, total, started_at);
                    continue;
                },
                Err(e) => {
                    failed += 1;
                    record(ctx, DeliveryRecord::failed(&target.raw, &target.name_hint, e.to_string()));
                    publish_progress(ctx, succeeded, failed, total, started_at);
                    sleep_between(ctx, &pacing, false).await;
                    continue;
                },
            }
        };

        let message = pacing::render_message(
            content.text.as_deref().unwrap_or_default(),
            &target.name_hint,
            content.footer.as_deref(),
        );

        if pacing.simulate_typing {
            simulate_typing(ctx, &chat_id, message.len()).await;
        }

        let outcome = dispatch(ctx, &chat_id, &content, &message, &pacing).await;
        match outcome {
            Ok(()) => {
                succeeded += 1;
                ctx.bus
                    .publish_log(format!("[{}] delivered to {chat_id}", ctx.session_id));
                record(ctx, DeliveryRecord::succeeded(&target.raw, &target.name_hint));
                publish_progress(ctx, succeeded, failed, total, started_at);
                sleep_between(ctx, &pacing, true).await;
            },
            Err(e) => {
                failed += 1;
                ctx.bus.publish_log(format!(
                    "[{}] send to {} failed: {e}",
                    ctx.session_id, target.raw
                ));
                record(ctx, DeliveryRecord::failed(&target.raw, &target.name_hint, e.to_string()));
                publish_progress(ctx, succeeded, failed, total, started_at);
                // Delay after failures too, to avoid burst failure patterns.
                sleep_between(ctx, &pacing, false).await;
            },
        }
    }

    if stopped {
        ctx.bus
            .publish_log(format!("[{}] broadcast stopped by operator", ctx.session_id));
    }

    JobSummary {
        succeeded,
        failed,
        total,
        stopped,
    }
}

async fn dispatch(
    ctx: &JobContext,
    chat_id: &str,
    content: &BroadcastContent,
    message: &str,
    pacing: &pacing::Pacing,
) -> anyhow::Result<()> {
    if let Some((latitude, longitude)) = content.location {
        let caption = (!message.is_empty()).then_some(message);
        ctx.transport
            .send_location(&ctx.session_id, chat_id, latitude, longitude, caption)
            .await
    } else if let Some(media) = &content.attachment {
        let voice_note = pacing.send_as_voice && media.is_audio();
        ctx.transport
            .send_media(&ctx.session_id, chat_id, media, message, voice_note)
            .await
    } else {
        ctx.transport
            .send_text(&ctx.session_id, chat_id, message)
            .await
    }
}

/// Best-effort typing simulation; failures never abort the send.
async fn simulate_typing(ctx: &JobContext, chat_id: &str, rendered_len: usize) {
    let duration = pacing::typing_duration(rendered_len);
    ctx.bus.publish_log(format!(
        "[{}] typing to {chat_id} ({:.1}s)",
        ctx.session_id,
        duration.as_secs_f64()
    ));
    if let Err(e) = ctx
        .transport
        .set_presence(&ctx.session_id, chat_id, Presence::Typing)
        .await
    {
        debug!(error = %e, "typing presence failed, continuing");
        return;
    }
    tokio::time::sleep(duration).await;
    let _ = ctx
        .transport
        .set_presence(&ctx.session_id, chat_id, Presence::Clear)
        .await;
}

async fn sleep_between(ctx: &JobContext, pacing: &pacing::Pacing, log: bool) {
    let delay = pacing.random_delay();
    if log && !delay.is_zero() {
        ctx.bus.publish_log(format!(
            "[{}] waiting {}s before the next target",
            ctx.session_id,
            delay.as_secs()
        ));
    }
    tokio::time::sleep(delay).await;
}

fn record(ctx: &JobContext, record: DeliveryRecord) {
    #[allow(clippy::unwrap_used)]
    ctx.report.lock().unwrap().push(record);
}

fn publish_progress(ctx: &JobContext, succeeded: u32, failed: u32, total: u32, started_at: i64) {
    ctx.bus.publish(Event::Progress {
        session_id: ctx.session_id.clone(),
        data: Progress {
            succeeded,
            failed,
            total,
            started_at,
        },
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wablast_transport::mock::{MockTransport, SentKind};

    fn context(transport: Arc<MockTransport>) -> JobContext {
        JobContext {
            session_id: "s1".into(),
            transport,
            bus: Arc::new(EventBus::new()),
            control: Arc::new(JobControl::new()),
            report: Arc::new(Mutex::new(Vec::new())),
            country_code: "62".into(),
        }
    }

    fn instant_pacing() -> pacing::Pacing {
        pacing::Pacing {
            min_delay_secs: 0,
            max_delay_secs: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn accounts_every_attempted_target() {
        let transport = Arc::new(MockTransport::new());
        transport.mark_unregistered("62822");
        let ctx = context(Arc::clone(&transport));

        let targets = vec![
            Target::new("0811", "Ana"),
            Target::new("62822", ""),
            Target::new("62833", "Cia"),
        ];
        let summary = run_job(
            &ctx,
            targets,
            BroadcastContent::text("Hi {name}"),
            instant_pacing(),
        )
        .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 3);
        assert!(!summary.stopped);

        let report = ctx.report.lock().unwrap();
        assert_eq!(report.len(), 3);
        assert_eq!(report[1].reason, "not registered");

        // Trunk prefix was normalized before dispatch.
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].chat_id, "62811@c.us");
        assert_eq!(sent[0].kind, SentKind::Text("Hi Ana".into()));
        assert_eq!(sent[1].kind, SentKind::Text("Hi Cia".into()));
    }

    #[tokio::test]
    async fn send_failures_do_not_abort_the_loop() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_sends_to("62811@c.us");
        let ctx = context(Arc::clone(&transport));

        let targets = vec![Target::new("62811", ""), Target::new("62812", "")];
        let summary = run_job(
            &ctx,
            targets,
            BroadcastContent::text("hello"),
            instant_pacing(),
        )
        .await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        let report = ctx.report.lock().unwrap();
        assert!(report[0].reason.contains("send failed"));
        assert_eq!(report[1].reason, "delivered");
    }

    #[tokio::test]
    async fn stop_request_ends_the_loop_without_further_records() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context(Arc::clone(&transport));
        ctx.control.request_stop();

        let targets: Vec<Target> = (0..100)
            .map(|i| Target::new(format!("628{i:03}"), ""))
            .collect();
        let summary = run_job(
            &ctx,
            targets,
            BroadcastContent::text("hello"),
            instant_pacing(),
        )
        .await;

        assert!(summary.stopped);
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert!(ctx.report.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn groups_skip_number_resolution() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context(Arc::clone(&transport));

        let targets = vec![Target::new("12345-678@g.us", "Team")];
        let summary = run_job(
            &ctx,
            targets,
            BroadcastContent::text("hello {name}"),
            instant_pacing(),
        )
        .await;

        assert_eq!(summary.succeeded, 1);
        let sent = transport.sent();
        assert_eq!(sent[0].chat_id, "12345-678@g.us");
        assert_eq!(sent[0].kind, SentKind::Text("hello Team".into()));
    }

    #[tokio::test]
    async fn location_and_media_dispatch_by_content_kind() {
        let transport = Arc::new(MockTransport::new());
        let ctx = context(Arc::clone(&transport));

        let location = BroadcastContent {
            text: Some("here".into()),
            location: Some((-6.2, 106.8)),
            ..Default::default()
        };
        run_job(
            &ctx,
            vec![Target::new("62811", "")],
            location,
            instant_pacing(),
        )
        .await;

        let media = BroadcastContent {
            text: Some("caption".into()),
            attachment: Some(MediaPayload {
                mimetype: "audio/ogg".into(),
                filename: "note.ogg".into(),
                data: vec![1, 2, 3],
            }),
            ..Default::default()
        };
        let mut voice_pacing = instant_pacing();
        voice_pacing.send_as_voice = true;
        run_job(&ctx, vec![Target::new("62812", "")], media, voice_pacing).await;

        let sent = transport.sent();
        assert!(matches!(
            sent[0].kind,
            SentKind::Location { latitude, .. } if (latitude - -6.2).abs() < f64::EPSILON
        ));
        assert_eq!(
            sent[1].kind,
            SentKind::Media {
                caption: "caption".into(),
                voice_note: true
            }
        );
    }
}
