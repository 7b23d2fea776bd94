use serde::{Deserialize, Serialize};

use wablast_common::{Identity, InboundMessage};

/// Running totals for an in-flight broadcast job, emitted after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub succeeded: u32,
    pub failed: u32,
    pub total: u32,
    /// Milliseconds since the Unix epoch when the job loop actually started.
    pub started_at: i64,
}

/// Per-item progress of a number verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckProgress {
    pub processed: u32,
    pub total: u32,
    /// Label of the candidate being checked right now.
    pub current: String,
}

/// Events published to attached observers.
///
/// Serialized with a `type` tag so the surface layer can forward frames
/// verbatim (SSE/WebSocket) without re-mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session is connecting or reconnecting.
    Loading { session_id: String },
    /// A pairing credential awaits confirmation; republished so observers
    /// attaching mid-wait can render it.
    PairingCode { session_id: String, code: String },
    /// Session connected; identity is known.
    Ready { session_id: String, user: Identity },
    /// Operator-facing log line.
    Log { message: String },
    /// A message passed through the session (inbound or self-sent).
    NewMessage {
        session_id: String,
        message: InboundMessage,
    },
    BroadcastStart { session_id: String },
    BroadcastPaused { session_id: String },
    BroadcastResumed { session_id: String },
    BroadcastEnd { session_id: String },
    Progress {
        session_id: String,
        data: Progress,
    },
    CheckProgress {
        session_id: String,
        data: CheckProgress,
    },
    /// Idle keep-alive so transports underneath observers stay open.
    Heartbeat { ts: i64 },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_a_type_tag() {
        let ev = Event::PairingCode {
            session_id: "s1".into(),
            code: "ABCD".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "pairing_code");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["code"], "ABCD");
    }

    #[test]
    fn progress_round_trips() {
        let ev = Event::Progress {
            session_id: "s1".into(),
            data: Progress {
                succeeded: 3,
                failed: 1,
                total: 10,
                started_at: 1_700_000_000_000,
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::Progress { data, .. } => {
                assert_eq!(data.succeeded, 3);
                assert_eq!(data.failed, 1);
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
