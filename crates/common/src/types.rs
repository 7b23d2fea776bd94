use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Addresses ────────────────────────────────────────────────────────────────

/// Suffix of group chat identifiers on the wire.
pub const GROUP_SUFFIX: &str = "@g.us";

/// The status/broadcast pseudo-address; never a real peer.
pub const STATUS_ADDRESS: &str = "status@broadcast";

/// Whether an address denotes a group chat.
pub fn is_group_address(address: &str) -> bool {
    address.ends_with(GROUP_SUFFIX)
}

/// Whether an address is the status/broadcast channel.
pub fn is_status_address(address: &str) -> bool {
    address.contains(STATUS_ADDRESS)
}

// ── Account identity ─────────────────────────────────────────────────────────

/// Identity of a connected account, known only while the session is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name on the account.
    pub name: String,
    /// Canonical account number.
    pub number: String,
    /// Platform tag reported by the transport (e.g. "android").
    pub platform: String,
}

// ── Broadcast targets ────────────────────────────────────────────────────────

/// One broadcast recipient: a raw address (number or group id) plus an
/// optional display-name hint used for `{name}` personalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub raw: String,
    #[serde(default)]
    pub name_hint: String,
}

impl Target {
    pub fn new(raw: impl Into<String>, name_hint: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            name_hint: name_hint.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        is_group_address(&self.raw)
    }
}

/// Parse operator input of the form `address[,name]`, one target per line.
///
/// Blank lines and surrounding whitespace are skipped; everything after the
/// first comma is the display-name hint.
pub fn parse_target_lines(input: &str) -> Vec<Target> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(',') {
            Some((raw, name)) => Target::new(raw.trim(), name.trim()),
            None => Target::new(line, ""),
        })
        .collect()
}

// ── Delivery report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one attempted delivery within a broadcast job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Raw target address as supplied by the operator.
    pub number: String,
    /// Resolved display name (may be empty).
    pub name: String,
    pub status: DeliveryStatus,
    /// Free-text reason ("delivered", transport error message, ...).
    pub reason: String,
    pub time: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn succeeded(number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            name: name.into(),
            status: DeliveryStatus::Succeeded,
            reason: "delivered".into(),
            time: Utc::now(),
        }
    }

    pub fn failed(
        number: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            name: name.into(),
            status: DeliveryStatus::Failed,
            reason: reason.into(),
            time: Utc::now(),
        }
    }
}

// ── Inbound messages ─────────────────────────────────────────────────────────

/// One message pushed by the transport, inbound or self-sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Set for group messages: the member who wrote it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub body: String,
    /// Seconds since the Unix epoch, as reported by the transport.
    pub timestamp: i64,
    pub from_me: bool,
    /// Push/notify name the transport attached to the sender, if any.
    #[serde(default)]
    pub sender_name: String,
    pub has_media: bool,
}

impl InboundMessage {
    /// The chat this message belongs to: the peer we would reply to.
    pub fn chat_id(&self) -> &str {
        if self.from_me { &self.to } else { &self.from }
    }

    pub fn is_group(&self) -> bool {
        is_group_address(&self.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_and_status_addresses() {
        assert!(is_group_address("1234-5678@g.us"));
        assert!(!is_group_address("62812345@c.us"));
        assert!(is_status_address("status@broadcast"));
        assert!(!is_status_address("62812345@c.us"));
    }

    #[test]
    fn parse_targets_with_and_without_names() {
        let targets = parse_target_lines("62811111111,Alice\n\n 0812222 \n123-456@g.us,Team\n");
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0], Target::new("62811111111", "Alice"));
        assert_eq!(targets[1], Target::new("0812222", ""));
        assert_eq!(targets[2], Target::new("123-456@g.us", "Team"));
        assert!(targets[2].is_group());
    }

    #[test]
    fn chat_id_follows_direction() {
        let mut msg = InboundMessage {
            id: "m1".into(),
            from: "peer@c.us".into(),
            to: "me@c.us".into(),
            author: None,
            body: "hi".into(),
            timestamp: 0,
            from_me: false,
            sender_name: String::new(),
            has_media: false,
        };
        assert_eq!(msg.chat_id(), "peer@c.us");
        msg.from_me = true;
        assert_eq!(msg.chat_id(), "me@c.us");
    }
}
