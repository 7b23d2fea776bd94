//! The messaging-transport capability consumed by the engine.
//!
//! The engine never talks to the wire protocol directly; everything goes
//! through the [`Transport`] trait. Production deployments plug in a real
//! protocol client, tests and local development use [`mock::MockTransport`].

pub mod mock;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use wablast_common::{Identity, InboundMessage};

// ── Lifecycle signals ────────────────────────────────────────────────────────

/// Asynchronous signals pushed by the transport for one connected session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A pairing credential was issued and awaits confirmation on the device.
    PairingCode { code: String },
    /// The connection handshake completed; the session is usable.
    Ready { identity: Identity },
    /// The transport dropped the connection.
    Disconnected { reason: String },
    /// A message arrived (or was sent from the paired device itself).
    Message { message: InboundMessage },
    /// An incoming voice/video call.
    IncomingCall { call_id: String, from: String },
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Binary attachment for media sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    pub filename: String,
    pub data: Vec<u8>,
}

impl MediaPayload {
    pub fn is_audio(&self) -> bool {
        self.mimetype.starts_with("audio/")
    }
}

/// Chat presence states the transport can signal to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Typing,
    Recording,
    Clear,
}

// ── Capability interface ─────────────────────────────────────────────────────

/// Opaque messaging transport: one implementation per protocol backend.
///
/// `connect` yields a stream of [`TransportEvent`]s for the session; the
/// stream ends when the connection is torn down. All other operations are
/// valid only while the session is connected and ready — callers get an
/// error otherwise.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open (or re-open) the connection for a session and stream its
    /// lifecycle signals.
    async fn connect(&self, session_id: &str) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Check whether a normalized number is registered on the platform.
    /// Returns the canonical chat id if it is.
    async fn resolve_number(&self, session_id: &str, number: &str) -> Result<Option<String>>;

    async fn send_text(&self, session_id: &str, chat_id: &str, text: &str) -> Result<()>;

    /// Send a media attachment with a caption. `voice_note` marks audio
    /// payloads as push-to-talk voice messages.
    async fn send_media(
        &self,
        session_id: &str,
        chat_id: &str,
        media: &MediaPayload,
        caption: &str,
        voice_note: bool,
    ) -> Result<()>;

    async fn send_location(
        &self,
        session_id: &str,
        chat_id: &str,
        latitude: f64,
        longitude: f64,
        caption: Option<&str>,
    ) -> Result<()>;

    /// Best-effort presence simulation; callers ignore failures.
    async fn set_presence(&self, session_id: &str, chat_id: &str, presence: Presence)
    -> Result<()>;

    /// Look up the stored display name for a contact.
    async fn contact_name(&self, session_id: &str, contact_id: &str) -> Result<Option<String>>;

    async fn reject_call(&self, session_id: &str, call_id: &str) -> Result<()>;

    /// Log the account out; the transport re-issues a pairing code afterwards.
    async fn logout(&self, session_id: &str) -> Result<()>;

    /// Tear the connection down for good (session removal).
    async fn destroy(&self, session_id: &str) -> Result<()>;
}
