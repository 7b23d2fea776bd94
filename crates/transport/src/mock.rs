//! In-memory transport used by tests and local development.
//!
//! Lifecycle signals are driven from the outside via [`MockTransport::push`];
//! every outbound operation is recorded for later assertions.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use {anyhow::Result, async_trait::async_trait, tokio::sync::mpsc};

use crate::{MediaPayload, Presence, Transport, TransportEvent};

const EVENT_BUFFER: usize = 64;

/// What a mock send looked like.
#[derive(Debug, Clone, PartialEq)]
pub enum SentKind {
    Text(String),
    Media { caption: String, voice_note: bool },
    Location { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub session_id: String,
    pub chat_id: String,
    pub kind: SentKind,
}

#[derive(Default)]
struct MockInner {
    senders: HashMap<String, mpsc::Sender<TransportEvent>>,
    unregistered: HashSet<String>,
    fail_chats: HashSet<String>,
    sent: Vec<SentMessage>,
    presence: Vec<(String, Presence)>,
    rejected_calls: Vec<String>,
    logged_out: Vec<String>,
}

/// Scriptable [`Transport`] double.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a normalized number as not registered on the platform.
    pub fn mark_unregistered(&self, number: &str) {
        self.lock().unregistered.insert(number.to_string());
    }

    /// Make every send to `chat_id` fail.
    pub fn fail_sends_to(&self, chat_id: &str) {
        self.lock().fail_chats.insert(chat_id.to_string());
    }

    /// Push a lifecycle signal into a session's event stream, waiting briefly
    /// for the session to connect first.
    pub async fn push(&self, session_id: &str, event: TransportEvent) {
        for _ in 0..200 {
            let sender = self.lock().senders.get(session_id).cloned();
            if let Some(tx) = sender {
                let _ = tx.send(event).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock transport: session {session_id} never connected");
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.lock().senders.contains_key(session_id)
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn presence_changes(&self) -> Vec<(String, Presence)> {
        self.lock().presence.clone()
    }

    pub fn rejected_calls(&self) -> Vec<String> {
        self.lock().rejected_calls.clone()
    }

    pub fn logged_out(&self) -> Vec<String> {
        self.lock().logged_out.clone()
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap()
    }

    fn check_send(&self, session_id: &str, chat_id: &str, kind: SentKind) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_chats.contains(chat_id) {
            anyhow::bail!("send failed for {chat_id}");
        }
        inner.sent.push(SentMessage {
            session_id: session_id.to_string(),
            chat_id: chat_id.to_string(),
            kind,
        });
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, session_id: &str) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.lock().senders.insert(session_id.to_string(), tx);
        Ok(rx)
    }

    async fn resolve_number(&self, _session_id: &str, number: &str) -> Result<Option<String>> {
        let inner = self.lock();
        if inner.unregistered.contains(number) {
            Ok(None)
        } else {
            Ok(Some(format!("{number}@c.us")))
        }
    }

    async fn send_text(&self, session_id: &str, chat_id: &str, text: &str) -> Result<()> {
        self.check_send(session_id, chat_id, SentKind::Text(text.to_string()))
    }

    async fn send_media(
        &self,
        session_id: &str,
        chat_id: &str,
        _media: &MediaPayload,
        caption: &str,
        voice_note: bool,
    ) -> Result<()> {
        self.check_send(
            session_id,
            chat_id,
            SentKind::Media {
                caption: caption.to_string(),
                voice_note,
            },
        )
    }

    async fn send_location(
        &self,
        session_id: &str,
        chat_id: &str,
        latitude: f64,
        longitude: f64,
        _caption: Option<&str>,
    ) -> Result<()> {
        self.check_send(
            session_id,
            chat_id,
            SentKind::Location {
                latitude,
                longitude,
            },
        )
    }

    async fn set_presence(
        &self,
        _session_id: &str,
        chat_id: &str,
        presence: Presence,
    ) -> Result<()> {
        self.lock().presence.push((chat_id.to_string(), presence));
        Ok(())
    }

    async fn contact_name(&self, _session_id: &str, _contact_id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn reject_call(&self, _session_id: &str, call_id: &str) -> Result<()> {
        self.lock().rejected_calls.push(call_id.to_string());
        Ok(())
    }

    async fn logout(&self, session_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.logged_out.push(session_id.to_string());
        inner.senders.remove(session_id);
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<()> {
        self.lock().senders.remove(session_id);
        Ok(())
    }
}
