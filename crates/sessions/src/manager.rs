//! The engine facade: session registry, transport event loop with
//! auto-reconnect, and the operator API an outer surface builds on.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    tokio::sync::mpsc,
    tokio_util::sync::{CancellationToken, DropGuard},
    tracing::{info, warn},
};

use {
    wablast_auto_reply::AutoReplyPipeline,
    wablast_broadcast::{
        BroadcastContent, CheckOutcome, JobContext, JobControl, Pacing, run_check, run_job,
    },
    wablast_common::{DeliveryRecord, InboundMessage, Target},
    wablast_events::{Event, EventBus, ObserverId},
    wablast_store::SettingsStore,
    wablast_transport::{Transport, TransportEvent},
};

use crate::{
    error::{Error, Result},
    session::{Session, SessionState, SessionSummary},
};

/// Pause between reconnect attempts after a connect failure or a drop.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    settings: Arc<SettingsStore>,
    pipeline: Arc<AutoReplyPipeline>,
    sessions: RwLock<HashMap<String, Session>>,
    _heartbeat: DropGuard,
}

impl SessionManager {
    /// Build the engine and start the bus keep-alive; the heartbeat task
    /// stops when the manager is dropped. Must be called inside a runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        bus: Arc<EventBus>,
        settings: Arc<SettingsStore>,
        pipeline: Arc<AutoReplyPipeline>,
    ) -> Arc<Self> {
        let heartbeat = bus.start_heartbeat().drop_guard();
        Arc::new(Self {
            transport,
            bus,
            settings,
            pipeline,
            sessions: RwLock::new(HashMap::new()),
            _heartbeat: heartbeat,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    /// Register a session and start its transport event loop.
    pub fn add_session(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let cancel = {
            let mut sessions = self.write();
            if sessions.contains_key(session_id) {
                return Err(Error::DuplicateSession(session_id.to_string()));
            }
            let session = Session::new();
            let cancel = session.cancel.clone();
            sessions.insert(session_id.to_string(), session);
            cancel
        };
        info!(session_id, "session added");

        let manager = Arc::clone(self);
        let id = session_id.to_string();
        tokio::spawn(async move { manager.event_loop(&id, cancel).await });
        Ok(())
    }

    /// Tear the session down for good: stop any job or check, cancel the
    /// event loop, destroy the transport connection, drop the state.
    pub async fn remove_session(&self, session_id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.write();
            sessions
                .remove(session_id)
                .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?
        };
        session.cancel.cancel();
        if let Some(job) = &session.job {
            job.request_stop();
        }
        if let Some(stop) = &session.check_stop {
            stop.cancel();
        }
        self.transport.destroy(session_id).await?;
        self.bus
            .publish_log(format!("[{session_id}] session removed"));
        Ok(())
    }

    /// Log the account out. State is cleared up front; the transport drops
    /// the stream afterwards and the event loop reconnects into pairing.
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| {
            s.state = SessionState::Initializing;
            s.identity = None;
            s.pairing_code = None;
        })?;
        self.bus.publish(Event::Loading {
            session_id: session_id.to_string(),
        });

        if let Err(e) = self.transport.logout(session_id).await {
            warn!(session_id, error = %e, "logout failed, forcing reconnect");
            self.transport.destroy(session_id).await?;
        }
        self.bus.publish_log(format!("[{session_id}] logged out"));
        Ok(())
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.read();
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, session)| SessionSummary::of(id, session))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn is_ready(&self, session_id: &str) -> bool {
        self.read()
            .get(session_id)
            .is_some_and(|s| s.state == SessionState::Ready)
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Attach a status observer; the currently-true state of every session is
    /// replayed into the channel before any live event.
    pub fn attach_observer(&self) -> (ObserverId, mpsc::Receiver<Event>) {
        self.bus.attach(self.snapshot())
    }

    pub fn detach_observer(&self, id: ObserverId) {
        self.bus.detach(id);
    }

    fn snapshot(&self) -> Vec<Event> {
        let sessions = self.read();
        let mut entries: Vec<(&String, &Session)> = sessions.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut events = Vec::new();
        for (id, session) in entries {
            let session_id = id.clone();
            match (session.state, &session.pairing_code, &session.identity) {
                (SessionState::AwaitingPairing, Some(code), _) => {
                    events.push(Event::PairingCode {
                        session_id: session_id.clone(),
                        code: code.clone(),
                    });
                },
                (SessionState::Ready, _, Some(user)) => events.push(Event::Ready {
                    session_id: session_id.clone(),
                    user: user.clone(),
                }),
                _ => events.push(Event::Loading {
                    session_id: session_id.clone(),
                }),
            }
            if session.broadcasting {
                events.push(Event::BroadcastStart {
                    session_id: session_id.clone(),
                });
                if session.is_paused() {
                    events.push(Event::BroadcastPaused { session_id });
                }
            }
        }
        events
    }

    // ── Broadcast control ────────────────────────────────────────────────────

    /// Accept a broadcast and run it in the background. With `start_at` set
    /// the job stays pending (stoppable, but invisible to `broadcasting`)
    /// until the instant arrives.
    pub fn start_broadcast(
        self: &Arc<Self>,
        session_id: &str,
        targets: Vec<Target>,
        content: BroadcastContent,
        pacing: Pacing,
        start_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if targets.is_empty() {
            return Err(Error::EmptyTargets);
        }
        if !content.has_payload() {
            return Err(Error::MissingContent);
        }

        let control = Arc::new(JobControl::new());
        let report = {
            let mut sessions = self.write();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
            if session.state != SessionState::Ready {
                return Err(Error::NotReady(session_id.to_string()));
            }
            if session.job.is_some() {
                return Err(Error::AlreadyRunning(session_id.to_string()));
            }
            session.job = Some(Arc::clone(&control));
            #[allow(clippy::unwrap_used)]
            session.report.lock().unwrap().clear();
            Arc::clone(&session.report)
        };

        let manager = Arc::clone(self);
        let id = session_id.to_string();
        let country_code = self.settings.get().default_country_code;
        tokio::spawn(async move {
            if let Some(start_at) = start_at {
                let delay = (start_at - Utc::now()).to_std().unwrap_or_default();
                if !delay.is_zero() {
                    manager.bus.publish_log(format!(
                        "[{id}] broadcast scheduled to start in {}s",
                        delay.as_secs()
                    ));
                    tokio::select! {
                        _ = control.stopped() => {
                            let _ = manager.with_session(&id, |s| s.job = None);
                            manager
                                .bus
                                .publish_log(format!("[{id}] scheduled broadcast cancelled"));
                            return;
                        },
                        _ = tokio::time::sleep(delay) => {},
                    }
                }
            }

            let _ = manager.with_session(&id, |s| s.broadcasting = true);
            manager.bus.publish(Event::BroadcastStart {
                session_id: id.clone(),
            });

            let ctx = JobContext {
                session_id: id.clone(),
                transport: Arc::clone(&manager.transport),
                bus: Arc::clone(&manager.bus),
                control: Arc::clone(&control),
                report,
                country_code,
            };
            let summary = run_job(&ctx, targets, content, pacing).await;

            let _ = manager.with_session(&id, |s| {
                s.broadcasting = false;
                s.job = None;
            });
            manager.bus.publish(Event::BroadcastEnd {
                session_id: id.clone(),
            });
            info!(
                session_id = %id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                stopped = summary.stopped,
                "broadcast finished"
            );
        });
        Ok(())
    }

    pub fn pause_broadcast(&self, session_id: &str) -> Result<()> {
        let control = self.with_session(session_id, |s| {
            s.broadcasting.then(|| s.job.clone()).flatten()
        })?;
        match control {
            Some(control) if control.pause() => {
                self.bus.publish(Event::BroadcastPaused {
                    session_id: session_id.to_string(),
                });
                self.bus
                    .publish_log(format!("[{session_id}] broadcast paused"));
                Ok(())
            },
            Some(_) => Err(Error::InvalidState("broadcast is already paused".into())),
            None => Err(Error::InvalidState("no broadcast in progress".into())),
        }
    }

    pub fn resume_broadcast(&self, session_id: &str) -> Result<()> {
        let control = self.with_session(session_id, |s| {
            s.broadcasting.then(|| s.job.clone()).flatten()
        })?;
        match control {
            Some(control) if control.resume() => {
                self.bus.publish(Event::BroadcastResumed {
                    session_id: session_id.to_string(),
                });
                self.bus
                    .publish_log(format!("[{session_id}] broadcast resumed"));
                Ok(())
            },
            Some(_) => Err(Error::InvalidState("broadcast is not paused".into())),
            None => Err(Error::InvalidState("no broadcast in progress".into())),
        }
    }

    /// Request a stop; accepted for running and still-pending jobs alike.
    /// Takes effect at the loop's next checkpoint.
    pub fn stop_broadcast(&self, session_id: &str) -> Result<()> {
        let control = self.with_session(session_id, |s| s.job.clone())?;
        match control {
            Some(control) => {
                control.request_stop();
                self.bus
                    .publish_log(format!("[{session_id}] broadcast stop requested"));
                Ok(())
            },
            None => Err(Error::InvalidState("no broadcast to stop".into())),
        }
    }

    /// The delivery report of the most recent job (possibly still running).
    pub fn report(&self, session_id: &str) -> Result<Vec<DeliveryRecord>> {
        let report = self.with_session(session_id, |s| Arc::clone(&s.report))?;
        #[allow(clippy::unwrap_used)]
        let records = report.lock().unwrap().clone();
        Ok(records)
    }

    pub fn export_report_csv(&self, session_id: &str) -> Result<String> {
        Ok(wablast_store::report::to_csv(&self.report(session_id)?))
    }

    /// Write the report to `path` as a CSV file, creating parent directories.
    pub fn write_report_csv(&self, session_id: &str, path: &Path) -> Result<()> {
        wablast_store::report::write_csv(path, &self.report(session_id)?)?;
        Ok(())
    }

    // ── Number verification ──────────────────────────────────────────────────

    /// Walk the candidate list and classify each entry; runs to completion
    /// (or stop) before returning.
    pub async fn check_numbers(
        &self,
        session_id: &str,
        candidates: Vec<String>,
    ) -> Result<CheckOutcome> {
        if candidates.is_empty() {
            return Err(Error::EmptyTargets);
        }
        let stop = {
            let mut sessions = self.write();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
            if session.state != SessionState::Ready {
                return Err(Error::NotReady(session_id.to_string()));
            }
            if session.check_stop.is_some() {
                return Err(Error::AlreadyChecking(session_id.to_string()));
            }
            let stop = CancellationToken::new();
            session.check_stop = Some(stop.clone());
            stop
        };

        let country_code = self.settings.get().default_country_code;
        let outcome = run_check(
            session_id,
            &self.transport,
            &self.bus,
            &stop,
            candidates,
            &country_code,
        )
        .await;

        let _ = self.with_session(session_id, |s| s.check_stop = None);
        Ok(outcome)
    }

    pub fn stop_check(&self, session_id: &str) -> Result<()> {
        let stop = self.with_session(session_id, |s| s.check_stop.clone())?;
        match stop {
            Some(stop) => {
                stop.cancel();
                Ok(())
            },
            None => Err(Error::InvalidState("no number check in progress".into())),
        }
    }

    // ── Direct send ──────────────────────────────────────────────────────────

    /// Send a single text outside any broadcast (incoming-webhook path).
    /// Bare numbers are reduced to digits and suffixed into a chat id.
    pub async fn send_message(&self, session_id: &str, to: &str, text: &str) -> Result<()> {
        if !self.is_ready(session_id) {
            return Err(Error::NotReady(session_id.to_string()));
        }
        let chat_id = if to.contains('@') {
            to.to_string()
        } else {
            let digits: String = to.chars().filter(char::is_ascii_digit).collect();
            format!("{digits}@c.us")
        };
        self.transport.send_text(session_id, &chat_id, text).await?;
        self.bus
            .publish_log(format!("[{session_id}] direct message sent to {chat_id}"));
        Ok(())
    }

    // ── Transport event loop ─────────────────────────────────────────────────

    async fn event_loop(&self, session_id: &str, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            self.mark_loading(session_id);

            let mut rx = match self.transport.connect(session_id).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(session_id, error = %e, "transport connect failed, retrying");
                    if !self.reconnect_pause(&cancel).await {
                        return;
                    }
                    continue;
                },
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = rx.recv() => match event {
                        Some(event) => {
                            if self.handle_event(session_id, event).await {
                                break;
                            }
                        },
                        None => {
                            self.mark_disconnected(session_id, "transport stream closed");
                            break;
                        },
                    },
                }
            }

            if !self.reconnect_pause(&cancel).await {
                return;
            }
        }
    }

    /// Returns `true` when the loop should drop the stream and reconnect.
    async fn handle_event(&self, session_id: &str, event: TransportEvent) -> bool {
        match event {
            TransportEvent::PairingCode { code } => {
                let _ = self.with_session(session_id, |s| {
                    s.state = SessionState::AwaitingPairing;
                    s.pairing_code = Some(code.clone());
                    s.identity = None;
                });
                info!(session_id, "pairing code issued");
                self.bus.publish(Event::PairingCode {
                    session_id: session_id.to_string(),
                    code,
                });
                false
            },
            TransportEvent::Ready { identity } => {
                let _ = self.with_session(session_id, |s| {
                    s.state = SessionState::Ready;
                    s.identity = Some(identity.clone());
                    s.pairing_code = None;
                });
                info!(session_id, account = %identity.number, "session ready");
                self.bus.publish(Event::Ready {
                    session_id: session_id.to_string(),
                    user: identity,
                });
                false
            },
            TransportEvent::Disconnected { reason } => {
                self.mark_disconnected(session_id, &reason);
                true
            },
            TransportEvent::Message { mut message } => {
                self.enrich_sender_name(session_id, &mut message).await;
                self.bus.publish(Event::NewMessage {
                    session_id: session_id.to_string(),
                    message: message.clone(),
                });
                if !message.from_me {
                    let pipeline = Arc::clone(&self.pipeline);
                    let id = session_id.to_string();
                    tokio::spawn(async move { pipeline.handle(&id, &message).await });
                }
                false
            },
            TransportEvent::IncomingCall { call_id, from } => {
                if self.settings.get().auto_reject_call {
                    match self.transport.reject_call(session_id, &call_id).await {
                        Ok(()) => self
                            .bus
                            .publish_log(format!("[{session_id}] rejected call from {from}")),
                        Err(e) => warn!(session_id, error = %e, "call reject failed"),
                    }
                }
                false
            },
        }
    }

    /// Group messages arrive with the writing member in `author`; resolve a
    /// display name for them when the transport did not attach one.
    async fn enrich_sender_name(&self, session_id: &str, message: &mut InboundMessage) {
        if !message.is_group() || !message.sender_name.is_empty() {
            return;
        }
        let Some(author) = message.author.clone() else {
            return;
        };
        message.sender_name = match self.transport.contact_name(session_id, &author).await {
            Ok(Some(name)) => name,
            // Fallback: the address local part.
            _ => author.split('@').next().unwrap_or_default().to_string(),
        };
    }

    fn mark_loading(&self, session_id: &str) {
        let _ = self.with_session(session_id, |s| {
            s.state = SessionState::Initializing;
            s.identity = None;
            s.pairing_code = None;
        });
        self.bus.publish(Event::Loading {
            session_id: session_id.to_string(),
        });
    }

    fn mark_disconnected(&self, session_id: &str, reason: &str) {
        let _ = self.with_session(session_id, |s| {
            s.state = SessionState::Disconnected;
            s.identity = None;
            s.pairing_code = None;
        });
        // An in-flight job is left alone; its remaining sends fail per item.
        self.bus
            .publish_log(format!("[{session_id}] disconnected: {reason}"));
    }

    /// Sleep before a reconnect attempt; `false` means the session was
    /// removed while waiting.
    async fn reconnect_pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(RECONNECT_DELAY) => true,
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut sessions = self.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        Ok(f(session))
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap()
    }
}
