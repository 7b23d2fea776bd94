//! Per-message decision pipeline.
//!
//! Welcome and webhook are independent side channels; keyword rules and the
//! AI fallback compete for the single reply (first match wins, a keyword
//! reply suppresses the AI stage). Settings are re-read from the store on
//! every message so operator changes apply immediately.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{info, warn};

use {
    wablast_common::{InboundMessage, is_status_address},
    wablast_events::EventBus,
    wablast_store::{RuleStore, SeenContacts, Settings, SettingsStore, rules::find_match},
    wablast_transport::{Presence, Transport},
};

use crate::{ai::TextGenerator, usage::AiUsage, webhook};

/// Typing-presence pause before the welcome message.
const WELCOME_TYPING: Duration = Duration::from_millis(1500);
/// Typing-presence pause before a keyword reply.
const REPLY_TYPING: Duration = Duration::from_millis(2000);

pub struct AutoReplyPipeline {
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    settings: Arc<SettingsStore>,
    seen: Arc<SeenContacts>,
    rules: Arc<RuleStore>,
    generator: Arc<dyn TextGenerator>,
    /// std mutex: held only for the synchronous quota check, never across await.
    usage: Mutex<AiUsage>,
    http: reqwest::Client,
}

impl AutoReplyPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        bus: Arc<EventBus>,
        settings: Arc<SettingsStore>,
        seen: Arc<SeenContacts>,
        rules: Arc<RuleStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            transport,
            bus,
            settings,
            seen,
            rules,
            generator,
            usage: Mutex::new(AiUsage::new()),
            http: reqwest::Client::new(),
        }
    }

    /// Process one inbound message through every stage.
    pub async fn handle(&self, session_id: &str, msg: &InboundMessage) {
        if msg.from_me {
            return;
        }
        let settings = self.settings.get();

        if let Err(e) = self.welcome(session_id, msg, &settings).await {
            warn!(session_id, error = %e, "welcome stage failed");
        }

        if !settings.webhook_url.is_empty() {
            webhook::forward(
                &self.http,
                &settings.webhook_url,
                webhook::WebhookPayload::from_message(session_id, msg),
            );
        }

        let replied = match self.keyword_reply(session_id, msg, &settings).await {
            Ok(replied) => replied,
            Err(e) => {
                warn!(session_id, error = %e, "keyword auto-reply failed");
                // A matched-but-failed reply still claims the message.
                true
            },
        };

        if !replied {
            if let Err(e) = self.ai_reply(session_id, msg, &settings).await {
                warn!(session_id, error = %e, "ai reply failed");
            }
        }
    }

    // ── Stage 1: first-contact welcome ───────────────────────────────────────

    async fn welcome(
        &self,
        session_id: &str,
        msg: &InboundMessage,
        settings: &Settings,
    ) -> anyhow::Result<()> {
        if settings.welcome_message.is_empty()
            || msg.is_group()
            || is_status_address(&msg.from)
            || self.seen.contains(&msg.from)
        {
            return Ok(());
        }

        self.typing_pause(session_id, &msg.from, WELCOME_TYPING).await;
        self.transport
            .send_text(session_id, &msg.from, &settings.welcome_message)
            .await?;
        self.bus
            .publish_log(format!("[{session_id}] welcomed {}", msg.from));
        self.seen.insert(&msg.from)?;
        Ok(())
    }

    // ── Stage 3: keyword rules ───────────────────────────────────────────────

    /// Returns whether a rule matched (and therefore claimed the reply).
    async fn keyword_reply(
        &self,
        session_id: &str,
        msg: &InboundMessage,
        settings: &Settings,
    ) -> anyhow::Result<bool> {
        if msg.is_group() && settings.ar_ignore_groups {
            return Ok(false);
        }
        let rules = self.rules.list();
        let Some(rule) = find_match(&rules, &msg.body) else {
            return Ok(false);
        };
        let response = rule.response.clone();
        let keyword = rule.keyword.clone();

        self.typing_pause(session_id, &msg.from, REPLY_TYPING).await;
        self.transport
            .send_text(session_id, &msg.from, &response)
            .await?;
        info!(
            session_id,
            from = %msg.from,
            keyword = %keyword,
            "keyword auto-reply sent"
        );
        Ok(true)
    }

    // ── Stage 4: AI fallback ─────────────────────────────────────────────────

    async fn ai_reply(
        &self,
        session_id: &str,
        msg: &InboundMessage,
        settings: &Settings,
    ) -> anyhow::Result<()> {
        if !settings.ai_enabled
            || is_status_address(&msg.from)
            || settings.ai_blacklist.contains(&msg.from)
        {
            return Ok(());
        }
        if msg.is_group() && settings.ai_ignore_groups {
            return Ok(());
        }

        let allowed = {
            #[allow(clippy::unwrap_used)]
            let mut usage = self.usage.lock().unwrap();
            usage.check_and_increment(&msg.from, settings.ai_daily_limit)
        };
        if !allowed {
            info!(session_id, from = %msg.from, "daily AI reply limit reached");
            return Ok(());
        }

        let system_prompt = build_system_prompt(settings);

        // Presence is shown for the duration of the call and always cleared.
        let _ = self
            .transport
            .set_presence(session_id, &msg.from, Presence::Typing)
            .await;
        let result = self.generator.generate(&system_prompt, &msg.body).await;
        let _ = self
            .transport
            .set_presence(session_id, &msg.from, Presence::Clear)
            .await;

        let reply = result?;
        self.transport
            .send_text(session_id, &msg.from, &reply)
            .await?;
        info!(session_id, from = %msg.from, "ai reply sent");
        Ok(())
    }

    /// Best-effort typing simulation around human-looking replies.
    async fn typing_pause(&self, session_id: &str, chat_id: &str, duration: Duration) {
        if self
            .transport
            .set_presence(session_id, chat_id, Presence::Typing)
            .await
            .is_ok()
        {
            tokio::time::sleep(duration).await;
            let _ = self
                .transport
                .set_presence(session_id, chat_id, Presence::Clear)
                .await;
        }
    }
}

fn build_system_prompt(settings: &Settings) -> String {
    let mut prompt = settings.ai_system_prompt.clone();
    if !settings.ai_allowed_topics.is_empty() {
        prompt.push_str(&format!(
            "\n\nIMPORTANT: only answer questions related to these topics: {}. \
             If the user asks about anything else, politely decline and steer \
             the conversation back.",
            settings.ai_allowed_topics
        ));
    }
    prompt
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use {
        async_trait::async_trait,
        wablast_store::{AutoReplyRule, MatchMode, SettingsPatch},
        wablast_transport::mock::{MockTransport, SentKind},
    };

    struct FixedGenerator {
        reply: String,
        calls: AtomicU32,
    }

    impl FixedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        transport: Arc<MockTransport>,
        settings: Arc<SettingsStore>,
        rules: Arc<RuleStore>,
        generator: Arc<FixedGenerator>,
        pipeline: AutoReplyPipeline,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let settings = Arc::new(SettingsStore::open(dir.path().join("settings.json")));
        let seen = Arc::new(SeenContacts::open(dir.path().join("seen.json")));
        let rules = Arc::new(RuleStore::open(dir.path().join("autoreply.json")));
        let generator = Arc::new(FixedGenerator::new("ai says hi"));
        let pipeline = AutoReplyPipeline::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(EventBus::new()),
            Arc::clone(&settings),
            seen,
            Arc::clone(&rules),
            Arc::clone(&generator) as Arc<dyn TextGenerator>,
        );
        Fixture {
            transport,
            settings,
            rules,
            generator,
            pipeline,
            _dir: dir,
        }
    }

    fn inbound(from: &str, body: &str) -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            from: from.into(),
            to: "me@c.us".into(),
            author: None,
            body: body.into(),
            timestamp: 0,
            from_me: false,
            sender_name: String::new(),
            has_media: false,
        }
    }

    fn texts(transport: &MockTransport) -> Vec<String> {
        transport
            .sent()
            .into_iter()
            .filter_map(|m| match m.kind {
                SentKind::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn welcome_is_sent_once_per_sender() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                welcome_message: Some("welcome!".into()),
                ..Default::default()
            })
            .unwrap();

        f.pipeline.handle("s1", &inbound("62811@c.us", "hi")).await;
        f.pipeline.handle("s1", &inbound("62811@c.us", "again")).await;

        assert_eq!(texts(&f.transport), vec!["welcome!"]);
    }

    #[tokio::test]
    async fn groups_never_get_a_welcome() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                welcome_message: Some("welcome!".into()),
                ..Default::default()
            })
            .unwrap();

        f.pipeline.handle("s1", &inbound("123@g.us", "hi")).await;
        assert!(texts(&f.transport).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keyword_reply_suppresses_ai() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                ai_enabled: Some(true),
                ..Default::default()
            })
            .unwrap();
        f.rules
            .upsert(AutoReplyRule {
                keyword: "price".into(),
                response: "the price list".into(),
                match_mode: MatchMode::Contains,
            })
            .unwrap();

        f.pipeline
            .handle("s1", &inbound("62811@c.us", "what is the PRICE?"))
            .await;

        assert_eq!(texts(&f.transport), vec!["the price list"]);
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ai_fallback_replies_when_no_rule_matches() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                ai_enabled: Some(true),
                ..Default::default()
            })
            .unwrap();

        f.pipeline
            .handle("s1", &inbound("62811@c.us", "anything"))
            .await;

        assert_eq!(texts(&f.transport), vec!["ai says hi"]);
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_quota_silences_the_third_reply() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                ai_enabled: Some(true),
                ai_daily_limit: Some(2),
                ..Default::default()
            })
            .unwrap();

        for _ in 0..3 {
            f.pipeline.handle("s1", &inbound("62811@c.us", "q")).await;
        }

        assert_eq!(texts(&f.transport).len(), 2);
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blacklisted_senders_get_no_ai_reply() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                ai_enabled: Some(true),
                ai_blacklist: Some(vec!["62811@c.us".into()]),
                ..Default::default()
            })
            .unwrap();

        f.pipeline.handle("s1", &inbound("62811@c.us", "q")).await;
        assert!(texts(&f.transport).is_empty());
    }

    #[tokio::test]
    async fn group_keyword_replies_respect_the_skip_flag() {
        let f = fixture();
        f.settings
            .update(SettingsPatch {
                ar_ignore_groups: Some(true),
                ..Default::default()
            })
            .unwrap();
        f.rules
            .upsert(AutoReplyRule {
                keyword: "hello".into(),
                response: "hi!".into(),
                match_mode: MatchMode::Contains,
            })
            .unwrap();

        f.pipeline.handle("s1", &inbound("123@g.us", "hello")).await;
        assert!(texts(&f.transport).is_empty());
    }

    #[tokio::test]
    async fn topic_restriction_is_appended_to_the_prompt() {
        let settings = Settings {
            ai_system_prompt: "base".into(),
            ai_allowed_topics: "billing, shipping".into(),
            ..Default::default()
        };
        let prompt = build_system_prompt(&settings);
        assert!(prompt.starts_with("base\n\nIMPORTANT"));
        assert!(prompt.contains("billing, shipping"));
    }
}
