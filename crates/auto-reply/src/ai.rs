//! External text-generation collaborator for AI fallback replies.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    rand::Rng,
    serde_json::json,
};

/// Default generation endpoint (plain-text completion over JSON chat input).
pub const DEFAULT_ENDPOINT: &str = "https://text.pollinations.ai/";

const MODEL: &str = "openai";

/// Abstraction over the reply generator so tests can script responses.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// HTTP implementation posting a chat payload and reading the reply as text.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for HttpTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTextGenerator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let seed: u32 = rand::rng().random_range(0..1000);
        let body = json!({
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "model": MODEL,
            "seed": seed,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("text generation request failed")?
            .error_for_status()
            .context("text generation returned an error status")?;
        Ok(response.text().await?)
    }
}
