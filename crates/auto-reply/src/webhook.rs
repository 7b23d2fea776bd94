//! Fire-and-forget webhook notification for inbound messages.

use {serde::Serialize, tracing::warn};

use wablast_common::InboundMessage;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub from: String,
    pub session_id: String,
    pub sender_name: String,
    pub message: String,
    pub timestamp: i64,
    pub has_media: bool,
}

impl WebhookPayload {
    pub fn from_message(session_id: &str, msg: &InboundMessage) -> Self {
        Self {
            from: msg.from.clone(),
            session_id: session_id.to_string(),
            sender_name: msg.sender_name.clone(),
            message: msg.body.clone(),
            timestamp: msg.timestamp,
            has_media: msg.has_media,
        }
    }
}

/// POST the payload without awaiting the outcome; failures are logged only.
pub fn forward(client: &reqwest::Client, url: &str, payload: WebhookPayload) {
    let request = client.post(url).json(&payload);
    let url = url.to_string();
    tokio::spawn(async move {
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(%url, status = %response.status(), "webhook rejected the notification");
            },
            Ok(_) => {},
            Err(e) => warn!(%url, error = %e, "webhook delivery failed"),
        }
    });
}
