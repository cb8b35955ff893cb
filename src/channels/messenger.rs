//! Facebook Messenger Send API client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::warn;

use crate::channels::{Messenger, QuickReply};
use crate::config::MessengerConfig;
use crate::error::ChannelError;

/// Maximum text length for one Send API message, in characters.
const MESSENGER_MAX_MESSAGE_LENGTH: usize = 2000;

/// Quick replies allowed on one message.
const MAX_QUICK_REPLIES: usize = 13;

/// Quick-reply titles longer than this are cut by the platform.
const MAX_QUICK_REPLY_TITLE: usize = 20;

const CHANNEL_NAME: &str = "messenger";

/// Sends messages to users through the page's access token.
pub struct MessengerClient {
    page_access_token: Option<SecretString>,
    api_url: String,
    client: reqwest::Client,
}

impl MessengerClient {
    pub fn new(config: &MessengerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.send_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Messenger HTTP client setup failed, sending without a timeout: {e}");
                reqwest::Client::new()
            });
        Self {
            page_access_token: config.page_access_token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn send_url(&self) -> String {
        format!("{}/me/messages", self.api_url)
    }

    async fn send_chunk(
        &self,
        token: &SecretString,
        external_id: &str,
        text: &str,
        quick_replies: &[QuickReply],
    ) -> Result<(), ChannelError> {
        let body = message_body(external_id, text, quick_replies);

        let resp = self
            .client
            .post(self.send_url())
            .query(&[("access_token", token.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                // The URL carries the access token.
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let detail = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: format!("Send API returned {status}: {detail}"),
        })
    }
}

#[async_trait]
impl Messenger for MessengerClient {
    async fn deliver(
        &self,
        external_id: &str,
        text: &str,
        quick_replies: &[QuickReply],
    ) -> Result<(), ChannelError> {
        let Some(token) = &self.page_access_token else {
            return Err(ChannelError::NotConfigured {
                name: CHANNEL_NAME.into(),
                reason: "PAGE_ACCESS_TOKEN is not set".into(),
            });
        };

        let chunks = split_message(text, MESSENGER_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let replies: &[QuickReply] = if i == last { quick_replies } else { &[] };
            self.send_chunk(token, external_id, chunk, replies).await?;
        }
        tracing::debug!(external_id, chunks = chunks.len(), "Message delivered");
        Ok(())
    }
}

/// Send API request body for one text message.
fn message_body(external_id: &str, text: &str, quick_replies: &[QuickReply]) -> serde_json::Value {
    let mut message = json!({ "text": text });
    if !quick_replies.is_empty() {
        if quick_replies.len() > MAX_QUICK_REPLIES {
            tracing::warn!(
                count = quick_replies.len(),
                "Too many quick replies; extra buttons dropped"
            );
        }
        let replies: Vec<_> = quick_replies
            .iter()
            .take(MAX_QUICK_REPLIES)
            .map(|qr| {
                json!({
                    "content_type": "text",
                    "title": qr.title.chars().take(MAX_QUICK_REPLY_TITLE).collect::<String>(),
                    "payload": qr.payload,
                })
            })
            .collect();
        message["quick_replies"] = json!(replies);
    }

    json!({
        "recipient": { "id": external_id },
        "messaging_type": "RESPONSE",
        "message": message,
    })
}

/// Split a message into chunks of at most `max_chars` characters, preferring
/// newline then space boundaries.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first character past the limit.
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}
