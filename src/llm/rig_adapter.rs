//! Bridge from rig-core completion models to [`LlmProvider`].

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::AssistantContent;

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Upper bound on a single completion call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps any rig `CompletionModel`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    timeout: Duration,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Flatten non-system messages into one prompt. A single user turn is sent as-is.
fn prompt_text(request: &CompletionRequest) -> String {
    let turns: Vec<_> = request.conversation().collect();
    if let [only] = turns.as_slice() {
        return only.content.clone();
    }
    turns
        .iter()
        .map(|m| match m.role {
            Role::Assistant => format!("Assistant: {}", m.content),
            _ => format!("User: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn map_rig_error(provider: &str, err: CompletionError) -> LlmError {
    let reason = err.to_string();
    let lower = reason.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lower.contains("401") || lower.contains("unauthorized") {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = self.model.completion_request(prompt_text(&request));
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.model_name.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| map_rig_error(&self.model_name, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "no text in completion".to_string(),
            });
        }

        tracing::debug!(
            model = %self.model_name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content: content.trim().to_string(),
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChatMessage;

    #[test]
    fn single_user_turn_is_sent_verbatim() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("scope"),
            ChatMessage::user("What is the lock-in period?"),
        ]);
        assert_eq!(prompt_text(&req), "What is the lock-in period?");
    }

    #[test]
    fn multiple_turns_are_labelled() {
        let req = CompletionRequest::new(vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("Rates?"),
        ]);
        assert_eq!(prompt_text(&req), "User: Hi\nAssistant: Hello\nUser: Rates?");
    }

    #[test]
    fn rate_limit_errors_are_classified() {
        let err = map_rig_error(
            "gpt-4o-mini",
            CompletionError::ProviderError("HTTP 429 rate limit exceeded".into()),
        );
        assert!(matches!(err, LlmError::RateLimited { .. }));

        let err = map_rig_error("gpt-4o-mini", CompletionError::ProviderError("boom".into()));
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
