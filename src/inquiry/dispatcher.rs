//! Inquiry-mode dispatcher: quota, canned answers, then the AI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::flow::Session;
use crate::inquiry::intent::{is_contact_request, is_greeting, is_lead_intent};
use crate::inquiry::keywords::KeywordTable;
use crate::inquiry::presets::PresetTable;
use crate::inquiry::quota::{QuotaDecision, QuotaPolicy};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::locale::{Locale, MessageCatalog};

const MAX_ANSWER_TOKENS: u32 = 400;
const ANSWER_TEMPERATURE: f32 = 0.5;

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Greeting,
    Contact,
    Preset,
    Keyword,
    Ai,
    /// The AI call failed; the answer is the localized apology.
    AiError,
    /// Quota exhausted; nothing was answered.
    LimitReached,
}

/// Messages to send for one inquiry.
#[derive(Debug, Clone, PartialEq)]
pub struct InquiryReply {
    /// In send order.
    pub messages: Vec<String>,
    /// The answer to the question, for the chat log. `None` when the quota
    /// stopped the question.
    pub answer: Option<String>,
    pub source: AnswerSource,
    /// The question shows the user wants to apply; the caller records it.
    pub lead_intent: bool,
}

/// Answers questions from users in inquiry mode.
pub struct InquiryDispatcher {
    llm: Arc<dyn LlmProvider>,
    catalog: Arc<MessageCatalog>,
    presets: PresetTable,
    keywords: KeywordTable,
    quota: QuotaPolicy,
    contact_link: String,
}

impl InquiryDispatcher {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        catalog: Arc<MessageCatalog>,
        presets: PresetTable,
        keywords: KeywordTable,
        quota: QuotaPolicy,
        contact_link: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            catalog,
            presets,
            keywords,
            quota,
            contact_link: contact_link.into(),
        }
    }

    /// Charge the quota and answer `question`. Updates the session's quota
    /// counters; the caller persists them.
    pub async fn handle(
        &self,
        session: &mut Session,
        question: &str,
        now: DateTime<Utc>,
    ) -> InquiryReply {
        let locale = session.locale;
        let notify_remaining = match self.quota.consume(session, now) {
            QuotaDecision::Exceeded => {
                debug!(external_id = %session.external_id, "Inquiry quota exceeded");
                return InquiryReply {
                    messages: vec![self.catalog.render(
                        "limit_reached_message",
                        locale,
                        &[
                            ("limit", self.quota.limit.to_string()),
                            ("contact_link", self.contact_link.clone()),
                        ],
                    )],
                    answer: None,
                    source: AnswerSource::LimitReached,
                    lead_intent: false,
                };
            }
            QuotaDecision::Allowed { remaining, notify } => notify.then_some(remaining),
        };

        let (answer, source) = self.answer(question, locale).await;

        let mut messages = vec![answer.clone()];
        if let Some(remaining) = notify_remaining {
            messages.push(self.catalog.render(
                "queries_remaining_message",
                locale,
                &[("remaining", remaining.to_string())],
            ));
        }

        InquiryReply {
            messages,
            answer: Some(answer),
            source,
            lead_intent: is_lead_intent(question),
        }
    }

    /// Greeting → human contact → preset → keyword → AI.
    pub async fn answer(&self, question: &str, locale: Locale) -> (String, AnswerSource) {
        if is_greeting(question) {
            return (self.greeting(locale), AnswerSource::Greeting);
        }

        if is_contact_request(question) {
            let text = self.catalog.render(
                "contact_admin_message",
                locale,
                &[("contact_link", self.contact_link.clone())],
            );
            return (text, AnswerSource::Contact);
        }

        if let Some(hit) = self.presets.find(question, locale) {
            debug!(preset = hit.question, score = hit.score, "Preset answer");
            return (hit.answer.to_string(), AnswerSource::Preset);
        }

        if let Some((keyword, answer)) = self.keywords.find(question, locale) {
            debug!(keyword, "Keyword answer");
            return (answer.to_string(), AnswerSource::Keyword);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_instruction(locale)),
            ChatMessage::user(question.trim()),
        ])
        .with_max_tokens(MAX_ANSWER_TOKENS)
        .with_temperature(ANSWER_TEMPERATURE);

        match self.llm.complete(request).await {
            Ok(response) => (response.content, AnswerSource::Ai),
            Err(e) => {
                warn!(model = self.llm.model_name(), "AI answer failed: {e}");
                let text = self.catalog.render(
                    "inquiry_error_message",
                    locale,
                    &[("contact_link", self.contact_link.clone())],
                );
                (text, AnswerSource::AiError)
            }
        }
    }

    fn greeting(&self, locale: Locale) -> String {
        let keys = self.catalog.keys_with_prefix("greeting_", locale);
        match keys.choose(&mut rand::thread_rng()) {
            Some(key) => self.catalog.get(key, locale),
            None => self.catalog.get("inquiry_mode_message", locale),
        }
    }
}

/// Scope and language instruction for the AI.
pub fn system_instruction(locale: Locale) -> String {
    format!(
        "You are FinZo AI Buddy, a friendly assistant for Malaysian home loans and refinancing. \
         Only answer questions about home loans, refinancing, mortgage costs, eligibility and \
         related paperwork. If a question is outside that scope, say politely that you can only \
         help with home loans and refinancing. Keep answers short and practical, under 150 words. \
         Do not promise specific approvals or rates. Reply in {}.",
        locale.language_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    struct StubLlm {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubLlm {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "offline".into(),
                });
            }
            let question = request.conversation().last().map(|m| m.content.clone());
            Ok(CompletionResponse {
                content: format!("AI: {}", question.unwrap_or_default()),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    fn dispatcher(llm: Arc<StubLlm>, limit: u32) -> InquiryDispatcher {
        let mut presets = PresetTable::default();
        presets.insert(Locale::En, "what is refinancing", "Replacing your loan.");
        let mut keywords = KeywordTable::default();
        keywords.insert(Locale::En, "eligibility", "Depends on income.");
        keywords.insert(Locale::En, "refinancing", "Keyword refinancing answer.");
        InquiryDispatcher::new(
            llm,
            Arc::new(MessageCatalog::builtin().unwrap()),
            presets,
            keywords,
            QuotaPolicy {
                limit,
                ..QuotaPolicy::default()
            },
            "https://wa.me/600000",
        )
    }

    fn inquiry_session() -> Session {
        let mut s = Session::new("u");
        s.enter_inquiry();
        s
    }

    #[tokio::test]
    async fn preset_skips_ai() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm.clone(), 15);
        let mut s = inquiry_session();
        let reply = d.handle(&mut s, "What is refinancing?", Utc::now()).await;
        assert_eq!(reply.source, AnswerSource::Preset);
        assert_eq!(reply.messages, vec!["Replacing your loan.".to_string()]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.query_count, 1);
    }

    #[tokio::test]
    async fn unknown_question_goes_to_ai() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm.clone(), 15);
        let mut s = inquiry_session();
        let reply = d.handle(&mut s, "Can I use EPF to refinance?", Utc::now()).await;
        assert_eq!(reply.source, AnswerSource::Ai);
        assert_eq!(reply.answer.as_deref(), Some("AI: Can I use EPF to refinance?"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keyword_answers_before_ai_but_after_presets() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm.clone(), 15);
        let mut s = inquiry_session();

        let reply = d.handle(&mut s, "Tell me about eligibility", Utc::now()).await;
        assert_eq!(reply.source, AnswerSource::Keyword);
        assert_eq!(reply.answer.as_deref(), Some("Depends on income."));

        let preset = d.handle(&mut s, "what is refinancing", Utc::now()).await;
        assert_eq!(preset.source, AnswerSource::Preset);

        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.query_count, 2);
    }

    #[tokio::test]
    async fn lead_intent_is_flagged_with_the_answer() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm, 1);
        let mut s = inquiry_session();
        let reply = d.handle(&mut s, "I want to apply for a new loan", Utc::now()).await;
        assert!(reply.lead_intent);
        assert_eq!(reply.source, AnswerSource::Ai);

        let stopped = d.handle(&mut s, "I want to apply now", Utc::now()).await;
        assert_eq!(stopped.source, AnswerSource::LimitReached);
        assert!(!stopped.lead_intent);
    }

    #[tokio::test]
    async fn ai_failure_returns_localized_error() {
        let llm = StubLlm::new(true);
        let d = dispatcher(llm, 15);
        let mut s = inquiry_session();
        let reply = d.handle(&mut s, "Explain SRR vs BR", Utc::now()).await;
        assert_eq!(reply.source, AnswerSource::AiError);
        assert!(reply.messages[0].contains("https://wa.me/600000"));
    }

    #[tokio::test]
    async fn greeting_and_contact_skip_ai() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm.clone(), 15);
        let mut s = inquiry_session();
        let greet = d.handle(&mut s, "hello", Utc::now()).await;
        assert_eq!(greet.source, AnswerSource::Greeting);
        assert!(greet.messages[0].starts_with('H'));
        let contact = d.handle(&mut s, "I want to talk to human", Utc::now()).await;
        assert_eq!(contact.source, AnswerSource::Contact);
        assert!(contact.messages[0].contains("https://wa.me/600000"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn limit_reached_stops_before_ai() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm.clone(), 3);
        let mut s = inquiry_session();
        let now = Utc::now();
        for i in 0..3 {
            d.handle(&mut s, &format!("question number {i} about stamp duty"), now)
                .await;
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);

        let reply = d.handle(&mut s, "one more about legal fees", now).await;
        assert_eq!(reply.source, AnswerSource::LimitReached);
        assert!(reply.answer.is_none());
        assert!(reply.messages[0].contains('3'));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        assert_eq!(s.query_count, 3);
    }

    #[tokio::test]
    async fn milestone_notice_follows_answer() {
        let llm = StubLlm::new(false);
        let d = dispatcher(llm, 15);
        let mut s = inquiry_session();
        s.query_count = 4;
        s.query_window_start = Some(Utc::now());
        let reply = d.handle(&mut s, "what is refinancing", Utc::now()).await;
        assert_eq!(reply.messages.len(), 2);
        assert!(reply.messages[1].contains("10"));
    }

    #[test]
    fn instruction_names_language() {
        assert!(system_instruction(Locale::Zh).contains("Simplified Chinese"));
        assert!(system_instruction(Locale::En).contains("refinancing"));
    }
}
