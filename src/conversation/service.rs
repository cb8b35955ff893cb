//! Conversation service: turns webhook events into session updates and replies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channels::{EventHandler, EventKind, InboundEvent, Messenger, QuickReply};
use crate::config::{AdminConfig, FlowConfig, InquiryConfig};
use crate::conversation::notify::AdminNotifier;
use crate::error::{Error, FlowError};
use crate::flow::{Session, Step, StepRegistry, advance};
use crate::inquiry::{AnswerSource, InquiryDispatcher, KeywordTable, PresetTable};
use crate::llm::LlmProvider;
use crate::locale::{Locale, MessageCatalog};
use crate::savings::{SavingsResult, calculate_refinance_savings, format_currency};
use crate::store::{Database, InquiryLead, Lead};

/// Inputs that send the user back to the first step from anywhere.
const RESTART_KEYWORDS: &[&str] = &[
    "restart",
    "reset",
    "start over",
    "mula semula",
    "重新开始",
];

pub fn is_restart(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    RESTART_KEYWORDS.iter().any(|k| normalized == *k)
}

/// Everything the service needs, constructed by the caller.
pub struct ConversationDeps {
    pub db: Arc<dyn Database>,
    pub messenger: Arc<dyn Messenger>,
    pub llm: Arc<dyn LlmProvider>,
    pub catalog: Arc<MessageCatalog>,
    pub presets: PresetTable,
    pub keywords: KeywordTable,
    pub flow: FlowConfig,
    pub inquiry: InquiryConfig,
    pub admin: AdminConfig,
}

/// Drives one user's conversation per inbound event.
pub struct ConversationService {
    db: Arc<dyn Database>,
    messenger: Arc<dyn Messenger>,
    catalog: Arc<MessageCatalog>,
    registry: StepRegistry,
    inquiry: InquiryDispatcher,
    notifier: AdminNotifier,
    contact_link: String,
    /// Serializes events per `external_id`.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationService {
    /// Build the service and start the admin alert task. Must be called
    /// inside a Tokio runtime.
    pub fn new(deps: ConversationDeps) -> Self {
        let contact_link = deps.admin.contact_link.clone();
        Self {
            registry: StepRegistry::from_config(&deps.flow),
            inquiry: InquiryDispatcher::new(
                deps.llm,
                Arc::clone(&deps.catalog),
                deps.presets,
                deps.keywords,
                deps.inquiry.quota,
                contact_link.clone(),
            ),
            notifier: AdminNotifier::spawn(
                deps.admin.messenger_id,
                Arc::clone(&deps.messenger),
                Arc::clone(&deps.catalog),
            ),
            db: deps.db,
            messenger: deps.messenger,
            catalog: deps.catalog,
            contact_link,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Handle one inbound event end to end. Every failure is logged and, where
    /// the user is waiting on an answer, replied to with a generic apology.
    pub async fn handle(&self, event: InboundEvent) {
        let external_id = event.external_id.as_str();
        match &event.kind {
            EventKind::Receipt => {
                debug!(external_id = %external_id, "Receipt ignored");
                return;
            }
            EventKind::Unsupported => {
                let locale = self.stored_locale(external_id).await;
                self.send_key(external_id, "unsupported_message", locale).await;
                return;
            }
            EventKind::Text(_) | EventKind::QuickReply(_) | EventKind::Postback(_) => {}
        }
        let Some(input) = event.kind.input() else {
            return;
        };

        let lock = self.user_lock(external_id).await;
        let guard = lock.lock().await;
        let outcome = self.process(external_id, input).await;
        drop(guard);
        self.release_user_lock(external_id, &lock).await;

        if let Err(e) = outcome {
            error!(external_id = %external_id, "Conversation handling failed: {e}");
            let locale = self.stored_locale(external_id).await;
            self.send_key(external_id, "generic_error_message", locale).await;
        }
    }

    async fn process(&self, external_id: &str, input: &str) -> Result<(), Error> {
        let (mut session, created) = self.db.get_or_create_session(external_id).await?;

        if created {
            info!(external_id = %external_id, "New conversation");
            self.send_prompt(&session).await;
            return Ok(());
        }

        if is_restart(input) {
            info!(external_id = %external_id, step = %session.current_step, "Restart requested");
            return self.restart(session).await;
        }

        if let Some(raw) = session.corrupt_step.take() {
            error!(
                external_id = %external_id,
                step = %raw,
                "Stored step is unknown; resetting session"
            );
            self.send_key(external_id, "unknown_step_message", session.locale)
                .await;
            return self.restart(session).await;
        }

        if session.is_inquiry() {
            self.handle_inquiry(session, input).await
        } else {
            self.handle_flow(session, input).await
        }
    }

    async fn restart(&self, mut session: Session) -> Result<(), Error> {
        session.reset();
        self.db.save_session(&session).await?;
        self.send_prompt(&session).await;
        Ok(())
    }

    // ── Flow mode ───────────────────────────────────────────────────

    async fn handle_flow(&self, mut session: Session, input: &str) -> Result<(), Error> {
        let external_id = session.external_id.clone();
        let advanced = match advance(&self.registry, &mut session, input) {
            Ok(advanced) => advanced,
            Err(FlowError::Invalid(e)) => {
                warn!(
                    external_id = %external_id,
                    step = %session.current_step,
                    field = e.field,
                    reason = %e.reason,
                    "Invalid input"
                );
                let text = self.catalog.get_or(
                    &session.current_step.invalid_message_key(),
                    "invalid_input_message",
                    session.locale,
                );
                self.send(&external_id, &text, &self.menu(&session)).await;
                return Ok(());
            }
            Err(FlowError::SkipNotAllowed { step }) => {
                warn!(external_id = %external_id, step = %step, "Skip rejected");
                let text = self.catalog.get("skip_not_allowed_message", session.locale);
                self.send(&external_id, &text, &self.menu(&session)).await;
                return Ok(());
            }
            Err(e @ FlowError::MissingBranch { .. }) => {
                error!(external_id = %external_id, "{e}");
                self.send_key(&external_id, "invalid_input_message", session.locale)
                    .await;
                return Ok(());
            }
            Err(e @ FlowError::UnknownStep(_)) => {
                error!(external_id = %external_id, "{e}; resetting session");
                self.send_key(&external_id, "unknown_step_message", session.locale)
                    .await;
                return self.restart(session).await;
            }
        };

        match advanced.to {
            Step::InquiryMode => {
                session.enter_inquiry();
                self.db.save_session(&session).await?;
                info!(external_id = %external_id, "Switched to inquiry mode");
                self.send_key(&external_id, "inquiry_mode_message", session.locale)
                    .await;
                Ok(())
            }
            Step::ProcessCompletion => {
                self.db.save_session(&session).await?;
                self.complete(session).await
            }
            _ => {
                self.db.save_session(&session).await?;
                self.send_prompt(&session).await;
                Ok(())
            }
        }
    }

    /// Compute savings for a finished flow. Without a result the session stays
    /// at the completion step so the next message retries.
    async fn complete(&self, mut session: Session) -> Result<(), Error> {
        let external_id = session.external_id.clone();
        let locale = session.locale;
        self.send_key(&external_id, "processing_message", locale).await;

        let rates = self.db.list_bank_rates().await?;
        let result = match calculate_refinance_savings(&session.savings_input(), &rates) {
            Ok(result) => result,
            Err(reason) => {
                warn!(external_id = %external_id, %reason, "Savings unavailable");
                let text = self.catalog.render(
                    "calculation_unavailable_message",
                    locale,
                    &[("contact_link", self.contact_link.clone())],
                );
                self.send(&external_id, &text, &[]).await;
                return Ok(());
            }
        };

        let lead = Lead::from_completion(&session, &result);
        session.enter_inquiry();
        self.db.complete_flow(&session, &lead).await?;
        info!(
            external_id = %external_id,
            lead_id = %lead.id,
            bank = %result.bank_name,
            monthly_savings = %result.monthly_savings,
            "Lead created"
        );

        self.notifier.new_lead(&lead);

        if result.has_savings() {
            let summary = self.savings_summary(&result, locale);
            self.send(&external_id, &summary, &[]).await;
            let next = self.catalog.render(
                "whats_next_message",
                locale,
                &[("contact_link", self.contact_link.clone())],
            );
            self.send(&external_id, &next, &[]).await;
        } else {
            self.send_key(&external_id, "no_savings_message", locale).await;
        }
        Ok(())
    }

    fn savings_summary(&self, result: &SavingsResult, locale: Locale) -> String {
        self.catalog.render(
            "savings_summary_message",
            locale,
            &[
                ("current_repayment", format_currency(result.current_repayment)),
                ("new_repayment", format_currency(result.new_monthly_repayment)),
                ("monthly_savings", format_currency(result.monthly_savings)),
                ("yearly_savings", format_currency(result.yearly_savings)),
                ("lifetime_savings", format_currency(result.lifetime_savings)),
                ("years_saved", result.years_saved.to_string()),
                ("months_saved", result.months_saved.to_string()),
            ],
        )
    }

    // ── Inquiry mode ────────────────────────────────────────────────

    async fn handle_inquiry(&self, mut session: Session, question: &str) -> Result<(), Error> {
        let reply = self.inquiry.handle(&mut session, question, Utc::now()).await;
        self.db.save_session(&session).await?;
        debug!(external_id = %session.external_id, source = ?reply.source, "Inquiry answered");

        if let Some(answer) = &reply.answer
            && let Err(e) = self
                .db
                .append_chat_log(&session.external_id, question, answer)
                .await
        {
            warn!(external_id = %session.external_id, "Chat log write failed: {e}");
        }

        if reply.lead_intent {
            let lead = InquiryLead::from_question(&session, question);
            info!(external_id = %session.external_id, lead_id = %lead.id, "Inquiry lead intent");
            if let Err(e) = self.db.insert_inquiry_lead(&lead).await {
                warn!(external_id = %session.external_id, "Inquiry lead write failed: {e}");
            }
            self.notifier.inquiry_lead(&lead);
        } else if reply.source == AnswerSource::Contact {
            self.notifier.contact_request(
                &session.external_id,
                session.name.as_deref(),
                session.phone.as_deref(),
                question,
            );
        }

        for message in &reply.messages {
            self.send(&session.external_id, message, &[]).await;
        }
        Ok(())
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send the current step's prompt, with its menu as quick replies.
    async fn send_prompt(&self, session: &Session) {
        let Some(def) = self.registry.get(session.current_step) else {
            self.send_key(&session.external_id, "inquiry_mode_message", session.locale)
                .await;
            return;
        };
        let text = self.catalog.render(
            def.prompt_key,
            session.locale,
            &[("name", session.display_name().to_string())],
        );
        self.send(&session.external_id, &text, &self.menu(session))
            .await;
    }

    fn menu(&self, session: &Session) -> Vec<QuickReply> {
        self.registry
            .get(session.current_step)
            .map(|def| {
                def.menu
                    .iter()
                    .map(|opt| {
                        QuickReply::new(self.catalog.get(opt.label_key, session.locale), opt.payload)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn send_key(&self, external_id: &str, key: &str, locale: Locale) {
        let text = self.catalog.get(key, locale);
        self.send(external_id, &text, &[]).await;
    }

    async fn send(&self, external_id: &str, text: &str, quick_replies: &[QuickReply]) {
        if let Err(e) = self.messenger.deliver(external_id, text, quick_replies).await {
            warn!(external_id = %external_id, "Delivery failed: {e}");
        }
    }

    async fn stored_locale(&self, external_id: &str) -> Locale {
        match self.db.get_session(external_id).await {
            Ok(session) => session.map(|s| s.locale).unwrap_or_default(),
            Err(e) => {
                warn!(external_id = %external_id, "Session lookup failed: {e}");
                Locale::default()
            }
        }
    }

    // ── Per-user locks ──────────────────────────────────────────────

    async fn user_lock(&self, external_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(external_id.to_string()).or_default())
    }

    /// Drop the map entry once no other event for this user holds it.
    async fn release_user_lock(&self, external_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        // One reference in the map, one held by the caller.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(external_id);
        }
    }
}

#[async_trait]
impl EventHandler for ConversationService {
    async fn handle_event(&self, event: InboundEvent) {
        self.handle(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_keywords() {
        assert!(is_restart("restart"));
        assert!(is_restart("  Start Over "));
        assert!(is_restart("RESET"));
        assert!(is_restart("mula semula"));
        assert!(!is_restart("restart my loan please"));
        assert!(!is_restart("1"));
    }
}
