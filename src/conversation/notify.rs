//! Best-effort alerts to the operator.
//!
//! Alerts are queued and delivered by a background task, so a slow or stuck
//! admin delivery never holds up a user's reply.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::channels::Messenger;
use crate::locale::{Locale, MessageCatalog};
use crate::savings::format_currency;
use crate::store::{InquiryLead, Lead};

/// Alerts always go out in the operator's language.
const ADMIN_LOCALE: Locale = Locale::En;

/// Alerts waiting for delivery before new ones are dropped.
const ALERT_QUEUE_CAPACITY: usize = 256;

/// One message for the admin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AdminAlert {
    /// Short label for logs ("new_lead", "inquiry_lead", "contact_request").
    kind: &'static str,
    text: String,
}

/// Renders operator alerts and hands them to the delivery task.
pub struct AdminNotifier {
    notify_tx: Option<mpsc::Sender<AdminAlert>>,
    catalog: Arc<MessageCatalog>,
}

impl AdminNotifier {
    /// Start the delivery task when an admin id is configured.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn(
        admin_id: Option<String>,
        messenger: Arc<dyn Messenger>,
        catalog: Arc<MessageCatalog>,
    ) -> Self {
        let notify_tx = admin_id.map(|admin_id| {
            let (notify_tx, notify_rx) = mpsc::channel(ALERT_QUEUE_CAPACITY);
            tokio::spawn(deliver_alerts(admin_id, messenger, notify_rx));
            notify_tx
        });
        Self { notify_tx, catalog }
    }

    /// A notifier that drops every alert.
    pub fn disabled(catalog: Arc<MessageCatalog>) -> Self {
        Self {
            notify_tx: None,
            catalog,
        }
    }

    pub fn new_lead(&self, lead: &Lead) {
        if self.notify_tx.is_some() {
            self.enqueue("new_lead", self.lead_summary(lead));
        } else {
            debug!(lead_id = %lead.id, "No admin configured; lead alert skipped");
        }
    }

    /// A user in inquiry mode said they want to go ahead.
    pub fn inquiry_lead(&self, lead: &InquiryLead) {
        let text = self.catalog.render(
            "admin_inquiry_lead_message",
            ADMIN_LOCALE,
            &[
                ("name", lead.name.clone().unwrap_or_else(|| "-".into())),
                ("phone_number", lead.phone.clone().unwrap_or_else(|| "-".into())),
                ("question", lead.question.clone()),
                ("external_id", lead.external_id.clone()),
            ],
        );
        self.enqueue("inquiry_lead", text);
    }

    /// A user asked to talk to a person.
    pub fn contact_request(
        &self,
        external_id: &str,
        name: Option<&str>,
        phone: Option<&str>,
        question: &str,
    ) {
        let text = self.catalog.render(
            "admin_contact_request_message",
            ADMIN_LOCALE,
            &[
                ("name", name.unwrap_or("-").to_string()),
                ("phone_number", phone.unwrap_or("-").to_string()),
                ("question", question.to_string()),
                ("external_id", external_id.to_string()),
            ],
        );
        self.enqueue("contact_request", text);
    }

    pub fn lead_summary(&self, lead: &Lead) -> String {
        let loan_amount = Decimal::from_f64(lead.loan_amount)
            .map(format_currency)
            .unwrap_or_else(|| lead.loan_amount.to_string());

        self.catalog.render(
            "admin_new_lead_message",
            ADMIN_LOCALE,
            &[
                ("name", lead.name.clone().unwrap_or_default()),
                ("phone_number", lead.phone.clone().unwrap_or_default()),
                ("loan_amount", loan_amount),
                ("tenure", lead.loan_tenure.to_string()),
                ("current_repayment", format_currency(lead.current_repayment)),
                ("new_repayment", format_currency(lead.new_repayment)),
                ("bank_name", lead.bank_name.clone()),
                ("interest_rate", format!("{:.2}", lead.interest_rate)),
                ("monthly_savings", format_currency(lead.monthly_savings)),
                ("yearly_savings", format_currency(lead.yearly_savings)),
                ("lifetime_savings", format_currency(lead.lifetime_savings)),
                ("years_saved", lead.years_saved.to_string()),
                ("external_id", lead.external_id.clone()),
            ],
        )
    }

    fn enqueue(&self, kind: &'static str, text: String) {
        let Some(notify_tx) = &self.notify_tx else {
            debug!(kind, "No admin configured; alert skipped");
            return;
        };
        match notify_tx.try_send(AdminAlert { kind, text }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(kind, "Admin alert queue full; alert dropped"),
            Err(TrySendError::Closed(_)) => warn!(kind, "Admin alert task stopped; alert dropped"),
        }
    }
}

/// Drain the queue, one delivery at a time. Failures are logged and dropped.
async fn deliver_alerts(
    admin_id: String,
    messenger: Arc<dyn Messenger>,
    mut notify_rx: mpsc::Receiver<AdminAlert>,
) {
    while let Some(alert) = notify_rx.recv().await {
        match messenger.deliver(&admin_id, &alert.text, &[]).await {
            Ok(()) => debug!(kind = alert.kind, "Admin alert delivered"),
            Err(e) => warn!(kind = alert.kind, "Admin alert failed: {e}"),
        }
    }
    debug!("Admin alert queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::channels::QuickReply;
    use crate::error::ChannelError;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Outbox {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        /// Wait for the delivery task to catch up.
        async fn wait_for(&self, n: usize) {
            tokio::time::timeout(Duration::from_secs(2), async {
                while self.count() < n {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("admin alert not delivered");
        }
    }

    #[async_trait]
    impl Messenger for Outbox {
        async fn deliver(
            &self,
            external_id: &str,
            text: &str,
            _quick_replies: &[QuickReply],
        ) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "test".into(),
                    reason: "down".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((external_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            external_id: "psid-7".into(),
            name: Some("Siti Aminah".into()),
            phone: Some("0123456789".into()),
            loan_amount: 300_000.0,
            loan_tenure: 30,
            current_repayment: dec!(2000.00),
            new_repayment: dec!(1397.87),
            monthly_savings: dec!(602.13),
            yearly_savings: dec!(7225.54),
            lifetime_savings: dec!(216766.06),
            years_saved: 9,
            months_saved: 1,
            bank_name: "Maybank".into(),
            interest_rate: 3.8,
            created_at: Utc::now(),
        }
    }

    fn catalog() -> Arc<MessageCatalog> {
        Arc::new(MessageCatalog::builtin().unwrap())
    }

    fn notifier(admin: Option<&str>, outbox: Arc<Outbox>) -> AdminNotifier {
        AdminNotifier::spawn(admin.map(str::to_string), outbox, catalog())
    }

    #[test]
    fn summary_lists_lead_details() {
        let text = AdminNotifier::disabled(catalog()).lead_summary(&lead());
        assert!(text.contains("Siti Aminah"));
        assert!(text.contains("RM 300,000.00"));
        assert!(text.contains("RM 1,397.87"));
        assert!(text.contains("Maybank @ 3.80%"));
        assert!(text.contains("RM 216,766.06"));
        assert!(text.contains("psid-7"));
    }

    #[tokio::test]
    async fn alert_goes_to_admin() {
        let outbox = Arc::new(Outbox::default());
        notifier(Some("admin-1"), outbox.clone()).new_lead(&lead());
        outbox.wait_for(1).await;
        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent[0].0, "admin-1");
        assert!(sent[0].1.contains("Siti Aminah"));
    }

    #[tokio::test]
    async fn alerts_keep_their_order() {
        let outbox = Arc::new(Outbox::default());
        let n = notifier(Some("admin-1"), outbox.clone());
        n.new_lead(&lead());
        n.contact_request("psid-9", None, None, "talk to agent please");
        outbox.wait_for(2).await;
        let sent = outbox.sent.lock().unwrap();
        assert!(sent[0].1.contains("Siti Aminah"));
        assert!(sent[1].1.contains("talk to agent please"));
        assert!(sent[1].1.contains("psid-9"));
    }

    #[tokio::test]
    async fn inquiry_lead_alert_names_question() {
        let outbox = Arc::new(Outbox::default());
        let n = notifier(Some("admin-1"), outbox.clone());
        n.inquiry_lead(&InquiryLead {
            id: Uuid::new_v4(),
            external_id: "psid-3".into(),
            name: None,
            phone: Some("0198765432".into()),
            question: "I want to apply now".into(),
            created_at: Utc::now(),
        });
        outbox.wait_for(1).await;
        let sent = outbox.sent.lock().unwrap();
        let text = &sent[0].1;
        assert!(text.contains("I want to apply now"));
        assert!(text.contains("0198765432"));
        assert!(text.contains("psid-3"));
    }

    #[tokio::test]
    async fn no_admin_sends_nothing() {
        let outbox = Arc::new(Outbox::default());
        let n = notifier(None, outbox.clone());
        n.new_lead(&lead());
        n.contact_request("psid-9", None, None, "help");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(outbox.count(), 0);
    }

    #[tokio::test]
    async fn delivery_failure_keeps_queue_running() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Outbox::default()
        });
        let n = notifier(Some("admin-1"), outbox);
        n.new_lead(&lead());
        n.new_lead(&lead());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(n.notify_tx.as_ref().is_some_and(|tx| !tx.is_closed()));
    }
}
