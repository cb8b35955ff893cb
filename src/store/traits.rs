//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::flow::Session;
use crate::savings::{BankRate, SavingsResult};

/// Snapshot of a completed intake flow. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lead {
    pub id: Uuid,
    pub external_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub loan_amount: f64,
    pub loan_tenure: u32,
    pub current_repayment: Decimal,
    pub new_repayment: Decimal,
    pub monthly_savings: Decimal,
    pub yearly_savings: Decimal,
    pub lifetime_savings: Decimal,
    pub years_saved: u32,
    pub months_saved: u32,
    pub bank_name: String,
    pub interest_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Snapshot the session's answers together with the computed outcome.
    pub fn from_completion(session: &Session, result: &SavingsResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: session.external_id.clone(),
            name: session.name.clone(),
            phone: session.phone.clone(),
            loan_amount: session.loan_amount.unwrap_or_default(),
            loan_tenure: session.loan_tenure.unwrap_or_default(),
            current_repayment: result.current_repayment,
            new_repayment: result.new_monthly_repayment,
            monthly_savings: result.monthly_savings,
            yearly_savings: result.yearly_savings,
            lifetime_savings: result.lifetime_savings,
            years_saved: result.years_saved,
            months_saved: result.months_saved,
            bank_name: result.bank_name.clone(),
            interest_rate: result.interest_rate,
            created_at: Utc::now(),
        }
    }
}

/// A user in inquiry mode who said they want to go ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InquiryLead {
    pub id: Uuid,
    pub external_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    /// The message that showed the intent.
    pub question: String,
    pub created_at: DateTime<Utc>,
}

impl InquiryLead {
    pub fn from_question(session: &Session, question: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: session.external_id.clone(),
            name: session.name.clone(),
            phone: session.phone.clone(),
            question: question.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One inquiry exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLogEntry {
    pub id: Uuid,
    pub external_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering sessions, leads, rates and chat logs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Fetch the session for `external_id`, creating it at the first step if
    /// absent. Returns `true` alongside when this call created it.
    async fn get_or_create_session(
        &self,
        external_id: &str,
    ) -> Result<(Session, bool), DatabaseError>;

    async fn get_session(&self, external_id: &str) -> Result<Option<Session>, DatabaseError>;

    /// Persist every field of the session (last write wins).
    async fn save_session(&self, session: &Session) -> Result<(), DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert the lead and save the session in one transaction.
    async fn complete_flow(&self, session: &Session, lead: &Lead) -> Result<(), DatabaseError>;

    /// Most recent leads first.
    async fn list_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError>;

    async fn list_leads_for_user(&self, external_id: &str) -> Result<Vec<Lead>, DatabaseError>;

    async fn insert_inquiry_lead(&self, lead: &InquiryLead) -> Result<(), DatabaseError>;

    /// Oldest first.
    async fn list_inquiry_leads(
        &self,
        external_id: &str,
    ) -> Result<Vec<InquiryLead>, DatabaseError>;

    // ── Bank rates ──────────────────────────────────────────────────

    async fn list_bank_rates(&self) -> Result<Vec<BankRate>, DatabaseError>;

    async fn insert_bank_rate(&self, rate: &BankRate) -> Result<(), DatabaseError>;

    /// Replace the whole rate table. Returns the number of rows written.
    async fn replace_bank_rates(&self, rates: &[BankRate]) -> Result<usize, DatabaseError>;

    // ── Chat logs ───────────────────────────────────────────────────

    async fn append_chat_log(
        &self,
        external_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), DatabaseError>;

    /// Oldest first.
    async fn list_chat_logs(
        &self,
        external_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatLogEntry>, DatabaseError>;
}
