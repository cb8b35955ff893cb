//! Per-user session record and its lifecycle rules.

use chrono::{DateTime, Utc};

use crate::flow::step::{Mode, Step};
use crate::flow::validators::Answer;
use crate::locale::Locale;
use crate::savings::SavingsInput;

/// Conversation state for one end user.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub external_id: String,
    pub current_step: Step,
    pub locale: Locale,
    pub mode: Mode,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub age: Option<u32>,
    pub loan_amount: Option<f64>,
    pub loan_tenure: Option<u32>,
    pub monthly_repayment: Option<f64>,
    pub interest_rate: Option<f64>,
    pub remaining_tenure: Option<u32>,
    pub query_count: u32,
    pub query_window_start: Option<DateTime<Utc>>,
    /// Raw step name read from storage that no longer names a step.
    /// Never persisted; the service resets the session when it is set.
    pub corrupt_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session at the first step.
    pub fn new(external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            external_id: external_id.into(),
            current_step: Step::first(),
            locale: Locale::default(),
            mode: Mode::Flow,
            name: None,
            phone: None,
            age: None,
            loan_amount: None,
            loan_tenure: None,
            monthly_repayment: None,
            interest_rate: None,
            remaining_tenure: None,
            query_count: 0,
            query_window_start: None,
            corrupt_step: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Restart: clear every collected field and go back to the first step.
    ///
    /// The locale returns to the default because the first step asks for it
    /// again. The inquiry quota is a per-user budget and survives restarts.
    pub fn reset(&mut self) {
        self.current_step = Step::first();
        self.locale = Locale::default();
        self.mode = Mode::Flow;
        self.name = None;
        self.phone = None;
        self.age = None;
        self.loan_amount = None;
        self.loan_tenure = None;
        self.monthly_repayment = None;
        self.interest_rate = None;
        self.remaining_tenure = None;
        self.corrupt_step = None;
    }

    /// Store a validated answer on the matching field.
    pub fn apply(&mut self, answer: Answer) {
        match answer {
            Answer::Language(locale) => self.locale = locale,
            Answer::Name(name) => self.name = Some(name),
            Answer::Phone(phone) => self.phone = Some(phone),
            Answer::Age(age) => self.age = Some(age),
            Answer::LoanAmount(amount) => self.loan_amount = Some(amount),
            Answer::LoanTenure(years) => self.loan_tenure = Some(years),
            Answer::MonthlyRepayment(amount) => self.monthly_repayment = Some(amount),
            Answer::InterestRate(rate) => self.interest_rate = rate,
            Answer::RemainingTenure(years) => self.remaining_tenure = years,
            Answer::Choice(_) | Answer::Ack => {}
        }
    }

    /// Switch to inquiry mode. Only a restart leaves it.
    pub fn enter_inquiry(&mut self) {
        self.mode = Mode::Inquiry;
        self.current_step = Step::InquiryMode;
    }

    pub fn is_inquiry(&self) -> bool {
        self.mode == Mode::Inquiry
    }

    /// Inputs for the savings calculator.
    pub fn savings_input(&self) -> SavingsInput {
        SavingsInput {
            loan_amount: self.loan_amount,
            tenure_years: self.loan_tenure,
            current_repayment: self.monthly_repayment,
        }
    }

    /// Name to use in prompts, empty when not collected yet.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}
