//! Step names for the intake state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Position of a session in the intake flow.
///
/// Data collection runs: ChooseLanguage → ChooseMode → GetName →
/// GetPhoneNumber → GetAge → GetLoanAmount → GetLoanTenure →
/// GetMonthlyRepayment → GetInterestRate → GetRemainingTenure →
/// ProcessCompletion. `InquiryMode` is reached when the user picks the
/// question path at ChooseMode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    ChooseLanguage,
    ChooseMode,
    GetName,
    GetPhoneNumber,
    GetAge,
    GetLoanAmount,
    GetLoanTenure,
    GetMonthlyRepayment,
    GetInterestRate,
    GetRemainingTenure,
    ProcessCompletion,
    InquiryMode,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Step::ChooseLanguage,
        Step::ChooseMode,
        Step::GetName,
        Step::GetPhoneNumber,
        Step::GetAge,
        Step::GetLoanAmount,
        Step::GetLoanTenure,
        Step::GetMonthlyRepayment,
        Step::GetInterestRate,
        Step::GetRemainingTenure,
        Step::ProcessCompletion,
        Step::InquiryMode,
    ];

    /// First step of every fresh or reset session.
    pub fn first() -> Step {
        Step::ChooseLanguage
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChooseLanguage => "choose_language",
            Self::ChooseMode => "choose_mode",
            Self::GetName => "get_name",
            Self::GetPhoneNumber => "get_phone_number",
            Self::GetAge => "get_age",
            Self::GetLoanAmount => "get_loan_amount",
            Self::GetLoanTenure => "get_loan_tenure",
            Self::GetMonthlyRepayment => "get_monthly_repayment",
            Self::GetInterestRate => "get_interest_rate",
            Self::GetRemainingTenure => "get_remaining_tenure",
            Self::ProcessCompletion => "process_completion",
            Self::InquiryMode => "inquiry_mode",
        }
    }

    /// Message key of the step-specific retry prompt.
    pub fn invalid_message_key(&self) -> String {
        format!("invalid_{}_message", self.as_str())
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| FlowError::UnknownStep(s.to_string()))
    }
}

/// Whether the session is collecting data or answering questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Flow,
    Inquiry,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Inquiry => "inquiry",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(Self::Flow),
            "inquiry" => Ok(Self::Inquiry),
            other => Err(FlowError::UnknownStep(format!("mode {other}"))),
        }
    }
}
