//! Step registry: the intake flow as data.
//!
//! Each step maps to a [`StepDef`] holding its prompt key, its validator and
//! its transition rule. The registry is built once from [`FlowConfig`] so
//! variants (optional age step, phone rules) are configuration rather than
//! scattered conditionals.

use std::collections::HashMap;

use crate::config::FlowConfig;
use crate::flow::step::Step;
use crate::flow::validators::{PhoneRule, Validator};

/// Where a step goes after a valid answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Fixed(Step),
    /// The literal (normalized) answer selects the next step.
    Branch(Vec<(&'static str, Step)>),
}

impl Transition {
    /// Next step for a normalized answer. `None` when a branch has no arm for it.
    pub fn resolve(&self, input: &str) -> Option<Step> {
        match self {
            Self::Fixed(next) => Some(*next),
            Self::Branch(arms) => arms
                .iter()
                .find(|(value, _)| *value == input)
                .map(|(_, next)| *next),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch(_))
    }
}

/// A quick-reply button: payload sent back plus the message key of its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuOption {
    pub payload: &'static str,
    pub label_key: &'static str,
}

/// Definition of a single step.
#[derive(Debug, Clone)]
pub struct StepDef {
    pub step: Step,
    pub prompt_key: &'static str,
    pub validator: Validator,
    pub transition: Transition,
    /// Buttons offered with the prompt. Empty for free-text steps.
    pub menu: Vec<MenuOption>,
}

impl StepDef {
    fn new(step: Step, prompt_key: &'static str, validator: Validator, next: Step) -> Self {
        Self {
            step,
            prompt_key,
            validator,
            transition: Transition::Fixed(next),
            menu: Vec::new(),
        }
    }
}

/// Ordered step definitions keyed by step.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    order: Vec<Step>,
    defs: HashMap<Step, StepDef>,
}

impl StepRegistry {
    pub fn from_config(config: &FlowConfig) -> Self {
        let after_phone = if config.ask_age {
            Step::GetAge
        } else {
            Step::GetLoanAmount
        };

        let mut defs = vec![
            StepDef {
                step: Step::ChooseLanguage,
                prompt_key: "choose_language_message",
                validator: Validator::Language,
                transition: Transition::Fixed(Step::ChooseMode),
                menu: vec![
                    MenuOption { payload: "1", label_key: "language_option_en" },
                    MenuOption { payload: "2", label_key: "language_option_ms" },
                    MenuOption { payload: "3", label_key: "language_option_zh" },
                ],
            },
            StepDef {
                step: Step::ChooseMode,
                prompt_key: "choose_mode_message",
                validator: Validator::Menu(vec!["1", "2"]),
                transition: Transition::Branch(vec![
                    ("1", Step::GetName),
                    ("2", Step::InquiryMode),
                ]),
                menu: vec![
                    MenuOption { payload: "1", label_key: "mode_option_savings" },
                    MenuOption { payload: "2", label_key: "mode_option_inquiry" },
                ],
            },
            StepDef::new(Step::GetName, "name_message", Validator::Name, Step::GetPhoneNumber),
            StepDef::new(
                Step::GetPhoneNumber,
                "phone_number_message",
                Validator::Phone(PhoneRule {
                    prefix: config.phone_prefix.clone(),
                    lengths: config.phone_lengths.clone(),
                }),
                after_phone,
            ),
        ];
        if config.ask_age {
            defs.push(StepDef::new(Step::GetAge, "age_message", Validator::Age, Step::GetLoanAmount));
        }
        defs.extend([
            StepDef::new(
                Step::GetLoanAmount,
                "loan_amount_message",
                Validator::LoanAmount,
                Step::GetLoanTenure,
            ),
            StepDef::new(
                Step::GetLoanTenure,
                "loan_tenure_message",
                Validator::LoanTenure,
                Step::GetMonthlyRepayment,
            ),
            StepDef::new(
                Step::GetMonthlyRepayment,
                "repayment_message",
                Validator::MonthlyRepayment,
                Step::GetInterestRate,
            ),
            StepDef::new(
                Step::GetInterestRate,
                "interest_rate_message",
                Validator::InterestRate,
                Step::GetRemainingTenure,
            ),
            StepDef::new(
                Step::GetRemainingTenure,
                "remaining_tenure_message",
                Validator::RemainingTenure,
                Step::ProcessCompletion,
            ),
            // Re-entered on every message while a calculation is unavailable.
            StepDef::new(
                Step::ProcessCompletion,
                "processing_message",
                Validator::Any,
                Step::ProcessCompletion,
            ),
        ]);

        Self {
            order: defs.iter().map(|d| d.step).collect(),
            defs: defs.into_iter().map(|d| (d.step, d)).collect(),
        }
    }

    pub fn get(&self, step: Step) -> Option<&StepDef> {
        self.defs.get(&step)
    }

    pub fn contains(&self, step: Step) -> bool {
        self.defs.contains_key(&step)
    }

    pub fn first(&self) -> Step {
        self.order.first().copied().unwrap_or_default()
    }

    /// Steps in flow order.
    pub fn steps(&self) -> &[Step] {
        &self.order
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::from_config(&FlowConfig::default())
    }
}
