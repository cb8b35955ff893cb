//! Input validators for the intake steps.
//!
//! Every validator is a pure function of the raw text (plus the session for
//! rules that depend on earlier answers). Success yields the normalized
//! [`Answer`] to store; failure yields a [`ValidationError`] the caller turns
//! into a localized retry prompt.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;
use crate::flow::session::Session;
use crate::locale::Locale;

/// Keyword accepted on optional steps.
pub const SKIP_KEYWORD: &str = "skip";

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 70;
pub const MIN_TENURE_YEARS: u32 = 1;
pub const MAX_TENURE_YEARS: u32 = 40;
pub const MIN_INTEREST_RATE: f64 = 3.0;
pub const MAX_INTEREST_RATE: f64 = 10.0;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)([km])?$").expect("amount pattern is valid")
});

/// A validated, normalized answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Language(Locale),
    /// A menu choice that only selects a branch.
    Choice(String),
    Name(String),
    Phone(String),
    Age(u32),
    LoanAmount(f64),
    LoanTenure(u32),
    MonthlyRepayment(f64),
    InterestRate(Option<f64>),
    RemainingTenure(Option<u32>),
    /// Input accepted with nothing to store.
    Ack,
}

/// Phone number shape: national prefix plus allowed digit counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneRule {
    pub prefix: String,
    pub lengths: Vec<usize>,
}

/// The validator attached to a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Language,
    Menu(Vec<&'static str>),
    Name,
    Phone(PhoneRule),
    Age,
    LoanAmount,
    LoanTenure,
    MonthlyRepayment,
    InterestRate,
    RemainingTenure,
    /// Accepts anything.
    Any,
}

impl Validator {
    pub fn validate(&self, raw: &str, session: &Session) -> Result<Answer, ValidationError> {
        match self {
            Self::Language => validate_language(raw).map(Answer::Language),
            Self::Menu(options) => validate_menu(raw, options).map(Answer::Choice),
            Self::Name => validate_name(raw).map(Answer::Name),
            Self::Phone(rule) => validate_phone(raw, rule).map(Answer::Phone),
            Self::Age => validate_age(raw).map(Answer::Age),
            Self::LoanAmount => validate_loan_amount(raw).map(Answer::LoanAmount),
            Self::LoanTenure => validate_loan_tenure(raw).map(Answer::LoanTenure),
            Self::MonthlyRepayment => {
                validate_monthly_repayment(raw).map(Answer::MonthlyRepayment)
            }
            Self::InterestRate => validate_interest_rate(raw).map(Answer::InterestRate),
            Self::RemainingTenure => validate_remaining_tenure(raw, session.loan_tenure)
                .map(Answer::RemainingTenure),
            Self::Any => Ok(Answer::Ack),
        }
    }
}

pub fn is_skip(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(SKIP_KEYWORD)
}

pub fn validate_language(raw: &str) -> Result<Locale, ValidationError> {
    Locale::from_menu_choice(raw)
        .ok_or_else(|| ValidationError::new("language", format!("'{}' is not a menu option", raw.trim())))
}

pub fn validate_menu(raw: &str, options: &[&str]) -> Result<String, ValidationError> {
    let choice = raw.trim().to_lowercase();
    if options.contains(&choice.as_str()) {
        Ok(choice)
    } else {
        Err(ValidationError::new("choice", format!("'{choice}' is not one of {options:?}")))
    }
}

/// Letters and spaces only. Returns the name title-cased.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("name", "empty"));
    }
    if !trimmed.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(ValidationError::new("name", "only letters and spaces are allowed"));
    }
    Ok(title_case(trimmed))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_phone(raw: &str, rule: &PhoneRule) -> Result<String, ValidationError> {
    let phone = raw.trim();
    if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "digits only"));
    }
    if !phone.starts_with(&rule.prefix) {
        return Err(ValidationError::new(
            "phone",
            format!("must start with {}", rule.prefix),
        ));
    }
    if !rule.lengths.contains(&phone.len()) {
        return Err(ValidationError::new(
            "phone",
            format!("{} digits, expected one of {:?}", phone.len(), rule.lengths),
        ));
    }
    Ok(phone.to_string())
}

fn parse_bounded_int(
    field: &'static str,
    raw: &str,
    min: u32,
    max: u32,
) -> Result<u32, ValidationError> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::new(field, format!("'{}' is not a whole number", raw.trim())))?;
    if !(min..=max).contains(&value) {
        return Err(ValidationError::new(
            field,
            format!("{value} is outside {min}..={max}"),
        ));
    }
    Ok(value)
}

pub fn validate_age(raw: &str) -> Result<u32, ValidationError> {
    parse_bounded_int("age", raw, MIN_AGE, MAX_AGE)
}

pub fn validate_loan_tenure(raw: &str) -> Result<u32, ValidationError> {
    parse_bounded_int("loan_tenure", raw, MIN_TENURE_YEARS, MAX_TENURE_YEARS)
}

/// Lowercase, drop separators and whitespace, strip a leading `rm`.
fn clean_amount(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    match compact.strip_prefix("rm") {
        Some(rest) => rest.to_string(),
        None => compact,
    }
}

/// Accepts `300000`, `300,000`, `RM300k`, `0.3m`.
pub fn validate_loan_amount(raw: &str) -> Result<f64, ValidationError> {
    let cleaned = clean_amount(raw);
    let caps = AMOUNT_RE
        .captures(&cleaned)
        .ok_or_else(|| ValidationError::new("loan_amount", format!("'{}' is not an amount", raw.trim())))?;
    let base: f64 = caps[1]
        .parse()
        .map_err(|_| ValidationError::new("loan_amount", "unparseable number"))?;
    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        _ => 1.0,
    };
    let amount = base * multiplier;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::new("loan_amount", "must be positive"));
    }
    Ok(amount)
}

/// Accepts `2000`, `2,000.50`, `RM 2,000`.
pub fn validate_monthly_repayment(raw: &str) -> Result<f64, ValidationError> {
    let cleaned = clean_amount(raw);
    let amount: f64 = cleaned
        .parse()
        .map_err(|_| ValidationError::new("monthly_repayment", format!("'{}' is not a number", raw.trim())))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::new("monthly_repayment", "must be positive"));
    }
    Ok(amount)
}

/// `skip` yields `None`; otherwise a percentage in [3, 10].
pub fn validate_interest_rate(raw: &str) -> Result<Option<f64>, ValidationError> {
    if is_skip(raw) {
        return Ok(None);
    }
    let cleaned = raw.trim().trim_end_matches('%').trim();
    let rate: f64 = cleaned
        .parse()
        .map_err(|_| ValidationError::new("interest_rate", format!("'{}' is not a number", raw.trim())))?;
    if !(MIN_INTEREST_RATE..=MAX_INTEREST_RATE).contains(&rate) {
        return Err(ValidationError::new(
            "interest_rate",
            format!("{rate} is outside {MIN_INTEREST_RATE}..={MAX_INTEREST_RATE}"),
        ));
    }
    Ok(Some(rate))
}

/// `skip` yields `None`; otherwise a positive whole number of years no
/// greater than the original tenure when that is known.
pub fn validate_remaining_tenure(
    raw: &str,
    original_tenure: Option<u32>,
) -> Result<Option<u32>, ValidationError> {
    if is_skip(raw) {
        return Ok(None);
    }
    let years: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::new("remaining_tenure", format!("'{}' is not a whole number", raw.trim())))?;
    if years == 0 {
        return Err(ValidationError::new("remaining_tenure", "must be positive"));
    }
    if let Some(original) = original_tenure
        && years > original
    {
        return Err(ValidationError::new(
            "remaining_tenure",
            format!("{years} exceeds the original tenure of {original}"),
        ));
    }
    Ok(Some(years))
}
