//! Refinancing savings calculator.
//!
//! Arithmetic runs in `f64`; currency outputs are converted to
//! [`Decimal`] and rounded to two places only when the result is built.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Reference rate for a loan amount band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRate {
    pub bank_name: String,
    pub min_amount: f64,
    /// `None` means no upper bound.
    #[serde(default)]
    pub max_amount: Option<f64>,
    /// Annual rate in percent.
    pub interest_rate: f64,
}

impl BankRate {
    pub fn covers(&self, amount: f64) -> bool {
        amount >= self.min_amount && self.max_amount.is_none_or(|max| amount <= max)
    }
}

/// Calculator inputs, any of which may still be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SavingsInput {
    pub loan_amount: Option<f64>,
    pub tenure_years: Option<u32>,
    pub current_repayment: Option<f64>,
}

/// Computed refinancing outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsResult {
    pub bank_name: String,
    pub interest_rate: f64,
    pub current_repayment: Decimal,
    pub new_monthly_repayment: Decimal,
    /// May be zero or negative when the current loan is already cheaper.
    pub monthly_savings: Decimal,
    pub yearly_savings: Decimal,
    pub lifetime_savings: Decimal,
    pub years_saved: u32,
    pub months_saved: u32,
}

impl SavingsResult {
    pub fn has_savings(&self) -> bool {
        self.monthly_savings > Decimal::ZERO
    }
}

/// Why no result could be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Unavailable {
    #[error("missing or non-positive input: {0}")]
    InvalidInput(&'static str),

    #[error("no bank rate covers a loan of {amount}")]
    NoMatchingRate { amount: f64 },

    #[error("calculation produced a non-finite value")]
    NonFinite,
}

/// Lowest-rate row whose band contains `amount`.
pub fn best_rate(rates: &[BankRate], amount: f64) -> Option<&BankRate> {
    rates
        .iter()
        .filter(|rate| rate.covers(amount))
        .min_by(|a, b| a.interest_rate.total_cmp(&b.interest_rate))
}

/// Annuity payment for `principal` over `years` at `annual_rate` percent.
pub fn monthly_payment(principal: f64, annual_rate: f64, years: u32) -> f64 {
    let n = f64::from(years) * 12.0;
    let r = annual_rate / 100.0 / 12.0;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Repayment time the lifetime savings are worth, as (years, months).
///
/// Both are zero unless `lifetime_savings` and `current_repayment` are
/// positive. Never reports 12 months.
pub fn time_saved(lifetime_savings: f64, current_repayment: f64) -> (u32, u32) {
    if lifetime_savings <= 0.0 || current_repayment <= 0.0 {
        return (0, 0);
    }
    let total_months = lifetime_savings / current_repayment;
    let mut years = (total_months / 12.0).floor() as u32;
    let remainder = total_months % 12.0;
    let mut months = remainder.ceil() as u32;
    if remainder > 0.0 && months == 0 {
        months = 1;
    }
    if months >= 12 {
        years += 1;
        months = 0;
    }
    (years, months)
}

fn money(value: f64) -> Result<Decimal, Unavailable> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or(Unavailable::NonFinite)
}

/// Compute savings from refinancing at the best applicable rate.
pub fn calculate_refinance_savings(
    input: &SavingsInput,
    rates: &[BankRate],
) -> Result<SavingsResult, Unavailable> {
    let amount = input
        .loan_amount
        .filter(|v| *v > 0.0)
        .ok_or(Unavailable::InvalidInput("loan_amount"))?;
    let years = input
        .tenure_years
        .filter(|v| *v > 0)
        .ok_or(Unavailable::InvalidInput("tenure_years"))?;
    let current = input
        .current_repayment
        .filter(|v| *v > 0.0)
        .ok_or(Unavailable::InvalidInput("current_repayment"))?;

    let rate = best_rate(rates, amount).ok_or(Unavailable::NoMatchingRate { amount })?;

    let new_payment = monthly_payment(amount, rate.interest_rate, years);
    if !new_payment.is_finite() {
        return Err(Unavailable::NonFinite);
    }
    let payments = f64::from(years) * 12.0;
    let monthly_savings = current - new_payment;
    let yearly_savings = monthly_savings * 12.0;
    let lifetime_savings = current * payments - new_payment * payments;
    let (years_saved, months_saved) = time_saved(lifetime_savings, current);

    Ok(SavingsResult {
        bank_name: rate.bank_name.clone(),
        interest_rate: rate.interest_rate,
        current_repayment: money(current)?,
        new_monthly_repayment: money(new_payment)?,
        monthly_savings: money(monthly_savings)?,
        yearly_savings: money(yearly_savings)?,
        lifetime_savings: money(lifetime_savings)?,
        years_saved,
        months_saved,
    })
}

/// Format an amount as `RM 1,234.56`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-RM {grouped}.{frac}")
    } else {
        format!("RM {grouped}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rate(bank: &str, min: f64, max: Option<f64>, pct: f64) -> BankRate {
        BankRate {
            bank_name: bank.into(),
            min_amount: min,
            max_amount: max,
            interest_rate: pct,
        }
    }

    fn input(amount: f64, years: u32, repayment: f64) -> SavingsInput {
        SavingsInput {
            loan_amount: Some(amount),
            tenure_years: Some(years),
            current_repayment: Some(repayment),
        }
    }

    #[test]
    fn three_point_eight_percent_over_thirty_years() {
        let rates = vec![rate("Public Bank", 100_000.0, Some(1_000_000.0), 3.8)];
        let result = calculate_refinance_savings(&input(300_000.0, 30, 2000.0), &rates).unwrap();

        assert_eq!(result.bank_name, "Public Bank");
        assert_eq!(result.new_monthly_repayment, dec!(1397.87));
        assert_eq!(result.monthly_savings, dec!(602.13));
        assert_eq!(result.yearly_savings, dec!(7225.54));
        assert_eq!(result.lifetime_savings, dec!(216766.06));
        assert_eq!((result.years_saved, result.months_saved), (9, 1));
        assert!(result.has_savings());
    }

    #[test]
    fn best_rate_picks_lowest_matching() {
        let rates = vec![
            rate("A", 0.0, Some(500_000.0), 4.1),
            rate("B", 100_000.0, None, 3.9),
            rate("C", 400_000.0, None, 3.5),
        ];
        assert_eq!(best_rate(&rates, 300_000.0).unwrap().bank_name, "B");
        assert_eq!(best_rate(&rates, 450_000.0).unwrap().bank_name, "C");
        assert_eq!(best_rate(&rates, 50_000.0).unwrap().bank_name, "A");
    }

    #[test]
    fn band_bounds_are_inclusive_and_null_max_is_unbounded() {
        let bounded = rate("X", 100_000.0, Some(500_000.0), 4.0);
        assert!(bounded.covers(100_000.0));
        assert!(bounded.covers(500_000.0));
        assert!(!bounded.covers(500_000.01));
        assert!(!bounded.covers(99_999.0));
        assert!(rate("Y", 1.0, None, 4.0).covers(1e12));
    }

    #[test]
    fn no_matching_rate_is_unavailable() {
        let rates = vec![rate("A", 100_000.0, Some(1_000_000.0), 3.8)];
        let err = calculate_refinance_savings(&input(5_000_000.0, 30, 2000.0), &rates).unwrap_err();
        assert_eq!(err, Unavailable::NoMatchingRate { amount: 5_000_000.0 });
        assert!(calculate_refinance_savings(&input(300_000.0, 30, 2000.0), &[]).is_err());
    }

    #[test]
    fn missing_or_non_positive_inputs_are_unavailable() {
        let rates = vec![rate("A", 0.0, None, 3.8)];
        let mut missing = input(300_000.0, 30, 2000.0);
        missing.loan_amount = None;
        assert_eq!(
            calculate_refinance_savings(&missing, &rates).unwrap_err(),
            Unavailable::InvalidInput("loan_amount")
        );
        assert!(calculate_refinance_savings(&input(300_000.0, 0, 2000.0), &rates).is_err());
        assert!(calculate_refinance_savings(&input(300_000.0, 30, -5.0), &rates).is_err());
        assert!(calculate_refinance_savings(&input(-1.0, 30, 2000.0), &rates).is_err());
    }

    #[test]
    fn zero_rate_divides_evenly() {
        assert_eq!(monthly_payment(120_000.0, 0.0, 10), 1000.0);
    }

    #[test]
    fn payment_decreases_with_rate() {
        let mut previous = f64::INFINITY;
        for pct in [6.0, 5.0, 4.5, 4.0, 3.8, 3.0, 1.0, 0.0] {
            let payment = monthly_payment(300_000.0, pct, 30);
            assert!(payment < previous, "{pct}% should be cheaper");
            previous = payment;
        }
    }

    #[test]
    fn calculation_is_deterministic() {
        let rates = vec![rate("A", 0.0, None, 3.85)];
        let a = calculate_refinance_savings(&input(420_000.0, 25, 2500.0), &rates).unwrap();
        let b = calculate_refinance_savings(&input(420_000.0, 25, 2500.0), &rates).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn negative_savings_is_a_valid_result() {
        let rates = vec![rate("A", 0.0, None, 4.0)];
        let result = calculate_refinance_savings(&input(300_000.0, 30, 1000.0), &rates).unwrap();
        assert!(result.monthly_savings < Decimal::ZERO);
        assert!(!result.has_savings());
        assert_eq!((result.years_saved, result.months_saved), (0, 0));
    }

    #[test]
    fn time_saved_rules() {
        assert_eq!(time_saved(24_000.0, 1000.0), (2, 0));
        assert_eq!(time_saved(12_500.0, 1000.0), (1, 1));
        assert_eq!(time_saved(1.0, 1000.0), (0, 1));
        // 11.5 months rounds up to a full year.
        assert_eq!(time_saved(11_500.0, 1000.0), (1, 0));
        assert_eq!(time_saved(0.0, 1000.0), (0, 0));
        assert_eq!(time_saved(-10.0, 1000.0), (0, 0));
        assert_eq!(time_saved(100.0, 0.0), (0, 0));
    }

    #[test]
    fn time_saved_tracks_total_months() {
        for lifetime in [1.0, 999.0, 11_999.0, 37_123.45, 216_766.06, 1_000_000.0] {
            let current = 1234.5;
            let (years, months) = time_saved(lifetime, current);
            assert!(months < 12);
            let reported = f64::from(years * 12 + months);
            let actual = lifetime / current;
            assert!((reported - actual).abs() <= 1.0, "{lifetime}: {reported} vs {actual}");
        }
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(dec!(1234.5)), "RM 1,234.50");
        assert_eq!(format_currency(dec!(216766.06)), "RM 216,766.06");
        assert_eq!(format_currency(dec!(999)), "RM 999.00");
        assert_eq!(format_currency(dec!(1000000)), "RM 1,000,000.00");
        assert_eq!(format_currency(dec!(-602.125)), "-RM 602.13");
        assert_eq!(format_currency(Decimal::ZERO), "RM 0.00");
    }

    #[test]
    fn bank_rate_json_allows_null_max() {
        let rows: Vec<BankRate> = serde_json::from_str(
            r#"[{"bank_name":"RHB","min_amount":500000,"max_amount":null,"interest_rate":4.05},
                {"bank_name":"CIMB","min_amount":100000,"interest_rate":3.9}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].max_amount, None);
        assert_eq!(rows[1].max_amount, None);
    }
}
