//! Heuristic default-risk scoring.
//!
//! The score is a clipped weighted sum of three risk terms:
//!
//! | Term | Value |
//! |------|-------|
//! | debt-to-income | `min(1, emi / income)`, or `1` with no income |
//! | utilization | credit utilization ratio clamped to `[0, 1]` |
//! | late payments | `min(1, late_payments / 4)` |
//!
//! Weights and bucket thresholds come from `[risk]` in the config. The
//! defaults (0.45 / 0.35 / 0.20, buckets at 0.4 and 0.65) are hand-tuned.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RiskConfig;

/// Late payments at or above this count saturate their risk term.
const LATE_PAYMENTS_SATURATION: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInput {
    pub monthly_income: f64,
    pub total_monthly_emi: f64,
    /// Expected in `[0, 1]`; values outside are clamped.
    pub credit_utilization_ratio: f64,
    pub late_payments_last_12m: u32,
    pub requested_loan_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBucket::Low => "Low",
            RiskBucket::Medium => "Medium",
            RiskBucket::High => "High",
        };
        f.write_str(s)
    }
}

/// Feature values after clamping, rounded to 4 decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub debt_to_income_ratio: f64,
    pub credit_utilization_ratio: f64,
    pub late_payments_last_12m: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOutput {
    /// In `[0, 1]`.
    pub probability_of_default: f64,
    pub risk_bucket: RiskBucket,
    pub derived_features: DerivedFeatures,
}

pub fn score_risk(input: &RiskInput, config: &RiskConfig) -> RiskOutput {
    let income = non_negative(input.monthly_income);
    let emi = non_negative(input.total_monthly_emi);
    let utilization = clip01(input.credit_utilization_ratio);
    let late_payments = input.late_payments_last_12m;

    let dti = if income > 0.0 { emi / income } else { 1.0 };

    let risk_from_dti = dti.min(1.0);
    let risk_from_lates = (f64::from(late_payments) / LATE_PAYMENTS_SATURATION).min(1.0);

    let probability = clip01(
        config.weight_dti * risk_from_dti
            + config.weight_utilization * utilization
            + config.weight_late_payments * risk_from_lates,
    );

    RiskOutput {
        probability_of_default: probability,
        risk_bucket: categorize(probability, config),
        derived_features: DerivedFeatures {
            debt_to_income_ratio: round4(dti),
            credit_utilization_ratio: round4(utilization),
            late_payments_last_12m: late_payments,
        },
    }
}

fn categorize(probability: f64, config: &RiskConfig) -> RiskBucket {
    if probability >= config.high_threshold {
        RiskBucket::High
    } else if probability >= config.medium_threshold {
        RiskBucket::Medium
    } else {
        RiskBucket::Low
    }
}

// NaN maps to 0 through `max`.
fn non_negative(x: f64) -> f64 {
    x.max(0.0)
}

fn clip01(x: f64) -> f64 {
    x.max(0.0).min(1.0)
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(income: f64, emi: f64, util: f64, lates: u32) -> RiskInput {
        RiskInput {
            monthly_income: income,
            total_monthly_emi: emi,
            credit_utilization_ratio: util,
            late_payments_last_12m: lates,
            requested_loan_amount: 500_000.0,
        }
    }

    #[test]
    fn test_default_form_values() {
        // 0.45 * 0.3 + 0.35 * 0.75 + 0.20 * 0.75 = 0.5475
        let out = score_risk(&input(50_000.0, 15_000.0, 0.75, 3), &RiskConfig::default());
        assert!((out.probability_of_default - 0.5475).abs() < 1e-9);
        assert_eq!(out.risk_bucket, RiskBucket::Medium);
        assert_eq!(out.derived_features.debt_to_income_ratio, 0.3);
        assert_eq!(out.derived_features.late_payments_last_12m, 3);
    }

    #[test]
    fn test_zero_income_is_max_dti() {
        let out = score_risk(&input(0.0, 1_000.0, 1.0, 4), &RiskConfig::default());
        assert_eq!(out.derived_features.debt_to_income_ratio, 1.0);
        assert!((out.probability_of_default - 1.0).abs() < 1e-9);
        assert_eq!(out.risk_bucket, RiskBucket::High);
    }

    #[test]
    fn test_low_risk_borrower() {
        let out = score_risk(&input(100_000.0, 5_000.0, 0.1, 0), &RiskConfig::default());
        assert_eq!(out.risk_bucket, RiskBucket::Low);
    }

    #[test]
    fn test_utilization_clamped() {
        let out = score_risk(&input(10_000.0, 0.0, 1.7, 0), &RiskConfig::default());
        assert_eq!(out.derived_features.credit_utilization_ratio, 1.0);
        let out = score_risk(&input(10_000.0, 0.0, -0.2, 0), &RiskConfig::default());
        assert_eq!(out.derived_features.credit_utilization_ratio, 0.0);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let config = RiskConfig {
            weight_dti: 0.0,
            weight_utilization: 1.0,
            weight_late_payments: 0.0,
            ..RiskConfig::default()
        };
        assert_eq!(
            score_risk(&input(1.0, 0.0, 0.65, 0), &config).risk_bucket,
            RiskBucket::High
        );
        assert_eq!(
            score_risk(&input(1.0, 0.0, 0.4, 0), &config).risk_bucket,
            RiskBucket::Medium
        );
    }

    #[test]
    fn test_bucket_display() {
        assert_eq!(RiskBucket::High.to_string(), "High");
    }
}
