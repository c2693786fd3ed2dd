//! Cost and credit accounting.
//!
//! Grounded on `fluent_core::cost_calculator::CostCalculator` (pricing
//! table keyed by engine:model, `calculate_cost`, daily-total tracking,
//! cost-limit validation); the pricing-model shape and guardrails are
//! carried over close to verbatim, with credits and margin layered on top.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::ConfigurationError;
use crate::types::QualityLevel;

/// Cost calculation limits and validation, same defaults as
/// `fluent_core::cost_calculator::CostLimits`.
#[derive(Debug, Clone)]
pub struct CostLimits {
    pub max_single_request_usd: f64,
    pub max_daily_total_usd: f64,
    pub warn_threshold_usd: f64,
}

impl Default for CostLimits {
    fn default() -> Self {
        Self {
            max_single_request_usd: 10.0,
            max_daily_total_usd: 100.0,
            warn_threshold_usd: 1.0,
        }
    }
}

/// Per-(operation, quality) credit price. `default` is consulted when no
/// row exists for the requested quality level.
#[derive(Debug, Clone, Default)]
pub struct OperationCreditConfig {
    pub by_quality: HashMap<QualityLevel, u64>,
    pub default: Option<u64>,
}

/// Process-wide credit price book plus the USD value of one credit.
#[derive(Debug, Clone)]
pub struct CreditTable {
    pub usd_per_credit: f64,
    pub operations: HashMap<String, OperationCreditConfig>,
}

impl CreditTable {
    pub fn credits_for(&self, operation_id: &str, quality: QualityLevel) -> Result<u64, ConfigurationError> {
        let entry = self
            .operations
            .get(operation_id)
            .ok_or_else(|| ConfigurationError::UnknownOperation(operation_id.to_string()))?;
        entry
            .by_quality
            .get(&quality)
            .copied()
            .or(entry.default)
            .ok_or_else(|| ConfigurationError::NoModelForQuality {
                operation: operation_id.to_string(),
                quality: quality.to_string(),
            })
    }
}

/// `costUSD = inputTokens * rate_in / 1e6 + outputTokens * rate_out / 1e6`,
/// with a running daily total and the same single-request / daily-total /
/// warn-threshold guardrails `fluent_core::cost_calculator` enforces.
pub struct CostCalculator {
    limits: CostLimits,
    daily_total_usd: Mutex<f64>,
}

impl CostCalculator {
    pub fn new() -> Self {
        Self::with_limits(CostLimits::default())
    }

    pub fn with_limits(limits: CostLimits) -> Self {
        Self {
            limits,
            daily_total_usd: Mutex::new(0.0),
        }
    }

    /// Token-rate cost for one provider call. `input_cost_per_million` and
    /// `output_cost_per_million` are USD per 1,000,000 tokens.
    pub fn calculate_cost(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        input_cost_per_million: f64,
        output_cost_per_million: f64,
    ) -> f64 {
        let cost = (input_tokens as f64) * input_cost_per_million / 1_000_000.0
            + (output_tokens as f64) * output_cost_per_million / 1_000_000.0;
        if cost > self.limits.warn_threshold_usd {
            warn!(cost_usd = cost, "step cost above warn threshold");
        }
        debug!(cost_usd = cost, input_tokens, output_tokens, "calculated step cost");
        cost
    }

    /// Validates a computed cost against the configured limits, recording
    /// it against the daily running total on success.
    pub fn validate_and_record(&self, cost_usd: f64) -> Result<(), String> {
        if cost_usd < 0.0 {
            return Err(format!("negative cost computed: {cost_usd}"));
        }
        if cost_usd > self.limits.max_single_request_usd {
            return Err(format!(
                "cost {cost_usd} exceeds max_single_request_usd {}",
                self.limits.max_single_request_usd
            ));
        }
        let mut total = self.daily_total_usd.lock().expect("cost calculator mutex poisoned");
        if *total + cost_usd > self.limits.max_daily_total_usd {
            return Err(format!(
                "daily total would exceed max_daily_total_usd {}",
                self.limits.max_daily_total_usd
            ));
        }
        *total += cost_usd;
        Ok(())
    }

    pub fn daily_total_usd(&self) -> f64 {
        *self.daily_total_usd.lock().expect("cost calculator mutex poisoned")
    }

    pub fn reset_daily_total(&self) {
        *self.daily_total_usd.lock().expect("cost calculator mutex poisoned") = 0.0;
    }
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// `margin = ((credits * usd_per_credit) - cost_usd) / (credits * usd_per_credit) * 100`,
/// zero when the divisor is zero (a free operation has no margin to report,
/// not an infinite one).
pub fn margin_percent(credits: u64, usd_per_credit: f64, cost_usd: f64) -> f64 {
    let revenue = credits as f64 * usd_per_credit;
    if revenue == 0.0 {
        return 0.0;
    }
    (revenue - cost_usd) / revenue * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculates_cost_from_per_million_rates() {
        let calc = CostCalculator::new();
        let cost = calc.calculate_cost(1_000_000, 1_000_000, 3.0, 15.0);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_cost_over_single_request_limit() {
        let calc = CostCalculator::with_limits(CostLimits {
            max_single_request_usd: 1.0,
            ..CostLimits::default()
        });
        assert!(calc.validate_and_record(2.0).is_err());
    }

    #[test]
    fn daily_total_accumulates_across_calls() {
        let calc = CostCalculator::new();
        calc.validate_and_record(0.5).unwrap();
        calc.validate_and_record(0.25).unwrap();
        assert!((calc.daily_total_usd() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn margin_is_zero_for_free_operation() {
        assert_eq!(margin_percent(0, 0.1, 0.0), 0.0);
    }

    #[test]
    fn margin_reflects_cost_against_revenue() {
        // 10 credits * $0.10 = $1.00 revenue, $0.40 cost -> 60% margin.
        let margin = margin_percent(10, 0.10, 0.40);
        assert!((margin - 60.0).abs() < 1e-9);
    }

    #[test]
    fn credit_table_falls_back_to_default() {
        let mut operations = HashMap::new();
        operations.insert(
            "generate_text".to_string(),
            OperationCreditConfig {
                by_quality: HashMap::new(),
                default: Some(5),
            },
        );
        let table = CreditTable {
            usd_per_credit: 0.1,
            operations,
        };
        assert_eq!(table.credits_for("generate_text", QualityLevel::Expert).unwrap(), 5);
    }

    #[test]
    fn credit_table_errors_on_unknown_operation() {
        let table = CreditTable {
            usd_per_credit: 0.1,
            operations: HashMap::new(),
        };
        assert!(table.credits_for("missing_op", QualityLevel::Fast).is_err());
    }
}
