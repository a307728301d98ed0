//! Flat-rate cost bookkeeping for completion calls.
//!
//! The estimate does not distinguish prompt tokens from completion tokens,
//! so it is an order-of-magnitude figure, not a bill.

use serde::Serialize;

/// Default price per 1000 tokens, in the service's currency.
pub const DEFAULT_RATE_PER_THOUSAND_TOKENS: f64 = 0.01;

/// Outcome of recording one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostRecord {
    /// Estimate for this call alone
    pub estimate: f64,

    /// Sum of every estimate recorded in the ledger so far
    pub running_total: f64,
}

/// Per-run accumulator of call estimates.
///
/// Owned by whoever drives a run. The running total only grows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostLedger {
    entries: Vec<f64>,
    total: f64,
}

impl CostLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-call estimates in the order they were recorded.
    #[must_use]
    pub fn entries(&self) -> &[f64] {
        &self.entries
    }

    /// Number of calls recorded.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.entries.len()
    }

    /// Running total of all estimates.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    fn push(&mut self, estimate: f64) -> f64 {
        self.entries.push(estimate);
        self.total += estimate;
        self.total
    }
}

/// Converts token usage into monetary estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostAccountant {
    rate_per_thousand_tokens: f64,
}

impl Default for CostAccountant {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_PER_THOUSAND_TOKENS)
    }
}

impl CostAccountant {
    /// Creates an accountant charging `rate_per_thousand_tokens` per 1000 tokens.
    #[must_use]
    pub const fn new(rate_per_thousand_tokens: f64) -> Self {
        Self {
            rate_per_thousand_tokens,
        }
    }

    /// Configured rate per 1000 tokens.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate_per_thousand_tokens
    }

    /// Estimates the cost of `total_tokens` without touching any ledger.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self, total_tokens: u64) -> f64 {
        (total_tokens as f64 / 1000.0) * self.rate_per_thousand_tokens
    }

    /// Estimates one call and appends it to `ledger`.
    pub fn record(&self, ledger: &mut CostLedger, total_tokens: u64) -> CostRecord {
        let estimate = self.estimate(total_tokens);
        let running_total = ledger.push(estimate);
        CostRecord {
            estimate,
            running_total,
        }
    }
}
