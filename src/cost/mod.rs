//! Cost calculation and aggregation
//!
//! Cost records are derived from usage records on demand and never stored on
//! their own, so a session can be re-priced against a newer catalog without
//! losing raw usage history.

use crate::pricing::PricingCatalog;
use crate::usage::{TokenSource, UsageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Decimal places kept on aggregated cost figures
const COST_PRECISION: i32 = 6;

fn round_cost(cost: f64) -> f64 {
    let factor = 10f64.powi(COST_PRECISION);
    (cost * factor).round() / factor
}

/// Monetary valuation of one usage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// The usage record this valuation derives from
    pub usage: UsageRecord,
    /// Cost of prompt tokens (USD)
    pub input_cost: f64,
    /// Cost of completion tokens (USD)
    pub output_cost: f64,
    /// Cost of cache read/write tokens (USD)
    pub cache_cost: f64,
    /// Total cost (USD)
    pub total_cost: f64,
    /// Catalog version the prices came from
    pub pricing_version: String,
    /// False when the model was not found in the catalog (zero cost)
    pub priced: bool,
}

/// Price a single usage record against a catalog.
///
/// Pure: identical inputs always produce identical output. Unknown models
/// yield a zero-cost record flagged `priced: false` rather than an error, so
/// spend is visibly undercounted instead of silently wrong.
pub fn price(usage: &UsageRecord, catalog: &PricingCatalog) -> CostRecord {
    match catalog.get(&usage.model_id) {
        Some(entry) => {
            let (input_cost, output_cost, cache_cost) = entry.price.cost(usage.counts());
            CostRecord {
                usage: usage.clone(),
                input_cost,
                output_cost,
                cache_cost,
                total_cost: round_cost(input_cost + output_cost + cache_cost),
                pricing_version: catalog.version.clone(),
                priced: true,
            }
        }
        None => {
            warn!(model_id = %usage.model_id, "no pricing for model, cost set to 0");
            CostRecord {
                usage: usage.clone(),
                input_cost: 0.0,
                output_cost: 0.0,
                cache_cost: 0.0,
                total_cost: 0.0,
                pricing_version: catalog.version.clone(),
                priced: false,
            }
        }
    }
}

/// Session-level totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Total cost (USD)
    pub total_cost: f64,
    /// Number of LLM calls
    pub total_calls: u64,
    /// Total prompt tokens
    pub prompt_tokens: u64,
    /// Total completion tokens
    pub completion_tokens: u64,
    /// Total cache read tokens
    pub cache_read_tokens: u64,
    /// Total cache write tokens
    pub cache_write_tokens: u64,
    /// Calls whose counts were estimated or absent
    pub estimated_calls: u64,
    /// Calls whose model had no catalog entry
    pub unpriced_calls: u64,
    /// Records dropped by the tracker's session cap
    pub dropped_records: u64,
}

impl CostSummary {
    /// Total tokens across all counters
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens + self.cache_read_tokens + self.cache_write_tokens
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &CostSummary) {
        self.total_cost = round_cost(self.total_cost + other.total_cost);
        self.total_calls += other.total_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.estimated_calls += other.estimated_calls;
        self.unpriced_calls += other.unpriced_calls;
        self.dropped_records += other.dropped_records;
    }
}

/// Aggregated totals for one grouping key (model id or context tag)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
}

impl GroupTotals {
    fn add(&mut self, record: &CostRecord) {
        let usage = &record.usage;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;
        self.cache_write_tokens += usage.cache_write_tokens;
        self.total_cost = round_cost(self.total_cost + record.total_cost);
        self.call_count += 1;
    }

    /// Merge another group's totals into this one
    pub fn merge(&mut self, other: &GroupTotals) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.total_cost = round_cost(self.total_cost + other.total_cost);
        self.call_count += other.call_count;
    }
}

/// Priced and aggregated view of one session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCosts {
    /// Session identifier
    pub session_id: String,
    /// Session totals
    pub summary: CostSummary,
    /// Totals grouped by model id
    pub by_model: BTreeMap<String, GroupTotals>,
    /// Totals grouped by context tag
    pub by_context: BTreeMap<String, GroupTotals>,
    /// Per-call cost records (omitted for high-volume sessions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<CostRecord>>,
}

/// Price and aggregate a session's records in a single traversal.
///
/// Running totals, `by_model`, and `by_context` are updated together, so the
/// pass is O(n) time with O(distinct models + distinct contexts) extra
/// space. Grouping maps are ordered, making output deterministic for a given
/// history. An empty history yields a valid all-zero result.
pub fn aggregate(
    session_id: &str,
    records: &[UsageRecord],
    catalog: &PricingCatalog,
    include_records: bool,
) -> SessionCosts {
    let mut summary = CostSummary::default();
    let mut by_model: BTreeMap<String, GroupTotals> = BTreeMap::new();
    let mut by_context: BTreeMap<String, GroupTotals> = BTreeMap::new();
    let mut cost_records = include_records.then(|| Vec::with_capacity(records.len()));

    for usage in records {
        let record = price(usage, catalog);

        summary.total_cost = round_cost(summary.total_cost + record.total_cost);
        summary.total_calls += 1;
        summary.prompt_tokens += usage.prompt_tokens;
        summary.completion_tokens += usage.completion_tokens;
        summary.cache_read_tokens += usage.cache_read_tokens;
        summary.cache_write_tokens += usage.cache_write_tokens;
        if usage.source != TokenSource::Measured {
            summary.estimated_calls += 1;
        }
        if !record.priced {
            summary.unpriced_calls += 1;
        }

        by_model
            .entry(usage.model_id.clone())
            .or_default()
            .add(&record);
        by_context
            .entry(usage.context.clone())
            .or_default()
            .add(&record);

        if let Some(ref mut collected) = cost_records {
            collected.push(record);
        }
    }

    SessionCosts {
        session_id: session_id.to_string(),
        summary,
        by_model,
        by_context,
        records: cost_records,
    }
}
