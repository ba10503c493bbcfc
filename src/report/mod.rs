//! Cost report assembly and persistence
//!
//! Reports are snapshots: they price a tracker's history at generation time
//! and are persisted as versioned JSON. Saving is atomic (write to a
//! temporary file, then rename), so a concurrent reader never observes a
//! partially written report.

use crate::config::MeterConfig;
use crate::cost::{self, CostRecord, CostSummary, GroupTotals, SessionCosts};
use crate::error::MeterResult;
use crate::pricing::PricingCatalog;
use crate::tracker::UsageTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;


/// Current report schema version; bumped on breaking field changes
pub const REPORT_VERSION: u32 = 1;

/// A persisted, queryable cost report for one session or a workflow of
/// sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    /// Schema version of this document
    pub report_version: u32,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Catalog version used for pricing
    pub pricing_version: String,
    /// Sessions covered, sorted and deduplicated
    pub session_ids: Vec<String>,
    /// Totals across all covered sessions
    pub summary: CostSummary,
    /// Totals grouped by model id
    pub by_model: BTreeMap<String, GroupTotals>,
    /// Totals grouped by context tag
    pub by_context: BTreeMap<String, GroupTotals>,
    /// Per-call cost records; omitted for workflow reports and when the
    /// caller bounds output size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<CostRecord>>,
}

impl CostReport {
    fn from_session_costs(costs: SessionCosts, pricing_version: String) -> Self {
        Self {
            report_version: REPORT_VERSION,
            generated_at: Utc::now(),
            pricing_version,
            session_ids: vec![costs.session_id],
            summary: costs.summary,
            by_model: costs.by_model,
            by_context: costs.by_context,
            records: costs.records,
        }
    }

    /// Merge another report into this one.
    ///
    /// Associative and commutative over the aggregate fields: summaries sum,
    /// grouping maps merge key-wise, session id lists union. Merged record
    /// lists are re-sorted by timestamp and id so the result does not depend
    /// on merge order.
    pub fn merge(mut self, other: CostReport) -> CostReport {
        self.summary.merge(&other.summary);

        for (model, totals) in other.by_model {
            self.by_model.entry(model).or_default().merge(&totals);
        }
        for (context, totals) in other.by_context {
            self.by_context.entry(context).or_default().merge(&totals);
        }

        self.session_ids.extend(other.session_ids);
        self.session_ids.sort();
        self.session_ids.dedup();

        self.records = match (self.records, other.records) {
            (Some(mut a), Some(b)) => {
                a.extend(b);
                a.sort_by(|x, y| {
                    (x.usage.timestamp, &x.usage.id).cmp(&(y.usage.timestamp, &y.usage.id))
                });
                Some(a)
            }
            _ => None,
        };

        self
    }
}

/// Assembles cost reports from a tracker's accumulated history
pub struct ReportBuilder {
    catalog: Arc<PricingCatalog>,
    include_records: bool,
}

impl ReportBuilder {
    /// Create a builder pricing against the given catalog.
    /// Session reports include per-call records by default.
    pub fn new(catalog: Arc<PricingCatalog>) -> Self {
        Self {
            catalog,
            include_records: true,
        }
    }

    /// Create a builder honoring the config's `include_records` flag
    pub fn from_config(catalog: Arc<PricingCatalog>, config: &MeterConfig) -> Self {
        Self::new(catalog).with_include_records(config.include_records)
    }

    /// Set whether session reports carry per-call cost records
    pub fn with_include_records(mut self, include_records: bool) -> Self {
        self.include_records = include_records;
        self
    }

    /// Build a report for one session.
    ///
    /// An empty or unknown session yields a valid all-zero report.
    pub fn session_report(&self, tracker: &UsageTracker, session_id: &str) -> CostReport {
        self.build_session(tracker, session_id, self.include_records)
    }

    fn build_session(
        &self,
        tracker: &UsageTracker,
        session_id: &str,
        include_records: bool,
    ) -> CostReport {
        let history = tracker.history(session_id);
        let mut costs = cost::aggregate(session_id, &history, &self.catalog, include_records);
        costs.summary.dropped_records = tracker.dropped_records(session_id);
        CostReport::from_session_costs(costs, self.catalog.version.clone())
    }

    /// Build a merged report over several sessions.
    ///
    /// The merge is associative and commutative, so the hosting application
    /// may combine sessions in any order or incrementally. Per-call records
    /// are omitted to keep workflow reports bounded.
    pub fn workflow_report(&self, tracker: &UsageTracker, session_ids: &[String]) -> CostReport {
        let mut report = CostReport {
            report_version: REPORT_VERSION,
            generated_at: Utc::now(),
            pricing_version: self.catalog.version.clone(),
            session_ids: Vec::new(),
            summary: CostSummary::default(),
            by_model: BTreeMap::new(),
            by_context: BTreeMap::new(),
            records: None,
        };

        for session_id in session_ids {
            let session = self.build_session(tracker, session_id, false);
            report = report.merge(session);
        }

        report
    }
}

/// Save a report as pretty JSON, atomically.
///
/// The document is written to `<path>.tmp` and renamed into place, so no
/// concurrent reader ever sees a torn file. On failure the in-memory report
/// is untouched and the caller may retry.
pub fn save(report: &CostReport, path: impl AsRef<Path>) -> MeterResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(report)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Save a report under `dir` with a generated filename
/// (`{session_id}_{timestamp}_cost.json`), returning the path written.
pub fn save_to_dir(report: &CostReport, dir: impl AsRef<Path>) -> MeterResult<PathBuf> {
    let session_part = sanitize_filename(
        report
            .session_ids
            .first()
            .map(String::as_str)
            .unwrap_or("unknown"),
    );
    let timestamp = report.generated_at.format("%Y%m%d_%H%M%S");
    let path = dir
        .as_ref()
        .join(format!("{session_part}_{timestamp}_cost.json"));
    save(report, &path)?;
    Ok(path)
}

/// Load a previously saved report
pub fn load(path: impl AsRef<Path>) -> MeterResult<CostReport> {
    let contents = std::fs::read_to_string(path)?;
    let report: CostReport = serde_json::from_str(&contents)?;
    Ok(report)
}

/// Replace filesystem-unsafe characters so session ids cannot traverse
/// paths or break filenames
fn sanitize_filename(name: &str) -> String {
    const MAX_LEN: usize = 128;
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LEN)
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Render a human-readable console summary of a report
pub fn format_summary(report: &CostReport) -> String {
    let mut lines = Vec::new();
    lines.push("=".repeat(60));
    lines.push("COST SUMMARY".to_string());
    lines.push("=".repeat(60));
    lines.push(format!("Sessions: {}", report.session_ids.join(", ")));
    lines.push(format!("Pricing version: {}", report.pricing_version));
    lines.push(String::new());
    lines.push(format!("Total cost: ${:.4}", report.summary.total_cost));
    lines.push(format!("Total calls: {}", report.summary.total_calls));
    lines.push(format!(
        "Total tokens: {} (prompt: {}, completion: {}, cache r/w: {}/{})",
        report.summary.total_tokens(),
        report.summary.prompt_tokens,
        report.summary.completion_tokens,
        report.summary.cache_read_tokens,
        report.summary.cache_write_tokens,
    ));
    if report.summary.estimated_calls > 0 || report.summary.unpriced_calls > 0 {
        lines.push(format!(
            "Degraded: {} estimated, {} unpriced",
            report.summary.estimated_calls, report.summary.unpriced_calls,
        ));
    }
    if report.summary.dropped_records > 0 {
        lines.push(format!(
            "Dropped records (history cap): {}",
            report.summary.dropped_records
        ));
    }

    if !report.by_model.is_empty() {
        lines.push(String::new());
        lines.push("Cost by model:".to_string());
        for (model, totals) in &report.by_model {
            lines.push(format!(
                "  {model}: ${:.4} over {} calls",
                totals.total_cost, totals.call_count
            ));
        }
    }

    if !report.by_context.is_empty() {
        lines.push(String::new());
        lines.push("Cost by context:".to_string());
        for (context, totals) in &report.by_context {
            lines.push(format!(
                "  {context}: ${:.4} over {} calls",
                totals.total_cost, totals.call_count
            ));
        }
    }

    lines.push("=".repeat(60));
    lines.join("\n")
}
