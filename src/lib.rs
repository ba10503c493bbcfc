//! Tokenmeter
//!
//! LLM usage metering and cost aggregation for agent sessions: wrap an LLM
//! client, extract token consumption from heterogeneous provider responses,
//! price it against a versioned catalog, and build persisted cost reports
//! per session or across a multi-session workflow.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenmeter::{
//!     ChatModel, MeterConfig, MeteredChat, PricingCatalog, ReportBuilder, UsageTracker,
//! };
//!
//! let config = MeterConfig::enabled();
//! let tracker = Arc::new(UsageTracker::new());
//! let session_id = UsageTracker::generate_session_id();
//!
//! // Drop-in replacement for the existing client handle
//! let chat = MeteredChat::new(client, Arc::clone(&tracker), &session_id, "agent_main", &config)
//!     .with_provider("anthropic");
//! let response = chat.invoke(&request).await?;
//!
//! // At session end, build and persist the report
//! let builder = ReportBuilder::new(Arc::new(config.catalog()?));
//! let report = builder.session_report(&tracker, &session_id);
//! tokenmeter::report::save_to_dir(&report, "./costs")?;
//! ```

pub mod client;
pub mod config;
pub mod cost;
pub mod error;
pub mod extract;
pub mod pricing;
pub mod report;
pub mod tracker;
pub mod usage;

// Re-export commonly used types
pub use client::{
    ChatChunk, ChatMessage, ChatModel, ChatRequest, ChatResponse, ChatStream, MessageRole,
    MeteredChat,
};
pub use config::{MeterConfig, PricingSource};
pub use cost::{CostRecord, CostSummary, GroupTotals, SessionCosts, aggregate, price};
pub use error::{MeterError, MeterResult};
pub use extract::UsageExtractor;
pub use pricing::{ModelPrice, PricingCatalog, PricingEntry};
pub use report::{CostReport, REPORT_VERSION, ReportBuilder};
pub use tracker::UsageTracker;
pub use usage::{TokenCounts, TokenSource, UsageRecord};
