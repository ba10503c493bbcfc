//! Metering configuration

use crate::error::{MeterError, MeterResult};
use crate::pricing::PricingCatalog;
use crate::tracker::DEFAULT_MAX_SESSION_RECORDS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the pricing catalog comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingSource {
    /// Built-in pricing table
    #[default]
    BuiltIn,
    /// JSON file on disk
    File(PathBuf),
}

/// Configuration for usage metering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Whether tracking is enabled at all.
    /// When false the interception wrapper is a zero-overhead passthrough.
    pub enabled: bool,
    /// Pricing catalog source
    pub pricing: PricingSource,
    /// Whether session reports include per-call cost records
    pub include_records: bool,
    /// Per-session record cap (`None` removes the bound)
    pub max_session_records: Option<usize>,
    /// Whether to estimate token counts from text length when a response
    /// carries no usage metadata. Off by default: such calls are recorded
    /// with zero usage and zero cost rather than a guess.
    pub estimate_missing_usage: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pricing: PricingSource::BuiltIn,
            include_records: true,
            max_session_records: Some(DEFAULT_MAX_SESSION_RECORDS),
            estimate_missing_usage: false,
        }
    }
}

impl MeterConfig {
    /// Create a config with tracking enabled
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Read configuration from the environment.
    ///
    /// Recognized variables: `TOKENMETER_ENABLED` ("true"/"1"),
    /// `TOKENMETER_PRICING_FILE`, `TOKENMETER_MAX_SESSION_RECORDS`,
    /// `TOKENMETER_ESTIMATE_MISSING_USAGE` ("true"/"1").
    pub fn from_env() -> MeterResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("TOKENMETER_ENABLED") {
            config.enabled = matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1");
        }

        if let Ok(path) = std::env::var("TOKENMETER_PRICING_FILE") {
            if !path.trim().is_empty() {
                config.pricing = PricingSource::File(PathBuf::from(path));
            }
        }

        if let Ok(value) = std::env::var("TOKENMETER_MAX_SESSION_RECORDS") {
            let max: usize = value.trim().parse().map_err(|_| {
                MeterError::config(format!(
                    "TOKENMETER_MAX_SESSION_RECORDS must be an integer, got: {value}"
                ))
            })?;
            config.max_session_records = (max > 0).then_some(max);
        }

        if let Ok(value) = std::env::var("TOKENMETER_ESTIMATE_MISSING_USAGE") {
            config.estimate_missing_usage =
                matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1");
        }

        Ok(config)
    }

    /// Load the pricing catalog this config selects
    pub fn catalog(&self) -> MeterResult<PricingCatalog> {
        match &self.pricing {
            PricingSource::BuiltIn => Ok(PricingCatalog::with_defaults()),
            PricingSource::File(path) => PricingCatalog::from_json_file(path),
        }
    }
}
