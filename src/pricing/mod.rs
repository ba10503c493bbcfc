//! Model pricing catalog
//!
//! A versioned, read-only mapping from model identifier to per-unit token
//! prices. The catalog is immutable after load and may be shared across
//! sessions without locking.

use crate::error::MeterResult;
use crate::usage::TokenCounts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Prices per `unit_size` tokens (USD)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per unit of input tokens
    pub input: f64,
    /// Price per unit of output tokens
    pub output: f64,
    /// Price per unit of cache-read tokens
    #[serde(default)]
    pub cache_read: f64,
    /// Price per unit of cache-write tokens
    #[serde(default)]
    pub cache_write: f64,
    /// Tokens per priced unit (1, 1_000, or 1_000_000)
    #[serde(default = "default_unit_size")]
    pub unit_size: u64,
}

fn default_unit_size() -> u64 {
    1_000_000
}

impl ModelPrice {
    /// Create a price with input/output rates per 1M tokens
    pub const fn per_million(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cache_read: 0.0,
            cache_write: 0.0,
            unit_size: 1_000_000,
        }
    }

    /// Set cache read/write rates
    pub const fn with_cache(mut self, cache_read: f64, cache_write: f64) -> Self {
        self.cache_read = cache_read;
        self.cache_write = cache_write;
        self
    }

    /// Cost of the given token counts at this price
    pub fn cost(&self, counts: TokenCounts) -> (f64, f64, f64) {
        let unit = self.unit_size as f64;
        let input_cost = counts.prompt as f64 / unit * self.input;
        let output_cost = counts.completion as f64 / unit * self.output;
        let cache_cost = counts.cache_read as f64 / unit * self.cache_read
            + counts.cache_write as f64 / unit * self.cache_write;
        (input_cost, output_cost, cache_cost)
    }
}

/// Pricing entry for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingEntry {
    /// Model identifier (exact id or prefix)
    pub model_id: String,
    /// Provider name
    pub provider: String,
    /// Token pricing
    pub price: ModelPrice,
}

impl PricingEntry {
    /// Create a new pricing entry
    pub fn new(
        model_id: impl Into<String>,
        provider: impl Into<String>,
        price: ModelPrice,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            provider: provider.into(),
            price,
        }
    }
}

/// Versioned pricing catalog for all known models.
///
/// Lookup order: exact match, alias, then longest registered prefix of the
/// queried id. Unknown models return `None`; callers are expected to produce
/// a zero-cost record rather than fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingCatalog {
    /// Catalog version, recorded in every derived cost record
    pub version: String,
    /// Pricing by model ID
    models: HashMap<String, PricingEntry>,
    /// Aliases for model IDs
    aliases: HashMap<String, String>,
}

impl PricingCatalog {
    /// Create a new empty catalog with the given version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            models: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Create a catalog with built-in default pricing
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new(BUILTIN_VERSION);
        catalog.register_defaults();
        catalog
    }

    /// Load a catalog from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> MeterResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&contents)?;
        Ok(catalog)
    }

    /// Register a model
    pub fn register(&mut self, entry: PricingEntry) {
        self.models.insert(entry.model_id.clone(), entry);
    }

    /// Register an alias
    pub fn register_alias(&mut self, alias: impl Into<String>, model_id: impl Into<String>) {
        self.aliases.insert(alias.into(), model_id.into());
    }

    /// Get pricing for a model
    pub fn get(&self, model_id: &str) -> Option<&PricingEntry> {
        // Exact match
        if let Some(entry) = self.models.get(model_id) {
            return Some(entry);
        }

        // Alias
        if let Some(actual_id) = self.aliases.get(model_id) {
            return self.models.get(actual_id);
        }

        // Longest registered prefix of the queried id, so versioned ids like
        // "gpt-4o-2024-08-06" resolve to a "gpt-4o" entry
        self.models
            .iter()
            .filter(|(key, _)| model_id.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, entry)| entry)
    }

    /// Number of registered models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog has no models
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Iterate over all entries
    pub fn entries(&self) -> impl Iterator<Item = &PricingEntry> {
        self.models.values()
    }

    /// Register built-in model pricing (per 1M tokens, USD)
    fn register_defaults(&mut self) {
        // Anthropic models (cache reads are 10% of input, cache writes 125%)
        self.register(PricingEntry::new(
            "claude-3-5-sonnet",
            "anthropic",
            ModelPrice::per_million(3.0, 15.0).with_cache(0.30, 3.75),
        ));
        self.register_alias("sonnet", "claude-3-5-sonnet");

        self.register(PricingEntry::new(
            "claude-3-5-haiku",
            "anthropic",
            ModelPrice::per_million(0.80, 4.0).with_cache(0.08, 1.0),
        ));
        self.register_alias("haiku", "claude-3-5-haiku");

        self.register(PricingEntry::new(
            "claude-3-opus",
            "anthropic",
            ModelPrice::per_million(15.0, 75.0).with_cache(1.50, 18.75),
        ));
        self.register_alias("opus", "claude-3-opus");

        // Anthropic via Bedrock
        self.register(PricingEntry::new(
            "us.anthropic.claude-3-5-sonnet",
            "bedrock",
            ModelPrice::per_million(3.0, 15.0).with_cache(0.30, 3.75),
        ));
        self.register(PricingEntry::new(
            "us.anthropic.claude-3-5-haiku",
            "bedrock",
            ModelPrice::per_million(0.80, 4.0).with_cache(0.08, 1.0),
        ));

        // OpenAI models
        self.register(PricingEntry::new(
            "gpt-4o",
            "openai",
            ModelPrice::per_million(2.50, 10.0).with_cache(1.25, 0.0),
        ));
        self.register(PricingEntry::new(
            "gpt-4o-mini",
            "openai",
            ModelPrice::per_million(0.15, 0.60).with_cache(0.075, 0.0),
        ));
        self.register(PricingEntry::new(
            "gpt-4-turbo",
            "openai",
            ModelPrice::per_million(10.0, 30.0),
        ));
        self.register(PricingEntry::new(
            "o1-mini",
            "openai",
            ModelPrice::per_million(3.0, 12.0).with_cache(1.50, 0.0),
        ));

        // Google models
        self.register(PricingEntry::new(
            "gemini-1.5-pro",
            "google",
            ModelPrice::per_million(1.25, 5.0).with_cache(0.3125, 0.0),
        ));
        self.register(PricingEntry::new(
            "gemini-1.5-flash",
            "google",
            ModelPrice::per_million(0.075, 0.30),
        ));
        self.register(PricingEntry::new(
            "gemini-2.0-flash",
            "google",
            ModelPrice::per_million(0.10, 0.40),
        ));

        // DeepSeek models
        self.register(PricingEntry::new(
            "deepseek-chat",
            "deepseek",
            ModelPrice::per_million(0.14, 0.28).with_cache(0.014, 0.0),
        ));
    }
}

/// Version tag of the built-in pricing table
pub const BUILTIN_VERSION: &str = "builtin-2025-08";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_price_cost() {
        let price = ModelPrice::per_million(3.0, 15.0);
        let (input, output, cache) = price.cost(TokenCounts::new(1_000_000, 1_000_000));
        assert!((input - 3.0).abs() < 1e-9);
        assert!((output - 15.0).abs() < 1e-9);
        assert_eq!(cache, 0.0);
    }

    #[test]
    fn test_model_price_cache_cost() {
        let price = ModelPrice::per_million(3.0, 15.0).with_cache(0.30, 3.75);
        let counts = TokenCounts {
            prompt: 0,
            completion: 0,
            cache_read: 1_000_000,
            cache_write: 1_000_000,
        };
        let (_, _, cache) = price.cost(counts);
        assert!((cache - 4.05).abs() < 1e-9);
    }

    #[test]
    fn test_unit_size_scaling() {
        // Per-1K pricing: $0.001 input, $0.002 output
        let price = ModelPrice {
            input: 0.001,
            output: 0.002,
            cache_read: 0.0,
            cache_write: 0.0,
            unit_size: 1_000,
        };
        let (input, output, _) = price.cost(TokenCounts::new(300, 50));
        assert!((input - 0.0003).abs() < 1e-9);
        assert!((output - 0.0001).abs() < 1e-9);
    }

    #[test]
    fn test_catalog_defaults() {
        let catalog = PricingCatalog::with_defaults();
        assert!(!catalog.is_empty());
        assert!(catalog.get("gpt-4o").is_some());
        assert!(catalog.get("claude-3-5-sonnet").is_some());
        assert_eq!(catalog.version, BUILTIN_VERSION);
    }

    #[test]
    fn test_catalog_alias() {
        let catalog = PricingCatalog::with_defaults();
        let entry = catalog.get("sonnet").unwrap();
        assert_eq!(entry.model_id, "claude-3-5-sonnet");
    }

    #[test]
    fn test_catalog_longest_prefix() {
        let catalog = PricingCatalog::with_defaults();

        // Dated model id resolves via prefix
        let entry = catalog.get("claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(entry.model_id, "claude-3-5-sonnet");

        // "gpt-4o-mini-2024-07-18" must prefer "gpt-4o-mini" over "gpt-4o"
        let entry = catalog.get("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(entry.model_id, "gpt-4o-mini");
    }

    #[test]
    fn test_catalog_unknown_model() {
        let catalog = PricingCatalog::with_defaults();
        assert!(catalog.get("totally-unknown-model").is_none());
    }

    #[test]
    fn test_catalog_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");

        let mut catalog = PricingCatalog::new("test-v1");
        catalog.register(PricingEntry::new(
            "m-small",
            "test",
            ModelPrice {
                input: 0.001,
                output: 0.002,
                cache_read: 0.0,
                cache_write: 0.0,
                unit_size: 1_000,
            },
        ));

        let json = serde_json::to_string_pretty(&catalog).unwrap();
        std::fs::write(&path, json).unwrap();

        let loaded = PricingCatalog::from_json_file(&path).unwrap();
        assert_eq!(loaded.version, "test-v1");
        assert!(loaded.get("m-small").is_some());
    }
}
