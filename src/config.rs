use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::FormulaLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where a per-unit metric reads its quantity from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSource {
    /// Context field path holding the raw quantity.
    pub field: String,
    /// The raw quantity is divided by this (1000 turns GB into TB).
    #[serde(default = "default_divisor")]
    pub divisor: f64,
}

impl MetricSource {
    #[must_use]
    pub fn new(field: &str, divisor: f64) -> Self {
        Self {
            field: field.to_owned(),
            divisor,
        }
    }
}

/// Engine-wide settings: formula safety limits and the context fields the
/// action system reads.
///
/// Every field has a default, so a config file only needs the keys it
/// changes. A `metric_fields` table given in a file replaces the default
/// table rather than merging with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_formula_length")]
    pub max_formula_length: usize,
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Per-unit metric name (lower-case) to quantity source.
    #[serde(default = "default_metric_fields")]
    pub metric_fields: BTreeMap<String, MetricSource>,
    /// Fields holding the current price, in priority order.
    #[serde(default = "default_price_fields")]
    pub price_fields: Vec<String>,
    #[serde(default = "default_condition_field")]
    pub condition_field: String,
    #[serde(default = "default_age_field")]
    pub age_field: String,
    /// Fields holding the brand, in priority order.
    #[serde(default = "default_brand_fields")]
    pub brand_fields: Vec<String>,
    /// Field holding the model, consulted before the brand.
    #[serde(default = "default_model_field")]
    pub model_field: Option<String>,
}

fn default_divisor() -> f64 {
    1.0
}

fn default_max_formula_length() -> usize {
    10_000
}

fn default_max_nesting_depth() -> usize {
    64
}

fn default_metric_fields() -> BTreeMap<String, MetricSource> {
    [
        ("per_gb", MetricSource::new("ram_gb", 1.0)),
        ("ram_gb", MetricSource::new("ram_gb", 1.0)),
        ("per_core", MetricSource::new("cpu.cores", 1.0)),
        ("per_thread", MetricSource::new("cpu.threads", 1.0)),
        (
            "per_tb",
            MetricSource::new("storage.primary.capacity_gb", 1000.0),
        ),
        (
            "primary_storage_tb",
            MetricSource::new("storage.primary.capacity_gb", 1000.0),
        ),
        (
            "secondary_storage_tb",
            MetricSource::new("storage.secondary.capacity_gb", 1000.0),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect()
}

fn default_price_fields() -> Vec<String> {
    vec!["adjusted_price".to_owned(), "price_usd".to_owned()]
}

fn default_condition_field() -> String {
    "condition".to_owned()
}

fn default_age_field() -> String {
    "age_years".to_owned()
}

fn default_brand_fields() -> Vec<String> {
    vec!["manufacturer".to_owned(), "brand".to_owned()]
}

fn default_model_field() -> Option<String> {
    Some("model".to_owned())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_formula_length: default_max_formula_length(),
            max_nesting_depth: default_max_nesting_depth(),
            metric_fields: default_metric_fields(),
            price_fields: default_price_fields(),
            condition_field: default_condition_field(),
            age_field: default_age_field(),
            brand_fields: default_brand_fields(),
            model_field: default_model_field(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range settings.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&input)
    }

    /// Check that limits are positive and metric divisors are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_formula_length == 0 {
            return Err(ConfigError::Invalid(
                "max_formula_length must be positive".to_owned(),
            ));
        }
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_nesting_depth must be positive".to_owned(),
            ));
        }
        for (metric, source) in &self.metric_fields {
            if !source.divisor.is_finite() || source.divisor == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "metric '{metric}' has an unusable divisor {}",
                    source.divisor
                )));
            }
        }
        Ok(())
    }

    /// Formula limits derived from this config.
    #[must_use]
    pub fn limits(&self) -> FormulaLimits {
        FormulaLimits {
            max_length: self.max_formula_length,
            max_depth: self.max_nesting_depth,
        }
    }

    /// Quantity source for a per-unit metric. Unknown metrics are read as a
    /// field path with no scaling.
    #[must_use]
    pub fn metric_source(&self, metric: &str) -> MetricSource {
        self.metric_fields
            .get(&metric.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| MetricSource::new(metric, 1.0))
    }
}
