//! Registry configuration.

use std::time::Duration;

use crate::summary::{default_objectives, Objectives, DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE};

/// Histogram buckets used when a caller does not supply any, in seconds.
pub fn default_buckets() -> Vec<f64> {
    prometheus::DEFAULT_BUCKETS.to_vec()
}

/// Configuration for a [`MetricsRegistry`](crate::MetricsRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Prefix applied to every instrument name.
    pub namespace: String,

    /// Buckets for histograms created without explicit buckets.
    pub default_buckets: Vec<f64>,

    /// Objectives for paired summaries and summary vectors created without
    /// explicit objectives.
    pub default_objectives: Objectives,

    /// Length of the sliding window summaries compute quantiles over.
    pub summary_max_age: Duration,

    /// Number of buckets the summary window rotates through.
    pub summary_age_buckets: u32,
}

impl RegistryConfig {
    /// Create a configuration with the given namespace and default settings.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            default_buckets: default_buckets(),
            default_objectives: default_objectives(),
            summary_max_age: DEFAULT_MAX_AGE,
            summary_age_buckets: DEFAULT_AGE_BUCKETS,
        }
    }

    /// Set the default histogram buckets.
    pub fn with_default_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.default_buckets = buckets;
        self
    }

    /// Set the default summary objectives.
    pub fn with_default_objectives(mut self, objectives: Objectives) -> Self {
        self.default_objectives = objectives;
        self
    }

    /// Set the summary window length.
    pub fn with_summary_max_age(mut self, max_age: Duration) -> Self {
        self.summary_max_age = max_age;
        self
    }

    /// Set the number of summary window buckets.
    pub fn with_summary_age_buckets(mut self, age_buckets: u32) -> Self {
        self.summary_age_buckets = age_buckets;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new("")
    }
}
