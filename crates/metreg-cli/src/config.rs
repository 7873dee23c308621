//! CLI configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use metreg_core::summary::{DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE};
use metreg_core::RegistryConfig;

/// Default namespace for instruments declared by the CLI.
pub const DEFAULT_NAMESPACE: &str = "metreg";

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Settings for the instrument registry.
    pub registry: RegistryConfig,

    /// Instrument manifest to load. None prints an empty exposition.
    pub manifest: Option<PathBuf>,
}

impl CliConfig {
    /// Create a configuration for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            registry: RegistryConfig::new(namespace),
            manifest: None,
        }
    }

    /// Set the manifest path.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    /// Set the registry configuration.
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Command-line arguments for the CLI.
#[derive(Parser, Debug)]
#[command(name = "metreg")]
#[command(version, about = "Declare metric instruments and print their exposition", long_about = None)]
pub struct Args {
    /// Namespace prefixed to every instrument name.
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Path to a JSON instrument manifest.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Summary sliding window in seconds.
    #[arg(long, default_value_t = DEFAULT_MAX_AGE.as_secs())]
    pub summary_max_age: u64,

    /// Number of buckets the summary window rotates through.
    #[arg(long, default_value_t = DEFAULT_AGE_BUCKETS)]
    pub summary_age_buckets: u32,
}

impl Args {
    /// Convert command-line arguments to CLI configuration.
    pub fn into_config(self) -> CliConfig {
        let registry = RegistryConfig::new(self.namespace)
            .with_summary_max_age(Duration::from_secs(self.summary_max_age))
            .with_summary_age_buckets(self.summary_age_buckets);

        CliConfig {
            registry,
            manifest: self.manifest,
        }
    }
}
