//! metreg CLI library.
//!
//! Wires a [`MetricsRegistry`] to a fresh Prometheus registry, applies an
//! optional instrument manifest and renders the text exposition.

pub mod config;
pub mod error;
pub mod manifest;

use std::io::Write;
use std::sync::Arc;

use metreg_core::MetricsRegistry;
use prometheus::{Encoder, TextEncoder};
use tracing::info;

pub use config::{Args, CliConfig};
pub use error::{Error, Result};
pub use manifest::{InstrumentSpec, Manifest};

/// Build the registry described by `config`, apply its manifest and write
/// the exposition of every registered family to `out`.
pub fn run(config: CliConfig, out: &mut impl Write) -> Result<()> {
    let manifest = match &config.manifest {
        Some(path) => {
            let manifest = Manifest::load(path)?;
            info!(path = %path.display(), instruments = manifest.instruments.len(), "manifest loaded");
            Some(manifest)
        }
        None => None,
    };

    let backend = prometheus::Registry::new();
    let registry = MetricsRegistry::with_config(config.registry, Arc::new(backend.clone()));

    if let Some(manifest) = manifest {
        let applied = manifest.apply(&registry)?;
        info!(applied, pools = ?registry.pool_sizes(), "instruments declared");
    }

    let families = backend.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    out.write_all(&buffer)?;
    Ok(())
}
