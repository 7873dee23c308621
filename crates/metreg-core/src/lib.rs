//! metreg core - get-or-create registry of named Prometheus instruments.
//!
//! Callers ask for an instrument by subsystem and name; the first request
//! builds and registers it, later requests get the same instrument back.
//! Registries are independent of each other and of any process-wide
//! collector registry: the target is injected as a [`Registerer`].

pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod key;
mod pool;
pub mod registry;
pub mod summary;

pub use backend::{InstrumentKind, Registerer, SUMMARY_SUFFIX};
pub use config::{default_buckets, RegistryConfig};
pub use error::{Error, Result};
pub use handle::{
    CounterHandle, CounterVecHandle, GaugeHandle, HistogramHandle, HistogramVecHandle,
    SummaryVecHandle,
};
pub use key::{InstrumentKey, KEY_SEPARATOR};
pub use registry::{new_shared_registry, MetricsRegistry, PoolSizes, SharedMetricsRegistry};

// Summary exports
pub use summary::{
    default_objectives, Objective, Objectives, Summary, SummaryChild, SummaryOpts, SummaryVec,
};

/// Re-export of the backend crate.
pub use prometheus;
