//! Get-or-create registry of named instruments.
//!
//! Each instrument kind lives in its own pool behind its own lock, so a
//! counter and a histogram may share a subsystem and name. Scalar kinds
//! (counter, gauge, histogram/summary pair) tolerate backend failures and
//! always hand back a usable handle. Vector kinds report failures to the
//! caller, and the failure is pooled so the backend is asked only once.

use std::fmt;
use std::sync::Arc;

use prometheus::{CounterVec, HistogramVec};
use tracing::debug;

use crate::backend::{Backend, InstrumentKind, Registerer};
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::handle::{
    CounterHandle, CounterVecHandle, GaugeHandle, HistogramHandle, HistogramPair,
    HistogramVecHandle, SummaryVecHandle,
};
use crate::key::InstrumentKey;
use crate::pool::Pool;
use crate::summary::{Objectives, SummaryVec};

/// A pooled backend vector and the label names it was created with.
#[derive(Clone)]
struct LabeledVec<V> {
    labels: Arc<[String]>,
    vec: V,
}

impl<V> LabeledVec<V> {
    fn new(labels: &[&str], vec: V) -> Self {
        Self {
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            vec,
        }
    }

    /// Resolve the series for `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per label name. A mismatch
    /// is a wiring bug at the call site.
    fn bind<M, F>(&self, key: &InstrumentKey, values: &[&str], get: F) -> M
    where
        F: FnOnce(&V, &[&str]) -> prometheus::Result<M>,
    {
        if values.len() != self.labels.len() {
            panic!(
                "{key}: {} label values {values:?} given for {} label names {:?}",
                values.len(),
                self.labels.len(),
                self.labels
            );
        }
        get(&self.vec, values)
            .unwrap_or_else(|e| panic!("{key}: cannot bind label values {values:?}: {e}"))
    }
}

type VecEntry<V> = Result<LabeledVec<V>>;

/// Number of entries in each pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSizes {
    /// Plain counters.
    pub counters: usize,
    /// Counter vectors.
    pub counter_vecs: usize,
    /// Gauges.
    pub gauges: usize,
    /// Histogram/summary pairs.
    pub histograms: usize,
    /// Histogram vectors.
    pub histogram_vecs: usize,
    /// Summary vectors.
    pub summary_vecs: usize,
}

/// Registry that creates and registers each named instrument exactly once.
pub struct MetricsRegistry {
    backend: Backend,
    counters: Pool<CounterHandle>,
    counter_vecs: Pool<VecEntry<CounterVec>>,
    gauges: Pool<GaugeHandle>,
    histograms: Pool<HistogramHandle>,
    histogram_vecs: Pool<VecEntry<HistogramVec>>,
    summary_vecs: Pool<VecEntry<SummaryVec>>,
}

impl MetricsRegistry {
    /// Create a registry for `namespace` with default settings.
    pub fn new(namespace: impl Into<String>, registerer: Arc<dyn Registerer>) -> Self {
        Self::with_config(RegistryConfig::new(namespace), registerer)
    }

    /// Create a registry from a full configuration.
    pub fn with_config(config: RegistryConfig, registerer: Arc<dyn Registerer>) -> Self {
        Self {
            backend: Backend::new(config, registerer),
            counters: Pool::new(),
            counter_vecs: Pool::new(),
            gauges: Pool::new(),
            histograms: Pool::new(),
            histogram_vecs: Pool::new(),
            summary_vecs: Pool::new(),
        }
    }

    /// The namespace prefixed to every instrument name.
    pub fn namespace(&self) -> &str {
        &self.backend.config().namespace
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        self.backend.config()
    }

    /// Entry counts for every pool.
    pub fn pool_sizes(&self) -> PoolSizes {
        PoolSizes {
            counters: self.counters.len(),
            counter_vecs: self.counter_vecs.len(),
            gauges: self.gauges.len(),
            histograms: self.histograms.len(),
            histogram_vecs: self.histogram_vecs.len(),
            summary_vecs: self.summary_vecs.len(),
        }
    }

    // Counters

    /// Get or create the counter for `subsystem/name`.
    pub fn counter(&self, subsystem: &str, name: &str, help: &str) -> CounterHandle {
        let key = InstrumentKey::new(subsystem, name);
        self.counters.get_or_insert_with(&key, || {
            let counter = match self.backend.new_counter(&key, help) {
                Ok(counter) => {
                    self.backend
                        .register_lenient(&key, InstrumentKind::Counter, &counter);
                    Some(counter)
                }
                Err(e) => {
                    self.backend
                        .report_construction_failure(&key, InstrumentKind::Counter, e);
                    None
                }
            };
            CounterHandle::new(key.clone(), counter)
        })
    }

    /// Increment the counter for `subsystem/name` by 1.
    pub fn count(&self, subsystem: &str, name: &str, help: &str) -> CounterHandle {
        let counter = self.counter(subsystem, name, help);
        counter.inc();
        counter
    }

    /// Increment the counter for `subsystem/name` by `increment`.
    pub fn increase_counter(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        increment: f64,
    ) -> CounterHandle {
        let counter = self.counter(subsystem, name, help);
        counter.inc_by(increment);
        counter
    }

    /// Get or create the counter vector for `subsystem/name` and bind a handle
    /// to `values`.
    ///
    /// Label names are fixed by the first call for a key.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not match the pooled label names in length.
    pub fn counter_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
    ) -> Result<CounterVecHandle> {
        let key = InstrumentKey::new(subsystem, name);
        let entry = self.counter_vecs.get_or_insert_with(&key, || {
            let built = self.backend.new_counter_vec(&key, help, labels);
            let vec = self
                .backend
                .construct_strict(&key, InstrumentKind::CounterVec, built)?;
            self.backend
                .register_strict(&key, InstrumentKind::CounterVec, &vec)?;
            Ok(LabeledVec::new(labels, vec))
        })?;
        let counter = entry.bind(&key, values, |vec, values| {
            vec.get_metric_with_label_values(values)
        });
        Ok(CounterVecHandle::new(key, entry.labels, values, counter))
    }

    /// Increment the series of the counter vector for `subsystem/name`
    /// selected by `values`.
    pub fn count_labels(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
    ) -> Result<CounterVecHandle> {
        let counter = self.counter_vec(subsystem, name, help, labels, values)?;
        counter.inc();
        Ok(counter)
    }

    // Gauges

    /// Get or create the gauge for `subsystem/name`.
    pub fn gauge(&self, subsystem: &str, name: &str, help: &str) -> GaugeHandle {
        let key = InstrumentKey::new(subsystem, name);
        self.gauges.get_or_insert_with(&key, || {
            let gauge = match self.backend.new_gauge(&key, help) {
                Ok(gauge) => {
                    self.backend
                        .register_lenient(&key, InstrumentKind::Gauge, &gauge);
                    Some(gauge)
                }
                Err(e) => {
                    self.backend
                        .report_construction_failure(&key, InstrumentKind::Gauge, e);
                    None
                }
            };
            GaugeHandle::new(key.clone(), gauge)
        })
    }

    /// Get or create the gauge for `subsystem/name` and set it to `value`.
    pub fn set_gauge(&self, value: f64, subsystem: &str, name: &str, help: &str) -> GaugeHandle {
        let gauge = self.gauge(subsystem, name, help);
        gauge.set(value);
        gauge
    }

    // Histograms

    /// Get or create the histogram/summary pair for `subsystem/name`.
    ///
    /// Both halves are built under one write lock: either both exist or the
    /// handle is detached.
    pub fn histogram(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        buckets: Option<&[f64]>,
    ) -> HistogramHandle {
        let key = InstrumentKey::new(subsystem, name);
        self.histograms.get_or_insert_with(&key, || {
            let config = self.backend.config();
            let buckets = buckets.unwrap_or(config.default_buckets.as_slice());
            let built = self
                .backend
                .new_histogram(&key, help, buckets)
                .map_err(|e| (InstrumentKind::Histogram, e))
                .and_then(|histogram| {
                    self.backend
                        .new_summary(&key, help, &config.default_objectives)
                        .map(|summary| HistogramPair { histogram, summary })
                        .map_err(|e| (InstrumentKind::Summary, e))
                });

            let pair = match built {
                Ok(pair) => {
                    self.backend
                        .register_lenient(&key, InstrumentKind::Summary, &pair.summary);
                    self.backend
                        .register_lenient(&key, InstrumentKind::Histogram, &pair.histogram);
                    Some(pair)
                }
                Err((kind, e)) => {
                    self.backend.report_construction_failure(&key, kind, e);
                    None
                }
            };
            HistogramHandle::new(key.clone(), pair)
        })
    }

    /// Get or create the histogram for `subsystem/name` with default buckets.
    pub fn add_histogram(&self, subsystem: &str, name: &str, help: &str) -> HistogramHandle {
        self.histogram(subsystem, name, help, None)
    }

    /// Get or create the histogram for `subsystem/name` with `buckets`.
    ///
    /// Buckets only apply on creation; an existing histogram keeps its own.
    pub fn add_histogram_with_buckets(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        buckets: &[f64],
    ) -> HistogramHandle {
        self.histogram(subsystem, name, help, Some(buckets))
    }

    /// Get or create the histogram vector for `subsystem/name` and bind a
    /// handle to `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not match the pooled label names in length.
    pub fn histogram_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        buckets: Option<&[f64]>,
    ) -> Result<HistogramVecHandle> {
        let key = InstrumentKey::new(subsystem, name);
        let entry = self.histogram_vecs.get_or_insert_with(&key, || {
            let buckets = buckets.unwrap_or(self.backend.config().default_buckets.as_slice());
            let built = self.backend.new_histogram_vec(&key, help, labels, buckets);
            let vec = self
                .backend
                .construct_strict(&key, InstrumentKind::HistogramVec, built)?;
            self.backend
                .register_strict(&key, InstrumentKind::HistogramVec, &vec)?;
            Ok(LabeledVec::new(labels, vec))
        })?;
        let histogram = entry.bind(&key, values, |vec, values| {
            vec.get_metric_with_label_values(values)
        });
        Ok(HistogramVecHandle::new(key, entry.labels, values, histogram))
    }

    /// Histogram vector with default buckets.
    pub fn add_histogram_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
    ) -> Result<HistogramVecHandle> {
        self.histogram_vec(subsystem, name, help, labels, values, None)
    }

    /// Histogram vector with `buckets`, applied only on creation.
    pub fn add_histogram_vec_with_buckets(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        buckets: &[f64],
    ) -> Result<HistogramVecHandle> {
        self.histogram_vec(subsystem, name, help, labels, values, Some(buckets))
    }

    // Summaries

    /// Get or create the summary vector for `subsystem/name` and bind a handle
    /// to `values`. The backend name carries a `_summary` suffix.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not match the pooled label names in length.
    pub fn summary_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        objectives: Option<&Objectives>,
    ) -> Result<SummaryVecHandle> {
        let key = InstrumentKey::new(subsystem, name);
        let entry = self.summary_vecs.get_or_insert_with(&key, || {
            let objectives = objectives.unwrap_or(&self.backend.config().default_objectives);
            let built = self.backend.new_summary_vec(&key, help, labels, objectives);
            let vec = self
                .backend
                .construct_strict(&key, InstrumentKind::SummaryVec, built)?;
            self.backend
                .register_strict(&key, InstrumentKind::SummaryVec, &vec)?;
            Ok(LabeledVec::new(labels, vec))
        })?;
        let summary = entry.bind(&key, values, |vec, values| {
            vec.get_metric_with_label_values(values)
        });
        Ok(SummaryVecHandle::new(key, entry.labels, values, summary))
    }

    /// Summary vector with default objectives.
    pub fn add_summary_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
    ) -> Result<SummaryVecHandle> {
        self.summary_vec(subsystem, name, help, labels, values, None)
    }

    /// Summary vector with `objectives`, applied only on creation.
    pub fn add_summary_vec_with_objectives(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        objectives: &Objectives,
    ) -> Result<SummaryVecHandle> {
        self.summary_vec(subsystem, name, help, labels, values, Some(objectives))
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("namespace", &self.namespace())
            .field("pools", &self.pool_sizes())
            .finish()
    }
}

/// Shared metrics registry handle.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Create a new shared metrics registry.
pub fn new_shared_registry(
    namespace: impl Into<String>,
    registerer: Arc<dyn Registerer>,
) -> SharedMetricsRegistry {
    let registry = Arc::new(MetricsRegistry::new(namespace, registerer));
    debug!(namespace = registry.namespace(), "metrics registry created");
    registry
}
