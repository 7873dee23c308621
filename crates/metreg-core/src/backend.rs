//! Boundary with the Prometheus backend.
//!
//! Construction of backend instruments and their registration with a
//! collector registry. The registry to register with is injected through
//! [`Registerer`]; nothing here touches a process-wide default registry.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts};
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::key::InstrumentKey;
use crate::summary::{Objectives, Summary, SummaryOpts, SummaryVec};

/// Suffix appended to the name of every summary the registry creates.
pub const SUMMARY_SUFFIX: &str = "_summary";

/// Something collectors can be registered with.
pub trait Registerer: Send + Sync {
    /// Register a collector. Registering a name twice is an error.
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()>;
}

impl Registerer for prometheus::Registry {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()> {
        prometheus::Registry::register(self, collector)
    }
}

/// Instrument kinds, one per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Plain counter.
    Counter,
    /// Labelled counter vector.
    CounterVec,
    /// Plain gauge.
    Gauge,
    /// Histogram half of a histogram/summary pair.
    Histogram,
    /// Summary half of a histogram/summary pair.
    Summary,
    /// Labelled histogram vector.
    HistogramVec,
    /// Labelled summary vector.
    SummaryVec,
}

impl InstrumentKind {
    /// Short name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::CounterVec => "counter_vec",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::Summary => "summary",
            InstrumentKind::HistogramVec => "histogram_vec",
            InstrumentKind::SummaryVec => "summary_vec",
        }
    }

    /// Error code logged when registering an instrument of this kind fails.
    pub fn registration_failed_code(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "MetricsCounterRegistrationFailed",
            InstrumentKind::CounterVec => "MetricsCounterLabelRegistrationFailed",
            InstrumentKind::Gauge => "MetricsGaugeRegistrationFailed",
            InstrumentKind::Histogram => "MetricsHistogramRegistrationFailed",
            InstrumentKind::Summary => "MetricsSummaryRegistrationFailed",
            InstrumentKind::HistogramVec => "MetricsHistogramVecRegistrationFailed",
            InstrumentKind::SummaryVec => "MetricsSummaryVecRegistrationFailed",
        }
    }

    /// Error code logged when building an instrument of this kind fails.
    pub fn construction_failed_code(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "MetricsCounterConstructionFailed",
            InstrumentKind::CounterVec => "MetricsCounterLabelConstructionFailed",
            InstrumentKind::Gauge => "MetricsGaugeConstructionFailed",
            InstrumentKind::Histogram => "MetricsHistogramConstructionFailed",
            InstrumentKind::Summary => "MetricsSummaryConstructionFailed",
            InstrumentKind::HistogramVec => "MetricsHistogramVecConstructionFailed",
            InstrumentKind::SummaryVec => "MetricsSummaryVecConstructionFailed",
        }
    }
}

/// Builds backend instruments under a namespace and registers them.
pub(crate) struct Backend {
    config: RegistryConfig,
    registerer: Arc<dyn Registerer>,
}

impl Backend {
    pub(crate) fn new(config: RegistryConfig, registerer: Arc<dyn Registerer>) -> Self {
        Self { config, registerer }
    }

    pub(crate) fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn opts(&self, key: &InstrumentKey, name: &str, help: &str) -> Opts {
        // The backend rejects empty help text.
        let help = if help.is_empty() { key.as_str() } else { help };
        Opts::new(name, help)
            .namespace(self.config.namespace.clone())
            .subsystem(key.subsystem())
    }

    fn summary_opts(&self, key: &InstrumentKey, help: &str, objectives: &Objectives) -> SummaryOpts {
        let name = format!("{}{SUMMARY_SUFFIX}", key.name());
        SummaryOpts {
            common_opts: self.opts(key, &name, help),
            objectives: objectives.clone(),
            max_age: self.config.summary_max_age,
            age_buckets: self.config.summary_age_buckets,
        }
    }

    pub(crate) fn new_counter(&self, key: &InstrumentKey, help: &str) -> prometheus::Result<Counter> {
        Counter::with_opts(self.opts(key, key.name(), help))
    }

    pub(crate) fn new_gauge(&self, key: &InstrumentKey, help: &str) -> prometheus::Result<Gauge> {
        Gauge::with_opts(self.opts(key, key.name(), help))
    }

    pub(crate) fn new_histogram(
        &self,
        key: &InstrumentKey,
        help: &str,
        buckets: &[f64],
    ) -> prometheus::Result<Histogram> {
        Histogram::with_opts(
            HistogramOpts::from(self.opts(key, key.name(), help)).buckets(buckets.to_vec()),
        )
    }

    pub(crate) fn new_summary(
        &self,
        key: &InstrumentKey,
        help: &str,
        objectives: &Objectives,
    ) -> prometheus::Result<Summary> {
        Summary::with_opts(self.summary_opts(key, help, objectives))
    }

    pub(crate) fn new_counter_vec(
        &self,
        key: &InstrumentKey,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<CounterVec> {
        CounterVec::new(self.opts(key, key.name(), help), labels)
    }

    pub(crate) fn new_histogram_vec(
        &self,
        key: &InstrumentKey,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> prometheus::Result<HistogramVec> {
        HistogramVec::new(
            HistogramOpts::from(self.opts(key, key.name(), help)).buckets(buckets.to_vec()),
            labels,
        )
    }

    pub(crate) fn new_summary_vec(
        &self,
        key: &InstrumentKey,
        help: &str,
        labels: &[&str],
        objectives: &Objectives,
    ) -> prometheus::Result<SummaryVec> {
        SummaryVec::new(self.summary_opts(key, help, objectives), labels)
    }

    /// Log a construction failure on the lenient path.
    pub(crate) fn report_construction_failure(
        &self,
        key: &InstrumentKey,
        kind: InstrumentKind,
        err: prometheus::Error,
    ) {
        let err = Error::from_backend(key, err);
        warn!(
            code = kind.construction_failed_code(),
            key = %key,
            kind = kind.as_str(),
            error = %err,
            "instrument construction failed, handle is detached"
        );
    }

    /// Register a collector, logging and swallowing any failure.
    pub(crate) fn register_lenient<C>(&self, key: &InstrumentKey, kind: InstrumentKind, collector: &C)
    where
        C: Collector + Clone + 'static,
    {
        match self.registerer.register(Box::new(collector.clone())) {
            Ok(()) => debug!(key = %key, kind = kind.as_str(), "instrument registered"),
            Err(e) => {
                let err = Error::from_backend(key, e);
                warn!(
                    code = kind.registration_failed_code(),
                    key = %key,
                    kind = kind.as_str(),
                    error = %err,
                    "instrument registration failed, recording to an unregistered instrument"
                );
            }
        }
    }

    /// Pass a freshly built vector through, logging and classifying a failure.
    pub(crate) fn construct_strict<T>(
        &self,
        key: &InstrumentKey,
        kind: InstrumentKind,
        built: prometheus::Result<T>,
    ) -> Result<T> {
        built.map_err(|e| {
            let err = Error::from_backend(key, e);
            warn!(
                code = kind.construction_failed_code(),
                key = %key,
                kind = kind.as_str(),
                error = %err,
                "instrument construction failed"
            );
            err
        })
    }

    /// Register a collector, logging any failure and returning it to the caller.
    pub(crate) fn register_strict<C>(
        &self,
        key: &InstrumentKey,
        kind: InstrumentKind,
        collector: &C,
    ) -> Result<()>
    where
        C: Collector + Clone + 'static,
    {
        if let Err(e) = self.registerer.register(Box::new(collector.clone())) {
            let err = Error::from_backend(key, e);
            warn!(
                code = kind.registration_failed_code(),
                key = %key,
                kind = kind.as_str(),
                error = %err,
                "instrument registration failed"
            );
            return Err(err);
        }
        debug!(key = %key, kind = kind.as_str(), "instrument registered");
        Ok(())
    }
}
