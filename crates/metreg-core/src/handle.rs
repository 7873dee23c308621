//! Recording handles returned by the registry.
//!
//! Handles are cheap to clone and never touch the registry's locks; every
//! recording call goes straight to the backend instrument.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::{Counter, Gauge, Histogram};

use crate::key::InstrumentKey;
use crate::summary::{Summary, SummaryChild};

/// Elapsed nanoseconds rounded down to a multiple of `unit`. A zero unit
/// leaves the nanoseconds as they are.
fn truncated_nanos(elapsed: Duration, unit: Duration) -> f64 {
    let unit_nanos = unit.as_nanos().max(1);
    (elapsed.as_nanos() / unit_nanos * unit_nanos) as f64
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Handle to a counter.
///
/// A handle whose backend instrument could not be built is detached: its
/// recording calls do nothing.
#[derive(Clone)]
pub struct CounterHandle {
    key: InstrumentKey,
    counter: Option<Counter>,
}

impl CounterHandle {
    pub(crate) fn new(key: InstrumentKey, counter: Option<Counter>) -> Self {
        Self { key, counter }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Increment by 1.
    pub fn inc(&self) {
        if let Some(counter) = &self.counter {
            counter.inc();
        }
    }

    /// Increment by `n`. Negative and NaN increments are ignored.
    pub fn inc_by(&self, n: f64) {
        match &self.counter {
            Some(counter) if n >= 0.0 => counter.inc_by(n),
            _ => {}
        }
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.counter.as_ref().map_or(0.0, Counter::get)
    }

    /// True if the handle has no backend instrument.
    pub fn is_detached(&self) -> bool {
        self.counter.is_none()
    }
}

impl fmt::Debug for CounterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterHandle")
            .field("key", &self.key)
            .field("value", &self.value())
            .finish()
    }
}

/// Handle to a gauge.
#[derive(Clone)]
pub struct GaugeHandle {
    key: InstrumentKey,
    gauge: Option<Gauge>,
}

impl GaugeHandle {
    pub(crate) fn new(key: InstrumentKey, gauge: Option<Gauge>) -> Self {
        Self { key, gauge }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Overwrite the value.
    pub fn set(&self, value: f64) {
        if let Some(gauge) = &self.gauge {
            gauge.set(value);
        }
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.gauge.as_ref().map_or(0.0, Gauge::get)
    }

    /// True if the handle has no backend instrument.
    pub fn is_detached(&self) -> bool {
        self.gauge.is_none()
    }
}

impl fmt::Debug for GaugeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeHandle")
            .field("key", &self.key)
            .field("value", &self.value())
            .finish()
    }
}

/// A histogram and the summary that shadows it.
#[derive(Clone)]
pub(crate) struct HistogramPair {
    pub(crate) histogram: Histogram,
    pub(crate) summary: Summary,
}

/// Handle to a histogram with its paired summary.
///
/// Timings go to the histogram in seconds (or truncated nanoseconds) and to
/// the summary in milliseconds. Existing dashboards read both units, so the
/// split must stay as it is.
#[derive(Clone)]
pub struct HistogramHandle {
    key: InstrumentKey,
    pair: Option<HistogramPair>,
}

impl HistogramHandle {
    pub(crate) fn new(key: InstrumentKey, pair: Option<HistogramPair>) -> Self {
        Self { key, pair }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Record `value` into the histogram only.
    pub fn observe(&self, value: f64) {
        if let Some(pair) = &self.pair {
            pair.histogram.observe(value);
        }
    }

    /// Record the time since `start`: seconds into the histogram,
    /// milliseconds into the summary.
    pub fn record_elapsed_since(&self, start: Instant) {
        let Some(pair) = &self.pair else {
            return;
        };
        let elapsed = start.elapsed();
        pair.histogram.observe(elapsed.as_secs_f64());
        pair.summary.observe(millis(elapsed));
    }

    /// Record the time since `start`: nanoseconds truncated to a multiple of
    /// `unit` into the histogram, milliseconds into the summary.
    pub fn record_duration(&self, start: Instant, unit: Duration) {
        let Some(pair) = &self.pair else {
            return;
        };
        let elapsed = start.elapsed();
        pair.histogram.observe(truncated_nanos(elapsed, unit));
        pair.summary.observe(millis(elapsed));
    }

    /// The backend histogram, unless the handle is detached.
    pub fn histogram(&self) -> Option<&Histogram> {
        self.pair.as_ref().map(|pair| &pair.histogram)
    }

    /// The paired summary, unless the handle is detached.
    pub fn summary(&self) -> Option<&Summary> {
        self.pair.as_ref().map(|pair| &pair.summary)
    }

    /// True if the handle has no backend instruments.
    pub fn is_detached(&self) -> bool {
        self.pair.is_none()
    }
}

impl fmt::Debug for HistogramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramHandle")
            .field("key", &self.key)
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// Label names and the values a vector handle is bound to.
#[derive(Clone)]
struct Binding {
    labels: Arc<[String]>,
    values: Arc<[String]>,
}

impl Binding {
    fn new(labels: Arc<[String]>, values: &[&str]) -> Self {
        Self {
            labels,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.labels.iter().zip(self.values.iter()))
            .finish()
    }
}

/// Handle to one label combination of a counter vector.
#[derive(Clone)]
pub struct CounterVecHandle {
    key: InstrumentKey,
    binding: Binding,
    counter: Counter,
}

impl CounterVecHandle {
    pub(crate) fn new(key: InstrumentKey, labels: Arc<[String]>, values: &[&str], counter: Counter) -> Self {
        Self {
            key,
            binding: Binding::new(labels, values),
            counter,
        }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Label names of the vector.
    pub fn labels(&self) -> &[String] {
        &self.binding.labels
    }

    /// Label values this handle records under.
    pub fn label_values(&self) -> &[String] {
        &self.binding.values
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.counter.inc();
    }

    /// Increment by `n`. Negative and NaN increments are ignored.
    pub fn inc_by(&self, n: f64) {
        if n >= 0.0 {
            self.counter.inc_by(n);
        }
    }

    /// Current value of the bound series.
    pub fn value(&self) -> f64 {
        self.counter.get()
    }
}

impl fmt::Debug for CounterVecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterVecHandle")
            .field("key", &self.key)
            .field("labels", &self.binding)
            .finish()
    }
}

/// Handle to one label combination of a histogram vector.
#[derive(Clone)]
pub struct HistogramVecHandle {
    key: InstrumentKey,
    binding: Binding,
    histogram: Histogram,
}

impl HistogramVecHandle {
    pub(crate) fn new(
        key: InstrumentKey,
        labels: Arc<[String]>,
        values: &[&str],
        histogram: Histogram,
    ) -> Self {
        Self {
            key,
            binding: Binding::new(labels, values),
            histogram,
        }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Label names of the vector.
    pub fn labels(&self) -> &[String] {
        &self.binding.labels
    }

    /// Label values this handle records under.
    pub fn label_values(&self) -> &[String] {
        &self.binding.values
    }

    /// Record `value`.
    pub fn observe(&self, value: f64) {
        self.histogram.observe(value);
    }

    /// Record the time since `start` in seconds.
    pub fn record_elapsed_since(&self, start: Instant) {
        self.observe(start.elapsed().as_secs_f64());
    }

    /// Record the time since `start` in nanoseconds, truncated to a
    /// multiple of `unit`.
    pub fn record_duration(&self, start: Instant, unit: Duration) {
        self.observe(truncated_nanos(start.elapsed(), unit));
    }

    /// The bound backend series.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }
}

impl fmt::Debug for HistogramVecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramVecHandle")
            .field("key", &self.key)
            .field("labels", &self.binding)
            .finish()
    }
}

/// Handle to one label combination of a summary vector.
#[derive(Clone)]
pub struct SummaryVecHandle {
    key: InstrumentKey,
    binding: Binding,
    summary: SummaryChild,
}

impl SummaryVecHandle {
    pub(crate) fn new(
        key: InstrumentKey,
        labels: Arc<[String]>,
        values: &[&str],
        summary: SummaryChild,
    ) -> Self {
        Self {
            key,
            binding: Binding::new(labels, values),
            summary,
        }
    }

    /// The instrument key.
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    /// Label names of the vector.
    pub fn labels(&self) -> &[String] {
        &self.binding.labels
    }

    /// Label values this handle records under.
    pub fn label_values(&self) -> &[String] {
        &self.binding.values
    }

    /// Record `value`.
    pub fn observe(&self, value: f64) {
        self.summary.observe(value);
    }

    /// Record the time since `start` in milliseconds.
    pub fn record_elapsed_since(&self, start: Instant) {
        self.observe(millis(start.elapsed()));
    }

    /// The bound summary series.
    pub fn summary(&self) -> &SummaryChild {
        &self.summary
    }
}

impl fmt::Debug for SummaryVecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryVecHandle")
            .field("key", &self.key)
            .field("labels", &self.binding)
            .finish()
    }
}
