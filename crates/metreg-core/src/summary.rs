//! Quantile summaries for the Prometheus backend.
//!
//! The `prometheus` crate has no summary type, so this module provides one as
//! a [`Collector`]. Quantiles are estimated over a sliding time window split
//! into age buckets; each bucket keeps a bounded uniform sample of what it
//! saw. `_sum` and `_count` are cumulative for the life of the series.
//!
//! Each summary collects into a single `summary` family, rendered by the text
//! encoder as `quantile`-labelled samples followed by `_sum` and `_count`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use prometheus::core::{Collector, Desc, Describer};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType, Quantile};
use prometheus::Opts;
use rand::Rng;

use crate::error::{Error, Result};

/// Label the encoder puts the quantile under; reserved on summaries.
pub const QUANTILE_LABEL: &str = "quantile";

/// Default length of the sliding quantile window.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Default number of buckets the window rotates through.
pub const DEFAULT_AGE_BUCKETS: u32 = 5;

const MIN_SAMPLES_PER_BUCKET: usize = 128;
const MAX_SAMPLES_PER_BUCKET: usize = 2048;

/// A target quantile and its tolerated rank error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective {
    /// Quantile in `[0, 1]`.
    pub quantile: f64,
    /// Absolute error tolerance on the quantile rank.
    pub error: f64,
}

/// An ordered set of quantile objectives.
#[derive(Debug, Clone, PartialEq)]
pub struct Objectives(Vec<Objective>);

impl Objectives {
    /// Build objectives from `(quantile, error)` pairs.
    ///
    /// Pairs are sorted by quantile; a repeated quantile keeps the last
    /// tolerance given for it.
    pub fn new(pairs: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let mut objectives: Vec<Objective> = Vec::new();
        for (quantile, error) in pairs {
            if !(0.0..=1.0).contains(&quantile) {
                return Err(Error::InvalidObjectives(format!(
                    "quantile {quantile} is outside [0, 1]"
                )));
            }
            if !(0.0..=1.0).contains(&error) {
                return Err(Error::InvalidObjectives(format!(
                    "error tolerance {error} for quantile {quantile} is outside [0, 1]"
                )));
            }
            match objectives.iter_mut().find(|o| o.quantile == quantile) {
                Some(existing) => existing.error = error,
                None => objectives.push(Objective { quantile, error }),
            }
        }
        objectives.sort_by(|a, b| a.quantile.total_cmp(&b.quantile));
        Ok(Self(objectives))
    }

    /// Objectives that track no quantiles; only `_sum` and `_count` are kept.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Iterate in ascending quantile order.
    pub fn iter(&self) -> impl Iterator<Item = &Objective> {
        self.0.iter()
    }

    /// Number of objectives.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no quantiles are tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn tightest_error(&self) -> Option<f64> {
        self.0.iter().map(|o| o.error).reduce(f64::min)
    }

    /// Samples each age bucket keeps, derived from the tightest tolerance.
    fn samples_per_bucket(&self) -> usize {
        match self.tightest_error() {
            None => 0,
            Some(error) if error > 0.0 => {
                ((1.0 / error).ceil() as usize).clamp(MIN_SAMPLES_PER_BUCKET, MAX_SAMPLES_PER_BUCKET)
            }
            Some(_) => MAX_SAMPLES_PER_BUCKET,
        }
    }
}

impl Default for Objectives {
    fn default() -> Self {
        default_objectives()
    }
}

/// The quantiles every summary tracks unless told otherwise:
/// p50, p75, p90, p95, p99 and p99.9.
pub fn default_objectives() -> Objectives {
    Objectives(vec![
        Objective { quantile: 0.5, error: 0.05 },
        Objective { quantile: 0.75, error: 0.025 },
        Objective { quantile: 0.9, error: 0.01 },
        Objective { quantile: 0.95, error: 0.005 },
        Objective { quantile: 0.99, error: 0.001 },
        Objective { quantile: 0.999, error: 0.0001 },
    ])
}

/// Options for building a [`Summary`] or [`SummaryVec`].
#[derive(Debug, Clone)]
pub struct SummaryOpts {
    /// Name, help, namespace, subsystem and constant labels.
    pub common_opts: Opts,
    /// Quantiles to track.
    pub objectives: Objectives,
    /// How far back quantiles look.
    pub max_age: Duration,
    /// Buckets the window is split into.
    pub age_buckets: u32,
}

impl SummaryOpts {
    /// Options with default objectives and window.
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, help: S2) -> Self {
        Self {
            common_opts: Opts::new(name, help),
            objectives: default_objectives(),
            max_age: DEFAULT_MAX_AGE,
            age_buckets: DEFAULT_AGE_BUCKETS,
        }
    }

    /// Set the namespace.
    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.common_opts.namespace = namespace.into();
        self
    }

    /// Set the subsystem.
    pub fn subsystem<S: Into<String>>(mut self, subsystem: S) -> Self {
        self.common_opts.subsystem = subsystem.into();
        self
    }

    /// Set the objectives.
    pub fn objectives(mut self, objectives: Objectives) -> Self {
        self.objectives = objectives;
        self
    }

    /// Set the window length.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the number of window buckets.
    pub fn age_buckets(mut self, age_buckets: u32) -> Self {
        self.age_buckets = age_buckets;
        self
    }

}

/// Shape of the sliding window every stream of a summary shares.
#[derive(Debug, Clone, Copy)]
struct WindowSpec {
    max_age: Duration,
    span: Duration,
    buckets: usize,
    capacity: usize,
}

#[derive(Default)]
struct Reservoir {
    samples: Vec<f64>,
    seen: u64,
}

impl Reservoir {
    fn push(&mut self, value: f64, capacity: usize) {
        if capacity == 0 {
            return;
        }
        self.seen += 1;
        if self.samples.len() < capacity {
            self.samples.push(value);
            return;
        }
        let slot = rand::thread_rng().gen_range(0..self.seen);
        if let Ok(slot) = usize::try_from(slot) {
            if slot < capacity {
                self.samples[slot] = value;
            }
        }
    }

    /// Samples paired with the number of observations each one stands for.
    fn weighted(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let weight = self.seen as f64 / self.samples.len().max(1) as f64;
        self.samples.iter().map(move |&value| (value, weight))
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.seen = 0;
    }
}

/// Windowed sample store behind one label combination.
struct Stream {
    spec: WindowSpec,
    buckets: Vec<Reservoir>,
    head: usize,
    head_expires: Instant,
}

impl Stream {
    fn new(spec: WindowSpec, now: Instant) -> Self {
        Self {
            spec,
            buckets: (0..spec.buckets).map(|_| Reservoir::default()).collect(),
            head: 0,
            head_expires: now + spec.span,
        }
    }

    fn rotate(&mut self, now: Instant) {
        if now < self.head_expires {
            return;
        }
        if now.duration_since(self.head_expires) >= self.spec.max_age {
            self.buckets.iter_mut().for_each(Reservoir::clear);
            self.head_expires = now + self.spec.span;
            return;
        }
        while now >= self.head_expires {
            self.head = (self.head + 1) % self.buckets.len();
            self.buckets[self.head].clear();
            self.head_expires += self.spec.span;
        }
    }

    fn observe(&mut self, value: f64, now: Instant) {
        self.rotate(now);
        let capacity = self.spec.capacity;
        self.buckets[self.head].push(value, capacity);
    }

    /// Estimates over the live buckets. A bucket that saw more observations
    /// than it kept weighs its samples up so busy buckets count for more.
    fn quantiles(&mut self, objectives: &Objectives, now: Instant) -> Vec<f64> {
        self.rotate(now);
        let mut merged: Vec<(f64, f64)> = self.buckets.iter().flat_map(|b| b.weighted()).collect();
        merged.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        objectives
            .iter()
            .map(|o| weighted_rank(&merged, o.quantile))
            .collect()
    }
}

/// Nearest-rank quantile over `(value, weight)` pairs sorted by value.
fn weighted_rank(sorted: &[(f64, f64)], quantile: f64) -> f64 {
    let Some(&(last, _)) = sorted.last() else {
        return f64::NAN;
    };
    let target = quantile * sorted.iter().map(|&(_, weight)| weight).sum::<f64>();
    let mut cumulative = 0.0;
    for &(value, weight) in sorted {
        cumulative += weight;
        if cumulative >= target {
            return value;
        }
    }
    last
}

/// Running totals and window for one label combination.
struct SeriesState {
    stream: Stream,
    sum: f64,
    count: u64,
}

struct Series {
    label_pairs: Vec<LabelPair>,
    state: Mutex<SeriesState>,
}

impl Series {
    fn new(label_pairs: Vec<LabelPair>, spec: WindowSpec) -> Self {
        Self {
            label_pairs,
            state: Mutex::new(SeriesState {
                stream: Stream::new(spec, Instant::now()),
                sum: 0.0,
                count: 0,
            }),
        }
    }

    fn metric(&self, objectives: &Objectives, now: Instant) -> Metric {
        let mut state = self.state.lock();
        let estimates = state.stream.quantiles(objectives, now);
        let quantiles = objectives
            .iter()
            .zip(estimates)
            .map(|(objective, estimate)| {
                let mut quantile = Quantile::default();
                quantile.set_quantile(objective.quantile);
                quantile.set_value(estimate);
                quantile
            })
            .collect();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(state.count);
        summary.set_sample_sum(state.sum);
        summary.set_quantile(quantiles);

        let mut metric = Metric::from_label(self.label_pairs.clone());
        metric.set_summary(summary);
        metric
    }
}

struct SummaryCore {
    desc: Desc,
    objectives: Objectives,
    spec: WindowSpec,
    series: RwLock<HashMap<Vec<String>, Arc<Series>>>,
}

impl SummaryCore {
    /// Variable label pairs for `values` merged with the constant ones, by name.
    fn label_pairs(&self, values: &[&str]) -> Vec<LabelPair> {
        let mut pairs: Vec<LabelPair> = self
            .desc
            .variable_labels
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value((*value).to_string());
                pair
            })
            .collect();
        pairs.extend(self.desc.const_label_pairs.iter().cloned());
        pairs.sort();
        pairs
    }
}

/// A family of summaries partitioned by label values.
#[derive(Clone)]
pub struct SummaryVec {
    core: Arc<SummaryCore>,
}

impl SummaryVec {
    /// Build a summary vector with the given variable label names.
    pub fn new(opts: SummaryOpts, label_names: &[&str]) -> prometheus::Result<Self> {
        if opts.max_age.is_zero() {
            return Err(prometheus::Error::Msg("summary max_age must be non-zero".into()));
        }
        if opts.age_buckets == 0 {
            return Err(prometheus::Error::Msg("summary age_buckets must be non-zero".into()));
        }
        if label_names.contains(&QUANTILE_LABEL) {
            return Err(prometheus::Error::Msg(format!(
                "`{QUANTILE_LABEL}` is reserved on summaries"
            )));
        }

        let desc = opts
            .common_opts
            .clone()
            .variable_labels(label_names.iter().map(|name| (*name).to_string()).collect())
            .describe()?;

        let span = (opts.max_age / opts.age_buckets).max(Duration::from_nanos(1));
        let spec = WindowSpec {
            max_age: opts.max_age,
            span,
            buckets: opts.age_buckets as usize,
            capacity: opts.objectives.samples_per_bucket(),
        };

        Ok(Self {
            core: Arc::new(SummaryCore {
                desc,
                objectives: opts.objectives,
                spec,
                series: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Get or create the series for `values`; fails on a label count mismatch.
    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<SummaryChild> {
        let expect = self.core.desc.variable_labels.len();
        if values.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality {
                expect,
                got: values.len(),
            });
        }
        let owned: Vec<String> = values.iter().map(|v| (*v).to_string()).collect();

        if let Some(series) = self.core.series.read().get(&owned) {
            return Ok(self.child(Arc::clone(series)));
        }
        let series = Arc::clone(
            self.core
                .series
                .write()
                .entry(owned)
                .or_insert_with(|| Arc::new(Series::new(self.core.label_pairs(values), self.core.spec))),
        );
        Ok(self.child(series))
    }

    /// Get or create the series for `values`.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the declared label names.
    pub fn with_label_values(&self, values: &[&str]) -> SummaryChild {
        self.get_metric_with_label_values(values)
            .unwrap_or_else(|e| panic!("summary label values {values:?}: {e}"))
    }

    /// The tracked objectives.
    pub fn objectives(&self) -> &Objectives {
        &self.core.objectives
    }

    fn child(&self, series: Arc<Series>) -> SummaryChild {
        SummaryChild {
            core: Arc::clone(&self.core),
            series,
        }
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let now = Instant::now();
        let series: Vec<Arc<Series>> = self.core.series.read().values().cloned().collect();

        let mut family = MetricFamily::default();
        family.set_name(self.core.desc.fq_name.clone());
        family.set_help(self.core.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.set_metric(
            series
                .iter()
                .map(|s| s.metric(&self.core.objectives, now))
                .collect(),
        );
        vec![family]
    }
}

impl fmt::Debug for SummaryVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryVec")
            .field("name", &self.core.desc.fq_name)
            .field("objectives", &self.core.objectives)
            .field("label_count", &self.core.desc.variable_labels.len())
            .finish_non_exhaustive()
    }
}

/// One series of a summary: a single label combination.
#[derive(Clone)]
pub struct SummaryChild {
    core: Arc<SummaryCore>,
    series: Arc<Series>,
}

impl SummaryChild {
    /// Record one observation.
    pub fn observe(&self, value: f64) {
        let mut state = self.series.state.lock();
        state.stream.observe(value, Instant::now());
        state.sum += value;
        state.count += 1;
    }

    /// Total observations ever recorded.
    pub fn sample_count(&self) -> u64 {
        self.series.state.lock().count
    }

    /// Sum of all observations ever recorded.
    pub fn sample_sum(&self) -> f64 {
        self.series.state.lock().sum
    }

    /// Current `(quantile, estimate)` pairs over the window.
    pub fn quantiles(&self) -> Vec<(f64, f64)> {
        let objectives = &self.core.objectives;
        let estimates = self
            .series
            .state
            .lock()
            .stream
            .quantiles(objectives, Instant::now());
        objectives.iter().map(|o| o.quantile).zip(estimates).collect()
    }
}

impl fmt::Debug for SummaryChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryChild")
            .field("count", &self.sample_count())
            .field("sum", &self.sample_sum())
            .finish_non_exhaustive()
    }
}

/// A summary without variable labels.
#[derive(Clone)]
pub struct Summary {
    vec: SummaryVec,
    child: SummaryChild,
}

impl Summary {
    /// Build a summary from options.
    pub fn with_opts(opts: SummaryOpts) -> prometheus::Result<Self> {
        let vec = SummaryVec::new(opts, &[])?;
        let child = vec.get_metric_with_label_values(&[])?;
        Ok(Self { vec, child })
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        self.child.observe(value);
    }

    /// Total observations ever recorded.
    pub fn sample_count(&self) -> u64 {
        self.child.sample_count()
    }

    /// Sum of all observations ever recorded.
    pub fn sample_sum(&self) -> f64 {
        self.child.sample_sum()
    }

    /// Current `(quantile, estimate)` pairs over the window.
    pub fn quantiles(&self) -> Vec<(f64, f64)> {
        self.child.quantiles()
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        self.vec.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.vec.collect()
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Summary").field(&self.child).finish()
    }
}
