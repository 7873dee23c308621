//! JSON instrument manifests.
//!
//! A manifest lists instruments to declare and the samples to record into
//! them:
//!
//! ```json
//! {
//!   "instruments": [
//!     { "kind": "counter", "subsystem": "http", "name": "requests",
//!       "help": "Requests served", "samples": [1, 1, 3] },
//!     { "kind": "counter_vec", "subsystem": "http", "name": "responses",
//!       "help": "Responses by code", "labels": ["code"],
//!       "series": [{ "values": ["200"], "samples": [1] }] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use metreg_core::{MetricsRegistry, Objectives};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A parsed instrument manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Instruments in declaration order.
    #[serde(default)]
    pub instruments: Vec<InstrumentSpec>,
}

/// Subsystem, name and help shared by every instrument kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Subsystem the instrument belongs to.
    pub subsystem: String,
    /// Instrument name within the subsystem.
    pub name: String,
    /// Help text.
    #[serde(default)]
    pub help: String,
}

/// One label combination of a vector instrument and its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Label values, one per label name.
    pub values: Vec<String>,
    /// Samples to record under these values.
    #[serde(default)]
    pub samples: Vec<f64>,
}

/// An instrument declaration, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentSpec {
    /// Counter; each sample is an increment.
    Counter {
        #[serde(flatten)]
        id: Identity,
        #[serde(default)]
        samples: Vec<f64>,
    },
    /// Gauge; each sample overwrites the value.
    Gauge {
        #[serde(flatten)]
        id: Identity,
        #[serde(default)]
        samples: Vec<f64>,
    },
    /// Histogram with its paired summary; samples go to the histogram.
    Histogram {
        #[serde(flatten)]
        id: Identity,
        #[serde(default)]
        buckets: Option<Vec<f64>>,
        #[serde(default)]
        samples: Vec<f64>,
    },
    /// Counter vector.
    CounterVec {
        #[serde(flatten)]
        id: Identity,
        labels: Vec<String>,
        #[serde(default)]
        series: Vec<Series>,
    },
    /// Histogram vector.
    HistogramVec {
        #[serde(flatten)]
        id: Identity,
        labels: Vec<String>,
        #[serde(default)]
        buckets: Option<Vec<f64>>,
        #[serde(default)]
        series: Vec<Series>,
    },
    /// Summary vector; objectives are `[quantile, error]` pairs.
    SummaryVec {
        #[serde(flatten)]
        id: Identity,
        labels: Vec<String>,
        #[serde(default)]
        objectives: Option<Vec<(f64, f64)>>,
        #[serde(default)]
        series: Vec<Series>,
    },
}

impl InstrumentSpec {
    /// Subsystem, name and help of the instrument.
    pub fn id(&self) -> &Identity {
        match self {
            InstrumentSpec::Counter { id, .. }
            | InstrumentSpec::Gauge { id, .. }
            | InstrumentSpec::Histogram { id, .. }
            | InstrumentSpec::CounterVec { id, .. }
            | InstrumentSpec::HistogramVec { id, .. }
            | InstrumentSpec::SummaryVec { id, .. } => id,
        }
    }

    /// Manifest tag of the instrument kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InstrumentSpec::Counter { .. } => "counter",
            InstrumentSpec::Gauge { .. } => "gauge",
            InstrumentSpec::Histogram { .. } => "histogram",
            InstrumentSpec::CounterVec { .. } => "counter_vec",
            InstrumentSpec::HistogramVec { .. } => "histogram_vec",
            InstrumentSpec::SummaryVec { .. } => "summary_vec",
        }
    }

    fn labels(&self) -> Option<(&[String], &[Series])> {
        match self {
            InstrumentSpec::CounterVec { labels, series, .. }
            | InstrumentSpec::HistogramVec { labels, series, .. }
            | InstrumentSpec::SummaryVec { labels, series, .. } => {
                Some((labels.as_slice(), series.as_slice()))
            }
            _ => None,
        }
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl Manifest {
    /// Parse a manifest from JSON text and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read, parse and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check label arity so applying the manifest never trips the registry's
    /// label-count panic.
    ///
    /// Every series must carry one value per label name, and a vector key
    /// declared more than once must keep the same label names.
    pub fn validate(&self) -> Result<()> {
        let mut declared: HashMap<(&str, &str, &str), &[String]> = HashMap::new();

        for spec in &self.instruments {
            let Some((labels, series)) = spec.labels() else {
                continue;
            };
            let id = spec.id();

            let labels = *declared
                .entry((spec.kind(), id.subsystem.as_str(), id.name.as_str()))
                .or_insert(labels);
            for s in series {
                if s.values.len() != labels.len() {
                    return Err(Error::Manifest(format!(
                        "{} {}/{}: series {:?} has {} values for labels {:?}",
                        spec.kind(),
                        id.subsystem,
                        id.name,
                        s.values,
                        s.values.len(),
                        labels
                    )));
                }
            }
        }
        Ok(())
    }

    /// Declare every instrument in `registry` and record its samples.
    ///
    /// Returns the number of instruments applied.
    pub fn apply(&self, registry: &MetricsRegistry) -> Result<usize> {
        for spec in &self.instruments {
            apply_one(registry, spec)?;
            let id = spec.id();
            debug!(
                kind = spec.kind(),
                subsystem = %id.subsystem,
                name = %id.name,
                "instrument applied"
            );
        }
        Ok(self.instruments.len())
    }
}

fn apply_one(registry: &MetricsRegistry, spec: &InstrumentSpec) -> Result<()> {
    match spec {
        InstrumentSpec::Counter { id, samples } => {
            let counter = registry.counter(&id.subsystem, &id.name, &id.help);
            samples.iter().for_each(|n| counter.inc_by(*n));
        }
        InstrumentSpec::Gauge { id, samples } => {
            let gauge = registry.gauge(&id.subsystem, &id.name, &id.help);
            samples.iter().for_each(|v| gauge.set(*v));
        }
        InstrumentSpec::Histogram { id, buckets, samples } => {
            let histogram =
                registry.histogram(&id.subsystem, &id.name, &id.help, buckets.as_deref());
            samples.iter().for_each(|v| histogram.observe(*v));
        }
        InstrumentSpec::CounterVec { id, labels, series } => {
            let labels = as_strs(labels);
            for s in series {
                let counter = registry.counter_vec(
                    &id.subsystem,
                    &id.name,
                    &id.help,
                    &labels,
                    &as_strs(&s.values),
                )?;
                s.samples.iter().for_each(|n| counter.inc_by(*n));
            }
        }
        InstrumentSpec::HistogramVec {
            id,
            labels,
            buckets,
            series,
        } => {
            let labels = as_strs(labels);
            for s in series {
                let histogram = registry.histogram_vec(
                    &id.subsystem,
                    &id.name,
                    &id.help,
                    &labels,
                    &as_strs(&s.values),
                    buckets.as_deref(),
                )?;
                s.samples.iter().for_each(|v| histogram.observe(*v));
            }
        }
        InstrumentSpec::SummaryVec {
            id,
            labels,
            objectives,
            series,
        } => {
            let objectives = objectives
                .as_ref()
                .map(|pairs| Objectives::new(pairs.iter().copied()))
                .transpose()?;
            let labels = as_strs(labels);
            for s in series {
                let summary = registry.summary_vec(
                    &id.subsystem,
                    &id.name,
                    &id.help,
                    &labels,
                    &as_strs(&s.values),
                    objectives.as_ref(),
                )?;
                s.samples.iter().for_each(|v| summary.observe(*v));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new("test", Arc::new(prometheus::Registry::new()))
    }

    const MANIFEST: &str = r#"{
        "instruments": [
            { "kind": "counter", "subsystem": "http", "name": "requests",
              "help": "Requests served", "samples": [1, 2] },
            { "kind": "gauge", "subsystem": "queue", "name": "depth", "samples": [4, 9] },
            { "kind": "histogram", "subsystem": "db", "name": "query",
              "help": "Query time", "buckets": [0.1, 1.0], "samples": [0.05, 0.5] },
            { "kind": "counter_vec", "subsystem": "http", "name": "responses",
              "help": "Responses", "labels": ["code"],
              "series": [{ "values": ["200"], "samples": [3] }, { "values": ["500"] }] },
            { "kind": "histogram_vec", "subsystem": "rpc", "name": "latency",
              "labels": ["method"], "series": [{ "values": ["get"], "samples": [0.2] }] },
            { "kind": "summary_vec", "subsystem": "rpc", "name": "duration",
              "labels": ["method"], "objectives": [[0.5, 0.05]],
              "series": [{ "values": ["get"], "samples": [12, 18] }] }
        ]
    }"#;

    #[test]
    fn test_parse_all_kinds() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let kinds: Vec<_> = manifest.instruments.iter().map(InstrumentSpec::kind).collect();
        assert_eq!(
            kinds,
            vec!["counter", "gauge", "histogram", "counter_vec", "histogram_vec", "summary_vec"]
        );
        assert_eq!(manifest.instruments[1].id().help, "");
    }

    #[test]
    fn test_apply_records_samples() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let registry = registry();

        assert_eq!(manifest.apply(&registry).unwrap(), 6);
        assert_eq!(registry.counter("http", "requests", "").value(), 3.0);
        assert_eq!(registry.gauge("queue", "depth", "").value(), 9.0);

        let histogram = registry.add_histogram("db", "query", "");
        assert_eq!(histogram.histogram().unwrap().get_sample_count(), 2);

        let ok = registry
            .counter_vec("http", "responses", "", &["code"], &["200"])
            .unwrap();
        assert_eq!(ok.value(), 3.0);

        let summary = registry
            .add_summary_vec("rpc", "duration", "", &["method"], &["get"])
            .unwrap();
        assert_eq!(summary.summary().sample_sum(), 30.0);

        let sizes = registry.pool_sizes();
        assert_eq!(sizes.counters, 1);
        assert_eq!(sizes.counter_vecs, 1);
        assert_eq!(sizes.histogram_vecs, 1);
        assert_eq!(sizes.summary_vecs, 1);
    }

    #[test]
    fn test_series_arity_rejected() {
        let json = r#"{ "instruments": [
            { "kind": "counter_vec", "subsystem": "s", "name": "n",
              "labels": ["a", "b"], "series": [{ "values": ["x"] }] }
        ] }"#;
        let err = Manifest::from_json(json).unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_redeclared_labels_rejected() {
        let json = r#"{ "instruments": [
            { "kind": "counter_vec", "subsystem": "s", "name": "n", "labels": ["a"] },
            { "kind": "counter_vec", "subsystem": "s", "name": "n",
              "labels": ["a", "b"], "series": [{ "values": ["x", "y"] }] }
        ] }"#;
        assert!(matches!(Manifest::from_json(json), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{ "instruments": [{ "kind": "meter", "subsystem": "s", "name": "n" }] }"#;
        assert!(matches!(Manifest::from_json(json), Err(Error::Parse(_))));
    }

    #[test]
    fn test_invalid_objectives_rejected() {
        let json = r#"{ "instruments": [
            { "kind": "summary_vec", "subsystem": "s", "name": "n", "labels": ["a"],
              "objectives": [[1.5, 0.01]], "series": [{ "values": ["x"] }] }
        ] }"#;
        let manifest = Manifest::from_json(json).unwrap();
        let err = manifest.apply(&registry()).unwrap_err();
        assert!(matches!(err, Error::Registry(metreg_core::Error::InvalidObjectives(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.instruments.len(), 6);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
