//! metreg Benchmark Suite
//!
//! Criterion benchmarks for the instrument registry.
//!
//! # Benchmark Categories
//!
//! - **Registry**: get-or-create hits and misses per pool, contended lookups
//! - **Summary**: observation and collection cost of the quantile summary

pub mod fixtures;

pub use fixtures::{instrument_names, label_values, registry, Scale};
