//! Registries and names for benchmarks.
//!
//! Generators are seeded so runs are comparable.

use std::sync::Arc;

use metreg_core::MetricsRegistry;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of distinct instruments a benchmark works over.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 10 instruments.
    Tiny,
    /// 100 instruments.
    #[default]
    Small,
    /// 10,000 instruments.
    Large,
}

impl Scale {
    /// Instrument count for this scale.
    pub fn count(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Large => 10_000,
        }
    }
}

/// A registry backed by a private Prometheus registry.
pub fn registry(namespace: &str) -> MetricsRegistry {
    MetricsRegistry::new(namespace, Arc::new(prometheus::Registry::new()))
}

/// `count` valid, distinct instrument names.
pub fn instrument_names(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let suffix: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(|c| char::from(c).to_ascii_lowercase())
                .collect();
            format!("m{i}_{suffix}")
        })
        .collect()
}

/// `count` label value tuples of width `width`.
pub fn label_values(count: usize, width: usize, seed: u64) -> Vec<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..width).map(|_| rng.gen_range(0..1000u32).to_string()).collect())
        .collect()
}
