//! Integration tests for the instrument registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use metreg_core::prometheus::core::Collector;
use metreg_core::prometheus::{self, Encoder, TextEncoder};
use metreg_core::{MetricsRegistry, Objectives, Registerer, RegistryConfig};

/// Registers into a real registry and counts the calls.
struct CountingRegisterer {
    inner: prometheus::Registry,
    calls: AtomicUsize,
}

impl CountingRegisterer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: prometheus::Registry::new(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Registerer for CountingRegisterer {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.register(collector)
    }
}

/// Rejects every registration.
struct RejectingRegisterer;

impl Registerer for RejectingRegisterer {
    fn register(&self, _collector: Box<dyn Collector>) -> prometheus::Result<()> {
        Err(prometheus::Error::AlreadyReg)
    }
}

fn render(registry: &prometheus::Registry) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Value of the exposition line for `series`, if present.
fn sample(text: &str, series: &str) -> Option<f64> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix(series)?.strip_prefix(' '))
        .map(|value| value.trim().parse().unwrap())
}

fn setup(namespace: &str) -> (MetricsRegistry, prometheus::Registry) {
    let backend = prometheus::Registry::new();
    let registry = MetricsRegistry::new(namespace, Arc::new(backend.clone()));
    (registry, backend)
}

#[test]
fn test_counter_exposed_under_namespace() {
    let (registry, backend) = setup("app");
    registry.count("http", "requests", "HTTP requests served");
    registry.increase_counter("http", "requests", "HTTP requests served", 4.0);

    let text = render(&backend);
    assert!(text.contains("# HELP app_http_requests HTTP requests served"));
    assert!(text.contains("# TYPE app_http_requests counter"));
    assert_eq!(sample(&text, "app_http_requests"), Some(5.0));
}

#[test]
fn test_pools_are_isolated_by_kind() {
    let (registry, backend) = setup("app");
    registry.count("svc", "work", "work counter");
    registry.set_gauge(3.0, "svc", "depth", "queue depth");
    registry.add_histogram("svc", "latency", "work latency");
    registry
        .count_labels("svc", "outcomes", "outcomes", &["result"], &["ok"])
        .unwrap();
    registry
        .add_histogram_vec("svc", "stage_latency", "per stage", &["stage"], &["parse"])
        .unwrap();
    registry
        .add_summary_vec("svc", "stage_duration", "per stage", &["stage"], &["parse"])
        .unwrap();

    let sizes = registry.pool_sizes();
    assert_eq!(sizes.counters, 1);
    assert_eq!(sizes.gauges, 1);
    assert_eq!(sizes.histograms, 1);
    assert_eq!(sizes.counter_vecs, 1);
    assert_eq!(sizes.histogram_vecs, 1);
    assert_eq!(sizes.summary_vecs, 1);

    let text = render(&backend);
    assert_eq!(sample(&text, "app_svc_depth"), Some(3.0));
    assert_eq!(sample(&text, "app_svc_outcomes{result=\"ok\"}"), Some(1.0));
}

#[test]
fn test_same_key_in_counter_and_histogram_pools() {
    let (registry, backend) = setup("app");
    let counter = registry.count("svc", "jobs", "jobs run");
    let histogram = registry.add_histogram("svc", "jobs", "job latency");
    histogram.observe(0.5);
    histogram.record_elapsed_since(Instant::now());

    let sizes = registry.pool_sizes();
    assert_eq!(sizes.counters, 1);
    assert_eq!(sizes.histograms, 1);

    // Each pool keeps its own live instrument.
    assert_eq!(counter.value(), 1.0);
    assert_eq!(histogram.histogram().unwrap().get_sample_count(), 2);
    assert_eq!(histogram.summary().unwrap().sample_count(), 1);

    // The counter owns `app_svc_jobs` in the backend; the histogram records
    // unexported while its summary is exported under its own name.
    let text = render(&backend);
    assert!(text.contains("# TYPE app_svc_jobs counter"));
    assert_eq!(sample(&text, "app_svc_jobs"), Some(1.0));
    assert!(!text.contains("app_svc_jobs_bucket"));
    assert!(text.contains("# TYPE app_svc_jobs_summary summary"));
    assert_eq!(sample(&text, "app_svc_jobs_summary_count"), Some(1.0));
}

#[test]
fn test_same_key_in_counter_and_gauge_pools() {
    let (registry, backend) = setup("app");
    let counter = registry.count("svc", "jobs", "jobs run");
    let gauge = registry.set_gauge(7.0, "svc", "jobs", "jobs running");

    assert!(!counter.is_detached());
    assert!(!gauge.is_detached());
    assert_eq!(registry.pool_sizes().counters, 1);
    assert_eq!(registry.pool_sizes().gauges, 1);
    assert_eq!(gauge.value(), 7.0);

    let text = render(&backend);
    assert!(text.contains("# TYPE app_svc_jobs counter"));
    assert!(!text.contains("# TYPE app_svc_jobs gauge"));
    assert_eq!(sample(&text, "app_svc_jobs"), Some(1.0));
}

#[test]
fn test_key_uniqueness() {
    let (registry, _backend) = setup("app");
    registry.count("a", "b", "h");
    registry.count("a", "c", "h");
    registry.count("b", "b", "h");
    registry.count("a", "b", "h");

    assert_eq!(registry.pool_sizes().counters, 3);
    assert_eq!(registry.counter("a", "b", "h").value(), 2.0);
}

#[test]
fn test_concurrent_get_or_create_registers_once() {
    let registerer = CountingRegisterer::new();
    let registry = Arc::new(MetricsRegistry::new("app", registerer.clone()));
    let threads = 32;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.count("svc", "hits", "hits");
                registry.add_histogram("svc", "latency", "latency");
                registry
                    .count_labels("svc", "codes", "codes", &["code"], &["200"])
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // One counter, one histogram plus its summary, one counter vector.
    assert_eq!(registerer.calls(), 4);
    assert_eq!(registry.counter("svc", "hits", "hits").value(), threads as f64);

    let text = render(&registerer.inner);
    assert_eq!(
        sample(&text, "app_svc_codes{code=\"200\"}"),
        Some(threads as f64)
    );
}

#[test]
fn test_histogram_records_dual_units() {
    let (registry, backend) = setup("app");
    let histogram = registry.add_histogram("db", "query", "query latency");
    histogram.record_elapsed_since(Instant::now() - Duration::from_millis(50));

    let text = render(&backend);
    let seconds = sample(&text, "app_db_query_sum").unwrap();
    let millis = sample(&text, "app_db_query_summary_sum").unwrap();
    assert_eq!(sample(&text, "app_db_query_count"), Some(1.0));
    assert_eq!(sample(&text, "app_db_query_summary_count"), Some(1.0));
    assert!(seconds >= 0.05, "seconds = {seconds}");
    assert!((millis / 1000.0 - seconds).abs() < 1e-6, "millis = {millis}");
}

#[test]
fn test_summary_quantiles_exposed() {
    let (registry, backend) = setup("app");
    let objectives = Objectives::new([(0.5, 0.05), (0.9, 0.01)]).unwrap();
    let summary = registry
        .add_summary_vec_with_objectives("rpc", "call", "rpc calls", &["method"], &["get"], &objectives)
        .unwrap();
    for value in 1..=10 {
        summary.observe(f64::from(value));
    }

    let text = render(&backend);
    assert!(text.contains("# TYPE app_rpc_call_summary summary"));
    assert_eq!(
        sample(&text, "app_rpc_call_summary{method=\"get\",quantile=\"0.5\"}"),
        Some(5.0)
    );
    assert_eq!(
        sample(&text, "app_rpc_call_summary{method=\"get\",quantile=\"0.9\"}"),
        Some(9.0)
    );
    assert_eq!(sample(&text, "app_rpc_call_summary_count{method=\"get\"}"), Some(10.0));
    assert_eq!(sample(&text, "app_rpc_call_summary_sum{method=\"get\"}"), Some(55.0));
}

#[test]
fn test_vector_label_combinations_share_entry() {
    let (registry, backend) = setup("app");
    let get = registry
        .count_labels("http", "responses", "responses", &["method", "code"], &["GET", "200"])
        .unwrap();
    registry
        .count_labels("http", "responses", "responses", &["method", "code"], &["POST", "500"])
        .unwrap();
    get.inc_by(2.0);

    assert_eq!(registry.pool_sizes().counter_vecs, 1);
    let text = render(&backend);
    assert_eq!(
        sample(&text, "app_http_responses{code=\"200\",method=\"GET\"}"),
        Some(3.0)
    );
    assert_eq!(
        sample(&text, "app_http_responses{code=\"500\",method=\"POST\"}"),
        Some(1.0)
    );
}

#[test]
fn test_scalar_registration_failure_is_tolerated() {
    let registry = MetricsRegistry::new("app", Arc::new(RejectingRegisterer));

    let counter = registry.count("svc", "hits", "hits");
    let gauge = registry.set_gauge(2.0, "svc", "depth", "depth");
    let histogram = registry.add_histogram("svc", "latency", "latency");
    histogram.record_elapsed_since(Instant::now());

    assert!(!counter.is_detached());
    assert_eq!(counter.value(), 1.0);
    assert_eq!(gauge.value(), 2.0);
    assert_eq!(histogram.histogram().unwrap().get_sample_count(), 1);
    assert_eq!(registry.pool_sizes().counters, 1);
}

#[test]
fn test_vector_registration_failure_is_returned_once() {
    let registerer = CountingRegisterer::new();
    let first = MetricsRegistry::new("app", registerer.clone());
    let second = MetricsRegistry::new("app", registerer.clone());

    first
        .count_labels("svc", "codes", "codes", &["code"], &["200"])
        .unwrap();
    let err = second
        .count_labels("svc", "codes", "codes", &["code"], &["200"])
        .unwrap_err();
    assert!(err.is_duplicate());

    let again = second
        .count_labels("svc", "codes", "codes", &["code"], &["500"])
        .unwrap_err();
    assert_eq!(err, again);
    assert_eq!(registerer.calls(), 2);
}

#[test]
fn test_duplicate_scalar_across_registries_records_locally() {
    let backend = prometheus::Registry::new();
    let first = MetricsRegistry::new("app", Arc::new(backend.clone()));
    let second = MetricsRegistry::new("app", Arc::new(backend.clone()));

    first.count("svc", "hits", "hits");
    let orphan = second.count("svc", "hits", "hits");
    orphan.inc();

    assert_eq!(orphan.value(), 2.0);
    assert_eq!(sample(&render(&backend), "app_svc_hits"), Some(1.0));
}

#[test]
fn test_custom_config_defaults() {
    let config = RegistryConfig::new("app")
        .with_default_buckets(vec![0.1, 1.0])
        .with_summary_max_age(Duration::from_secs(30))
        .with_summary_age_buckets(3);
    let backend = prometheus::Registry::new();
    let registry = MetricsRegistry::with_config(config, Arc::new(backend.clone()));
    registry.add_histogram("svc", "latency", "latency").observe(0.5);

    let text = render(&backend);
    assert_eq!(sample(&text, "app_svc_latency_bucket{le=\"0.1\"}"), Some(0.0));
    assert_eq!(sample(&text, "app_svc_latency_bucket{le=\"1\"}"), Some(1.0));
    assert_eq!(sample(&text, "app_svc_latency_bucket{le=\"+Inf\"}"), Some(1.0));
    assert_eq!(registry.namespace(), "app");
}

#[test]
#[should_panic]
fn test_label_value_count_mismatch_panics() {
    let (registry, _backend) = setup("app");
    registry
        .count_labels("svc", "codes", "codes", &["code", "method"], &["200"])
        .unwrap();
}
