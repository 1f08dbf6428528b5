//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use std::sync::Once;
use std::time::Duration;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "feedwright_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Fan-out Metrics
    pub static ref FANOUT_POSTS_TOTAL: IntCounter = IntCounter::new(
        "feedwright_fanout_posts_total",
        "Total number of posts fanned out"
    ).expect("metric can be created");
    pub static ref MEMBERSHIP_ROWS_INSERTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_membership_rows_inserted_total", "Membership rows inserted by fan-out"),
        &["feed"]
    ).expect("metric can be created");
    pub static ref MEMBERSHIP_ROWS_PRUNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_membership_rows_pruned_total", "Membership rows deleted by retention pruning"),
        &["feed"]
    ).expect("metric can be created");
    pub static ref MEMBERSHIP_ROWS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("feedwright_membership_rows", "Membership rows written by the last rebuild"),
        &["feed"]
    ).expect("metric can be created");

    // Rebuild Metrics
    pub static ref REBUILD_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_rebuild_runs_total", "Total number of timeline rebuilds"),
        &["status"]
    ).expect("metric can be created");
    pub static ref REBUILD_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "feedwright_rebuild_duration_seconds",
            "Timeline rebuild duration in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["status"]
    ).expect("metric can be created");

    // Data quality
    pub static ref DATA_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_data_errors_total", "Malformed relationship or post rows encountered, counted once per evaluation pass"),
        &["kind"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedwright_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Record one finished rebuild.
pub fn observe_rebuild(status: &str, elapsed: Duration) {
    REBUILD_RUNS_TOTAL.with_label_values(&[status]).inc();
    REBUILD_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(elapsed.as_secs_f64());
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(register_all);
}

fn register_all() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FANOUT_POSTS_TOTAL.clone()))
        .expect("FANOUT_POSTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEMBERSHIP_ROWS_INSERTED_TOTAL.clone()))
        .expect("MEMBERSHIP_ROWS_INSERTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEMBERSHIP_ROWS_PRUNED_TOTAL.clone()))
        .expect("MEMBERSHIP_ROWS_PRUNED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEMBERSHIP_ROWS.clone()))
        .expect("MEMBERSHIP_ROWS can be registered");
    REGISTRY
        .register(Box::new(REBUILD_RUNS_TOTAL.clone()))
        .expect("REBUILD_RUNS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REBUILD_DURATION_SECONDS.clone()))
        .expect("REBUILD_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(DATA_ERRORS_TOTAL.clone()))
        .expect("DATA_ERRORS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
