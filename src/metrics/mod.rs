use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


lazy_static! {
    pub static ref OBSERVING_QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("observing_queue_depth", "Buffered changes waiting for an observing precondition worker"),
        &["precondition"]
    )
    .expect("metric can not be created");

    pub static ref DROPPED_CHANGES: IntCounterVec = IntCounterVec::new(
        Opts::new("dropped_changes", "Changes dropped by dead workers or full queues"),
        &["precondition"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCHED_CHANGES: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatched_changes", "Device change events fanned out by the dispatcher"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref LOCK_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("manipulation_lock_wait_seconds", "Time spent waiting for the manipulation lock")
            .buckets(exponential_buckets(0.001, 4.0, 10).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers all collectors with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(OBSERVING_QUEUE_DEPTH.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(DROPPED_CHANGES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(DISPATCHED_CHANGES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LOCK_WAIT_SECONDS.clone()))
            .expect("collector can be registered");
    });
}

/// Renders every registered collector in the prometheus text format.
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
