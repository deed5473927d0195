//! Prometheus metrics for the Hilo orchestrator
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Event processing
    pub static ref LAST_PROCESSED_BLOCK: GaugeVec = register_gauge_vec!(
        "orchestrator_last_processed_block",
        "Last Ethereum block whose events were processed",
        &["orchestrator"]
    ).unwrap();

    pub static ref EVENTS_OBSERVED: CounterVec = register_counter_vec!(
        "orchestrator_events_observed_total",
        "Ethereum bridge events seen by the watcher",
        &["orchestrator", "kind"]
    ).unwrap();

    pub static ref MALFORMED_EVENTS: CounterVec = register_counter_vec!(
        "orchestrator_malformed_events_total",
        "Ethereum logs that could not be decoded and were skipped",
        &["orchestrator"]
    ).unwrap();

    pub static ref VOTES_SUBMITTED: CounterVec = register_counter_vec!(
        "orchestrator_votes_submitted_total",
        "Attestation votes submitted to Hilo",
        &["orchestrator", "kind", "status"]
    ).unwrap();

    // Batches
    pub static ref BATCHES_SIGNED: CounterVec = register_counter_vec!(
        "orchestrator_batches_signed_total",
        "Batch confirmations submitted",
        &["orchestrator"]
    ).unwrap();

    pub static ref BATCH_DIVERGENCES: CounterVec = register_counter_vec!(
        "orchestrator_batch_divergences_total",
        "Batches that did not match the locally recomputed batch",
        &["orchestrator"]
    ).unwrap();

    pub static ref BATCHES_RELAYED: CounterVec = register_counter_vec!(
        "orchestrator_batches_relayed_total",
        "Signed batches submitted to Ethereum",
        &["orchestrator", "status"]
    ).unwrap();

    pub static ref ERC20_DEPLOYMENTS: CounterVec = register_counter_vec!(
        "orchestrator_erc20_deployments_total",
        "ERC20 deployments requested on Ethereum",
        &["orchestrator"]
    ).unwrap();

    // Errors
    pub static ref ADAPTER_ERRORS: CounterVec = register_counter_vec!(
        "orchestrator_adapter_errors_total",
        "Failed adapter calls",
        &["operation", "type"]
    ).unwrap();

    pub static ref PENDING_EVENTS: GaugeVec = register_gauge_vec!(
        "orchestrator_pending_events",
        "Events buffered waiting for earlier nonces",
        &["orchestrator"]
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "orchestrator_up",
        "Whether the orchestrator is up and running"
    ).unwrap();
}

pub fn record_block_processed(orchestrator: &str, block_number: u64) {
    LAST_PROCESSED_BLOCK
        .with_label_values(&[orchestrator])
        .set(block_number as f64);
}

pub fn record_event_observed(orchestrator: &str, kind: &str) {
    EVENTS_OBSERVED.with_label_values(&[orchestrator, kind]).inc();
}

pub fn record_malformed_event(orchestrator: &str) {
    MALFORMED_EVENTS.with_label_values(&[orchestrator]).inc();
}

pub fn record_vote(orchestrator: &str, kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    VOTES_SUBMITTED
        .with_label_values(&[orchestrator, kind, status])
        .inc();
}

pub fn record_batch_signed(orchestrator: &str) {
    BATCHES_SIGNED.with_label_values(&[orchestrator]).inc();
}

pub fn record_batch_divergence(orchestrator: &str) {
    BATCH_DIVERGENCES.with_label_values(&[orchestrator]).inc();
}

pub fn record_batch_relayed(orchestrator: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    BATCHES_RELAYED
        .with_label_values(&[orchestrator, status])
        .inc();
}

pub fn record_erc20_deployment(orchestrator: &str) {
    ERC20_DEPLOYMENTS.with_label_values(&[orchestrator]).inc();
}

pub fn record_adapter_error(operation: &str, error_type: &str) {
    ADAPTER_ERRORS
        .with_label_values(&[operation, error_type])
        .inc();
}

pub fn set_pending_events(orchestrator: &str, count: usize) {
    PENDING_EVENTS
        .with_label_values(&[orchestrator])
        .set(count as f64);
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
