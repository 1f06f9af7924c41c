use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Local store (SQLite)
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of local store operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Local store operation duration in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]
    )
    .unwrap();

    // Engine
    pub static ref ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_total",
        "Total number of validated answers",
        &["outcome"]
    )
    .unwrap();

    pub static ref CRISIS_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crisis_transitions_total",
        "Crisis state transitions",
        &["phase"]
    )
    .unwrap();

    pub static ref CRISIS_ACTIVE: IntGauge = register_int_gauge!(
        "crisis_active",
        "Crises still open at the last sweep"
    )
    .unwrap();

    pub static ref QUESTIONS_SERVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "questions_served_total",
        "Questions handed out, by source",
        &["source"]
    )
    .unwrap();

    pub static ref BANK_REFILLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "bank_refills_total",
        "Background question bank refills",
        &["status"]
    )
    .unwrap();

    // Replication
    pub static ref REPLICATION_TASKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "replication_tasks_total",
        "Mirror upserts issued to the remote store",
        &["table", "status"]
    )
    .unwrap();

    pub static ref PULLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "pulls_total",
        "Profile pulls from the remote store",
        &["status"]
    )
    .unwrap();

    pub static ref CRISIS_SWEEPER_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "crisis_sweeper_ticks_total",
        "Total number of crisis sweeper ticks",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a remote mirror call with metrics
pub async fn track_replication<F, T>(table: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let result = future.await;
    let status = if result.is_ok() { "success" } else { "error" };
    REPLICATION_TASKS_TOTAL
        .with_label_values(&[table, status])
        .inc();
    result
}
