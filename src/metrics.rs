use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Histogram, register_counter, register_counter_vec, register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of proxied-route requests").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("gateway_admitted_total", "Requests admitted by the policy").unwrap();
    pub static ref REJECTED_TOTAL: CounterVec = register_counter_vec!(
        "gateway_rejected_total",
        "Requests rejected by the policy, by breached window",
        &["window"]
    )
    .unwrap();
    pub static ref UPSTREAM_ERRORS: Counter =
        register_counter!("gateway_upstream_errors_total", "Failed upstream requests").unwrap();
    pub static ref ALERT_FAILURES: Counter =
        register_counter!("gateway_alert_failures_total", "Failed alert webhook calls").unwrap();
    pub static ref PANICS_TOTAL: Counter =
        register_counter!("gateway_panics_total", "Requests that ended in a caught panic").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Time until upstream response headers arrive, in seconds"
    )
    .unwrap();
}
