use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total wire requests executed. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "doorstep_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "doorstep_request_duration_seconds";

/// Counter: visits committed.
pub const VISITS_SCHEDULED_TOTAL: &str = "doorstep_visits_scheduled_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "doorstep_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "doorstep_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "doorstep_connections_rejected_total";

/// Counter: failed password handshakes.
pub const AUTH_FAILURES_TOTAL: &str = "doorstep_auth_failures_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "doorstep_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "doorstep_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(request: &Request) -> &'static str {
    match request {
        Request::Auth { .. } => "auth",
        Request::CreateApartment { .. } => "create_apartment",
        Request::CreateRunner { .. } => "create_runner",
        Request::CreateTenant { .. } => "create_tenant",
        Request::AssignRunner { .. } => "assign_runner",
        Request::ScheduleVisit { .. } => "schedule_visit",
        Request::ListVisits { .. } => "list_visits",
        Request::VisitCount { .. } => "visit_count",
        Request::Watch { .. } => "watch",
    }
}
