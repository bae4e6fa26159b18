use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use std::time::Instant;

pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Unmatched paths collapse into one label so random URLs cannot blow up cardinality.
    let path = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];

    counter!("kindred_http_requests_total", &labels).increment(1);
    histogram!("kindred_http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}

/// Records one execution of a background job (scheduled or manually triggered).
pub fn record_job(job: &'static str, outcome: &'static str, started: Instant) {
    let labels = [("job", job), ("outcome", outcome)];
    counter!("kindred_jobs_total", &labels).increment(1);
    histogram!("kindred_job_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}

pub fn init_metrics() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}
