// HTTP request metrics, registered next to the judge's own

use arbiter_judge::metrics::REGISTRY;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec_with_registry, IntCounterVec};

lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "arbiter_http_requests_total",
        "HTTP requests served, by route and status code",
        &["route", "status"],
        REGISTRY
    )
    .unwrap();
}

pub async fn track_requests(request: Request, next: Next) -> Response {
    // Unmatched paths share one label so scanners cannot blow up cardinality
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();

    response
}
