use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Record request count and latency per normalized route.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Collapse learner identities and question ids into `{id}` so label
/// cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid_like(segment) || is_numeric_id(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid_like(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_and_ids_collapse() {
        assert_eq!(
            normalize_path("/api/v1/learners/550e8400-e29b-41d4-a716-446655440000/answers"),
            "/api/v1/learners/{id}/answers"
        );
        assert_eq!(
            normalize_path("/api/v1/questions/123/votes"),
            "/api/v1/questions/{id}/votes"
        );
        assert_eq!(
            normalize_path("/api/v1/learners/550e8400-e29b-41d4-a716-446655440000/jokers/hint"),
            "/api/v1/learners/{id}/jokers/hint"
        );
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn only_real_uuids_collapse() {
        assert!(is_uuid_like("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid_like("fifty_fifty"));
        assert!(!is_numeric_id(""));
    }
}
