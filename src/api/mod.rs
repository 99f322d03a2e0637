//! Development stand-in for the remote wall detection service.

mod detector;
mod handlers;
pub mod middleware;

pub use detector::{DetectorPolicy, StubDetector};
pub use middleware::DetectorAuth;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Camera frames run well past axum's default 2 MB body limit.
const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

pub fn create_router(detector: StubDetector) -> Router {
    create_router_with_auth(detector, DetectorAuth::disabled())
}

pub fn create_router_with_auth(detector: StubDetector, auth: DetectorAuth) -> Router {
    let detect = Router::new()
        .route("/detect-wall", post(handlers::detect_wall))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES))
        .layer(from_fn_with_state(auth, middleware::auth_middleware));

    Router::new()
        .merge(detect)
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn guarded() -> Router {
        create_router_with_auth(
            StubDetector::new(DetectorPolicy::Always),
            DetectorAuth::with_api_key("k"),
        )
    }

    #[tokio::test]
    async fn health_is_open_when_detection_is_guarded() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = guarded().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn detection_without_token_is_unauthorized() {
        let request = Request::builder()
            .method("POST")
            .uri("/detect-wall")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"image":""}"#))
            .unwrap();
        let response = guarded().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
