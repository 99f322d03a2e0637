//! Bearer-token check for the detector service.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Authentication settings for the detector service.
#[derive(Clone, Debug, Default)]
pub struct DetectorAuth {
    /// Expected bearer token (from HOLO_DETECTOR_API_KEY). `None` disables the check.
    pub api_key: Option<String>,
}

impl DetectorAuth {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("HOLO_DETECTOR_API_KEY").ok(),
        }
    }

    /// No authentication (local development and tests).
    pub fn disabled() -> Self {
        Self { api_key: None }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }
}

/// Rejects requests without the configured bearer token.
pub async fn auth_middleware(
    State(auth): State<DetectorAuth>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &auth.api_key else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing or malformed Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_has_no_key() {
        assert!(DetectorAuth::disabled().api_key.is_none());
    }

    #[test]
    fn with_api_key_sets_key() {
        let auth = DetectorAuth::with_api_key("test-key");
        assert_eq!(auth.api_key.as_deref(), Some("test-key"));
    }
}
