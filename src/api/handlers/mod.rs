use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use super::detector::StubDetector;
use crate::analysis::{DetectWallRequest, DetectWallResponse};

type ApiError = (StatusCode, String);

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    let msg = e.to_string();
    tracing::warn!("Rejected detection request: {}", msg);
    (StatusCode::BAD_REQUEST, msg)
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(detector): State<StubDetector>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "requests": detector.requests(),
    }))
}

// ============================================================
// Detection
// ============================================================

/// Accepts a multipart form with an `image` field, or a JSON body carrying
/// the image as base64.
pub async fn detect_wall(
    State(detector): State<StubDetector>,
    request: Request,
) -> Result<Json<DetectWallResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let image = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| (e.status(), e.body_text()))?;
        read_image_field(multipart).await?
    } else {
        let Json(body) = Json::<DetectWallRequest>::from_request(request, &())
            .await
            .map_err(|e| (e.status(), e.body_text()))?;
        STANDARD.decode(body.image.as_bytes()).map_err(bad_request)?
    };

    if image.is_empty() {
        return Err(bad_request("image is empty"));
    }

    let wall_detected = detector.classify(&image).map_err(bad_request)?;
    Ok(Json(DetectWallResponse {
        wall_detected,
        confidence: None,
    }))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| (e.status(), e.body_text()))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(bad_request("missing `image` field"))
}
