//! HTTP client for the remote wall detection service.
//!
//! The service takes one image per request and answers with a JSON object
//! carrying at least a boolean `wallDetected`. Configuration comes from
//! [`CaptureConfig`]; `HOLO_DETECT_URL` and `HOLO_API_KEY` override it.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{WallAnalyzer, WallVerdict};
use crate::config::{CaptureConfig, PayloadEncoding};
use crate::error::AnalysisError;
use crate::models::ImagePayload;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<ClientError> for AnalysisError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Http(inner) if inner.is_decode() => {
                AnalysisError::Malformed(inner.to_string())
            }
            ClientError::Malformed(msg) => AnalysisError::Malformed(msg),
            other => AnalysisError::Transport(other.to_string()),
        }
    }
}

/// Body of a successful detection response. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectWallResponse {
    pub wall_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Base64 JSON request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectWallRequest {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WallDetectionClient {
    endpoint: String,
    api_key: Option<String>,
    encoding: PayloadEncoding,
    client: Client,
}

impl WallDetectionClient {
    /// Create with explicit configuration.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            encoding: PayloadEncoding::Multipart,
            client: Client::new(),
        }
    }

    /// Create from capture configuration, with the request timeout applied
    /// at the HTTP layer too.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            encoding: config.payload_encoding,
            client,
        })
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a request with optional auth header.
    fn request(&self) -> reqwest::RequestBuilder {
        let mut req = self.client.post(&self.endpoint);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Handle response, converting HTTP errors to ClientError.
    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<DetectWallResponse, ClientError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| ClientError::Malformed(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::BAD_REQUEST => Err(ClientError::BadRequest(body)),
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                StatusCode::PAYLOAD_TOO_LARGE => Err(ClientError::PayloadTooLarge),
                _ => Err(ClientError::Server(format!("{}: {}", status, body))),
            }
        }
    }

    /// Send one image and return the parsed response.
    pub async fn detect_wall(
        &self,
        payload: &ImagePayload,
    ) -> Result<DetectWallResponse, ClientError> {
        let request = match self.encoding {
            PayloadEncoding::Multipart => {
                let part = Part::bytes(payload.bytes.clone())
                    .file_name(payload.file_name)
                    .mime_str(payload.mime_type)?;
                self.request().multipart(Form::new().part("image", part))
            }
            PayloadEncoding::Base64Json => self.request().json(&DetectWallRequest {
                image: STANDARD.encode(&payload.bytes),
                mime_type: Some(payload.mime_type.to_string()),
            }),
        };
        let response = request.send().await?;
        self.handle_response(response).await
    }
}

#[async_trait]
impl WallAnalyzer for WallDetectionClient {
    async fn analyze(&self, payload: ImagePayload) -> Result<WallVerdict, AnalysisError> {
        let response = self.detect_wall(&payload).await?;
        Ok(WallVerdict {
            wall_detected: response.wall_detected,
            confidence: response.confidence,
        })
    }
}
