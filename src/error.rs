//! Error taxonomy for the pipeline.
//!
//! Each asynchronous boundary has its own error type. They all end up as a
//! status line for the user; only capability and session failures stop the
//! pipeline, and none of them crash the render loop.

use thiserror::Error;

use crate::capability::UnsupportedReason;

/// Errors reported by the device session API and its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("XR runtime unavailable")]
    XrUnavailable,

    #[error("{0}")]
    SessionRejected(String),

    #[error("capability query failed: {0}")]
    Query(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("frame source failed: {0}")]
    FrameSource(String),
}

/// Errors from the output surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer is not bound to a session")]
    Unbound,

    #[error("render failed: {0}")]
    Draw(String),
}

/// Errors turning a frame into an image payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame is empty")]
    EmptyFrame,

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Failure of a single analysis round trip. Always recoverable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request timed out after {0} ms")]
    Timeout(u128),
}

/// Failure loading the 3D model asset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to read model: {0}")]
    Io(String),

    #[error("failed to fetch model: {0}")]
    Fetch(String),

    #[error("model resource is empty: {0}")]
    Empty(String),

    #[error("model load already attempted")]
    AlreadyAttempted,
}

/// Pipeline level taxonomy. Gestures outside their valid range are not
/// errors; they are reported through outcome enums instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("immersive AR is not supported: {0}")]
    CapabilityUnsupported(UnsupportedReason),

    #[error("failed to start AR session: {0}")]
    SessionRequestFailed(#[source] DeviceError),

    #[error("scene analysis failed: {0}")]
    AnalysisTransport(#[from] AnalysisError),

    #[error("failed to load 3D model: {0}")]
    AssetLoad(#[from] AssetLoadError),

    #[error("render session already initialized")]
    AlreadyInitialized,

    #[error("render session not initialized")]
    NotInitialized,

    #[error("a session is already {0}")]
    SessionBusy(&'static str),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Whether this error stops the pipeline rather than a single attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnsupported(_) | Self::SessionRequestFailed(_)
        )
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_rejection_message_is_verbatim() {
        let err = DeviceError::SessionRejected("NotAllowedError: user denied".into());
        assert_eq!(err.to_string(), "NotAllowedError: user denied");
    }

    #[test]
    fn only_capability_and_session_errors_are_terminal() {
        assert!(PipelineError::CapabilityUnsupported(UnsupportedReason::NoRuntime).is_terminal());
        assert!(PipelineError::SessionRequestFailed(DeviceError::XrUnavailable).is_terminal());
        assert!(!PipelineError::AnalysisTransport(AnalysisError::Timeout(10)).is_terminal());
        assert!(!PipelineError::AssetLoad(AssetLoadError::Empty("a.glb".into())).is_terminal());
    }
}
