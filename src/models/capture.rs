use serde::{Deserialize, Serialize};

/// One cycle of the capture-analyze loop.
///
/// Attempts are created on every schedule tick. An attempt whose quality band
/// failed the gate never carries a payload and never reaches the network.
/// Attempts superseded by a newer dispatch (or by teardown) keep their
/// `Pending` result forever; their late responses are discarded.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    /// Monotonic, starting at 1 for the first attempt of a pipeline.
    pub sequence: u64,
    pub quality: Option<QualitySample>,
    pub payload: Option<ImagePayload>,
    pub result: AttemptResult,
}

/// Outcome of a capture attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Pending,
    WallDetected,
    NoWall,
    TransportError(String),
}

/// Coarse suitability of a frame for wall analysis.
///
/// Ordered from darkest to brightest so thresholds can be compared directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    TooDark,
    Fair,
    Good,
    TooBright,
}

impl QualityBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooDark => "too_dark",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::TooBright => "too_bright",
        }
    }
}

/// Ephemeral result of one gate check. Never stored past the tick that made it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySample {
    /// Mean channel value on a 0-255 scale.
    pub mean_luminance: f32,
    pub band: QualityBand,
}

/// Encoded image sent to the wall detection service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: &'static str,
}

impl ImagePayload {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg",
            file_name: "scene.jpg",
        }
    }
}
