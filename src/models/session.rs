use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immersive-AR engagement.
///
/// A session is created after a successful capability probe and is owned
/// exclusively by the render session manager. Only one session can be
/// `Active` at a time; it is destroyed on explicit close, on pipeline
/// teardown, or on a fatal session error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub mode: SessionMode,
    /// Output surface size in CSS pixels at the time of the last resize.
    pub surface: SurfaceSize,
    /// Features the device actually granted (required plus any optional ones).
    pub granted_features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// The status of an immersive session.
///
/// - `Unsupported`: The device cannot host the requested mode
/// - `Requesting`: A request is pending with the device
/// - `Active`: Bound to the renderer and producing frames
/// - `Ended`: Closed by the user or by teardown
/// - `Failed`: The device rejected the request or the session died
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unsupported,
    Requesting,
    Active,
    Ended,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Requesting => "requesting",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

/// Session modes a device may be asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    ImmersiveAr,
    ImmersiveVr,
    Inline,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImmersiveAr => "immersive-ar",
            Self::ImmersiveVr => "immersive-vr",
            Self::Inline => "inline",
        }
    }
}

/// Feature flags sent along with a session request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInit {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

impl Default for SessionInit {
    fn default() -> Self {
        Self {
            required_features: vec!["hit-test".to_string()],
            optional_features: vec!["local-floor".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, falling back to 1.0 for a degenerate surface.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}
