//! The single line of status text shown to the user.
//!
//! Every pipeline transition publishes a [`StatusMessage`]. Observers hold a
//! `watch::Receiver` and only ever see the latest line.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;

use crate::models::QualityBand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Initializing,
    XrUnavailable,
    ModeUnsupported,
    ProbeFailed(String),
    Supported,
    SessionStarted,
    SessionFailed(String),
    HoldCamera,
    AnalysisScheduled(Duration),
    RendererMissing,
    CaptureFailed,
    Guidance(QualityBand),
    Analyzing,
    NoWallRetrying,
    AnalysisError,
    AnalysisTimedOut,
    WallDetected,
    ModelPlaced,
    ModelLoadFailed,
    CaptureStopped,
    SessionEnded,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing WebXR..."),
            Self::XrUnavailable => write!(f, "WebXR not supported on this device."),
            Self::ModeUnsupported => write!(f, "immersive-ar session not supported."),
            Self::ProbeFailed(reason) => write!(f, "Could not check AR support: {}", reason),
            Self::Supported => write!(f, "WebXR supported. Starting AR session..."),
            Self::SessionStarted => {
                write!(f, "AR session started. Move device to scan the scene.")
            }
            Self::SessionFailed(reason) => write!(f, "Failed to start AR session: {}", reason),
            Self::HoldCamera => write!(f, "Hold camera at the scene..."),
            Self::AnalysisScheduled(period) => write!(
                f,
                "Starting scene analysis every {} seconds...",
                period.as_secs_f32()
            ),
            Self::RendererMissing => write!(f, "Renderer not initialized yet."),
            Self::CaptureFailed => write!(f, "Failed to capture scene image."),
            Self::Guidance(QualityBand::TooDark) => {
                write!(f, "Too dark to analyze. Turn on more light or move closer.")
            }
            Self::Guidance(QualityBand::TooBright) => {
                write!(f, "Too bright to analyze. Avoid pointing at lights or windows.")
            }
            Self::Guidance(band) => write!(f, "Adjust lighting or distance ({}).", band.as_str()),
            Self::Analyzing => write!(f, "Analyzing scene..."),
            Self::NoWallRetrying => write!(f, "No wall detected. Retrying..."),
            Self::AnalysisError => write!(f, "Error analyzing the scene."),
            Self::AnalysisTimedOut => write!(f, "Scene analysis timed out. Retrying..."),
            Self::WallDetected => write!(f, "Wall detected. Loading sofa..."),
            Self::ModelPlaced => write!(f, "Wall detected. Sofa placed."),
            Self::ModelLoadFailed => write!(f, "Error loading 3D model."),
            Self::CaptureStopped => write!(f, "Scene analysis stopped. Tap to try again."),
            Self::SessionEnded => write!(f, "AR session ended."),
        }
    }
}

/// Publisher side of the status line.
#[derive(Debug, Clone)]
pub struct StatusLine {
    tx: watch::Sender<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusMessage::Initializing.to_string());
        Self { tx }
    }

    /// Replace the current line. Returns whether the visible text changed.
    pub fn set(&self, message: StatusMessage) -> bool {
        let text = message.to_string();
        tracing::info!(status = %text, "Status updated");
        self.tx.send_if_modified(|current| {
            if *current == text {
                false
            } else {
                *current = text;
                true
            }
        })
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}
