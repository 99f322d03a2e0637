//! Capture-analyze loop and the remote wall classifier it talks to.

mod capture_loop;
mod client;
mod encode;

pub use capture_loop::*;
pub use client::*;
pub use encode::*;

use async_trait::async_trait;

use crate::error::AnalysisError;
use crate::models::ImagePayload;

/// Verdict returned by a wall classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallVerdict {
    pub wall_detected: bool,
    pub confidence: Option<f32>,
}

/// Remote (or fake) wall classifier. Treated as unreliable: slow responses,
/// errors and malformed bodies all surface as [`AnalysisError`].
#[async_trait]
pub trait WallAnalyzer: Send + Sync {
    async fn analyze(&self, payload: ImagePayload) -> Result<WallVerdict, AnalysisError>;
}
