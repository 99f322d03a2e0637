//! Device-facing collaborators.
//!
//! The pipeline never talks to hardware directly. These traits describe the
//! slice of the device API it needs: capability queries, immersive session
//! requests, the camera stream, and user notifications.

pub mod simulated;

use async_trait::async_trait;

use crate::error::DeviceError;
use crate::models::{Frame, SessionInit, SessionMode};

/// Entry point of the device's XR runtime.
#[async_trait]
pub trait XrSystem: Send + Sync {
    /// Whether an XR runtime exists at all.
    fn is_available(&self) -> bool;

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, DeviceError>;

    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> Result<Box<dyn XrSession>, DeviceError>;

    /// Physical pixels per logical pixel of the output surface.
    fn pixel_ratio(&self) -> f32 {
        1.0
    }
}

/// A granted immersive session.
pub trait XrSession: Send {
    fn granted_features(&self) -> Vec<String>;

    /// End the session. Calling this more than once has no further effect.
    fn end(&mut self);

    fn is_ended(&self) -> bool;
}

/// A live camera stream that must be stopped explicitly.
pub trait MediaStream: Send {
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Source of camera passthrough frames composited under the scene.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, DeviceError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        (**self).next_frame()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    Unavailable,
}

/// System notifications with an in-page fallback.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_permission(&self) -> NotificationPermission;

    fn show(&self, title: &str, body: &str) -> Result<(), DeviceError>;

    /// Blocking in-page alert used when notifications are not possible.
    fn alert(&self, message: &str);
}
