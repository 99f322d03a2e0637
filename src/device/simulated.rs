//! A software stand-in for an AR-capable device.
//!
//! Used by the `holo run` command and by tests. Frames come from image files
//! on disk or from a solid color.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{FrameSource, MediaStream, NotificationPermission, Notifier, XrSession, XrSystem};
use crate::error::DeviceError;
use crate::models::{Frame, SessionInit, SessionMode};

/// Simulated XR runtime.
#[derive(Debug, Clone)]
pub struct SimulatedXr {
    available: bool,
    supported: Vec<SessionMode>,
    rejection: Option<String>,
    query_failure: Option<String>,
    optional_supported: Vec<String>,
    pixel_ratio: f32,
    sessions_started: Arc<AtomicUsize>,
    sessions_ended: Arc<AtomicUsize>,
}

impl SimulatedXr {
    /// A device that supports immersive AR and grants every optional feature.
    pub fn ar_capable() -> Self {
        Self {
            available: true,
            supported: vec![SessionMode::ImmersiveAr, SessionMode::Inline],
            rejection: None,
            query_failure: None,
            optional_supported: vec!["local-floor".to_string()],
            pixel_ratio: 1.0,
            sessions_started: Arc::new(AtomicUsize::new(0)),
            sessions_ended: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A browser without any XR runtime.
    pub fn without_xr() -> Self {
        Self {
            available: false,
            supported: Vec::new(),
            ..Self::ar_capable()
        }
    }

    /// An XR runtime that only supports inline sessions.
    pub fn inline_only() -> Self {
        Self {
            supported: vec![SessionMode::Inline],
            ..Self::ar_capable()
        }
    }

    /// Reject every session request with `reason`.
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.rejection = Some(reason.into());
        self
    }

    /// Fail every capability query with `reason`.
    pub fn failing_query(mut self, reason: impl Into<String>) -> Self {
        self.query_failure = Some(reason.into());
        self
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn sessions_started(&self) -> usize {
        self.sessions_started.load(Ordering::SeqCst)
    }

    pub fn sessions_ended(&self) -> usize {
        self.sessions_ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl XrSystem for SimulatedXr {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, DeviceError> {
        if !self.available {
            return Err(DeviceError::XrUnavailable);
        }
        if let Some(reason) = &self.query_failure {
            return Err(DeviceError::Query(reason.clone()));
        }
        Ok(self.supported.contains(&mode))
    }

    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> Result<Box<dyn XrSession>, DeviceError> {
        if !self.available {
            return Err(DeviceError::XrUnavailable);
        }
        if let Some(reason) = &self.rejection {
            return Err(DeviceError::SessionRejected(reason.clone()));
        }
        if !self.supported.contains(&mode) {
            return Err(DeviceError::SessionRejected(format!(
                "NotSupportedError: {} is not supported",
                mode.as_str()
            )));
        }
        let mut granted = init.required_features.clone();
        granted.extend(
            init.optional_features
                .iter()
                .filter(|f| self.optional_supported.contains(f))
                .cloned(),
        );
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedSession {
            granted,
            ended: false,
            ended_counter: Arc::clone(&self.sessions_ended),
        }))
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }
}

#[derive(Debug)]
pub struct SimulatedSession {
    granted: Vec<String>,
    ended: bool,
    ended_counter: Arc<AtomicUsize>,
}

impl XrSession for SimulatedSession {
    fn granted_features(&self) -> Vec<String> {
        self.granted.clone()
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.ended_counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

/// Observable state of a [`SimulatedStream`], kept after the stream moves.
#[derive(Debug, Clone)]
pub struct StreamState(Arc<AtomicBool>);

impl StreamState {
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SimulatedStream {
    active: Arc<AtomicBool>,
}

impl SimulatedStream {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState(Arc::clone(&self.active))
    }
}

impl Default for SimulatedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStream for SimulatedStream {
    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Frame source that always yields the same frame. The frame can be swapped
/// from outside through [`SolidFrames::handle`].
#[derive(Debug, Clone)]
pub struct SolidFrames {
    frame: Arc<Mutex<Frame>>,
}

impl SolidFrames {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Arc::new(Mutex::new(frame)),
        }
    }

    /// Uniform gray frame with the given channel value.
    pub fn gray(width: u32, height: u32, level: u8) -> Self {
        Self::new(Frame::solid(width, height, [level, level, level, 255]))
    }

    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn set(&self, frame: Frame) {
        if let Ok(mut current) = self.frame.lock() {
            *current = frame;
        }
    }
}

impl FrameSource for SolidFrames {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        self.frame
            .lock()
            .map(|frame| frame.clone())
            .map_err(|_| DeviceError::FrameSource("frame lock poisoned".into()))
    }
}

/// Frame source cycling through the images of a directory.
#[derive(Debug)]
pub struct ImageDirFrames {
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirFrames {
    pub fn open(dir: &Path) -> Result<Self, DeviceError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| DeviceError::FrameSource(format!("{}: {}", dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                    Some("jpg" | "jpeg" | "png")
                )
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(DeviceError::FrameSource(format!(
                "no jpg or png images in {}",
                dir.display()
            )));
        }
        Ok(Self { files, next: 0 })
    }
}

impl FrameSource for ImageDirFrames {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        let path = &self.files[self.next % self.files.len()];
        self.next = self.next.wrapping_add(1);
        let image = image::open(path)
            .map_err(|e| DeviceError::FrameSource(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Frame::from_rgba(width, height, image.into_raw())
            .ok_or_else(|| DeviceError::FrameSource("decoded buffer size mismatch".into()))
    }
}

/// Notifier that logs instead of showing anything.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    permission: NotificationPermission,
}

impl ConsoleNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn request_permission(&self) -> NotificationPermission {
        self.permission
    }

    fn show(&self, title: &str, body: &str) -> Result<(), DeviceError> {
        if self.permission != NotificationPermission::Granted {
            return Err(DeviceError::Notification("permission not granted".into()));
        }
        tracing::info!(title, body, "System notification");
        Ok(())
    }

    fn alert(&self, message: &str) {
        eprintln!("[alert] {}", message);
    }
}
