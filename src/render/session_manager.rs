use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::Renderer;
use crate::config::{CameraConfig, RenderConfig, SessionConfig};
use crate::device::{XrSession, XrSystem};
use crate::error::{DeviceError, PipelineError, RenderError};
use crate::lifecycle::{ListenerKind, ListenerRegistry, ManagedTimer};
use crate::models::{Frame, Session, SessionStatus, SurfaceSize};
use crate::scene::{PerspectiveCamera, Scene};

/// Lifecycle of the render side of the pipeline.
///
/// `Idle -> Initialized -> SessionRequested -> SessionActive -> Ended`, with
/// `Failed` reachable from `SessionRequested` when the device says no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Initialized,
    SessionRequested,
    SessionActive,
    Ended,
    Failed,
}

/// What a render loop iteration produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    /// The very first frame of the session. Emitted once.
    First,
    Frame,
    /// No active session; nothing was drawn.
    Skipped,
}

/// Owns the scene, the camera, the renderer and the immersive session.
pub struct RenderSessionManager {
    state: RenderState,
    session_config: SessionConfig,
    camera_config: CameraConfig,
    render_config: RenderConfig,
    renderer: Box<dyn Renderer>,
    scene: Scene,
    camera: Option<PerspectiveCamera>,
    surface: SurfaceSize,
    session: Option<Session>,
    xr_session: Option<Box<dyn XrSession>>,
    render_loop: Option<ManagedTimer>,
    first_frame_rendered: bool,
}

impl RenderSessionManager {
    pub fn new(
        session_config: SessionConfig,
        camera_config: CameraConfig,
        render_config: RenderConfig,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        let surface = SurfaceSize::new(render_config.width, render_config.height);
        Self {
            state: RenderState::Idle,
            session_config,
            camera_config,
            render_config,
            renderer,
            scene: Scene::new(),
            camera: None,
            surface,
            session: None,
            xr_session: None,
            render_loop: None,
            first_frame_rendered: false,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera(&self) -> Option<&PerspectiveCamera> {
        self.camera.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn is_render_loop_running(&self) -> bool {
        self.render_loop.is_some()
    }

    pub fn frame_interval(&self) -> Duration {
        self.render_config.frame_interval()
    }

    /// Build the camera, light and controller and register input listeners.
    pub fn initialize(
        &mut self,
        pixel_ratio: f32,
        listeners: &mut ListenerRegistry,
    ) -> Result<(), PipelineError> {
        if self.state != RenderState::Idle {
            return Err(PipelineError::AlreadyInitialized);
        }

        self.camera = Some(PerspectiveCamera::new(&self.camera_config, self.surface));
        self.scene = Scene::new();
        self.renderer.set_pixel_ratio(pixel_ratio);
        self.renderer.set_size(self.surface);

        listeners.register(ListenerKind::Select);
        listeners.register(ListenerKind::Resize);
        listeners.register(ListenerKind::Zoom);

        self.state = RenderState::Initialized;
        tracing::debug!(
            width = self.surface.width,
            height = self.surface.height,
            pixel_ratio,
            "Render session manager initialized"
        );
        Ok(())
    }

    /// Ask the device for an immersive session and bind it to the renderer.
    ///
    /// A rejection moves the manager to `Failed`; it is never retried here.
    /// The session record is marked `Unsupported` when the runtime is gone.
    pub async fn request_session(&mut self, xr: &dyn XrSystem) -> Result<&Session, PipelineError> {
        match self.state {
            RenderState::Initialized => {}
            RenderState::Idle => return Err(PipelineError::NotInitialized),
            RenderState::SessionRequested => return Err(PipelineError::SessionBusy("requested")),
            RenderState::SessionActive => return Err(PipelineError::SessionBusy("active")),
            RenderState::Ended | RenderState::Failed => {
                return Err(PipelineError::SessionBusy("closed"))
            }
        }

        self.state = RenderState::SessionRequested;
        let mode = self.session_config.mode;
        let mut session = Session {
            id: Uuid::new_v4(),
            status: SessionStatus::Requesting,
            mode,
            surface: self.surface,
            granted_features: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        };

        match xr.request_session(mode, &self.session_config.init).await {
            Ok(xr_session) => {
                session.status = SessionStatus::Active;
                session.granted_features = xr_session.granted_features();
                self.renderer.bind_session(Some(session.id));
                self.xr_session = Some(xr_session);
                self.state = RenderState::SessionActive;
                tracing::info!(
                    session_id = %session.id,
                    features = ?session.granted_features,
                    "Immersive session active"
                );
            }
            Err(e) => {
                session.status = match e {
                    DeviceError::XrUnavailable => SessionStatus::Unsupported,
                    _ => SessionStatus::Failed,
                };
                session.ended_at = Some(Utc::now());
                self.session = Some(session);
                self.state = RenderState::Failed;
                tracing::error!("Session request rejected: {}", e);
                return Err(PipelineError::SessionRequestFailed(e));
            }
        }

        Ok(self.session.insert(session))
    }

    /// Start the per-refresh render loop. Only one loop ever runs.
    pub fn start_render_loop(&mut self, spawn: impl FnOnce(Duration) -> ManagedTimer) -> bool {
        if self.state != RenderState::SessionActive || self.render_loop.is_some() {
            return false;
        }
        self.render_loop = Some(spawn(self.render_config.frame_interval()));
        true
    }

    /// One render loop iteration.
    pub fn render_frame(&mut self) -> Result<FrameSignal, RenderError> {
        if self.state != RenderState::SessionActive {
            return Ok(FrameSignal::Skipped);
        }
        let Some(camera) = self.camera.as_ref() else {
            return Ok(FrameSignal::Skipped);
        };
        self.renderer.render(&self.scene, camera)?;
        if self.first_frame_rendered {
            Ok(FrameSignal::Frame)
        } else {
            self.first_frame_rendered = true;
            Ok(FrameSignal::First)
        }
    }

    /// Read back the presented frame for analysis.
    pub fn capture_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        match self.state {
            RenderState::Idle => Err(PipelineError::NotInitialized),
            _ if !self.first_frame_rendered => Ok(None),
            _ => Ok(self.renderer.read_pixels()?),
        }
    }

    /// Recompute the projection and resize the output surface.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), PipelineError> {
        let camera = self.camera.as_mut().ok_or(PipelineError::NotInitialized)?;
        camera.set_aspect(size);
        self.surface = size;
        self.renderer.set_size(size);
        if let Some(session) = self.session.as_mut() {
            session.surface = size;
        }
        tracing::debug!(width = size.width, height = size.height, "Surface resized");
        Ok(())
    }

    /// End the session and stop the render loop. Returns whether a live
    /// session was ended; a no-op from `Idle`, `Ended` or `Failed`.
    pub fn end(&mut self) -> bool {
        self.render_loop = None;
        let ended = match self.xr_session.take() {
            Some(mut xr_session) => {
                xr_session.end();
                true
            }
            None => false,
        };
        if let Some(session) = self.session.as_mut() {
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Ended;
                session.ended_at = Some(Utc::now());
            }
        }
        self.renderer.bind_session(None);
        match self.state {
            RenderState::Idle | RenderState::Failed => {}
            _ => self.state = RenderState::Ended,
        }
        if ended {
            tracing::info!("Immersive session ended");
        }
        ended
    }
}
