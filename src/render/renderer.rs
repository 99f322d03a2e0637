use uuid::Uuid;

use crate::device::FrameSource;
use crate::error::RenderError;
use crate::models::{Frame, SurfaceSize};
use crate::scene::{PerspectiveCamera, Scene};

/// Output surface the scene is drawn to.
pub trait Renderer: Send {
    fn set_pixel_ratio(&mut self, ratio: f32);

    fn set_size(&mut self, size: SurfaceSize);

    /// Attach the renderer to a session, or detach it with `None`.
    fn bind_session(&mut self, session: Option<Uuid>);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError>;

    /// Read back the currently presented frame. `None` until something has
    /// been rendered.
    fn read_pixels(&mut self) -> Result<Option<Frame>, RenderError>;
}

/// Renderer that presents the camera passthrough with the scene on top.
///
/// Pixels come from a [`FrameSource`]; the scene itself only contributes its
/// draw bookkeeping.
pub struct PassthroughRenderer<S> {
    source: S,
    session: Option<Uuid>,
    size: SurfaceSize,
    pixel_ratio: f32,
    frames_rendered: u64,
    last_draw_calls: usize,
}

impl<S: FrameSource> PassthroughRenderer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            session: None,
            size: SurfaceSize::new(0, 0),
            pixel_ratio: 1.0,
            frames_rendered: 0,
            last_draw_calls: 0,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn drawing_buffer_size(&self) -> SurfaceSize {
        SurfaceSize::new(
            (self.size.width as f32 * self.pixel_ratio).round() as u32,
            (self.size.height as f32 * self.pixel_ratio).round() as u32,
        )
    }
}

impl<S: FrameSource> Renderer for PassthroughRenderer<S> {
    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio;
    }

    fn set_size(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn bind_session(&mut self, session: Option<Uuid>) {
        self.session = session;
    }

    fn render(&mut self, scene: &Scene, _camera: &PerspectiveCamera) -> Result<(), RenderError> {
        if self.session.is_none() {
            return Err(RenderError::Unbound);
        }
        self.last_draw_calls = scene.node_count();
        self.frames_rendered += 1;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<Option<Frame>, RenderError> {
        if self.frames_rendered == 0 {
            return Ok(None);
        }
        self.source
            .next_frame()
            .map(Some)
            .map_err(|e| RenderError::Draw(e.to_string()))
    }
}
