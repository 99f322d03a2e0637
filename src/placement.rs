//! Direct manipulation of the placed model.
//!
//! Select moves the model to a point just ahead of the controller. The
//! controller contributes position only; rotation and scale stay whatever
//! they were. Zoom rescales multiplicatively and rejects (rather than clamps)
//! any step that would reach or cross a scale bound.

use glam::{Mat4, Vec3};

use crate::config::PlacementConfig;
use crate::models::PlacedModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectOutcome {
    NoModel,
    Moved { position: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomOutcome {
    NoModel,
    Applied { scale: Vec3 },
    /// The candidate scale left the open interval `(min_scale, max_scale)`.
    Rejected { candidate: Vec3 },
}

#[derive(Debug, Clone)]
pub struct PlacementController {
    select_offset: Vec3,
    sensitivity: f32,
    min_scale: f32,
    max_scale: f32,
}

impl PlacementController {
    pub fn new(config: &PlacementConfig) -> Self {
        Self {
            select_offset: config.select_offset,
            sensitivity: config.zoom_sensitivity,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
        }
    }

    /// Anchor the model ahead of the controller pose.
    pub fn on_select(&self, model: Option<&mut PlacedModel>, controller_world: Mat4) -> SelectOutcome {
        let Some(model) = model else {
            return SelectOutcome::NoModel;
        };
        let position = controller_world.transform_point3(self.select_offset);
        model.position = position;
        SelectOutcome::Moved { position }
    }

    /// Rescale by `1 - delta_y * sensitivity`.
    pub fn on_zoom(&self, model: Option<&mut PlacedModel>, delta_y: f32) -> ZoomOutcome {
        let Some(model) = model else {
            return ZoomOutcome::NoModel;
        };
        let factor = 1.0 - delta_y * self.sensitivity;
        let candidate = model.scale * factor;
        if !self.within_bounds(candidate) {
            return ZoomOutcome::Rejected { candidate };
        }
        model.scale = candidate;
        ZoomOutcome::Applied { scale: candidate }
    }

    /// Every component strictly inside `(min_scale, max_scale)`.
    pub fn within_bounds(&self, scale: Vec3) -> bool {
        scale.is_finite() && scale.min_element() > self.min_scale && scale.max_element() < self.max_scale
    }
}
