//! Scene graph owned by the render session manager.
//!
//! The graph is deliberately flat: a light, one tracked input source and at
//! most one placed model. Everything is in meters, right-handed, -Z forward.

use glam::{Mat4, Quat, Vec3};

use crate::config::CameraConfig;
use crate::models::{PlacedModel, SurfaceSize};

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub projection: Mat4,
    pub world: Mat4,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, surface: SurfaceSize) -> Self {
        let mut camera = Self {
            fov_degrees: config.fov_degrees,
            aspect: surface.aspect(),
            near: config.near,
            far: config.far,
            projection: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn set_aspect(&mut self, surface: SurfaceSize) {
        self.aspect = surface.aspect();
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh_gl(
            self.fov_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
    }
}

/// Sky/ground gradient light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky_color: u32,
    pub ground_color: u32,
    pub intensity: f32,
    pub position: Vec3,
}

impl Default for HemisphereLight {
    fn default() -> Self {
        Self {
            sky_color: 0xffffff,
            ground_color: 0xbbbbff,
            intensity: 1.0,
            position: Vec3::new(0.5, 1.0, 0.25),
        }
    }
}

/// A tracked controller or screen-tap reticle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSource {
    pub index: u32,
    /// Latest pose reported by the device.
    pub world: Mat4,
}

impl InputSource {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            world: Mat4::IDENTITY,
        }
    }

    /// Build a controller pose from position and orientation.
    pub fn pose(position: Vec3, orientation: Quat) -> Mat4 {
        Mat4::from_rotation_translation(orientation, position)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub light: HemisphereLight,
    pub controller: InputSource,
    model: Option<PlacedModel>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            light: HemisphereLight::default(),
            controller: InputSource::new(0),
            model: None,
        }
    }

    pub fn model(&self) -> Option<&PlacedModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut PlacedModel> {
        self.model.as_mut()
    }

    /// Insert the model. Returns `false` if one is already placed; the scene
    /// never holds more than one.
    pub fn insert_model(&mut self, model: PlacedModel) -> bool {
        if self.model.is_some() {
            return false;
        }
        self.model = Some(model);
        true
    }

    pub fn node_count(&self) -> usize {
        // light + controller + optional model
        2 + usize::from(self.model.is_some())
    }

    pub fn clear(&mut self) {
        self.model = None;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_updates_aspect_and_projection() {
        let mut camera = PerspectiveCamera::new(&CameraConfig::default(), SurfaceSize::new(800, 600));
        let before = camera.projection;
        camera.set_aspect(SurfaceSize::new(1200, 600));
        assert!((camera.aspect - 2.0).abs() < f32::EPSILON);
        assert_ne!(before, camera.projection);
    }

    #[test]
    fn scene_holds_a_single_model() {
        let mut scene = Scene::new();
        let model = PlacedModel::new("sofa.glb", Vec3::ONE, Vec3::ZERO, 4);
        assert!(scene.insert_model(model.clone()));
        assert!(!scene.insert_model(model));
        assert_eq!(scene.node_count(), 3);
    }
}
