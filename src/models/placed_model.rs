use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// The loaded furniture model once it is part of the scene.
///
/// Created once by the asset loader after a wall has been detected, mutated
/// only by the placement controller, and dropped with the scene. Scale
/// components always stay inside the configured zoom bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedModel {
    /// Where the model was loaded from.
    pub source: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Nominal real-world footprint (width, height, depth) in meters.
    pub bounds_hint: Vec3,
    /// Size of the raw asset in bytes.
    pub byte_len: usize,
}

impl PlacedModel {
    pub fn new(source: impl Into<String>, bounds_hint: Vec3, offset: Vec3, byte_len: usize) -> Self {
        Self {
            source: source.into(),
            position: offset,
            rotation: Quat::IDENTITY,
            scale: bounds_hint,
            bounds_hint,
            byte_len,
        }
    }
}
