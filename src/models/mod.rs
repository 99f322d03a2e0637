//! Domain models for the capture-and-placement pipeline.
//!
//! # Core Concepts
//!
//! - [`Session`]: One immersive-AR engagement. At most one is active at a time.
//! - [`CaptureAttempt`]: One tick of the capture-analyze loop, identified by a
//!   monotonic sequence number.
//! - [`PlacedModel`]: The furniture model after it has been anchored in the scene.
//!
//! ## Ephemeral Values
//!
//! - [`Frame`]: Pixels read back from the output surface.
//! - [`QualitySample`]: Brightness check derived from a single frame.

mod capture;
mod frame;
mod placed_model;
mod session;

pub use capture::*;
pub use frame::*;
pub use placed_model::*;
pub use session::*;
