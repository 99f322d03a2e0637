//! Capture a camera frame, ask a remote service whether it shows a wall, and
//! if so place a piece of furniture in the AR scene for the user to move and
//! scale.

pub mod analysis;
pub mod api;
pub mod assets;
pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod placement;
pub mod render;
pub mod scene;
pub mod status;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{Collaborators, Pipeline, PipelineHandle, PipelineOutcome, PipelineReport};
