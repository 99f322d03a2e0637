//! Render session management: scene, camera, output surface and the
//! immersive session that drives them.

mod renderer;
mod session_manager;

pub use renderer::*;
pub use session_manager::*;
