// Re-export glam for convenience
pub use glam::*;

// COLLADA matrix conventions
mod transform;
pub use transform::Mat4Ext;
