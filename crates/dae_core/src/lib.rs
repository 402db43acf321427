//! DAE Core - COLLADA model loading for real-time rendering.
//!
//! This crate provides:
//!
//! - **COLLADA parsing**: geometries, skins, visual scenes, effects,
//!   materials and animations from `.dae` documents
//! - **Resolved models**: `ModelData` with packed interleaved vertex and
//!   index buffers, bound materials and an extracted bone hierarchy
//! - **Model cache**: path-keyed loading with parallel batch loads
//!
//! # Example
//!
//! ```ignore
//! use dae_core::dae::load_dae;
//!
//! let model = load_dae("character.dae")?;
//! println!("Loaded {} meshes, {} bones",
//!     model.mesh_count(),
//!     model.skeleton.len());
//! ```

pub mod dae;
pub mod dump;
pub mod mesh;
pub mod model;
pub mod skeleton;

pub use dae_math as math;

// Re-export commonly used types
pub use dae::{load_dae, load_dae_from_string, load_dae_with_options, LoadError, LoadOptions, ModelCache, ParseError};
pub use dump::{Dump, DumpTree};
pub use mesh::{FacePolicy, Mesh, Polylist, VertexLayout};
pub use model::{Material, ModelData, ModelSummary};
pub use skeleton::{Bone, Skeleton};
