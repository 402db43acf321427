//! COLLADA (`.dae`) support.
//!
//! This module parses COLLADA 1.4.1 documents and resolves them into a
//! [`ModelData`](crate::model::ModelData) with packed, GPU-ready meshes.
//!
//! ## Supported Features
//!
//! - `<geometry>/<mesh>` with `<polylist>` and `<triangles>` primitives
//! - `<controller>/<skin>` joint weights, packed into the vertex records
//! - `<visual_scene>` node hierarchies with matrix/translate/scale/rotate
//! - `profile_COMMON` phong effects and the materials that instance them
//! - `<animation>` sources, samplers and channels (captured, not evaluated)
//!
//! ## Not Supported
//!
//! - `<polygons>`, `<lines>`, strips and fans
//! - `<morph>` controllers
//! - Effect profiles other than `profile_COMMON`, shading other than phong
//! - Cameras, lights and images (skipped)
//!
//! # Example
//!
//! ```ignore
//! use dae_core::dae::load_dae;
//!
//! let model = load_dae("path/to/character.dae")?;
//! for mesh in model.sorted_meshes() {
//!     println!("{}: {} vertices", mesh.id, mesh.vertex_count());
//! }
//! ```

mod xml;

mod animation;
mod effect;
mod error;
mod geometry;
mod loader;
mod parser;
mod skin;
mod source;
mod visual_scene;

pub use animation::*;
pub use effect::*;
pub use error::*;
pub use geometry::*;
pub use loader::*;
pub use parser::parse_document;
pub use skin::*;
pub use source::*;
pub use visual_scene::*;
