//! The resolved model handed to the renderer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dae_math::Vec4;
use serde::Serialize;

use crate::dae::{Animation, ColorSource, Effect, SceneGraph};
use crate::mesh::Mesh;
use crate::skeleton::Skeleton;

/// A material with its effect linked.
#[derive(Clone, Debug)]
pub struct Material {
    /// Material id
    pub id: String,

    /// Display name (defaults to the id)
    pub name: String,

    /// Shared effect; several materials may instance the same one
    pub effect: Arc<Effect>,
}

impl Material {
    /// Literal diffuse color, if the diffuse parameter is not textured.
    pub fn diffuse_color(&self) -> Option<Vec4> {
        self.effect.phong().diffuse.as_ref().and_then(ColorSource::color)
    }

    /// Sampler name of the diffuse texture, if textured.
    pub fn diffuse_texture(&self) -> Option<&str> {
        match self.effect.phong().diffuse.as_ref()? {
            ColorSource::Texture { texture, .. } => Some(texture.as_str()),
            ColorSource::Color(_) => None,
        }
    }
}

/// Everything produced by loading one document.
#[derive(Clone, Debug)]
pub struct ModelData {
    /// Model name (file stem, or the name given to the string loader)
    pub name: String,

    /// COLLADA version the document declared
    pub version: String,

    /// Packed meshes keyed by geometry id
    pub meshes: HashMap<String, Mesh>,

    /// Bones of every armature in the scene
    pub skeleton: Skeleton,

    /// Raw animations keyed by id
    pub animations: HashMap<String, Animation>,

    /// The resolved node hierarchy
    pub scene: SceneGraph,
}

impl ModelData {
    pub fn mesh(&self, id: &str) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Meshes sorted by id, for stable output.
    pub fn sorted_meshes(&self) -> Vec<&Mesh> {
        let mut meshes: Vec<&Mesh> = self.meshes.values().collect();
        meshes.sort_by(|a, b| a.id.cmp(&b.id));
        meshes
    }

    /// Total packed vertices over all meshes.
    pub fn vertex_count(&self) -> usize {
        self.meshes.values().map(Mesh::vertex_count).sum()
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.name.clone(),
            version: self.version.clone(),
            meshes: self.sorted_meshes().into_iter().map(MeshSummary::from).collect(),
            bone_count: self.skeleton.len(),
            animation_count: self.animations.len(),
            node_count: self.scene.len(),
        }
    }
}

/// Serializable overview of a model.
#[derive(Clone, Debug, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub version: String,
    pub meshes: Vec<MeshSummary>,
    pub bone_count: usize,
    pub animation_count: usize,
    pub node_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct MeshSummary {
    pub id: String,
    pub name: String,
    pub skinned: bool,
    pub polylists: Vec<PolylistSummary>,

    /// Material symbol → material id
    pub materials: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PolylistSummary {
    pub material: Option<String>,
    pub faces: usize,
    pub vertices: usize,
    pub elements_per_vertex: usize,
    pub indices: usize,
    pub non_triangle_faces: usize,
}

impl From<&Mesh> for MeshSummary {
    fn from(mesh: &Mesh) -> Self {
        Self {
            id: mesh.id.clone(),
            name: mesh.name.clone(),
            skinned: mesh.is_skinned(),
            polylists: mesh
                .polylists
                .iter()
                .map(|p| PolylistSummary {
                    material: p.material_symbol.clone(),
                    faces: p.face_count(),
                    vertices: p.vertex_count(),
                    elements_per_vertex: p.layout.elements_per_vertex(),
                    indices: p.ibo_buffer.len(),
                    non_triangle_faces: p.non_triangle_faces,
                })
                .collect(),
            materials: mesh
                .materials
                .iter()
                .map(|(symbol, material)| (symbol.clone(), material.id.clone()))
                .collect(),
        }
    }
}
