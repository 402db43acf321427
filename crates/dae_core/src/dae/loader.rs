//! High-level COLLADA loading.
//!
//! Entry points for loading `.dae` files and strings into [`ModelData`],
//! plus a path-keyed [`ModelCache`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use super::error::ParseError;
use super::parser::parse_document;
use crate::mesh::FacePolicy;
use crate::model::ModelData;

/// COLLADA version accepted by default.
pub const DEFAULT_VERSION: &str = "1.4.1";

/// Errors that can occur while loading a document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Options controlling how a document is resolved.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Handling of faces that are not triangles
    pub face_policy: FacePolicy,

    /// Accepted values of the `<COLLADA version>` attribute
    pub supported_versions: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            face_policy: FacePolicy::default(),
            supported_versions: vec![DEFAULT_VERSION.to_string()],
        }
    }
}

impl LoadOptions {
    pub fn with_face_policy(mut self, face_policy: FacePolicy) -> Self {
        self.face_policy = face_policy;
        self
    }

    pub fn with_supported_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Options that fail on any non-triangle face.
    pub fn strict() -> Self {
        Self::default().with_face_policy(FacePolicy::RejectNonTriangles)
    }
}

/// Load a `.dae` file with default options.
///
/// # Example
///
/// ```ignore
/// use dae_core::dae::load_dae;
///
/// let model = load_dae("character.dae")?;
/// println!("Loaded {} meshes, {} bones", model.mesh_count(), model.skeleton.len());
/// ```
pub fn load_dae<P: AsRef<Path>>(path: P) -> LoadResult<ModelData> {
    load_dae_with_options(path, &LoadOptions::default())
}

/// Load a `.dae` file. The model is named after the file stem.
pub fn load_dae_with_options<P: AsRef<Path>>(path: P, options: &LoadOptions) -> LoadResult<ModelData> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");

    log::debug!("Loading {}", path.display());
    load_dae_from_string_with_options(&content, name, options)
}

/// Load a document held in memory.
pub fn load_dae_from_string(content: &str, name: &str) -> LoadResult<ModelData> {
    load_dae_from_string_with_options(content, name, &LoadOptions::default())
}

pub fn load_dae_from_string_with_options(content: &str, name: &str, options: &LoadOptions) -> LoadResult<ModelData> {
    let document = roxmltree::Document::parse(content)?;
    Ok(parse_document(document.root_element(), name, options)?)
}

/// Models keyed by file path.
///
/// A path is either registered but not loaded (after [`add`](Self::add) or
/// [`close`](Self::close)) or loaded.
#[derive(Debug, Default)]
pub struct ModelCache {
    options: LoadOptions,
    models: HashMap<PathBuf, Option<Arc<ModelData>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LoadOptions) -> Self {
        Self {
            options,
            models: HashMap::new(),
        }
    }

    /// Register a path without loading it.
    pub fn add<P: Into<PathBuf>>(&mut self, path: P) {
        self.models.entry(path.into()).or_insert(None);
    }

    /// Drop the loaded model, keeping the path registered.
    pub fn close<P: AsRef<Path>>(&mut self, path: P) {
        if let Some(slot) = self.models.get_mut(path.as_ref()) {
            if slot.take().is_some() {
                log::debug!("Closed {}", path.as_ref().display());
            }
        }
    }

    /// The loaded model for a path, if any.
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<Arc<ModelData>> {
        self.models.get(path.as_ref()).cloned().flatten()
    }

    pub fn is_registered<P: AsRef<Path>>(&self, path: P) -> bool {
        self.models.contains_key(path.as_ref())
    }

    /// Number of loaded models.
    pub fn loaded_count(&self) -> usize {
        self.models.values().filter(|m| m.is_some()).count()
    }

    /// Return the cached model, loading and registering it first if needed.
    ///
    /// A failed load leaves the path unloaded; a path that was never added
    /// stays unregistered.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> LoadResult<Arc<ModelData>> {
        let path = path.as_ref();
        if let Some(model) = self.get(path) {
            return Ok(model);
        }

        let model = Arc::new(load_dae_with_options(path, &self.options)?);
        self.models.insert(path.to_path_buf(), Some(Arc::clone(&model)));
        Ok(model)
    }

    /// Load several files in parallel.
    ///
    /// Already loaded paths are served from the cache. Results are returned
    /// in input order.
    pub fn load_many<P: AsRef<Path> + Sync>(&mut self, paths: &[P]) -> Vec<LoadResult<Arc<ModelData>>> {
        let options = &self.options;
        let cached: Vec<Option<Arc<ModelData>>> = paths.iter().map(|p| self.get(p)).collect();

        let results: Vec<LoadResult<Arc<ModelData>>> = paths
            .par_iter()
            .zip(cached.into_par_iter())
            .map(|(path, cached)| match cached {
                Some(model) => Ok(model),
                None => load_dae_with_options(path, options).map(Arc::new),
            })
            .collect();

        for (path, result) in paths.iter().zip(&results) {
            if let Ok(model) = result {
                self.models.insert(path.as_ref().to_path_buf(), Some(Arc::clone(model)));
            }
        }
        results
    }
}
