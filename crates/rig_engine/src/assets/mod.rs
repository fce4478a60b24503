//! Asset loading
//!
//! Subject meshes come from a [`MeshSource`]. The file source reads STL from
//! disk or fetches it over HTTP; the memory source serves meshes registered
//! up front.

pub mod stl_loader;

pub use stl_loader::{MeshLoadError, StlLoader};

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use crate::render::primitives::Mesh;

/// Somewhere meshes can be loaded from by location string
pub trait MeshSource: Send + Sync {
    /// Load the mesh at `location`
    fn load(&self, location: &str) -> Result<Mesh, MeshLoadError>;
}

/// Loads STL from the filesystem, or over HTTP for `http(s)://` locations
#[derive(Debug, Clone)]
pub struct FileMeshSource {
    base_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for FileMeshSource {
    fn default() -> Self {
        Self {
            base_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FileMeshSource {
    /// Source resolving locations as given
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn fetch(&self, url: &str) -> Result<Mesh, MeshLoadError> {
        let response = ureq::get(url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| MeshLoadError::Fetch(format!("{}: {}", url, e)))?;
        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        StlLoader::parse(&bytes)
    }
}

impl MeshSource for FileMeshSource {
    fn load(&self, location: &str) -> Result<Mesh, MeshLoadError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return self.fetch(location);
        }
        let path = PathBuf::from(location);
        let path = match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };
        StlLoader::load_stl(path)
    }
}

/// Serves meshes registered in memory
#[derive(Debug, Default)]
pub struct MemoryMeshSource {
    meshes: RwLock<HashMap<String, Mesh>>,
}

impl MemoryMeshSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: register a mesh
    pub fn with_mesh(self, location: impl Into<String>, mesh: Mesh) -> Self {
        self.insert(location, mesh);
        self
    }

    /// Register or replace a mesh
    pub fn insert(&self, location: impl Into<String>, mesh: Mesh) {
        if let Ok(mut meshes) = self.meshes.write() {
            meshes.insert(location.into(), mesh);
        }
    }
}

impl MeshSource for MemoryMeshSource {
    fn load(&self, location: &str) -> Result<Mesh, MeshLoadError> {
        let meshes = self
            .meshes
            .read()
            .map_err(|_| MeshLoadError::Fetch("mesh registry poisoned".to_string()))?;
        meshes.get(location).cloned().ok_or_else(|| {
            MeshLoadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no mesh registered at '{}'", location),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_serves_registered_mesh() {
        let source = MemoryMeshSource::new().with_mesh("mouse.stl", Mesh::cube(2.0));
        assert_eq!(source.load("mouse.stl").expect("registered").vertex_count(), 24);
        assert!(matches!(source.load("rat.stl"), Err(MeshLoadError::Io(_))));
    }

    #[test]
    fn test_file_source_reports_missing_file() {
        let source = FileMeshSource::new().with_base_dir("/nonexistent-rig-assets");
        assert!(matches!(source.load("mouse.stl"), Err(MeshLoadError::Io(_))));
    }
}
