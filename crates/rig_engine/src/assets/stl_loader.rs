//! STL file loader for 3D models
//!
//! Reads binary and ASCII STL. Facet normals stored in the file are ignored;
//! normals are derived from the triangle winding.

use std::path::Path;

use thiserror::Error;

use crate::foundation::math::Vec3;
use crate::render::primitives::{face_normal, Mesh, Vertex};

/// Size of the binary header
const HEADER_LEN: usize = 80;
/// Header plus the facet count
const PREAMBLE_LEN: usize = HEADER_LEN + 4;
/// Normal, three vertices and the attribute word
const FACET_LEN: usize = 50;

/// Mesh loading errors
#[derive(Error, Debug)]
pub enum MeshLoadError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Remote mesh could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(String),
    /// Text content did not parse
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Content is not STL
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// File holds no triangles
    #[error("Mesh has no triangles: {0}")]
    Empty(String),
}

/// STL reader
pub struct StlLoader;

impl StlLoader {
    /// Load an STL file and return a mesh
    pub fn load_stl<P: AsRef<Path>>(path: P) -> Result<Mesh, MeshLoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mesh = Self::parse(&bytes)?;
        log::info!(
            "Loaded STL '{}': {} triangles",
            path.display(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    /// Parse STL content, detecting binary or ASCII
    pub fn parse(bytes: &[u8]) -> Result<Mesh, MeshLoadError> {
        let triangles = if Self::looks_binary(bytes) {
            Self::parse_binary(bytes)?
        } else if Self::looks_ascii(bytes) {
            Self::parse_ascii(bytes)?
        } else if bytes.len() >= PREAMBLE_LEN {
            return Err(MeshLoadError::InvalidFormat(format!(
                "binary STL facet count does not match {} bytes of data",
                bytes.len()
            )));
        } else {
            return Err(MeshLoadError::InvalidFormat(format!(
                "{} bytes is too short for STL",
                bytes.len()
            )));
        };

        if triangles.is_empty() {
            return Err(MeshLoadError::Empty("no facets".to_string()));
        }
        Ok(Self::build_mesh(&triangles))
    }

    fn looks_binary(bytes: &[u8]) -> bool {
        if bytes.len() < PREAMBLE_LEN {
            return false;
        }
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
        count
            .checked_mul(FACET_LEN)
            .and_then(|body| body.checked_add(PREAMBLE_LEN))
            .is_some_and(|expected| expected == bytes.len())
    }

    fn looks_ascii(bytes: &[u8]) -> bool {
        let head = &bytes[..bytes.len().min(512)];
        String::from_utf8_lossy(head).trim_start().starts_with("solid")
    }

    fn parse_binary(bytes: &[u8]) -> Result<Vec<[Vec3; 3]>, MeshLoadError> {
        let read_vec3 = |chunk: &[u8]| -> Vec3 {
            let f = |i: usize| {
                f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
            };
            Vec3::new(f(0), f(4), f(8))
        };

        let triangles = bytes[PREAMBLE_LEN..]
            .chunks_exact(FACET_LEN)
            // Skip the stored normal (12 bytes)
            .map(|facet| [read_vec3(&facet[12..24]), read_vec3(&facet[24..36]), read_vec3(&facet[36..48])])
            .collect::<Vec<_>>();

        if triangles.iter().flatten().any(|v| !v.iter().all(|c| c.is_finite())) {
            return Err(MeshLoadError::InvalidFormat("non-finite vertex coordinate".to_string()));
        }
        Ok(triangles)
    }

    fn parse_ascii(bytes: &[u8]) -> Result<Vec<[Vec3; 3]>, MeshLoadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| MeshLoadError::ParseError(format!("ASCII STL is not UTF-8: {}", e)))?;

        let mut corners = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.first() != Some(&"vertex") {
                continue;
            }
            if parts.len() < 4 {
                return Err(MeshLoadError::ParseError(format!(
                    "line {}: vertex needs three coordinates",
                    line_no + 1
                )));
            }
            let coord = |s: &str| {
                s.parse::<f32>().map_err(|_| {
                    MeshLoadError::ParseError(format!("line {}: invalid coordinate '{}'", line_no + 1, s))
                })
            };
            corners.push(Vec3::new(coord(parts[1])?, coord(parts[2])?, coord(parts[3])?));
        }

        if corners.len() % 3 != 0 {
            return Err(MeshLoadError::ParseError(format!(
                "{} vertices do not form whole triangles",
                corners.len()
            )));
        }
        Ok(corners.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
    }

    fn build_mesh(triangles: &[[Vec3; 3]]) -> Mesh {
        let mut vertices = Vec::with_capacity(triangles.len() * 3);
        for [a, b, c] in triangles {
            let n = face_normal(*a, *b, *c);
            let normal = [n.x, n.y, n.z];
            vertices.extend([a, b, c].iter().map(|p| Vertex::new([p.x, p.y, p.z], normal)));
        }
        let indices = (0..vertices.len() as u32).collect();
        Mesh::new(vertices, indices)
    }
}
