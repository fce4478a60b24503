//! Core primitive types for rendering
//!
//! Meshes, vertices, the camera and its orbit controls.

pub mod camera;
pub mod mesh;

pub use camera::{Camera, OrbitControls};
pub use mesh::{face_normal, Mesh, Topology, Vertex};
