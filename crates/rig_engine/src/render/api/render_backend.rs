//! Backend abstraction traits for the rendering system
//!
//! This module defines the trait that rendering backends implement so the
//! rendering engine can create, draw and release resources without knowing
//! what sits underneath.

use crate::render::primitives::Mesh;
use crate::render::{Material, RenderError};

use super::frame_data::RenderFrameData;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

slotmap::new_key_type! {
    /// Handle to a mesh resource stored in the backend
    pub struct MeshHandle;

    /// Handle to a material resource stored in the backend
    pub struct MaterialHandle;
}

/// Main rendering backend trait
///
/// Every handle returned by a `create_*` call must be passed to the matching
/// `release_*` call exactly once. Releasing an unknown handle is an error.
pub trait RenderBackend {
    /// Current drawable surface size (width, height)
    fn surface_extent(&self) -> (u32, u32);

    /// Resize the drawable surface
    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()>;

    /// Upload a mesh and return an opaque handle
    fn create_mesh_resource(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle>;

    /// Create a material and return an opaque handle
    fn create_material(&mut self, material: &Material) -> BackendResult<MaterialHandle>;

    /// Release a mesh resource
    fn release_mesh_resource(&mut self, handle: MeshHandle) -> BackendResult<()>;

    /// Release a material resource
    fn release_material(&mut self, handle: MaterialHandle) -> BackendResult<()>;

    /// Draw one frame
    fn draw_frame(&mut self, frame: &RenderFrameData<'_>) -> BackendResult<()>;

    /// Wait for outstanding work to finish
    fn wait_idle(&self) -> BackendResult<()>;

    /// Downcast to concrete backend type
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to mutable concrete backend type
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
