//! # Rendering System
//!
//! Turns the scene tree into drawable resources. The [`RenderingEngine`]
//! keeps one [`RenderObject`] per visible node, built by the
//! [`NodeBuilder`] registered for the node's type, and keeps those objects
//! in step with the tree when nodes change.
//!
//! ## Architecture
//!
//! - **Engine**: reconciliation, async mesh and landmark enrichment, frame submission
//! - **Builders**: per-node-type geometry construction
//! - **Render objects**: resource trees owned by the engine, released exactly once
//! - **Backend**: resource storage and drawing behind [`RenderBackend`]
//! - **Primitives**: meshes and the camera

pub mod api;
pub mod backends;
pub mod builders;
pub mod engine;
pub mod material;
pub mod primitives;
pub mod render_object;
pub mod tasks;

pub use api::{BackendResult, DrawCommand, MaterialHandle, MeshHandle, RenderBackend, RenderFrameData};
pub use backends::{FrameSummary, HeadlessBackend, ResourceCounters};
pub use builders::{
    marker_color, BuildContext, BuilderRegistry, FloorPlanBuilder, GenericBuilder, MonitorBuilder,
    NodeBuilder, RootBuilder, SubjectBuilder, SubjectMesh, MARKER_PREFIX, MESH_PART, PLACEHOLDER_PART,
};
pub use engine::{EngineStats, RenderingEngine};
pub use material::{
    hex_color, AlphaMode, Material, MaterialType, StandardMaterialParams, UnlitMaterialParams,
};
pub use primitives::{Camera, Mesh, OrbitControls, Topology, Vertex};
pub use render_object::{AppliedState, RenderObject, RenderPart};
pub use tasks::{TaskCompletion, TaskRunner};

use thiserror::Error;

use crate::scene::SceneError;

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Rendering operation failed
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Handle is not live in the backend
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Scene tree rejected an operation
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
