//! Scene data model
//!
//! The scene is a hierarchy of data-only nodes that drives the render engine.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator (parameter changes)
//!      ↓  mutates
//! SceneTree (nodes, payload, sync state, events)
//!      ↓  events drained per frame
//! RenderingEngine (render objects)
//! ```
//!
//! The tree:
//! - Owns every node in a generational arena, so stale ids fail instead of aliasing
//! - Marks nodes dirty and emits one event per mutation
//! - Exposes typed payload views at its boundary

mod landmarks;
mod node;
mod payload;
mod scene_graph;

pub use landmarks::{
    DetectionMetadata, LandmarkSet, EYE_CENTER, LEFT_EAR, NOSE, RIGHT_EAR, TAIL_ATTACHMENT,
    TAIL_TIP,
};
pub use node::{NodeFlags, NodeId, NodeTransform, NodeType, SceneNode, SyncState};
pub use payload::{
    keys, FloorPlanData, MonitorData, MAX_GRID_DIVISIONS, NodeData, Payload, PayloadValue, SubjectData,
};
pub use scene_graph::{SceneTree, VisitControl};

/// Scene errors
///
/// These are programming errors: the caller used an id that no longer exists
/// or asked for an impossible hierarchy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The id does not resolve to a live node
    #[error("{0} has been destroyed")]
    NodeDestroyed(NodeId),

    /// Child is owned by another parent and must be detached first
    #[error("{child} already belongs to {parent}")]
    AlreadyParented {
        /// Node being attached
        child: NodeId,
        /// Its current parent
        parent: NodeId,
    },

    /// Child is the parent itself or one of its ancestors
    #[error("attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// A root was requested while one is alive
    #[error("scene already has a root ({0})")]
    RootExists(NodeId),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
