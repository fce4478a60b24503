//! # Rig Engine
//!
//! Scene graph, render reconciliation and landmark-driven alignment for an
//! imaging rig visualization: a floor plan, a display monitor placed in front
//! of the subject's eye, and a subject model oriented from detected landmarks.
//!
//! ## Features
//!
//! - **Scene tree**: typed nodes with explicit sync state and change events
//! - **Rendering engine**: per-type builders, event-driven reconciliation,
//!   exactly-once resource release
//! - **Async enrichment**: background mesh loading and landmark detection
//!   with late-result tolerance
//! - **Orientation alignment**: minimal rotation from nose/tail landmarks
//! - **Orchestrator**: lifecycle, parameter bindings, camera and frame loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rig_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RigConfig::default();
//!     let mut orchestrator = Orchestrator::new(config);
//!     let mut surface = HeadlessSurface::new(1280, 720);
//!
//!     orchestrator.initialize(Some(&mut surface))?;
//!     orchestrator.on_input_changed("monitor-distance", 15.0)?;
//!     orchestrator.run(120)?;
//!     orchestrator.dispose();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod events;
pub mod scene;
pub mod alignment;
pub mod assets;
pub mod landmarks;
pub mod render;
pub mod orchestrator;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        alignment::{AlignmentOutcome, OrientationAligner},
        assets::{FileMeshSource, MemoryMeshSource, MeshSource},
        config::{Config, RigConfig, TaskMode},
        foundation::{
            math::{Aabb, Mat4, Quat, Transform, Vec3},
            time::Timer,
        },
        landmarks::{HttpLandmarkService, LandmarkService},
        orchestrator::{HeadlessSurface, InitError, InputKind, Orchestrator, ParameterValue, RenderContainer},
        render::{Camera, HeadlessBackend, Mesh, RenderBackend, RenderingEngine},
        scene::{LandmarkSet, NodeData, NodeId, NodeType, SceneNode, SceneTree},
    };
}
