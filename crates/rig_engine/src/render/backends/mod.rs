//! Backend implementations for the render module
//!
//! Only the in-memory headless backend ships with the crate; GPU backends
//! implement [`RenderBackend`](super::RenderBackend) outside it.

/// Headless in-memory backend
pub mod headless;

pub use headless::{FrameSummary, HeadlessBackend, ResourceCounters};
