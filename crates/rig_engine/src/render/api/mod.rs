//! Public rendering API
//!
//! The render backend trait, its resource handles and the per-frame data the
//! engine hands to it.

pub mod frame_data;
pub mod render_backend;

// Re-export commonly used types
pub use frame_data::{DrawCommand, RenderFrameData};
pub use render_backend::{BackendResult, MaterialHandle, MeshHandle, RenderBackend};
