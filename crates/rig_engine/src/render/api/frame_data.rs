//! Frame rendering data structures
//!
//! The engine builds one [`RenderFrameData`] per frame; the backend consumes
//! it in a single `draw_frame` call.

use crate::foundation::math::Mat4;
use crate::render::primitives::Camera;
use crate::scene::NodeId;

use super::render_backend::{MaterialHandle, MeshHandle};

/// One mesh draw with its world transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Node the draw belongs to
    pub node: NodeId,
    /// Geometry
    pub mesh: MeshHandle,
    /// Surface; `None` uses the backend default
    pub material: Option<MaterialHandle>,
    /// Local-to-world matrix
    pub world: Mat4,
}

/// Complete frame rendering data
#[derive(Debug)]
pub struct RenderFrameData<'a> {
    /// Camera parameters (view/projection matrices)
    pub camera: &'a Camera,

    /// Draw list in submission order
    pub draws: &'a [DrawCommand],

    /// Background color
    pub clear_color: [f32; 4],
}
