//! Scene node data
//!
//! A scene node is a pure data container: identity, hierarchy links, a
//! transform, a payload and state flags. It knows nothing about rendering.
//! Nodes are owned by [`SceneTree`](super::SceneTree), which is the only
//! place they can be mutated, so every mutation can mark the node dirty and
//! emit its change event.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::payload::{Payload, PayloadValue};
use crate::foundation::math::{Transform, Vec3};

slotmap::new_key_type! {
    /// Unique node identifier.
    ///
    /// Generational: once a node is destroyed its id never resolves again,
    /// even if the slot is reused.
    pub struct NodeId;
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use slotmap::Key;
        write!(f, "node#{}", self.data().as_ffi())
    }
}

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Hierarchy root
    Root,
    /// Floor plan with grid
    FloorPlan,
    /// Stimulus display monitor
    Monitor,
    /// Subject model loaded from a mesh
    Subject,
    /// Anything else
    Generic,
}

impl NodeType {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::FloorPlan => "floor_plan",
            NodeType::Monitor => "monitor",
            NodeType::Subject => "subject",
            NodeType::Generic => "generic",
        }
    }

    /// Parse a type tag; unrecognized tags map to `Generic`
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "root" => NodeType::Root,
            "floor_plan" | "floorplan" | "floor" => NodeType::FloorPlan,
            "monitor" | "display" => NodeType::Monitor,
            "subject" | "mouse" => NodeType::Subject,
            "generic" => NodeType::Generic,
            other => {
                log::warn!("Unknown node type '{}', treating as generic", other);
                NodeType::Generic
            }
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation state of a node
///
/// `Clean` is the state of a freshly created node that no renderer has seen.
/// Any mutation moves the node to `Dirty`; the render engine moves it to
/// `Synced` once its render object reflects the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Never reconciled, never mutated
    Clean,
    /// Mutated since the last reconcile
    Dirty,
    /// Render state matches the node
    Synced,
}

bitflags! {
    /// Boolean node state
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node should be rendered
        const VISIBLE = 0b0000_0001;
        /// Node accepts parameter updates
        const ENABLED = 0b0000_0010;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::VISIBLE | NodeFlags::ENABLED
    }
}

/// Local transform of a node: position, XYZ euler rotation (radians), scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    /// Position relative to the parent
    pub position: Vec3,
    /// Rotation as euler angles about X, Y and Z in radians
    pub rotation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl NodeTransform {
    /// Transform with only a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Builder pattern: rotation
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder pattern: scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Quaternion-based transform used by the renderer
    pub fn to_transform(&self) -> Transform {
        Transform::from_euler(self.position, self.rotation, self.scale)
    }
}

/// One logical entity of the scene
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) node_type: NodeType,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) transform: NodeTransform,
    pub(crate) payload: Payload,
    pub(crate) flags: NodeFlags,
    pub(crate) sync: SyncState,
}

impl SceneNode {
    pub(crate) fn new(id: NodeId, name: String, node_type: NodeType) -> Self {
        Self {
            id,
            name,
            node_type,
            parent: None,
            children: Vec::new(),
            transform: NodeTransform::default(),
            payload: Payload::default(),
            flags: NodeFlags::default(),
            sync: SyncState::Clean,
        }
    }

    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Owning parent, `None` for the root and for detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Owned children in attach order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local transform
    pub fn transform(&self) -> &NodeTransform {
        &self.transform
    }

    /// Raw payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload entry by key
    pub fn data(&self, key: &str) -> Option<&PayloadValue> {
        self.payload.get(key)
    }

    /// Whether the node should be rendered
    pub fn is_visible(&self) -> bool {
        self.flags.contains(NodeFlags::VISIBLE)
    }

    /// Whether the node accepts parameter updates
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(NodeFlags::ENABLED)
    }

    /// Current reconciliation state
    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    /// True while the node has unreconciled mutations
    pub fn needs_sync(&self) -> bool {
        self.sync == SyncState::Dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.sync = SyncState::Dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_parse_falls_back_to_generic() {
        assert_eq!(NodeType::parse("Monitor"), NodeType::Monitor);
        assert_eq!(NodeType::parse("floor_plan"), NodeType::FloorPlan);
        assert_eq!(NodeType::parse("laser"), NodeType::Generic);
    }

    #[test]
    fn test_default_flags_visible_and_enabled() {
        let flags = NodeFlags::default();
        assert!(flags.contains(NodeFlags::VISIBLE));
        assert!(flags.contains(NodeFlags::ENABLED));
    }
}
