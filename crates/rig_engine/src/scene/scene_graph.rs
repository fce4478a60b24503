//! Arena-backed scene hierarchy

use slotmap::SlotMap;

use super::landmarks::LandmarkSet;
use super::node::{NodeFlags, NodeId, NodeTransform, NodeType, SceneNode, SyncState};
use super::payload::{keys, FloorPlanData, MonitorData, NodeData, PayloadValue, SubjectData};
use super::{SceneError, SceneResult};
use crate::events::{EventQueue, SceneEvent, SceneEventHandler, SceneEventKind};
use crate::foundation::math::{Mat4, Vec3};

/// Returned by traversal visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    /// Descend into the node's children
    Continue,
    /// Do not visit the node's children
    SkipChildren,
}

/// Owner of every scene node.
///
/// All node mutation goes through this type so each change marks the node
/// dirty and emits exactly one event.
#[derive(Default)]
pub struct SceneTree {
    nodes: SlotMap<NodeId, SceneNode>,
    root: Option<NodeId>,
    events: EventQueue,
}

impl SceneTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    // --- creation -----------------------------------------------------------

    /// Create the root node
    pub fn create_root(&mut self, name: &str) -> SceneResult<NodeId> {
        if let Some(existing) = self.root.filter(|id| self.nodes.contains_key(*id)) {
            return Err(SceneError::RootExists(existing));
        }
        let id = self.create_node(name, NodeType::Root);
        self.root = Some(id);
        Ok(id)
    }

    /// Create a detached node
    pub fn create_node(&mut self, name: &str, node_type: NodeType) -> NodeId {
        let id = self
            .nodes
            .insert_with_key(|id| SceneNode::new(id, name.to_string(), node_type));
        log::debug!("Created {} '{}' ({})", node_type, name, id);
        id
    }

    /// Create a node and attach it under `parent`
    pub fn create_child(
        &mut self,
        parent: NodeId,
        name: &str,
        node_type: NodeType,
    ) -> SceneResult<NodeId> {
        self.node(parent)?;
        let id = self.create_node(name, node_type);
        self.add_child(parent, id)?;
        Ok(id)
    }

    // --- queries ------------------------------------------------------------

    /// Node by id, `None` once destroyed
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Node by id, failing for destroyed ids
    pub fn node(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.nodes.get(id).ok_or(SceneError::NodeDestroyed(id))
    }

    /// Whether the id is alive
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Root node, if one is alive
    pub fn root(&self) -> Option<NodeId> {
        self.root.filter(|id| self.nodes.contains_key(*id))
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> SceneResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Children of a node in attach order
    pub fn children(&self, id: NodeId) -> SceneResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ancestors from the parent up to the top of the hierarchy
    pub fn ancestors(&self, id: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes.get(parent).and_then(|node| node.parent);
        }
        Ok(chain)
    }

    /// Whether `ancestor` is `id` or lies above it
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        if ancestor == id {
            return true;
        }
        self.ancestors(id)
            .map(|chain| chain.contains(&ancestor))
            .unwrap_or(false)
    }

    /// Depth-first pre-order walk.
    ///
    /// The visitor receives each node with its depth relative to `start`
    /// (`start` itself is depth 0).
    pub fn traverse<F>(&self, start: NodeId, include_self: bool, mut visitor: F) -> SceneResult<()>
    where
        F: FnMut(&SceneNode, usize) -> VisitControl,
    {
        let start_node = self.node(start)?;
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        if include_self {
            stack.push((start, 0));
        } else {
            stack.extend(start_node.children.iter().rev().map(|child| (*child, 1)));
        }

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if visitor(node, depth) == VisitControl::SkipChildren {
                continue;
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
        }
        Ok(())
    }

    /// Snapshot of the subtree in pre-order, safe to iterate while mutating
    pub fn descendants(&self, start: NodeId, include_self: bool) -> SceneResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        self.traverse(start, include_self, |node, _| {
            ids.push(node.id);
            VisitControl::Continue
        })?;
        Ok(ids)
    }

    /// Every live node: the rooted hierarchy in pre-order, then detached subtrees
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut ids = match self.root() {
            Some(root) => self.descendants(root, true).unwrap_or_default(),
            None => Vec::new(),
        };
        let mut detached: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, node)| node.parent.is_none() && Some(*id) != self.root())
            .map(|(id, _)| id)
            .collect();
        detached.sort();
        for top in detached {
            ids.extend(self.descendants(top, true).unwrap_or_default());
        }
        ids
    }

    /// First node with the given name, in `all_nodes` order
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.all_nodes()
            .into_iter()
            .find(|id| self.nodes.get(*id).is_some_and(|node| node.name == name))
    }

    /// Every node of a type, in `all_nodes` order
    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeId> {
        self.all_nodes()
            .into_iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|node| node.node_type == node_type))
            .collect()
    }

    /// Local-to-world matrix composed through the ancestors
    pub fn world_matrix(&self, id: NodeId) -> SceneResult<Mat4> {
        let mut matrix = self.node(id)?.transform.to_transform().to_matrix();
        for ancestor in self.ancestors(id)? {
            if let Some(node) = self.nodes.get(ancestor) {
                matrix = node.transform.to_transform().to_matrix() * matrix;
            }
        }
        Ok(matrix)
    }

    /// Whether the node and every ancestor are visible
    pub fn is_effectively_visible(&self, id: NodeId) -> SceneResult<bool> {
        if !self.node(id)?.is_visible() {
            return Ok(false);
        }
        Ok(self
            .ancestors(id)?
            .into_iter()
            .all(|ancestor| self.nodes.get(ancestor).is_some_and(SceneNode::is_visible)))
    }

    // --- hierarchy ----------------------------------------------------------

    /// Attach `child` under `parent`.
    ///
    /// No-op when already attached there. A child owned by another parent must
    /// be detached first (see [`SceneTree::reparent`]).
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.node(parent)?;
        let current = self.node(child)?.parent;

        if self.is_ancestor_or_self(child, parent) || Some(child) == self.root() {
            return Err(SceneError::WouldCreateCycle { parent, child });
        }
        match current {
            Some(owner) if owner == parent => return Ok(()),
            Some(owner) => return Err(SceneError::AlreadyParented { child, parent: owner }),
            None => {}
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        self.mutate(parent, SceneEventKind::ChildAdded { child }, |node| {
            node.children.push(child);
        })
    }

    /// Detach `child` from `parent`.
    ///
    /// Returns whether anything was detached. The child survives as a detached
    /// node.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<bool> {
        if !self.node(parent)?.children.contains(&child) {
            return Ok(false);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.mutate(parent, SceneEventKind::ChildRemoved { child }, |node| {
            node.children.retain(|id| *id != child);
        })?;
        Ok(true)
    }

    /// Detach `child` from its current parent, then attach it under `new_parent`
    pub fn reparent(&mut self, new_parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.node(new_parent)?;
        if self.is_ancestor_or_self(child, new_parent) {
            return Err(SceneError::WouldCreateCycle {
                parent: new_parent,
                child,
            });
        }
        if let Some(old) = self.node(child)?.parent {
            if old == new_parent {
                return Ok(());
            }
            self.remove_child(old, child)?;
        }
        self.add_child(new_parent, child)
    }

    // --- transform and flags ------------------------------------------------

    /// Replace the whole transform
    pub fn set_transform(&mut self, id: NodeId, transform: NodeTransform) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::TransformChanged, |node| {
            node.transform = transform;
        })
    }

    /// Replace the position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::TransformChanged, |node| {
            node.transform.position = position;
        })
    }

    /// Replace the euler rotation (radians)
    pub fn set_rotation(&mut self, id: NodeId, rotation: Vec3) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::TransformChanged, |node| {
            node.transform.rotation = rotation;
        })
    }

    /// Replace the scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::TransformChanged, |node| {
            node.transform.scale = scale;
        })
    }

    /// Show or hide a node
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::VisibilityChanged { visible }, |node| {
            node.flags.set(NodeFlags::VISIBLE, visible);
        })
    }

    /// Enable or disable a node
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> SceneResult<()> {
        self.mutate(id, SceneEventKind::EnabledChanged { enabled }, |node| {
            node.flags.set(NodeFlags::ENABLED, enabled);
        })
    }

    // --- payload ------------------------------------------------------------

    /// Write one payload entry
    pub fn set_data(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl Into<PayloadValue>,
    ) -> SceneResult<()> {
        let value = value.into();
        let kind = SceneEventKind::DataChanged {
            key: key.to_string(),
            value: value.clone(),
        };
        self.mutate(id, kind, |node| {
            node.payload.insert(key.to_string(), value);
        })
    }

    /// Remove one payload entry; returns whether it existed.
    ///
    /// Removing an absent key changes nothing and emits no event.
    pub fn remove_data(&mut self, id: NodeId, key: &str) -> SceneResult<bool> {
        if !self.node(id)?.payload.contains_key(key) {
            return Ok(false);
        }
        let kind = SceneEventKind::DataRemoved { key: key.to_string() };
        self.mutate(id, kind, |node| {
            node.payload.remove(key);
        })?;
        Ok(true)
    }

    /// Read one payload entry
    pub fn get_data(&self, id: NodeId, key: &str) -> SceneResult<Option<&PayloadValue>> {
        Ok(self.node(id)?.payload.get(key))
    }

    /// Typed payload for the node's type
    pub fn node_data(&self, id: NodeId) -> SceneResult<NodeData> {
        let node = self.node(id)?;
        Ok(NodeData::from_payload(node.node_type, &node.payload))
    }

    /// Write every entry of a typed payload
    pub fn set_node_data(&mut self, id: NodeId, data: &NodeData) -> SceneResult<()> {
        self.node(id)?;
        for (key, value) in data.entries() {
            self.set_data(id, key, value)?;
        }
        Ok(())
    }

    /// Floor plan view of a node's payload
    pub fn floor_plan_data(&self, id: NodeId) -> SceneResult<FloorPlanData> {
        Ok(FloorPlanData::from_payload(&self.node(id)?.payload))
    }

    /// Monitor view of a node's payload
    pub fn monitor_data(&self, id: NodeId) -> SceneResult<MonitorData> {
        Ok(MonitorData::from_payload(&self.node(id)?.payload))
    }

    /// Subject view of a node's payload
    pub fn subject_data(&self, id: NodeId) -> SceneResult<SubjectData> {
        Ok(SubjectData::from_payload(&self.node(id)?.payload))
    }

    /// Stored landmark set
    pub fn landmarks(&self, id: NodeId) -> SceneResult<Option<&LandmarkSet>> {
        Ok(self
            .node(id)?
            .payload
            .get(keys::LANDMARKS)
            .and_then(PayloadValue::as_landmarks))
    }

    /// Store a landmark set, replacing any previous one
    pub fn set_landmarks(&mut self, id: NodeId, landmarks: LandmarkSet) -> SceneResult<()> {
        self.set_data(id, keys::LANDMARKS, landmarks)
    }

    // --- sync state ---------------------------------------------------------

    /// Whether the node has unreconciled changes
    pub fn needs_sync(&self, id: NodeId) -> SceneResult<bool> {
        Ok(self.node(id)?.needs_sync())
    }

    /// Current sync state
    pub fn sync_state(&self, id: NodeId) -> SceneResult<SyncState> {
        Ok(self.node(id)?.sync)
    }

    /// Record that the render state matches the node.
    ///
    /// Only the render engine calls this, after reconciling the node.
    pub fn mark_synced(&mut self, id: NodeId) -> SceneResult<()> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeDestroyed(id))?;
        node.sync = SyncState::Synced;
        Ok(())
    }

    // --- lifecycle ----------------------------------------------------------

    /// Destroy a node and its whole subtree.
    ///
    /// Detaches from the parent, removes every descendant, drops their
    /// listeners and emits `Destroyed` for each. Returns the number of nodes
    /// removed; destroying a stale id removes nothing.
    pub fn destroy(&mut self, id: NodeId) -> usize {
        if !self.nodes.contains_key(id) {
            return 0;
        }
        if let Some(parent) = self.nodes.get(id).and_then(|node| node.parent) {
            // Parent is alive while the child is
            let _ = self.remove_child(parent, id);
        }

        let doomed = self.descendants(id, true).unwrap_or_default();
        for node_id in doomed.iter().rev() {
            if self.nodes.remove(*node_id).is_some() {
                self.events.emit(SceneEvent::new(*node_id, SceneEventKind::Destroyed));
                self.events.unsubscribe_all(*node_id);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        log::debug!("Destroyed {} node(s) under {}", doomed.len(), id);
        doomed.len()
    }

    /// Destroy every node
    pub fn clear(&mut self) -> usize {
        let tops: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect();
        tops.into_iter().map(|id| self.destroy(id)).sum()
    }

    // --- events -------------------------------------------------------------

    /// Register a listener for one node's events
    pub fn subscribe(&mut self, id: NodeId, handler: Box<dyn SceneEventHandler>) -> SceneResult<()> {
        self.node(id)?;
        self.events.subscribe(id, handler);
        Ok(())
    }

    /// Take every event emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain()
    }

    /// Number of undrained events
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn mutate<F>(&mut self, id: NodeId, kind: SceneEventKind, apply: F) -> SceneResult<()>
    where
        F: FnOnce(&mut SceneNode),
    {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeDestroyed(id))?;
        apply(node);
        node.mark_dirty();
        self.events.emit(SceneEvent::new(id, kind));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NOSE;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rig() -> (SceneTree, NodeId, NodeId, NodeId) {
        let mut tree = SceneTree::new();
        let root = tree.create_root("root").expect("root");
        let floor = tree.create_child(root, "floor", NodeType::FloorPlan).expect("floor");
        let subject = tree.create_child(root, "subject", NodeType::Subject).expect("subject");
        tree.drain_events();
        (tree, root, floor, subject)
    }

    #[test]
    fn test_new_node_starts_clean() {
        let mut tree = SceneTree::new();
        let id = tree.create_node("loose", NodeType::Generic);
        assert_eq!(tree.sync_state(id), Ok(SyncState::Clean));
        assert_eq!(tree.needs_sync(id), Ok(false));
    }

    #[test]
    fn test_add_child_marks_parent_dirty_and_emits() {
        let mut tree = SceneTree::new();
        let root = tree.create_root("root").expect("root");
        let child = tree.create_node("child", NodeType::Generic);

        tree.add_child(root, child).expect("attach");

        assert_eq!(tree.parent(child), Ok(Some(root)));
        assert_eq!(tree.children(root).expect("root alive"), &[child]);
        assert_eq!(tree.needs_sync(root), Ok(true));
        assert_eq!(
            tree.drain_events(),
            vec![SceneEvent::new(root, SceneEventKind::ChildAdded { child })]
        );
    }

    #[test]
    fn test_add_child_rejects_owned_child() {
        let (mut tree, _, floor, subject) = rig();
        let err = tree.add_child(floor, subject).unwrap_err();
        assert!(matches!(err, SceneError::AlreadyParented { child, .. } if child == subject));

        // Same parent again is a no-op
        let root = tree.root().expect("root");
        tree.add_child(root, subject).expect("idempotent");
        assert_eq!(tree.children(root).expect("root alive").len(), 2);
        assert_eq!(tree.pending_events(), 0);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let (mut tree, root, floor, _) = rig();
        let tile = tree.create_child(floor, "tile", NodeType::Generic).expect("tile");

        assert!(matches!(
            tree.reparent(tile, floor),
            Err(SceneError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            tree.add_child(floor, floor),
            Err(SceneError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            tree.add_child(tile, root),
            Err(SceneError::WouldCreateCycle { .. })
        ));
    }

    #[test]
    fn test_reparent_detaches_first() {
        let (mut tree, root, floor, subject) = rig();
        tree.reparent(floor, subject).expect("reparent");

        assert_eq!(tree.children(root).expect("root alive"), &[floor]);
        assert_eq!(tree.children(floor).expect("floor alive"), &[subject]);
        let kinds: Vec<SceneEventKind> = tree.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SceneEventKind::ChildRemoved { child: subject },
                SceneEventKind::ChildAdded { child: subject },
            ]
        );
    }

    #[test]
    fn test_remove_child_missing_is_noop() {
        let (mut tree, root, floor, subject) = rig();
        assert_eq!(tree.remove_child(floor, subject), Ok(false));
        assert_eq!(tree.pending_events(), 0);

        assert_eq!(tree.remove_child(root, subject), Ok(true));
        assert!(tree.contains(subject));
        assert_eq!(tree.parent(subject), Ok(None));
    }

    #[test]
    fn test_traverse_pre_order_with_skip() {
        let (mut tree, root, floor, subject) = rig();
        let tile = tree.create_child(floor, "tile", NodeType::Generic).expect("tile");

        let mut visited = Vec::new();
        tree.traverse(root, true, |node, depth| {
            visited.push((node.id(), depth));
            VisitControl::Continue
        })
        .expect("traverse");
        assert_eq!(visited, vec![(root, 0), (floor, 1), (tile, 2), (subject, 1)]);

        let mut names = Vec::new();
        tree.traverse(root, false, |node, _| {
            names.push(node.name().to_string());
            if node.node_type() == NodeType::FloorPlan {
                VisitControl::SkipChildren
            } else {
                VisitControl::Continue
            }
        })
        .expect("traverse");
        assert_eq!(names, vec!["floor", "subject"]);
    }

    #[test]
    fn test_setters_mark_dirty_and_emit() {
        let (mut tree, _, floor, _) = rig();
        tree.mark_synced(floor).expect("alive");

        tree.set_position(floor, Vec3::new(1.0, 2.0, 3.0)).expect("alive");
        assert_eq!(tree.sync_state(floor), Ok(SyncState::Dirty));
        tree.set_data(floor, keys::WIDTH, 50.0_f32).expect("alive");
        tree.set_visible(floor, false).expect("alive");

        let kinds: Vec<SceneEventKind> = tree.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SceneEventKind::TransformChanged,
                SceneEventKind::DataChanged {
                    key: keys::WIDTH.to_string(),
                    value: PayloadValue::Number(50.0),
                },
                SceneEventKind::VisibilityChanged { visible: false },
            ]
        );
        assert_relative_eq!(tree.floor_plan_data(floor).expect("alive").width, 50.0);

        tree.mark_synced(floor).expect("alive");
        assert_eq!(tree.needs_sync(floor), Ok(false));
    }

    #[test]
    fn test_destroy_is_recursive_and_idempotent() {
        let (mut tree, root, floor, _) = rig();
        let tile = tree.create_child(floor, "tile", NodeType::Generic).expect("tile");

        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        tree.subscribe(tile, Box::new(move |event: &SceneEvent| {
            if event.kind == SceneEventKind::Destroyed {
                *counter.borrow_mut() += 1;
            }
            false
        }))
        .expect("alive");

        assert_eq!(tree.destroy(floor), 2);
        assert_eq!(tree.destroy(floor), 0);
        assert!(!tree.contains(tile));
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(tree.children(root).expect("root alive").len(), 1);
        assert_eq!(tree.set_position(tile, Vec3::zeros()), Err(SceneError::NodeDestroyed(tile)));
    }

    #[test]
    fn test_world_matrix_composes_ancestors() {
        let (mut tree, root, floor, _) = rig();
        let tile = tree.create_child(floor, "tile", NodeType::Generic).expect("tile");
        tree.set_position(root, Vec3::new(0.0, 1.0, 0.0)).expect("alive");
        tree.set_position(floor, Vec3::new(2.0, 0.0, 0.0)).expect("alive");
        tree.set_position(tile, Vec3::new(0.0, 0.0, 3.0)).expect("alive");

        let world = tree.world_matrix(tile).expect("alive");
        let origin = world.transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(origin.coords, Vec3::new(2.0, 1.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_queries_and_landmarks() {
        let (mut tree, _, floor, subject) = rig();
        let orphan = tree.create_node("orphan", NodeType::Subject);

        assert_eq!(tree.find_by_name("floor"), Some(floor));
        assert_eq!(tree.nodes_of_type(NodeType::Subject), vec![subject, orphan]);
        assert_eq!(tree.all_nodes().len(), 4);

        let set = LandmarkSet::from_points([(NOSE, Vec3::new(0.0, 0.0, 1.0))]);
        tree.set_landmarks(subject, set.clone()).expect("alive");
        assert_eq!(tree.landmarks(subject), Ok(Some(&set)));

        tree.drain_events();
        assert_eq!(tree.remove_data(subject, keys::LANDMARKS), Ok(true));
        assert_eq!(tree.remove_data(subject, keys::LANDMARKS), Ok(false));
        assert_eq!(tree.landmarks(subject), Ok(None));
        assert_eq!(tree.drain_events().len(), 1);
    }

    #[test]
    fn test_hidden_ancestor_hides_descendants() {
        let (mut tree, root, floor, _) = rig();
        let tile = tree.create_child(floor, "tile", NodeType::Generic).expect("tile");
        assert_eq!(tree.is_effectively_visible(tile), Ok(true));
        tree.set_visible(root, false).expect("alive");
        assert_eq!(tree.is_effectively_visible(tile), Ok(false));
    }
}
