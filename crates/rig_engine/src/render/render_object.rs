//! Render object representation for scene nodes
//!
//! A [`RenderObject`] is the drawable counterpart of one scene node: a small
//! tree of [`RenderPart`]s, each optionally holding a mesh and a material
//! handle. The root part carries the node's transform; inner parts carry
//! local offsets (the subject's alignment, marker positions).
//!
//! Handles are taken out of a part when it is released, so disposing an
//! object twice never releases a resource twice.

use crate::foundation::math::{Aabb, Mat4, Transform};
use crate::scene::{NodeData, NodeId, NodeTransform, NodeType};

use super::api::{DrawCommand, MaterialHandle, MeshHandle, RenderBackend};

/// One element of a render object
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPart {
    name: String,
    geometry: Option<MeshHandle>,
    material: Option<MaterialHandle>,
    local_bounds: Option<Aabb>,
    /// Transform relative to the parent part
    pub transform: Transform,
    /// Hidden parts and their children are not drawn
    pub visible: bool,
    children: Vec<RenderPart>,
}

impl RenderPart {
    /// Empty group part
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            geometry: None,
            material: None,
            local_bounds: None,
            transform: Transform::identity(),
            visible: true,
            children: Vec::new(),
        }
    }

    /// Builder pattern: attach geometry with its local bounds
    pub fn with_geometry(mut self, mesh: MeshHandle, bounds: Option<Aabb>) -> Self {
        self.geometry = Some(mesh);
        self.local_bounds = bounds;
        self
    }

    /// Builder pattern: attach a material
    pub fn with_material(mut self, material: MaterialHandle) -> Self {
        self.material = Some(material);
        self
    }

    /// Builder pattern: set the local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Part name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometry handle, while not released
    pub fn geometry(&self) -> Option<MeshHandle> {
        self.geometry
    }

    /// Material handle, while not released
    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    /// Child parts
    pub fn children(&self) -> &[RenderPart] {
        &self.children
    }

    /// Mutable child parts
    pub fn children_mut(&mut self) -> &mut [RenderPart] {
        &mut self.children
    }

    /// Append a child part
    pub fn add_child(&mut self, child: RenderPart) {
        self.children.push(child);
    }

    /// Detach every direct child matching `predicate`
    pub fn take_children_where(&mut self, mut predicate: impl FnMut(&RenderPart) -> bool) -> Vec<RenderPart> {
        let (taken, kept): (Vec<RenderPart>, Vec<RenderPart>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|child| predicate(child));
        self.children = kept;
        taken
    }

    /// Depth-first search by name, self included
    pub fn find(&self, name: &str) -> Option<&RenderPart> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Mutable depth-first search by name, self included
    pub fn find_mut(&mut self, name: &str) -> Option<&mut RenderPart> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(name))
    }

    /// Live (meshes, materials) held by this part and its children
    pub fn resource_count(&self) -> (usize, usize) {
        self.children.iter().fold(
            (
                usize::from(self.geometry.is_some()),
                usize::from(self.material.is_some()),
            ),
            |(meshes, materials), child| {
                let (m, t) = child.resource_count();
                (meshes + m, materials + t)
            },
        )
    }

    /// Release every handle in this subtree; returns the number released.
    ///
    /// Backend failures are logged and do not stop the walk.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let mut released = 0;
        if let Some(mesh) = self.geometry.take() {
            match backend.release_mesh_resource(mesh) {
                Ok(()) => released += 1,
                Err(e) => log::warn!("Failed to release mesh of part '{}': {}", self.name, e),
            }
        }
        if let Some(material) = self.material.take() {
            match backend.release_material(material) {
                Ok(()) => released += 1,
                Err(e) => log::warn!("Failed to release material of part '{}': {}", self.name, e),
            }
        }
        for child in &mut self.children {
            released += child.release(backend);
        }
        released
    }

    fn collect_draws(&self, parent_world: &Mat4, node: NodeId, out: &mut Vec<DrawCommand>) {
        if !self.visible {
            return;
        }
        let world = parent_world * self.transform.to_matrix();
        if let Some(mesh) = self.geometry {
            out.push(DrawCommand {
                node,
                mesh,
                material: self.material,
                world,
            });
        }
        for child in &self.children {
            child.collect_draws(&world, node, out);
        }
    }

    fn bounds(&self, parent_world: &Mat4) -> Option<Aabb> {
        if !self.visible {
            return None;
        }
        let world = parent_world * self.transform.to_matrix();
        let own = self.local_bounds.map(|b| b.transformed(&world));
        self.children
            .iter()
            .filter_map(|child| child.bounds(&world))
            .fold(own, |acc, b| Some(acc.map_or(b, |a| a.merged(&b))))
    }
}

/// Node state last written into a render object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedState {
    /// Node transform
    pub transform: NodeTransform,
    /// Node visibility flag
    pub visible: bool,
}

/// Drawable counterpart of one scene node
#[derive(Debug)]
pub struct RenderObject {
    node: NodeId,
    node_type: NodeType,
    built_from: NodeData,
    root: RenderPart,
    applied: Option<AppliedState>,
    disposed: bool,
}

impl RenderObject {
    /// New object with an empty root part
    pub fn new(node: NodeId, node_type: NodeType, built_from: NodeData) -> Self {
        Self {
            node,
            node_type,
            built_from,
            root: RenderPart::new(node_type.as_str()),
            applied: None,
            disposed: false,
        }
    }

    /// Builder pattern: add a part under the root
    pub fn with_part(mut self, part: RenderPart) -> Self {
        self.root.add_child(part);
        self
    }

    /// Node this object draws
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Type of the node at build time
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Payload view the object was built from
    pub fn built_from(&self) -> &NodeData {
        &self.built_from
    }

    /// Root part (carries the node transform)
    pub fn root(&self) -> &RenderPart {
        &self.root
    }

    /// Mutable root part
    pub fn root_mut(&mut self) -> &mut RenderPart {
        &mut self.root
    }

    /// Part by name anywhere in the object
    pub fn find_part(&self, name: &str) -> Option<&RenderPart> {
        self.root.find(name)
    }

    /// Mutable part by name anywhere in the object
    pub fn find_part_mut(&mut self, name: &str) -> Option<&mut RenderPart> {
        self.root.find_mut(name)
    }

    /// State written by the last `apply_node_state`
    pub fn applied_state(&self) -> Option<AppliedState> {
        self.applied
    }

    /// Write the node transform and visibility into the root part.
    ///
    /// Returns `false` when the state was already applied.
    pub fn apply_node_state(&mut self, transform: &NodeTransform, visible: bool) -> bool {
        let state = AppliedState {
            transform: *transform,
            visible,
        };
        if self.applied == Some(state) {
            return false;
        }
        self.root.transform = transform.to_transform();
        self.root.visible = visible;
        self.applied = Some(state);
        true
    }

    /// Live (meshes, materials) held by the object
    pub fn resource_count(&self) -> (usize, usize) {
        self.root.resource_count()
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release every resource the object holds. Safe to call more than once.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) -> usize {
        if self.disposed {
            return 0;
        }
        self.disposed = true;
        let released = self.root.release(backend);
        log::debug!("Disposed render object for {} ({} resources)", self.node, released);
        released
    }

    /// Append draw commands given the parent node's world matrix
    pub fn collect_draws(&self, parent_world: &Mat4, out: &mut Vec<DrawCommand>) {
        if !self.disposed {
            self.root.collect_draws(parent_world, self.node, out);
        }
    }

    /// World-space bounds of the visible geometry
    pub fn world_bounds(&self, parent_world: &Mat4) -> Option<Aabb> {
        if self.disposed {
            return None;
        }
        self.root.bounds(parent_world)
    }
}

impl Drop for RenderObject {
    fn drop(&mut self) {
        if !self.disposed {
            let (meshes, materials) = self.resource_count();
            if meshes + materials > 0 {
                log::warn!(
                    "Render object for {} dropped without dispose ({} meshes, {} materials leaked)",
                    self.node,
                    meshes,
                    materials
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessBackend;
    use crate::render::primitives::Mesh;
    use crate::render::{Material, UnlitMaterialParams};
    use crate::scene::{NodeType, SceneTree};
    use approx::assert_relative_eq;

    fn part_with_cube(backend: &mut HeadlessBackend, name: &str, edge: f32) -> RenderPart {
        let mesh = Mesh::cube(edge);
        let geometry = backend.create_mesh_resource(&mesh).expect("mesh");
        let material = backend.create_material(&Material::unlit(UnlitMaterialParams::default())).expect("material");
        RenderPart::new(name)
            .with_geometry(geometry, mesh.bounds())
            .with_material(material)
    }

    fn node() -> NodeId {
        SceneTree::new().create_node("generic", NodeType::Generic)
    }

    #[test]
    fn test_dispose_releases_exactly_once() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut inner = part_with_cube(&mut backend, "inner", 1.0);
        inner.add_child(part_with_cube(&mut backend, "leaf", 0.5));
        let mut object = RenderObject::new(node(), NodeType::Generic, NodeData::Generic).with_part(inner);

        assert_eq!(object.resource_count(), (2, 2));
        assert_eq!(object.dispose(&mut backend), 4);
        assert_eq!(object.dispose(&mut backend), 0);
        assert_eq!(backend.live_meshes(), 0);
        assert_eq!(backend.counters().invalid_releases, 0);
    }

    #[test]
    fn test_apply_node_state_detects_no_change() {
        let mut object = RenderObject::new(node(), NodeType::Generic, NodeData::Generic);
        let transform = NodeTransform::from_position(Vec3::new(1.0, 2.0, 3.0));

        assert!(object.apply_node_state(&transform, true));
        assert!(!object.apply_node_state(&transform, true));
        assert!(object.apply_node_state(&transform, false));
        assert!(!object.root().visible);
    }

    #[test]
    fn test_draws_and_bounds_follow_part_transforms() {
        let mut backend = HeadlessBackend::new(64, 64);
        let part = part_with_cube(&mut backend, "box", 2.0)
            .with_transform(Transform::from_position(Vec3::new(0.0, 5.0, 0.0)));
        let mut object = RenderObject::new(node(), NodeType::Generic, NodeData::Generic).with_part(part);
        object.apply_node_state(&NodeTransform::from_position(Vec3::new(10.0, 0.0, 0.0)), true);

        let mut draws = Vec::new();
        object.collect_draws(&Mat4::identity(), &mut draws);
        assert_eq!(draws.len(), 1);

        let bounds = object.world_bounds(&Mat4::identity()).expect("visible geometry");
        assert_relative_eq!(bounds.center(), Vec3::new(10.0, 5.0, 0.0), epsilon = 1e-5);

        object.find_part_mut("box").expect("part").visible = false;
        assert!(object.world_bounds(&Mat4::identity()).is_none());
        object.dispose(&mut backend);
    }
}
