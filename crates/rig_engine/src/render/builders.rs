//! Per-node-type render object builders
//!
//! The engine looks up a [`NodeBuilder`] by node type in the
//! [`BuilderRegistry`]; unknown or unregistered types fall back to the
//! generic placeholder builder. Builders create backend resources through a
//! [`BuildContext`], which releases everything it created if the build fails
//! part way.

use std::collections::HashMap;

use crate::config::RenderConfig;
use crate::foundation::math::{Transform, Vec3};
use crate::scene::{
    FloorPlanData, LandmarkSet, MonitorData, NodeData, NodeType, SceneNode, EYE_CENTER, LEFT_EAR,
    NOSE, RIGHT_EAR, TAIL_ATTACHMENT, TAIL_TIP,
};

use super::api::{MaterialHandle, MeshHandle, RenderBackend};
use super::material::{hex_color, Material, StandardMaterialParams, UnlitMaterialParams};
use super::primitives::Mesh;
use super::render_object::{RenderObject, RenderPart};
use super::RenderResult;

/// Part holding a loaded subject mesh
pub const MESH_PART: &str = "mesh";
/// Part standing in for a subject mesh that could not be loaded
pub const PLACEHOLDER_PART: &str = "placeholder";
/// Name prefix of landmark marker parts
pub const MARKER_PREFIX: &str = "marker:";

const MARKER_SEGMENTS: u32 = 12;
const MARKER_RINGS: u32 = 8;

/// Resource creation scope for one build
pub struct BuildContext<'a> {
    backend: &'a mut dyn RenderBackend,
    config: &'a RenderConfig,
    meshes: Vec<MeshHandle>,
    materials: Vec<MaterialHandle>,
}

impl<'a> BuildContext<'a> {
    /// Start a build against `backend`
    pub fn new(backend: &'a mut dyn RenderBackend, config: &'a RenderConfig) -> Self {
        Self {
            backend,
            config,
            meshes: Vec::new(),
            materials: Vec::new(),
        }
    }

    /// Engine settings
    pub fn config(&self) -> &RenderConfig {
        self.config
    }

    /// Upload `mesh` and `material` into a new part
    pub fn mesh_part(
        &mut self,
        name: impl Into<String>,
        mesh: &Mesh,
        material: &Material,
    ) -> RenderResult<RenderPart> {
        let geometry = self.backend.create_mesh_resource(mesh)?;
        self.meshes.push(geometry);
        let material = self.backend.create_material(material)?;
        self.materials.push(material);
        Ok(RenderPart::new(name)
            .with_geometry(geometry, mesh.bounds())
            .with_material(material))
    }

    /// Release a part that existed before this scope
    pub fn release_part(&mut self, part: &mut RenderPart) -> usize {
        part.release(&mut *self.backend)
    }

    /// Keep everything created in this scope
    pub fn commit(self) {}

    /// Release everything created in this scope
    pub fn rollback(self) -> usize {
        let mut released = 0;
        for mesh in self.meshes {
            if self.backend.release_mesh_resource(mesh).is_ok() {
                released += 1;
            }
        }
        for material in self.materials {
            if self.backend.release_material(material).is_ok() {
                released += 1;
            }
        }
        released
    }
}

/// Builds the render object for one node type
pub trait NodeBuilder {
    /// Build the object for `node`, or `None` when the node draws nothing
    fn build(
        &self,
        ctx: &mut BuildContext<'_>,
        node: &SceneNode,
        data: &NodeData,
    ) -> RenderResult<Option<RenderObject>>;

    /// Whether an object built from `built` must be rebuilt for `current`
    fn needs_rebuild(&self, built: &NodeData, current: &NodeData) -> bool {
        built != current
    }
}

/// Node-type to builder lookup with a generic fallback
pub struct BuilderRegistry {
    builders: HashMap<NodeType, Box<dyn NodeBuilder>>,
    fallback: Box<dyn NodeBuilder>,
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(NodeType::Root, Box::new(RootBuilder));
        registry.register(NodeType::FloorPlan, Box::new(FloorPlanBuilder));
        registry.register(NodeType::Monitor, Box::new(MonitorBuilder));
        registry.register(NodeType::Subject, Box::new(SubjectBuilder));
        registry.register(NodeType::Generic, Box::new(GenericBuilder));
        registry
    }
}

impl BuilderRegistry {
    /// Registry with only the fallback
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
            fallback: Box::new(GenericBuilder),
        }
    }

    /// Register or replace the builder for a node type
    pub fn register(
        &mut self,
        node_type: NodeType,
        builder: Box<dyn NodeBuilder>,
    ) -> Option<Box<dyn NodeBuilder>> {
        self.builders.insert(node_type, builder)
    }

    /// Whether a dedicated builder exists for `node_type`
    pub fn contains(&self, node_type: NodeType) -> bool {
        self.builders.contains_key(&node_type)
    }

    /// Builder for `node_type`, falling back to the generic placeholder
    pub fn get(&self, node_type: NodeType) -> &dyn NodeBuilder {
        match self.builders.get(&node_type) {
            Some(builder) => builder.as_ref(),
            None => {
                log::debug!("No builder for {}, using placeholder", node_type);
                self.fallback.as_ref()
            }
        }
    }
}

/// The root draws nothing
pub struct RootBuilder;

impl NodeBuilder for RootBuilder {
    fn build(
        &self,
        _ctx: &mut BuildContext<'_>,
        _node: &SceneNode,
        _data: &NodeData,
    ) -> RenderResult<Option<RenderObject>> {
        Ok(None)
    }
}

/// Floor surface with a line grid on top
pub struct FloorPlanBuilder;

impl NodeBuilder for FloorPlanBuilder {
    fn build(
        &self,
        ctx: &mut BuildContext<'_>,
        node: &SceneNode,
        data: &NodeData,
    ) -> RenderResult<Option<RenderObject>> {
        let floor = match data {
            NodeData::FloorPlan(floor) => floor.clone(),
            _ => FloorPlanData::default(),
        };

        let surface = ctx.mesh_part(
            "floor",
            &Mesh::plane(floor.width, floor.depth),
            &Material::standard_pbr(StandardMaterialParams {
                base_color: hex_color(0x808080),
                roughness: 0.9,
                ..Default::default()
            })
            .with_name("floor"),
        )?;
        let grid = ctx
            .mesh_part(
                "grid",
                &Mesh::grid(floor.width, floor.depth, floor.grid_divisions.max(1)),
                &Material::unlit(UnlitMaterialParams {
                    color: hex_color(0x444444),
                    alpha: 1.0,
                })
                .with_name("floor_grid"),
            )?
            // Just above the floor surface
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.01, 0.0)));

        Ok(Some(
            RenderObject::new(node.id(), node.node_type(), data.clone())
                .with_part(surface)
                .with_part(grid),
        ))
    }
}

/// Display frame with the screen on its +Z face
pub struct MonitorBuilder;

impl NodeBuilder for MonitorBuilder {
    fn build(
        &self,
        ctx: &mut BuildContext<'_>,
        node: &SceneNode,
        data: &NodeData,
    ) -> RenderResult<Option<RenderObject>> {
        let monitor = match data {
            NodeData::Monitor(monitor) => monitor.clone(),
            _ => MonitorData::default(),
        };
        let bezel = 1.0;
        let frame_depth = 0.5;

        let frame = ctx.mesh_part(
            "frame",
            &Mesh::cuboid(Vec3::new(monitor.width + 2.0 * bezel, monitor.height + 2.0 * bezel, frame_depth)),
            &Material::standard_pbr(StandardMaterialParams {
                base_color: hex_color(0x222222),
                metallic: 0.3,
                ..Default::default()
            })
            .with_name("monitor_frame"),
        )?;
        let screen = ctx
            .mesh_part(
                "screen",
                &Mesh::cuboid(Vec3::new(monitor.width, monitor.height, 0.05)),
                &Material::unlit(UnlitMaterialParams {
                    color: hex_color(0x88ccff),
                    alpha: 1.0,
                })
                .with_name("monitor_screen"),
            )?
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, frame_depth * 0.5 + 0.03)));

        Ok(Some(
            RenderObject::new(node.id(), node.node_type(), data.clone())
                .with_part(frame)
                .with_part(screen),
        ))
    }
}

/// Subject model scaled and centered for display
#[derive(Debug, Clone)]
pub struct SubjectMesh {
    /// Mesh as loaded, in its own coordinates
    pub source: Mesh,
    /// Bounding-box center of the source mesh
    pub center: Vec3,
    /// Uniform factor bringing the largest dimension to the target length
    pub scale: f32,
}

impl SubjectMesh {
    /// Fit `source` to `target_length`; `None` when it has no extent
    pub fn fit(source: Mesh, target_length: f32) -> Option<Self> {
        let bounds = source.bounds()?;
        let size = bounds.max_dimension();
        if !(size.is_finite() && size > f32::EPSILON) {
            return None;
        }
        Some(Self {
            center: bounds.center(),
            scale: target_length / size,
            source,
        })
    }

    /// Display geometry: centered at the origin, scaled to the target length
    pub fn display_mesh(&self) -> Mesh {
        self.source.recentered(self.center, self.scale)
    }

    /// Where a mesh-local landmark lands on the display geometry
    pub fn display_point(&self, point: Vec3) -> Vec3 {
        (point - self.center) * self.scale
    }

    /// Mesh-local unique vertex positions for landmark detection
    pub fn detection_vertices(&self) -> Vec<[f32; 3]> {
        self.source.unique_positions()
    }
}

/// Subject node: an empty object the engine fills once the mesh arrives
pub struct SubjectBuilder;

impl SubjectBuilder {
    /// Part for a loaded mesh
    pub fn mesh_part(ctx: &mut BuildContext<'_>, mesh: &SubjectMesh) -> RenderResult<RenderPart> {
        ctx.mesh_part(
            MESH_PART,
            &mesh.display_mesh(),
            &Material::standard_pbr(StandardMaterialParams {
                base_color: hex_color(0xd8c8b0),
                roughness: 0.6,
                ..Default::default()
            })
            .with_name("subject"),
        )
    }

    /// Box of the target length standing in for a mesh that failed to load
    pub fn placeholder_part(ctx: &mut BuildContext<'_>) -> RenderResult<RenderPart> {
        let length = ctx.config().subject_target_length;
        ctx.mesh_part(
            PLACEHOLDER_PART,
            &Mesh::cuboid(Vec3::new(length * 0.4, length * 0.4, length)),
            &Material::standard_pbr(StandardMaterialParams {
                base_color: hex_color(0x999999),
                ..Default::default()
            })
            .with_name("subject_placeholder"),
        )
    }

    /// One sphere per landmark, positioned on the display geometry
    pub fn marker_parts(
        ctx: &mut BuildContext<'_>,
        mesh: &SubjectMesh,
        landmarks: &LandmarkSet,
    ) -> RenderResult<Vec<RenderPart>> {
        for name in landmarks.malformed() {
            log::warn!("No marker for landmark '{}': not a 3D point", name);
        }
        let sphere = Mesh::sphere(ctx.config().marker_radius, MARKER_SEGMENTS, MARKER_RINGS);
        landmarks
            .iter()
            .map(|(name, point)| -> RenderResult<RenderPart> {
                let material = Material::unlit(UnlitMaterialParams {
                    color: hex_color(marker_color(name)),
                    alpha: 1.0,
                })
                .with_name(format!("landmark_{}", name));
                Ok(ctx
                    .mesh_part(format!("{}{}", MARKER_PREFIX, name), &sphere, &material)?
                    .with_transform(Transform::from_position(mesh.display_point(point))))
            })
            .collect()
    }
}

impl NodeBuilder for SubjectBuilder {
    fn build(
        &self,
        _ctx: &mut BuildContext<'_>,
        node: &SceneNode,
        data: &NodeData,
    ) -> RenderResult<Option<RenderObject>> {
        Ok(Some(RenderObject::new(node.id(), node.node_type(), data.clone())))
    }

    // Only a different mesh needs a new object; the rest is applied in place
    fn needs_rebuild(&self, built: &NodeData, current: &NodeData) -> bool {
        match (built, current) {
            (NodeData::Subject(built), NodeData::Subject(current)) => built.mesh_path != current.mesh_path,
            _ => true,
        }
    }
}

/// Unit cube for nodes without a dedicated builder
pub struct GenericBuilder;

impl NodeBuilder for GenericBuilder {
    fn build(
        &self,
        ctx: &mut BuildContext<'_>,
        node: &SceneNode,
        data: &NodeData,
    ) -> RenderResult<Option<RenderObject>> {
        let part = ctx.mesh_part(
            PLACEHOLDER_PART,
            &Mesh::cube(1.0),
            &Material::unlit(UnlitMaterialParams {
                color: hex_color(0xff00ff),
                alpha: 1.0,
            }),
        )?;
        Ok(Some(RenderObject::new(node.id(), node.node_type(), data.clone()).with_part(part)))
    }
}

/// Marker color for a landmark name, as `0xRRGGBB`
pub fn marker_color(name: &str) -> u32 {
    match name {
        NOSE => 0xff0000,
        TAIL_TIP => 0x0000ff,
        TAIL_ATTACHMENT => 0x00ffff,
        LEFT_EAR => 0x00ff00,
        RIGHT_EAR => 0x88ff88,
        EYE_CENTER => 0xffff00,
        other if other.ends_with("_foot") => 0xff00ff,
        _ => 0xffffff,
    }
}
