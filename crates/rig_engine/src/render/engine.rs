//! Rendering engine
//!
//! Keeps render state in step with the scene tree:
//! 1. `reconcile` builds, updates or disposes the render object of one node
//! 2. Subject nodes are enriched asynchronously: the mesh is loaded, shown,
//!    sent for landmark detection, then aligned and decorated with markers
//! 3. `process_completions` applies finished background work, dropping
//!    anything that arrives for a node that no longer exists
//! 4. `render_frame` submits every visible object to the backend
//!
//! The engine owns every render object; each one is disposed exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alignment::{AlignmentOutcome, OrientationAligner};
use crate::assets::MeshSource;
use crate::config::RenderConfig;
use crate::events::{SceneEvent, SceneEventKind};
use crate::foundation::math::{Aabb, Mat4, Transform, Vec3};
use crate::landmarks::{LandmarkClient, LandmarkRequest};
use crate::scene::{keys, LandmarkSet, NodeData, NodeId, SceneTree, SubjectData, VisitControl};

use super::api::{RenderBackend, RenderFrameData};
use super::builders::{
    BuildContext, BuilderRegistry, NodeBuilder, SubjectBuilder, SubjectMesh, MARKER_PREFIX, MESH_PART,
    PLACEHOLDER_PART,
};
use super::primitives::Camera;
use super::render_object::{RenderObject, RenderPart};
use super::tasks::{TaskCompletion, TaskRunner};
use super::{RenderError, RenderResult};

/// Frame background
const CLEAR_COLOR: [f32; 4] = [0.94, 0.94, 0.94, 1.0];

/// Snapshot of engine activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Live render objects
    pub render_objects: usize,
    /// Mesh resources held by render objects
    pub live_meshes: usize,
    /// Material resources held by render objects
    pub live_materials: usize,
    /// Background jobs not yet applied
    pub tasks_in_flight: usize,
    /// Landmark requests waiting for the service to become ready
    pub queued_landmark_requests: usize,
    /// Mesh loads started
    pub mesh_loads_started: u64,
    /// Landmark detections dispatched
    pub landmark_requests_sent: u64,
    /// Frames submitted
    pub frames_rendered: u64,
    /// Draw commands in the last frame
    pub last_draw_count: usize,
}

#[derive(Debug, Clone)]
enum MeshState {
    Unrequested,
    Loading { request_id: u64 },
    Loaded(Arc<SubjectMesh>),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LandmarkState {
    Idle,
    Queued { request_id: u64 },
    InFlight { request_id: u64 },
    Done,
    Failed,
}

/// Enrichment progress of one subject node
#[derive(Debug, Clone)]
struct SubjectState {
    mesh_path: Option<String>,
    mesh: MeshState,
    landmarks: LandmarkState,
}

impl SubjectState {
    fn new(mesh_path: Option<String>) -> Self {
        Self {
            mesh_path,
            mesh: MeshState::Unrequested,
            landmarks: LandmarkState::Idle,
        }
    }
}

/// Scene-to-backend reconciler
pub struct RenderingEngine {
    backend: Box<dyn RenderBackend>,
    builders: BuilderRegistry,
    objects: HashMap<NodeId, RenderObject>,
    subjects: HashMap<NodeId, SubjectState>,
    mesh_source: Arc<dyn MeshSource>,
    landmarks: Option<LandmarkClient>,
    tasks: TaskRunner,
    aligner: OrientationAligner,
    config: RenderConfig,
    next_request_id: u64,
    stats: EngineStats,
    disposed: bool,
}

impl RenderingEngine {
    /// Create an engine drawing into `backend`.
    ///
    /// Without a landmark client subjects are shown unaligned and without
    /// markers.
    pub fn new(
        backend: Box<dyn RenderBackend>,
        mesh_source: Arc<dyn MeshSource>,
        landmarks: Option<LandmarkClient>,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        let aligner = OrientationAligner::new(Vec3::from(config.forward_axis), config.alignment_tolerance_deg)
            .and_then(|aligner| aligner.with_ear_axis(Vec3::from(config.ear_axis)))
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        if config.subject_target_length <= 0.0 || config.marker_radius <= 0.0 {
            return Err(RenderError::InitializationFailed(
                "subject length and marker radius must be positive".to_string(),
            ));
        }
        let (width, height) = backend.surface_extent();
        log::info!(
            "Rendering engine ready ({}x{}, {:?} tasks, landmarks {})",
            width,
            height,
            config.task_mode,
            if landmarks.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            backend,
            builders: BuilderRegistry::default(),
            objects: HashMap::new(),
            subjects: HashMap::new(),
            mesh_source,
            landmarks,
            tasks: TaskRunner::new(config.task_mode),
            aligner,
            config,
            next_request_id: 1,
            stats: EngineStats::default(),
            disposed: false,
        })
    }

    /// Register or replace the builder for a node type
    pub fn register_builder(&mut self, node_type: crate::scene::NodeType, builder: Box<dyn NodeBuilder>) {
        if self.builders.register(node_type, builder).is_some() {
            log::debug!("Replaced builder for {}", node_type);
        }
    }

    /// Backend access
    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// Mutable backend access
    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    /// Engine settings
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render object of a node, if it has one
    pub fn render_object(&self, id: NodeId) -> Option<&RenderObject> {
        self.objects.get(&id)
    }

    /// Whether a node currently has a render object
    pub fn has_render_object(&self, id: NodeId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live render objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Current activity counters
    pub fn stats(&self) -> EngineStats {
        let (live_meshes, live_materials) = self
            .objects
            .values()
            .map(RenderObject::resource_count)
            .fold((0, 0), |(m, t), (om, ot)| (m + om, t + ot));
        EngineStats {
            render_objects: self.objects.len(),
            live_meshes,
            live_materials,
            tasks_in_flight: self.tasks.in_flight(),
            queued_landmark_requests: self.landmarks.as_ref().map_or(0, LandmarkClient::queued),
            ..self.stats
        }
    }

    // --- reconciliation -----------------------------------------------------

    /// Bring the render object of one node in line with the node.
    ///
    /// Invisible nodes lose their object. Visible nodes get one built if
    /// missing (or stale after a payload change), then receive the current
    /// transform and visibility. Subjects continue their enrichment.
    pub fn reconcile(&mut self, tree: &mut SceneTree, id: NodeId) -> RenderResult<()> {
        self.ensure_live()?;
        let node = tree.node(id)?;
        if !node.is_visible() {
            self.dispose_object(id);
            tree.mark_synced(id)?;
            return Ok(());
        }

        let node_type = node.node_type();
        let transform = *node.transform();
        let data = NodeData::from_payload(node_type, node.payload());

        let stale = match self.objects.get(&id) {
            Some(object) => {
                object.node_type() != node_type
                    || self.builders.get(node_type).needs_rebuild(object.built_from(), &data)
            }
            None => false,
        };
        if stale {
            log::debug!("Rebuilding render object for {}", id);
            self.dispose_object(id);
        }

        if !self.objects.contains_key(&id) {
            let builder = self.builders.get(node_type);
            let mut ctx = BuildContext::new(self.backend.as_mut(), &self.config);
            match builder.build(&mut ctx, node, &data) {
                Ok(object) => {
                    ctx.commit();
                    if let Some(object) = object {
                        log::debug!("Built render object for {} '{}'", node_type, node.name());
                        self.objects.insert(id, object);
                    }
                }
                Err(e) => {
                    let released = ctx.rollback();
                    log::error!("Failed to build {} ({} resources rolled back): {}", id, released, e);
                    return Err(e);
                }
            }
        }

        if let Some(object) = self.objects.get_mut(&id) {
            object.apply_node_state(&transform, true);
        }
        if let NodeData::Subject(subject) = &data {
            self.reconcile_subject(tree, id, subject)?;
        }
        tree.mark_synced(id)?;
        Ok(())
    }

    /// Reconcile a node and its visible descendants in pre-order.
    ///
    /// Descendants of hidden nodes are skipped.
    pub fn reconcile_subtree(&mut self, tree: &mut SceneTree, id: NodeId) -> RenderResult<()> {
        let mut order = Vec::new();
        tree.traverse(id, true, |node, _| {
            order.push(node.id());
            if node.is_visible() {
                VisitControl::Continue
            } else {
                VisitControl::SkipChildren
            }
        })?;
        for node in order {
            self.reconcile(tree, node)?;
        }
        Ok(())
    }

    /// Dispose every render object, then rebuild from `root`.
    ///
    /// Cached subject meshes and stored landmarks are reused, so a full
    /// rebuild never reloads or re-detects.
    pub fn reconcile_graph(&mut self, tree: &mut SceneTree, root: NodeId) -> RenderResult<()> {
        self.ensure_live()?;
        tree.node(root)?;
        let ids: Vec<NodeId> = self.objects.keys().copied().collect();
        for id in ids {
            self.dispose_object(id);
        }
        self.reconcile_subtree(tree, root)
    }

    /// Forget a node entirely: its render object, cached mesh and any
    /// queued landmark request. Returns whether it had a render object.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let had_object = self.dispose_object(id);
        self.subjects.remove(&id);
        if let Some(client) = self.landmarks.as_mut() {
            client.cancel(id);
        }
        had_object
    }

    /// Dispose the render objects of a node and its descendants.
    ///
    /// Nodes that are still alive keep their cached meshes for when they
    /// are attached again. Returns the number of objects disposed.
    pub fn remove_subtree(&mut self, tree: &SceneTree, id: NodeId) -> usize {
        match tree.descendants(id, true) {
            Ok(ids) => ids.into_iter().filter(|node| self.dispose_object(*node)).count(),
            Err(_) => usize::from(self.remove_node(id)),
        }
    }

    /// Reconcile the nodes named by a batch of tree events
    pub fn handle_events(&mut self, tree: &mut SceneTree, events: &[SceneEvent]) -> RenderResult<usize> {
        self.ensure_live()?;
        let mut subtrees = Vec::new();
        let mut nodes = Vec::new();

        for event in events {
            match &event.kind {
                SceneEventKind::Destroyed => {
                    self.remove_node(event.node);
                }
                SceneEventKind::ChildRemoved { child } => {
                    self.remove_subtree(tree, *child);
                }
                SceneEventKind::ChildAdded { child } => subtrees.push(*child),
                SceneEventKind::VisibilityChanged { .. } => subtrees.push(event.node),
                SceneEventKind::TransformChanged
                | SceneEventKind::EnabledChanged { .. }
                | SceneEventKind::DataChanged { .. }
                | SceneEventKind::DataRemoved { .. } => nodes.push(event.node),
            }
        }

        let mut done = HashSet::new();
        for id in subtrees {
            if !done.insert(id) || !tree.contains(id) {
                continue;
            }
            if self.is_drawable(tree, id)? {
                self.reconcile_subtree(tree, id)?;
            } else {
                self.remove_subtree(tree, id);
                tree.mark_synced(id)?;
            }
        }
        for id in nodes {
            if !done.insert(id) || !tree.contains(id) {
                continue;
            }
            if self.is_drawable(tree, id)? {
                self.reconcile(tree, id)?;
            }
        }
        Ok(done.len())
    }

    // --- async completions --------------------------------------------------

    /// Apply finished background work; returns the number applied
    pub fn process_completions(&mut self, tree: &mut SceneTree) -> RenderResult<usize> {
        let completions = self.tasks.drain();
        self.apply_completions(tree, completions)
    }

    /// Block until background work is done or `timeout` passes, applying
    /// completions as they arrive
    pub fn wait_for_tasks(&mut self, tree: &mut SceneTree, timeout: Duration) -> RenderResult<usize> {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while self.tasks.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let completions = self.tasks.wait_any(remaining);
            applied += self.apply_completions(tree, completions)?;
        }
        Ok(applied)
    }

    fn apply_completions(&mut self, tree: &mut SceneTree, completions: Vec<TaskCompletion>) -> RenderResult<usize> {
        let mut applied = 0;
        for completion in completions {
            let node = completion.node();
            if !tree.contains(node) {
                log::debug!("Discarding late result for destroyed {}", node);
                continue;
            }
            let used = match completion {
                TaskCompletion::MeshLoaded {
                    node,
                    request_id,
                    result,
                } => self.on_mesh_loaded(tree, node, request_id, result)?,
                TaskCompletion::LandmarksDetected {
                    node,
                    request_id,
                    result,
                } => self.on_landmarks_detected(tree, node, request_id, result)?,
            };
            if used {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn on_mesh_loaded(
        &mut self,
        tree: &mut SceneTree,
        id: NodeId,
        request_id: u64,
        result: Result<crate::render::Mesh, crate::assets::MeshLoadError>,
    ) -> RenderResult<bool> {
        let target_length = self.config.subject_target_length;
        let Some(state) = self.subjects.get_mut(&id) else {
            return Ok(false);
        };
        if !matches!(state.mesh, MeshState::Loading { request_id: current } if current == request_id) {
            log::debug!("Discarding superseded mesh load {} for {}", request_id, id);
            return Ok(false);
        }

        state.mesh = match result {
            Ok(mesh) => match SubjectMesh::fit(mesh, target_length) {
                Some(mesh) => {
                    log::info!(
                        "Mesh for {} loaded: {} vertices, scale {:.4}",
                        id,
                        mesh.source.vertex_count(),
                        mesh.scale
                    );
                    MeshState::Loaded(Arc::new(mesh))
                }
                None => {
                    log::warn!("Mesh for {} has no extent, using placeholder", id);
                    MeshState::Failed
                }
            },
            Err(e) => {
                log::warn!("Mesh for {} failed to load, using placeholder: {}", id, e);
                MeshState::Failed
            }
        };

        self.attach_subject_geometry(tree, id)?;
        let subject = tree.subject_data(id)?;
        self.request_landmarks_if_needed(tree, id, &subject)?;
        Ok(true)
    }

    fn on_landmarks_detected(
        &mut self,
        tree: &mut SceneTree,
        id: NodeId,
        request_id: u64,
        result: Result<LandmarkSet, crate::landmarks::LandmarkError>,
    ) -> RenderResult<bool> {
        let Some(state) = self.subjects.get_mut(&id) else {
            return Ok(false);
        };
        if state.landmarks != (LandmarkState::InFlight { request_id }) {
            log::debug!("Discarding superseded landmark result {} for {}", request_id, id);
            return Ok(false);
        }

        match result {
            Ok(landmarks) => {
                state.landmarks = LandmarkState::Done;
                log::info!("{} landmark(s) detected for {}", landmarks.len(), id);
                tree.set_landmarks(id, landmarks)?;
                self.refresh_landmarks(tree, id)?;
            }
            Err(e) => {
                state.landmarks = LandmarkState::Failed;
                log::warn!("Landmark detection for {} failed: {}", id, e);
            }
        }
        Ok(true)
    }

    // --- landmark service ---------------------------------------------------

    /// Mark the landmark service ready and dispatch queued requests in order
    pub fn notify_landmark_service_ready(&mut self, tree: &SceneTree) -> usize {
        let Some(client) = self.landmarks.as_mut() else {
            log::debug!("Landmark service ready signal ignored: detection disabled");
            return 0;
        };
        let released = client.signal_ready(|node| tree.contains(node));
        self.dispatch_released(released)
    }

    /// Ask the landmark service whether it is ready; dispatches queued
    /// requests when it is. Returns whether the service is ready.
    pub fn probe_landmark_service(&mut self, tree: &SceneTree) -> bool {
        let Some(client) = self.landmarks.as_mut() else {
            return false;
        };
        if let Some(released) = client.probe(|node| tree.contains(node)) {
            self.dispatch_released(released);
        }
        self.landmarks.as_ref().is_some_and(LandmarkClient::is_ready)
    }

    fn dispatch_released(&mut self, released: Vec<LandmarkRequest>) -> usize {
        let mut dispatched = 0;
        for request in released {
            let still_wanted = self.subjects.get(&request.node).is_some_and(|state| {
                state.landmarks
                    == (LandmarkState::Queued {
                        request_id: request.request_id,
                    })
            });
            if still_wanted {
                self.dispatch_landmarks(request);
                dispatched += 1;
            }
        }
        dispatched
    }

    fn dispatch_landmarks(&mut self, request: LandmarkRequest) {
        let Some(client) = self.landmarks.as_ref() else {
            return;
        };
        let service = client.service();
        let LandmarkRequest {
            node,
            request_id,
            vertices,
        } = request;

        log::debug!("Dispatching landmark request {} for {} ({} vertices)", request_id, node, vertices.len());
        self.stats.landmark_requests_sent += 1;
        let started = self.tasks.spawn("landmarks", move || TaskCompletion::LandmarksDetected {
            node,
            request_id,
            result: service.detect(&vertices),
        });
        if let Some(state) = self.subjects.get_mut(&node) {
            state.landmarks = if started {
                LandmarkState::InFlight { request_id }
            } else {
                LandmarkState::Failed
            };
        }
    }

    // --- subject enrichment -------------------------------------------------

    fn reconcile_subject(&mut self, tree: &mut SceneTree, id: NodeId, subject: &SubjectData) -> RenderResult<()> {
        let path_changed = self
            .subjects
            .get(&id)
            .is_some_and(|state| state.mesh_path != subject.mesh_path);
        if path_changed {
            log::info!("Mesh path of {} changed, reloading", id);
            if let Some(client) = self.landmarks.as_mut() {
                client.cancel(id);
            }
            // Landmarks belong to the previous mesh
            tree.remove_data(id, keys::LANDMARKS)?;
            self.subjects.insert(id, SubjectState::new(subject.mesh_path.clone()));
        }

        let state = self
            .subjects
            .entry(id)
            .or_insert_with(|| SubjectState::new(subject.mesh_path.clone()));
        if matches!(state.mesh, MeshState::Unrequested) {
            match subject.mesh_path.clone() {
                Some(path) => self.start_mesh_load(id, path),
                None => {
                    log::info!("{} has no mesh path, using placeholder", id);
                    state.mesh = MeshState::Failed;
                }
            }
        }

        self.attach_subject_geometry(tree, id)?;
        self.set_marker_visibility(id, subject.show_landmarks);
        self.request_landmarks_if_needed(tree, id, subject)
    }

    fn start_mesh_load(&mut self, id: NodeId, path: String) {
        let request_id = self.next_request_id();
        let source = Arc::clone(&self.mesh_source);
        log::info!("Loading mesh '{}' for {}", path, id);
        self.stats.mesh_loads_started += 1;

        let started = self.tasks.spawn("mesh", move || TaskCompletion::MeshLoaded {
            node: id,
            request_id,
            result: source.load(&path),
        });
        if let Some(state) = self.subjects.get_mut(&id) {
            state.mesh = if started {
                MeshState::Loading { request_id }
            } else {
                MeshState::Failed
            };
        }
    }

    /// Add the mesh (or placeholder) part to a subject's render object
    fn attach_subject_geometry(&mut self, tree: &SceneTree, id: NodeId) -> RenderResult<()> {
        let Some(object) = self.objects.get_mut(&id) else {
            return Ok(());
        };
        if object.find_part(MESH_PART).is_some() || object.find_part(PLACEHOLDER_PART).is_some() {
            return Ok(());
        }
        let Some(state) = self.subjects.get(&id) else {
            return Ok(());
        };

        let mut ctx = BuildContext::new(self.backend.as_mut(), &self.config);
        let part = match &state.mesh {
            MeshState::Loaded(mesh) => {
                let show = tree.subject_data(id)?.show_landmarks;
                SubjectBuilder::mesh_part(&mut ctx, mesh).and_then(|mut part| {
                    if let Some(landmarks) = tree.landmarks(id)? {
                        apply_landmarks(&mut ctx, &self.aligner, &mut part, mesh, landmarks, show)?;
                    }
                    Ok(part)
                })
            }
            MeshState::Failed => SubjectBuilder::placeholder_part(&mut ctx),
            MeshState::Unrequested | MeshState::Loading { .. } => return Ok(()),
        };

        match part {
            Ok(part) => {
                ctx.commit();
                object.root_mut().add_child(part);
                Ok(())
            }
            Err(e) => {
                ctx.rollback();
                Err(e)
            }
        }
    }

    /// Re-apply alignment and markers after new landmarks arrive
    fn refresh_landmarks(&mut self, tree: &SceneTree, id: NodeId) -> RenderResult<()> {
        let (Some(object), Some(state)) = (self.objects.get_mut(&id), self.subjects.get(&id)) else {
            return Ok(());
        };
        let MeshState::Loaded(mesh) = &state.mesh else {
            return Ok(());
        };
        let Some(part) = object.find_part_mut(MESH_PART) else {
            return Ok(());
        };
        let Some(landmarks) = tree.landmarks(id)? else {
            return Ok(());
        };
        let show = tree.subject_data(id)?.show_landmarks;

        let mut ctx = BuildContext::new(self.backend.as_mut(), &self.config);
        match apply_landmarks(&mut ctx, &self.aligner, part, mesh, landmarks, show) {
            Ok(()) => {
                ctx.commit();
                Ok(())
            }
            Err(e) => {
                ctx.rollback();
                Err(e)
            }
        }
    }

    fn set_marker_visibility(&mut self, id: NodeId, visible: bool) {
        if let Some(part) = self.objects.get_mut(&id).and_then(|o| o.find_part_mut(MESH_PART)) {
            for marker in part.children_mut().iter_mut().filter(|c| c.name().starts_with(MARKER_PREFIX)) {
                marker.visible = visible;
            }
        }
    }

    /// Issue a landmark request once the mesh is shown, unless one is
    /// outstanding or landmarks are already stored
    fn request_landmarks_if_needed(
        &mut self,
        tree: &SceneTree,
        id: NodeId,
        subject: &SubjectData,
    ) -> RenderResult<()> {
        if !subject.show_landmarks || self.landmarks.is_none() || tree.landmarks(id)?.is_some() {
            return Ok(());
        }
        let mesh_shown = self
            .objects
            .get(&id)
            .is_some_and(|object| object.find_part(MESH_PART).is_some());
        let Some(state) = self.subjects.get(&id) else {
            return Ok(());
        };
        let MeshState::Loaded(mesh) = &state.mesh else {
            return Ok(());
        };
        if !mesh_shown || state.landmarks != LandmarkState::Idle {
            return Ok(());
        }

        let vertices = mesh.detection_vertices();
        let request_id = self.next_request_id();
        if let Some(state) = self.subjects.get_mut(&id) {
            state.landmarks = LandmarkState::Queued { request_id };
        }
        let request = LandmarkRequest {
            node: id,
            request_id,
            vertices,
        };
        let ready = self.landmarks.as_mut().and_then(|client| client.submit(request));
        if let Some(request) = ready {
            self.dispatch_landmarks(request);
        }
        Ok(())
    }

    // --- frames -------------------------------------------------------------

    /// Submit every visible render object; returns the number of draws
    pub fn render_frame(&mut self, tree: &SceneTree, camera: &Camera) -> RenderResult<usize> {
        self.ensure_live()?;
        let mut draws = Vec::new();
        for (id, parent_world) in self.visible_objects(tree)? {
            if let Some(object) = self.objects.get(&id) {
                object.collect_draws(&parent_world, &mut draws);
            }
        }

        self.backend.draw_frame(&RenderFrameData {
            camera,
            draws: &draws,
            clear_color: CLEAR_COLOR,
        })?;
        self.stats.frames_rendered += 1;
        self.stats.last_draw_count = draws.len();
        Ok(draws.len())
    }

    /// World bounds of everything that would be drawn
    pub fn scene_bounds(&self, tree: &SceneTree) -> RenderResult<Option<Aabb>> {
        let mut bounds: Option<Aabb> = None;
        for (id, parent_world) in self.visible_objects(tree)? {
            let object_bounds = self.objects.get(&id).and_then(|o| o.world_bounds(&parent_world));
            if let Some(b) = object_bounds {
                bounds = Some(bounds.map_or(b, |acc| acc.merged(&b)));
            }
        }
        Ok(bounds)
    }

    /// World bounds of one node's render object
    pub fn node_bounds(&self, tree: &SceneTree, id: NodeId) -> RenderResult<Option<Aabb>> {
        let Some(object) = self.objects.get(&id) else {
            return Ok(None);
        };
        Ok(object.world_bounds(&self.parent_world(tree, id)?))
    }

    /// Nodes with objects under the root whose whole ancestor chain is
    /// visible, with their parent's world matrix
    fn visible_objects(&self, tree: &SceneTree) -> RenderResult<Vec<(NodeId, Mat4)>> {
        let Some(root) = tree.root() else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        tree.traverse(root, true, |node, _| {
            if !node.is_visible() {
                return VisitControl::SkipChildren;
            }
            if self.objects.contains_key(&node.id()) {
                ids.push(node.id());
            }
            VisitControl::Continue
        })?;
        ids.into_iter()
            .map(|id| Ok((id, self.parent_world(tree, id)?)))
            .collect()
    }

    fn parent_world(&self, tree: &SceneTree, id: NodeId) -> RenderResult<Mat4> {
        Ok(match tree.parent(id)? {
            Some(parent) => tree.world_matrix(parent)?,
            None => Mat4::identity(),
        })
    }

    // --- lifecycle ----------------------------------------------------------

    /// Release every resource and stop accepting work. Safe to call twice.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let mut released = 0;
        for (_, mut object) in self.objects.drain() {
            released += object.dispose(self.backend.as_mut());
        }
        self.subjects.clear();
        if let Err(e) = self.backend.wait_idle() {
            log::warn!("Backend did not go idle during dispose: {}", e);
        }
        self.disposed = true;
        log::info!("Rendering engine disposed ({} resources released)", released);
    }

    fn dispose_object(&mut self, id: NodeId) -> bool {
        match self.objects.remove(&id) {
            Some(mut object) => {
                object.dispose(self.backend.as_mut());
                true
            }
            None => false,
        }
    }

    fn is_drawable(&self, tree: &SceneTree, id: NodeId) -> RenderResult<bool> {
        let attached = tree.root().is_some_and(|root| tree.is_ancestor_or_self(root, id));
        Ok(attached && tree.is_effectively_visible(id)?)
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.disposed {
            Err(RenderError::RenderingFailed("rendering engine has been disposed".to_string()))
        } else {
            Ok(())
        }
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderingEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Align the mesh part from landmarks and replace its markers
fn apply_landmarks(
    ctx: &mut BuildContext<'_>,
    aligner: &OrientationAligner,
    part: &mut RenderPart,
    mesh: &SubjectMesh,
    landmarks: &LandmarkSet,
    show_markers: bool,
) -> RenderResult<()> {
    match aligner.align_landmarks(landmarks, mesh.scale) {
        Ok(AlignmentOutcome::Aligned(alignment)) => {
            part.transform = Transform {
                position: alignment.position,
                rotation: alignment.rotation,
                scale: Vec3::new(1.0, 1.0, 1.0),
            };
            let report = aligner.verify_landmarks(&alignment, landmarks);
            if report.is_within_tolerance() {
                log::debug!(
                    "Subject aligned, residual {:.4} deg, ears {:?}",
                    report.residual_deg,
                    report.ear_residual_deg
                );
            } else {
                log::warn!(
                    "Subject alignment residual {:.4} deg (nose/tail {:.4}, ears {:?}) exceeds {:.4} deg",
                    report.overall_deg(),
                    report.residual_deg,
                    report.ear_residual_deg,
                    report.tolerance_deg
                );
            }
        }
        Ok(AlignmentOutcome::Skipped(reason)) => {
            log::info!("Subject alignment skipped: {:?}", reason);
        }
        Err(e) => {
            log::error!("Subject alignment rejected: {}", e);
        }
    }

    let markers = SubjectBuilder::marker_parts(ctx, mesh, landmarks)?;
    for mut old in part.take_children_where(|child| child.name().starts_with(MARKER_PREFIX)) {
        ctx.release_part(&mut old);
    }
    for mut marker in markers {
        marker.visible = show_markers;
        part.add_child(marker);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryMeshSource;
    use crate::config::TaskMode;
    use crate::landmarks::{FixedLandmarkService, LandmarkError};
    use crate::render::backends::HeadlessBackend;
    use crate::render::Mesh;
    use crate::scene::{NodeTransform, NodeType, NOSE, TAIL_TIP};
    use approx::assert_relative_eq;

    const MOUSE: &str = "mouse.stl";

    struct Rig {
        tree: SceneTree,
        root: NodeId,
        floor: NodeId,
        monitor: NodeId,
        subject: NodeId,
    }

    fn rig(mesh_path: Option<&str>) -> Rig {
        let mut tree = SceneTree::new();
        let root = tree.create_root("rig").expect("first root");
        let floor = tree.create_child(root, "floor", NodeType::FloorPlan).expect("floor");
        let monitor = tree.create_child(root, "monitor", NodeType::Monitor).expect("monitor");
        let subject = tree.create_child(floor, "subject", NodeType::Subject).expect("subject");
        if let Some(path) = mesh_path {
            tree.set_data(subject, keys::MESH_PATH, path).expect("alive");
        }
        Rig {
            tree,
            root,
            floor,
            monitor,
            subject,
        }
    }

    /// Elongated along +X, so rear-to-front runs along X
    fn mouse_mesh() -> Mesh {
        Mesh::cuboid(Vec3::new(4.0, 1.0, 2.0))
    }

    fn full_landmarks() -> LandmarkSet {
        LandmarkSet::from_points([(NOSE, Vec3::new(2.0, 0.0, 0.0)), (TAIL_TIP, Vec3::new(-2.0, 0.0, 0.0))])
    }

    fn engine(service: Option<Arc<FixedLandmarkService>>, ready: bool) -> RenderingEngine {
        let source = MemoryMeshSource::new().with_mesh(MOUSE, mouse_mesh());
        let client = service.map(|s| LandmarkClient::new(s, ready));
        let config = RenderConfig {
            task_mode: TaskMode::Inline,
            ..RenderConfig::default()
        };
        RenderingEngine::new(Box::new(HeadlessBackend::new(320, 240)), Arc::new(source), client, config)
            .expect("valid config")
    }

    fn headless(engine: &RenderingEngine) -> &HeadlessBackend {
        engine
            .backend()
            .as_any()
            .downcast_ref::<HeadlessBackend>()
            .expect("headless backend")
    }

    /// Apply completions until nothing new arrives
    fn settle(engine: &mut RenderingEngine, tree: &mut SceneTree) {
        while engine.process_completions(tree).expect("completions") > 0 {}
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);
        let created = headless(&engine).counters();

        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");
        engine.reconcile(&mut rig.tree, rig.floor).expect("reconciled");
        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");

        assert_eq!(headless(&engine).counters(), created);
        assert_eq!(engine.stats().mesh_loads_started, 1);
        assert_eq!(rig.tree.sync_state(rig.subject), Ok(crate::scene::SyncState::Synced));
    }

    #[test]
    fn test_root_draws_nothing_and_types_get_objects() {
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");

        assert!(!engine.has_render_object(rig.root));
        assert!(engine.has_render_object(rig.floor));
        assert!(engine.has_render_object(rig.monitor));
        assert!(engine.has_render_object(rig.subject));
        assert_eq!(engine.object_count(), 3);
    }

    #[test]
    fn test_removed_subtree_has_no_objects_after_rebuild() {
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        rig.tree.remove_child(rig.root, rig.floor).expect("attached");
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");

        assert!(!engine.has_render_object(rig.floor));
        assert!(!engine.has_render_object(rig.subject));
        assert!(engine.has_render_object(rig.monitor));
        let backend = headless(&engine);
        assert_eq!(backend.live_meshes(), engine.stats().live_meshes);
        assert_eq!(backend.counters().invalid_releases, 0);
    }

    #[test]
    fn test_hide_and_show_reuses_loaded_mesh() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(Arc::clone(&service)), true);
        rig.tree.set_position(rig.subject, Vec3::new(1.5, 2.0, -3.0)).expect("alive");
        rig.tree.set_rotation(rig.subject, Vec3::new(0.0, 0.4, 0.1)).expect("alive");
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);
        assert_eq!(service.calls(), 1);

        let object = engine.render_object(rig.subject).expect("shown");
        let applied_before = object.applied_state().expect("applied");
        let root_before = object.root().transform;
        let aligned_before = object.find_part(MESH_PART).expect("mesh").transform;

        rig.tree.set_visible(rig.subject, false).expect("alive");
        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");
        assert!(!engine.has_render_object(rig.subject));

        rig.tree.set_visible(rig.subject, true).expect("alive");
        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        let object = engine.render_object(rig.subject).expect("shown again");
        let applied_after = object.applied_state().expect("applied");
        assert_eq!(applied_after.transform, applied_before.transform);
        assert!(applied_after.visible);
        assert_relative_eq!(object.root().transform.position, root_before.position, epsilon = 1e-6);
        assert_relative_eq!(object.root().transform.rotation.angle_to(&root_before.rotation), 0.0, epsilon = 1e-6);

        let mesh = object.find_part(MESH_PART).expect("mesh attached from cache");
        assert_relative_eq!(mesh.transform.position, aligned_before.position, epsilon = 1e-6);
        assert_relative_eq!(mesh.transform.rotation.angle_to(&aligned_before.rotation), 0.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.transform.scale, aligned_before.scale, epsilon = 1e-6);
        assert_eq!(mesh.children().len(), 2);
        assert_eq!(engine.stats().mesh_loads_started, 1);
        assert_eq!(service.calls(), 1);
        assert_eq!(headless(&engine).counters().invalid_releases, 0);
    }

    #[test]
    fn test_failed_mesh_gets_placeholder_and_no_detection() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some("missing.stl"));
        let mut engine = engine(Some(Arc::clone(&service)), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        let object = engine.render_object(rig.subject).expect("subject object");
        assert!(object.find_part(MESH_PART).is_none());
        assert!(object.find_part(PLACEHOLDER_PART).is_some());

        let bounds = engine.node_bounds(&rig.tree, rig.subject).expect("alive").expect("box");
        assert_relative_eq!(bounds.max_dimension(), engine.config().subject_target_length, epsilon = 1e-4);
        assert_eq!(service.calls(), 0);
        assert_eq!(engine.stats().landmark_requests_sent, 0);
    }

    #[test]
    fn test_landmarks_align_mesh_and_add_markers() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(service), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        assert_eq!(rig.tree.landmarks(rig.subject).expect("alive"), Some(&full_landmarks()));
        let object = engine.render_object(rig.subject).expect("subject object");
        let mesh = object.find_part(MESH_PART).expect("mesh");

        // Nose was on +X; after alignment it faces +Z
        let forward = mesh.transform.rotation * Vec3::x();
        assert_relative_eq!(forward, Vec3::z(), epsilon = 1e-5);
        let marker = mesh.find("marker:nose").expect("nose marker");
        assert_relative_eq!(marker.transform.position, Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_missing_tail_skips_alignment_but_keeps_markers() {
        let only_nose = LandmarkSet::from_points([(NOSE, Vec3::new(2.0, 0.0, 0.0))]);
        let service = Arc::new(FixedLandmarkService::new(only_nose));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(service), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        let object = engine.render_object(rig.subject).expect("subject object");
        let mesh = object.find_part(MESH_PART).expect("mesh");
        assert_eq!(mesh.transform, Transform::identity());
        assert!(mesh.find("marker:nose").is_some());
    }

    #[test]
    fn test_detection_failure_leaves_subject_unaligned() {
        let service = Arc::new(FixedLandmarkService::failing(LandmarkError::Service {
            status: Some(500),
            message: "detector crashed".to_string(),
        }));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(Arc::clone(&service)), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);
        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        assert_eq!(rig.tree.landmarks(rig.subject), Ok(None));
        assert_eq!(service.calls(), 1);
        let mesh = engine
            .render_object(rig.subject)
            .and_then(|o| o.find_part(MESH_PART))
            .expect("mesh");
        assert!(mesh.children().is_empty());
    }

    #[test]
    fn test_late_results_for_destroyed_node_are_dropped() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(Arc::clone(&service)), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");

        // Mesh load has completed but not been applied yet
        rig.tree.destroy(rig.subject);
        let events = rig.tree.drain_events();
        engine.handle_events(&mut rig.tree, &events).expect("handled");

        assert_eq!(engine.process_completions(&mut rig.tree).expect("drained"), 0);
        assert!(!engine.has_render_object(rig.subject));
        assert_eq!(service.calls(), 0);
        assert_eq!(headless(&engine).counters().invalid_releases, 0);
    }

    #[test]
    fn test_requests_wait_for_service_readiness() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(Arc::clone(&service)), false);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        assert_eq!(service.calls(), 0);
        assert_eq!(engine.stats().queued_landmark_requests, 1);

        assert_eq!(engine.notify_landmark_service_ready(&rig.tree), 1);
        settle(&mut engine, &mut rig.tree);
        assert_eq!(service.calls(), 1);
        assert!(rig.tree.landmarks(rig.subject).expect("alive").is_some());
    }

    #[test]
    fn test_queued_request_for_destroyed_node_never_sent() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(Arc::clone(&service)), false);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        rig.tree.destroy(rig.subject);
        assert_eq!(engine.notify_landmark_service_ready(&rig.tree), 0);
        settle(&mut engine, &mut rig.tree);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_hidden_markers_follow_show_landmarks() {
        let service = Arc::new(FixedLandmarkService::new(full_landmarks()));
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(Some(service), true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);
        let camera = Camera::default();
        let with_markers = engine.render_frame(&rig.tree, &camera).expect("frame");

        rig.tree.set_data(rig.subject, keys::SHOW_LANDMARKS, false).expect("alive");
        engine.reconcile(&mut rig.tree, rig.subject).expect("reconciled");
        let without_markers = engine.render_frame(&rig.tree, &camera).expect("frame");

        assert_eq!(with_markers - without_markers, 2);
        assert_eq!(headless(&engine).last_frame().draw_count, without_markers);
    }

    #[test]
    fn test_payload_change_rebuilds_floor() {
        let mut rig = rig(None);
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        let before = headless(&engine).counters().meshes_created;

        engine.reconcile(&mut rig.tree, rig.floor).expect("reconciled");
        assert_eq!(headless(&engine).counters().meshes_created, before);

        rig.tree.set_data(rig.floor, keys::WIDTH, 60.0_f32).expect("alive");
        engine.reconcile(&mut rig.tree, rig.floor).expect("reconciled");
        assert_eq!(headless(&engine).counters().meshes_created, before + 2);
        let size = engine.node_bounds(&rig.tree, rig.floor).expect("alive").expect("floor").size();
        assert_relative_eq!(size.x, 60.0, epsilon = 1e-4);
    }

    #[test]
    fn test_transform_change_moves_object_without_rebuild() {
        let mut rig = rig(None);
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        let created = headless(&engine).counters().meshes_created;

        rig.tree
            .set_transform(rig.monitor, NodeTransform::from_position(Vec3::new(0.0, 5.0, 10.0)))
            .expect("alive");
        let events = rig.tree.drain_events();
        engine.handle_events(&mut rig.tree, &events).expect("handled");

        let center = engine.node_bounds(&rig.tree, rig.monitor).expect("alive").expect("monitor").center();
        assert_relative_eq!(center.z, 10.0, epsilon = 0.1);
        assert_relative_eq!(center.y, 5.0, epsilon = 1e-3);
        assert_eq!(headless(&engine).counters().meshes_created, created);
    }

    #[test]
    fn test_dispose_is_idempotent_and_final() {
        let mut rig = rig(Some(MOUSE));
        let mut engine = engine(None, true);
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        settle(&mut engine, &mut rig.tree);

        engine.dispose();
        engine.dispose();

        let backend = headless(&engine);
        assert_eq!(backend.live_meshes(), 0);
        assert_eq!(backend.live_materials(), 0);
        assert_eq!(backend.counters().invalid_releases, 0);
        assert!(engine.reconcile(&mut rig.tree, rig.floor).is_err());
    }

    #[test]
    fn test_registered_builder_replaces_default() {
        struct NothingBuilder;
        impl NodeBuilder for NothingBuilder {
            fn build(
                &self,
                _ctx: &mut BuildContext<'_>,
                _node: &crate::scene::SceneNode,
                _data: &NodeData,
            ) -> RenderResult<Option<RenderObject>> {
                Ok(None)
            }
        }

        let mut rig = rig(None);
        let mut engine = engine(None, true);
        engine.register_builder(NodeType::Monitor, Box::new(NothingBuilder));
        engine.reconcile_graph(&mut rig.tree, rig.root).expect("reconciled");
        assert!(!engine.has_render_object(rig.monitor));
    }
}
