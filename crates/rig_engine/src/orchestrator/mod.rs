//! # Orchestrator
//!
//! Top-level coordinator for the rig visualization. Owns the scene tree, the
//! rendering engine, the camera and the parameter bindings, and drives the
//! frame loop:
//!
//! 1. `initialize` negotiates the surface, builds the engine and the default
//!    hierarchy (root with floor plan, monitor and subject) and reconciles it
//! 2. UI inputs arrive through `on_input_changed` and become payload writes
//! 3. `tick` applies due inputs, async completions and tree events, then
//!    renders one frame
//! 4. `dispose` tears everything down and may be called any number of times
//!
//! Reconciliation is driven by tree events, never by polling every node.

mod parameters;
mod surface;

pub use parameters::{InputKind, ParameterBindings, ParameterError, ParameterHandler, ParameterPath, ParameterValue};
pub use surface::{negotiate_surface, HeadlessSurface, RenderContainer, SurfaceSize};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::assets::{FileMeshSource, MeshSource};
use crate::config::{ConfigError, RigConfig};
use crate::foundation::math::Vec3;
use crate::foundation::time::Timer;
use crate::landmarks::{HttpLandmarkService, LandmarkClient, LandmarkService};
use crate::render::{Camera, EngineStats, OrbitControls, RenderError, RenderResult, RenderingEngine};
use crate::scene::{keys, NodeData, NodeId, NodeType, SceneError, SceneNode, SceneResult, SceneTree, VisitControl};

/// Name of the hierarchy root
pub const ROOT_NODE: &str = "rig";
/// Name of the floor plan node
pub const FLOOR_NODE: &str = "floor";
/// Name of the monitor node
pub const MONITOR_NODE: &str = "monitor";
/// Name of the subject node
pub const SUBJECT_NODE: &str = "subject";

/// Initialization errors
#[derive(Error, Debug)]
pub enum InitError {
    /// No container was supplied
    #[error("No render container supplied")]
    MissingContainer,

    /// Container never reported an area and no fallback is configured
    #[error("Render container '{container}' has zero area after {attempts} measurements")]
    ZeroArea {
        /// Container label
        container: String,
        /// Measurements taken
        attempts: u32,
    },

    /// Already running
    #[error("Orchestrator is already initialized")]
    AlreadyInitialized,

    /// Disposed instances cannot be reused
    #[error("Orchestrator has been disposed")]
    Disposed,

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Engine or backend failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Scene setup failure
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Default parameter bindings could not be registered
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Lookup key for scene queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeQuery<'a> {
    /// By id
    Id(NodeId),
    /// By name (first match in hierarchy order)
    Name(&'a str),
}

impl From<NodeId> for NodeQuery<'_> {
    fn from(id: NodeId) -> Self {
        NodeQuery::Id(id)
    }
}

impl<'a> From<&'a str> for NodeQuery<'a> {
    fn from(name: &'a str) -> Self {
        NodeQuery::Name(name)
    }
}

/// One row of the scene tree listing
#[derive(Debug, Clone, PartialEq)]
pub struct SceneListingEntry {
    /// Node id
    pub id: NodeId,
    /// Node name
    pub name: String,
    /// Node type
    pub node_type: NodeType,
    /// Own visibility flag
    pub visible: bool,
    /// Depth below the root
    pub depth: usize,
    /// Whether this is the selected node
    pub selected: bool,
}

/// Orchestrator-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Live scene nodes
    pub nodes: usize,
    /// Parameter values waiting for their quiet period
    pub pending_parameters: usize,
    /// Engine counters
    pub engine: EngineStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Disposed,
}

/// Default hierarchy node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigNodes {
    /// Hierarchy root
    pub root: NodeId,
    /// Floor plan
    pub floor: NodeId,
    /// Monitor
    pub monitor: NodeId,
    /// Subject
    pub subject: NodeId,
}

/// Coordinator of scene, engine, camera and inputs
pub struct Orchestrator {
    config: RigConfig,
    mesh_source: Arc<dyn MeshSource>,
    landmark_service: Option<Arc<dyn LandmarkService>>,
    tree: SceneTree,
    engine: Option<RenderingEngine>,
    rig: Option<RigNodes>,
    camera: Camera,
    controls: OrbitControls,
    parameters: ParameterBindings,
    timer: Timer,
    selected: Option<NodeId>,
    lifecycle: Lifecycle,
}

impl Orchestrator {
    /// Orchestrator loading meshes from disk and detecting landmarks over
    /// HTTP when enabled in `config`
    pub fn new(config: RigConfig) -> Self {
        let landmark_service: Option<Arc<dyn LandmarkService>> = if config.landmarks.enabled {
            Some(Arc::new(HttpLandmarkService::from_config(&config.landmarks)))
        } else {
            None
        };
        Self::with_services(config, Arc::new(FileMeshSource::new()), landmark_service)
    }

    /// Orchestrator with explicit collaborators
    pub fn with_services(
        config: RigConfig,
        mesh_source: Arc<dyn MeshSource>,
        landmark_service: Option<Arc<dyn LandmarkService>>,
    ) -> Self {
        let camera = Camera::perspective(
            Vec3::from(config.viewer.camera_home),
            config.viewer.camera_fov_deg,
            1.0,
            0.1,
            1000.0,
        );
        Self {
            controls: OrbitControls::new(config.viewer.damping_factor),
            parameters: ParameterBindings::new(Duration::from_millis(config.viewer.debounce_ms)),
            camera,
            config,
            mesh_source,
            landmark_service,
            tree: SceneTree::new(),
            engine: None,
            rig: None,
            timer: Timer::new(),
            selected: None,
            lifecycle: Lifecycle::Created,
        }
    }

    // --- lifecycle ----------------------------------------------------------

    /// Bind to `container`, build the engine and the default scene.
    ///
    /// On failure nothing is left running and the call may be retried.
    pub fn initialize(&mut self, container: Option<&mut dyn RenderContainer>) -> Result<(), InitError> {
        match self.lifecycle {
            Lifecycle::Running => return Err(InitError::AlreadyInitialized),
            Lifecycle::Disposed => return Err(InitError::Disposed),
            Lifecycle::Created => {}
        }
        let container = container.ok_or(InitError::MissingContainer)?;
        self.config.validate()?;

        let size = negotiate_surface(container, &self.config.viewer)?;
        let backend = container.create_backend(size.width, size.height)?;
        let client = self
            .landmark_service
            .clone()
            .map(|service| LandmarkClient::new(service, self.config.landmarks.assume_ready));
        let mut engine = RenderingEngine::new(
            backend,
            Arc::clone(&self.mesh_source),
            client,
            self.config.render.clone(),
        )?;

        let built = self
            .register_default_bindings()
            .map_err(InitError::from)
            .and_then(|()| self.build_scene(&mut engine));
        let rig = match built {
            Ok(rig) => rig,
            Err(e) => {
                engine.dispose();
                self.parameters.clear();
                self.tree.clear();
                self.tree.drain_events();
                return Err(e);
            }
        };

        self.engine = Some(engine);
        self.rig = Some(rig);
        self.camera.set_viewport(size.width, size.height);
        self.reset_camera();
        self.timer = Timer::new();
        self.lifecycle = Lifecycle::Running;

        log::info!(
            "Orchestrator initialized on '{}' ({}x{}{}, {} nodes)",
            container.label(),
            size.width,
            size.height,
            if size.fallback { ", fallback size" } else { "" },
            self.tree.len()
        );
        Ok(())
    }

    fn build_scene(&mut self, engine: &mut RenderingEngine) -> Result<RigNodes, InitError> {
        let defaults = self.config.scene.clone();
        let root = self.tree.create_root(ROOT_NODE)?;
        let floor = self.tree.create_child(root, FLOOR_NODE, NodeType::FloorPlan)?;
        let monitor = self.tree.create_child(root, MONITOR_NODE, NodeType::Monitor)?;
        let subject = self.tree.create_child(root, SUBJECT_NODE, NodeType::Subject)?;

        self.tree.set_node_data(floor, &NodeData::FloorPlan(defaults.floor_plan))?;
        self.tree.set_node_data(monitor, &NodeData::Monitor(defaults.monitor))?;
        self.tree.set_node_data(subject, &NodeData::Subject(defaults.subject))?;
        place_monitor(&mut self.tree)?;

        engine.reconcile_graph(&mut self.tree, root)?;
        // The full rebuild already covers every setup mutation
        self.tree.drain_events();
        Ok(RigNodes {
            root,
            floor,
            monitor,
            subject,
        })
    }

    fn register_default_bindings(&mut self) -> Result<(), ParameterError> {
        use InputKind::{Continuous, Discrete};

        let plain = [
            ("floor-width", "floor.width"),
            ("floor-depth", "floor.depth"),
            ("floor-grid", "floor.grid_divisions"),
            ("monitor-width", "monitor.width"),
            ("monitor-height", "monitor.height"),
        ];
        for (source, path) in plain {
            self.parameters.bind(source, path, Continuous, None)?;
        }

        let placement = [
            ("monitor-distance", "monitor.distance"),
            ("monitor-elevation", "monitor.elevation"),
            ("monitor-rotation", "monitor.rotation"),
            ("subject-eye-height", "subject.eye_height"),
        ];
        for (source, path) in placement {
            self.parameters
                .bind(source, path, Continuous, Some(Box::new(|tree, _, _| place_monitor(tree))))?;
        }

        self.parameters.bind("subject-mesh", "subject.mesh_path", Discrete, None)?;
        self.parameters.bind("show-landmarks", "subject.show_landmarks", Discrete, None)?;
        Ok(())
    }

    /// Stop the loop, destroy every node and dispose the engine.
    ///
    /// Safe on a partially initialized instance; later calls do nothing.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.parameters.clear();
        let destroyed = self.tree.clear();
        self.tree.drain_events();
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
        }
        self.rig = None;
        self.selected = None;
        self.controls.stop();
        self.controls.set_enabled(false);
        self.lifecycle = Lifecycle::Disposed;
        log::info!("Orchestrator disposed ({} nodes destroyed)", destroyed);
    }

    /// Whether `initialize` succeeded and `dispose` has not run
    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }

    // --- parameters ---------------------------------------------------------

    /// Bind a UI input to `"<node name>.<payload key>"`.
    ///
    /// `handler` runs after the payload write and may make further scene
    /// mutations; the resulting events drive reconciliation.
    pub fn bind_parameter(
        &mut self,
        source_id: &str,
        path: &str,
        kind: InputKind,
        handler: Option<ParameterHandler>,
    ) -> Result<(), ParameterError> {
        self.parameters.bind(source_id, path, kind, handler)
    }

    /// Remove an input binding
    pub fn unbind_parameter(&mut self, source_id: &str) -> bool {
        self.parameters.unbind(source_id)
    }

    /// Bound input ids, sorted
    pub fn parameter_sources(&self) -> Vec<&str> {
        self.parameters.sources()
    }

    /// Deliver a changed input value
    pub fn on_input_changed(
        &mut self,
        source_id: &str,
        value: impl Into<ParameterValue>,
    ) -> Result<(), ParameterError> {
        if !self.is_initialized() {
            return Err(ParameterError::NotInitialized);
        }
        if let Some(value) = self.parameters.submit(source_id, value.into(), Instant::now())? {
            self.parameters.apply(&mut self.tree, source_id, &value)?;
        }
        Ok(())
    }

    /// Apply every pending continuous value now
    pub fn flush_parameters(&mut self) -> usize {
        let pending = self.parameters.take_all();
        self.apply_parameters(pending)
    }

    fn apply_parameters(&mut self, values: Vec<(String, ParameterValue)>) -> usize {
        let mut applied = 0;
        for (source, value) in values {
            match self.parameters.apply(&mut self.tree, &source, &value) {
                Ok(_) => applied += 1,
                Err(e) => log::warn!("Parameter '{}' not applied: {}", source, e),
            }
        }
        applied
    }

    // --- frame loop ---------------------------------------------------------

    /// Run one frame; returns the number of draw commands submitted
    pub fn tick(&mut self) -> RenderResult<usize> {
        if !self.is_initialized() {
            return Err(RenderError::RenderingFailed("orchestrator is not initialized".to_string()));
        }
        self.timer.update();
        let due = self.parameters.take_due(Instant::now());
        self.apply_parameters(due);
        self.sync_engine()?;

        self.controls.update(&mut self.camera);
        let engine = self.engine.as_mut().ok_or_else(not_initialized)?;
        let draws = engine.render_frame(&self.tree, &self.camera)?;
        log::trace!("Frame {} submitted {} draws", self.timer.frame_count(), draws);
        Ok(draws)
    }

    /// Tick `frames` times, paced to the configured frame rate
    pub fn run(&mut self, frames: u64) -> RenderResult<u64> {
        let budget = Duration::from_secs_f64(1.0 / f64::from(self.config.viewer.target_fps.max(1)));
        log::info!("Running {} frames at {} fps", frames, self.config.viewer.target_fps);
        for _ in 0..frames {
            let started = Instant::now();
            self.tick()?;
            if let Some(remaining) = budget.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
        Ok(frames)
    }

    /// Wait for background mesh and landmark work, applying results as they
    /// arrive. Returns the number of completions applied.
    pub fn wait_for_tasks(&mut self, timeout: Duration) -> RenderResult<usize> {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        loop {
            let engine = self.engine.as_mut().ok_or_else(not_initialized)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            applied += engine.wait_for_tasks(&mut self.tree, remaining)?;
            applied += self.sync_engine()?;
            let engine = self.engine_mut()?;
            if engine.stats().tasks_in_flight == 0 || Instant::now() >= deadline {
                return Ok(applied);
            }
        }
    }

    /// Apply completions, then reconcile nodes named by tree events
    fn sync_engine(&mut self) -> RenderResult<usize> {
        let engine = self.engine.as_mut().ok_or_else(not_initialized)?;
        let applied = engine.process_completions(&mut self.tree)?;
        let events = self.tree.drain_events();
        if !events.is_empty() {
            let touched = engine.handle_events(&mut self.tree, &events)?;
            log::debug!("{} event(s) reconciled {} node(s)", events.len(), touched);
        }
        Ok(applied)
    }

    /// Resize the drawing surface
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        self.engine_mut()?.backend_mut().resize(width, height)?;
        self.camera.set_viewport(width, height);
        Ok(())
    }

    // --- landmark service ---------------------------------------------------

    /// The landmark service became ready: send queued requests
    pub fn notify_landmark_service_ready(&mut self) -> usize {
        match self.engine.as_mut() {
            Some(engine) => engine.notify_landmark_service_ready(&self.tree),
            None => 0,
        }
    }

    /// Ask the landmark service whether it is ready
    pub fn probe_landmark_service(&mut self) -> bool {
        match self.engine.as_mut() {
            Some(engine) => engine.probe_landmark_service(&self.tree),
            None => false,
        }
    }

    // --- camera -------------------------------------------------------------

    /// Camera to the configured home position, looking at the floor center
    pub fn reset_camera(&mut self) {
        self.controls.stop();
        self.camera.set_position(Vec3::from(self.config.viewer.camera_home));
        self.camera.look_at(Vec3::zeros(), Vec3::y());
    }

    /// Frame everything currently drawn; falls back to `reset_camera` when
    /// nothing is. Returns whether bounds were found.
    pub fn fit_camera_to_scene(&mut self) -> bool {
        let bounds = self
            .engine
            .as_ref()
            .and_then(|engine| engine.scene_bounds(&self.tree).ok().flatten());
        match bounds {
            Some(bounds) => {
                self.controls.stop();
                self.camera.fit_bounds(&bounds);
                true
            }
            None => {
                self.reset_camera();
                false
            }
        }
    }

    /// Current camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Orbit controls for pointer input
    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    // --- queries ------------------------------------------------------------

    /// Node by id or name
    pub fn get_scene_node<'a>(&self, query: impl Into<NodeQuery<'a>>) -> Option<&SceneNode> {
        match query.into() {
            NodeQuery::Id(id) => self.tree.get(id),
            NodeQuery::Name(name) => self.tree.find_by_name(name).and_then(|id| self.tree.get(id)),
        }
    }

    /// Every live node in hierarchy order
    pub fn get_all_scene_nodes(&self) -> Vec<&SceneNode> {
        self.tree.all_nodes().into_iter().filter_map(|id| self.tree.get(id)).collect()
    }

    /// Live nodes of one type in hierarchy order
    pub fn get_scene_nodes_by_type(&self, node_type: NodeType) -> Vec<&SceneNode> {
        self.tree
            .nodes_of_type(node_type)
            .into_iter()
            .filter_map(|id| self.tree.get(id))
            .collect()
    }

    /// Ordered listing of the hierarchy for a scene tree display
    pub fn scene_listing(&self) -> Vec<SceneListingEntry> {
        let Some(root) = self.tree.root() else {
            return Vec::new();
        };
        let mut listing = Vec::new();
        let traversed = self.tree.traverse(root, true, |node, depth| {
            listing.push(SceneListingEntry {
                id: node.id(),
                name: node.name().to_string(),
                node_type: node.node_type(),
                visible: node.is_visible(),
                depth,
                selected: self.selected == Some(node.id()),
            });
            VisitControl::Continue
        });
        if let Err(e) = traversed {
            log::warn!("Scene listing incomplete: {}", e);
        }
        listing
    }

    /// Flip a node's visibility; returns the new value
    pub fn toggle_visibility(&mut self, id: NodeId) -> SceneResult<bool> {
        let visible = !self.tree.node(id)?.is_visible();
        self.tree.set_visible(id, visible)?;
        Ok(visible)
    }

    /// Select a node (or clear the selection with `None`)
    pub fn select(&mut self, id: Option<NodeId>) -> SceneResult<()> {
        if let Some(id) = id {
            self.tree.node(id)?;
        }
        if let Some(previous) = self.selected.take() {
            if self.tree.contains(previous) {
                self.tree.set_data(previous, keys::SELECTED, false)?;
            }
        }
        if let Some(id) = id {
            self.tree.set_data(id, keys::SELECTED, true)?;
        }
        self.selected = id;
        Ok(())
    }

    /// Currently selected node
    pub fn selected(&self) -> Option<NodeId> {
        self.selected.filter(|id| self.tree.contains(*id))
    }

    /// Ids of the default hierarchy
    pub fn rig_nodes(&self) -> Option<RigNodes> {
        self.rig
    }

    /// Scene tree
    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    /// Scene tree for direct mutation; changes are reconciled on the next tick
    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    /// Rendering engine, once initialized
    pub fn engine(&self) -> Option<&RenderingEngine> {
        self.engine.as_ref()
    }

    /// Active configuration
    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Current counters
    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            nodes: self.tree.len(),
            pending_parameters: self.parameters.pending_count(),
            engine: self.engine.as_ref().map(RenderingEngine::stats).unwrap_or_default(),
        }
    }

    fn engine_mut(&mut self) -> RenderResult<&mut RenderingEngine> {
        self.engine.as_mut().ok_or_else(not_initialized)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn not_initialized() -> RenderError {
    RenderError::RenderingFailed("orchestrator is not initialized".to_string())
}

/// Put the monitor in front of the subject's eye
fn place_monitor(tree: &mut SceneTree) -> SceneResult<()> {
    let (Some(monitor), Some(subject)) = (tree.find_by_name(MONITOR_NODE), tree.find_by_name(SUBJECT_NODE)) else {
        return Ok(());
    };
    let eye_height = tree.subject_data(subject)?.eye_height;
    let placement = tree.monitor_data(monitor)?.placement(eye_height);
    tree.set_transform(monitor, placement)
}
