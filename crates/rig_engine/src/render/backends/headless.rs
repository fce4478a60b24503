//! Headless render backend
//!
//! Keeps resources in memory and records what each frame would have drawn.
//! Used by the viewer when no GPU surface is available and by tests, which
//! rely on its accounting of live and double-released resources.

use slotmap::SlotMap;

use crate::render::api::{BackendResult, MaterialHandle, MeshHandle, RenderBackend, RenderFrameData};
use crate::render::primitives::{Mesh, Topology};
use crate::render::{Material, RenderError};

/// Stored mesh resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshRecord {
    vertex_count: usize,
    index_count: usize,
    topology: Topology,
}

/// What the last frame contained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Number of draw commands
    pub draw_count: usize,
    /// Vertices referenced by all draws
    pub vertex_count: usize,
    /// Draws using line topology
    pub line_draws: usize,
}

/// Lifetime resource accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounters {
    /// Meshes ever created
    pub meshes_created: usize,
    /// Meshes released
    pub meshes_released: usize,
    /// Materials ever created
    pub materials_created: usize,
    /// Materials released
    pub materials_released: usize,
    /// Releases of handles that were not live
    pub invalid_releases: usize,
}

/// In-memory backend
#[derive(Debug)]
pub struct HeadlessBackend {
    extent: (u32, u32),
    meshes: SlotMap<MeshHandle, MeshRecord>,
    materials: SlotMap<MaterialHandle, [f32; 4]>,
    counters: ResourceCounters,
    frames_drawn: u64,
    last_frame: FrameSummary,
}

impl HeadlessBackend {
    /// Backend with a fixed surface size
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Headless backend created ({}x{})", width, height);
        Self {
            extent: (width, height),
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            counters: ResourceCounters::default(),
            frames_drawn: 0,
            last_frame: FrameSummary::default(),
        }
    }

    /// Live mesh resources
    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// Live material resources
    pub fn live_materials(&self) -> usize {
        self.materials.len()
    }

    /// Lifetime counters
    pub fn counters(&self) -> ResourceCounters {
        self.counters
    }

    /// Frames drawn so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Summary of the most recent frame
    pub fn last_frame(&self) -> FrameSummary {
        self.last_frame
    }
}

impl RenderBackend for HeadlessBackend {
    fn surface_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::RenderingFailed(format!(
                "cannot resize surface to {}x{}",
                width, height
            )));
        }
        self.extent = (width, height);
        Ok(())
    }

    fn create_mesh_resource(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle> {
        if mesh.is_empty() {
            return Err(RenderError::ResourceCreationFailed("mesh has no geometry".to_string()));
        }
        if let Some(bad) = mesh.indices.iter().find(|i| **i as usize >= mesh.vertices.len()) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "index {} out of range for {} vertices",
                bad,
                mesh.vertices.len()
            )));
        }
        self.counters.meshes_created += 1;
        Ok(self.meshes.insert(MeshRecord {
            vertex_count: mesh.vertices.len(),
            index_count: mesh.indices.len(),
            topology: mesh.topology,
        }))
    }

    fn create_material(&mut self, material: &Material) -> BackendResult<MaterialHandle> {
        self.counters.materials_created += 1;
        Ok(self.materials.insert(material.base_color()))
    }

    fn release_mesh_resource(&mut self, handle: MeshHandle) -> BackendResult<()> {
        if self.meshes.remove(handle).is_some() {
            self.counters.meshes_released += 1;
            Ok(())
        } else {
            self.counters.invalid_releases += 1;
            Err(RenderError::InvalidHandle(format!("{:?}", handle)))
        }
    }

    fn release_material(&mut self, handle: MaterialHandle) -> BackendResult<()> {
        if self.materials.remove(handle).is_some() {
            self.counters.materials_released += 1;
            Ok(())
        } else {
            self.counters.invalid_releases += 1;
            Err(RenderError::InvalidHandle(format!("{:?}", handle)))
        }
    }

    fn draw_frame(&mut self, frame: &RenderFrameData<'_>) -> BackendResult<()> {
        let mut summary = FrameSummary::default();
        for draw in frame.draws {
            let record = self
                .meshes
                .get(draw.mesh)
                .ok_or_else(|| RenderError::InvalidHandle(format!("{:?}", draw.mesh)))?;
            if let Some(material) = draw.material {
                if !self.materials.contains_key(material) {
                    return Err(RenderError::InvalidHandle(format!("{:?}", material)));
                }
            }
            summary.draw_count += 1;
            summary.vertex_count += record.vertex_count;
            if record.topology == Topology::Lines {
                summary.line_draws += 1;
            }
        }
        self.frames_drawn += 1;
        self.last_frame = summary;
        log::trace!(
            "Headless frame {}: {} draws, {} vertices",
            self.frames_drawn,
            summary.draw_count,
            summary.vertex_count
        );
        Ok(())
    }

    fn wait_idle(&self) -> BackendResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_release_is_reported() {
        let mut backend = HeadlessBackend::new(64, 64);
        let handle = backend.create_mesh_resource(&Mesh::cube(1.0)).expect("valid mesh");

        assert!(backend.release_mesh_resource(handle).is_ok());
        assert!(matches!(
            backend.release_mesh_resource(handle),
            Err(RenderError::InvalidHandle(_))
        ));
        assert_eq!(backend.counters().invalid_releases, 1);
        assert_eq!(backend.live_meshes(), 0);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let empty = Mesh::new(Vec::new(), Vec::new());
        assert!(backend.create_mesh_resource(&empty).is_err());
        assert_eq!(backend.counters().meshes_created, 0);
    }
}
