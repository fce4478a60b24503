//! Mesh representation for 3D models
//!
//! Backend-agnostic geometry: vertices, indices and a topology. Primitive
//! builders cover the shapes the rig scene needs (boxes, spheres, planes and
//! line grids); loaded models come from [`crate::assets`].

use std::collections::HashSet;

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{constants::PI, Aabb, Vec3};

/// Cap on segments, rings and grid cells in the primitive builders
pub const MAX_SUBDIVISIONS: u32 = 1024;

/// 3D vertex data structure for rendering
///
/// `#[repr(C)]` keeps the layout stable for buffer uploads.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in mesh-local space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }

    /// Position as a vector
    pub fn position_vec(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// How indices are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Every three indices form a triangle
    Triangles,
    /// Every two indices form a line segment
    Lines,
}

/// 3D mesh containing vertices and indices for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,

    /// Index data
    pub indices: Vec<u32>,

    /// Primitive assembly
    pub topology: Topology,
}

impl Mesh {
    /// Create a new triangle mesh
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            topology: Topology::Triangles,
        }
    }

    /// Create a line mesh
    pub fn lines(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            topology: Topology::Lines,
        }
    }

    /// Axis-aligned box centered at the origin.
    ///
    /// Four vertices per face so each face keeps its own outward normal.
    pub fn cuboid(size: Vec3) -> Self {
        let h = size * 0.5;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            // +Z
            ([0.0, 0.0, 1.0], [[-h.x, -h.y, h.z], [h.x, -h.y, h.z], [h.x, h.y, h.z], [-h.x, h.y, h.z]]),
            // -Z
            ([0.0, 0.0, -1.0], [[h.x, -h.y, -h.z], [-h.x, -h.y, -h.z], [-h.x, h.y, -h.z], [h.x, h.y, -h.z]]),
            // +X
            ([1.0, 0.0, 0.0], [[h.x, -h.y, h.z], [h.x, -h.y, -h.z], [h.x, h.y, -h.z], [h.x, h.y, h.z]]),
            // -X
            ([-1.0, 0.0, 0.0], [[-h.x, -h.y, -h.z], [-h.x, -h.y, h.z], [-h.x, h.y, h.z], [-h.x, h.y, -h.z]]),
            // +Y
            ([0.0, 1.0, 0.0], [[-h.x, h.y, h.z], [h.x, h.y, h.z], [h.x, h.y, -h.z], [-h.x, h.y, -h.z]]),
            // -Y
            ([0.0, -1.0, 0.0], [[-h.x, -h.y, -h.z], [h.x, -h.y, -h.z], [h.x, -h.y, h.z], [-h.x, -h.y, h.z]]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            vertices.extend(corners.iter().map(|corner| Vertex::new(*corner, normal)));
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self::new(vertices, indices)
    }

    /// Cube with the given edge length
    pub fn cube(edge: f32) -> Self {
        Self::cuboid(Vec3::new(edge, edge, edge))
    }

    /// UV sphere centered at the origin
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.clamp(3, MAX_SUBDIVISIONS);
        let rings = rings.clamp(2, MAX_SUBDIVISIONS);
        let mut vertices = Vec::with_capacity((segments as usize + 1) * (rings as usize + 1));
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            for segment in 0..=segments {
                let theta = 2.0 * PI * segment as f32 / segments as f32;
                let normal = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
                let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
                vertices.push(Vertex::new(position, normal));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Flat rectangle in the XZ plane facing +Y
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-hw, 0.0, hd], up),
            Vertex::new([hw, 0.0, hd], up),
            Vertex::new([hw, 0.0, -hd], up),
            Vertex::new([-hw, 0.0, -hd], up),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// Line grid in the XZ plane with `divisions` cells per side
    pub fn grid(width: f32, depth: f32, divisions: u32) -> Self {
        let divisions = divisions.clamp(1, MAX_SUBDIVISIONS);
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let up = [0.0, 1.0, 0.0];
        let mut vertices = Vec::with_capacity((divisions as usize + 1) * 4);

        for i in 0..=divisions {
            let t = i as f32 / divisions as f32;
            let x = -hw + width * t;
            let z = -hd + depth * t;
            vertices.push(Vertex::new([x, 0.0, -hd], up));
            vertices.push(Vertex::new([x, 0.0, hd], up));
            vertices.push(Vertex::new([-hw, 0.0, z], up));
            vertices.push(Vertex::new([hw, 0.0, z], up));
        }
        let indices = (0..vertices.len() as u32).collect();
        Self::lines(vertices, indices)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles (zero for line meshes)
    pub fn triangle_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::Lines => 0,
        }
    }

    /// Whether the mesh has no geometry
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Bounding box of all vertex positions
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(Vertex::position_vec))
    }

    /// Center of the bounding box
    pub fn centroid(&self) -> Option<Vec3> {
        self.bounds().map(|bounds| bounds.center())
    }

    /// Vertex positions with exact duplicates removed, first occurrence order
    pub fn unique_positions(&self) -> Vec<[f32; 3]> {
        let mut seen = HashSet::with_capacity(self.vertices.len());
        self.vertices
            .iter()
            .map(|vertex| vertex.position)
            .filter(|p| seen.insert([p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]))
            .collect()
    }

    /// Copy of the mesh with every position moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        let mut mesh = self.clone();
        for vertex in &mut mesh.vertices {
            vertex.position[0] += offset.x;
            vertex.position[1] += offset.y;
            vertex.position[2] += offset.z;
        }
        mesh
    }

    /// Copy of the mesh with `center` moved to the origin, then scaled uniformly.
    ///
    /// Normals are kept; `scale` must be positive.
    pub fn recentered(&self, center: Vec3, scale: f32) -> Self {
        let mut mesh = self.clone();
        for vertex in &mut mesh.vertices {
            let p = (vertex.position_vec() - center) * scale;
            vertex.position = [p.x, p.y, p.z];
        }
        mesh
    }

    /// Replace vertex normals with per-triangle face normals
    pub fn recompute_flat_normals(&mut self) {
        if self.topology != Topology::Triangles {
            return;
        }
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= self.vertices.len() || b >= self.vertices.len() || c >= self.vertices.len() {
                continue;
            }
            let normal = face_normal(
                self.vertices[a].position_vec(),
                self.vertices[b].position_vec(),
                self.vertices[c].position_vec(),
            );
            for index in [a, b, c] {
                self.vertices[index].normal = [normal.x, normal.y, normal.z];
            }
        }
    }
}

/// Unit normal of a counter-clockwise triangle, zero when degenerate
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let cross = (b - a).cross(&(c - a));
    let length = cross.norm();
    if length > f32::EPSILON {
        cross / length
    } else {
        Vec3::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_bounds_match_size() {
        let mesh = Mesh::cuboid(Vec3::new(8.0, 2.0, 4.0));
        let bounds = mesh.bounds().expect("non-empty");

        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert_relative_eq!(bounds.size(), Vec3::new(8.0, 2.0, 4.0));
        assert_relative_eq!(bounds.center(), Vec3::zeros());
    }

    #[test]
    fn test_unique_positions_drop_exact_duplicates() {
        let mesh = Mesh::cube(1.0);
        // 24 face vertices share 8 corners
        assert_eq!(mesh.unique_positions().len(), 8);
    }

    #[test]
    fn test_recentered_fits_target_length() {
        let mesh = Mesh::cuboid(Vec3::new(4.0, 1.0, 2.0)).translated(Vec3::new(10.0, 5.0, 0.0));
        let bounds = mesh.bounds().expect("non-empty");
        let scaled = mesh.recentered(bounds.center(), 8.0 / bounds.max_dimension());
        let result = scaled.bounds().expect("non-empty");

        assert_relative_eq!(result.center(), Vec3::zeros(), epsilon = 1e-5);
        assert_relative_eq!(result.max_dimension(), 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_grid_is_line_topology() {
        let grid = Mesh::grid(100.0, 50.0, 10);
        assert_eq!(grid.topology, Topology::Lines);
        assert_eq!(grid.indices.len(), 44);
        assert_eq!(grid.triangle_count(), 0);
        assert_relative_eq!(grid.bounds().expect("lines").size().x, 100.0);
    }

    #[test]
    fn test_oversized_subdivisions_are_capped() {
        let grid = Mesh::grid(10.0, 10.0, u32::MAX);
        assert_eq!(grid.vertex_count(), (MAX_SUBDIVISIONS as usize + 1) * 4);

        let sphere = Mesh::sphere(1.0, u32::MAX, 2);
        assert_eq!(sphere.vertex_count(), (MAX_SUBDIVISIONS as usize + 1) * 3);
    }

    #[test]
    fn test_sphere_radius() {
        let sphere = Mesh::sphere(0.25, 12, 8);
        for vertex in &sphere.vertices {
            assert_relative_eq!(vertex.position_vec().norm(), 0.25, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_face_normal_follows_winding() {
        let normal = face_normal(Vec3::zeros(), Vec3::x(), Vec3::y());
        assert_relative_eq!(normal, Vec3::z());
        assert_eq!(face_normal(Vec3::zeros(), Vec3::x(), Vec3::x()), Vec3::zeros());
    }
}
