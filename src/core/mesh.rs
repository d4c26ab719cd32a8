//! Concave collision geometry: triangle meshes with an internal BVH, and
//! regular-grid height fields.

use std::collections::HashMap;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::aabb::Aabb;

use super::types::MassProperties;

const NULL_BVH_NODE: i32 = -1;

/// A node of the triangle BVH. Leaves reference a run of the reordered
/// triangle index list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MeshBvhNode {
    bounds: Aabb,
    left: i32,
    right: i32,
    start: u32,
    count: u32,
}

impl MeshBvhNode {
    fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Median-split BVH over triangle AABBs, built once at cook time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshBvh {
    nodes: Vec<MeshBvhNode>,
    /// Triangle indices, permuted so every leaf owns a contiguous run.
    order: Vec<u32>,
}

const BVH_LEAF_SIZE: usize = 4;

impl MeshBvh {
    fn build(triangle_aabbs: &[Aabb]) -> Self {
        let mut order: Vec<u32> = (0..triangle_aabbs.len() as u32).collect();
        let mut nodes = Vec::new();
        if !order.is_empty() {
            Self::build_recursive(triangle_aabbs, &mut order, 0, triangle_aabbs.len(), &mut nodes);
        }
        Self { nodes, order }
    }

    fn build_recursive(
        aabbs: &[Aabb],
        order: &mut [u32],
        start: usize,
        end: usize,
        nodes: &mut Vec<MeshBvhNode>,
    ) -> i32 {
        let mut bounds = Aabb::empty();
        for &tri in &order[start..end] {
            bounds = bounds.merged(&aabbs[tri as usize]);
        }

        let node_index = nodes.len() as i32;
        nodes.push(MeshBvhNode {
            bounds,
            left: NULL_BVH_NODE,
            right: NULL_BVH_NODE,
            start: start as u32,
            count: 0,
        });

        let count = end - start;
        if count <= BVH_LEAF_SIZE {
            nodes[node_index as usize].count = count as u32;
            return node_index;
        }

        let extent = bounds.extent();
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        order[start..end].sort_by(|&a, &b| {
            let ca = aabbs[a as usize].center()[axis];
            let cb = aabbs[b as usize].center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mid = start + count / 2;
        let left = Self::build_recursive(aabbs, order, start, mid, nodes);
        let right = Self::build_recursive(aabbs, order, mid, end, nodes);
        nodes[node_index as usize].left = left;
        nodes[node_index as usize].right = right;
        node_index
    }

    /// Visits every triangle whose AABB overlaps `query`.
    fn for_each_overlapping(&self, query: &Aabb, mut visitor: impl FnMut(u32)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0i32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.overlaps(query) {
                continue;
            }
            if node.is_leaf() {
                let start = node.start as usize;
                for &tri in &self.order[start..start + node.count as usize] {
                    visitor(tri);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }
}

/// Cooked triangle mesh collider data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
    /// Suppress duplicate contacts at shared edges and vertices.
    pub smooth_contacts: bool,
    bvh: MeshBvh,
}

impl TriangleMesh {
    pub fn builder(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> MeshBuilder {
        MeshBuilder::new(vertices, indices)
    }

    pub fn triangle(&self, index: u32) -> [Vec3; 3] {
        let tri = self.indices[index as usize];
        [
            self.vertices[tri[0] as usize],
            self.vertices[tri[1] as usize],
            self.vertices[tri[2] as usize],
        ]
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Visits every triangle whose AABB overlaps `query` (mesh-local space).
    pub fn for_each_triangle_in_aabb(&self, query: &Aabb, mut visitor: impl FnMut(u32, [Vec3; 3])) {
        self.bvh
            .for_each_overlapping(query, |tri| visitor(tri, self.triangle(tri)));
    }

    /// Closest triangle hit of a local-space segment, as `(t, normal)`.
    pub fn raycast_local(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        let mut best: Option<(f32, Vec3)> = None;
        let mut segment = Aabb::from_points(&[origin, origin + direction * max_t]);
        segment = segment.inflated(1e-4);

        self.bvh.for_each_overlapping(&segment, |tri| {
            let verts = self.triangle(tri);
            if let Some(t) = ray_triangle(origin, direction, max_t, verts) {
                if best.map(|(bt, _)| t < bt).unwrap_or(true) {
                    let mut normal =
                        (verts[1] - verts[0]).cross(verts[2] - verts[0]).normalize_or_zero();
                    if normal.dot(direction) > 0.0 {
                        normal = -normal;
                    }
                    best = Some((t, normal));
                }
            }
        });

        best
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounds.extent().length()
    }

    /// Approximates mass and inertia by treating the mesh bounds as a
    /// solid box of the given density.
    pub fn approximate_mass_properties(&self, density: f32) -> MassProperties {
        let size = self.bounds.extent() * 2.0;
        let volume = (size.x * size.y * size.z).max(1e-6);
        let mass = (volume * density.max(1e-4)).max(1e-4);
        let factor = mass / 12.0;
        let inertia = Mat3::from_diagonal(Vec3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ));
        MassProperties { mass, inertia }
    }
}

/// Möller-Trumbore ray/triangle intersection over `[0, max_t]`, two-sided.
pub(crate) fn ray_triangle(
    origin: Vec3,
    direction: Vec3,
    max_t: f32,
    verts: [Vec3; 3],
) -> Option<f32> {
    let edge1 = verts[1] - verts[0];
    let edge2 = verts[2] - verts[0];
    let pvec = direction.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < 1e-12 {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = origin - verts[0];
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    (t >= 0.0 && t <= max_t).then_some(t)
}

/// Cooks triangle meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    smooth_contacts: bool,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            indices,
            smooth_contacts: false,
        }
    }

    pub fn smooth_contacts(mut self, enabled: bool) -> Self {
        self.smooth_contacts = enabled;
        self
    }

    /// Deduplicates vertices using a quantized grid for stability.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let inv = 1.0 / epsilon;
        let mut map: HashMap<(i32, i32, i32), u32> = HashMap::new();
        let mut new_vertices: Vec<Vec3> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = (
                (v.x * inv).round() as i32,
                (v.y * inv).round() as i32,
                (v.z * inv).round() as i32,
            );
            let index = *map.entry(key).or_insert_with(|| {
                let idx = new_vertices.len() as u32;
                new_vertices.push(*v);
                idx
            });
            remap.push(index);
        }

        for tri in &mut self.indices {
            for slot in tri.iter_mut() {
                *slot = remap[*slot as usize];
            }
        }

        self.vertices = new_vertices;
        self
    }

    /// Recenters vertices around their centroid to keep transforms stable.
    pub fn recenter(mut self) -> Self {
        if self.vertices.is_empty() {
            return self;
        }
        let centroid: Vec3 =
            self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32;
        for vertex in &mut self.vertices {
            *vertex -= centroid;
        }
        self
    }

    pub fn build(self) -> TriangleMesh {
        let bounds = Aabb::from_points(&self.vertices);
        let triangle_aabbs: Vec<Aabb> = self
            .indices
            .iter()
            .map(|tri| {
                Aabb::from_points(&[
                    self.vertices[tri[0] as usize],
                    self.vertices[tri[1] as usize],
                    self.vertices[tri[2] as usize],
                ])
            })
            .collect();
        let bvh = MeshBvh::build(&triangle_aabbs);

        TriangleMesh {
            vertices: self.vertices,
            indices: self.indices,
            bounds,
            smooth_contacts: self.smooth_contacts,
            bvh,
        }
    }
}

/// Regular-grid height field centered on the local origin, sampled along
/// X (columns) and Z (rows), heights along Y.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    pub columns: usize,
    pub rows: usize,
    pub spacing: f32,
    pub heights: Vec<f32>,
    pub smooth_contacts: bool,
    min_height: f32,
    max_height: f32,
}

impl HeightField {
    pub fn new(columns: usize, rows: usize, spacing: f32, heights: Vec<f32>) -> Self {
        assert!(columns >= 2 && rows >= 2, "height field needs at least 2x2 samples");
        assert_eq!(heights.len(), columns * rows);
        let min_height = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let max_height = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Self {
            columns,
            rows,
            spacing,
            heights,
            smooth_contacts: false,
            min_height,
            max_height,
        }
    }

    pub fn with_smooth_contacts(mut self, enabled: bool) -> Self {
        self.smooth_contacts = enabled;
        self
    }

    fn origin_x(&self) -> f32 {
        -0.5 * (self.columns - 1) as f32 * self.spacing
    }

    fn origin_z(&self) -> f32 {
        -0.5 * (self.rows - 1) as f32 * self.spacing
    }

    pub fn sample(&self, column: usize, row: usize) -> Vec3 {
        Vec3::new(
            self.origin_x() + column as f32 * self.spacing,
            self.heights[row * self.columns + column],
            self.origin_z() + row as f32 * self.spacing,
        )
    }

    pub fn local_bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.origin_x(), self.min_height, self.origin_z()),
            Vec3::new(-self.origin_x(), self.max_height, -self.origin_z()),
        )
    }

    pub fn triangle_count(&self) -> usize {
        2 * (self.columns - 1) * (self.rows - 1)
    }

    /// Triangle `2*cell` and `2*cell + 1` of a cell, both wound with an
    /// upward-facing normal.
    pub fn triangle(&self, index: u32) -> [Vec3; 3] {
        let cell = (index / 2) as usize;
        let cells_per_row = self.columns - 1;
        let row = cell / cells_per_row;
        let column = cell % cells_per_row;

        let p00 = self.sample(column, row);
        let p10 = self.sample(column + 1, row);
        let p01 = self.sample(column, row + 1);
        let p11 = self.sample(column + 1, row + 1);

        if index % 2 == 0 {
            [p00, p01, p11]
        } else {
            [p00, p11, p10]
        }
    }

    /// Visits every triangle overlapping `query` (field-local space) by
    /// clamping the query footprint to the sample grid.
    pub fn for_each_triangle_in_aabb(&self, query: &Aabb, mut visitor: impl FnMut(u32, [Vec3; 3])) {
        if query.min.y > self.max_height || query.max.y < self.min_height {
            return;
        }

        let inv = 1.0 / self.spacing;
        let min_col = (((query.min.x - self.origin_x()) * inv).floor() as isize)
            .clamp(0, (self.columns - 2) as isize) as usize;
        let max_col = (((query.max.x - self.origin_x()) * inv).ceil() as isize)
            .clamp(0, (self.columns - 2) as isize) as usize;
        let min_row = (((query.min.z - self.origin_z()) * inv).floor() as isize)
            .clamp(0, (self.rows - 2) as isize) as usize;
        let max_row = (((query.max.z - self.origin_z()) * inv).ceil() as isize)
            .clamp(0, (self.rows - 2) as isize) as usize;

        let cells_per_row = self.columns - 1;
        for row in min_row..=max_row {
            for column in min_col..=max_col {
                let cell = (row * cells_per_row + column) as u32;
                for tri in [cell * 2, cell * 2 + 1] {
                    visitor(tri, self.triangle(tri));
                }
            }
        }
    }

    /// Closest triangle hit of a local-space segment, as `(t, normal)`.
    pub fn raycast_local(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
        let segment = Aabb::from_points(&[origin, origin + direction * max_t]).inflated(1e-4);
        let mut best: Option<(f32, Vec3)> = None;
        self.for_each_triangle_in_aabb(&segment, |_, verts| {
            if let Some(t) = ray_triangle(origin, direction, max_t, verts) {
                if best.map(|(bt, _)| t < bt).unwrap_or(true) {
                    let mut normal =
                        (verts[1] - verts[0]).cross(verts[2] - verts[0]).normalize_or_zero();
                    if normal.dot(direction) > 0.0 {
                        normal = -normal;
                    }
                    best = Some((t, normal));
                }
            }
        });
        best
    }
}
