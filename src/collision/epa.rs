//! Expanding Polytope Algorithm: penetration normal and depth for convex
//! pairs whose GJK simplex encloses the origin.
//!
//! The polytope is a triangle mesh over Minkowski-difference vertices, each
//! carrying its support witnesses on both shapes. Faces keep mutual edge
//! adjacency; expansion pops the face closest to the origin from a priority
//! queue, walks the silhouette visible from the new support point, and
//! stitches a fan of fresh faces over the horizon.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;

use crate::core::collider::SupportMap;
use crate::utils::math::{barycentric_coordinates, tangent_basis};

use super::gjk::Simplex;

#[derive(Debug, Clone, Copy)]
pub struct EpaSettings {
    /// Expansion-delta tolerance, relative to the penetration depth.
    pub tolerance: f32,
    pub max_iterations: u32,
}

impl Default for EpaSettings {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-6,
            max_iterations: 30,
        }
    }
}

/// Resolved penetration between two overlapping convex shapes.
#[derive(Debug, Clone, Copy)]
pub struct PenetrationInfo {
    /// Unit contact normal, pointing from shape A towards shape B.
    pub normal: Vec3,
    pub depth: f32,
    /// Witness point on A, world space.
    pub point_a: Vec3,
    /// Witness point on B, world space.
    pub point_b: Vec3,
}

const NULL_FACE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Face {
    verts: [u32; 3],
    /// `adj[e]` = (face on the other side of edge e, that edge's index in
    /// the neighbor). Links are mutual once the mesh is closed.
    adj: [(u32, u8); 3],
    normal: Vec3,
    /// Plane distance from the origin along `normal`.
    dist: f32,
    obsolete: bool,
}

struct HeapEntry {
    dist: f32,
    face: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the closest face.
        other.dist.total_cmp(&self.dist)
    }
}

struct Polytope {
    points: Vec<Vec3>,
    supports_a: Vec<Vec3>,
    supports_b: Vec<Vec3>,
    faces: Vec<Face>,
    heap: BinaryHeap<HeapEntry>,
}

impl Polytope {
    fn add_vertex(&mut self, point: Vec3, support_a: Vec3, support_b: Vec3) -> u32 {
        self.points.push(point);
        self.supports_a.push(support_a);
        self.supports_b.push(support_b);
        (self.points.len() - 1) as u32
    }

    fn add_face(&mut self, verts: [u32; 3]) -> u32 {
        let p0 = self.points[verts[0] as usize];
        let p1 = self.points[verts[1] as usize];
        let p2 = self.points[verts[2] as usize];
        let mut normal = (p1 - p0).cross(p2 - p0).normalize_or_zero();
        if normal == Vec3::ZERO {
            // Degenerate sliver; give it an outward-ish plane so it sorts
            // last and gets consumed by a later silhouette.
            normal = p0.normalize_or_zero();
        }
        let dist = normal.dot(p0);
        let index = self.faces.len() as u32;
        self.faces.push(Face {
            verts,
            adj: [(NULL_FACE, 0); 3],
            normal,
            dist,
            obsolete: false,
        });
        self.heap.push(HeapEntry { dist, face: index });
        index
    }

    /// Re-derives all adjacency links from directed edges. Used once on the
    /// seed tetrahedron; expansion maintains links incrementally.
    fn rebuild_adjacency(&mut self) {
        let mut by_edge: HashMap<(u32, u32), (u32, u8)> = HashMap::new();
        for (index, face) in self.faces.iter().enumerate() {
            for e in 0..3 {
                let a = face.verts[e];
                let b = face.verts[(e + 1) % 3];
                by_edge.insert((a, b), (index as u32, e as u8));
            }
        }
        for index in 0..self.faces.len() {
            for e in 0..3 {
                let a = self.faces[index].verts[e];
                let b = self.faces[index].verts[(e + 1) % 3];
                if let Some(&partner) = by_edge.get(&(b, a)) {
                    self.faces[index].adj[e] = partner;
                }
            }
        }
    }

    fn is_visible(&self, face: u32, from: Vec3) -> bool {
        let f = &self.faces[face as usize];
        f.normal.dot(from) > f.dist + 1.0e-9
    }

    /// Marks every face visible from `from` as obsolete, starting at the
    /// known-visible `seed`, and collects the horizon: directed edges
    /// `(face, edge)` of surviving faces bordering the hole.
    fn silhouette(&mut self, seed: u32, from: Vec3, horizon: &mut Vec<(u32, u8)>) {
        self.faces[seed as usize].obsolete = true;
        let mut stack: Vec<(u32, u8)> = Vec::new();
        for e in 0..3u8 {
            let (neighbor, neighbor_edge) = self.faces[seed as usize].adj[e as usize];
            stack.push((neighbor, neighbor_edge));
        }

        while let Some((face, edge)) = stack.pop() {
            if face == NULL_FACE || self.faces[face as usize].obsolete {
                continue;
            }
            if !self.is_visible(face, from) {
                // Crossing this edge leaves the visible region: it belongs
                // to the horizon, seen from the surviving face.
                horizon.push((face, edge));
                continue;
            }
            self.faces[face as usize].obsolete = true;
            let next = (edge + 1) % 3;
            let prev = (edge + 2) % 3;
            stack.push(self.faces[face as usize].adj[next as usize]);
            stack.push(self.faces[face as usize].adj[prev as usize]);
        }
    }
}

/// Computes the penetration of two overlapping convex shapes from the
/// terminal GJK simplex. Returns `None` when the polytope cannot be seeded
/// (zero-volume geometry) or the iteration cap is hit; callers then report
/// no contact for this step.
pub fn epa_penetration<A: SupportMap, B: SupportMap>(
    shape_a: &A,
    shape_b: &B,
    simplex: &Simplex,
    settings: &EpaSettings,
) -> Option<PenetrationInfo> {
    let mut polytope = Polytope {
        points: Vec::with_capacity(16),
        supports_a: Vec::with_capacity(16),
        supports_b: Vec::with_capacity(16),
        faces: Vec::with_capacity(32),
        heap: BinaryHeap::new(),
    };

    seed_tetrahedron(shape_a, shape_b, simplex, &mut polytope)?;

    for face in [[0u32, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]] {
        polytope.add_face(face);
    }
    polytope.rebuild_adjacency();

    for _ in 0..settings.max_iterations {
        let closest = loop {
            let entry = polytope.heap.pop()?;
            let face = &polytope.faces[entry.face as usize];
            if !face.obsolete && (entry.dist - face.dist).abs() < 1.0e-12 {
                break entry.face;
            }
        };

        let dir = polytope.faces[closest as usize].normal;
        let support_a = shape_a.world_support(dir);
        let support_b = shape_b.world_support(-dir);
        let w = support_a - support_b;
        let proj = w.dot(dir);
        let dist = polytope.faces[closest as usize].dist;

        if proj - dist <= settings.tolerance * proj.abs().max(1.0) {
            return Some(finalize(&polytope, closest));
        }

        let new_vertex = polytope.add_vertex(w, support_a, support_b);

        let mut horizon = Vec::new();
        polytope.silhouette(closest, w, &mut horizon);
        if horizon.len() < 3 {
            // Numerical breakdown of the horizon walk; report the best
            // face found so far.
            return Some(finalize(&polytope, closest));
        }

        // Fan of new faces over the horizon. Each new face is
        // [edge_end, edge_start, new_vertex] so edge 0 mirrors the horizon
        // edge of the surviving face; this closes the first half-link.
        let first_new = polytope.faces.len() as u32;
        let mut fan = Vec::with_capacity(horizon.len());
        for &(face, edge) in &horizon {
            let a = polytope.faces[face as usize].verts[edge as usize];
            let b = polytope.faces[face as usize].verts[(edge as usize + 1) % 3];
            let new_face = polytope.add_face([b, a, new_vertex]);
            polytope.faces[new_face as usize].adj[0] = (face, edge);
            polytope.faces[face as usize].adj[edge as usize] = (new_face, 0);
            fan.push(new_face);
        }

        // Close the remaining half-links between neighboring fan faces:
        // edge 2 of face X runs new_vertex -> verts[0], matching edge 1
        // (verts[1] -> new_vertex) of the fan face whose verts[1] equals
        // X's verts[0].
        let mut by_second_vertex: HashMap<u32, u32> = HashMap::new();
        for &face in &fan {
            by_second_vertex.insert(polytope.faces[face as usize].verts[1], face);
        }
        for &face in &fan {
            let start = polytope.faces[face as usize].verts[0];
            if let Some(&partner) = by_second_vertex.get(&start) {
                polytope.faces[face as usize].adj[2] = (partner, 1);
                polytope.faces[partner as usize].adj[1] = (face, 2);
            }
        }
        debug_assert!(first_new as usize + fan.len() == polytope.faces.len());
    }

    // Iteration cap hit without convergence.
    None
}

/// Completes the GJK simplex to four affinely independent Minkowski
/// vertices with positive orientation.
fn seed_tetrahedron<A: SupportMap, B: SupportMap>(
    shape_a: &A,
    shape_b: &B,
    simplex: &Simplex,
    polytope: &mut Polytope,
) -> Option<()> {
    let mut verts: Vec<(Vec3, Vec3, Vec3)> = Vec::with_capacity(4);
    for v in simplex.vertices() {
        if verts
            .iter()
            .all(|(p, _, _)| (*p - v.0).length_squared() > 1.0e-10)
        {
            verts.push(v);
        }
    }
    if verts.is_empty() {
        return None;
    }

    let support = |dir: Vec3| {
        let sa = shape_a.world_support(dir);
        let sb = shape_b.world_support(-dir);
        (sa - sb, sa, sb)
    };

    let mut guard = 0;
    while verts.len() < 4 {
        guard += 1;
        if guard > 16 {
            return None;
        }

        let candidates: Vec<Vec3> = match verts.len() {
            1 => vec![Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z],
            2 => {
                let axis = (verts[1].0 - verts[0].0).normalize_or_zero();
                let (t1, t2) = tangent_basis(if axis == Vec3::ZERO { Vec3::X } else { axis });
                vec![t1, -t1, t2, -t2]
            }
            _ => {
                let n = (verts[1].0 - verts[0].0)
                    .cross(verts[2].0 - verts[0].0)
                    .normalize_or_zero();
                if n == Vec3::ZERO {
                    // Collinear triple; drop the middle point and retry.
                    verts.remove(1);
                    continue;
                }
                vec![n, -n]
            }
        };

        let mut grew = false;
        for dir in candidates {
            let (w, sa, sb) = support(dir);
            let independent = match verts.len() {
                1 => (w - verts[0].0).length_squared() > 1.0e-10,
                2 => {
                    (verts[1].0 - verts[0].0)
                        .cross(w - verts[0].0)
                        .length_squared()
                        > 1.0e-10
                }
                _ => {
                    let n = (verts[1].0 - verts[0].0).cross(verts[2].0 - verts[0].0);
                    (w - verts[0].0).dot(n).abs() > 1.0e-8
                }
            };
            if independent {
                verts.push((w, sa, sb));
                grew = true;
                break;
            }
        }
        if !grew {
            return None;
        }
    }

    // Positive orientation so the canonical face set points outward.
    let volume = (verts[1].0 - verts[0].0)
        .dot((verts[2].0 - verts[0].0).cross(verts[3].0 - verts[0].0));
    if volume < 0.0 {
        verts.swap(2, 3);
    }

    for (p, sa, sb) in verts {
        polytope.add_vertex(p, sa, sb);
    }
    Some(())
}

fn finalize(polytope: &Polytope, face_index: u32) -> PenetrationInfo {
    let face = &polytope.faces[face_index as usize];
    let [i0, i1, i2] = face.verts;
    let p0 = polytope.points[i0 as usize];
    let p1 = polytope.points[i1 as usize];
    let p2 = polytope.points[i2 as usize];

    // Project the origin onto the face plane and read off barycentric
    // weights for the witness points.
    let projected = face.normal * face.dist;
    let (u, v, w) = barycentric_coordinates(p0, p1, p2, projected);

    let point_a = polytope.supports_a[i0 as usize] * u
        + polytope.supports_a[i1 as usize] * v
        + polytope.supports_a[i2 as usize] * w;
    let point_b = polytope.supports_b[i0 as usize] * u
        + polytope.supports_b[i1 as usize] * v
        + polytope.supports_b[i2 as usize] * w;

    PenetrationInfo {
        normal: face.normal,
        depth: face.dist.max(0.0),
        point_a,
        point_b,
    }
}
