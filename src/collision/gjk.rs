//! GJK convex distance queries built on Johnson's sub-simplex algorithm.
//!
//! The simplex keeps up to four points of the Minkowski difference `A - B`,
//! each tagged with the support points on both shapes that produced it.
//! Johnson's algorithm finds the smallest sub-simplex carrying the point
//! closest to the origin by walking the non-empty subsets of the current
//! vertex bit-mask with cached dot products and determinants.

use glam::Vec3;

use crate::core::collider::{ColliderShape, SupportMap, WorldConvex};
use crate::core::types::Transform;

/// Tolerances and caps for one GJK run.
#[derive(Debug, Clone, Copy)]
pub struct GjkSettings {
    /// Relative termination epsilon (applied to squared distances).
    pub epsilon: f32,
    pub max_iterations: u32,
}

impl Default for GjkSettings {
    fn default() -> Self {
        Self {
            epsilon: 1.0e-6,
            max_iterations: 64,
        }
    }
}

/// Outcome of a GJK distance run.
pub enum GjkOutcome {
    /// The shapes overlap or touch, or the simplex degenerated before
    /// separation was proved; the simplex seeds EPA.
    Overlap(Simplex),
    /// The shapes are disjoint.
    Separated {
        point_a: Vec3,
        point_b: Vec3,
        /// Conservative distance between the closest points.
        distance: f32,
        /// Separating axis (from B towards A), unnormalized.
        axis: Vec3,
    },
    /// The iteration cap was hit without a verdict; callers treat this as
    /// "no contact this step".
    Failed,
}

/// Simplex of up to four Minkowski-difference points with Johnson caches.
pub struct Simplex {
    points: [Vec3; 4],
    supports_a: [Vec3; 4],
    supports_b: [Vec3; 4],
    lengths_sq: [f32; 4],
    /// dot[i][j] = points[i] . points[j]
    dot: [[f32; 4]; 4],
    /// det[subset][i]: Johnson determinant of vertex i within `subset`.
    det: [[f32; 4]; 16],
    /// Vertices currently part of the simplex.
    bits: u8,
    /// Slot of the most recently added vertex.
    last: usize,
    last_bit: u8,
    /// bits | last_bit while the new vertex is being classified.
    all_bits: u8,
}

impl Simplex {
    pub fn new() -> Self {
        Self {
            points: [Vec3::ZERO; 4],
            supports_a: [Vec3::ZERO; 4],
            supports_b: [Vec3::ZERO; 4],
            lengths_sq: [0.0; 4],
            dot: [[0.0; 4]; 4],
            det: [[0.0; 4]; 16],
            bits: 0,
            last: 0,
            last_bit: 0,
            all_bits: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn is_full(&self) -> bool {
        self.bits == 0xf
    }

    /// Current simplex vertices as `(minkowski, support_a, support_b)`.
    pub fn vertices(&self) -> Vec<(Vec3, Vec3, Vec3)> {
        (0..4)
            .filter(|i| self.bits & (1 << i) != 0)
            .map(|i| (self.points[i], self.supports_a[i], self.supports_b[i]))
            .collect()
    }

    fn max_length_squared(&self) -> f32 {
        (0..4)
            .filter(|i| self.all_bits & (1 << i) != 0)
            .map(|i| self.lengths_sq[i])
            .fold(0.0, f32::max)
    }

    fn contains_point(&self, w: Vec3) -> bool {
        (0..4)
            .filter(|i| self.all_bits & (1 << i) != 0)
            .any(|i| (self.points[i] - w).length_squared() < 1.0e-12)
    }

    fn add_point(&mut self, w: Vec3, support_a: Vec3, support_b: Vec3) {
        debug_assert!(!self.is_full());
        let slot = (0..4)
            .find(|i| self.bits & (1 << i) == 0)
            .expect("simplex has a free slot");

        self.last = slot;
        self.last_bit = 1 << slot;
        self.points[slot] = w;
        self.supports_a[slot] = support_a;
        self.supports_b[slot] = support_b;
        self.lengths_sq[slot] = w.length_squared();
        self.all_bits = self.bits | self.last_bit;

        for i in 0..4 {
            if self.bits & (1 << i) != 0 {
                let d = self.points[i].dot(w);
                self.dot[i][slot] = d;
                self.dot[slot][i] = d;
            }
        }
        self.dot[slot][slot] = self.lengths_sq[slot];

        self.compute_determinants();
    }

    /// Johnson determinant recursion for every subset containing the new
    /// vertex.
    fn compute_determinants(&mut self) {
        let last = self.last;
        let last_bit = self.last_bit as usize;
        let dp = &self.dot;

        self.det[last_bit][last] = 1.0;

        for j in 0..4 {
            let sj = 1usize << j;
            if self.bits as usize & sj == 0 {
                continue;
            }
            let s2 = sj | last_bit;
            self.det[s2][j] = dp[last][last] - dp[last][j];
            self.det[s2][last] = dp[j][j] - dp[j][last];

            for k in 0..j {
                let sk = 1usize << k;
                if self.bits as usize & sk == 0 {
                    continue;
                }
                let s3 = sk | s2;
                self.det[s3][k] = self.det[s2][j] * (dp[j][j] - dp[j][k])
                    + self.det[s2][last] * (dp[last][j] - dp[last][k]);
                self.det[s3][j] = self.det[sk | last_bit][k] * (dp[k][k] - dp[k][j])
                    + self.det[sk | last_bit][last] * (dp[last][k] - dp[last][j]);
                self.det[s3][last] = self.det[sk | sj][k] * (dp[k][k] - dp[k][last])
                    + self.det[sk | sj][j] * (dp[j][k] - dp[j][last]);
            }
        }

        if self.all_bits == 0xf {
            self.det[0xf][0] = self.det[0xe][1] * (dp[1][1] - dp[1][0])
                + self.det[0xe][2] * (dp[2][1] - dp[2][0])
                + self.det[0xe][3] * (dp[3][1] - dp[3][0]);
            self.det[0xf][1] = self.det[0xd][0] * (dp[0][0] - dp[0][1])
                + self.det[0xd][2] * (dp[2][0] - dp[2][1])
                + self.det[0xd][3] * (dp[3][0] - dp[3][1]);
            self.det[0xf][2] = self.det[0xb][0] * (dp[0][0] - dp[0][2])
                + self.det[0xb][1] * (dp[1][0] - dp[1][2])
                + self.det[0xb][3] * (dp[3][0] - dp[3][2]);
            self.det[0xf][3] = self.det[0x7][0] * (dp[0][0] - dp[0][3])
                + self.det[0x7][1] * (dp[1][0] - dp[1][3])
                + self.det[0x7][2] * (dp[2][0] - dp[2][3]);
        }
    }

    /// A subset is valid when every member has a positive determinant and
    /// every excluded vertex would not improve it.
    fn is_valid_subset(&self, subset: usize) -> bool {
        for i in 0..4 {
            let bit = 1usize << i;
            if self.all_bits as usize & bit == 0 {
                continue;
            }
            if subset & bit != 0 {
                if self.det[subset][i] <= 0.0 {
                    return false;
                }
            } else if self.det[subset | bit][i] > 0.0 {
                return false;
            }
        }
        true
    }

    /// Every member determinant strictly positive (no exclusion check).
    fn is_proper_subset(&self, subset: usize) -> bool {
        for i in 0..4 {
            let bit = 1usize << i;
            if subset & bit != 0 && self.det[subset][i] <= 0.0 {
                return false;
            }
        }
        true
    }

    fn combination(&self, subset: usize, values: &[Vec3; 4]) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut denom = 0.0;
        for i in 0..4 {
            if subset & (1 << i) != 0 {
                sum += values[i] * self.det[subset][i];
                denom += self.det[subset][i];
            }
        }
        if denom.abs() < 1.0e-12 {
            return Vec3::ZERO;
        }
        sum / denom
    }

    /// Closest point of the simplex to the origin, reducing the simplex to
    /// the smallest subset carrying it. `None` means the origin lies inside
    /// the simplex (or the subset search failed degenerately).
    fn closest_point_to_origin(&mut self) -> Option<Vec3> {
        let bits = self.bits as usize;
        let mut subset = bits;
        while subset != 0 {
            if subset & bits == subset && self.is_valid_subset(subset | self.last_bit as usize) {
                self.bits = (subset | self.last_bit as usize) as u8;
                let v = self.combination(self.bits as usize, &self.points);
                self.all_bits = self.bits;
                return Some(v);
            }
            subset -= 1;
        }

        if self.is_valid_subset(self.last_bit as usize) {
            self.bits = self.last_bit;
            self.all_bits = self.bits;
            return Some(self.points[self.last]);
        }

        None
    }

    /// True when the current vertex set is affinely dependent.
    fn is_affinely_dependent(&self) -> bool {
        let mut sum = 0.0;
        let all = self.all_bits as usize;
        for i in 0..4 {
            if all & (1 << i) != 0 {
                sum += self.det[all][i];
            }
        }
        sum <= 0.0
    }

    /// Fallback: the best proper subset when the regular search stalls.
    fn backup_closest_point(&mut self) -> Vec3 {
        let bits = self.bits as usize;
        let mut best = Vec3::ZERO;
        let mut best_len = f32::MAX;
        let mut best_subset = bits;

        let mut subset = bits;
        while subset != 0 {
            if subset & bits == subset && self.is_proper_subset(subset) {
                let v = self.combination(subset, &self.points);
                let len = v.length_squared();
                if len < best_len {
                    best_len = len;
                    best = v;
                    best_subset = subset;
                }
            }
            subset -= 1;
        }

        self.bits = best_subset as u8;
        self.all_bits = self.bits;
        best
    }

    /// Witness points on A and B for the current subset.
    pub fn closest_points(&self) -> (Vec3, Vec3) {
        let subset = self.bits as usize;
        (
            self.combination(subset, &self.supports_a),
            self.combination(subset, &self.supports_b),
        )
    }
}

impl Default for Simplex {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs GJK between two convex support mappings.
///
/// `initial_axis` seeds the search direction (the cached separating axis
/// from the previous step when available).
pub fn gjk_distance<A: SupportMap, B: SupportMap>(
    shape_a: &A,
    shape_b: &B,
    initial_axis: Vec3,
    settings: &GjkSettings,
) -> GjkOutcome {
    let mut simplex = Simplex::new();
    let mut v = if initial_axis.length_squared() > 1.0e-12 {
        initial_axis
    } else {
        Vec3::X
    };
    let mut dist_sq = f32::MAX;

    for _ in 0..settings.max_iterations {
        let support_a = shape_a.world_support(-v);
        let support_b = shape_b.world_support(v);
        let w = support_a - support_b;
        let v_dot_w = v.dot(w);

        // The support plane certifies that no point of A - B is closer
        // than the current estimate: separated.
        if dist_sq < f32::MAX && v_dot_w > 0.0 && dist_sq - v_dot_w <= dist_sq * settings.epsilon {
            let (point_a, point_b) = simplex.closest_points();
            return GjkOutcome::Separated {
                point_a,
                point_b,
                distance: dist_sq.sqrt(),
                axis: v,
            };
        }

        // A repeated support point cannot improve the simplex.
        if simplex.contains_point(w) {
            if dist_sq < f32::MAX {
                let (point_a, point_b) = simplex.closest_points();
                return GjkOutcome::Separated {
                    point_a,
                    point_b,
                    distance: dist_sq.sqrt(),
                    axis: v,
                };
            }
            return GjkOutcome::Failed;
        }

        simplex.add_point(w, support_a, support_b);

        if simplex.is_affinely_dependent() {
            return GjkOutcome::Overlap(simplex);
        }

        let Some(new_v) = simplex.closest_point_to_origin() else {
            // The origin is enclosed by the simplex.
            return GjkOutcome::Overlap(simplex);
        };

        let prev_dist_sq = dist_sq;
        v = new_v;
        dist_sq = v.length_squared();

        // Touching within tolerance. The second term is the numerical
        // floor below which `v` is indistinguishable from zero for the
        // current simplex scale.
        let touch_threshold = settings
            .epsilon
            .max(f32::EPSILON * f32::EPSILON * simplex.max_length_squared());
        if dist_sq <= touch_threshold {
            return GjkOutcome::Overlap(simplex);
        }

        if simplex.is_full() {
            return GjkOutcome::Overlap(simplex);
        }

        if prev_dist_sq < f32::MAX && prev_dist_sq - dist_sq <= settings.epsilon * prev_dist_sq {
            // Numerical stall: retreat to the best proper subset and report
            // the conservative distance.
            v = simplex.backup_closest_point();
            dist_sq = v.length_squared();
            let (point_a, point_b) = simplex.closest_points();
            return GjkOutcome::Separated {
                point_a,
                point_b,
                distance: dist_sq.sqrt(),
                axis: v,
            };
        }
    }

    GjkOutcome::Failed
}

/// A single point as a degenerate convex set.
pub(crate) struct PointSupport(pub Vec3);

impl SupportMap for PointSupport {
    fn world_support(&self, _direction: Vec3) -> Vec3 {
        self.0
    }
}

/// Distance from a world-space point to a convex shape, with the closest
/// point on the shape. Zero when the point is inside.
pub(crate) fn distance_point_convex(
    shape: &ColliderShape,
    transform: &Transform,
    point: Vec3,
) -> (f32, Vec3) {
    let convex = WorldConvex::new(shape, transform);
    let probe = PointSupport(point);
    let axis = transform.position - point;
    match gjk_distance(&convex, &probe, axis, &GjkSettings::default()) {
        GjkOutcome::Separated {
            point_a, distance, ..
        } => (distance, point_a),
        _ => (0.0, point),
    }
}

/// GJK-based point containment for shapes without an analytic test.
pub(crate) fn point_inside_convex(
    shape: &ColliderShape,
    transform: &Transform,
    point: Vec3,
) -> bool {
    distance_point_convex(shape, transform, point).0 <= 1.0e-5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::ColliderShape;

    fn sphere_at(position: Vec3, radius: f32) -> (ColliderShape, Transform) {
        (
            ColliderShape::Sphere { radius },
            Transform::from_position(position),
        )
    }

    #[test]
    fn separated_spheres_report_center_line_distance() {
        let (shape_a, t_a) = sphere_at(Vec3::ZERO, 1.0);
        let (shape_b, t_b) = sphere_at(Vec3::new(4.0, 0.0, 0.0), 1.0);
        let a = WorldConvex::new(&shape_a, &t_a);
        let b = WorldConvex::new(&shape_b, &t_b);

        match gjk_distance(&a, &b, Vec3::X, &GjkSettings::default()) {
            GjkOutcome::Separated {
                distance,
                point_a,
                point_b,
                ..
            } => {
                assert!((distance - 2.0).abs() < 1e-3, "distance was {distance}");
                assert!((point_a.x - 1.0).abs() < 1e-3);
                assert!((point_b.x - 3.0).abs() < 1e-3);
            }
            _ => panic!("expected separation"),
        }
    }

    #[test]
    fn overlapping_boxes_report_overlap() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let t_a = Transform::default();
        let t_b = Transform::from_position(Vec3::new(1.5, 0.0, 0.0));
        let a = WorldConvex::new(&shape, &t_a);
        let b = WorldConvex::new(&shape, &t_b);

        assert!(matches!(
            gjk_distance(&a, &b, Vec3::X, &GjkSettings::default()),
            GjkOutcome::Overlap(_)
        ));
    }

    #[test]
    fn separated_boxes_measure_the_gap() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let t_a = Transform::default();
        let t_b = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let a = WorldConvex::new(&shape, &t_a);
        let b = WorldConvex::new(&shape, &t_b);

        match gjk_distance(&a, &b, Vec3::X, &GjkSettings::default()) {
            GjkOutcome::Separated { distance, .. } => {
                assert!((distance - 1.0).abs() < 1e-3, "distance was {distance}");
            }
            _ => panic!("expected separation"),
        }
    }

    #[test]
    fn point_queries_agree_with_hull_geometry() {
        let hull = ColliderShape::ConvexHull {
            vertices: vec![
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(1.0, 1.0, -1.0),
                Vec3::new(-1.0, 1.0, -1.0),
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(-1.0, 1.0, 1.0),
            ],
        };
        let transform = Transform::default();
        assert!(point_inside_convex(&hull, &transform, Vec3::splat(0.2)));
        assert!(!point_inside_convex(&hull, &transform, Vec3::new(2.0, 0.0, 0.0)));

        let (distance, closest) =
            distance_point_convex(&hull, &transform, Vec3::new(3.0, 0.0, 0.0));
        assert!((distance - 2.0).abs() < 1e-3);
        assert!((closest.x - 1.0).abs() < 1e-3);
    }
}
