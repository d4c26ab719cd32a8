//! Persistent contact points and the per-pair contact manifold.

use glam::Vec3;

use crate::core::types::Transform;
use crate::utils::allocator::{EntityId, PoolPtr};

/// Maximum number of cached contact points per manifold.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Ordered collider-id pair identifying an overlapping pair.
pub type PairKey = (EntityId, EntityId);

/// Union of a pool-allocated persistent manifold and the bookkeeping flags
/// driving pair retirement and contact events.
pub struct OverlappingPair {
    pub(crate) manifold: PoolPtr<ContactManifold>,
    /// Cleared when the broad-phase reports the fat AABBs apart.
    pub(crate) still_overlapping: bool,
    /// Whether the pair had contacts after the previous narrow-phase run,
    /// for begin/stay/end event edges.
    pub(crate) had_contacts: bool,
}

impl OverlappingPair {
    pub(crate) fn new(manifold: PoolPtr<ContactManifold>) -> Self {
        Self {
            manifold,
            still_overlapping: true,
            had_contacts: false,
        }
    }

    pub fn manifold(&self) -> &ContactManifold {
        self.manifold.get()
    }

    pub(crate) fn manifold_mut(&mut self) -> &mut ContactManifold {
        self.manifold.get_mut()
    }
}

/// One persistent contact between two colliders.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactPoint {
    /// Unit contact normal in world space, from body 1 towards body 2.
    pub normal: Vec3,
    /// Penetration depth along the normal (positive while penetrating).
    pub depth: f32,
    /// Contact point in body-1 local space.
    pub local1: Vec3,
    /// Contact point in body-2 local space.
    pub local2: Vec3,
    pub world1: Vec3,
    pub world2: Vec3,
    /// Accumulated impulses from the previous step, the warm-start seed.
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
    /// Tangent basis the stored tangent impulses refer to.
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    /// True when the contact survived from the previous step.
    pub is_resting: bool,
}

/// Up to four persistent contacts for one collider pair, plus the
/// manifold-level accumulated impulses used when friction is solved at the
/// manifold center.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub collider1: EntityId,
    pub collider2: EntityId,
    pub body1: EntityId,
    pub body2: EntityId,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    count: usize,
    pub friction_impulse1: f32,
    pub friction_impulse2: f32,
    pub twist_impulse: f32,
    pub rolling_impulse: Vec3,
    pub friction_vec1: Vec3,
    pub friction_vec2: Vec3,
}

impl ContactManifold {
    pub fn new(collider1: EntityId, collider2: EntityId, body1: EntityId, body2: EntityId) -> Self {
        Self {
            collider1,
            collider2,
            body1,
            body2,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            count: 0,
            friction_impulse1: 0.0,
            friction_impulse2: 0.0,
            twist_impulse: 0.0,
            rolling_impulse: Vec3::ZERO,
            friction_vec1: Vec3::ZERO,
            friction_vec2: Vec3::ZERO,
        }
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.count]
    }

    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points[..self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Average of the stored contact normals.
    pub fn average_normal(&self) -> Vec3 {
        let sum: Vec3 = self.points().iter().map(|p| p.normal).sum();
        sum.normalize_or_zero()
    }

    /// Inserts a new narrow-phase contact, enforcing the duplicate
    /// threshold and the keep-best eviction policy.
    pub fn add_contact(&mut self, contact: ContactPoint, persistence_threshold: f32) {
        let threshold_sq = persistence_threshold * persistence_threshold;

        // A point this close to a cached contact is the same feature.
        for existing in self.points() {
            if (existing.world1 - contact.world1).length_squared() <= threshold_sq {
                return;
            }
        }

        if self.count == MAX_CONTACT_POINTS {
            let deepest = self.index_of_deepest(&contact);
            let to_remove = self.index_to_remove(deepest, contact.local1);
            self.remove_point(to_remove);
        }

        self.points[self.count] = contact;
        self.count += 1;
    }

    /// Recomputes world geometry from current body poses and culls stale
    /// contacts. Accumulated impulses survive for warm starting.
    pub fn refresh(
        &mut self,
        transform1: &Transform,
        transform2: &Transform,
        persistence_threshold: f32,
    ) {
        let threshold_sq = persistence_threshold * persistence_threshold;

        for point in self.points[..self.count].iter_mut() {
            point.world1 = transform1.transform_point(point.local1);
            point.world2 = transform2.transform_point(point.local2);
            point.depth = (point.world1 - point.world2).dot(point.normal);
            point.is_resting = true;
        }

        let mut i = self.count;
        while i > 0 {
            i -= 1;
            let point = self.points[i];
            let separation = -point.depth;
            if separation > persistence_threshold {
                self.remove_point(i);
                continue;
            }
            // Tangential drift: how far the two witness points slid apart
            // in the contact plane.
            let projected1 = point.world1 + point.normal * separation;
            let drift = point.world2 - projected1;
            if drift.length_squared() > threshold_sq {
                self.remove_point(i);
            }
        }
    }

    /// Index of the deepest existing contact, or `None` when the incoming
    /// contact is the deepest. The deepest contact is never evicted.
    fn index_of_deepest(&self, contact: &ContactPoint) -> Option<usize> {
        let mut deepest = None;
        let mut max_depth = contact.depth;
        for (i, point) in self.points().iter().enumerate() {
            if point.depth > max_depth {
                max_depth = point.depth;
                deepest = Some(i);
            }
        }
        deepest
    }

    /// Chooses the slot whose replacement by `new_local1` leaves the
    /// largest quadrilateral, estimated as |AC x BD|^2 of the diagonals
    /// over body-1 local points.
    fn index_to_remove(&self, deepest: Option<usize>, new_local1: Vec3) -> usize {
        debug_assert_eq!(self.count, MAX_CONTACT_POINTS);
        let p = |i: usize| self.points[i].local1;

        let mut best_index = 0;
        let mut best_area = f32::NEG_INFINITY;
        for candidate in 0..MAX_CONTACT_POINTS {
            if Some(candidate) == deepest {
                continue;
            }
            let (v1, v2) = match candidate {
                0 => (new_local1 - p(1), p(3) - p(2)),
                1 => (new_local1 - p(0), p(3) - p(2)),
                2 => (new_local1 - p(0), p(3) - p(1)),
                _ => (new_local1 - p(0), p(2) - p(1)),
            };
            let area = v1.cross(v2).length_squared();
            if area > best_area {
                best_area = area;
                best_index = candidate;
            }
        }
        best_index
    }

    fn remove_point(&mut self, index: usize) {
        debug_assert!(index < self.count);
        self.count -= 1;
        if index < self.count {
            self.points[index] = self.points[self.count];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_at(local1: Vec3, depth: f32) -> ContactPoint {
        ContactPoint {
            normal: Vec3::Y,
            depth,
            local1,
            local2: local1,
            world1: local1,
            world2: local1 - Vec3::Y * depth,
            ..ContactPoint::default()
        }
    }

    #[test]
    fn duplicate_contacts_are_dropped() {
        let mut manifold =
            ContactManifold::new(EntityId::NULL, EntityId::NULL, EntityId::NULL, EntityId::NULL);
        manifold.add_contact(contact_at(Vec3::ZERO, 0.1), 0.03);
        manifold.add_contact(contact_at(Vec3::new(0.01, 0.0, 0.0), 0.2), 0.03);
        assert_eq!(manifold.count(), 1);
        // The original point is kept untouched.
        assert!((manifold.points()[0].depth - 0.1).abs() < 1e-6);
    }

    #[test]
    fn manifold_never_exceeds_four_points() {
        let mut manifold =
            ContactManifold::new(EntityId::NULL, EntityId::NULL, EntityId::NULL, EntityId::NULL);
        for i in 0..6 {
            let x = i as f32;
            manifold.add_contact(contact_at(Vec3::new(x, 0.0, x * 0.5), 0.1), 0.03);
        }
        assert_eq!(manifold.count(), MAX_CONTACT_POINTS);
    }

    #[test]
    fn deepest_contact_survives_eviction() {
        let mut manifold =
            ContactManifold::new(EntityId::NULL, EntityId::NULL, EntityId::NULL, EntityId::NULL);
        manifold.add_contact(contact_at(Vec3::new(0.0, 0.0, 0.0), 0.9), 0.03);
        manifold.add_contact(contact_at(Vec3::new(1.0, 0.0, 0.0), 0.1), 0.03);
        manifold.add_contact(contact_at(Vec3::new(1.0, 0.0, 1.0), 0.1), 0.03);
        manifold.add_contact(contact_at(Vec3::new(0.0, 0.0, 1.0), 0.1), 0.03);

        // A shallow fifth point forces an eviction; the deep point stays.
        manifold.add_contact(contact_at(Vec3::new(0.5, 0.0, 0.5), 0.1), 0.03);
        assert_eq!(manifold.count(), MAX_CONTACT_POINTS);
        assert!(manifold.points().iter().any(|p| (p.depth - 0.9).abs() < 1e-6));
    }

    #[test]
    fn refresh_culls_separated_and_slid_contacts() {
        let mut manifold =
            ContactManifold::new(EntityId::NULL, EntityId::NULL, EntityId::NULL, EntityId::NULL);
        manifold.add_contact(contact_at(Vec3::ZERO, 0.01), 0.03);
        manifold.points_mut()[0].normal_impulse = 2.5;

        // Same poses: the contact survives and keeps its impulse.
        let t1 = Transform::default();
        let t2 = Transform::default();
        manifold.refresh(&t1, &t2, 0.03);
        assert_eq!(manifold.count(), 1);
        assert!((manifold.points()[0].normal_impulse - 2.5).abs() < 1e-6);
        assert!(manifold.points()[0].is_resting);

        // Body 2 moved up along the normal: separation beyond the
        // threshold culls the contact.
        let lifted = Transform::from_position(Vec3::new(0.0, 0.1, 0.0));
        manifold.refresh(&t1, &lifted, 0.03);
        assert_eq!(manifold.count(), 0);
    }

    #[test]
    fn refresh_culls_tangential_drift() {
        let mut manifold =
            ContactManifold::new(EntityId::NULL, EntityId::NULL, EntityId::NULL, EntityId::NULL);
        manifold.add_contact(contact_at(Vec3::ZERO, 0.01), 0.03);

        // Slide body 2 sideways past the persistence threshold.
        let t1 = Transform::default();
        let slid = Transform::from_position(Vec3::new(0.06, 0.0, 0.0));
        manifold.refresh(&t1, &slid, 0.03);
        assert_eq!(manifold.count(), 0);
    }
}
