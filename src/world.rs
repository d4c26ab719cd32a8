//! Central simulation container orchestrating all subsystems.
//!
//! The per-step pipeline order is part of the API contract: forces,
//! broad-phase refresh, pair enumeration, manifold refresh, narrow-phase,
//! island building, velocity solve, position integration, optional NLGS
//! correction, sleep update, accumulator clear.

use std::collections::HashMap;

use glam::{Quat, Vec3};

use crate::collision::aabb::Aabb;
use crate::collision::broadphase::BroadPhase;
use crate::collision::contact::{ContactManifold, ContactPoint, OverlappingPair, PairKey};
use crate::collision::narrowphase::NarrowPhase;
use crate::collision::queries::{raycast_shape, Ray, RaycastHit};
use crate::config::WorldConfig;
use crate::core::body::RigidBody;
use crate::core::collider::Collider;
use crate::dynamics::integrator;
use crate::dynamics::island::{EdgeLink, IslandEdge, IslandManager};
use crate::dynamics::joint::{Joint, JointParams};
use crate::dynamics::solver::{self, ContactSolver};
use crate::error::{PhysicsError, PhysicsResult};
use crate::utils::allocator::{Arena, EntityId, PoolAllocator};
use crate::utils::logging::ScopedTimer;

/// Contact lifecycle notification collected during a step and exposed at
/// the step boundary.
#[derive(Debug, Clone)]
pub struct ContactEvent {
    pub kind: ContactEventKind,
    pub body1: EntityId,
    pub body2: EntityId,
    pub collider1: EntityId,
    pub collider2: EntityId,
    /// Manifold snapshot at event time; empty for `End`.
    pub points: Vec<ContactPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEventKind {
    Begin,
    Stay,
    End,
}

/// The physics world: owns bodies, colliders, joints, the broad-phase and
/// the pool allocator backing the persistent manifolds.
pub struct PhysicsWorld {
    config: WorldConfig,
    bodies: Arena<RigidBody>,
    colliders: Arena<Collider>,
    joints: Arena<Joint>,
    broadphase: BroadPhase,
    narrowphase: NarrowPhase,
    pairs: HashMap<PairKey, OverlappingPair>,
    islands: IslandManager,
    solver: ContactSolver,
    pool: PoolAllocator,
    events: Vec<ContactEvent>,
    contact_scratch: Vec<crate::collision::narrowphase::RawContact>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        for (_, pair) in self.pairs.drain() {
            self.pool.destruct(pair.manifold);
        }
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            broadphase: BroadPhase::new(config.aabb_gap, config.aabb_displacement_multiplier),
            narrowphase: NarrowPhase::new(&config),
            config,
            bodies: Arena::new(),
            colliders: Arena::new(),
            joints: Arena::new(),
            pairs: HashMap::new(),
            islands: IslandManager::new(),
            solver: ContactSolver::new(),
            pool: PoolAllocator::new(),
            events: Vec::new(),
            contact_scratch: Vec::new(),
        }
    }

    // ---- Configuration ------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    pub fn set_velocity_iterations(&mut self, iterations: u32) {
        self.config.velocity_iterations = iterations.max(1);
    }

    pub fn set_position_iterations(&mut self, iterations: u32) {
        self.config.position_iterations = iterations.max(1);
    }

    pub fn set_warm_starting(&mut self, enabled: bool) {
        self.config.warm_starting = enabled;
    }

    pub fn set_split_impulse(&mut self, enabled: bool) {
        self.config.split_impulse = enabled;
    }

    pub fn set_friction_at_manifold_center(&mut self, enabled: bool) {
        self.config.friction_at_manifold_center = enabled;
    }

    pub fn set_nlgs_position_correction(&mut self, enabled: bool) {
        self.config.nlgs_position_correction = enabled;
    }

    pub fn set_sleep_enabled(&mut self, enabled: bool) {
        self.config.sleep_enabled = enabled;
        if !enabled {
            for body in self.bodies.iter_mut() {
                body.wake_up();
            }
        }
    }

    pub fn set_sleep_thresholds(&mut self, linear: f32, angular: f32, time_before_sleep: f32) {
        self.config.sleep_linear_threshold = linear.max(0.0);
        self.config.sleep_angular_threshold = angular.max(0.0);
        self.config.time_before_sleep = time_before_sleep.max(0.0);
    }

    // ---- Body API -----------------------------------------------------

    pub fn add_body(&mut self, body: RigidBody) -> PhysicsResult<EntityId> {
        self.check_poisoned()?;
        if !body.transform.position.is_finite() || !body.transform.rotation.is_finite() {
            return Err(PhysicsError::InvalidParameter("body pose must be finite"));
        }
        let id = self.bodies.insert(body);
        if let Some(stored) = self.bodies.get_mut(id) {
            stored.id = id;
        }
        Ok(id)
    }

    pub fn remove_body(&mut self, id: EntityId) -> PhysicsResult<()> {
        self.check_poisoned()?;
        let body = self.bodies.get(id).ok_or(PhysicsError::BodyNotFound(id))?;
        let colliders: Vec<EntityId> = body.colliders.clone();
        let joints: Vec<EntityId> = body.joints.clone();

        for collider in colliders {
            let _ = self.detach_collider(collider);
        }
        for joint in joints {
            let _ = self.remove_joint(joint);
        }
        self.bodies.remove(id);
        Ok(())
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn set_body_pose(&mut self, id: EntityId, position: Vec3, rotation: Quat) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !position.is_finite() || !rotation.is_finite() || rotation.length_squared() < f32::EPSILON {
            return Err(PhysicsError::InvalidParameter("pose must be finite"));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::BodyNotFound(id))?;
        body.transform.position = position;
        body.transform.rotation = rotation.normalize();
        body.wake_up();
        Ok(())
    }

    pub fn set_body_velocity(&mut self, id: EntityId, linear: Vec3, angular: Vec3) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !linear.is_finite() || !angular.is_finite() {
            return Err(PhysicsError::InvalidParameter("velocity must be finite"));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::BodyNotFound(id))?;
        body.set_velocity(linear, angular);
        Ok(())
    }

    pub fn apply_force(&mut self, id: EntityId, force: Vec3) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !force.is_finite() {
            return Err(PhysicsError::InvalidParameter("force must be finite"));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::BodyNotFound(id))?;
        body.apply_force(force);
        Ok(())
    }

    pub fn apply_force_at_point(&mut self, id: EntityId, force: Vec3, point: Vec3) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !force.is_finite() || !point.is_finite() {
            return Err(PhysicsError::InvalidParameter("force must be finite"));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::BodyNotFound(id))?;
        body.apply_force_at_point(force, point);
        Ok(())
    }

    pub fn apply_torque(&mut self, id: EntityId, torque: Vec3) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !torque.is_finite() {
            return Err(PhysicsError::InvalidParameter("torque must be finite"));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::BodyNotFound(id))?;
        body.apply_torque(torque);
        Ok(())
    }

    // ---- Collider API -------------------------------------------------

    pub fn attach_collider(&mut self, body_id: EntityId, mut collider: Collider) -> PhysicsResult<EntityId> {
        self.check_poisoned()?;
        if !(collider.offset.scale.cmpgt(Vec3::ZERO).all() && collider.offset.scale.is_finite()) {
            return Err(PhysicsError::InvalidParameter(
                "collider scale components must be strictly positive",
            ));
        }
        if !collider.offset.position.is_finite() || !collider.offset.rotation.is_finite() {
            return Err(PhysicsError::InvalidParameter("collider offset must be finite"));
        }

        let body = self
            .bodies
            .get(body_id)
            .ok_or(PhysicsError::BodyNotFound(body_id))?;
        let world_transform = collider.world_transform(&body.transform);
        let aabb = collider.shape.aabb(&world_transform);

        collider.body = body_id;
        let id = self.colliders.insert(collider);
        if let Some(stored) = self.colliders.get_mut(id) {
            stored.id = id;
            stored.tree_node = self.broadphase.add_proxy(&aabb, id);
        }
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.colliders.push(id);
            body.wake_up();
        }
        Ok(id)
    }

    /// Attaches a collider and folds its mass contribution into the body:
    /// the shape's inertia is taken about its own center and shifted to
    /// the body origin by the parallel-axis theorem.
    pub fn attach_collider_with_mass(
        &mut self,
        body_id: EntityId,
        collider: Collider,
        mass: f32,
    ) -> PhysicsResult<EntityId> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(PhysicsError::InvalidParameter("shape mass must be finite and >= 0"));
        }

        let shape_properties = collider.shape.mass_properties(mass);
        let offset = collider.offset.position;
        let rotation = glam::Mat3::from_quat(collider.offset.rotation);

        let id = self.attach_collider(body_id, collider)?;

        if let Some(body) = self.bodies.get_mut(body_id) {
            let rotated = rotation * shape_properties.inertia * rotation.transpose();
            let outer = glam::Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z);
            let shifted = rotated
                + (glam::Mat3::from_diagonal(Vec3::splat(offset.length_squared())) - outer) * mass;

            let mut properties = body.mass_properties;
            properties.mass += mass;
            properties.inertia += shifted;
            body.set_mass_properties(properties)?;
        }
        Ok(id)
    }

    pub fn detach_collider(&mut self, id: EntityId) -> PhysicsResult<()> {
        self.check_poisoned()?;
        let collider = self
            .colliders
            .remove(id)
            .ok_or(PhysicsError::ColliderNotFound(id))?;
        if collider.tree_node >= 0 {
            self.broadphase.remove_proxy(collider.tree_node);
        }
        if let Some(body) = self.bodies.get_mut(collider.body) {
            body.colliders.retain(|&c| c != id);
        }
        // Pairs referencing the collider are retired on the next step.
        Ok(())
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.colliders.get(id)
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    // ---- Joint API ----------------------------------------------------

    pub fn add_joint(
        &mut self,
        body1: EntityId,
        body2: EntityId,
        params: JointParams,
    ) -> PhysicsResult<EntityId> {
        self.check_poisoned()?;
        if body1 == body2 {
            return Err(PhysicsError::InvalidParameter("joint needs two distinct bodies"));
        }
        match params {
            JointParams::Hinge { axis, .. } | JointParams::Slider { axis, .. } => {
                if !axis.is_finite() || axis.length_squared() < 1.0e-9 {
                    return Err(PhysicsError::InvalidParameter("joint axis must be non-zero"));
                }
            }
            _ => {}
        }

        let pose1 = {
            let body = self.bodies.get(body1).ok_or(PhysicsError::BodyNotFound(body1))?;
            (body.transform.position, body.transform.rotation)
        };
        let pose2 = {
            let body = self.bodies.get(body2).ok_or(PhysicsError::BodyNotFound(body2))?;
            (body.transform.position, body.transform.rotation)
        };

        let joint = Joint::new(body1, body2, params, pose1, pose2);
        let id = self.joints.insert(joint);
        if let Some(stored) = self.joints.get_mut(id) {
            stored.id = id;
        }
        for body_id in [body1, body2] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.push(id);
                body.wake_up();
            }
        }
        Ok(id)
    }

    pub fn remove_joint(&mut self, id: EntityId) -> PhysicsResult<()> {
        self.check_poisoned()?;
        let joint = self.joints.remove(id).ok_or(PhysicsError::JointNotFound(id))?;
        for body_id in [joint.body1, joint.body2] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.retain(|&j| j != id);
                body.wake_up();
            }
        }
        Ok(())
    }

    pub fn joint(&self, id: EntityId) -> Option<&Joint> {
        self.joints.get(id)
    }

    // ---- Queries ------------------------------------------------------

    /// Ray cast with the broad-phase callback protocol: the callback
    /// returns `0.0` to stop, a negative value to ignore the hit, or a
    /// positive distance to clip further traversal.
    pub fn raycast_with(&self, ray: &Ray, mut callback: impl FnMut(&RaycastHit) -> f32) {
        self.broadphase.tree.raycast(ray, |node, clipped| {
            let collider_id = self.broadphase.tree.proxy(node);
            let Some(collider) = self.colliders.get(collider_id) else {
                return -1.0;
            };
            let Some(body) = self.bodies.get(collider.body) else {
                return -1.0;
            };
            let world_transform = collider.world_transform(&body.transform);
            match raycast_shape(&collider.shape, &world_transform, clipped) {
                Some((distance, normal)) => callback(&RaycastHit {
                    body: collider.body,
                    collider: collider_id,
                    point: ray.point_at(distance),
                    normal,
                    distance,
                }),
                None => -1.0,
            }
        });
    }

    /// Closest hit along the ray, if any.
    pub fn raycast_closest(&self, ray: &Ray) -> Option<RaycastHit> {
        let mut best: Option<RaycastHit> = None;
        self.raycast_with(ray, |hit| {
            if best.map(|b| hit.distance < b.distance).unwrap_or(true) {
                best = Some(*hit);
            }
            hit.distance
        });
        best
    }

    /// Every hit along the ray, sorted by distance.
    pub fn raycast_all(&self, ray: &Ray) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        self.raycast_with(ray, |hit| {
            hits.push(*hit);
            -1.0
        });
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Visits colliders whose shape AABB overlaps `aabb`; the callback
    /// returns `false` to stop.
    pub fn overlap_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(EntityId, EntityId) -> bool) {
        self.broadphase.tree.query_overlaps(aabb, |node| {
            let collider_id = self.broadphase.tree.proxy(node);
            let Some(collider) = self.colliders.get(collider_id) else {
                return true;
            };
            let Some(body) = self.bodies.get(collider.body) else {
                return true;
            };
            let world_transform = collider.world_transform(&body.transform);
            if collider.shape.aabb(&world_transform).overlaps(aabb) {
                return callback(collider.body, collider_id);
            }
            true
        });
    }

    /// Persistent manifold of a collider pair, if the pair overlaps.
    pub fn manifold(&self, collider1: EntityId, collider2: EntityId) -> Option<&ContactManifold> {
        let key = ordered_pair(collider1, collider2);
        self.pairs.get(&key).map(|pair| pair.manifold())
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Contact events collected during the most recent step.
    pub fn contact_events(&self) -> &[ContactEvent] {
        &self.events
    }

    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.events)
    }

    /// Broad-phase structural invariants; exposed for tests and debugging.
    pub fn validate_broadphase(&self) {
        self.broadphase.tree.validate();
    }

    fn check_poisoned(&self) -> PhysicsResult<()> {
        if self.pool.is_poisoned() {
            Err(PhysicsError::Poisoned)
        } else {
            Ok(())
        }
    }

    // ---- Stepping -----------------------------------------------------

    /// Advances the simulation by `dt` seconds. Atomic: it either runs the
    /// whole pipeline or returns without touching any state.
    pub fn step(&mut self, dt: f32) -> PhysicsResult<()> {
        self.check_poisoned()?;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidParameter("dt must be positive and finite"));
        }

        let _step_timer = ScopedTimer::new("step");
        self.events.clear();

        // (1) External forces and gravity into velocities.
        for body in self.bodies.iter_mut() {
            integrator::integrate_forces(body, self.config.gravity, dt);
        }

        // (2)(3) Predict displacements and refresh broad-phase leaves.
        self.update_broadphase(dt);

        // (4) Merge new overlapping pairs, retire vanished ones.
        self.merge_pairs();
        self.retire_pairs();

        // (5) Refresh surviving manifolds from current poses.
        self.refresh_manifolds();

        // (6) Narrow-phase per pair, in deterministic pair order.
        self.run_narrowphase();

        // (7) Partition into islands.
        let edges = self.collect_edges();
        self.islands.build_islands(&mut self.bodies, &edges);

        // (8) Solve each island: initialization, warm start, velocity
        // iterations, split impulses.
        for island in self.islands.islands() {
            self.solver.solve_island(
                island,
                &mut self.bodies,
                &mut self.pairs,
                &mut self.joints,
                &self.config,
                dt,
            );
        }

        // (9) Damping, then pose integration from the solved velocities
        // (+ split velocities).
        for body in self.bodies.iter_mut() {
            integrator::apply_damping(body, dt);
            integrator::integrate_position(body, dt);
        }

        // (10) Optional NLGS position correction on refreshed geometry.
        if self.config.nlgs_position_correction {
            for island in self.islands.islands() {
                solver::solve_positions(
                    island,
                    &mut self.bodies,
                    &mut self.pairs,
                    &mut self.joints,
                    &self.config,
                );
            }
        }

        // (11) Sleep bookkeeping.
        self.islands.update_sleep(&mut self.bodies, &self.config, dt);

        // (12) Force/torque accumulators are per-step.
        for body in self.bodies.iter_mut() {
            body.clear_accumulators();
        }

        Ok(())
    }

    fn update_broadphase(&mut self, dt: f32) {
        let _timer = ScopedTimer::new("broadphase");
        let ids: Vec<EntityId> = self.colliders.ids().collect();
        for id in ids {
            let Some(collider) = self.colliders.get(id) else { continue };
            let Some(body) = self.bodies.get(collider.body) else { continue };
            let world_transform = collider.world_transform(&body.transform);
            let aabb = collider.shape.aabb(&world_transform);
            let displacement = body.velocity.linear * dt;
            let node = collider.tree_node;
            self.broadphase.update_proxy(node, &aabb, displacement);
        }
    }

    fn merge_pairs(&mut self) {
        let colliders = &self.colliders;
        let bodies = &self.bodies;
        let candidates = self.broadphase.compute_pairs(|a, b| {
            let (Some(ca), Some(cb)) = (colliders.get(a), colliders.get(b)) else {
                return false;
            };
            if ca.body == cb.body {
                return false;
            }
            if !ca.filter.accepts(&cb.filter) {
                return false;
            }
            let (Some(ba), Some(bb)) = (bodies.get(ca.body), bodies.get(cb.body)) else {
                return false;
            };
            // At least one side must be able to move.
            ba.is_dynamic() || bb.is_dynamic()
        });

        for (c1, c2) in candidates {
            if self.pairs.contains_key(&(c1, c2)) {
                continue;
            }
            let (Some(collider1), Some(collider2)) =
                (self.colliders.get(c1), self.colliders.get(c2))
            else {
                continue;
            };
            let manifold = self.pool.construct(ContactManifold::new(
                c1,
                c2,
                collider1.body,
                collider2.body,
            ));
            self.pairs.insert((c1, c2), OverlappingPair::new(manifold));
        }
    }

    fn retire_pairs(&mut self) {
        let mut retired: Vec<PairKey> = Vec::new();
        for (&key, _) in self.pairs.iter() {
            let alive = match (self.colliders.get(key.0), self.colliders.get(key.1)) {
                (Some(c1), Some(c2)) => self.broadphase.proxies_overlap(c1.tree_node, c2.tree_node),
                _ => false,
            };
            if !alive {
                retired.push(key);
            }
        }
        retired.sort_unstable();

        for key in retired {
            let Some(pair) = self.pairs.remove(&key) else { continue };
            if pair.had_contacts {
                let manifold = pair.manifold();
                self.events.push(ContactEvent {
                    kind: ContactEventKind::End,
                    body1: manifold.body1,
                    body2: manifold.body2,
                    collider1: key.0,
                    collider2: key.1,
                    points: Vec::new(),
                });
            }
            self.pool.destruct(pair.manifold);
        }
    }

    fn refresh_manifolds(&mut self) {
        let bodies = &self.bodies;
        for pair in self.pairs.values_mut() {
            let manifold = pair.manifold_mut();
            let (Some(body1), Some(body2)) =
                (bodies.get(manifold.body1), bodies.get(manifold.body2))
            else {
                continue;
            };
            manifold.refresh(
                &body1.transform,
                &body2.transform,
                self.config.persistent_contact_threshold,
            );
        }
    }

    fn run_narrowphase(&mut self) {
        let _timer = ScopedTimer::new("narrowphase");
        self.narrowphase.update_settings(&self.config);

        let mut keys: Vec<PairKey> = self.pairs.keys().copied().collect();
        keys.sort_unstable();

        for key in keys {
            let (c1, c2) = key;
            let (Some(collider1), Some(collider2)) =
                (self.colliders.get(c1), self.colliders.get(c2))
            else {
                continue;
            };
            let (Some(body1), Some(body2)) =
                (self.bodies.get(collider1.body), self.bodies.get(collider2.body))
            else {
                continue;
            };
            // A pair with no awake dynamic participant keeps last step's
            // contacts untouched.
            let awake1 = body1.is_dynamic() && !body1.is_sleeping();
            let awake2 = body2.is_dynamic() && !body2.is_sleeping();
            if !awake1 && !awake2 {
                continue;
            }

            let transform1 = collider1.world_transform(&body1.transform);
            let transform2 = collider2.world_transform(&body2.transform);
            let body_transform1 = body1.transform;
            let body_transform2 = body2.transform;
            let mut cached_axis = collider1.cached_axis;

            let mut raw = std::mem::take(&mut self.contact_scratch);
            raw.clear();
            self.narrowphase.collide(
                &collider1.shape,
                &transform1,
                &collider2.shape,
                &transform2,
                &mut cached_axis,
                (c1.index(), c2.index()),
                &mut raw,
            );

            if let Some(collider) = self.colliders.get_mut(c1) {
                collider.cached_axis = cached_axis;
            }

            let Some(pair) = self.pairs.get_mut(&key) else {
                self.contact_scratch = raw;
                continue;
            };
            let manifold = pair.manifold_mut();
            for contact in raw.drain(..) {
                let point = ContactPoint {
                    normal: contact.normal,
                    depth: contact.depth,
                    local1: body_transform1.inverse_transform_point(contact.world1),
                    local2: body_transform2.inverse_transform_point(contact.world2),
                    world1: contact.world1,
                    world2: contact.world2,
                    ..ContactPoint::default()
                };
                manifold.add_contact(point, self.config.persistent_contact_threshold);
            }
            self.contact_scratch = raw;

            let has_contacts = !manifold.is_empty();
            let kind = match (pair.had_contacts, has_contacts) {
                (false, true) => Some(ContactEventKind::Begin),
                (true, true) => Some(ContactEventKind::Stay),
                (true, false) => Some(ContactEventKind::End),
                (false, false) => None,
            };
            pair.had_contacts = has_contacts;

            if let Some(kind) = kind {
                let manifold = pair.manifold();
                self.events.push(ContactEvent {
                    kind,
                    body1: manifold.body1,
                    body2: manifold.body2,
                    collider1: c1,
                    collider2: c2,
                    points: manifold.points().to_vec(),
                });
            }
        }
    }

    fn collect_edges(&self) -> Vec<EdgeLink> {
        let mut keys: Vec<PairKey> = self.pairs.keys().copied().collect();
        keys.sort_unstable();

        let mut edges = Vec::new();
        for key in keys {
            let Some(pair) = self.pairs.get(&key) else { continue };
            let manifold = pair.manifold();
            if manifold.is_empty() {
                continue;
            }
            let trigger = self
                .colliders
                .get(key.0)
                .map(|c| c.is_trigger)
                .unwrap_or(false)
                || self
                    .colliders
                    .get(key.1)
                    .map(|c| c.is_trigger)
                    .unwrap_or(false);
            if trigger {
                continue;
            }
            edges.push(EdgeLink {
                body1: manifold.body1,
                body2: manifold.body2,
                edge: IslandEdge::Manifold(key),
            });
        }

        for id in self.joints.ids() {
            if let Some(joint) = self.joints.get(id) {
                edges.push(EdgeLink {
                    body1: joint.body1,
                    body2: joint.body2,
                    edge: IslandEdge::Joint(id),
                });
            }
        }

        edges
    }
}

fn ordered_pair(a: EntityId, b: EntityId) -> PairKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
