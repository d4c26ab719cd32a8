//! Sequential-impulse constraint solver.
//!
//! Each island is solved in isolation: body velocities are copied into a
//! solver-local view, contact and joint constraints are initialized with
//! world-space effective masses, warm-started from the impulses stored in
//! the persistent manifolds, iterated with accumulated-impulse clamping,
//! and the results written back. Split-impulse pseudo velocities keep the
//! Baumgarte position push-out from injecting momentum.

use std::collections::HashMap;

use glam::{Mat3, Quat, Vec3};

use crate::collision::contact::{
    ContactManifold, OverlappingPair, PairKey, MAX_CONTACT_POINTS,
};
use crate::config::WorldConfig;
use crate::core::body::RigidBody;
use crate::core::types::Material;
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{integrate_orientation, tangent_basis};

use super::island::Island;
use super::joint::{Joint, JointBody};

/// Per-body velocity/pose view the constraints act on ("kinematic view"):
/// the solver never reaches into body internals beyond this snapshot.
#[derive(Debug, Clone, Copy)]
struct SolverBody {
    id: EntityId,
    linear: Vec3,
    angular: Vec3,
    split_linear: Vec3,
    split_angular: Vec3,
    position: Vec3,
    rotation: Quat,
    inv_mass: f32,
    inv_inertia: Mat3,
    is_dynamic: bool,
}

impl SolverBody {
    fn from_body(body: &RigidBody) -> Self {
        Self {
            id: body.id,
            linear: body.velocity.linear,
            angular: body.velocity.angular,
            split_linear: Vec3::ZERO,
            split_angular: Vec3::ZERO,
            position: body.transform.position,
            rotation: body.transform.rotation,
            inv_mass: body.inverse_mass(),
            inv_inertia: body.inverse_inertia_world(),
            is_dynamic: body.is_dynamic(),
        }
    }

    fn joint_view(&self) -> JointBody {
        JointBody {
            linear: self.linear,
            angular: self.angular,
            position: self.position,
            rotation: self.rotation,
            inv_mass: self.inv_mass,
            inv_inertia: self.inv_inertia,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PointConstraint {
    r1: Vec3,
    r2: Vec3,
    normal: Vec3,
    tangent1: Vec3,
    tangent2: Vec3,
    normal_mass: f32,
    tangent1_mass: f32,
    tangent2_mass: f32,
    restitution_bias: f32,
    /// Baumgarte term folded into the velocity constraint when split
    /// impulses are off.
    penetration_bias: f32,
    /// Baumgarte term for the split-impulse pass.
    split_bias: f32,
    penetration: f32,
    normal_impulse: f32,
    tangent_impulse1: f32,
    tangent_impulse2: f32,
    split_impulse: f32,
    point_index: usize,
}

#[derive(Debug)]
struct ContactConstraint {
    pair: PairKey,
    body1: usize,
    body2: usize,
    friction: f32,
    rolling_resistance: f32,
    points: [PointConstraint; MAX_CONTACT_POINTS],
    count: usize,

    // Manifold-center friction data, populated only in center mode.
    center_normal: Vec3,
    center_r1: Vec3,
    center_r2: Vec3,
    center_tangent1: Vec3,
    center_tangent2: Vec3,
    center_tangent1_mass: f32,
    center_tangent2_mass: f32,
    twist_mass: f32,
    inv_rolling: Mat3,
    friction_impulse1: f32,
    friction_impulse2: f32,
    twist_impulse: f32,
    rolling_impulse: Vec3,
}

/// Island solver. Reused across islands and steps; buffers are retained.
pub struct ContactSolver {
    bodies: Vec<SolverBody>,
    body_index: HashMap<EntityId, usize>,
    contacts: Vec<ContactConstraint>,
}

impl Default for ContactSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactSolver {
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            body_index: HashMap::new(),
            contacts: Vec::new(),
        }
    }

    /// Runs initialization, warm start, and the velocity iterations for
    /// one island, then stores impulses and velocities back.
    pub fn solve_island(
        &mut self,
        island: &Island,
        bodies: &mut Arena<RigidBody>,
        pairs: &mut HashMap<PairKey, OverlappingPair>,
        joints: &mut Arena<Joint>,
        config: &WorldConfig,
        dt: f32,
    ) {
        self.bodies.clear();
        self.body_index.clear();
        self.contacts.clear();

        for &id in &island.bodies {
            if let Some(body) = bodies.get(id) {
                self.body_index.insert(id, self.bodies.len());
                self.bodies.push(SolverBody::from_body(body));
            }
        }

        // Constraints may reference static/kinematic bodies outside the
        // island; pull them in as fixed entries.
        for &key in &island.manifolds {
            if let Some(pair) = pairs.get(&key) {
                let manifold = pair.manifold();
                self.ensure_body(manifold.body1, bodies);
                self.ensure_body(manifold.body2, bodies);
            }
        }
        for &id in &island.joints {
            if let Some(joint) = joints.get(id) {
                self.ensure_body(joint.body1, bodies);
                self.ensure_body(joint.body2, bodies);
            }
        }

        self.initialize_contacts(island, bodies, pairs, config, dt);

        for &id in &island.joints {
            if let Some(joint) = joints.get_mut(id) {
                let (Some(&i1), Some(&i2)) = (
                    self.body_index.get(&joint.body1),
                    self.body_index.get(&joint.body2),
                ) else {
                    continue;
                };
                joint.initialize(
                    &self.bodies[i1].joint_view(),
                    &self.bodies[i2].joint_view(),
                    dt,
                    config.baumgarte,
                );
            }
        }

        if config.warm_starting {
            self.warm_start(config);
            for &id in &island.joints {
                if let Some(joint) = joints.get(id) {
                    self.with_joint_bodies(joint.body1, joint.body2, |b1, b2| {
                        joint.warm_start(b1, b2);
                    });
                }
            }
        } else {
            for &id in &island.joints {
                if let Some(joint) = joints.get_mut(id) {
                    joint.reset_impulses();
                }
            }
        }

        for _ in 0..config.velocity_iterations {
            // Contacts first, then the joint pass over the same
            // velocities.
            self.velocity_iteration(config);
            for &id in &island.joints {
                if let Some(joint) = joints.get_mut(id) {
                    let body1 = joint.body1;
                    let body2 = joint.body2;
                    Self::with_joint_bodies_on(
                        &mut self.bodies,
                        &self.body_index,
                        body1,
                        body2,
                        |b1, b2| joint.solve_velocity(b1, b2, dt),
                    );
                }
            }
        }

        self.store_impulses(pairs);
        self.write_back(bodies, config);
    }

    fn ensure_body(&mut self, id: EntityId, bodies: &Arena<RigidBody>) {
        if self.body_index.contains_key(&id) {
            return;
        }
        if let Some(body) = bodies.get(id) {
            self.body_index.insert(id, self.bodies.len());
            self.bodies.push(SolverBody::from_body(body));
        }
    }

    fn initialize_contacts(
        &mut self,
        island: &Island,
        bodies: &Arena<RigidBody>,
        pairs: &mut HashMap<PairKey, OverlappingPair>,
        config: &WorldConfig,
        dt: f32,
    ) {
        for &key in &island.manifolds {
            let Some(pair) = pairs.get_mut(&key) else { continue };
            let manifold = pair.manifold_mut();
            if manifold.is_empty() {
                continue;
            }
            let (Some(&i1), Some(&i2)) = (
                self.body_index.get(&manifold.body1),
                self.body_index.get(&manifold.body2),
            ) else {
                continue;
            };

            let material = match (bodies.get(manifold.body1), bodies.get(manifold.body2)) {
                (Some(a), Some(b)) => Material::mix(&a.material, &b.material),
                _ => continue,
            };

            let b1 = self.bodies[i1];
            let b2 = self.bodies[i2];

            let mut constraint = ContactConstraint {
                pair: key,
                body1: i1,
                body2: i2,
                friction: material.friction,
                rolling_resistance: material.rolling_resistance,
                points: [PointConstraint::default(); MAX_CONTACT_POINTS],
                count: 0,
                center_normal: Vec3::ZERO,
                center_r1: Vec3::ZERO,
                center_r2: Vec3::ZERO,
                center_tangent1: Vec3::ZERO,
                center_tangent2: Vec3::ZERO,
                center_tangent1_mass: 0.0,
                center_tangent2_mass: 0.0,
                twist_mass: 0.0,
                inv_rolling: Mat3::ZERO,
                friction_impulse1: 0.0,
                friction_impulse2: 0.0,
                twist_impulse: 0.0,
                rolling_impulse: Vec3::ZERO,
            };

            for (point_index, point) in manifold.points().iter().enumerate() {
                let r1 = point.world1 - b1.position;
                let r2 = point.world2 - b2.position;
                let normal = point.normal;

                let relative_velocity = b2.linear + b2.angular.cross(r2)
                    - b1.linear
                    - b1.angular.cross(r1);
                let normal_velocity = relative_velocity.dot(normal);

                let restitution_bias =
                    if normal_velocity < -config.restitution_velocity_threshold {
                        material.restitution * normal_velocity
                    } else {
                        0.0
                    };

                let correction = -(config.baumgarte / dt)
                    * (point.depth - config.penetration_slop).max(0.0);
                let split_correction = -(config.baumgarte_split / dt)
                    * (point.depth - config.penetration_slop).max(0.0);

                // Tangent basis: keep the previous step's first tangent
                // when it still spans the contact plane, so warm-started
                // friction impulses stay meaningful.
                let (tangent1, tangent2) = contact_tangents(
                    normal,
                    relative_velocity,
                    point.is_resting.then_some(point.tangent1),
                );

                let warm = config.warm_starting && point.is_resting;
                let mut pc = PointConstraint {
                    r1,
                    r2,
                    normal,
                    tangent1,
                    tangent2,
                    normal_mass: effective_mass(&b1, &b2, r1, r2, normal),
                    tangent1_mass: effective_mass(&b1, &b2, r1, r2, tangent1),
                    tangent2_mass: effective_mass(&b1, &b2, r1, r2, tangent2),
                    restitution_bias,
                    penetration_bias: if config.split_impulse { 0.0 } else { correction },
                    split_bias: split_correction,
                    penetration: point.depth,
                    normal_impulse: 0.0,
                    tangent_impulse1: 0.0,
                    tangent_impulse2: 0.0,
                    split_impulse: 0.0,
                    point_index,
                };
                if warm {
                    pc.normal_impulse = point.normal_impulse;
                    pc.tangent_impulse1 = point.tangent_impulse[0];
                    pc.tangent_impulse2 = point.tangent_impulse[1];
                }
                constraint.points[constraint.count] = pc;
                constraint.count += 1;
            }

            if config.friction_at_manifold_center {
                let count = constraint.count as f32;
                let center1: Vec3 =
                    manifold.points().iter().map(|p| p.world1).sum::<Vec3>() / count;
                let center2: Vec3 =
                    manifold.points().iter().map(|p| p.world2).sum::<Vec3>() / count;
                let mut normal = manifold.average_normal();
                if normal == Vec3::ZERO {
                    normal = constraint.points[0].normal;
                }

                constraint.center_normal = normal;
                constraint.center_r1 = center1 - b1.position;
                constraint.center_r2 = center2 - b2.position;

                let relative_velocity = b2.linear
                    + b2.angular.cross(constraint.center_r2)
                    - b1.linear
                    - b1.angular.cross(constraint.center_r1);
                let previous = (manifold.friction_vec1 != Vec3::ZERO)
                    .then_some(manifold.friction_vec1);
                let (t1, t2) = contact_tangents(normal, relative_velocity, previous);
                constraint.center_tangent1 = t1;
                constraint.center_tangent2 = t2;
                constraint.center_tangent1_mass =
                    effective_mass(&b1, &b2, constraint.center_r1, constraint.center_r2, t1);
                constraint.center_tangent2_mass =
                    effective_mass(&b1, &b2, constraint.center_r1, constraint.center_r2, t2);

                let twist_k = normal.dot(b1.inv_inertia * normal)
                    + normal.dot(b2.inv_inertia * normal);
                constraint.twist_mass = if twist_k > 1.0e-9 { 1.0 / twist_k } else { 0.0 };

                if constraint.rolling_resistance > 0.0 {
                    let k = b1.inv_inertia + b2.inv_inertia;
                    constraint.inv_rolling = if k.determinant().abs() > 1.0e-12 {
                        k.inverse()
                    } else {
                        Mat3::ZERO
                    };
                }

                if config.warm_starting {
                    constraint.friction_impulse1 = manifold.friction_impulse1;
                    constraint.friction_impulse2 = manifold.friction_impulse2;
                    constraint.twist_impulse = manifold.twist_impulse;
                    constraint.rolling_impulse = manifold.rolling_impulse;
                }
            }

            self.contacts.push(constraint);
        }
    }

    /// Applies last step's accumulated impulses before iterating; the sole
    /// purpose of persisting them.
    fn warm_start(&mut self, config: &WorldConfig) {
        for c in &self.contacts {
            let (b1, b2) = pair_mut(&mut self.bodies, c.body1, c.body2);
            for p in &c.points[..c.count] {
                let impulse = p.normal * p.normal_impulse
                    + p.tangent1 * p.tangent_impulse1
                    + p.tangent2 * p.tangent_impulse2;
                apply_impulse(b1, b2, impulse, p.r1, p.r2);
            }
            if config.friction_at_manifold_center && c.count > 0 {
                let impulse = c.center_tangent1 * c.friction_impulse1
                    + c.center_tangent2 * c.friction_impulse2;
                apply_impulse(b1, b2, impulse, c.center_r1, c.center_r2);
                let torque = c.center_normal * c.twist_impulse + c.rolling_impulse;
                apply_angular_impulse(b1, b2, torque);
            }
        }
    }

    fn velocity_iteration(&mut self, config: &WorldConfig) {
        for c in &mut self.contacts {
            let (b1, b2) = pair_mut(&mut self.bodies, c.body1, c.body2);
            let mut normal_impulse_sum = 0.0;

            for p in &mut c.points[..c.count] {
                if !config.friction_at_manifold_center {
                    // Friction directions first. The Coulomb cone clamps
                    // the *accumulated* impulse against the normal impulse
                    // as it stood before this iteration's normal update.
                    let limit = c.friction * p.normal_impulse;

                    let dv = b2.linear + b2.angular.cross(p.r2)
                        - b1.linear
                        - b1.angular.cross(p.r1);
                    let delta = -dv.dot(p.tangent1) * p.tangent1_mass;
                    let new_impulse = (p.tangent_impulse1 + delta).clamp(-limit, limit);
                    let applied = new_impulse - p.tangent_impulse1;
                    p.tangent_impulse1 = new_impulse;
                    apply_impulse(b1, b2, p.tangent1 * applied, p.r1, p.r2);

                    let dv = b2.linear + b2.angular.cross(p.r2)
                        - b1.linear
                        - b1.angular.cross(p.r1);
                    let delta = -dv.dot(p.tangent2) * p.tangent2_mass;
                    let new_impulse = (p.tangent_impulse2 + delta).clamp(-limit, limit);
                    let applied = new_impulse - p.tangent_impulse2;
                    p.tangent_impulse2 = new_impulse;
                    apply_impulse(b1, b2, p.tangent2 * applied, p.r1, p.r2);
                }

                // Normal constraint: clamp the accumulated impulse at zero
                // so contacts never pull.
                let dv = b2.linear + b2.angular.cross(p.r2)
                    - b1.linear
                    - b1.angular.cross(p.r1);
                let jv = dv.dot(p.normal);
                let delta =
                    -(jv + p.restitution_bias + p.penetration_bias) * p.normal_mass;
                let new_impulse = (p.normal_impulse + delta).max(0.0);
                let applied = new_impulse - p.normal_impulse;
                p.normal_impulse = new_impulse;
                apply_impulse(b1, b2, p.normal * applied, p.r1, p.r2);

                // Split-impulse position correction on the pseudo
                // velocities, decoupled from restitution.
                if config.split_impulse && p.penetration > config.penetration_slop {
                    let dvs = b2.split_linear + b2.split_angular.cross(p.r2)
                        - b1.split_linear
                        - b1.split_angular.cross(p.r1);
                    let jvs = dvs.dot(p.normal);
                    let delta_split = -(jvs + p.split_bias) * p.normal_mass;
                    let new_split = (p.split_impulse + delta_split).max(0.0);
                    let applied_split = new_split - p.split_impulse;
                    p.split_impulse = new_split;
                    apply_split_impulse(b1, b2, p.normal * applied_split, p.r1, p.r2);
                }

                normal_impulse_sum += p.normal_impulse;
            }

            if config.friction_at_manifold_center && c.count > 0 {
                let limit = c.friction * normal_impulse_sum;

                let dv = b2.linear + b2.angular.cross(c.center_r2)
                    - b1.linear
                    - b1.angular.cross(c.center_r1);
                let delta = -dv.dot(c.center_tangent1) * c.center_tangent1_mass;
                let new_impulse = (c.friction_impulse1 + delta).clamp(-limit, limit);
                let applied = new_impulse - c.friction_impulse1;
                c.friction_impulse1 = new_impulse;
                apply_impulse(b1, b2, c.center_tangent1 * applied, c.center_r1, c.center_r2);

                let dv = b2.linear + b2.angular.cross(c.center_r2)
                    - b1.linear
                    - b1.angular.cross(c.center_r1);
                let delta = -dv.dot(c.center_tangent2) * c.center_tangent2_mass;
                let new_impulse = (c.friction_impulse2 + delta).clamp(-limit, limit);
                let applied = new_impulse - c.friction_impulse2;
                c.friction_impulse2 = new_impulse;
                apply_impulse(b1, b2, c.center_tangent2 * applied, c.center_r1, c.center_r2);

                // Twist friction around the averaged normal.
                let jw = c.center_normal.dot(b2.angular - b1.angular);
                let delta = -jw * c.twist_mass;
                let new_impulse = (c.twist_impulse + delta).clamp(-limit, limit);
                let applied = new_impulse - c.twist_impulse;
                c.twist_impulse = new_impulse;
                apply_angular_impulse(b1, b2, c.center_normal * applied);

                // Rolling resistance as a vector constraint on the
                // relative angular velocity.
                if c.rolling_resistance > 0.0 {
                    let rolling_limit = c.rolling_resistance * normal_impulse_sum;
                    let jw = b2.angular - b1.angular;
                    let delta = c.inv_rolling * -jw;
                    let mut new_impulse = c.rolling_impulse + delta;
                    if new_impulse.length() > rolling_limit {
                        new_impulse = new_impulse.normalize_or_zero() * rolling_limit;
                    }
                    let applied = new_impulse - c.rolling_impulse;
                    c.rolling_impulse = new_impulse;
                    apply_angular_impulse(b1, b2, applied);
                }
            }
        }
    }

    /// Persists accumulated impulses into the manifolds for the next
    /// step's warm start.
    fn store_impulses(&self, pairs: &mut HashMap<PairKey, OverlappingPair>) {
        for c in &self.contacts {
            let Some(pair) = pairs.get_mut(&c.pair) else { continue };
            let manifold = pair.manifold_mut();
            let points = manifold.points_mut();
            for p in &c.points[..c.count] {
                if let Some(point) = points.get_mut(p.point_index) {
                    point.normal_impulse = p.normal_impulse;
                    point.tangent_impulse = [p.tangent_impulse1, p.tangent_impulse2];
                    point.tangent1 = p.tangent1;
                    point.tangent2 = p.tangent2;
                }
            }
            manifold.friction_impulse1 = c.friction_impulse1;
            manifold.friction_impulse2 = c.friction_impulse2;
            manifold.twist_impulse = c.twist_impulse;
            manifold.rolling_impulse = c.rolling_impulse;
            manifold.friction_vec1 = c.center_tangent1;
            manifold.friction_vec2 = c.center_tangent2;
        }
    }

    fn write_back(&self, bodies: &mut Arena<RigidBody>, config: &WorldConfig) {
        for sb in &self.bodies {
            if !sb.is_dynamic {
                continue;
            }
            if let Some(body) = bodies.get_mut(sb.id) {
                body.velocity.linear = sb.linear;
                body.velocity.angular = sb.angular;
                if config.split_impulse {
                    body.split_linear = sb.split_linear;
                    body.split_angular = sb.split_angular;
                }
            }
        }
    }

    fn with_joint_bodies(
        &mut self,
        id1: EntityId,
        id2: EntityId,
        f: impl FnOnce(&mut JointBody, &mut JointBody),
    ) {
        Self::with_joint_bodies_on(&mut self.bodies, &self.body_index, id1, id2, f);
    }

    /// Copies two solver bodies into joint views, runs `f`, and writes the
    /// velocities back.
    fn with_joint_bodies_on(
        bodies: &mut [SolverBody],
        index: &HashMap<EntityId, usize>,
        id1: EntityId,
        id2: EntityId,
        f: impl FnOnce(&mut JointBody, &mut JointBody),
    ) {
        let (Some(&i1), Some(&i2)) = (index.get(&id1), index.get(&id2)) else {
            return;
        };
        let mut jb1 = bodies[i1].joint_view();
        let mut jb2 = bodies[i2].joint_view();
        f(&mut jb1, &mut jb2);
        if bodies[i1].is_dynamic {
            bodies[i1].linear = jb1.linear;
            bodies[i1].angular = jb1.angular;
        }
        if bodies[i2].is_dynamic {
            bodies[i2].linear = jb2.linear;
            bodies[i2].angular = jb2.angular;
        }
    }
}

/// Non-Linear Gauss-Seidel position correction: directly adjusts poses
/// from the penetration depths recomputed each iteration, and lets joints
/// correct their positional drift the same way.
pub fn solve_positions(
    island: &Island,
    bodies: &mut Arena<RigidBody>,
    pairs: &mut HashMap<PairKey, OverlappingPair>,
    joints: &mut Arena<Joint>,
    config: &WorldConfig,
) {
    for _ in 0..config.position_iterations {
        for &id in &island.joints {
            let Some(joint) = joints.get_mut(id) else { continue };
            let body1 = joint.body1;
            let body2 = joint.body2;
            let (Some(state1), Some(state2)) =
                (bodies.get(body1).map(joint_view), bodies.get(body2).map(joint_view))
            else {
                continue;
            };
            let mut jb1 = state1;
            let mut jb2 = state2;
            joint.solve_position(&mut jb1, &mut jb2);
            write_pose(bodies, body1, &jb1);
            write_pose(bodies, body2, &jb2);
        }

        for &key in &island.manifolds {
            let Some(pair) = pairs.get(&key) else { continue };
            let manifold = pair.manifold();
            solve_manifold_position(manifold, bodies, config);
        }
    }
}

fn joint_view(body: &RigidBody) -> JointBody {
    JointBody {
        linear: body.velocity.linear,
        angular: body.velocity.angular,
        position: body.transform.position,
        rotation: body.transform.rotation,
        inv_mass: body.inverse_mass(),
        inv_inertia: body.inverse_inertia_world(),
    }
}

fn write_pose(bodies: &mut Arena<RigidBody>, id: EntityId, view: &JointBody) {
    if let Some(body) = bodies.get_mut(id) {
        if body.is_dynamic() {
            body.transform.position = view.position;
            body.transform.rotation = view.rotation.normalize();
        }
    }
}

fn solve_manifold_position(
    manifold: &ContactManifold,
    bodies: &mut Arena<RigidBody>,
    config: &WorldConfig,
) {
    for point in manifold.points() {
        let (Some(body1), Some(body2)) =
            (bodies.get(manifold.body1), bodies.get(manifold.body2))
        else {
            return;
        };

        let world1 = body1.transform.transform_point(point.local1);
        let world2 = body2.transform.transform_point(point.local2);
        let depth = (world1 - world2).dot(point.normal);
        if depth <= config.penetration_slop {
            continue;
        }

        let r1 = world1 - body1.transform.position;
        let r2 = world2 - body2.transform.position;
        let inv_mass1 = body1.inverse_mass();
        let inv_mass2 = body2.inverse_mass();
        let inv_inertia1 = body1.inverse_inertia_world();
        let inv_inertia2 = body2.inverse_inertia_world();

        let rn1 = r1.cross(point.normal);
        let rn2 = r2.cross(point.normal);
        let k = inv_mass1
            + inv_mass2
            + rn1.dot(inv_inertia1 * rn1)
            + rn2.dot(inv_inertia2 * rn2);
        if k <= 1.0e-9 {
            continue;
        }

        let lambda = config.baumgarte * (depth - config.penetration_slop) / k;
        let impulse = point.normal * lambda;

        let id1 = manifold.body1;
        let id2 = manifold.body2;
        if let Some(body) = bodies.get_mut(id1) {
            if body.is_dynamic() {
                body.transform.position -= impulse * inv_mass1;
                let spin = inv_inertia1 * r1.cross(-impulse);
                body.transform.rotation =
                    integrate_orientation(body.transform.rotation, spin, 1.0);
            }
        }
        if let Some(body) = bodies.get_mut(id2) {
            if body.is_dynamic() {
                body.transform.position += impulse * inv_mass2;
                let spin = inv_inertia2 * r2.cross(impulse);
                body.transform.rotation =
                    integrate_orientation(body.transform.rotation, spin, 1.0);
            }
        }
    }
}

/// `K⁻¹` of a point constraint along `direction`.
fn effective_mass(
    b1: &SolverBody,
    b2: &SolverBody,
    r1: Vec3,
    r2: Vec3,
    direction: Vec3,
) -> f32 {
    let rd1 = r1.cross(direction);
    let rd2 = r2.cross(direction);
    let k = b1.inv_mass
        + b2.inv_mass
        + rd1.dot(b1.inv_inertia * rd1)
        + rd2.dot(b2.inv_inertia * rd2);
    if k > 1.0e-9 {
        1.0 / k
    } else {
        0.0
    }
}

/// Chooses an orthonormal tangent pair with `t1 x t2 = normal`,
/// preferring the previous basis, then the slide direction.
fn contact_tangents(normal: Vec3, relative_velocity: Vec3, previous: Option<Vec3>) -> (Vec3, Vec3) {
    if let Some(old) = previous {
        let projected = old - normal * old.dot(normal);
        if projected.length_squared() > 1.0e-8 {
            let t1 = projected.normalize();
            return (t1, normal.cross(t1));
        }
    }

    let tangential = relative_velocity - normal * relative_velocity.dot(normal);
    if tangential.length_squared() > 1.0e-8 {
        let t1 = tangential.normalize();
        (t1, normal.cross(t1))
    } else {
        tangent_basis(normal)
    }
}

fn pair_mut(bodies: &mut [SolverBody], i1: usize, i2: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(i1, i2);
    if i1 < i2 {
        let (left, right) = bodies.split_at_mut(i2);
        (&mut left[i1], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(i1);
        (&mut right[0], &mut left[i2])
    }
}

fn apply_impulse(
    b1: &mut SolverBody,
    b2: &mut SolverBody,
    impulse: Vec3,
    r1: Vec3,
    r2: Vec3,
) {
    b1.linear -= impulse * b1.inv_mass;
    b1.angular -= b1.inv_inertia * r1.cross(impulse);
    b2.linear += impulse * b2.inv_mass;
    b2.angular += b2.inv_inertia * r2.cross(impulse);
}

fn apply_split_impulse(
    b1: &mut SolverBody,
    b2: &mut SolverBody,
    impulse: Vec3,
    r1: Vec3,
    r2: Vec3,
) {
    b1.split_linear -= impulse * b1.inv_mass;
    b1.split_angular -= b1.inv_inertia * r1.cross(impulse);
    b2.split_linear += impulse * b2.inv_mass;
    b2.split_angular += b2.inv_inertia * r2.cross(impulse);
}

fn apply_angular_impulse(b1: &mut SolverBody, b2: &mut SolverBody, impulse: Vec3) {
    b1.angular -= b1.inv_inertia * impulse;
    b2.angular += b2.inv_inertia * impulse;
}
