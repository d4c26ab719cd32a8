//! Joint constraints: ball-and-socket, hinge, slider, and fixed.
//!
//! Every joint exposes the same four steps to the island solver:
//! `initialize` caches world-space arms and effective masses for the step,
//! `warm_start` replays last step's impulses, `solve_velocity` runs inside
//! the velocity iterations, and `solve_position` corrects drift directly on
//! the poses during the optional position-correction pass.

use glam::{Mat2, Mat3, Quat, Vec2, Vec3};

use crate::utils::allocator::EntityId;
use crate::utils::math::{integrate_orientation, skew, tangent_basis};

/// Velocity-level motor on a hinge or slider degree of freedom.
#[derive(Debug, Clone, Copy)]
pub struct JointMotor {
    /// Target relative velocity (rad/s for hinges, m/s for sliders).
    pub target_velocity: f32,
    /// Maximum force/torque the motor may exert.
    pub max_force: f32,
}

/// Host-facing joint descriptions. Anchors and axes are world-space at
/// creation time and internalized to body-local frames.
#[derive(Debug, Clone, Copy)]
pub enum JointParams {
    BallSocket {
        anchor: Vec3,
    },
    Hinge {
        anchor: Vec3,
        axis: Vec3,
        /// Lower/upper angle limits in radians around the hinge axis.
        limits: Option<(f32, f32)>,
        motor: Option<JointMotor>,
    },
    Slider {
        anchor: Vec3,
        axis: Vec3,
        /// Lower/upper translation limits along the axis.
        limits: Option<(f32, f32)>,
        motor: Option<JointMotor>,
    },
    Fixed {
        anchor: Vec3,
    },
}

/// Snapshot of one body the joint math operates on. Velocities are
/// read-modify-write; the pose fields are written only by
/// `solve_position`.
#[derive(Debug, Clone, Copy)]
pub struct JointBody {
    pub linear: Vec3,
    pub angular: Vec3,
    pub position: Vec3,
    pub rotation: Quat,
    pub inv_mass: f32,
    pub inv_inertia: Mat3,
}

impl JointBody {
    fn apply_impulse(&mut self, impulse: Vec3, arm: Vec3) {
        self.linear += impulse * self.inv_mass;
        self.angular += self.inv_inertia * arm.cross(impulse);
    }

    fn apply_angular_impulse(&mut self, impulse: Vec3) {
        self.angular += self.inv_inertia * impulse;
    }

    fn apply_positional_impulse(&mut self, impulse: Vec3, arm: Vec3) {
        self.position += impulse * self.inv_mass;
        let rotation_delta = self.inv_inertia * arm.cross(impulse);
        self.rotation = integrate_orientation(self.rotation, rotation_delta, 1.0);
    }

    fn apply_positional_twist(&mut self, impulse: Vec3) {
        let rotation_delta = self.inv_inertia * impulse;
        self.rotation = integrate_orientation(self.rotation, rotation_delta, 1.0);
    }
}

/// A constraint between two bodies.
#[derive(Debug, Clone)]
pub struct Joint {
    pub id: EntityId,
    pub body1: EntityId,
    pub body2: EntityId,
    pub(crate) kind: JointKind,
}

impl Joint {
    /// Builds a joint from world-space parameters and the two bodies'
    /// current poses.
    pub(crate) fn new(
        body1: EntityId,
        body2: EntityId,
        params: JointParams,
        pose1: (Vec3, Quat),
        pose2: (Vec3, Quat),
    ) -> Self {
        let to_local1 = |world: Vec3| pose1.1.conjugate() * (world - pose1.0);
        let to_local2 = |world: Vec3| pose2.1.conjugate() * (world - pose2.0);
        let reference = pose1.1.conjugate() * pose2.1;

        let kind = match params {
            JointParams::BallSocket { anchor } => JointKind::BallSocket(BallSocketJoint {
                local_anchor1: to_local1(anchor),
                local_anchor2: to_local2(anchor),
                ..BallSocketJoint::default()
            }),
            JointParams::Fixed { anchor } => JointKind::Fixed(FixedJoint {
                point: BallSocketJoint {
                    local_anchor1: to_local1(anchor),
                    local_anchor2: to_local2(anchor),
                    ..BallSocketJoint::default()
                },
                reference,
                ..FixedJoint::default()
            }),
            JointParams::Hinge {
                anchor,
                axis,
                limits,
                motor,
            } => JointKind::Hinge(HingeJoint {
                point: BallSocketJoint {
                    local_anchor1: to_local1(anchor),
                    local_anchor2: to_local2(anchor),
                    ..BallSocketJoint::default()
                },
                local_axis1: (pose1.1.conjugate() * axis).normalize(),
                reference,
                limits,
                motor,
                ..HingeJoint::default()
            }),
            JointParams::Slider {
                anchor,
                axis,
                limits,
                motor,
            } => JointKind::Slider(SliderJoint {
                local_anchor1: to_local1(anchor),
                local_anchor2: to_local2(anchor),
                local_axis1: (pose1.1.conjugate() * axis).normalize(),
                reference,
                limits,
                motor,
                ..SliderJoint::default()
            }),
        };

        Self {
            id: EntityId::NULL,
            body1,
            body2,
            kind,
        }
    }

    pub(crate) fn initialize(&mut self, b1: &JointBody, b2: &JointBody, dt: f32, baumgarte: f32) {
        match &mut self.kind {
            JointKind::BallSocket(j) => j.initialize(b1, b2, dt, baumgarte),
            JointKind::Fixed(j) => j.initialize(b1, b2, dt, baumgarte),
            JointKind::Hinge(j) => j.initialize(b1, b2, dt, baumgarte),
            JointKind::Slider(j) => j.initialize(b1, b2, dt, baumgarte),
        }
    }

    pub(crate) fn warm_start(&self, b1: &mut JointBody, b2: &mut JointBody) {
        match &self.kind {
            JointKind::BallSocket(j) => j.warm_start(b1, b2),
            JointKind::Fixed(j) => j.warm_start(b1, b2),
            JointKind::Hinge(j) => j.warm_start(b1, b2),
            JointKind::Slider(j) => j.warm_start(b1, b2),
        }
    }

    pub(crate) fn solve_velocity(&mut self, b1: &mut JointBody, b2: &mut JointBody, dt: f32) {
        match &mut self.kind {
            JointKind::BallSocket(j) => j.solve_velocity(b1, b2),
            JointKind::Fixed(j) => j.solve_velocity(b1, b2),
            JointKind::Hinge(j) => j.solve_velocity(b1, b2, dt),
            JointKind::Slider(j) => j.solve_velocity(b1, b2, dt),
        }
    }

    pub(crate) fn solve_position(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        match &mut self.kind {
            JointKind::BallSocket(j) => j.solve_position(b1, b2),
            JointKind::Fixed(j) => j.solve_position(b1, b2),
            JointKind::Hinge(j) => j.solve_position(b1, b2),
            JointKind::Slider(j) => j.solve_position(b1, b2),
        }
    }

    /// Clears warm-start state, e.g. when a body is teleported.
    pub fn reset_impulses(&mut self) {
        match &mut self.kind {
            JointKind::BallSocket(j) => j.impulse = Vec3::ZERO,
            JointKind::Fixed(j) => {
                j.point.impulse = Vec3::ZERO;
                j.rotation_impulse = Vec3::ZERO;
            }
            JointKind::Hinge(j) => {
                j.point.impulse = Vec3::ZERO;
                j.rotation_impulse = Vec2::ZERO;
                j.motor_impulse = 0.0;
                j.lower_impulse = 0.0;
                j.upper_impulse = 0.0;
            }
            JointKind::Slider(j) => {
                j.translation_impulse = Vec2::ZERO;
                j.rotation_impulse = Vec3::ZERO;
                j.motor_impulse = 0.0;
                j.lower_impulse = 0.0;
                j.upper_impulse = 0.0;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum JointKind {
    BallSocket(BallSocketJoint),
    Hinge(HingeJoint),
    Slider(SliderJoint),
    Fixed(FixedJoint),
}

/// Point effective mass: `(m1 + m2)·I + skew(r1)·I1·skew(r1)ᵀ + ...`,
/// inverted. Singular configurations collapse to zero response.
fn point_mass_matrix(b1: &JointBody, b2: &JointBody, r1: Vec3, r2: Vec3) -> Mat3 {
    let s1 = skew(r1);
    let s2 = skew(r2);
    let k = Mat3::from_diagonal(Vec3::splat(b1.inv_mass + b2.inv_mass))
        + s1 * b1.inv_inertia * s1.transpose()
        + s2 * b2.inv_inertia * s2.transpose();
    if k.determinant().abs() < 1.0e-12 {
        Mat3::ZERO
    } else {
        k.inverse()
    }
}

fn rotation_mass_matrix(b1: &JointBody, b2: &JointBody) -> Mat3 {
    let k = b1.inv_inertia + b2.inv_inertia;
    if k.determinant().abs() < 1.0e-12 {
        Mat3::ZERO
    } else {
        k.inverse()
    }
}

/// Small-angle orientation error of body 2 relative to its target frame.
fn orientation_error(q1: Quat, q2: Quat, reference: Quat) -> Vec3 {
    let target = (q1 * reference).normalize();
    let mut delta = q2 * target.conjugate();
    if delta.w < 0.0 {
        delta = -delta;
    }
    2.0 * Vec3::new(delta.x, delta.y, delta.z)
}

/// Scalar effective mass for an axis constraint applied at two arms.
fn axis_mass(b1: &JointBody, b2: &JointBody, r1: Vec3, r2: Vec3, axis: Vec3) -> f32 {
    let rn1 = r1.cross(axis);
    let rn2 = r2.cross(axis);
    let k = b1.inv_mass
        + b2.inv_mass
        + rn1.dot(b1.inv_inertia * rn1)
        + rn2.dot(b2.inv_inertia * rn2);
    if k > 1.0e-9 {
        1.0 / k
    } else {
        0.0
    }
}

fn angular_axis_mass(b1: &JointBody, b2: &JointBody, axis: Vec3) -> f32 {
    let k = axis.dot(b1.inv_inertia * axis) + axis.dot(b2.inv_inertia * axis);
    if k > 1.0e-9 {
        1.0 / k
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BallSocketJoint {
    local_anchor1: Vec3,
    local_anchor2: Vec3,
    impulse: Vec3,
    // Per-step cache.
    r1: Vec3,
    r2: Vec3,
    inv_mass_matrix: Mat3,
    bias: Vec3,
}

impl BallSocketJoint {
    fn initialize(&mut self, b1: &JointBody, b2: &JointBody, dt: f32, baumgarte: f32) {
        self.r1 = b1.rotation * self.local_anchor1;
        self.r2 = b2.rotation * self.local_anchor2;
        self.inv_mass_matrix = point_mass_matrix(b1, b2, self.r1, self.r2);
        let error = b2.position + self.r2 - b1.position - self.r1;
        self.bias = error * (baumgarte / dt);
    }

    fn warm_start(&self, b1: &mut JointBody, b2: &mut JointBody) {
        b1.apply_impulse(-self.impulse, self.r1);
        b2.apply_impulse(self.impulse, self.r2);
    }

    fn solve_velocity(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let jv = b2.linear + b2.angular.cross(self.r2) - b1.linear - b1.angular.cross(self.r1);
        let lambda = self.inv_mass_matrix * -(jv + self.bias);
        self.impulse += lambda;
        b1.apply_impulse(-lambda, self.r1);
        b2.apply_impulse(lambda, self.r2);
    }

    fn solve_position(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let r1 = b1.rotation * self.local_anchor1;
        let r2 = b2.rotation * self.local_anchor2;
        let error = b2.position + r2 - b1.position - r1;
        let lambda = point_mass_matrix(b1, b2, r1, r2) * -error;
        b1.apply_positional_impulse(-lambda, r1);
        b2.apply_positional_impulse(lambda, r2);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FixedJoint {
    point: BallSocketJoint,
    reference: Quat,
    rotation_impulse: Vec3,
    inv_rotation_mass: Mat3,
    rotation_bias: Vec3,
}

impl FixedJoint {
    fn initialize(&mut self, b1: &JointBody, b2: &JointBody, dt: f32, baumgarte: f32) {
        self.point.initialize(b1, b2, dt, baumgarte);
        self.inv_rotation_mass = rotation_mass_matrix(b1, b2);
        self.rotation_bias =
            orientation_error(b1.rotation, b2.rotation, self.reference) * (baumgarte / dt);
    }

    fn warm_start(&self, b1: &mut JointBody, b2: &mut JointBody) {
        self.point.warm_start(b1, b2);
        b1.apply_angular_impulse(-self.rotation_impulse);
        b2.apply_angular_impulse(self.rotation_impulse);
    }

    fn solve_velocity(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let jv = b2.angular - b1.angular;
        let lambda = self.inv_rotation_mass * -(jv + self.rotation_bias);
        self.rotation_impulse += lambda;
        b1.apply_angular_impulse(-lambda);
        b2.apply_angular_impulse(lambda);

        self.point.solve_velocity(b1, b2);
    }

    fn solve_position(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let error = orientation_error(b1.rotation, b2.rotation, self.reference);
        let lambda = rotation_mass_matrix(b1, b2) * -error;
        b1.apply_positional_twist(-lambda);
        b2.apply_positional_twist(lambda);

        self.point.solve_position(b1, b2);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HingeJoint {
    point: BallSocketJoint,
    local_axis1: Vec3,
    reference: Quat,
    limits: Option<(f32, f32)>,
    motor: Option<JointMotor>,

    rotation_impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    // Per-step cache.
    world_axis: Vec3,
    tangent1: Vec3,
    tangent2: Vec3,
    inv_rotation_mass: Mat2,
    rotation_bias: Vec2,
    axis_mass: f32,
    angle: f32,
    lower_active: bool,
    upper_active: bool,
    lower_bias: f32,
    upper_bias: f32,
    max_motor_impulse: f32,
}

/// Window within which a limit constraint arms, so it only ever removes
/// velocity heading into the stop.
const LIMIT_WINDOW: f32 = 0.01;

impl HingeJoint {
    fn initialize(&mut self, b1: &JointBody, b2: &JointBody, dt: f32, baumgarte: f32) {
        self.point.initialize(b1, b2, dt, baumgarte);

        self.world_axis = (b1.rotation * self.local_axis1).normalize_or_zero();
        let (t1, t2) = tangent_basis(self.world_axis);
        self.tangent1 = t1;
        self.tangent2 = t2;

        // 2x2 effective mass of the two locked rotational directions.
        let sum_inertia = b1.inv_inertia + b2.inv_inertia;
        let k = Mat2::from_cols(
            Vec2::new(t1.dot(sum_inertia * t1), t2.dot(sum_inertia * t1)),
            Vec2::new(t1.dot(sum_inertia * t2), t2.dot(sum_inertia * t2)),
        );
        self.inv_rotation_mass = if k.determinant().abs() > 1.0e-12 {
            k.inverse()
        } else {
            Mat2::ZERO
        };

        // Misalignment of the two hinge axes as a small rotation vector.
        let axis2 = b2.rotation * (self.reference.conjugate() * self.local_axis1);
        let error = self.world_axis.cross(axis2);
        self.rotation_bias = Vec2::new(error.dot(t1), error.dot(t2)) * (baumgarte / dt);

        self.axis_mass = angular_axis_mass(b1, b2, self.world_axis);
        self.angle = self.current_angle(b1.rotation, b2.rotation);

        if let Some((lower, upper)) = self.limits {
            self.lower_active = self.angle - lower < LIMIT_WINDOW;
            self.upper_active = upper - self.angle < LIMIT_WINDOW;
            self.lower_bias = (self.angle - lower).min(0.0) * (baumgarte / dt);
            self.upper_bias = (upper - self.angle).min(0.0) * (baumgarte / dt);
        }
        if !self.lower_active {
            self.lower_impulse = 0.0;
        }
        if !self.upper_active {
            self.upper_impulse = 0.0;
        }
        self.max_motor_impulse = self
            .motor
            .map(|m| m.max_force * dt)
            .unwrap_or(0.0);
    }

    fn current_angle(&self, q1: Quat, q2: Quat) -> f32 {
        let relative = q1.conjugate() * q2;
        let mut delta = relative * self.reference.conjugate();
        if delta.w < 0.0 {
            delta = -delta;
        }
        let projection = Vec3::new(delta.x, delta.y, delta.z).dot(self.local_axis1);
        2.0 * projection.atan2(delta.w)
    }

    fn warm_start(&self, b1: &mut JointBody, b2: &mut JointBody) {
        self.point.warm_start(b1, b2);
        let torque = self.tangent1 * self.rotation_impulse.x
            + self.tangent2 * self.rotation_impulse.y
            + self.world_axis * (self.motor_impulse + self.lower_impulse - self.upper_impulse);
        b1.apply_angular_impulse(-torque);
        b2.apply_angular_impulse(torque);
    }

    fn solve_velocity(&mut self, b1: &mut JointBody, b2: &mut JointBody, _dt: f32) {
        let axis = self.world_axis;

        if let Some(motor) = self.motor {
            let jv = axis.dot(b2.angular - b1.angular) - motor.target_velocity;
            let delta = -jv * self.axis_mass;
            let new_impulse =
                (self.motor_impulse + delta).clamp(-self.max_motor_impulse, self.max_motor_impulse);
            let applied = new_impulse - self.motor_impulse;
            self.motor_impulse = new_impulse;
            b1.apply_angular_impulse(-axis * applied);
            b2.apply_angular_impulse(axis * applied);
        }

        // Lower limit: keep angle - lower >= 0.
        if self.lower_active {
            let jv = axis.dot(b2.angular - b1.angular);
            let delta = -(jv + self.lower_bias) * self.axis_mass;
            let new_impulse = (self.lower_impulse + delta).max(0.0);
            let applied = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            b1.apply_angular_impulse(-axis * applied);
            b2.apply_angular_impulse(axis * applied);
        }

        // Upper limit: keep upper - angle >= 0.
        if self.upper_active {
            let jv = -axis.dot(b2.angular - b1.angular);
            let delta = -(jv + self.upper_bias) * self.axis_mass;
            let new_impulse = (self.upper_impulse + delta).max(0.0);
            let applied = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            b1.apply_angular_impulse(axis * applied);
            b2.apply_angular_impulse(-axis * applied);
        }

        // Two rotational directions locked perpendicular to the axis.
        let relative = b2.angular - b1.angular;
        let jv = Vec2::new(self.tangent1.dot(relative), self.tangent2.dot(relative));
        let lambda = self.inv_rotation_mass * -(jv + self.rotation_bias);
        self.rotation_impulse += lambda;
        let torque = self.tangent1 * lambda.x + self.tangent2 * lambda.y;
        b1.apply_angular_impulse(-torque);
        b2.apply_angular_impulse(torque);

        self.point.solve_velocity(b1, b2);
    }

    fn solve_position(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let axis1 = (b1.rotation * self.local_axis1).normalize_or_zero();
        let axis2 = b2.rotation * (self.reference.conjugate() * self.local_axis1);
        let error = axis1.cross(axis2);
        let lambda = rotation_mass_matrix(b1, b2) * -error;
        // Keep only the component perpendicular to the hinge axis so the
        // free rotation is not disturbed.
        let lambda = lambda - axis1 * lambda.dot(axis1);
        b1.apply_positional_twist(-lambda);
        b2.apply_positional_twist(lambda);

        self.point.solve_position(b1, b2);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SliderJoint {
    local_anchor1: Vec3,
    local_anchor2: Vec3,
    local_axis1: Vec3,
    reference: Quat,
    limits: Option<(f32, f32)>,
    motor: Option<JointMotor>,

    translation_impulse: Vec2,
    rotation_impulse: Vec3,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    // Per-step cache.
    r1: Vec3,
    r2: Vec3,
    world_axis: Vec3,
    tangent1: Vec3,
    tangent2: Vec3,
    tangent1_mass: f32,
    tangent2_mass: f32,
    axis_mass: f32,
    inv_rotation_mass: Mat3,
    rotation_bias: Vec3,
    translation_bias: Vec2,
    translation: f32,
    lower_active: bool,
    upper_active: bool,
    lower_bias: f32,
    upper_bias: f32,
    max_motor_impulse: f32,
}

impl SliderJoint {
    fn initialize(&mut self, b1: &JointBody, b2: &JointBody, dt: f32, baumgarte: f32) {
        self.r1 = b1.rotation * self.local_anchor1;
        self.r2 = b2.rotation * self.local_anchor2;
        self.world_axis = (b1.rotation * self.local_axis1).normalize_or_zero();
        let (t1, t2) = tangent_basis(self.world_axis);
        self.tangent1 = t1;
        self.tangent2 = t2;

        let offset = b2.position + self.r2 - b1.position - self.r1;
        self.translation = offset.dot(self.world_axis);

        self.tangent1_mass = axis_mass(b1, b2, self.r1, self.r2, t1);
        self.tangent2_mass = axis_mass(b1, b2, self.r1, self.r2, t2);
        self.axis_mass = axis_mass(b1, b2, self.r1, self.r2, self.world_axis);
        self.inv_rotation_mass = rotation_mass_matrix(b1, b2);

        self.translation_bias =
            Vec2::new(offset.dot(t1), offset.dot(t2)) * (baumgarte / dt);
        self.rotation_bias =
            orientation_error(b1.rotation, b2.rotation, self.reference) * (baumgarte / dt);

        if let Some((lower, upper)) = self.limits {
            self.lower_active = self.translation - lower < LIMIT_WINDOW;
            self.upper_active = upper - self.translation < LIMIT_WINDOW;
            self.lower_bias = (self.translation - lower).min(0.0) * (baumgarte / dt);
            self.upper_bias = (upper - self.translation).min(0.0) * (baumgarte / dt);
        }
        if !self.lower_active {
            self.lower_impulse = 0.0;
        }
        if !self.upper_active {
            self.upper_impulse = 0.0;
        }
        self.max_motor_impulse = self.motor.map(|m| m.max_force * dt).unwrap_or(0.0);
    }

    fn warm_start(&self, b1: &mut JointBody, b2: &mut JointBody) {
        let impulse = self.tangent1 * self.translation_impulse.x
            + self.tangent2 * self.translation_impulse.y
            + self.world_axis * (self.motor_impulse + self.lower_impulse - self.upper_impulse);
        b1.apply_impulse(-impulse, self.r1);
        b2.apply_impulse(impulse, self.r2);

        b1.apply_angular_impulse(-self.rotation_impulse);
        b2.apply_angular_impulse(self.rotation_impulse);
    }

    fn relative_anchor_velocity(&self, b1: &JointBody, b2: &JointBody) -> Vec3 {
        b2.linear + b2.angular.cross(self.r2) - b1.linear - b1.angular.cross(self.r1)
    }

    fn solve_velocity(&mut self, b1: &mut JointBody, b2: &mut JointBody, _dt: f32) {
        let axis = self.world_axis;

        if let Some(motor) = self.motor {
            let jv = axis.dot(b2.linear - b1.linear) - motor.target_velocity;
            let delta = -jv * self.axis_mass;
            let new_impulse =
                (self.motor_impulse + delta).clamp(-self.max_motor_impulse, self.max_motor_impulse);
            let applied = new_impulse - self.motor_impulse;
            self.motor_impulse = new_impulse;
            b1.apply_impulse(-axis * applied, self.r1);
            b2.apply_impulse(axis * applied, self.r2);
        }

        if self.lower_active {
            let jv = axis.dot(self.relative_anchor_velocity(b1, b2));
            let delta = -(jv + self.lower_bias) * self.axis_mass;
            let new_impulse = (self.lower_impulse + delta).max(0.0);
            let applied = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            b1.apply_impulse(-axis * applied, self.r1);
            b2.apply_impulse(axis * applied, self.r2);
        }

        if self.upper_active {
            let jv = -axis.dot(self.relative_anchor_velocity(b1, b2));
            let delta = -(jv + self.upper_bias) * self.axis_mass;
            let new_impulse = (self.upper_impulse + delta).max(0.0);
            let applied = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            b1.apply_impulse(axis * applied, self.r1);
            b2.apply_impulse(-axis * applied, self.r2);
        }

        // Rotation fully locked.
        let jv_rot = b2.angular - b1.angular;
        let lambda_rot = self.inv_rotation_mass * -(jv_rot + self.rotation_bias);
        self.rotation_impulse += lambda_rot;
        b1.apply_angular_impulse(-lambda_rot);
        b2.apply_angular_impulse(lambda_rot);

        // The two translation directions perpendicular to the axis,
        // relaxed one after the other.
        let jv = self.relative_anchor_velocity(b1, b2);
        let lambda1 = -(jv.dot(self.tangent1) + self.translation_bias.x) * self.tangent1_mass;
        self.translation_impulse.x += lambda1;
        let impulse = self.tangent1 * lambda1;
        b1.apply_impulse(-impulse, self.r1);
        b2.apply_impulse(impulse, self.r2);

        let jv = self.relative_anchor_velocity(b1, b2);
        let lambda2 = -(jv.dot(self.tangent2) + self.translation_bias.y) * self.tangent2_mass;
        self.translation_impulse.y += lambda2;
        let impulse = self.tangent2 * lambda2;
        b1.apply_impulse(-impulse, self.r1);
        b2.apply_impulse(impulse, self.r2);
    }

    fn solve_position(&mut self, b1: &mut JointBody, b2: &mut JointBody) {
        let error = orientation_error(b1.rotation, b2.rotation, self.reference);
        let lambda = rotation_mass_matrix(b1, b2) * -error;
        b1.apply_positional_twist(-lambda);
        b2.apply_positional_twist(lambda);

        let r1 = b1.rotation * self.local_anchor1;
        let r2 = b2.rotation * self.local_anchor2;
        let axis = (b1.rotation * self.local_axis1).normalize_or_zero();
        let offset = b2.position + r2 - b1.position - r1;
        let perpendicular = offset - axis * offset.dot(axis);
        let (t1, t2) = tangent_basis(axis);
        let m1 = axis_mass(b1, b2, r1, r2, t1);
        let m2 = axis_mass(b1, b2, r1, r2, t2);
        let correction = t1 * (-perpendicular.dot(t1) * m1) + t2 * (-perpendicular.dot(t2) * m2);
        b1.apply_positional_impulse(-correction, r1);
        b2.apply_positional_impulse(correction, r2);
    }
}
