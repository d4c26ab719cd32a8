use glam::{Mat3, Quat, Vec3};

use crate::config::{DEFAULT_ANGULAR_DAMPING, DEFAULT_LINEAR_DAMPING};
use crate::error::{PhysicsError, PhysicsResult};
use crate::utils::allocator::EntityId;

use super::types::{MassProperties, Material, Transform, Velocity};

/// Motion model of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Never moves; infinite mass.
    Static,
    /// Moved by the host through velocity or pose; infinite mass to the
    /// solver.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Core rigid body storing kinematic state, mass data and material.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: EntityId,
    pub body_type: BodyType,
    pub transform: Transform,
    pub velocity: Velocity,
    pub mass_properties: MassProperties,
    pub material: Material,
    pub gravity_enabled: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,

    pub(crate) force_accumulator: Vec3,
    pub(crate) torque_accumulator: Vec3,
    pub(crate) inverse_mass: f32,
    pub(crate) inverse_inertia_local: Mat3,
    pub(crate) sleeping: bool,
    pub(crate) sleep_timer: f32,
    /// Split-impulse pseudo velocities, written by the solver and consumed
    /// by position integration.
    pub(crate) split_linear: Vec3,
    pub(crate) split_angular: Vec3,
    pub(crate) colliders: Vec<EntityId>,
    pub(crate) joints: Vec<EntityId>,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            id: EntityId::NULL,
            body_type: BodyType::Dynamic,
            transform: Transform::default(),
            velocity: Velocity::default(),
            mass_properties: MassProperties::default(),
            material: Material::default(),
            gravity_enabled: true,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            inverse_mass: 1.0,
            inverse_inertia_local: Mat3::IDENTITY,
            sleeping: false,
            sleep_timer: 0.0,
            split_linear: Vec3::ZERO,
            split_angular: Vec3::ZERO,
            colliders: Vec::new(),
            joints: Vec::new(),
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn builder() -> RigidBodyBuilder {
        RigidBodyBuilder::new()
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    /// Inverse inertia tensor rotated into world space:
    /// `R · I_local⁻¹ · Rᵀ`.
    pub fn inverse_inertia_world(&self) -> Mat3 {
        if !self.is_dynamic() {
            return Mat3::ZERO;
        }
        let rot = Mat3::from_quat(self.transform.rotation);
        rot * self.inverse_inertia_local * rot.transpose()
    }

    pub fn colliders(&self) -> &[EntityId] {
        &self.colliders
    }

    pub fn joints(&self) -> &[EntityId] {
        &self.joints
    }

    /// Applies a force through the center of mass for the next step.
    /// Wakes the body.
    pub fn apply_force(&mut self, force: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.force_accumulator += force;
        self.wake_up();
    }

    /// Applies a force at a world-space point, adding the induced torque.
    pub fn apply_force_at_point(&mut self, force: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.force_accumulator += force;
        self.torque_accumulator += (world_point - self.transform.position).cross(force);
        self.wake_up();
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.torque_accumulator += torque;
        self.wake_up();
    }

    /// Applies an instantaneous impulse at a world-space point.
    pub fn apply_impulse(&mut self, impulse: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity.linear += impulse * self.inverse_mass;
        let torque = (world_point - self.transform.position).cross(impulse);
        self.velocity.angular += self.inverse_inertia_world() * torque;
        self.wake_up();
    }

    /// Overwrites both velocities. Wakes the body and resets its sleep
    /// timer.
    pub fn set_velocity(&mut self, linear: Vec3, angular: Vec3) {
        self.velocity.linear = linear;
        self.velocity.angular = angular;
        self.wake_up();
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) -> PhysicsResult<()> {
        validate_mass_properties(&props)?;
        self.mass_properties = props;
        self.recompute_inverses();
        Ok(())
    }

    pub(crate) fn wake_up(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0.0;
    }

    pub(crate) fn fall_asleep(&mut self) {
        self.sleeping = true;
        self.velocity = Velocity::default();
        self.split_linear = Vec3::ZERO;
        self.split_angular = Vec3::ZERO;
        self.force_accumulator = Vec3::ZERO;
        self.torque_accumulator = Vec3::ZERO;
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force_accumulator = Vec3::ZERO;
        self.torque_accumulator = Vec3::ZERO;
    }

    pub(crate) fn recompute_inverses(&mut self) {
        if !self.is_dynamic() {
            self.inverse_mass = 0.0;
            self.inverse_inertia_local = Mat3::ZERO;
            return;
        }
        self.inverse_mass = if self.mass_properties.mass <= f32::EPSILON {
            0.0
        } else {
            1.0 / self.mass_properties.mass
        };
        let det = self.mass_properties.inertia.determinant();
        self.inverse_inertia_local = if det.abs() < f32::EPSILON {
            Mat3::ZERO
        } else {
            self.mass_properties.inertia.inverse()
        };
    }
}

fn validate_mass_properties(props: &MassProperties) -> PhysicsResult<()> {
    if !props.mass.is_finite() || props.mass < 0.0 {
        return Err(PhysicsError::InvalidParameter("mass must be finite and >= 0"));
    }
    if !props
        .inertia
        .to_cols_array()
        .iter()
        .all(|value| value.is_finite())
    {
        return Err(PhysicsError::InvalidParameter("inertia tensor must be finite"));
    }
    Ok(())
}

pub struct RigidBodyBuilder {
    body: RigidBody,
    error: Option<PhysicsError>,
}

impl Default for RigidBodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBodyBuilder {
    pub fn new() -> Self {
        Self {
            body: RigidBody::default(),
            error: None,
        }
    }

    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body.body_type = body_type;
        self.body.recompute_inverses();
        self
    }

    pub fn position(mut self, position: Vec3) -> Self {
        if !position.is_finite() {
            self.error = Some(PhysicsError::InvalidParameter("position must be finite"));
        }
        self.body.transform.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        if !rotation.is_finite() || rotation.length_squared() < f32::EPSILON {
            self.error = Some(PhysicsError::InvalidParameter("rotation must be finite"));
        } else {
            self.body.transform.rotation = rotation.normalize();
        }
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.body.mass_properties.mass = mass;
        if let Err(err) = validate_mass_properties(&self.body.mass_properties) {
            self.error = Some(err);
        }
        self.body.recompute_inverses();
        self
    }

    pub fn inertia(mut self, inertia: Mat3) -> Self {
        self.body.mass_properties.inertia = inertia;
        if let Err(err) = validate_mass_properties(&self.body.mass_properties) {
            self.error = Some(err);
        }
        self.body.recompute_inverses();
        self
    }

    pub fn velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.body.velocity = Velocity { linear, angular };
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.body.material = material;
        self
    }

    pub fn damping(mut self, linear: f32, angular: f32) -> Self {
        self.body.linear_damping = linear.max(0.0);
        self.body.angular_damping = angular.max(0.0);
        self
    }

    pub fn gravity_enabled(mut self, enabled: bool) -> Self {
        self.body.gravity_enabled = enabled;
        self
    }

    pub fn build(self) -> PhysicsResult<RigidBody> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_dynamic_bodies_have_zero_inverse_mass() {
        let body = RigidBody::builder()
            .body_type(BodyType::Static)
            .mass(10.0)
            .build()
            .unwrap();
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.inverse_inertia_world(), Mat3::ZERO);

        let dynamic = RigidBody::builder().mass(2.0).build().unwrap();
        assert!((dynamic.inverse_mass() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn builder_rejects_degenerate_mass() {
        assert!(RigidBody::builder().mass(-1.0).build().is_err());
        assert!(RigidBody::builder().mass(f32::NAN).build().is_err());
        assert!(RigidBody::builder()
            .inertia(Mat3::from_diagonal(Vec3::new(f32::INFINITY, 1.0, 1.0)))
            .build()
            .is_err());
    }

    #[test]
    fn impulse_at_offset_point_induces_spin() {
        let mut body = RigidBody::builder().mass(1.0).build().unwrap();
        body.apply_impulse(Vec3::Y, Vec3::new(1.0, 0.0, 0.0));
        assert!((body.velocity.linear.y - 1.0).abs() < 1e-6);
        assert!(body.velocity.angular.z > 0.0);
    }

    #[test]
    fn applying_force_wakes_a_sleeping_body() {
        let mut body = RigidBody::builder().mass(1.0).build().unwrap();
        body.fall_asleep();
        assert!(body.is_sleeping());
        body.apply_force(Vec3::X);
        assert!(!body.is_sleeping());
        assert_eq!(body.sleep_timer, 0.0);
    }
}
