//! Explicit integration of forces into velocities and velocities into
//! poses.

use glam::Vec3;

use crate::core::body::{BodyType, RigidBody};
use crate::utils::math::integrate_orientation;

/// Folds the accumulated forces, torques and gravity into the body's
/// velocities. Only dynamic, awake bodies integrate forces.
pub fn integrate_forces(body: &mut RigidBody, gravity: Vec3, dt: f32) {
    if !body.is_dynamic() || body.is_sleeping() {
        return;
    }

    let mut force = body.force_accumulator;
    if body.gravity_enabled {
        force += gravity * body.mass_properties.mass;
    }

    body.velocity.linear += force * body.inverse_mass * dt;
    body.velocity.angular += body.inverse_inertia_world() * body.torque_accumulator * dt;
}

/// Velocity damping: `v <- v * 1 / (1 + c * dt)`.
pub fn apply_damping(body: &mut RigidBody, dt: f32) {
    if !body.is_dynamic() || body.is_sleeping() {
        return;
    }
    body.velocity.linear *= 1.0 / (1.0 + body.linear_damping * dt);
    body.velocity.angular *= 1.0 / (1.0 + body.angular_damping * dt);
}

/// Integrates the pose from the post-solver velocities. Split-impulse
/// pseudo velocities participate in the pose update only and are consumed
/// here. Kinematic bodies move by their host-set velocities; static bodies
/// never move.
pub fn integrate_position(body: &mut RigidBody, dt: f32) {
    if body.body_type == BodyType::Static || body.is_sleeping() {
        return;
    }

    let linear = body.velocity.linear + body.split_linear;
    let angular = body.velocity.angular + body.split_angular;

    body.transform.position += linear * dt;
    body.transform.rotation = integrate_orientation(body.transform.rotation, angular, dt);

    body.split_linear = Vec3::ZERO;
    body.split_angular = Vec3::ZERO;
}
