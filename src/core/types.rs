use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, orientation, and non-uniform scale of an entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
            ..Self::default()
        }
    }

    /// Builds a homogeneous matrix representation of the transform.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * other.position),
            rotation: (self.rotation * other.rotation).normalize(),
            scale: self.scale * other.scale,
        }
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * local)
    }

    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        (self.rotation.conjugate() * (world - self.position)) / self.scale
    }

    pub fn transform_vector(&self, local: Vec3) -> Vec3 {
        self.rotation * (self.scale * local)
    }

    pub fn inverse_transform_vector(&self, world: Vec3) -> Vec3 {
        (self.rotation.conjugate() * world) / self.scale
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Mass and local-space inertia tensor data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
        }
    }
}

/// Surface response coefficients of a body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Bounciness in `[0, 1]`.
    pub restitution: f32,
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Resistance against rolling at the contact patch.
    pub rolling_resistance: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            friction: 0.3,
            rolling_resistance: 0.0,
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            restitution: 0.8,
            friction: 1.0,
            rolling_resistance: 0.02,
        }
    }

    pub fn steel() -> Self {
        Self {
            restitution: 0.4,
            friction: 0.5,
            rolling_resistance: 0.01,
        }
    }

    pub fn ice() -> Self {
        Self {
            restitution: 0.05,
            friction: 0.03,
            rolling_resistance: 0.002,
        }
    }

    /// Pairwise coefficients consumed by the solver. All three blends are
    /// the linear average of the bodies' coefficients.
    pub fn mix(a: &Material, b: &Material) -> MixedMaterial {
        MixedMaterial {
            restitution: 0.5 * (a.restitution + b.restitution),
            friction: 0.5 * (a.friction + b.friction),
            rolling_resistance: 0.5 * (a.rolling_resistance + b.rolling_resistance),
        }
    }
}

/// Combined coefficients of a contact pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct MixedMaterial {
    pub restitution: f32,
    pub friction: f32,
    pub rolling_resistance: f32,
}

/// Helper constructors for common inertia tensors.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_point_round_trips_through_inverse() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.7),
            scale: Vec3::new(2.0, 1.0, 0.5),
        };
        let local = Vec3::new(-0.3, 0.9, 2.5);
        let world = transform.transform_point(local);
        let back = transform.inverse_transform_point(world);
        assert!((back - local).length() < 1e-5);
    }

    #[test]
    fn material_mix_is_the_average_of_both_bodies() {
        let a = Material {
            restitution: 0.2,
            friction: 0.8,
            rolling_resistance: 0.04,
        };
        let b = Material {
            restitution: 0.6,
            friction: 0.2,
            rolling_resistance: 0.0,
        };
        let mixed = Material::mix(&a, &b);
        assert!((mixed.restitution - 0.4).abs() < 1e-6);
        assert!((mixed.friction - 0.5).abs() < 1e-6);
        assert!((mixed.rolling_resistance - 0.02).abs() < 1e-6);
    }

    #[test]
    fn box_inertia_matches_known_unit_cube_value() {
        let inertia = Mat3::for_solid_box(Vec3::splat(0.5), 6.0);
        // 6 kg cube with 1 m sides: I = m/12 * (1 + 1) = 1 on each axis.
        assert!((inertia.x_axis.x - 1.0).abs() < 1e-5);
        assert!((inertia.y_axis.y - 1.0).abs() < 1e-5);
        assert!((inertia.z_axis.z - 1.0).abs() < 1e-5);
    }
}
