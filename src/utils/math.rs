//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Integrates an orientation by an angular velocity over `dt`:
/// `q <- normalize(q + 0.5 * (w * dt) * q)`.
pub fn integrate_orientation(rotation: Quat, angular: Vec3, dt: f32) -> Quat {
    let omega = Quat::from_xyzw(angular.x, angular.y, angular.z, 0.0);
    let delta = (omega * rotation) * (0.5 * dt);
    (rotation + delta).normalize()
}

/// Builds two unit tangents spanning the plane orthogonal to `normal`,
/// with `t1 x t2 = normal`.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let reference = if normal.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    let t1 = normal.cross(reference).normalize();
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// Skew-symmetric cross-product matrix: `skew(v) * u == v.cross(u)`.
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Barycentric coordinates `(u, v, w)` of `p` with respect to triangle
/// `(a, b, c)`, so that `p = u*a + v*b + w*c`.
pub fn barycentric_coordinates(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-12 {
        return (1.0, 0.0, 0.0);
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

/// Inertia tensor for a solid capsule aligned along Y (`height` is the
/// cylindrical section length, excluding the caps).
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Mat3 {
    let r2 = radius * radius;
    let h2 = height * height;

    let cylinder_volume = std::f32::consts::PI * r2 * height;
    let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * r2 * radius;
    let total = (cylinder_volume + sphere_volume).max(1e-9);
    let cylinder_mass = mass * cylinder_volume / total;
    let hemisphere_mass = 0.5 * mass * sphere_volume / total;

    let lateral = cylinder_mass * (h2 / 12.0 + r2 / 4.0)
        + 2.0 * hemisphere_mass * (0.4 * r2 + 0.375 * height * radius + 0.25 * h2);
    let axial = cylinder_mass * r2 / 2.0 + 2.0 * hemisphere_mass * 0.4 * r2;

    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

/// Inertia tensor for a solid cylinder aligned along Y.
pub fn inertia_cylinder(radius: f32, height: f32, mass: f32) -> Mat3 {
    let r2 = radius * radius;
    let h2 = height * height;
    let lateral = mass * (3.0 * r2 + h2) / 12.0;
    let axial = mass * r2 / 2.0;
    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

/// Inertia tensor for a solid cone with its apex up the Y axis and base at
/// `-height/2`.
pub fn inertia_cone(radius: f32, height: f32, mass: f32) -> Mat3 {
    let r2 = radius * radius;
    let h2 = height * height;
    let lateral = mass * (3.0 / 20.0 * r2 + 3.0 / 80.0 * h2);
    let axial = 3.0 / 10.0 * mass * r2;
    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tangent_basis_is_orthonormal_and_right_handed() {
        for normal in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.3, -0.8, 0.5).normalize()] {
            let (t1, t2) = tangent_basis(normal);
            assert!((t1.length() - 1.0).abs() < 1e-5);
            assert!((t2.length() - 1.0).abs() < 1e-5);
            assert!(t1.dot(normal).abs() < 1e-5);
            assert!(t2.dot(normal).abs() < 1e-5);
            assert!((t1.cross(t2) - normal).length() < 1e-5);
        }
    }

    #[test]
    fn orientation_integration_matches_axis_angle_for_small_steps() {
        let omega = Vec3::new(0.0, 2.0, 0.0);
        let dt = 1.0 / 600.0;
        let integrated = integrate_orientation(Quat::IDENTITY, omega, dt);
        let exact = Quat::from_axis_angle(Vec3::Y, omega.length() * dt);
        assert!(integrated.dot(exact).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn barycentric_recovers_vertices_and_midpoints() {
        let a = Vec3::ZERO;
        let b = Vec3::X;
        let c = Vec3::Z;

        let (u, v, w) = barycentric_coordinates(a, b, c, b);
        assert!((u - 0.0).abs() < 1e-5 && (v - 1.0).abs() < 1e-5 && w.abs() < 1e-5);

        let mid = (a + b) * 0.5;
        let (u, v, w) = barycentric_coordinates(a, b, c, mid);
        assert!((u - 0.5).abs() < 1e-5 && (v - 0.5).abs() < 1e-5 && w.abs() < 1e-5);
    }

    #[test]
    fn skew_matrix_reproduces_cross_product() {
        let v = Vec3::new(1.0, -2.0, 3.0);
        let u = Vec3::new(-0.5, 0.25, 4.0);
        assert!((skew(v) * u - v.cross(u)).length() < 1e-6);
    }
}
