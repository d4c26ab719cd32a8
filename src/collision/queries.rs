//! Ray casting against collider shapes and the query result types.

use glam::Vec3;

use crate::core::collider::ColliderShape;
use crate::core::types::Transform;
use crate::utils::allocator::EntityId;

use super::gjk::distance_point_convex;

/// A ray with a finite reach. `direction` is kept normalized so `distance`
/// values are world-space lengths.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
        }
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// One ray hit reported to query callbacks.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    pub body: EntityId,
    pub collider: EntityId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Hit distance and world normal of a ray against one shape.
pub fn raycast_shape(
    shape: &ColliderShape,
    transform: &Transform,
    ray: &Ray,
) -> Option<(f32, Vec3)> {
    match shape {
        ColliderShape::Sphere { radius } => {
            ray_sphere(ray, transform.position, radius * transform.scale.max_element())
        }
        ColliderShape::Box { half_extents } => ray_box(ray, transform, *half_extents),
        ColliderShape::Mesh { mesh } => {
            let (origin, direction) = ray_to_local(ray, transform);
            let (t, local_normal) = mesh.raycast_local(origin, direction, ray.max_distance)?;
            Some((t, local_normal_to_world(local_normal, transform)))
        }
        ColliderShape::HeightField { field } => {
            let (origin, direction) = ray_to_local(ray, transform);
            let (t, local_normal) = field.raycast_local(origin, direction, ray.max_distance)?;
            Some((t, local_normal_to_world(local_normal, transform)))
        }
        // Remaining convex shapes march along the ray using the GJK
        // point-shape distance as a safe step size.
        _ => ray_convex_march(shape, transform, ray),
    }
}

fn ray_to_local(ray: &Ray, transform: &Transform) -> (Vec3, Vec3) {
    (
        transform.inverse_transform_point(ray.origin),
        transform.inverse_transform_vector(ray.direction),
    )
}

fn local_normal_to_world(local_normal: Vec3, transform: &Transform) -> Vec3 {
    (transform.rotation * (local_normal / transform.scale)).normalize_or_zero()
}

fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let oc = ray.origin - center;
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) * 0.5;
    if t < 0.0 || t > ray.max_distance {
        return None;
    }
    let normal = (ray.point_at(t) - center).normalize_or_zero();
    Some((t, normal))
}

fn ray_box(ray: &Ray, transform: &Transform, half_extents: Vec3) -> Option<(f32, Vec3)> {
    // Rotation preserves length, so the local parameter is the world
    // distance; scale folds into the extents.
    let rotation_inv = transform.rotation.conjugate();
    let origin = rotation_inv * (ray.origin - transform.position);
    let direction = rotation_inv * ray.direction;
    let extents = half_extents * transform.scale;

    let mut t_min = 0.0f32;
    let mut t_max = ray.max_distance;
    let mut normal = -direction.normalize_or_zero();

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1e-9 {
            if o.abs() > extents[axis] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t1 = (-extents[axis] - o) * inv;
        let mut t2 = (extents[axis] - o) * inv;
        let mut axis_normal = Vec3::ZERO;
        axis_normal[axis] = -d.signum();
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > t_min {
            t_min = t1;
            normal = axis_normal;
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }

    Some((t_min, transform.rotation * normal))
}

/// Conservative advancement: at distance `d` from the shape, the ray can
/// safely advance by `d`. Terminates either on the surface or past
/// `max_distance`.
fn ray_convex_march(
    shape: &ColliderShape,
    transform: &Transform,
    ray: &Ray,
) -> Option<(f32, Vec3)> {
    const SURFACE_EPSILON: f32 = 1.0e-4;
    const MAX_STEPS: u32 = 64;

    let mut t = 0.0f32;
    let mut previous: Option<(Vec3, Vec3)> = None;

    for _ in 0..MAX_STEPS {
        let probe = ray.point_at(t);
        let (distance, closest) = distance_point_convex(shape, transform, probe);

        if distance < SURFACE_EPSILON {
            let normal = match previous {
                Some((prev_probe, prev_closest)) => {
                    (prev_probe - prev_closest).normalize_or_zero()
                }
                // Started on or inside the surface.
                None => -ray.direction,
            };
            return Some((t, normal));
        }

        previous = Some((probe, closest));
        t += distance;
        if t > ray.max_distance {
            return None;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn ray_hits_sphere_surface_exactly() {
        let shape = ColliderShape::Sphere { radius: 1.0 };
        let transform = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 10.0);

        let (t, normal) = raycast_shape(&shape, &transform, &ray).expect("hit");
        assert!((t - 2.0).abs() < 1e-4);
        assert!(normal.x < -0.999);
    }

    #[test]
    fn ray_misses_offset_sphere() {
        let shape = ColliderShape::Sphere { radius: 1.0 };
        let transform = Transform::from_position(Vec3::new(2.0, 3.0, 0.0));
        let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 10.0);
        assert!(raycast_shape(&shape, &transform, &ray).is_none());
    }

    #[test]
    fn ray_reports_rotated_box_face_normal() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let transform = Transform::from_position_rotation(
            Vec3::new(5.0, 0.0, 0.0),
            Quat::from_rotation_y(30f32.to_radians()),
        );
        let ray = Ray::new(Vec3::ZERO, Vec3::X, 10.0);

        let (t, normal) = raycast_shape(&shape, &transform, &ray).expect("hit");
        assert!(t > 3.0 && t < 5.0);
        assert!(normal.x < -0.5, "normal {normal:?} should face the ray");
    }

    #[test]
    fn convex_march_finds_the_capsule_wall() {
        let shape = ColliderShape::Capsule {
            radius: 0.5,
            height: 2.0,
        };
        let transform = Transform::from_position(Vec3::new(3.0, 0.0, 0.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::X, 10.0);

        let (t, normal) = raycast_shape(&shape, &transform, &ray).expect("hit");
        assert!((t - 2.5).abs() < 5e-3, "t was {t}");
        assert!(normal.x < -0.9);
    }

    #[test]
    fn convex_march_respects_max_distance() {
        let shape = ColliderShape::Cylinder {
            radius: 0.5,
            height: 2.0,
        };
        let transform = Transform::from_position(Vec3::new(50.0, 0.0, 0.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::X, 10.0);
        assert!(raycast_shape(&shape, &transform, &ray).is_none());
    }
}
