use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::aabb::Aabb;
use crate::utils::allocator::EntityId;
use crate::utils::math::{inertia_capsule, inertia_cone, inertia_cylinder};

use super::mesh::{HeightField, TriangleMesh};
use super::types::{InertiaTensorExt, MassProperties, Transform};

/// Enumeration of supported collider geometries. Convex variants carry
/// their data inline; concave variants own their cooked acceleration
/// structures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Capsule along local Y; `height` is the cylindrical section length.
    Capsule { radius: f32, height: f32 },
    /// Cone along local Y with the apex at `+height/2`.
    Cone { radius: f32, height: f32 },
    /// Cylinder along local Y.
    Cylinder { radius: f32, height: f32 },
    ConvexHull { vertices: Vec<Vec3> },
    Mesh { mesh: TriangleMesh },
    HeightField { field: HeightField },
}

impl ColliderShape {
    pub fn is_convex(&self) -> bool {
        !matches!(self, ColliderShape::Mesh { .. } | ColliderShape::HeightField { .. })
    }

    /// Farthest point of the unscaled shape along `direction`, local space.
    /// Only meaningful for convex variants.
    pub fn local_support(&self, direction: Vec3) -> Vec3 {
        let dir = direction.normalize_or_zero();
        let dir = if dir == Vec3::ZERO { Vec3::X } else { dir };

        match self {
            ColliderShape::Sphere { radius } => dir * *radius,
            ColliderShape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            ),
            ColliderShape::Capsule { radius, height } => {
                Vec3::new(0.0, (0.5 * height).copysign(dir.y), 0.0) + dir * *radius
            }
            ColliderShape::Cone { radius, height } => {
                let half = 0.5 * height;
                let sin_apex = radius / (radius * radius + height * height).sqrt();
                if dir.y >= sin_apex {
                    Vec3::new(0.0, half, 0.0)
                } else {
                    let lateral = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero();
                    if lateral == Vec3::ZERO {
                        Vec3::new(*radius, -half, 0.0)
                    } else {
                        lateral * *radius + Vec3::new(0.0, -half, 0.0)
                    }
                }
            }
            ColliderShape::Cylinder { radius, height } => {
                let lateral = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero();
                lateral * *radius + Vec3::new(0.0, (0.5 * height).copysign(dir.y), 0.0)
            }
            ColliderShape::ConvexHull { vertices } => vertices
                .iter()
                .copied()
                .max_by(|a, b| {
                    a.dot(dir)
                        .partial_cmp(&b.dot(dir))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(Vec3::ZERO),
            ColliderShape::Mesh { .. } | ColliderShape::HeightField { .. } => Vec3::ZERO,
        }
    }

    /// World-space AABB of the shape under `transform`.
    pub fn aabb(&self, transform: &Transform) -> Aabb {
        match self {
            ColliderShape::Mesh { mesh } => transformed_bounds(&mesh.bounds, transform),
            ColliderShape::HeightField { field } => {
                transformed_bounds(&field.local_bounds(), transform)
            }
            _ => {
                // Support-based bounds are exact for every convex variant,
                // non-uniform scale included.
                let convex = WorldConvex::new(self, transform);
                let mut bounds = Aabb::empty();
                for dir in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
                    bounds.extend(convex.world_support(dir));
                }
                bounds
            }
        }
    }

    /// Point containment test in world space. Concave shapes are treated as
    /// open surfaces and always report `false`.
    pub fn point_inside(&self, transform: &Transform, world_point: Vec3) -> bool {
        let p = transform.inverse_transform_point(world_point);
        match self {
            ColliderShape::Sphere { radius } => p.length_squared() <= radius * radius,
            ColliderShape::Box { half_extents } => {
                p.x.abs() <= half_extents.x
                    && p.y.abs() <= half_extents.y
                    && p.z.abs() <= half_extents.z
            }
            ColliderShape::Capsule { radius, height } => {
                let half = 0.5 * height;
                let clamped = Vec3::new(0.0, p.y.clamp(-half, half), 0.0);
                (p - clamped).length_squared() <= radius * radius
            }
            ColliderShape::Cone { radius, height } => {
                let half = 0.5 * height;
                if p.y < -half || p.y > half {
                    return false;
                }
                let allowed = radius * (half - p.y) / height;
                p.x * p.x + p.z * p.z <= allowed * allowed
            }
            ColliderShape::Cylinder { radius, height } => {
                p.y.abs() <= 0.5 * height && p.x * p.x + p.z * p.z <= radius * radius
            }
            ColliderShape::ConvexHull { .. } => {
                crate::collision::gjk::point_inside_convex(self, transform, world_point)
            }
            ColliderShape::Mesh { .. } | ColliderShape::HeightField { .. } => false,
        }
    }

    /// Mass properties for the shape given a total mass.
    pub fn mass_properties(&self, mass: f32) -> MassProperties {
        let inertia = match self {
            ColliderShape::Sphere { radius } => Mat3::for_solid_sphere(*radius, mass),
            ColliderShape::Box { half_extents } => Mat3::for_solid_box(*half_extents, mass),
            ColliderShape::Capsule { radius, height } => inertia_capsule(*radius, *height, mass),
            ColliderShape::Cone { radius, height } => inertia_cone(*radius, *height, mass),
            ColliderShape::Cylinder { radius, height } => inertia_cylinder(*radius, *height, mass),
            ColliderShape::ConvexHull { vertices } => {
                let bounds = Aabb::from_points(vertices);
                Mat3::for_solid_box(bounds.extent(), mass)
            }
            ColliderShape::Mesh { mesh } => Mat3::for_solid_box(mesh.bounds.extent(), mass),
            ColliderShape::HeightField { field } => {
                Mat3::for_solid_box(field.local_bounds().extent(), mass)
            }
        };
        MassProperties { mass, inertia }
    }
}

fn transformed_bounds(local: &Aabb, transform: &Transform) -> Aabb {
    let mut bounds = Aabb::empty();
    for i in 0..8 {
        let corner = Vec3::new(
            if i & 1 == 0 { local.min.x } else { local.max.x },
            if i & 2 == 0 { local.min.y } else { local.max.y },
            if i & 4 == 0 { local.min.z } else { local.max.z },
        );
        bounds.extend(transform.transform_point(corner));
    }
    bounds
}

/// A convex shape observed through a world transform; the view the GJK/EPA
/// machinery works against.
#[derive(Clone, Copy)]
pub struct WorldConvex<'a> {
    shape: &'a ColliderShape,
    transform: &'a Transform,
}

impl<'a> WorldConvex<'a> {
    pub fn new(shape: &'a ColliderShape, transform: &'a Transform) -> Self {
        debug_assert!(shape.is_convex());
        Self { shape, transform }
    }
}

/// Support mapping of a convex set in world space.
pub trait SupportMap {
    fn world_support(&self, direction: Vec3) -> Vec3;
}

impl SupportMap for WorldConvex<'_> {
    fn world_support(&self, direction: Vec3) -> Vec3 {
        // support_{M·A}(d) = M · support_A(Mᵀ d) for the affine map
        // M = R·diag(scale).
        let t = self.transform;
        let local_dir = t.scale * (t.rotation.conjugate() * direction);
        t.transform_point(self.shape.local_support(local_dir))
    }
}

/// A margin-inflated triangle in world space, used when testing concave
/// geometry one triangle at a time.
#[derive(Clone, Copy)]
pub struct WorldTriangle {
    pub vertices: [Vec3; 3],
    pub margin: f32,
}

impl SupportMap for WorldTriangle {
    fn world_support(&self, direction: Vec3) -> Vec3 {
        let dir = direction.normalize_or_zero();
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(dir);
        for &v in &self.vertices[1..] {
            let dot = v.dot(dir);
            if dot > best_dot {
                best_dot = dot;
                best = v;
            }
        }
        best + dir * self.margin
    }
}

/// Simple layer/mask collision filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    pub fn accepts(&self, other: &CollisionFilter) -> bool {
        self.layer & other.mask != 0 && other.layer & self.mask != 0
    }
}

/// A shape instance attached to a body at a local offset.
#[derive(Debug, Clone)]
pub struct Collider {
    pub id: EntityId,
    pub body: EntityId,
    pub shape: ColliderShape,
    pub offset: Transform,
    pub filter: CollisionFilter,
    pub is_trigger: bool,
    /// Broad-phase tree leaf owning this collider, null until registered.
    pub(crate) tree_node: i32,
    /// Narrow-phase cache: last separating/contact axis for this shape,
    /// used to seed the next GJK run.
    pub(crate) cached_axis: Vec3,
}

impl Collider {
    pub fn world_transform(&self, body_transform: &Transform) -> Transform {
        body_transform.combine(&self.offset)
    }

    pub fn builder() -> ColliderBuilder {
        ColliderBuilder::new()
    }
}

pub struct ColliderBuilder {
    shape: ColliderShape,
    offset: Transform,
    filter: CollisionFilter,
    is_trigger: bool,
}

impl Default for ColliderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColliderBuilder {
    pub fn new() -> Self {
        Self {
            shape: ColliderShape::Sphere { radius: 1.0 },
            offset: Transform::default(),
            filter: CollisionFilter::default(),
            is_trigger: false,
        }
    }

    pub fn shape(mut self, shape: ColliderShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn sphere(mut self, radius: f32) -> Self {
        self.shape = ColliderShape::Sphere { radius };
        self
    }

    pub fn box_shape(mut self, half_extents: Vec3) -> Self {
        self.shape = ColliderShape::Box { half_extents };
        self
    }

    pub fn capsule(mut self, radius: f32, height: f32) -> Self {
        self.shape = ColliderShape::Capsule { radius, height };
        self
    }

    pub fn offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset_position(mut self, position: Vec3) -> Self {
        self.offset.position = position;
        self
    }

    pub fn offset_rotation(mut self, rotation: Quat) -> Self {
        self.offset.rotation = rotation.normalize();
        self
    }

    pub fn filter(mut self, layer: u32, mask: u32) -> Self {
        self.filter = CollisionFilter { layer, mask };
        self
    }

    pub fn is_trigger(mut self, is_trigger: bool) -> Self {
        self.is_trigger = is_trigger;
        self
    }

    pub fn build(self) -> Collider {
        Collider {
            id: EntityId::NULL,
            body: EntityId::NULL,
            shape: self.shape,
            offset: self.offset,
            filter: self.filter,
            is_trigger: self.is_trigger,
            tree_node: -1,
            cached_axis: Vec3::X,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_support_selects_the_matching_corner() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let support = shape.local_support(Vec3::new(0.5, -0.5, 0.1));
        assert_eq!(support, Vec3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn rotated_box_aabb_covers_the_diagonal() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let transform =
            Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_z(45f32.to_radians()));
        let bounds = shape.aabb(&transform);
        let expected = 2f32.sqrt();
        assert!((bounds.max.x - expected).abs() < 1e-4);
        assert!((bounds.max.y - expected).abs() < 1e-4);
        assert!((bounds.max.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn capsule_point_containment_includes_the_caps() {
        let shape = ColliderShape::Capsule {
            radius: 0.5,
            height: 2.0,
        };
        let transform = Transform::default();
        assert!(shape.point_inside(&transform, Vec3::new(0.0, 1.4, 0.0)));
        assert!(!shape.point_inside(&transform, Vec3::new(0.0, 1.6, 0.0)));
        assert!(shape.point_inside(&transform, Vec3::new(0.45, 0.0, 0.0)));
        assert!(!shape.point_inside(&transform, Vec3::new(0.55, 0.0, 0.0)));
    }

    #[test]
    fn filters_reject_mismatched_layers() {
        let a = CollisionFilter { layer: 0b01, mask: 0b01 };
        let b = CollisionFilter { layer: 0b10, mask: 0b10 };
        let c = CollisionFilter::default();
        assert!(!a.accepts(&b));
        assert!(a.accepts(&c) && c.accepts(&a));
    }

    #[test]
    fn scaled_sphere_support_traces_the_ellipsoid() {
        let shape = ColliderShape::Sphere { radius: 1.0 };
        let transform = Transform {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::new(2.0, 1.0, 1.0),
        };
        let convex = WorldConvex::new(&shape, &transform);
        let sx = convex.world_support(Vec3::X);
        let sy = convex.world_support(Vec3::Y);
        assert!((sx.x - 2.0).abs() < 1e-4);
        assert!((sy.y - 1.0).abs() < 1e-4);
    }
}
