//! Narrow-phase dispatch: pair the right algorithm with the right shape
//! tags, produce raw contacts for the manifold layer.

use std::collections::HashSet;

use glam::Vec3;

use crate::config::WorldConfig;
use crate::core::collider::{ColliderShape, SupportMap, WorldConvex, WorldTriangle};
use crate::core::types::Transform;
use crate::utils::math::barycentric_coordinates;

use super::epa::{epa_penetration, EpaSettings};
use super::gjk::{gjk_distance, GjkOutcome, GjkSettings};

/// A narrow-phase contact before it is folded into a persistent manifold.
#[derive(Debug, Clone, Copy)]
pub struct RawContact {
    /// Unit normal in world space, from shape 1 towards shape 2.
    pub normal: Vec3,
    pub depth: f32,
    /// Witness point on shape 1, world space.
    pub world1: Vec3,
    /// Witness point on shape 2, world space.
    pub world2: Vec3,
}

impl RawContact {
    fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            depth: self.depth,
            world1: self.world2,
            world2: self.world1,
        }
    }
}

/// Narrow-phase driver. Owns the iteration tolerances and the one-shot
/// diagnostics bookkeeping.
pub struct NarrowPhase {
    gjk: GjkSettings,
    epa: EpaSettings,
    triangle_margin: f32,
    degenerate_logged: HashSet<(usize, usize)>,
}

impl NarrowPhase {
    pub fn new(config: &WorldConfig) -> Self {
        let mut phase = Self {
            gjk: GjkSettings::default(),
            epa: EpaSettings::default(),
            triangle_margin: config.triangle_margin,
            degenerate_logged: HashSet::new(),
        };
        phase.update_settings(config);
        phase
    }

    pub fn update_settings(&mut self, config: &WorldConfig) {
        self.gjk = GjkSettings {
            epsilon: config.gjk_epsilon,
            max_iterations: config.gjk_max_iterations,
        };
        self.epa = EpaSettings {
            tolerance: config.epa_tolerance,
            max_iterations: config.epa_max_iterations,
        };
        self.triangle_margin = config.triangle_margin;
    }

    /// Tests one shape pair and appends raw contacts to `out`.
    /// `cached_axis` is the per-pair separating-axis cache seeded into GJK.
    pub fn collide(
        &mut self,
        shape1: &ColliderShape,
        transform1: &Transform,
        shape2: &ColliderShape,
        transform2: &Transform,
        cached_axis: &mut Vec3,
        pair: (usize, usize),
        out: &mut Vec<RawContact>,
    ) {
        match (shape1, shape2) {
            (ColliderShape::Sphere { radius: r1 }, ColliderShape::Sphere { radius: r2 }) => {
                if let Some(contact) = sphere_sphere(*r1, transform1, *r2, transform2) {
                    out.push(contact);
                }
            }
            (ColliderShape::Sphere { radius }, ColliderShape::Capsule { .. }) => {
                if let Some(contact) = sphere_capsule(*radius, transform1, shape2, transform2) {
                    out.push(contact);
                }
            }
            (ColliderShape::Capsule { .. }, ColliderShape::Sphere { radius }) => {
                if let Some(contact) = sphere_capsule(*radius, transform2, shape1, transform1) {
                    out.push(contact.flipped());
                }
            }
            _ if !shape1.is_convex() && !shape2.is_convex() => {
                self.log_degenerate_once(pair, "concave vs concave pair has no algorithm");
            }
            _ if !shape1.is_convex() => {
                self.concave_vs_convex(shape1, transform1, shape2, transform2, false, out);
            }
            _ if !shape2.is_convex() => {
                self.concave_vs_convex(shape2, transform2, shape1, transform1, true, out);
            }
            _ => {
                let convex1 = WorldConvex::new(shape1, transform1);
                let convex2 = WorldConvex::new(shape2, transform2);
                if let Some(contact) =
                    self.convex_pair(&convex1, &convex2, cached_axis, pair)
                {
                    out.push(contact);
                }
            }
        }
    }

    fn convex_pair<A: SupportMap, B: SupportMap>(
        &mut self,
        shape_a: &A,
        shape_b: &B,
        cached_axis: &mut Vec3,
        pair: (usize, usize),
    ) -> Option<RawContact> {
        match gjk_distance(shape_a, shape_b, *cached_axis, &self.gjk) {
            GjkOutcome::Overlap(simplex) => {
                match epa_penetration(shape_a, shape_b, &simplex, &self.epa) {
                    Some(info) => {
                        *cached_axis = info.normal;
                        Some(RawContact {
                            normal: info.normal,
                            depth: info.depth,
                            world1: info.point_a,
                            world2: info.point_b,
                        })
                    }
                    None => {
                        self.log_degenerate_once(
                            pair,
                            "EPA could not resolve penetration (degenerate or non-convergent)",
                        );
                        None
                    }
                }
            }
            GjkOutcome::Separated { axis, .. } => {
                *cached_axis = axis;
                None
            }
            GjkOutcome::Failed => {
                self.log_degenerate_once(pair, "GJK hit its iteration cap");
                None
            }
        }
    }

    fn concave_vs_convex(
        &mut self,
        concave_shape: &ColliderShape,
        concave_transform: &Transform,
        convex_shape: &ColliderShape,
        convex_transform: &Transform,
        convex_is_first: bool,
        out: &mut Vec<RawContact>,
    ) {
        // Convex AABB in concave-local space bounds the triangle query.
        let world_bounds = convex_shape.aabb(convex_transform);
        let mut local_bounds = super::aabb::Aabb::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { world_bounds.min.x } else { world_bounds.max.x },
                if i & 2 == 0 { world_bounds.min.y } else { world_bounds.max.y },
                if i & 4 == 0 { world_bounds.min.z } else { world_bounds.max.z },
            );
            local_bounds.extend(concave_transform.inverse_transform_point(corner));
        }
        let local_bounds = local_bounds.inflated(self.triangle_margin);

        let convex = WorldConvex::new(convex_shape, convex_transform);
        let convex_center = convex_transform.position;

        let mut raw: Vec<(RawContact, [Vec3; 3])> = Vec::new();
        let mut test_triangle = |_tri: u32, local_verts: [Vec3; 3]| {
            let vertices = [
                concave_transform.transform_point(local_verts[0]),
                concave_transform.transform_point(local_verts[1]),
                concave_transform.transform_point(local_verts[2]),
            ];
            let triangle = WorldTriangle {
                vertices,
                margin: self.triangle_margin,
            };
            let centroid = (vertices[0] + vertices[1] + vertices[2]) / 3.0;
            let mut axis = convex_center - centroid;
            if axis.length_squared() < 1.0e-10 {
                axis = Vec3::Y;
            }
            // Triangle plays shape 1 so the contact normal points from the
            // concave surface towards the convex shape.
            if let GjkOutcome::Overlap(simplex) =
                gjk_distance(&triangle, &convex, axis, &self.gjk)
            {
                if let Some(info) = epa_penetration(&triangle, &convex, &simplex, &self.epa) {
                    raw.push((
                        RawContact {
                            normal: info.normal,
                            depth: info.depth,
                            world1: info.point_a,
                            world2: info.point_b,
                        },
                        vertices,
                    ));
                }
            }
        };

        let smooth = match concave_shape {
            ColliderShape::Mesh { mesh } => {
                mesh.for_each_triangle_in_aabb(&local_bounds, &mut test_triangle);
                mesh.smooth_contacts
            }
            ColliderShape::HeightField { field } => {
                field.for_each_triangle_in_aabb(&local_bounds, &mut test_triangle);
                field.smooth_contacts
            }
            _ => unreachable!("concave dispatch on a convex shape"),
        };

        let filtered = if smooth {
            smooth_mesh_filter(raw)
        } else {
            raw.into_iter().map(|(contact, _)| contact).collect()
        };

        for contact in filtered {
            out.push(if convex_is_first { contact.flipped() } else { contact });
        }
    }

    fn log_degenerate_once(&mut self, pair: (usize, usize), message: &str) {
        if cfg!(debug_assertions) && self.degenerate_logged.insert(pair) {
            log::debug!("narrow-phase pair {:?}: {}", pair, message);
        }
    }
}

/// Sphere-vs-sphere specialization: compare center distance against the
/// radii sum, normal along the line of centers. Includes exact touching.
fn sphere_sphere(
    radius1: f32,
    transform1: &Transform,
    radius2: f32,
    transform2: &Transform,
) -> Option<RawContact> {
    let r1 = radius1 * transform1.scale.max_element();
    let r2 = radius2 * transform2.scale.max_element();
    let c1 = transform1.position;
    let c2 = transform2.position;

    let delta = c2 - c1;
    let sum = r1 + r2;
    if delta.length_squared() > sum * sum {
        return None;
    }

    let distance = delta.length();
    let normal = if distance > 1.0e-9 { delta / distance } else { Vec3::Y };
    Some(RawContact {
        normal,
        depth: sum - distance,
        world1: c1 + normal * r1,
        world2: c2 - normal * r2,
    })
}

/// Sphere-vs-capsule specialization: sphere against the closest point of
/// the capsule's core segment. The sphere plays shape 1.
fn sphere_capsule(
    sphere_radius: f32,
    sphere_transform: &Transform,
    capsule_shape: &ColliderShape,
    capsule_transform: &Transform,
) -> Option<RawContact> {
    let ColliderShape::Capsule { radius, height } = capsule_shape else {
        return None;
    };

    let center = sphere_transform.position;
    let top = capsule_transform.transform_point(Vec3::new(0.0, 0.5 * height, 0.0));
    let bottom = capsule_transform.transform_point(Vec3::new(0.0, -0.5 * height, 0.0));

    // Closest point of the core segment to the sphere center.
    let axis = top - bottom;
    let t = if axis.length_squared() > 1.0e-12 {
        ((center - bottom).dot(axis) / axis.length_squared()).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let segment_point = bottom + axis * t;

    let capsule_radius =
        radius * capsule_transform.scale.x.abs().max(capsule_transform.scale.z.abs());
    let virtual_sphere = Transform {
        position: segment_point,
        rotation: glam::Quat::IDENTITY,
        scale: Vec3::ONE,
    };
    sphere_sphere(
        sphere_radius * sphere_transform.scale.max_element(),
        &Transform::from_position(center),
        capsule_radius,
        &virtual_sphere,
    )
}

/// Suppresses the duplicate contacts raw triangle testing produces at
/// shared mesh edges and vertices, and straightens face-contact normals to
/// the triangle plane.
fn smooth_mesh_filter(mut raw: Vec<(RawContact, [Vec3; 3])>) -> Vec<RawContact> {
    raw.sort_by(|a, b| {
        a.0.depth
            .partial_cmp(&b.0.depth)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut processed: HashSet<[u32; 3]> = HashSet::new();
    let key = |v: Vec3| [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()];

    let mut accepted = Vec::with_capacity(raw.len());
    for (mut contact, verts) in raw {
        // The triangle-side witness classifies the contact feature.
        let (u, v, w) = barycentric_coordinates(verts[0], verts[1], verts[2], contact.world1);
        let u_zero = u.abs() < 1.0e-4;
        let v_zero = v.abs() < 1.0e-4;
        let w_zero = w.abs() < 1.0e-4;
        let zeros = u_zero as u8 + v_zero as u8 + w_zero as u8;

        let accept = match zeros {
            2 => {
                // Vertex contact: identified by the non-zero coordinate.
                let vertex = if !u_zero {
                    verts[0]
                } else if !v_zero {
                    verts[1]
                } else {
                    verts[2]
                };
                !processed.contains(&key(vertex))
            }
            1 => {
                // Edge contact: both endpoints must be fresh.
                let (a, b) = if u_zero {
                    (verts[1], verts[2])
                } else if v_zero {
                    (verts[0], verts[2])
                } else {
                    (verts[0], verts[1])
                };
                !processed.contains(&key(a)) && !processed.contains(&key(b))
            }
            _ => {
                // Face contact: trust the triangle's geometric normal and
                // drop the opposing witness back onto it so the pair still
                // measures the penetration without inducing torque.
                let mut normal =
                    (verts[1] - verts[0]).cross(verts[2] - verts[0]).normalize_or_zero();
                if normal != Vec3::ZERO {
                    if normal.dot(contact.normal) < 0.0 {
                        normal = -normal;
                    }
                    contact.normal = normal;
                    contact.world2 = contact.world1 - normal * contact.depth;
                }
                true
            }
        };

        if accept {
            accepted.push(contact);
            for vertex in verts {
                processed.insert(key(vertex));
            }
        }
    }

    accepted
}
