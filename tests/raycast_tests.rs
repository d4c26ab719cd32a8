use impulse3d::Vec3;
use impulse3d::{BodyType, Collider, ColliderShape, PhysicsWorld, Ray, RigidBody};

fn world_with_two_spheres() -> (PhysicsWorld, impulse3d::EntityId, impulse3d::EntityId) {
    let mut world = PhysicsWorld::new();
    let shape = ColliderShape::Sphere { radius: 1.0 };

    let mut add = |world: &mut PhysicsWorld, x: f32| {
        let body = world
            .add_body(
                RigidBody::builder()
                    .body_type(BodyType::Static)
                    .position(Vec3::new(x, 0.0, 0.0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        world
            .attach_collider(body, Collider::builder().shape(shape.clone()).build())
            .unwrap()
    };

    let near = add(&mut world, 2.0);
    let far = add(&mut world, 5.0);
    (world, near, far)
}

#[test]
fn first_hit_lands_on_the_near_sphere_surface() {
    let (world, near, _) = world_with_two_spheres();
    let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 10.0);

    let hit = world.raycast_closest(&ray).expect("ray should hit");
    assert_eq!(hit.collider, near);
    assert!((hit.point.x - 1.0).abs() < 1e-4, "hit at {}", hit.point.x);
    assert!((hit.distance - 2.0).abs() < 1e-4);
    assert!(hit.normal.x < -0.999);
}

#[test]
fn traversal_visits_both_spheres() {
    let (world, near, far) = world_with_two_spheres();
    let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 10.0);

    let hits = world.raycast_all(&ray);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].collider, near);
    assert_eq!(hits[1].collider, far);
    assert!(hits[0].distance < hits[1].distance);
}

#[test]
fn callback_can_terminate_after_the_first_report() {
    let (world, _, _) = world_with_two_spheres();
    let ray = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 10.0);

    let mut reports = 0;
    world.raycast_with(&ray, |_| {
        reports += 1;
        0.0
    });
    assert_eq!(reports, 1);
}

#[test]
fn max_distance_bounds_the_ray() {
    let (world, near, _) = world_with_two_spheres();
    let short = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 2.5);

    let hits = world.raycast_all(&short);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].collider, near);

    let too_short = Ray::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, 1.5);
    assert!(world.raycast_closest(&too_short).is_none());
}

#[test]
fn overlap_query_reports_only_intersecting_colliders() {
    let (world, near, _) = world_with_two_spheres();

    let mut found = Vec::new();
    world.overlap_aabb(
        &impulse3d::Aabb::new(Vec3::new(0.5, -0.5, -0.5), Vec3::new(3.0, 0.5, 0.5)),
        |_, collider| {
            found.push(collider);
            true
        },
    );
    assert_eq!(found, vec![near]);

    // Short-circuiting works.
    let mut count = 0;
    world.overlap_aabb(
        &impulse3d::Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)),
        |_, _| {
            count += 1;
            false
        },
    );
    assert_eq!(count, 1);
}
