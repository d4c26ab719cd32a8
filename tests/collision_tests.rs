use impulse3d::Vec3;
use impulse3d::{BodyType, Collider, ColliderShape, PhysicsWorld, RigidBody};

const DT: f32 = 1.0 / 60.0;

fn floor_and_cube() -> (PhysicsWorld, impulse3d::EntityId, impulse3d::EntityId) {
    let mut world = PhysicsWorld::new();
    world.set_sleep_enabled(false);

    let floor = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    let floor_collider = world
        .attach_collider(
            floor,
            Collider::builder()
                .box_shape(Vec3::new(25.0, 0.25, 25.0))
                .build(),
        )
        .unwrap();

    let shape = ColliderShape::Box {
        half_extents: Vec3::splat(0.5),
    };
    let cube = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(0.0, 1.0, 0.0))
                .mass(1.0)
                .inertia(shape.mass_properties(1.0).inertia)
                .build()
                .unwrap(),
        )
        .unwrap();
    let cube_collider = world
        .attach_collider(cube, Collider::builder().shape(shape).build())
        .unwrap();

    (world, floor_collider, cube_collider)
}

#[test]
fn resting_manifold_obeys_its_invariants() {
    let (mut world, floor_collider, cube_collider) = floor_and_cube();
    let threshold = world.config().persistent_contact_threshold;

    for _ in 0..120 {
        world.step(DT).unwrap();

        if let Some(manifold) = world.manifold(floor_collider, cube_collider) {
            let points = manifold.points();
            assert!(points.len() <= 4);
            // No two cached contacts within the persistence threshold on
            // body 1.
            for (i, a) in points.iter().enumerate() {
                for b in &points[i + 1..] {
                    let distance_sq = (a.world1 - b.world1).length_squared();
                    assert!(
                        distance_sq > threshold * threshold,
                        "duplicate cached contacts {distance_sq}"
                    );
                }
            }
        }
    }

    let manifold = world
        .manifold(floor_collider, cube_collider)
        .expect("cube rests on the floor");
    assert!(manifold.count() >= 1);
}

#[test]
fn accumulated_impulses_survive_across_steps() {
    let (mut world, floor_collider, cube_collider) = floor_and_cube();

    for _ in 0..120 {
        world.step(DT).unwrap();
    }

    let manifold = world
        .manifold(floor_collider, cube_collider)
        .expect("cube rests on the floor");
    // At rest the normal impulses support the cube's weight:
    // sum = m * g * dt.
    let total: f32 = manifold.points().iter().map(|p| p.normal_impulse).sum();
    let expected = 1.0 * 9.81 * DT;
    assert!(
        (total - expected).abs() < 0.25 * expected,
        "normal impulse sum {total}, expected about {expected}"
    );
}

#[test]
fn broadphase_stays_valid_through_world_churn() {
    let mut world = PhysicsWorld::new();
    let shape = ColliderShape::Sphere { radius: 0.5 };

    let mut bodies = Vec::new();
    for i in 0..20 {
        let body = world
            .add_body(
                RigidBody::builder()
                    .position(Vec3::new((i % 5) as f32, (i / 5) as f32 * 2.0, 0.0))
                    .mass(1.0)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        world
            .attach_collider(body, Collider::builder().shape(shape.clone()).build())
            .unwrap();
        bodies.push(body);
    }
    world.validate_broadphase();

    for _ in 0..30 {
        world.step(DT).unwrap();
        world.validate_broadphase();
    }

    for body in bodies.iter().step_by(2) {
        world.remove_body(*body).unwrap();
        world.validate_broadphase();
    }
    world.step(DT).unwrap();
    world.validate_broadphase();
}

#[test]
fn separating_bodies_retire_their_pair() {
    let mut world = PhysicsWorld::new();
    world.set_gravity(Vec3::ZERO);
    world.set_sleep_enabled(false);

    let shape = ColliderShape::Sphere { radius: 0.5 };
    let a = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(-0.4, 0.0, 0.0))
                .mass(1.0)
                .velocity(Vec3::new(-2.0, 0.0, 0.0), Vec3::ZERO)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(a, Collider::builder().shape(shape.clone()).build())
        .unwrap();
    let b = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(0.4, 0.0, 0.0))
                .mass(1.0)
                .velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(b, Collider::builder().shape(shape).build())
        .unwrap();

    world.step(DT).unwrap();
    assert_eq!(world.pair_count(), 1);

    // Fly apart until the fat AABBs separate and the pair retires.
    for _ in 0..120 {
        world.step(DT).unwrap();
    }
    assert_eq!(world.pair_count(), 0);
}
