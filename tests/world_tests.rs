use impulse3d::{Quat, Vec3};
use impulse3d::{
    BodyType, Collider, ColliderShape, ContactEventKind, PhysicsError, PhysicsWorld, RigidBody,
};

const DT: f32 = 1.0 / 60.0;

fn add_floor(world: &mut PhysicsWorld) {
    let floor = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            floor,
            Collider::builder()
                .box_shape(Vec3::new(25.0, 0.25, 25.0))
                .build(),
        )
        .unwrap();
}

fn add_cube(world: &mut PhysicsWorld, position: Vec3) -> impulse3d::EntityId {
    let shape = ColliderShape::Box {
        half_extents: Vec3::splat(0.5),
    };
    let body = world
        .add_body(
            RigidBody::builder()
                .position(position)
                .mass(1.0)
                .inertia(shape.mass_properties(1.0).inertia)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(body, Collider::builder().shape(shape).build())
        .unwrap();
    body
}

#[test]
fn resting_box_falls_asleep_and_wakes_on_contact() {
    let mut world = PhysicsWorld::new();
    add_floor(&mut world);
    let cube = add_cube(&mut world, Vec3::new(0.0, 1.0, 0.0));

    // Within two simulated seconds the box must be asleep.
    for _ in 0..120 {
        world.step(DT).unwrap();
    }
    assert!(world.body(cube).unwrap().is_sleeping(), "box should sleep");

    // And it stays asleep while nothing happens.
    for _ in 0..30 {
        world.step(DT).unwrap();
        assert!(world.body(cube).unwrap().is_sleeping());
    }

    // A second box dropped on top wakes it in the step they touch.
    let intruder = add_cube(&mut world, Vec3::new(0.0, 2.5, 0.0));
    let mut woke = false;
    for _ in 0..120 {
        world.step(DT).unwrap();
        if !world.body(cube).unwrap().is_sleeping() {
            woke = true;
            assert!(!world.body(intruder).unwrap().is_sleeping());
            break;
        }
    }
    assert!(woke, "sleeping box was never woken by the contact");
}

#[test]
fn contact_events_follow_begin_stay_end() {
    let mut world = PhysicsWorld::new();
    world.set_gravity(Vec3::ZERO);
    world.set_sleep_enabled(false);

    // Bouncy material so the pair separates again after the hit.
    let bouncy = impulse3d::Material {
        restitution: 0.9,
        friction: 0.1,
        rolling_resistance: 0.0,
    };
    let shape = ColliderShape::Sphere { radius: 0.5 };
    let a = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(-1.0, 0.0, 0.0))
                .mass(1.0)
                .velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO)
                .material(bouncy)
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
                .position(Vec3::new(1.0, 0.0, 0.0))
                .mass(1.0)
                .material(bouncy)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(b, Collider::builder().shape(shape).build())
        .unwrap();

    let mut seen_begin = false;
    let mut seen_stay = false;
    let mut seen_end = false;

    for _ in 0..240 {
        world.step(DT).unwrap();
        for event in world.contact_events() {
            match event.kind {
                ContactEventKind::Begin => {
                    seen_begin = true;
                    assert!(!event.points.is_empty());
                }
                ContactEventKind::Stay => seen_stay = true,
                ContactEventKind::End => seen_end = true,
            }
        }
        if seen_end {
            break;
        }
    }

    assert!(seen_begin, "no begin event");
    assert!(seen_stay, "no stay event");
    assert!(seen_end, "no end event");
}

#[test]
fn collision_filters_suppress_manifolds() {
    let mut world = PhysicsWorld::new();
    add_floor(&mut world);

    // The ghost cube collides with nothing: its layer is masked out.
    let shape = ColliderShape::Box {
        half_extents: Vec3::splat(0.5),
    };
    let ghost = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(0.0, 1.0, 0.0))
                .mass(1.0)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            ghost,
            Collider::builder().shape(shape).filter(0b10, 0b10).build(),
        )
        .unwrap();

    for _ in 0..90 {
        world.step(DT).unwrap();
    }
    // It fell straight through the floor.
    assert!(world.body(ghost).unwrap().transform.position.y < -1.0);
    assert_eq!(world.pair_count(), 0);
}

#[test]
fn trigger_colliders_report_events_but_do_not_collide() {
    let mut world = PhysicsWorld::new();
    add_floor(&mut world);

    let shape = ColliderShape::Box {
        half_extents: Vec3::splat(0.5),
    };
    let sensor_body = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .position(Vec3::new(0.0, 2.0, 0.0))
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            sensor_body,
            Collider::builder().shape(shape).is_trigger(true).build(),
        )
        .unwrap();

    let cube = add_cube(&mut world, Vec3::new(0.0, 4.0, 0.0));

    let mut sensed = false;
    for _ in 0..180 {
        world.step(DT).unwrap();
        for event in world.contact_events() {
            if event.body1 == sensor_body || event.body2 == sensor_body {
                sensed = true;
            }
        }
    }

    assert!(sensed, "trigger produced no events");
    // The cube passed through the sensor and rests on the floor.
    let y = world.body(cube).unwrap().transform.position.y;
    assert!((y - 0.75).abs() < 0.05, "cube rests at {y}");
}

#[test]
fn api_rejects_invalid_parameters() {
    let mut world = PhysicsWorld::new();

    assert!(matches!(
        world.step(0.0),
        Err(PhysicsError::InvalidParameter(_))
    ));
    assert!(matches!(
        world.step(f32::NAN),
        Err(PhysicsError::InvalidParameter(_))
    ));

    assert!(RigidBody::builder().mass(-1.0).build().is_err());
    assert!(RigidBody::builder()
        .position(Vec3::new(f32::NAN, 0.0, 0.0))
        .build()
        .is_err());

    let body = world.add_body(RigidBody::builder().build().unwrap()).unwrap();

    // Zero scale components are rejected with state unchanged.
    let mut bad = Collider::builder().sphere(1.0).build();
    bad.offset.scale = Vec3::new(0.0, 1.0, 1.0);
    assert!(world.attach_collider(body, bad).is_err());
    assert_eq!(world.collider_count(), 0);

    // Joints need two distinct, existing bodies.
    assert!(world
        .add_joint(
            body,
            body,
            impulse3d::JointParams::BallSocket { anchor: Vec3::ZERO }
        )
        .is_err());

    let missing = impulse3d::EntityId::new(99, 0);
    assert!(matches!(
        world.set_body_velocity(missing, Vec3::ZERO, Vec3::ZERO),
        Err(PhysicsError::BodyNotFound(_))
    ));
}

#[test]
fn kinematic_bodies_move_without_forces() {
    let mut world = PhysicsWorld::new();
    let platform = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Kinematic)
                .velocity(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            platform,
            Collider::builder().box_shape(Vec3::splat(0.5)).build(),
        )
        .unwrap();

    for _ in 0..60 {
        world.step(DT).unwrap();
    }
    let body = world.body(platform).unwrap();
    // Moved by its velocity, unaffected by gravity.
    assert!((body.transform.position.x - 1.0).abs() < 1e-3);
    assert!(body.transform.position.y.abs() < 1e-6);
}

#[test]
fn half_steps_track_full_steps_for_stable_motion() {
    let fly = |dt: f32, steps: usize| {
        let mut world = PhysicsWorld::new();
        let body = world
            .add_body(
                RigidBody::builder()
                    .position(Vec3::new(0.0, 10.0, 0.0))
                    .velocity(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO)
                    .mass(1.0)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        for _ in 0..steps {
            world.step(dt).unwrap();
        }
        world.body(body).unwrap().transform.position
    };

    let full = fly(DT, 30);
    let halved = fly(DT * 0.5, 60);
    assert!(
        (full - halved).length() < 0.05,
        "half-step drift too large: {full:?} vs {halved:?}"
    );
}

#[test]
fn stepping_is_deterministic_for_identical_scenes() {
    let run = || {
        let mut world = PhysicsWorld::new();
        add_floor(&mut world);
        let a = add_cube(&mut world, Vec3::new(0.1, 1.0, 0.0));
        let b = add_cube(&mut world, Vec3::new(-0.2, 2.2, 0.1));
        let c = add_cube(&mut world, Vec3::new(0.0, 3.4, -0.1));
        for _ in 0..90 {
            world.step(DT).unwrap();
        }
        [a, b, c].map(|id| world.body(id).unwrap().transform.position)
    };

    let first = run();
    let second = run();
    assert_eq!(first, second, "identical scenes must step identically");
}

#[test]
fn attaching_with_mass_accumulates_body_mass_properties() {
    let mut world = PhysicsWorld::new();
    let body = world
        .add_body(RigidBody::builder().mass(0.0).build().unwrap())
        .unwrap();
    assert_eq!(world.body(body).unwrap().inverse_mass(), 0.0);

    world
        .attach_collider_with_mass(
            body,
            Collider::builder().sphere(1.0).build(),
            2.0,
        )
        .unwrap();
    let stored = world.body(body).unwrap();
    assert!((stored.mass_properties.mass - 2.0).abs() < 1e-6);
    assert!((stored.inverse_mass() - 0.5).abs() < 1e-6);

    // An offset shape contributes parallel-axis inertia.
    let mut offset_collider = Collider::builder().sphere(0.5).build();
    offset_collider.offset.position = Vec3::new(0.0, 2.0, 0.0);
    world
        .attach_collider_with_mass(body, offset_collider, 1.0)
        .unwrap();
    let stored = world.body(body).unwrap();
    assert!((stored.mass_properties.mass - 3.0).abs() < 1e-6);
    // Inertia about x grew by roughly m * d^2 = 4.
    assert!(stored.mass_properties.inertia.x_axis.x > 4.0);
}

#[test]
fn body_pose_setter_rotates_attached_colliders() {
    let mut world = PhysicsWorld::new();
    let body = world
        .add_body(RigidBody::builder().build().unwrap())
        .unwrap();
    world
        .attach_collider(
            body,
            Collider::builder().box_shape(Vec3::new(2.0, 0.1, 0.1)).build(),
        )
        .unwrap();

    world
        .set_body_pose(body, Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_y(1.0))
        .unwrap();

    let stored = world.body(body).unwrap();
    assert!((stored.transform.position.x - 5.0).abs() < 1e-6);
    assert!((stored.transform.rotation.length() - 1.0).abs() < 1e-6);
    assert!(!stored.is_sleeping());
}
