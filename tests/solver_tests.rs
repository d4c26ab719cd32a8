use impulse3d::Vec3;
use impulse3d::{
    BodyType, Collider, ColliderShape, Material, PhysicsWorld, RigidBody,
};

const DT: f32 = 1.0 / 60.0;

fn add_static_floor(world: &mut PhysicsWorld) -> (impulse3d::EntityId, impulse3d::EntityId) {
    let floor = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    let collider = world
        .attach_collider(
            floor,
            Collider::builder()
                .box_shape(Vec3::new(25.0, 0.25, 25.0))
                .build(),
        )
        .unwrap();
    (floor, collider)
}

fn add_unit_cube(world: &mut PhysicsWorld, position: Vec3) -> impulse3d::EntityId {
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
fn stacked_boxes_settle_at_rest_heights() {
    let mut world = PhysicsWorld::new();
    add_static_floor(&mut world);
    let cube1 = add_unit_cube(&mut world, Vec3::new(0.0, 1.0, 0.0));
    let cube2 = add_unit_cube(&mut world, Vec3::new(0.0, 3.0, 0.0));

    for _ in 0..120 {
        world.step(DT).unwrap();
    }

    let y1 = world.body(cube1).unwrap().transform.position.y;
    let y2 = world.body(cube2).unwrap().transform.position.y;
    assert!((y1 - 0.75).abs() < 0.01, "bottom cube rests at {y1}");
    assert!((y2 - 1.75).abs() < 0.01, "top cube rests at {y2}");

    for id in [cube1, cube2] {
        let speed = world.body(id).unwrap().velocity.linear.length();
        assert!(speed < 0.05, "cube still moving at {speed} m/s");
    }
}

#[test]
fn warm_starting_reduces_residual_velocity() {
    let residual = |warm: bool| {
        let mut world = PhysicsWorld::new();
        world.set_warm_starting(warm);
        world.set_velocity_iterations(4);
        world.set_sleep_enabled(false);
        add_static_floor(&mut world);
        let cube1 = add_unit_cube(&mut world, Vec3::new(0.0, 1.0, 0.0));
        let cube2 = add_unit_cube(&mut world, Vec3::new(0.0, 3.0, 0.0));

        let mut total = 0.0f32;
        for step in 0..60 {
            world.step(DT).unwrap();
            if step >= 40 {
                total += world.body(cube1).unwrap().velocity.linear.length()
                    + world.body(cube2).unwrap().velocity.linear.length();
            }
        }
        total
    };

    let with_warm_start = residual(true);
    let without_warm_start = residual(false);
    assert!(
        without_warm_start > 3.0 * with_warm_start,
        "warm {with_warm_start}, cold {without_warm_start}"
    );
}

#[test]
fn head_on_collision_conserves_linear_momentum() {
    let mut world = PhysicsWorld::new();
    world.set_gravity(Vec3::ZERO);
    world.set_sleep_enabled(false);

    let sphere = ColliderShape::Sphere { radius: 0.5 };
    let mut add_sphere = |world: &mut PhysicsWorld, x: f32, vx: f32, mass: f32| {
        let body = world
            .add_body(
                RigidBody::builder()
                    .position(Vec3::new(x, 0.0, 0.0))
                    .mass(mass)
                    .inertia(sphere.mass_properties(mass).inertia)
                    .velocity(Vec3::new(vx, 0.0, 0.0), Vec3::ZERO)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        world
            .attach_collider(body, Collider::builder().shape(sphere.clone()).build())
            .unwrap();
        body
    };

    let a = add_sphere(&mut world, -2.0, 3.0, 1.0);
    let b = add_sphere(&mut world, 2.0, -1.0, 2.0);

    let momentum = |world: &PhysicsWorld| {
        world.body(a).unwrap().velocity.linear * 1.0 + world.body(b).unwrap().velocity.linear * 2.0
    };
    let before = momentum(&world);

    for _ in 0..120 {
        world.step(DT).unwrap();
    }

    let after = momentum(&world);
    assert!(
        (after - before).length() < 1e-3,
        "momentum drifted from {before:?} to {after:?}"
    );
    // The pair actually collided and exchanged momentum.
    assert!(world.body(a).unwrap().velocity.linear.x < 3.0);
}

#[test]
fn restitution_bounces_a_falling_sphere()  {
    let mut world = PhysicsWorld::new();
    let bouncy = Material {
        restitution: 1.0,
        friction: 0.3,
        rolling_resistance: 0.0,
    };

    let floor = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .material(bouncy)
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

    let shape = ColliderShape::Sphere { radius: 0.5 };
    let ball = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(0.0, 3.0, 0.0))
                .mass(1.0)
                .inertia(shape.mass_properties(1.0).inertia)
                .material(bouncy)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(ball, Collider::builder().shape(shape).build())
        .unwrap();

    let mut impact_speed = 0.0f32;
    let mut rebound_speed = 0.0f32;
    for _ in 0..240 {
        let before = world.body(ball).unwrap().velocity.linear.y;
        world.step(DT).unwrap();
        let after = world.body(ball).unwrap().velocity.linear.y;
        if before < -1.0 && after > 0.0 {
            impact_speed = -before;
            rebound_speed = after;
            break;
        }
    }

    assert!(impact_speed > 1.0, "sphere never hit the floor");
    assert!(
        rebound_speed > 0.6 * impact_speed,
        "rebound {rebound_speed} too weak for impact {impact_speed}"
    );
}

#[test]
fn sphere_slides_down_an_incline_in_persistent_contact() {
    let mut world = PhysicsWorld::new();
    world.set_sleep_enabled(false);

    let slope_material = Material {
        restitution: 0.0,
        friction: 0.3,
        rolling_resistance: 0.0,
    };

    let floor = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .rotation(impulse3d::Quat::from_rotation_z(20f32.to_radians()))
                .material(slope_material)
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

    let shape = ColliderShape::Sphere { radius: 1.0 };
    let ball = world
        .add_body(
            RigidBody::builder()
                .position(Vec3::new(0.0, 5.0, 0.0))
                .mass(1.0)
                .inertia(shape.mass_properties(1.0).inertia)
                .material(slope_material)
                .build()
                .unwrap(),
        )
        .unwrap();
    let ball_collider = world
        .attach_collider(ball, Collider::builder().shape(shape).build())
        .unwrap();

    let mut contact_steps = 0;
    for _ in 0..60 {
        world.step(DT).unwrap();
        if world
            .manifold(floor_collider, ball_collider)
            .map(|m| m.count() > 0)
            .unwrap_or(false)
        {
            contact_steps += 1;
        }
    }

    let velocity = world.body(ball).unwrap().velocity.linear;
    assert!(
        velocity.x.abs() > 0.05,
        "sphere should slide along the slope, velocity {velocity:?}"
    );
    assert!(contact_steps > 3, "sphere was in contact for {contact_steps} steps");
    assert!(
        world
            .manifold(floor_collider, ball_collider)
            .map(|m| m.count() > 0)
            .unwrap_or(false),
        "contact should persist at the end of the run"
    );
}
