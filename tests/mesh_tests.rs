use impulse3d::Vec3;
use impulse3d::{
    BodyType, Collider, ColliderShape, HeightField, PhysicsWorld, Ray, RigidBody, TriangleMesh,
};

const DT: f32 = 1.0 / 60.0;

/// Two coplanar triangles sharing the edge x in [-2, 2] at z = 0.
fn two_triangle_mesh(smooth: bool) -> ColliderShape {
    ColliderShape::Mesh {
        mesh: TriangleMesh::builder(
            vec![
                Vec3::new(-2.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, -3.0),
                Vec3::new(0.0, 0.0, 3.0),
            ],
            vec![[0, 1, 2], [0, 3, 1]],
        )
        .smooth_contacts(smooth)
        .build(),
    }
}

fn mesh_world(smooth: bool) -> (PhysicsWorld, impulse3d::EntityId, impulse3d::EntityId) {
    let mut world = PhysicsWorld::new();
    world.set_sleep_enabled(false);

    let ground = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    let mesh_collider = world
        .attach_collider(
            ground,
            Collider::builder().shape(two_triangle_mesh(smooth)).build(),
        )
        .unwrap();
    (world, ground, mesh_collider)
}

fn drop_sphere(world: &mut PhysicsWorld, position: Vec3) -> (impulse3d::EntityId, impulse3d::EntityId) {
    let shape = ColliderShape::Sphere { radius: 0.5 };
    let ball = world
        .add_body(
            RigidBody::builder()
                .position(position)
                .mass(1.0)
                .inertia(shape.mass_properties(1.0).inertia)
                .build()
                .unwrap(),
        )
        .unwrap();
    let collider = world
        .attach_collider(ball, Collider::builder().shape(shape).build())
        .unwrap();
    (ball, collider)
}

#[test]
fn raw_mesh_contacts_duplicate_across_the_shared_edge() {
    let (mut world, _, mesh_collider) = mesh_world(false);
    // Slightly on the +z triangle, close enough to the edge that both
    // triangles report a contact during the landing impact.
    let (_, ball_collider) = drop_sphere(&mut world, Vec3::new(0.3, 0.8, 0.05));

    let mut max_points = 0;
    for _ in 0..30 {
        world.step(DT).unwrap();
        if let Some(manifold) = world.manifold(mesh_collider, ball_collider) {
            max_points = max_points.max(manifold.count());
        }
    }
    assert!(
        max_points >= 2,
        "expected duplicate edge contacts without smoothing, saw {max_points}"
    );
}

#[test]
fn smooth_contacts_produce_one_plane_aligned_contact() {
    let (mut world, _, mesh_collider) = mesh_world(true);
    // Dropped exactly onto the shared edge.
    let (ball, ball_collider) = drop_sphere(&mut world, Vec3::new(0.3, 0.55, 0.0));

    for _ in 0..30 {
        world.step(DT).unwrap();
    }

    let manifold = world
        .manifold(mesh_collider, ball_collider)
        .expect("sphere rests on the mesh");
    assert_eq!(manifold.count(), 1, "smooth filter keeps a single contact");
    let normal = manifold.points()[0].normal;
    assert!(normal.y.abs() > 0.99, "normal {normal:?} should be the plane normal");

    // The sphere rests on the surface rather than sinking through.
    let y = world.body(ball).unwrap().transform.position.y;
    assert!(y > 0.4, "sphere sank to {y}");
}

#[test]
fn sphere_rests_on_a_height_field() {
    let mut world = PhysicsWorld::new();

    let field = HeightField::new(9, 9, 1.0, vec![0.0; 81]);
    let ground = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            ground,
            Collider::builder()
                .shape(ColliderShape::HeightField { field })
                .build(),
        )
        .unwrap();

    let (ball, _) = drop_sphere(&mut world, Vec3::new(0.25, 2.0, 0.25));
    for _ in 0..180 {
        world.step(DT).unwrap();
    }

    let y = world.body(ball).unwrap().transform.position.y;
    assert!((y - 0.5).abs() < 0.05, "sphere rests at {y}");
}

#[test]
fn rays_hit_mesh_and_height_field_surfaces() {
    let mut world = PhysicsWorld::new();

    let ground = world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    world
        .attach_collider(
            ground,
            Collider::builder().shape(two_triangle_mesh(false)).build(),
        )
        .unwrap();

    let hit = world
        .raycast_closest(&Ray::new(Vec3::new(0.2, 3.0, 0.5), Vec3::NEG_Y, 10.0))
        .expect("ray hits the mesh");
    assert!((hit.distance - 3.0).abs() < 1e-3);
    assert!(hit.normal.y > 0.99);

    let mut field_world = PhysicsWorld::new();
    let heights = vec![1.0; 25];
    let terrain = field_world
        .add_body(
            RigidBody::builder()
                .body_type(BodyType::Static)
                .build()
                .unwrap(),
        )
        .unwrap();
    field_world
        .attach_collider(
            terrain,
            Collider::builder()
                .shape(ColliderShape::HeightField {
                    field: HeightField::new(5, 5, 1.0, heights),
                })
                .build(),
        )
        .unwrap();

    let hit = field_world
        .raycast_closest(&Ray::new(Vec3::new(0.3, 4.0, 0.3), Vec3::NEG_Y, 10.0))
        .expect("ray hits the height field");
    assert!((hit.distance - 3.0).abs() < 1e-3);
}
