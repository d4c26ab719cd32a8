//! impulse3d - an impulse-based 3D rigid-body physics engine.
//!
//! The crate is organized around the classical pipeline: a dynamic AABB
//! tree broad-phase, a GJK/EPA narrow-phase with persistent four-point
//! contact manifolds, a warm-started sequential-impulse solver with split
//! impulses, and island-based sleeping, all orchestrated by
//! [`PhysicsWorld::step`].

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use crate::collision::aabb::Aabb;
pub use crate::collision::contact::{ContactManifold, ContactPoint};
pub use crate::collision::queries::{Ray, RaycastHit};
pub use crate::config::WorldConfig;
pub use crate::core::body::{BodyType, RigidBody, RigidBodyBuilder};
pub use crate::core::collider::{Collider, ColliderBuilder, ColliderShape, CollisionFilter};
pub use crate::core::mesh::{HeightField, TriangleMesh};
pub use crate::core::types::{MassProperties, Material, Transform, Velocity};
pub use crate::dynamics::joint::{Joint, JointMotor, JointParams};
pub use crate::error::{PhysicsError, PhysicsResult};
pub use crate::utils::allocator::EntityId;
pub use crate::world::{ContactEvent, ContactEventKind, PhysicsWorld};

/// High-level convenience wrapper that owns a [`PhysicsWorld`].
pub struct PhysicsEngine {
    world: PhysicsWorld,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self {
            world: PhysicsWorld::new(),
        }
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            world: PhysicsWorld::with_config(config),
        }
    }

    /// Adds a rigid body and returns its stable id.
    pub fn add_body(&mut self, body: RigidBody) -> PhysicsResult<EntityId> {
        self.world.add_body(body)
    }

    /// Attaches a collider to a body and returns the collider id.
    pub fn attach_collider(&mut self, body: EntityId, collider: Collider) -> PhysicsResult<EntityId> {
        self.world.attach_collider(body, collider)
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> PhysicsResult<()> {
        self.world.step(dt)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}
