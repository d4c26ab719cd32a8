use thiserror::Error;

use crate::utils::allocator::EntityId;

/// Errors surfaced by the public world/body/joint API.
///
/// The simulation step itself never fails: degenerate geometry and
/// non-converging iterative solvers degrade to "no contact this step".
/// Errors are reserved for precondition violations at the API boundary and
/// for a poisoned world.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A parameter failed validation (non-finite value, negative mass,
    /// non-positive timestep, zero-length axis, ...). State is unchanged.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("body {0:?} does not exist")]
    BodyNotFound(EntityId),

    #[error("collider {0:?} does not exist")]
    ColliderNotFound(EntityId),

    #[error("joint {0:?} does not exist")]
    JointNotFound(EntityId),

    /// The world's pool allocator detected a fatal inconsistency. Every
    /// subsequent mutating call fails with this error; the world must be
    /// recreated.
    #[error("world is poisoned and must be recreated")]
    Poisoned,
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
