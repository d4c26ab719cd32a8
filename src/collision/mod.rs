pub mod aabb;
pub mod broadphase;
pub mod contact;
pub mod epa;
pub mod gjk;
pub mod narrowphase;
pub mod queries;
