//! Global configuration constants and the per-world tunable set.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default number of velocity iterations per solver pass.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 10;

/// Default number of position-correction iterations per solver pass.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 5;

/// Baumgarte factor used when split impulses are disabled.
pub const DEFAULT_BAUMGARTE: f32 = 0.2;

/// Baumgarte factor used by the split-impulse position correction.
pub const DEFAULT_BAUMGARTE_SPLIT: f32 = 0.2;

/// Allowed penetration distance before position correction kicks in.
pub const DEFAULT_PENETRATION_SLOP: f32 = 0.005;

/// Two persistent contacts closer than this on body 1 are duplicates.
pub const DEFAULT_PERSISTENT_CONTACT_THRESHOLD: f32 = 0.03;

/// Closing speed below which restitution is ignored.
pub const DEFAULT_RESTITUTION_VELOCITY_THRESHOLD: f32 = 0.5;

/// Constant gap added on all sides of a broad-phase fat AABB.
pub const DEFAULT_AABB_GAP: f32 = 0.1;

/// Multiplier applied to the predicted displacement when inflating a moving
/// proxy's fat AABB.
pub const DEFAULT_AABB_DISPLACEMENT_MULTIPLIER: f32 = 1.7;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.0;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.0;

/// Seconds of low velocity before a body may join a sleeping island.
pub const DEFAULT_TIME_BEFORE_SLEEP: f32 = 1.0;

/// Linear speed (m/s) under which a body accumulates sleep time.
pub const DEFAULT_SLEEP_LINEAR_THRESHOLD: f32 = 0.02;

/// Angular speed (rad/s) under which a body accumulates sleep time.
pub const DEFAULT_SLEEP_ANGULAR_THRESHOLD: f32 = 0.05;

/// Margin inflating each mesh/height-field triangle tested against a convex.
pub const DEFAULT_TRIANGLE_MARGIN: f32 = 0.01;

/// All per-world tunables, grouped so hosts can persist and restore them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec3,

    // Solver.
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
    pub split_impulse: bool,
    /// Solve friction (plus twist and rolling resistance) at the manifold
    /// center instead of per contact point.
    pub friction_at_manifold_center: bool,
    /// Run Non-Linear Gauss-Seidel position iterations after integration.
    pub nlgs_position_correction: bool,
    pub baumgarte: f32,
    pub baumgarte_split: f32,
    pub penetration_slop: f32,
    pub restitution_velocity_threshold: f32,

    // Sleeping.
    pub sleep_enabled: bool,
    pub time_before_sleep: f32,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,

    // Broad-phase.
    pub aabb_gap: f32,
    pub aabb_displacement_multiplier: f32,

    // Narrow-phase.
    pub persistent_contact_threshold: f32,
    pub gjk_epsilon: f32,
    pub gjk_max_iterations: u32,
    pub epa_tolerance: f32,
    pub epa_max_iterations: u32,
    pub triangle_margin: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_slice(&DEFAULT_GRAVITY),
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            warm_starting: true,
            split_impulse: true,
            friction_at_manifold_center: false,
            nlgs_position_correction: false,
            baumgarte: DEFAULT_BAUMGARTE,
            baumgarte_split: DEFAULT_BAUMGARTE_SPLIT,
            penetration_slop: DEFAULT_PENETRATION_SLOP,
            restitution_velocity_threshold: DEFAULT_RESTITUTION_VELOCITY_THRESHOLD,
            sleep_enabled: true,
            time_before_sleep: DEFAULT_TIME_BEFORE_SLEEP,
            sleep_linear_threshold: DEFAULT_SLEEP_LINEAR_THRESHOLD,
            sleep_angular_threshold: DEFAULT_SLEEP_ANGULAR_THRESHOLD,
            aabb_gap: DEFAULT_AABB_GAP,
            aabb_displacement_multiplier: DEFAULT_AABB_DISPLACEMENT_MULTIPLIER,
            persistent_contact_threshold: DEFAULT_PERSISTENT_CONTACT_THRESHOLD,
            gjk_epsilon: 1.0e-6,
            gjk_max_iterations: 64,
            epa_tolerance: 1.0e-6,
            epa_max_iterations: 30,
            triangle_margin: DEFAULT_TRIANGLE_MARGIN,
        }
    }
}
