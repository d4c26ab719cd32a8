//! Island partitioning and the sleep manager.
//!
//! Islands are the connected components of the awake-dynamic-body graph
//! whose edges are contact manifolds and joints. Static and kinematic
//! bodies terminate propagation, so two stacks resting on the same floor
//! solve independently.

use std::collections::{HashMap, HashSet};

use crate::collision::contact::PairKey;
use crate::config::WorldConfig;
use crate::core::body::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

/// One edge of the constraint graph.
#[derive(Debug, Clone, Copy)]
pub enum IslandEdge {
    Manifold(PairKey),
    Joint(EntityId),
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeLink {
    pub body1: EntityId,
    pub body2: EntityId,
    pub edge: IslandEdge,
}

/// A transient set of connected awake dynamic bodies and the constraints
/// among them. Lives for one simulation step.
#[derive(Debug, Default)]
pub struct Island {
    pub bodies: Vec<EntityId>,
    pub manifolds: Vec<PairKey>,
    pub joints: Vec<EntityId>,
}

/// Builds islands each step and manages sleeping. Scratch buffers are
/// retained across steps so steady-state stepping does not allocate.
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: HashMap<EntityId, Vec<usize>>,
    visited: HashSet<EntityId>,
    stack: Vec<EntityId>,
}

impl Default for IslandManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IslandManager {
    pub fn new() -> Self {
        Self {
            islands: Vec::new(),
            adjacency: HashMap::new(),
            visited: HashSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Flood-fills islands from every awake, unvisited dynamic body.
    /// Sleeping dynamic bodies are pulled in (and woken) when an awake
    /// neighbor reaches them; static/kinematic bodies never propagate.
    pub fn build_islands(&mut self, bodies: &mut Arena<RigidBody>, edges: &[EdgeLink]) {
        self.islands.clear();
        self.adjacency.clear();
        self.visited.clear();

        for (index, link) in edges.iter().enumerate() {
            self.adjacency.entry(link.body1).or_default().push(index);
            self.adjacency.entry(link.body2).or_default().push(index);
        }

        let seeds: Vec<EntityId> = bodies.ids().collect();
        let mut edge_used = vec![false; edges.len()];

        for seed in seeds {
            let Some(body) = bodies.get(seed) else { continue };
            if !body.is_dynamic() || body.is_sleeping() || self.visited.contains(&seed) {
                continue;
            }

            let mut island = Island::default();
            self.stack.clear();
            self.stack.push(seed);
            self.visited.insert(seed);

            while let Some(current) = self.stack.pop() {
                island.bodies.push(current);

                let Some(edge_indices) = self.adjacency.get(&current) else {
                    continue;
                };
                for &edge_index in edge_indices {
                    let link = &edges[edge_index];
                    if !edge_used[edge_index] {
                        edge_used[edge_index] = true;
                        match link.edge {
                            IslandEdge::Manifold(key) => island.manifolds.push(key),
                            IslandEdge::Joint(id) => island.joints.push(id),
                        }
                    }

                    let other = if link.body1 == current {
                        link.body2
                    } else {
                        link.body1
                    };
                    if self.visited.contains(&other) {
                        continue;
                    }
                    let Some(other_body) = bodies.get_mut(other) else {
                        continue;
                    };
                    if !other_body.is_dynamic() {
                        // The island stops at non-dynamic bodies.
                        continue;
                    }
                    if other_body.is_sleeping() {
                        other_body.wake_up();
                    }
                    self.visited.insert(other);
                    self.stack.push(other);
                }
            }

            self.islands.push(island);
        }
    }

    /// Accumulates per-body low-velocity timers and puts whole islands to
    /// sleep once every member has been slow for long enough.
    pub fn update_sleep(&self, bodies: &mut Arena<RigidBody>, config: &WorldConfig, dt: f32) {
        if !config.sleep_enabled {
            return;
        }

        let linear_threshold_sq = config.sleep_linear_threshold * config.sleep_linear_threshold;
        let angular_threshold_sq = config.sleep_angular_threshold * config.sleep_angular_threshold;

        for island in &self.islands {
            let mut min_timer = f32::INFINITY;
            for &id in &island.bodies {
                let Some(body) = bodies.get_mut(id) else { continue };
                let slow = body.velocity.linear.length_squared() < linear_threshold_sq
                    && body.velocity.angular.length_squared() < angular_threshold_sq;
                if slow {
                    body.sleep_timer += dt;
                } else {
                    body.sleep_timer = 0.0;
                }
                min_timer = min_timer.min(body.sleep_timer);
            }

            if min_timer >= config.time_before_sleep {
                for &id in &island.bodies {
                    if let Some(body) = bodies.get_mut(id) {
                        body.fall_asleep();
                    }
                }
            }
        }
    }
}
