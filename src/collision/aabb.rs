use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that becomes valid after the first `extend`.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Box enclosing both operands.
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn inflated(&self, gap: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(gap),
            max: self.max + Vec3::splat(gap),
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Volume, used as the broad-phase insertion cost metric.
    pub fn volume(&self) -> f32 {
        let d = self.max - self.min;
        d.x * d.y * d.z
    }

    /// Segment-vs-box slab test over `origin + t * direction`, `t` in
    /// `[0, max_t]`. Returns the entry parameter when the segment hits.
    pub fn clip_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = max_t;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-12 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
            } else {
                let inv = 1.0 / d;
                let mut t1 = (self.min[axis] - o) * inv;
                let mut t2 = (self.max[axis] - o) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some(t_min)
    }

    pub fn intersects_ray(&self, origin: Vec3, direction: Vec3, max_t: f32) -> bool {
        self.clip_ray(origin, direction, max_t).is_some()
    }
}
