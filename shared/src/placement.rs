//! Anti-overlap placement for spawned trash
//!
//! The desired point is used as-is when nothing lies within the minimum
//! separation. Otherwise concentric rings around it are probed, starting at one
//! separation and growing by one separation per ring up to five times the
//! alternative radius, with more (jittered) candidates on every outer ring.
//! When every ring is full the solver gives up and returns an unvalidated point
//! beyond the search area; callers can tell from `Placement::is_fallback`.

use crate::config::PlacementConfig;
use crate::types::Vec3;
use log::{debug, warn};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// The desired point was already free
    Desired(Vec3),
    /// A free candidate was found on a search ring
    Ring { position: Vec3, radius: f32 },
    /// Search exhausted; the point was not checked for overlap
    Fallback(Vec3),
}

impl Placement {
    pub fn position(&self) -> Vec3 {
        match self {
            Placement::Desired(position) => *position,
            Placement::Ring { position, .. } => *position,
            Placement::Fallback(position) => *position,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Placement::Fallback(_))
    }
}

#[derive(Debug, Clone)]
pub struct PlacementSolver {
    config: PlacementConfig,
}

impl PlacementSolver {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// A point is occupied when any existing item is closer than the
    /// minimum separation
    pub fn is_occupied(&self, point: Vec3, occupied: &[Vec3]) -> bool {
        occupied
            .iter()
            .any(|other| other.distance(&point) < self.config.min_separation)
    }

    pub fn find_position<R: Rng + ?Sized>(
        &self,
        desired: Vec3,
        occupied: &[Vec3],
        rng: &mut R,
    ) -> Placement {
        if !self.is_occupied(desired, occupied) {
            return Placement::Desired(desired);
        }

        debug!("Desired spawn point {} is occupied, searching rings", desired);

        let separation = self.config.min_separation;
        let max_radius = self.config.max_search_radius();
        let mut radius = separation;
        let mut points_per_ring = self.config.initial_points_per_ring.max(1);

        while radius <= max_radius {
            for i in 0..points_per_ring {
                let mut angle = 360.0 / points_per_ring as f32 * i as f32;
                if self.config.jitter_degrees > 0.0 {
                    angle += rng.gen_range(-self.config.jitter_degrees..=self.config.jitter_degrees);
                }
                let angle = angle.to_radians();

                let candidate = Vec3::new(
                    desired.x + angle.cos() * radius,
                    desired.y,
                    desired.z + angle.sin() * radius,
                );

                if !self.is_occupied(candidate, occupied) {
                    debug!("Free spawn point {} on ring radius {:.1}", candidate, radius);
                    return Placement::Ring {
                        position: candidate,
                        radius,
                    };
                }
            }

            radius += separation;
            points_per_ring += self.config.points_per_ring_growth;
        }

        let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.config.fallback_distance();
        let far = Vec3::new(
            desired.x + angle.cos() * distance,
            desired.y,
            desired.z + angle.sin() * distance,
        );
        warn!("Spawn area congested around {}, placing far away at {}", desired, far);
        Placement::Fallback(far)
    }
}
