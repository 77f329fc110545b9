//! Gradient-following droplet erosion with deferred, smoothed writes.
//!
//! Each droplet rolls downhill from a random spawn point, eroding while it
//! has spare carrying capacity and depositing when it slows, climbs, or
//! overflows. Every write goes through the radius brush into a [`ChangeMap`];
//! the map is merged into the field by [`ErosionStrategy::apply_changes`].

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::brush::apply_radial_contribution;
use super::{
    jitter, ChangeMap, ErosionError, ErosionModel, ErosionStrategy, ModelKind, RidgeFollowerConfig,
};
use crate::terrain::HeightField;

const DIRECTION_EPSILON: f32 = 1e-4;
const MIN_SPEED: f32 = 0.01;
const MIN_WATER: f32 = 0.01;

/// Per-droplet state, rebuilt on the stack for every iteration.
#[derive(Debug, Clone, Copy)]
struct Droplet {
    pos: Vec2,
    dir: Vec2,
    speed: f32,
    water: f32,
    initial_water: f32,
    sediment: f32,
}

/// Ridge-follower erosion model.
#[derive(Debug, Clone)]
pub struct RidgeFollower {
    config: RidgeFollowerConfig,
    changes: ChangeMap,
    rng: ChaCha8Rng,
}

impl RidgeFollower {
    pub fn new(config: RidgeFollowerConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            changes: ChangeMap::default(),
            rng,
        }
    }

    pub fn config(&self) -> &RidgeFollowerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RidgeFollowerConfig {
        &mut self.config
    }

    /// Pending deltas that have not been merged yet.
    pub fn changes(&self) -> &ChangeMap {
        &self.changes
    }

    /// Runs one droplet from `start`, writing into the change map.
    pub fn simulate_droplet_at(&mut self, field: &HeightField, start: Vec2) {
        let (width, height) = (field.width(), field.height());
        self.changes.ensure_size(width, height);
        if width == 0 || height == 0 {
            return;
        }

        let cfg = &self.config;
        let water = jitter(&mut self.rng, cfg.min_water, cfg.max_water);
        let span = jitter(&mut self.rng, cfg.min_lifetime, cfg.max_lifetime);
        let lifetime = (cfg.max_path as f32 * span).floor().max(0.0) as u32;
        let mut drop = Droplet {
            pos: start,
            dir: Vec2::ZERO,
            speed: cfg.initial_speed,
            water,
            initial_water: water,
            sediment: 0.0,
        };

        for _ in 0..lifetime {
            let cfg = &self.config;
            let here = field.sample(drop.pos.x, drop.pos.y);

            let blended = drop.dir * cfg.inertia - here.gradient * (1.0 - cfg.inertia);
            let len = blended.length();
            drop.dir = if len > DIRECTION_EPSILON && len.is_finite() {
                blended / len
            } else {
                self.random_direction()
            };
            if drop.dir == Vec2::ZERO {
                break;
            }

            let old_pos = drop.pos;
            drop.pos += drop.dir;
            if !field.in_bounds(drop.pos) {
                break;
            }

            let cfg = &self.config;
            let new_height = field.sample(drop.pos.x, drop.pos.y).height;
            let height_diff = new_height - here.height;
            let capacity =
                (-height_diff).max(cfg.min_slope) * drop.speed * drop.water * cfg.capacity;

            if height_diff > 0.0 || drop.sediment > capacity {
                let raw = if height_diff > 0.0 {
                    drop.sediment.min(height_diff)
                } else {
                    (drop.sediment - capacity) * cfg.deposit_speed
                };
                let amount = raw * (drop.water / drop.initial_water);
                apply_radial_contribution(
                    self.changes.deltas_mut(),
                    width,
                    height,
                    old_pos.x,
                    old_pos.y,
                    cfg.deposition_radius,
                    amount,
                );
                drop.sediment -= amount;
            } else {
                let amount = ((capacity - drop.sediment) * cfg.erode_speed).min(-height_diff);
                apply_radial_contribution(
                    self.changes.deltas_mut(),
                    width,
                    height,
                    old_pos.x,
                    old_pos.y,
                    cfg.erosion_radius,
                    -amount,
                );
                drop.sediment += amount;
            }

            drop.speed = if height_diff > 0.0 {
                (drop.speed * 0.5).max(0.1)
            } else {
                (drop.speed * drop.speed + (-height_diff).max(0.0) * cfg.gravity).sqrt()
            };
            drop.water *= 1.0 - cfg.evaporate_speed;

            if drop.speed < MIN_SPEED || drop.water < MIN_WATER {
                break;
            }
        }
    }

    fn random_direction(&mut self) -> Vec2 {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        Vec2::new(angle.cos(), angle.sin())
    }
}

impl Default for RidgeFollower {
    fn default() -> Self {
        Self::new(RidgeFollowerConfig::default())
    }
}

impl ErosionStrategy for RidgeFollower {
    fn name(&self) -> &str {
        ModelKind::RidgeFollower.name()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::RidgeFollower
    }

    fn initialize(&mut self, width: usize, height: usize) {
        self.changes.ensure_size(width, height);
    }

    fn iterations(&self) -> u32 {
        self.config.iterations
    }

    fn set_iterations(&mut self, iterations: u32) {
        self.config.iterations = iterations;
    }

    fn simulate_step(&mut self, field: &mut HeightField) {
        let start = Vec2::new(
            self.rng.gen::<f32>() * field.width() as f32,
            self.rng.gen::<f32>() * field.height() as f32,
        );
        self.simulate_droplet_at(field, start);
    }

    fn uses_change_map(&self) -> bool {
        true
    }

    fn apply_changes(&mut self, field: &mut HeightField) {
        self.changes.apply(field, self.config.blur);
    }

    fn reset(&mut self) {
        self.changes.clear();
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
    }

    fn to_serializable(&self) -> ErosionModel {
        ErosionModel::RidgeFollower(self.config.clone())
    }

    fn set_params(&mut self, model: ErosionModel) -> Result<(), ErosionError> {
        match model {
            ErosionModel::RidgeFollower(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(ErosionError::ModelMismatch {
                expected: ModelKind::RidgeFollower.name(),
                got: other.kind().name(),
            }),
        }
    }
}
