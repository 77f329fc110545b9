//! Force-integrated particle erosion.
//!
//! Droplets are accelerated by a slope-weighted surface normal, integrate
//! their position explicitly, and exchange sediment with the cell they just
//! left. Writes go straight into the [`HeightField`], one cell at a time.

use std::f32::consts::SQRT_2;

use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{ErosionError, ErosionModel, ErosionStrategy, ModelKind, PhysicsConfig};
use crate::terrain::HeightField;

const CARDINAL_WEIGHT: f32 = 0.15;
const DIAGONAL_WEIGHT: f32 = 0.10;

/// Neighbor offsets with their facet weight and horizontal step length.
const FACETS: [(i64, i64, f32, f32); 8] = [
    (1, 0, CARDINAL_WEIGHT, 1.0),
    (-1, 0, CARDINAL_WEIGHT, 1.0),
    (0, 1, CARDINAL_WEIGHT, 1.0),
    (0, -1, CARDINAL_WEIGHT, 1.0),
    (1, 1, DIAGONAL_WEIGHT, SQRT_2),
    (1, -1, DIAGONAL_WEIGHT, SQRT_2),
    (-1, 1, DIAGONAL_WEIGHT, SQRT_2),
    (-1, -1, DIAGONAL_WEIGHT, SQRT_2),
];

#[derive(Debug, Clone, Copy)]
struct Particle {
    pos: Vec2,
    velocity: Vec2,
    volume: f32,
    sediment: f32,
}

impl Particle {
    fn spawn(pos: Vec2) -> Self {
        Self {
            pos,
            velocity: Vec2::ZERO,
            volume: 1.0,
            sediment: 0.0,
        }
    }
}

/// Physics-based erosion model.
#[derive(Debug, Clone)]
pub struct PhysicsErosion {
    config: PhysicsConfig,
    rng: ChaCha8Rng,
}

impl PhysicsErosion {
    pub fn new(config: PhysicsConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PhysicsConfig {
        &mut self.config
    }

    /// Runs one particle from `start` until it evaporates, leaves the grid,
    /// or hits `max_steps`.
    pub fn simulate_droplet_at(&mut self, field: &mut HeightField, start: Vec2) {
        let (width, height) = (field.width(), field.height());
        if width == 0 || height == 0 {
            return;
        }
        let cfg = &self.config;
        let mut p = Particle::spawn(start);

        for _ in 0..cfg.max_steps {
            if p.volume <= cfg.min_volume {
                break;
            }
            if !cell_in_grid(p.pos, width, height) {
                break;
            }
            let (ox, oy) = cell_of(p.pos, width, height);

            let n = surface_normal(field, ox, oy, cfg.normal_scale);
            p.velocity += cfg.dt * Vec2::new(n.x, n.z) / (p.volume * cfg.density);
            p.pos += cfg.dt * p.velocity;
            p.velocity *= 1.0 - cfg.dt * cfg.friction;

            if !cell_in_grid(p.pos, width, height) {
                break;
            }
            let (nx, ny) = cell_of(p.pos, width, height);

            let drop = field.get(ox, oy) - field.get(nx, ny);
            let capacity = (p.volume * p.velocity.length() * drop).max(0.0);
            let diff = capacity - p.sediment;
            p.sediment += cfg.dt * cfg.deposition_rate * diff;
            field.add(ox, oy, -cfg.dt * p.volume * cfg.deposition_rate * diff);

            p.volume *= 1.0 - cfg.dt * cfg.evaporation_rate;
        }
    }
}

impl Default for PhysicsErosion {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

#[inline]
fn cell_in_grid(pos: Vec2, width: usize, height: usize) -> bool {
    pos.x >= 0.0 && pos.y >= 0.0 && pos.x < width as f32 && pos.y < height as f32
}

#[inline]
fn cell_of(pos: Vec2, width: usize, height: usize) -> (usize, usize) {
    ((pos.x as usize).min(width - 1), (pos.y as usize).min(height - 1))
}

/// Weighted, unnormalized surface normal at cell `(x, y)`, y-up.
///
/// Interior cells sum eight facet normals (cardinal 0.15, diagonal 0.10) so
/// the horizontal magnitude grows with slope. Border cells use a single
/// central-difference normal over clamped neighbors.
fn surface_normal(field: &HeightField, x: usize, y: usize, scale: f32) -> Vec3 {
    let (w, h) = (field.width(), field.height());
    let c = field.get(x, y);

    if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
        let left = field.get(x.saturating_sub(1), y);
        let right = field.get((x + 1).min(w - 1), y);
        let down = field.get(x, y.saturating_sub(1));
        let up = field.get(x, (y + 1).min(h - 1));
        return Vec3::new(scale * (left - right) * 0.5, 1.0, scale * (down - up) * 0.5).normalize();
    }

    let mut n = Vec3::ZERO;
    for &(dx, dy, weight, step) in &FACETS {
        let nx = (x as i64 + dx) as usize;
        let ny = (y as i64 + dy) as usize;
        let slope = scale * (c - field.get(nx, ny)) / step;
        n += weight * Vec3::new(dx as f32 * slope, step, dy as f32 * slope).normalize();
    }
    n
}

impl ErosionStrategy for PhysicsErosion {
    fn name(&self) -> &str {
        ModelKind::PhysicsBased.name()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::PhysicsBased
    }

    fn initialize(&mut self, _width: usize, _height: usize) {}

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

    fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
    }

    fn to_serializable(&self) -> ErosionModel {
        ErosionModel::PhysicsBased(self.config.clone())
    }

    fn set_params(&mut self, model: ErosionModel) -> Result<(), ErosionError> {
        match model {
            ErosionModel::PhysicsBased(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(ErosionError::ModelMismatch {
                expected: ModelKind::PhysicsBased.name(),
                got: other.kind().name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_normal_points_up_with_unit_weight() {
        let field = HeightField::flat(8, 8, 0.5);
        let n = surface_normal(&field, 4, 4, 60.0);
        assert!(n.x.abs() < 1e-6 && n.z.abs() < 1e-6);
        // Four cardinal facets at 0.15 plus four diagonals at 0.10.
        assert!((n.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normal_tilts_downhill_and_grows_with_slope() {
        let gentle = HeightField::from_fn(8, 8, |x, _| -(x as f32) * 0.001);
        let steep = HeightField::from_fn(8, 8, |x, _| -(x as f32) * 0.01);
        let a = surface_normal(&gentle, 4, 4, 60.0);
        let b = surface_normal(&steep, 4, 4, 60.0);
        assert!(a.x > 0.0, "terrain falls toward +x");
        assert!(b.x > a.x);
        assert!(a.z.abs() < 1e-6);
    }

    #[test]
    fn border_cells_use_central_difference() {
        let field = HeightField::from_fn(8, 8, |x, _| -(x as f32) * 0.01);
        let n = surface_normal(&field, 0, 3, 60.0);
        assert!(n.x > 0.0);
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn flat_field_is_left_untouched() {
        let mut field = HeightField::flat(16, 16, 0.25);
        let mut model = PhysicsErosion::new(PhysicsConfig {
            max_steps: 64,
            ..PhysicsConfig::with_seed(3)
        });
        for _ in 0..50 {
            model.simulate_step(&mut field);
        }
        assert_eq!(field, HeightField::flat(16, 16, 0.25));
    }

    #[test]
    fn corner_spawns_stay_in_bounds() {
        let mut field = HeightField::from_fn(16, 16, |x, y| ((x * 5 + y * 11) % 7) as f32 * 0.02);
        let mut model = PhysicsErosion::new(PhysicsConfig {
            max_steps: 256,
            ..PhysicsConfig::with_seed(5)
        });
        for &start in &[
            Vec2::new(0.0, 0.0),
            Vec2::new(15.999, 0.0),
            Vec2::new(0.0, 15.999),
            Vec2::new(15.999, 15.999),
        ] {
            model.simulate_droplet_at(&mut field, start);
        }
        for _ in 0..500 {
            model.simulate_step(&mut field);
        }
        assert!(field.heights().iter().all(|h| h.is_finite()));
    }

    #[test]
    fn slope_loses_material_where_droplets_accelerate() {
        let size = 32;
        let mut field = HeightField::from_fn(size, size, |x, _| (size - x) as f32 * 0.02);
        let before = field.total_mass();
        let mut model = PhysicsErosion::new(PhysicsConfig {
            iterations: 300,
            ..PhysicsConfig::fast(11)
        });
        model.erode(&mut field, None);
        assert!(field.total_mass() < before);
    }

    #[test]
    fn does_not_use_change_map() {
        let model = PhysicsErosion::default();
        assert!(!model.uses_change_map());
    }
}
