//! Droplet erosion models.
//!
//! Two models share one contract, [`ErosionStrategy`]: a gradient-following
//! droplet that buffers its writes in a [`ChangeMap`] ([`RidgeFollower`]), and
//! a force-integrated particle that writes straight into the field
//! ([`PhysicsErosion`]). Callers drive them one droplet at a time through the
//! scheduler, or in full through [`ErosionStrategy::erode`].

pub mod brush;
mod change_map;
mod config;
mod physics;
mod ridge;

pub use brush::apply_radial_contribution;
pub use change_map::ChangeMap;
pub use config::{BlurConfig, ErosionModel, ModelKind, PhysicsConfig, RidgeFollowerConfig};
pub use physics::PhysicsErosion;
pub use ridge::RidgeFollower;

use rand::Rng;
use thiserror::Error;

use crate::terrain::HeightField;

/// Iterations per chunk of a full run. Buffered changes are merged and
/// progress is reported at every chunk boundary.
pub const BATCH_CHUNK: u32 = 500;

/// Errors raised when configuring a model.
#[derive(Error, Debug)]
pub enum ErosionError {
    #[error("Model '{expected}' cannot take parameters for '{got}'")]
    ModelMismatch { expected: &'static str, got: &'static str },
    #[error("Invalid model configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Common contract for droplet erosion algorithms.
///
/// The scheduler and the batch worker depend only on this trait.
pub trait ErosionStrategy: Send {
    /// Human-readable model name.
    fn name(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// Prepares internal buffers for a field of the given size.
    ///
    /// Buffers are only reallocated when the size changes.
    fn initialize(&mut self, width: usize, height: usize);

    /// Iteration cap for a full run.
    fn iterations(&self) -> u32;

    fn set_iterations(&mut self, iterations: u32);

    /// Simulates a single droplet.
    fn simulate_step(&mut self, field: &mut HeightField);

    /// Whether writes are buffered until [`ErosionStrategy::apply_changes`].
    fn uses_change_map(&self) -> bool {
        false
    }

    /// Merges buffered writes into `field`. No-op for unbuffered models.
    fn apply_changes(&mut self, _field: &mut HeightField) {}

    /// Drops pending writes and restarts the random sequence from the seed.
    fn reset(&mut self);

    /// Current parameter record, tagged with the model kind.
    fn to_serializable(&self) -> ErosionModel;

    /// Replaces the parameter record. The record must be for this model kind.
    fn set_params(&mut self, model: ErosionModel) -> Result<(), ErosionError>;

    /// Runs every iteration synchronously.
    ///
    /// `on_progress` receives `(iterations_done, total)` at each chunk
    /// boundary and once at the end.
    fn erode(
        &mut self,
        field: &mut HeightField,
        mut on_progress: Option<&mut dyn FnMut(u32, u32)>,
    ) {
        run_batch(self, field, |done, total| {
            if let Some(cb) = on_progress.as_mut() {
                cb(done, total);
            }
            true
        });
    }
}

/// Drives a full run in [`BATCH_CHUNK`]-sized chunks.
///
/// `on_chunk` is called after every chunk with `(done, total)`; returning
/// `false` stops the run early. Returns true if every iteration ran.
pub fn run_batch<S, F>(strategy: &mut S, field: &mut HeightField, mut on_chunk: F) -> bool
where
    S: ErosionStrategy + ?Sized,
    F: FnMut(u32, u32) -> bool,
{
    let total = strategy.iterations();
    strategy.initialize(field.width(), field.height());

    let mut done = 0u32;
    while done < total {
        let chunk = BATCH_CHUNK.min(total - done);
        for _ in 0..chunk {
            strategy.simulate_step(field);
        }
        done += chunk;
        if strategy.uses_change_map() {
            strategy.apply_changes(field);
        }
        if !on_chunk(done, total) {
            return false;
        }
    }

    if total == 0 {
        on_chunk(0, 0);
    }
    true
}

/// Uniform sample in `[lo, hi]` that tolerates `lo > hi`.
#[inline]
pub(crate) fn jitter<R: Rng>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * rng.gen::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hill(size: usize) -> HeightField {
        let c = (size as f32 - 1.0) * 0.5;
        HeightField::from_fn(size, size, |x, y| {
            let dx = x as f32 - c;
            let dy = y as f32 - c;
            (1.0 - (dx * dx + dy * dy).sqrt() / c).max(0.0)
        })
    }

    #[test]
    fn erode_is_deterministic_for_both_models() {
        for kind in [ModelKind::RidgeFollower, ModelKind::PhysicsBased] {
            let mut model = ErosionModel::default_for(kind);
            model.set_iterations(1_200);

            let mut a = hill(32);
            let mut b = hill(32);
            model.build().erode(&mut a, None);
            model.build().erode(&mut b, None);

            assert_ne!(a, hill(32), "{kind:?} should change the terrain");
            let bits_a: Vec<u32> = a.heights().iter().map(|h| h.to_bits()).collect();
            let bits_b: Vec<u32> = b.heights().iter().map(|h| h.to_bits()).collect();
            assert_eq!(bits_a, bits_b, "{kind:?} runs diverged");
        }
    }

    #[test]
    fn erode_reports_chunked_progress() {
        let mut model = ErosionModel::default_for(ModelKind::RidgeFollower);
        model.set_iterations(1_100);
        let mut strategy = model.build();
        let mut field = hill(16);

        let mut seen = Vec::new();
        let mut cb = |done: u32, total: u32| seen.push((done, total));
        strategy.erode(&mut field, Some(&mut cb));
        assert_eq!(seen, vec![(500, 1_100), (1_000, 1_100), (1_100, 1_100)]);
    }

    #[test]
    fn run_batch_stops_when_asked() {
        let mut model = ErosionModel::default_for(ModelKind::PhysicsBased);
        model.set_iterations(2_000);
        let mut strategy = model.build();
        let mut field = hill(16);

        let mut calls = 0;
        let finished = run_batch(strategy.as_mut(), &mut field, |_, _| {
            calls += 1;
            false
        });
        assert!(!finished);
        assert_eq!(calls, 1);
    }

    #[test]
    fn set_params_rejects_other_kind() {
        let mut strategy = ErosionModel::default_for(ModelKind::RidgeFollower).build();
        let err = strategy
            .set_params(ErosionModel::default_for(ModelKind::PhysicsBased))
            .unwrap_err();
        assert!(matches!(err, ErosionError::ModelMismatch { .. }));
    }

    #[test]
    fn jitter_handles_inverted_range() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let v = jitter(&mut rng, 2.0, 1.0);
            assert!((1.0..=2.0).contains(&v));
        }
    }
}
