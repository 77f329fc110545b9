//! Incremental erosion driven by an external frame loop.
//!
//! A [`Scheduler`] owns the active [`ErosionStrategy`] and steps it against a
//! borrowed [`HeightField`] once per [`Scheduler::tick`], bounded by a
//! [`TimeBudget`]. Lifecycle:
//!
//! ```text
//! Ready --start--> Running --pause--> Paused --start--> Running
//! Running --cap reached--> Complete
//! any --reset--> Ready
//! ```

mod budget;

pub use budget::{DeviceTier, SchedulerConfig, TimeBudget};

use std::time::Instant;

use log::{debug, warn};
use thiserror::Error;

use crate::erosion::{ErosionError, ErosionModel, ErosionStrategy};
use crate::terrain::HeightField;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Ready,
    Running,
    Paused,
    Complete,
}

/// Errors raised by scheduler operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Cannot swap the erosion model while the scheduler is {0:?}")]
    ModelInUse(SchedulerState),
    #[error("Height field must be square, got {width}x{height}")]
    NonSquareField { width: usize, height: usize },
    #[error(transparent)]
    Erosion(#[from] ErosionError),
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Droplets simulated during this tick.
    pub iterations_run: u32,
    /// The field changed; the mesh consumer should refresh.
    pub mesh_dirty: bool,
    /// This tick reached the iteration cap.
    pub completed: bool,
}

type Callback = Box<dyn FnMut()>;

#[derive(Default)]
struct Callbacks {
    start: Vec<Callback>,
    pause: Vec<Callback>,
    complete: Vec<Callback>,
    reset: Vec<Callback>,
}

fn fire(callbacks: &mut [Callback]) {
    for cb in callbacks.iter_mut() {
        cb();
    }
}

/// Drives an erosion model incrementally, a time budget per tick.
pub struct Scheduler {
    state: SchedulerState,
    iterations_completed: u32,
    model: Box<dyn ErosionStrategy>,
    config: SchedulerConfig,
    callbacks: Callbacks,
    /// Steps have run since the change map was last merged.
    pending_changes: bool,
}

impl Scheduler {
    pub fn new(model: Box<dyn ErosionStrategy>, config: SchedulerConfig) -> Self {
        Self {
            state: SchedulerState::Ready,
            iterations_completed: 0,
            model,
            config,
            callbacks: Callbacks::default(),
            pending_changes: false,
        }
    }

    /// Creates a scheduler for `model` with the default budget.
    pub fn with_model(model: ErosionModel) -> Self {
        Self::new(model.build(), SchedulerConfig::default())
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn iterations_completed(&self) -> u32 {
        self.iterations_completed
    }

    /// Iteration cap of the active model.
    pub fn iterations(&self) -> u32 {
        self.model.iterations()
    }

    /// Completion percentage in `[0, 100]`.
    pub fn progress(&self) -> f32 {
        let cap = self.model.iterations();
        if cap == 0 {
            return if self.state == SchedulerState::Complete { 100.0 } else { 0.0 };
        }
        (self.iterations_completed as f32 / cap as f32 * 100.0).clamp(0.0, 100.0)
    }

    pub fn model(&self) -> &dyn ErosionStrategy {
        self.model.as_ref()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn set_budget(&mut self, budget: TimeBudget) {
        self.config.budget = budget;
    }

    pub fn on_start(&mut self, f: impl FnMut() + 'static) {
        self.callbacks.start.push(Box::new(f));
    }

    pub fn on_pause(&mut self, f: impl FnMut() + 'static) {
        self.callbacks.pause.push(Box::new(f));
    }

    pub fn on_complete(&mut self, f: impl FnMut() + 'static) {
        self.callbacks.complete.push(Box::new(f));
    }

    pub fn on_reset(&mut self, f: impl FnMut() + 'static) {
        self.callbacks.reset.push(Box::new(f));
    }

    /// Starts or resumes the run. Returns false if nothing changed.
    pub fn start(&mut self) -> bool {
        match self.state {
            SchedulerState::Ready | SchedulerState::Paused => {
                debug!("scheduler: {:?} -> Running ({})", self.state, self.model.name());
                self.state = SchedulerState::Running;
                fire(&mut self.callbacks.start);
                true
            }
            SchedulerState::Running => false,
            SchedulerState::Complete => {
                warn!("scheduler: start ignored, run is complete; reset first");
                false
            }
        }
    }

    /// Pauses a running simulation. Returns false if it was not running.
    pub fn pause(&mut self) -> bool {
        if self.state != SchedulerState::Running {
            return false;
        }
        debug!(
            "scheduler: Running -> Paused at {}/{}",
            self.iterations_completed,
            self.model.iterations()
        );
        self.state = SchedulerState::Paused;
        fire(&mut self.callbacks.pause);
        true
    }

    /// Returns to `Ready` from any state, discarding pending model writes.
    ///
    /// Reset listeners are expected to restore or regenerate the field.
    pub fn reset(&mut self) {
        debug!("scheduler: {:?} -> Ready", self.state);
        self.state = SchedulerState::Ready;
        self.iterations_completed = 0;
        self.pending_changes = false;
        self.model.reset();
        fire(&mut self.callbacks.reset);
    }

    /// Replaces the active model and returns the previous one.
    ///
    /// Rejected while running or paused. From `Ready` or `Complete` the
    /// scheduler is reset before the swap.
    pub fn set_erosion_model(
        &mut self,
        model: Box<dyn ErosionStrategy>,
    ) -> Result<Box<dyn ErosionStrategy>, SchedulerError> {
        if matches!(self.state, SchedulerState::Running | SchedulerState::Paused) {
            warn!("scheduler: model swap rejected while {:?}", self.state);
            return Err(SchedulerError::ModelInUse(self.state));
        }
        self.reset();
        debug!("scheduler: model {} -> {}", self.model.name(), model.name());
        let mut previous = std::mem::replace(&mut self.model, model);
        previous.reset();
        Ok(previous)
    }

    /// Replaces the active model's parameters.
    ///
    /// The iteration cap is floored as in [`set_iterations`](Self::set_iterations).
    pub fn update_model(&mut self, mut model: ErosionModel) -> Result<(), SchedulerError> {
        let floor = self.iteration_floor();
        if model.iterations() < floor {
            model.set_iterations(floor);
        }
        self.model.set_params(model)?;
        Ok(())
    }

    /// Sets the iteration cap.
    ///
    /// The cap never drops below the iterations already completed. While
    /// running or paused at least one more iteration is kept, so the run
    /// completes through [`tick`](Self::tick).
    pub fn set_iterations(&mut self, iterations: u32) {
        self.model.set_iterations(iterations.max(self.iteration_floor()));
    }

    fn iteration_floor(&self) -> u32 {
        match self.state {
            SchedulerState::Running | SchedulerState::Paused => {
                self.iterations_completed.saturating_add(1)
            }
            SchedulerState::Ready | SchedulerState::Complete => self.iterations_completed,
        }
    }

    /// Advances the simulation by up to one time budget.
    ///
    /// Does nothing unless running. Buffered writes from the previous tick are
    /// merged first; then droplets run until the cap is reached or the budget
    /// is spent, with at least one droplet per tick.
    pub fn tick(&mut self, field: &mut HeightField) -> Result<TickReport, SchedulerError> {
        let mut report = TickReport::default();
        if self.state != SchedulerState::Running {
            return Ok(report);
        }
        if !field.is_square() {
            return Err(SchedulerError::NonSquareField {
                width: field.width(),
                height: field.height(),
            });
        }

        let started = Instant::now();
        let buffered = self.model.uses_change_map();
        if buffered && self.pending_changes {
            self.model.apply_changes(field);
            self.pending_changes = false;
            report.mesh_dirty = true;
        }

        let cap = self.model.iterations();
        while self.iterations_completed < cap {
            self.model.simulate_step(field);
            self.iterations_completed += 1;
            report.iterations_run += 1;
            if self.config.budget.is_exhausted(started.elapsed()) {
                break;
            }
        }

        if report.iterations_run > 0 {
            if buffered {
                self.pending_changes = true;
            } else {
                report.mesh_dirty = true;
            }
        }

        if self.iterations_completed >= cap {
            if buffered && self.pending_changes {
                self.model.apply_changes(field);
                self.pending_changes = false;
                report.mesh_dirty = true;
            }
            self.complete();
            report.completed = true;
        }

        Ok(report)
    }

    /// Marks the run complete after a batch result has been merged.
    pub fn finish_batch(&mut self) {
        self.iterations_completed = self.model.iterations();
        self.pending_changes = false;
        self.model.reset();
        self.complete();
    }

    fn complete(&mut self) {
        debug!(
            "scheduler: {:?} -> Complete after {} iterations",
            self.state, self.iterations_completed
        );
        self.state = SchedulerState::Complete;
        fire(&mut self.callbacks.complete);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::erosion::{ModelKind, PhysicsConfig, RidgeFollowerConfig};

    fn ridge(iterations: u32) -> ErosionModel {
        ErosionModel::RidgeFollower(RidgeFollowerConfig {
            iterations,
            ..RidgeFollowerConfig::with_seed(1)
        })
    }

    fn bowl(size: usize) -> HeightField {
        let c = (size as f32 - 1.0) * 0.5;
        HeightField::from_fn(size, size, |x, y| {
            let dx = x as f32 - c;
            let dy = y as f32 - c;
            (dx * dx + dy * dy).sqrt() * 0.05
        })
    }

    fn one_step_per_tick(model: ErosionModel) -> Scheduler {
        Scheduler::new(
            model.build(),
            SchedulerConfig {
                budget: TimeBudget::from_millis(0),
            },
        )
    }

    #[test]
    fn iterations_are_monotonic_and_capped() {
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(ridge(40));
        scheduler.start();

        let mut last = 0;
        for _ in 0..100 {
            let report = scheduler.tick(&mut field).unwrap();
            let now = scheduler.iterations_completed();
            assert!(now >= last);
            assert!(now <= scheduler.iterations());
            assert!(report.iterations_run <= 1);
            last = now;
        }
        assert_eq!(last, 40);
        assert_eq!(scheduler.state(), SchedulerState::Complete);
        assert_eq!(scheduler.progress(), 100.0);
    }

    #[test]
    fn ticking_converges_for_both_models() {
        for kind in [ModelKind::RidgeFollower, ModelKind::PhysicsBased] {
            let mut model = ErosionModel::default_for(kind);
            model.set_iterations(300);
            let mut scheduler = Scheduler::with_model(model);
            let mut field = bowl(32);
            scheduler.start();

            let mut ticks = 0;
            while scheduler.state() != SchedulerState::Complete {
                scheduler.tick(&mut field).unwrap();
                ticks += 1;
                assert!(ticks <= 300, "{kind:?} did not converge");
            }
            assert_eq!(scheduler.iterations_completed(), 300);
        }
    }

    #[test]
    fn tick_is_noop_unless_running() {
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(ridge(10));
        assert_eq!(scheduler.tick(&mut field).unwrap(), TickReport::default());

        scheduler.start();
        scheduler.tick(&mut field).unwrap();
        assert!(scheduler.pause());
        assert_eq!(scheduler.state(), SchedulerState::Paused);
        assert_eq!(scheduler.tick(&mut field).unwrap().iterations_run, 0);
        assert_eq!(scheduler.iterations_completed(), 1);

        assert!(scheduler.start());
        scheduler.tick(&mut field).unwrap();
        assert_eq!(scheduler.iterations_completed(), 2);
    }

    #[test]
    fn buffered_changes_land_on_the_following_tick() {
        let mut field = bowl(16);
        let original = field.clone();
        let mut scheduler = one_step_per_tick(ridge(3));
        scheduler.start();

        let first = scheduler.tick(&mut field).unwrap();
        assert!(!first.mesh_dirty);
        assert_eq!(field, original);

        let second = scheduler.tick(&mut field).unwrap();
        assert!(second.mesh_dirty);

        // Final tick flushes its own writes before completing.
        let last = scheduler.tick(&mut field).unwrap();
        assert!(last.completed && last.mesh_dirty);
    }

    #[test]
    fn direct_writes_mark_mesh_dirty_immediately() {
        let model = ErosionModel::PhysicsBased(PhysicsConfig {
            iterations: 5,
            ..PhysicsConfig::fast(2)
        });
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(model);
        scheduler.start();
        assert!(scheduler.tick(&mut field).unwrap().mesh_dirty);
    }

    #[test]
    fn callbacks_fire_on_transitions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(ridge(2));
        for (name, slot) in [("start", 0), ("pause", 1), ("complete", 2), ("reset", 3)] {
            let log = Rc::clone(&log);
            let cb = move || log.borrow_mut().push(name);
            match slot {
                0 => scheduler.on_start(cb),
                1 => scheduler.on_pause(cb),
                2 => scheduler.on_complete(cb),
                _ => scheduler.on_reset(cb),
            }
        }

        scheduler.start();
        scheduler.pause();
        scheduler.start();
        scheduler.tick(&mut field).unwrap();
        scheduler.tick(&mut field).unwrap();
        assert!(!scheduler.start());
        scheduler.reset();

        assert_eq!(
            *log.borrow(),
            vec!["start", "pause", "start", "complete", "reset"]
        );
        assert_eq!(scheduler.state(), SchedulerState::Ready);
        assert_eq!(scheduler.iterations_completed(), 0);
    }

    #[test]
    fn model_swap_requires_idle_scheduler() {
        let mut scheduler = one_step_per_tick(ridge(10));
        scheduler.start();
        let physics = ErosionModel::default_for(ModelKind::PhysicsBased).build();
        assert!(matches!(
            scheduler.set_erosion_model(physics),
            Err(SchedulerError::ModelInUse(SchedulerState::Running))
        ));

        scheduler.reset();
        let physics = ErosionModel::default_for(ModelKind::PhysicsBased).build();
        let previous = scheduler.set_erosion_model(physics).unwrap();
        assert_eq!(previous.kind(), ModelKind::RidgeFollower);
        assert_eq!(scheduler.model().kind(), ModelKind::PhysicsBased);
        assert!(!scheduler.model().uses_change_map());
    }

    #[test]
    fn iteration_cap_never_drops_below_progress() {
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(ridge(10));
        scheduler.start();
        for _ in 0..4 {
            scheduler.tick(&mut field).unwrap();
        }
        scheduler.set_iterations(4);
        assert_eq!(scheduler.iterations(), 5);
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.pause();
        scheduler.update_model(ridge(1)).unwrap();
        assert_eq!(scheduler.iterations(), 5);
        assert!(scheduler.iterations_completed() < scheduler.iterations());

        scheduler.start();
        let report = scheduler.tick(&mut field).unwrap();
        assert!(report.completed);
        assert_eq!(report.iterations_run, 1);
        assert_eq!(scheduler.iterations_completed(), 5);
        assert_eq!(scheduler.state(), SchedulerState::Complete);
    }

    #[test]
    fn completed_run_accepts_cap_equal_to_progress() {
        let mut field = bowl(16);
        let mut scheduler = one_step_per_tick(ridge(3));
        scheduler.start();
        while scheduler.state() != SchedulerState::Complete {
            scheduler.tick(&mut field).unwrap();
        }
        scheduler.set_iterations(1);
        assert_eq!(scheduler.iterations(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Complete);
    }

    #[test]
    fn update_model_rejects_other_kind() {
        let mut scheduler = one_step_per_tick(ridge(10));
        let err = scheduler
            .update_model(ErosionModel::default_for(ModelKind::PhysicsBased))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Erosion(_)));
    }

    #[test]
    fn zero_iterations_complete_on_first_tick() {
        let mut field = bowl(8);
        let mut scheduler = one_step_per_tick(ridge(0));
        scheduler.start();
        let report = scheduler.tick(&mut field).unwrap();
        assert!(report.completed);
        assert_eq!(scheduler.progress(), 100.0);
    }

    #[test]
    fn non_square_field_is_rejected() {
        let mut field = HeightField::new(8, 4);
        let mut scheduler = one_step_per_tick(ridge(10));
        scheduler.start();
        assert!(matches!(
            scheduler.tick(&mut field),
            Err(SchedulerError::NonSquareField { width: 8, height: 4 })
        ));
    }

    #[test]
    fn finish_batch_completes_and_notifies() {
        let done = Rc::new(RefCell::new(false));
        let mut scheduler = one_step_per_tick(ridge(25));
        let flag = Rc::clone(&done);
        scheduler.on_complete(move || *flag.borrow_mut() = true);

        scheduler.finish_batch();
        assert!(*done.borrow());
        assert_eq!(scheduler.state(), SchedulerState::Complete);
        assert_eq!(scheduler.iterations_completed(), 25);
    }
}
