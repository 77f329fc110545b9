//! Droplet-based hydraulic erosion for square heightfields.
//!
//! This crate provides two erosion models behind a common strategy trait, a
//! frame-budgeted scheduler that interleaves simulation with a render loop,
//! and a coordinator that runs a full pass on a background worker.

pub mod terrain;
pub mod erosion;
pub mod scheduler;
pub mod offload;
pub mod export;

pub use terrain::{HeightField, HeightSample};
pub use erosion::{
    apply_radial_contribution, ChangeMap, ErosionError, ErosionModel, ErosionStrategy, ModelKind,
    PhysicsConfig, PhysicsErosion, RidgeFollower, RidgeFollowerConfig,
};
pub use scheduler::{
    DeviceTier, Scheduler, SchedulerConfig, SchedulerError, SchedulerState, TickReport, TimeBudget,
};
pub use offload::{BatchStatus, OffloadCoordinator, OffloadError};
