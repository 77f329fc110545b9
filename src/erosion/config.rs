//! Erosion model configuration.

use serde::{Deserialize, Serialize};

use super::{ErosionError, ErosionStrategy, PhysicsErosion, RidgeFollower};

/// Which droplet model a configuration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Gradient-following droplets with a deferred change map.
    RidgeFollower,
    /// Force-integrated droplets writing straight into the field.
    PhysicsBased,
}

impl ModelKind {
    /// Returns the display name used by strategies and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RidgeFollower => "Ridge Follower",
            Self::PhysicsBased => "Physics Based",
        }
    }
}

/// Box blur applied to the change map before it is merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurConfig {
    /// Blur radius in cells.
    pub radius: u32,
    /// Blend between the raw map (0.0) and the blurred map (1.0).
    pub blend: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self { radius: 1, blend: 0.5 }
    }
}

/// Parameters for the ridge-follower droplet model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeFollowerConfig {
    /// Number of droplets in a full run.
    pub iterations: u32,
    /// Seed for droplet placement and direction fallback.
    pub seed: u64,
    /// How much a droplet keeps its previous direction (0-1).
    pub inertia: f32,
    /// Sediment capacity multiplier.
    pub capacity: f32,
    /// Slope floor used in the capacity formula, so flat ground still carries sediment.
    pub min_slope: f32,
    /// Fraction of free capacity eroded per step.
    pub erode_speed: f32,
    /// Fraction of excess sediment deposited per step.
    pub deposit_speed: f32,
    /// Fraction of water lost per step.
    pub evaporate_speed: f32,
    /// Acceleration gained per unit of height dropped.
    pub gravity: f32,
    /// Maximum number of steps a droplet may take.
    pub max_path: u32,
    /// Brush radius used for erosion.
    pub erosion_radius: u32,
    /// Brush radius used for deposition.
    pub deposition_radius: u32,
    /// Initial water volume range.
    pub min_water: f32,
    pub max_water: f32,
    /// Lifetime range, as a fraction of `max_path`.
    pub min_lifetime: f32,
    pub max_lifetime: f32,
    /// Droplet speed at spawn.
    pub initial_speed: f32,
    /// Optional smoothing of the change map on merge.
    pub blur: Option<BlurConfig>,
}

impl Default for RidgeFollowerConfig {
    fn default() -> Self {
        Self {
            iterations: 70_000,
            seed: 42,
            inertia: 0.05,
            capacity: 4.0,
            min_slope: 0.01,
            erode_speed: 0.3,
            deposit_speed: 0.3,
            evaporate_speed: 0.01,
            gravity: 4.0,
            max_path: 30,
            erosion_radius: 3,
            deposition_radius: 2,
            min_water: 0.8,
            max_water: 1.2,
            min_lifetime: 0.7,
            max_lifetime: 1.0,
            initial_speed: 1.0,
            blur: Some(BlurConfig::default()),
        }
    }
}

impl RidgeFollowerConfig {
    /// Creates the default configuration with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Softer settings: fewer droplets, wider brushes, heavier smoothing.
    pub fn gentle(seed: u64) -> Self {
        Self {
            iterations: 30_000,
            seed,
            erode_speed: 0.15,
            deposit_speed: 0.2,
            erosion_radius: 4,
            deposition_radius: 3,
            blur: Some(BlurConfig { radius: 2, blend: 0.7 }),
            ..Default::default()
        }
    }

    /// Deep channels: more droplets, long paths, narrow brushes.
    pub fn aggressive(seed: u64) -> Self {
        Self {
            iterations: 150_000,
            seed,
            inertia: 0.1,
            capacity: 8.0,
            erode_speed: 0.5,
            max_path: 64,
            erosion_radius: 2,
            deposition_radius: 1,
            blur: None,
            ..Default::default()
        }
    }
}

/// Parameters for the physics-based droplet model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Number of droplets in a full run.
    pub iterations: u32,
    /// Seed for droplet placement.
    pub seed: u64,
    /// Integration time step.
    pub dt: f32,
    /// Water density; scales droplet mass.
    pub density: f32,
    /// Volume fraction lost per unit time.
    pub evaporation_rate: f32,
    /// Rate at which sediment approaches capacity.
    pub deposition_rate: f32,
    /// Droplets below this volume are discarded.
    pub min_volume: f32,
    /// Velocity damping per unit time.
    pub friction: f32,
    /// Vertical exaggeration applied to height differences when building normals.
    pub normal_scale: f32,
    /// Hard cap on integration steps per droplet.
    pub max_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            seed: 42,
            dt: 1.2,
            density: 1.0,
            evaporation_rate: 0.001,
            deposition_rate: 0.1,
            min_volume: 0.01,
            friction: 0.05,
            normal_scale: 60.0,
            max_steps: 4096,
        }
    }
}

impl PhysicsConfig {
    /// Creates the default configuration with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Faster-evaporating droplets; cheaper per iteration.
    pub fn fast(seed: u64) -> Self {
        Self {
            iterations: 40_000,
            seed,
            evaporation_rate: 0.01,
            max_steps: 512,
            ..Default::default()
        }
    }
}

/// A model's type tag plus its plain-data parameter record.
///
/// This is what crosses the boundary to a batch worker and what the CLI
/// reads from JSON, e.g. `{"model": "ridge_follower", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", content = "params", rename_all = "snake_case")]
pub enum ErosionModel {
    RidgeFollower(RidgeFollowerConfig),
    PhysicsBased(PhysicsConfig),
}

impl Default for ErosionModel {
    fn default() -> Self {
        Self::RidgeFollower(RidgeFollowerConfig::default())
    }
}

impl ErosionModel {
    /// Default configuration for the given model kind.
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::RidgeFollower => Self::RidgeFollower(RidgeFollowerConfig::default()),
            ModelKind::PhysicsBased => Self::PhysicsBased(PhysicsConfig::default()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::RidgeFollower(_) => ModelKind::RidgeFollower,
            Self::PhysicsBased(_) => ModelKind::PhysicsBased,
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            Self::RidgeFollower(c) => c.iterations,
            Self::PhysicsBased(c) => c.iterations,
        }
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        match self {
            Self::RidgeFollower(c) => c.iterations = iterations,
            Self::PhysicsBased(c) => c.iterations = iterations,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        match self {
            Self::RidgeFollower(c) => c.seed = seed,
            Self::PhysicsBased(c) => c.seed = seed,
        }
    }

    /// Reconstructs a fresh strategy instance from this record.
    pub fn build(&self) -> Box<dyn ErosionStrategy> {
        match self {
            Self::RidgeFollower(c) => Box::new(RidgeFollower::new(c.clone())),
            Self::PhysicsBased(c) => Box::new(PhysicsErosion::new(c.clone())),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ErosionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ErosionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
