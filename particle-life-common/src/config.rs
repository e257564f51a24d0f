use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use crate::sim_params::SimParams;
use std::path::Path;

// Extent of the drawing surface; only the aspect ratio reaches the physics (grid sizing).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UniverseConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self { width: 1920.0, height: 1080.0 }
    }
}

// Configuration for timing of the headless driver
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub dt: f64,
    /// Initial simulation speed multiplier, adjustable at runtime.
    pub time_factor: f64,
    pub total_steps: u32,
    #[serde(default = "default_record_interval_steps")]
    pub record_interval_steps: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            time_factor: 0.1,
            total_steps: 1000,
            record_interval_steps: default_record_interval_steps(),
        }
    }
}

fn default_record_interval_steps() -> u32 {
    100
}

// Initial population, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub num_particles: u32,
    /// Number of particle types. Fixed for the lifetime of a simulation.
    pub num_types: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self { num_particles: 1000, num_types: 4, seed: default_seed() }
    }
}

fn default_seed() -> u64 {
    42
}

// Settings given to every newly generated particle
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ParticleParamsConfig {
    /// Rendering radius. Not used by the physics.
    #[serde(default = "default_size")]
    pub size: f64,
    /// Fraction of velocity removed each step, in [0, 1].
    pub friction: f64,
    /// Multiplier turning an accumulated force into a velocity change.
    pub force_scaling: f64,
    /// Magnitude of the positional jitter added each step.
    pub random_movement: f64,
}

impl Default for ParticleParamsConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            friction: 0.5,
            force_scaling: 0.1,
            random_movement: 0.01,
        }
    }
}

fn default_size() -> f64 {
    1.0
}

// Global scalars of the interaction matrix
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InteractionConfig {
    pub min_radius: f64,
    pub max_radius: f64,
    pub global_repulsion: f64,
    #[serde(default = "default_max_repulsion")]
    pub max_repulsion: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_radius: 0.02,
            max_radius: 0.05,
            global_repulsion: 0.001,
            max_repulsion: default_max_repulsion(),
        }
    }
}

fn default_max_repulsion() -> f64 {
    1.0
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EngineConfig {
    /// Rayon worker threads. `None` lets rayon pick one per core.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    pub particle_params: ParticleParamsConfig,
    pub interactions: InteractionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SimulationConfig {
    /// Loads and validates the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file '{}'", path_ref.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file '{}'", path_ref.display()))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its physical domain.
    pub fn validate(&self) -> Result<()> {
        let u = &self.universe;
        if !(u.width.is_finite() && u.height.is_finite() && u.width > 0.0 && u.height > 0.0) {
            anyhow::bail!("universe width and height must be positive and finite.");
        }
        if !(self.timing.dt.is_finite() && self.timing.dt > 0.0) {
            anyhow::bail!("timing.dt must be positive.");
        }
        if !(self.timing.time_factor.is_finite() && self.timing.time_factor > 0.0) {
            anyhow::bail!("timing.time_factor must be positive.");
        }
        if self.initial_conditions.num_types == 0 {
            anyhow::bail!("num_types must be greater than 0.");
        }

        let p = &self.particle_params;
        if !(0.0..=1.0).contains(&p.friction) {
            anyhow::bail!("friction must be within [0, 1], got {}.", p.friction);
        }
        if !(p.random_movement.is_finite() && p.random_movement >= 0.0) {
            anyhow::bail!("random_movement must be non-negative, got {}.", p.random_movement);
        }
        if !(p.force_scaling.is_finite() && p.force_scaling >= 0.0) {
            anyhow::bail!("force_scaling must be non-negative, got {}.", p.force_scaling);
        }
        if !(p.size.is_finite() && p.size >= 0.0) {
            anyhow::bail!("size must be non-negative, got {}.", p.size);
        }

        let i = &self.interactions;
        if !(i.min_radius > 0.0 && i.max_radius > 0.0) {
            anyhow::bail!("min_radius and max_radius must be positive.");
        }
        if i.min_radius >= i.max_radius {
            anyhow::bail!(
                "min_radius ({}) must be smaller than max_radius ({}).",
                i.min_radius,
                i.max_radius
            );
        }
        if !(i.global_repulsion.is_finite() && i.global_repulsion >= 0.0) {
            anyhow::bail!("global_repulsion must be non-negative.");
        }
        if !(i.max_repulsion.is_finite() && i.max_repulsion > 0.0) {
            anyhow::bail!("max_repulsion must be positive.");
        }
        if self.engine.num_threads == Some(0) {
            anyhow::bail!("engine.num_threads must be at least 1 when set.");
        }

        Ok(())
    }

    /// Converts the configuration into the runtime parameter block.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            aspect_ratio: self.universe.width / self.universe.height,
            dt: self.timing.dt,
            time_factor: self.timing.time_factor,
            num_particles: self.initial_conditions.num_particles as usize,
            num_types: self.initial_conditions.num_types as usize,
            particle_size: self.particle_params.size,
            friction: self.particle_params.friction,
            force_scaling: self.particle_params.force_scaling,
            random_movement: self.particle_params.random_movement,
            seed: self.initial_conditions.seed,
        }
    }
}
