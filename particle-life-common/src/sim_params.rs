use serde::{Deserialize, Serialize};

/// Runtime parameters derived from the configuration.
///
/// The simulation owns one of these and changes it only through its typed setters,
/// so particles generated later pick up the current values rather than the startup ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // Domain
    pub aspect_ratio: f64, // width / height of the drawing surface

    // Time
    pub dt: f64,
    pub time_factor: f64,

    // Population
    pub num_particles: usize, // Count generated by start() on an empty simulation
    pub num_types: usize,

    // Per-particle defaults, broadcast to live particles when changed
    pub particle_size: f64,
    pub friction: f64,
    pub force_scaling: f64,
    pub random_movement: f64,

    pub seed: u64,
}
