use serde::{Deserialize, Serialize};

/// Summary of the simulation state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Simulated time, the sum of `dt * time_factor` over all running steps.
    pub time: f64,
    /// Number of running steps taken so far.
    pub step: u64,
    pub total_particle_count: u32,
    /// `type_counts[t]` is the number of live particles of type `t`.
    pub type_counts: Vec<u32>,
    /// Mean velocity magnitude over all particles (0 when empty).
    pub mean_speed: f64,
    /// Optional `(x, y, type_id)` of every particle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<(f64, f64, usize)>>,
}
