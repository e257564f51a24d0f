//! Particle life: point particles of a few types attract or repel each other
//! according to an asymmetric interaction matrix, inside the unit square.

pub mod cpu_state;
pub mod error;
pub mod force;
pub mod grid;
pub mod interaction_matrix;
pub mod particle;
pub mod simulation;

// Re-export key types for easier use by dependent crates
pub use error::{SimError, SimResult};
pub use interaction_matrix::InteractionMatrix;
pub use particle::Particle;
pub use particle_life_common::{SimParams, SimulationConfig, Snapshot, Vec2};
pub use simulation::{SimState, Simulation};
