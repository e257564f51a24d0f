use crate::particle::Particle;
use particle_life_common::Vec2;

/// Holds the particle state vectors on the CPU, one column per attribute.
///
/// Index `i` in every column belongs to the same particle. All columns always have
/// the same length.
#[derive(Debug, Clone, Default)]
pub struct CpuState {
    pub positions: Vec<Vec2>,
    pub velocities: Vec<Vec2>,
    pub type_ids: Vec<usize>,
    pub sizes: Vec<f64>,
    pub frictions: Vec<f64>,
    pub force_scalings: Vec<f64>,
    pub random_movements: Vec<f64>,
}

impl CpuState {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            type_ids: Vec::with_capacity(capacity),
            sizes: Vec::with_capacity(capacity),
            frictions: Vec::with_capacity(capacity),
            force_scalings: Vec::with_capacity(capacity),
            random_movements: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Ensures all state vectors have room for `required_capacity` particles.
    pub fn ensure_capacity(&mut self, required_capacity: usize) {
        let capacity = self.positions.capacity();
        if required_capacity > capacity {
            let new_capacity = (required_capacity as f64 * 1.2).ceil() as usize; // Grow by 20%
            log::debug!(
                "Resizing state vectors from {} to {} capacity.",
                capacity,
                new_capacity
            );
            let additional = new_capacity - self.len();
            self.positions.reserve_exact(additional);
            self.velocities.reserve_exact(additional);
            self.type_ids.reserve_exact(additional);
            self.sizes.reserve_exact(additional);
            self.frictions.reserve_exact(additional);
            self.force_scalings.reserve_exact(additional);
            self.random_movements.reserve_exact(additional);
        }
    }

    /// Appends a particle at the end of every column.
    pub fn push(&mut self, particle: Particle) {
        self.positions.push(particle.position);
        self.velocities.push(particle.velocity);
        self.type_ids.push(particle.type_id);
        self.sizes.push(particle.size);
        self.frictions.push(particle.friction);
        self.force_scalings.push(particle.force_scaling);
        self.random_movements.push(particle.random_movement);
    }

    /// Keeps the first `len` particles and drops the rest.
    pub fn truncate(&mut self, len: usize) {
        self.positions.truncate(len);
        self.velocities.truncate(len);
        self.type_ids.truncate(len);
        self.sizes.truncate(len);
        self.frictions.truncate(len);
        self.force_scalings.truncate(len);
        self.random_movements.truncate(len);
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Reassembles the row for particle `idx`.
    pub fn particle(&self, idx: usize) -> Option<Particle> {
        if idx >= self.len() {
            return None;
        }
        Some(Particle {
            type_id: self.type_ids[idx],
            position: self.positions[idx],
            velocity: self.velocities[idx],
            size: self.sizes[idx],
            friction: self.frictions[idx],
            force_scaling: self.force_scalings[idx],
            random_movement: self.random_movements[idx],
        })
    }
}
