use particle_life_common::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Full state of a single particle.
///
/// The simulation stores particles column-wise in [`CpuState`](crate::cpu_state::CpuState);
/// this type is the row view handed out to callers and used to seed new particles.
/// Both paths run the same kernels below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub type_id: usize,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Rendering radius, ignored by the physics.
    pub size: f64,
    pub friction: f64,
    pub force_scaling: f64,
    pub random_movement: f64,
}

impl Particle {
    /// Adds `force * force_scaling` to the velocity.
    pub fn apply_force(&mut self, force: Vec2) {
        apply_force(&mut self.velocity, force, self.force_scaling);
    }

    /// Advances the particle by one step, drawing its jitter from `rng`.
    pub fn update_position<R: Rng + ?Sized>(&mut self, dt: f64, time_factor: f64, rng: &mut R) {
        let jitter = random_jitter(self.random_movement, rng);
        integrate_motion(
            &mut self.position,
            &mut self.velocity,
            self.friction,
            jitter,
            dt * time_factor,
        );
    }

    pub fn enforce_boundaries(&mut self) {
        reflect_into_unit_square(&mut self.position, &mut self.velocity);
    }
}

/// Velocity impulse: the force is not integrated over `dt`.
#[inline(always)]
pub fn apply_force(velocity: &mut Vec2, force: Vec2, force_scaling: f64) {
    *velocity += force * force_scaling;
}

/// Uniform sample from `[-magnitude, magnitude]` on each axis.
#[inline]
pub fn random_jitter<R: Rng + ?Sized>(magnitude: f64, rng: &mut R) -> Vec2 {
    if magnitude <= 0.0 {
        return Vec2::zero();
    }
    Vec2::new(
        (rng.random::<f64>() * 2.0 - 1.0) * magnitude,
        (rng.random::<f64>() * 2.0 - 1.0) * magnitude,
    )
}

/// Friction decay, then jitter and velocity both scaled by `scaled_dt` (= dt * time_factor).
#[inline(always)]
pub fn integrate_motion(
    position: &mut Vec2,
    velocity: &mut Vec2,
    friction: f64,
    jitter: Vec2,
    scaled_dt: f64,
) {
    *velocity = *velocity * (1.0 - friction);
    *position += (jitter + *velocity) * scaled_dt;
}

/// Clamps the position into [0, 1]^2 and bounces the velocity component that points outward.
///
/// A particle on the boundary whose velocity already points inward is left alone.
#[inline(always)]
pub fn reflect_into_unit_square(position: &mut Vec2, velocity: &mut Vec2) {
    if position.x < 0.0 {
        position.x = 0.0;
        velocity.x = velocity.x.abs();
    } else if position.x > 1.0 {
        position.x = 1.0;
        velocity.x = -velocity.x.abs();
    }

    if position.y < 0.0 {
        position.y = 0.0;
        velocity.y = velocity.y.abs();
    } else if position.y > 1.0 {
        position.y = 1.0;
        velocity.y = -velocity.y.abs();
    }
}
