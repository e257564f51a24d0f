use crate::cpu_state::CpuState;
use crate::error::{SimError, SimResult};
use crate::force::calculate_force;
use crate::grid::SpatialGrid;
use crate::interaction_matrix::InteractionMatrix;
use crate::particle::{apply_force, integrate_motion, random_jitter, reflect_into_unit_square, Particle};
use log::{debug, info, trace, warn};
use particle_life_common::{SimParams, SimulationConfig, Snapshot, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Whether `step` advances the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Paused,
    Running,
}

/// Manages the state and execution of the particle simulation on the CPU.
pub struct Simulation {
    /// The configuration the simulation was created from.
    config: SimulationConfig,
    /// Live parameters; changed only through the typed setters below.
    params: SimParams,
    /// Particle columns in CPU memory.
    state: CpuState,
    matrix: InteractionMatrix,
    grid: SpatialGrid,
    /// Host-side RNG for particle generation and matrix randomization.
    rng: StdRng,
    run_state: SimState,
    /// Number of running steps taken since creation or the last reset.
    current_time_step: u64,
    elapsed_time: f64,
}

impl Simulation {
    /// Creates a paused simulation and generates its initial particles.
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        config
            .validate()
            .map_err(|e| SimError::InvalidConfiguration(format!("{:#}", e)))?;

        let params = config.get_sim_params();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let i = &config.interactions;
        let matrix = InteractionMatrix::with_rng(
            params.num_types,
            i.min_radius,
            i.max_radius,
            i.global_repulsion,
            i.max_repulsion,
            &mut rng,
        )?;

        let mut sim = Self {
            state: CpuState::with_capacity(params.num_particles),
            grid: SpatialGrid::new(1),
            config,
            params,
            matrix,
            rng,
            run_state: SimState::Paused,
            current_time_step: 0,
            elapsed_time: 0.0,
        };
        sim.generate_particles(sim.params.num_particles);
        info!(
            "Simulation initialized with {} particles of {} types.",
            sim.particle_count(),
            sim.params.num_types
        );
        Ok(sim)
    }

    // --- Lifecycle ---

    /// Switches to running. An empty simulation first regenerates the configured population.
    pub fn start(&mut self) {
        if self.state.is_empty() {
            info!("Generating {} particles.", self.params.num_particles);
            self.generate_particles(self.params.num_particles);
        }
        if self.run_state == SimState::Paused {
            info!("Simulation started.");
        }
        self.run_state = SimState::Running;
    }

    /// Switches to paused. Particle state is kept as is.
    pub fn stop(&mut self) {
        if self.run_state == SimState::Running {
            info!("Simulation stopped at step {}.", self.current_time_step);
        }
        self.run_state = SimState::Paused;
    }

    /// Removes every particle and pauses. Nothing is regenerated until `start`.
    pub fn reset(&mut self) {
        info!("Resetting simulation ({} particles removed).", self.state.len());
        self.run_state = SimState::Paused;
        self.state.clear();
        self.grid.rebuild(self.grid.grid_size(), &[]);
        self.current_time_step = 0;
        self.elapsed_time = 0.0;
    }

    /// Advances the simulation by one step of length `dt * time_factor`. No-op while paused.
    pub fn step(&mut self, dt: f64) -> SimResult<()> {
        if self.run_state == SimState::Paused {
            return Ok(());
        }
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::ParameterOutOfRange {
                name: "dt",
                value: dt,
                expected: "a finite value >= 0",
            });
        }
        let step_start = Instant::now();
        let scaled_dt = dt * self.params.time_factor;

        // --- 1. Integrate motion (Parallel) ---
        self.integrate_parallel(scaled_dt);

        // --- 2. Rebuild spatial grid ---
        self.rebuild_grid();

        // --- 3. Accumulate neighbor forces into velocities (Parallel) ---
        self.accumulate_forces_parallel();

        // --- 4. Keep particles inside the unit square (Parallel) ---
        self.enforce_boundaries();

        self.current_time_step += 1;
        self.elapsed_time += scaled_dt;
        trace!(
            "Step {} ({} particles, grid {}x{}) took {:.3} ms",
            self.current_time_step,
            self.state.len(),
            self.grid.grid_size(),
            self.grid.grid_size(),
            step_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Friction decay, jitter and position advance for every particle.
    fn integrate_parallel(&mut self, scaled_dt: f64) {
        let seed = self.params.seed;
        let time_step = self.current_time_step;
        let state = &mut self.state;

        state
            .positions
            .par_iter_mut()
            .zip(state.velocities.par_iter_mut())
            .zip(state.frictions.par_iter())
            .zip(state.random_movements.par_iter())
            .enumerate()
            .for_each(|(idx, (((position, velocity), &friction), &random_movement))| {
                let jitter = if random_movement > 0.0 {
                    let mut rng = StdRng::seed_from_u64(jitter_seed(seed, time_step, idx));
                    random_jitter(random_movement, &mut rng)
                } else {
                    Vec2::zero()
                };
                integrate_motion(position, velocity, friction, jitter, scaled_dt);
            });
    }

    /// Re-bins every live particle. Also run after population changes so the grid never
    /// refers to removed particles or misses new ones.
    fn rebuild_grid(&mut self) {
        let grid_size = SpatialGrid::grid_size_for(
            self.state.len(),
            self.params.aspect_ratio,
            self.matrix.max_radius(),
        );
        self.grid.rebuild(grid_size, &self.state.positions);
    }

    /// Each particle sums the forces of its grid neighbors into its own velocity only;
    /// neighbor positions and types are read-only here.
    fn accumulate_forces_parallel(&mut self) {
        let positions = &self.state.positions;
        let type_ids = &self.state.type_ids;
        let grid = &self.grid;
        let matrix = &self.matrix;

        self.state
            .velocities
            .par_iter_mut()
            .zip(self.state.force_scalings.par_iter())
            .enumerate()
            .for_each(|(idx, (velocity, &force_scaling))| {
                let pos = positions[idx];
                let type_id = type_ids[idx];
                grid.for_each_neighbor(idx, |neighbor_idx| {
                    let force = calculate_force(
                        pos,
                        type_id,
                        positions[neighbor_idx],
                        type_ids[neighbor_idx],
                        matrix,
                    );
                    apply_force(velocity, force, force_scaling);
                });
            });
    }

    /// Reflects every particle that left the unit square back onto its edge.
    pub fn enforce_boundaries(&mut self) {
        let state = &mut self.state;
        state
            .positions
            .par_iter_mut()
            .zip(state.velocities.par_iter_mut())
            .for_each(|(position, velocity)| reflect_into_unit_square(position, velocity));
    }

    // --- Population ---

    /// Appends `count` freshly generated particles.
    pub fn add_particles(&mut self, count: usize) {
        self.generate_particles(count);
        debug!("Added {} particles ({} total).", count, self.state.len());
    }

    /// Removes up to `count` particles from the end. Returns how many were removed.
    pub fn remove_particles(&mut self, count: usize) -> usize {
        let current = self.state.len();
        if count > current {
            warn!(
                "Requested removal of {} particles but only {} exist. Removing all.",
                count, current
            );
        }
        let removed = count.min(current);
        self.state.truncate(current - removed);
        self.rebuild_grid();
        debug!("Removed {} particles ({} total).", removed, self.state.len());
        removed
    }

    /// Inserts a particle with fully specified state.
    pub fn insert_particle(&mut self, particle: Particle) -> SimResult<()> {
        if particle.type_id >= self.params.num_types {
            return Err(SimError::UnknownType {
                type_id: particle.type_id,
                num_types: self.params.num_types,
            });
        }
        if !(particle.position.is_finite() && particle.velocity.is_finite()) {
            return Err(SimError::ParameterOutOfRange {
                name: "position/velocity",
                value: f64::NAN,
                expected: "finite components",
            });
        }
        self.state.push(particle);
        self.rebuild_grid();
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        self.state.len()
    }

    /// Generates `count` particles with round-robin types, uniform positions in the unit
    /// square, uniform velocities in [-1, 1]^2 and the current per-particle settings.
    fn generate_particles(&mut self, count: usize) {
        let start = self.state.len();
        self.state.ensure_capacity(start + count);
        for idx in start..start + count {
            let particle = Particle {
                type_id: idx % self.params.num_types,
                position: Vec2::new(self.rng.random::<f64>(), self.rng.random::<f64>()),
                velocity: Vec2::new(
                    self.rng.random_range(-1.0..=1.0),
                    self.rng.random_range(-1.0..=1.0),
                ),
                size: self.params.particle_size,
                friction: self.params.friction,
                force_scaling: self.params.force_scaling,
                random_movement: self.params.random_movement,
            };
            self.state.push(particle);
        }
        self.rebuild_grid();
    }

    // --- Live tuning ---

    pub fn friction(&self) -> f64 {
        self.params.friction
    }

    /// Sets the friction of every live particle and of particles created later.
    pub fn set_friction(&mut self, friction: f64) -> SimResult<()> {
        if !(0.0..=1.0).contains(&friction) {
            return Err(out_of_range("friction", friction, "[0, 1]"));
        }
        self.params.friction = friction;
        self.state.frictions.fill(friction);
        debug!("Friction set to {}.", friction);
        Ok(())
    }

    pub fn random_movement(&self) -> f64 {
        self.params.random_movement
    }

    pub fn set_random_movement(&mut self, random_movement: f64) -> SimResult<()> {
        if !(random_movement.is_finite() && random_movement >= 0.0) {
            return Err(out_of_range("random_movement", random_movement, ">= 0"));
        }
        self.params.random_movement = random_movement;
        self.state.random_movements.fill(random_movement);
        debug!("Random movement set to {}.", random_movement);
        Ok(())
    }

    pub fn force_scaling(&self) -> f64 {
        self.params.force_scaling
    }

    pub fn set_force_scaling(&mut self, force_scaling: f64) -> SimResult<()> {
        if !(force_scaling.is_finite() && force_scaling >= 0.0) {
            return Err(out_of_range("force_scaling", force_scaling, ">= 0"));
        }
        self.params.force_scaling = force_scaling;
        self.state.force_scalings.fill(force_scaling);
        debug!("Force scaling set to {}.", force_scaling);
        Ok(())
    }

    pub fn time_factor(&self) -> f64 {
        self.params.time_factor
    }

    /// Scales the time factor by `1 + delta_percent / 100` and returns the new value.
    pub fn adjust_time_factor(&mut self, delta_percent: f64) -> SimResult<f64> {
        let time_factor = self.params.time_factor * (1.0 + delta_percent / 100.0);
        if !(time_factor.is_finite() && time_factor > 0.0) {
            return Err(out_of_range("time_factor", time_factor, "> 0"));
        }
        self.params.time_factor = time_factor;
        debug!("Time factor adjusted by {}% to {}.", delta_percent, time_factor);
        Ok(time_factor)
    }

    // --- Interaction matrix ---

    pub fn interaction_matrix(&self) -> &InteractionMatrix {
        &self.matrix
    }

    pub fn randomize_fields(&mut self) {
        self.matrix.randomize_fields(&mut self.rng);
        debug!("Interaction matrix randomized.");
    }

    pub fn interaction(&self, type_i: usize, type_j: usize) -> SimResult<f64> {
        self.matrix.interaction(type_i, type_j)
    }

    pub fn set_interaction(&mut self, type_i: usize, type_j: usize, value: f64) -> SimResult<()> {
        self.matrix.set_interaction(type_i, type_j, value)
    }

    /// Editor click: moves one coefficient by `steps` increments of 0.2.
    pub fn adjust_interaction(&mut self, type_i: usize, type_j: usize, steps: i32) -> SimResult<f64> {
        self.matrix.adjust_interaction(type_i, type_j, steps)
    }

    pub fn min_radius(&self) -> f64 {
        self.matrix.min_radius()
    }

    /// Rejects values that are not in `(0, max_radius)`.
    pub fn set_min_radius(&mut self, min_radius: f64) -> SimResult<()> {
        if !(min_radius > 0.0 && min_radius < self.matrix.max_radius()) {
            return Err(out_of_range("min_radius", min_radius, "0 < min_radius < max_radius"));
        }
        self.matrix.set_min_radius(min_radius);
        debug!("Min radius set to {}.", min_radius);
        Ok(())
    }

    pub fn max_radius(&self) -> f64 {
        self.matrix.max_radius()
    }

    /// Rejects values that are not finite and greater than `min_radius`.
    pub fn set_max_radius(&mut self, max_radius: f64) -> SimResult<()> {
        if !(max_radius.is_finite() && max_radius > self.matrix.min_radius()) {
            return Err(out_of_range("max_radius", max_radius, "max_radius > min_radius"));
        }
        self.matrix.set_max_radius(max_radius);
        debug!("Max radius set to {}.", max_radius);
        Ok(())
    }

    pub fn global_repulsion(&self) -> f64 {
        self.matrix.global_repulsion()
    }

    pub fn set_global_repulsion(&mut self, global_repulsion: f64) -> SimResult<()> {
        if !(global_repulsion.is_finite() && global_repulsion >= 0.0) {
            return Err(out_of_range("global_repulsion", global_repulsion, ">= 0"));
        }
        self.matrix.set_global_repulsion(global_repulsion);
        debug!("Global repulsion set to {}.", global_repulsion);
        Ok(())
    }

    pub fn max_repulsion(&self) -> f64 {
        self.matrix.max_repulsion()
    }

    pub fn set_max_repulsion(&mut self, max_repulsion: f64) -> SimResult<()> {
        if !(max_repulsion.is_finite() && max_repulsion > 0.0) {
            return Err(out_of_range("max_repulsion", max_repulsion, "> 0"));
        }
        self.matrix.set_max_repulsion(max_repulsion);
        debug!("Max repulsion set to {}.", max_repulsion);
        Ok(())
    }

    // --- Queries ---

    /// `(position, type_id)` of every particle, in storage order. Read once per frame by renderers.
    pub fn particles(&self) -> impl Iterator<Item = (Vec2, usize)> + '_ {
        self.state
            .positions
            .iter()
            .copied()
            .zip(self.state.type_ids.iter().copied())
    }

    pub fn particle(&self, idx: usize) -> Option<Particle> {
        self.state.particle(idx)
    }

    /// Live particle count per type.
    pub fn type_counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.params.num_types];
        for &type_id in &self.state.type_ids {
            counts[type_id] += 1;
        }
        counts
    }

    /// Summary of the current state, optionally with every particle position.
    pub fn snapshot(&self, include_positions: bool) -> Snapshot {
        let count = self.state.len();
        let mean_speed = if count > 0 {
            self.state.velocities.par_iter().map(|v| v.length()).sum::<f64>() / count as f64
        } else {
            0.0
        };
        let positions = include_positions.then(|| {
            self.particles()
                .map(|(pos, type_id)| (pos.x, pos.y, type_id))
                .collect()
        });

        Snapshot {
            time: self.elapsed_time,
            step: self.current_time_step,
            total_particle_count: count as u32,
            type_counts: self.type_counts(),
            mean_speed,
            positions,
        }
    }

    pub fn state(&self) -> SimState {
        self.run_state
    }

    pub fn is_paused(&self) -> bool {
        self.run_state == SimState::Paused
    }

    pub fn current_step(&self) -> u64 {
        self.current_time_step
    }

    /// Simulated time, the sum of `dt * time_factor` over all running steps.
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }
}

fn out_of_range(name: &'static str, value: f64, expected: &'static str) -> SimError {
    SimError::ParameterOutOfRange { name, value, expected }
}

// Distinct jitter stream per (run seed, step, particle), independent of thread scheduling.
#[inline(always)]
fn jitter_seed(seed: u64, time_step: u64, particle_idx: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ time_step.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ (particle_idx as u64).wrapping_mul(0x94D0_49BB_1331_11EB)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_particles: u32) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.initial_conditions.num_particles = num_particles;
        config.initial_conditions.num_types = 3;
        config.initial_conditions.seed = 1234;
        config
    }

    fn still_particle(type_id: usize, x: f64, y: f64) -> Particle {
        Particle {
            type_id,
            position: Vec2::new(x, y),
            velocity: Vec2::zero(),
            size: 1.0,
            friction: 0.5,
            force_scaling: 0.1,
            random_movement: 0.0,
        }
    }

    fn positions(sim: &Simulation) -> Vec<Vec2> {
        sim.particles().map(|(pos, _)| pos).collect()
    }

    #[test]
    fn new_simulation_is_paused_with_configured_population() {
        let sim = Simulation::new(config(200)).unwrap();
        assert!(sim.is_paused());
        assert_eq!(sim.particle_count(), 200);
        assert_eq!(sim.type_counts(), vec![67, 67, 66]);
        for (pos, type_id) in sim.particles() {
            assert!((0.0..=1.0).contains(&pos.x) && (0.0..=1.0).contains(&pos.y));
            assert!(type_id < 3);
        }
        for idx in 0..sim.particle_count() {
            let p = sim.particle(idx).unwrap();
            assert!(p.velocity.x.abs() <= 1.0 && p.velocity.y.abs() <= 1.0);
            assert_eq!(p.friction, 0.5);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config(10);
        bad.interactions.min_radius = 0.5;
        bad.interactions.max_radius = 0.1;
        assert!(matches!(
            Simulation::new(bad),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn step_is_noop_while_paused() {
        let mut sim = Simulation::new(config(100)).unwrap();
        let before = positions(&sim);
        sim.step(0.1).unwrap();
        assert_eq!(positions(&sim), before);
        assert_eq!(sim.current_step(), 0);
    }

    #[test]
    fn particles_stay_inside_unit_square() {
        let mut cfg = config(400);
        cfg.timing.time_factor = 5.0;
        cfg.particle_params.force_scaling = 1.0;
        cfg.particle_params.random_movement = 0.5;
        cfg.particle_params.friction = 0.05;
        cfg.interactions.global_repulsion = 0.01;
        let mut sim = Simulation::new(cfg).unwrap();
        sim.start();
        for _ in 0..50 {
            sim.step(0.1).unwrap();
            for (pos, _) in sim.particles() {
                assert!(pos.is_finite());
                assert!((0.0..=1.0).contains(&pos.x), "x = {}", pos.x);
                assert!((0.0..=1.0).contains(&pos.y), "y = {}", pos.y);
            }
        }
        assert_eq!(sim.current_step(), 50);
    }

    #[test]
    fn stop_preserves_particles() {
        let mut sim = Simulation::new(config(50)).unwrap();
        sim.start();
        sim.step(0.1).unwrap();
        sim.stop();
        let first: Vec<_> = (0..50).map(|i| sim.particle(i).unwrap()).collect();
        sim.stop();
        let second: Vec<_> = (0..50).map(|i| sim.particle(i).unwrap()).collect();
        assert_eq!(first, second);
        sim.step(0.1).unwrap();
        assert_eq!(positions(&sim), first.iter().map(|p| p.position).collect::<Vec<_>>());
    }

    #[test]
    fn reset_empties_and_start_regenerates() {
        let mut sim = Simulation::new(config(120)).unwrap();
        sim.start();
        sim.step(0.1).unwrap();
        sim.reset();
        assert_eq!(sim.particle_count(), 0);
        assert!(sim.is_paused());
        assert_eq!(sim.current_step(), 0);

        sim.start();
        assert_eq!(sim.particle_count(), 120);
        assert_eq!(sim.state(), SimState::Running);
    }

    #[test]
    fn start_keeps_existing_population() {
        let mut sim = Simulation::new(config(30)).unwrap();
        sim.remove_particles(10);
        sim.start();
        assert_eq!(sim.particle_count(), 20);
    }

    #[test]
    fn add_and_remove_particles() {
        let mut sim = Simulation::new(config(10)).unwrap();
        sim.add_particles(5);
        assert_eq!(sim.particle_count(), 15);
        assert_eq!(sim.type_counts(), vec![5, 5, 5]);
        assert_eq!(sim.remove_particles(4), 4);
        assert_eq!(sim.particle_count(), 11);
        assert_eq!(sim.remove_particles(100), 11);
        assert_eq!(sim.particle_count(), 0);
        assert_eq!(sim.remove_particles(1), 0);
    }

    #[test]
    fn setters_broadcast_and_apply_to_new_particles() {
        let mut sim = Simulation::new(config(20)).unwrap();
        sim.set_friction(0.2).unwrap();
        sim.set_random_movement(0.0).unwrap();
        sim.set_force_scaling(0.7).unwrap();
        sim.add_particles(5);
        for idx in 0..sim.particle_count() {
            let p = sim.particle(idx).unwrap();
            assert_eq!(p.friction, 0.2);
            assert_eq!(p.random_movement, 0.0);
            assert_eq!(p.force_scaling, 0.7);
        }
        assert_eq!(sim.friction(), 0.2);
        assert_eq!(sim.force_scaling(), 0.7);
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let mut sim = Simulation::new(config(5)).unwrap();
        assert!(matches!(sim.set_friction(1.5), Err(SimError::ParameterOutOfRange { .. })));
        assert!(sim.set_friction(f64::NAN).is_err());
        assert!(sim.set_random_movement(-0.1).is_err());
        assert!(sim.set_force_scaling(f64::INFINITY).is_err());
        assert!(sim.set_global_repulsion(-1.0).is_err());
        assert!(sim.set_max_repulsion(0.0).is_err());
        assert!(sim.set_min_radius(-0.01).is_err());
        assert!(sim.set_min_radius(sim.max_radius()).is_err());
        assert!(sim.set_max_radius(sim.min_radius()).is_err());
        assert_eq!(sim.friction(), 0.5);

        sim.set_min_radius(0.01).unwrap();
        sim.set_max_radius(0.08).unwrap();
        sim.set_global_repulsion(0.0).unwrap();
        assert_eq!(sim.interaction_matrix().min_radius(), 0.01);
        assert_eq!(sim.max_radius(), 0.08);
        assert_eq!(sim.global_repulsion(), 0.0);
    }

    #[test]
    fn time_factor_adjusts_by_percent() {
        let mut sim = Simulation::new(config(5)).unwrap();
        let tf = sim.time_factor();
        let raised = sim.adjust_time_factor(50.0).unwrap();
        assert!((raised - tf * 1.5).abs() < 1e-12);
        assert!(sim.adjust_time_factor(-100.0).is_err());
        assert_eq!(sim.time_factor(), raised);
        sim.start();
        sim.step(0.2).unwrap();
        assert!((sim.elapsed_time() - 0.2 * raised).abs() < 1e-12);
    }

    #[test]
    fn negative_dt_is_rejected_while_running() {
        let mut sim = Simulation::new(config(5)).unwrap();
        sim.start();
        assert!(sim.step(-0.1).is_err());
        assert!(sim.step(f64::NAN).is_err());
    }

    #[test]
    fn attracting_pair_moves_closer() {
        let mut cfg = config(0);
        cfg.timing.time_factor = 1.0;
        cfg.interactions.min_radius = 0.01;
        cfg.interactions.max_radius = 0.05;
        cfg.interactions.global_repulsion = 0.0;
        let mut sim = Simulation::new(cfg).unwrap();
        sim.set_interaction(0, 0, 1.0).unwrap();
        sim.insert_particle(still_particle(0, 0.50, 0.5)).unwrap();
        sim.insert_particle(still_particle(0, 0.52, 0.5)).unwrap();

        sim.start();
        assert_eq!(sim.particle_count(), 2);
        sim.step(0.1).unwrap();
        sim.step(0.1).unwrap();

        let a = sim.particle(0).unwrap().position;
        let b = sim.particle(1).unwrap().position;
        assert!(a.distance(b) < 0.02, "distance {}", a.distance(b));
        assert!(a.x > 0.5 && b.x < 0.52);
    }

    #[test]
    fn distant_particles_only_feel_global_repulsion() {
        let mut cfg = config(0);
        cfg.timing.time_factor = 1.0;
        cfg.interactions.global_repulsion = 0.0;
        let mut sim = Simulation::new(cfg).unwrap();
        sim.set_interaction(0, 1, 1.0).unwrap();
        sim.insert_particle(still_particle(0, 0.2, 0.2)).unwrap();
        sim.insert_particle(still_particle(1, 0.8, 0.8)).unwrap();
        sim.start();
        sim.step(0.1).unwrap();
        assert_eq!(sim.particle(0).unwrap().velocity, Vec2::zero());
        assert_eq!(sim.particle(1).unwrap().velocity, Vec2::zero());
    }

    #[test]
    fn enforce_boundaries_pulls_particles_back() {
        let mut sim = Simulation::new(config(0)).unwrap();
        let mut p = still_particle(0, 0.0, 0.0);
        p.position = Vec2::new(-0.2, 1.3);
        p.velocity = Vec2::new(-1.0, 1.0);
        sim.insert_particle(p).unwrap();
        sim.enforce_boundaries();
        let p = sim.particle(0).unwrap();
        assert_eq!(p.position, Vec2::new(0.0, 1.0));
        assert_eq!(p.velocity, Vec2::new(1.0, -1.0));
    }

    #[test]
    fn insert_rejects_unknown_type() {
        let mut sim = Simulation::new(config(0)).unwrap();
        assert_eq!(
            sim.insert_particle(still_particle(3, 0.5, 0.5)),
            Err(SimError::UnknownType { type_id: 3, num_types: 3 })
        );
    }

    #[test]
    fn same_seed_gives_identical_runs() {
        let run = || {
            let mut sim = Simulation::new(config(300)).unwrap();
            sim.start();
            for _ in 0..10 {
                sim.step(0.1).unwrap();
            }
            positions(&sim)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn matrix_controls_pass_through() {
        let mut sim = Simulation::new(config(5)).unwrap();
        sim.set_interaction(1, 2, 0.4).unwrap();
        assert_eq!(sim.interaction(1, 2).unwrap(), 0.4);
        assert_eq!(sim.adjust_interaction(1, 2, -1).unwrap(), 0.2);
        assert!(sim.interaction(3, 0).is_err());
        sim.randomize_fields();
        assert!(sim
            .interaction_matrix()
            .as_slice()
            .iter()
            .all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn snapshot_reports_population() {
        let mut sim = Simulation::new(config(9)).unwrap();
        sim.start();
        sim.step(0.1).unwrap();
        let snap = sim.snapshot(true);
        assert_eq!(snap.step, 1);
        assert_eq!(snap.total_particle_count, 9);
        assert_eq!(snap.type_counts, vec![3, 3, 3]);
        assert_eq!(snap.positions.as_ref().map(Vec::len), Some(9));
        assert!(snap.mean_speed.is_finite() && snap.mean_speed >= 0.0);
        assert!(sim.snapshot(false).positions.is_none());
    }

    fn assert_grid_covers_population(sim: &Simulation) {
        let count = sim.particle_count();
        let grid = sim.grid();
        let mut seen = vec![0usize; count];
        for ix in 0..grid.grid_size() {
            for iy in 0..grid.grid_size() {
                for &idx in grid.cell_particles((ix, iy)) {
                    assert!((idx as usize) < count, "stale index {} (count {})", idx, count);
                    seen[idx as usize] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        for idx in 0..count {
            assert!(grid.neighbors_of(idx).all(|n| n < count));
        }
    }

    #[test]
    fn grid_follows_population_changes() {
        let mut sim = Simulation::new(config(100)).unwrap();
        assert_grid_covers_population(&sim);
        sim.start();
        sim.step(0.1).unwrap();

        sim.remove_particles(90);
        assert_eq!(sim.particle_count(), 10);
        assert_grid_covers_population(&sim);

        sim.add_particles(25);
        assert_grid_covers_population(&sim);

        sim.insert_particle(still_particle(1, 0.5, 0.5)).unwrap();
        assert_eq!(sim.particle_count(), 36);
        assert_grid_covers_population(&sim);

        sim.reset();
        assert_grid_covers_population(&sim);
    }

    #[test]
    fn grid_neighbors_match_brute_force_within_max_radius() {
        let mut cfg = config(2000);
        cfg.interactions.max_radius = 0.05;
        cfg.interactions.min_radius = 0.02;
        let sim = Simulation::new(cfg).unwrap();
        let max_radius = sim.max_radius();
        // capped by 1 / max_radius rather than by density
        assert_eq!(sim.grid().grid_size(), 20);

        let all: Vec<(Vec2, usize)> = sim.particles().collect();
        let matrix = sim.interaction_matrix();
        let in_range = |i: usize, j: usize| all[i].0.distance(all[j].0) <= max_radius;

        let mut checked = 0;
        for (i, &(pos, type_id)) in all.iter().enumerate() {
            let interior = (max_radius..=1.0 - max_radius).contains(&pos.x)
                && (max_radius..=1.0 - max_radius).contains(&pos.y);
            if !interior {
                continue;
            }

            let mut via_grid = Vec2::zero();
            let mut grid_pairs = 0;
            sim.grid().for_each_neighbor(i, |j| {
                if in_range(i, j) {
                    via_grid += calculate_force(pos, type_id, all[j].0, all[j].1, matrix);
                    grid_pairs += 1;
                }
            });

            let mut brute = Vec2::zero();
            let mut brute_pairs = 0;
            for j in (0..all.len()).filter(|&j| j != i && in_range(i, j)) {
                brute += calculate_force(pos, type_id, all[j].0, all[j].1, matrix);
                brute_pairs += 1;
            }

            assert_eq!(grid_pairs, brute_pairs, "particle {} missed a neighbor", i);
            assert!(via_grid.distance(brute) < 1e-9, "particle {}: {:?} vs {:?}", i, via_grid, brute);
            checked += 1;
        }
        assert!(checked > 1000);
    }
}
