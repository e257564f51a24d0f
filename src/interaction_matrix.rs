use crate::error::{SimError, SimResult};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Coefficient change per editor click.
pub const INTERACTION_ADJUST_STEP: f64 = 0.2;

/// Magnitudes drawn when (re)randomizing a coefficient; the sign is drawn separately.
const COEFFICIENT_MAGNITUDES: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

/// Per-type-pair force coefficients plus the global force-law scalars.
///
/// Coefficients live in a dense row-major `num_types x num_types` table.
/// `get(i, j)` is the pull that type `j` exerts on type `i`; the table is not
/// required to be symmetric, so forces are not guaranteed equal and opposite.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    number_of_types: usize,
    interactions: Vec<f64>,
    min_radius: f64,
    max_radius: f64,
    global_repulsion: f64,
    max_repulsion: f64,
}

impl InteractionMatrix {
    /// Creates a matrix with randomized coefficients, drawing from the thread RNG.
    pub fn new(
        number_of_types: usize,
        min_radius: f64,
        max_radius: f64,
        global_repulsion: f64,
        max_repulsion: f64,
    ) -> SimResult<Self> {
        Self::with_rng(
            number_of_types,
            min_radius,
            max_radius,
            global_repulsion,
            max_repulsion,
            &mut rand::rng(),
        )
    }

    /// Creates a matrix with randomized coefficients drawn from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        number_of_types: usize,
        min_radius: f64,
        max_radius: f64,
        global_repulsion: f64,
        max_repulsion: f64,
        rng: &mut R,
    ) -> SimResult<Self> {
        let mut matrix = Self::zeroed(
            number_of_types,
            min_radius,
            max_radius,
            global_repulsion,
            max_repulsion,
        )?;
        matrix.randomize_fields(rng);
        Ok(matrix)
    }

    /// Creates a matrix with every coefficient set to zero.
    pub fn zeroed(
        number_of_types: usize,
        min_radius: f64,
        max_radius: f64,
        global_repulsion: f64,
        max_repulsion: f64,
    ) -> SimResult<Self> {
        if number_of_types == 0 {
            return Err(SimError::InvalidConfiguration(
                "number of types must be greater than 0".into(),
            ));
        }
        if !(min_radius > 0.0 && max_radius > 0.0) || !max_radius.is_finite() {
            return Err(SimError::InvalidConfiguration(format!(
                "radii must be positive and finite (min_radius = {}, max_radius = {})",
                min_radius, max_radius
            )));
        }
        if min_radius >= max_radius {
            return Err(SimError::InvalidConfiguration(format!(
                "min_radius ({}) must be smaller than max_radius ({})",
                min_radius, max_radius
            )));
        }
        if !(global_repulsion.is_finite() && global_repulsion >= 0.0) {
            return Err(SimError::InvalidConfiguration(format!(
                "global_repulsion must be non-negative, got {}",
                global_repulsion
            )));
        }
        if !(max_repulsion.is_finite() && max_repulsion > 0.0) {
            return Err(SimError::InvalidConfiguration(format!(
                "max_repulsion must be positive, got {}",
                max_repulsion
            )));
        }

        Ok(Self {
            number_of_types,
            interactions: vec![0.0; number_of_types * number_of_types],
            min_radius,
            max_radius,
            global_repulsion,
            max_repulsion,
        })
    }

    pub fn number_of_types(&self) -> usize {
        self.number_of_types
    }

    /// Re-draws every coefficient from `{-1, -0.8, ..., 0.8, 1}`.
    pub fn randomize_fields<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for value in self.interactions.iter_mut() {
            let magnitude = COEFFICIENT_MAGNITUDES.choose(rng).copied().unwrap_or(0.0);
            let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            *value = sign * magnitude;
        }
    }

    /// Coefficient for the ordered pair without bounds checking against the type count.
    /// Used in the force loop, where type ids are valid by construction.
    #[inline(always)]
    pub fn get(&self, type_i: usize, type_j: usize) -> f64 {
        self.interactions[type_i * self.number_of_types + type_j]
    }

    pub fn interaction(&self, type_i: usize, type_j: usize) -> SimResult<f64> {
        let idx = self.index(type_i, type_j)?;
        Ok(self.interactions[idx])
    }

    pub fn set_interaction(&mut self, type_i: usize, type_j: usize, value: f64) -> SimResult<()> {
        let idx = self.index(type_i, type_j)?;
        if !(-1.0..=1.0).contains(&value) {
            return Err(SimError::ParameterOutOfRange {
                name: "interaction",
                value,
                expected: "[-1, 1]",
            });
        }
        self.interactions[idx] = value;
        Ok(())
    }

    /// Moves one coefficient by `steps * INTERACTION_ADJUST_STEP`, rounded to two
    /// decimals and clamped to [-1, 1]. Returns the new value.
    pub fn adjust_interaction(&mut self, type_i: usize, type_j: usize, steps: i32) -> SimResult<f64> {
        let idx = self.index(type_i, type_j)?;
        let raw = self.interactions[idx] + steps as f64 * INTERACTION_ADJUST_STEP;
        let value = ((raw * 100.0).round() / 100.0).clamp(-1.0, 1.0);
        self.interactions[idx] = value;
        Ok(value)
    }

    /// Row-major view of the whole table.
    pub fn as_slice(&self) -> &[f64] {
        &self.interactions
    }

    // No ordering checks against the other radius here; callers own that.
    pub fn min_radius(&self) -> f64 {
        self.min_radius
    }

    pub fn set_min_radius(&mut self, min_radius: f64) {
        self.min_radius = min_radius;
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    pub fn set_max_radius(&mut self, max_radius: f64) {
        self.max_radius = max_radius;
    }

    pub fn global_repulsion(&self) -> f64 {
        self.global_repulsion
    }

    pub fn set_global_repulsion(&mut self, global_repulsion: f64) {
        self.global_repulsion = global_repulsion;
    }

    pub fn max_repulsion(&self) -> f64 {
        self.max_repulsion
    }

    pub fn set_max_repulsion(&mut self, max_repulsion: f64) {
        self.max_repulsion = max_repulsion;
    }

    fn index(&self, type_i: usize, type_j: usize) -> SimResult<usize> {
        let n = self.number_of_types;
        for type_id in [type_i, type_j] {
            if type_id >= n {
                return Err(SimError::UnknownType { type_id, num_types: n });
            }
        }
        Ok(type_i * n + type_j)
    }
}
