use crate::interaction_matrix::InteractionMatrix;
use particle_life_common::Vec2;

/// Guards the divisions by distance when particles (nearly) coincide.
pub const DISTANCE_EPSILON: f64 = 1e-12;

/// Force exerted on particle 1 by particle 2.
///
/// Two terms are summed:
/// * a universal repulsion `global_repulsion / distance`, capped at `max_repulsion`,
///   pushing particle 1 away from particle 2 at every distance;
/// * the type-pair term `interactions[type1][type2] * scale` along the line to
///   particle 2, where `scale` falls linearly from 1 at `min_radius` to 0 at
///   `max_radius` and stays at 1 below `min_radius`.
///
/// Pure and read-only on the matrix, so it can be evaluated for disjoint pairs in parallel.
#[inline]
pub fn calculate_force(
    p1_pos: Vec2,
    p1_type: usize,
    p2_pos: Vec2,
    p2_type: usize,
    matrix: &InteractionMatrix,
) -> Vec2 {
    let delta = p2_pos - p1_pos;
    let distance = delta.length();
    let direction = delta / (distance + DISTANCE_EPSILON);

    let repulsion_strength =
        (matrix.global_repulsion() / (distance + DISTANCE_EPSILON)).min(matrix.max_repulsion());
    let repulsion = -direction * repulsion_strength;

    let max_radius = matrix.max_radius();
    if distance > max_radius {
        return repulsion;
    }

    let min_radius = matrix.min_radius();
    let force_scale = ((max_radius - distance) / (max_radius - min_radius)).clamp(0.0, 1.0);
    let net_force = matrix.get(p1_type, p2_type) * force_scale;

    direction * net_force + repulsion
}
