use particle_life_common::Vec2;
use rayon::prelude::*;

/// Uniform partition of the unit square into `grid_size x grid_size` cells.
///
/// Cell membership is stored as a counting sort: `cell_particle_indices` holds every
/// particle index grouped by cell, `cell_starts[c]`/`cell_counts[c]` delimit cell `c`.
/// Within a cell, particles keep their storage order. Rebuilt from scratch every step.
#[derive(Debug, Clone, Default)]
pub struct SpatialGrid {
    grid_size: usize,
    // Grid cell index for each particle
    particle_cells: Vec<u32>,
    // Number of particles in each grid cell
    cell_counts: Vec<u32>,
    // Start index in cell_particle_indices for each grid cell (prefix sum)
    cell_starts: Vec<u32>,
    // Particle indices sorted by grid cell
    cell_particle_indices: Vec<u32>,
}

impl SpatialGrid {
    pub fn new(grid_size: usize) -> Self {
        let mut grid = Self::default();
        grid.resize(grid_size);
        grid
    }

    /// Cells per axis for a population of `num_particles` on a surface with the given
    /// width/height ratio: `round(sqrt(n) * sqrt(aspect))`, so each cell holds O(1)
    /// particles on average.
    ///
    /// The result is capped at `floor(1 / max_radius)` so a cell is never narrower than
    /// the interaction radius and the 3x3 neighborhood cannot miss a pair in range.
    /// Never less than 1.
    pub fn grid_size_for(num_particles: usize, aspect_ratio: f64, max_radius: f64) -> usize {
        let density_size = ((num_particles as f64).sqrt() * aspect_ratio.sqrt()).round();
        let radius_cap = if max_radius > 0.0 { (1.0 / max_radius).floor() } else { 1.0 };
        let size = density_size.min(radius_cap);
        if size.is_finite() && size >= 1.0 { size as usize } else { 1 }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn num_cells(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// `floor(position * grid_size) mod grid_size` on each axis. Positions outside the
    /// unit square wrap around instead of being clamped.
    #[inline(always)]
    pub fn cell_of(&self, position: Vec2) -> (usize, usize) {
        let n = self.grid_size.max(1) as i64;
        let ix = ((position.x * n as f64).floor() as i64).rem_euclid(n);
        let iy = ((position.y * n as f64).floor() as i64).rem_euclid(n);
        (ix as usize, iy as usize)
    }

    /// Clears all cells and inserts every position by its wrapped cell index.
    pub fn rebuild(&mut self, grid_size: usize, positions: &[Vec2]) {
        let grid_size = grid_size.max(1);
        if grid_size != self.grid_size {
            log::debug!("Resizing spatial grid from {0}x{0} to {1}x{1}.", self.grid_size, grid_size);
            self.resize(grid_size);
        }
        let num_particles = positions.len();
        let num_cells = self.num_cells();

        // Phase 1: Assign grid indices to each particle (Parallel).
        let n = self.grid_size;
        let grid = &*self;
        let cells: Vec<u32> = positions
            .par_iter()
            .map(|&pos| {
                let (ix, iy) = grid.cell_of(pos);
                (iy * n + ix) as u32
            })
            .collect();
        self.particle_cells = cells;

        // Phase 2: Count particles in each grid cell (Serial).
        self.cell_counts.iter_mut().for_each(|c| *c = 0);
        for &cell in &self.particle_cells {
            self.cell_counts[cell as usize] += 1;
        }

        // Phase 3: Calculate cell start indices using a prefix sum on cell counts (Serial).
        let mut total_sum = 0;
        for cell in 0..num_cells {
            self.cell_starts[cell] = total_sum;
            total_sum += self.cell_counts[cell];
        }
        debug_assert_eq!(total_sum as usize, num_particles);

        // Phase 4: Scatter particle indices into their cell blocks, preserving storage order.
        self.cell_particle_indices.resize(num_particles, 0);
        let mut write_offsets = self.cell_starts.clone();
        for (particle_idx, &cell) in self.particle_cells.iter().enumerate() {
            let slot = &mut write_offsets[cell as usize];
            self.cell_particle_indices[*slot as usize] = particle_idx as u32;
            *slot += 1;
        }
    }

    /// Particles stored in one cell, in insertion order.
    pub fn cell_particles(&self, cell: (usize, usize)) -> &[u32] {
        let (ix, iy) = cell;
        if ix >= self.grid_size || iy >= self.grid_size {
            return &[];
        }
        let idx = iy * self.grid_size + ix;
        let start = self.cell_starts[idx] as usize;
        let end = start + self.cell_counts[idx] as usize;
        &self.cell_particle_indices[start..end]
    }

    /// Cell assigned to a particle at the last rebuild.
    pub fn cell_of_particle(&self, particle_idx: usize) -> Option<(usize, usize)> {
        self.particle_cells.get(particle_idx).map(|&cell| {
            let cell = cell as usize;
            (cell % self.grid_size, cell / self.grid_size)
        })
    }

    /// All particles in the 3x3 block around `cell`. Edges do not wrap, so border
    /// cells see fewer neighbor cells.
    pub fn block_particles(&self, cell: (usize, usize)) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = (cell.0 as i64, cell.1 as i64);
        let n = self.grid_size as i64;
        (-1..=1i64)
            .flat_map(move |dy| (-1..=1i64).map(move |dx| (cx + dx, cy + dy)))
            .filter(move |&(x, y)| x >= 0 && x < n && y >= 0 && y < n)
            .flat_map(move |(x, y)| self.cell_particles((x as usize, y as usize)).iter())
            .map(|&idx| idx as usize)
    }

    /// Neighbors of a particle: everything in the 3x3 block around its cell, except itself.
    pub fn neighbors_of(&self, particle_idx: usize) -> impl Iterator<Item = usize> + '_ {
        let cell = self.cell_of_particle(particle_idx);
        cell.into_iter()
            .flat_map(move |cell| self.block_particles(cell))
            .filter(move |&idx| idx != particle_idx)
    }

    // Calls `f` for each neighbor of `particle_idx`; the hot loop of the force phase.
    #[inline(always)]
    pub fn for_each_neighbor<F>(&self, particle_idx: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let Some(&cell) = self.particle_cells.get(particle_idx) else { return };
        let n = self.grid_size as i64;
        let center_x = cell as i64 % n;
        let center_y = cell as i64 / n;

        for dy in -1..=1 {
            for dx in -1..=1 {
                let check_x = center_x + dx;
                let check_y = center_y + dy;
                if check_x < 0 || check_x >= n || check_y < 0 || check_y >= n {
                    continue;
                }
                for &neighbor_idx in self.cell_particles((check_x as usize, check_y as usize)) {
                    // Don't compare particle to itself
                    if neighbor_idx as usize != particle_idx {
                        f(neighbor_idx as usize);
                    }
                }
            }
        }
    }

    fn resize(&mut self, grid_size: usize) {
        let grid_size = grid_size.max(1);
        self.grid_size = grid_size;
        self.cell_counts = vec![0; grid_size * grid_size];
        self.cell_starts = vec![0; grid_size * grid_size];
        self.particle_cells.clear();
        self.cell_particle_indices.clear();
    }
}
