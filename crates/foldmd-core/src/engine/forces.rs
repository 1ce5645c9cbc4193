use super::error::EngineError;
use super::units::COULOMB;
use crate::core::forcefield::parameterization::SystemParameters;
use crate::core::models::periodic::PeriodicBox;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const MIN_CELLS_PER_AXIS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyBreakdown {
    pub bond: f64,
    pub angle: f64,
    pub lennard_jones: f64,
    pub coulomb: f64,
    pub pairs_14: f64,
}

impl EnergyBreakdown {
    pub fn total(&self) -> f64 {
        self.bond + self.angle + self.lennard_jones + self.coulomb + self.pairs_14
    }
}

/// Forces (kcal/mol/Å) and potential energy at one configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceEvaluation {
    pub forces: Vec<Vector3<f64>>,
    pub energy: EnergyBreakdown,
}

impl ForceEvaluation {
    pub fn potential_energy(&self) -> f64 {
        self.energy.total()
    }

    pub fn max_force(&self) -> f64 {
        self.forces.iter().map(|f| f.amax()).fold(0.0, f64::max)
    }
}

/// How the nonbonded per-atom gather is scheduled. Both modes visit the same pairs in
/// the same order, so they produce identical results. Without the `parallel` feature
/// both run serially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherMode {
    Serial,
    Parallel,
}

/// Harmonic bonds and angles, cutoff Lennard-Jones with reaction-field electrostatics,
/// and scaled 1-4 pairs.
#[derive(Debug, Clone)]
pub struct ForceModel {
    params: Arc<SystemParameters>,
    cutoff: f64,
    k_rf: f64,
    c_rf: f64,
}

impl ForceModel {
    pub fn new(params: Arc<SystemParameters>, cutoff: f64) -> Self {
        let eps = params.reaction_field_dielectric;
        let k_rf = (eps - 1.0) / ((2.0 * eps + 1.0) * cutoff.powi(3));
        let c_rf = 3.0 * eps / ((2.0 * eps + 1.0) * cutoff);
        Self {
            params,
            cutoff,
            k_rf,
            c_rf,
        }
    }

    pub fn params(&self) -> &SystemParameters {
        &self.params
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Periodic cells must hold the cutoff sphere twice along every axis.
    pub fn check_box(&self, cell: Option<&PeriodicBox>) -> Result<(), EngineError> {
        match cell {
            Some(cell) if cell.min_length() < 2.0 * self.cutoff => {
                Err(EngineError::Configuration(format!(
                    "periodic box edge {:.3} Å is shorter than twice the cutoff ({:.3} Å)",
                    cell.min_length(),
                    self.cutoff
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn evaluate(
        &self,
        positions: &[Point3<f64>],
        cell: Option<&PeriodicBox>,
        mode: GatherMode,
    ) -> ForceEvaluation {
        let n = positions.len();
        let mut forces = vec![Vector3::zeros(); n];
        let mut energy = EnergyBreakdown::default();

        let grid = cell.and_then(|cell| CellGrid::build(positions, cell, self.cutoff));
        let gather = |i: usize| self.gather_nonbonded(i, positions, cell, grid.as_ref());
        let per_atom: Vec<(Vector3<f64>, f64, f64)> = match mode {
            GatherMode::Serial => (0..n).map(gather).collect(),
            #[cfg(feature = "parallel")]
            GatherMode::Parallel => (0..n).into_par_iter().map(gather).collect(),
            #[cfg(not(feature = "parallel"))]
            GatherMode::Parallel => (0..n).map(gather).collect(),
        };
        for (force, (f, lj, coulomb)) in forces.iter_mut().zip(per_atom) {
            *force += f;
            energy.lennard_jones += lj;
            energy.coulomb += coulomb;
        }

        self.add_bonds(positions, cell, &mut forces, &mut energy);
        self.add_angles(positions, cell, &mut forces, &mut energy);
        self.add_pairs_14(positions, cell, &mut forces, &mut energy);

        ForceEvaluation { forces, energy }
    }

    /// Force on atom `i` from every non-excluded partner inside the cutoff, with half of
    /// each pair energy.
    fn gather_nonbonded(
        &self,
        i: usize,
        positions: &[Point3<f64>],
        cell: Option<&PeriodicBox>,
        grid: Option<&CellGrid>,
    ) -> (Vector3<f64>, f64, f64) {
        let mut force = Vector3::zeros();
        let mut lj = 0.0;
        let mut coulomb = 0.0;
        let mut visit = |j: usize| {
            if j == i || self.params.is_excluded(i, j) {
                return;
            }
            let d = displacement(positions, cell, i, j);
            let r2 = d.norm_squared();
            if r2 >= self.cutoff * self.cutoff || r2 == 0.0 {
                return;
            }
            let (e_lj, f_lj) = self.lennard_jones(i, j, r2);
            let (e_c, f_c) = self.reaction_field(i, j, r2);
            force -= (f_lj + f_c) * d;
            lj += 0.5 * e_lj;
            coulomb += 0.5 * e_c;
        };
        match grid {
            Some(grid) => grid.for_each_neighbor(i, &mut visit),
            None => (0..positions.len()).for_each(&mut visit),
        }
        (force, lj, coulomb)
    }

    /// Energy and `-dE/dr / r` of the Lorentz-Berthelot mixed pair.
    fn lennard_jones(&self, i: usize, j: usize, r2: f64) -> (f64, f64) {
        let p = &self.params;
        let sigma = 0.5 * (p.sigmas[i] + p.sigmas[j]);
        let epsilon = (p.epsilons[i] * p.epsilons[j]).sqrt();
        lj_terms(sigma, epsilon, r2)
    }

    fn reaction_field(&self, i: usize, j: usize, r2: f64) -> (f64, f64) {
        let qq = COULOMB * self.params.charges[i] * self.params.charges[j];
        if qq == 0.0 {
            return (0.0, 0.0);
        }
        let r = r2.sqrt();
        let energy = qq * (1.0 / r + self.k_rf * r2 - self.c_rf);
        let f_over_r = qq * (1.0 / (r2 * r) - 2.0 * self.k_rf);
        (energy, f_over_r)
    }

    fn add_bonds(
        &self,
        positions: &[Point3<f64>],
        cell: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
        energy: &mut EnergyBreakdown,
    ) {
        for bond in &self.params.bonds {
            let d = displacement(positions, cell, bond.i, bond.j);
            let r = d.norm();
            if r == 0.0 {
                continue;
            }
            let stretch = r - bond.length;
            energy.bond += bond.k * stretch * stretch;
            let f = (2.0 * bond.k * stretch / r) * d;
            forces[bond.i] += f;
            forces[bond.j] -= f;
        }
    }

    fn add_angles(
        &self,
        positions: &[Point3<f64>],
        cell: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
        energy: &mut EnergyBreakdown,
    ) {
        for angle in &self.params.angles {
            let u = displacement(positions, cell, angle.j, angle.i);
            let v = displacement(positions, cell, angle.j, angle.k_atom);
            let (lu, lv) = (u.norm(), v.norm());
            if lu == 0.0 || lv == 0.0 {
                continue;
            }
            let (uh, vh) = (u / lu, v / lv);
            let cos = uh.dot(&vh).clamp(-1.0, 1.0);
            let theta = cos.acos();
            let delta = theta - angle.theta0;
            energy.angle += angle.k * delta * delta;

            let sin = (1.0 - cos * cos).sqrt().max(1e-8);
            let de_dtheta = 2.0 * angle.k * delta;
            let fi = (de_dtheta / (sin * lu)) * (vh - cos * uh);
            let fk = (de_dtheta / (sin * lv)) * (uh - cos * vh);
            forces[angle.i] += fi;
            forces[angle.k_atom] += fk;
            forces[angle.j] -= fi + fk;
        }
    }

    fn add_pairs_14(
        &self,
        positions: &[Point3<f64>],
        cell: Option<&PeriodicBox>,
        forces: &mut [Vector3<f64>],
        energy: &mut EnergyBreakdown,
    ) {
        for pair in &self.params.pairs_14 {
            let d = displacement(positions, cell, pair.i, pair.j);
            let r2 = d.norm_squared();
            if r2 == 0.0 {
                continue;
            }
            let (e_lj, f_lj) = lj_terms(pair.sigma, pair.epsilon, r2);
            let r = r2.sqrt();
            let qq = COULOMB * pair.charge_product;
            let e_c = qq / r;
            let f_c = qq / (r2 * r);
            energy.pairs_14 += e_lj + e_c;
            let f = (f_lj + f_c) * d;
            forces[pair.i] -= f;
            forces[pair.j] += f;
        }
    }
}

fn lj_terms(sigma: f64, epsilon: f64, r2: f64) -> (f64, f64) {
    if sigma == 0.0 || epsilon == 0.0 {
        return (0.0, 0.0);
    }
    let s2 = sigma * sigma / r2;
    let s6 = s2 * s2 * s2;
    let s12 = s6 * s6;
    let energy = 4.0 * epsilon * (s12 - s6);
    let f_over_r = 24.0 * epsilon * (2.0 * s12 - s6) / r2;
    (energy, f_over_r)
}

/// Vector from atom `i` to atom `j`, minimum-imaged when periodic.
#[inline]
fn displacement(
    positions: &[Point3<f64>],
    cell: Option<&PeriodicBox>,
    i: usize,
    j: usize,
) -> Vector3<f64> {
    let d = positions[j] - positions[i];
    match cell {
        Some(cell) => cell.minimum_image(d),
        None => d,
    }
}

/// Uniform spatial grid with cells at least one cutoff wide.
struct CellGrid {
    dims: [usize; 3],
    cells: Vec<Vec<usize>>,
    atom_cells: Vec<[usize; 3]>,
}

impl CellGrid {
    fn build(positions: &[Point3<f64>], cell: &PeriodicBox, cutoff: f64) -> Option<Self> {
        let dims = [0, 1, 2].map(|axis| (cell.lengths[axis] / cutoff).floor() as usize);
        if dims.iter().any(|&n| n < MIN_CELLS_PER_AXIS) {
            return None;
        }
        let mut cells = vec![Vec::new(); dims[0] * dims[1] * dims[2]];
        let mut atom_cells = Vec::with_capacity(positions.len());
        for (index, p) in positions.iter().enumerate() {
            let wrapped = cell.wrap(p);
            let c = [0, 1, 2].map(|axis| {
                let frac = wrapped[axis] / cell.lengths[axis];
                ((frac * dims[axis] as f64) as usize).min(dims[axis] - 1)
            });
            cells[Self::flat(dims, c)].push(index);
            atom_cells.push(c);
        }
        Some(Self {
            dims,
            cells,
            atom_cells,
        })
    }

    fn flat(dims: [usize; 3], c: [usize; 3]) -> usize {
        (c[0] * dims[1] + c[1]) * dims[2] + c[2]
    }

    fn for_each_neighbor(&self, i: usize, visit: &mut impl FnMut(usize)) {
        let home = self.atom_cells[i];
        for dx in [-1isize, 0, 1] {
            for dy in [-1isize, 0, 1] {
                for dz in [-1isize, 0, 1] {
                    let c = [
                        wrap_index(home[0], dx, self.dims[0]),
                        wrap_index(home[1], dy, self.dims[1]),
                        wrap_index(home[2], dz, self.dims[2]),
                    ];
                    for &j in &self.cells[Self::flat(self.dims, c)] {
                        visit(j);
                    }
                }
            }
        }
    }
}

#[inline]
fn wrap_index(index: usize, offset: isize, n: usize) -> usize {
    (index as isize + offset).rem_euclid(n as isize) as usize
}
