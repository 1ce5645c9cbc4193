use super::units::{ATM_TO_KCAL_PER_A3, BOLTZMANN};
use crate::core::models::periodic::PeriodicBox;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Steps between volume move attempts.
pub const BAROSTAT_FREQUENCY: u64 = 25;
const ADAPT_EVERY: u32 = 10;
const INITIAL_FRACTION: f64 = 0.01;
const MAX_FRACTION: f64 = 0.3;

/// Adaptive part of the barostat, carried across checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarostatState {
    /// Largest volume change a move may propose, in Å³.
    pub max_volume_change: f64,
    pub attempted: u32,
    pub accepted: u32,
}

/// A proposed isotropic volume change with molecule centers scaled accordingly.
#[derive(Debug, Clone)]
pub struct VolumeMove {
    pub positions: Vec<Point3<f64>>,
    pub cell: PeriodicBox,
    pub old_volume: f64,
    pub new_volume: f64,
}

/// Monte Carlo isotropic barostat.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloBarostat {
    /// Target pressure in atm.
    pub pressure: f64,
    pub temperature: f64,
    pub frequency: u64,
    pub state: BarostatState,
}

impl MonteCarloBarostat {
    pub fn new(pressure: f64, temperature: f64, initial_volume: f64) -> Self {
        Self {
            pressure,
            temperature,
            frequency: BAROSTAT_FREQUENCY,
            state: BarostatState {
                max_volume_change: INITIAL_FRACTION * initial_volume,
                attempted: 0,
                accepted: 0,
            },
        }
    }

    pub fn is_due(&self, step: u64) -> bool {
        step > 0 && step % self.frequency == 0
    }

    pub fn propose(
        &self,
        positions: &[Point3<f64>],
        cell: &PeriodicBox,
        molecules: &[Vec<usize>],
        rng: &mut impl Rng,
    ) -> VolumeMove {
        let old_volume = cell.volume();
        let delta = self.state.max_volume_change * (2.0 * rng.r#gen::<f64>() - 1.0);
        let new_volume = old_volume + delta;
        let factor = (new_volume / old_volume).cbrt();

        let mut scaled = positions.to_vec();
        for molecule in molecules {
            if molecule.is_empty() {
                continue;
            }
            let center = molecule
                .iter()
                .fold(Vector3::zeros(), |acc, &i| acc + positions[i].coords)
                / molecule.len() as f64;
            let shift = center * (factor - 1.0);
            for &i in molecule {
                scaled[i] += shift;
            }
        }

        VolumeMove {
            positions: scaled,
            cell: cell.scaled(factor),
            old_volume,
            new_volume,
        }
    }

    /// Metropolis weight `ΔU + PΔV - N kT ln(V'/V)` in kcal/mol.
    pub fn work(&self, delta_energy: f64, mv: &VolumeMove, n_molecules: usize) -> f64 {
        let kt = BOLTZMANN * self.temperature;
        let p = self.pressure * ATM_TO_KCAL_PER_A3;
        delta_energy + p * (mv.new_volume - mv.old_volume)
            - n_molecules as f64 * kt * (mv.new_volume / mv.old_volume).ln()
    }

    pub fn accept(&self, work: f64, rng: &mut impl Rng) -> bool {
        let kt = BOLTZMANN * self.temperature;
        work <= 0.0 || rng.r#gen::<f64>() < (-work / kt).exp()
    }

    /// Records the outcome of a move and adapts the step size every few attempts.
    pub fn record(&mut self, accepted: bool, volume: f64) {
        let s = &mut self.state;
        s.attempted += 1;
        if accepted {
            s.accepted += 1;
        }
        if s.attempted >= ADAPT_EVERY {
            let rate = s.accepted as f64 / s.attempted as f64;
            if rate < 0.25 {
                s.max_volume_change /= 1.1;
            } else if rate > 0.75 {
                s.max_volume_change = (s.max_volume_change * 1.1).min(MAX_FRACTION * volume);
            }
            s.attempted = 0;
            s.accepted = 0;
        }
    }
}
