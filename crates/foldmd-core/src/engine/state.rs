use super::units::{BOLTZMANN, kinetic_energy};
use crate::core::models::periodic::PeriodicBox;
use nalgebra::{Point3, Vector3};
use rand_chacha::ChaCha8Rng;

/// The complete integration state of a trajectory.
///
/// Together with the barostat state this is everything a checkpoint stores; two contexts
/// with equal states and equal parameters produce identical trajectories.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryState {
    pub step: u64,
    /// Simulation time in ps.
    pub time: f64,
    pub positions: Vec<Point3<f64>>,
    /// Velocities in Å/ps.
    pub velocities: Vec<Vector3<f64>>,
    pub cell: Option<PeriodicBox>,
    pub rng: ChaCha8Rng,
}

impl TrajectoryState {
    pub fn new(positions: Vec<Point3<f64>>, cell: Option<PeriodicBox>, rng: ChaCha8Rng) -> Self {
        let velocities = vec![Vector3::zeros(); positions.len()];
        Self {
            step: 0,
            time: 0.0,
            positions,
            velocities,
            cell,
            rng,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }

    pub fn kinetic_energy(&self, masses: &[f64]) -> f64 {
        self.velocities
            .iter()
            .zip(masses)
            .map(|(v, &m)| kinetic_energy(m, v.norm_squared()))
            .sum()
    }

    /// Instantaneous temperature with center-of-mass motion removed from the count of
    /// degrees of freedom.
    pub fn temperature(&self, masses: &[f64]) -> f64 {
        let dof = (3 * self.atom_count()).saturating_sub(3).max(1) as f64;
        2.0 * self.kinetic_energy(masses) / (dof * BOLTZMANN)
    }

    /// Positions with every molecule translated so that its center lies in the primary cell.
    pub fn wrapped_positions(&self, molecules: &[Vec<usize>]) -> Vec<Point3<f64>> {
        let Some(cell) = &self.cell else {
            return self.positions.clone();
        };
        let mut wrapped = self.positions.clone();
        for molecule in molecules {
            if molecule.is_empty() {
                continue;
            }
            let center = molecule
                .iter()
                .fold(Vector3::zeros(), |acc, &i| acc + self.positions[i].coords)
                / molecule.len() as f64;
            let shift = cell.wrap(&Point3::from(center)) - Point3::from(center);
            for &i in molecule {
                wrapped[i] = self.positions[i] + shift;
            }
        }
        wrapped
    }

    pub fn is_finite(&self) -> bool {
        self.positions
            .iter()
            .all(|p| p.coords.iter().all(|c| c.is_finite()))
            && self
                .velocities
                .iter()
                .all(|v| v.iter().all(|c| c.is_finite()))
    }
}

/// What a reporter needs from the next state it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRequest {
    /// Steps until the next report.
    pub steps: u64,
    pub positions: bool,
    pub velocities: bool,
    pub forces: bool,
    pub energies: bool,
    /// Whether positions should be wrapped into the periodic cell by molecule.
    pub wrapped: bool,
}

impl ReportRequest {
    pub fn positions_every(steps: u64, wrapped: bool) -> Self {
        Self {
            steps,
            positions: true,
            velocities: false,
            forces: false,
            energies: false,
            wrapped,
        }
    }
}

/// A read-only view of the trajectory handed to reporters.
#[derive(Debug, Clone, Copy)]
pub struct StateSnapshot<'a> {
    pub step: u64,
    pub time: f64,
    pub positions: &'a [Point3<f64>],
    pub velocities: Option<&'a [Vector3<f64>]>,
    pub forces: Option<&'a [Vector3<f64>]>,
    pub potential_energy: Option<f64>,
    pub kinetic_energy: Option<f64>,
    pub cell: Option<&'a PeriodicBox>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn molecules_are_wrapped_as_a_whole() {
        let positions = vec![
            Point3::new(9.8, 1.0, 1.0),
            Point3::new(10.6, 1.0, 1.0),
            Point3::new(-3.0, 2.0, 2.0),
        ];
        let state = TrajectoryState::new(
            positions,
            Some(PeriodicBox::new(10.0, 10.0, 10.0)),
            ChaCha8Rng::seed_from_u64(0),
        );

        let wrapped = state.wrapped_positions(&[vec![0, 1], vec![2]]);

        assert!((wrapped[0].x - (-0.2)).abs() < 1e-12);
        assert!((wrapped[1].x - 0.6).abs() < 1e-12);
        assert!((wrapped[2].x - 7.0).abs() < 1e-12);
    }

    #[test]
    fn temperature_of_a_resting_system_is_zero() {
        let state = TrajectoryState::new(
            vec![Point3::origin(); 4],
            None,
            ChaCha8Rng::seed_from_u64(0),
        );
        assert_eq!(state.temperature(&[1.0; 4]), 0.0);
        assert!(state.is_finite());
    }
}
