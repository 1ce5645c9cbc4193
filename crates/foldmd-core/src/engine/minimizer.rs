use super::forces::ForceEvaluation;
use super::platform::ForceKernel;
use crate::core::models::periodic::PeriodicBox;
use nalgebra::Point3;

const INITIAL_STEP: f64 = 0.01;
const MAX_STEP: f64 = 0.5;
const GROW: f64 = 1.2;
const SHRINK: f64 = 0.5;
const MIN_STEP: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizationSummary {
    pub iterations: usize,
    pub initial_energy: f64,
    pub final_energy: f64,
    pub max_force: f64,
    pub converged: bool,
}

/// Adaptive steepest descent. The largest atomic displacement per iteration is the current
/// step size (Å); it grows after an accepted move and shrinks after a rejected one.
///
/// Returns the evaluation at the final positions, which are written back into `positions`.
pub fn steepest_descent(
    kernel: &dyn ForceKernel,
    positions: &mut Vec<Point3<f64>>,
    cell: Option<&PeriodicBox>,
    max_iterations: usize,
    tolerance: f64,
) -> (ForceEvaluation, MinimizationSummary) {
    let mut current = kernel.compute(positions, cell);
    let initial_energy = current.potential_energy();
    let mut step = INITIAL_STEP;
    let mut iterations = 0;

    while iterations < max_iterations {
        let max_force = current.max_force();
        if max_force < tolerance || step < MIN_STEP {
            break;
        }
        iterations += 1;

        let scale = step / max_force;
        let trial: Vec<Point3<f64>> = positions
            .iter()
            .zip(&current.forces)
            .map(|(p, f)| p + f * scale)
            .collect();
        let evaluation = kernel.compute(&trial, cell);
        let energy = evaluation.potential_energy();
        if energy.is_finite() && energy < current.potential_energy() {
            *positions = trial;
            current = evaluation;
            step = (step * GROW).min(MAX_STEP);
        } else {
            step *= SHRINK;
        }
    }

    let summary = MinimizationSummary {
        iterations,
        initial_energy,
        final_energy: current.potential_energy(),
        max_force: current.max_force(),
        converged: current.max_force() < tolerance,
    };
    (current, summary)
}
