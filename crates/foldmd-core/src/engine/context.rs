use super::barostat::{BarostatState, MonteCarloBarostat};
use super::error::EngineError;
use super::forces::{ForceEvaluation, ForceModel};
use super::integrator::{self, LangevinMiddle};
use super::minimizer::{self, MinimizationSummary};
use super::platform::{ForceKernel, Platform};
use super::state::{StateSnapshot, TrajectoryState};
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace};

/// A configured system living on one platform: force kernel, integrator, optional barostat
/// and the trajectory state they advance.
///
/// Forces are always kept in sync with the current positions, so a context restored from
/// the same state continues exactly like the one that produced it.
pub struct ComputeContext {
    platform_name: String,
    kernel: Box<dyn ForceKernel>,
    integrator: LangevinMiddle,
    barostat: Option<MonteCarloBarostat>,
    state: TrajectoryState,
    current: ForceEvaluation,
}

impl ComputeContext {
    pub fn new(
        platform: &dyn Platform,
        model: ForceModel,
        integrator: LangevinMiddle,
        barostat: Option<MonteCarloBarostat>,
        state: TrajectoryState,
    ) -> Result<Self, EngineError> {
        check_atom_count(&model, &state)?;
        model.check_box(state.cell.as_ref())?;
        let barostat = match (barostat, state.cell) {
            (Some(_), None) => {
                debug!("Non-periodic system; the barostat is disabled.");
                None
            }
            (barostat, _) => barostat,
        };

        let kernel = platform.create_kernel(model)?;
        let current = kernel.compute(&state.positions, state.cell.as_ref());
        Ok(Self {
            platform_name: platform.name().to_string(),
            kernel,
            integrator,
            barostat,
            state,
            current,
        })
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn state(&self) -> &TrajectoryState {
        &self.state
    }

    pub fn masses(&self) -> &[f64] {
        &self.kernel.model().params().masses
    }

    pub fn molecules(&self) -> &[Vec<usize>] {
        &self.kernel.model().params().molecules
    }

    pub fn barostat_state(&self) -> Option<BarostatState> {
        self.barostat.as_ref().map(|b| b.state)
    }

    pub fn potential_energy(&self) -> f64 {
        self.current.potential_energy()
    }

    pub fn forces(&self) -> &[Vector3<f64>] {
        &self.current.forces
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.state.kinetic_energy(self.masses())
    }

    pub fn temperature(&self) -> f64 {
        self.state.temperature(self.masses())
    }

    pub fn initialize_velocities(&mut self, temperature: f64) {
        let masses = &self.kernel.model().params().masses;
        integrator::initialize_velocities(&mut self.state, masses, temperature);
    }

    pub fn minimize(&mut self, max_iterations: usize, tolerance: f64) -> MinimizationSummary {
        let (evaluation, summary) = minimizer::steepest_descent(
            self.kernel.as_ref(),
            &mut self.state.positions,
            self.state.cell.as_ref(),
            max_iterations,
            tolerance,
        );
        self.current = evaluation;
        summary
    }

    /// Advances one integration step, followed by a volume move when one is due.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Integration`] with the last valid step when positions,
    /// velocities or the energy stop being finite. The context must not be stepped again
    /// after that.
    pub fn step(&mut self) -> Result<(), EngineError> {
        let last_valid = self.state.step;
        let masses = &self.kernel.model().params().masses;
        self.integrator
            .advance(&mut self.state, masses, &self.current.forces);

        let evaluation = self
            .kernel
            .compute(&self.state.positions, self.state.cell.as_ref());
        if !self.state.is_finite() || !evaluation.potential_energy().is_finite() {
            return Err(EngineError::Integration {
                step: last_valid,
                reason: "non-finite positions, velocities or energy".to_string(),
            });
        }
        self.current = evaluation;

        self.apply_barostat();
        Ok(())
    }

    fn apply_barostat(&mut self) {
        let Some(barostat) = self.barostat.as_mut() else {
            return;
        };
        let Some(cell) = self.state.cell else {
            return;
        };
        if !barostat.is_due(self.state.step) {
            return;
        }

        let model = self.kernel.model();
        let molecules = &model.params().molecules;
        let mv = barostat.propose(&self.state.positions, &cell, molecules, &mut self.state.rng);

        let accepted = if model.check_box(Some(&mv.cell)).is_ok() {
            let trial = self.kernel.compute(&mv.positions, Some(&mv.cell));
            let delta = trial.potential_energy() - self.current.potential_energy();
            let work = barostat.work(delta, &mv, molecules.len());
            if delta.is_finite() && barostat.accept(work, &mut self.state.rng) {
                self.state.positions = mv.positions;
                self.state.cell = Some(mv.cell);
                self.current = trial;
                true
            } else {
                false
            }
        } else {
            false
        };

        let volume = self.state.cell.map_or(cell.volume(), |c| c.volume());
        trace!(step = self.state.step, accepted, volume, "Volume move.");
        barostat.record(accepted, volume);
    }

    /// Replaces the trajectory state, e.g. from a checkpoint, and recomputes forces.
    pub fn restore(
        &mut self,
        state: TrajectoryState,
        barostat: Option<BarostatState>,
    ) -> Result<(), EngineError> {
        check_atom_count(self.kernel.model(), &state)?;
        self.kernel.model().check_box(state.cell.as_ref())?;
        if let (Some(current), Some(saved)) = (self.barostat.as_mut(), barostat) {
            current.state = saved;
        }
        self.current = self
            .kernel
            .compute(&state.positions, state.cell.as_ref());
        self.state = state;
        Ok(())
    }

    /// A view of the current state with the given positions, which may be a wrapped copy.
    pub fn snapshot<'a>(&'a self, positions: &'a [Point3<f64>]) -> StateSnapshot<'a> {
        StateSnapshot {
            step: self.state.step,
            time: self.state.time,
            positions,
            velocities: Some(&self.state.velocities),
            forces: Some(&self.current.forces),
            potential_energy: Some(self.potential_energy()),
            kinetic_energy: Some(self.kinetic_energy()),
            cell: self.state.cell.as_ref(),
        }
    }
}

fn check_atom_count(model: &ForceModel, state: &TrajectoryState) -> Result<(), EngineError> {
    let expected = model.params().atom_count();
    if state.atom_count() != expected {
        return Err(EngineError::Configuration(format!(
            "state holds {} atoms but the system has {}",
            state.atom_count(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::parameterization::SystemParameters;
    use crate::core::models::periodic::PeriodicBox;
    use crate::engine::platform::ReferencePlatform;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    const EDGE: f64 = 13.0;

    fn argon_model() -> ForceModel {
        let n = 27;
        let params = SystemParameters {
            masses: vec![39.948; n],
            charges: vec![0.0; n],
            sigmas: vec![3.4; n],
            epsilons: vec![0.238; n],
            exclusions: vec![Vec::new(); n],
            molecules: (0..n).map(|i| vec![i]).collect(),
            reaction_field_dielectric: 78.5,
            ..Default::default()
        };
        ForceModel::new(Arc::new(params), 6.0)
    }

    fn argon_state(seed: u64) -> TrajectoryState {
        let spacing = EDGE / 3.0;
        let positions = (0..27)
            .map(|i| {
                Point3::new(
                    (i % 3) as f64 * spacing + 1.0,
                    ((i / 3) % 3) as f64 * spacing + 1.0,
                    (i / 9) as f64 * spacing + 1.0,
                )
            })
            .collect();
        TrajectoryState::new(
            positions,
            Some(PeriodicBox::new(EDGE, EDGE, EDGE)),
            ChaCha8Rng::seed_from_u64(seed),
        )
    }

    fn argon_context(seed: u64, pressure: Option<f64>) -> ComputeContext {
        let barostat = pressure.map(|p| MonteCarloBarostat::new(p, 120.0, EDGE.powi(3)));
        let mut context = ComputeContext::new(
            &ReferencePlatform,
            argon_model(),
            LangevinMiddle::new(0.002, 5.0, 120.0),
            barostat,
            argon_state(seed),
        )
        .unwrap();
        context.initialize_velocities(120.0);
        context
    }

    #[test]
    fn atom_count_mismatch_is_a_configuration_error() {
        let mut state = argon_state(0);
        state.positions.pop();
        state.velocities.pop();
        let result = ComputeContext::new(
            &ReferencePlatform,
            argon_model(),
            LangevinMiddle::new(0.002, 1.0, 120.0),
            None,
            state,
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn identical_seeds_give_identical_trajectories() {
        let run = || {
            let mut context = argon_context(11, Some(1.0));
            for _ in 0..60 {
                context.step().unwrap();
            }
            (context.state().clone(), context.barostat_state())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn barostat_changes_the_box_volume() {
        let mut context = argon_context(4, Some(1.0));
        let initial = context.state().cell.unwrap().volume();
        for _ in 0..250 {
            context.step().unwrap();
        }
        assert_eq!(context.state().step, 250);
        assert_ne!(context.state().cell.unwrap().volume(), initial);
    }

    #[test]
    fn non_finite_state_reports_the_last_valid_step() {
        let mut context = argon_context(2, None);
        context.step().unwrap();
        context.state.velocities[0].x = f64::NAN;
        match context.step() {
            Err(EngineError::Integration { step, .. }) => assert_eq!(step, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn restore_recomputes_forces_for_the_new_positions() {
        let mut context = argon_context(8, None);
        let saved = context.state().clone();
        let saved_forces = context.forces().to_vec();
        for _ in 0..20 {
            context.step().unwrap();
        }
        context.restore(saved.clone(), None).unwrap();
        assert_eq!(context.state(), &saved);
        assert_eq!(context.forces(), saved_forces.as_slice());
    }
}
