use super::state::TrajectoryState;
use super::units::{ACCEL_CONVERSION, BOLTZMANN};
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::StandardNormal;

/// Langevin dynamics in the "middle" splitting (kick, half drift, thermostat, half drift),
/// which needs one force evaluation per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LangevinMiddle {
    /// Timestep in ps.
    pub timestep: f64,
    /// Friction coefficient in 1/ps.
    pub friction: f64,
    /// Bath temperature in K.
    pub temperature: f64,
}

impl LangevinMiddle {
    pub fn new(timestep: f64, friction: f64, temperature: f64) -> Self {
        Self {
            timestep,
            friction,
            temperature,
        }
    }

    pub fn kt(&self) -> f64 {
        BOLTZMANN * self.temperature
    }

    /// Advances `state` by one step using `forces` evaluated at the current positions.
    /// The caller recomputes forces at the new positions.
    pub fn advance(&self, state: &mut TrajectoryState, masses: &[f64], forces: &[Vector3<f64>]) {
        let dt = self.timestep;
        let half_dt = 0.5 * dt;
        let a = (-self.friction * dt).exp();
        let noise_scale = (1.0 - a * a) * self.kt() * ACCEL_CONVERSION;

        for ((v, f), &m) in state.velocities.iter_mut().zip(forces).zip(masses) {
            *v += f * (dt * ACCEL_CONVERSION / m);
        }
        for (x, v) in state.positions.iter_mut().zip(&state.velocities) {
            *x += v * half_dt;
        }
        for (v, &m) in state.velocities.iter_mut().zip(masses) {
            let sigma = (noise_scale / m).sqrt();
            let xi = Vector3::new(
                state.rng.sample::<f64, _>(StandardNormal),
                state.rng.sample::<f64, _>(StandardNormal),
                state.rng.sample::<f64, _>(StandardNormal),
            );
            *v = *v * a + xi * sigma;
        }
        for (x, v) in state.positions.iter_mut().zip(&state.velocities) {
            *x += v * half_dt;
        }

        state.step += 1;
        state.time += dt;
    }
}

/// Draws Maxwell-Boltzmann velocities at `temperature` and removes center-of-mass motion.
pub fn initialize_velocities(state: &mut TrajectoryState, masses: &[f64], temperature: f64) {
    let kt = BOLTZMANN * temperature * ACCEL_CONVERSION;
    for (v, &m) in state.velocities.iter_mut().zip(masses) {
        let sigma = (kt / m).sqrt();
        *v = Vector3::new(
            state.rng.sample::<f64, _>(StandardNormal),
            state.rng.sample::<f64, _>(StandardNormal),
            state.rng.sample::<f64, _>(StandardNormal),
        ) * sigma;
    }
    remove_com_motion(&mut state.velocities, masses);
}

pub fn remove_com_motion(velocities: &mut [Vector3<f64>], masses: &[f64]) {
    let total_mass: f64 = masses.iter().sum();
    if total_mass <= 0.0 {
        return;
    }
    let momentum = velocities
        .iter()
        .zip(masses)
        .fold(Vector3::zeros(), |acc, (v, &m)| acc + v * m);
    let drift = momentum / total_mass;
    for v in velocities.iter_mut() {
        *v -= drift;
    }
}
