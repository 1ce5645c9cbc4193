//! Unit constants for the engine's unit system: Å, ps, amu, kcal/mol, e, K, atm.

/// Boltzmann constant in kcal/(mol·K).
pub const BOLTZMANN: f64 = 0.001_987_204_1;

/// Converts an acceleration in kcal/(mol·Å·amu) to Å/ps².
pub const ACCEL_CONVERSION: f64 = 418.4;

/// Coulomb constant in kcal·Å/(mol·e²).
pub const COULOMB: f64 = 332.063_7;

/// Converts a pressure in atm to kcal/(mol·Å³).
pub const ATM_TO_KCAL_PER_A3: f64 = 1.458_397e-5;

pub const ANGSTROM_TO_NM: f64 = 0.1;

/// Kinetic energy in kcal/mol of a particle with mass in amu and velocity in Å/ps.
#[inline]
pub fn kinetic_energy(mass: f64, speed_squared: f64) -> f64 {
    0.5 * mass * speed_squared / ACCEL_CONVERSION
}
