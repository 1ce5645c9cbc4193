use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// An orthorhombic periodic simulation cell.
///
/// Edge lengths are in Angstroms. The cell origin is at (0, 0, 0); wrapping maps
/// coordinates into `[0, L)` along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicBox {
    pub lengths: Vector3<f64>,
}

impl PeriodicBox {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self {
            lengths: Vector3::new(a, b, c),
        }
    }

    pub fn volume(&self) -> f64 {
        self.lengths.x * self.lengths.y * self.lengths.z
    }

    pub fn min_length(&self) -> f64 {
        self.lengths.x.min(self.lengths.y).min(self.lengths.z)
    }

    /// Returns the box scaled isotropically by `factor` along every edge.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            lengths: self.lengths * factor,
        }
    }

    /// Applies the minimum-image convention to a displacement vector.
    #[inline]
    pub fn minimum_image(&self, mut delta: Vector3<f64>) -> Vector3<f64> {
        for k in 0..3 {
            let l = self.lengths[k];
            delta[k] -= l * (delta[k] / l).round();
        }
        delta
    }

    /// Wraps a position into the primary cell.
    pub fn wrap(&self, p: &Point3<f64>) -> Point3<f64> {
        let mut out = *p;
        for k in 0..3 {
            let l = self.lengths[k];
            out[k] -= l * (out[k] / l).floor();
        }
        out
    }

    /// The box as row vectors, the layout used by trajectory formats.
    pub fn as_matrix_rows(&self) -> [[f64; 3]; 3] {
        [
            [self.lengths.x, 0.0, 0.0],
            [0.0, self.lengths.y, 0.0],
            [0.0, 0.0, self.lengths.z],
        ]
    }

    /// Builds a box from row vectors, rejecting cells with off-diagonal components.
    pub fn from_matrix_rows(rows: [[f64; 3]; 3]) -> Option<Self> {
        let off_diagonal = [rows[0][1], rows[0][2], rows[1][0], rows[1][2], rows[2][0], rows[2][1]];
        if off_diagonal.iter().any(|v| v.abs() > 1e-6) {
            return None;
        }
        Some(Self::new(rows[0][0], rows[1][1], rows[2][2]))
    }
}
