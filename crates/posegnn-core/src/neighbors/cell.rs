//! Host-side lattice geometry for a single structure.
use crate::error::{PosEgnnError, Result};
use nalgebra::{Matrix3, Vector3};

// relative to the product of lattice vector lengths
const MIN_RELATIVE_VOLUME: f64 = 1e-10;

/// A non-null unit cell. Rows of `matrix` are the lattice vectors.
#[derive(Debug, Clone)]
pub(crate) struct LatticeCell {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    volume: f64,
}

impl LatticeCell {
    /// The zero matrix marks a structure without periodicity.
    pub(crate) fn is_null(rows: &[Vec<f64>]) -> bool {
        rows.iter().flatten().all(|&v| v == 0.0)
    }

    pub(crate) fn new(rows: &[Vec<f64>], structure: usize) -> Result<Self> {
        let matrix = Matrix3::from_fn(|r, c| rows[r][c]);
        let volume = matrix.determinant().abs();
        let scale: f64 = matrix.row_iter().map(|row| row.norm()).product();
        if !volume.is_finite() || !scale.is_finite() || volume <= MIN_RELATIVE_VOLUME * scale {
            return Err(PosEgnnError::SingularCell { structure, volume });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(PosEgnnError::SingularCell { structure, volume })?;
        Ok(Self {
            matrix,
            inverse,
            volume,
        })
    }

    pub(crate) fn volume(&self) -> f64 {
        self.volume
    }

    fn lattice_vector(&self, k: usize) -> Vector3<f64> {
        self.matrix.row(k).transpose()
    }

    /// Distance between opposite faces of the cell along each lattice direction.
    pub(crate) fn perpendicular_widths(&self) -> Vector3<f64> {
        let a = self.lattice_vector(0);
        let b = self.lattice_vector(1);
        let c = self.lattice_vector(2);
        Vector3::new(
            self.volume / b.cross(&c).norm(),
            self.volume / c.cross(&a).norm(),
            self.volume / a.cross(&b).norm(),
        )
    }

    pub(crate) fn to_fractional(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.inverse.transpose() * position
    }

    /// Cartesian offset of the lattice translation `n_a a + n_b b + n_c c`.
    pub(crate) fn translation(&self, shift: [i32; 3]) -> Vector3<f64> {
        let n = Vector3::new(shift[0] as f64, shift[1] as f64, shift[2] as f64);
        self.matrix.transpose() * n
    }
}
