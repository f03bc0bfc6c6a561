//! Voxel-to-world transforms.
//!
//! NIfTI images store a 4x4 affine matrix that maps voxel indices `(i, j, k)` to world coordinates in
//! millimetres, typically scanner or MNI space. Resampling an atlas onto a functional image is a
//! matter of composing one image's affine with the inverse of the other's.

use std::fmt;

use crate::error::{ConnectomeError, Result};

/// A 4x4 homogeneous transform, stored row-major. The last row is `[0, 0, 0, 1]` for all affines read from disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub rows: [[f64; 4]; 4],
}

impl Default for Affine {
    fn default() -> Affine {
        Affine::diagonal([1.0, 1.0, 1.0])
    }
}

impl Affine {

    /// Build an affine from its first three rows. The last row is set to `[0, 0, 0, 1]`.
    pub fn from_rows(r0: [f64; 4], r1: [f64; 4], r2: [f64; 4]) -> Affine {
        Affine { rows: [r0, r1, r2, [0.0, 0.0, 0.0, 1.0]] }
    }

    /// A pure scaling transform with the given voxel spacing and no translation.
    pub fn diagonal(spacing: [f64; 3]) -> Affine {
        Affine::from_rows(
            [spacing[0], 0.0, 0.0, 0.0],
            [0.0, spacing[1], 0.0, 0.0],
            [0.0, 0.0, spacing[2], 0.0],
        )
    }

    /// Map the voxel index `ijk` to world coordinates.
    pub fn apply(&self, ijk: [f64; 3]) -> [f64; 3] {
        let m = &self.rows;
        let mut xyz = [0.0; 3];
        for (row, out) in xyz.iter_mut().enumerate() {
            *out = m[row][0] * ijk[0] + m[row][1] * ijk[1] + m[row][2] * ijk[2] + m[row][3];
        }
        xyz
    }

    /// The transform that first applies `other`, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        let mut rows = [[0.0; 4]; 4];
        for r in 0..4 {
            for c in 0..4 {
                rows[r][c] = (0..4).map(|k| self.rows[r][k] * other.rows[k][c]).sum();
            }
        }
        Affine { rows }
    }

    /// Invert the affine. Only the upper-left 3x3 block needs a real inversion, the translation follows from it.
    pub fn inverse(&self) -> Result<Affine> {
        let m = &self.rows;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        if det.abs() < 1e-12 {
            return Err(ConnectomeError::SingularMatrix);
        }

        // adjugate divided by the determinant
        let mut inv = [[0.0; 3]; 3];
        inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det;
        inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det;
        inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det;
        inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det;
        inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det;
        inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det;
        inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det;
        inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det;
        inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det;

        let mut rows = [[0.0; 4]; 4];
        for r in 0..3 {
            rows[r][..3].copy_from_slice(&inv[r]);
            rows[r][3] = -(inv[r][0] * m[0][3] + inv[r][1] * m[1][3] + inv[r][2] * m[2][3]);
        }
        rows[3][3] = 1.0;
        Ok(Affine { rows })
    }

    /// Element-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Affine, tol: f64) -> bool {
        self.rows.iter().flatten().zip(other.rows.iter().flatten()).all(|(a, b)| (a - b).abs() <= tol)
    }

    /// The voxel spacing along each axis, i.e., the lengths of the first three columns.
    pub fn voxel_sizes(&self) -> [f64; 3] {
        let mut sizes = [0.0; 3];
        for (c, size) in sizes.iter_mut().enumerate() {
            *size = (0..3).map(|r| self.rows[r][c] * self.rows[r][c]).sum::<f64>().sqrt();
        }
        sizes
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.rows.iter() {
            writeln!(f, "[{:10.4} {:10.4} {:10.4} {:10.4}]", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}
