//! Cleaning of extracted time series: standardization and removal of confounds.
//!
//! All functions operate on (timepoints x signals) matrices, i.e., each column is one signal.

use ndarray::{Array1, Array2, Axis};

use std::str::FromStr;

use crate::error::{ConnectomeError, Result};

/// Confound basis directions with a residual norm below this (relative to the largest confound norm) are
/// linearly dependent on earlier ones and dropped.
pub const BASIS_TOLERANCE: f64 = 100.0 * f64::EPSILON;


/// How to standardize signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standardize {
    /// Leave the signals as they are.
    None,
    /// Center each signal and scale it to unit sample standard deviation (ddof = 1).
    ZscoreSample,
}

impl FromStr for Standardize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Standardize::None),
            "zscore_sample" => Ok(Standardize::ZscoreSample),
            _ => Err(format!("unknown standardization '{}', expected none or zscore_sample", s)),
        }
    }
}


/// Standardize the columns of `x` in place.
///
/// Signals with (near) zero variance are only centered, they are not scaled.
pub fn standardize(x: &mut Array2<f64>, method: Standardize) -> Result<()> {
    if method == Standardize::None {
        return Ok(());
    }
    let n = x.nrows();
    if n < 2 {
        return Err(ConnectomeError::InsufficientTimepoints(n));
    }
    for mut col in x.axis_iter_mut(Axis(1)) {
        let mean = col.sum() / n as f64;
        col.mapv_inplace(|v| v - mean);
        let std = (col.iter().map(|v| v * v).sum::<f64>() / (n - 1) as f64).sqrt();
        if std >= f64::EPSILON {
            col.mapv_inplace(|v| v / std);
        }
    }
    Ok(())
}


/// Compute an orthonormal basis (one column per direction) of the space spanned by the confound columns.
///
/// Uses modified Gram-Schmidt with column pivoting: in each step the remaining column with the largest
/// residual norm becomes the next basis direction. Once all residual norms are at most [`BASIS_TOLERANCE`],
/// the remaining columns are linearly dependent on the basis and dropped.
pub fn confound_basis(confounds: &Array2<f64>) -> Array2<f64> {
    let n = confounds.nrows();
    let mut work = confounds.to_owned();
    let mut remaining: Vec<usize> = (0..confounds.ncols()).collect();
    let mut basis: Vec<Array1<f64>> = Vec::new();
    loop {
        let best = remaining
            .iter()
            .enumerate()
            .map(|(pos, &col)| (pos, work.column(col).dot(&work.column(col)).sqrt()))
            .fold(None, |acc: Option<(usize, f64)>, (pos, norm)| match acc {
                Some((_, best_norm)) if best_norm >= norm => acc,
                _ => Some((pos, norm)),
            });
        let (pos, norm) = match best {
            Some((pos, norm)) if norm > BASIS_TOLERANCE => (pos, norm),
            _ => break,
        };

        let col = remaining.remove(pos);
        let q: Array1<f64> = work.column(col).mapv(|v| v / norm);
        for &other in remaining.iter() {
            let proj = q.dot(&work.column(other));
            work.column_mut(other).scaled_add(-proj, &q);
        }
        basis.push(q);
    }

    let mut q = Array2::<f64>::zeros((n, basis.len()));
    for (idx, direction) in basis.iter().enumerate() {
        q.column_mut(idx).assign(direction);
    }
    q
}


/// Options for [`clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    pub standardize: Standardize,
    pub standardize_confounds: Standardize,
}

impl Default for CleanOptions {
    fn default() -> CleanOptions {
        CleanOptions { standardize: Standardize::ZscoreSample, standardize_confounds: Standardize::ZscoreSample }
    }
}


/// Remove confounds from the signals and standardize them.
///
/// The confounds (if any) are standardized, then the signals are projected onto the orthogonal complement
/// of the confound space, and finally the signals are standardized. The confounds must have one row per
/// signal timepoint.
pub fn clean(signals: &mut Array2<f64>, confounds: Option<&Array2<f64>>, opts: &CleanOptions) -> Result<()> {
    if let Some(confounds) = confounds {
        if confounds.nrows() != signals.nrows() {
            return Err(ConnectomeError::DimensionMismatch(format!(
                "confounds have {} timepoints, signals have {}",
                confounds.nrows(),
                signals.nrows()
            )));
        }
        if confounds.ncols() > 0 {
            let mut confounds = confounds.to_owned();
            standardize(&mut confounds, opts.standardize_confounds)?;
            let q = confound_basis(&confounds);
            let fitted = q.dot(&q.t().dot(&*signals));
            *signals -= &fitted;
        }
    }
    standardize(signals, opts.standardize)
}


#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;

    fn wave(n: usize, freq: f64, phase: f64) -> Array1<f64> {
        Array::from_shape_fn(n, |t| (freq * t as f64 + phase).sin())
    }

    fn signals(n: usize) -> Array2<f64> {
        Array::from_shape_fn((n, 3), |(t, c)| {
            let t = t as f64;
            (0.3 * t * (c + 1) as f64).sin() + 0.05 * t + c as f64 * 10.0
        })
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_sample_variance() {
        let mut x = signals(40);
        standardize(&mut x, Standardize::ZscoreSample).unwrap();
        for col in x.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(0.0, col.sum() / 40.0, epsilon = 1e-12);
            assert_abs_diff_eq!(1.0, col.iter().map(|v| v * v).sum::<f64>() / 39.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_columns_become_zero() {
        let mut x = Array2::from_elem((10, 2), 3.0);
        standardize(&mut x, Standardize::ZscoreSample).unwrap();
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn a_single_timepoint_cannot_be_standardized() {
        let mut x = Array2::<f64>::zeros((1, 4));
        assert!(matches!(standardize(&mut x, Standardize::ZscoreSample), Err(ConnectomeError::InsufficientTimepoints(1))));
        assert!(standardize(&mut x, Standardize::None).is_ok());
    }

    #[test]
    fn the_confound_basis_is_orthonormal_and_drops_dependent_columns() {
        let n = 50;
        let a = wave(n, 0.2, 0.0);
        let b = wave(n, 0.7, 1.0);
        let mut confounds = Array2::<f64>::zeros((n, 3));
        confounds.column_mut(0).assign(&a);
        confounds.column_mut(1).assign(&b);
        confounds.column_mut(2).assign(&(&a * 2.0 - &b));

        let q = confound_basis(&confounds);
        assert_eq!((n, 2), q.dim());
        let gram = q.t().dot(&q);
        assert_abs_diff_eq!(gram, Array2::<f64>::eye(2), epsilon = 1e-10);
    }

    #[test]
    fn the_rank_tolerance_is_absolute() {
        let mut confounds = Array2::<f64>::zeros((4, 2));
        // A small but independent column next to a large one is kept.
        confounds.column_mut(0).assign(&ndarray::arr1(&[1e6, -1e6, 2e6, 0.0]));
        confounds.column_mut(1).assign(&ndarray::arr1(&[0.0, 0.0, 0.0, 1e-9]));
        let q = confound_basis(&confounds);
        assert_eq!((4, 2), q.dim());
        assert_abs_diff_eq!(1.0, q[[3, 1]], epsilon = 1e-12);

        // Below 100 eps, a column counts as zero.
        confounds.column_mut(1).assign(&ndarray::arr1(&[0.0, 0.0, 0.0, 1e-15]));
        assert_eq!((4, 1), confound_basis(&confounds).dim());
    }

    #[test]
    fn cleaned_signals_are_orthogonal_to_the_confounds() {
        let n = 60;
        let mut confounds = Array2::<f64>::zeros((n, 2));
        confounds.column_mut(0).assign(&wave(n, 0.1, 0.3));
        confounds.column_mut(1).assign(&Array::from_shape_fn(n, |t| t as f64));

        let mut x = signals(n);
        for mut col in x.axis_iter_mut(Axis(1)) {
            col.scaled_add(4.0, &confounds.column(0));
        }
        clean(&mut x, Some(&confounds), &CleanOptions::default()).unwrap();

        let mut z = confounds.clone();
        standardize(&mut z, Standardize::ZscoreSample).unwrap();
        let overlap = z.t().dot(&x);
        assert_abs_diff_eq!(overlap, Array2::<f64>::zeros((2, 3)), epsilon = 1e-9);
        for col in x.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(0.0, col.sum(), epsilon = 1e-9);
        }
    }

    #[test]
    fn confounds_with_the_wrong_length_are_rejected() {
        let mut x = signals(20);
        let confounds = Array2::<f64>::zeros((19, 2));
        assert!(matches!(clean(&mut x, Some(&confounds), &CleanOptions::default()), Err(ConnectomeError::DimensionMismatch(_))));
    }

    #[test]
    fn without_confounds_only_standardization_happens() {
        let mut x = signals(20);
        let mut expected = x.clone();
        standardize(&mut expected, Standardize::ZscoreSample).unwrap();
        clean(&mut x, None, &CleanOptions::default()).unwrap();
        assert_eq!(expected, x);
    }
}
