//! Functional connectivity between region time series.
//!
//! A connectivity measure estimates the covariance of the (timepoints x regions) time series and
//! derives a (regions x regions) matrix from it: the covariance itself, the correlation, the
//! precision (inverse covariance) or the partial correlation.

use ndarray::{Array1, Array2, Axis};
use ndarray_stats::CorrelationExt;

use std::str::FromStr;

use crate::error::{ConnectomeError, Result};
use crate::signal::{standardize, Standardize};
use crate::traits::CovarianceEstimator;


/// The maximum likelihood covariance estimate, i.e., normalized by the number of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmpiricalCovariance;

impl CovarianceEstimator for EmpiricalCovariance {
    fn covariance(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        x.t().cov(0.0).map_err(|_| ConnectomeError::InsufficientTimepoints(x.nrows()))
    }
}


/// Covariance estimate shrunk towards a scaled identity matrix, with the shrinkage intensity chosen by the
/// Ledoit-Wolf formula (Ledoit and Wolf 2004, "A well-conditioned estimator for large-dimensional covariance matrices").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedoitWolf;

impl LedoitWolf {

    /// The empirical covariance, the shrinkage intensity in `[0, 1]` and the shrinkage target `mu`, the mean variance.
    pub fn fit(&self, x: &Array2<f64>) -> Result<(Array2<f64>, f64, f64)> {
        let xc = centered(x)?;
        let n = xc.nrows() as f64;
        let p = xc.ncols() as f64;

        let emp = xc.t().dot(&xc) / n;
        let trace: f64 = emp.diag().sum();
        let mu = trace / p;
        if xc.ncols() == 1 {
            return Ok((emp, 0.0, mu));
        }

        let x2 = xc.mapv(|v| v * v);
        let beta_ = x2.t().dot(&x2).sum();
        let delta_ = emp.iter().map(|v| v * v).sum::<f64>();

        let beta = (beta_ / n - delta_) / (p * n);
        let delta = (delta_ - 2.0 * mu * trace + p * mu * mu) / p;
        let beta = beta.min(delta);
        let shrinkage = if beta <= 0.0 || delta <= 0.0 { 0.0 } else { beta / delta };
        Ok((emp, shrinkage, mu))
    }


    /// The Ledoit-Wolf shrinkage intensity for the data.
    pub fn shrinkage(&self, x: &Array2<f64>) -> Result<f64> {
        Ok(self.fit(x)?.1)
    }
}

impl CovarianceEstimator for LedoitWolf {
    fn covariance(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (emp, shrinkage, mu) = self.fit(x)?;
        let mut shrunk = emp * (1.0 - shrinkage);
        shrunk.diag_mut().mapv_inplace(|v| v + shrinkage * mu);
        Ok(shrunk)
    }
}


fn centered(x: &Array2<f64>) -> Result<Array2<f64>> {
    let mean = x.mean_axis(Axis(0)).ok_or(ConnectomeError::InsufficientTimepoints(0))?;
    Ok(x - &mean)
}


/// The covariance estimators available for a [`ConnectivityMeasure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    Empirical,
    LedoitWolf,
}

impl CovarianceEstimator for Estimator {
    fn covariance(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Estimator::Empirical => EmpiricalCovariance.covariance(x),
            Estimator::LedoitWolf => LedoitWolf.covariance(x),
        }
    }
}

impl FromStr for Estimator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "empirical" => Ok(Estimator::Empirical),
            "ledoit_wolf" => Ok(Estimator::LedoitWolf),
            _ => Err(format!("unknown covariance estimator '{}', expected empirical or ledoit_wolf", s)),
        }
    }
}


/// The kind of connectivity matrix to derive from the covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityKind {
    Correlation,
    PartialCorrelation,
    Covariance,
    Precision,
}

impl FromStr for ConnectivityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "correlation" => Ok(ConnectivityKind::Correlation),
            "partial_correlation" => Ok(ConnectivityKind::PartialCorrelation),
            "covariance" => Ok(ConnectivityKind::Covariance),
            "precision" => Ok(ConnectivityKind::Precision),
            _ => Err(format!(
                "unknown connectivity kind '{}', expected correlation, partial_correlation, covariance or precision",
                s
            )),
        }
    }
}


/// Computes a connectivity matrix from region time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityMeasure {
    pub kind: ConnectivityKind,
    pub estimator: Estimator,
    pub standardize: Standardize,
    /// Set the diagonal of the result to 0, it carries no information about connections.
    pub zero_diagonal: bool,
}

impl Default for ConnectivityMeasure {
    fn default() -> ConnectivityMeasure {
        ConnectivityMeasure {
            kind: ConnectivityKind::Correlation,
            estimator: Estimator::LedoitWolf,
            standardize: Standardize::ZscoreSample,
            zero_diagonal: true,
        }
    }
}

impl ConnectivityMeasure {

    /// Compute the (regions x regions) connectivity matrix for the (timepoints x regions) time series.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::Array2;
    /// use neuroconnectivity::ConnectivityMeasure;
    /// let ts = Array2::from_shape_fn((50, 4), |(t, r)| ((t * (r + 1)) as f64 * 0.3).sin());
    /// let conn = ConnectivityMeasure::default().fit_transform(&ts).unwrap();
    /// assert_eq!((4, 4), conn.dim());
    /// assert_eq!(0.0, conn[[2, 2]]);
    /// ```
    pub fn fit_transform(&self, time_series: &Array2<f64>) -> Result<Array2<f64>> {
        let mut x = time_series.to_owned();
        standardize(&mut x, self.standardize)?;
        let cov = self.estimator.covariance(&x)?;

        let mut conn = match self.kind {
            ConnectivityKind::Covariance => cov,
            ConnectivityKind::Correlation => cov_to_corr(&cov),
            ConnectivityKind::Precision => invert_symmetric(&cov)?,
            ConnectivityKind::PartialCorrelation => prec_to_partial(&invert_symmetric(&cov)?),
        };
        if self.zero_diagonal {
            conn.diag_mut().fill(0.0);
        }
        Ok(conn)
    }
}


/// Normalize a covariance matrix to a correlation matrix with unit diagonal.
///
/// Entries involving a variable with zero variance are 0.
pub fn cov_to_corr(cov: &Array2<f64>) -> Array2<f64> {
    let d: Array1<f64> = cov.diag().mapv(f64::sqrt);
    Array2::from_shape_fn(cov.dim(), |(i, j)| {
        if i == j {
            1.0
        } else if d[i] > 0.0 && d[j] > 0.0 {
            cov[[i, j]] / (d[i] * d[j])
        } else {
            0.0
        }
    })
}


/// Convert a precision matrix to partial correlations, with unit diagonal.
pub fn prec_to_partial(precision: &Array2<f64>) -> Array2<f64> {
    let mut partial = cov_to_corr(precision).mapv(|v| -v);
    partial.diag_mut().fill(1.0);
    partial
}


/// Invert a symmetric matrix with Gauss-Jordan elimination and partial pivoting. The result is symmetrized.
pub fn invert_symmetric(m: &Array2<f64>) -> Result<Array2<f64>> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(ConnectomeError::DimensionMismatch(format!("cannot invert a {}x{} matrix", n, m.ncols())));
    }
    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return Err(ConnectomeError::SingularMatrix);
    }

    let mut a = m.to_owned();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| a[[r1, col]].abs().partial_cmp(&a[[r2, col]].abs()).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(col);
        let pivot = a[[pivot_row, col]];
        if pivot.abs() <= 1e-12 * scale {
            return Err(ConnectomeError::SingularMatrix);
        }
        if pivot_row != col {
            for c in 0..n {
                a.swap([pivot_row, c], [col, c]);
                inv.swap([pivot_row, c], [col, c]);
            }
        }
        for c in 0..n {
            a[[col, c]] /= pivot;
            inv[[col, c]] /= pivot;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = a[[r, col]];
            if factor == 0.0 {
                continue;
            }
            for c in 0..n {
                a[[r, c]] -= factor * a[[col, c]];
                inv[[r, c]] -= factor * inv[[col, c]];
            }
        }
    }
    Ok((&inv + &inv.t()) / 2.0)
}
