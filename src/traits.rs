use ndarray::Array2;

use crate::error::Result;

/// Estimates the covariance matrix of a set of signals given as a (samples x features) matrix.
pub trait CovarianceEstimator {
    fn covariance(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}
