//! Models
//!
//! The capability traits every estimator is written against, and the
//! regression/classification backends shipped with the crate. Any type
//! implementing [`Regressor`] or [`Classifier`] plugs into the learners.
use crate::data::Matrix;
use crate::errors::CausalError;

pub mod boosting;
pub mod linear;
pub mod logistic;

pub use boosting::{BoostedClassifier, BoostedRegressor, BoosterConfig};
pub use linear::LinearRegression;
pub use logistic::LogisticRegression;

/// A model of a continuous target.
pub trait Regressor: Send + Sync {
    /// Fit the model, replacing any previous fit.
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError>;
    /// Predict the target for each row of `x`.
    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError>;
}

/// A model of a binary (0/1) target.
pub trait Classifier: Send + Sync {
    /// Fit the model, replacing any previous fit.
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError>;
    /// Predicted probability of the positive class for each row of `x`.
    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError>;
}

pub(crate) fn validate_fit_input(x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
    if x.rows == 0 {
        return Err(CausalError::EmptyTable);
    }
    if y.len() != x.rows {
        return Err(CausalError::LengthMismatch {
            column: "target".to_string(),
            expected: x.rows,
            found: y.len(),
        });
    }
    Ok(())
}

pub(crate) fn validate_binary_target(y: &[f64]) -> Result<(), CausalError> {
    match y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        Some(&v) => Err(CausalError::NonBinaryTarget(v)),
        None => Ok(()),
    }
}

pub(crate) fn validate_predict_input(fitted_cols: usize, x: &Matrix<f64>) -> Result<(), CausalError> {
    if x.cols != fitted_cols {
        return Err(CausalError::DimensionMismatch {
            expected: fitted_cols,
            found: x.cols,
        });
    }
    Ok(())
}
