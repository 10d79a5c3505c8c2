//! Linear Regression
//!
//! Ordinary least squares with an optional ridge penalty. Without a penalty
//! the system is solved through the SVD, which returns the minimum-norm
//! solution when the design is collinear.
use crate::data::Matrix;
use crate::errors::CausalError;
use crate::models::{validate_fit_input, validate_predict_input, Regressor};
use crate::utils::validate_positive_float_parameter;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Relative cutoff below which singular values are treated as zero.
const SVD_RCOND: f64 = 1e-12;

/// Column-major design with a leading column of ones when requested.
pub(crate) fn design_matrix(x: &Matrix<f64>, fit_intercept: bool) -> DMatrix<f64> {
    let k = x.cols + usize::from(fit_intercept);
    let mut data = Vec::with_capacity(x.rows * k);
    if fit_intercept {
        data.resize(x.rows, 1.0);
    }
    data.extend_from_slice(x.data);
    DMatrix::from_column_slice(x.rows, k, &data)
}

/// Solve `a * b = y` in the least-squares sense.
///
/// Non-finite entries in `a` or `y` give a vector of NaN.
pub(crate) fn lstsq(a: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>, CausalError> {
    if a.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Ok(DVector::from_element(a.ncols(), f64::NAN));
    }
    let svd = a.clone().svd(true, true);
    let tol = svd.singular_values.max() * SVD_RCOND * a.nrows().max(a.ncols()) as f64;
    svd.solve(y, tol)
        .map_err(|e| CausalError::SingularMatrix(format!("least squares ({})", e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Whether to estimate an intercept.
    pub fit_intercept: bool,
    /// Ridge penalty, never applied to the intercept.
    pub l2: f64,
    /// Fitted intercept, `0.0` when `fit_intercept` is false.
    pub intercept: f64,
    /// Fitted slopes, one per feature column; `None` before fitting.
    pub coefficients: Option<Vec<f64>>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        LinearRegression {
            fit_intercept: true,
            l2: 0.0,
            intercept: 0.0,
            coefficients: None,
        }
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }

    pub fn without_intercept(mut self) -> Self {
        self.fit_intercept = false;
        self
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
        validate_fit_input(x, y)?;
        validate_positive_float_parameter(self.l2, "l2")?;

        let a = design_matrix(x, self.fit_intercept);
        let k = a.ncols();
        if k == 0 {
            self.intercept = 0.0;
            self.coefficients = Some(Vec::new());
            return Ok(());
        }
        let y_vec = DVector::from_column_slice(y);

        let beta = if self.l2 > 0.0 {
            let mut xtx = a.transpose() * &a;
            let start = usize::from(self.fit_intercept);
            for j in start..k {
                xtx[(j, j)] += self.l2;
            }
            let xty = a.transpose() * &y_vec;
            match xtx.clone().cholesky() {
                Some(chol) => chol.solve(&xty),
                None => lstsq(&xtx, &xty)?,
            }
        } else {
            lstsq(&a, &y_vec)?
        };

        if self.fit_intercept {
            self.intercept = beta[0];
            self.coefficients = Some(beta.iter().skip(1).copied().collect());
        } else {
            self.intercept = 0.0;
            self.coefficients = Some(beta.iter().copied().collect());
        }
        Ok(())
    }

    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| CausalError::NotFitted("LinearRegression".to_string()))?;
        validate_predict_input(coefficients.len(), x)?;
        let mut out = vec![self.intercept; x.rows];
        for (j, c) in coefficients.iter().enumerate() {
            for (o, v) in out.iter_mut().zip(x.get_col(j)) {
                *o += c * v;
            }
        }
        Ok(out)
    }
}
