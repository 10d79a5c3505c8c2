//! Logistic Regression
//!
//! Binary logistic regression fitted by Newton-Raphson (iteratively
//! reweighted least squares) with an L2 penalty on the slopes.
use crate::data::Matrix;
use crate::errors::CausalError;
use crate::models::linear::{design_matrix, lstsq};
use crate::models::{validate_binary_target, validate_fit_input, validate_predict_input, Classifier};
use crate::utils::{sigmoid, validate_positive_float_parameter};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

fn default_l2() -> f64 {
    1e-4
}
fn default_max_iter() -> usize {
    100
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_fit_intercept() -> bool {
    true
}

/// Fitting settings for [`LogisticRegression`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticConfig {
    #[serde(default = "default_fit_intercept")]
    pub fit_intercept: bool,
    /// Ridge penalty on the slopes, keeps separable problems bounded.
    #[serde(default = "default_l2")]
    pub l2: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Convergence threshold on the largest Newton step.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        LogisticConfig {
            fit_intercept: default_fit_intercept(),
            l2: default_l2(),
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub config: LogisticConfig,
    /// Fitted intercept (log-odds at x = 0).
    pub intercept: f64,
    /// Fitted slopes; `None` before fitting.
    pub coefficients: Option<Vec<f64>>,
    /// Newton iterations used by the last fit.
    pub n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(LogisticConfig::default())
    }
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        LogisticRegression {
            config,
            intercept: 0.0,
            coefficients: None,
            n_iter: 0,
        }
    }

    /// Log-odds for each row of `x`.
    pub fn decision_function(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| CausalError::NotFitted("LogisticRegression".to_string()))?;
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

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
        validate_fit_input(x, y)?;
        validate_binary_target(y)?;
        validate_positive_float_parameter(self.config.l2, "l2")?;

        let fit_intercept = self.config.fit_intercept;
        let a = design_matrix(x, fit_intercept);
        let k = a.ncols();
        let y_vec = DVector::from_column_slice(y);

        let mut beta = DVector::<f64>::zeros(k);
        if fit_intercept && k > 0 {
            let p = (y.iter().sum::<f64>() / y.len() as f64).clamp(1e-6, 1.0 - 1e-6);
            beta[0] = (p / (1.0 - p)).ln();
        }
        let mut penalty = DMatrix::<f64>::identity(k, k) * self.config.l2;
        if fit_intercept && k > 0 {
            penalty[(0, 0)] = 0.0;
        }

        let mut converged = k == 0;
        let mut n_iter = 0;
        while !converged && n_iter < self.config.max_iter {
            n_iter += 1;
            let eta = &a * &beta;
            let p = eta.map(sigmoid);
            let w = p.map(|pi| (pi * (1.0 - pi)).max(1e-12));

            let grad = a.transpose() * (&y_vec - &p) - &penalty * &beta;
            let mut aw = a.clone();
            for mut col in aw.column_iter_mut() {
                col.component_mul_assign(&w);
            }
            let hess = a.transpose() * aw + &penalty;

            let step = match hess.clone().cholesky() {
                Some(chol) => chol.solve(&grad),
                None => lstsq(&hess, &grad)?,
            };
            if step.iter().any(|v| !v.is_finite()) {
                warn!("Non-finite Newton step in logistic regression, the input has NaN or infinite values.");
                beta.fill(f64::NAN);
                break;
            }
            beta += &step;
            converged = step.amax() < self.config.tolerance;
        }

        if !converged {
            warn!(
                "Logistic regression did not converge after {} iterations, consider increasing l2 or max_iter.",
                n_iter
            );
        } else {
            debug!("Logistic regression converged after {} iterations.", n_iter);
        }

        self.n_iter = n_iter;
        if fit_intercept && k > 0 {
            self.intercept = beta[0];
            self.coefficients = Some(beta.iter().skip(1).copied().collect());
        } else {
            self.intercept = 0.0;
            self.coefficients = Some(beta.iter().copied().collect());
        }
        Ok(())
    }

    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        Ok(self.decision_function(x)?.into_iter().map(sigmoid).collect())
    }
}
