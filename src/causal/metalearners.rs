//! Meta-learners for Heterogeneous Treatment Effect (HTE) estimation.
//!
//! Implements standard meta-algorithms (S-Learner, T-Learner, X-Learner, DR-Learner)
//! on top of any [`Regressor`] / [`Classifier`] backend.
//!
//! Each learner is available as a struct with `fit(x, w, y)` / `predict(x)` over
//! [`Matrix`] data, and as a table function returning the test table with a
//! `cate` column.

use crate::constants::{CATE_COLUMN, PROPENSITY_CLIP};
use crate::data::{Matrix, Table};
use crate::errors::CausalError;
use crate::models::{Classifier, Regressor};
use crate::utils::{non_empty_arms, take, validate_binary_treatment};
use log::debug;
use serde::{Deserialize, Serialize};

/// Check shapes and treatment values, returning the control and treated rows.
fn check_inputs(x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<(Vec<usize>, Vec<usize>), CausalError> {
    for (column, len) in [("treatment", w.len()), ("outcome", y.len())] {
        if len != x.rows {
            return Err(CausalError::LengthMismatch {
                column: column.to_string(),
                expected: x.rows,
                found: len,
            });
        }
    }
    validate_binary_treatment("treatment", w)?;
    non_empty_arms(w)
}

/// Fit `model` on the given rows of `x` and `y`.
fn fit_subset<R: Regressor>(model: &mut R, x: &Matrix<f64>, y: &[f64], rows: &[usize]) -> Result<(), CausalError> {
    let data = x.select_rows(rows);
    let sub = Matrix::new(&data, rows.len(), x.cols);
    model.fit(&sub, &take(y, rows))
}

// ---------------------------------------------------------------------------
// S-Learner
// ---------------------------------------------------------------------------

/// S-Learner (Single Learner).
///
/// Estimates $Y \approx \mu(X, W)$.
/// CATE(x) = $\mu(x, 1) - \mu(x, 0)$.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SLearner<R> {
    pub model: R,
}

impl<R: Regressor> SLearner<R> {
    pub fn new(model: R) -> Self {
        Self { model }
    }

    pub fn fit(&mut self, x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<(), CausalError> {
        check_inputs(x, w, y)?;
        // Concatenate W as a new feature to X
        let mut data = Vec::with_capacity(x.data.len() + x.rows);
        data.extend_from_slice(x.data);
        data.extend_from_slice(w);
        let matrix_aug = Matrix::new(&data, x.rows, x.cols + 1);
        self.model.fit(&matrix_aug, y)
    }

    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let data_1 = x.with_constant_columns(&[1.0]);
        let mu1 = self.model.predict(&Matrix::new(&data_1, x.rows, x.cols + 1))?;
        let data_0 = x.with_constant_columns(&[0.0]);
        let mu0 = self.model.predict(&Matrix::new(&data_0, x.rows, x.cols + 1))?;
        Ok(mu1.iter().zip(mu0.iter()).map(|(m1, m0)| m1 - m0).collect())
    }
}

// ---------------------------------------------------------------------------
// T-Learner
// ---------------------------------------------------------------------------

/// T-Learner (Two Learners).
///
/// Estimates $\mu_0(X)$ on control data and $\mu_1(X)$ on treated data.
/// CATE(x) = $\mu_1(x) - \mu_0(x)$.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TLearner<R> {
    pub mu0: R,
    pub mu1: R,
}

impl<R: Regressor + Clone> TLearner<R> {
    pub fn new(model: R) -> Self {
        Self {
            mu0: model.clone(),
            mu1: model,
        }
    }

    pub fn fit(&mut self, x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<(), CausalError> {
        let (idx0, idx1) = check_inputs(x, w, y)?;
        fit_subset(&mut self.mu0, x, y, &idx0)?;
        fit_subset(&mut self.mu1, x, y, &idx1)
    }

    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let mu1 = self.mu1.predict(x)?;
        let mu0 = self.mu0.predict(x)?;
        Ok(mu1.iter().zip(mu0.iter()).map(|(m1, m0)| m1 - m0).collect())
    }
}

// ---------------------------------------------------------------------------
// X-Learner
// ---------------------------------------------------------------------------

/// X-Learner.
///
/// 1. Estimate $\mu_0, \mu_1$ as in the T-Learner.
/// 2. Impute effects: $D_1 = Y_1 - \mu_0(X_1)$, $D_0 = \mu_1(X_0) - Y_0$.
/// 3. Fit $\tau_1$ on $(X_1, D_1)$ and $\tau_0$ on $(X_0, D_0)$.
/// 4. CATE(x) = $g(x) \tau_0(x) + (1 - g(x)) \tau_1(x)$, with $g$ the propensity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XLearner<R, C> {
    pub mu0: R,
    pub mu1: R,
    pub tau0: R,
    pub tau1: R,
    pub propensity: C,
}

impl<R: Regressor + Clone, C: Classifier> XLearner<R, C> {
    pub fn new(model: R, propensity: C) -> Self {
        Self {
            mu0: model.clone(),
            mu1: model.clone(),
            tau0: model.clone(),
            tau1: model,
            propensity,
        }
    }

    pub fn fit(&mut self, x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<(), CausalError> {
        let (idx0, idx1) = check_inputs(x, w, y)?;

        // Stage 1
        fit_subset(&mut self.mu0, x, y, &idx0)?;
        fit_subset(&mut self.mu1, x, y, &idx1)?;

        // Stage 2
        let data0 = x.select_rows(&idx0);
        let x0 = Matrix::new(&data0, idx0.len(), x.cols);
        let data1 = x.select_rows(&idx1);
        let x1 = Matrix::new(&data1, idx1.len(), x.cols);

        let mu1_x0 = self.mu1.predict(&x0)?;
        let d0: Vec<f64> = mu1_x0.iter().zip(take(y, &idx0)).map(|(m, yi)| m - yi).collect();
        let mu0_x1 = self.mu0.predict(&x1)?;
        let d1: Vec<f64> = take(y, &idx1).iter().zip(mu0_x1).map(|(yi, m)| yi - m).collect();

        // Stage 3
        self.tau0.fit(&x0, &d0)?;
        self.tau1.fit(&x1, &d1)?;
        self.propensity.fit(x, w)?;

        debug!("x-learner fitted on {} control and {} treated rows", idx0.len(), idx1.len());
        Ok(())
    }

    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let g = self.propensity.predict_proba(x)?;
        let tau0 = self.tau0.predict(x)?;
        let tau1 = self.tau1.predict(x)?;
        Ok(g.iter()
            .zip(tau0.iter().zip(tau1.iter()))
            .map(|(g, (t0, t1))| g * t0 + (1.0 - g) * t1)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// DR-Learner
// ---------------------------------------------------------------------------

/// DR-Learner (Doubly Robust).
///
/// Regresses the AIPW pseudo-outcome
/// $\Gamma = \mu_1 - \mu_0 + \frac{W (Y - \mu_1)}{p} - \frac{(1 - W)(Y - \mu_0)}{1 - p}$
/// on the covariates, with $p$ clipped into $[\epsilon, 1 - \epsilon]$.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DRLearner<R, C> {
    pub mu0: R,
    pub mu1: R,
    pub tau: R,
    pub propensity: C,
    pub clip: f64,
}

impl<R: Regressor + Clone, C: Classifier> DRLearner<R, C> {
    pub fn new(model: R, propensity: C) -> Self {
        Self {
            mu0: model.clone(),
            mu1: model.clone(),
            tau: model,
            propensity,
            clip: PROPENSITY_CLIP,
        }
    }

    /// Pseudo-outcomes of the fitted nuisance models.
    pub fn pseudo_outcomes(&self, x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<Vec<f64>, CausalError> {
        check_inputs(x, w, y)?;
        let mu0 = self.mu0.predict(x)?;
        let mu1 = self.mu1.predict(x)?;
        let p = self.propensity.predict_proba(x)?;
        let (lo, hi) = (self.clip, 1.0 - self.clip);
        Ok((0..x.rows)
            .map(|i| {
                let pi = p[i].clamp(lo, hi);
                mu1[i] - mu0[i] + w[i] * (y[i] - mu1[i]) / pi - (1.0 - w[i]) * (y[i] - mu0[i]) / (1.0 - pi)
            })
            .collect())
    }

    pub fn fit(&mut self, x: &Matrix<f64>, w: &[f64], y: &[f64]) -> Result<(), CausalError> {
        let (idx0, idx1) = check_inputs(x, w, y)?;
        fit_subset(&mut self.mu0, x, y, &idx0)?;
        fit_subset(&mut self.mu1, x, y, &idx1)?;
        self.propensity.fit(x, w)?;
        let gamma = self.pseudo_outcomes(x, w, y)?;
        self.tau.fit(x, &gamma)
    }

    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        self.tau.predict(x)
    }
}

// ---------------------------------------------------------------------------
// Table functions
// ---------------------------------------------------------------------------

/// Covariates, treatment and outcome of the training table.
struct TrainingData<'a> {
    x: Vec<f64>,
    w: &'a [f64],
    y: &'a [f64],
    rows: usize,
    cols: usize,
}

impl<'a> TrainingData<'a> {
    fn new<S: AsRef<str>>(
        train: &'a Table,
        covariates: &[S],
        treatment: &str,
        outcome: &str,
    ) -> Result<Self, CausalError> {
        Ok(TrainingData {
            x: train.select(covariates)?,
            w: train.column(treatment)?,
            y: train.column(outcome)?,
            rows: train.n_rows(),
            cols: covariates.len(),
        })
    }

    fn matrix(&self) -> Matrix<f64> {
        Matrix::new(&self.x, self.rows, self.cols)
    }
}

/// Evaluate `predict` on the test covariates and attach the `cate` column.
fn with_cate<S, F>(test: &Table, covariates: &[S], predict: F) -> Result<Table, CausalError>
where
    S: AsRef<str>,
    F: FnOnce(&Matrix<f64>) -> Result<Vec<f64>, CausalError>,
{
    let data = test.select(covariates)?;
    let x = Matrix::new(&data, test.n_rows(), covariates.len());
    let cate = predict(&x)?;
    test.with_column(CATE_COLUMN, cate)
}

/// S-Learner on tables: `test` with a `cate` column.
pub fn s_learner<S: AsRef<str>, R: Regressor>(
    train: &Table,
    test: &Table,
    covariates: &[S],
    treatment: &str,
    outcome: &str,
    model: R,
) -> Result<Table, CausalError> {
    let data = TrainingData::new(train, covariates, treatment, outcome)?;
    let mut learner = SLearner::new(model);
    learner.fit(&data.matrix(), data.w, data.y)?;
    with_cate(test, covariates, |x| learner.predict(x))
}

/// T-Learner on tables: `test` with a `cate` column.
pub fn t_learner<S: AsRef<str>, R: Regressor + Clone>(
    train: &Table,
    test: &Table,
    covariates: &[S],
    treatment: &str,
    outcome: &str,
    model: R,
) -> Result<Table, CausalError> {
    let data = TrainingData::new(train, covariates, treatment, outcome)?;
    let mut learner = TLearner::new(model);
    learner.fit(&data.matrix(), data.w, data.y)?;
    with_cate(test, covariates, |x| learner.predict(x))
}

/// X-Learner on tables: `test` with a `cate` column.
pub fn x_learner<S: AsRef<str>, R: Regressor + Clone, C: Classifier>(
    train: &Table,
    test: &Table,
    covariates: &[S],
    treatment: &str,
    outcome: &str,
    model: R,
    propensity: C,
) -> Result<Table, CausalError> {
    let data = TrainingData::new(train, covariates, treatment, outcome)?;
    let mut learner = XLearner::new(model, propensity);
    learner.fit(&data.matrix(), data.w, data.y)?;
    with_cate(test, covariates, |x| learner.predict(x))
}

/// DR-Learner on tables: `test` with a `cate` column.
pub fn dr_learner<S: AsRef<str>, R: Regressor + Clone, C: Classifier>(
    train: &Table,
    test: &Table,
    covariates: &[S],
    treatment: &str,
    outcome: &str,
    model: R,
    propensity: C,
) -> Result<Table, CausalError> {
    let data = TrainingData::new(train, covariates, treatment, outcome)?;
    let mut learner = DRLearner::new(model, propensity);
    learner.fit(&data.matrix(), data.w, data.y)?;
    with_cate(test, covariates, |x| learner.predict(x))
}
