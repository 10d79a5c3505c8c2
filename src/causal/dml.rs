//! Double / Debiased Machine Learning (DML)
//!
//! Partial-linear model with a continuous treatment:
//!
//! $$Y = \theta(X) \cdot T + g(X) + \epsilon$$
//!
//! Both the outcome and the treatment are orthogonalized against the
//! covariates with out-of-fold nuisance predictions,
//!
//! $$\tilde{Y} = Y - \hat{g}(X), \quad \tilde{T} = T - \hat{m}(X)$$
//!
//! and the effect is read off an OLS fit of
//! `Y~ ~ 1 + X + T~ + T~:X` (heterogeneous) or `Y~ ~ 1 + T~` (homogeneous):
//!
//! $$\theta(x) = \beta_{T} + \sum_j \beta_{T:x_j} x_j$$
//!
//! ## Cross-fitting
//!
//! Rows are shuffled with a seeded RNG and dealt into `n_folds` folds. The
//! nuisance prediction of every row comes from a model that never saw it.
use crate::config::{validate_n_folds, DmlConfig};
use crate::constants::CATE_COLUMN;
use crate::data::{Matrix, Table};
use crate::errors::CausalError;
use crate::models::{LinearRegression, Regressor};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Fold id of every row, `n / k` or `n / k + 1` rows per fold.
pub fn fold_assignment(n: usize, n_folds: usize, seed: u64) -> Result<Vec<usize>, CausalError> {
    validate_n_folds(n_folds, n)?;
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let mut folds = vec![0; n];
    for (position, &row) in order.iter().enumerate() {
        folds[row] = position % n_folds;
    }
    Ok(folds)
}

/// Out-of-fold predictions of `target`, one fresh clone of `model` per fold.
///
/// `folds` holds one id in `0..n_folds` per row of `x`.
pub fn cross_fit_predict<R: Regressor + Clone>(
    model: &R,
    x: &Matrix<f64>,
    target: &[f64],
    folds: &[usize],
    n_folds: usize,
) -> Result<Vec<f64>, CausalError> {
    for (column, len) in [("target", target.len()), ("folds", folds.len())] {
        if len != x.rows {
            return Err(CausalError::LengthMismatch {
                column: column.to_string(),
                expected: x.rows,
                found: len,
            });
        }
    }
    validate_n_folds(n_folds, x.rows)?;
    if let Some(&fold) = folds.iter().find(|&&f| f >= n_folds) {
        return Err(CausalError::InvalidParameter(
            "folds".to_string(),
            format!("fold ids below n_folds ({})", n_folds),
            fold.to_string(),
        ));
    }
    let mut out = vec![0.0; x.rows];
    for fold in 0..n_folds {
        let (held_out, train): (Vec<usize>, Vec<usize>) = (0..x.rows).partition(|&i| folds[i] == fold);
        let train_data = x.select_rows(&train);
        let train_y: Vec<f64> = train.iter().map(|&i| target[i]).collect();
        let mut m = model.clone();
        m.fit(&Matrix::new(&train_data, train.len(), x.cols), &train_y)?;

        let test_data = x.select_rows(&held_out);
        let preds = m.predict(&Matrix::new(&test_data, held_out.len(), x.cols))?;
        for (&i, p) in held_out.iter().zip(preds) {
            out[i] = p;
        }
    }
    Ok(out)
}

/// Double ML estimator of a (possibly heterogeneous) continuous-treatment effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleML<R> {
    /// Nuisance model of `E[Y | X]`.
    pub model_y: R,
    /// Nuisance model of `E[T | X]`.
    pub model_t: R,
    pub config: DmlConfig,
    /// Final-stage OLS: intercept, then `X`, `T~`, `T~:X` (the last two groups
    /// collapse to `T~` alone in the homogeneous case).
    pub coefficients: Option<Vec<f64>>,
    n_features: usize,
}

impl<R: Regressor + Clone> DoubleML<R> {
    pub fn new(model: R, config: DmlConfig) -> Self {
        DoubleML {
            model_y: model.clone(),
            model_t: model,
            config,
            coefficients: None,
            n_features: 0,
        }
    }

    /// Cross-fitted residuals `(Y~, T~)`.
    pub fn residuals(
        &self,
        x: &Matrix<f64>,
        t: &[f64],
        y: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), CausalError> {
        for (column, len) in [("treatment", t.len()), ("outcome", y.len())] {
            if len != x.rows {
                return Err(CausalError::LengthMismatch {
                    column: column.to_string(),
                    expected: x.rows,
                    found: len,
                });
            }
        }
        let folds = fold_assignment(x.rows, self.config.n_folds, self.config.seed)?;
        let g = cross_fit_predict(&self.model_y, x, y, &folds, self.config.n_folds)?;
        let m = cross_fit_predict(&self.model_t, x, t, &folds, self.config.n_folds)?;
        let y_res = y.iter().zip(g).map(|(y, g)| y - g).collect();
        let t_res = t.iter().zip(m).map(|(t, m)| t - m).collect();
        Ok((y_res, t_res))
    }

    pub fn fit(&mut self, x: &Matrix<f64>, t: &[f64], y: &[f64]) -> Result<(), CausalError> {
        let (y_res, t_res) = self.residuals(x, t, y)?;

        let mut data: Vec<f64>;
        let cols;
        if self.config.heterogeneous {
            cols = 2 * x.cols + 1;
            data = Vec::with_capacity(x.rows * cols);
            data.extend_from_slice(x.data);
            data.extend_from_slice(&t_res);
            for j in 0..x.cols {
                data.extend(x.get_col(j).iter().zip(&t_res).map(|(v, r)| v * r));
            }
        } else {
            cols = 1;
            data = t_res.clone();
        }

        let mut final_model = LinearRegression::new();
        final_model.fit(&Matrix::new(&data, x.rows, cols), &y_res)?;
        let mut coefficients = vec![final_model.intercept];
        if let Some(c) = final_model.coefficients {
            coefficients.extend(c);
        }

        debug!(
            "double ml: n = {}, folds = {}, heterogeneous = {}, theta intercept = {:.6}",
            x.rows,
            self.config.n_folds,
            self.config.heterogeneous,
            coefficients[if self.config.heterogeneous { x.cols + 1 } else { 1 }]
        );
        self.n_features = x.cols;
        self.coefficients = Some(coefficients);
        Ok(())
    }

    /// `theta(x)` for each row of `x`.
    pub fn effect(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| CausalError::NotFitted("DoubleML".to_string()))?;
        if !self.config.heterogeneous {
            return Ok(vec![coefficients[1]; x.rows]);
        }
        if x.cols != self.n_features {
            return Err(CausalError::DimensionMismatch {
                expected: self.n_features,
                found: x.cols,
            });
        }
        let p = self.n_features;
        let mut theta = vec![coefficients[p + 1]; x.rows];
        for j in 0..p {
            let b = coefficients[p + 2 + j];
            for (th, v) in theta.iter_mut().zip(x.get_col(j)) {
                *th += b * v;
            }
        }
        Ok(theta)
    }
}

/// Double ML on tables: `test` with a `cate` column holding `theta(x)`.
pub fn double_ml<S: AsRef<str>, R: Regressor + Clone>(
    train: &Table,
    test: &Table,
    covariates: &[S],
    treatment: &str,
    outcome: &str,
    model: R,
    config: &DmlConfig,
) -> Result<Table, CausalError> {
    let x_train = train.select(covariates)?;
    let t = train.column(treatment)?;
    let y = train.column(outcome)?;
    let mut dml = DoubleML::new(model, config.clone());
    dml.fit(&Matrix::new(&x_train, train.n_rows(), covariates.len()), t, y)?;

    let x_test = test.select(covariates)?;
    let theta = dml.effect(&Matrix::new(&x_test, test.n_rows(), covariates.len()))?;
    test.with_column(CATE_COLUMN, theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_fold_assignment() {
        let folds = fold_assignment(23, 5, 42).unwrap();
        assert_eq!(folds, fold_assignment(23, 5, 42).unwrap());
        let mut sizes = [0; 5];
        for f in &folds {
            sizes[*f] += 1;
        }
        assert_eq!(sizes.iter().sum::<usize>(), 23);
        assert!(sizes.iter().all(|s| *s == 4 || *s == 5));
        assert_ne!(folds, fold_assignment(23, 5, 43).unwrap());
    }

    #[test]
    fn test_fold_assignment_rejects_bad_fold_counts() {
        for k in [0, 1, 11] {
            assert!(matches!(
                fold_assignment(10, k, 0),
                Err(CausalError::InvalidParameter(..))
            ));
        }
    }

    #[test]
    fn test_cross_fit_rejects_bad_folds() {
        let x: Vec<f64> = Vec::new();
        let m = Matrix::new(&x, 4, 0);
        let target = vec![1.0, 1.0, 3.0, 3.0];
        let model = LinearRegression::new();
        assert!(matches!(
            cross_fit_predict(&model, &m, &target, &[0, 1], 2),
            Err(CausalError::LengthMismatch { expected: 4, found: 2, .. })
        ));
        assert!(matches!(
            cross_fit_predict(&model, &m, &target[..3], &[0, 0, 1, 1], 2),
            Err(CausalError::LengthMismatch { expected: 4, found: 3, .. })
        ));
        assert!(matches!(
            cross_fit_predict(&model, &m, &target, &[0, 0, 1, 2], 2),
            Err(CausalError::InvalidParameter(..))
        ));
        assert!(matches!(
            cross_fit_predict(&model, &m, &target, &[0, 0, 0, 0], 0),
            Err(CausalError::InvalidParameter(..))
        ));
    }

    #[test]
    fn test_cross_fit_uses_other_folds() {
        // A constant target per fold: the out-of-fold mean never sees its own fold.
        let x: Vec<f64> = Vec::new();
        let m = Matrix::new(&x, 4, 0);
        let folds = vec![0, 0, 1, 1];
        let target = vec![1.0, 1.0, 3.0, 3.0];
        let preds = cross_fit_predict(&LinearRegression::new(), &m, &target, &folds, 2).unwrap();
        for (p, e) in preds.iter().zip([3.0, 3.0, 1.0, 1.0]) {
            assert!((p - e).abs() < 1e-9);
        }
    }

    #[test]
    fn test_homogeneous_effect() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 2000;
        let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let t: Vec<f64> = x.iter().map(|xi| xi + rng.gen_range(-1.0..1.0)).collect();
        let y: Vec<f64> = x
            .iter()
            .zip(&t)
            .map(|(xi, ti)| 2.0 * ti + xi + rng.gen_range(-0.1..0.1))
            .collect();
        let m = Matrix::new(&x, n, 1);
        let mut dml = DoubleML::new(
            LinearRegression::new(),
            DmlConfig {
                heterogeneous: false,
                ..Default::default()
            },
        );
        dml.fit(&m, &t, &y).unwrap();
        let theta = dml.effect(&m).unwrap();
        assert_eq!(theta.len(), n);
        assert!((theta[0] - 2.0).abs() < 0.02, "theta {}", theta[0]);
    }

    #[test]
    fn test_dml_errors() {
        let x = [0.0, 1.0, 2.0];
        let m = Matrix::new(&x, 3, 1);
        let dml = DoubleML::new(LinearRegression::new(), DmlConfig::default());
        assert!(matches!(dml.effect(&m), Err(CausalError::NotFitted(_))));

        let mut dml = DoubleML::new(LinearRegression::new(), DmlConfig::default());
        assert!(matches!(
            dml.fit(&m, &[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0]),
            Err(CausalError::InvalidParameter(..))
        ));
        assert!(matches!(
            dml.fit(&m, &[0.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(CausalError::LengthMismatch { .. })
        ));
    }
}
