//! Propensity Scores
//!
//! Observational ATE estimators built on a logistic model of `P(T = 1 | X)`:
//!
//! * **IPW** weights each unit by `T/p + (1 - T)/(1 - p)` and takes the
//!   weighted difference of outcome means (Horvitz–Thompson, or Hajek when
//!   configured).
//! * **Doubly Robust** (AIPW) adds one linear outcome model per arm and is
//!   consistent when either the propensity model or the outcome models are
//!   correctly specified.
//!
//! Scores near 0 or 1 are handled by the configured [`PropensityPolicy`]
//! before any weighting takes place.
use crate::config::{IpwNormalization, PropensityConfig, PropensityPolicy};
use crate::data::{Matrix, Table};
use crate::errors::CausalError;
use crate::formula::Formula;
use crate::models::linear::LinearRegression;
use crate::models::logistic::{LogisticConfig, LogisticRegression};
use crate::models::{Classifier, Regressor};
use crate::utils::{non_empty_arms, take, validate_binary_treatment};
use log::{debug, warn};

/// Propensities after the policy, with the rows that survived it.
#[derive(Debug, Clone)]
pub struct AdjustedScores {
    pub scores: Vec<f64>,
    /// Row indices into the original table, in order.
    pub rows: Vec<usize>,
}

/// Apply the policy to raw scores.
///
/// `Clip` keeps every row and clamps its score; `Trim` drops the rows whose
/// score falls outside the bounds.
pub fn apply_policy(raw: &[f64], policy: &PropensityPolicy) -> Result<AdjustedScores, CausalError> {
    policy.validate()?;
    match *policy {
        PropensityPolicy::Clip { epsilon } => {
            let (lo, hi) = (epsilon, 1.0 - epsilon);
            let clipped = raw.iter().filter(|&&p| p < lo || p > hi).count();
            if clipped > 0 {
                warn!(
                    "{} of {} propensity scores clipped into [{}, {}].",
                    clipped,
                    raw.len(),
                    lo,
                    hi
                );
            }
            Ok(AdjustedScores {
                scores: raw.iter().map(|p| p.clamp(lo, hi)).collect(),
                rows: (0..raw.len()).collect(),
            })
        }
        PropensityPolicy::Trim { lower, upper } => {
            let rows: Vec<usize> = raw
                .iter()
                .enumerate()
                .filter(|&(_, &p)| p >= lower && p <= upper)
                .map(|(i, _)| i)
                .collect();
            let trimmed = raw.len() - rows.len();
            if trimmed > 0 {
                warn!(
                    "{} of {} units trimmed, propensity outside [{}, {}].",
                    trimmed,
                    raw.len(),
                    lower,
                    upper
                );
            }
            Ok(AdjustedScores {
                scores: take(raw, &rows),
                rows,
            })
        }
    }
}

/// Weighted mean of `values`, normalized by `n` or by the weight sum.
fn weighted_mean(values: &[f64], weights: &[f64], normalization: IpwNormalization) -> f64 {
    let total: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    match normalization {
        IpwNormalization::HorvitzThompson => total / values.len() as f64,
        IpwNormalization::Hajek => total / weights.iter().sum::<f64>(),
    }
}

/// Estimates propensities and the weighting-based ATEs.
#[derive(Debug, Clone, Default)]
pub struct PropensityEstimator {
    pub config: PropensityConfig,
}

impl PropensityEstimator {
    pub fn new(config: PropensityConfig) -> Self {
        PropensityEstimator { config }
    }

    fn check_response(formula: &Formula, expected: &str) -> Result<(), CausalError> {
        match formula.response() {
            Some(r) if r != expected => Err(CausalError::InvalidParameter(
                "formula".to_string(),
                format!("response `{}` or none", expected),
                r.to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Fitted `P(T = 1 | X)` for every row, before any clipping or trimming.
    ///
    /// The formula's right-hand side gives the covariates; a left-hand side,
    /// when present, must name the treatment column.
    pub fn propensity_scores(
        &self,
        table: &Table,
        formula: &Formula,
        treatment: &str,
    ) -> Result<Vec<f64>, CausalError> {
        Self::check_response(formula, treatment)?;
        let w = table.column(treatment)?;
        validate_binary_treatment(treatment, w)?;
        non_empty_arms(w)?;

        let data = formula.design(table)?;
        let x = Matrix::new(&data, table.n_rows(), formula.n_columns());
        let mut model = LogisticRegression::new(LogisticConfig {
            fit_intercept: formula.intercept(),
            ..self.config.logistic.clone()
        });
        model.fit(&x, w)?;
        model.predict_proba(&x)
    }

    fn adjusted_scores(
        &self,
        table: &Table,
        formula: &Formula,
        treatment: &str,
    ) -> Result<AdjustedScores, CausalError> {
        let raw = self.propensity_scores(table, formula, treatment)?;
        let adjusted = apply_policy(&raw, &self.config.policy)?;
        // Trimming may empty an arm.
        non_empty_arms(&take(table.column(treatment)?, &adjusted.rows))?;
        Ok(adjusted)
    }

    /// Inverse propensity weighted ATE.
    pub fn ipw(&self, table: &Table, formula: &Formula, treatment: &str, outcome: &str) -> Result<f64, CausalError> {
        let y_all = table.column(outcome)?;
        let adjusted = self.adjusted_scores(table, formula, treatment)?;
        let w = take(table.column(treatment)?, &adjusted.rows);
        let y = take(y_all, &adjusted.rows);
        let p = &adjusted.scores;

        let w1: Vec<f64> = w.iter().zip(p).map(|(t, p)| t / p).collect();
        let w0: Vec<f64> = w.iter().zip(p).map(|(t, p)| (1.0 - t) / (1.0 - p)).collect();
        let normalization = self.config.normalization;
        let ate = weighted_mean(&y, &w1, normalization) - weighted_mean(&y, &w0, normalization);

        debug!(
            "ipw: n = {}, normalization = {:?}, ate = {:.6}",
            y.len(),
            normalization,
            ate
        );
        Ok(ate)
    }

    /// Augmented IPW with separate propensity and outcome specifications.
    ///
    /// The outcome formula's covariates feed one linear regression per arm,
    /// each fitted on that arm's rows and evaluated on every row.
    pub fn doubly_robust(
        &self,
        table: &Table,
        propensity_formula: &Formula,
        outcome_formula: &Formula,
        treatment: &str,
        outcome: &str,
    ) -> Result<f64, CausalError> {
        Self::check_response(outcome_formula, outcome)?;
        let y_all = table.column(outcome)?;
        let adjusted = self.adjusted_scores(table, propensity_formula, treatment)?;

        let w_all = table.column(treatment)?;
        let (idx0, idx1) = non_empty_arms(w_all)?;
        let data = outcome_formula.design(table)?;
        let x = Matrix::new(&data, table.n_rows(), outcome_formula.n_columns());

        let mut arm_predictions = Vec::with_capacity(2);
        for idx in [&idx0, &idx1] {
            let sub = x.select_rows(idx);
            let x_arm = Matrix::new(&sub, idx.len(), x.cols);
            let mut model = LinearRegression::new();
            model.fit_intercept = outcome_formula.intercept();
            model.fit(&x_arm, &take(y_all, idx))?;
            arm_predictions.push(take(&model.predict(&x)?, &adjusted.rows));
        }
        let (mu0, mu1) = (&arm_predictions[0], &arm_predictions[1]);

        let w = take(w_all, &adjusted.rows);
        let y = take(y_all, &adjusted.rows);
        let p = &adjusted.scores;
        let n = y.len() as f64;

        let w1: Vec<f64> = w.iter().zip(p).map(|(t, p)| t / p).collect();
        let w0: Vec<f64> = w.iter().zip(p).map(|(t, p)| (1.0 - t) / (1.0 - p)).collect();
        let r1: Vec<f64> = y.iter().zip(mu1).map(|(y, m)| y - m).collect();
        let r0: Vec<f64> = y.iter().zip(mu0).map(|(y, m)| y - m).collect();
        let normalization = self.config.normalization;

        let treated = mu1.iter().sum::<f64>() / n + weighted_mean(&r1, &w1, normalization);
        let control = mu0.iter().sum::<f64>() / n + weighted_mean(&r0, &w0, normalization);
        let ate = treated - control;

        debug!(
            "doubly_robust: n = {}, n0 = {}, n1 = {}, ate = {:.6}",
            y.len(),
            idx0.len(),
            idx1.len(),
            ate
        );
        Ok(ate)
    }
}

/// Fitted propensity scores for a formula string, default settings.
pub fn propensity_scores(table: &Table, formula: &str, treatment: &str) -> Result<Vec<f64>, CausalError> {
    let formula = Formula::parse(formula)?;
    PropensityEstimator::default().propensity_scores(table, &formula, treatment)
}

/// IPW estimate of the ATE, default settings.
///
/// ```
/// use causalkit::causal::propensity::ipw;
/// use causalkit::Table;
///
/// let table = Table::from_columns(vec![
///     ("t", vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
///     ("y", vec![5.2, 3.1, 6.0, 2.8, 5.5, 3.3]),
/// ])
/// .unwrap();
/// let ate = ipw(&table, "t ~ 1", "t", "y").unwrap();
/// assert!((ate - 2.5).abs() < 1e-6);
/// ```
pub fn ipw(table: &Table, formula: &str, treatment: &str, outcome: &str) -> Result<f64, CausalError> {
    let formula = Formula::parse(formula)?;
    PropensityEstimator::default().ipw(table, &formula, treatment, outcome)
}

/// Doubly robust estimate using the same covariates on both sides.
pub fn doubly_robust(table: &Table, formula: &str, treatment: &str, outcome: &str) -> Result<f64, CausalError> {
    let formula = Formula::parse(formula)?;
    let outcome_formula = formula.clone().without_response();
    PropensityEstimator::default().doubly_robust(table, &formula, &outcome_formula, treatment, outcome)
}

/// Doubly robust estimate with distinct propensity and outcome covariates.
pub fn doubly_robust_with(
    table: &Table,
    propensity_formula: &str,
    outcome_formula: &str,
    treatment: &str,
    outcome: &str,
) -> Result<f64, CausalError> {
    let ps = Formula::parse(propensity_formula)?;
    let om = Formula::parse(outcome_formula)?;
    PropensityEstimator::default().doubly_robust(table, &ps, &om, treatment, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FormulaError;
    use approx::assert_abs_diff_eq;

    fn example() -> Table {
        Table::from_columns(vec![
            ("t", vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
            ("y", vec![5.2, 3.1, 6.0, 2.8, 5.5, 3.3]),
            ("x", vec![0.3, 0.1, 0.5, 0.4, 0.2, 0.6]),
        ])
        .unwrap()
    }

    #[test]
    fn test_constant_propensity_reduces_to_difference_in_means() {
        let table = example();
        let scores = propensity_scores(&table, "1", "t").unwrap();
        assert!(scores.iter().all(|p| (p - 0.5).abs() < 1e-9));
        assert_abs_diff_eq!(ipw(&table, "1", "t", "y").unwrap(), 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(doubly_robust(&table, "t ~ 1", "t", "y").unwrap(), 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_hajek_normalization() {
        let table = example();
        let estimator = PropensityEstimator::new(PropensityConfig {
            normalization: IpwNormalization::Hajek,
            ..Default::default()
        });
        let formula = Formula::parse("x").unwrap();
        let hajek = estimator.ipw(&table, &formula, "t", "y").unwrap();
        assert!(hajek.is_finite());
        // Hajek weights within an arm sum to one, so outcomes shifted by a
        // constant leave the estimate unchanged.
        let shifted: Vec<f64> = table.column("y").unwrap().iter().map(|v| v + 10.0).collect();
        let shifted = table.with_column("y", shifted).unwrap();
        assert_abs_diff_eq!(
            estimator.ipw(&shifted, &formula, "t", "y").unwrap(),
            hajek,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_apply_policy_clip_and_trim() {
        let raw = [0.0001, 0.2, 0.5, 0.9999];
        let clipped = apply_policy(&raw, &PropensityPolicy::default()).unwrap();
        assert_eq!(clipped.rows, vec![0, 1, 2, 3]);
        assert_eq!(clipped.scores, vec![0.001, 0.2, 0.5, 0.999]);

        let trimmed = apply_policy(
            &raw,
            &PropensityPolicy::Trim {
                lower: 0.1,
                upper: 0.9,
            },
        )
        .unwrap();
        assert_eq!(trimmed.rows, vec![1, 2]);
        assert_eq!(trimmed.scores, vec![0.2, 0.5]);

        assert!(apply_policy(&raw, &PropensityPolicy::Clip { epsilon: -1.0 }).is_err());
    }

    #[test]
    fn test_trimming_that_empties_an_arm() {
        // x perfectly separates the arms, every score lands near 0 or 1.
        let table = Table::from_columns(vec![
            ("t", vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
            ("y", vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]),
            ("x", vec![5.0, 6.0, 7.0, -5.0, -6.0, -7.0]),
        ])
        .unwrap();
        let estimator = PropensityEstimator::new(PropensityConfig {
            policy: PropensityPolicy::Trim {
                lower: 0.05,
                upper: 0.95,
            },
            ..Default::default()
        });
        let formula = Formula::parse("x").unwrap();
        assert!(matches!(
            estimator.ipw(&table, &formula, "t", "y"),
            Err(CausalError::EmptyTreatmentArm(_))
        ));
    }

    #[test]
    fn test_formula_errors_propagate() {
        let table = example();
        assert!(matches!(
            ipw(&table, "x +", "t", "y"),
            Err(CausalError::Formula(FormulaError::UnexpectedEnd(_)))
        ));
        assert!(matches!(
            doubly_robust(&table, "f(x)", "t", "y"),
            Err(CausalError::Formula(FormulaError::UnknownFunction { .. }))
        ));
        assert!(matches!(
            ipw(&table, "z", "t", "y"),
            Err(CausalError::MissingColumn(c)) if c == "z"
        ));
        assert!(matches!(
            ipw(&table, "y ~ x", "t", "y"),
            Err(CausalError::InvalidParameter(..))
        ));
    }

    #[test]
    fn test_empty_arm() {
        let table = Table::from_columns(vec![
            ("t", vec![0.0, 0.0, 0.0]),
            ("y", vec![1.0, 2.0, 3.0]),
            ("x", vec![1.0, 2.0, 3.0]),
        ])
        .unwrap();
        assert!(matches!(
            ipw(&table, "x", "t", "y"),
            Err(CausalError::EmptyTreatmentArm(1))
        ));
        assert!(matches!(
            doubly_robust_with(&table, "x", "x", "t", "y"),
            Err(CausalError::EmptyTreatmentArm(1))
        ));
    }
}
