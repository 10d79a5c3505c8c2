//! Randomized Trials
//!
//! Difference-in-means estimation of the Average Treatment Effect when the
//! treatment was assigned independently of the potential outcomes.
//!
//! * [`ate`] returns the point estimate only.
//! * [`ate_with_ci`] adds a normal-approximation confidence interval.
//! * [`ate_with_pvalue`] adds a Welch t-test of `H0: ATE = 0`.
use crate::data::Table;
use crate::errors::CausalError;
use crate::utils::{mean, non_empty_arms, sample_variance, take, validate_alpha, validate_binary_treatment};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Point estimate with a symmetric confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AteInterval {
    pub ate: f64,
    pub lower: f64,
    pub upper: f64,
    pub std_error: f64,
    /// Significance level, the interval has `1 - alpha` nominal coverage.
    pub alpha: f64,
}

/// Point estimate with a two-sided Welch t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AteTest {
    pub ate: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    /// Welch–Satterthwaite degrees of freedom.
    pub df: f64,
    pub p_value: f64,
}

/// Per-arm summary statistics.
struct Arms {
    mean0: f64,
    mean1: f64,
    var0: f64,
    var1: f64,
    n0: usize,
    n1: usize,
}

fn split_arms(table: &Table, treatment: &str, outcome: &str) -> Result<Arms, CausalError> {
    let w = table.column(treatment)?;
    let y = table.column(outcome)?;
    validate_binary_treatment(treatment, w)?;
    let (idx0, idx1) = non_empty_arms(w)?;
    let y0 = take(y, &idx0);
    let y1 = take(y, &idx1);
    Ok(Arms {
        mean0: mean(&y0),
        mean1: mean(&y1),
        var0: sample_variance(&y0),
        var1: sample_variance(&y1),
        n0: y0.len(),
        n1: y1.len(),
    })
}

impl Arms {
    fn ate(&self) -> f64 {
        self.mean1 - self.mean0
    }

    /// Variance of each arm's mean, `s^2 / n`.
    fn mean_variances(&self) -> Result<(f64, f64), CausalError> {
        for (arm, n) in [(0_u8, self.n0), (1_u8, self.n1)] {
            if n < 2 {
                return Err(CausalError::InsufficientObservations {
                    arm,
                    found: n,
                    required: 2,
                });
            }
        }
        Ok((self.var0 / self.n0 as f64, self.var1 / self.n1 as f64))
    }

    /// Zero is an error; NaN or infinite outcomes pass through as a non-finite value.
    fn std_error(&self) -> Result<f64, CausalError> {
        let (v0, v1) = self.mean_variances()?;
        let se = (v0 + v1).sqrt();
        if se == 0.0 {
            return Err(CausalError::DegenerateVariance(
                "both arms of the outcome are constant".to_string(),
            ));
        }
        if !se.is_finite() {
            warn!("Standard error is {}, the outcome has NaN or infinite values.", se);
        }
        Ok(se)
    }
}

/// `mean(outcome | treated) - mean(outcome | control)`.
pub fn ate(table: &Table, treatment: &str, outcome: &str) -> Result<f64, CausalError> {
    Ok(split_arms(table, treatment, outcome)?.ate())
}

/// ATE with the interval `ate ± z(1 - alpha/2) * SE`,
/// `SE = sqrt(s1²/n1 + s0²/n0)`.
pub fn ate_with_ci(table: &Table, treatment: &str, outcome: &str, alpha: f64) -> Result<AteInterval, CausalError> {
    validate_alpha(alpha)?;
    let arms = split_arms(table, treatment, outcome)?;
    let ate = arms.ate();
    let se = arms.std_error()?;

    let normal = Normal::new(0.0, 1.0).map_err(|e| {
        CausalError::InvalidParameter("normal".to_string(), "valid distribution".to_string(), e.to_string())
    })?;
    let z = normal.inverse_cdf(1.0 - alpha / 2.0);

    debug!(
        "ate_with_ci: n0 = {}, n1 = {}, ate = {:.6}, se = {:.6}, z = {:.4}",
        arms.n0, arms.n1, ate, se, z
    );
    Ok(AteInterval {
        ate,
        lower: ate - z * se,
        upper: ate + z * se,
        std_error: se,
        alpha,
    })
}

/// ATE with a two-sided Welch t-test against zero effect.
pub fn ate_with_pvalue(table: &Table, treatment: &str, outcome: &str) -> Result<AteTest, CausalError> {
    let arms = split_arms(table, treatment, outcome)?;
    let ate = arms.ate();
    let se = arms.std_error()?;
    let (v0, v1) = arms.mean_variances()?;

    let df = (v0 + v1).powi(2) / (v0 * v0 / (arms.n0 - 1) as f64 + v1 * v1 / (arms.n1 - 1) as f64);
    let t_statistic = ate / se;
    let p_value = if t_statistic.is_nan() || df.is_nan() {
        f64::NAN
    } else {
        let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| {
            CausalError::InvalidParameter("df".to_string(), "positive degrees of freedom".to_string(), e.to_string())
        })?;
        (2.0 * dist.sf(t_statistic.abs())).clamp(0.0, 1.0)
    };

    debug!(
        "ate_with_pvalue: ate = {:.6}, t = {:.4}, df = {:.2}, p = {:.4}",
        ate, t_statistic, df, p_value
    );
    Ok(AteTest {
        ate,
        std_error: se,
        t_statistic,
        df,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn example() -> Table {
        Table::from_columns(vec![
            ("t", vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
            ("y", vec![5.2, 3.1, 6.0, 2.8, 5.5, 3.3]),
        ])
        .unwrap()
    }

    #[test]
    fn test_ate_example() {
        let table = example();
        assert_abs_diff_eq!(ate(&table, "t", "y").unwrap(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_ate_with_ci_example() {
        let res = ate_with_ci(&example(), "t", "y", 0.05).unwrap();
        assert_abs_diff_eq!(res.ate, 2.5, epsilon = 1e-12);
        // s1² = 0.1633.., s0² = 0.0633..
        let se = (0.49 / 3.0 / 3.0 + 0.19 / 3.0 / 3.0_f64).sqrt();
        assert_abs_diff_eq!(res.std_error, se, epsilon = 1e-9);
        assert_abs_diff_eq!(res.upper - res.ate, 1.959963984540054 * se, epsilon = 1e-6);
        assert_abs_diff_eq!(res.ate - res.lower, res.upper - res.ate, epsilon = 1e-12);
        assert!(res.lower > 1.9 && res.upper < 3.1);
    }

    #[test]
    fn test_ate_with_pvalue_example() {
        let res = ate_with_pvalue(&example(), "t", "y").unwrap();
        assert_abs_diff_eq!(res.ate, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(res.t_statistic, res.ate / res.std_error, epsilon = 1e-12);
        assert!(res.df > 2.0 && res.df <= 4.0, "df {}", res.df);
        assert!(res.p_value > 0.0 && res.p_value < 0.01, "p {}", res.p_value);
    }

    #[test]
    fn test_equal_variance_df() {
        // Equal sizes and variances give df = n0 + n1 - 2.
        let table = Table::from_columns(vec![
            ("t", vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
            ("y", vec![1.0, 2.0, 3.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let res = ate_with_pvalue(&table, "t", "y").unwrap();
        assert_abs_diff_eq!(res.df, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(res.ate, -1.0, epsilon = 1e-12);
        // t = -1 / sqrt(2/3), two-sided p from t(4).
        assert_abs_diff_eq!(res.p_value, 0.2878641346, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_arm() {
        let table = Table::from_columns(vec![("t", vec![1.0, 1.0]), ("y", vec![1.0, 2.0])]).unwrap();
        assert!(matches!(ate(&table, "t", "y"), Err(CausalError::EmptyTreatmentArm(0))));
        assert!(matches!(
            ate_with_ci(&table, "t", "y", 0.05),
            Err(CausalError::EmptyTreatmentArm(0))
        ));
    }

    #[test]
    fn test_single_observation_arm() {
        let table = Table::from_columns(vec![("t", vec![1.0, 0.0, 0.0]), ("y", vec![1.0, 2.0, 3.0])]).unwrap();
        assert_abs_diff_eq!(ate(&table, "t", "y").unwrap(), -1.5, epsilon = 1e-12);
        assert!(matches!(
            ate_with_pvalue(&table, "t", "y"),
            Err(CausalError::InsufficientObservations { arm: 1, found: 1, .. })
        ));
    }

    #[test]
    fn test_degenerate_variance() {
        let table = Table::from_columns(vec![
            ("t", vec![1.0, 1.0, 0.0, 0.0]),
            ("y", vec![2.0, 2.0, 1.0, 1.0]),
        ])
        .unwrap();
        assert!(matches!(
            ate_with_pvalue(&table, "t", "y"),
            Err(CausalError::DegenerateVariance(_))
        ));
        assert!(matches!(
            ate_with_ci(&table, "t", "y", 0.05),
            Err(CausalError::DegenerateVariance(_))
        ));
    }

    #[test]
    fn test_pvalue_far_tail_is_positive() {
        let table = Table::from_columns(vec![
            ("t", vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
            ("y", vec![100.0, 100.1, 99.9, 100.0, 0.0, 0.1, -0.1, 0.0]),
        ])
        .unwrap();
        let res = ate_with_pvalue(&table, "t", "y").unwrap();
        assert!(res.t_statistic > 1000.0);
        assert!(res.p_value > 0.0 && res.p_value < 1e-10, "p {}", res.p_value);
    }

    #[test]
    fn test_non_finite_outcome_propagates() {
        let table = Table::from_columns(vec![
            ("t", vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
            ("y", vec![5.2, 3.1, f64::NAN, 2.8, 5.5, 3.3]),
        ])
        .unwrap();
        assert!(ate(&table, "t", "y").unwrap().is_nan());
        let ci = ate_with_ci(&table, "t", "y", 0.05).unwrap();
        assert!(ci.std_error.is_nan() && ci.lower.is_nan() && ci.upper.is_nan());
        let test = ate_with_pvalue(&table, "t", "y").unwrap();
        assert!(test.t_statistic.is_nan() && test.p_value.is_nan());
    }

    #[test]
    fn test_input_validation() {
        let table = example();
        assert!(matches!(ate(&table, "w", "y"), Err(CausalError::MissingColumn(_))));
        assert!(matches!(
            ate_with_ci(&table, "t", "y", 1.5),
            Err(CausalError::InvalidParameter(..))
        ));
        let bad = table.with_column("t", vec![1.0, 0.0, 2.0, 0.0, 1.0, 0.0]).unwrap();
        assert!(matches!(
            ate(&bad, "t", "y"),
            Err(CausalError::NonBinaryTreatment { .. })
        ));
    }
}
