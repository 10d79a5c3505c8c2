//! Bootstrap
//!
//! Nonparametric bootstrap for any scalar estimator over a [`Table`].
//! Replicates run on a rayon thread pool; replicate `i` resamples rows
//! with `StdRng::seed_from_u64(seed + i)`, so the output does not depend on
//! the number of threads.
use crate::config::BootstrapConfig;
use crate::data::Table;
use crate::errors::CausalError;
use crate::utils::{mean, sample_variance};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Estimate on the full table.
    pub estimate: f64,
    /// Standard deviation of the replicates.
    pub std_error: f64,
    /// Percentile interval bounds.
    pub lower: f64,
    pub upper: f64,
    pub alpha: f64,
    /// Replicate estimates in replicate order, failed replicates excluded.
    pub replicates: Vec<f64>,
}

/// Quantile of sorted data, linear interpolation between order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Bootstrap `estimator` on row resamples of `table`.
///
/// Replicates whose estimator fails (a resample without treated units, say)
/// are dropped with a warning. At least two must succeed.
pub fn bootstrap<F>(table: &Table, config: &BootstrapConfig, estimator: F) -> Result<BootstrapResult, CausalError>
where
    F: Fn(&Table) -> Result<f64, CausalError> + Sync,
{
    config.validate()?;
    let n = table.n_rows();
    if n == 0 {
        return Err(CausalError::EmptyTable);
    }
    let estimate = estimator(table)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads.unwrap_or(0))
        .build()
        .map_err(|e| {
            CausalError::InvalidParameter("num_threads".to_string(), "buildable pool".to_string(), e.to_string())
        })?;

    let outcomes: Vec<Result<f64, CausalError>> = pool.install(|| {
        (0..config.n_rounds)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                estimator(&table.take(&rows))
            })
            .collect()
    });

    let mut replicates = Vec::with_capacity(outcomes.len());
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(v) => replicates.push(v),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    let failed = config.n_rounds - replicates.len();
    if failed > 0 {
        warn!("{} of {} bootstrap replicates failed and were dropped.", failed, config.n_rounds);
    }
    if replicates.len() < 2 {
        return Err(first_error.unwrap_or_else(|| {
            CausalError::InvalidParameter(
                "n_rounds".to_string(),
                "at least 2 successful replicates".to_string(),
                replicates.len().to_string(),
            )
        }));
    }

    let mut sorted = replicates.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let alpha = config.alpha;
    let result = BootstrapResult {
        estimate,
        std_error: sample_variance(&replicates).sqrt(),
        lower: quantile(&sorted, alpha / 2.0),
        upper: quantile(&sorted, 1.0 - alpha / 2.0),
        alpha,
        replicates,
    };
    debug!(
        "bootstrap: rounds = {}, estimate = {:.6}, replicate mean = {:.6}, se = {:.6}",
        result.replicates.len(),
        estimate,
        mean(&result.replicates),
        result.std_error
    );
    Ok(result)
}
