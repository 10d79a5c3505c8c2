//! Objective
//!
//! Loss functions minimized by the boosted tree models. Each objective
//! provides per-sample losses, first and second derivatives with respect to
//! the raw score, and the constant initial score.
use crate::utils::{fast_sum, sigmoid};
use serde::{Deserialize, Serialize};

pub trait ObjectiveFunction: Send + Sync {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64>;
    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Vec<f64>);
    fn initial_value(&self, y: &[f64]) -> f64;
    /// Map a raw score to the prediction scale.
    fn transform(&self, yhat: f64) -> f64 {
        yhat
    }
}

/// Squared Error loss, minimizes `(y - ŷ)²`.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
pub struct SquaredLoss {}

impl ObjectiveFunction for SquaredLoss {
    #[inline]
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let s = *y_ - *yhat_;
                s * s
            })
            .collect()
    }

    #[inline]
    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let g = y.iter().zip(yhat).map(|(y_, yhat_)| *yhat_ - *y_).collect();
        (g, vec![1.0; y.len()])
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        fast_sum(y) / y.len() as f64
    }
}

/// Negative log-likelihood of a Bernoulli target, scores are log-odds.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
pub struct LogLoss {}

impl ObjectiveFunction for LogLoss {
    #[inline]
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let p = sigmoid(*yhat_).clamp(1e-15, 1.0 - 1e-15);
                -(*y_ * p.ln() + (1.0 - *y_) * (1.0 - p).ln())
            })
            .collect()
    }

    #[inline]
    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Vec<f64>) {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let p = sigmoid(*yhat_);
                (p - *y_, p * (1.0 - p))
            })
            .unzip()
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        let ytot = fast_sum(y);
        let ntot = y.len() as f64;
        // Keep the initial log-odds finite when one class is absent.
        let p = (ytot / ntot).clamp(1e-6, 1.0 - 1e-6);
        (p / (1.0 - p)).ln()
    }

    fn transform(&self, yhat: f64) -> f64 {
        sigmoid(yhat)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
    LogLoss,
    SquaredLoss,
}

impl ObjectiveFunction for Objective {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        match self {
            Objective::LogLoss => LogLoss::default().loss(y, yhat),
            Objective::SquaredLoss => SquaredLoss::default().loss(y, yhat),
        }
    }

    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Vec<f64>) {
        match self {
            Objective::LogLoss => LogLoss::default().gradient(y, yhat),
            Objective::SquaredLoss => SquaredLoss::default().gradient(y, yhat),
        }
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        match self {
            Objective::LogLoss => LogLoss::default().initial_value(y),
            Objective::SquaredLoss => SquaredLoss::default().initial_value(y),
        }
    }

    fn transform(&self, yhat: f64) -> f64 {
        match self {
            Objective::LogLoss => LogLoss::default().transform(yhat),
            Objective::SquaredLoss => SquaredLoss::default().transform(yhat),
        }
    }
}
