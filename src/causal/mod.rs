//! Causal
//!
//! This module implements the treatment-effect estimators: difference in means
//! for randomized trials, propensity weighting and doubly robust estimation for
//! observational data, meta-learners (S, T, X, DR) for heterogeneous effects,
//! Double Machine Learning for continuous treatments, and a bootstrap wrapper
//! for any scalar estimator.
pub mod bootstrap;
pub mod dml;
pub mod metalearners;
pub mod propensity;
pub mod randomized;
