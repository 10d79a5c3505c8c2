// Modules
pub mod causal;
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod formula;
pub mod models;
pub mod objective;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use causal::bootstrap::{bootstrap, BootstrapResult};
pub use causal::dml::{double_ml, DoubleML};
pub use causal::metalearners::{dr_learner, s_learner, t_learner, x_learner, DRLearner, SLearner, TLearner, XLearner};
pub use causal::propensity::{doubly_robust, doubly_robust_with, ipw, propensity_scores, PropensityEstimator};
pub use causal::randomized::{ate, ate_with_ci, ate_with_pvalue, AteInterval, AteTest};
pub use config::{ConfigIO, EstimatorConfig};
pub use data::{Matrix, Table};
pub use errors::{CausalError, FormulaError};
pub use formula::Formula;
pub use models::{Classifier, Regressor};
