//! Gradient Boosting
//!
//! Additive ensembles of regression trees fitted on the gradient and hessian
//! of an [`Objective`]. [`BoostedRegressor`] minimizes squared loss,
//! [`BoostedClassifier`] minimizes log loss and reports probabilities.
use crate::data::Matrix;
use crate::errors::CausalError;
use crate::models::{validate_binary_target, validate_fit_input, validate_predict_input, Classifier, Regressor};
use crate::objective::{Objective, ObjectiveFunction};
use crate::tree::{Tree, TreeParams};
use crate::utils::validate_float_parameter;
use log::info;
use serde::{Deserialize, Serialize};

fn default_n_estimators() -> usize {
    100
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_max_depth() -> usize {
    3
}
fn default_min_samples_leaf() -> usize {
    5
}
fn default_lambda() -> f64 {
    1.0
}
fn default_log_iterations() -> usize {
    0
}

/// Configuration shared by the boosted models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoosterConfig {
    /// Number of boosting rounds.
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Shrinkage applied to every tree.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Logging frequency (every N iterations), 0 disables.
    #[serde(default = "default_log_iterations")]
    pub log_iterations: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        BoosterConfig {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            lambda: default_lambda(),
            log_iterations: default_log_iterations(),
        }
    }
}

impl BoosterConfig {
    fn validate(&self) -> Result<(), CausalError> {
        validate_float_parameter(self.learning_rate, f64::MIN_POSITIVE, 1.0, "learning_rate")?;
        validate_float_parameter(self.lambda, 0.0, f64::INFINITY, "lambda")?;
        if self.n_estimators == 0 {
            return Err(CausalError::InvalidParameter(
                "n_estimators".to_string(),
                "positive integer".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// The ensemble itself, shared by the regressor and the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    pub objective: Objective,
    pub config: BoosterConfig,
    pub base_score: f64,
    pub trees: Vec<Tree>,
    n_features: Option<usize>,
}

impl GradientBooster {
    pub fn new(objective: Objective, config: BoosterConfig) -> Self {
        GradientBooster {
            objective,
            config,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: None,
        }
    }

    pub fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
        validate_fit_input(x, y)?;
        self.config.validate()?;

        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            lambda: self.config.lambda,
        };
        let eta = self.config.learning_rate;

        self.trees.clear();
        self.base_score = self.objective.initial_value(y);
        let mut yhat = vec![self.base_score; y.len()];

        for i in 0..self.config.n_estimators {
            let (grad, hess) = self.objective.gradient(y, &yhat);
            let mut tree = Tree::new();
            tree.fit(x, (0..x.rows).collect(), &grad, &hess, &params);
            for node in tree.nodes.iter_mut() {
                node.weight_value *= eta;
            }
            for (row, yh) in yhat.iter_mut().enumerate() {
                *yh += tree.predict_row(x, row);
            }
            self.trees.push(tree);

            if self.config.log_iterations > 0 && i % self.config.log_iterations == 0 {
                let loss = self.objective.loss(y, &yhat);
                info!(
                    "round {:0?}, tree.nodes: {:1?}, tree.depth: {:2?}, loss: {:.6}",
                    i,
                    self.trees[i].nodes.len(),
                    self.trees[i].depth,
                    loss.iter().sum::<f64>() / loss.len() as f64
                );
            }
        }

        if self.config.log_iterations > 0 {
            info!("Finished training a booster with {} trees.", self.trees.len());
        }
        self.n_features = Some(x.cols);
        Ok(())
    }

    /// Raw additive scores, before the objective's link.
    pub fn predict_raw(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let n_features = self
            .n_features
            .ok_or_else(|| CausalError::NotFitted("GradientBooster".to_string()))?;
        validate_predict_input(n_features, x)?;
        let mut out = vec![self.base_score; x.rows];
        for tree in &self.trees {
            for (row, o) in out.iter_mut().enumerate() {
                *o += tree.predict_row(x, row);
            }
        }
        Ok(out)
    }
}

/// Boosted trees on squared loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedRegressor {
    pub booster: GradientBooster,
}

impl Default for BoostedRegressor {
    fn default() -> Self {
        Self::new(BoosterConfig::default())
    }
}

impl BoostedRegressor {
    pub fn new(config: BoosterConfig) -> Self {
        BoostedRegressor {
            booster: GradientBooster::new(Objective::SquaredLoss, config),
        }
    }
}

impl Regressor for BoostedRegressor {
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
        self.booster.fit(x, y)
    }

    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        self.booster.predict_raw(x)
    }
}

/// Boosted trees on log loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedClassifier {
    pub booster: GradientBooster,
}

impl Default for BoostedClassifier {
    fn default() -> Self {
        Self::new(BoosterConfig::default())
    }
}

impl BoostedClassifier {
    pub fn new(config: BoosterConfig) -> Self {
        BoostedClassifier {
            booster: GradientBooster::new(Objective::LogLoss, config),
        }
    }
}

impl Classifier for BoostedClassifier {
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), CausalError> {
        validate_binary_target(y)?;
        self.booster.fit(x, y)
    }

    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, CausalError> {
        let objective = self.booster.objective;
        Ok(self
            .booster
            .predict_raw(x)?
            .into_iter()
            .map(|r| objective.transform(r))
            .collect())
    }
}
