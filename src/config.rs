//! Config
//!
//! Settings for the observational estimators, grouped per component and
//! serializable to JSON.
use crate::constants::{DEFAULT_ALPHA, DEFAULT_BOOTSTRAP_ROUNDS, DEFAULT_N_FOLDS, DEFAULT_SEED, PROPENSITY_CLIP};
use crate::errors::CausalError;
use crate::models::logistic::LogisticConfig;
use crate::utils::{validate_alpha, validate_float_parameter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How estimated propensities near 0 or 1 are handled before weighting.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum PropensityPolicy {
    /// Clamp every score into `[epsilon, 1 - epsilon]`.
    Clip { epsilon: f64 },
    /// Drop units whose score falls outside `[lower, upper]`.
    Trim { lower: f64, upper: f64 },
}

impl Default for PropensityPolicy {
    fn default() -> Self {
        PropensityPolicy::Clip {
            epsilon: PROPENSITY_CLIP,
        }
    }
}

impl PropensityPolicy {
    pub fn validate(&self) -> Result<(), CausalError> {
        match *self {
            PropensityPolicy::Clip { epsilon } => validate_float_parameter(epsilon, 0.0, 0.5, "epsilon"),
            PropensityPolicy::Trim { lower, upper } => {
                validate_float_parameter(lower, 0.0, 1.0, "lower")?;
                validate_float_parameter(upper, 0.0, 1.0, "upper")?;
                if lower >= upper {
                    return Err(CausalError::InvalidParameter(
                        "lower".to_string(),
                        format!("value below upper bound {}", upper),
                        lower.to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Normalization of the inverse propensity weights.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpwNormalization {
    /// Weighted sums divided by `n`.
    #[default]
    HorvitzThompson,
    /// Weighted sums divided by the sum of the weights within each arm.
    Hajek,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}
fn default_n_folds() -> usize {
    DEFAULT_N_FOLDS
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_heterogeneous() -> bool {
    true
}
fn default_n_rounds() -> usize {
    DEFAULT_BOOTSTRAP_ROUNDS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PropensityConfig {
    #[serde(default)]
    pub policy: PropensityPolicy,
    #[serde(default)]
    pub normalization: IpwNormalization,
    /// Settings of the logistic propensity model.
    #[serde(default)]
    pub logistic: LogisticConfig,
}

/// Cross-fitting and final-stage settings for Double ML.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DmlConfig {
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Seed of the fold shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Interact the treatment residual with the covariates in the final stage.
    #[serde(default = "default_heterogeneous")]
    pub heterogeneous: bool,
}

impl Default for DmlConfig {
    fn default() -> Self {
        DmlConfig {
            n_folds: default_n_folds(),
            seed: default_seed(),
            heterogeneous: default_heterogeneous(),
        }
    }
}

impl DmlConfig {
    pub fn validate(&self, n_rows: usize) -> Result<(), CausalError> {
        validate_n_folds(self.n_folds, n_rows)
    }
}

/// Cross-fitting needs at least two folds and no empty fold.
pub(crate) fn validate_n_folds(n_folds: usize, n_rows: usize) -> Result<(), CausalError> {
    if n_folds < 2 || n_folds > n_rows {
        return Err(CausalError::InvalidParameter(
            "n_folds".to_string(),
            format!("integer between 2 and the number of rows ({})", n_rows),
            n_folds.to_string(),
        ));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// Number of resampled replicates.
    #[serde(default = "default_n_rounds")]
    pub n_rounds: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Replicate `i` draws its rows from `seed + i`.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Size of the thread pool, `None` uses every available core.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            n_rounds: default_n_rounds(),
            alpha: default_alpha(),
            seed: default_seed(),
            num_threads: None,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), CausalError> {
        validate_alpha(self.alpha)?;
        if self.n_rounds < 2 {
            return Err(CausalError::InvalidParameter(
                "n_rounds".to_string(),
                "integer of at least 2".to_string(),
                self.n_rounds.to_string(),
            ));
        }
        if self.num_threads == Some(0) {
            return Err(CausalError::InvalidParameter(
                "num_threads".to_string(),
                "positive integer".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Every estimator setting in one place.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub propensity: PropensityConfig,
    #[serde(default)]
    pub dml: DmlConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            alpha: default_alpha(),
            propensity: PropensityConfig::default(),
            dml: DmlConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), CausalError> {
        validate_alpha(self.alpha)?;
        self.propensity.policy.validate()?;
        self.bootstrap.validate()
    }
}

pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save a config as a json object to a file.
    ///
    /// * `path` - Path to save the config.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), CausalError> {
        fs::write(path, self.json_dump()?).map_err(|e| CausalError::UnableToWrite(e.to_string()))
    }

    /// Dump a config as a json object
    fn json_dump(&self) -> Result<String, CausalError> {
        serde_json::to_string(self).map_err(|e| CausalError::UnableToWrite(e.to_string()))
    }

    /// Load a config from Json string
    fn from_json(json_str: &str) -> Result<Self, CausalError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| CausalError::UnableToRead(e.to_string()))
    }

    /// Load a config from a path to a json object.
    ///
    /// * `path` - Path to load the config from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, CausalError> {
        let json_str = fs::read_to_string(path).map_err(|e| CausalError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for EstimatorConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_estimator_config_default() {
        let config = EstimatorConfig::default();
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.dml.n_folds, 5);
        assert!(config.dml.heterogeneous);
        assert_eq!(config.propensity.policy, PropensityPolicy::Clip { epsilon: 1e-3 });
        assert_eq!(config.propensity.normalization, IpwNormalization::HorvitzThompson);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_estimator_config_partial_json() {
        let config = EstimatorConfig::from_json(r#"{"alpha": 0.1, "dml": {"n_folds": 3}}"#).unwrap();
        assert_eq!(config.alpha, 0.1);
        assert_eq!(config.dml.n_folds, 3);
        assert_eq!(config.dml.seed, 0);
        assert_eq!(config.bootstrap, BootstrapConfig::default());

        let trimmed = EstimatorConfig::from_json(
            r#"{"propensity": {"policy": {"Trim": {"lower": 0.05, "upper": 0.95}}, "normalization": "Hajek"}}"#,
        )
        .unwrap();
        assert_eq!(
            trimmed.propensity.policy,
            PropensityPolicy::Trim {
                lower: 0.05,
                upper: 0.95
            }
        );
        assert_eq!(trimmed.propensity.normalization, IpwNormalization::Hajek);
    }

    #[test]
    fn test_estimator_config_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = EstimatorConfig::default();
        config.bootstrap.num_threads = Some(2);
        config.propensity.policy = PropensityPolicy::Clip { epsilon: 0.01 };
        config.save_config(&path).unwrap();

        let loaded = EstimatorConfig::load_config(&path).unwrap();
        assert_eq!(config, loaded);

        assert!(matches!(
            EstimatorConfig::load_config(dir.path().join("missing.json")),
            Err(CausalError::UnableToRead(_))
        ));
        assert!(matches!(
            EstimatorConfig::from_json("{\"alpha\": }"),
            Err(CausalError::UnableToRead(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let bad = PropensityPolicy::Trim { lower: 0.9, upper: 0.1 };
        assert!(matches!(bad.validate(), Err(CausalError::InvalidParameter(..))));
        assert!(PropensityPolicy::Clip { epsilon: 0.6 }.validate().is_err());
        assert!(DmlConfig::default().validate(4).is_err());
        assert!(DmlConfig::default().validate(10).is_ok());
        let boot = BootstrapConfig {
            num_threads: Some(0),
            ..Default::default()
        };
        assert!(boot.validate().is_err());
    }
}
