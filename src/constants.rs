pub const PROPENSITY_CLIP: f64 = 1e-3;
pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_N_FOLDS: usize = 5;
pub const DEFAULT_SEED: u64 = 0;
pub const DEFAULT_BOOTSTRAP_ROUNDS: usize = 200;
pub const CATE_COLUMN: &str = "cate";
