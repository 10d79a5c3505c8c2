//! Errors
//!
//! Custom error types used throughout the `causalkit` crate.
use thiserror::Error;

/// Errors raised while parsing a model formula.
///
/// Offsets are byte positions into the formula string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// Nothing to the right of `~` (or an empty string).
    #[error("Formula `{0}` has no terms.")]
    Empty(String),
    /// A token that does not fit the grammar at this position.
    #[error("Unexpected `{token}` at offset {offset} in formula `{formula}`.")]
    UnexpectedToken {
        formula: String,
        token: String,
        offset: usize,
    },
    /// The formula ended where a term was expected.
    #[error("Formula `{0}` ends with a dangling operator.")]
    UnexpectedEnd(String),
    /// A function other than `I(...)` was used.
    #[error("Unknown function `{name}` at offset {offset}; only I(name ^ k) is supported.")]
    UnknownFunction { name: String, offset: usize },
    /// A power that is not a positive integer.
    #[error("Invalid power `{power}` at offset {offset}; expected a positive integer.")]
    InvalidPower { power: String, offset: usize },
    /// More than one `~` in the formula.
    #[error("Formula `{0}` contains more than one `~`.")]
    MultipleResponses(String),
}

/// Errors that can occur while estimating treatment effects.
#[derive(Debug, Error)]
pub enum CausalError {
    /// A referenced column does not exist in the table.
    #[error("Column `{0}` not found in table.")]
    MissingColumn(String),
    /// Two columns share the same name.
    #[error("Column `{0}` is defined more than once.")]
    DuplicateColumn(String),
    /// A column length disagrees with the table row count.
    #[error("Column `{column}` has {found} rows, expected {expected}.")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    /// Treatment column holds a value other than 0 or 1.
    #[error("Treatment column `{column}` must be binary (0/1), found {value}.")]
    NonBinaryTreatment { column: String, value: f64 },
    /// Classification target holds a value other than 0 or 1.
    #[error("Classification target must be binary (0/1), found {0}.")]
    NonBinaryTarget(f64),
    /// One treatment arm has no observations.
    #[error("Treatment arm {0} has no observations.")]
    EmptyTreatmentArm(u8),
    /// Not enough observations in an arm to compute a statistic.
    #[error("Treatment arm {arm} has {found} observations, at least {required} are required.")]
    InsufficientObservations { arm: u8, found: usize, required: usize },
    /// Table or matrix without rows.
    #[error("Input has no rows.")]
    EmptyTable,
    /// Prediction input with a different number of features than the fitted model.
    #[error("Expected {expected} feature columns, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },
    /// Zero standard error, so the test statistic is undefined.
    #[error("Standard error is zero ({0}); the test statistic is undefined.")]
    DegenerateVariance(String),
    /// A linear system could not be solved.
    #[error("Singular system in {0}.")]
    SingularMatrix(String),
    /// `predict` called before `fit`.
    #[error("Model `{0}` must be fitted before predicting.")]
    NotFitted(String),
    /// Malformed model formula.
    #[error(transparent)]
    Formula(#[from] FormulaError),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Unable to write configuration to file.
    #[error("Unable to write configuration: {0}")]
    UnableToWrite(String),
    /// Unable to read configuration from file.
    #[error("Unable to read configuration: {0}")]
    UnableToRead(String),
}
