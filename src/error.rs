//! Error types for option validation.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptionsError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("fuzzy-accept threshold {fuzzy} is below the review threshold {review}")]
    BelowReview { fuzzy: f64, review: f64 },

    #[error("max_fuzzy_pool must be greater than zero")]
    EmptyFuzzyPool,
}
