//! Matching options and the acceptance thresholds derived from them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::OptionsError;

// ============================================================================
// Thresholds
// ============================================================================

/// Acceptance thresholds for the scored stages of the cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum composite score to accept a base-title candidate
    pub exact_accept: f64,
    /// Minimum composite score to accept a fuzzy candidate
    pub fuzzy_accept: f64,
    /// Minimum score for an unaccepted candidate to be listed for review
    pub review: f64,
}

impl Thresholds {
    pub const LENIENT: Thresholds = Thresholds {
        exact_accept: 0.80,
        fuzzy_accept: 0.82,
        review: 0.70,
    };

    pub const STRICT: Thresholds = Thresholds {
        exact_accept: 0.85,
        fuzzy_accept: 0.88,
        review: 0.75,
    };
}

/// Default confidence split between auto-accepted and review matches
pub const HIGH_CONFIDENCE: f64 = 0.95;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Raise all thresholds and never search outside shared artist tokens
    pub strict_mode: bool,
    /// Award the duration bonus when both durations are known
    pub enable_duration: bool,
    /// Award the album bonus when normalized albums agree
    pub enable_album: bool,
    /// Overrides the fuzzy-accept threshold of the selected mode
    pub similarity_threshold: Option<f64>,
    /// Match source tracks on the rayon pool
    pub parallel: bool,
    /// Fallback pool size for sources without artist tokens (lenient only)
    pub max_fuzzy_pool: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            enable_duration: true,
            enable_album: false,
            similarity_threshold: None,
            parallel: true,
            max_fuzzy_pool: 5000,
        }
    }
}

impl MatchOptions {
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Self::default()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        let base = if self.strict_mode {
            Thresholds::STRICT
        } else {
            Thresholds::LENIENT
        };
        match self.similarity_threshold {
            Some(fuzzy_accept) => Thresholds {
                fuzzy_accept,
                ..base
            },
            None => base,
        }
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if let Some(value) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&value) {
                return Err(OptionsError::OutOfRange {
                    name: "similarity_threshold",
                    value,
                });
            }
        }
        let t = self.thresholds();
        if t.fuzzy_accept < t.review {
            return Err(OptionsError::BelowReview {
                fuzzy: t.fuzzy_accept,
                review: t.review,
            });
        }
        if self.max_fuzzy_pool == 0 {
            return Err(OptionsError::EmptyFuzzyPool);
        }
        Ok(())
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {}", path.display()))?;
        let options: MatchOptions = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse options file {}", path.display()))?;
        options.validate()?;
        Ok(options)
    }
}
