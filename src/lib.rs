//! Track matching and deduplication engine.
//!
//! Normalizes track titles and artists, matches tracks across collections
//! with a cascade of identifier, exact, base-title and fuzzy stages, and
//! finds duplicate groups within a collection.

pub mod compare;
pub mod config;
pub mod dedup;
pub mod error;
pub mod index;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod report;
pub mod safety;
pub mod scoring;

pub use compare::Comparator;
pub use config::{MatchOptions, Thresholds};
pub use dedup::{find_internal_duplicates, DuplicateReport};
pub use error::OptionsError;
pub use index::TrackIndex;
pub use matcher::{Candidate, MatchOutcome, Matcher};
pub use models::{
    Collection, ComparisonResult, DuplicateGroup, MatchResult, MatchType, MultiAnalysis, Track,
};
pub use normalize::{NormalizationCache, Normalizer};
