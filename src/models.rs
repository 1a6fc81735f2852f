//! Core data models for track matching and deduplication.
//!
//! This module contains the track and collection types handed to the engine
//! by callers, plus every result type the engine produces. Result types
//! borrow tracks from the collections they were computed over; nothing here
//! is copied or mutated by the engine.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::normalize::Normalizer;
use crate::scoring::parse_duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// Index mapping (title_norm, artist_norm) to slots in a `TrackIndex`
pub type KeyIndex = FxHashMap<(String, String), Vec<usize>>;

/// Artist token to slots in a `TrackIndex`, used to bound the fuzzy pool
pub type TokenIndex = FxHashMap<String, Vec<usize>>;

// ============================================================================
// Track
// ============================================================================

/// Normalized forms of a track, computed once and cached on the track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedTrack {
    pub title: String,
    pub artist: String,
    /// Title with bare version words and `feat` tails removed
    pub base_title: String,
    /// Album normalized like a title (empty when absent)
    pub album: String,
    pub artist_tokens: BTreeSet<String>,
}

impl NormalizedTrack {
    /// A track with an empty normalized title or artist cannot be matched.
    pub fn is_matchable(&self) -> bool {
        !self.title.is_empty() && !self.artist.is_empty()
    }

    pub fn key(&self) -> (String, String) {
        (self.title.clone(), self.artist.clone())
    }

    pub fn base_key(&self) -> (String, String) {
        (self.base_title.clone(), self.artist.clone())
    }
}

/// A single track record as produced by an external parser or catalog client.
///
/// Normalization is computed lazily on first use and cached for the lifetime
/// of the value. A track is frozen once normalized: writing to `title`,
/// `artist` or `album` afterwards leaves the cached forms stale. Change those
/// through `with_title`, `with_artist` or `with_album`, which reset the cache.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Duration in seconds. JSON input may also use "M:SS" or "H:MM:SS".
    #[serde(
        default,
        deserialize_with = "deserialize_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip)]
    normalized: OnceCell<NormalizedTrack>,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self.normalized = OnceCell::new();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self.normalized = OnceCell::new();
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self.normalized = OnceCell::new();
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Set the duration from "M:SS" / "H:MM:SS" text. Unparsable text clears it.
    pub fn with_duration_text(mut self, text: &str) -> Self {
        self.duration = parse_duration(text);
        self
    }

    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        self.isrc = Some(isrc.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Normalized forms, computed with the default (uncached) normalizer.
    pub fn normalized(&self) -> &NormalizedTrack {
        self.normalized
            .get_or_init(|| Normalizer::default().normalize_track(self))
    }

    /// Normalized forms, computed with `normalizer` if not cached yet.
    pub fn normalized_with(&self, normalizer: &Normalizer) -> &NormalizedTrack {
        self.normalized
            .get_or_init(|| normalizer.normalize_track(self))
    }

    pub fn normalized_title(&self) -> &str {
        &self.normalized().title
    }

    pub fn normalized_artist(&self) -> &str {
        &self.normalized().artist
    }

    pub fn artist_tokens(&self) -> &BTreeSet<String> {
        &self.normalized().artist_tokens
    }

    pub fn is_matchable(&self) -> bool {
        self.normalized().is_matchable()
    }

    /// Lowercased, trimmed ISRC, or None when absent or blank.
    pub fn isrc_key(&self) -> Option<String> {
        self.isrc
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.duration == other.duration
            && self.isrc == other.isrc
            && self.platform == other.platform
            && self.id == other.id
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Accepts seconds as a number, or "M:SS" / "H:MM:SS" text.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(f64),
        Text(String),
    }

    Ok(match Option::<RawDuration>::deserialize(deserializer)? {
        Some(RawDuration::Seconds(secs)) if (0.0..=u32::MAX as f64).contains(&secs) => {
            Some(secs.round() as u32)
        }
        Some(RawDuration::Text(text)) => parse_duration(&text),
        _ => None,
    })
}

// ============================================================================
// Collection
// ============================================================================

fn default_is_music() -> bool {
    true
}

/// A track plus the caller's music/non-music classification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(flatten)]
    pub track: Track,
    #[serde(default = "default_is_music")]
    pub is_music: bool,
}

/// An ordered library or playlist. Read-only to the engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default, rename = "tracks")]
    pub entries: Vec<CollectionEntry>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Build a collection where every track is music.
    pub fn from_tracks(name: impl Into<String>, tracks: impl IntoIterator<Item = Track>) -> Self {
        let mut collection = Self::new(name);
        for track in tracks {
            collection.push(track);
        }
        collection
    }

    pub fn push(&mut self, track: Track) {
        self.entries.push(CollectionEntry {
            track,
            is_music: true,
        });
    }

    /// Add a non-music entry (podcast episode, audiobook chapter, ...).
    pub fn push_non_music(&mut self, track: Track) {
        self.entries.push(CollectionEntry {
            track,
            is_music: false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn music_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_music).count()
    }

    pub fn get(&self, position: usize) -> Option<&Track> {
        self.entries.get(position).map(|e| &e.track)
    }

    /// All tracks with their positions, music or not.
    pub fn tracks(&self) -> impl Iterator<Item = (usize, &Track)> + '_ {
        self.entries.iter().enumerate().map(|(i, e)| (i, &e.track))
    }

    /// Music tracks with their positions, in collection order.
    pub fn music_tracks(&self) -> impl Iterator<Item = (usize, &Track)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_music)
            .map(|(i, e)| (i, &e.track))
    }

    /// Load a collection from a JSON file. An empty name falls back to the file stem.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open collection {}", path.display()))?;
        let mut collection: Collection = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse collection {}", path.display()))?;
        if collection.name.is_empty() {
            collection.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("collection")
                .to_string();
        }
        Ok(collection)
    }
}

// ============================================================================
// Match Results
// ============================================================================

/// Which cascade stage produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Isrc,
    Exact,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Isrc => "isrc",
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted match between a source track and a target track.
#[derive(Clone, Debug, Serialize)]
pub struct MatchResult<'a> {
    pub source_track: &'a Track,
    pub target_track: &'a Track,
    /// Position of the source track in its collection
    pub source_index: usize,
    /// Position of the target track in its collection
    pub target_index: usize,
    pub confidence: f64,
    pub match_type: MatchType,
}

/// A source track with no acceptable candidate whose best candidate still
/// scored high enough to deserve manual review.
#[derive(Clone, Debug, Serialize)]
pub struct NearMiss<'a> {
    pub source_track: &'a Track,
    pub candidate: &'a Track,
    pub source_index: usize,
    pub target_index: usize,
    pub confidence: f64,
}

/// Derived statistics for a two-collection comparison.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonStats {
    pub total_matches: usize,
    pub isrc_matches: usize,
    pub exact_matches: usize,
    pub fuzzy_matches: usize,
    pub missing_tracks: usize,
    pub near_misses: usize,
    pub skipped_tracks: usize,
    /// Percentage of eligible source tracks that matched
    pub match_rate: f64,
    /// Mean confidence of accepted matches (0.0 to 1.0)
    pub average_confidence: f64,
}

impl ComparisonStats {
    pub fn from_results(
        matches: &[MatchResult<'_>],
        missing: usize,
        near_misses: usize,
        skipped: usize,
    ) -> Self {
        let count = |ty: MatchType| matches.iter().filter(|m| m.match_type == ty).count();
        let total_matches = matches.len();
        let eligible = total_matches + missing;
        let match_rate = if eligible == 0 {
            0.0
        } else {
            100.0 * total_matches as f64 / eligible as f64
        };
        let average_confidence = if total_matches == 0 {
            0.0
        } else {
            matches.iter().map(|m| m.confidence).sum::<f64>() / total_matches as f64
        };

        Self {
            total_matches,
            isrc_matches: count(MatchType::Isrc),
            exact_matches: count(MatchType::Exact),
            fuzzy_matches: count(MatchType::Fuzzy),
            missing_tracks: missing,
            near_misses,
            skipped_tracks: skipped,
            match_rate,
            average_confidence,
        }
    }

    /// Log stats in JSON format
    pub fn log_summary(&self, label: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", label, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Full result of comparing a source collection against a target.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonResult<'a> {
    pub source_name: String,
    pub target_name: String,
    pub matches: Vec<MatchResult<'a>>,
    /// Source music tracks with no acceptable candidate, in source order
    pub missing_tracks: Vec<&'a Track>,
    /// Subset of the missing tracks with a reviewable candidate
    pub near_misses: Vec<NearMiss<'a>>,
    /// Source music tracks excluded because they normalize to nothing
    pub skipped: Vec<&'a Track>,
    pub source_total: usize,
    pub source_music: usize,
    pub target_total: usize,
    pub target_music: usize,
    pub stats: ComparisonStats,
}

impl<'a> ComparisonResult<'a> {
    /// Matches at or above `min_confidence`.
    pub fn high_confidence(&self, min_confidence: f64) -> Vec<&MatchResult<'a>> {
        self.matches
            .iter()
            .filter(|m| m.confidence >= min_confidence)
            .collect()
    }

    /// Matches below `min_confidence`.
    pub fn needs_review(&self, min_confidence: f64) -> Vec<&MatchResult<'a>> {
        self.matches
            .iter()
            .filter(|m| m.confidence < min_confidence)
            .collect()
    }

    /// Target positions claimed by more than one source track, with the
    /// positions of the claiming source tracks, in target order.
    pub fn shared_targets(&self) -> Vec<(usize, Vec<usize>)> {
        let mut claims: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for m in &self.matches {
            claims.entry(m.target_index).or_default().push(m.source_index);
        }
        let mut shared: Vec<(usize, Vec<usize>)> = claims
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .collect();
        shared.sort_by_key(|(target, _)| *target);
        shared
    }
}

// ============================================================================
// Duplicate Groups
// ============================================================================

/// Keeper preference for a duplicate group member. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Preference {
    pub live: bool,
    pub remix: bool,
    pub explicit: bool,
    /// Title length in characters divided by 100
    pub title_length: f64,
}

impl Preference {
    pub fn compare(&self, other: &Self) -> std::cmp::Ordering {
        (self.live, self.remix, self.explicit)
            .cmp(&(other.live, other.remix, other.explicit))
            .then_with(|| self.title_length.total_cmp(&other.title_length))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Keep,
    Remove,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Keep => "keep",
            Disposition::Remove => "remove",
        }
    }
}

/// A ranked member of a duplicate group.
#[derive(Clone, Debug, Serialize)]
pub struct RankedTrack<'a> {
    pub track: &'a Track,
    /// Position in the collection
    pub position: usize,
    pub preference: Preference,
    pub disposition: Disposition,
}

/// Tracks within one collection sharing a signature.
///
/// `tracks_to_keep` holds exactly one track; together with
/// `tracks_to_remove` it covers `tracks` exactly once.
#[derive(Clone, Debug, Serialize)]
pub struct DuplicateGroup<'a> {
    pub signature: String,
    /// Members in collection order
    pub tracks: Vec<&'a Track>,
    pub tracks_to_keep: Vec<&'a Track>,
    pub tracks_to_remove: Vec<&'a Track>,
    /// Members in preference order, keeper first
    pub ranked: Vec<RankedTrack<'a>>,
    pub confidence: f64,
    pub review_needed: bool,
}

impl<'a> DuplicateGroup<'a> {
    pub fn duplicate_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn keeper(&self) -> &'a Track {
        self.tracks_to_keep[0]
    }
}

// ============================================================================
// Multi-Collection Analysis
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub total: usize,
    pub music: usize,
}

/// One directed comparison inside a multi-collection analysis.
#[derive(Clone, Debug, Serialize)]
pub struct PairwiseComparison<'a> {
    /// Index of the source collection
    pub source: usize,
    /// Index of the target collection
    pub target: usize,
    pub result: ComparisonResult<'a>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ArtistAnalysis {
    /// Artist tokens present in every collection, sorted
    pub universal_artists: Vec<String>,
    /// Distinct artist tokens across all collections
    pub total_unique_artists: usize,
    /// Distinct artist tokens per collection
    pub per_collection: Vec<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UniqueTracks<'a> {
    pub collection: String,
    pub tracks: Vec<&'a Track>,
}

/// Overlap analysis across N collections.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MultiAnalysis<'a> {
    pub collections: Vec<CollectionSummary>,
    pub pairwise: Vec<PairwiseComparison<'a>>,
    /// Representative tracks (from the first collection) present in all collections
    pub universal_tracks: Vec<&'a Track>,
    pub artists: ArtistAnalysis,
    /// Per collection, tracks matched against no other collection
    pub unique_tracks: Vec<UniqueTracks<'a>>,
}

impl<'a> MultiAnalysis<'a> {
    pub fn comparison(&self, source: usize, target: usize) -> Option<&ComparisonResult<'a>> {
        self.pairwise
            .iter()
            .find(|p| p.source == source && p.target == target)
            .map(|p| &p.result)
    }
}
