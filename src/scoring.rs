//! Scoring functions for track matching and duplicate ranking.
//!
//! This module contains all scoring-related functions including:
//! - String similarity (sequence ratio, title/artist similarity)
//! - Duration tolerance and the composite match confidence
//! - Keeper preference and review rules for duplicate groups

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::config::MatchOptions;
use crate::models::{NormalizedTrack, Preference, Track};

// ============================================================================
// Score Weights
// ============================================================================

pub const TITLE_WEIGHT: f64 = 0.55;
pub const ARTIST_WEIGHT: f64 = 0.35;
pub const DURATION_BONUS: f64 = 0.07;
pub const ALBUM_BONUS: f64 = 0.03;

/// Base-title similarity counts slightly less than full-title similarity
pub const BASE_TITLE_DISCOUNT: f64 = 0.95;

/// Scale applied to Jaro-Winkler artist similarity
pub const JARO_WINKLER_DISCOUNT: f64 = 0.9;

/// Confidence floor of an exact normalized match
pub const EXACT_BASE_CONFIDENCE: f64 = 0.95;
pub const EXACT_CONDITION_BONUS: f64 = 0.025;

/// Minimum duration tolerance in seconds
pub const MIN_DURATION_TOLERANCE_SEC: f64 = 10.0;
/// Duration tolerance as a fraction of the longer duration
pub const DURATION_TOLERANCE_RATIO: f64 = 0.10;

/// Spread across a duplicate group above which it needs review
pub const MAX_DURATION_VARIANCE: f64 = 0.20;

/// Duplicate groups below this confidence need review
pub const REVIEW_CONFIDENCE: f64 = 0.8;

// ============================================================================
// Regex Patterns
// ============================================================================

pub static LIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\blive\b").unwrap(),
        Regex::new(r"(?i)\bconcert\b").unwrap(),
        Regex::new(r"(?i)\btour\b").unwrap(),
    ]
});

pub static REMIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\bremix\b").unwrap(),
        Regex::new(r"(?i)\balternate\b").unwrap(),
        Regex::new(r"(?i)\bdemo\b").unwrap(),
        Regex::new(r"(?i)\bacoustic\b").unwrap(),
    ]
});

pub static EXPLICIT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bexplicit\b").unwrap());

pub fn has_live_pattern(title: &str) -> bool {
    LIVE_PATTERNS.iter().any(|p| p.is_match(title))
}

pub fn has_remix_pattern(title: &str) -> bool {
    REMIX_PATTERNS.iter().any(|p| p.is_match(title))
}

pub fn has_explicit_pattern(title: &str) -> bool {
    EXPLICIT_PATTERN.is_match(title)
}

// ============================================================================
// String Similarity
// ============================================================================

/// Longest common block of `a` and `b` as `(start_a, start_b, len)`.
/// Ties resolve to the earliest block in `a`, then in `b`.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            curr[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let len = curr[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

/// Total size of matching blocks found around successive longest blocks.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, len) = longest_common_block(&a[a_lo..a_hi], &b[b_lo..b_hi]);
        if len == 0 {
            continue;
        }
        total += len;
        let (i, j) = (a_lo + i, b_lo + j);
        if a_lo < i && b_lo < j {
            pending.push((a_lo, i, b_lo, j));
        }
        if i + len < a_hi && j + len < b_hi {
            pending.push((i + len, a_hi, j + len, b_hi));
        }
    }
    total
}

/// Ratcliff/Obershelp similarity: `2 * M / (|a| + |b|)`.
/// Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

pub fn title_similarity(a: &NormalizedTrack, b: &NormalizedTrack) -> f64 {
    let full = sequence_ratio(&a.title, &b.title);
    let base = BASE_TITLE_DISCOUNT * sequence_ratio(&a.base_title, &b.base_title);
    full.max(base)
}

/// Jaccard similarity of two token sets. Empty sets share nothing.
pub fn token_jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Compute artist similarity (token Jaccard, or scaled Jaro-Winkler for
/// spelling variants, whichever is higher).
pub fn artist_similarity(a: &NormalizedTrack, b: &NormalizedTrack) -> f64 {
    if a.artist == b.artist {
        return 1.0;
    }
    let jaccard = token_jaccard(&a.artist_tokens, &b.artist_tokens);
    let jaro = JARO_WINKLER_DISCOUNT * strsim::jaro_winkler(&a.artist, &b.artist);
    jaccard.max(jaro)
}

// ============================================================================
// Duration / Album
// ============================================================================

/// Tolerance for two durations: 10% of the longer one, at least 10 seconds.
pub fn duration_tolerance(a: u32, b: u32) -> f64 {
    (DURATION_TOLERANCE_RATIO * a.max(b) as f64).max(MIN_DURATION_TOLERANCE_SEC)
}

pub fn duration_within_tolerance(a: u32, b: u32) -> bool {
    a.abs_diff(b) as f64 <= duration_tolerance(a, b)
}

/// Absolute duration difference, `None` when either side is unknown.
pub fn duration_gap(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    Some(a?.abs_diff(b?))
}

pub fn albums_match(a: &NormalizedTrack, b: &NormalizedTrack) -> bool {
    !a.album.is_empty() && a.album == b.album
}

fn duration_condition(source: &Track, candidate: &Track, options: &MatchOptions) -> bool {
    options.enable_duration
        && matches!(
            (source.duration, candidate.duration),
            (Some(a), Some(b)) if duration_within_tolerance(a, b)
        )
}

fn album_condition(source: &Track, candidate: &Track, options: &MatchOptions) -> bool {
    options.enable_album && albums_match(source.normalized(), candidate.normalized())
}

// ============================================================================
// Match Confidence
// ============================================================================

/// Confidence for an exact normalized key match, in [0.95, 1.0].
pub fn exact_confidence(source: &Track, candidate: &Track, options: &MatchOptions) -> f64 {
    let mut confidence = EXACT_BASE_CONFIDENCE;
    if album_condition(source, candidate, options) {
        confidence += EXACT_CONDITION_BONUS;
    }
    if duration_condition(source, candidate, options) {
        confidence += EXACT_CONDITION_BONUS;
    }
    confidence.min(1.0)
}

/// Components of a composite match score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub artist: f64,
    pub duration_bonus: f64,
    pub album_bonus: f64,
    pub total: f64,
}

/// Composite score of a candidate for the base-title and fuzzy stages.
///
/// Weighted title and artist similarity plus optional duration and album
/// bonuses, clamped to [0, 1].
pub fn score_candidate(source: &Track, candidate: &Track, options: &MatchOptions) -> ScoreBreakdown {
    let (s, c) = (source.normalized(), candidate.normalized());
    let title = title_similarity(s, c);
    let artist = artist_similarity(s, c);
    let duration_bonus = if duration_condition(source, candidate, options) {
        DURATION_BONUS
    } else {
        0.0
    };
    let album_bonus = if album_condition(source, candidate, options) {
        ALBUM_BONUS
    } else {
        0.0
    };
    let total = (TITLE_WEIGHT * title + ARTIST_WEIGHT * artist + duration_bonus + album_bonus)
        .clamp(0.0, 1.0);

    ScoreBreakdown {
        title,
        artist,
        duration_bonus,
        album_bonus,
        total,
    }
}

// ============================================================================
// Duplicate Ranking
// ============================================================================

/// Keeper preference of a track: studio, original, clean, shorter titles first.
pub fn preference(track: &Track) -> Preference {
    Preference {
        live: has_live_pattern(&track.title),
        remix: has_remix_pattern(&track.title),
        explicit: has_explicit_pattern(&track.title),
        title_length: track.title.to_lowercase().chars().count() as f64 / 100.0,
    }
}

/// Confidence of a duplicate group by size.
pub fn duplicate_confidence(size: usize) -> f64 {
    match size {
        0..=2 => 0.9,
        3..=5 => 0.7,
        _ => 0.5,
    }
}

/// Spread of known durations as a fraction of the longest one.
/// `None` when fewer than two durations are known.
pub fn duration_variance(durations: &[u32]) -> Option<f64> {
    let known: Vec<u32> = durations.iter().copied().filter(|d| *d > 0).collect();
    if known.len() < 2 {
        return None;
    }
    let max = *known.iter().max()?;
    let min = *known.iter().min()?;
    Some((max - min) as f64 / max as f64)
}

/// Whether a duplicate group should be reviewed before removal.
pub fn needs_review(tracks: &[&Track]) -> bool {
    if duplicate_confidence(tracks.len()) < REVIEW_CONFIDENCE || tracks.len() > 3 {
        return true;
    }
    let durations: Vec<u32> = tracks.iter().filter_map(|t| t.duration).collect();
    duration_variance(&durations).is_some_and(|v| v > MAX_DURATION_VARIANCE)
}

/// Parse "M:SS" or "H:MM:SS" (or plain seconds) into seconds.
pub fn parse_duration(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let nums: Vec<u32> = parts
        .iter()
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match nums.as_slice() {
        [secs] => Some(*secs),
        [m, s] if *s < 60 => m.checked_mul(60)?.checked_add(*s),
        [h, m, s] if *m < 60 && *s < 60 => h.checked_mul(3600)?.checked_add(m * 60 + s),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(title: &str, artist: &str) -> NormalizedTrack {
        Track::new(title, artist).normalized().clone()
    }

    #[test]
    fn test_sequence_ratio() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
        assert_eq!(sequence_ratio("abc", "abc"), 1.0);
        // 2 * 9 / 19
        assert!((sequence_ratio("wonderwall", "wonderwal") - 18.0 / 19.0).abs() < 1e-9);
        // "abcd" vs "bcde": block "bcd"
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        // blocks on both sides of the longest one
        assert!((sequence_ratio("xaby", "xcby") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_title_similarity_uses_base_title() {
        let a = norm("Song Title Remastered", "A");
        let b = norm("Song Title", "A");
        assert!(title_similarity(&a, &b) >= BASE_TITLE_DISCOUNT - 1e-9);
    }

    #[test]
    fn test_artist_similarity() {
        let a = norm("x", "The Beatles");
        assert_eq!(artist_similarity(&a, &a), 1.0);

        let duo = norm("x", "Drake & Rihanna");
        let solo = norm("x", "Drake");
        let score = artist_similarity(&duo, &solo);
        assert!(score >= 0.5 && score < 1.0);

        let typo = norm("x", "The Beatels");
        assert!(artist_similarity(&a, &typo) > 0.8);
    }

    #[test]
    fn test_duration_tolerance() {
        assert!(duration_within_tolerance(180, 190));
        assert!(!duration_within_tolerance(180, 191));
        // 10% of 400 is 40
        assert!(duration_within_tolerance(400, 360));
        assert!(!duration_within_tolerance(400, 359));
        assert_eq!(duration_gap(Some(180), Some(170)), Some(10));
        assert_eq!(duration_gap(None, Some(170)), None);
    }

    #[test]
    fn test_exact_confidence_bonuses() {
        let options = MatchOptions {
            enable_album: true,
            ..MatchOptions::default()
        };
        let a = Track::new("Song", "Artist").with_album("Album").with_duration(200);
        let b = Track::new("Song", "Artist").with_album("Album").with_duration(205);
        assert!((exact_confidence(&a, &b, &options) - 1.0).abs() < 1e-9);

        let c = Track::new("Song", "Artist");
        assert!((exact_confidence(&a, &c, &options) - 0.95).abs() < 1e-9);
        assert!((exact_confidence(&a, &b, &MatchOptions::default()) - 0.975).abs() < 1e-9);
    }

    #[test]
    fn test_score_candidate() {
        let options = MatchOptions::default();
        let a = Track::new("Wonderwall", "Oasis");
        let b = Track::new("Wonderwal", "Oasis");
        let score = score_candidate(&a, &b, &options);
        assert_eq!(score.artist, 1.0);
        assert_eq!(score.duration_bonus, 0.0);
        assert!(score.total > 0.86 && score.total < 0.88);

        let a = a.with_duration(258);
        let b = b.with_duration(260);
        let score = score_candidate(&a, &b, &options);
        assert_eq!(score.duration_bonus, DURATION_BONUS);
        assert!(score.total <= 1.0);
    }

    #[test]
    fn test_preference_keywords() {
        let p = preference(&Track::new("Song (Live at Wembley)", "A"));
        assert!(p.live && !p.remix && !p.explicit);
        let p = preference(&Track::new("Song - Acoustic", "A"));
        assert!(!p.live && p.remix);
        let p = preference(&Track::new("Song [Explicit]", "A"));
        assert!(p.explicit);
        // "Oliver" does not contain the word "live"
        assert!(!preference(&Track::new("Oliver", "A")).live);
        assert!((preference(&Track::new("Song", "A")).title_length - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_confidence() {
        assert_eq!(duplicate_confidence(2), 0.9);
        assert_eq!(duplicate_confidence(3), 0.7);
        assert_eq!(duplicate_confidence(5), 0.7);
        assert_eq!(duplicate_confidence(6), 0.5);
    }

    #[test]
    fn test_duration_variance() {
        let v = duration_variance(&[180, 182, 300]).unwrap();
        assert!((v - 0.4).abs() < 1e-9);
        assert_eq!(duration_variance(&[180]), None);
        assert_eq!(duration_variance(&[180, 0]), None);
    }

    #[test]
    fn test_needs_review() {
        let a = Track::new("Song", "A").with_duration(180);
        let b = Track::new("Song", "A").with_duration(182);
        assert!(!needs_review(&[&a, &b]));

        let c = Track::new("Song", "A").with_duration(300);
        assert!(needs_review(&[&a, &c]));

        // Unknown durations skip the variance check
        let d = Track::new("Song", "A");
        assert!(!needs_review(&[&a, &d]));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3:05"), Some(185));
        assert_eq!(parse_duration("1:02:03"), Some(3723));
        assert_eq!(parse_duration("240"), Some(240));
        assert_eq!(parse_duration("3:75"), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("99999999:00"), None);
        assert_eq!(parse_duration("5000000:00:00"), None);
        assert_eq!(parse_duration("4294967295"), Some(u32::MAX));
        assert_eq!(parse_duration("71582788:15"), Some(u32::MAX));
        assert_eq!(parse_duration("71582788:16"), None);
    }
}
