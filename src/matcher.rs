//! Cascading matcher: identifier, exact key, base title, then fuzzy.
//!
//! Each stage runs only when the previous one produced nothing acceptable.
//! The best unaccepted candidate of the scored stages is kept so callers
//! can list it for review.

use crate::config::{MatchOptions, Thresholds};
use crate::index::TrackIndex;
use crate::models::{MatchType, NormalizedTrack, Track};
use crate::scoring::{albums_match, duration_gap, exact_confidence, score_candidate};

/// Scores closer than this are treated as ties
const SCORE_EPSILON: f64 = 1e-9;

/// A target track chosen for a source track.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    pub track: &'a Track,
    /// Position in the target collection
    pub position: usize,
    pub confidence: f64,
    pub match_type: MatchType,
}

/// Result of running the cascade for one source track.
#[derive(Clone, Copy, Debug)]
pub enum MatchOutcome<'a> {
    Matched(Candidate<'a>),
    /// No stage accepted, but the best candidate is worth reviewing
    NearMiss(Candidate<'a>),
    Missing,
    /// Source normalizes to an empty title or artist
    Skipped,
}

impl<'a> MatchOutcome<'a> {
    pub fn matched(self) -> Option<Candidate<'a>> {
        match self {
            MatchOutcome::Matched(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Scored candidate with the tie-break inputs.
#[derive(Clone, Copy)]
struct Scored {
    slot: usize,
    score: f64,
    album_match: bool,
    gap: Option<u32>,
}

impl Scored {
    /// Higher score wins; on a tie an album match, then a smaller duration
    /// gap (unknown is worst). Otherwise the earlier candidate stays.
    fn beats(&self, other: &Scored) -> bool {
        if self.score > other.score + SCORE_EPSILON {
            return true;
        }
        if self.score + SCORE_EPSILON < other.score {
            return false;
        }
        if self.album_match != other.album_match {
            return self.album_match;
        }
        match (self.gap, other.gap) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

pub struct Matcher<'o> {
    options: &'o MatchOptions,
    thresholds: Thresholds,
}

impl<'o> Matcher<'o> {
    pub fn new(options: &'o MatchOptions) -> Self {
        Self {
            options,
            thresholds: options.thresholds(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Best accepted candidate for `source` in `index`, if any.
    pub fn best_match<'a>(&self, source: &Track, index: &TrackIndex<'a>) -> Option<Candidate<'a>> {
        self.evaluate(source, index).matched()
    }

    /// Run the full cascade for `source`.
    pub fn evaluate<'a>(&self, source: &Track, index: &TrackIndex<'a>) -> MatchOutcome<'a> {
        // Stage 1: identifier. Authoritative even for unmatchable sources.
        if let Some(slot) = source.isrc_key().and_then(|isrc| index.isrc(&isrc)) {
            return MatchOutcome::Matched(self.candidate(index, slot, 1.0, MatchType::Isrc));
        }

        let norm = source.normalized();
        if !norm.is_matchable() {
            return MatchOutcome::Skipped;
        }

        // Stage 2: exact normalized key
        let exact = index.exact(&norm.key());
        if let Some(best) = self.pick_best(source, index, exact, |candidate| {
            exact_confidence(source, candidate, self.options)
        }) {
            return MatchOutcome::Matched(self.candidate(index, best.slot, best.score, MatchType::Exact));
        }

        let composite = |candidate: &Track| score_candidate(source, candidate, self.options).total;

        // Stage 3: base title
        let mut review: Option<Scored> = None;
        if let Some(best) = self.pick_best(source, index, index.base(&norm.base_key()), composite) {
            if best.score >= self.thresholds.exact_accept {
                return MatchOutcome::Matched(self.candidate(index, best.slot, best.score, MatchType::Fuzzy));
            }
            review = Some(best);
        }

        // Stage 4: fuzzy over the shared-artist pool
        let pool = self.fuzzy_pool(norm, index);
        if let Some(best) = self.pick_best(source, index, &pool, composite) {
            if best.score >= self.thresholds.fuzzy_accept {
                return MatchOutcome::Matched(self.candidate(index, best.slot, best.score, MatchType::Fuzzy));
            }
            if review.map_or(true, |current| best.beats(&current)) {
                review = Some(best);
            }
        }

        match review {
            Some(best) if best.score >= self.thresholds.review => MatchOutcome::NearMiss(
                self.candidate(index, best.slot, best.score, MatchType::Fuzzy),
            ),
            _ => MatchOutcome::Missing,
        }
    }

    /// Tracks sharing an artist token with the source. Sources without
    /// tokens search the head of the index in lenient mode only.
    fn fuzzy_pool(&self, norm: &NormalizedTrack, index: &TrackIndex<'_>) -> Vec<usize> {
        if !norm.artist_tokens.is_empty() {
            return index.sharing_tokens(&norm.artist_tokens);
        }
        if self.options.strict_mode {
            return Vec::new();
        }
        index.fallback_pool(self.options.max_fuzzy_pool).to_vec()
    }

    fn pick_best(
        &self,
        source: &Track,
        index: &TrackIndex<'_>,
        slots: &[usize],
        score: impl Fn(&Track) -> f64,
    ) -> Option<Scored> {
        let source_norm = source.normalized();
        let mut best: Option<Scored> = None;
        for &slot in slots {
            let Some(entry) = index.slot(slot) else {
                continue;
            };
            let scored = Scored {
                slot,
                score: score(entry.track),
                album_match: albums_match(source_norm, entry.track.normalized()),
                gap: duration_gap(source.duration, entry.track.duration),
            };
            if best.map_or(true, |current| scored.beats(&current)) {
                best = Some(scored);
            }
        }
        best
    }

    fn candidate<'a>(
        &self,
        index: &TrackIndex<'a>,
        slot: usize,
        confidence: f64,
        match_type: MatchType,
    ) -> Candidate<'a> {
        let entry = index.tracks()[slot];
        Candidate {
            track: entry.track,
            position: entry.position,
            confidence,
            match_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collection;

    fn target(tracks: Vec<Track>) -> Collection {
        Collection::from_tracks("target", tracks)
    }

    #[test]
    fn test_isrc_match_ignores_titles() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![
            Track::new("Something Else", "Other"),
            Track::new("Bohemian Rhapsody - Remastered 2011", "Queen").with_isrc("GBUM71029601"),
        ]);
        let index = TrackIndex::build(&c);
        let source = Track::new("Bohemian Rhapsody", "Queen").with_isrc("gbum71029601");

        let m = matcher.best_match(&source, &index).unwrap();
        assert_eq!(m.match_type, MatchType::Isrc);
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.position, 1);
    }

    #[test]
    fn test_isrc_before_unmatchable_check() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![Track::new("Song", "Artist").with_isrc("X1")]);
        let index = TrackIndex::build(&c);

        let blank = Track::new("", "").with_isrc("x1");
        assert!(matches!(matcher.evaluate(&blank, &index), MatchOutcome::Matched(_)));

        let blank = Track::new("", "Artist");
        assert!(matches!(matcher.evaluate(&blank, &index), MatchOutcome::Skipped));
    }

    #[test]
    fn test_exact_match() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![Track::new("Yesterday (Live)", "The Beatles")]);
        let index = TrackIndex::build(&c);

        let m = matcher.best_match(&Track::new("Yesterday", "The Beatles"), &index).unwrap();
        assert_eq!(m.match_type, MatchType::Exact);
        assert!(m.confidence >= 0.95);
    }

    #[test]
    fn test_exact_prefers_closer_duration() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![
            Track::new("Song", "Artist"),
            Track::new("Song", "Artist").with_duration(300),
            Track::new("Song", "Artist").with_duration(201),
            Track::new("Song", "Artist").with_duration(202),
        ]);
        let index = TrackIndex::build(&c);
        let source = Track::new("Song", "Artist").with_duration(200);

        // 201 and 202 both earn the duration bonus; 201 is closer
        let m = matcher.best_match(&source, &index).unwrap();
        assert_eq!(m.position, 2);
    }

    #[test]
    fn test_base_title_stage() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![Track::new("Song Title Remastered 2011", "Artist")]);
        let index = TrackIndex::build(&c);

        let m = matcher.best_match(&Track::new("Song Title", "Artist"), &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert!(m.confidence >= 0.80);
    }

    #[test]
    fn test_fuzzy_lenient_and_strict() {
        let c = target(vec![Track::new("Wonderwal", "Oasis")]);
        let index = TrackIndex::build(&c);
        let source = Track::new("Wonderwall", "Oasis");

        let lenient = MatchOptions::default();
        let m = Matcher::new(&lenient).best_match(&source, &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);

        let strict = MatchOptions::strict();
        match Matcher::new(&strict).evaluate(&source, &index) {
            MatchOutcome::NearMiss(c) => assert!(c.confidence < 0.88 && c.confidence >= 0.75),
            other => panic!("expected near miss, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_pool_requires_shared_artist() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![Track::new("Wonderwal", "Blur")]);
        let index = TrackIndex::build(&c);

        let outcome = matcher.evaluate(&Track::new("Wonderwall", "Oasis"), &index);
        assert!(matches!(outcome, MatchOutcome::Missing));
    }

    #[test]
    fn test_base_title_tie_prefers_album_match() {
        // Album bonus is off, so both candidates score the same
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![
            Track::new("Song Title Remastered", "Artist").with_album("Other"),
            Track::new("Song Title Remastered", "Artist").with_album("Hits"),
        ]);
        let index = TrackIndex::build(&c);
        let source = Track::new("Song Title", "Artist").with_album("Hits");

        let m = matcher.best_match(&source, &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.position, 1);
    }

    #[test]
    fn test_base_title_tie_keeps_first() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![
            Track::new("Song Title Remastered", "Artist").with_id("first"),
            Track::new("Song Title Remastered", "Artist").with_id("second"),
        ]);
        let index = TrackIndex::build(&c);

        let m = matcher.best_match(&Track::new("Song Title", "Artist"), &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.position, 0);
        assert_eq!(m.track.id.as_deref(), Some("first"));
    }

    #[test]
    fn test_fuzzy_tie_prefers_album_match() {
        let c = target(vec![
            Track::new("Wonderwal", "Oasis").with_album("Stop the Clocks"),
            Track::new("Wonderwal", "Oasis").with_album("Morning Glory"),
        ]);
        let index = TrackIndex::build(&c);
        let source = Track::new("Wonderwall", "Oasis").with_album("Morning Glory");

        let lenient = MatchOptions::default();
        let m = Matcher::new(&lenient).best_match(&source, &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.position, 1);

        // Same ordering when the winner only reaches review
        let strict = MatchOptions::strict();
        match Matcher::new(&strict).evaluate(&source, &index) {
            MatchOutcome::NearMiss(c) => assert_eq!(c.position, 1),
            other => panic!("expected near miss, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_tie_keeps_first() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![
            Track::new("Something Else", "Oasis"),
            Track::new("Wonderwal", "Oasis").with_id("first"),
            Track::new("Wonderwal", "Oasis").with_id("second"),
        ]);
        let index = TrackIndex::build(&c);

        let m = matcher.best_match(&Track::new("Wonderwall", "Oasis"), &index).unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.position, 1);
        assert_eq!(m.track.id.as_deref(), Some("first"));
    }

    #[test]
    fn test_unspaced_ampersand_matches_exactly() {
        let options = MatchOptions::default();
        let matcher = Matcher::new(&options);
        let c = target(vec![Track::new("The Boxer", "Simon & Garfunkel")]);
        let index = TrackIndex::build(&c);

        let m = matcher
            .best_match(&Track::new("The Boxer", "Simon&Garfunkel"), &index)
            .unwrap();
        assert_eq!(m.match_type, MatchType::Exact);
    }
}
