//! Cross-collection comparison and N-way overlap analysis.

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::time::Instant;

use crate::config::MatchOptions;
use crate::index::TrackIndex;
use crate::matcher::{MatchOutcome, Matcher};
use crate::models::{
    ArtistAnalysis, Collection, CollectionSummary, ComparisonResult, ComparisonStats, MatchResult,
    MultiAnalysis, NearMiss, PairwiseComparison, Track, UniqueTracks,
};
use crate::normalize::Normalizer;
use crate::progress::{format_duration, ProgressFn, ProgressReporter};

/// Runs the matcher over whole collections.
///
/// The normalizer (and any cache it carries) is shared by every index and
/// comparison built through this comparator.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    options: MatchOptions,
    normalizer: Normalizer,
}

impl Comparator {
    pub fn new(options: MatchOptions) -> Self {
        Self {
            options,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_normalizer(options: MatchOptions, normalizer: Normalizer) -> Self {
        Self { options, normalizer }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Build an index for `collection`. Callers may keep it and pass it to
    /// `compare_indexed` for repeated comparisons against the same target.
    pub fn index<'a>(&self, collection: &'a Collection) -> TrackIndex<'a> {
        TrackIndex::build_with(collection, &self.normalizer)
    }

    /// Compare `source` against `target`.
    pub fn compare<'a>(
        &self,
        source: &'a Collection,
        target: &'a Collection,
        progress: Option<&ProgressFn<'_>>,
    ) -> ComparisonResult<'a> {
        let index = self.index(target);
        self.compare_indexed(source, &index, progress)
    }

    /// Compare `source` against a prebuilt target index.
    pub fn compare_indexed<'a>(
        &self,
        source: &'a Collection,
        target: &TrackIndex<'a>,
        progress: Option<&ProgressFn<'_>>,
    ) -> ComparisonResult<'a> {
        let start = Instant::now();
        let target_collection = target.collection();
        let matcher = Matcher::new(&self.options);
        let sources: Vec<(usize, &'a Track)> = source.music_tracks().collect();

        info!(
            "Comparing '{}' ({} music tracks) against '{}' ({} music tracks)",
            source.name,
            sources.len(),
            target_collection.name,
            target.len()
        );

        let label = format!("{} -> {}", source.name, target_collection.name);
        let reporter = ProgressReporter::new(progress, label, sources.len());

        let evaluate = |&(position, track): &(usize, &'a Track)| {
            track.normalized_with(&self.normalizer);
            let outcome = matcher.evaluate(track, target);
            reporter.tick();
            (position, track, outcome)
        };

        // Both paths keep source order
        let outcomes: Vec<(usize, &'a Track, MatchOutcome<'a>)> = if self.options.parallel {
            sources.par_iter().map(evaluate).collect()
        } else {
            sources.iter().map(evaluate).collect()
        };
        reporter.finish();

        let mut matches = Vec::new();
        let mut missing_tracks = Vec::new();
        let mut near_misses = Vec::new();
        let mut skipped = Vec::new();

        for (source_index, source_track, outcome) in outcomes {
            match outcome {
                MatchOutcome::Matched(c) => matches.push(MatchResult {
                    source_track,
                    target_track: c.track,
                    source_index,
                    target_index: c.position,
                    confidence: c.confidence,
                    match_type: c.match_type,
                }),
                MatchOutcome::NearMiss(c) => {
                    missing_tracks.push(source_track);
                    near_misses.push(NearMiss {
                        source_track,
                        candidate: c.track,
                        source_index,
                        target_index: c.position,
                        confidence: c.confidence,
                    });
                }
                MatchOutcome::Missing => missing_tracks.push(source_track),
                MatchOutcome::Skipped => skipped.push(source_track),
            }
        }

        let stats = ComparisonStats::from_results(
            &matches,
            missing_tracks.len(),
            near_misses.len(),
            skipped.len(),
        );

        info!(
            "'{}' -> '{}': {} matched, {} missing, {} skipped ({:.1}%) in {}",
            source.name,
            target_collection.name,
            stats.total_matches,
            stats.missing_tracks,
            stats.skipped_tracks,
            stats.match_rate,
            format_duration(start.elapsed())
        );

        ComparisonResult {
            source_name: source.name.clone(),
            target_name: target_collection.name.clone(),
            matches,
            missing_tracks,
            near_misses,
            skipped,
            source_total: source.len(),
            source_music: sources.len(),
            target_total: target_collection.len(),
            target_music: target.len(),
            stats,
        }
    }

    /// Pairwise comparisons of all collections plus universal and unique
    /// tracks and artists. Fewer than two collections yield an empty analysis.
    pub fn analyze<'a>(
        &self,
        collections: &'a [Collection],
        progress: Option<&ProgressFn<'_>>,
    ) -> MultiAnalysis<'a> {
        if collections.len() < 2 {
            debug!("analyze called with {} collection(s), nothing to compare", collections.len());
            return MultiAnalysis::default();
        }

        let indices: Vec<TrackIndex<'a>> = collections.iter().map(|c| self.index(c)).collect();

        let mut pairwise = Vec::new();
        for source in 0..collections.len() {
            for target in (source + 1)..collections.len() {
                let result = self.compare_indexed(&collections[source], &indices[target], progress);
                pairwise.push(PairwiseComparison {
                    source,
                    target,
                    result,
                });
            }
        }

        let summaries = collections
            .iter()
            .map(|c| CollectionSummary {
                name: c.name.clone(),
                total: c.len(),
                music: c.music_count(),
            })
            .collect();

        let universal_tracks = self.universal_tracks(collections, &pairwise);
        let artists = self.artist_analysis(collections);
        let unique_tracks = self.unique_tracks(collections, &pairwise);

        info!(
            "Analyzed {} collections: {} universal tracks, {} universal artists",
            collections.len(),
            universal_tracks.len(),
            artists.universal_artists.len()
        );

        MultiAnalysis {
            collections: summaries,
            pairwise,
            universal_tracks,
            artists,
            unique_tracks,
        }
    }

    /// Tracks of the first collection matched in every other collection.
    fn universal_tracks<'a>(
        &self,
        collections: &'a [Collection],
        pairwise: &[PairwiseComparison<'a>],
    ) -> Vec<&'a Track> {
        let anchor = &collections[0];
        let mut keys: FxHashSet<(String, String)> = anchor
            .music_tracks()
            .map(|(_, t)| t.normalized_with(&self.normalizer))
            .filter(|n| n.is_matchable())
            .map(|n| n.key())
            .collect();

        for comparison in pairwise.iter().filter(|p| p.source == 0) {
            let matched: FxHashSet<(String, String)> = comparison
                .result
                .matches
                .iter()
                .map(|m| m.source_track.normalized_with(&self.normalizer).key())
                .collect();
            keys.retain(|key| matched.contains(key));
        }

        let mut universal = Vec::new();
        for (_, track) in anchor.music_tracks() {
            let key = track.normalized_with(&self.normalizer).key();
            if keys.remove(&key) {
                universal.push(track);
            }
        }
        universal
    }

    fn artist_analysis(&self, collections: &[Collection]) -> ArtistAnalysis {
        let per_collection: Vec<BTreeSet<&String>> = collections
            .iter()
            .map(|c| {
                c.music_tracks()
                    .flat_map(|(_, t)| t.normalized_with(&self.normalizer).artist_tokens.iter())
                    .collect()
            })
            .collect();

        let mut universal = per_collection[0].clone();
        for set in &per_collection[1..] {
            universal.retain(|token| set.contains(token));
        }
        let all: BTreeSet<&String> = per_collection.iter().flatten().copied().collect();

        ArtistAnalysis {
            universal_artists: universal.into_iter().cloned().collect(),
            total_unique_artists: all.len(),
            per_collection: per_collection.iter().map(BTreeSet::len).collect(),
        }
    }

    /// Matchable music tracks of each collection matched in no comparison.
    fn unique_tracks<'a>(
        &self,
        collections: &'a [Collection],
        pairwise: &[PairwiseComparison<'a>],
    ) -> Vec<UniqueTracks<'a>> {
        collections
            .iter()
            .enumerate()
            .map(|(k, collection)| {
                let mut matched: FxHashSet<usize> = FxHashSet::default();
                for p in pairwise {
                    if p.source == k {
                        matched.extend(p.result.matches.iter().map(|m| m.source_index));
                    } else if p.target == k {
                        matched.extend(p.result.matches.iter().map(|m| m.target_index));
                    }
                }
                let tracks = collection
                    .music_tracks()
                    .filter(|(position, track)| {
                        !matched.contains(position)
                            && track.normalized_with(&self.normalizer).is_matchable()
                    })
                    .map(|(_, track)| track)
                    .collect();
                UniqueTracks {
                    collection: collection.name.clone(),
                    tracks,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchType;

    fn collection(name: &str, tracks: &[(&str, &str)]) -> Collection {
        Collection::from_tracks(name, tracks.iter().map(|(t, a)| Track::new(*t, *a)))
    }

    #[test]
    fn test_compare_counts_and_order() {
        let mut source = collection("a", &[("Song C", "X"), ("Song A", "X"), ("Unknown", "Nobody")]);
        source.push_non_music(Track::new("Episode 1", "Podcast"));
        source.push(Track::new("", "Blank"));
        let target = collection("b", &[("Song A", "X"), ("Song B", "Y")]);

        let comparator = Comparator::new(MatchOptions::default());
        let result = comparator.compare(&source, &target, None);

        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].source_index, 1);
        assert_eq!(result.matches[0].match_type, MatchType::Exact);
        let missing: Vec<&str> = result.missing_tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(missing, vec!["Song C", "Unknown"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.source_total, 5);
        assert_eq!(result.source_music, 4);
        assert_eq!(result.stats.skipped_tracks, 1);
        assert!((result.stats.match_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let source = collection("a", &[("One", "A"), ("Two", "B"), ("Three", "C")]);
        let target = collection("b", &[("Three", "C"), ("One", "A")]);

        let parallel = Comparator::new(MatchOptions::default()).compare(&source, &target, None);
        let sequential = Comparator::new(MatchOptions {
            parallel: false,
            ..MatchOptions::default()
        })
        .compare(&source, &target, None);

        let positions = |r: &ComparisonResult| -> Vec<(usize, usize)> {
            r.matches.iter().map(|m| (m.source_index, m.target_index)).collect()
        };
        assert_eq!(positions(&parallel), positions(&sequential));
        assert_eq!(positions(&parallel), vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_analyze_requires_two_collections() {
        let only = vec![collection("a", &[("One", "A")])];
        let analysis = Comparator::default().analyze(&only, None);
        assert!(analysis.pairwise.is_empty());
        assert!(analysis.universal_tracks.is_empty());
    }

    #[test]
    fn test_analyze_universal_and_unique() {
        let collections = vec![
            collection("a", &[("Common", "Band"), ("Only A", "Solo"), ("Pair", "Duo")]),
            collection("b", &[("Common", "Band"), ("Pair", "Duo")]),
            collection("c", &[("Common", "Band"), ("Only C", "Other")]),
        ];
        let analysis = Comparator::default().analyze(&collections, None);

        assert_eq!(analysis.pairwise.len(), 3);
        assert!(analysis.comparison(0, 2).is_some());
        assert!(analysis.comparison(2, 0).is_none());

        let universal: Vec<&str> = analysis.universal_tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(universal, vec!["Common"]);

        assert_eq!(analysis.artists.universal_artists, vec!["band".to_string()]);
        assert_eq!(analysis.artists.total_unique_artists, 4);
        assert_eq!(analysis.artists.per_collection, vec![3, 2, 2]);

        let unique: Vec<Vec<&str>> = analysis
            .unique_tracks
            .iter()
            .map(|u| u.tracks.iter().map(|t| t.title.as_str()).collect())
            .collect();
        assert_eq!(unique, vec![vec!["Only A"], vec![], vec!["Only C"]]);
    }
}
