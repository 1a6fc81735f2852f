//! Lookup structures over one collection's music tracks.
//!
//! Built once per comparison target and queried by the matcher. Rebuilding
//! is the only way to pick up changes to the collection.

use log::debug;
use rustc_hash::FxHashMap;

use crate::models::{Collection, KeyIndex, TokenIndex, Track};
use crate::normalize::Normalizer;

/// A music track of the indexed collection.
#[derive(Clone, Copy, Debug)]
pub struct IndexedTrack<'a> {
    /// Position in the collection
    pub position: usize,
    pub track: &'a Track,
}

/// Indices over a collection's music tracks. Lookups return slots into
/// `tracks()`, in collection order.
#[derive(Debug)]
pub struct TrackIndex<'a> {
    collection: &'a Collection,
    tracks: Vec<IndexedTrack<'a>>,
    /// Slots of tracks with non-empty normalized title and artist
    matchable: Vec<usize>,
    /// Lowercased ISRC -> first slot carrying it
    by_isrc: FxHashMap<String, usize>,
    exact: KeyIndex,
    base: KeyIndex,
    by_artist_token: TokenIndex,
}

impl<'a> TrackIndex<'a> {
    pub fn build(collection: &'a Collection) -> Self {
        Self::build_with(collection, &Normalizer::default())
    }

    pub fn build_with(collection: &'a Collection, normalizer: &Normalizer) -> Self {
        let tracks: Vec<IndexedTrack<'a>> = collection
            .music_tracks()
            .map(|(position, track)| IndexedTrack { position, track })
            .collect();

        let mut matchable = Vec::with_capacity(tracks.len());
        let mut by_isrc: FxHashMap<String, usize> = FxHashMap::default();
        let mut exact: KeyIndex = FxHashMap::default();
        let mut base: KeyIndex = FxHashMap::default();
        let mut by_artist_token: TokenIndex = FxHashMap::default();

        for (slot, entry) in tracks.iter().enumerate() {
            // Identifiers index every music track, matchable or not
            if let Some(isrc) = entry.track.isrc_key() {
                by_isrc.entry(isrc).or_insert(slot);
            }

            let norm = entry.track.normalized_with(normalizer);
            if !norm.is_matchable() {
                continue;
            }
            matchable.push(slot);
            exact.entry(norm.key()).or_default().push(slot);
            base.entry(norm.base_key()).or_default().push(slot);
            for token in &norm.artist_tokens {
                by_artist_token.entry(token.clone()).or_default().push(slot);
            }
        }

        debug!(
            "Indexed '{}': {} music tracks, {} matchable, {} ISRCs, {} keys, {} artist tokens",
            collection.name,
            tracks.len(),
            matchable.len(),
            by_isrc.len(),
            exact.len(),
            by_artist_token.len()
        );

        Self {
            collection,
            tracks,
            matchable,
            by_isrc,
            exact,
            base,
            by_artist_token,
        }
    }

    pub fn collection(&self) -> &'a Collection {
        self.collection
    }

    pub fn tracks(&self) -> &[IndexedTrack<'a>] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn matchable_count(&self) -> usize {
        self.matchable.len()
    }

    pub fn slot(&self, slot: usize) -> Option<&IndexedTrack<'a>> {
        self.tracks.get(slot)
    }

    /// Slot of the first track carrying `isrc` (already lowercased).
    pub fn isrc(&self, isrc: &str) -> Option<usize> {
        self.by_isrc.get(isrc).copied()
    }

    pub fn exact(&self, key: &(String, String)) -> &[usize] {
        self.exact.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn base(&self, key: &(String, String)) -> &[usize] {
        self.base.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn artist_token(&self, token: &str) -> &[usize] {
        self.by_artist_token
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Slots of tracks sharing at least one of `tokens`, sorted and deduplicated.
    pub fn sharing_tokens<'t>(&self, tokens: impl IntoIterator<Item = &'t String>) -> Vec<usize> {
        let mut slots: Vec<usize> = tokens
            .into_iter()
            .flat_map(|token| self.artist_token(token).iter().copied())
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// The first `limit` matchable slots, for sources without artist tokens.
    pub fn fallback_pool(&self, limit: usize) -> &[usize] {
        &self.matchable[..limit.min(self.matchable.len())]
    }
}
