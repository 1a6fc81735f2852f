//! Duplicate detection within a single collection.
//!
//! Tracks sharing a signature (normalized title and artist) form a group.
//! Members are ranked by keeper preference; the first is kept and the
//! rest are marked for removal.

use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::models::{Collection, Disposition, DuplicateGroup, RankedTrack, Track};
use crate::normalize::Normalizer;
use crate::scoring::{duplicate_confidence, needs_review, preference};

/// Grouping signature `"title|artist"`, or None when the title normalizes
/// to nothing.
pub fn signature(track: &Track) -> Option<String> {
    signature_with(track, &Normalizer::default())
}

fn signature_with(track: &Track, normalizer: &Normalizer) -> Option<String> {
    let norm = track.normalized_with(normalizer);
    if norm.title.is_empty() {
        None
    } else {
        Some(format!("{}|{}", norm.title, norm.artist))
    }
}

/// Find duplicate groups in `collection`, in order of first appearance.
pub fn find_internal_duplicates(collection: &Collection) -> Vec<DuplicateGroup<'_>> {
    find_internal_duplicates_with(collection, &Normalizer::default())
}

pub fn find_internal_duplicates_with<'a>(
    collection: &'a Collection,
    normalizer: &Normalizer,
) -> Vec<DuplicateGroup<'a>> {
    DuplicateReport::build(collection, normalizer).groups
}

fn build_group<'a>(signature: String, members: Vec<(usize, &'a Track)>) -> DuplicateGroup<'a> {
    let tracks: Vec<&'a Track> = members.iter().map(|(_, t)| *t).collect();

    let mut ranked: Vec<RankedTrack<'a>> = members
        .iter()
        .map(|&(position, track)| RankedTrack {
            track,
            position,
            preference: preference(track),
            disposition: Disposition::Remove,
        })
        .collect();
    // Stable: equal preferences keep collection order
    ranked.sort_by(|a, b| a.preference.compare(&b.preference));
    ranked[0].disposition = Disposition::Keep;

    let tracks_to_keep = vec![ranked[0].track];
    let tracks_to_remove = ranked[1..].iter().map(|r| r.track).collect();

    DuplicateGroup {
        signature,
        confidence: duplicate_confidence(tracks.len()),
        review_needed: needs_review(&tracks),
        tracks,
        tracks_to_keep,
        tracks_to_remove,
        ranked,
    }
}

/// Duplicate groups of one collection with summary counts.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport<'a> {
    pub collection: String,
    pub groups: Vec<DuplicateGroup<'a>>,
    pub total_tracks: usize,
    /// Entries whose title normalizes to nothing
    pub skipped: usize,
}

impl<'a> DuplicateReport<'a> {
    pub fn build(collection: &'a Collection, normalizer: &Normalizer) -> Self {
        let mut order: Vec<(String, Vec<(usize, &'a Track)>)> = Vec::new();
        let mut by_signature: FxHashMap<String, usize> = FxHashMap::default();
        let mut skipped = 0;

        for (position, track) in collection.tracks() {
            let Some(sig) = signature_with(track, normalizer) else {
                skipped += 1;
                continue;
            };
            match by_signature.get(&sig) {
                Some(&slot) => order[slot].1.push((position, track)),
                None => {
                    by_signature.insert(sig.clone(), order.len());
                    order.push((sig, vec![(position, track)]));
                }
            }
        }

        let groups: Vec<DuplicateGroup<'a>> = order
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(sig, members)| build_group(sig, members))
            .collect();

        if skipped > 0 {
            debug!("Skipped {} entries with empty titles in '{}'", skipped, collection.name);
        }
        info!(
            "Found {} duplicate groups in '{}' ({} tracks)",
            groups.len(),
            collection.name,
            collection.len()
        );

        Self {
            collection: collection.name.clone(),
            groups,
            total_tracks: collection.len(),
            skipped,
        }
    }

    /// Groups safe to clean up without review.
    pub fn auto_removable(&self) -> impl Iterator<Item = &DuplicateGroup<'a>> {
        self.groups.iter().filter(|g| !g.review_needed)
    }

    pub fn needs_review(&self) -> impl Iterator<Item = &DuplicateGroup<'a>> {
        self.groups.iter().filter(|g| g.review_needed)
    }

    /// Tracks marked for removal across all groups.
    pub fn removal_count(&self) -> usize {
        self.groups.iter().map(|g| g.tracks_to_remove.len()).sum()
    }
}
