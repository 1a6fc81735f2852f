//! Shared normalization functions for title/artist matching.
//! Used by the index builder, the matcher and the duplicate grouper.
//!
//! CRITICAL: Any change here changes every normalized key. All functions
//! must stay idempotent; run the tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use unicode_normalization::UnicodeNormalization;

use crate::models::{NormalizedTrack, Track};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Version-indicator vocabulary shared by the span and bare-word patterns.
const VERSION_WORDS: &str = r"remaster(?:ed)?|remix(?:ed)?|mix|version|edit|live|acoustic|demo|feat(?:uring)?|ft|explicit|clean|instrumental|deluxe|extended|mono|stereo";

/// Parenthesized or bracketed spans mentioning a version word:
/// "(2011 Remaster)", "[Live at Wembley]", "(feat. Someone)"
pub static VERSION_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\s*(?:\([^()]*\b(?:{w})\b[^()]*\)|\[[^\[\]]*\b(?:{w})\b[^\[\]]*\])",
        w = VERSION_WORDS
    ))
    .unwrap()
});

/// Bare version words, used only for base titles: "song title remastered"
pub static BARE_VERSION_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b(?:{})\b", VERSION_WORDS)).unwrap());

/// Unbracketed featured-artist tail: "song feat someone else"
pub static FEAT_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:feat(?:uring)?|ft)\b.*$").unwrap());

/// Year tokens, optionally parenthesized: "1999", "(2011)"
pub static YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?\b(?:19|20)\d{2}\b\)?").unwrap());

/// Track number prefixes like "03 - ", "12. "
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{1,3}\s*[-–—.]\s+").unwrap());

/// Anything that is not a lowercase ASCII letter, digit or whitespace
pub static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());

/// An ampersand with any surrounding whitespace: "A & B", "A&B"
pub static AMPERSAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*&\s*").unwrap());

/// Regex to collapse whitespace runs into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Separators between credited artists: ",", "&", "and", "feat", "featuring", "ft."
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:,|&|\band\b|\bfeat(?:uring)?\b\.?|\bft\b\.?)\s*").unwrap()
});

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition and
/// removing combining marks, then transliterating what is left.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Convert curly quotes and accent marks used as apostrophes to straight quotes.
pub fn normalize_punctuation(s: &str) -> String {
    s.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{00B4}', '\u{0060}'], "'")
}

/// Spell out "&", drop punctuation, collapse whitespace and trim.
/// Input must already be folded.
fn squash(folded: &str) -> String {
    let spelled = AMPERSAND.replace_all(folded, " and ");
    let stripped = NON_ALNUM.replace_all(&spelled, "");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

fn has_alphanumeric(s: &str) -> bool {
    s.chars().any(char::is_alphanumeric)
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title for matching.
/// Strips version spans, track numbers, years and punctuation.
///
/// Input is folded to ASCII before any pattern runs.
pub fn normalize_title(title: &str) -> String {
    let mut result = fold_to_ascii(&normalize_punctuation(title));

    // "(2011 Remaster)", "[Live]", "(feat. X)"
    result = VERSION_SPAN.replace_all(&result, "").to_string();

    // "03 - Song" → "Song"
    result = TRACK_NUMBER_PREFIX.replace(&result, "").to_string();

    // Years go unless the title is nothing but a year ("1999")
    let without_years = YEAR_TOKEN.replace_all(&result, " ");
    if has_alphanumeric(&without_years) {
        result = without_years.to_string();
    }

    squash(&result)
}

/// Strip bare version words and `feat` tails from a normalized title.
/// "bohemian rhapsody remastered" → "bohemian rhapsody"
///
/// Falls back to the input when nothing would be left ("live", "demo").
pub fn base_title(normalized_title: &str) -> String {
    let without_feat = FEAT_TAIL.replace(normalized_title, "");
    let without_words = BARE_VERSION_WORD.replace_all(&without_feat, " ");
    let base = MULTI_SPACE.replace_all(&without_words, " ").trim().to_string();
    if base.is_empty() {
        normalized_title.to_string()
    } else {
        base
    }
}

/// Normalize an artist display string for matching.
/// "Simon & Garfunkel" → "simon and garfunkel", "Björk" → "bjork"
pub fn normalize_artist(artist: &str) -> String {
    squash(&fold_to_ascii(&normalize_punctuation(artist)))
}

/// Split an artist display string into lowercase name fragments.
/// "Drake feat. Rihanna & Future" → {"drake", "future", "rihanna"}
pub fn extract_artist_tokens(artist: &str) -> BTreeSet<String> {
    let folded = fold_to_ascii(artist);
    ARTIST_SEPARATOR
        .split(&folded)
        .map(squash)
        .filter(|token| !token.is_empty())
        .collect()
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Normalization front end with an optional memoizing cache.
///
/// The cache is configured at construction and shared by reference; a
/// normalizer without one calls the free functions directly.
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    cache: Option<Arc<NormalizationCache>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<NormalizationCache>) -> Self {
        Self { cache: Some(cache) }
    }

    pub fn cache(&self) -> Option<&NormalizationCache> {
        self.cache.as_deref()
    }

    pub fn title(&self, text: &str) -> String {
        match &self.cache {
            Some(cache) => cache.titles.get_or_insert(text, normalize_title),
            None => normalize_title(text),
        }
    }

    pub fn artist(&self, text: &str) -> String {
        match &self.cache {
            Some(cache) => cache.artists.get_or_insert(text, normalize_artist),
            None => normalize_artist(text),
        }
    }

    pub fn artist_tokens(&self, text: &str) -> BTreeSet<String> {
        match &self.cache {
            Some(cache) => cache.tokens.get_or_insert(text, extract_artist_tokens),
            None => extract_artist_tokens(text),
        }
    }

    pub fn normalize_track(&self, track: &Track) -> NormalizedTrack {
        let title = self.title(&track.title);
        let base_title = base_title(&title);
        NormalizedTrack {
            artist: self.artist(&track.artist),
            album: track
                .album
                .as_deref()
                .map(|album| self.title(album))
                .unwrap_or_default(),
            artist_tokens: self.artist_tokens(&track.artist),
            base_title,
            title,
        }
    }
}

/// One bounded memo table. When full it is cleared before the next insert.
#[derive(Debug)]
struct Memo<V> {
    entries: Mutex<FxHashMap<String, V>>,
    capacity: usize,
}

impl<V: Clone> Memo<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            capacity,
        }
    }

    fn lookup(&self, key: &str) -> Option<V> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: &str, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.capacity {
                entries.clear();
            }
            entries.insert(key.to_string(), value);
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Bounded memoizing cache for the normalizers. Safe to share across
/// worker threads; invalidation is up to the caller.
#[derive(Debug)]
pub struct NormalizationCache {
    titles: CachedFn<String>,
    artists: CachedFn<String>,
    tokens: CachedFn<BTreeSet<String>>,
}

#[derive(Debug)]
struct CachedFn<V> {
    memo: Memo<V>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V: Clone> CachedFn<V> {
    fn new(capacity: usize) -> Self {
        Self {
            memo: Memo::new(capacity),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn get_or_insert(&self, key: &str, compute: impl FnOnce(&str) -> V) -> V {
        if let Some(value) = self.memo.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute(key);
        self.memo.store(key, value.clone());
        value
    }
}

/// Hit/miss counters summed over all memo tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl NormalizationCache {
    /// Capacities follow the usual title/artist/token ratio: tokens are
    /// computed per artist string, so half the title capacity is plenty.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            titles: CachedFn::new(capacity),
            artists: CachedFn::new(capacity),
            tokens: CachedFn::new((capacity / 2).max(1)),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.titles.hits.load(Ordering::Relaxed)
            + self.artists.hits.load(Ordering::Relaxed)
            + self.tokens.hits.load(Ordering::Relaxed);
        let misses = self.titles.misses.load(Ordering::Relaxed)
            + self.artists.misses.load(Ordering::Relaxed)
            + self.tokens.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            entries: self.titles.memo.len() + self.artists.memo.len() + self.tokens.memo.len(),
        }
    }

    pub fn clear(&self) {
        self.titles.memo.clear();
        self.artists.memo.clear();
        self.tokens.memo.clear();
    }
}

impl Default for NormalizationCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_version_spans() {
        assert_eq!(normalize_title("Yesterday (Live)"), "yesterday");
        assert_eq!(normalize_title("Track (2021 Remaster)"), "track");
        assert_eq!(normalize_title("Song [Mono]"), "song");
        assert_eq!(normalize_title("Hit (feat. Someone)"), "hit");
        assert_eq!(normalize_title("Song (Radio Edit)"), "song");
        // Spans without version words survive
        assert_eq!(normalize_title("Sign (Of The Times)"), "sign of the times");
    }

    #[test]
    fn test_normalize_title_years_and_punctuation() {
        assert_eq!(
            normalize_title("Bohemian Rhapsody - Remastered 2011"),
            "bohemian rhapsody remastered"
        );
        assert_eq!(normalize_title("Don't Stop Me Now (1978)"), "dont stop me now");
        assert_eq!(normalize_title("Rock & Roll"), "rock and roll");
        assert_eq!(normalize_title("Rock&Roll"), "rock and roll");
        // Fullwidth digits and brackets fold before the patterns run
        assert_eq!(normalize_title("Song ２０１１"), "song");
        assert_eq!(normalize_title("Song （Live）"), "song");
        assert_eq!(normalize_title("03 - Song Name"), "song name");
        // A title that is only a year keeps it
        assert_eq!(normalize_title("1999"), "1999");
    }

    #[test]
    fn test_normalize_title_empty() {
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("   "), "");
        assert_eq!(normalize_title("(Live)"), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "Bohemian Rhapsody - Remastered 2011",
            "Yesterday (Live)",
            "1999",
            "Beyoncé – Halo [Explicit]",
            "03 - 04 - Song",
            "Rock & Roll (2009)",
            "Song ２０１１",
            "Song （Live）",
            "Ａ＆Ｗ",
        ];
        for s in samples {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once, "title: {s}");
            let base = base_title(&once);
            assert_eq!(base_title(&base), base, "base: {s}");
            let artist = normalize_artist(s);
            assert_eq!(normalize_artist(&artist), artist, "artist: {s}");
        }
    }

    #[test]
    fn test_base_title() {
        assert_eq!(base_title("song title remastered"), "song title");
        assert_eq!(base_title("bohemian rhapsody remastered"), "bohemian rhapsody");
        assert_eq!(base_title("hit feat someone"), "hit");
        assert_eq!(base_title("live"), "live");
    }

    #[test]
    fn test_normalize_artist() {
        assert_eq!(normalize_artist("The Beatles"), "the beatles");
        assert_eq!(normalize_artist("Simon & Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize_artist("Simon&Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize_artist("Simon ＆Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize_artist("Björk"), "bjork");
        assert_eq!(normalize_artist("AC/DC"), "acdc");
        assert_eq!(normalize_artist("  "), "");
    }

    #[test]
    fn test_extract_artist_tokens() {
        let tokens = extract_artist_tokens("Drake feat. Rihanna & Future");
        let expected: BTreeSet<String> = ["drake", "rihanna", "future"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);

        let tokens = extract_artist_tokens("Earth, Wind and Fire");
        assert!(tokens.contains("earth"));
        assert!(tokens.contains("wind"));
        assert!(tokens.contains("fire"));

        // "and" inside a word is not a separator
        assert!(extract_artist_tokens("Brandy").contains("brandy"));
        assert!(extract_artist_tokens("").is_empty());
        assert!(extract_artist_tokens(" , & ").is_empty());
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_cached_normalizer_matches_plain() {
        let cache = Arc::new(NormalizationCache::new(4));
        let cached = Normalizer::with_cache(Arc::clone(&cache));
        let plain = Normalizer::new();

        for title in ["A (Live)", "B - 2011", "A (Live)", "C", "D", "E", "A (Live)"] {
            assert_eq!(cached.title(title), plain.title(title));
        }
        let stats = cache.stats();
        assert!(stats.hits >= 1);
        assert!(stats.entries <= 4);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_normalize_track() {
        let track = Track::new("Song Remastered 2011", "Queen feat. David Bowie")
            .with_album("A Night at the Opera (Deluxe Edition)");
        let n = Normalizer::new().normalize_track(&track);
        assert_eq!(n.title, "song remastered");
        assert_eq!(n.base_title, "song");
        assert_eq!(n.artist, "queen feat david bowie");
        assert_eq!(n.album, "a night at the opera");
        assert!(n.artist_tokens.contains("david bowie"));
    }
}
