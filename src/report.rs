//! SQLite report output for comparisons and duplicate groups.

use anyhow::{Context, Result};
use log::info;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::dedup::DuplicateReport;
use crate::models::{ComparisonResult, Track};
use crate::progress::create_progress_bar;
use crate::safety::validate_report_path;

const WRITE_BATCH_SIZE: usize = 10_000;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;

    CREATE TABLE matches (
        id INTEGER PRIMARY KEY,
        comparison TEXT NOT NULL,
        source_index INTEGER NOT NULL,
        source_title TEXT NOT NULL,
        source_artist TEXT NOT NULL,
        target_index INTEGER NOT NULL,
        target_title TEXT NOT NULL,
        target_artist TEXT NOT NULL,
        confidence REAL NOT NULL,
        match_type TEXT NOT NULL
    );

    CREATE TABLE missing (
        id INTEGER PRIMARY KEY,
        comparison TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        album TEXT,
        duration_sec INTEGER,
        isrc TEXT,
        skipped INTEGER NOT NULL
    );

    CREATE TABLE near_misses (
        id INTEGER PRIMARY KEY,
        comparison TEXT NOT NULL,
        source_index INTEGER NOT NULL,
        source_title TEXT NOT NULL,
        source_artist TEXT NOT NULL,
        target_index INTEGER NOT NULL,
        target_title TEXT NOT NULL,
        target_artist TEXT NOT NULL,
        confidence REAL NOT NULL
    );

    CREATE TABLE duplicate_groups (
        id INTEGER PRIMARY KEY,
        collection TEXT NOT NULL,
        signature TEXT NOT NULL,
        size INTEGER NOT NULL,
        confidence REAL NOT NULL,
        review_needed INTEGER NOT NULL
    );

    CREATE TABLE duplicate_members (
        group_id INTEGER NOT NULL REFERENCES duplicate_groups(id),
        rank INTEGER NOT NULL,
        position INTEGER NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        duration_sec INTEGER,
        disposition TEXT NOT NULL
    );

    CREATE INDEX idx_matches_comparison ON matches(comparison);
    CREATE INDEX idx_missing_comparison ON missing(comparison);
    CREATE INDEX idx_members_group ON duplicate_members(group_id);";

/// Create a fresh report database at `path`.
///
/// The path must pass the report safety check against `sources`; an
/// existing report at that path is removed first.
pub fn open_report(path: &Path, sources: &[&Path]) -> Result<Connection> {
    validate_report_path(path, sources)?;

    if path.exists() {
        std::fs::remove_file(path).context("Failed to remove existing report file")?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to create report database {}", path.display()))?;
    conn.execute_batch(SCHEMA)
        .context("Failed to create report schema")?;
    Ok(conn)
}

/// Label stored with every row of a comparison: "source -> target".
pub fn comparison_label(result: &ComparisonResult<'_>) -> String {
    format!("{} -> {}", result.source_name, result.target_name)
}

pub fn write_comparison(conn: &mut Connection, result: &ComparisonResult<'_>) -> Result<()> {
    let label = comparison_label(result);
    let total = result.matches.len() + result.missing_tracks.len() + result.skipped.len();
    let pb = create_progress_bar(total as u64, &format!("Writing {}", label));

    for chunk in result.matches.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO matches (comparison, source_index, source_title, source_artist,
                                      target_index, target_title, target_artist, confidence, match_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for m in chunk {
                stmt.execute(params![
                    label,
                    m.source_index as i64,
                    m.source_track.title,
                    m.source_track.artist,
                    m.target_index as i64,
                    m.target_track.title,
                    m.target_track.artist,
                    m.confidence,
                    m.match_type.as_str(),
                ])?;
                pb.inc(1);
            }
        }
        tx.commit()?;
    }

    let unmatched = result
        .missing_tracks
        .iter()
        .map(|t| (*t, false))
        .chain(result.skipped.iter().map(|t| (*t, true)))
        .collect::<Vec<(&Track, bool)>>();

    for chunk in unmatched.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO missing (comparison, title, artist, album, duration_sec, isrc, skipped)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (track, skipped) in chunk {
                stmt.execute(params![
                    label,
                    track.title,
                    track.artist,
                    track.album,
                    track.duration,
                    track.isrc,
                    skipped,
                ])?;
                pb.inc(1);
            }
        }
        tx.commit()?;
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO near_misses (comparison, source_index, source_title, source_artist,
                                      target_index, target_title, target_artist, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for n in &result.near_misses {
            stmt.execute(params![
                label,
                n.source_index as i64,
                n.source_track.title,
                n.source_track.artist,
                n.target_index as i64,
                n.candidate.title,
                n.candidate.artist,
                n.confidence,
            ])?;
        }
    }
    tx.commit()?;

    pb.finish_with_message(format!("Wrote {}", label));
    info!(
        "Report: {} matches, {} missing, {} near misses for {}",
        result.matches.len(),
        result.missing_tracks.len(),
        result.near_misses.len(),
        label
    );
    Ok(())
}

pub fn write_duplicates(conn: &mut Connection, report: &DuplicateReport<'_>) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut group_stmt = tx.prepare_cached(
            "INSERT INTO duplicate_groups (collection, signature, size, confidence, review_needed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut member_stmt = tx.prepare_cached(
            "INSERT INTO duplicate_members (group_id, rank, position, title, artist, duration_sec, disposition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for group in &report.groups {
            group_stmt.execute(params![
                report.collection,
                group.signature,
                group.duplicate_count() as i64,
                group.confidence,
                group.review_needed,
            ])?;
            let group_id = tx.last_insert_rowid();

            for (rank, member) in group.ranked.iter().enumerate() {
                member_stmt.execute(params![
                    group_id,
                    rank as i64,
                    member.position as i64,
                    member.track.title,
                    member.track.artist,
                    member.track.duration,
                    member.disposition.as_str(),
                ])?;
            }
        }
    }
    tx.commit()?;

    info!(
        "Report: {} duplicate groups ({} tracks to remove) for '{}'",
        report.groups.len(),
        report.removal_count(),
        report.collection
    );
    Ok(())
}

/// Run ANALYZE so report queries get planner statistics.
pub fn finish_report(conn: &Connection) -> Result<()> {
    conn.execute_batch("ANALYZE;")?;
    Ok(())
}
