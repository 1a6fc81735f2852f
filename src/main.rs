use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use trackmatch::compare::Comparator;
use trackmatch::config::{MatchOptions, HIGH_CONFIDENCE};
use trackmatch::dedup::DuplicateReport;
use trackmatch::models::{Collection, ComparisonResult};
use trackmatch::normalize::{NormalizationCache, Normalizer};
use trackmatch::progress::{
    create_progress_bar, create_spinner, format_duration, log_progress, set_log_only, Progress,
};
use trackmatch::report::{finish_report, open_report, write_comparison, write_duplicates};
use trackmatch::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "trackmatch")]
#[command(about = "Match music collections against each other and find duplicates")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Options file (JSON); flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise thresholds and never search outside shared artists
    #[arg(long, global = true)]
    strict: bool,

    #[arg(long, global = true)]
    no_duration: bool,

    #[arg(long, global = true)]
    album: bool,

    /// Fuzzy-accept threshold (0.0 to 1.0)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[arg(long, global = true)]
    sequential: bool,

    #[arg(long, default_value = "0", global = true)]
    workers: usize,

    /// Normalization cache capacity per table (0 disables the cache)
    #[arg(long, default_value = "10000", global = true)]
    cache_size: usize,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    /// SQLite report output (file name must contain "report")
    #[arg(long, global = true)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Compare a source collection against a target collection
    Compare {
        source: PathBuf,
        target: PathBuf,

        /// Write comparison stats as JSON (file name must contain "stats")
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Compare every pair of collections and report overlap
    Analyze {
        #[arg(num_args = 2.., required = true)]
        collections: Vec<PathBuf>,
    },
    /// Find duplicate tracks within one collection
    Dedup { collection: PathBuf },
}

fn load_options(args: &Args) -> Result<MatchOptions> {
    let mut options = match &args.config {
        Some(path) => MatchOptions::from_json_file(path)?,
        None => MatchOptions::default(),
    };
    if args.strict {
        options.strict_mode = true;
    }
    if args.no_duration {
        options.enable_duration = false;
    }
    if args.album {
        options.enable_album = true;
    }
    if args.threshold.is_some() {
        options.similarity_threshold = args.threshold;
    }
    if args.sequential {
        options.parallel = false;
    }
    options.validate().context("Invalid matching options")?;
    Ok(options)
}

fn load_collection(path: &Path) -> Result<Collection> {
    let spinner = create_spinner(&format!("Loading {}", path.display()));
    let collection = Collection::from_json_file(path)?;
    spinner.finish_with_message(format!(
        "Loaded '{}': {} tracks ({} music)",
        collection.name,
        collection.len(),
        collection.music_count()
    ));
    Ok(collection)
}

fn print_comparison(result: &ComparisonResult<'_>) {
    let stats = &result.stats;
    println!("\n{:=<60}", "");
    println!("{} -> {}", result.source_name, result.target_name);
    println!("  Source: {} tracks ({} music)", result.source_total, result.source_music);
    println!("  Target: {} tracks ({} music)", result.target_total, result.target_music);
    println!(
        "  Matched: {} (isrc {}, exact {}, fuzzy {})",
        stats.total_matches, stats.isrc_matches, stats.exact_matches, stats.fuzzy_matches
    );
    println!("  Missing: {} ({} near misses)", stats.missing_tracks, stats.near_misses);
    println!("  Skipped: {}", stats.skipped_tracks);
    println!("  Match rate: {:.1}%", stats.match_rate);
    println!("  Avg confidence: {:.3}", stats.average_confidence);
    println!(
        "  Needs review: {} below {:.2}",
        result.needs_review(HIGH_CONFIDENCE).len(),
        HIGH_CONFIDENCE
    );
    let shared = result.shared_targets();
    if !shared.is_empty() {
        println!("  Targets claimed more than once: {}", shared.len());
    }
    println!("{:=<60}", "");
}

fn run_compare(
    comparator: &Comparator,
    source_path: &Path,
    target_path: &Path,
    stats_path: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<()> {
    let source = load_collection(source_path)?;
    let target = load_collection(target_path)?;

    let pb = create_progress_bar(source.music_count() as u64, "Matching");
    let on_progress = |p: &Progress| -> Result<()> {
        pb.set_position(p.current as u64);
        log_progress(p);
        Ok(())
    };
    let result = comparator.compare(&source, &target, Some(&on_progress));
    pb.finish_with_message(format!("Matched {} tracks", result.stats.total_matches));

    print_comparison(&result);
    result.stats.log_summary("compare");

    if let Some(path) = stats_path {
        validate_output_path(path, "stats", &[source_path, target_path])?;
        result.stats.write_to_file(path)?;
        info!("Wrote stats to {}", path.display());
    }

    if let Some(path) = report_path {
        let mut conn = open_report(path, &[source_path, target_path])?;
        write_comparison(&mut conn, &result)?;
        finish_report(&conn)?;
    }
    Ok(())
}

fn run_analyze(comparator: &Comparator, paths: &[PathBuf], report_path: Option<&Path>) -> Result<()> {
    let collections = paths
        .iter()
        .map(|p| load_collection(p))
        .collect::<Result<Vec<_>>>()?;

    let pb = create_progress_bar(0, "Matching");
    let on_progress = |p: &Progress| -> Result<()> {
        pb.set_length(p.total as u64);
        pb.set_position(p.current as u64);
        pb.set_message(p.message.clone());
        log_progress(p);
        Ok(())
    };
    let analysis = comparator.analyze(&collections, Some(&on_progress));
    pb.finish_with_message(format!("Compared {} pairs", analysis.pairwise.len()));

    for pair in &analysis.pairwise {
        print_comparison(&pair.result);
    }

    println!("\n{:=<60}", "");
    println!("Analysis of {} collections", analysis.collections.len());
    for summary in &analysis.collections {
        println!("  {}: {} tracks ({} music)", summary.name, summary.total, summary.music);
    }
    println!("  Universal tracks: {}", analysis.universal_tracks.len());
    for track in analysis.universal_tracks.iter().take(10) {
        println!("    {}", track);
    }
    println!(
        "  Universal artists: {} of {}",
        analysis.artists.universal_artists.len(),
        analysis.artists.total_unique_artists
    );
    for unique in &analysis.unique_tracks {
        println!("  Only in {}: {}", unique.collection, unique.tracks.len());
    }
    println!("{:=<60}", "");

    if let Some(path) = report_path {
        let sources: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let mut conn = open_report(path, &sources)?;
        for pair in &analysis.pairwise {
            write_comparison(&mut conn, &pair.result)?;
        }
        finish_report(&conn)?;
    }
    Ok(())
}

fn run_dedup(comparator: &Comparator, path: &Path, report_path: Option<&Path>) -> Result<()> {
    let collection = load_collection(path)?;
    let report = DuplicateReport::build(&collection, comparator.normalizer());

    println!("\n{:=<60}", "");
    println!("Duplicates in '{}'", report.collection);
    println!("  Groups: {}", report.groups.len());
    println!("  Auto-removable groups: {}", report.auto_removable().count());
    println!("  Groups needing review: {}", report.needs_review().count());
    println!("  Tracks to remove: {}", report.removal_count());
    for group in report.groups.iter().take(20) {
        println!(
            "    [{:.1}{}] keep {} (+{} copies)",
            group.confidence,
            if group.review_needed { ", review" } else { "" },
            group.keeper(),
            group.tracks_to_remove.len()
        );
    }
    println!("{:=<60}", "");

    if let Some(report_path) = report_path {
        let mut conn = open_report(report_path, &[path])?;
        write_duplicates(&mut conn, &report)?;
        finish_report(&conn)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let options = load_options(&args)?;
    let normalizer = if args.cache_size > 0 {
        Normalizer::with_cache(Arc::new(NormalizationCache::new(args.cache_size)))
    } else {
        Normalizer::new()
    };
    let comparator = Comparator::with_normalizer(options, normalizer);

    let start = Instant::now();
    let report = args.report.as_deref();

    match &args.command {
        Command::Compare {
            source,
            target,
            stats,
        } => run_compare(&comparator, source, target, stats.as_deref(), report)?,
        Command::Analyze { collections } => run_analyze(&comparator, collections, report)?,
        Command::Dedup { collection } => run_dedup(&comparator, collection, report)?,
    }

    if let Some(cache) = comparator.normalizer().cache() {
        let stats = cache.stats();
        info!(
            "Normalization cache: {} hits, {} misses, {} entries",
            stats.hits, stats.misses, stats.entries
        );
    }
    info!("Done in {}", format_duration(start.elapsed()));
    Ok(())
}
