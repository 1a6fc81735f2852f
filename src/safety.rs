//! Safety utilities to prevent accidental file deletion.
//!
//! Report files are removed and recreated on every run. These checks make
//! sure the path being cleared is a report and never one of the input
//! collections.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions of collection inputs; a report never uses them
const INPUT_EXTENSIONS: [&str; 2] = ["json", "jsonl"];

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g., "report", "stats")
/// - Output cannot be the same file as any of the provided source paths
///
/// # Arguments
/// * `output` - The output path that will be created/overwritten
/// * `required_pattern` - Pattern that must appear in the output filename
/// * `source_paths` - Slice of source paths that must not match the output
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        if same_file(output, source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

/// Like `validate_output_path`, and additionally refuses collection-input
/// extensions. Used for the SQLite report.
pub fn validate_report_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    validate_output_path(output, "report", source_paths)?;
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if INPUT_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: report '{}' uses a collection input extension '.{}'",
            output.display(),
            extension
        );
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_report_output() {
        let output = PathBuf::from("/tmp/library-report.sqlite3");
        let source = PathBuf::from("/data/library.json");
        assert!(validate_report_path(&output, &[&source]).is_ok());
    }

    #[test]
    fn test_valid_stats_output() {
        let output = PathBuf::from("/tmp/compare-stats.json");
        let source = PathBuf::from("/data/library.json");
        assert!(validate_output_path(&output, "stats", &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let output = PathBuf::from("/tmp/output.sqlite3");
        let source = PathBuf::from("/data/source.json");
        let result = validate_report_path(&output, &[&source]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must contain 'report'"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/report-library.sqlite3");
        let result = validate_report_path(&path, &[&path]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_same_file_through_different_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report-input.sqlite3");
        std::fs::write(&source, b"").unwrap();
        let aliased = dir.path().join(".").join("report-input.sqlite3");
        assert!(validate_report_path(&aliased, &[&source]).is_err());
    }

    #[test]
    fn test_input_extension_blocked() {
        let output = PathBuf::from("/tmp/report.json");
        let source = PathBuf::from("/data/other.json");
        assert!(validate_report_path(&output, &[&source]).is_err());
    }
}
