//! CLI output formatting for batch runs.
//!
//! Three blocks are printed around a batch: a start banner, the result tree,
//! and a summary.
//!
//! ```text
//! Starting conversion
//!     Source directory: markdown
//!     Output directory: html
//!     Files to process: 3
//!
//! Conversion Status
//! ├── Completed
//! │   ├── ✓ index.md
//! │   └── ✓ guide/setup.md
//! └── Errors
//!     └── ✗ broken.md - broken.md is not valid UTF-8: ...
//!
//! Conversion Summary
//!     Total files processed: 3
//!     Successfully converted: 2
//!     Failed to convert: 1
//!
//! Some files failed to convert
//! ```
//!
//! Every block has a pure `format_*` function returning lines, for tests,
//! and a `print_*` wrapper that writes them to stdout.

use crate::convert::{BatchReport, ConversionStatus};
use std::path::Path;

/// Branch prefix for the `index`-th of `len` siblings.
fn branch(index: usize, len: usize) -> &'static str {
    if index + 1 == len { "└── " } else { "├── " }
}

/// Continuation prefix under a branch.
fn continuation(is_last: bool) -> &'static str {
    if is_last { "    " } else { "│   " }
}

pub fn format_start(input: &Path, output: &Path, total: usize) -> Vec<String> {
    vec![
        "Starting conversion".to_string(),
        format!("    Source directory: {}", input.display()),
        format!("    Output directory: {}", output.display()),
        format!("    Files to process: {}", total),
    ]
}

pub fn print_start(input: &Path, output: &Path, total: usize) {
    for line in format_start(input, output, total) {
        println!("{}", line);
    }
}

/// Result tree with a Completed and an Errors branch, in discovery order.
pub fn format_result_tree(report: &BatchReport) -> Vec<String> {
    let completed: Vec<String> = report
        .outcomes
        .iter()
        .filter(|o| o.result.is_ok())
        .map(|o| format!("✓ {}", o.relative.display()))
        .collect();
    let failed: Vec<String> = report
        .outcomes
        .iter()
        .filter_map(|o| {
            o.result
                .as_ref()
                .err()
                .map(|e| format!("✗ {} - {}", o.relative.display(), e))
        })
        .collect();

    let mut lines = vec!["Conversion Status".to_string()];
    let sections = [("Completed", completed), ("Errors", failed)];
    for (i, (label, entries)) in sections.iter().enumerate() {
        let last_section = i + 1 == sections.len();
        lines.push(format!("{}{}", branch(i, sections.len()), label));
        for (j, entry) in entries.iter().enumerate() {
            lines.push(format!(
                "{}{}{}",
                continuation(last_section),
                branch(j, entries.len()),
                entry
            ));
        }
    }
    lines
}

pub fn format_summary(status: &ConversionStatus) -> Vec<String> {
    let verdict = if status.is_success() {
        "All files converted successfully"
    } else {
        "Some files failed to convert"
    };
    vec![
        "Conversion Summary".to_string(),
        format!("    Total files processed: {}", status.total),
        format!("    Successfully converted: {}", status.success),
        format!("    Failed to convert: {}", status.failed()),
        String::new(),
        verdict.to_string(),
    ]
}

/// Print the result tree and summary to stdout.
pub fn print_report(report: &BatchReport) {
    println!();
    for line in format_result_tree(report) {
        println!("{}", line);
    }
    println!();
    for line in format_summary(&report.status) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConvertError, DocumentOutcome};
    use std::path::PathBuf;

    fn outcome(rel: &str, ok: bool) -> DocumentOutcome {
        let source = PathBuf::from("in").join(rel);
        let result = if ok {
            Ok(PathBuf::from("out").join(rel).with_extension("html"))
        } else {
            Err(ConvertError::OutsideRoot {
                path: source.clone(),
                root: PathBuf::from("elsewhere"),
            })
        };
        DocumentOutcome {
            source,
            relative: PathBuf::from(rel),
            result,
        }
    }

    #[test]
    fn start_banner_lists_dirs_and_count() {
        let lines = format_start(Path::new("markdown"), Path::new("html"), 3);
        assert_eq!(lines[1], "    Source directory: markdown");
        assert_eq!(lines[2], "    Output directory: html");
        assert_eq!(lines[3], "    Files to process: 3");
    }

    #[test]
    fn result_tree_splits_completed_and_errors() {
        let report = BatchReport {
            status: ConversionStatus::default(),
            outcomes: vec![outcome("a.md", true), outcome("b.md", false), outcome("c.md", true)],
        };
        let lines = format_result_tree(&report);
        assert_eq!(
            lines,
            vec![
                "Conversion Status".to_string(),
                "├── Completed".to_string(),
                "│   ├── ✓ a.md".to_string(),
                "│   └── ✓ c.md".to_string(),
                "└── Errors".to_string(),
                "    └── ✗ b.md - in/b.md is not inside elsewhere".to_string(),
            ]
        );
    }

    #[test]
    fn result_tree_with_no_errors_has_empty_branch() {
        let report = BatchReport {
            status: ConversionStatus::default(),
            outcomes: vec![outcome("a.md", true)],
        };
        let lines = format_result_tree(&report);
        assert_eq!(lines.last().map(String::as_str), Some("└── Errors"));
    }

    #[test]
    fn summary_reports_counts_and_verdict() {
        let mut status = ConversionStatus {
            total: 2,
            success: 1,
            ..ConversionStatus::default()
        };
        status.errors.insert(PathBuf::from("b.md"), "bad".to_string());
        let lines = format_summary(&status);
        assert!(lines.contains(&"    Failed to convert: 1".to_string()));
        assert_eq!(lines.last().unwrap(), "Some files failed to convert");

        let ok = ConversionStatus {
            total: 1,
            success: 1,
            ..ConversionStatus::default()
        };
        assert_eq!(
            format_summary(&ok).last().unwrap(),
            "All files converted successfully"
        );
    }
}
