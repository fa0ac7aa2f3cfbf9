//! Run summary and overall status.

use std::io::{self, Write};

use crate::contract::ProcessResult;

/// Overall health of a batch, as seen by the invoking process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every job succeeded, or there were no jobs.
    Success,
    /// Some jobs succeeded, some failed.
    PartialFailure,
    /// There were jobs and all of them failed.
    CompleteFailure,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::CompleteFailure => 1,
            RunStatus::PartialFailure => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[ProcessResult]) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.failed == 0 {
            RunStatus::Success
        } else if self.successful == 0 {
            RunStatus::CompleteFailure
        } else {
            RunStatus::PartialFailure
        }
    }
}

/// Prints the `=== Summary ===` block. Failures are itemized only when
/// `verbose`, sorted by source path so the output does not depend on the
/// order in which workers finished.
pub fn write_summary<W: Write>(
    out: &mut W,
    results: &[ProcessResult],
    verbose: bool,
) -> io::Result<Summary> {
    let summary = Summary::from_results(results);

    writeln!(out)?;
    writeln!(out, "=== Summary ===")?;
    writeln!(out, "Total files: {}", summary.total)?;
    writeln!(out, "Successful: {}", summary.successful)?;
    writeln!(out, "Failed: {}", summary.failed)?;

    if summary.failed > 0 && verbose {
        let mut failures: Vec<&ProcessResult> = results.iter().filter(|r| !r.is_success()).collect();
        failures.sort_by(|a, b| a.source_path.cmp(&b.source_path));

        writeln!(out)?;
        writeln!(out, "Failed files:")?;
        for result in failures {
            if let Some(error) = &result.error {
                writeln!(out, "  - {}: {}", result.file_name(), error)?;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ProcessError;
    use std::time::Duration;

    fn ok(name: &str) -> ProcessResult {
        ProcessResult::from_outcome(
            format!("books/{name}.txt").into(),
            Ok(format!("books/{name}.mp3").into()),
            Duration::from_millis(10),
        )
    }

    fn failed(name: &str, status: u16) -> ProcessResult {
        ProcessResult::from_outcome(
            format!("books/{name}.txt").into(),
            Err(ProcessError::Server {
                status,
                body: "nope".into(),
            }),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn status_follows_success_and_failure_counts() {
        assert_eq!(Summary::from_results(&[]).status(), RunStatus::Success);
        assert_eq!(Summary::from_results(&[ok("a"), ok("b")]).status(), RunStatus::Success);
        assert_eq!(
            Summary::from_results(&[ok("a"), failed("b", 500)]).status(),
            RunStatus::PartialFailure
        );
        assert_eq!(
            Summary::from_results(&[failed("a", 500), failed("b", 502)]).status(),
            RunStatus::CompleteFailure
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::CompleteFailure.exit_code(), 1);
        assert_eq!(RunStatus::PartialFailure.exit_code(), 2);
    }

    #[test]
    fn quiet_summary_only_prints_counts() {
        let mut out = Vec::new();
        let summary = write_summary(&mut out, &[ok("a"), failed("b", 500)], false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(summary.total, 2);
        assert!(text.contains("Total files: 2"));
        assert!(text.contains("Successful: 1"));
        assert!(text.contains("Failed: 1"));
        assert!(!text.contains("Failed files:"));
    }

    #[test]
    fn verbose_summary_itemizes_failures_sorted_by_path() {
        let mut out = Vec::new();
        write_summary(&mut out, &[failed("zeta", 500), ok("a"), failed("alpha", 503)], true).unwrap();
        let text = String::from_utf8(out).unwrap();

        let alpha = text.find("  - alpha.txt: server returned status 503: nope").unwrap();
        let zeta = text.find("  - zeta.txt: server returned status 500: nope").unwrap();
        assert!(alpha < zeta);
        assert!(!text.contains("  - a.txt:"));
    }
}
