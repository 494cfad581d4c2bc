//! Run telemetry: append-only event log and a human-readable run summary.
//!
//! Both files live in the output directory next to the documents they
//! describe and are stamped with the run's start time. Every write opens the
//! file in append mode and flushes before returning, so a crash mid-batch
//! loses at most the entry being written. Telemetry failures degrade to
//! `tracing` warnings; they never take down a run.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::pipeline::RunStatus;

/// Timestamp format for entries inside the files.
const ENTRY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format for file names and the summary header.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Reason written when a failed run recorded no cause.
const NO_REASON: &str = "No specific reason logged.";

/// Event severity for the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    /// A completed retrieval; kept distinct from `Info` so success lines are
    /// easy to grep out of the event log.
    Success,
    Warning,
    Error,
    /// Unexpected failures, like a panicking batch item.
    Critical,
}

impl Severity {
    /// Uppercase form written to the event log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event in the append-only run log.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Local time the event was recorded.
    pub at: DateTime<Local>,
    /// The identifier the event belongs to, or a synthetic batch marker.
    pub identifier: String,
    pub severity: Severity,
    pub message: String,
}

impl LogEvent {
    fn log_line(&self) -> String {
        format!(
            "[{}] Identifier: {} | Status: {} | Message: {}\n",
            self.at.format(ENTRY_TIMESTAMP_FORMAT),
            self.identifier,
            self.severity,
            self.message
        )
    }
}

/// Writes the event log and run summary for one run.
///
/// Created once per run; the pipeline records events through it as retrieval
/// progresses and appends one summary block per identifier at the end.
#[derive(Debug)]
pub struct RunReporter {
    log_path: PathBuf,
    summary_path: PathBuf,
}

impl RunReporter {
    /// Creates the telemetry files in `output_dir` with names stamped from
    /// the current local time, and writes the summary header.
    ///
    /// The event log itself is created lazily on the first write, matching
    /// append semantics.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the summary header cannot be written.
    pub fn create(output_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let output_dir = output_dir.as_ref();
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let log_path = output_dir.join(format!("download_log_{stamp}.txt"));
        let summary_path = output_dir.join(format!("download_summary_{stamp}.txt"));

        std::fs::write(&summary_path, format!("--- Download Summary ({stamp}) ---\n\n"))?;
        info!(
            log = %log_path.display(),
            summary = %summary_path.display(),
            "Telemetry files initialized"
        );

        Ok(Self {
            log_path,
            summary_path,
        })
    }

    /// Path of the event log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Path of the run summary file.
    #[must_use]
    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Appends one event line to the log and mirrors it to the `tracing`
    /// subscriber at a mapped level.
    pub fn record(&self, identifier: &str, severity: Severity, message: &str) {
        let event = LogEvent {
            at: Local::now(),
            identifier: identifier.to_string(),
            severity,
            message: message.to_string(),
        };
        if let Err(err) = append(&self.log_path, &event.log_line()) {
            warn!(
                path = %self.log_path.display(),
                error = %err,
                "Could not append to the event log"
            );
        }

        match severity {
            Severity::Debug => debug!(identifier, "{message}"),
            Severity::Info | Severity::Success => info!(identifier, "{message}"),
            Severity::Warning => warn!(identifier, "{message}"),
            Severity::Error | Severity::Critical => error!(identifier, "{message}"),
        }
    }

    /// Appends one summary block for a finished identifier. Failed runs get
    /// a reason line carrying only the first cause; the full cause chain
    /// stays in the event log.
    pub fn summarize(&self, identifier: &str, status: RunStatus, message: &str) {
        let binary = if status.is_success() {
            "Success"
        } else {
            "Failure"
        };
        let mut block = format!("Identifier: {identifier} | Status: {binary}\n");
        if !status.is_success() {
            block.push_str(&format!("  -> Reason: {}\n", first_cause(message)));
        }
        block.push_str("---\n");

        if let Err(err) = append(&self.summary_path, &block) {
            warn!(
                path = %self.summary_path.display(),
                error = %err,
                "Could not append to the run summary"
            );
        }
    }
}

/// First segment of an accumulated cause chain, or a placeholder when the
/// run failed without recording one.
fn first_cause(message: &str) -> &str {
    let first = message.split('|').next().unwrap_or_default().trim();
    if first.is_empty() { NO_REASON } else { first }
}

fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    // ==================== Format Tests ====================

    #[test]
    fn test_log_line_format() {
        let event = LogEvent {
            at: Local.with_ymd_and_hms(2024, 3, 1, 13, 5, 9).unwrap(),
            identifier: "10.1000/xyz".to_string(),
            severity: Severity::Warning,
            message: "direct fetch failed".to_string(),
        };
        assert_eq!(
            event.log_line(),
            "[2024-03-01 13:05:09] Identifier: 10.1000/xyz | Status: WARNING | Message: direct fetch failed\n"
        );
    }

    #[test]
    fn test_severity_uppercase_forms() {
        assert_eq!(Severity::Debug.to_string(), "DEBUG");
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Success.to_string(), "SUCCESS");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_first_cause_takes_first_segment() {
        assert_eq!(
            first_cause("no direct link | fallback failed: boom"),
            "no direct link"
        );
        assert_eq!(first_cause("single cause"), "single cause");
        assert_eq!(first_cause("  padded  | rest"), "padded");
    }

    #[test]
    fn test_first_cause_placeholder_when_empty() {
        assert_eq!(first_cause(""), NO_REASON);
        assert_eq!(first_cause("   "), NO_REASON);
        assert_eq!(first_cause(" | trailing cause"), NO_REASON);
    }

    // ==================== File Tests ====================

    #[test]
    fn test_create_writes_summary_header_and_stamped_names() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();

        let log_name = reporter.log_path().file_name().unwrap().to_str().unwrap();
        let summary_name = reporter
            .summary_path()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap();
        assert!(log_name.starts_with("download_log_") && log_name.ends_with(".txt"));
        assert!(summary_name.starts_with("download_summary_") && summary_name.ends_with(".txt"));

        let header = read(reporter.summary_path());
        assert!(header.starts_with("--- Download Summary ("));
        assert!(header.ends_with(") ---\n\n"));
        // The event log only appears on the first write.
        assert!(!reporter.log_path().exists());
    }

    #[test]
    fn test_record_appends_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();

        reporter.record("10.1000/xyz", Severity::Info, "Starting retrieval");
        reporter.record("10.1000/xyz", Severity::Success, "Stored document");

        let log = read(reporter.log_path());
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Identifier: 10.1000/xyz | Status: INFO | Message: Starting retrieval"));
        assert!(lines[1].contains("Status: SUCCESS | Message: Stored document"));
    }

    #[test]
    fn test_summarize_success_block() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();

        reporter.summarize("10.1000/xyz", RunStatus::Success, "");

        let summary = read(reporter.summary_path());
        assert!(summary.ends_with("Identifier: 10.1000/xyz | Status: Success\n---\n"));
        assert!(!summary.contains("Reason"));
    }

    #[test]
    fn test_summarize_failure_block_carries_first_cause_only() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();

        reporter.summarize(
            "10.1000/xyz",
            RunStatus::FailureFallbackError,
            "no direct link found | fallback fetch failed: HTTP 503",
        );

        let summary = read(reporter.summary_path());
        assert!(summary.ends_with(
            "Identifier: 10.1000/xyz | Status: Failure\n  -> Reason: no direct link found\n---\n"
        ));
        assert!(!summary.contains("HTTP 503"));
    }

    #[test]
    fn test_summarize_failure_without_message_uses_placeholder() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();

        reporter.summarize("10.1000/xyz", RunStatus::FailureMetadataLookup, "");

        let summary = read(reporter.summary_path());
        assert!(summary.contains(&format!("  -> Reason: {NO_REASON}\n")));
    }

    #[test]
    fn test_write_failure_degrades_without_panic() {
        let dir = TempDir::new().unwrap();
        let reporter = RunReporter::create(dir.path()).unwrap();
        dir.close().unwrap();

        // Both targets are gone; the reporter must only warn.
        reporter.record("10.1000/xyz", Severity::Info, "into the void");
        reporter.summarize("10.1000/xyz", RunStatus::Success, "");
    }
}
