use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::SecondsFormat;
use postgres_db::packages::PackageDescriptor;

use crate::report::{ReconciliationReport, ReportState};

/// Counts completed packages across workers.
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Progress {
        Progress {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    /// Marks one more package as done and returns its 1-based completion index.
    pub fn complete(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// `[0000042/0001000 004.20%]`
    pub fn prefix(&self, index: usize) -> String {
        let percent = if self.total == 0 {
            100.0
        } else {
            index as f64 * 100.0 / self.total as f64
        };
        format!("[{:07}/{:07} {:06.2}%]", index, self.total, percent)
    }

    pub fn report_line(&self, index: usize, report: &ReconciliationReport) -> String {
        format!(
            "{} {:<width$} Package: {}@{} (created {})",
            self.prefix(index),
            report.state,
            report.id,
            report.version,
            report.created.to_rfc3339_opts(SecondsFormat::Secs, true),
            width = ReportState::label_width()
        )
    }

    pub fn error_line(
        &self,
        index: usize,
        package: &PackageDescriptor,
        error: &dyn fmt::Display,
    ) -> String {
        format!(
            "{} Error for Package: {}@{}: {}",
            self.prefix(index),
            package.id,
            package.version,
            error
        )
    }
}

/// How many packages ended in each state. Packages that produced no report at
/// all are counted as skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub resolved: usize,
    pub unresolved: usize,
    pub error: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, state: ReportState) {
        match state {
            ReportState::Resolved => self.resolved += 1,
            ReportState::Unresolved => self.unresolved += 1,
            ReportState::Error => self.error += 1,
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
        self.error += other.error;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.resolved + self.unresolved + self.error + self.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} packages: {} Resolved, {} Unresolved, {} Error, {} Skipped",
            self.total(),
            self.resolved,
            self.unresolved,
            self.error,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;

    #[test]
    fn test_report_line() {
        let progress = Progress::new(1000);
        let mut report = ReconciliationReport::new(&descriptor(1, "Foo", "1.0.0", "abc", 0));
        report.derive_state();
        assert_eq!(
            progress.report_line(42, &report),
            "[0000042/0001000 004.20%] Resolved   Package: Foo@1.0.0 (created 2014-01-01T00:00:00Z)"
        );
    }

    #[test]
    fn test_error_line() {
        let progress = Progress::new(3);
        let package = descriptor(1, "Foo", "1.0.0", "abc", 0);
        assert_eq!(
            progress.error_line(3, &package, &"boom"),
            "[0000003/0000003 100.00%] Error for Package: Foo@1.0.0: boom"
        );
    }

    #[test]
    fn test_complete_counts_from_one() {
        let progress = Progress::new(2);
        assert_eq!(progress.complete(), 1);
        assert_eq!(progress.complete(), 2);
        assert_eq!(progress.completed(), 2);
    }

    #[test]
    fn test_summary() {
        let mut a = RunSummary::default();
        a.record(ReportState::Resolved);
        a.record(ReportState::Error);
        let mut b = RunSummary::default();
        b.record(ReportState::Resolved);
        b.skipped += 1;
        a.merge(b);
        assert_eq!(
            a,
            RunSummary {
                resolved: 2,
                unresolved: 0,
                error: 1,
                skipped: 1
            }
        );
        assert_eq!(
            a.to_string(),
            "Processed 4 packages: 2 Resolved, 0 Unresolved, 1 Error, 1 Skipped"
        );
    }
}
