use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use postgres_db::packages::PackageDescriptor;

use crate::applier::{apply_operations, FrameworkStore};
use crate::archive::{inspect_package, PackageSource};
use crate::checkpoint::CheckpointStore;
use crate::differ::compute_operations;
use crate::reconcile_error::{CheckpointError, ReconcileError};
use crate::report::ReconciliationReport;

/// Drives a single package from its checkpoint (or from scratch) to a terminal report.
pub struct Reconciler {
    source: Arc<dyn PackageSource>,
    checkpoints: CheckpointStore,
    tmp_dir: PathBuf,
    dry_run: bool,
}

impl Reconciler {
    /// Archives are downloaded into `tmp` under the checkpoint directory.
    pub fn new(
        source: Arc<dyn PackageSource>,
        checkpoints: CheckpointStore,
        dry_run: bool,
    ) -> Result<Reconciler, CheckpointError> {
        let tmp_dir = checkpoints.dir().join("tmp");
        std::fs::create_dir_all(&tmp_dir)?;
        Ok(Reconciler {
            source,
            checkpoints,
            tmp_dir,
            dry_run,
        })
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Loads the package's checkpoint, keeping it only if it belongs to the same
    /// archive and already carries a diff.
    fn resume(
        &self,
        package: &PackageDescriptor,
    ) -> Result<Option<ReconciliationReport>, ReconcileError> {
        let report = match self.checkpoints.load(package) {
            Ok(report) => report,
            Err(CheckpointError::Json(e)) => {
                warn!(
                    "Discarding unreadable checkpoint for {}@{}: {}",
                    package.id, package.version, e
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(report.and_then(|report| {
            if report.hash != package.hash {
                info!(
                    "Discarding stale checkpoint for {}@{} (hash {} is now {})",
                    package.id, package.version, report.hash, package.hash
                );
                None
            } else if !report.has_diff() {
                debug!(
                    "Checkpoint for {}@{} has no diff, inspecting again",
                    package.id, package.version
                );
                None
            } else {
                Some(report)
            }
        }))
    }

    /// A new report with the diff between the archive and the store, or a failed
    /// report if either could not be read.
    async fn fresh(
        &self,
        package: &PackageDescriptor,
        store: &mut (dyn FrameworkStore + Send),
    ) -> ReconciliationReport {
        let mut report = ReconciliationReport::new(package);

        let declared = match inspect_package(self.source.as_ref(), package, &self.tmp_dir).await {
            Ok(declared) => declared,
            Err(e) => {
                report.fail(e);
                return report;
            }
        };
        let recorded = match store.recorded_frameworks(package.key) {
            Ok(recorded) => recorded,
            Err(e) => {
                report.fail(e);
                return report;
            }
        };

        report.operations = compute_operations(&declared, &recorded);
        report.declared_frameworks = Some(declared);
        report.recorded_frameworks = Some(recorded);
        report
    }

    /// Reconciles one package and checkpoints the outcome, whatever it is. Errors
    /// are returned only when no report could be produced or saved.
    pub async fn reconcile(
        &self,
        package: &PackageDescriptor,
        store: &mut (dyn FrameworkStore + Send),
    ) -> Result<ReconciliationReport, ReconcileError> {
        let mut report = match self.resume(package)? {
            Some(report) => report,
            None => self.fresh(package, store).await,
        };

        if report.has_diff() {
            apply_operations(&mut report, store, self.dry_run);
        }

        if !self.dry_run {
            self.checkpoints.save(&report)?;
        }
        Ok(report)
    }

    /// Records a package whose reconciliation broke off unexpectedly as an error,
    /// checkpointing it like any other outcome.
    pub fn record_failure(
        &self,
        package: &PackageDescriptor,
        error: impl fmt::Display,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let mut report = ReconciliationReport::new(package);
        report.fail(error);
        if !self.dry_run {
            self.checkpoints.save(&report)?;
        }
        Ok(report)
    }
}
