use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use postgres_db::packages::PackageDescriptor;

use crate::reconcile_error::CheckpointError;
use crate::report::ReconciliationReport;

/// Per-package JSON checkpoints in a work directory.
///
/// A checkpoint lives at `<dir>/<id>_<version>.json`. A checkpoint left behind
/// under the hash-qualified name `<dir>/<id>_<version>_<hash>.json` is promoted to
/// the primary name the first time the package is loaded, unless a primary
/// checkpoint already exists.
///
/// A read-only store never renames or writes anything; it still reads hash-qualified
/// checkpoints in place.
pub struct CheckpointStore {
    dir: PathBuf,
    read_only: bool,
}

fn not_found(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

impl CheckpointStore {
    pub fn open(dir: impl Into<PathBuf>, read_only: bool) -> Result<CheckpointStore, CheckpointError> {
        let dir = dir.into();
        if !read_only {
            fs::create_dir_all(&dir)?;
        }
        Ok(CheckpointStore { dir, read_only })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn primary_path(&self, id: &str, version: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", id, version))
    }

    /// The hash is used as written; only `/`, which base64 hashes may contain, is
    /// escaped as `%2F` to keep the name a single path segment.
    pub fn secondary_path(&self, id: &str, version: &str, hash: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.json", id, version, hash.replace('/', "%2F")))
    }

    /// Resolves which file holds the checkpoint for `package`, promoting a
    /// hash-qualified checkpoint to the primary name if needed.
    fn locate(&self, package: &PackageDescriptor) -> Result<Option<PathBuf>, CheckpointError> {
        let primary = self.primary_path(&package.id, &package.version);
        let secondary = self.secondary_path(&package.id, &package.version, &package.hash);

        match (primary.is_file(), secondary.is_file()) {
            (true, true) => {
                warn!(
                    "Both {} and {} exist, using the former",
                    primary.display(),
                    secondary.display()
                );
                Ok(Some(primary))
            }
            (true, false) => Ok(Some(primary)),
            (false, true) if self.read_only => Ok(Some(secondary)),
            (false, true) => {
                info!(
                    "Promoting checkpoint {} to {}",
                    secondary.display(),
                    primary.display()
                );
                fs::rename(&secondary, &primary)?;
                Ok(Some(primary))
            }
            (false, false) => Ok(None),
        }
    }

    /// Loads the checkpoint for `package`, or `None` if it was never checkpointed.
    pub fn load(
        &self,
        package: &PackageDescriptor,
    ) -> Result<Option<ReconciliationReport>, CheckpointError> {
        let path = match self.locate(package)? {
            Some(path) => path,
            None => return Ok(None),
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Overwrites the primary checkpoint of the report's package in full. The new
    /// contents are written to a temporary sibling and renamed into place.
    pub fn save(&self, report: &ReconciliationReport) -> Result<(), CheckpointError> {
        if self.read_only {
            return Ok(());
        }

        let path = self.primary_path(&report.id, &report.version);
        let mut tmp = tempfile::Builder::new()
            .prefix(".checkpoint")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, report)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportState;
    use crate::testing::descriptor;

    fn store(dir: &Path) -> CheckpointStore {
        CheckpointStore::open(dir, false).unwrap()
    }

    #[test]
    fn test_missing_checkpoint_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);
        assert_eq!(store(dir.path()).load(&package).unwrap(), None);
    }

    #[test]
    fn test_save_then_load_overwrites_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);

        let mut report = ReconciliationReport::new(&package);
        report.fail("first attempt");
        checkpoints.save(&report).unwrap();

        let mut report = ReconciliationReport::new(&package);
        report.derive_state();
        checkpoints.save(&report).unwrap();

        let loaded = checkpoints.load(&package).unwrap().unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.state, ReportState::Resolved);
        assert_eq!(loaded.error, None);
        assert!(dir.path().join("Foo_1.0.0.json").is_file());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_hash_qualified_checkpoint_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);

        let mut report = ReconciliationReport::new(&package);
        report.derive_state();
        let secondary = dir.path().join("Foo_1.0.0_abc.json");
        fs::write(&secondary, serde_json::to_string(&report).unwrap()).unwrap();

        let loaded = checkpoints.load(&package).unwrap().unwrap();
        assert_eq!(loaded, report);
        assert!(!secondary.exists());
        assert!(dir.path().join("Foo_1.0.0.json").is_file());
    }

    #[test]
    fn test_primary_wins_over_hash_qualified_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);

        let mut primary = ReconciliationReport::new(&package);
        primary.derive_state();
        checkpoints.save(&primary).unwrap();

        let mut secondary = ReconciliationReport::new(&package);
        secondary.fail("older");
        let secondary_path = checkpoints.secondary_path("Foo", "1.0.0", "abc");
        fs::write(&secondary_path, serde_json::to_string(&secondary).unwrap()).unwrap();

        assert_eq!(checkpoints.load(&package).unwrap().unwrap(), primary);
        assert!(secondary_path.is_file());
    }

    #[test]
    fn test_hash_is_kept_verbatim_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        assert_eq!(
            checkpoints.secondary_path("Foo", "1.0.0", "q1+Zx=="),
            dir.path().join("Foo_1.0.0_q1+Zx==.json")
        );
        assert_eq!(
            checkpoints.secondary_path("Foo", "1.0.0", "ab/c+d=="),
            dir.path().join("Foo_1.0.0_ab%2Fc+d==.json")
        );
    }

    #[test]
    fn test_base64_hash_checkpoint_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        let package = descriptor(1, "Foo", "1.0.0", "q1+Zx==", 1);

        let mut report = ReconciliationReport::new(&package);
        report.derive_state();
        let secondary = dir.path().join("Foo_1.0.0_q1+Zx==.json");
        fs::write(&secondary, serde_json::to_string(&report).unwrap()).unwrap();

        assert_eq!(checkpoints.load(&package).unwrap(), Some(report));
        assert!(!secondary.exists());
        assert!(dir.path().join("Foo_1.0.0.json").is_file());
    }

    #[test]
    fn test_read_only_store_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);

        let mut report = ReconciliationReport::new(&package);
        report.derive_state();
        let secondary = dir.path().join("Foo_1.0.0_abc.json");
        fs::write(&secondary, serde_json::to_string(&report).unwrap()).unwrap();

        let checkpoints = CheckpointStore::open(dir.path(), true).unwrap();
        assert_eq!(checkpoints.load(&package).unwrap(), Some(report.clone()));
        assert!(secondary.is_file());
        assert!(!dir.path().join("Foo_1.0.0.json").exists());

        checkpoints.save(&report).unwrap();
        assert!(!dir.path().join("Foo_1.0.0.json").exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = store(dir.path());
        let package = descriptor(1, "Foo", "1.0.0", "abc", 1);
        fs::write(dir.path().join("Foo_1.0.0.json"), "{ not json").unwrap();

        assert!(matches!(
            checkpoints.load(&package),
            Err(CheckpointError::Json(_))
        ));
    }
}
