use diesel::QueryResult;
use log::info;
use postgres_db::package_frameworks::{
    delete_package_framework, insert_package_framework, query_package_frameworks,
};
use postgres_db::DbConnection;

use crate::report::{FrameworkSet, OperationKind, ReconciliationReport};

/// The relational store of framework associations, one per worker.
pub trait FrameworkStore {
    fn recorded_frameworks(&mut self, package_key: i32) -> QueryResult<FrameworkSet>;

    /// Records `framework` for the package; recording it again is not an error.
    fn add_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()>;

    /// Forgets `framework` for the package; forgetting an unknown one is not an error.
    fn remove_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()>;
}

impl FrameworkStore for DbConnection {
    fn recorded_frameworks(&mut self, package_key: i32) -> QueryResult<FrameworkSet> {
        Ok(query_package_frameworks(self, package_key)?
            .into_iter()
            .collect())
    }

    fn add_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()> {
        insert_package_framework(self, package_key, framework).map(|_| ())
    }

    fn remove_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()> {
        delete_package_framework(self, package_key, framework).map(|_| ())
    }
}

/// Applies the report's pending operations one at a time, recording the outcome of
/// each on the operation itself, then derives the report's state.
///
/// Operations already applied by an earlier attempt are skipped. In dry-run mode
/// the store is never touched and pending operations stay pending.
pub fn apply_operations(
    report: &mut ReconciliationReport,
    store: &mut (dyn FrameworkStore + Send),
    dry_run: bool,
) {
    for op in report.operations.iter_mut().filter(|op| !op.applied) {
        let sign = match op.kind {
            OperationKind::Add => '+',
            OperationKind::Remove => '-',
        };
        info!(
            " {} Id={}, Key={}, Fx={}",
            sign, report.id, report.key, op.framework
        );

        if dry_run {
            continue;
        }

        let result = match op.kind {
            OperationKind::Add => store.add_framework(report.key, &op.framework),
            OperationKind::Remove => store.remove_framework(report.key, &op.framework),
        };
        match result {
            Ok(()) => {
                op.applied = true;
                op.error = None;
            }
            Err(e) => op.error = Some(e.to_string()),
        }
    }

    report.derive_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::compute_operations;
    use crate::report::{ReconciliationOperation, ReportState};
    use crate::testing::{descriptor, MemoryStore};

    fn set(xs: &[&str]) -> FrameworkSet {
        xs.iter().map(|x| x.to_string()).collect()
    }

    fn report_for(store: &mut MemoryStore, declared: &[&str]) -> ReconciliationReport {
        let mut report = ReconciliationReport::new(&descriptor(7, "Foo", "1.0.0", "abc", 1));
        let declared = set(declared);
        let recorded = store.recorded_frameworks(7).unwrap();
        report.operations = compute_operations(&declared, &recorded);
        report.declared_frameworks = Some(declared);
        report.recorded_frameworks = Some(recorded);
        report
    }

    #[test]
    fn test_applies_adds_and_removes() {
        let mut store = MemoryStore::with_frameworks(7, &["net40", "net45"]);
        let mut report = report_for(&mut store, &["net45", "netstandard1.3"]);

        apply_operations(&mut report, &mut store, false);

        assert_eq!(report.state, ReportState::Resolved);
        assert!(report.operations.iter().all(|op| op.applied));
        assert_eq!(
            store.recorded_frameworks(7).unwrap(),
            set(&["net45", "netstandard1.3"])
        );
    }

    #[test]
    fn test_no_operations_is_resolved() {
        let mut store = MemoryStore::with_frameworks(7, &["net45"]);
        let mut report = report_for(&mut store, &["net45"]);
        assert!(report.operations.is_empty());

        apply_operations(&mut report, &mut store, false);
        assert_eq!(report.state, ReportState::Resolved);
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_partial_failure_is_recorded_per_operation() {
        let mut store = MemoryStore::with_frameworks(7, &["sl4"]);
        store.fail_on("net45");
        let mut report = report_for(&mut store, &["net40", "net45"]);

        apply_operations(&mut report, &mut store, false);

        assert_eq!(report.state, ReportState::Error);
        let by_fx = |fx: &str| {
            report
                .operations
                .iter()
                .find(|op| op.framework == fx)
                .unwrap()
                .clone()
        };
        assert!(by_fx("net40").applied);
        assert!(!by_fx("net45").applied);
        assert!(by_fx("net45").error.is_some());
        assert!(by_fx("sl4").applied);
        assert_eq!(store.recorded_frameworks(7).unwrap(), set(&["net40"]));
    }

    #[test]
    fn test_reapplying_skips_applied_operations() {
        let mut store = MemoryStore::with_frameworks(7, &[]);
        store.fail_on("net45");
        let mut report = report_for(&mut store, &["net40", "net45"]);
        apply_operations(&mut report, &mut store, false);
        assert_eq!(report.state, ReportState::Error);
        let mutations = store.mutations();

        store.clear_failures();
        apply_operations(&mut report, &mut store, false);

        assert_eq!(report.state, ReportState::Resolved);
        assert_eq!(store.mutations(), mutations + 1);
        assert!(report.operations.iter().all(|op| op.error.is_none()));
        assert_eq!(store.recorded_frameworks(7).unwrap(), set(&["net40", "net45"]));

        apply_operations(&mut report, &mut store, false);
        assert_eq!(store.mutations(), mutations + 1);
        assert_eq!(report.state, ReportState::Resolved);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let mut store = MemoryStore::with_frameworks(7, &["net40"]);
        let mut report = report_for(&mut store, &["net45"]);

        apply_operations(&mut report, &mut store, true);

        assert_eq!(store.mutations(), 0);
        assert_eq!(store.recorded_frameworks(7).unwrap(), set(&["net40"]));
        assert_eq!(report.state, ReportState::Unresolved);
        assert_eq!(
            report.operations,
            vec![
                ReconciliationOperation::new(OperationKind::Add, "net45".into()),
                ReconciliationOperation::new(OperationKind::Remove, "net40".into()),
            ]
        );
    }

    #[test]
    #[ignore = "requires TESTING_DATABASE_URL"]
    fn test_postgres_store() {
        use chrono::Utc;
        use postgres_db::testing::{insert_package, insert_package_registration, using_test_db};

        using_test_db(|conn| {
            let reg = insert_package_registration(conn, "Foo");
            let key = insert_package(conn, reg, "1.0.0", "1.0.0", "abc", Utc::now());
            conn.add_framework(key, "net45").unwrap();

            let mut report = ReconciliationReport::new(&descriptor(key, "Foo", "1.0.0", "abc", 1));
            let declared = set(&["net45", "netstandard1.3"]);
            let recorded = conn.recorded_frameworks(key).unwrap();
            report.operations = compute_operations(&declared, &recorded);

            apply_operations(&mut report, conn, false);
            apply_operations(&mut report, conn, false);

            assert_eq!(report.state, ReportState::Resolved);
            assert_eq!(conn.recorded_frameworks(key).unwrap(), declared);
        });
    }
}
