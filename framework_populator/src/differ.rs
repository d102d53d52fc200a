use crate::report::{FrameworkSet, OperationKind, ReconciliationOperation};

/// Computes the operations that turn `recorded` into `declared`: adds for every
/// declared framework that is not recorded, then removes for every recorded framework
/// that is not declared. Both groups come out in lexicographic order.
pub fn compute_operations(
    declared: &FrameworkSet,
    recorded: &FrameworkSet,
) -> Vec<ReconciliationOperation> {
    let adds = declared
        .difference(recorded)
        .map(|fx| ReconciliationOperation::new(OperationKind::Add, fx.clone()));
    let removes = recorded
        .difference(declared)
        .map(|fx| ReconciliationOperation::new(OperationKind::Remove, fx.clone()));

    adds.chain(removes).collect()
}
