use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, warn};
use postgres_db::packages::PackageDescriptor;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::applier::FrameworkStore;
use crate::catalog::Catalog;
use crate::progress::{Progress, RunSummary};
use crate::reconcile_error::{FatalError, ReconcileError};
use crate::reconciler::Reconciler;
use crate::report::ReportState;

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Worker {
    id: usize,
    task: JoinHandle<RunSummary>,
}

impl Worker {
    fn make(
        id: usize,
        task_receiver: Arc<Mutex<Receiver<PackageDescriptor>>>,
        reconciler: Arc<Reconciler>,
        progress: Arc<Progress>,
        mut store: Box<dyn FrameworkStore + Send>,
    ) -> Worker {
        let task = tokio::spawn(async move {
            debug!("Worker {} started", id);
            let mut summary = RunSummary::default();
            loop {
                let package = task_receiver.lock().await.recv().await;
                let package = match package {
                    Some(package) => package,
                    None => break,
                };

                let result = AssertUnwindSafe(reconciler.reconcile(&package, store.as_mut()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(ReconcileError::Panic(panic_message(panic))));

                let index = progress.complete();
                match result {
                    Ok(report) => {
                        if report.state == ReportState::Error {
                            let error = report.error.clone().or_else(|| {
                                report.operations.iter().find_map(|op| op.error.clone())
                            });
                            warn!(
                                "{}@{}: {}",
                                report.id,
                                report.version,
                                error.unwrap_or_default()
                            );
                        }
                        summary.record(report.state);
                        println!("{}", progress.report_line(index, &report));
                    }
                    Err(e @ ReconcileError::Panic(_)) => {
                        eprintln!("{}", progress.error_line(index, &package, &e));
                        match reconciler.record_failure(&package, &e) {
                            Ok(report) => summary.record(report.state),
                            Err(save_error) => {
                                warn!(
                                    "Failed to checkpoint {}@{}: {}",
                                    package.id, package.version, save_error
                                );
                                summary.skipped += 1;
                            }
                        }
                    }
                    Err(e) => {
                        summary.skipped += 1;
                        eprintln!("{}", progress.error_line(index, &package, &e));
                    }
                }
            }
            debug!("Worker {} finished", id);
            summary
        });

        Worker { id, task }
    }
}

/// Reconciles every package of the catalog with one worker per store. `total` is
/// the catalog size used for progress output.
///
/// Packages are handed out in catalog order, but complete and print in whatever
/// order the workers finish them. A package that fails never stops the run; only
/// a failure to read the catalog or a crashed worker does.
pub async fn run(
    mut catalog: Box<dyn Catalog>,
    total: usize,
    reconciler: Arc<Reconciler>,
    stores: Vec<Box<dyn FrameworkStore + Send>>,
) -> Result<RunSummary, FatalError> {
    assert!(!stores.is_empty());

    let (task_sender, task_receiver) = mpsc::channel(stores.len());
    let task_receiver = Arc::new(Mutex::new(task_receiver));
    let progress = Arc::new(Progress::new(total));

    let workers: Vec<Worker> = stores
        .into_iter()
        .enumerate()
        .map(|(id, store)| {
            Worker::make(
                id,
                Arc::clone(&task_receiver),
                Arc::clone(&reconciler),
                Arc::clone(&progress),
                store,
            )
        })
        .collect();

    let feeder = tokio::task::spawn_blocking(move || -> diesel::QueryResult<()> {
        loop {
            let page = catalog.next_page()?;
            if page.is_empty() {
                return Ok(());
            }
            for package in page {
                if task_sender.blocking_send(package).is_err() {
                    return Ok(());
                }
            }
        }
    });

    let mut summary = RunSummary::default();
    for worker in workers {
        debug!("Waiting for worker {}", worker.id);
        summary.merge(worker.task.await?);
    }
    feeder.await??;

    Ok(summary)
}
