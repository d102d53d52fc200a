use std::sync::Arc;

use clap::Parser;
use log::info;

use framework_populator::applier::FrameworkStore;
use framework_populator::archive::{BlobPackageSource, DirectoryPackageSource, PackageSource};
use framework_populator::catalog::{Catalog, PgCatalog};
use framework_populator::checkpoint::CheckpointStore;
use framework_populator::config::{Args, StorageAccount};
use framework_populator::pool;
use framework_populator::reconcile_error::FatalError;
use framework_populator::reconciler::Reconciler;
use postgres_db::DbConnection;
use utils::check_no_concurrent_processes;

fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    check_no_concurrent_processes("framework_populator");

    let args = Args::parse();
    if let Err(e) = populate(args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn package_source(args: &Args) -> Result<Arc<dyn PackageSource>, FatalError> {
    if let Some(dir) = &args.packages_dir {
        info!("Reading packages from {}", dir.display());
        return Ok(Arc::new(DirectoryPackageSource::new(dir)));
    }

    let connection_string = args
        .storage_connection_string
        .as_deref()
        .ok_or(FatalError::MissingConfig("storage connection string"))?;
    let account = StorageAccount::parse(connection_string)?;
    info!(
        "Reading packages from container {} at {}",
        args.container, account.blob_endpoint
    );
    Ok(Arc::new(BlobPackageSource::new(
        account,
        args.container.clone(),
    )?))
}

fn populate(args: Args) -> Result<(), FatalError> {
    let filter = args.selection()?;
    let workers = args.workers as usize;

    let source = package_source(&args)?;
    let checkpoints = CheckpointStore::open(&args.work_dir, args.what_if)?;
    let reconciler = Reconciler::new(source, checkpoints, args.what_if)?;

    let mut catalog = PgCatalog::new(DbConnection::connect(&args.database_url)?, filter);
    let total = catalog.total()?;
    if total == 0 {
        println!("No packages match the selection.");
        return Ok(());
    }

    if args.what_if {
        info!("What-if mode: the store and checkpoints will not be modified");
    } else if !args.yes {
        let prompt = format!(
            "About to populate frameworks for {} packages. Continue?",
            total
        );
        let confirmed = utils::confirm(
            &mut std::io::stdin().lock(),
            &mut std::io::stdout(),
            &prompt,
            true,
        )?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let stores = (0..workers)
        .map(|_| {
            DbConnection::connect(&args.database_url)
                .map(|conn| Box::new(conn) as Box<dyn FrameworkStore + Send>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    let summary = rt.block_on(pool::run(
        Box::new(catalog),
        total,
        Arc::new(reconciler),
        stores,
    ))?;
    println!("{}", summary);

    Ok(())
}
