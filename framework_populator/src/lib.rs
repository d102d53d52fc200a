pub mod applier;
pub mod archive;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod differ;
pub mod frameworks;
pub mod pool;
pub mod progress;
pub mod reconcile_error;
pub mod reconciler;
pub mod report;

pub mod testing;
