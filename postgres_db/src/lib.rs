pub mod connection;
pub mod package_frameworks;
pub mod packages;
#[allow(unused_imports)]
pub mod schema;

pub mod testing;

pub use connection::DbConnection;
