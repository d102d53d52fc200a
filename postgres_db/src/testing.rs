//! Helpers for tests that need a real Postgres database.

use std::env;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use lazy_static::lazy_static;

use crate::connection::{DbConnection, QueryRunner};
use crate::schema;

lazy_static! {
    static ref TEST_DB_LOCK: Mutex<()> = Mutex::new(());
}

/// Recreates the database at `TESTING_DATABASE_URL` from this crate's migrations.
fn reset_test_db() -> DbConnection {
    dotenv::dotenv().ok();

    let database_url =
        env::var("TESTING_DATABASE_URL").expect("TESTING_DATABASE_URL must be set");

    let status = Command::new("diesel")
        .args([
            "database",
            "reset",
            "--locked-schema",
            "--database-url",
            &database_url,
        ])
        .current_dir(Path::new(env!("CARGO_MANIFEST_DIR")))
        .status()
        .expect("failed to run the diesel CLI");
    assert!(
        status.success(),
        "Failed to run diesel database reset --database-url {}",
        database_url
    );

    DbConnection::connect(&database_url)
        .unwrap_or_else(|_| panic!("Error connecting to {}", database_url))
}

/// Runs `f` against a freshly reset test database. Tests using the database are
/// serialized, since they all share it.
pub fn using_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&mut DbConnection) -> R,
{
    let _locked = match TEST_DB_LOCK.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    };

    let mut conn = reset_test_db();
    f(&mut conn)
}

pub fn insert_package_registration<R: QueryRunner>(conn: &mut R, the_id: &str) -> i32 {
    use schema::package_registrations::dsl::*;

    conn.get_result(
        diesel::insert_into(package_registrations)
            .values(id.eq(the_id))
            .returning(key),
    )
    .unwrap_or_else(|_| panic!("Failed to insert package registration {}", the_id))
}

pub fn insert_package<R: QueryRunner>(
    conn: &mut R,
    registration_key: i32,
    the_version: &str,
    the_normalized_version: &str,
    the_hash: &str,
    the_created: DateTime<Utc>,
) -> i32 {
    use schema::packages::dsl::*;

    conn.get_result(
        diesel::insert_into(packages)
            .values((
                package_registration_key.eq(registration_key),
                version.eq(the_version),
                normalized_version.eq(the_normalized_version),
                hash.eq(the_hash),
                created.eq(the_created),
            ))
            .returning(key),
    )
    .unwrap_or_else(|_| panic!("Failed to insert package version {}", the_version))
}
