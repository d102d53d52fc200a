use super::connection::QueryRunner;
use super::schema::{package_registrations, packages};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::Queryable;
use serde::{Deserialize, Serialize};

diesel::sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

/// The identity of a single published package snapshot, as read from the catalog.
#[derive(Queryable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub key: i32,
    pub id: String,
    pub version: String,
    pub normalized_version: String,
    pub hash: String,
    pub created: DateTime<Utc>,
}

impl PackageDescriptor {
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            created: self.created,
            key: self.key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelection {
    All,
    /// Matches `normalized_version` exactly, so the value must already be normalized.
    Exact(String),
}

/// Which packages to select from the catalog. `id` is compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFilter {
    pub id: Option<String>,
    pub version: VersionSelection,
}

/// Position of the last descriptor of a page. Pages are ordered by
/// `(created DESC, key DESC)`, so the next page starts strictly after this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created: DateTime<Utc>,
    pub key: i32,
}

pub fn count_packages<R: QueryRunner>(conn: &mut R, filter: &PackageFilter) -> QueryResult<i64> {
    let mut query = packages::table
        .inner_join(package_registrations::table)
        .select(diesel::dsl::count_star())
        .into_boxed();

    if let Some(the_id) = &filter.id {
        query = query.filter(lower(package_registrations::id).eq(the_id.to_lowercase()));
    }
    if let VersionSelection::Exact(v) = &filter.version {
        query = query.filter(packages::normalized_version.eq(v.clone()));
    }

    conn.get_result(query)
}

/// Loads at most `limit_size` descriptors matching the filter, most recently created
/// first, starting after `after` when given.
pub fn query_packages_page<R: QueryRunner>(
    conn: &mut R,
    filter: &PackageFilter,
    after: Option<PageCursor>,
    limit_size: i64,
) -> QueryResult<Vec<PackageDescriptor>> {
    let mut query = packages::table
        .inner_join(package_registrations::table)
        .select((
            packages::key,
            package_registrations::id,
            packages::version,
            packages::normalized_version,
            packages::hash,
            packages::created,
        ))
        .order((packages::created.desc(), packages::key.desc()))
        .limit(limit_size)
        .into_boxed();

    if let Some(the_id) = &filter.id {
        query = query.filter(lower(package_registrations::id).eq(the_id.to_lowercase()));
    }
    if let VersionSelection::Exact(v) = &filter.version {
        query = query.filter(packages::normalized_version.eq(v.clone()));
    }
    if let Some(cursor) = after {
        query = query.filter(
            packages::created.lt(cursor.created).or(packages::created
                .eq(cursor.created)
                .and(packages::key.lt(cursor.key))),
        );
    }

    conn.load(query)
}
