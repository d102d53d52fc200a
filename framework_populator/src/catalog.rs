use diesel::QueryResult;
use postgres_db::packages::{
    count_packages, query_packages_page, PackageDescriptor, PackageFilter, PageCursor,
};
use postgres_db::DbConnection;

pub const PAGE_SIZE: i64 = 1024;

/// An ordered source of package descriptors, most recently created first,
/// consumed one page at a time.
pub trait Catalog: Send {
    /// Total number of descriptors the catalog will yield.
    fn total(&mut self) -> QueryResult<usize>;

    /// The next page of descriptors. An empty page means the catalog is exhausted.
    fn next_page(&mut self) -> QueryResult<Vec<PackageDescriptor>>;
}

pub struct PgCatalog {
    conn: DbConnection,
    filter: PackageFilter,
    cursor: Option<PageCursor>,
    done: bool,
}

impl PgCatalog {
    pub fn new(conn: DbConnection, filter: PackageFilter) -> PgCatalog {
        PgCatalog {
            conn,
            filter,
            cursor: None,
            done: false,
        }
    }
}

impl Catalog for PgCatalog {
    fn total(&mut self) -> QueryResult<usize> {
        Ok(count_packages(&mut self.conn, &self.filter)? as usize)
    }

    fn next_page(&mut self) -> QueryResult<Vec<PackageDescriptor>> {
        if self.done {
            return Ok(vec![]);
        }

        let page = query_packages_page(&mut self.conn, &self.filter, self.cursor, PAGE_SIZE)?;
        if (page.len() as i64) < PAGE_SIZE {
            self.done = true;
        }
        self.cursor = page.last().map(|p| p.cursor());
        Ok(page)
    }
}
