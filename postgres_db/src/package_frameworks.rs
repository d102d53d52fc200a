use super::connection::QueryRunner;
use super::schema;
use diesel::prelude::*;

pub fn query_package_frameworks<R: QueryRunner>(
    conn: &mut R,
    the_package_key: i32,
) -> QueryResult<Vec<String>> {
    use schema::package_frameworks::dsl::*;

    conn.load(
        package_frameworks
            .filter(package_key.eq(the_package_key))
            .select(target_framework)
            .order(target_framework),
    )
}

/// Records `framework` for the package. Inserting an association that already
/// exists is a no-op, so re-applying an add never duplicates rows.
pub fn insert_package_framework<R: QueryRunner>(
    conn: &mut R,
    the_package_key: i32,
    framework: &str,
) -> QueryResult<usize> {
    use schema::package_frameworks::dsl::*;

    conn.execute(
        diesel::insert_into(package_frameworks)
            .values((
                target_framework.eq(framework),
                package_key.eq(the_package_key),
            ))
            .on_conflict((package_key, target_framework))
            .do_nothing(),
    )
}

pub fn delete_package_framework<R: QueryRunner>(
    conn: &mut R,
    the_package_key: i32,
    framework: &str,
) -> QueryResult<usize> {
    use schema::package_frameworks::dsl::*;

    conn.execute(
        diesel::delete(package_frameworks)
            .filter(target_framework.eq(framework))
            .filter(package_key.eq(the_package_key)),
    )
}
