//! Shared paginated listing over a single table.

use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, sqlite::SqliteRow};
use utils::pagination::{Page, Pagination};

/// Run a `COUNT(*)` and a paged `SELECT` over `table` with the same filter.
///
/// `filter` pushes a complete `WHERE ...` clause (or nothing). It is invoked
/// once per query, so any bound values must be owned. Rows come back in
/// insertion order unless `pagination.sort` names a column.
pub async fn fetch_page<T, F>(
    pool: &SqlitePool,
    table: &str,
    columns: &str,
    filter: F,
    pagination: &Pagination,
) -> Result<Page<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    F: Fn(&mut QueryBuilder<'_, Sqlite>),
{
    fetch_page_ordered(pool, table, columns, filter, pagination, |column| column).await
}

/// Like [`fetch_page`], but `order_by` maps a whitelisted sort column to the
/// SQL expression it sorts by, for columns whose text order is not their rank.
pub async fn fetch_page_ordered<T, F>(
    pool: &SqlitePool,
    table: &str,
    columns: &str,
    filter: F,
    pagination: &Pagination,
    order_by: fn(&'static str) -> &'static str,
) -> Result<Page<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    F: Fn(&mut QueryBuilder<'_, Sqlite>),
{
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
    count.push(table);
    filter(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
    select.push(columns).push(" FROM ").push(table);
    filter(&mut select);

    select.push(" ORDER BY ");
    if let Some(sort) = pagination.sort {
        select
            .push(order_by(sort.column))
            .push(if sort.descending { " DESC" } else { " ASC" })
            .push(", ");
    }
    select.push("rowid ASC");

    select
        .push(" LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let items = select.build_query_as::<T>().fetch_all(pool).await?;
    Ok(Page::new(items, pagination, total))
}

/// Tracks whether the next condition needs `WHERE` or `AND`.
#[derive(Default)]
pub struct Conditions {
    started: bool,
}

impl Conditions {
    pub fn next<'q>(&mut self, qb: &mut QueryBuilder<'q, Sqlite>) {
        qb.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
    }
}

/// Restrict rows with a nullable `garden_id` to platform-wide rows and rows
/// from gardens that are public or that `user_id` belongs to.
pub fn push_garden_visibility(qb: &mut QueryBuilder<'_, Sqlite>, user_id: uuid::Uuid) {
    qb.push(
        "(garden_id IS NULL OR garden_id IN (SELECT id FROM gardens WHERE is_public = 1) \
         OR garden_id IN (SELECT garden_id FROM garden_members WHERE user_id = ",
    )
    .push_bind(user_id)
    .push("))");
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
