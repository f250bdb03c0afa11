// Catalog Core - Library Catalog Persistence
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Statement execution
//!
//! Row-level INSERT/UPDATE/DELETE and SELECT execution against a single
//! connection. These functions never commit; the facade wraps them in a
//! transaction.
//!
//! # Query Patterns
//! - Statements are rendered with `sqlx::QueryBuilder` so every value is bound
//! - Table and column names come from the static schema only
//! - Callers pass `&mut *tx` to run inside a transaction

use crate::config::Backend;
use crate::error::Result;
use crate::storage::models::Entity;
use crate::storage::query::{Query, Value};
use crate::storage::schema::Table;
use sqlx::{Any, AnyConnection, QueryBuilder};
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// READS
// ============================================================================

/// Execute a composed query and materialize every matching entity
///
/// Joined queries yield one row per related row; duplicates of the same
/// primary key are dropped, keeping the first occurrence so ORDER BY still
/// holds.
pub async fn fetch_all<E: Entity>(conn: &mut AnyConnection, query: &Query<E>) -> Result<Vec<E>> {
    let mut builder = query.to_builder();
    debug!(sql = builder.sql(), "select");

    let rows: Vec<E> = builder.build_query_as::<E>().fetch_all(&mut *conn).await?;

    if !query.is_joined() {
        return Ok(rows);
    }

    let mut seen = HashSet::with_capacity(rows.len());
    Ok(rows.into_iter().filter(|row| seen.insert(row.key())).collect())
}

// ============================================================================
// WRITES
// ============================================================================

/// Insert one row
///
/// Returns the key generated by the engine when the table's key is
/// auto-incremented and `values` left it out, `None` otherwise. The SQLite
/// driver never reports the generated id through `Any`, so it is read back
/// on the same connection.
pub async fn insert_row(
    conn: &mut AnyConnection,
    backend: Backend,
    table: &Table,
    values: &[(&'static str, Value)],
) -> Result<Option<i64>> {
    let columns = values.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ");
    let mut builder: QueryBuilder<'static, Any> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) VALUES (", table.name, columns));

    for (i, (_, value)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        value.push_bind(&mut builder);
    }
    builder.push(")");

    debug!(sql = builder.sql(), "insert");
    let result = builder.build().execute(&mut *conn).await?;

    let pk = table.primary_key();
    if !pk.auto_increment || values.iter().any(|(c, _)| *c == pk.name) {
        return Ok(None);
    }
    if let Some(id) = result.last_insert_id() {
        return Ok(Some(id));
    }

    let id: i64 = sqlx::query_scalar(last_insert_id_sql(backend))
        .fetch_one(&mut *conn)
        .await?;
    Ok(Some(id))
}

fn last_insert_id_sql(backend: Backend) -> &'static str {
    match backend {
        Backend::Sqlite => "SELECT last_insert_rowid()",
        Backend::MySql => "SELECT CAST(LAST_INSERT_ID() AS SIGNED)",
    }
}

/// Overwrite the non-key columns of the row identified by `key`
///
/// Returns the number of rows matched.
pub async fn update_row(
    conn: &mut AnyConnection,
    table: &Table,
    key: &Value,
    values: &[(&'static str, Value)],
) -> Result<u64> {
    if values.is_empty() {
        return Ok(1);
    }

    let mut builder: QueryBuilder<'static, Any> =
        QueryBuilder::new(format!("UPDATE {} SET ", table.name));

    for (i, (column, value)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(format!("{} = ", column));
        value.push_bind(&mut builder);
    }

    builder.push(format!(" WHERE {} = ", table.primary_key().name));
    key.push_bind(&mut builder);

    debug!(sql = builder.sql(), %key, "update");
    let result = builder.build().execute(&mut *conn).await?;

    Ok(result.rows_affected())
}

/// Delete the row identified by `key`
///
/// Returns the number of rows removed.
pub async fn delete_row(conn: &mut AnyConnection, table: &Table, key: &Value) -> Result<u64> {
    let mut builder: QueryBuilder<'static, Any> = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE {} = ",
        table.name,
        table.primary_key().name
    ));
    key.push_bind(&mut builder);

    debug!(sql = builder.sql(), %key, "delete");
    let result = builder.build().execute(&mut *conn).await?;

    Ok(result.rows_affected())
}

/// Count the rows of a table
pub async fn count_rows(conn: &mut AnyConnection, table: &Table) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name);
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use crate::storage::models::{Author, Genre, AUTHORS, GENRES};

    #[tokio::test]
    async fn test_insert_update_delete_row() {
        let mut db = Database::new_in_memory().await.unwrap();
        let conn = db.connection();

        let generated = insert_row(conn, Backend::Sqlite, &GENRES, &Genre::new("Horror", None).values())
            .await
            .unwrap();
        assert_eq!(generated, None);
        assert_eq!(count_rows(conn, &GENRES).await.unwrap(), 1);

        let key = Value::from("Horror");
        let changed = update_row(conn, &GENRES, &key, &[("info", Value::from("scary"))])
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let removed = delete_row(conn, &GENRES, &key).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count_rows(conn, &GENRES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_row_matches_nothing() {
        let mut db = Database::new_in_memory().await.unwrap();
        let changed = update_row(
            db.connection(),
            &GENRES,
            &Value::from("Nope"),
            &[("info", Value::from("x"))],
        )
        .await
        .unwrap();

        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_insert_reports_generated_key() {
        let mut db = Database::new_in_memory().await.unwrap();
        let conn = db.connection();

        let first = insert_row(conn, Backend::Sqlite, &AUTHORS, &Author::new("Ursula", "Le Guin").values())
            .await
            .unwrap();
        let second = insert_row(conn, Backend::Sqlite, &AUTHORS, &Author::new("Terry", "Pratchett").values())
            .await
            .unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));

        // caller-chosen key: nothing generated
        let explicit = insert_row(
            conn,
            Backend::Sqlite,
            &AUTHORS,
            &Author::new("J", "Doe").with_id(10).values(),
        )
        .await
        .unwrap();
        assert_eq!(explicit, None);
    }
}
