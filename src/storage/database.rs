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


//! Database facade
//!
//! [`Database`] owns the single connection (the session) and exposes query
//! composition plus the terminal add/update/delete operations.
//!
//! # Session Model
//! - One `AnyConnection` for the lifetime of the facade
//! - `&mut self` receivers; concurrent use needs external synchronization
//! - `mark_dirty` stages changes to fetched entities, `update` commits them
//! - `add_object` and `del_object` commit immediately, flushing staged changes
//!   in the same transaction
//!
//! # Failure Reporting
//! Every operation returns a typed [`Result`]. A failure is also logged with
//! `tracing::warn!` naming the operation, so callers that ignore the error
//! still leave a trace.

use crate::config::{Backend, DatabaseConfig};
use crate::error::{CatalogError, Result};
use crate::storage::models::{Entity, CATALOG_TABLES};
use crate::storage::queries;
use crate::storage::query::{Comparison, Order, Predicate, Query, Value};
use crate::storage::schema::{self, Table};
use sqlx::any::AnyConnectOptions;
use sqlx::{AnyConnection, ConnectOptions, Connection};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// A mutation of a fetched entity waiting for the next commit
struct PendingUpdate {
    table: &'static Table,
    key: Value,
    values: Vec<(&'static str, Value)>,
}

/// Catalog database facade
pub struct Database {
    conn: AnyConnection,
    backend: Backend,
    location: String,
    pending: Vec<PendingUpdate>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .field("location", &self.location)
            .field("pending_updates", &self.pending.len())
            .finish()
    }
}

/// Log a failed operation and hand the result back unchanged
fn report<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!(operation, category = e.category(), error = %e, "catalog operation failed");
    }
    result
}

impl Database {
    /// Connect using a configuration and create any missing tables
    ///
    /// # Errors
    /// Returns error if:
    /// - The backend identifier is not `sqlite` or `mysql` (`UnsupportedBackend`)
    /// - The SQLite parent directory can't be created
    /// - The connection can't be established
    /// - Schema creation fails
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backend = report("connect", config.backend())?;

        if backend == Backend::Sqlite {
            let path = Path::new(&config.database);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CatalogError::FileIoError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let url = config.connection_url()?;
        report("connect", Self::open(backend, &url, config.database.clone()).await)
    }

    /// Open (or create) a SQLite catalog file
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::connect(&DatabaseConfig::sqlite(database_path)).await
    }

    /// Create in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::open(Backend::Sqlite, "sqlite::memory:", ":memory:".to_string()).await
    }

    async fn open(backend: Backend, url: &str, location: String) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let options = AnyConnectOptions::from_str(url)?.disable_statement_logging();
        let mut conn = AnyConnection::connect_with(&options).await?;

        schema::create_schema(&mut conn, backend, &CATALOG_TABLES).await?;
        info!(%backend, %location, "catalog database opened");

        Ok(Self {
            conn,
            backend,
            location,
            pending: Vec::new(),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Database name or file path this facade is connected to
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Raw connection, for statements the facade does not cover
    pub fn connection(&mut self) -> &mut AnyConnection {
        &mut self.conn
    }

    /// Close the session
    ///
    /// Staged updates that were never committed are discarded.
    pub async fn close(self) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(count = self.pending.len(), "closing with uncommitted updates");
        }
        self.conn.close().await?;
        Ok(())
    }

    // ========================================================================
    // QUERY COMPOSITION
    // ========================================================================

    /// Start a composable query over `E`
    pub fn query<E: Entity>(&self) -> Query<E> {
        Query::new()
    }

    pub fn filter_query<E: Entity>(&self, query: Query<E>, predicate: Predicate) -> Result<Query<E>> {
        report("filter_query", query.filter(predicate))
    }

    /// Extend `query` with rows of `R` through the relation `E` declares
    pub fn join_query<E: Entity, R: Entity>(&self, query: Query<E>) -> Result<Query<E>> {
        report("join_query", query.join::<R>())
    }

    pub fn order_query<E: Entity>(&self, query: Query<E>, order: Order) -> Result<Query<E>> {
        report("order_query", query.order_by(order))
    }

    /// Execute `query` and materialize every matching row
    pub async fn list_query<E: Entity>(&mut self, query: &Query<E>) -> Result<Vec<E>> {
        let result = queries::fetch_all(&mut self.conn, query).await;
        report("list_query", result)
    }

    // ========================================================================
    // CONVENIENCE LOOKUPS
    // ========================================================================

    /// Rows of `E` whose `attr` equals `value`
    pub async fn get_object_by_attr<E: Entity>(
        &mut self,
        attr: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<E>> {
        self.get_object_by_attr_with(attr, value, Comparison::Eq).await
    }

    /// Rows of `E` where `attr <comparison> value`
    pub async fn get_object_by_attr_with<E: Entity>(
        &mut self,
        attr: &str,
        value: impl Into<Value>,
        comparison: Comparison,
    ) -> Result<Vec<E>> {
        let query = Predicate::new::<E>(attr, comparison, value)
            .and_then(|predicate| self.query::<E>().filter(predicate));
        let query = report("get_object_by_attr", query)?;
        self.list_query(&query).await
    }

    /// Rows of `E` that have at least one related `R`
    ///
    /// With `filter` set, only rows whose joined data satisfies it are
    /// returned; the predicate may target either `E` or `R`. Without it this
    /// is the plain join.
    pub async fn get_object_by_relation<E: Entity, R: Entity>(
        &mut self,
        filter: Option<Predicate>,
    ) -> Result<Vec<E>> {
        let mut query = self.join_query::<E, R>(self.query::<E>())?;
        if let Some(predicate) = filter {
            query = self.filter_query(query, predicate)?;
        }
        self.list_query(&query).await
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Insert `entity` and commit
    ///
    /// Staged updates are flushed in the same transaction. When the engine
    /// generates the primary key it is written back into `entity`.
    pub async fn add_object<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        let result = self.insert_and_commit(entity).await;
        report("add_object", result)
    }

    async fn insert_and_commit<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let backend = self.backend;
        let mut tx = self.conn.begin().await?;

        flush_pending(&mut tx, &pending).await?;
        let generated = queries::insert_row(&mut tx, backend, E::table(), &entity.values()).await?;
        tx.commit().await?;

        if entity.key().is_null() {
            if let Some(id) = generated {
                entity.assign_key(id);
            }
        }
        Ok(())
    }

    /// Stage the current state of a fetched entity for the next commit
    ///
    /// The primary key identifies the row and is never rewritten. Staging the
    /// same row twice keeps the latest state.
    pub fn mark_dirty<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let table = E::table();
        let key = entity.key();
        if key.is_null() {
            return report(
                "mark_dirty",
                Err(CatalogError::invalid_argument(format!(
                    "{} entity has no primary key yet; add it first",
                    table.name
                ))),
            );
        }

        let pk = table.primary_key().name;
        let values = entity
            .values()
            .into_iter()
            .filter(|(column, _)| *column != pk)
            .collect();

        self.pending
            .retain(|p| !(p.table.name == table.name && p.key == key));
        self.pending.push(PendingUpdate { table, key, values });
        Ok(())
    }

    /// Number of staged updates waiting for [`Database::update`]
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }

    /// Commit every staged update in one transaction
    ///
    /// Staged updates are consumed whether or not the commit succeeds.
    ///
    /// # Errors
    /// `RecordNotFound` if a staged row no longer exists; the whole batch is
    /// rolled back.
    pub async fn update(&mut self) -> Result<()> {
        let result = self.commit_pending().await;
        report("update", result)
    }

    async fn commit_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        let mut tx = self.conn.begin().await?;
        flush_pending(&mut tx, &pending).await?;
        tx.commit().await?;

        info!(count = pending.len(), "committed staged updates");
        Ok(())
    }

    /// Delete the first row of `E` whose `attr` equals `value`, and commit
    ///
    /// # Errors
    /// `RecordNotFound` if nothing matches.
    pub async fn del_object<E: Entity>(&mut self, attr: &str, value: impl Into<Value>) -> Result<()> {
        self.del_object_with::<E>(attr, value, Comparison::Eq).await
    }

    /// Delete the first row (lowest primary key) of `E` where
    /// `attr <comparison> value`, and commit
    pub async fn del_object_with<E: Entity>(
        &mut self,
        attr: &str,
        value: impl Into<Value>,
        comparison: Comparison,
    ) -> Result<()> {
        let table = E::table();
        let query = Predicate::new::<E>(attr, comparison, value).and_then(|predicate| {
            let description = predicate.to_string();
            self.query::<E>()
                .filter(predicate)?
                .order_by(Order::asc::<E>(table.primary_key().name)?)
                .map(|q| (q, description))
        });
        let (query, description) = report("del_object", query)?;

        let matches = self.list_query(&query).await?;
        let Some(first) = matches.first() else {
            return report(
                "del_object",
                Err(CatalogError::not_found(format!("no {} row where {}", table.name, description))),
            );
        };

        let key = first.key();
        let result = self.delete_and_commit(table, &key).await;
        report("del_object", result)
    }

    async fn delete_and_commit(&mut self, table: &'static Table, key: &Value) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut tx = self.conn.begin().await?;

        flush_pending(&mut tx, &pending).await?;
        let removed = queries::delete_row(&mut tx, table, key).await?;
        if removed == 0 {
            return Err(CatalogError::not_found(format!("{} row {}", table.name, key)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Number of rows stored for `E`
    pub async fn count<E: Entity>(&mut self) -> Result<i64> {
        let result = queries::count_rows(&mut self.conn, E::table()).await;
        report("count", result)
    }
}

async fn flush_pending(conn: &mut AnyConnection, pending: &[PendingUpdate]) -> Result<()> {
    for update in pending {
        let matched = queries::update_row(conn, update.table, &update.key, &update.values).await?;
        if matched == 0 {
            return Err(CatalogError::not_found(format!(
                "{} row {}",
                update.table.name, update.key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Author, Book, Genre, User};

    #[tokio::test]
    async fn test_in_memory_database() {
        let mut db = Database::new_in_memory().await.expect("Failed to create in-memory database");

        // Verify database is accessible
        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(db.connection())
            .await
            .expect("Failed to query database");

        assert_eq!(result, 1);
        assert_eq!(db.backend(), Backend::Sqlite);
    }

    #[tokio::test]
    async fn test_schema_created_on_open() {
        let mut db = Database::new_in_memory().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.connection())
        .await
        .expect("Failed to query tables");

        assert_eq!(tables, vec!["authors", "books", "genres", "users"]);
    }

    #[tokio::test]
    async fn test_unsupported_backend_fails_fast() {
        let config = DatabaseConfig {
            backend: "oracle".to_string(),
            ..DatabaseConfig::default()
        };

        let err = Database::connect(&config).await.unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedBackend(ref name) if name == "oracle"));
    }

    #[tokio::test]
    async fn test_add_assigns_generated_key() {
        let mut db = Database::new_in_memory().await.unwrap();

        let mut first = Author::new("Ursula", "Le Guin");
        let mut second = Author::new("Terry", "Pratchett");
        db.add_object(&mut first).await.unwrap();
        db.add_object(&mut second).await.unwrap();

        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        // The written-back key is usable for staging right away
        first.info = Some("Earthsea".to_string());
        db.mark_dirty(&first).unwrap();
        db.update().await.unwrap();
        let stored: Vec<Author> = db.get_object_by_attr("id", 1i64).await.unwrap();
        assert_eq!(stored[0].info.as_deref(), Some("Earthsea"));
    }

    #[tokio::test]
    async fn test_null_optionals_read_back() {
        let mut db = Database::new_in_memory().await.unwrap();

        let mut genre = Genre::new("Poetry", None);
        db.add_object(&mut genre).await.unwrap();
        let genres: Vec<Genre> = db.get_object_by_attr("name", "Poetry").await.unwrap();
        assert_eq!(genres, vec![genre]);

        let mut user = User::new("p@example.com", "poet", "verse");
        db.add_object(&mut user).await.unwrap();
        let users: Vec<User> = db.get_object_by_attr("username", "poet").await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].image, None);
        assert_eq!(users[0], user);

        let mut book = Book::new("Loose Leaf");
        db.add_object(&mut book).await.unwrap();
        let books: Vec<Book> = db.get_object_by_attr("name", "Loose Leaf").await.unwrap();
        assert_eq!(books, vec![book]);
        assert_eq!(books[0].genre_id, None);
        assert_eq!(books[0].author_id, None);
    }

    #[tokio::test]
    async fn test_mark_dirty_then_update() {
        let mut db = Database::new_in_memory().await.unwrap();
        db.add_object(&mut Genre::new("Fantasy", None)).await.unwrap();

        let mut genre: Genre = db
            .get_object_by_attr::<Genre>("name", "Fantasy")
            .await
            .unwrap()
            .remove(0);
        genre.info = Some("fiction".to_string());
        db.mark_dirty(&genre).unwrap();
        assert_eq!(db.pending_updates(), 1);

        db.update().await.unwrap();
        assert_eq!(db.pending_updates(), 0);

        let stored = db.get_object_by_attr::<Genre>("name", "Fantasy").await.unwrap();
        assert_eq!(stored[0].info.as_deref(), Some("fiction"));
    }

    #[tokio::test]
    async fn test_update_with_nothing_staged_succeeds() {
        let mut db = Database::new_in_memory().await.unwrap();
        db.update().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_dirty_requires_key() {
        let mut db = Database::new_in_memory().await.unwrap();
        let err = db.mark_dirty(&Book::new("Unsaved")).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_of_deleted_row_is_not_found() {
        let mut db = Database::new_in_memory().await.unwrap();
        let mut book = Book::new("Ephemeral");
        db.add_object(&mut book).await.unwrap();

        book.name = "Renamed".to_string();
        db.mark_dirty(&book).unwrap();
        // Lookups don't autoflush: the row is still stored as "Ephemeral".
        // The delete flushes the staged rename first, then removes the row.
        db.del_object::<Book>("name", "Ephemeral").await.unwrap();
        assert!(db.get_object_by_attr::<Book>("name", "Renamed").await.unwrap().is_empty());

        db.mark_dirty(&book).unwrap();
        let err = db.update().await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(db.pending_updates(), 0);
    }

    #[tokio::test]
    async fn test_del_object_removes_lowest_key_first() {
        let mut db = Database::new_in_memory().await.unwrap();
        db.add_object(&mut Book::new("Twin")).await.unwrap();
        db.add_object(&mut Book::new("Twin")).await.unwrap();

        db.del_object::<Book>("name", "Twin").await.unwrap();

        let left = db.get_object_by_attr::<Book>("name", "Twin").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, Some(2));
    }

    #[tokio::test]
    async fn test_count() {
        let mut db = Database::new_in_memory().await.unwrap();
        assert_eq!(db.count::<Genre>().await.unwrap(), 0);
        db.add_object(&mut Genre::new("Poetry", None)).await.unwrap();
        assert_eq!(db.count::<Genre>().await.unwrap(), 1);
    }
}
