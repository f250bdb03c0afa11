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


//! Table schema declarations and schema creation
//!
//! Entities describe their table shape with the `const` types in this module.
//! The descriptions are passed explicitly to [`create_schema`] at startup,
//! which issues `CREATE TABLE IF NOT EXISTS` for each one.
//!
//! # Schema Strategy
//! There are no migrations. Tables that already exist are left untouched, so
//! changing an entity definition after data exists is unsupported.
//!
//! # Backend Differences
//! - SQLite: `INTEGER PRIMARY KEY AUTOINCREMENT`, `BLOB`
//! - MySQL: `BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY`, `LONGBLOB`
//! - Both: `VARCHAR(n)` for bounded text, table-level `FOREIGN KEY` clauses

use crate::config::Backend;
use crate::error::Result;
use sqlx::{AnyConnection, Executor};
use tracing::{debug, info};

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    /// Bounded text, maximum length in characters
    Varchar(u16),
    Blob,
}

/// Target of a foreign key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
}

/// A single column declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub unique: bool,
    pub references: Option<ForeignKey>,
}

impl Column {
    /// Required column with no constraints beyond NOT NULL
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            primary_key: false,
            auto_increment: false,
            nullable: false,
            unique: false,
            references: None,
        }
    }

    pub const fn primary_key(self) -> Self {
        Self { primary_key: true, ..self }
    }

    pub const fn auto_increment(self) -> Self {
        Self { auto_increment: true, ..self }
    }

    pub const fn nullable(self) -> Self {
        Self { nullable: true, ..self }
    }

    pub const fn unique(self) -> Self {
        Self { unique: true, ..self }
    }

    pub const fn references(self, table: &'static str, column: &'static str) -> Self {
        Self {
            references: Some(ForeignKey { table, column }),
            ..self
        }
    }
}

/// Named relationship from one table to another
///
/// Joining along the relation matches `target.remote_column` against
/// `owner.local_column`. Both sides of a one-to-many link declare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub target: &'static str,
    pub local_column: &'static str,
    pub remote_column: &'static str,
}

/// Table declaration: columns plus named relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub relations: &'static [Relation],
}

impl Table {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key column
    ///
    /// # Panics
    /// If the table declares no primary key column. Every table in
    /// [`crate::storage::CATALOG_TABLES`] declares exactly one.
    pub fn primary_key(&self) -> &'static Column {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .expect("table declares a primary key column")
    }

    /// Relation declared on this table that leads to `target`
    pub fn relation_to(&self, target: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.target == target)
    }

    /// Comma-separated, table-qualified column list for SELECT
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}.{}", self.name, c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render the CREATE TABLE statement for a backend
    pub fn create_sql(&self, backend: Backend) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| column_definition(c, backend))
            .collect();

        for column in self.columns {
            if let Some(fk) = column.references {
                parts.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    column.name, fk.table, fk.column
                ));
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }
}

fn column_definition(column: &Column, backend: Backend) -> String {
    if column.auto_increment {
        return match backend {
            Backend::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", column.name),
            Backend::MySql => format!("{} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY", column.name),
        };
    }

    let sql_type = match (column.kind, backend) {
        (ColumnKind::Integer, Backend::Sqlite) => "INTEGER".to_string(),
        (ColumnKind::Integer, Backend::MySql) => "BIGINT".to_string(),
        (ColumnKind::Varchar(len), _) => format!("VARCHAR({})", len),
        (ColumnKind::Blob, Backend::Sqlite) => "BLOB".to_string(),
        (ColumnKind::Blob, Backend::MySql) => "LONGBLOB".to_string(),
    };

    let mut definition = format!("{} {}", column.name, sql_type);
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if column.primary_key {
        definition.push_str(" PRIMARY KEY");
    } else if column.unique {
        definition.push_str(" UNIQUE");
    }
    definition
}

/// Create every table that does not exist yet
///
/// Tables are created in the given order, so referenced tables must come
/// before the tables that reference them.
pub async fn create_schema(
    conn: &mut AnyConnection,
    backend: Backend,
    tables: &[&Table],
) -> Result<()> {
    for table in tables {
        let sql = table.create_sql(backend);
        debug!(table = table.name, %sql, "ensuring table");
        (&mut *conn).execute(sql.as_str()).await?;
    }

    info!(tables = tables.len(), ?backend, "schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{AUTHORS, BOOKS, GENRES, USERS};

    #[test]
    fn test_sqlite_books_ddl() {
        let sql = BOOKS.create_sql(Backend::Sqlite);

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS books ("));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("name VARCHAR(100) NOT NULL"));
        assert!(sql.contains("genre_id VARCHAR(50),"));
        assert!(sql.contains("FOREIGN KEY (genre_id) REFERENCES genres(name)"));
        assert!(sql.contains("FOREIGN KEY (author_id) REFERENCES authors(id)"));
    }

    #[test]
    fn test_mysql_ddl_types() {
        let authors = AUTHORS.create_sql(Backend::MySql);
        assert!(authors.contains("id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"));

        let users = USERS.create_sql(Backend::MySql);
        assert!(users.contains("email VARCHAR(100) NOT NULL UNIQUE"));
        assert!(users.contains("image LONGBLOB"));
        assert!(!users.contains("image LONGBLOB NOT NULL"));
    }

    #[test]
    fn test_genre_name_is_primary_key() {
        assert_eq!(GENRES.primary_key().name, "name");
        assert!(GENRES
            .create_sql(Backend::Sqlite)
            .contains("name VARCHAR(50) NOT NULL PRIMARY KEY"));
    }

    #[test]
    fn test_relation_lookup() {
        let rel = GENRES.relation_to("books").expect("genres -> books");
        assert_eq!(rel.local_column, "name");
        assert_eq!(rel.remote_column, "genre_id");
        assert!(USERS.relation_to("books").is_none());
    }
}
