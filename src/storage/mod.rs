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


//! Database storage and models
//!
//! This module handles all catalog database operations through sqlx's `Any`
//! driver, so the same code runs against SQLite or MySQL.
//!
//! # Database Schema
//! - genres: Genre name and short description
//! - authors: Author name, surname and short description
//! - books: Title plus optional genre and author references
//! - users: Unique email/username, password digest, optional avatar blob
//!
//! # Usage Example
//! ```no_run
//! use catalog_core::storage::{Database, models::{Author, Book, Genre}};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::new("./books.db").await?;
//!
//! db.add_object(&mut Genre::new("Fantasy", Some("fiction"))).await?;
//! let mut author = Author::new("J", "Doe");
//! db.add_object(&mut author).await?;
//!
//! let mut book = Book::new("Dragons").in_genre("Fantasy");
//! book.author_id = author.id;
//! db.add_object(&mut book).await?;
//!
//! let found: Vec<Book> = db.get_object_by_attr("name", "Dragons").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod models;
pub mod queries;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use database::Database;
pub use models::{Author, Book, Entity, Genre, User, CATALOG_TABLES};
pub use query::{Comparison, Direction, Order, Predicate, Query, Value};
pub use schema::{Column, ColumnKind, ForeignKey, Relation, Table};
