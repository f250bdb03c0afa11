//! Catalog Core
//!
//! Persistence layer for a small library catalog (genres, authors, books,
//! users) over SQLite or MySQL.

pub mod config;
pub mod error;
pub mod storage;

pub use config::{Backend, DatabaseConfig};
pub use error::{CatalogError, ConstraintKind, Result};
pub use storage::Database;
