//! Catalog entity models
//!
//! Each entity is a plain struct deriving `sqlx::FromRow` plus a static
//! [`Table`] describing its storage shape. Entities are transient values: the
//! facade never keeps them, it only reads their column values on write.
//!
//! # Tables
//! - `genres`: keyed by name, has many books
//! - `authors`: auto-increment id, has many books
//! - `books`: auto-increment id, optional genre and author references
//! - `users`: auto-increment id, unique email and username, salted password hash

use crate::storage::query::Value;
use crate::storage::schema::{Column, ColumnKind, Relation, Table};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::any::AnyRow;
use sqlx::FromRow;

// ============================================================================
// ENTITY TRAIT
// ============================================================================

/// A record type mapped onto one table
pub trait Entity: for<'r> FromRow<'r, AnyRow> + Send + Unpin {
    /// Storage shape of this entity
    fn table() -> &'static Table;

    /// Column/value pairs to write
    ///
    /// Auto-increment keys that have not been assigned yet are omitted so the
    /// engine generates them.
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Current primary key value
    fn key(&self) -> Value;

    /// Record a key generated by the engine on insert
    fn assign_key(&mut self, _id: i64) {}
}

// ============================================================================
// TABLE DECLARATIONS
// ============================================================================

pub static GENRES: Table = Table {
    name: "genres",
    columns: &[
        Column::new("name", ColumnKind::Varchar(50)).primary_key().unique(),
        Column::new("info", ColumnKind::Varchar(20)).nullable(),
    ],
    relations: &[Relation {
        name: "books",
        target: "books",
        local_column: "name",
        remote_column: "genre_id",
    }],
};

pub static AUTHORS: Table = Table {
    name: "authors",
    columns: &[
        Column::new("id", ColumnKind::Integer).primary_key().auto_increment(),
        Column::new("name", ColumnKind::Varchar(50)),
        Column::new("surname", ColumnKind::Varchar(50)),
        Column::new("info", ColumnKind::Varchar(20)).nullable(),
    ],
    relations: &[Relation {
        name: "books",
        target: "books",
        local_column: "id",
        remote_column: "author_id",
    }],
};

pub static BOOKS: Table = Table {
    name: "books",
    columns: &[
        Column::new("id", ColumnKind::Integer).primary_key().auto_increment(),
        Column::new("name", ColumnKind::Varchar(100)),
        Column::new("genre_id", ColumnKind::Varchar(50))
            .nullable()
            .references("genres", "name"),
        Column::new("author_id", ColumnKind::Integer)
            .nullable()
            .references("authors", "id"),
    ],
    relations: &[
        Relation {
            name: "genre",
            target: "genres",
            local_column: "genre_id",
            remote_column: "name",
        },
        Relation {
            name: "author",
            target: "authors",
            local_column: "author_id",
            remote_column: "id",
        },
    ],
};

// password_hash holds "hex(salt)$hex(sha256)", 97 characters
pub static USERS: Table = Table {
    name: "users",
    columns: &[
        Column::new("id", ColumnKind::Integer).primary_key().auto_increment(),
        Column::new("email", ColumnKind::Varchar(100)).unique(),
        Column::new("username", ColumnKind::Varchar(20)).unique(),
        Column::new("password_hash", ColumnKind::Varchar(128)),
        Column::new("image", ColumnKind::Blob).nullable(),
    ],
    relations: &[],
};

/// All catalog tables, referenced tables first
pub static CATALOG_TABLES: [&Table; 4] = [&GENRES, &AUTHORS, &BOOKS, &USERS];

// ============================================================================
// ENTITIES
// ============================================================================

/// Book genre, identified by its name
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    #[sqlx(default)]
    pub info: Option<String>,
}

impl Genre {
    pub fn new(name: impl Into<String>, info: Option<&str>) -> Self {
        Self {
            name: name.into(),
            info: info.map(str::to_string),
        }
    }
}

impl Entity for Genre {
    fn table() -> &'static Table {
        &GENRES
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from(self.name.as_str())),
            ("info", Value::from(self.info.clone())),
        ]
    }

    fn key(&self) -> Value {
        Value::from(self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Author {
    /// None until inserted, unless the caller picks the id
    pub id: Option<i64>,
    pub name: String,
    pub surname: String,
    #[sqlx(default)]
    pub info: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>, surname: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            surname: surname.into(),
            info: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

impl Entity for Author {
    fn table() -> &'static Table {
        &AUTHORS
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        let mut values = Vec::with_capacity(4);
        if let Some(id) = self.id {
            values.push(("id", Value::Integer(id)));
        }
        values.push(("name", Value::from(self.name.as_str())));
        values.push(("surname", Value::from(self.surname.as_str())));
        values.push(("info", Value::from(self.info.clone())));
        values
    }

    fn key(&self) -> Value {
        Value::from(self.id)
    }

    fn assign_key(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: Option<i64>,
    pub name: String,
    /// References `genres.name`
    #[sqlx(default)]
    pub genre_id: Option<String>,
    /// References `authors.id`
    #[sqlx(default)]
    pub author_id: Option<i64>,
}

impl Book {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            genre_id: None,
            author_id: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn in_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre_id = Some(genre.into());
        self
    }

    pub fn by_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }
}

impl Entity for Book {
    fn table() -> &'static Table {
        &BOOKS
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        let mut values = Vec::with_capacity(4);
        if let Some(id) = self.id {
            values.push(("id", Value::Integer(id)));
        }
        values.push(("name", Value::from(self.name.as_str())));
        values.push(("genre_id", Value::from(self.genre_id.clone())));
        values.push(("author_id", Value::from(self.author_id)));
        values
    }

    fn key(&self) -> Value {
        Value::from(self.id)
    }

    fn assign_key(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Catalog user
///
/// Only a salted SHA-256 digest of the password is kept; the password itself
/// is never stored.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(default)]
    pub image: Option<Vec<u8>>,
}

impl User {
    pub fn new(email: impl Into<String>, username: impl Into<String>, password: &str) -> Self {
        Self {
            id: None,
            email: email.into(),
            username: username.into(),
            password_hash: hash_password(password),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// Replace the stored digest with one for `password`
    pub fn set_password(&mut self, password: &str) {
        self.password_hash = hash_password(password);
    }

    /// Check a candidate password against the stored digest
    pub fn verify_password(&self, candidate: &str) -> bool {
        let Some((salt_hex, _)) = self.password_hash.split_once('$') else {
            return false;
        };
        match hex::decode(salt_hex) {
            Ok(salt) => hash_with_salt(&salt, candidate) == self.password_hash,
            Err(_) => false,
        }
    }
}

impl Entity for User {
    fn table() -> &'static Table {
        &USERS
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        let mut values = Vec::with_capacity(5);
        if let Some(id) = self.id {
            values.push(("id", Value::Integer(id)));
        }
        values.push(("email", Value::from(self.email.as_str())));
        values.push(("username", Value::from(self.username.as_str())));
        values.push(("password_hash", Value::from(self.password_hash.as_str())));
        values.push(("image", Value::from(self.image.clone())));
        values
    }

    fn key(&self) -> Value {
        Value::from(self.id)
    }

    fn assign_key(&mut self, id: i64) {
        self.id = Some(id);
    }
}

// ============================================================================
// PASSWORD DIGEST
// ============================================================================

fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    hash_with_salt(&salt, password)
}

fn hash_with_salt(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    format!("{}${}", hex::encode(salt), hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_key_is_omitted() {
        let book = Book::new("Dragons").in_genre("Fantasy");
        let columns: Vec<&str> = book.values().iter().map(|(c, _)| *c).collect();
        assert_eq!(columns, vec!["name", "genre_id", "author_id"]);
        assert_eq!(book.key(), Value::Null);
    }

    #[test]
    fn test_explicit_key_is_written() {
        let author = Author::new("J", "Doe").with_id(1);
        assert_eq!(author.values()[0], ("id", Value::Integer(1)));
        assert_eq!(author.key(), Value::Integer(1));
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let user = User::new("a@example.com", "alice", "correct horse");

        assert!(!user.password_hash.contains("correct horse"));
        assert!(user.password_hash.len() <= 128);
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("battery staple"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let a = User::new("a@example.com", "a", "pw");
        let b = User::new("b@example.com", "b", "pw");
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_every_column_has_a_value() {
        let mut user = User::new("a@example.com", "alice", "pw").with_image(vec![1, 2, 3]);
        user.assign_key(7);
        assert_eq!(user.values().len(), USERS.columns.len());
    }
}
