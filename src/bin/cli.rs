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


use anyhow::{Context, Result};
use catalog_core::storage::{
    Author, Book, ColumnKind, Comparison, Database, Entity, Genre, Order, Predicate, User, Value,
};
use catalog_core::DatabaseConfig;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog-cli")]
#[command(about = "Catalog CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// TOML config file (backend, username, password, database, host)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend kind: sqlite or mysql
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Database name (mysql) or file path (sqlite)
    #[arg(short, long, global = true)]
    database: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog tables if missing
    Init,
    AddGenre {
        name: String,
        #[arg(short, long)]
        info: Option<String>,
    },
    AddAuthor {
        name: String,
        surname: String,
        #[arg(long)]
        id: Option<i64>,
        #[arg(short, long)]
        info: Option<String>,
    },
    AddBook {
        name: String,
        /// Genre name
        #[arg(short, long)]
        genre: Option<String>,
        /// Author id
        #[arg(short, long)]
        author: Option<i64>,
    },
    AddUser {
        email: String,
        username: String,
        /// Account password, stored only as a salted digest
        #[arg(short, long)]
        secret: String,
    },
    /// List every row of an entity
    List {
        #[arg(value_enum)]
        entity: EntityKind,
        /// Attribute to order by
        #[arg(short, long)]
        order: Option<String>,
        #[arg(long)]
        desc: bool,
    },
    /// Rows whose attribute equals (or matches with --like) a value
    Find {
        #[arg(value_enum)]
        entity: EntityKind,
        attribute: String,
        value: String,
        /// Use SQL LIKE instead of equality
        #[arg(long)]
        like: bool,
    },
    /// Books joined with their genre, optionally filtered by genre info
    BooksByGenre {
        #[arg(long)]
        info: Option<String>,
    },
    /// Delete the first row whose attribute equals a value
    Delete {
        #[arg(value_enum)]
        entity: EntityKind,
        attribute: String,
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EntityKind {
    Genres,
    Authors,
    Books,
    Users,
}

fn resolve_config(cli: &Cli) -> Result<DatabaseConfig> {
    let mut config = match &cli.config {
        Some(path) => DatabaseConfig::from_toml_file(path)?,
        None => DatabaseConfig::from_env(),
    };

    if let Some(v) = &cli.backend {
        config.backend = v.clone();
    }
    if let Some(v) = &cli.database {
        config.database = v.clone();
    }
    if let Some(v) = &cli.username {
        config.username = v.clone();
    }
    if let Some(v) = &cli.password {
        config.password = v.clone();
    }
    if let Some(v) = &cli.host {
        config.host = v.clone();
    }
    Ok(config)
}

/// Interpret a command-line string according to the column's type
fn parse_value<E: Entity>(attribute: &str, raw: &str) -> Result<Value> {
    let column = E::table()
        .column(attribute)
        .with_context(|| format!("{} has no attribute '{}'", E::table().name, attribute))?;

    match column.kind {
        ColumnKind::Integer => {
            let v: i64 = raw
                .parse()
                .with_context(|| format!("'{}' is not an integer", raw))?;
            Ok(Value::Integer(v))
        }
        ColumnKind::Varchar(_) => Ok(Value::Text(raw.to_string())),
        ColumnKind::Blob => Ok(Value::Blob(raw.as_bytes().to_vec())),
    }
}

fn print_rows<T: Serialize>(rows: &[T]) -> Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}

async fn list<E: Entity + Serialize>(db: &mut Database, order: Option<&str>, desc: bool) -> Result<()> {
    let mut query = db.query::<E>();
    if let Some(attr) = order {
        let order = if desc { Order::desc::<E>(attr)? } else { Order::asc::<E>(attr)? };
        query = db.order_query(query, order)?;
    }
    print_rows(&db.list_query(&query).await?)
}

async fn find<E: Entity + Serialize>(db: &mut Database, attr: &str, raw: &str, like: bool) -> Result<()> {
    let value = parse_value::<E>(attr, raw)?;
    let comparison = if like { Comparison::Like } else { Comparison::Eq };
    let rows: Vec<E> = db.get_object_by_attr_with(attr, value, comparison).await?;
    print_rows(&rows)
}

async fn delete<E: Entity>(db: &mut Database, attr: &str, raw: &str) -> Result<()> {
    let value = parse_value::<E>(attr, raw)?;
    db.del_object::<E>(attr, value).await?;
    println!("deleted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let mut db = Database::connect(&config)
        .await
        .with_context(|| format!("opening {:?}", config))?;

    match cli.command {
        Commands::Init => {
            println!("Catalog ready at {} ({})", db.location(), db.backend());
        }
        Commands::AddGenre { name, info } => {
            let mut genre = Genre::new(name, info.as_deref());
            db.add_object(&mut genre).await?;
            print_rows(&[genre])?;
        }
        Commands::AddAuthor { name, surname, id, info } => {
            let mut author = Author::new(name, surname);
            author.id = id;
            author.info = info;
            db.add_object(&mut author).await?;
            print_rows(&[author])?;
        }
        Commands::AddBook { name, genre, author } => {
            let mut book = Book::new(name);
            book.genre_id = genre;
            book.author_id = author;
            db.add_object(&mut book).await?;
            print_rows(&[book])?;
        }
        Commands::AddUser { email, username, secret } => {
            let mut user = User::new(email, username, &secret);
            db.add_object(&mut user).await?;
            print_rows(&[user])?;
        }
        Commands::List { entity, order, desc } => {
            let order = order.as_deref();
            match entity {
                EntityKind::Genres => list::<Genre>(&mut db, order, desc).await?,
                EntityKind::Authors => list::<Author>(&mut db, order, desc).await?,
                EntityKind::Books => list::<Book>(&mut db, order, desc).await?,
                EntityKind::Users => list::<User>(&mut db, order, desc).await?,
            }
        }
        Commands::Find { entity, attribute, value, like } => match entity {
            EntityKind::Genres => find::<Genre>(&mut db, &attribute, &value, like).await?,
            EntityKind::Authors => find::<Author>(&mut db, &attribute, &value, like).await?,
            EntityKind::Books => find::<Book>(&mut db, &attribute, &value, like).await?,
            EntityKind::Users => find::<User>(&mut db, &attribute, &value, like).await?,
        },
        Commands::BooksByGenre { info } => {
            let filter = info
                .map(|info| Predicate::equals::<Genre>("info", info))
                .transpose()?;
            let books: Vec<Book> = db.get_object_by_relation::<Book, Genre>(filter).await?;
            print_rows(&books)?;
        }
        Commands::Delete { entity, attribute, value } => match entity {
            EntityKind::Genres => delete::<Genre>(&mut db, &attribute, &value).await?,
            EntityKind::Authors => delete::<Author>(&mut db, &attribute, &value).await?,
            EntityKind::Books => delete::<Book>(&mut db, &attribute, &value).await?,
            EntityKind::Users => delete::<User>(&mut db, &attribute, &value).await?,
        },
    }

    db.close().await?;
    Ok(())
}
