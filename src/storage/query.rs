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


//! Composable queries
//!
//! A [`Query`] is an unexecuted SELECT scoped to one entity type. Joins,
//! predicates and orderings are validated against the static table schema as
//! they are added, so by the time a query reaches the database every
//! identifier in it comes from the schema and every value is a bound
//! parameter.
//!
//! # Example
//! ```
//! use catalog_core::storage::models::{Book, Genre};
//! use catalog_core::storage::query::{Comparison, Order, Predicate, Query};
//!
//! # fn build() -> catalog_core::error::Result<()> {
//! let query = Query::<Book>::new()
//!     .join::<Genre>()?
//!     .filter(Predicate::new::<Genre>("info", Comparison::Eq, "fiction")?)?
//!     .order_by(Order::asc::<Book>("name")?)?;
//! assert!(query.to_sql().contains("INNER JOIN genres"));
//! # Ok(())
//! # }
//! ```

use crate::error::{CatalogError, Result};
use crate::storage::models::Entity;
use crate::storage::schema::{Column, Relation, Table};
use sqlx::{Any, QueryBuilder};
use std::fmt;
use std::marker::PhantomData;

// ============================================================================
// VALUES
// ============================================================================

/// A bound parameter or key value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub(crate) fn push_bind(&self, builder: &mut QueryBuilder<'static, Any>) {
        match self {
            Value::Null => builder.push_bind(Option::<String>::None),
            Value::Integer(v) => builder.push_bind(*v),
            Value::Text(v) => builder.push_bind(v.clone()),
            Value::Blob(v) => builder.push_bind(v.clone()),
        };
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{:?}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// PREDICATES AND ORDERING
// ============================================================================

/// Comparison applied by a [`Predicate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Equality; against NULL renders as `IS NULL`
    #[default]
    Eq,
    /// Inequality; against NULL renders as `IS NOT NULL`
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// SQL `LIKE` pattern match
    Like,
}

impl Comparison {
    fn operator(&self, value: &Value) -> &'static str {
        match (self, value.is_null()) {
            (Comparison::Eq, true) => "IS NULL",
            (Comparison::Ne, true) => "IS NOT NULL",
            (Comparison::Eq, false) => "=",
            (Comparison::Ne, false) => "<>",
            (Comparison::Lt, _) => "<",
            (Comparison::Le, _) => "<=",
            (Comparison::Gt, _) => ">",
            (Comparison::Ge, _) => ">=",
            (Comparison::Like, _) => "LIKE",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Like => "like",
        };
        f.write_str(symbol)
    }
}

fn lookup_column(table: &'static Table, attr: &str) -> Result<&'static Column> {
    table.column(attr).ok_or_else(|| {
        CatalogError::invalid_argument(format!("{} has no attribute '{}'", table.name, attr))
    })
}

/// Boolean condition over one entity attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    table: &'static Table,
    column: &'static Column,
    comparison: Comparison,
    value: Value,
}

impl Predicate {
    /// Build `E.attr <comparison> value`
    ///
    /// # Errors
    /// `InvalidArgument` if `E` has no such attribute, or if an ordering
    /// comparison or `Like` is asked to compare against NULL.
    pub fn new<E: Entity>(
        attr: &str,
        comparison: Comparison,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let table = E::table();
        let column = lookup_column(table, attr)?;
        let value = value.into();

        if value.is_null() && !matches!(comparison, Comparison::Eq | Comparison::Ne) {
            return Err(CatalogError::invalid_argument(format!(
                "cannot compare {}.{} {} NULL",
                table.name, attr, comparison
            )));
        }

        Ok(Self {
            table,
            column,
            comparison,
            value,
        })
    }

    /// Shorthand for the default "is equal" comparison
    pub fn equals<E: Entity>(attr: &str, value: impl Into<Value>) -> Result<Self> {
        Self::new::<E>(attr, Comparison::Eq, value)
    }

    pub fn table_name(&self) -> &'static str {
        self.table.name
    }

    pub fn attribute(&self) -> &'static str {
        self.column.name
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn push_sql(&self, builder: &mut QueryBuilder<'static, Any>) {
        builder.push(format!(
            "{}.{} {}",
            self.table.name,
            self.column.name,
            self.comparison.operator(&self.value)
        ));
        if !self.value.is_null() {
            builder.push(" ");
            self.value.push_bind(builder);
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {}",
            self.table.name, self.column.name, self.comparison, self.value
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering expression over one entity attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    table: &'static Table,
    column: &'static Column,
    direction: Direction,
}

impl Order {
    pub fn new<E: Entity>(attr: &str, direction: Direction) -> Result<Self> {
        let table = E::table();
        let column = lookup_column(table, attr)?;
        Ok(Self {
            table,
            column,
            direction,
        })
    }

    pub fn asc<E: Entity>(attr: &str) -> Result<Self> {
        Self::new::<E>(attr, Direction::Asc)
    }

    pub fn desc<E: Entity>(attr: &str) -> Result<Self> {
        Self::new::<E>(attr, Direction::Desc)
    }

    pub fn table_name(&self) -> &'static str {
        self.table.name
    }

    fn sql(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        format!("{}.{} {}", self.table.name, self.column.name, dir)
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Unexecuted SELECT over entity `E`
///
/// Every filter is ANDed with the others. Joined queries can return the same
/// base row once per related row; [`crate::storage::Database::list_query`]
/// collapses those to one entity per primary key.
pub struct Query<E> {
    joins: Vec<&'static Relation>,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            joins: self.joins.clone(),
            predicates: self.predicates.clone(),
            order: self.order.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &E::table().name)
            .field("joins", &self.joins.iter().map(|r| r.target).collect::<Vec<_>>())
            .field("predicates", &self.predicates.iter().map(|p| p.to_string()).collect::<Vec<_>>())
            .field("order", &self.order.iter().map(|o| o.sql()).collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self {
            joins: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Whether `table` can be referenced by predicates and orderings
    pub fn in_scope(&self, table: &str) -> bool {
        table == E::table().name || self.joins.iter().any(|r| r.target == table)
    }

    pub fn is_joined(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Inner-join `R` through a relation declared on `E`
    ///
    /// # Errors
    /// `InvalidArgument` if `E` declares no relation to `R` or `R` is already
    /// part of the query.
    pub fn join<R: Entity>(mut self) -> Result<Self> {
        let base = E::table();
        let target = R::table();

        let relation = base.relation_to(target.name).ok_or_else(|| {
            CatalogError::invalid_argument(format!(
                "{} declares no relationship to {}",
                base.name, target.name
            ))
        })?;

        if self.in_scope(target.name) {
            return Err(CatalogError::invalid_argument(format!(
                "{} is already part of the query",
                target.name
            )));
        }

        self.joins.push(relation);
        Ok(self)
    }

    /// Narrow the result set
    ///
    /// # Errors
    /// `InvalidArgument` if the predicate refers to a table that is neither
    /// `E` nor joined.
    pub fn filter(mut self, predicate: Predicate) -> Result<Self> {
        if !self.in_scope(predicate.table_name()) {
            return Err(CatalogError::invalid_argument(format!(
                "predicate on {} but query only covers {}",
                predicate.table_name(),
                self.scope_names()
            )));
        }
        self.predicates.push(predicate);
        Ok(self)
    }

    /// Append an ordering; earlier orderings take precedence
    pub fn order_by(mut self, order: Order) -> Result<Self> {
        if !self.in_scope(order.table_name()) {
            return Err(CatalogError::invalid_argument(format!(
                "ordering on {} but query only covers {}",
                order.table_name(),
                self.scope_names()
            )));
        }
        self.order.push(order);
        Ok(self)
    }

    fn scope_names(&self) -> String {
        std::iter::once(E::table().name)
            .chain(self.joins.iter().map(|r| r.target))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub(crate) fn to_builder(&self) -> QueryBuilder<'static, Any> {
        let base = E::table();
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM {}",
            base.select_list(),
            base.name
        ));

        for relation in &self.joins {
            builder.push(format!(
                " INNER JOIN {target} ON {target}.{remote} = {base}.{local}",
                target = relation.target,
                remote = relation.remote_column,
                base = base.name,
                local = relation.local_column,
            ));
        }

        for (i, predicate) in self.predicates.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(&mut builder);
        }

        if !self.order.is_empty() {
            builder.push(" ORDER BY ");
            builder.push(
                self.order
                    .iter()
                    .map(Order::sql)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        builder
    }

    /// Rendered SQL with `?` placeholders
    pub fn to_sql(&self) -> String {
        let builder = self.to_builder();
        builder.sql().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Author, Book, Genre, User};

    #[test]
    fn test_plain_query_selects_all_columns() {
        let sql = Query::<Genre>::new().to_sql();
        assert_eq!(sql, "SELECT genres.name, genres.info FROM genres");
    }

    #[test]
    fn test_filter_and_order_render() {
        let query = Query::<Book>::new()
            .filter(Predicate::equals::<Book>("name", "Dragons").unwrap())
            .unwrap()
            .filter(Predicate::new::<Book>("author_id", Comparison::Ge, 2i64).unwrap())
            .unwrap()
            .order_by(Order::desc::<Book>("id").unwrap())
            .unwrap();

        assert_eq!(
            query.to_sql(),
            "SELECT books.id, books.name, books.genre_id, books.author_id FROM books \
             WHERE books.name = ? AND books.author_id >= ? ORDER BY books.id DESC"
        );
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let query = Query::<Book>::new()
            .filter(Predicate::equals::<Book>("genre_id", Value::Null).unwrap())
            .unwrap();
        assert!(query.to_sql().ends_with("WHERE books.genre_id IS NULL"));
    }

    #[test]
    fn test_ordering_comparison_against_null_rejected() {
        let err = Predicate::new::<Book>("author_id", Comparison::Lt, Value::Null).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        assert!(Predicate::equals::<Genre>("title", "x").is_err());
        assert!(Order::asc::<Author>("email").is_err());
    }

    #[test]
    fn test_join_renders_declared_relation() {
        let query = Query::<Genre>::new().join::<Book>().unwrap();
        assert!(query
            .to_sql()
            .contains("INNER JOIN books ON books.genre_id = genres.name"));
        assert!(query.is_joined());
    }

    #[test]
    fn test_join_without_relation_rejected() {
        let err = Query::<User>::new().join::<Book>().unwrap_err();
        assert!(err.to_string().contains("users declares no relationship to books"));
    }

    #[test]
    fn test_double_join_rejected() {
        let query = Query::<Book>::new().join::<Author>().unwrap();
        assert!(query.join::<Author>().is_err());
    }

    #[test]
    fn test_filter_outside_scope_rejected() {
        let predicate = Predicate::equals::<Genre>("name", "Fantasy").unwrap();
        let err = Query::<Book>::new().filter(predicate.clone()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));

        let joined = Query::<Book>::new().join::<Genre>().unwrap();
        assert!(joined.filter(predicate).is_ok());
    }

    #[test]
    fn test_optional_values_convert() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(Some(3i64)).to_string(), "3");
    }

    #[test]
    fn test_text_display_is_quoted_unambiguously() {
        assert_eq!(Value::from("O'Brien").to_string(), "\"O'Brien\"");
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");

        let predicate = Predicate::equals::<Author>("surname", "O'Brien").unwrap();
        assert_eq!(predicate.to_string(), "authors.surname == \"O'Brien\"");
    }
}
