//! Keyset (cursor) pagination
//!
//! Pages are selected with `WHERE order_column > last_seen` instead of an
//! OFFSET, so the cost of a page does not grow with its depth and rows
//! inserted mid-traversal do not shift later pages.
//!
//! One extra row is fetched past `limit` as a lookahead; its presence sets
//! `has_more` without a separate COUNT query.
//!
//! Rows sharing the same order column value are not tie-broken. When such a
//! run straddles a page boundary, rows after the first may be skipped. Order
//! by a unique column (a primary key or a unique timestamp) to avoid it.
//!
//! The order column must be NOT NULL. A page whose last row has no usable
//! order value reports `has_more` without a `next_cursor`.

use serde::Serialize;

use super::cursor::Cursor;
use crate::error::ValidationError;
use crate::value::{Row, SqlValue};

/// Direction of traversal along the order column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn comparison(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

/// A SQL boolean expression with its positional parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// AND together a list of predicates. `None` when the list is empty.
    pub fn all(predicates: Vec<Predicate>) -> Option<Predicate> {
        if predicates.is_empty() {
            return None;
        }
        let sql = predicates
            .iter()
            .map(|p| format!("({})", p.sql))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = predicates.into_iter().flat_map(|p| p.params).collect();
        Some(Predicate { sql, params })
    }
}

/// A complete statement ready to hand to the database layer.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// One page of results, in the list endpoint wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T = Row> {
    pub data: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub count: usize,
}

/// Builds keyset queries over one order column.
#[derive(Debug, Clone)]
pub struct KeysetPaginator {
    order_column: String,
    direction: SortDirection,
}

impl KeysetPaginator {
    /// The column is spliced into SQL, so only plain identifiers
    /// (`[A-Za-z_][A-Za-z0-9_]*`) are accepted.
    pub fn new(
        order_column: impl Into<String>,
        direction: SortDirection,
    ) -> Result<Self, ValidationError> {
        let order_column = order_column.into();
        if order_column.is_empty() {
            return Err(ValidationError::Empty {
                field: "order column",
            });
        }
        let mut chars = order_column.chars();
        let starts_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ValidationError::InvalidFormat {
                field: "order column",
                reason: "must be a plain SQL identifier",
            });
        }
        Ok(Self {
            order_column,
            direction,
        })
    }

    /// Build the page query.
    ///
    /// `base_query` must be a bare `SELECT ... FROM ...` without WHERE,
    /// ORDER BY or LIMIT; filters go in `extra`. An unusable cursor restarts
    /// from the first page.
    pub fn build_query(
        &self,
        base_query: &str,
        cursor: Option<&str>,
        limit: usize,
        extra: Option<&Predicate>,
    ) -> KeysetQuery {
        let mut params = Vec::new();

        let position = match cursor.and_then(|token| Cursor::decode_for(token, &self.order_column))
        {
            Some(value) => {
                params.push(value);
                format!("{} {} ?", self.order_column, self.direction.comparison())
            }
            None => "1 = 1".to_string(),
        };

        let mut sql = format!("{} WHERE ({})", base_query.trim_end(), position);
        if let Some(extra) = extra {
            sql.push_str(&format!(" AND ({})", extra.sql));
            params.extend(extra.params.iter().cloned());
        }
        sql.push_str(&format!(
            " ORDER BY {} {} LIMIT ?",
            self.order_column,
            self.direction.keyword()
        ));
        params.push(SqlValue::Integer(lookahead_limit(limit)));

        KeysetQuery { sql, params }
    }

    /// Cut the lookahead row off and derive the next cursor.
    pub fn paginate_results(&self, mut rows: Vec<Row>, limit: usize) -> Page<Row> {
        let limit = limit.max(1);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_more {
            let cursor = rows.last().and_then(|row| self.cursor_for(row));
            if cursor.is_none() {
                tracing::debug!(column = %self.order_column, "last row has no order value, cannot continue");
            }
            cursor
        } else {
            None
        };

        Page {
            count: rows.len(),
            data: rows,
            has_more,
            next_cursor,
        }
    }

    /// Cursor pointing just past `row`.
    pub fn cursor_for(&self, row: &Row) -> Option<String> {
        let value = row.get(&self.order_column).and_then(SqlValue::from_json)?;
        if value == SqlValue::Null {
            return None;
        }
        Some(Cursor::new(self.order_column.clone(), value).encode())
    }
}

fn lookahead_limit(limit: usize) -> i64 {
    i64::try_from(limit.max(1)).unwrap_or(i64::MAX - 1) + 1
}
