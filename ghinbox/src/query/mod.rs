//! Turning query strings into SQL fragments over the `notifications` table.
//!
//! The store executes a [`BuiltQuery`] against `notifications n`, always scoped
//! to the requesting user. Builders only produce extra `WHERE` clauses and their
//! positional arguments.

mod terms;

pub use terms::TermQueryBuilder;

use crate::Result;

/// Clause appended to rule predicates so default inbox scoping cannot hide
/// matches.
pub const ANYWHERE_CLAUSE: &str = "in:anywhere";

/// A positional SQL argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
    Int(i64),
    Text(String),
    Bool(bool),
}

/// `WHERE` fragments (joined with `AND`) plus paging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltQuery {
    pub where_clauses: Vec<String>,
    pub args: Vec<QueryArg>,
    pub limit: i64,
    pub offset: i64,
}

impl BuiltQuery {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn push(&mut self, clause: impl Into<String>, args: impl IntoIterator<Item = QueryArg>) {
        self.where_clauses.push(clause.into());
        self.args.extend(args);
    }

    pub fn push_clause(&mut self, clause: impl Into<String>) {
        self.where_clauses.push(clause.into());
    }

    /// Restrict the query to a single notification.
    pub fn pin_to_notification(&mut self, notification_id: i64) {
        self.push("n.id = ?", [QueryArg::Int(notification_id)]);
    }
}

pub trait QueryBuilder: Send + Sync {
    fn build_query(&self, query: &str, page_size: i64, offset: i64) -> Result<BuiltQuery>;
}

/// `(query) AND in:anywhere`
pub fn include_anywhere(query: &str) -> String {
    format!("({}) AND {}", query, ANYWHERE_CLAUSE)
}
