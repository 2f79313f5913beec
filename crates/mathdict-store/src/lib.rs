//! mathdict Store Clients
//!
//! Clients for the hosted database (PostgREST-style tables) and the hosted
//! identity service that back the mathematics dictionary.
//!
//! The [`Store`] trait is the logical surface the rest of the workspace
//! consumes: ordered selects, filtered selects, a Term→Topic join, and
//! single-table insert/update/delete. Two implementations are provided:
//!
//! - [`RestStore`] talks to the hosted service over HTTP via `reqwest`.
//! - [`MemoryStore`] keeps tables in process for tests and offline demos.

pub mod auth;
mod memory;
mod rest;

pub use auth::{AuthUser, Identity, MemoryIdentity, RestIdentity, Session, SignUp};
pub use memory::MemoryStore;
pub use rest::RestStore;

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the store and identity clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The service answered with a non-success status.
    #[error("{table} request failed with status {status}: {message}")]
    Status {
        /// Table or endpoint the request targeted.
        table: String,
        /// HTTP status code.
        status: u16,
        /// Message reported by the service.
        message: String,
    },

    /// The requested row does not exist.
    #[error("no row with id {id} in {table}")]
    NotFound {
        /// The table that was searched.
        table: Table,
        /// The missing id.
        id: Uuid,
    },

    /// The service rejected the credentials or token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The store refused the operation (used by the memory store's fault injection).
    #[error("{table} is unavailable: {message}")]
    Unavailable {
        /// The affected table.
        table: Table,
        /// Why the operation was refused.
        message: String,
    },

    /// A record had an unexpected shape.
    #[error("malformed {table} record: {message}")]
    Malformed {
        /// The table the record belongs to.
        table: Table,
        /// Description of the problem.
        message: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Tables
// ============================================================================

/// Tables of the hosted database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Dictionary terms.
    Terms,
    /// Term topics.
    Topics,
    /// School grade levels.
    GradeLevels,
    /// Quizzes.
    Quizzes,
    /// Questions belonging to a quiz.
    QuizQuestions,
    /// Append-only quiz ratings.
    QuizRatings,
    /// Profiles mirrored from the identity service.
    Profiles,
}

impl Table {
    /// Every table, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::Terms,
        Self::Topics,
        Self::GradeLevels,
        Self::Quizzes,
        Self::QuizQuestions,
        Self::QuizRatings,
        Self::Profiles,
    ];

    /// The table name as used in REST paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Terms => "terms",
            Self::Topics => "topics",
            Self::GradeLevels => "grade_levels",
            Self::Quizzes => "quizzes",
            Self::QuizQuestions => "quiz_questions",
            Self::QuizRatings => "quiz_ratings",
            Self::Profiles => "profiles",
        }
    }

    /// Returns `true` if rows of this table carry an `updated_at` column.
    #[must_use]
    pub const fn has_updated_at(&self) -> bool {
        !matches!(self, Self::QuizQuestions | Self::QuizRatings)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Query description
// ============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first, nulls last.
    Ascending,
    /// Largest first, nulls first.
    Descending,
}

/// An ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to sort by.
    pub column: String,
    /// Sort direction.
    pub direction: Direction,
}

/// An equality filter on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column to compare.
    pub column: String,
    /// Value the column must equal.
    pub value: Value,
}

impl Filter {
    /// Creates a `column = value` filter.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Creates an `id = value` filter.
    #[must_use]
    pub fn id(id: Uuid) -> Self {
        Self::eq("id", id.to_string())
    }

    /// Renders the value the way PostgREST expects it after `eq.`.
    #[must_use]
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Returns `true` if the record satisfies this filter.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        record.get(&self.column).map_or(self.value.is_null(), |v| v == &self.value)
    }
}

/// Embeds a referenced row (many-to-one) into each selected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Table holding the referenced rows.
    pub table: Table,
    /// Column in the selected table holding the referenced id.
    pub foreign_key: String,
}

impl Join {
    /// The Term→Topic join, embedded under the `topics` key.
    #[must_use]
    pub fn topic() -> Self {
        Self {
            table: Table::Topics,
            foreign_key: "topic_id".to_string(),
        }
    }
}

/// A select over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Table to read.
    pub table: Table,
    /// Equality filters, combined with AND.
    pub filters: Vec<Filter>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional embedded join.
    pub join: Option<Join>,
}

impl Select {
    /// Starts a select over every row of `table`.
    #[must_use]
    pub const fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            join: None,
        }
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sorts by `column` ascending.
    #[must_use]
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction: Direction::Ascending,
        });
        self
    }

    /// Sorts by `column` descending.
    #[must_use]
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction: Direction::Descending,
        });
        self
    }

    /// Embeds a referenced row into each result.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Logical operations of the hosted database.
///
/// Every call is a single independent request: no retries, no
/// client-side transactions. Records travel as JSON objects so the trait
/// stays independent of the entity types.
pub trait Store: Clone + Send + Sync + 'static {
    /// Reads rows matching the select.
    fn select(&self, select: Select) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Inserts records and returns the stored rows (with generated columns).
    fn insert(
        &self,
        table: Table,
        records: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Applies a partial update to the row with `id` and returns it.
    fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Value,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Deletes rows matching the filter and returns how many were removed.
    fn delete(&self, table: Table, filter: Filter) -> impl Future<Output = Result<usize>> + Send;

    /// A store whose requests carry a signed-in user's access token, so
    /// row-level policies see that user instead of the anonymous key.
    fn acting_as(&self, access_token: &str) -> Result<Self>;
}
