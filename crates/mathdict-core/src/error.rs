//! Error types for the mathematics dictionary.
//!
//! Every failure a page, form, admin action or quiz session can surface is a
//! [`DictError`]. [`DictError::category`] sorts them into the buckets the
//! user interface treats differently: fetch failures get a retry hint,
//! mutation failures a non-blocking notice, validation failures stay on the
//! form, and prompts are ordinary session feedback.

use std::path::PathBuf;

use mathdict_store::StoreError;
use serde::Serialize;
use uuid::Uuid;

/// A specialized `Result` type for dictionary operations.
pub type Result<T> = std::result::Result<T, DictError>;

/// Errors that can occur in the dictionary, admin panel or a quiz session.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mathdict.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// Reading from the hosted database failed.
    #[error("Failed to load {what}: {source}\n\nSuggestion: Check your connection and reload the page")]
    Fetch {
        /// What was being loaded (e.g. "terms").
        what: String,
        /// The underlying store error.
        source: StoreError,
    },

    /// Writing to the hosted database failed.
    #[error("Failed to {action}: {source}")]
    Mutation {
        /// The attempted action (e.g. "create term").
        action: String,
        /// The underlying store error.
        source: StoreError,
    },

    /// A row the caller referenced does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row ("quiz", "term", ...).
        entity: &'static str,
        /// The missing id.
        id: Uuid,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// A form field failed validation; nothing was sent.
    #[error("{field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    // ========================================================================
    // Quiz Session Prompts
    // ========================================================================
    /// `next` was requested without an answer for the current question.
    #[error("Please choose an answer before moving on")]
    AnswerRequired,

    /// The selected quiz has no questions.
    #[error("This quiz has no questions yet\n\nSuggestion: Choose another quiz")]
    NoQuestions,

    /// The questions are still loading.
    #[error("The quiz is still loading")]
    LoadPending,

    /// Loading the questions failed.
    #[error("Could not load the quiz questions: {message}\n\nSuggestion: Choose the quiz again to retry")]
    QuestionsUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A stored question's correct index is outside its options.
    #[error("Question {question_id} is corrupt: correct answer {correct} but only {options} options\n\nSuggestion: Fix the question in the admin panel")]
    CorruptQuestion {
        /// The broken question.
        question_id: Uuid,
        /// Stored correct index.
        correct: i64,
        /// Number of options.
        options: usize,
    },

    /// The chosen option does not exist on the current question.
    #[error("Option {option} does not exist; the question has {options} options")]
    InvalidAnswer {
        /// The chosen index.
        option: usize,
        /// Number of options.
        options: usize,
    },

    /// A rating outside 1..=5 was submitted.
    #[error("Rating must be between 1 and 5, got {rating}")]
    InvalidRating {
        /// The rejected rating.
        rating: u8,
    },

    /// A rating was already submitted (or is being submitted) for this attempt.
    #[error("You have already rated this quiz")]
    RatingAlreadySubmitted,

    /// The requested session operation is not valid in the current phase.
    #[error("Invalid session transition: cannot go from {from} to {to}")]
    InvalidTransition {
        /// The current phase.
        from: String,
        /// The attempted target phase.
        to: String,
    },

    /// No quiz session with this id exists.
    #[error("Quiz session not found: {id}\n\nSuggestion: Create a new session")]
    SessionNotFound {
        /// The missing session id.
        id: Uuid,
    },

    // ========================================================================
    // Account Errors
    // ========================================================================
    /// The identity service rejected the request, or no valid token was given.
    #[error("Authentication failed: {message}")]
    Unauthorized {
        /// Description of the failure.
        message: String,
    },

    /// The signed-in user may not use the admin panel.
    #[error("Admin access required\n\nSuggestion: Sign in with an account whose profile role is '{role}'")]
    Forbidden {
        /// The role the profile needs.
        role: String,
    },

    /// The quiz session was opened by another signed-in user.
    #[error("Quiz session {id} belongs to another user\n\nSuggestion: Sign in as the user who opened it, or create a new session")]
    SessionForbidden {
        /// The session id.
        id: Uuid,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Results report could not be produced.
    #[error("Report error: {0}")]
    Report(#[from] mathdict_report::ReportError),
}

/// How the user interface should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A list or page failed to load; offer a retry.
    Fetch,
    /// A create/update/delete failed; show a notice, keep the form.
    Mutation,
    /// Input was rejected before any request.
    Validation,
    /// Ordinary session feedback (answer required, already rated...).
    Prompt,
    /// Missing or insufficient credentials.
    Auth,
    /// The referenced row or session does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Mutation => write!(f, "mutation"),
            Self::Validation => write!(f, "validation"),
            Self::Prompt => write!(f, "prompt"),
            Self::Auth => write!(f, "auth"),
            Self::NotFound => write!(f, "not_found"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl DictError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wraps a store error raised while loading `what`.
    #[must_use]
    pub fn fetch(what: impl Into<String>, source: StoreError) -> Self {
        Self::Fetch {
            what: what.into(),
            source,
        }
    }

    /// Wraps a store error raised while performing `action`.
    #[must_use]
    pub fn mutation(action: impl Into<String>, source: StoreError) -> Self {
        Self::Mutation {
            action: action.into(),
            source,
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub const fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns how the user interface should treat this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch { .. } => ErrorCategory::Fetch,
            Self::Mutation { .. } => ErrorCategory::Mutation,
            Self::Validation { .. }
            | Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidAnswer { .. }
            | Self::InvalidRating { .. } => ErrorCategory::Validation,
            Self::AnswerRequired
            | Self::NoQuestions
            | Self::LoadPending
            | Self::QuestionsUnavailable { .. }
            | Self::CorruptQuestion { .. }
            | Self::RatingAlreadySubmitted
            | Self::InvalidTransition { .. } => ErrorCategory::Prompt,
            Self::Unauthorized { .. } | Self::Forbidden { .. } | Self::SessionForbidden { .. } => {
                ErrorCategory::Auth
            }
            Self::NotFound { .. } | Self::SessionNotFound { .. } => ErrorCategory::NotFound,
            Self::Io(_) | Self::Json(_) | Self::Report(_) => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if the caller may simply try the same request again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Mutation { .. } | Self::QuestionsUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DictError::fetch("terms", StoreError::Auth("bad key".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("Failed to load terms"));
        assert!(msg.contains("bad key"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(DictError::AnswerRequired.category(), ErrorCategory::Prompt);
        assert_eq!(
            DictError::RatingAlreadySubmitted.category(),
            ErrorCategory::Prompt
        );
        assert_eq!(
            DictError::validation("name", "required").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            DictError::mutation("delete topic", StoreError::Auth("x".to_string())).category(),
            ErrorCategory::Mutation
        );
        assert_eq!(
            DictError::not_found("quiz", Uuid::nil()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            DictError::Forbidden {
                role: "admin".to_string()
            }
            .category(),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(DictError::fetch("quizzes", StoreError::Auth("x".to_string())).is_retryable());
        assert!(!DictError::AnswerRequired.is_retryable());
        assert!(!DictError::validation("email", "invalid").is_retryable());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(ErrorCategory::Fetch.to_string(), "fetch");
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = DictError::validation("title", "must not be empty");
        assert_eq!(err.to_string(), "title: must not be empty");
    }
}
