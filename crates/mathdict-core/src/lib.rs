//! mathdict Core
//!
//! Catalog filtering, admin forms and actions, accounts, the cached data
//! layer, seed catalogs and the quiz session controller of the mathematics
//! dictionary.

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod forms;
pub mod model;
pub mod notify;
pub mod quiz;
pub mod seed;

pub use accounts::{Accounts, Credentials, Registration, MIN_PASSWORD_LEN};
pub use admin::{
    plan_question_sync, AdminListing, AdminPanel, AdminTab, QuestionSyncPlan, QuizWithQuestions,
};
pub use catalog::{
    letters, CatalogPage, GradeBadge, GradeTier, QuizCard, RatingSummary, TermCard, TermFilter,
    TopicBadge,
};
pub use config::{Config, QuizConfig, ServerConfig, StoreConfig, CONFIG_FILE_NAME};
pub use data::{QueryKey, Repository, DEFAULT_CACHE_TTL};
pub use error::{DictError, ErrorCategory, Result};
pub use forms::{
    GradeLevelForm, QuestionForm, QuestionInput, QuizForm, QuizSubmission, TermForm, TopicForm,
};
pub use model::{
    GradeLevel, GradeLevelDraft, Profile, ProfileDraft, QuestionDraft, Quiz, QuizDraft,
    QuizQuestion, QuizRating, RatingDraft, Term, TermDraft, TermWithTopic, Topic, TopicDraft,
};
pub use notify::{Notice, NoticeLevel};
pub use quiz::{
    Advance, LoadTicket, QuestionView, QuizPreview, QuizResults, QuizSession, RatingScale,
    RatingState, SessionPhase, SessionView, ShuffledQuestion, TickOutcome,
};
pub use seed::{ImportSummary, SeedCatalog, SeedTerm};
