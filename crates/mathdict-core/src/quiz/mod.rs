//! Quiz session controller.
//!
//! A [`QuizSession`] is one user's attempt at a selected quiz. It moves
//! through `Browsing`, `Previewing`, `InProgress` and `Completed`, owns the
//! shuffled question set of the current load, and records answers, the
//! countdown, the results and the post-quiz rating.
//!
//! - [`shuffle`] - per-load option shuffling with remapped answer keys
//! - [`scoring`] - results and score bands
//! - [`rating`] - rating scale and submission state
//! - [`session`] - the state machine itself

pub mod rating;
pub mod scoring;
pub mod session;
pub mod shuffle;

pub use rating::{RatingScale, RatingState};
pub use scoring::{score_attempt, QuizResults};
pub use session::{
    Advance, LoadTicket, QuestionView, QuizPreview, QuizSession, SessionPhase, SessionView,
    TickOutcome,
};
pub use shuffle::{shuffle_questions, ShuffledQuestion};
