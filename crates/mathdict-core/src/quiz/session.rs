//! The quiz session state machine.
//!
//! Phases move as follows:
//! - `Browsing` -> `Previewing` (a quiz is selected and its questions load)
//! - `Previewing` -> `InProgress` (start, once the load succeeded with questions)
//! - `InProgress` -> `Completed` (last question answered, or the countdown hit zero)
//! - `Completed` -> `Previewing` (retry with the same shuffled set)
//! - any phase -> `Browsing` (choose another quiz)
//!
//! Loads are applied through a [`LoadTicket`]; a response for an older
//! selection is dropped. Countdown ticks carry the attempt number, so a tick
//! for a finished attempt is ignored.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DictError, Result};
use crate::model::{Quiz, QuizQuestion, RatingDraft};
use crate::quiz::rating::RatingState;
use crate::quiz::scoring::{score_attempt, score_percent, QuizResults};
use crate::quiz::shuffle::{shuffle_questions, ShuffledQuestion};

// ============================================================================
// SessionPhase
// ============================================================================

/// Phase of a quiz session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No quiz selected; the quiz list is shown.
    #[default]
    Browsing,
    /// A quiz is selected; its preview is shown while questions load.
    Previewing,
    /// Questions are being answered.
    InProgress,
    /// The attempt is over and results are shown.
    Completed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browsing => write!(f, "browsing"),
            Self::Previewing => write!(f, "previewing"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Identifies one load of a quiz's metadata and questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTicket {
    /// The quiz being loaded.
    pub quiz_id: Uuid,
    /// Selection counter at the time of the load.
    pub generation: u64,
}

/// Outcome of [`QuizSession::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advance {
    /// Moved to the next question.
    Moved,
    /// The last question was answered; the session is completed.
    Finished,
}

/// Outcome of [`QuizSession::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The tick was for another attempt, or no countdown is running.
    Ignored,
    /// The countdown is still running.
    Running {
        /// Seconds left.
        remaining_seconds: u32,
    },
    /// The countdown reached zero and the session was completed.
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum LoadState {
    #[default]
    Idle,
    Pending,
    Loaded,
    Failed(String),
}

// ============================================================================
// QuizSession
// ============================================================================

/// One user's attempt at a selected quiz.
#[derive(Debug, Clone, Default)]
pub struct QuizSession {
    phase: SessionPhase,
    generation: u64,
    attempt: u64,
    quiz_id: Option<Uuid>,
    quiz: Option<Quiz>,
    questions: Option<Arc<[ShuffledQuestion]>>,
    load: LoadState,
    answers: Vec<Option<usize>>,
    current: usize,
    remaining_seconds: Option<u32>,
    results: Option<QuizResults>,
    rating: RatingState,
}

impl QuizSession {
    /// Creates a session in the `Browsing` phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Id of the selected quiz.
    #[must_use]
    pub const fn quiz_id(&self) -> Option<Uuid> {
        self.quiz_id
    }

    /// Metadata of the selected quiz, once loaded.
    #[must_use]
    pub const fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    /// The shuffled question set of the current load.
    #[must_use]
    pub fn questions(&self) -> &[ShuffledQuestion] {
        self.questions.as_deref().unwrap_or(&[])
    }

    /// Index of the question being shown.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Recorded answers, by question.
    #[must_use]
    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    /// Seconds left on the countdown.
    #[must_use]
    pub const fn remaining_seconds(&self) -> Option<u32> {
        self.remaining_seconds
    }

    /// Results of the completed attempt.
    #[must_use]
    pub const fn results(&self) -> Option<&QuizResults> {
        self.results.as_ref()
    }

    /// Rating state of the current attempt.
    #[must_use]
    pub const fn rating(&self) -> &RatingState {
        &self.rating
    }

    /// Number of the current attempt; bumped by every `start`.
    #[must_use]
    pub const fn attempt_id(&self) -> u64 {
        self.attempt
    }

    /// Returns `true` while a countdown should be ticking.
    #[must_use]
    pub const fn timer_active(&self) -> bool {
        matches!(self.phase, SessionPhase::InProgress) && self.remaining_seconds.is_some()
    }

    /// Message of the last failed load, if any.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        match &self.load {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn require(&self, phase: SessionPhase, to: &str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(DictError::invalid_transition(self.phase, to))
        }
    }

    fn clear_attempt(&mut self) {
        self.answers.clear();
        self.current = 0;
        self.remaining_seconds = None;
        self.results = None;
        self.rating = RatingState::Unavailable;
    }

    // ------------------------------------------------------------------------
    // Selection and loading
    // ------------------------------------------------------------------------

    /// Selects a quiz and returns the ticket for loading it.
    ///
    /// Clears all per-attempt state. Refused while an attempt is in progress.
    pub fn select_quiz(&mut self, quiz_id: Uuid) -> Result<LoadTicket> {
        if self.phase == SessionPhase::InProgress {
            return Err(DictError::invalid_transition(self.phase, SessionPhase::Previewing));
        }

        self.generation += 1;
        self.quiz_id = Some(quiz_id);
        self.quiz = None;
        self.questions = None;
        self.load = LoadState::Pending;
        self.clear_attempt();
        self.phase = SessionPhase::Previewing;

        info!(quiz_id = %quiz_id, generation = self.generation, "quiz selected");
        Ok(LoadTicket {
            quiz_id,
            generation: self.generation,
        })
    }

    fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.quiz_id == Some(ticket.quiz_id)
            && self.phase == SessionPhase::Previewing
            && self.load == LoadState::Pending
    }

    /// Applies a completed load. Returns `false` if the ticket is stale.
    ///
    /// The questions are shuffled once here. A question with an out-of-range
    /// answer key turns the load into a failure that blocks `start`.
    pub fn apply_loaded<R: Rng + ?Sized>(
        &mut self,
        ticket: LoadTicket,
        quiz: Quiz,
        questions: &[QuizQuestion],
        rng: &mut R,
    ) -> bool {
        if !self.is_current(ticket) {
            debug!(quiz_id = %ticket.quiz_id, generation = ticket.generation, "dropping stale load");
            return false;
        }

        self.quiz = Some(quiz);
        match shuffle_questions(questions, rng) {
            Ok(shuffled) => {
                info!(quiz_id = %ticket.quiz_id, questions = shuffled.len(), "quiz loaded");
                self.questions = Some(shuffled);
                self.load = LoadState::Loaded;
            }
            Err(e) => {
                warn!(quiz_id = %ticket.quiz_id, error = %e, "quiz questions rejected");
                self.load = LoadState::Failed(e.to_string());
            }
        }
        true
    }

    /// Records a failed load. Returns `false` if the ticket is stale.
    pub fn load_failed(&mut self, ticket: LoadTicket, message: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let message = message.into();
        warn!(quiz_id = %ticket.quiz_id, error = %message, "quiz load failed");
        self.load = LoadState::Failed(message);
        true
    }

    // ------------------------------------------------------------------------
    // Attempt
    // ------------------------------------------------------------------------

    /// Starts an attempt.
    ///
    /// # Errors
    ///
    /// Refused, staying in `Previewing`, when the load is pending
    /// (`LoadPending`), failed (`QuestionsUnavailable`) or produced no
    /// questions (`NoQuestions`).
    pub fn start(&mut self) -> Result<()> {
        self.require(SessionPhase::Previewing, "in_progress")?;

        let count = match &self.load {
            LoadState::Idle | LoadState::Pending => return Err(DictError::LoadPending),
            LoadState::Failed(message) => {
                return Err(DictError::QuestionsUnavailable {
                    message: message.clone(),
                })
            }
            LoadState::Loaded => self.questions().len(),
        };
        if count == 0 {
            return Err(DictError::NoQuestions);
        }

        self.clear_attempt();
        self.answers = vec![None; count];
        self.remaining_seconds = self.quiz.as_ref().and_then(Quiz::time_limit_seconds);
        self.attempt += 1;
        self.phase = SessionPhase::InProgress;

        info!(
            quiz_id = ?self.quiz_id,
            attempt = self.attempt,
            questions = count,
            time_limit = ?self.remaining_seconds,
            "quiz started"
        );
        Ok(())
    }

    /// Records the answer for the current question.
    pub fn select_answer(&mut self, option: usize) -> Result<()> {
        self.require(SessionPhase::InProgress, "answered")?;

        let options = self
            .questions()
            .get(self.current)
            .map_or(0, |q| q.options.len());
        if option >= options {
            return Err(DictError::InvalidAnswer { option, options });
        }

        if let Some(slot) = self.answers.get_mut(self.current) {
            *slot = Some(option);
        }
        Ok(())
    }

    /// Moves to the next question, or completes the attempt on the last one.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::AnswerRequired`] when the current question has
    /// no answer; the index does not move.
    pub fn next(&mut self) -> Result<Advance> {
        self.require(SessionPhase::InProgress, "next_question")?;

        if self.answers.get(self.current).copied().flatten().is_none() {
            return Err(DictError::AnswerRequired);
        }

        if self.current + 1 < self.questions().len() {
            self.current += 1;
            Ok(Advance::Moved)
        } else {
            self.complete(false);
            Ok(Advance::Finished)
        }
    }

    /// Moves back one question; a no-op on the first question.
    pub fn previous(&mut self) -> Result<()> {
        self.require(SessionPhase::InProgress, "previous_question")?;
        self.current = self.current.saturating_sub(1);
        Ok(())
    }

    /// Applies one second of countdown for `attempt`.
    ///
    /// At zero the attempt is completed with unanswered questions scored
    /// incorrect.
    pub fn tick(&mut self, attempt: u64) -> TickOutcome {
        if self.phase != SessionPhase::InProgress || attempt != self.attempt {
            return TickOutcome::Ignored;
        }
        let Some(remaining) = self.remaining_seconds else {
            return TickOutcome::Ignored;
        };

        let remaining = remaining.saturating_sub(1);
        self.remaining_seconds = Some(remaining);
        if remaining == 0 {
            info!(quiz_id = ?self.quiz_id, attempt, "time is up");
            self.complete(true);
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining_seconds: remaining,
            }
        }
    }

    fn complete(&mut self, timed_out: bool) {
        let results = score_attempt(self.questions(), &self.answers, timed_out);
        info!(
            quiz_id = ?self.quiz_id,
            attempt = self.attempt,
            score = results.score(),
            timed_out,
            "quiz completed"
        );
        self.results = Some(results);
        self.rating = RatingState::Open;
        self.phase = SessionPhase::Completed;
    }

    /// Starts over with the same quiz and the same shuffled options.
    pub fn retry(&mut self) -> Result<()> {
        self.require(SessionPhase::Completed, "previewing")?;
        self.clear_attempt();
        self.phase = SessionPhase::Previewing;
        Ok(())
    }

    /// Returns to the quiz list and drops any in-flight load.
    pub fn choose_another(&mut self) {
        self.generation += 1;
        self.quiz_id = None;
        self.quiz = None;
        self.questions = None;
        self.load = LoadState::Idle;
        self.clear_attempt();
        self.phase = SessionPhase::Browsing;
    }

    // ------------------------------------------------------------------------
    // Rating
    // ------------------------------------------------------------------------

    /// Marks a rating submission as pending and returns the row to insert.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRating` for values outside 1..=5 and
    /// `RatingAlreadySubmitted` for a second submission.
    pub fn begin_rating(&mut self, rating: u8, user_id: Option<Uuid>) -> Result<RatingDraft> {
        self.require(SessionPhase::Completed, "rated")?;
        let quiz_id = self
            .quiz_id
            .ok_or_else(|| DictError::invalid_transition(self.phase, "rated"))?;
        self.rating.begin(rating)?;
        Ok(RatingDraft {
            quiz_id,
            user_id,
            rating,
        })
    }

    /// Records that the pending rating was stored.
    pub fn rating_succeeded(&mut self) -> bool {
        self.rating.succeed()
    }

    /// Records that the pending rating failed; the user may rate again.
    pub fn rating_failed(&mut self, message: impl Into<String>) -> bool {
        self.rating.fail(message)
    }

    // ------------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------------

    /// Serializable snapshot of the session.
    ///
    /// The answer key is only exposed through the results of a completed
    /// attempt.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let question_count = self.questions().len();
        let in_progress = self.phase == SessionPhase::InProgress;

        let current_question = if in_progress {
            self.questions()
                .get(self.current)
                .map(|q| QuestionView {
                    number: self.current + 1,
                    question: q.question.clone(),
                    options: q.options.clone(),
                })
        } else {
            None
        };

        SessionView {
            phase: self.phase,
            quiz: self.quiz.as_ref().map(|quiz| QuizPreview::new(quiz, question_count)),
            loading: self.load == LoadState::Pending,
            load_error: self.load_error().map(str::to_string),
            question_count,
            current_index: in_progress.then_some(self.current),
            current_question,
            selected: if in_progress {
                self.answers.get(self.current).copied().flatten()
            } else {
                None
            },
            answered: self.answers.iter().filter(|a| a.is_some()).count(),
            progress_percent: if in_progress {
                score_percent(self.current + 1, question_count)
            } else {
                0
            },
            remaining_seconds: self.remaining_seconds,
            attempt: self.attempt,
            results: self.results.clone(),
            rating: self.rating.clone(),
        }
    }
}

// ============================================================================
// Views
// ============================================================================

/// Quiz details shown on the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizPreview {
    /// Quiz id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Countdown length, `None` for untimed quizzes.
    pub time_limit_minutes: Option<u32>,
    /// "15 min" or "no limit".
    pub time_limit_label: String,
    /// Difficulty label.
    pub difficulty_level: Option<String>,
    /// Number of loaded questions.
    pub question_count: usize,
}

impl QuizPreview {
    /// Builds the preview of a quiz with `question_count` questions.
    #[must_use]
    pub fn new(quiz: &Quiz, question_count: usize) -> Self {
        let time_limit_label = quiz
            .time_limit_seconds()
            .map_or_else(|| "no limit".to_string(), |s| format!("{} min", s / 60));
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            time_limit_minutes: quiz.time_limit_minutes,
            time_limit_label,
            difficulty_level: quiz.difficulty_level.clone(),
            question_count,
        }
    }
}

/// The question being shown, without its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// 1-based position.
    pub number: usize,
    /// Question text.
    pub question: String,
    /// Options in display order.
    pub options: Vec<String>,
}

/// Serializable snapshot of a [`QuizSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    /// Current phase.
    pub phase: SessionPhase,
    /// Selected quiz, once loaded.
    pub quiz: Option<QuizPreview>,
    /// Whether the questions are still loading.
    pub loading: bool,
    /// Message of a failed load.
    pub load_error: Option<String>,
    /// Number of loaded questions.
    pub question_count: usize,
    /// Index of the question being shown (in progress only).
    pub current_index: Option<usize>,
    /// The question being shown (in progress only).
    pub current_question: Option<QuestionView>,
    /// Recorded answer for the question being shown.
    pub selected: Option<usize>,
    /// Number of answered questions.
    pub answered: usize,
    /// Position through the quiz as a percentage.
    pub progress_percent: u32,
    /// Seconds left on the countdown.
    pub remaining_seconds: Option<u32>,
    /// Attempt number.
    pub attempt: u64,
    /// Results of the completed attempt.
    pub results: Option<QuizResults>,
    /// Rating state.
    pub rating: RatingState,
}
