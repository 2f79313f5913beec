//! mathdict Results Reports
//!
//! Types and generators for the results of one completed quiz attempt.
//! A report can be serialized to JSON for programmatic access or rendered to
//! Markdown for people.
//!
//! # Types
//!
//! - [`Report`] - The complete results of one attempt
//! - [`ReportSummary`] - Counts, score and score band
//! - [`QuestionReview`] - One question with the chosen and correct options
//! - [`ScoreBand`] - The four score bands shown on the results view
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use mathdict_report::{MarkdownGenerator, QuestionReview, Report};
//!
//! let report = Report::builder()
//!     .quiz_title("Fractions")
//!     .question(QuestionReview::new(1, "1/2 + 1/4 = ?", vec!["3/4".into(), "2/6".into()], Some(0), 0))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(report.summary.score_percent, 100);
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Quiz Results: Fractions"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Score
// ============================================================================

/// Percentage of correct answers, rounded half up.
///
/// Uses integer arithmetic so `3/4` is `75`, `1/3` is `33` and `2/3` is `67`.
/// An empty quiz scores `0`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn score_percent(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = if correct > total { total } else { correct };
    ((200 * correct + total) / (2 * total)) as u32
}

/// Score band shown on the results view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// 90% and above.
    Excellent,
    /// 70% to 89%.
    Good,
    /// 50% to 69%.
    Fair,
    /// Below 50%.
    #[default]
    NeedsPractice,
}

impl ScoreBand {
    /// Returns the band a score falls into.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        match score {
            90.. => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            _ => Self::NeedsPractice,
        }
    }

    /// Encouragement message for the band.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent! You know your mathematics really well!",
            Self::Good => "Good work! Keep exploring mathematics!",
            Self::Fair => "Not bad! There is still something to work on.",
            Self::NeedsPractice => "More practice needed. Don't give up!",
        }
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::NeedsPractice => "needs practice",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Report
// ============================================================================

/// Results of one completed quiz attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Title of the quiz.
    pub quiz_title: String,

    /// Id of the quiz, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,

    /// When the report was produced.
    pub generated_at: DateTime<Utc>,

    /// Counts, score and band.
    pub summary: ReportSummary,

    /// Per-question review, in the order the questions were asked.
    pub questions: Vec<QuestionReview>,
}

impl Report {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Serializes the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Questions answered incorrectly or left unanswered.
    pub fn missed(&self) -> impl Iterator<Item = &QuestionReview> {
        self.questions.iter().filter(|q| !q.is_correct)
    }
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for constructing [`Report`] instances.
///
/// The summary is computed from the questions in [`ReportBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    quiz_title: Option<String>,
    quiz_id: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    timed_out: bool,
    questions: Vec<QuestionReview>,
}

impl ReportBuilder {
    /// Sets the quiz title (required).
    #[must_use]
    pub fn quiz_title(mut self, title: impl Into<String>) -> Self {
        self.quiz_title = Some(title.into());
        self
    }

    /// Sets the quiz id.
    #[must_use]
    pub fn quiz_id(mut self, id: impl Into<String>) -> Self {
        self.quiz_id = Some(id.into());
        self
    }

    /// Overrides the generation timestamp (defaults to now).
    #[must_use]
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Marks the attempt as ended by the countdown.
    #[must_use]
    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Adds a reviewed question.
    #[must_use]
    pub fn question(mut self, question: QuestionReview) -> Self {
        self.questions.push(question);
        self
    }

    /// Sets all reviewed questions.
    #[must_use]
    pub fn questions(mut self, questions: Vec<QuestionReview>) -> Self {
        self.questions = questions;
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the title is missing or a
    /// question's correct index is outside its options.
    pub fn build(self) -> Result<Report> {
        let quiz_title = self
            .quiz_title
            .ok_or_else(|| ReportError::InvalidData("quiz_title is required".to_string()))?;

        if let Some(bad) = self
            .questions
            .iter()
            .find(|q| q.correct >= q.options.len())
        {
            return Err(ReportError::InvalidData(format!(
                "question {} has correct option {} but only {} options",
                bad.number,
                bad.correct,
                bad.options.len()
            )));
        }

        let summary = ReportSummary::tally(&self.questions, self.timed_out);

        Ok(Report {
            quiz_title,
            quiz_id: self.quiz_id,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
            summary,
            questions: self.questions,
        })
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

/// Counts and score of an attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Questions answered correctly.
    pub correct: usize,
    /// Questions answered with a wrong option.
    pub incorrect: usize,
    /// Questions with no answer (scored as incorrect).
    pub unanswered: usize,
    /// Number of questions.
    pub total: usize,
    /// Rounded percentage of correct answers.
    pub score_percent: u32,
    /// Whether the countdown ended the attempt.
    pub timed_out: bool,
    /// Score band.
    pub band: ScoreBand,
    /// Band message.
    pub message: String,
}

impl ReportSummary {
    /// Computes the summary of a set of reviewed questions.
    #[must_use]
    pub fn tally(questions: &[QuestionReview], timed_out: bool) -> Self {
        let correct = questions.iter().filter(|q| q.is_correct).count();
        let unanswered = questions.iter().filter(|q| q.chosen.is_none()).count();
        let total = questions.len();
        let score = score_percent(correct, total);
        let band = ScoreBand::from_score(score);

        Self {
            correct,
            incorrect: total - correct - unanswered,
            unanswered,
            total,
            score_percent: score,
            timed_out,
            band,
            message: band.message().to_string(),
        }
    }
}

// ============================================================================
// QuestionReview
// ============================================================================

/// One question of a completed attempt, as shown on the review list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReview {
    /// 1-based position in the attempt.
    pub number: usize,
    /// Question text.
    pub question: String,
    /// Options in the order they were displayed.
    pub options: Vec<String>,
    /// Index of the chosen option, if any.
    pub chosen: Option<usize>,
    /// Index of the correct option.
    pub correct: usize,
    /// Whether the chosen option is the correct one.
    pub is_correct: bool,
}

impl QuestionReview {
    /// Creates a review row; `is_correct` is derived from `chosen`.
    #[must_use]
    pub fn new(
        number: usize,
        question: impl Into<String>,
        options: Vec<String>,
        chosen: Option<usize>,
        correct: usize,
    ) -> Self {
        Self {
            number,
            question: question.into(),
            options,
            chosen,
            correct,
            is_correct: chosen == Some(correct),
        }
    }

    /// Text of the chosen option.
    #[must_use]
    pub fn chosen_text(&self) -> Option<&str> {
        self.chosen
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }

    /// Text of the correct option.
    #[must_use]
    pub fn correct_text(&self) -> &str {
        self.options.get(self.correct).map_or("", String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_score_percent_rounds_half_up() {
        assert_eq!(score_percent(3, 4), 75);
        assert_eq!(score_percent(1, 3), 33);
        assert_eq!(score_percent(2, 3), 67);
        assert_eq!(score_percent(1, 8), 13);
        assert_eq!(score_percent(5, 5), 100);
        assert_eq!(score_percent(0, 0), 0);
    }

    #[test]
    fn test_score_band_boundaries() {
        assert_eq!(ScoreBand::from_score(100), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(90), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(89), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(70), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(69), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(50), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(49), ScoreBand::NeedsPractice);
        assert_eq!(ScoreBand::from_score(0), ScoreBand::NeedsPractice);
    }

    #[test]
    fn test_builder_tallies_summary() {
        let report = Report::builder()
            .quiz_title("Geometry")
            .question(QuestionReview::new(1, "a", options(&["x", "y"]), Some(0), 0))
            .question(QuestionReview::new(2, "b", options(&["x", "y"]), Some(0), 1))
            .question(QuestionReview::new(3, "c", options(&["x", "y"]), None, 1))
            .timed_out(true)
            .build()
            .unwrap();

        let summary = &report.summary;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.incorrect, 1);
        assert_eq!(summary.unanswered, 1);
        assert_eq!(summary.score_percent, 33);
        assert_eq!(summary.band, ScoreBand::NeedsPractice);
        assert!(summary.timed_out);
        assert_eq!(report.missed().count(), 2);
    }

    #[test]
    fn test_builder_requires_title() {
        let err = Report::builder().build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(_)));
    }

    #[test]
    fn test_builder_rejects_out_of_range_correct() {
        let err = Report::builder()
            .quiz_title("Broken")
            .question(QuestionReview::new(1, "a", options(&["x"]), None, 3))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("question 1"));
    }

    #[test]
    fn test_question_review_texts() {
        let review = QuestionReview::new(1, "2 + 2", options(&["3", "4"]), Some(0), 1);
        assert!(!review.is_correct);
        assert_eq!(review.chosen_text(), Some("3"));
        assert_eq!(review.correct_text(), "4");
    }

    #[test]
    fn test_empty_report_scores_zero() {
        let report = Report::builder().quiz_title("Empty").build().unwrap();
        assert_eq!(report.summary.score_percent, 0);
        assert_eq!(report.summary.total, 0);
    }
}
