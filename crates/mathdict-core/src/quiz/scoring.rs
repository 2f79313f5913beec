//! Results of a completed attempt.

use mathdict_report::{QuestionReview, Report, ReportSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::quiz::shuffle::ShuffledQuestion;

pub use mathdict_report::{score_percent, ScoreBand};

/// Counts, score and per-question review of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResults {
    /// Counts, score, band and whether the countdown ended the attempt.
    #[serde(flatten)]
    pub summary: ReportSummary,
    /// One row per question, in display order.
    pub reviews: Vec<QuestionReview>,
}

impl QuizResults {
    /// Rounded percentage of correct answers.
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.summary.score_percent
    }

    /// Builds a results report for the given quiz.
    pub fn to_report(&self, quiz_title: &str, quiz_id: Option<Uuid>) -> Result<Report> {
        let mut builder = Report::builder()
            .quiz_title(quiz_title)
            .timed_out(self.summary.timed_out)
            .questions(self.reviews.clone());
        if let Some(id) = quiz_id {
            builder = builder.quiz_id(id.to_string());
        }
        Ok(builder.build()?)
    }
}

/// Scores an attempt.
///
/// `answers[i]` is the chosen display index for question `i`; missing
/// entries and `None` count as unanswered, which scores as incorrect.
#[must_use]
pub fn score_attempt(
    questions: &[ShuffledQuestion],
    answers: &[Option<usize>],
    timed_out: bool,
) -> QuizResults {
    let reviews: Vec<QuestionReview> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            QuestionReview::new(
                index + 1,
                question.question.clone(),
                question.options.clone(),
                answers.get(index).copied().flatten(),
                question.correct,
            )
        })
        .collect();

    QuizResults {
        summary: ReportSummary::tally(&reviews, timed_out),
        reviews,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn questions(n: usize) -> Vec<ShuffledQuestion> {
        (0..n)
            .map(|i| ShuffledQuestion {
                id: Uuid::new_v4(),
                question: format!("Q{i}"),
                options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                correct: i % 3,
            })
            .collect()
    }

    #[test]
    fn test_three_of_four_is_75() {
        let qs = questions(4);
        let answers = vec![Some(0), Some(1), Some(2), Some(2)];
        let results = score_attempt(&qs, &answers, false);

        assert_eq!(results.summary.correct, 3);
        assert_eq!(results.summary.incorrect, 1);
        assert_eq!(results.score(), 75);
        assert_eq!(results.summary.band, ScoreBand::Good);
    }

    #[test]
    fn test_one_of_three_is_33() {
        let qs = questions(3);
        let results = score_attempt(&qs, &[Some(0), Some(0), Some(0)], false);
        assert_eq!(results.score(), 33);
    }

    #[test]
    fn test_unanswered_scored_incorrect() {
        let qs = questions(5);
        let answers = vec![Some(0), Some(1), None];
        let results = score_attempt(&qs, &answers, true);

        assert_eq!(results.summary.total, 5);
        assert_eq!(results.summary.correct, 2);
        assert_eq!(results.summary.unanswered, 3);
        assert_eq!(results.summary.incorrect, 0);
        assert_eq!(results.score(), 40);
        assert!(results.summary.timed_out);
        assert!(!results.reviews[4].is_correct);
    }

    #[test]
    fn test_no_questions_scores_zero() {
        let results = score_attempt(&[], &[], false);
        assert_eq!(results.score(), 0);
        assert!(results.reviews.is_empty());
    }

    #[test]
    fn test_to_report() {
        let qs = questions(2);
        let results = score_attempt(&qs, &[Some(0), Some(0)], false);
        let id = Uuid::new_v4();
        let report = results.to_report("Shapes", Some(id)).unwrap();

        assert_eq!(report.quiz_title, "Shapes");
        assert_eq!(report.quiz_id, Some(id.to_string()));
        assert_eq!(report.summary, results.summary);
        assert_eq!(report.questions.len(), 2);
    }
}
