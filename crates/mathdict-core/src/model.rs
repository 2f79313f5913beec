//! Rows of the hosted database and the insert payloads ("drafts") for them.
//!
//! Rows deserialize from whatever the store returns; unknown columns are
//! ignored. Drafts serialize only the writable columns, with `null` for
//! cleared optional values so an update can blank a field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest school grade a term can be tagged with.
pub const MIN_GRADE: i32 = 1;

/// Highest school grade a term can be tagged with.
pub const MAX_GRADE: i32 = 11;

// ============================================================================
// Catalog
// ============================================================================

/// A dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Row id.
    pub id: Uuid,
    /// Term name, e.g. "Hypotenuse".
    pub name: String,
    /// Definition text.
    pub definition: String,
    /// Worked example.
    #[serde(default)]
    pub example: Option<String>,
    /// Illustration URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// School grade the term is introduced in (1-11).
    #[serde(default)]
    pub grade_level: Option<i32>,
    /// Topic the term belongs to; may reference a deleted topic.
    #[serde(default)]
    pub topic_id: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A term with its topic embedded under `topics`.
///
/// `topics` is `None` when the term has no topic or the topic was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermWithTopic {
    /// The term itself.
    #[serde(flatten)]
    pub term: Term,
    /// The joined topic.
    #[serde(default)]
    pub topics: Option<Topic>,
}

/// A subject area grouping terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Row id.
    pub id: Uuid,
    /// Topic name, e.g. "Geometry".
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A school grade with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeLevel {
    /// Row id.
    pub id: Uuid,
    /// Grade number (1-11).
    pub level: i32,
    /// Display name, e.g. "5th grade".
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Quizzes
// ============================================================================

/// A quiz's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    /// Row id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Description shown on the preview.
    #[serde(default)]
    pub description: Option<String>,
    /// Countdown length in minutes; `None` means untimed.
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    /// Free-form difficulty label.
    #[serde(default)]
    pub difficulty_level: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Quiz {
    /// Countdown length in seconds, if the quiz is timed.
    ///
    /// A limit of zero minutes counts as untimed.
    #[must_use]
    pub fn time_limit_seconds(&self) -> Option<u32> {
        self.time_limit_minutes
            .filter(|m| *m > 0)
            .map(|m| m.saturating_mul(60))
    }
}

/// One multiple-choice question of a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// Row id.
    pub id: Uuid,
    /// Parent quiz.
    #[serde(default)]
    pub quiz_id: Option<Uuid>,
    /// Question text.
    pub question: String,
    /// Answer options in stored order.
    pub options: Vec<String>,
    /// Index of the correct option as stored; validated when loaded.
    pub correct_answer: i64,
    /// Place in the quiz as last saved by the editor; rows without one
    /// come after the rest.
    #[serde(default)]
    pub position: Option<u32>,
    /// Creation time; breaks ties between equal positions.
    pub created_at: DateTime<Utc>,
}

impl QuizQuestion {
    /// The correct index, if it points at an existing option.
    #[must_use]
    pub fn correct_index(&self) -> Option<usize> {
        usize::try_from(self.correct_answer)
            .ok()
            .filter(|i| *i < self.options.len())
    }
}

/// One submitted quiz rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRating {
    /// Row id.
    pub id: Uuid,
    /// Rated quiz.
    pub quiz_id: Uuid,
    /// Submitting user, if signed in.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Rating, 1-5.
    pub rating: u8,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Accounts
// ============================================================================

/// Profile row mirroring an identity-service user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the identity user.
    pub id: Uuid,
    /// Display name.
    #[serde(default)]
    pub username: Option<String>,
    /// Role; the configured admin role unlocks the admin panel.
    #[serde(default)]
    pub role: Option<String>,
}

// ============================================================================
// Drafts
// ============================================================================

/// Writable columns of a term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDraft {
    /// Term name.
    pub name: String,
    /// Definition text.
    pub definition: String,
    /// Worked example.
    pub example: Option<String>,
    /// Illustration URL.
    pub image_url: Option<String>,
    /// School grade (1-11).
    pub grade_level: Option<i32>,
    /// Topic id.
    pub topic_id: Option<Uuid>,
}

/// Writable columns of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDraft {
    /// Topic name.
    pub name: String,
    /// Short description.
    pub description: Option<String>,
}

/// Writable columns of a grade level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeLevelDraft {
    /// Grade number.
    pub level: i32,
    /// Display name.
    pub name: String,
}

/// Writable columns of a quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDraft {
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Countdown length in minutes.
    pub time_limit_minutes: Option<u32>,
    /// Difficulty label.
    pub difficulty_level: Option<String>,
}

/// Writable columns of a quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    /// Parent quiz.
    pub quiz_id: Uuid,
    /// Question text.
    pub question: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_answer: usize,
    /// Place in the quiz.
    pub position: u32,
}

/// A rating submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDraft {
    /// Rated quiz.
    pub quiz_id: Uuid,
    /// Submitting user, if signed in.
    pub user_id: Option<Uuid>,
    /// Rating, 1-5.
    pub rating: u8,
}

/// Profile row created at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDraft {
    /// Identity user id.
    pub id: Uuid,
    /// Display name.
    pub username: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_term_with_dangling_topic_deserializes() {
        let row = json!({
            "id": "0b8c5f3e-5c77-4a52-9d1a-3f1b2c4d5e6f",
            "name": "Angle",
            "definition": "Figure formed by two rays",
            "example": null,
            "image_url": null,
            "grade_level": 5,
            "topic_id": "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d",
            "created_at": "2024-01-10T08:00:00.000000Z",
            "updated_at": "2024-01-10T08:00:00+00:00",
            "topics": null
        });
        let term: TermWithTopic = serde_json::from_value(row).unwrap();
        assert_eq!(term.term.name, "Angle");
        assert_eq!(term.term.grade_level, Some(5));
        assert!(term.term.topic_id.is_some());
        assert!(term.topics.is_none());
    }

    #[test]
    fn test_question_correct_index() {
        let mut question = QuizQuestion {
            id: Uuid::new_v4(),
            quiz_id: None,
            question: "2 + 2".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            correct_answer: 1,
            position: None,
            created_at: Utc::now(),
        };
        assert_eq!(question.correct_index(), Some(1));

        question.correct_answer = 2;
        assert_eq!(question.correct_index(), None);

        question.correct_answer = -1;
        assert_eq!(question.correct_index(), None);
    }

    #[test]
    fn test_time_limit_seconds() {
        let mut quiz = Quiz {
            id: Uuid::new_v4(),
            title: "Timed".to_string(),
            description: None,
            time_limit_minutes: Some(2),
            difficulty_level: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert_eq!(quiz.time_limit_seconds(), Some(120));

        quiz.time_limit_minutes = Some(0);
        assert_eq!(quiz.time_limit_seconds(), None);

        quiz.time_limit_minutes = None;
        assert_eq!(quiz.time_limit_seconds(), None);
    }

    #[test]
    fn test_draft_serializes_nulls() {
        let draft = TermDraft {
            name: "Ray".to_string(),
            definition: "Half of a line".to_string(),
            ..TermDraft::default()
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["example"], serde_json::Value::Null);
        assert_eq!(value["topic_id"], serde_json::Value::Null);
    }
}
