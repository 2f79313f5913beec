//! Admin form values and their validation.
//!
//! A form holds what the user typed. `to_draft` checks it and builds the
//! insert/update payload; nothing is sent when validation fails, so the
//! form can be corrected and resubmitted as is.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DictError, Result};
use crate::model::{
    GradeLevel, GradeLevelDraft, QuestionDraft, Quiz, QuizDraft, QuizQuestion, Term, TermDraft,
    Topic, TopicDraft, MAX_GRADE, MIN_GRADE,
};

/// Number of option slots a new question starts with.
pub const DEFAULT_OPTION_SLOTS: usize = 4;

static IMAGE_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").ok());

fn is_image_url(value: &str) -> bool {
    IMAGE_URL.as_ref().is_some_and(|re| re.is_match(value))
}

/// Trims `value`, mapping blank input to `None`.
fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Trims `value`, rejecting blank input.
fn required_text(field: &str, value: &str) -> Result<String> {
    optional_text(value).ok_or_else(|| DictError::validation(field, "must not be empty"))
}

fn check_grade(field: &str, level: i32) -> Result<i32> {
    if (MIN_GRADE..=MAX_GRADE).contains(&level) {
        Ok(level)
    } else {
        Err(DictError::validation(
            field,
            format!("must be between {MIN_GRADE} and {MAX_GRADE}, got {level}"),
        ))
    }
}

// ============================================================================
// Term
// ============================================================================

/// The term editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermForm {
    /// Term name (required).
    pub name: String,
    /// Definition (required).
    pub definition: String,
    /// Example; blank clears it.
    pub example: String,
    /// Illustration URL; blank clears it.
    pub image_url: String,
    /// School grade, 1-11.
    pub grade_level: Option<i32>,
    /// Topic.
    pub topic_id: Option<Uuid>,
}

impl TermForm {
    /// Prefills the editor from a stored term.
    #[must_use]
    pub fn from_term(term: &Term) -> Self {
        Self {
            name: term.name.clone(),
            definition: term.definition.clone(),
            example: term.example.clone().unwrap_or_default(),
            image_url: term.image_url.clone().unwrap_or_default(),
            grade_level: term.grade_level,
            topic_id: term.topic_id,
        }
    }

    /// Validates the form and builds the payload.
    pub fn to_draft(&self) -> Result<TermDraft> {
        let image_url = optional_text(&self.image_url);
        if let Some(url) = &image_url {
            if !is_image_url(url) {
                return Err(DictError::validation(
                    "image_url",
                    "must be an http(s) URL",
                ));
            }
        }

        Ok(TermDraft {
            name: required_text("name", &self.name)?,
            definition: required_text("definition", &self.definition)?,
            example: optional_text(&self.example),
            image_url,
            grade_level: self
                .grade_level
                .map(|level| check_grade("grade_level", level))
                .transpose()?,
            topic_id: self.topic_id,
        })
    }
}

// ============================================================================
// Topic
// ============================================================================

/// The topic editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicForm {
    /// Topic name (required).
    pub name: String,
    /// Description; blank clears it.
    pub description: String,
}

impl TopicForm {
    /// Prefills the editor from a stored topic.
    #[must_use]
    pub fn from_topic(topic: &Topic) -> Self {
        Self {
            name: topic.name.clone(),
            description: topic.description.clone().unwrap_or_default(),
        }
    }

    /// Validates the form and builds the payload.
    pub fn to_draft(&self) -> Result<TopicDraft> {
        Ok(TopicDraft {
            name: required_text("name", &self.name)?,
            description: optional_text(&self.description),
        })
    }
}

// ============================================================================
// Grade level
// ============================================================================

/// The grade level editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeLevelForm {
    /// Grade number, 1-11.
    pub level: i32,
    /// Display name (required).
    pub name: String,
}

impl GradeLevelForm {
    /// Prefills the editor from a stored grade level.
    #[must_use]
    pub fn from_grade_level(grade: &GradeLevel) -> Self {
        Self {
            level: grade.level,
            name: grade.name.clone(),
        }
    }

    /// Validates the form and builds the payload.
    pub fn to_draft(&self) -> Result<GradeLevelDraft> {
        Ok(GradeLevelDraft {
            level: check_grade("level", self.level)?,
            name: required_text("name", &self.name)?,
        })
    }
}

// ============================================================================
// Quiz
// ============================================================================

/// One question in the quiz editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionForm {
    /// Stored id when editing an existing question.
    pub id: Option<Uuid>,
    /// Question text.
    pub question: String,
    /// Option slots, possibly blank.
    pub options: Vec<String>,
    /// Index of the correct slot.
    pub correct_answer: usize,
}

impl Default for QuestionForm {
    fn default() -> Self {
        Self {
            id: None,
            question: String::new(),
            options: vec![String::new(); DEFAULT_OPTION_SLOTS],
            correct_answer: 0,
        }
    }
}

impl QuestionForm {
    /// Prefills a question from a stored row.
    #[must_use]
    pub fn from_question(question: &QuizQuestion) -> Self {
        Self {
            id: Some(question.id),
            question: question.question.clone(),
            options: question.options.clone(),
            correct_answer: question.correct_index().unwrap_or(0),
        }
    }

    /// Returns `true` if the question would be dropped on save.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.question.trim().is_empty() || self.options.iter().all(|o| o.trim().is_empty())
    }

    /// Drops blank option slots and remaps the correct index.
    fn clean(&self, index: usize) -> Result<QuestionInput> {
        let field = format!("questions[{index}]");
        let correct_is_blank = self
            .options
            .get(self.correct_answer)
            .map_or(true, |o| o.trim().is_empty());
        if correct_is_blank {
            return Err(DictError::validation(
                format!("{field}.correct_answer"),
                "the correct option must not be empty",
            ));
        }

        let mut options = Vec::with_capacity(self.options.len());
        let mut remapped = 0;
        for (index, option) in self.options.iter().enumerate() {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }
            if index == self.correct_answer {
                remapped = options.len();
            }
            options.push(option.to_string());
        }

        Ok(QuestionInput {
            id: self.id,
            question: self.question.trim().to_string(),
            options,
            correct_answer: remapped,
            position: 0,
        })
    }
}

/// A validated question, ready to be attached to a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionInput {
    /// Stored id when the question already exists.
    pub id: Option<Uuid>,
    /// Question text.
    pub question: String,
    /// Non-blank options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_answer: usize,
    /// Place among the questions that survived cleaning.
    pub position: u32,
}

impl QuestionInput {
    /// Builds the payload for `quiz_id`.
    #[must_use]
    pub fn into_draft(self, quiz_id: Uuid) -> QuestionDraft {
        QuestionDraft {
            quiz_id,
            question: self.question,
            options: self.options,
            correct_answer: self.correct_answer,
            position: self.position,
        }
    }
}

/// The quiz editor with its question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizForm {
    /// Title (required).
    pub title: String,
    /// Description; blank clears it.
    pub description: String,
    /// Countdown in minutes; `0` or absent means untimed.
    pub time_limit_minutes: Option<u32>,
    /// Difficulty label; blank clears it.
    pub difficulty_level: String,
    /// Questions; the editor always shows at least one.
    pub questions: Vec<QuestionForm>,
}

impl Default for QuizForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            time_limit_minutes: None,
            difficulty_level: String::new(),
            questions: vec![QuestionForm::default()],
        }
    }
}

/// A validated quiz form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSubmission {
    /// Quiz columns.
    pub quiz: QuizDraft,
    /// Questions that survived cleaning, in form order.
    pub questions: Vec<QuestionInput>,
}

impl QuizForm {
    /// An empty editor with one blank question.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefills the editor from a stored quiz and its questions.
    #[must_use]
    pub fn from_quiz(quiz: &Quiz, questions: &[QuizQuestion]) -> Self {
        let mut questions: Vec<QuestionForm> =
            questions.iter().map(QuestionForm::from_question).collect();
        if questions.is_empty() {
            questions.push(QuestionForm::default());
        }
        Self {
            title: quiz.title.clone(),
            description: quiz.description.clone().unwrap_or_default(),
            time_limit_minutes: quiz.time_limit_minutes,
            difficulty_level: quiz.difficulty_level.clone().unwrap_or_default(),
            questions,
        }
    }

    /// Appends a blank question.
    pub fn add_question(&mut self) {
        self.questions.push(QuestionForm::default());
    }

    /// Removes a question; the last remaining one cannot be removed.
    pub fn remove_question(&mut self, index: usize) -> bool {
        if self.questions.len() <= 1 || index >= self.questions.len() {
            return false;
        }
        self.questions.remove(index);
        true
    }

    /// Validates the form.
    ///
    /// Blank questions are dropped; blank options are dropped from the rest
    /// and the correct index follows its option. At least one question must
    /// remain.
    pub fn validate(&self) -> Result<QuizSubmission> {
        let quiz = QuizDraft {
            title: required_text("title", &self.title)?,
            description: optional_text(&self.description),
            time_limit_minutes: self.time_limit_minutes.filter(|m| *m > 0),
            difficulty_level: optional_text(&self.difficulty_level),
        };

        let mut questions = self
            .questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_blank())
            .map(|(index, q)| q.clean(index))
            .collect::<Result<Vec<_>>>()?;
        if questions.is_empty() {
            return Err(DictError::validation(
                "questions",
                "add at least one question with its options",
            ));
        }
        for (position, question) in questions.iter_mut().enumerate() {
            question.position = u32::try_from(position).unwrap_or(u32::MAX);
        }

        Ok(QuizSubmission { quiz, questions })
    }
}
