//! Admin panel: create, edit and delete every catalog entity.
//!
//! Each action validates its form first; a rejected form sends nothing.
//! Editing a quiz applies an explicit diff to its questions instead of
//! deleting and reinserting the whole set.

use std::collections::HashSet;
use std::sync::Arc;

use mathdict_store::Store;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::data::Repository;
use crate::error::Result;
use crate::forms::{GradeLevelForm, QuestionInput, QuizForm, TermForm, TopicForm};
use crate::model::{GradeLevel, Quiz, QuizQuestion, Term, TermWithTopic, Topic};

/// Tabs of the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminTab {
    /// Dictionary terms.
    Terms,
    /// Topics.
    Topics,
    /// Grade levels.
    GradeLevels,
    /// Quizzes.
    Quizzes,
}

impl AdminTab {
    /// Every tab, in display order.
    pub const ALL: [Self; 4] = [Self::Terms, Self::Topics, Self::GradeLevels, Self::Quizzes];

    /// Path segment of the tab.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Terms => "terms",
            Self::Topics => "topics",
            Self::GradeLevels => "grade-levels",
            Self::Quizzes => "quizzes",
        }
    }
}

impl std::str::FromStr for AdminTab {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tab| tab.as_str() == s)
            .ok_or_else(|| format!("unknown admin tab '{s}'"))
    }
}

/// The rows listed on one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tab", content = "rows", rename_all = "kebab-case")]
pub enum AdminListing {
    /// Terms with their topics.
    Terms(Vec<TermWithTopic>),
    /// Topics.
    Topics(Vec<Topic>),
    /// Grade levels.
    GradeLevels(Vec<GradeLevel>),
    /// Quizzes.
    Quizzes(Vec<Quiz>),
}

/// A quiz with its questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizWithQuestions {
    /// The quiz.
    pub quiz: Quiz,
    /// Its questions, in editor order.
    pub questions: Vec<QuizQuestion>,
}

/// Changes that bring a stored question set in line with a submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSyncPlan {
    /// Stored questions to overwrite.
    pub update: Vec<(Uuid, QuestionInput)>,
    /// New questions.
    pub insert: Vec<QuestionInput>,
    /// Stored questions no longer in the form.
    pub delete: Vec<Uuid>,
}

impl QuestionSyncPlan {
    /// Returns `true` if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.insert.is_empty() && self.delete.is_empty()
    }
}

/// Diffs the stored questions against the submitted ones.
///
/// A submitted question whose id is stored (and not claimed by an earlier
/// question) updates that row; any other question is inserted. Stored
/// questions left unclaimed are deleted. Updates rewrite the position too,
/// so moving a question in the editor moves it in the saved quiz.
#[must_use]
pub fn plan_question_sync(existing: &[QuizQuestion], submitted: Vec<QuestionInput>) -> QuestionSyncPlan {
    let stored: HashSet<Uuid> = existing.iter().map(|q| q.id).collect();
    let mut claimed = HashSet::new();
    let mut plan = QuestionSyncPlan::default();

    for question in submitted {
        match question.id {
            Some(id) if stored.contains(&id) && claimed.insert(id) => {
                plan.update.push((id, question));
            }
            _ => plan.insert.push(question),
        }
    }
    plan.delete = existing
        .iter()
        .map(|q| q.id)
        .filter(|id| !claimed.contains(id))
        .collect();
    plan
}

/// Admin actions over the repository.
#[derive(Debug)]
pub struct AdminPanel<S> {
    repo: Arc<Repository<S>>,
}

impl<S: Store> AdminPanel<S> {
    /// Creates the panel.
    pub const fn new(repo: Arc<Repository<S>>) -> Self {
        Self { repo }
    }

    /// The panel with its writes sent under `access_token`, sharing this
    /// panel's cache. Without a token the panel is reused as is.
    pub fn acting_as(&self, access_token: Option<&str>) -> Result<Self> {
        let repo = match access_token {
            Some(token) => Arc::new(self.repo.acting_as(token)?),
            None => Arc::clone(&self.repo),
        };
        Ok(Self { repo })
    }

    /// Rows of one tab.
    pub async fn list(&self, tab: AdminTab) -> Result<AdminListing> {
        Ok(match tab {
            AdminTab::Terms => AdminListing::Terms(self.repo.terms().await?),
            AdminTab::Topics => AdminListing::Topics(self.repo.topics().await?),
            AdminTab::GradeLevels => AdminListing::GradeLevels(self.repo.grade_levels().await?),
            AdminTab::Quizzes => AdminListing::Quizzes(self.repo.quizzes().await?),
        })
    }

    /// Creates (`id` of `None`) or updates a term.
    pub async fn save_term(&self, id: Option<Uuid>, form: &TermForm) -> Result<Term> {
        let draft = form.to_draft()?;
        match id {
            Some(id) => self.repo.update_term(id, &draft).await,
            None => self.repo.create_term(&draft).await,
        }
    }

    /// Deletes a term.
    pub async fn delete_term(&self, id: Uuid) -> Result<()> {
        self.repo.delete_term(id).await
    }

    /// Creates or updates a topic.
    pub async fn save_topic(&self, id: Option<Uuid>, form: &TopicForm) -> Result<Topic> {
        let draft = form.to_draft()?;
        match id {
            Some(id) => self.repo.update_topic(id, &draft).await,
            None => self.repo.create_topic(&draft).await,
        }
    }

    /// Deletes a topic; its terms lose their badge but stay listed.
    pub async fn delete_topic(&self, id: Uuid) -> Result<()> {
        self.repo.delete_topic(id).await
    }

    /// Creates or updates a grade level.
    pub async fn save_grade_level(&self, id: Option<Uuid>, form: &GradeLevelForm) -> Result<GradeLevel> {
        let draft = form.to_draft()?;
        match id {
            Some(id) => self.repo.update_grade_level(id, &draft).await,
            None => self.repo.create_grade_level(&draft).await,
        }
    }

    /// Deletes a grade level.
    pub async fn delete_grade_level(&self, id: Uuid) -> Result<()> {
        self.repo.delete_grade_level(id).await
    }

    /// The editor for a stored quiz.
    pub async fn quiz_form(&self, id: Uuid) -> Result<QuizForm> {
        let quiz = self.repo.quiz(id).await?;
        let questions = self.repo.questions(id).await?;
        Ok(QuizForm::from_quiz(&quiz, &questions))
    }

    /// Creates or updates a quiz together with its questions.
    ///
    /// The steps are independent requests; if one fails, the earlier ones
    /// stay applied and the error is returned.
    pub async fn save_quiz(&self, id: Option<Uuid>, form: &QuizForm) -> Result<QuizWithQuestions> {
        let submission = form.validate()?;

        let quiz = match id {
            None => {
                let quiz = self.repo.create_quiz(&submission.quiz).await?;
                for question in submission.questions {
                    self.repo
                        .create_question(&question.into_draft(quiz.id))
                        .await?;
                }
                quiz
            }
            Some(id) => {
                let quiz = self.repo.update_quiz(id, &submission.quiz).await?;
                let existing = self.repo.questions(id).await?;
                let plan = plan_question_sync(&existing, submission.questions);
                info!(
                    quiz_id = %id,
                    update = plan.update.len(),
                    insert = plan.insert.len(),
                    delete = plan.delete.len(),
                    "syncing questions"
                );

                for (question_id, question) in plan.update {
                    self.repo
                        .update_question(question_id, &question.into_draft(id))
                        .await?;
                }
                for question in plan.insert {
                    self.repo.create_question(&question.into_draft(id)).await?;
                }
                for question_id in plan.delete {
                    self.repo.delete_question(question_id).await?;
                }
                quiz
            }
        };

        let questions = self.repo.questions(quiz.id).await?;
        Ok(QuizWithQuestions { quiz, questions })
    }

    /// Deletes a quiz with its questions and ratings.
    pub async fn delete_quiz(&self, id: Uuid) -> Result<()> {
        self.repo.delete_quiz(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Utc;
    use mathdict_store::{MemoryStore, Table};

    use super::*;
    use crate::error::{DictError, ErrorCategory};
    use crate::forms::QuestionForm;

    fn panel() -> AdminPanel<MemoryStore> {
        AdminPanel::new(Arc::new(Repository::new(MemoryStore::new())))
    }

    fn stored(id: Uuid) -> QuizQuestion {
        QuizQuestion {
            id,
            quiz_id: None,
            question: "q".to_string(),
            options: vec!["a".to_string()],
            correct_answer: 0,
            position: None,
            created_at: Utc::now(),
        }
    }

    fn input(id: Option<Uuid>, text: &str) -> QuestionInput {
        QuestionInput {
            id,
            question: text.to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_answer: 1,
            position: 0,
        }
    }

    fn question(text: &str, options: &[&str], correct: usize) -> QuestionForm {
        QuestionForm {
            id: None,
            question: text.to_string(),
            options: options.iter().map(|s| (*s).to_string()).collect(),
            correct_answer: correct,
        }
    }

    #[test]
    fn test_plan_question_sync() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let existing = vec![stored(a), stored(b), stored(c)];
        let unknown = Uuid::new_v4();

        let plan = plan_question_sync(
            &existing,
            vec![
                input(Some(a), "kept"),
                input(None, "new"),
                input(Some(unknown), "foreign id"),
                input(Some(a), "duplicate"),
                input(Some(c), "also kept"),
            ],
        );

        assert_eq!(plan.update.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(plan.insert.len(), 3);
        assert_eq!(plan.delete, vec![b]);
    }

    #[test]
    fn test_plan_unchanged_set() {
        let a = Uuid::new_v4();
        let plan = plan_question_sync(&[stored(a)], vec![]);
        assert_eq!(plan.delete, vec![a]);
        assert!(plan_question_sync(&[], vec![]).is_empty());
    }

    #[test]
    fn test_tab_parsing() {
        assert_eq!("grade-levels".parse::<AdminTab>(), Ok(AdminTab::GradeLevels));
        assert!("users".parse::<AdminTab>().is_err());
    }

    #[tokio::test]
    async fn test_invalid_form_sends_nothing() {
        let panel = panel();
        let err = panel
            .save_term(None, &TermForm::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(panel.repo.store().rows(Table::Terms).await.is_empty());
    }

    #[tokio::test]
    async fn test_term_create_and_edit() {
        let panel = panel();
        let mut form = TermForm {
            name: "Prism".to_string(),
            definition: "A polyhedron".to_string(),
            grade_level: Some(10),
            ..TermForm::default()
        };
        let term = panel.save_term(None, &form).await.unwrap();

        form.example = "A cube".to_string();
        let edited = panel.save_term(Some(term.id), &form).await.unwrap();
        assert_eq!(edited.id, term.id);
        assert_eq!(edited.example.as_deref(), Some("A cube"));

        let AdminListing::Terms(rows) = panel.list(AdminTab::Terms).await.unwrap() else {
            panic!("expected terms");
        };
        assert_eq!(rows.len(), 1);

        panel.delete_term(term.id).await.unwrap();
        assert!(matches!(
            panel.delete_term(term.id).await,
            Err(DictError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_quiz_save_applies_diff() {
        let panel = panel();
        let form = QuizForm {
            title: "Angles".to_string(),
            time_limit_minutes: Some(5),
            questions: vec![
                question("Right angle?", &["90", "45"], 0),
                question("Straight angle?", &["180", "360"], 0),
                question("", &["", ""], 0),
            ],
            ..QuizForm::default()
        };
        let created = panel.save_quiz(None, &form).await.unwrap();
        assert_eq!(created.questions.len(), 2);
        let kept_id = created.questions[0].id;
        let dropped_id = created.questions[1].id;

        let mut edit = panel.quiz_form(created.quiz.id).await.unwrap();
        assert_eq!(edit.questions.len(), 2);
        edit.questions[0].options.push("30".to_string());
        edit.remove_question(1);
        edit.add_question();
        edit.questions[1] = question("Full turn?", &["360", "90"], 0);

        let saved = panel.save_quiz(Some(created.quiz.id), &edit).await.unwrap();
        assert_eq!(saved.quiz.time_limit_minutes, Some(5));
        assert_eq!(saved.questions.len(), 2);
        assert_eq!(saved.questions[0].id, kept_id);
        assert_eq!(saved.questions[0].options.len(), 3);
        assert!(saved.questions.iter().all(|q| q.id != dropped_id));
        assert!(saved.questions.iter().any(|q| q.question == "Full turn?"));
    }

    #[tokio::test]
    async fn test_quiz_save_keeps_editor_order() {
        let panel = panel();
        let form = QuizForm {
            title: "Order".to_string(),
            questions: vec![
                question("first", &["a", "b"], 0),
                question("second", &["a", "b"], 0),
                question("third", &["a", "b"], 0),
            ],
            ..QuizForm::default()
        };
        let created = panel.save_quiz(None, &form).await.unwrap();

        let mut edit = panel.quiz_form(created.quiz.id).await.unwrap();
        let last = edit.questions.remove(2);
        edit.questions.insert(0, last);
        let saved = panel.save_quiz(Some(created.quiz.id), &edit).await.unwrap();

        let texts: Vec<&str> = saved.questions.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(texts, vec!["third", "first", "second"]);
        assert_eq!(saved.questions[0].id, created.questions[2].id);

        let reloaded = panel.quiz_form(created.quiz.id).await.unwrap();
        assert_eq!(reloaded.questions[0].question, "third");
    }

    #[tokio::test]
    async fn test_acting_as_writes_with_token() {
        let store = MemoryStore::new();
        let panel = AdminPanel::new(Arc::new(Repository::new(store.clone())));
        let form = TopicForm {
            name: "Algebra".to_string(),
            ..TopicForm::default()
        };

        panel
            .acting_as(Some("admin-token"))
            .unwrap()
            .save_topic(None, &form)
            .await
            .unwrap();
        panel.acting_as(None).unwrap().save_topic(None, &form).await.unwrap();

        assert_eq!(
            store.writers(Table::Topics).await,
            vec![Some("admin-token".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_delete_quiz() {
        let panel = panel();
        let form = QuizForm {
            title: "Gone".to_string(),
            questions: vec![question("?", &["a"], 0)],
            ..QuizForm::default()
        };
        let created = panel.save_quiz(None, &form).await.unwrap();
        panel.delete_quiz(created.quiz.id).await.unwrap();

        assert!(panel.repo.store().rows(Table::QuizQuestions).await.is_empty());
        let AdminListing::Quizzes(rows) = panel.list(AdminTab::Quizzes).await.unwrap() else {
            panic!("expected quizzes");
        };
        assert!(rows.is_empty());
    }
}
