//! Seed catalogs: a JSON file of topics, grade levels, terms and quizzes
//! loaded through the admin forms.
//!
//! ```json
//! {
//!   "topics": [{ "name": "Geometry" }],
//!   "grade_levels": [{ "level": 7, "name": "7th grade" }],
//!   "terms": [{ "name": "Angle", "definition": "...", "topic": "Geometry", "grade_level": 7 }],
//!   "quizzes": [{ "title": "Angles", "questions": [{ "question": "...", "options": ["a", "b"], "correct_answer": 0 }] }]
//! }
//! ```
//!
//! Terms name their topic; the name is matched case-insensitively against
//! the topics already stored and the ones created by the same file.

use std::collections::HashMap;
use std::path::Path;

use mathdict_store::Store;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admin::{AdminListing, AdminPanel, AdminTab};
use crate::error::{DictError, Result};
use crate::forms::{GradeLevelForm, QuizForm, TermForm, TopicForm};

/// A term entry of a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTerm {
    /// Topic name; wins over `topic_id`.
    #[serde(default)]
    pub topic: Option<String>,
    /// The term itself.
    #[serde(flatten)]
    pub form: TermForm,
}

/// Contents of a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedCatalog {
    /// Topics, created first.
    pub topics: Vec<TopicForm>,
    /// Grade levels.
    pub grade_levels: Vec<GradeLevelForm>,
    /// Terms.
    pub terms: Vec<SeedTerm>,
    /// Quizzes with their questions.
    pub quizzes: Vec<QuizForm>,
}

/// Rows created by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Topics created.
    pub topics: usize,
    /// Grade levels created.
    pub grade_levels: usize,
    /// Terms created.
    pub terms: usize,
    /// Quizzes created.
    pub quizzes: usize,
}

impl SeedCatalog {
    /// Parses a seed catalog.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a seed catalog from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Validates every entry before anything is written.
    pub fn validate(&self) -> Result<()> {
        for topic in &self.topics {
            topic.to_draft()?;
        }
        for grade in &self.grade_levels {
            grade.to_draft()?;
        }
        for term in &self.terms {
            term.form.to_draft()?;
        }
        for quiz in &self.quizzes {
            quiz.validate()?;
        }
        Ok(())
    }

    /// Writes the catalog through the admin panel.
    ///
    /// Stops at the first failure; rows written before it stay.
    pub async fn import<S: Store>(&self, admin: &AdminPanel<S>) -> Result<ImportSummary> {
        self.validate()?;
        let mut summary = ImportSummary::default();

        let mut topic_ids = HashMap::new();
        if let AdminListing::Topics(existing) = admin.list(AdminTab::Topics).await? {
            for topic in existing {
                topic_ids.insert(topic.name.to_lowercase(), topic.id);
            }
        }
        for form in &self.topics {
            let topic = admin.save_topic(None, form).await?;
            topic_ids.insert(topic.name.to_lowercase(), topic.id);
            summary.topics += 1;
        }

        for form in &self.grade_levels {
            admin.save_grade_level(None, form).await?;
            summary.grade_levels += 1;
        }

        for (index, term) in self.terms.iter().enumerate() {
            let mut form = term.form.clone();
            if let Some(name) = term.topic.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                let id = topic_ids.get(&name.to_lowercase()).copied().ok_or_else(|| {
                    DictError::validation(
                        format!("terms[{index}].topic"),
                        format!("unknown topic '{name}'"),
                    )
                })?;
                form.topic_id = Some(id);
            }
            admin.save_term(None, &form).await?;
            summary.terms += 1;
        }

        for form in &self.quizzes {
            admin.save_quiz(None, form).await?;
            summary.quizzes += 1;
        }

        info!(
            topics = summary.topics,
            grade_levels = summary.grade_levels,
            terms = summary.terms,
            quizzes = summary.quizzes,
            "seed catalog imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use mathdict_store::{MemoryStore, Table};

    use super::*;
    use crate::data::Repository;

    const SEED: &str = r#"{
        "topics": [{"name": "Geometry", "description": "Shapes"}],
        "grade_levels": [{"level": 7, "name": "7th grade"}],
        "terms": [
            {"name": "Angle", "definition": "Two rays from one point", "topic": "geometry", "grade_level": 7},
            {"name": "Sum", "definition": "Result of adding"}
        ],
        "quizzes": [{
            "title": "Angles",
            "questions": [{"question": "Degrees in a right angle?", "options": ["90", "180", ""], "correct_answer": 0}]
        }]
    }"#;

    fn panel() -> (AdminPanel<MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        let repo = Arc::new(Repository::new(store.clone()));
        (AdminPanel::new(repo), store)
    }

    #[tokio::test]
    async fn test_import_resolves_topic_names() {
        let (admin, store) = panel();
        let catalog = SeedCatalog::from_json(SEED).unwrap();
        let summary = catalog.import(&admin).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                topics: 1,
                grade_levels: 1,
                terms: 2,
                quizzes: 1
            }
        );

        let topics = store.rows(Table::Topics).await;
        let terms = store.rows(Table::Terms).await;
        let angle = terms.iter().find(|t| t["name"] == "Angle").unwrap();
        assert_eq!(angle["topic_id"], topics[0]["id"]);
        assert_eq!(store.rows(Table::QuizQuestions).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_rejected() {
        let (admin, store) = panel();
        let catalog = SeedCatalog::from_json(
            r#"{"terms": [{"name": "Vector", "definition": "Magnitude and direction", "topic": "Physics"}]}"#,
        )
        .unwrap();

        let err = catalog.import(&admin).await.unwrap_err();
        assert!(err.to_string().contains("terms[0].topic"));
        assert!(store.rows(Table::Terms).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_entry_writes_nothing() {
        let (admin, store) = panel();
        let catalog = SeedCatalog::from_json(
            r#"{"topics": [{"name": "Algebra"}], "grade_levels": [{"level": 14, "name": "Too high"}]}"#,
        )
        .unwrap();

        tokio_test::assert_err!(catalog.import(&admin).await);
        assert!(store.rows(Table::Topics).await.is_empty());
    }

    #[test]
    fn test_empty_file_is_empty_catalog() {
        assert_eq!(SeedCatalog::from_json("{}").unwrap(), SeedCatalog::default());
        assert!(SeedCatalog::from_json("[1, 2]").is_err());
    }
}
