//! The term catalog and quiz list as the pages show them.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{GradeLevel, Quiz, QuizRating, TermWithTopic};
use crate::quiz::QuizPreview;

// ============================================================================
// Filters
// ============================================================================

/// Catalog filters. Empty fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermFilter {
    /// Case-insensitive substring of the name or definition.
    pub search: Option<String>,
    /// Topic id.
    pub topic: Option<Uuid>,
    /// Grade number.
    pub grade: Option<i32>,
    /// First letter of the name.
    pub letter: Option<String>,
}

fn first_letter(name: &str) -> Option<String> {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
}

impl TermFilter {
    /// Returns `true` if any filter is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self.topic.is_some()
            || self.grade.is_some()
            || self.letter.as_deref().is_some_and(|l| !l.trim().is_empty())
    }

    /// Clears every filter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` if the term passes every set filter.
    #[must_use]
    pub fn matches(&self, entry: &TermWithTopic) -> bool {
        let term = &entry.term;

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            if !term.name.to_lowercase().contains(&needle)
                && !term.definition.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.topic.is_some() && term.topic_id != self.topic {
            return false;
        }
        if self.grade.is_some() && term.grade_level != self.grade {
            return false;
        }
        if let Some(letter) = self.letter.as_deref().and_then(first_letter) {
            if first_letter(&term.name).as_deref() != Some(letter.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Upper-cased first letters of the term names, sorted and deduplicated.
#[must_use]
pub fn letters(terms: &[TermWithTopic]) -> Vec<String> {
    terms
        .iter()
        .filter_map(|t| first_letter(&t.term.name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// Term cards
// ============================================================================

/// School stage a grade belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeTier {
    /// Grades up to 6.
    Primary,
    /// Grades 7 and 8.
    Middle,
    /// Grades 9 and up.
    Senior,
}

impl GradeTier {
    /// Tier of a grade number.
    #[must_use]
    pub const fn of(level: i32) -> Self {
        if level <= 6 {
            Self::Primary
        } else if level <= 8 {
            Self::Middle
        } else {
            Self::Senior
        }
    }
}

/// Badge naming the term's topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBadge {
    /// Topic id.
    pub id: Uuid,
    /// Topic name.
    pub name: String,
}

/// Badge naming the term's grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBadge {
    /// Grade number.
    pub level: i32,
    /// Display label.
    pub label: String,
    /// School stage.
    pub tier: GradeTier,
}

/// A term as rendered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCard {
    /// Term id.
    pub id: Uuid,
    /// Term name.
    pub name: String,
    /// Definition.
    pub definition: String,
    /// Example, if any.
    pub example: Option<String>,
    /// Illustration URL, if any.
    pub image_url: Option<String>,
    /// Topic badge; absent when the term has no topic or it was deleted.
    pub topic_badge: Option<TopicBadge>,
    /// Grade badge; absent when the term has no grade.
    pub grade_badge: Option<GradeBadge>,
}

impl TermCard {
    /// Builds the card. The grade label comes from the matching grade level
    /// row, or a generated "Grade N" when there is none.
    #[must_use]
    pub fn new(entry: &TermWithTopic, grade_names: &HashMap<i32, String>) -> Self {
        let term = &entry.term;
        Self {
            id: term.id,
            name: term.name.clone(),
            definition: term.definition.clone(),
            example: term.example.clone(),
            image_url: term.image_url.clone(),
            topic_badge: entry.topics.as_ref().map(|topic| TopicBadge {
                id: topic.id,
                name: topic.name.clone(),
            }),
            grade_badge: term.grade_level.map(|level| GradeBadge {
                level,
                label: grade_names
                    .get(&level)
                    .cloned()
                    .unwrap_or_else(|| format!("Grade {level}")),
                tier: GradeTier::of(level),
            }),
        }
    }
}

/// One page of the term catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    /// Matching terms.
    pub terms: Vec<TermCard>,
    /// Number of matching terms.
    pub count: usize,
    /// Number of terms before filtering.
    pub total: usize,
    /// `true` when nothing matched.
    pub is_empty: bool,
    /// Letter index over all terms.
    pub letters: Vec<String>,
    /// The filters that produced this page.
    pub filter: TermFilter,
}

impl CatalogPage {
    /// Filters the terms and renders the matching cards.
    #[must_use]
    pub fn build(terms: &[TermWithTopic], grades: &[GradeLevel], filter: TermFilter) -> Self {
        let grade_names: HashMap<i32, String> =
            grades.iter().map(|g| (g.level, g.name.clone())).collect();
        let cards: Vec<TermCard> = terms
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| TermCard::new(t, &grade_names))
            .collect();

        Self {
            count: cards.len(),
            total: terms.len(),
            is_empty: cards.is_empty(),
            letters: letters(terms),
            terms: cards,
            filter,
        }
    }
}

// ============================================================================
// Quizzes
// ============================================================================

/// Number of ratings and their average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Number of ratings.
    pub count: usize,
    /// Average rating rounded to one decimal; `None` without ratings.
    pub average: Option<f64>,
}

impl RatingSummary {
    /// Summarizes a quiz's ratings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_ratings(ratings: &[QuizRating]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let sum: u32 = ratings.iter().map(|r| u32::from(r.rating)).sum();
        let average = f64::from(sum) / ratings.len() as f64;
        Self {
            count: ratings.len(),
            average: Some((average * 10.0).round() / 10.0),
        }
    }
}

/// A quiz in the quiz list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizCard {
    /// Preview data.
    #[serde(flatten)]
    pub preview: QuizPreview,
    /// Ratings so far.
    pub rating: RatingSummary,
}

impl QuizCard {
    /// Builds the card from a quiz, its question count and its ratings.
    #[must_use]
    pub fn new(quiz: &Quiz, question_count: usize, ratings: &[QuizRating]) -> Self {
        Self {
            preview: QuizPreview::new(quiz, question_count),
            rating: RatingSummary::from_ratings(ratings),
        }
    }
}
