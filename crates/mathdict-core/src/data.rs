//! Typed access to the hosted tables.
//!
//! [`Repository`] wraps a [`Store`] with one cache entry per query. Reads are
//! served from the cache until a write to the same table invalidates it or
//! the entry ages past its TTL; writing a topic also invalidates the term
//! list, since terms embed their topic. Every store failure is surfaced
//! once, without retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mathdict_store::{Filter, Join, Select, Store, StoreError, Table};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DictError, Result};
use crate::model::{
    GradeLevel, GradeLevelDraft, Profile, ProfileDraft, QuestionDraft, Quiz, QuizDraft,
    QuizQuestion, QuizRating, RatingDraft, Term, TermDraft, TermWithTopic, Topic, TopicDraft,
};

/// Identifies one cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// All terms with their topics, by name.
    Terms,
    /// All topics, by name.
    Topics,
    /// All grade levels, by level.
    GradeLevels,
    /// All quizzes, newest first.
    Quizzes,
    /// One quiz.
    Quiz(Uuid),
    /// The questions of one quiz.
    Questions(Uuid),
    /// The ratings of one quiz.
    Ratings(Uuid),
}

impl QueryKey {
    /// Tables whose writes make this entry stale.
    fn depends_on(self, table: Table) -> bool {
        match self {
            Self::Terms => matches!(table, Table::Terms | Table::Topics),
            Self::Topics => table == Table::Topics,
            Self::GradeLevels => table == Table::GradeLevels,
            Self::Quizzes | Self::Quiz(_) => table == Table::Quizzes,
            Self::Questions(_) => matches!(table, Table::QuizQuestions | Table::Quizzes),
            Self::Ratings(_) => matches!(table, Table::QuizRatings | Table::Quizzes),
        }
    }

    /// Entries keyed by one quiz id.
    const fn is_per_quiz(self) -> bool {
        matches!(self, Self::Quiz(_) | Self::Questions(_) | Self::Ratings(_))
    }
}

/// Singular name of a table's rows, for error messages.
const fn entity(table: Table) -> &'static str {
    match table {
        Table::Terms => "term",
        Table::Topics => "topic",
        Table::GradeLevels => "grade level",
        Table::Quizzes => "quiz",
        Table::QuizQuestions => "question",
        Table::QuizRatings => "rating",
        Table::Profiles => "profile",
    }
}

fn decode<T: DeserializeOwned>(table: Table, row: Value) -> std::result::Result<T, StoreError> {
    serde_json::from_value(row).map_err(|e| StoreError::Malformed {
        table,
        message: e.to_string(),
    })
}

fn decode_all<T: DeserializeOwned>(
    table: Table,
    rows: &[Value],
) -> std::result::Result<Vec<T>, StoreError> {
    rows.iter().map(|row| decode(table, row.clone())).collect()
}

/// How long a cached read is served before it is fetched again, so changes
/// made directly in the hosted database show up.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Most per-quiz entries kept at once.
const MAX_PER_QUIZ_ENTRIES: usize = 256;

#[derive(Debug)]
struct CacheEntry {
    rows: Arc<Vec<Value>>,
    fetched_at: Instant,
}

/// Cached rows plus a write counter per table.
///
/// A read records the generation of the tables it depends on before
/// fetching and only stores its rows if no write bumped them meanwhile.
#[derive(Debug, Default)]
struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    generations: HashMap<Table, u64>,
}

impl QueryCache {
    fn generation(&self, key: QueryKey) -> u64 {
        Table::ALL
            .into_iter()
            .filter(|table| key.depends_on(*table))
            .map(|table| self.generations.get(&table).copied().unwrap_or(0))
            .fold(0, u64::wrapping_add)
    }

    fn bump(&mut self, table: Table) {
        let generation = self.generations.entry(table).or_default();
        *generation = generation.wrapping_add(1);
    }

    fn prune(&mut self, ttl: Duration) {
        self.entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        let per_quiz = self.entries.keys().filter(|key| key.is_per_quiz()).count();
        if per_quiz >= MAX_PER_QUIZ_ENTRIES {
            self.entries.retain(|key, _| !key.is_per_quiz());
        }
    }
}

/// Cached, typed access to the dictionary tables.
///
/// Cloning (and [`Repository::acting_as`]) shares the cache.
#[derive(Debug, Clone)]
pub struct Repository<S> {
    store: S,
    cache: Arc<RwLock<QueryCache>>,
    ttl: Duration,
}

impl<S: Store> Repository<S> {
    /// Wraps a store with an empty cache.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Arc::default(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Sets how long cached reads are served.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// A repository whose store calls carry `access_token`, sharing this
    /// repository's cache.
    pub fn acting_as(&self, access_token: &str) -> Result<Self> {
        let store = self
            .store
            .acting_as(access_token)
            .map_err(|e| DictError::unauthorized(e.to_string()))?;
        Ok(Self {
            store,
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
        })
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Number of queries currently cached.
    pub async fn cached_queries(&self) -> usize {
        self.cache.read().await.entries.len()
    }

    /// Drops every cached query, forcing the next reads to refetch.
    pub async fn invalidate_all(&self) {
        let mut cache = self.cache.write().await;
        cache.entries.clear();
        for table in Table::ALL {
            cache.bump(table);
        }
        debug!("cache cleared");
    }

    async fn invalidate(&self, table: Table) {
        let mut cache = self.cache.write().await;
        cache.bump(table);
        let before = cache.entries.len();
        cache.entries.retain(|key, _| !key.depends_on(table));
        debug!(table = %table, dropped = before - cache.entries.len(), "cache invalidated");
    }

    async fn rows(&self, key: QueryKey, what: &str, select: Select) -> Result<Arc<Vec<Value>>> {
        let generation = {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.entries.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(?key, "cache hit");
                    return Ok(Arc::clone(&entry.rows));
                }
            }
            cache.generation(key)
        };

        let table = select.table;
        debug!(table = %table, ?key, "fetching");
        let rows = self.store.select(select).await.map_err(|e| {
            warn!(table = %table, error = %e, "fetch failed");
            DictError::fetch(what, e)
        })?;
        let rows = Arc::new(rows);

        // An empty per-quiz result may be an unknown id.
        if key.is_per_quiz() && rows.is_empty() {
            return Ok(rows);
        }

        let mut cache = self.cache.write().await;
        if cache.generation(key) == generation {
            cache.prune(self.ttl);
            cache.entries.insert(
                key,
                CacheEntry {
                    rows: Arc::clone(&rows),
                    fetched_at: Instant::now(),
                },
            );
        } else {
            debug!(?key, "write landed during fetch, result not cached");
        }
        Ok(rows)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        key: QueryKey,
        what: &str,
        select: Select,
    ) -> Result<Vec<T>> {
        let table = select.table;
        let rows = self.rows(key, what, select).await?;
        decode_all(table, &rows).map_err(|e| DictError::fetch(what, e))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All terms with their topic embedded, ordered by name.
    pub async fn terms(&self) -> Result<Vec<TermWithTopic>> {
        let select = Select::from(Table::Terms)
            .join(Join::topic())
            .order_asc("name");
        self.fetch(QueryKey::Terms, "terms", select).await
    }

    /// All topics, ordered by name.
    pub async fn topics(&self) -> Result<Vec<Topic>> {
        let select = Select::from(Table::Topics).order_asc("name");
        self.fetch(QueryKey::Topics, "topics", select).await
    }

    /// All grade levels, ordered by level.
    pub async fn grade_levels(&self) -> Result<Vec<GradeLevel>> {
        let select = Select::from(Table::GradeLevels).order_asc("level");
        self.fetch(QueryKey::GradeLevels, "grade levels", select)
            .await
    }

    /// All quizzes, newest first.
    pub async fn quizzes(&self) -> Result<Vec<Quiz>> {
        let select = Select::from(Table::Quizzes).order_desc("created_at");
        self.fetch(QueryKey::Quizzes, "quizzes", select).await
    }

    /// One quiz by id.
    pub async fn quiz(&self, id: Uuid) -> Result<Quiz> {
        let select = Select::from(Table::Quizzes).filter(Filter::id(id));
        self.fetch(QueryKey::Quiz(id), "quiz", select)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DictError::not_found("quiz", id))
    }

    /// The questions of a quiz, in editor order. Rows saved without a
    /// position follow the positioned ones in creation order.
    pub async fn questions(&self, quiz_id: Uuid) -> Result<Vec<QuizQuestion>> {
        let select = Select::from(Table::QuizQuestions)
            .filter(Filter::eq("quiz_id", quiz_id.to_string()))
            .order_asc("created_at");
        let mut questions: Vec<QuizQuestion> = self
            .fetch(QueryKey::Questions(quiz_id), "quiz questions", select)
            .await?;
        questions.sort_by_key(|q| q.position.unwrap_or(u32::MAX));
        Ok(questions)
    }

    /// The ratings submitted for a quiz.
    pub async fn ratings(&self, quiz_id: Uuid) -> Result<Vec<QuizRating>> {
        let select = Select::from(Table::QuizRatings)
            .filter(Filter::eq("quiz_id", quiz_id.to_string()))
            .order_asc("created_at");
        self.fetch(QueryKey::Ratings(quiz_id), "quiz ratings", select)
            .await
    }

    /// The profile of a user, if one was created. Never cached.
    pub async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let select = Select::from(Table::Profiles).filter(Filter::id(id));
        let rows = self
            .store
            .select(select)
            .await
            .map_err(|e| DictError::fetch("profile", e))?;
        let profiles: Vec<Profile> =
            decode_all(Table::Profiles, &rows).map_err(|e| DictError::fetch("profile", e))?;
        Ok(profiles.into_iter().next())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    async fn insert_one<D, T>(&self, table: Table, action: &str, draft: &D) -> Result<T>
    where
        D: Serialize + Sync,
        T: DeserializeOwned,
    {
        let record = serde_json::to_value(draft)?;
        let rows = self
            .store
            .insert(table, vec![record])
            .await
            .map_err(|e| {
                warn!(table = %table, error = %e, "{action} failed");
                DictError::mutation(action, e)
            })?;
        self.invalidate(table).await;

        let row = rows.into_iter().next().ok_or_else(|| {
            DictError::mutation(
                action,
                StoreError::Malformed {
                    table,
                    message: "insert returned no rows".to_string(),
                },
            )
        })?;
        let stored = decode(table, row).map_err(|e| DictError::mutation(action, e))?;
        info!(table = %table, "{action}");
        Ok(stored)
    }

    async fn update_one<D, T>(&self, table: Table, action: &str, id: Uuid, draft: &D) -> Result<T>
    where
        D: Serialize + Sync,
        T: DeserializeOwned,
    {
        let patch = serde_json::to_value(draft)?;
        let row = match self.store.update(table, id, patch).await {
            Ok(row) => row,
            Err(StoreError::NotFound { .. }) => return Err(DictError::not_found(entity(table), id)),
            Err(e) => {
                warn!(table = %table, %id, error = %e, "{action} failed");
                return Err(DictError::mutation(action, e));
            }
        };
        self.invalidate(table).await;

        let stored = decode(table, row).map_err(|e| DictError::mutation(action, e))?;
        info!(table = %table, %id, "{action}");
        Ok(stored)
    }

    async fn delete_one(&self, table: Table, action: &str, id: Uuid) -> Result<()> {
        let removed = self
            .store
            .delete(table, Filter::id(id))
            .await
            .map_err(|e| {
                warn!(table = %table, %id, error = %e, "{action} failed");
                DictError::mutation(action, e)
            })?;
        self.invalidate(table).await;

        if removed == 0 {
            return Err(DictError::not_found(entity(table), id));
        }
        info!(table = %table, %id, "{action}");
        Ok(())
    }

    /// Creates a term.
    pub async fn create_term(&self, draft: &TermDraft) -> Result<Term> {
        self.insert_one(Table::Terms, "create term", draft).await
    }

    /// Replaces a term's writable columns.
    pub async fn update_term(&self, id: Uuid, draft: &TermDraft) -> Result<Term> {
        self.update_one(Table::Terms, "update term", id, draft).await
    }

    /// Deletes a term.
    pub async fn delete_term(&self, id: Uuid) -> Result<()> {
        self.delete_one(Table::Terms, "delete term", id).await
    }

    /// Creates a topic.
    pub async fn create_topic(&self, draft: &TopicDraft) -> Result<Topic> {
        self.insert_one(Table::Topics, "create topic", draft).await
    }

    /// Replaces a topic's writable columns.
    pub async fn update_topic(&self, id: Uuid, draft: &TopicDraft) -> Result<Topic> {
        self.update_one(Table::Topics, "update topic", id, draft)
            .await
    }

    /// Deletes a topic. Terms keep their (now dangling) topic id.
    pub async fn delete_topic(&self, id: Uuid) -> Result<()> {
        self.delete_one(Table::Topics, "delete topic", id).await
    }

    /// Creates a grade level.
    pub async fn create_grade_level(&self, draft: &GradeLevelDraft) -> Result<GradeLevel> {
        self.insert_one(Table::GradeLevels, "create grade level", draft)
            .await
    }

    /// Replaces a grade level's writable columns.
    pub async fn update_grade_level(&self, id: Uuid, draft: &GradeLevelDraft) -> Result<GradeLevel> {
        self.update_one(Table::GradeLevels, "update grade level", id, draft)
            .await
    }

    /// Deletes a grade level.
    pub async fn delete_grade_level(&self, id: Uuid) -> Result<()> {
        self.delete_one(Table::GradeLevels, "delete grade level", id)
            .await
    }

    /// Creates a quiz without questions.
    pub async fn create_quiz(&self, draft: &QuizDraft) -> Result<Quiz> {
        self.insert_one(Table::Quizzes, "create quiz", draft).await
    }

    /// Replaces a quiz's writable columns.
    pub async fn update_quiz(&self, id: Uuid, draft: &QuizDraft) -> Result<Quiz> {
        self.update_one(Table::Quizzes, "update quiz", id, draft)
            .await
    }

    /// Deletes a quiz together with its questions and ratings.
    pub async fn delete_quiz(&self, id: Uuid) -> Result<()> {
        for child in [Table::QuizQuestions, Table::QuizRatings] {
            self.store
                .delete(child, Filter::eq("quiz_id", id.to_string()))
                .await
                .map_err(|e| DictError::mutation("delete quiz", e))?;
            self.invalidate(child).await;
        }
        self.delete_one(Table::Quizzes, "delete quiz", id).await
    }

    /// Adds a question to a quiz.
    pub async fn create_question(&self, draft: &QuestionDraft) -> Result<QuizQuestion> {
        self.insert_one(Table::QuizQuestions, "create question", draft)
            .await
    }

    /// Replaces a question's writable columns.
    pub async fn update_question(&self, id: Uuid, draft: &QuestionDraft) -> Result<QuizQuestion> {
        self.update_one(Table::QuizQuestions, "update question", id, draft)
            .await
    }

    /// Deletes a question.
    pub async fn delete_question(&self, id: Uuid) -> Result<()> {
        self.delete_one(Table::QuizQuestions, "delete question", id)
            .await
    }

    /// Appends a rating.
    pub async fn submit_rating(&self, draft: &RatingDraft) -> Result<QuizRating> {
        self.insert_one(Table::QuizRatings, "submit rating", draft)
            .await
    }

    /// Creates the profile row mirroring a new account.
    pub async fn create_profile(&self, draft: &ProfileDraft) -> Result<Profile> {
        self.insert_one(Table::Profiles, "create profile", draft)
            .await
    }
}
