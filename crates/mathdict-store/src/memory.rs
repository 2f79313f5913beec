//! In-process implementation of [`Store`].
//!
//! Tables are vectors of JSON objects behind a shared mutex. Generated
//! columns (`id`, `created_at`, `updated_at`) are filled the way the hosted
//! database fills them, and deleting a quiz cascades to its questions and
//! ratings. Other references (Term→Topic) are not enforced, so a deleted
//! topic can leave dangling `topic_id` values behind.
//!
//! Tokens passed to [`Store::acting_as`] are not checked; each write only
//! records which token it was sent with.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{Direction, Filter, Result, Select, Store, StoreError, Table};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Table, Vec<Value>>,
    failing: HashSet<Table>,
    writers: Vec<(Table, Option<String>)>,
}

impl Tables {
    fn check(&self, table: Table) -> Result<()> {
        if self.failing.contains(&table) {
            return Err(StoreError::Unavailable {
                table,
                message: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    fn table(&self, table: Table) -> &[Value] {
        self.rows.get(&table).map_or(&[], Vec::as_slice)
    }
}

/// A [`Store`] that keeps every table in memory.
///
/// Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    access_token: Option<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation on `table` fail until [`Self::restore`].
    pub async fn fail_table(&self, table: Table) {
        self.tables.lock().await.failing.insert(table);
    }

    /// Clears a failure injected with [`Self::fail_table`].
    pub async fn restore(&self, table: Table) {
        self.tables.lock().await.failing.remove(&table);
    }

    /// Returns a copy of every row in `table`, in insertion order.
    pub async fn rows(&self, table: Table) -> Vec<Value> {
        self.tables.lock().await.table(table).to_vec()
    }

    /// The access token each successful write to `table` was sent with,
    /// oldest first; `None` for the anonymous key.
    pub async fn writers(&self, table: Table) -> Vec<Option<String>> {
        self.tables
            .lock()
            .await
            .writers
            .iter()
            .filter(|(t, _)| *t == table)
            .map(|(_, token)| token.clone())
            .collect()
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn as_object(table: Table, record: Value) -> Result<Map<String, Value>> {
    match record {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed {
            table,
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

/// Compares two column values the way the hosted database sorts them in
/// ascending order (nulls last).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn run_select(tables: &Tables, select: &Select) -> Result<Vec<Value>> {
    tables.check(select.table)?;

    let mut rows: Vec<Value> = tables
        .table(select.table)
        .iter()
        .filter(|row| select.filters.iter().all(|f| f.matches(row)))
        .cloned()
        .collect();

    if let Some(order) = &select.order {
        rows.sort_by(|a, b| {
            let ord = compare_values(a.get(&order.column), b.get(&order.column));
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    if let Some(join) = &select.join {
        tables.check(join.table)?;
        let referenced: HashMap<&str, &Value> = tables
            .table(join.table)
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str).map(|id| (id, row)))
            .collect();

        for row in &mut rows {
            let embedded = row
                .get(&join.foreign_key)
                .and_then(Value::as_str)
                .and_then(|id| referenced.get(id))
                .map_or(Value::Null, |r| (*r).clone());
            if let Value::Object(map) = row {
                map.insert(join.table.as_str().to_string(), embedded);
            }
        }
    }

    Ok(rows)
}

fn run_insert(tables: &mut Tables, table: Table, records: Vec<Value>) -> Result<Vec<Value>> {
    tables.check(table)?;

    let mut stored = Vec::with_capacity(records.len());
    for record in records {
        let mut map = as_object(table, record)?;
        map.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        let now = timestamp();
        map.entry("created_at").or_insert_with(|| now.clone());
        if table.has_updated_at() {
            map.entry("updated_at").or_insert(now);
        }
        stored.push(Value::Object(map));
    }

    tables
        .rows
        .entry(table)
        .or_default()
        .extend(stored.iter().cloned());
    Ok(stored)
}

fn run_update(tables: &mut Tables, table: Table, id: Uuid, patch: Value) -> Result<Value> {
    tables.check(table)?;

    let patch = as_object(table, patch)?;
    let id_text = id.to_string();
    let row = tables
        .rows
        .get_mut(&table)
        .and_then(|rows| {
            rows.iter_mut()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id_text.as_str()))
        })
        .ok_or(StoreError::NotFound { table, id })?;

    if let Value::Object(map) = row {
        for (key, value) in patch {
            if key != "id" {
                map.insert(key, value);
            }
        }
        if table.has_updated_at() {
            map.insert("updated_at".to_string(), timestamp());
        }
    }
    Ok(row.clone())
}

fn run_delete(tables: &mut Tables, table: Table, filter: &Filter) -> Result<usize> {
    tables.check(table)?;

    let Some(rows) = tables.rows.get_mut(&table) else {
        return Ok(0);
    };
    let (removed, kept): (Vec<Value>, Vec<Value>) =
        rows.drain(..).partition(|row| filter.matches(row));
    *rows = kept;

    if table == Table::Quizzes {
        let quiz_ids: HashSet<String> = removed
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();
        for child in [Table::QuizQuestions, Table::QuizRatings] {
            if let Some(children) = tables.rows.get_mut(&child) {
                children.retain(|r| {
                    r.get("quiz_id")
                        .and_then(Value::as_str)
                        .map_or(true, |q| !quiz_ids.contains(q))
                });
            }
        }
    }

    Ok(removed.len())
}

impl Store for MemoryStore {
    fn select(&self, select: Select) -> impl Future<Output = Result<Vec<Value>>> + Send {
        let tables = Arc::clone(&self.tables);
        async move {
            let tables = tables.lock().await;
            let rows = run_select(&tables, &select)?;
            debug!(table = %select.table, rows = rows.len(), "memory select");
            Ok(rows)
        }
    }

    fn insert(
        &self,
        table: Table,
        records: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send {
        let tables = Arc::clone(&self.tables);
        let token = self.access_token.clone();
        async move {
            let mut tables = tables.lock().await;
            let rows = run_insert(&mut tables, table, records)?;
            tables.writers.push((table, token));
            Ok(rows)
        }
    }

    fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Value,
    ) -> impl Future<Output = Result<Value>> + Send {
        let tables = Arc::clone(&self.tables);
        let token = self.access_token.clone();
        async move {
            let mut tables = tables.lock().await;
            let row = run_update(&mut tables, table, id, patch)?;
            tables.writers.push((table, token));
            Ok(row)
        }
    }

    fn delete(&self, table: Table, filter: Filter) -> impl Future<Output = Result<usize>> + Send {
        let tables = Arc::clone(&self.tables);
        let token = self.access_token.clone();
        async move {
            let mut tables = tables.lock().await;
            let removed = run_delete(&mut tables, table, &filter)?;
            tables.writers.push((table, token));
            Ok(removed)
        }
    }

    fn acting_as(&self, access_token: &str) -> Result<Self> {
        Ok(Self {
            tables: Arc::clone(&self.tables),
            access_token: Some(access_token.to_string()),
        })
    }
}
