//! PostgREST client for the hosted database.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Direction, Filter, Result, Select, Store, StoreError, Table};

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl ErrorBody {
    fn describe(self, fallback: String) -> String {
        let mut parts: Vec<String> = [self.message, self.details, self.hint]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            parts.push(fallback);
        }
        parts.join("; ")
    }
}

/// Builds the headers every request to the hosted service carries.
pub(crate) fn service_headers(api_key: &str, bearer: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let key = HeaderValue::from_str(api_key)
        .map_err(|e| StoreError::Auth(format!("invalid API key header: {e}")))?;
    let auth = HeaderValue::from_str(&format!("Bearer {bearer}"))
        .map_err(|e| StoreError::Auth(format!("invalid bearer token: {e}")))?;
    headers.insert("apikey", key);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// Turns a non-success response into a [`StoreError::Status`].
pub(crate) async fn check_status(target: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.describe(text);
    warn!(target_name = %target, status = status.as_u16(), message = %message, "request failed");
    Err(StoreError::Status {
        table: target.to_string(),
        status: status.as_u16(),
        message,
    })
}

/// A [`Store`] backed by the hosted database's REST interface.
///
/// # Example
///
/// ```no_run
/// use mathdict_store::{RestStore, Select, Store, Table};
///
/// # async fn example() -> mathdict_store::Result<()> {
/// let store = RestStore::new("https://project.example.co", "anon-key", 10)?;
/// let topics = store.select(Select::from(Table::Topics).order_asc("name")).await?;
/// println!("{} topics", topics.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl RestStore {
    /// Creates a client for the service at `base_url` authenticated with the
    /// public (anonymous) key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let api_key = api_key.into();
        Self::build(base_url.into(), api_key.clone(), &api_key, timeout_secs)
    }

    fn build(base_url: String, api_key: String, bearer: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .default_headers(service_headers(&api_key, bearer)?)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn with_filters(request: RequestBuilder, filters: &[Filter]) -> RequestBuilder {
        let params: Vec<(String, String)> = filters
            .iter()
            .map(|f| (f.column.clone(), format!("eq.{}", f.value_text())))
            .collect();
        request.query(&params)
    }
}

/// Renders the `select=` parameter for a select.
fn select_clause(select: &Select) -> String {
    select.join.as_ref().map_or_else(
        || "*".to_string(),
        |join| format!("*,{}(*)", join.table.as_str()),
    )
}

/// Renders the `order=` parameter for a select.
fn order_clause(select: &Select) -> Option<String> {
    select.order.as_ref().map(|order| {
        let dir = match order.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        format!("{}.{dir}", order.column)
    })
}

impl Store for RestStore {
    fn select(&self, select: Select) -> impl Future<Output = Result<Vec<Value>>> + Send {
        let mut request = self
            .client
            .get(self.table_url(select.table))
            .query(&[("select", select_clause(&select))]);
        if let Some(order) = order_clause(&select) {
            request = request.query(&[("order", order)]);
        }
        let request = Self::with_filters(request, &select.filters);
        let table = select.table;

        async move {
            let response = check_status(table.as_str(), request.send().await?).await?;
            let rows: Vec<Value> = response.json().await?;
            debug!(rows = rows.len(), "rest select");
            Ok(rows)
        }
    }

    fn insert(
        &self,
        table: Table,
        records: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&records);

        async move {
            let response = check_status(table.as_str(), request.send().await?).await?;
            let rows: Vec<Value> = response.json().await?;
            debug!(table = %table, rows = rows.len(), "rest insert");
            Ok(rows)
        }
    }

    fn update(
        &self,
        table: Table,
        id: Uuid,
        patch: Value,
    ) -> impl Future<Output = Result<Value>> + Send {
        let request = Self::with_filters(
            self.client
                .patch(self.table_url(table))
                .header("Prefer", "return=representation")
                .json(&patch),
            &[Filter::id(id)],
        );

        async move {
            let response = check_status(table.as_str(), request.send().await?).await?;
            let rows: Vec<Value> = response.json().await?;
            rows.into_iter()
                .next()
                .ok_or(StoreError::NotFound { table, id })
        }
    }

    fn delete(&self, table: Table, filter: Filter) -> impl Future<Output = Result<usize>> + Send {
        let request = Self::with_filters(
            self.client
                .delete(self.table_url(table))
                .header("Prefer", "return=representation"),
            std::slice::from_ref(&filter),
        );

        async move {
            let response = check_status(table.as_str(), request.send().await?).await?;
            let rows: Vec<Value> = response.json().await?;
            debug!(table = %table, rows = rows.len(), "rest delete");
            Ok(rows.len())
        }
    }

    fn acting_as(&self, access_token: &str) -> Result<Self> {
        debug!("rest client acting as signed-in user");
        Self::build(
            self.base_url.clone(),
            self.api_key.clone(),
            access_token,
            self.timeout_secs,
        )
    }
}
