//! Identity service clients (email/password accounts).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rest::{check_status, service_headers};
use crate::{Result, StoreError};

/// A user account known to the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Account id; profiles use the same id.
    pub id: Uuid,
    /// Sign-in email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata given at sign-up (holds `username`).
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// The username stored in the sign-up metadata, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.user_metadata.get("username").and_then(Value::as_str)
    }
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Token used to refresh the session.
    #[serde(default)]
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// The signed-in user.
    pub user: AuthUser,
}

/// Outcome of a sign-up.
///
/// The session is absent when the service requires email confirmation
/// before the first sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    /// The created account.
    pub user: AuthUser,
    /// A session, when the account is usable right away.
    pub session: Option<Session>,
}

/// Operations of the identity service.
pub trait Identity: Clone + Send + Sync + 'static {
    /// Signs in with email and password.
    fn sign_in(&self, email: &str, password: &str) -> impl Future<Output = Result<Session>> + Send;

    /// Creates an account; `username` is stored in the user metadata.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> impl Future<Output = Result<SignUp>> + Send;

    /// Revokes the session behind `access_token`.
    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<()>> + Send;

    /// Resolves the user behind `access_token`.
    fn user(&self, access_token: &str) -> impl Future<Output = Result<AuthUser>> + Send;
}

// ============================================================================
// REST identity
// ============================================================================

/// An [`Identity`] backed by the hosted identity service's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct RestIdentity {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestIdentity {
    /// Creates a client for the identity endpoints under `base_url/auth/v1`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let api_key = api_key.into();
        let client = Client::builder()
            .default_headers(service_headers(&api_key, &api_key)?)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn bearer(&self, access_token: &str) -> Result<reqwest::header::HeaderMap> {
        service_headers(&self.api_key, access_token)
    }
}

impl Identity for RestIdentity {
    fn sign_in(&self, email: &str, password: &str) -> impl Future<Output = Result<Session>> + Send {
        let request = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        async move {
            let response = check_status("auth/token", request.send().await?).await?;
            let session: Session = response.json().await?;
            info!(user_id = %session.user.id, "signed in");
            Ok(session)
        }
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> impl Future<Output = Result<SignUp>> + Send {
        let request = self.client.post(self.url("signup")).json(&json!({
            "email": email,
            "password": password,
            "data": { "username": username },
        }));

        async move {
            let response = check_status("auth/signup", request.send().await?).await?;
            let body: Value = response.json().await?;
            // With auto-confirm the body is a session; otherwise it is the bare user.
            if body.get("access_token").is_some() {
                let session: Session = serde_json::from_value(body)?;
                Ok(SignUp {
                    user: session.user.clone(),
                    session: Some(session),
                })
            } else {
                let user: AuthUser = serde_json::from_value(body)?;
                Ok(SignUp {
                    user,
                    session: None,
                })
            }
        }
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<()>> + Send {
        let request = self
            .bearer(access_token)
            .map(|headers| self.client.post(self.url("logout")).headers(headers));

        async move {
            check_status("auth/logout", request?.send().await?).await?;
            debug!("signed out");
            Ok(())
        }
    }

    fn user(&self, access_token: &str) -> impl Future<Output = Result<AuthUser>> + Send {
        let request = self
            .bearer(access_token)
            .map(|headers| self.client.get(self.url("user")).headers(headers));

        async move {
            let response = check_status("auth/user", request?.send().await?).await?;
            Ok(response.json().await?)
        }
    }
}

// ============================================================================
// In-memory identity
// ============================================================================

#[derive(Debug, Default)]
struct Accounts {
    by_email: HashMap<String, (String, AuthUser)>,
    tokens: HashMap<String, Uuid>,
}

/// An [`Identity`] that keeps accounts in memory.
///
/// Accounts are confirmed immediately, so sign-up always returns a session.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentity {
    accounts: Arc<Mutex<Accounts>>,
}

impl MemoryIdentity {
    /// Creates an identity service with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn issue_session(accounts: &mut Accounts, user: AuthUser) -> Session {
    let token = Uuid::new_v4().simple().to_string();
    accounts.tokens.insert(token.clone(), user.id);
    Session {
        access_token: token,
        refresh_token: Uuid::new_v4().simple().to_string(),
        expires_in: 3600,
        user,
    }
}

impl Identity for MemoryIdentity {
    fn sign_in(&self, email: &str, password: &str) -> impl Future<Output = Result<Session>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let email = email.trim().to_lowercase();
        let password = password.to_string();

        async move {
            let mut accounts = accounts.lock().await;
            let user = match accounts.by_email.get(&email) {
                Some((stored, user)) if *stored == password => user.clone(),
                _ => return Err(StoreError::Auth("Invalid login credentials".to_string())),
            };
            Ok(issue_session(&mut accounts, user))
        }
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> impl Future<Output = Result<SignUp>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let email = email.trim().to_lowercase();
        let password = password.to_string();
        let username = username.to_string();

        async move {
            let mut accounts = accounts.lock().await;
            if accounts.by_email.contains_key(&email) {
                return Err(StoreError::Auth("User already registered".to_string()));
            }
            let user = AuthUser {
                id: Uuid::new_v4(),
                email: Some(email.clone()),
                user_metadata: json!({ "username": username }),
            };
            accounts
                .by_email
                .insert(email, (password, user.clone()));
            let session = issue_session(&mut accounts, user.clone());
            Ok(SignUp {
                user,
                session: Some(session),
            })
        }
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<()>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let token = access_token.to_string();

        async move {
            accounts.lock().await.tokens.remove(&token);
            Ok(())
        }
    }

    fn user(&self, access_token: &str) -> impl Future<Output = Result<AuthUser>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let token = access_token.to_string();

        async move {
            let accounts = accounts.lock().await;
            let id = accounts
                .tokens
                .get(&token)
                .copied()
                .ok_or_else(|| StoreError::Auth("invalid or expired token".to_string()))?;
            accounts
                .by_email
                .values()
                .map(|(_, user)| user)
                .find(|user| user.id == id)
                .cloned()
                .ok_or_else(|| StoreError::Auth("user no longer exists".to_string()))
        }
    }
}
