//! Sign-in, sign-up and the admin gate.
//!
//! Accounts live in the identity service. Each sign-up also creates a
//! profile row with the same id, written as the new user when the identity
//! service returns a session; the profile's role decides who may use the
//! admin panel.

use std::sync::Arc;

use mathdict_store::{AuthUser, Identity, Session, SignUp, Store, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::Repository;
use crate::error::{DictError, Result};
use crate::model::ProfileDraft;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Email and password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Sign-in email.
    pub email: String,
    /// Password.
    pub password: String,
}

/// A sign-up request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Sign-in email.
    pub email: String,
    /// Password, at least six characters.
    pub password: String,
    /// Display name stored on the profile.
    #[serde(default)]
    pub username: String,
}

impl Credentials {
    /// Checks the email shape and password length.
    pub fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if !EMAIL.as_ref().is_some_and(|re| re.is_match(email)) {
            return Err(DictError::validation("email", "must be a valid email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DictError::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        Ok(())
    }
}

fn identity_error(action: &str, err: StoreError) -> DictError {
    match err {
        StoreError::Auth(message) => DictError::unauthorized(message),
        StoreError::Status {
            status: 400 | 401 | 403 | 422,
            message,
            ..
        } => DictError::unauthorized(message),
        other => DictError::mutation(action, other),
    }
}

/// Account operations over an identity service and the profile table.
#[derive(Debug)]
pub struct Accounts<S, I> {
    repo: Arc<Repository<S>>,
    identity: I,
    admin_role: Option<String>,
}

impl<S: Store, I: Identity> Accounts<S, I> {
    /// Creates the account service. `admin_role` of `None` disables the
    /// admin gate.
    pub const fn new(repo: Arc<Repository<S>>, identity: I, admin_role: Option<String>) -> Self {
        Self {
            repo,
            identity,
            admin_role,
        }
    }

    /// Signs in.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        credentials.validate()?;
        let session = self
            .identity
            .sign_in(credentials.email.trim(), &credentials.password)
            .await
            .map_err(|e| identity_error("sign in", e))?;
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    /// Creates an account and its profile row.
    pub async fn sign_up(&self, registration: &Registration) -> Result<SignUp> {
        Credentials {
            email: registration.email.clone(),
            password: registration.password.clone(),
        }
        .validate()?;
        let username = registration.username.trim();

        let signed_up = self
            .identity
            .sign_up(registration.email.trim(), &registration.password, username)
            .await
            .map_err(|e| identity_error("sign up", e))?;

        let profile = ProfileDraft {
            id: signed_up.user.id,
            username: (!username.is_empty()).then(|| username.to_string()),
        };
        let created = match &signed_up.session {
            Some(session) => {
                self.repo
                    .acting_as(&session.access_token)?
                    .create_profile(&profile)
                    .await
            }
            None => self.repo.create_profile(&profile).await,
        };
        if let Err(e) = created {
            warn!(user_id = %profile.id, error = %e, "profile creation failed");
            return Err(e);
        }

        info!(user_id = %signed_up.user.id, "signed up");
        Ok(signed_up)
    }

    /// Ends the session behind `token`.
    pub async fn sign_out(&self, token: &str) -> Result<()> {
        self.identity
            .sign_out(token)
            .await
            .map_err(|e| identity_error("sign out", e))?;
        info!("signed out");
        Ok(())
    }

    /// The user behind `token`.
    pub async fn current_user(&self, token: &str) -> Result<AuthUser> {
        self.identity
            .user(token)
            .await
            .map_err(|e| identity_error("resolve user", e))
    }

    /// Admits `token` to the admin panel.
    ///
    /// Returns `Ok(None)` when the gate is disabled, and the user when their
    /// profile carries the admin role.
    pub async fn require_admin(&self, token: Option<&str>) -> Result<Option<AuthUser>> {
        let Some(role) = self.admin_role.as_deref() else {
            return Ok(None);
        };
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DictError::unauthorized("sign in to use the admin panel"))?;

        let user = self.current_user(token).await?;
        let profile = self.repo.profile(user.id).await?;
        if profile.and_then(|p| p.role).as_deref() == Some(role) {
            Ok(Some(user))
        } else {
            warn!(user_id = %user.id, "admin access denied");
            Err(DictError::Forbidden {
                role: role.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use mathdict_store::{MemoryIdentity, MemoryStore, Table};
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCategory;

    fn accounts(admin_role: Option<&str>) -> Accounts<MemoryStore, MemoryIdentity> {
        Accounts::new(
            Arc::new(Repository::new(MemoryStore::new())),
            MemoryIdentity::new(),
            admin_role.map(str::to_string),
        )
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: "secret1".to_string(),
            username: "ada".to_string(),
        }
    }

    #[test]
    fn test_credentials_validation() {
        let mut creds = Credentials {
            email: "not-an-email".to_string(),
            password: "longenough".to_string(),
        };
        assert!(creds.validate().is_err());

        creds.email = "ada@example.com".to_string();
        assert!(creds.validate().is_ok());

        creds.password = "12345".to_string();
        let err = creds.validate().unwrap_err();
        assert!(matches!(err, DictError::Validation { ref field, .. } if field == "password"));
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile() {
        let accounts = accounts(Some("admin"));
        let signed_up = accounts.sign_up(&registration("ada@example.com")).await.unwrap();

        let profile = accounts.repo.profile(signed_up.user.id).await.unwrap().unwrap();
        assert_eq!(profile.username.as_deref(), Some("ada"));

        let token = signed_up.session.unwrap().access_token;
        assert_eq!(
            accounts.repo.store().writers(Table::Profiles).await,
            vec![Some(token)]
        );
    }

    #[tokio::test]
    async fn test_sign_in_with_wrong_password() {
        let accounts = accounts(None);
        accounts.sign_up(&registration("bob@example.com")).await.unwrap();

        let err = accounts
            .sign_in(&Credentials {
                email: "bob@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[tokio::test]
    async fn test_admin_gate() {
        let accounts = accounts(Some("admin"));
        let signed_up = accounts.sign_up(&registration("root@example.com")).await.unwrap();
        let token = signed_up.session.unwrap().access_token;

        assert!(matches!(
            accounts.require_admin(None).await,
            Err(DictError::Unauthorized { .. })
        ));
        assert!(matches!(
            accounts.require_admin(Some(&token)).await,
            Err(DictError::Forbidden { .. })
        ));

        accounts
            .repo
            .store()
            .update(Table::Profiles, signed_up.user.id, json!({"role": "admin"}))
            .await
            .unwrap();
        let admin = accounts.require_admin(Some(&token)).await.unwrap();
        assert_eq!(admin.map(|u| u.id), Some(signed_up.user.id));

        accounts.sign_out(&token).await.unwrap();
        assert!(matches!(
            accounts.require_admin(Some(&token)).await,
            Err(DictError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_gate_admits_anyone() {
        let accounts = accounts(None);
        assert!(accounts.require_admin(None).await.unwrap().is_none());
    }
}
