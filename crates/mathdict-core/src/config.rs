//! Configuration for the mathematics dictionary.
//!
//! Settings are read from `mathdict.json` (camelCase keys, every field
//! optional). The hosted database URL and public key can also come from
//! the `MATHDICT_STORE_URL` and `MATHDICT_ANON_KEY` environment variables,
//! which win over the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DictError, Result};
use crate::quiz::RatingScale;

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "mathdict.json";

/// Environment variable overriding `store.url`.
pub const STORE_URL_ENV: &str = "MATHDICT_STORE_URL";

/// Environment variable overriding `store.anonKey`.
pub const ANON_KEY_ENV: &str = "MATHDICT_ANON_KEY";

fn default_store_url() -> String {
    "http://localhost:54321".to_string()
}

const fn default_timeout_seconds() -> u64 {
    10
}

const fn default_cache_seconds() -> u64 {
    30
}

const fn default_session_idle_minutes() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

#[allow(clippy::unnecessary_wraps)]
fn default_admin_role() -> Option<String> {
    Some("admin".to_string())
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Hosted database and identity service.
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Quiz settings.
    #[serde(default)]
    pub quiz: QuizConfig,

    /// Profile role required for the admin panel; `null` disables the check.
    #[serde(default = "default_admin_role")]
    pub admin_role: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            quiz: QuizConfig::default(),
            admin_role: default_admin_role(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParseError` if the file exists but is not valid JSON,
    /// and `ConfigValidationError` if a value is out of range.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            DictError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `mathdict.json` from `dir`, or defaults when it is absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file, or defaults when it is absent.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(DictError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| DictError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment overrides for the store URL and key.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(STORE_URL_ENV).ok(),
            std::env::var(ANON_KEY_ENV).ok(),
        )
    }

    /// Replaces the store URL and key with any values given.
    ///
    /// Empty strings are ignored.
    #[must_use]
    pub fn with_overrides(mut self, url: Option<String>, anon_key: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.store.url = url;
        }
        if let Some(key) = anon_key.filter(|k| !k.trim().is_empty()) {
            self.store.anon_key = key;
        }
        self
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        let url = self.store.url.trim();
        if url.is_empty() {
            return Err(DictError::config_validation(
                "store.url must not be empty",
                format!("Set store.url in your mathdict.json or export {STORE_URL_ENV}"),
            ));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DictError::config_validation(
                format!("store.url must be an http(s) URL, got '{url}'"),
                "Use the project URL shown in your database dashboard, e.g. https://xyz.supabase.co",
            ));
        }

        if self.store.timeout_seconds == 0 {
            return Err(DictError::config_validation(
                "store.timeoutSeconds must be greater than 0",
                "Set store.timeoutSeconds to at least 1 in your mathdict.json",
            ));
        }

        if self.server.session_idle_minutes == 0 {
            return Err(DictError::config_validation(
                "server.sessionIdleMinutes must be greater than 0",
                "Set server.sessionIdleMinutes to how long an untouched quiz session is kept",
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(DictError::config_validation(
                "server.host must not be empty",
                "Use 127.0.0.1 to listen locally or 0.0.0.0 for all interfaces",
            ));
        }

        if self
            .admin_role
            .as_deref()
            .is_some_and(|role| role.trim().is_empty())
        {
            return Err(DictError::config_validation(
                "adminRole must not be an empty string",
                "Set adminRole to a profile role such as \"admin\", or to null to disable the check",
            ));
        }

        Ok(())
    }
}

/// Hosted database and identity service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Base URL of the hosted project.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Public (anonymous) API key.
    #[serde(default)]
    pub anon_key: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// How long list reads are served from the cache; `0` disables it.
    #[serde(default = "default_cache_seconds")]
    pub cache_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            anon_key: String::new(),
            timeout_seconds: default_timeout_seconds(),
            cache_seconds: default_cache_seconds(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind; `0` picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Quiz sessions untouched for this long are closed.
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_minutes: default_session_idle_minutes(),
        }
    }
}

/// Quiz settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizConfig {
    /// Scale offered for the post-quiz rating.
    #[serde(default)]
    pub rating_scale: RatingScale,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.store.url, "http://localhost:54321");
        assert_eq!(config.store.anon_key, "");
        assert_eq!(config.store.timeout_seconds, 10);
        assert_eq!(config.store.cache_seconds, 30);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.session_idle_minutes, 30);
        assert_eq!(config.quiz.rating_scale, RatingScale::Stars);
        assert_eq!(config.admin_role.as_deref(), Some("admin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "store": {"url": "https://abc.example.co", "anonKey": "public", "timeoutSeconds": 3},
            "server": {"port": 8080, "sessionIdleMinutes": 5},
            "quiz": {"ratingScale": "emoji"},
            "adminRole": null
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.store.url, "https://abc.example.co");
        assert_eq!(config.store.anon_key, "public");
        assert_eq!(config.store.timeout_seconds, 3);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.session_idle_minutes, 5);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.quiz.rating_scale, RatingScale::Emoji);
        assert_eq!(config.admin_role, None);
    }

    #[test]
    fn test_missing_admin_role_uses_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.admin_role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_mathdict_invalid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(b"{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, DictError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let path = PathBuf::from("/nonexistent/path/mathdict.json");
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_from_dir_finds_config() {
        use std::io::Write;

        let temp_dir = std::env::temp_dir().join("test_mathdict_dir");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let config_path = temp_dir.join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{"server": {"port": 4321}}"#).unwrap();

        let config = Config::load_from_dir(&temp_dir).unwrap();
        assert_eq!(config.server.port, 4321);

        std::fs::remove_file(&config_path).ok();
        std::fs::remove_dir(&temp_dir).ok();
    }

    #[test]
    fn test_invalid_rating_scale_rejected() {
        let json = r#"{"quiz": {"ratingScale": "thumbs"}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let mut config = Config::default();
        config.store.url = "ftp://db".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DictError::ConfigValidationError { .. }));
        assert!(err.to_string().contains("Suggestion"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = Config::default();
        config.store.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_idle_minutes() {
        let mut config = Config::default();
        config.server.session_idle_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_admin_role() {
        let config = Config {
            admin_role: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_overrides_ignores_empty() {
        let config = Config::default().with_overrides(
            Some("https://override.example.co".to_string()),
            Some(String::new()),
        );
        assert_eq!(config.store.url, "https://override.example.co");
        assert_eq!(config.store.anon_key, "");
    }
}
