//! Service configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables for the
//! secrets that should never live in a file: `QUORUM_SESSION_SECRET` and
//! `QUORUM_SMTP_PASSWORD`. Every section has working defaults except the
//! session secret, which must be set before the server will start.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub mail: MailConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API with credentials. Cookies only flow
    /// for origins on this list.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC secret for session tokens. No default; the server refuses to
    /// start without one.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// When false, messages are logged instead of delivered.
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    /// RFC 5322 mailbox, e.g. `Quorum <no-reply@example.com>`.
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Frontend origin used to build password-reset links.
    pub client_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_base_url: default_client_base_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("quorum.db")
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "Quorum <no-reply@quorum.local>".to_string()
}

fn default_client_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl Config {
    /// Read the file if one was given, otherwise start from defaults, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", p.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("QUORUM_SESSION_SECRET") {
            if !secret.is_empty() {
                self.session.secret = secret;
            }
        }
        if let Ok(password) = std::env::var("QUORUM_SMTP_PASSWORD") {
            if !password.is_empty() {
                self.mail.smtp_password = password;
            }
        }
    }

    /// Startup checks that should fail fast rather than at first request.
    pub fn validate(&self) -> Result<()> {
        if self.session.secret.trim().is_empty() {
            bail!("session.secret is not set; configure it or export QUORUM_SESSION_SECRET");
        }
        if self.mail.enabled && self.mail.smtp_username.is_empty() {
            bail!("mail.enabled is true but mail.smtp_username is empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_serviceable() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.store.db_path, PathBuf::from("quorum.db"));
        assert!(!config.mail.enabled);
        assert_eq!(config.app.client_base_url, "http://localhost:5173");
        // Missing secret is the one thing validation must catch.
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [session]
            secret = "s3cret"

            [mail]
            enabled = true
            smtp_username = "mailer@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.mail.smtp_port, 587);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mail_enabled_requires_credentials() {
        let config: Config = toml::from_str(
            r#"
            [session]
            secret = "s3cret"

            [mail]
            enabled = true
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("QUORUM_SESSION_SECRET", "from-env");
        std::env::set_var("QUORUM_SMTP_PASSWORD", "hunter2");

        let mut config = Config::default();
        config.session.secret = "from-file".into();
        config.apply_env_overrides();
        assert_eq!(config.session.secret, "from-env");
        assert_eq!(config.mail.smtp_password, "hunter2");

        std::env::remove_var("QUORUM_SESSION_SECRET");
        std::env::remove_var("QUORUM_SMTP_PASSWORD");
    }
}
