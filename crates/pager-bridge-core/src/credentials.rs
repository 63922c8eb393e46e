//! # Credentials Module
//!
//! Process-wide signing secrets and API keys for Slack and PagerDuty.
//!
//! Credentials are loaded once at startup from a [`SecretStore`] and then
//! shared read-only (behind an `Arc`) by every component. Secret values are
//! zeroised on drop and never appear in `Debug` output.

use crate::ConfigurationError;
use async_trait::async_trait;
use std::{collections::HashMap, fmt, path::PathBuf};
use tracing::{debug, info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;

/// Secret key holding the Slack request signing secret.
pub const SLACK_SIGNING_SECRET: &str = "SLACK_SIGNING_SECRET";
/// Secret key holding the Slack bot OAuth token.
pub const SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
/// Secret key holding the PagerDuty webhook signing key.
pub const PAGER_DUTY_SIGNING_KEY: &str = "PAGER_DUTY_SIGNING_KEY";
/// Secret key holding the PagerDuty Events API routing key.
pub const PAGER_DUTY_EVENTS_API_KEY: &str = "PAGER_DUTY_EVENTS_API_KEY";
/// Secret key holding the PagerDuty REST API token.
pub const PAGER_DUTY_REST_API_KEY: &str = "PAGER_DUTY_REST_API_KEY";

/// Every key that must be present for the bridge to start.
pub const REQUIRED_SECRET_KEYS: [&str; 5] = [
    SLACK_SIGNING_SECRET,
    SLACK_BOT_TOKEN,
    PAGER_DUTY_SIGNING_KEY,
    PAGER_DUTY_EVENTS_API_KEY,
    PAGER_DUTY_REST_API_KEY,
];

pub const DEFAULT_SLACK_COMMAND: &str = "/piiano-pd-trigger";
pub const DEFAULT_PING_PHRASE: &str = "piiano-ping-bot";

// ============================================================================
// SecretString
// ============================================================================

/// Secure container for a single secret value.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Slack-side credentials and command tunables.
#[derive(Debug, Clone)]
pub struct SlackCredentials {
    pub signing_secret: SecretString,
    pub bot_token: SecretString,
    /// Slash command accepted as an alternative to mentions.
    pub command: String,
    /// Exact mention text answered with a fixed pong.
    pub ping_phrase: String,
}

/// PagerDuty-side credentials.
#[derive(Debug, Clone)]
pub struct PagerDutyCredentials {
    pub signing_key: SecretString,
    pub events_api_key: SecretString,
    pub rest_api_key: SecretString,
}

/// Overridable, non-secret command settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSettings {
    pub command: String,
    pub ping_phrase: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_SLACK_COMMAND.to_string(),
            ping_phrase: DEFAULT_PING_PHRASE.to_string(),
        }
    }
}

/// The complete credential set for one process.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub slack: SlackCredentials,
    pub pagerduty: PagerDutyCredentials,
}

impl Credentials {
    /// Build credentials from an already fetched secret document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSecret`] naming the first
    /// required key that is absent or empty.
    pub fn from_document(
        document: &SecretDocument,
        settings: CommandSettings,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            slack: SlackCredentials {
                signing_secret: document.require(SLACK_SIGNING_SECRET)?,
                bot_token: document.require(SLACK_BOT_TOKEN)?,
                command: settings.command,
                ping_phrase: settings.ping_phrase,
            },
            pagerduty: PagerDutyCredentials {
                signing_key: document.require(PAGER_DUTY_SIGNING_KEY)?,
                events_api_key: document.require(PAGER_DUTY_EVENTS_API_KEY)?,
                rest_api_key: document.require(PAGER_DUTY_REST_API_KEY)?,
            },
        })
    }

    /// Fetch the secret document from `store` and build credentials.
    #[instrument(skip(store, settings))]
    pub async fn load(
        store: &dyn SecretStore,
        settings: CommandSettings,
    ) -> Result<Self, ConfigurationError> {
        let document = store.fetch().await?;
        let credentials = Self::from_document(&document, settings)?;
        info!(store = store.name(), "Loaded bridge credentials");
        Ok(credentials)
    }
}

// ============================================================================
// Secret Stores
// ============================================================================

/// Key/value secrets as returned by a secret store.
#[derive(Debug, Clone, Default)]
pub struct SecretDocument {
    values: HashMap<String, SecretString>,
}

impl SecretDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), SecretString::new(value));
    }

    /// Parse a JSON object of string values.
    ///
    /// Non-string values are skipped; they can never satisfy a required key.
    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| ConfigurationError::SecretStore {
                message: format!("secret document is not a JSON object: {}", e),
            })?;

        let mut document = Self::new();
        for (key, value) in parsed {
            match value {
                serde_json::Value::String(s) => document.insert(key, s),
                _ => debug!(key = %key, "Ignoring non-string secret value"),
            }
        }
        Ok(document)
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.values.get(key)
    }

    /// Get a required, non-empty secret.
    pub fn require(&self, key: &str) -> Result<SecretString, ConfigurationError> {
        match self.values.get(key) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(ConfigurationError::MissingSecret {
                key: key.to_string(),
            }),
        }
    }
}

/// Source of the bridge's secret document.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve all secrets in one call.
    async fn fetch(&self) -> Result<SecretDocument, ConfigurationError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Reads each required key from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvironmentSecretStore;

#[async_trait]
impl SecretStore for EnvironmentSecretStore {
    async fn fetch(&self) -> Result<SecretDocument, ConfigurationError> {
        let mut document = SecretDocument::new();
        for key in REQUIRED_SECRET_KEYS {
            if let Ok(value) = std::env::var(key) {
                document.insert(key, value);
            }
        }
        Ok(document)
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

/// Reads a JSON object of secrets from a file (e.g. a mounted secret volume).
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self) -> Result<SecretDocument, ConfigurationError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConfigurationError::SecretStore {
                message: format!("failed to read {}: {}", self.path.display(), e),
            }
        })?;
        SecretDocument::from_json(&raw)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Fixed in-memory secrets for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    document: SecretDocument,
}

impl InMemorySecretStore {
    pub fn new(document: SecretDocument) -> Self {
        Self { document }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn fetch(&self) -> Result<SecretDocument, ConfigurationError> {
        Ok(self.document.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// AWS Secrets Manager secret whose string value is a JSON object.
#[cfg(feature = "aws")]
#[derive(Debug, Clone)]
pub struct AwsSecretsManagerStore {
    secret_id: String,
}

#[cfg(feature = "aws")]
impl AwsSecretsManagerStore {
    pub fn new(secret_id: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
        }
    }
}

#[cfg(feature = "aws")]
#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    #[instrument(skip(self), fields(secret_id = %self.secret_id))]
    async fn fetch(&self) -> Result<SecretDocument, ConfigurationError> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_secretsmanager::Client::new(&sdk_config);

        let response = client
            .get_secret_value()
            .secret_id(&self.secret_id)
            .send()
            .await
            .map_err(|e| ConfigurationError::SecretStore {
                message: format!("GetSecretValue failed: {}", e),
            })?;

        SecretDocument::from_json(response.secret_string().unwrap_or("{}"))
    }

    fn name(&self) -> &'static str {
        "aws_secrets_manager"
    }
}
