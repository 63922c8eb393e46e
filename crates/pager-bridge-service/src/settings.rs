//! Startup configuration for the service binary.
//!
//! Sources, applied in order (later sources override earlier ones):
//!  1. `/etc/pager-bridge/service.yaml`
//!  2. `./config/service.yaml`
//!  3. the file named by `PAGER_BRIDGE_CONFIG_FILE` (must exist when set)
//!  4. environment variables prefixed `PB__`, e.g. `PB__SERVER__PORT=9090`
//!
//! `SLACK_COMMAND` and `SLACK_PING_PHRASE` are honoured last for deployments
//! that configured the bot before the structured sources existed.

use anyhow::Context;
use pager_bridge_api::{BridgeConfig, SecretsConfig};
use pager_bridge_core::credentials::{EnvironmentSecretStore, FileSecretStore, SecretStore};
use tracing::info;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "PAGER_BRIDGE_CONFIG_FILE";

/// Prefix of structured environment overrides.
pub const ENV_PREFIX: &str = "PB";

pub const LEGACY_COMMAND_ENV: &str = "SLACK_COMMAND";
pub const LEGACY_PING_PHRASE_ENV: &str = "SLACK_PING_PHRASE";

/// Load, override and validate the service configuration.
pub fn load_config() -> anyhow::Result<BridgeConfig> {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());

    let mut config = load_from_sources(explicit_path.as_deref())?;
    apply_legacy_overrides(&mut config, |key| std::env::var(key).ok());
    config
        .validate()
        .context("service configuration is invalid")?;
    Ok(config)
}

/// Build the configuration from files and `PB__` variables.
pub fn load_from_sources(explicit_path: Option<&str>) -> anyhow::Result<BridgeConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/pager-bridge/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("could not deserialize service configuration")
}

/// Apply the unstructured `SLACK_*` overrides. Empty values are ignored.
pub fn apply_legacy_overrides(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(command) = lookup(LEGACY_COMMAND_ENV).filter(|v| !v.is_empty()) {
        config.slack.command = command;
    }
    if let Some(phrase) = lookup(LEGACY_PING_PHRASE_ENV).filter(|v| !v.is_empty()) {
        config.slack.ping_phrase = phrase;
    }
}

/// Secret store selected by configuration.
pub fn secret_store(config: &SecretsConfig) -> anyhow::Result<Box<dyn SecretStore>> {
    info!(provider = config.provider_name(), "Selecting secret store");

    match config {
        SecretsConfig::Environment => Ok(Box::new(EnvironmentSecretStore)),
        SecretsConfig::File { path } => Ok(Box::new(FileSecretStore::new(path.clone()))),
        #[cfg(feature = "aws")]
        SecretsConfig::AwsSecretsManager { secret_id } => Ok(Box::new(
            pager_bridge_core::credentials::AwsSecretsManagerStore::new(secret_id.clone()),
        )),
        #[cfg(not(feature = "aws"))]
        SecretsConfig::AwsSecretsManager { .. } => {
            anyhow::bail!("secrets provider 'aws_secrets_manager' requires the 'aws' feature")
        }
    }
}
