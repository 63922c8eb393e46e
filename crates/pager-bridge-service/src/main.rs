//! # Pager-Bridge Service
//!
//! Binary entry point for the PagerDuty/Slack bridge.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Fetches credentials from the configured secret store
//! - Wires the PagerDuty and Slack clients into the webhook handlers
//! - Starts the HTTP server from pager-bridge-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration or
//! credential failure.

mod settings;

use pager_bridge_api::{start_server, AppState, BridgeConfig, BridgeMetrics};
use pager_bridge_core::{
    chat::{command::CommandHandler, SlackClient},
    incident::PagerDutyClient,
    webhook::IncidentWebhookHandler,
    Credentials, NotificationRouter, TemplateRenderer,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIGURATION_EXIT_CODE: i32 = 3;

#[tokio::main]
async fn main() {
    let loaded = settings::load_config();
    init_tracing(loaded.as_ref().is_ok_and(|config| config.logging.json));

    info!("Starting Pager-Bridge Service");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration; aborting: {:#}", e);
            std::process::exit(CONFIGURATION_EXIT_CODE);
        }
    };

    let state = match build_state(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialise the bridge; aborting: {:#}", e);
            std::process::exit(CONFIGURATION_EXIT_CODE);
        }
    };

    info!(
        host = %state.config.server.host,
        port = state.config.server.port,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(state).await {
        error!("Server stopped with an error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "pager_bridge_service=info,pager_bridge_api=info,pager_bridge_core=info,tower_http=debug"
            .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Fetch credentials and wire every component.
async fn build_state(config: BridgeConfig) -> anyhow::Result<AppState> {
    let store = settings::secret_store(&config.secrets)?;
    let credentials =
        Arc::new(Credentials::load(store.as_ref(), config.slack.command_settings()).await?);

    let renderer = Arc::new(match &config.templates_dir {
        Some(dir) => TemplateRenderer::from_dir(dir)?,
        None => TemplateRenderer::builtin(),
    });

    let pagerduty = Arc::new(PagerDutyClient::new(
        config.pagerduty.clone(),
        credentials.clone(),
    )?);
    let slack = Arc::new(SlackClient::new(
        config.slack.client_config(),
        credentials.clone(),
    )?);

    let router = NotificationRouter::new(
        pagerduty.clone(),
        renderer.clone(),
        config.pagerduty.diagnostic_channel.clone(),
    );
    let incident_handler = Arc::new(IncidentWebhookHandler::new(
        credentials.clone(),
        router,
        slack.clone(),
    ));
    let command_handler = Arc::new(CommandHandler::new(
        pagerduty,
        slack,
        renderer,
        credentials.slack.command.clone(),
        credentials.slack.ping_phrase.clone(),
    ));

    let metrics = BridgeMetrics::new()?;

    Ok(AppState::new(
        config,
        credentials,
        incident_handler,
        command_handler,
        metrics,
    ))
}
