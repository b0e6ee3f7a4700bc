// ABOUTME: Application wiring for the specforge command-line interface
// ABOUTME: Builds the store, conversation manager, oracles and orchestrator from configuration

pub mod output;

use anyhow::Context;
use specforge_ai::{AIService, CompletionOracle};
use specforge_core::Config;
use specforge_generator::{ConversationManager, Orchestrator, OrchestratorSettings};
use specforge_openapi::{OpenApiValidator, ValidationOracle};
use specforge_storage::ConversationStore;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing to stderr so stdout stays reserved for event output
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub struct App {
    config: Config,
    manager: Arc<ConversationManager>,
    orchestrator: Orchestrator,
}

impl App {
    /// Open the conversation database and connect the Anthropic oracle
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = ConversationStore::open(&config.db_path, config.conversation_ttl)
            .await
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
        let service = AIService::from_config(&config).context("Failed to set up the AI client")?;
        debug!(model = service.model(), "AI client ready");

        Ok(Self::with_oracles(
            config,
            store,
            Arc::new(service),
            Arc::new(OpenApiValidator::new()),
        ))
    }

    pub fn with_oracles(
        config: Config,
        store: ConversationStore,
        completion: Arc<dyn CompletionOracle>,
        validator: Arc<dyn ValidationOracle>,
    ) -> Self {
        let manager = Arc::new(ConversationManager::new(store));
        let orchestrator = Orchestrator::new(manager.clone(), completion, validator)
            .with_settings(OrchestratorSettings::from_config(&config));

        Self {
            config,
            manager,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ConversationManager> {
        &self.manager
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Start the background sweep of expired conversations
    pub async fn start_cleanup(&self) -> bool {
        let started = self
            .manager
            .start_cleanup(self.config.cleanup_interval)
            .await;
        if started {
            info!(
                interval_secs = self.config.cleanup_interval.as_secs(),
                "Conversation cleanup scheduled"
            );
        }
        started
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

/// Split a `key=value` argument
pub fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", input)),
    }
}
