use anyhow::Result;
use railtalk::executor::ToolExecutor;
use railtalk::orchestrator::Orchestrator;
use railtalk::prompt_template::system_prompt;
use railtalk::providers::factory;
use railtalk::registry::ToolRegistry;
use railtalk::testrail::TestRailClient;
use std::sync::Arc;

use crate::configuration::Settings;

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<dyn ToolExecutor>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            orchestrator,
            executor,
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let registry = Arc::new(ToolRegistry::testrail()?);
        let executor: Arc<dyn ToolExecutor> = Arc::new(TestRailClient::new(registry.clone())?);

        let provider_config = settings.provider.into_config();
        tracing::info!(model = provider_config.model(), "configured model provider");
        let provider = factory::get_provider(provider_config)?;

        let mut orchestrator = Orchestrator::new(provider, executor.clone(), registry.clone())?;
        if let Some(path) = settings.prompt.path {
            tracing::info!(path = %path.display(), "loading system prompt template");
            orchestrator = orchestrator.with_system_prompt(system_prompt(&registry, Some(path))?);
        }

        Ok(Self::new(Arc::new(orchestrator), executor))
    }
}
