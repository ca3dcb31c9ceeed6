use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use codegen_agent::agent::Agent;
use codegen_agent::config::Settings;
use codegen_agent::providers::factory;
use codegen_agent::registry::ToolRegistry;
use codegen_agent::tools::database::{register_database_tools, SchemaCatalog};
use codegen_agent::tools::postgres::PostgresCatalog;
use codegen_agent::tools::snapshot::SnapshotCatalog;

/// Command line values that take precedence over the environment
pub struct Overrides {
    pub snapshot: Option<PathBuf>,
    pub max_iterations: Option<usize>,
}

pub fn load_settings(overrides: &Overrides) -> Result<Settings> {
    let mut settings = Settings::load()?;
    apply_overrides(&mut settings, overrides);
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, overrides: &Overrides) {
    if let Some(snapshot) = &overrides.snapshot {
        settings.database.snapshot = Some(snapshot.clone());
    }
    if let Some(max_iterations) = overrides.max_iterations {
        settings.agent.max_iterations = max_iterations;
    }
}

/// Register the database tools on the configured backend.
///
/// A schema snapshot takes precedence over a live server.
pub fn build_registry(settings: &Settings) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let database = &settings.database;

    let catalog: Arc<dyn SchemaCatalog> = if let Some(path) = &database.snapshot {
        let catalog = SnapshotCatalog::from_file(path)
            .with_context(|| format!("Unable to load snapshot {}", path.display()))?;
        tracing::info!(snapshot = %path.display(), "using schema snapshot");
        Arc::new(catalog)
    } else if let Some(config) = database.postgres_config() {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "using live database"
        );
        Arc::new(PostgresCatalog::new(config))
    } else {
        tracing::warn!("neither DB_SNAPSHOT nor DB_NAME/DB_USER is set, running without database tools");
        return Ok(registry);
    };

    register_database_tools(&mut registry, catalog);
    Ok(registry)
}

pub fn build_agent(settings: &Settings) -> Result<Agent> {
    let registry = Arc::new(build_registry(settings)?);
    let provider = factory::get_provider(settings.provider_config()?)?;
    Ok(Agent::new(provider, registry)
        .with_max_iterations(settings.agent.max_iterations)
        .with_system_prompt(settings.agent.system_prompt.clone()))
}
