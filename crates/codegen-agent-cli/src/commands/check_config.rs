use anyhow::Result;
use console::style;

use crate::setup::{build_registry, load_settings, Overrides};
use codegen_agent::config::Settings;

/// Print every setting, marking the missing ones, without stopping at the first gap
pub fn execute(overrides: &Overrides) -> Result<()> {
    let settings = load_settings(overrides)?;
    let report = ConfigReport::new(&settings);

    println!("{}", style("Database").bold());
    let database = &settings.database;
    println!("  {} DB_HOST: {}", ok(), database.host);
    println!("  {} DB_PORT: {}", ok(), database.port);
    print_optional("DB_NAME", database.name.as_deref());
    print_optional("DB_USER", database.user.as_deref());
    print_optional("DB_PASSWORD", database.password.as_ref().map(|_| "****"));
    match &database.snapshot {
        Some(path) => {
            let registry = build_registry(&settings)?;
            println!(
                "  {} DB_SNAPSHOT: {} ({} tools)",
                ok(),
                path.display(),
                registry.len()
            );
        }
        None => println!("  {} DB_SNAPSHOT: {}", style("-").dim(), style("not set").dim()),
    }

    println!("{}", style("Provider").bold());
    match settings.redacted_api_key() {
        Some(key) => println!("  {} API key: {}", ok(), key),
        None => println!("  {} API key: {}", missing(), style("not set").yellow()),
    }
    println!("  {} Base URL: {}", ok(), settings.provider.host);
    println!("  {} Model: {}", ok(), settings.provider.model);
    if let Some(temperature) = settings.provider.temperature {
        println!("  {} Temperature: {}", ok(), temperature);
    }
    if let Some(max_tokens) = settings.provider.max_tokens {
        println!("  {} Max tokens: {}", ok(), max_tokens);
    }

    println!("{}", style("Agent").bold());
    println!("  {} Max iterations: {}", ok(), settings.agent.max_iterations);

    println!();
    if report.is_complete() {
        println!("{}", style("Configuration is complete").green().bold());
    } else {
        println!("{}", style("Configuration is incomplete").yellow().bold());
        if !report.missing_database.is_empty() {
            println!("Set in .env, or point DB_SNAPSHOT at a schema snapshot:");
            for var in &report.missing_database {
                println!("  {}=...", var);
            }
        }
        if report.missing_api_key {
            println!("Set in .env:");
            println!("  DEEPSEEK_API_KEY=sk-...");
        }
    }
    Ok(())
}

/// What still has to be configured before the agent can run
#[derive(Debug, PartialEq)]
pub struct ConfigReport {
    pub missing_database: Vec<&'static str>,
    pub missing_api_key: bool,
}

impl ConfigReport {
    pub fn new(settings: &Settings) -> Self {
        // A snapshot stands in for the live connection
        let missing_database = if settings.database.snapshot.is_some() {
            Vec::new()
        } else {
            settings.database.missing_vars()
        };
        Self {
            missing_database,
            missing_api_key: settings.provider.api_key.is_none(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_database.is_empty() && !self.missing_api_key
    }
}

fn print_optional(name: &str, value: Option<&str>) {
    match value {
        Some(value) => println!("  {} {}: {}", ok(), name, value),
        None => println!("  {} {}: {}", missing(), name, style("not set").yellow()),
    }
}

fn ok() -> console::StyledObject<&'static str> {
    style("✓").green()
}

fn missing() -> console::StyledObject<&'static str> {
    style("✗").red()
}
