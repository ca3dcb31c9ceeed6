use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::agent::DEFAULT_MAX_ITERATIONS;
use crate::providers::configs::{redact, OpenAiProviderConfig, ProviderConfig};
use crate::tools::postgres::PostgresConfig;

/// Environment variables read when building `Settings`
const ENV_VARS: &[&str] = &[
    "DEEPSEEK_API_KEY",
    "API_KEY",
    "DEEPSEEK_API_URL",
    "LLM_MODEL",
    "LLM_TEMPERATURE",
    "LLM_MAX_TOKENS",
    "AGENT_MAX_ITERATIONS",
    "AGENT_SYSTEM_PROMPT",
    "DB_SNAPSHOT",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
];

const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a code generation assistant for a Java backend. \
Use the database tools to inspect the PostgreSQL schema before answering questions about tables, \
columns or the entities, mappers, services and controllers derived from them.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The flat environment view, keys lowercased by the `config` crate
#[derive(Debug, Deserialize)]
struct EnvSettings {
    deepseek_api_key: Option<String>,
    api_key: Option<String>,
    deepseek_api_url: String,
    llm_model: String,
    llm_temperature: Option<f32>,
    llm_max_tokens: Option<i32>,
    agent_max_iterations: usize,
    agent_system_prompt: Option<String>,
    db_snapshot: Option<PathBuf>,
    db_host: String,
    db_port: u16,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
}

/// Chat endpoint settings. The api key is only required once a provider is built.
#[derive(Clone)]
pub struct ProviderSettings {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub system_prompt: String,
}

#[derive(Clone)]
pub struct DatabaseSettings {
    /// Schema snapshot, used instead of a live server when set
    pub snapshot: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("snapshot", &self.snapshot)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl DatabaseSettings {
    /// Live server settings, available once DB_NAME and DB_USER are set
    pub fn postgres_config(&self) -> Option<PostgresConfig> {
        Some(PostgresConfig {
            host: self.host.clone(),
            port: self.port,
            database: self.name.clone()?,
            user: self.user.clone()?,
            password: self.password.clone(),
            connect_timeout: DB_CONNECT_TIMEOUT,
        })
    }

    /// Connection variables that are not set
    pub fn missing_vars(&self) -> Vec<&'static str> {
        [
            ("DB_NAME", self.name.is_none()),
            ("DB_USER", self.user.is_none()),
            ("DB_PASSWORD", self.password.is_none()),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub agent: AgentSettings,
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load `.env` from the working directory, then read the process environment
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars = ENV_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self::from_vars(vars)
    }

    /// Build settings from an explicit set of variables
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("deepseek_api_url", default_api_url())?
            .set_default("llm_model", default_model())?
            .set_default("agent_max_iterations", DEFAULT_MAX_ITERATIONS as i64)?
            .set_default("db_host", default_db_host())?
            .set_default("db_port", default_db_port())?
            .add_source(Environment::default().source(Some(vars)))
            .build()?;

        let env: EnvSettings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;

        // DEEPSEEK_API_KEY wins over the generic API_KEY
        let api_key = env
            .deepseek_api_key
            .filter(|key| !key.is_empty())
            .or(env.api_key.filter(|key| !key.is_empty()));

        Ok(Settings {
            provider: ProviderSettings {
                host: env.deepseek_api_url,
                api_key,
                model: env.llm_model,
                temperature: env.llm_temperature,
                max_tokens: env.llm_max_tokens,
            },
            agent: AgentSettings {
                max_iterations: env.agent_max_iterations,
                system_prompt: env
                    .agent_system_prompt
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            },
            database: DatabaseSettings {
                snapshot: env.db_snapshot,
                host: env.db_host,
                port: env.db_port,
                name: env.db_name,
                user: env.db_user,
                password: env.db_password.filter(|password| !password.is_empty()),
            },
        })
    }

    /// Provider settings for the factory, failing when no api key is set
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let api_key = self
            .provider
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: "DEEPSEEK_API_KEY".to_string(),
            })?;

        Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: self.provider.host.clone(),
            api_key,
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
        }))
    }

    pub fn redacted_api_key(&self) -> Option<String> {
        self.provider.api_key.as_deref().map(redact)
    }
}

fn default_api_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> i64 {
    5432
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[("API_KEY", "sk-test-0123456789")]))?;

        assert_eq!(settings.provider.host, "https://api.deepseek.com/v1");
        assert_eq!(settings.provider.model, "deepseek-chat");
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-test-0123456789"));
        assert_eq!(settings.provider.temperature, None);
        assert_eq!(settings.agent.max_iterations, 10);
        assert_eq!(settings.agent.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.database.host, "localhost");
        assert_eq!(settings.database.port, 5432);
        assert!(settings.database.snapshot.is_none());
        Ok(())
    }

    #[test]
    fn test_deepseek_key_takes_precedence() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[
            ("API_KEY", "generic"),
            ("DEEPSEEK_API_KEY", "deepseek"),
        ]))?;
        assert_eq!(settings.provider.api_key.as_deref(), Some("deepseek"));

        let settings = Settings::from_vars(vars(&[("API_KEY", "generic"), ("DEEPSEEK_API_KEY", "")]))?;
        assert_eq!(settings.provider.api_key.as_deref(), Some("generic"));
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_API_URL", "http://localhost:8080/v1"),
            ("LLM_MODEL", "deepseek-coder"),
            ("LLM_TEMPERATURE", "0.2"),
            ("LLM_MAX_TOKENS", "4096"),
            ("AGENT_MAX_ITERATIONS", "3"),
            ("DB_SNAPSHOT", "schema.json"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "lifehub"),
        ]))?;

        assert_eq!(settings.provider.host, "http://localhost:8080/v1");
        assert_eq!(settings.provider.model, "deepseek-coder");
        assert_eq!(settings.provider.temperature, Some(0.2));
        assert_eq!(settings.provider.max_tokens, Some(4096));
        assert_eq!(settings.agent.max_iterations, 3);
        assert_eq!(settings.database.snapshot, Some(PathBuf::from("schema.json")));
        assert_eq!(settings.database.port, 6543);
        assert_eq!(settings.database.name.as_deref(), Some("lifehub"));
        Ok(())
    }

    #[test]
    fn test_missing_api_key_only_fails_provider() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[("DB_SNAPSHOT", "schema.json")]))?;
        assert!(settings.provider.api_key.is_none());
        assert!(settings.redacted_api_key().is_none());

        let err = settings.provider_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { ref env_var } if env_var == "DEEPSEEK_API_KEY"
        ));
        Ok(())
    }

    #[test]
    fn test_provider_config() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[
            ("API_KEY", "sk-test"),
            ("LLM_MODEL", "deepseek-coder"),
        ]))?;
        let ProviderConfig::OpenAi(config) = settings.provider_config()?;
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "deepseek-coder");
        assert_eq!(config.host, "https://api.deepseek.com/v1");
        Ok(())
    }

    #[test]
    fn test_database_settings() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(HashMap::new())?;
        assert!(settings.database.postgres_config().is_none());
        assert_eq!(
            settings.database.missing_vars(),
            vec!["DB_NAME", "DB_USER", "DB_PASSWORD"]
        );

        let settings = Settings::from_vars(vars(&[
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "lifehub"),
            ("DB_USER", "postgres"),
            ("DB_PASSWORD", "hunter2-hunter2"),
        ]))?;
        assert!(settings.database.missing_vars().is_empty());
        let config = settings.database.postgres_config().unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "lifehub");
        assert_eq!(config.password.as_deref(), Some("hunter2-hunter2"));
        assert!(!format!("{:?}", settings.database).contains("hunter2"));
        Ok(())
    }

    #[test]
    fn test_invalid_number() {
        let err = Settings::from_vars(vars(&[
            ("API_KEY", "sk-test"),
            ("AGENT_MAX_ITERATIONS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Other(_)));
    }

    #[test]
    fn test_redacted_api_key() -> Result<(), ConfigError> {
        let settings = Settings::from_vars(vars(&[("API_KEY", "sk-1234567890abcdefwxyz")]))?;
        assert_eq!(settings.redacted_api_key().as_deref(), Some("sk-1234567...wxyz"));
        assert!(!format!("{:?}", settings).contains("sk-1234567890abcdefwxyz"));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_from_process_environment() -> Result<(), ConfigError> {
        for key in ENV_VARS {
            env::remove_var(key);
        }
        env::set_var("DEEPSEEK_API_KEY", "sk-from-env");
        env::set_var("LLM_MODEL", "deepseek-reasoner");

        let settings = Settings::from_env();

        env::remove_var("DEEPSEEK_API_KEY");
        env::remove_var("LLM_MODEL");

        let settings = settings?;
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-from-env"));
        assert_eq!(settings.provider.model, "deepseek-reasoner");
        Ok(())
    }
}
