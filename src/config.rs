use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub browser: BrowserConfig,
    pub alerting: AlertingConfig,
    pub orchestrator: OrchestratorConfig,
    pub metrics: MetricsConfig,
    /// Per-provider API credentials, keyed by the name an extractor
    /// declares via `required_credential`.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Websocket debugger URL of a remote pooled Chrome; when unset only
    /// the local engine is available.
    pub remote_ws_url: Option<String>,
    pub chrome_path: Option<String>,
    /// Remote connection attempts before declaring remote failure.
    pub connect_attempts: u32,
    /// Base delay for exponential backoff between remote attempts.
    pub retry_base_delay_ms: u64,
    /// Fall back to a locally launched browser when remote acquisition
    /// fails. Enabled in production-like deployments.
    pub fallback_to_local: bool,
    pub user_agent: String,
    /// Per-navigation timeout in seconds.
    pub navigation_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub discord_webhook_url: Option<String>,
    pub slack_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard per-job timeout for the fan-out trigger, in seconds.
    pub job_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "GRIDWATCH_"
            .add_source(Environment::with_prefix("GRIDWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Allow the conventional env vars without the prefix
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }
        if config.browser.remote_ws_url.is_none() {
            config.browser.remote_ws_url = env::var("BROWSER_WS_ENDPOINT").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if let Some(ws_url) = &self.browser.remote_ws_url {
            let parsed = Url::parse(ws_url)
                .map_err(|_| ConfigError::Message("Invalid browser.remote_ws_url".into()))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(ConfigError::Message(
                    "browser.remote_ws_url must be a ws:// or wss:// URL".into(),
                ));
            }
        }

        if self.browser.connect_attempts == 0 {
            return Err(ConfigError::Message(
                "browser.connect_attempts must be greater than 0".into(),
            ));
        }

        if self.orchestrator.job_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "orchestrator.job_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.orchestrator.max_concurrent_jobs == 0 {
            return Err(ConfigError::Message(
                "orchestrator.max_concurrent_jobs must be greater than 0".into(),
            ));
        }

        if let Some(url) = &self.alerting.discord_webhook_url {
            if !url.starts_with("https://discord.com/api/webhooks/") {
                return Err(ConfigError::Message(
                    "Invalid Discord webhook URL format".into(),
                ));
            }
        }

        if let Some(url) = &self.alerting.slack_webhook_url {
            if Url::parse(url).is_err() {
                return Err(ConfigError::Message("Invalid Slack webhook URL".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message(
                "Metrics port must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout: 30,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        },
        browser: BrowserConfig {
            remote_ws_url: None,
            chrome_path: None,
            connect_attempts: 3,
            retry_base_delay_ms: 50,
            fallback_to_local: true,
            user_agent: "Gridwatch/0.1".to_string(),
            navigation_timeout: 10,
        },
        alerting: AlertingConfig {
            discord_webhook_url: None,
            slack_webhook_url: None,
        },
        orchestrator: OrchestratorConfig {
            job_timeout_secs: 8,
            max_concurrent_jobs: 4,
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9001,
        },
        api_keys: HashMap::new(),
    }
}
