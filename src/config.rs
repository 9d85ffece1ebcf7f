//! Application configuration.
//!
//! Environment loading, validation, and per-subsystem settings. Payment
//! processor keys are required at startup; the platform hot wallet is
//! optional and only degrades the EVM adapters.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVariable(String),

    #[error("invalid value for {0}")]
    InvalidValue(String),
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => AppEnv::Production,
            _ => AppEnv::Development,
        }
    }

    pub fn is_development(self) -> bool {
        self == AppEnv::Development
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: AppEnv,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub processor: ProcessorConfig,
    pub rate_limit: RateLimitConfig,
    pub workers: WorkerConfig,
    pub chains: ChainConfig,
    pub session_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        let config = AppConfig {
            env: AppEnv::from_env(),
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            processor: ProcessorConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            workers: WorkerConfig::from_env()?,
            chains: ChainConfig::from_env()?,
            session_secret: required("SESSION_SECRET")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET must be at least 32 characters".to_string(),
            ));
        }
        self.server.validate()?;
        self.processor.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parsed_or("PORT", 8000u16)?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT cannot be 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parsed_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: parsed_or("DB_MIN_CONNECTIONS", 5)?,
            connect_timeout: Duration::from_secs(parsed_or("DB_CONNECT_TIMEOUT_SECS", 30)?),
            idle_timeout: Duration::from_secs(parsed_or("DB_IDLE_TIMEOUT_SECS", 600)?),
        })
    }
}

/// Hosted-checkout payment processor. All three keys are required; the
/// service refuses to start without them.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub secret_key: String,
    pub publishable_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout: Duration,
    pub session_ttl: Duration,
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ProcessorConfig {
            secret_key: required("PROCESSOR_SECRET_KEY")?,
            publishable_key: required("PROCESSOR_PUBLISHABLE_KEY")?,
            webhook_secret: required("PROCESSOR_WEBHOOK_SECRET")?,
            base_url: env::var("PROCESSOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.payproc.example".to_string()),
            timeout: Duration::from_secs(parsed_or("PROCESSOR_TIMEOUT_SECS", 10)?),
            session_ttl: Duration::from_secs(parsed_or("PROCESSOR_SESSION_TTL_SECS", 1800)?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() || self.webhook_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "processor keys cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RateLimitConfig {
            window: Duration::from_millis(parsed_or("RATE_LIMIT_WINDOW_MS", 60_000u64)?),
            max_requests: parsed_or("RATE_LIMIT_MAX_REQUESTS", 120)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Plan catalog reconciliation cadence. Default every 6 hours.
    pub plan_sync_interval: Duration,
    /// Confirmation sweep cadence. Default every 2 minutes; the sweep is the
    /// recovery path for dropped pollers.
    pub confirmation_sweep_interval: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WorkerConfig {
            plan_sync_interval: Duration::from_secs(parsed_or(
                "PROVIDER_SYNC_INTERVAL_SECS",
                21_600u64,
            )?),
            confirmation_sweep_interval: Duration::from_secs(parsed_or(
                "TX_CONFIRMATION_SWEEP_INTERVAL_SECS",
                120u64,
            )?),
            poll_interval: Duration::from_secs(parsed_or("TX_POLL_INTERVAL_SECS", 10u64)?),
            poll_max_attempts: parsed_or("TX_POLL_MAX_ATTEMPTS", 30)?,
        })
    }
}

/// Per-provider transport settings. RPC and explorer URLs carry public
/// defaults; keys are optional and leave the adapter degraded when absent.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub platform_wallet_key: Option<String>,
    pub allow_mock_submission: bool,
    pub filecoin: EvmProviderConfig,
    pub storj: ApiProviderConfig,
    pub lighthouse: ApiProviderConfig,
}

impl ChainConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ChainConfig {
            platform_wallet_key: env::var("PLATFORM_WALLET_PRIVATE_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            allow_mock_submission: parsed_or("ALLOW_MOCK_SUBMISSION", false)?,
            filecoin: EvmProviderConfig {
                rpc_url: env::var("FILECOIN_RPC_URL")
                    .unwrap_or_else(|_| "https://api.node.glif.io/rpc/v1".to_string()),
                explorer_url: env::var("FILECOIN_EXPLORER_URL")
                    .unwrap_or_else(|_| "https://filfox.info/en".to_string()),
                market_address: env::var("FILECOIN_MARKET_ADDRESS").ok(),
                chain_id: parsed_or("FILECOIN_CHAIN_ID", 314u64)?,
                timeout: Duration::from_secs(parsed_or("FILECOIN_TIMEOUT_SECS", 30)?),
            },
            storj: ApiProviderConfig {
                api_url: env::var("STORJ_API_URL")
                    .unwrap_or_else(|_| "https://api.storj.example".to_string()),
                gateway_url: env::var("STORJ_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://gateway.storjshare.io".to_string()),
                api_key: env::var("STORJ_API_KEY").ok(),
                timeout: Duration::from_secs(parsed_or("STORJ_TIMEOUT_SECS", 15)?),
            },
            lighthouse: ApiProviderConfig {
                api_url: env::var("LIGHTHOUSE_API_URL")
                    .unwrap_or_else(|_| "https://node.lighthouse.storage".to_string()),
                gateway_url: env::var("LIGHTHOUSE_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://gateway.lighthouse.storage".to_string()),
                api_key: env::var("LIGHTHOUSE_API_KEY").ok(),
                timeout: Duration::from_secs(parsed_or("LIGHTHOUSE_TIMEOUT_SECS", 15)?),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct EvmProviderConfig {
    pub rpc_url: String,
    pub explorer_url: String,
    pub market_address: Option<String>,
    pub chain_id: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiProviderConfig {
    pub api_url: String,
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            env: AppEnv::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec![],
            },
            database: DatabaseConfig {
                url: "postgres://localhost/stormesh".to_string(),
                max_connections: 20,
                min_connections: 5,
                connect_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(600),
            },
            processor: ProcessorConfig {
                secret_key: "sk_test_1".to_string(),
                publishable_key: "pk_test_1".to_string(),
                webhook_secret: "whsec_1".to_string(),
                base_url: "https://api.payproc.example".to_string(),
                timeout: Duration::from_secs(10),
                session_ttl: Duration::from_secs(1800),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests: 120,
            },
            workers: WorkerConfig {
                plan_sync_interval: Duration::from_secs(21_600),
                confirmation_sweep_interval: Duration::from_secs(120),
                poll_interval: Duration::from_secs(10),
                poll_max_attempts: 30,
            },
            chains: ChainConfig {
                platform_wallet_key: None,
                allow_mock_submission: false,
                filecoin: EvmProviderConfig {
                    rpc_url: "https://api.node.glif.io/rpc/v1".to_string(),
                    explorer_url: "https://filfox.info/en".to_string(),
                    market_address: None,
                    chain_id: 314,
                    timeout: Duration::from_secs(30),
                },
                storj: ApiProviderConfig {
                    api_url: "https://api.storj.example".to_string(),
                    gateway_url: "https://gateway.storjshare.io".to_string(),
                    api_key: None,
                    timeout: Duration::from_secs(15),
                },
                lighthouse: ApiProviderConfig {
                    api_url: "https://node.lighthouse.storage".to_string(),
                    gateway_url: "https://gateway.lighthouse.storage".to_string(),
                    api_key: None,
                    timeout: Duration::from_secs(15),
                },
            },
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn session_secret_length_is_enforced() {
        let mut config = base_config();
        config.session_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn default_poll_budget_is_five_minutes() {
        let workers = base_config().workers;
        assert_eq!(
            workers.poll_interval.as_secs() * workers.poll_max_attempts as u64,
            300
        );
    }
}
