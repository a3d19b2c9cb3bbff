// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

/// Central configuration for the auth service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub web_server_addr: String,
    pub log_level: String,

    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub proofs: ProofConfig,
    pub oracle: OracleConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// Number of sync workers serving store messages
    pub workers: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_days: i64,
    pub secure_cookie: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Reserved users that never bound a wallet are purged after this long
    pub pending_user_ttl_minutes: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofConfig {
    pub ttl_minutes: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub paths: Vec<String>,
    /// Key clients on `Forwarded`/`X-Forwarded-For`. Only safe behind a
    /// proxy that overwrites those headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_server_addr: "127.0.0.1:8081".to_string(),
            log_level: "info".to_string(),

            database: DatabaseConfig {
                path: "./data/launchpad.db".to_string(),
                workers: 2,
            },
            session: SessionConfig {
                cookie_name: "launchpad_session".to_string(),
                ttl_days: 30,
                secure_cookie: true,
            },
            auth: AuthConfig {
                pending_user_ttl_minutes: 60,
            },
            proofs: ProofConfig {
                ttl_minutes: 30,
            },
            oracle: OracleConfig {
                base_url: "http://127.0.0.1:8000/api/".to_string(),
                timeout_secs: 10,
            },
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window_seconds: 60,
                paths: vec![
                    "/api/auth/nonce".to_string(),
                    "/api/proofs/ergopay/".to_string(),
                ],
                trust_forwarded_headers: false,
            },
        }
    }
}

impl SessionConfig {
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_days * 24 * 60 * 60
    }
}

impl AuthConfig {
    pub fn pending_user_ttl_seconds(&self) -> i64 {
        self.pending_user_ttl_minutes * 60
    }
}

impl ProofConfig {
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_minutes * 60
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let defaults = Self::default();

        let config = ConfigFile::builder()
            // Built-in defaults so partial files still deserialize
            .set_default("web_server_addr", defaults.web_server_addr)?
            .set_default("log_level", defaults.log_level)?
            .set_default("database.path", defaults.database.path)?
            .set_default("database.workers", defaults.database.workers as i64)?
            .set_default("session.cookie_name", defaults.session.cookie_name)?
            .set_default("session.ttl_days", defaults.session.ttl_days)?
            .set_default("session.secure_cookie", defaults.session.secure_cookie)?
            .set_default("auth.pending_user_ttl_minutes", defaults.auth.pending_user_ttl_minutes)?
            .set_default("proofs.ttl_minutes", defaults.proofs.ttl_minutes)?
            .set_default("oracle.base_url", defaults.oracle.base_url)?
            .set_default("oracle.timeout_secs", defaults.oracle.timeout_secs as i64)?
            .set_default("rate_limit.max_requests", defaults.rate_limit.max_requests as i64)?
            .set_default("rate_limit.window_seconds", defaults.rate_limit.window_seconds as i64)?
            .set_default("rate_limit.paths", defaults.rate_limit.paths)?
            .set_default("rate_limit.trust_forwarded_headers", defaults.rate_limit.trust_forwarded_headers)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add environment specific config
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            // Add a local config file for local overrides
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment variables with prefix "APP"
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let mut config = Self::default();

                if let Ok(addr) = env::var("WEB_SERVER_ADDR") {
                    config.web_server_addr = addr;
                }
                if let Ok(level) = env::var("LOG_LEVEL") {
                    config.log_level = level;
                }
                if let Ok(path) = env::var("DATABASE_PATH") {
                    config.database.path = path;
                }
                if let Some(ttl) = env_parse::<i64>("SESSION_TTL_DAYS") {
                    config.session.ttl_days = ttl;
                }
                config.session.secure_cookie = env::var("SECURE_COOKIE")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(true);
                if let Some(ttl) = env_parse::<i64>("PROOF_TTL_MINUTES") {
                    config.proofs.ttl_minutes = ttl;
                }
                if let Ok(url) = env::var("ORACLE_BASE_URL") {
                    config.oracle.base_url = url;
                }
                if let Some(max) = env_parse::<usize>("RATE_LIMIT_MAX_REQUESTS") {
                    config.rate_limit.max_requests = max;
                }
                config.rate_limit.trust_forwarded_headers = env::var("TRUST_FORWARDED_HEADERS")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);

                config
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
