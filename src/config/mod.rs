//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod limits;
mod server;
mod storage;

pub use limits::{
    StreamLimits, DEFAULT_CLIENT_BUFFER_SIZE, DEFAULT_EMITTER_BUFFER_SIZE,
    DEFAULT_MAX_TOTAL_CLIENTS, DEFAULT_STREAM_BATCH_SIZE,
};
pub use server::{AuthConfig, LogFormat, ServerConfig, TlsConfig};
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTSDB_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EVENTSDB";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EVENTSDB_LOG";

/// Legacy environment variable for the bearer token.
pub const AUTH_TOKEN_ENV_VAR: &str = "AUTH_TOKEN";
/// Legacy environment variable for the TLS certificate path.
pub const TLS_CERT_FILE_ENV_VAR: &str = "TLS_CERT_FILE";
/// Legacy environment variable for the TLS key path.
pub const TLS_KEY_FILE_ENV_VAR: &str = "TLS_KEY_FILE";
/// Environment variable for database URL (PostgreSQL).
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

use serde::Deserialize;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Engine buffer sizes and subscriber limits.
    pub limits: StreamLimits,
    /// Bearer token authentication.
    pub auth: AuthConfig,
    /// TLS for the gRPC listener.
    pub tls: TlsConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///    (e.g. `EVENTSDB__LIMITS__MAX_TOTAL_CLIENTS=500`)
    /// 5. Legacy variables: `AUTH_TOKEN`, `TLS_CERT_FILE`, `TLS_KEY_FILE`,
    ///    `DATABASE_URL`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.token", std::env::var(AUTH_TOKEN_ENV_VAR).ok())?
            .set_override_option("tls.cert_file", std::env::var(TLS_CERT_FILE_ENV_VAR).ok())?
            .set_override_option("tls.key_file", std::env::var(TLS_KEY_FILE_ENV_VAR).ok())?
            .set_override_option("storage.postgres.uri", std::env::var(DATABASE_URL_ENV_VAR).ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Invalid)?;

        let tls = &self.tls;
        if tls.files().is_none() && (tls.cert_file.is_some() != tls.key_file.is_some()) {
            return Err(ConfigError::Invalid(
                "tls.cert_file and tls.key_file must be set together".to_string(),
            ));
        }
        Ok(())
    }
}
