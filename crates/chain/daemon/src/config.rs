//! Configuration for chain-daemon

use crate::catalog::CatalogConfig;
use crate::dispatch::RecoveryMode;
use crate::error::{DaemonError, DaemonResult};
use chain_engine::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainDaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Work queue, worker pool and recovery
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Action timeouts
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Triggers and actions declared by business modules
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,
        #[serde(default = "default_pool_size")]
        max_connections: u32,
        #[serde(default = "default_connect_timeout_secs")]
        connect_timeout_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Work queue and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of long-lived workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue capacity; a full queue leaves executions pending
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval of the sweep that re-enqueues stranded unfinished executions
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// What startup recovery does with executions a previous process left running
    #[serde(default)]
    pub recovery: RecoveryMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            recovery: RecoveryMode::default(),
        }
    }
}

impl DispatchConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Per-invocation timeouts applied by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Upper bound on a single step action invocation
    #[serde(default = "default_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Upper bound on a single compensation invocation
    #[serde(default = "default_timeout_secs")]
    pub compensation_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_timeout_secs(),
            compensation_timeout_secs: default_timeout_secs(),
        }
    }
}

impl OrchestratorSettings {
    pub fn to_engine_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            compensation_timeout: Duration::from_secs(self.compensation_timeout_secs),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ChainDaemonConfig {
    /// Load configuration from file and environment
    ///
    /// Nested keys use a double underscore in the environment, e.g.
    /// `CHAIN_DISPATCH__WORKERS=8`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ChainDaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CHAIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    ///
    /// Zero intervals and timeouts are refused rather than clamped: a zero
    /// sweep interval cannot drive a timer and a zero timeout fails every
    /// invocation.
    pub fn validate(&self) -> DaemonResult<()> {
        let checks = [
            ("dispatch.workers", self.dispatch.workers as u64),
            ("dispatch.queue_capacity", self.dispatch.queue_capacity as u64),
            ("dispatch.sweep_interval_secs", self.dispatch.sweep_interval_secs),
            ("orchestrator.step_timeout_secs", self.orchestrator.step_timeout_secs),
            (
                "orchestrator.compensation_timeout_secs",
                self.orchestrator.compensation_timeout_secs,
            ),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(DaemonError::Config(format!("{} must be greater than zero", key)));
            }
        }
        Ok(())
    }

    /// Configuration for local development: one worker, short sweep
    pub fn development() -> Self {
        Self {
            dispatch: DispatchConfig {
                workers: 1,
                sweep_interval_secs: 5,
                ..DispatchConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            ..Self::default()
        }
    }
}
