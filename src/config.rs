//! Configuration management for the RAX TAK Server
//!
//! Values come from built-in defaults, an optional `config.toml`, and
//! `RAX_TAK_*` environment overrides, in that order of precedence.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8089;
const DEFAULT_MAX_CLIENTS: usize = 100;
const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 30;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CERT_PATH: &str = "certs/rax_tak-server.crt";
const DEFAULT_KEY_PATH: &str = "certs/rax_tak-server.key";

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    // ═══ NETWORK (Environment Override Supported) ═══
    /// Interface to listen on; all interfaces by default
    pub bind_address: String,

    /// CoT streaming port
    /// Environment: RAX_TAK_PORT
    pub port: u16,

    /// Maximum concurrent clients in the registry
    /// Environment: RAX_TAK_MAX_CLIENTS
    pub max_clients: usize,

    // ═══ CONNECTION BEHAVIOR ═══
    /// Bytes requested per socket read
    pub read_buffer_size: usize,

    /// Upper bound on a single unterminated message
    pub max_frame_bytes: usize,

    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub watchdog_interval_secs: u64,
    pub handshake_timeout_secs: u64,

    pub tls: TlsConfig,
}

/// TLS material produced by the certificate tooling
#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,

    /// CA used to verify client certificates; mutual TLS when present
    #[serde(default)]
    pub client_ca_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            tls: TlsConfig::default(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            client_ca_path: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        // Try production path first, then development path
        let config_paths = [
            "rax-tak-server/config", // Docker production: /app/rax-tak-server/config.toml
            "config",                // Local development: ./config.toml
        ];

        let mut builder = Self::defaults()?;
        for config_path in config_paths {
            builder = builder.add_source(File::with_name(config_path).required(false));
        }

        Self::finish(builder.add_source(Self::environment()))
    }

    /// Load one explicit file over the built-in defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from(path));
        Self::finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_address", DEFAULT_BIND_ADDRESS)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("max_clients", DEFAULT_MAX_CLIENTS as i64)?
            .set_default("read_buffer_size", DEFAULT_READ_BUFFER_SIZE as i64)?
            .set_default("max_frame_bytes", DEFAULT_MAX_FRAME_BYTES as i64)?
            .set_default("write_timeout_secs", DEFAULT_WRITE_TIMEOUT_SECS as i64)?
            .set_default("idle_timeout_secs", DEFAULT_IDLE_TIMEOUT_SECS as i64)?
            .set_default("watchdog_interval_secs", DEFAULT_WATCHDOG_INTERVAL_SECS as i64)?
            .set_default("handshake_timeout_secs", DEFAULT_HANDSHAKE_TIMEOUT_SECS as i64)?
            .set_default("tls.enabled", true)?
            .set_default("tls.cert_path", DEFAULT_CERT_PATH)?
            .set_default("tls.key_path", DEFAULT_KEY_PATH)
    }

    fn environment() -> Environment {
        Environment::with_prefix("RAX_TAK")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Message(
                "port must be between 1 and 65535".into(),
            ));
        }

        if self.bind_address.is_empty() {
            return Err(ConfigError::Message("bind_address cannot be empty".into()));
        }

        if self.max_clients == 0 {
            return Err(ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.read_buffer_size == 0 {
            return Err(ConfigError::Message(
                "read_buffer_size must be greater than 0".into(),
            ));
        }

        if self.max_frame_bytes < self.read_buffer_size {
            return Err(ConfigError::Message(
                "max_frame_bytes must be at least read_buffer_size".into(),
            ));
        }

        let timers = [
            ("write_timeout_secs", self.write_timeout_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("watchdog_interval_secs", self.watchdog_interval_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.tls.enabled
            && (self.tls.cert_path.as_os_str().is_empty()
                || self.tls.key_path.as_os_str().is_empty())
        {
            return Err(ConfigError::Message(
                "tls.cert_path and tls.key_path are required when TLS is enabled".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and port as a socket string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
