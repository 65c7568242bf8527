//! Server configuration.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! - Built-in defaults
//! - The first TOML file found among the default paths
//! - Environment variables (`HERALD__PORT`, `HERALD__DISPATCH__SEND_TIMEOUT_MS`, ...)

use anyhow::{Context, Result};
use herald_core::{ChannelConfig, DispatchConfig, HubConfig};
use herald_protocol::Encoding;
use herald_transport::SocketOptions;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "herald.toml",
    "/etc/herald/herald.toml",
    "~/.config/herald/herald.toml",
];

const ENV_PREFIX: &str = "HERALD";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Fan-out configuration.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Channel configuration.
    #[serde(default)]
    pub channels: ChannelSettings,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Services exposed over HTTP.
    #[serde(default = "default_services")]
    pub services: Vec<String>,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Frame encoding on WebSocket connections.
    #[serde(default)]
    pub encoding: Encoding,

    /// Frames buffered per client.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Per-recipient send timeout in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Sends in flight across all dispatches.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel joined by connections that do not name one.
    #[serde(default = "default_channel")]
    pub default_channel: String,

    /// Drop channels when their last member leaves.
    #[serde(default)]
    pub auto_delete_empty: bool,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Idle timeout in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_send_timeout() -> u64 {
    5_000
}

fn default_max_concurrent_sends() -> usize {
    1024
}

fn default_channel() -> String {
    "default".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_heartbeat_timeout() -> u64 {
    60_000 // 60 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_services() -> Vec<String> {
    vec!["messages".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            dispatch: DispatchSettings::default(),
            channels: ChannelSettings::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            services: default_services(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            encoding: Encoding::default(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            default_channel: default_channel(),
            auto_delete_empty: false,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, the first config file found and
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the merged result does
    /// not deserialize.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = Self::find_file() {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("services"),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn find_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            dispatch: DispatchConfig {
                send_timeout: Duration::from_millis(self.dispatch.send_timeout_ms),
                max_concurrent_sends: self.dispatch.max_concurrent_sends,
            },
            channels: ChannelConfig {
                auto_delete_empty_channels: self.channels.auto_delete_empty,
            },
        }
    }

    /// Per-socket settings derived from this configuration.
    #[must_use]
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            encoding: self.transport.encoding,
            outbound_buffer: self.transport.outbound_buffer,
            heartbeat_interval: Duration::from_millis(self.heartbeat.interval_ms),
            idle_timeout: Duration::from_millis(self.heartbeat.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.channels.default_channel, "default");
        assert_eq!(config.services, vec!["messages"]);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            services = ["messages", "todos"]

            [transport]
            encoding = "msgpack"

            [dispatch]
            send_timeout_ms = 250
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport.encoding, Encoding::MessagePack);
        assert_eq!(config.dispatch.send_timeout_ms, 250);
        assert_eq!(config.dispatch.max_concurrent_sends, 1024);
        assert_eq!(config.services, vec!["messages", "todos"]);
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!("herald-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 9100\n[channels]\ndefault_channel = \"lobby\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.channels.default_channel, "lobby");
        assert_eq!(config.host, "127.0.0.1");

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_hub_config_conversion() {
        let mut config = Config::default();
        config.dispatch.send_timeout_ms = 100;
        config.channels.auto_delete_empty = true;

        let hub = config.hub_config();
        assert_eq!(hub.dispatch.send_timeout, Duration::from_millis(100));
        assert!(hub.channels.auto_delete_empty_channels);

        let socket = config.socket_options();
        assert_eq!(socket.idle_timeout, Duration::from_millis(60_000));
    }
}
