//! Flasher configuration
//!
//! Loaded from a TOML file. Every section except `[provider]` has defaults:
//!
//! ```toml
//! interface = "eth0"
//!
//! [transport]
//! type = "udp"
//! port = 5000
//!
//! [provider]
//! type = "simple"
//! firmware = "routeros-arm.npk"
//! config = "autorun.rsc"
//! ```

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use netflash_core::{FatalError, MacAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::MAX_PAYLOAD;
use crate::runner::RunnerOptions;
use crate::transfer::TransferOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file {path} not found: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for FatalError {
    fn from(err: ConfigError) -> Self {
        FatalError::Config(err.to_string())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetflashConfig {
    /// Network interface boards are attached to
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    pub provider: ProviderConfig,
}

fn default_interface() -> String {
    "eth0".to_string()
}

impl NetflashConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("interface must not be empty".into()));
        }
        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_PAYLOAD {
            return Err(ConfigError::Invalid(format!(
                "transfer.chunk_size must be between 1 and {}",
                MAX_PAYLOAD
            )));
        }
        if let TransportConfig::Udp(udp) = &self.transport {
            if udp.response_timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "transport.response_timeout_ms must be positive".into(),
                ));
            }
            if udp.drain_timeout_ms == Some(0) {
                return Err(ConfigError::Invalid(
                    "transport.drain_timeout_ms must be positive".into(),
                ));
            }
        }
        if self.provider.kind.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.type must not be empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Broadcast UDP on a physical interface
    Udp(UdpConfig),
    /// In-memory board for dry runs
    Simulated(SimulatedConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Udp(UdpConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_broadcast")]
    pub broadcast: Ipv4Addr,
    /// How long to wait for a step response
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// How long a flow-control read waits during transfers; defaults to
    /// `response_timeout_ms` so a slow board is never overrun
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
    /// Local hardware address; read from the interface when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_mac: Option<MacAddress>,
}

fn default_port() -> u16 {
    5000
}

fn default_broadcast() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_response_timeout() -> u64 {
    10_000
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast: default_broadcast(),
            response_timeout_ms: default_response_timeout(),
            drain_timeout_ms: None,
            local_mac: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Boards announced one after another
    #[serde(default = "default_sim_boards")]
    pub boards: Vec<SimulatedBoardConfig>,
    /// Delay before each response
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBoardConfig {
    pub mac: MacAddress,
    pub model: String,
    pub arch: String,
}

fn default_sim_boards() -> Vec<SimulatedBoardConfig> {
    vec![SimulatedBoardConfig {
        mac: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
        model: "RB750Gr3".to_string(),
        arch: "mmips".to_string(),
    }]
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            boards: default_sim_boards(),
            latency_ms: 0,
        }
    }
}

// =============================================================================
// Transfer and runner timing
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,
}

fn default_chunk_size() -> usize {
    1024
}

fn default_chunk_delay() -> u64 {
    5
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay(),
        }
    }
}

impl TransferConfig {
    pub fn options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_cooldown_delay")]
    pub cooldown_delay_ms: u64,
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
}

fn default_settle_delay() -> u64 {
    7_000
}

fn default_cooldown_delay() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            cooldown_delay_ms: default_cooldown_delay(),
            skip_duplicates: true,
        }
    }
}

impl RunnerConfig {
    pub fn options(&self) -> RunnerOptions {
        RunnerOptions {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            cooldown_delay: Duration::from_millis(self.cooldown_delay_ms),
            skip_duplicates: self.skip_duplicates,
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// File provider selection; remaining keys are the provider's own options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry key
    #[serde(rename = "type", default = "default_provider")]
    pub kind: String,
    #[serde(flatten)]
    pub options: toml::Table,
}

fn default_provider() -> String {
    "simple".to_string()
}

impl ProviderConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: toml::Table::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = NetflashConfig::from_toml_str(
            r#"
            [provider]
            firmware = "routeros-arm.npk"
            "#,
        )
        .unwrap();

        assert_eq!(config.interface, "eth0");
        assert_eq!(config.provider.kind, "simple");
        assert_eq!(
            config.provider.options.get("firmware").and_then(|v| v.as_str()),
            Some("routeros-arm.npk")
        );

        let TransportConfig::Udp(udp) = &config.transport else {
            panic!("expected udp transport");
        };
        assert_eq!(udp.port, 5000);
        assert_eq!(udp.broadcast, Ipv4Addr::BROADCAST);
        assert_eq!(udp.response_timeout_ms, 10_000);
        assert_eq!(udp.drain_timeout_ms, None);

        let transfer = config.transfer.options();
        assert_eq!(transfer.chunk_size, 1024);
        assert_eq!(transfer.chunk_delay, Duration::from_millis(5));

        let runner = config.runner.options();
        assert_eq!(runner.settle_delay, Duration::from_secs(7));
        assert_eq!(runner.cooldown_delay, Duration::from_secs(10));
        assert!(runner.skip_duplicates);
    }

    #[test]
    fn test_full_config() {
        let config = NetflashConfig::from_toml_str(
            r#"
            interface = "enp3s0"

            [transport]
            type = "udp"
            port = 5001
            broadcast = "192.168.88.255"
            local_mac = "00:11:22:33:44:55"

            [transfer]
            chunk_size = 512
            chunk_delay_ms = 10

            [runner]
            settle_delay_ms = 1000
            skip_duplicates = false

            [provider]
            type = "arch"
            config = "https://files.example.com/autorun.rsc"

            [provider.firmware]
            arm = "routeros-arm.npk"
            mmips = "routeros-mmips.npk"
            "#,
        )
        .unwrap();

        assert_eq!(config.interface, "enp3s0");
        let TransportConfig::Udp(udp) = &config.transport else {
            panic!("expected udp transport");
        };
        assert_eq!(udp.port, 5001);
        assert_eq!(udp.broadcast, Ipv4Addr::new(192, 168, 88, 255));
        assert_eq!(
            udp.local_mac,
            Some(MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]))
        );
        assert_eq!(config.transfer.chunk_size, 512);
        assert_eq!(config.runner.cooldown_delay_ms, 10_000);
        assert!(!config.runner.skip_duplicates);
        assert_eq!(config.provider.kind, "arch");
        assert!(config.provider.options["firmware"].is_table());
    }

    #[test]
    fn test_simulated_transport() {
        let config = NetflashConfig::from_toml_str(
            r#"
            [transport]
            type = "simulated"

            [[transport.boards]]
            mac = "02:00:00:00:00:07"
            model = "hAP ac2"
            arch = "arm"

            [provider]
            firmware = "routeros-arm.npk"
            "#,
        )
        .unwrap();

        let TransportConfig::Simulated(sim) = &config.transport else {
            panic!("expected simulated transport");
        };
        assert_eq!(sim.boards.len(), 1);
        assert_eq!(sim.boards[0].arch, "arm");
    }

    #[test]
    fn test_missing_provider_section() {
        let err = NetflashConfig::from_toml_str("interface = \"eth0\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values() {
        let err = NetflashConfig::from_toml_str(
            r#"
            [transfer]
            chunk_size = 0

            [provider]
            firmware = "fw.npk"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = NetflashConfig::from_toml_str(
            r#"
            [transport]
            type = "serial"

            [provider]
            firmware = "fw.npk"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_chunk_size_fits_one_datagram() {
        let with_chunk = |size: usize| {
            NetflashConfig::from_toml_str(&format!(
                r#"
                [transfer]
                chunk_size = {}

                [provider]
                firmware = "fw.npk"
                "#,
                size
            ))
        };

        let config = with_chunk(MAX_PAYLOAD).unwrap();
        assert_eq!(config.transfer.chunk_size, 65_487);

        let err = with_chunk(MAX_PAYLOAD + 1).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("65487")));
    }

    #[test]
    fn test_zero_drain_timeout_is_invalid() {
        let err = NetflashConfig::from_toml_str(
            r#"
            [transport]
            type = "udp"
            drain_timeout_ms = 0

            [provider]
            firmware = "fw.npk"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let err = NetflashConfig::load("/nonexistent/netflash.toml").unwrap_err();
        let fatal: FatalError = err.into();
        assert!(matches!(fatal, FatalError::Config(_)));
    }
}
