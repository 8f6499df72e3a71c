//! Configuration for flowcollectd
//!
//! Loads collector settings from a TOML file. Every field has a default, so
//! a partial file (or none at all) yields a usable configuration; command
//! line flags are applied on top by the binary.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-6: Configuration Settings - Validated listener and decoder settings
//! - CM-7: Least Functionality - Only the collection listener is exposed

use crate::error::{CollectorError, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default location of the collector configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flowcollectd/flowcollectd.toml";

/// UDP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bind host; a value containing ':' selects IPv6
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SO_RCVBUF request; the kernel default is kept when unset
    #[serde(default)]
    pub receive_buffer_bytes: Option<usize>,

    /// Largest datagram read in one receive
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

/// Decode loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Age after which a packet waiting for its template is dropped
    #[serde(default = "default_packet_timeout_secs")]
    pub packet_timeout_secs: f64,
}

/// Flow filtering applied by the binary before output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Keep only flows whose source or destination falls in one of these
    /// blocks; empty keeps everything
    #[serde(default)]
    pub cidr_blocks: Vec<IpNet>,
}

/// Rolling gzip batch output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for `<epoch>.gz` batch files; batching is off when unset
    #[serde(default)]
    pub batch_dir: Option<PathBuf>,

    /// Seconds before a batch file is closed and a new one started
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: u64,
}

/// Complete collector configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2055
}

fn default_max_datagram_size() -> usize {
    // Maximum UDP length field; covers IPv6 payloads up to 65_527
    65_535
}

fn default_packet_timeout_secs() -> f64 {
    3600.0
}

fn default_batch_interval_secs() -> u64 {
    300
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            receive_buffer_bytes: None,
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            batch_dir: None,
            batch_interval_secs: default_batch_interval_secs(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            packet_timeout_secs: default_packet_timeout_secs(),
        }
    }
}

impl CollectorConfig {
    /// Defaults with the given bind host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut config = Self::default();
        config.listener.host = host.into();
        config.listener.port = port;
        config
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                CollectorError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(CollectorError::Io(e)),
        }
    }

    /// Set the template-miss packet timeout
    pub fn with_packet_timeout(mut self, timeout: Duration) -> Self {
        self.decoder.packet_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Packet timeout as Duration
    pub fn packet_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.decoder.packet_timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Batch file rotation interval as Duration
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.output.batch_interval_secs)
    }

    /// Validate configuration
    ///
    /// # NIST Controls
    /// - CM-6: Configuration Settings - Reject unusable settings at startup
    pub fn validate(&self) -> Result<()> {
        if self.listener.host.trim().is_empty() {
            return Err(CollectorError::Config("listener host must not be empty".to_string()));
        }

        if self.listener.max_datagram_size == 0 {
            return Err(CollectorError::Config(
                "max_datagram_size must be > 0".to_string(),
            ));
        }

        if self.listener.receive_buffer_bytes == Some(0) {
            return Err(CollectorError::Config(
                "receive_buffer_bytes must be > 0 when set".to_string(),
            ));
        }

        let timeout = self.decoder.packet_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(CollectorError::Config(format!(
                "packet_timeout_secs must be a positive number, got {}",
                timeout
            )));
        }

        if self.output.batch_interval_secs == 0 {
            return Err(CollectorError::Config(
                "batch_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
