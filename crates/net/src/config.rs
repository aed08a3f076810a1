//! Protocol configuration loaded from TOML.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Smallest usable datagram limit: a header plus its boundary.
const MIN_DATAGRAM_LEN: usize = 32;

/// How header and body are separated inside a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Header, 4-byte boundary token, body.
    #[default]
    Boundary,
    /// `u32` little-endian header length, header, body.
    LengthPrefixed,
}

/// Settings shared by both ends of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Datagram framing; must match the peer.
    pub framing: FramingMode,
    /// Datagrams longer than this are refused on send and receive.
    pub max_datagram_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            framing: FramingMode::Boundary,
            max_datagram_len: MAX_UDP_PAYLOAD,
        }
    }
}

impl ProtocolConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ProtocolConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from `path`, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed to load {}: {err}. Using defaults", path.display());
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_datagram_len < MIN_DATAGRAM_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_datagram_len must be at least {MIN_DATAGRAM_LEN}, got {}",
                self.max_datagram_len
            )));
        }
        if self.framing == FramingMode::LengthPrefixed
            && self.max_datagram_len > u32::MAX as usize
        {
            return Err(ConfigError::Invalid(
                "max_datagram_len does not fit a u32 length prefix".into(),
            ));
        }
        Ok(())
    }
}
