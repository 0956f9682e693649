//! Runtime configuration
//!
//! Loaded from a TOML file; every section has defaults so a missing or
//! partial file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, Result};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub level: String,

    /// Output format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Whether events should be written as JSON lines
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Transcoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Size of the output I/O buffer; the write callback receives chunks of
    /// at most this many bytes
    pub io_buffer_size: usize,

    /// Encoder bit rate in bps; `None` leaves the codec default
    pub bit_rate: Option<usize>,

    /// Output format used when a request does not name one
    pub default_target_codec: String,

    /// Number of chunks buffered between the transcoder thread and an async
    /// consumer
    pub channel_capacity: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: 4096,
            bit_rate: None,
            default_target_codec: "flac".to_string(),
            channel_capacity: 16,
        }
    }
}

impl TranscodeConfig {
    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.io_buffer_size == 0 || self.io_buffer_size > i32::MAX as usize {
            return Err(MediaError::Config(format!(
                "io_buffer_size must be between 1 and {}",
                i32::MAX
            )));
        }
        if self.channel_capacity == 0 {
            return Err(MediaError::Config("channel_capacity must be > 0".into()));
        }
        if self.default_target_codec.is_empty() {
            return Err(MediaError::Config(
                "default_target_codec must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Transcoding configuration
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| MediaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| MediaError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        self.transcode.validate()
    }
}
