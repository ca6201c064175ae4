//! Protocol configuration
//!
//! Values consumed by the core. Loading is up to the embedding application;
//! YAML helpers are provided for the common case.
//!
//! ```yaml
//! codec: binary
//! batch_window_ms: 25
//! max_handlers: 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::codec::CodecKind;
use crate::{ProtocolError, Result};

/// Largest registry a one-byte handler id can address.
pub const HANDLER_ID_SPACE: usize = u8::MAX as usize + 1;

/// Configuration shared by the dispatcher side and the broker side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Codec for envelopes and payloads
    pub codec: CodecKind,

    /// Broker debounce window in milliseconds
    pub batch_window_ms: u64,

    /// Registry capacity
    pub max_handlers: usize,

    /// Requeue attempts before a packet is dropped
    pub max_retries: u32,

    /// Delay before a requeued batch is flushed, in milliseconds
    pub retry_interval_ms: u64,

    /// Buffered messages per in-process channel
    pub channel_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::Json,
            batch_window_ms: 50,
            max_handlers: 32,
            max_retries: 3,
            retry_interval_ms: 1000,
            channel_capacity: 64,
        }
    }
}

impl ProtocolConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ProtocolConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ProtocolError::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.batch_window_ms == 0 {
            return Err(ProtocolError::config("batch_window_ms must be greater than zero"));
        }
        if self.max_handlers == 0 || self.max_handlers > HANDLER_ID_SPACE {
            return Err(ProtocolError::config(format!(
                "max_handlers must be between 1 and {HANDLER_ID_SPACE}, got {}",
                self.max_handlers
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ProtocolError::config("channel_capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Broker debounce window.
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    /// Delay applied to requeued batches.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
