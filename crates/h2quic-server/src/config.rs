use std::time::Duration;

use h2quic_frame::{FrameConfig, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Grace period between the first completed request and the diagnostic
/// session close.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Server behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Close the session `close_grace` after a request completes.
    ///
    /// Diagnostic aid for single-request demos and tests; not meant for
    /// production servers.
    pub close_after_first_request: bool,
    /// Delay before the diagnostic close.
    #[serde(rename = "close_grace_ms", with = "duration_ms")]
    pub close_grace: Duration,
    /// Maximum HTTP/2 frame payload accepted or written on the header stream.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            close_after_first_request: false,
            close_grace: DEFAULT_CLOSE_GRACE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&self.max_frame_size) {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be within {DEFAULT_MAX_FRAME_SIZE}..={MAX_FRAME_SIZE_LIMIT}, got {}",
                self.max_frame_size
            )));
        }
        Ok(())
    }

    pub fn with_close_after_first_request(mut self, enabled: bool) -> Self {
        self.close_after_first_request = enabled;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
