//! Client runtime configuration

use shared::{
    DEFAULT_ARTIFICIAL_DELAY_MS, DEFAULT_INTERPOLATION_DELAY_MS, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub &'static str);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_host: String,
    /// Reliable (TCP) session port; the state port comes from the server's welcome
    pub server_port: u16,
    /// Artificial delay applied to every received snapshot
    pub inbound_delay: Duration,
    /// Artificial delay applied to every sent intent
    pub outbound_delay: Duration,
    /// How far behind the server clock the renderer samples
    pub interpolation_delay: Duration,
    /// Snapshots older than this, relative to the newest, are evicted
    pub retention: Duration,
    pub buffer_capacity: usize,
    /// Frames per second; one intent is sent and one view rendered per frame
    pub frame_rate: u32,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            inbound_delay: Duration::from_millis(DEFAULT_ARTIFICIAL_DELAY_MS),
            outbound_delay: Duration::from_millis(DEFAULT_ARTIFICIAL_DELAY_MS),
            interpolation_delay: Duration::from_millis(DEFAULT_INTERPOLATION_DELAY_MS),
            retention: Duration::from_millis(1000),
            buffer_capacity: 200,
            frame_rate: 60,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn session_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 || self.frame_rate > 1000 {
            return Err(ConfigError("frame rate must be within 1..=1000"));
        }
        if self.retention < self.interpolation_delay {
            return Err(ConfigError(
                "retention must cover at least the interpolation delay",
            ));
        }
        if self.buffer_capacity < 2 {
            return Err(ConfigError("buffer must hold at least two snapshots"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.session_addr(), "127.0.0.1:9000");
        assert_eq!(config.interpolation_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_retention_must_cover_interpolation_delay() {
        let config = ClientConfig {
            retention: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_buffer_and_zero_frame_rate() {
        let tiny = ClientConfig {
            buffer_capacity: 1,
            ..ClientConfig::default()
        };
        assert!(tiny.validate().is_err());

        let frozen = ClientConfig {
            frame_rate: 0,
            ..ClientConfig::default()
        };
        assert!(frozen.validate().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let config = ClientConfig {
            frame_rate: 50,
            ..ClientConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }
}
