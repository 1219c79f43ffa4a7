//! Server runtime configuration

use shared::{
    COIN_VALUE, DEFAULT_ARTIFICIAL_DELAY_MS, DEFAULT_COIN_COUNT, DEFAULT_PLAYER_COUNT,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, DEFAULT_TICK_RATE, PICKUP_RADIUS, PLAYER_SPEED,
    WORLD_HEIGHT, WORLD_WIDTH,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub &'static str);

/// When a running session should end because players left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndPolicy {
    /// `0` keeps the session running until shutdown
    pub min_players: usize,
}

impl EndPolicy {
    pub fn never() -> Self {
        Self { min_players: 0 }
    }

    pub fn should_end(&self, connected: usize) -> bool {
        self.min_players > 0 && connected < self.min_players
    }
}

impl Default for EndPolicy {
    fn default() -> Self {
        Self { min_players: 1 }
    }
}

/// Gameplay tuning for the authoritative simulation
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Units per second at full intent
    pub player_speed: f32,
    pub pickup_radius: f32,
    pub coin_value: u32,
    /// Coins placed at session start
    pub coin_count: usize,
    /// Place an extra coin this often; `None` keeps the initial set only
    pub coin_spawn_interval: Option<Duration>,
    /// Hard cap on coins ever created, bounds the snapshot size
    pub max_coins: usize,
    /// Keep spawned entities this far from the arena edges
    pub spawn_margin: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            player_speed: PLAYER_SPEED,
            pickup_radius: PICKUP_RADIUS,
            coin_value: COIN_VALUE,
            coin_count: DEFAULT_COIN_COUNT,
            coin_spawn_interval: None,
            max_coins: 64,
            spawn_margin: 30.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Reliable (TCP) session port
    pub port: u16,
    /// Unreliable (UDP) state port
    pub udp_port: u16,
    pub player_count: usize,
    pub tick_rate: u32,
    /// Artificial delay applied to received intents
    pub inbound_delay: Duration,
    /// Artificial delay applied to outgoing snapshots
    pub outbound_delay: Duration,
    /// Broadcast every Nth snapshot
    pub broadcast_every: u32,
    pub end_policy: EndPolicy,
    pub handshake_timeout: Duration,
    pub seed: Option<u64>,
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            udp_port: DEFAULT_SERVER_PORT + 1,
            player_count: DEFAULT_PLAYER_COUNT,
            tick_rate: DEFAULT_TICK_RATE,
            inbound_delay: Duration::from_millis(DEFAULT_ARTIFICIAL_DELAY_MS),
            outbound_delay: Duration::from_millis(DEFAULT_ARTIFICIAL_DELAY_MS),
            broadcast_every: 1,
            end_policy: EndPolicy::default(),
            handshake_timeout: Duration::from_secs(5),
            seed: None,
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }

    /// Fixed simulation step
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.player_count == 0 {
            return Err(ConfigError("player count must be at least 1"));
        }
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError("tick rate must be within 1..=1000"));
        }
        if self.broadcast_every == 0 {
            return Err(ConfigError("broadcast_every must be at least 1"));
        }
        if self.port != 0 && self.port == self.udp_port {
            return Err(ConfigError("reliable and unreliable ports must differ"));
        }
        let world = &self.world;
        if !(world.width > 0.0 && world.height > 0.0)
            || !(world.width.is_finite() && world.height.is_finite())
        {
            return Err(ConfigError("arena bounds must be positive and finite"));
        }
        if !(world.player_speed >= 0.0 && world.player_speed.is_finite()) {
            return Err(ConfigError("player speed must be finite and non-negative"));
        }
        if !(world.pickup_radius > 0.0 && world.pickup_radius.is_finite()) {
            return Err(ConfigError("pickup radius must be positive"));
        }
        if world.coin_count > world.max_coins {
            return Err(ConfigError("coin count exceeds max_coins"));
        }
        if matches!(world.coin_spawn_interval, Some(interval) if interval.is_zero()) {
            return Err(ConfigError("coin spawn interval must be non-zero"));
        }
        Ok(())
    }
}
