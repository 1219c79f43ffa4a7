//! Types and helpers shared by the coin-collector server and client

pub mod delay;
pub mod math;
pub mod protocol;

pub use math::Vec2;
pub use protocol::{
    CoinId, CoinState, Datagram, IntentMessage, PlayerId, PlayerState, SessionMessage,
    WorldSnapshot,
};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 9000;
pub const DEFAULT_PLAYER_COUNT: usize = 2;
pub const DEFAULT_TICK_RATE: u32 = 30;
pub const DEFAULT_ARTIFICIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_INTERPOLATION_DELAY_MS: u64 = 100;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
/// Units per second
pub const PLAYER_SPEED: f32 = 200.0;
pub const PLAYER_RADIUS: f32 = 16.0;
pub const COIN_RADIUS: f32 = 10.0;
/// A player picks up a coin when their centers are closer than this
pub const PICKUP_RADIUS: f32 = PLAYER_RADIUS + COIN_RADIUS;
pub const COIN_VALUE: u32 = 1;
pub const DEFAULT_COIN_COUNT: usize = 10;

/// Current wall clock in milliseconds since the UNIX epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_advances() {
        let t1 = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = now_millis();
        assert!(t2 > t1);
    }

    #[test]
    fn test_pickup_radius_covers_both_bodies() {
        assert_eq!(PICKUP_RADIUS, 26.0);
    }
}
