//! Simulation: players, coins and the fixed-step tick that moves them

use crate::config::WorldConfig;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{CoinId, CoinState, PlayerId, PlayerState, Vec2, WorldSnapshot};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub position: Vec2,
    pub score: u32,
}

impl Player {
    pub fn new(id: PlayerId, position: Vec2) -> Self {
        Self {
            id,
            position,
            score: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    pub id: CoinId,
    pub position: Vec2,
    active: bool,
}

impl Coin {
    pub fn new(id: CoinId, position: Vec2) -> Self {
        Self {
            id,
            position,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Marks the coin collected; false if it already was
    fn collect(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }
}

/// The authoritative world: sole owner and writer of player and coin state
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    tick: u64,
    /// Keyed by id so every pass runs in ascending id order
    players: BTreeMap<PlayerId, Player>,
    coins: Vec<Coin>,
    next_coin_id: CoinId,
    since_last_spawn: Duration,
    rng: StdRng,
}

impl World {
    /// Creates a world with randomly placed players and coins
    pub fn new(
        config: WorldConfig,
        player_ids: impl IntoIterator<Item = PlayerId>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut world = Self::with_layout(config, Vec::new(), Vec::new());
        world.rng = rng;

        for id in player_ids {
            let position = world.random_position();
            info!("Added player {} at ({:.1}, {:.1})", id, position.x, position.y);
            world.players.insert(id, Player::new(id, position));
        }
        for _ in 0..world.config.coin_count {
            world.spawn_coin();
        }

        world
    }

    /// Creates a world with an explicit layout
    pub fn with_layout(config: WorldConfig, players: Vec<Player>, coins: Vec<Coin>) -> Self {
        let next_coin_id = coins.iter().map(|c| c.id + 1).max().unwrap_or(1);
        Self {
            config,
            tick: 0,
            players: players.into_iter().map(|p| (p.id, p)).collect(),
            coins,
            next_coin_id,
            since_last_spawn: Duration::ZERO,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    /// Drops a player from simulation and from every later snapshot
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let removed = self.players.remove(&id).is_some();
        if removed {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Advances the simulation by one fixed step and returns the resulting snapshot
    ///
    /// `intent_of` yields the most recent direction retained for a player.
    pub fn step<F>(&mut self, intent_of: F, dt: f32, server_time: u64) -> WorldSnapshot
    where
        F: Fn(PlayerId) -> Vec2,
    {
        self.tick += 1;

        self.integrate_positions(&intent_of, dt);
        self.collect_coins();
        self.maybe_spawn_coin(dt);

        self.snapshot(server_time)
    }

    fn integrate_positions<F>(&mut self, intent_of: &F, dt: f32)
    where
        F: Fn(PlayerId) -> Vec2,
    {
        let max = Vec2::new(self.config.width, self.config.height);
        let speed = self.config.player_speed;

        for player in self.players.values_mut() {
            let direction = intent_of(player.id).clamp_unit();
            player.position = (player.position + direction * (speed * dt)).clamp(Vec2::ZERO, max);
        }
    }

    fn collect_coins(&mut self) {
        let radius = self.config.pickup_radius;
        let value = self.config.coin_value;

        for coin in self.coins.iter_mut().filter(|c| c.active) {
            // Lowest id wins a simultaneous pickup.
            let winner = self
                .players
                .values_mut()
                .find(|p| p.position.distance(&coin.position) < radius);

            if let Some(player) = winner {
                if coin.collect() {
                    player.score += value;
                    debug!(
                        "Tick {}: player {} collected coin {} (score {})",
                        self.tick, player.id, coin.id, player.score
                    );
                }
            }
        }
    }

    fn maybe_spawn_coin(&mut self, dt: f32) {
        let Some(interval) = self.config.coin_spawn_interval else {
            return;
        };
        self.since_last_spawn += Duration::from_secs_f32(dt.max(0.0));
        if self.since_last_spawn >= interval {
            self.since_last_spawn = Duration::ZERO;
            self.spawn_coin();
        }
    }

    fn spawn_coin(&mut self) -> Option<CoinId> {
        if self.coins.len() >= self.config.max_coins {
            return None;
        }
        let id = self.next_coin_id;
        self.next_coin_id += 1;
        let position = self.random_position();
        self.coins.push(Coin::new(id, position));
        Some(id)
    }

    fn random_position(&mut self) -> Vec2 {
        let margin = self.config.spawn_margin;
        let x = Self::random_in(&mut self.rng, margin, self.config.width - margin, self.config.width);
        let y = Self::random_in(&mut self.rng, margin, self.config.height - margin, self.config.height);
        Vec2::new(x, y)
    }

    fn random_in(rng: &mut StdRng, low: f32, high: f32, extent: f32) -> f32 {
        if low < high {
            rng.gen_range(low..high)
        } else {
            // Arena narrower than twice the margin.
            extent / 2.0
        }
    }

    /// Read-only view of the current state
    pub fn snapshot(&self, server_time: u64) -> WorldSnapshot {
        WorldSnapshot {
            sequence_number: self.tick,
            server_time,
            players: self
                .players
                .values()
                .map(|p| PlayerState {
                    id: p.id,
                    x: p.position.x,
                    y: p.position.y,
                    score: p.score,
                })
                .collect(),
            coins: self
                .coins
                .iter()
                .map(|c| CoinState {
                    id: c.id,
                    x: c.position.x,
                    y: c.position.y,
                    active: c.active,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashMap;

    fn test_config() -> WorldConfig {
        WorldConfig {
            width: 100.0,
            height: 100.0,
            player_speed: 5.0,
            pickup_radius: 2.0,
            coin_value: 1,
            coin_count: 0,
            coin_spawn_interval: None,
            max_coins: 16,
            spawn_margin: 10.0,
        }
    }

    fn idle(_: PlayerId) -> Vec2 {
        Vec2::ZERO
    }

    #[test]
    fn test_intent_moves_player_one_step() {
        let mut world = World::with_layout(
            test_config(),
            vec![Player::new(0, Vec2::ZERO)],
            Vec::new(),
        );

        let snapshot = world.step(|_| Vec2::new(1.0, 0.0), 1.0 / 30.0, 0);

        let player = snapshot.player(0).unwrap();
        assert_approx_eq!(player.x, 5.0 / 30.0, 1e-6);
        assert_approx_eq!(player.y, 0.0, 1e-6);
    }

    #[test]
    fn test_position_is_clamped_to_arena() {
        let mut world = World::with_layout(
            test_config(),
            vec![Player::new(0, Vec2::ZERO), Player::new(1, Vec2::new(99.0, 99.0))],
            Vec::new(),
        );

        let intents: HashMap<PlayerId, Vec2> =
            [(0, Vec2::new(-1.0, -1.0)), (1, Vec2::new(1.0, 1.0))].into();
        for _ in 0..100 {
            world.step(|id| intents[&id], 0.1, 0);
        }

        assert_eq!(world.player(0).unwrap().position, Vec2::ZERO);
        assert_eq!(world.player(1).unwrap().position, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_oversized_intent_is_treated_as_unit() {
        let mut world = World::with_layout(
            test_config(),
            vec![Player::new(0, Vec2::new(50.0, 50.0))],
            Vec::new(),
        );

        world.step(|_| Vec2::new(30.0, 40.0), 1.0, 0);

        let position = world.player(0).unwrap().position;
        assert_approx_eq!(position.x, 53.0, 1e-4);
        assert_approx_eq!(position.y, 54.0, 1e-4);
    }

    #[test]
    fn test_coin_collected_once() {
        let mut world = World::with_layout(
            test_config(),
            vec![Player::new(0, Vec2::new(10.0, 10.0))],
            vec![Coin::new(1, Vec2::new(11.0, 10.0))],
        );

        for _ in 0..5 {
            world.step(idle, 1.0 / 30.0, 0);
        }

        assert!(!world.coins()[0].is_active());
        assert_eq!(world.player(0).unwrap().score, 1);
    }

    #[test]
    fn test_simultaneous_pickup_goes_to_lowest_id() {
        let mut world = World::with_layout(
            test_config(),
            vec![
                Player::new(2, Vec2::new(10.0, 10.0)),
                Player::new(1, Vec2::new(10.5, 10.0)),
            ],
            vec![Coin::new(1, Vec2::new(10.2, 10.0))],
        );

        let snapshot = world.step(idle, 1.0 / 30.0, 0);

        assert_eq!(snapshot.player(1).unwrap().score, 1);
        assert_eq!(snapshot.player(2).unwrap().score, 0);
        assert!(!snapshot.coins[0].active);
    }

    #[test]
    fn test_coin_outside_pickup_radius_stays() {
        let mut world = World::with_layout(
            test_config(),
            vec![Player::new(0, Vec2::new(10.0, 10.0))],
            vec![Coin::new(1, Vec2::new(12.0, 10.0))],
        );

        let snapshot = world.step(idle, 1.0 / 30.0, 0);
        assert!(snapshot.coins[0].active);
        assert_eq!(snapshot.player(0).unwrap().score, 0);
    }

    #[test]
    fn test_sequence_numbers_follow_ticks() {
        let mut world = World::with_layout(test_config(), Vec::new(), Vec::new());
        assert_eq!(world.snapshot(0).sequence_number, 0);

        let sequences: Vec<u64> = (0..5)
            .map(|i| world.step(idle, 0.1, 1000 + i).sequence_number)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        assert_eq!(world.tick(), 5);
    }

    #[test]
    fn test_snapshot_players_ordered_by_id() {
        let world = World::new(test_config(), [3, 0, 2], Some(7));
        let ids: Vec<PlayerId> = world.snapshot(0).players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn test_removed_player_leaves_snapshots() {
        let mut world = World::new(test_config(), [0, 1], Some(1));
        assert!(world.remove_player(1));
        assert!(!world.remove_player(1));

        let snapshot = world.step(idle, 0.1, 0);
        assert!(snapshot.player(1).is_none());
        assert!(snapshot.player(0).is_some());
    }

    #[test]
    fn test_random_layout_respects_margin_and_seed() {
        let config = WorldConfig {
            coin_count: 10,
            ..test_config()
        };
        let a = World::new(config.clone(), [0, 1], Some(42));
        let b = World::new(config, [0, 1], Some(42));

        assert_eq!(a.snapshot(0), b.snapshot(0));
        assert_eq!(a.coins().len(), 10);
        for coin in a.coins() {
            assert!(coin.is_active());
            assert!(coin.position.x >= 10.0 && coin.position.x <= 90.0);
            assert!(coin.position.y >= 10.0 && coin.position.y <= 90.0);
        }
    }

    #[test]
    fn test_coin_respawn_respects_cap() {
        let config = WorldConfig {
            coin_count: 1,
            max_coins: 3,
            coin_spawn_interval: Some(Duration::from_millis(100)),
            ..test_config()
        };
        let mut world = World::new(config, std::iter::empty::<PlayerId>(), Some(3));

        for _ in 0..50 {
            world.step(idle, 0.05, 0);
        }

        assert_eq!(world.coins().len(), 3);
        let ids: Vec<CoinId> = world.coins().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_scores_and_coins_are_monotonic() {
        let config = WorldConfig {
            width: 60.0,
            height: 60.0,
            pickup_radius: 8.0,
            player_speed: 40.0,
            coin_count: 12,
            spawn_margin: 5.0,
            ..test_config()
        };
        let mut world = World::new(config, [0, 1, 2], Some(99));
        let mut rng = StdRng::seed_from_u64(5);

        let mut previous = world.snapshot(0);
        let mut collected_total = 0;
        for tick in 1..=600 {
            let directions: Vec<Vec2> = (0..3)
                .map(|_| Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                .collect();
            let snapshot = world.step(|id| directions[id as usize], 1.0 / 30.0, tick);

            assert!(snapshot.sequence_number > previous.sequence_number);
            for (before, after) in previous.players.iter().zip(&snapshot.players) {
                assert!(after.score >= before.score);
            }
            for (before, after) in previous.coins.iter().zip(&snapshot.coins) {
                assert!(before.active || !after.active, "coin {} reactivated", after.id);
            }
            previous = snapshot;
        }

        for coin in &previous.coins {
            if !coin.active {
                collected_total += 1;
            }
        }
        let score_total: u32 = previous.players.iter().map(|p| p.score).sum();
        assert_eq!(score_total, collected_total);
    }
}
