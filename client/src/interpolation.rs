//! Interpolation renderer: reconstructs the world a fixed delay in the past
//!
//! Remote players are drawn between the two buffered snapshots that bracket
//! the render target. Positions are blended linearly; scores and coins are
//! discrete and come from the later snapshot. The local player is not
//! interpolated and is shown as of the newest snapshot received.

use crate::buffer::SnapshotBuffer;
use shared::{CoinState, PlayerId, PlayerState, WorldSnapshot};

/// How a frame was derived from the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleMode {
    /// Fewer than two snapshots, or the target is past the newest one
    Hold,
    /// The target precedes every buffered snapshot
    ClampedToOldest,
    /// Blended between two snapshots with factor `t` in `[0, 1]`
    Interpolated { t: f32 },
}

/// What the renderer draws for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub target_time: u64,
    pub mode: SampleMode,
    /// Sequence number of the snapshot that supplied the discrete state
    pub sequence_number: u64,
    /// Ordered by ascending player id
    pub players: Vec<PlayerState>,
    pub coins: Vec<CoinState>,
}

impl RenderFrame {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn active_coins(&self) -> impl Iterator<Item = &CoinState> {
        self.coins.iter().filter(|c| c.active)
    }
}

/// Samples the buffer at `target_time` on the server timeline
///
/// Returns `None` only when the buffer is empty.
pub fn sample(
    buffer: &SnapshotBuffer,
    target_time: u64,
    local_player: Option<PlayerId>,
) -> Option<RenderFrame> {
    let latest = buffer.latest()?;

    if buffer.len() < 2 {
        return Some(held(latest, target_time, SampleMode::Hold, latest, local_player));
    }

    let successor = buffer.successor_index(target_time);
    let (s0, s1) = match (
        successor.checked_sub(1).and_then(|i| buffer.get(i)),
        buffer.get(successor),
    ) {
        (Some(s0), Some(s1)) => (s0, s1),
        (None, Some(oldest)) => {
            return Some(held(
                oldest,
                target_time,
                SampleMode::ClampedToOldest,
                latest,
                local_player,
            ));
        }
        _ => {
            return Some(held(latest, target_time, SampleMode::Hold, latest, local_player));
        }
    };

    let t = interpolation_factor(s0.server_time, s1.server_time, target_time);

    let mut players: Vec<PlayerState> = s1
        .players
        .iter()
        .filter(|p| Some(p.id) != local_player)
        .filter_map(|p1| {
            let p0 = s0.player(p1.id)?;
            let position = p0.position().lerp(&p1.position(), t);
            Some(PlayerState {
                id: p1.id,
                x: position.x,
                y: position.y,
                score: p1.score,
            })
        })
        .collect();
    add_local_player(&mut players, latest, local_player);

    Some(RenderFrame {
        target_time,
        mode: SampleMode::Interpolated { t },
        sequence_number: s1.sequence_number,
        players,
        coins: s1.coins.clone(),
    })
}

/// Render target on the server timeline for local instant `local_now`
///
/// Until a datagram snapshot has taught the buffer its clock offset, the
/// newest buffered snapshot is the target so the start state is held.
pub fn render_target(
    buffer: &SnapshotBuffer,
    local_now: u64,
    interpolation_delay: u64,
) -> Option<u64> {
    match buffer.to_server_time(local_now) {
        Some(server_now) => Some(server_now.saturating_sub(interpolation_delay)),
        None => buffer.latest().map(|s| s.server_time),
    }
}

/// `(target - t0) / (t1 - t0)` clamped to `[0, 1]`
pub fn interpolation_factor(t0: u64, t1: u64, target: u64) -> f32 {
    if t1 <= t0 {
        return 1.0;
    }
    let t = (target as f64 - t0 as f64) / (t1 - t0) as f64;
    t.clamp(0.0, 1.0) as f32
}

fn held(
    snapshot: &WorldSnapshot,
    target_time: u64,
    mode: SampleMode,
    latest: &WorldSnapshot,
    local_player: Option<PlayerId>,
) -> RenderFrame {
    let mut players: Vec<PlayerState> = snapshot
        .players
        .iter()
        .filter(|p| Some(p.id) != local_player)
        .copied()
        .collect();
    add_local_player(&mut players, latest, local_player);

    RenderFrame {
        target_time,
        mode,
        sequence_number: snapshot.sequence_number,
        players,
        coins: snapshot.coins.clone(),
    }
}

fn add_local_player(
    players: &mut Vec<PlayerState>,
    latest: &WorldSnapshot,
    local_player: Option<PlayerId>,
) {
    if let Some(local) = local_player.and_then(|id| latest.player(id)) {
        let index = players.partition_point(|p| p.id < local.id);
        players.insert(index, *local);
    }
}
