use crate::interpolation::{RenderFrame, SampleMode};
use log::{debug, info};
use shared::PlayerId;
use std::collections::BTreeMap;

/// Consumes one interpolated view per frame
pub trait Renderer: Send {
    fn render(&mut self, frame: &RenderFrame);
}

/// Headless renderer: traces the view at `debug` and score changes at `info`
#[derive(Debug)]
pub struct LogRenderer {
    local_player: PlayerId,
    frames: u64,
    log_every: u64,
    scores: BTreeMap<PlayerId, u32>,
}

impl LogRenderer {
    pub fn new(local_player: PlayerId, log_every: u64) -> Self {
        Self {
            local_player,
            frames: 0,
            log_every: log_every.max(1),
            scores: BTreeMap::new(),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, u32> {
        &self.scores
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &RenderFrame) {
        self.frames += 1;

        for player in &frame.players {
            let previous = self.scores.insert(player.id, player.score);
            if previous.is_some_and(|score| score != player.score) {
                let who = if player.id == self.local_player {
                    "You"
                } else {
                    "Opponent"
                };
                info!("{} (player {}) now has {} points", who, player.id, player.score);
            }
        }

        if self.frames % self.log_every == 0 {
            let mode = match frame.mode {
                SampleMode::Hold => "hold".to_string(),
                SampleMode::ClampedToOldest => "oldest".to_string(),
                SampleMode::Interpolated { t } => format!("t={:.2}", t),
            };
            let positions: Vec<String> = frame
                .players
                .iter()
                .map(|p| format!("{}@({:.1}, {:.1})", p.id, p.x, p.y))
                .collect();
            debug!(
                "Frame {} seq {} [{}]: players {}; {} coins left",
                self.frames,
                frame.sequence_number,
                mode,
                positions.join(" "),
                frame.active_coins().count()
            );
        }
    }
}
