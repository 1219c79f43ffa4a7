//! Session gate: player slot assignment and the session lifecycle
//!
//! This module tracks which player slots are taken and drives the session
//! through its phases:
//! - `Waiting` while fewer than the configured number of players have joined
//! - `Running` from the moment the last slot is filled
//! - `Ended` on shutdown, or when the end policy sees too few players left
//!
//! The gate also remembers each player's datagram endpoint, learned from the
//! first intent that player sends, so the broadcaster knows where snapshots go.

use crate::config::EndPolicy;
use log::info;
use shared::protocol::{DropReason, RejectReason, PROTOCOL_VERSION};
use shared::PlayerId;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Waiting,
    Running,
    Ended,
}

/// Handshake failures, reported to the initiating client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("session is full")]
    SessionFull,
    #[error("protocol version mismatch (expected {expected}, got {got})")]
    VersionMismatch { expected: u32, got: u32 },
    #[error("session has ended")]
    SessionEnded,
}

impl JoinError {
    pub fn reason(&self) -> RejectReason {
        match self {
            JoinError::SessionFull => RejectReason::SessionFull,
            JoinError::VersionMismatch { expected, got } => RejectReason::VersionMismatch {
                expected: *expected,
                got: *got,
            },
            JoinError::SessionEnded => RejectReason::SessionEnded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    pub player_id: PlayerId,
    /// True for exactly one join per session: the one that filled the last slot
    pub session_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Left {
    pub was_connected: bool,
    /// True when this departure moved the session to `Ended`
    pub session_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Free,
    Connected,
    /// Left during a running session; never handed out again
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    status: SlotStatus,
    endpoint: Option<SocketAddr>,
}

/// Player roster and session state machine
#[derive(Debug)]
pub struct SessionGate {
    phase: SessionPhase,
    slots: Vec<Slot>,
    end_policy: EndPolicy,
}

impl SessionGate {
    /// Creates a gate with `player_count` slots, ids `0..player_count`
    pub fn new(player_count: usize, end_policy: EndPolicy) -> Self {
        Self {
            phase: SessionPhase::Waiting,
            slots: vec![
                Slot {
                    status: SlotStatus::Free,
                    endpoint: None,
                };
                player_count
            ],
            end_policy,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    pub fn check_version(protocol_version: u32) -> Result<(), JoinError> {
        if protocol_version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(JoinError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: protocol_version,
            })
        }
    }

    /// Assigns the lowest free slot to a new player
    ///
    /// Filling the last slot moves the session from `Waiting` to `Running`.
    pub fn join(&mut self) -> Result<Joined, JoinError> {
        match self.phase {
            SessionPhase::Running => return Err(JoinError::SessionFull),
            SessionPhase::Ended => return Err(JoinError::SessionEnded),
            SessionPhase::Waiting => {}
        }

        let index = self
            .slots
            .iter()
            .position(|slot| slot.status == SlotStatus::Free)
            .ok_or(JoinError::SessionFull)?;
        self.slots[index].status = SlotStatus::Connected;
        let player_id = index as PlayerId;

        let session_started = self.connected_count() == self.slots.len();
        if session_started {
            self.phase = SessionPhase::Running;
            info!("All {} players joined, session running", self.slots.len());
        } else {
            info!(
                "Player {} joined, waiting for {} more",
                player_id,
                self.slots.len() - self.connected_count()
            );
        }

        Ok(Joined {
            player_id,
            session_started,
        })
    }

    /// Releases a player's slot
    ///
    /// While waiting the slot becomes free for the next connection. Once
    /// running it is retired, and the end policy decides whether the session
    /// goes on with the remaining players.
    pub fn leave(&mut self, player_id: PlayerId) -> Left {
        let Some(slot) = self.slots.get_mut(player_id as usize) else {
            return Left {
                was_connected: false,
                session_ended: false,
            };
        };
        let was_connected = slot.status == SlotStatus::Connected;
        if !was_connected {
            return Left {
                was_connected,
                session_ended: false,
            };
        }

        slot.endpoint = None;
        slot.status = match self.phase {
            SessionPhase::Waiting => SlotStatus::Free,
            SessionPhase::Running | SessionPhase::Ended => SlotStatus::Disconnected,
        };
        info!("Player {} left ({:?})", player_id, self.phase);

        let session_ended = self.phase == SessionPhase::Running
            && self.end_policy.should_end(self.connected_count());
        if session_ended {
            self.phase = SessionPhase::Ended;
            info!(
                "Only {} players left, session ended",
                self.connected_count()
            );
        }

        Left {
            was_connected,
            session_ended,
        }
    }

    /// Ends the session explicitly; returns false if it had already ended
    pub fn end(&mut self) -> bool {
        if self.phase == SessionPhase::Ended {
            return false;
        }
        self.phase = SessionPhase::Ended;
        true
    }

    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.slots
            .get(player_id as usize)
            .is_some_and(|slot| slot.status == SlotStatus::Connected)
    }

    pub fn connected_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status == SlotStatus::Connected)
            .count()
    }

    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.status == SlotStatus::Connected)
            .map(|(index, _)| index as PlayerId)
            .collect()
    }

    /// Associates a datagram source with a connected player
    ///
    /// The first datagram binds the endpoint. Later datagrams must come from
    /// the same address.
    pub fn bind_endpoint(&mut self, player_id: PlayerId, addr: SocketAddr) -> Result<(), DropReason> {
        let slot = self
            .slots
            .get_mut(player_id as usize)
            .filter(|slot| slot.status == SlotStatus::Connected)
            .ok_or(DropReason::UnknownSender)?;

        match slot.endpoint {
            None => {
                info!("Player {} sends datagrams from {}", player_id, addr);
                slot.endpoint = Some(addr);
                Ok(())
            }
            Some(bound) if bound == addr => Ok(()),
            Some(_) => Err(DropReason::UnknownSender),
        }
    }

    /// Datagram endpoints of every connected player that has one
    pub fn endpoints(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.status == SlotStatus::Connected)
            .filter_map(|(index, slot)| slot.endpoint.map(|addr| (index as PlayerId, addr)))
            .collect()
    }
}
