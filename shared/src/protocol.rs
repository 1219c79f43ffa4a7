//! Wire protocol for the reliable session channel and the unreliable state channel
//!
//! Both channels carry bincode-encoded serde types. The reliable channel (TCP)
//! prefixes every [`SessionMessage`] with a 4-byte big-endian length. The
//! unreliable channel (UDP) carries exactly one [`Datagram`] per packet.
//!
//! Decoding always validates: a message that deserializes but carries
//! non-finite coordinates or duplicated ids is rejected the same way as
//! undecodable bytes.

use crate::math::Vec2;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound for a single reliable-channel frame
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Upper bound for a single datagram, also the receive buffer size
pub const MAX_DATAGRAM_LEN: usize = 8 * 1024;

pub type PlayerId = u32;
pub type CoinId = u32;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("encoding failed: {0}")]
    Encode(bincode::Error),
    #[error("decoding failed: {0}")]
    Decode(bincode::Error),
    #[error("invalid message: {0}")]
    Invalid(&'static str),
    #[error("message of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messages exchanged over the reliable channel during session setup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum SessionMessage {
    /// Client -> server, first frame on a new connection
    Hello { protocol_version: u32 },
    /// Server -> client, player slot assigned
    Welcome { player_id: PlayerId, udp_port: u16 },
    /// Server -> all clients once the configured player count has joined
    Start { initial_snapshot: WorldSnapshot },
    /// Server -> client, the handshake failed and the connection closes
    Rejected { reason: RejectReason },
    /// Server -> all clients, the session is over
    Ended { reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum RejectReason {
    SessionFull,
    VersionMismatch { expected: u32, got: u32 },
    SessionEnded,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SessionFull => write!(f, "session full"),
            RejectReason::VersionMismatch { expected, got } => {
                write!(f, "protocol version mismatch (expected {expected}, got {got})")
            }
            RejectReason::SessionEnded => write!(f, "session ended"),
        }
    }
}

/// Messages carried by the unreliable channel
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Datagram {
    /// Client -> server
    Intent(IntentMessage),
    /// Server -> client
    Snapshot(WorldSnapshot),
}

/// A client's desired movement direction
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct IntentMessage {
    pub player_id: PlayerId,
    pub dx: f32,
    pub dy: f32,
    /// Client wall clock in milliseconds since the UNIX epoch
    pub client_send_time: u64,
}

impl IntentMessage {
    pub fn new(player_id: PlayerId, direction: Vec2, client_send_time: u64) -> Self {
        Self {
            player_id,
            dx: direction.x,
            dy: direction.y,
            client_send_time,
        }
    }

    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.dx, self.dy)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if !self.direction().is_finite() {
            return Err(ProtocolError::Invalid("non-finite intent direction"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub score: u32,
}

impl PlayerState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CoinState {
    pub id: CoinId,
    pub x: f32,
    pub y: f32,
    pub active: bool,
}

impl CoinState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Immutable description of the authoritative world at one simulation tick
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub sequence_number: u64,
    /// Server wall clock in milliseconds since the UNIX epoch
    pub server_time: u64,
    /// Ordered by ascending player id
    pub players: Vec<PlayerState>,
    pub coins: Vec<CoinState>,
}

impl WorldSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn active_coins(&self) -> impl Iterator<Item = &CoinState> {
        self.coins.iter().filter(|c| c.active)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.players.windows(2).all(|w| w[0].id < w[1].id) {
            return Err(ProtocolError::Invalid("players not strictly ordered by id"));
        }
        if self.players.iter().any(|p| !p.position().is_finite()) {
            return Err(ProtocolError::Invalid("non-finite player position"));
        }
        if self.coins.iter().any(|c| !c.position().is_finite()) {
            return Err(ProtocolError::Invalid("non-finite coin position"));
        }
        let mut coin_ids: Vec<CoinId> = self.coins.iter().map(|c| c.id).collect();
        coin_ids.sort_unstable();
        if coin_ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ProtocolError::Invalid("duplicate coin id"));
        }
        Ok(())
    }
}

impl SessionMessage {
    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            SessionMessage::Start { initial_snapshot } => initial_snapshot.validate(),
            _ => Ok(()),
        }
    }
}

impl Datagram {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = serialize(self).map_err(ProtocolError::Encode)?;
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(ProtocolError::FrameTooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(ProtocolError::FrameTooLarge(bytes.len()));
        }
        let datagram: Datagram = deserialize(bytes).map_err(ProtocolError::Decode)?;
        match &datagram {
            Datagram::Intent(intent) => intent.validate()?,
            Datagram::Snapshot(snapshot) => snapshot.validate()?,
        }
        Ok(datagram)
    }
}

/// Writes one length-prefixed session message
pub async fn write_frame<W>(writer: &mut W, message: &SessionMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serialize(message).map_err(ProtocolError::Encode)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(bytes.len()));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed session message, `None` on a clean close
///
/// Not cancel safe: callers that race it against other futures should run it
/// in a dedicated task.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<SessionMessage>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    let message: SessionMessage = deserialize(&buffer).map_err(ProtocolError::Decode)?;
    message.validate()?;
    Ok(Some(message))
}

/// Why an inbound datagram was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Undecodable or failed validation
    Malformed,
    /// Decoded, but not from a known connected player
    UnknownSender,
    /// Decoded, but the wrong direction for this endpoint
    WrongKind,
}

/// Running counters of datagram traffic, kept for diagnostics only
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DatagramStats {
    pub accepted: u64,
    pub malformed: u64,
    pub unknown_sender: u64,
    pub wrong_kind: u64,
}

impl DatagramStats {
    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Malformed => self.malformed += 1,
            DropReason::UnknownSender => self.unknown_sender += 1,
            DropReason::WrongKind => self.wrong_kind += 1,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.malformed + self.unknown_sender + self.wrong_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> WorldSnapshot {
        WorldSnapshot {
            sequence_number: 42,
            server_time: 1_000,
            players: vec![
                PlayerState {
                    id: 0,
                    x: 10.0,
                    y: 20.0,
                    score: 1,
                },
                PlayerState {
                    id: 1,
                    x: 30.0,
                    y: 40.0,
                    score: 0,
                },
            ],
            coins: vec![
                CoinState {
                    id: 1,
                    x: 100.0,
                    y: 100.0,
                    active: true,
                },
                CoinState {
                    id: 2,
                    x: 200.0,
                    y: 50.0,
                    active: false,
                },
            ],
        }
    }

    #[test]
    fn test_snapshot_datagram_survives_encoding() {
        let snapshot = sample_snapshot();
        let bytes = Datagram::Snapshot(snapshot.clone()).encode().unwrap();

        match Datagram::decode(&bytes).unwrap() {
            Datagram::Snapshot(decoded) => {
                assert_eq!(decoded, snapshot);
                assert_eq!(decoded.player(1).map(|p| p.score), Some(0));
                assert_eq!(decoded.active_coins().count(), 1);
            }
            _ => panic!("Wrong datagram type after decoding"),
        }
    }

    #[test]
    fn test_intent_with_nan_is_rejected() {
        let intent = IntentMessage {
            player_id: 0,
            dx: f32::NAN,
            dy: 0.0,
            client_send_time: 0,
        };
        let bytes = Datagram::Intent(intent).encode().unwrap();

        assert!(matches!(
            Datagram::decode(&bytes),
            Err(ProtocolError::Invalid(_))
        ));
    }

    #[test]
    fn test_unordered_players_are_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.players.reverse();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_duplicate_coin_ids_are_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.coins[1].id = snapshot.coins[0].id;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        assert!(Datagram::decode(&[]).is_err());
        assert!(Datagram::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).is_err());

        let bytes = Datagram::Snapshot(sample_snapshot()).encode().unwrap();
        assert!(Datagram::decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_oversized_datagram_is_rejected() {
        let bytes = vec![0u8; MAX_DATAGRAM_LEN + 1];
        assert!(matches!(
            Datagram::decode(&bytes),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_over_a_byte_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        let hello = SessionMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
        };
        let start = SessionMessage::Start {
            initial_snapshot: sample_snapshot(),
        };
        write_frame(&mut a, &hello).await.unwrap();
        write_frame(&mut a, &start).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(hello));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(start));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_header_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();

        assert!(matches!(
            read_frame(&mut b).await,
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_drop_counters() {
        let mut stats = DatagramStats::default();
        stats.record_accepted();
        stats.record_drop(DropReason::Malformed);
        stats.record_drop(DropReason::UnknownSender);
        stats.record_drop(DropReason::UnknownSender);

        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.unknown_sender, 2);
        assert_eq!(stats.dropped(), 3);
    }

    #[test]
    fn test_reject_reason_display() {
        let reason = RejectReason::VersionMismatch {
            expected: 1,
            got: 7,
        };
        assert_eq!(
            reason.to_string(),
            "protocol version mismatch (expected 1, got 7)"
        );
    }
}
