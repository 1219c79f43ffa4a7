//! Intent ingest: the unreliable inbound path from clients to the simulation
//!
//! Datagrams are screened (decodable, an intent, from the player's bound
//! endpoint), held back by the configured inbound delay, and then written into
//! that player's latest-intent slot. Each slot is a `watch` channel: the
//! ingest task is its only writer, the simulation loop its only reader, and a
//! newer intent simply overwrites an older one.

use crate::session::SessionGate;
use log::{debug, error};
use shared::delay::delay_line;
use shared::protocol::{DatagramStats, DropReason, MAX_DATAGRAM_LEN};
use shared::{Datagram, IntentMessage, PlayerId, Vec2};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};

const STATS_LOG_INTERVAL: u64 = 600;

/// The most recent movement intent retained for one player
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intent {
    /// At most unit length
    pub direction: Vec2,
    pub client_send_time: u64,
}

/// Writer half of the per-player intent slots
#[derive(Debug)]
pub struct IntentPublisher {
    slots: Vec<watch::Sender<Intent>>,
}

/// Reader half of the per-player intent slots
#[derive(Debug)]
pub struct IntentSlots {
    slots: Vec<watch::Receiver<Intent>>,
}

/// Creates one slot per player id `0..player_count`, all starting idle
pub fn intent_slots(player_count: usize) -> (IntentPublisher, IntentSlots) {
    let (senders, receivers) = (0..player_count)
        .map(|_| watch::channel(Intent::default()))
        .unzip();
    (
        IntentPublisher { slots: senders },
        IntentSlots { slots: receivers },
    )
}

impl IntentPublisher {
    /// Overwrites the player's slot; false for an id without a slot
    pub fn publish(&self, player_id: PlayerId, intent: Intent) -> bool {
        match self.slots.get(player_id as usize) {
            Some(slot) => {
                slot.send_replace(intent);
                true
            }
            None => false,
        }
    }
}

impl IntentSlots {
    /// Latest intent for the player, idle if none was ever received
    pub fn latest(&self, player_id: PlayerId) -> Intent {
        self.slots
            .get(player_id as usize)
            .map(|slot| *slot.borrow())
            .unwrap_or_default()
    }
}

/// Decodes and validates one inbound datagram against the session roster
///
/// On success the intent's direction is clamped to unit length.
pub fn screen_intent(
    gate: &mut SessionGate,
    bytes: &[u8],
    addr: SocketAddr,
) -> Result<IntentMessage, DropReason> {
    let intent = match Datagram::decode(bytes) {
        Ok(Datagram::Intent(intent)) => intent,
        Ok(_) => return Err(DropReason::WrongKind),
        Err(_) => return Err(DropReason::Malformed),
    };

    gate.bind_endpoint(intent.player_id, addr)?;

    let direction = intent.direction().clamp_unit();
    Ok(IntentMessage::new(
        intent.player_id,
        direction,
        intent.client_send_time,
    ))
}

/// Receives intents until the socket task is aborted
pub async fn run_intent_ingest(
    socket: Arc<UdpSocket>,
    gate: Arc<RwLock<SessionGate>>,
    publisher: IntentPublisher,
    inbound_delay: Duration,
) {
    let (delayed_tx, mut delayed_rx) = delay_line::<IntentMessage>(inbound_delay);
    let mut buffer = [0u8; MAX_DATAGRAM_LEN];
    let mut stats = DatagramStats::default();

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buffer) => match result {
                Ok((len, addr)) => {
                    let screened = {
                        let mut gate = gate.write().await;
                        screen_intent(&mut gate, &buffer[..len], addr)
                    };

                    match screened {
                        Ok(intent) => {
                            stats.record_accepted();
                            delayed_tx.push(intent);
                        }
                        Err(reason) => {
                            stats.record_drop(reason);
                            debug!("Dropped datagram from {}: {:?}", addr, reason);
                        }
                    }

                    if (stats.accepted + stats.dropped()) % STATS_LOG_INTERVAL == 0 {
                        debug!("Intent ingest: {:?}", stats);
                    }
                }
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },

            Some(intent) = delayed_rx.recv() => {
                // The player may have left while the intent was held back.
                if gate.read().await.is_connected(intent.player_id) {
                    publisher.publish(
                        intent.player_id,
                        Intent {
                            direction: intent.direction(),
                            client_send_time: intent.client_send_time,
                        },
                    );
                }
            }
        }
    }
}
