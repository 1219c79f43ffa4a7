//! Snapshot broadcaster: the unreliable outbound path to every client
//!
//! Each snapshot is encoded once, held back by the configured outbound delay
//! and then sent to whichever players are connected at send time. Nothing is
//! acknowledged or retried; a lost snapshot is superseded by the next one.

use crate::session::SessionGate;
use log::{error, warn};
use shared::delay::delay_line;
use shared::{Datagram, WorldSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Broadcasts snapshots until the snapshot channel closes and the delay line drains
pub async fn run_broadcaster(
    socket: Arc<UdpSocket>,
    gate: Arc<RwLock<SessionGate>>,
    mut snapshots: mpsc::UnboundedReceiver<WorldSnapshot>,
    outbound_delay: Duration,
) {
    let (delayed_tx, mut delayed_rx) = delay_line::<Arc<[u8]>>(outbound_delay);
    let mut delayed_tx = Some(delayed_tx);

    loop {
        tokio::select! {
            snapshot = snapshots.recv(), if delayed_tx.is_some() => match snapshot {
                Some(snapshot) => match Datagram::Snapshot(snapshot).encode() {
                    Ok(bytes) => {
                        if let Some(tx) = &delayed_tx {
                            tx.push(bytes.into());
                        }
                    }
                    Err(e) => error!("Failed to encode snapshot: {}", e),
                },
                // Closing the delay line lets the pending sends drain.
                None => delayed_tx = None,
            },

            bytes = delayed_rx.recv() => match bytes {
                Some(bytes) => send_to_connected(&socket, &gate, &bytes).await,
                None => break,
            },
        }
    }
}

async fn send_to_connected(socket: &UdpSocket, gate: &RwLock<SessionGate>, bytes: &[u8]) {
    let endpoints = gate.read().await.endpoints();
    for (player_id, addr) in endpoints {
        if let Err(e) = socket.send_to(bytes, addr).await {
            warn!("Failed to send snapshot to player {} at {}: {}", player_id, addr, e);
        }
    }
}
