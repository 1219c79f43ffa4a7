//! Server network layer: session setup over TCP, game traffic over UDP, and the tick loop

use crate::broadcast::run_broadcaster;
use crate::config::{ConfigError, ServerConfig};
use crate::intake::{intent_slots, run_intent_ingest};
use crate::session::{JoinError, SessionGate};
use crate::world::World;
use log::{debug, error, info, warn};
use shared::protocol::{read_frame, write_frame, ProtocolError};
use shared::{now_millis, PlayerId, SessionMessage, WorldSnapshot};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

const STATS_LOG_INTERVAL_TICKS: u64 = 300;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PlayerJoined {
        player_id: PlayerId,
        outbox: mpsc::UnboundedSender<SessionMessage>,
        session_started: bool,
    },
    PlayerLeft {
        player_id: PlayerId,
        session_ended: bool,
    },
}

/// Everything a connection task needs, cloned per connection
#[derive(Clone)]
struct SessionContext {
    gate: Arc<RwLock<SessionGate>>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    udp_port: u16,
    handshake_timeout: Duration,
}

/// Authoritative game server
///
/// Binding happens in [`Server::bind`] so that the only fatal condition, a
/// port that cannot be bound, surfaces before any session work starts.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    socket: Arc<UdpSocket>,
    gate: Arc<RwLock<SessionGate>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let tcp_addr = config.tcp_addr();
        let listener = TcpListener::bind(&tcp_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: tcp_addr.clone(),
                source,
            })?;

        // Port 0 on the session side means "pick any" for both channels.
        let udp_addr = if config.port == 0 {
            format!("{}:0", config.host)
        } else {
            config.udp_addr()
        };
        let socket = UdpSocket::bind(&udp_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: udp_addr.clone(),
                source,
            })?;

        info!(
            "Server listening on {} (session) and {} (state)",
            listener.local_addr()?,
            socket.local_addr()?
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let gate = SessionGate::new(config.player_count, config.end_policy);

        Ok(Server {
            config,
            listener,
            socket: Arc::new(socket),
            gate: Arc::new(RwLock::new(gate)),
            server_tx,
            server_rx,
        })
    }

    pub fn session_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the session until it ends or `shutdown` resolves
    ///
    /// Returns the final world state, or `None` if the session never started.
    pub async fn run<F>(mut self, shutdown: F) -> Result<Option<WorldSnapshot>, ServerError>
    where
        F: Future<Output = ()>,
    {
        let (publisher, slots) = intent_slots(self.config.player_count);
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

        let context = SessionContext {
            gate: Arc::clone(&self.gate),
            server_tx: self.server_tx.clone(),
            udp_port: self.socket.local_addr()?.port(),
            handshake_timeout: self.config.handshake_timeout,
        };

        let tasks: Vec<JoinHandle<()>> = vec![
            tokio::spawn(accept_loop(self.listener, context)),
            tokio::spawn(run_intent_ingest(
                Arc::clone(&self.socket),
                Arc::clone(&self.gate),
                publisher,
                self.config.inbound_delay,
            )),
        ];
        let broadcaster = tokio::spawn(run_broadcaster(
            Arc::clone(&self.socket),
            Arc::clone(&self.gate),
            snapshot_rx,
            self.config.outbound_delay,
        ));

        let dt = self.config.tick_interval().as_secs_f32();
        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut outboxes: BTreeMap<PlayerId, mpsc::UnboundedSender<SessionMessage>> =
            BTreeMap::new();
        let mut world: Option<World> = None;

        tokio::pin!(shutdown);
        info!(
            "Waiting for {} players at {} Hz",
            self.config.player_count, self.config.tick_rate
        );

        let end_reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.gate.write().await.end();
                    break "server shutting down";
                }

                // Handle connection events
                message = self.server_rx.recv() => match message {
                    Some(ServerMessage::PlayerJoined { player_id, outbox, session_started }) => {
                        outboxes.insert(player_id, outbox);

                        if session_started {
                            let started = World::new(
                                self.config.world.clone(),
                                outboxes.keys().copied(),
                                self.config.seed,
                            );
                            let initial_snapshot = started.snapshot(now_millis());
                            for outbox in outboxes.values() {
                                let _ = outbox.send(SessionMessage::Start {
                                    initial_snapshot: initial_snapshot.clone(),
                                });
                            }
                            info!("Session started with {} players", outboxes.len());
                            world = Some(started);
                            tick_interval.reset();
                        }
                    }
                    Some(ServerMessage::PlayerLeft { player_id, session_ended }) => {
                        outboxes.remove(&player_id);
                        if let Some(world) = world.as_mut() {
                            world.remove_player(player_id);
                        }
                        if session_ended {
                            break "not enough players left";
                        }
                    }
                    None => break "connection handling stopped",
                },

                // Handle server tick events
                _ = tick_interval.tick(), if world.is_some() => {
                    if let Some(world) = world.as_mut() {
                        let snapshot = world.step(|id| slots.latest(id).direction, dt, now_millis());

                        if snapshot.sequence_number % self.config.broadcast_every as u64 == 0 {
                            let _ = snapshot_tx.send(snapshot);
                        }

                        if world.tick() % STATS_LOG_INTERVAL_TICKS == 0 {
                            debug!(
                                "Tick {}: {} players, {} coins left",
                                world.tick(),
                                world.players().count(),
                                world.coins().iter().filter(|c| c.is_active()).count()
                            );
                        }
                    }
                },
            }
        };

        info!("Session ended: {}", end_reason);
        for outbox in outboxes.values() {
            let _ = outbox.send(SessionMessage::Ended {
                reason: end_reason.to_string(),
            });
        }

        for task in tasks {
            task.abort();
        }
        drop(snapshot_tx);
        broadcaster.abort();

        Ok(world.map(|world| world.snapshot(now_millis())))
    }
}

/// Accepts session connections until aborted
async fn accept_loop(listener: TcpListener, context: SessionContext) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Session connection from {}", addr);
                let context = context.clone();
                tokio::spawn(async move {
                    handle_session_connection(stream, addr, context).await;
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Runs the handshake, then holds the connection open until either side closes it
async fn handle_session_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    context: SessionContext,
) {
    // The outbox sender lives in the main loop; once it is dropped the writer
    // drains and this connection closes.
    let (player_id, mut outbox) = match handshake(&mut stream, addr, &context).await {
        Ok(Some(admitted)) => admitted,
        Ok(None) => return,
        Err(e) => {
            warn!("Handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut reader, mut writer) = stream.into_split();

    let read_until_closed = async {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(message)) => debug!("Ignoring {:?} from player {}", message, player_id),
                Ok(None) => break,
                Err(e) => {
                    warn!("Session connection of player {} failed: {}", player_id, e);
                    break;
                }
            }
        }
    };

    let write_outbox = async {
        while let Some(message) = outbox.recv().await {
            if let Err(e) = write_frame(&mut writer, &message).await {
                warn!("Failed to write to player {}: {}", player_id, e);
                break;
            }
        }
    };

    tokio::select! {
        _ = read_until_closed => {}
        _ = write_outbox => {}
    }

    let mut gate = context.gate.write().await;
    let left = gate.leave(player_id);
    if left.was_connected {
        let _ = context.server_tx.send(ServerMessage::PlayerLeft {
            player_id,
            session_ended: left.session_ended,
        });
    }
}

/// Reads the client's hello and admits or rejects it
///
/// `Ok(None)` means the client was told why it was rejected.
async fn handshake(
    stream: &mut TcpStream,
    addr: SocketAddr,
    context: &SessionContext,
) -> Result<Option<(PlayerId, mpsc::UnboundedReceiver<SessionMessage>)>, ProtocolError> {
    let hello = timeout(context.handshake_timeout, read_frame(stream))
        .await
        .map_err(|_| ProtocolError::Invalid("handshake timed out"))??;

    let protocol_version = match hello {
        Some(SessionMessage::Hello { protocol_version }) => protocol_version,
        Some(_) => return Err(ProtocolError::Invalid("expected hello")),
        None => return Err(ProtocolError::Invalid("closed before hello")),
    };

    if let Err(e) = SessionGate::check_version(protocol_version) {
        reject(stream, addr, e).await?;
        return Ok(None);
    }

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let joined = {
        let mut gate = context.gate.write().await;
        let joined = gate.join();
        if let Ok(joined) = &joined {
            // Queued under the lock so joins reach the main loop in slot
            // order and the welcome always precedes the start message.
            let _ = outbox_tx.send(SessionMessage::Welcome {
                player_id: joined.player_id,
                udp_port: context.udp_port,
            });
            let _ = context.server_tx.send(ServerMessage::PlayerJoined {
                player_id: joined.player_id,
                outbox: outbox_tx,
                session_started: joined.session_started,
            });
        }
        joined
    };

    match joined {
        Ok(joined) => {
            info!("Assigned player {} to {}", joined.player_id, addr);
            Ok(Some((joined.player_id, outbox_rx)))
        }
        Err(e) => {
            reject(stream, addr, e).await?;
            Ok(None)
        }
    }
}

async fn reject(stream: &mut TcpStream, addr: SocketAddr, error: JoinError) -> Result<(), ProtocolError> {
    info!("Rejecting {}: {}", addr, error);
    write_frame(
        stream,
        &SessionMessage::Rejected {
            reason: error.reason(),
        },
    )
    .await?;
    stream.shutdown().await?;
    Ok(())
}
