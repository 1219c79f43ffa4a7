use crate::buffer::SnapshotBuffer;
use crate::config::{ClientConfig, ConfigError};
use crate::input::IntentSource;
use crate::interpolation::{render_target, sample, RenderFrame};
use crate::rendering::Renderer;
use log::{debug, error, info, warn};
use shared::delay::delay_line;
use shared::protocol::{
    read_frame, write_frame, DatagramStats, DropReason, ProtocolError, RejectReason,
    MAX_DATAGRAM_LEN, PROTOCOL_VERSION,
};
use shared::{now_millis, Datagram, IntentMessage, PlayerId, SessionMessage};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("server rejected the connection: {0}")]
    Rejected(RejectReason),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What happened during [`Client::run`]
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub player_id: PlayerId,
    pub started: bool,
    pub frames_rendered: u64,
    /// The most recent view handed to the renderer
    pub final_frame: Option<RenderFrame>,
    pub stats: DatagramStats,
    /// Set when the server ended the session or closed the connection
    pub end_reason: Option<String>,
}

/// A client that completed the handshake and holds a player slot
///
/// Dropping it closes the session connection, which the server treats as the
/// player leaving.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    player_id: PlayerId,
    session_reader: OwnedReadHalf,
    session_writer: OwnedWriteHalf,
    socket: UdpSocket,
}

impl Client {
    /// Connects to the server and claims a player slot
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let addr = config.session_addr();
        info!("Connecting to {}...", addr);
        let mut stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
            Err(_) => {
                return Err(ClientError::Connect {
                    addr,
                    source: std::io::ErrorKind::TimedOut.into(),
                })
            }
        };
        stream.set_nodelay(true)?;

        write_frame(
            &mut stream,
            &SessionMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
            },
        )
        .await?;

        let reply = timeout(config.connect_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| ClientError::Handshake("no reply from server".to_string()))??;
        let (player_id, udp_port) = match reply {
            Some(SessionMessage::Welcome {
                player_id,
                udp_port,
            }) => (player_id, udp_port),
            Some(SessionMessage::Rejected { reason }) => return Err(ClientError::Rejected(reason)),
            Some(other) => {
                return Err(ClientError::Handshake(format!(
                    "expected welcome, got {:?}",
                    other
                )))
            }
            None => {
                return Err(ClientError::Handshake(
                    "server closed the connection".to_string(),
                ))
            }
        };

        let server_ip = stream.peer_addr()?.ip();
        let bind_addr = if server_ip.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(SocketAddr::new(server_ip, udp_port)).await?;

        info!(
            "Joined as player {}, state channel {} -> {}:{}",
            player_id,
            socket.local_addr()?,
            server_ip,
            udp_port
        );

        let (session_reader, session_writer) = stream.into_split();
        Ok(Client {
            config,
            player_id,
            session_reader,
            session_writer,
            socket,
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Waits for the session to start, then runs the frame loop until the
    /// session ends or `shutdown` resolves
    ///
    /// Every frame polls `input`, sends the intent through the outbound delay
    /// and hands the interpolated view to `renderer`.
    pub async fn run<I, R, F>(
        self,
        mut input: I,
        mut renderer: R,
        shutdown: F,
    ) -> Result<SessionReport, ClientError>
    where
        I: IntentSource,
        R: Renderer,
        F: Future<Output = ()>,
    {
        let Client {
            config,
            player_id,
            session_reader,
            session_writer,
            socket,
        } = self;

        let (session_tx, mut session_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(forward_session_messages(session_reader, session_tx));

        let mut report = SessionReport {
            player_id,
            started: false,
            frames_rendered: 0,
            final_frame: None,
            stats: DatagramStats::default(),
            end_reason: None,
        };
        let mut buffer = SnapshotBuffer::new(config.retention, config.buffer_capacity);

        tokio::pin!(shutdown);

        info!("Waiting for the session to start...");
        let started = tokio::select! {
            _ = &mut shutdown => false,
            started = wait_for_start(&mut session_rx, &mut buffer, &mut report.end_reason) => started,
        };
        report.started = started;
        if !report.started {
            reader_task.abort();
            drop(session_writer);
            return Ok(report);
        }
        info!("Session started");

        let (inbound_tx, mut inbound_rx) = delay_line::<Vec<u8>>(config.inbound_delay);
        let (outbound_tx, mut outbound_rx) = delay_line::<Vec<u8>>(config.outbound_delay);
        let interpolation_delay = config.interpolation_delay.as_millis() as u64;

        let mut frame_interval = interval(config.frame_interval());
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut recv_buffer = [0u8; MAX_DATAGRAM_LEN];

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }

                // Session channel: only the end notice matters once running
                message = session_rx.recv() => match message {
                    Some(SessionMessage::Ended { reason }) => {
                        info!("Session ended: {}", reason);
                        report.end_reason = Some(reason);
                        break;
                    }
                    Some(other) => debug!("Ignoring session message {:?}", other),
                    None => {
                        warn!("Server closed the session connection");
                        report.end_reason = Some("session connection closed".to_string());
                        break;
                    }
                },

                // Raw snapshots wait out the inbound delay before decoding
                result = socket.recv(&mut recv_buffer) => match result {
                    Ok(len) => {
                        inbound_tx.push(recv_buffer[..len].to_vec());
                    }
                    Err(e) => {
                        debug!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },

                Some(bytes) = inbound_rx.recv() => match Datagram::decode(&bytes) {
                    Ok(Datagram::Snapshot(snapshot)) => {
                        report.stats.record_accepted();
                        buffer.insert(snapshot, now_millis());
                    }
                    Ok(Datagram::Intent(_)) => report.stats.record_drop(DropReason::WrongKind),
                    Err(e) => {
                        debug!("Dropped malformed datagram: {}", e);
                        report.stats.record_drop(DropReason::Malformed);
                    }
                },

                Some(bytes) = outbound_rx.recv() => {
                    if let Err(e) = socket.send(&bytes).await {
                        debug!("Failed to send intent: {}", e);
                    }
                },

                _ = frame_interval.tick() => {
                    let now = now_millis();

                    let direction = input.poll().direction();
                    match Datagram::Intent(IntentMessage::new(player_id, direction, now)).encode() {
                        Ok(bytes) => {
                            outbound_tx.push(bytes);
                        }
                        Err(e) => error!("Failed to encode intent: {}", e),
                    }

                    if let Some(target) = render_target(&buffer, now, interpolation_delay) {
                        if let Some(frame) = sample(&buffer, target, Some(player_id)) {
                            renderer.render(&frame);
                            report.frames_rendered += 1;
                            report.final_frame = Some(frame);
                        }
                        buffer.discard_before(target);
                    }
                },
            }
        }

        info!(
            "Rendered {} frames, datagrams: {:?}",
            report.frames_rendered, report.stats
        );
        reader_task.abort();
        drop(session_writer);
        Ok(report)
    }
}

/// Returns true once the start message arrived and seeded the buffer
async fn wait_for_start(
    session_rx: &mut mpsc::UnboundedReceiver<SessionMessage>,
    buffer: &mut SnapshotBuffer,
    end_reason: &mut Option<String>,
) -> bool {
    while let Some(message) = session_rx.recv().await {
        match message {
            SessionMessage::Start { initial_snapshot } => {
                buffer.seed(initial_snapshot);
                return true;
            }
            SessionMessage::Ended { reason } => {
                info!("Session ended before it started: {}", reason);
                *end_reason = Some(reason);
                return false;
            }
            other => debug!("Ignoring session message {:?}", other),
        }
    }
    *end_reason = Some("session connection closed".to_string());
    false
}

async fn forward_session_messages(
    mut reader: OwnedReadHalf,
    session_tx: mpsc::UnboundedSender<SessionMessage>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(message)) => {
                if session_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Session connection failed: {}", e);
                break;
            }
        }
    }
}
