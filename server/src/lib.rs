//! # Coin Collector Server Library
//!
//! The authoritative half of the coin collector. The server owns the only
//! true copy of the world: clients send movement intents, the server moves
//! everyone, resolves coin pickups and streams the resulting snapshots back.
//!
//! ## Channels
//!
//! ### Session channel (TCP)
//! Reliable and ordered. Used for the handshake (`Hello`, then `Welcome` or
//! `Rejected`), the `Start` message carrying the initial snapshot, and the
//! final `Ended` notice. A closed connection is how the server learns that a
//! player left.
//!
//! ### State channel (UDP)
//! Unreliable. Clients send one intent per frame, the server sends one
//! snapshot per broadcast tick. Both directions pass through an artificial
//! delay so the effects of latency are visible on a local machine.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Slot assignment and the `Waiting -> Running -> Ended` lifecycle.
//!
//! ### Intake Module (`intake`)
//! Screens inbound datagrams and keeps the latest intent per player.
//!
//! ### World Module (`world`)
//! The fixed-step simulation: movement, arena clamping, coin pickup.
//!
//! ### Broadcast Module (`broadcast`)
//! Sends snapshots to every connected player after the outbound delay.
//!
//! ### Network Module (`network`)
//! Binds the sockets and runs the session and tick loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         player_count: 2,
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     let final_state = server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     if let Some(snapshot) = final_state {
//!         for player in &snapshot.players {
//!             println!("player {} scored {}", player.id, player.score);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod intake;
pub mod network;
pub mod session;
pub mod world;
