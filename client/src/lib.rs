//! # Coin Collector Client Library
//!
//! The client half of the coin collector. It never simulates the world
//! itself: it sends the player's movement intent to the server every frame
//! and draws a reconstruction of the authoritative state from the snapshots
//! it receives.
//!
//! ## Architecture Overview
//!
//! ### Delayed, lossy input
//! Snapshots arrive over UDP after an artificial inbound delay, may be lost,
//! and may arrive out of order. They are kept in a [`buffer::SnapshotBuffer`]
//! sorted by the time the server produced them.
//!
//! ### Interpolation
//! Each frame renders the world as it was a fixed delay ago (100 ms by
//! default). Remote players are blended between the two snapshots that
//! bracket that moment, which hides the gaps between broadcasts. There is no
//! client-side prediction: the local player is shown at its latest
//! authoritative position, so input lag is plainly visible.
//!
//! ## Module Organization
//!
//! - `buffer`: the time-ordered snapshot store and the local-to-server clock mapping
//! - `interpolation`: bracket search and linear blending into a `RenderFrame`
//! - `input`: `InputState` and the `IntentSource` seam for whatever polls keys
//! - `rendering`: the `Renderer` seam and a headless logging renderer
//! - `network`: handshake, the frame loop and both artificial delays
//! - `config`: runtime options
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::WanderInput;
//! use client::network::Client;
//! use client::rendering::LogRenderer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(ClientConfig::default()).await?;
//!     let renderer = LogRenderer::new(client.player_id(), 60);
//!
//!     let report = client
//!         .run(WanderInput::new(None, 30), renderer, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     println!("rendered {} frames", report.frames_rendered);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod network;
pub mod rendering;
