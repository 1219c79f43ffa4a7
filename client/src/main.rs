use clap::{Parser, ValueEnum};
use client::config::ClientConfig;
use client::input::{IdleInput, WanderInput};
use client::network::Client;
use client::rendering::LogRenderer;
use log::info;
use shared::{
    DEFAULT_ARTIFICIAL_DELAY_MS, DEFAULT_INTERPOLATION_DELAY_MS, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputMode {
    /// Stand still
    Idle,
    /// Random walk
    Wander,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = DEFAULT_SERVER_HOST)]
    host: String,

    /// Server session (TCP) port
    #[arg(short, long, env = "SERVER_PORT", default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Delay applied to every received snapshot
    #[arg(long, env = "CLIENT_INBOUND_DELAY_MS", default_value_t = DEFAULT_ARTIFICIAL_DELAY_MS)]
    inbound_delay_ms: u64,

    /// Delay applied to every sent intent
    #[arg(long, env = "CLIENT_OUTBOUND_DELAY_MS", default_value_t = DEFAULT_ARTIFICIAL_DELAY_MS)]
    outbound_delay_ms: u64,

    /// How far behind the server the view is rendered
    #[arg(short = 'i', long, env = "INTERPOLATION_DELAY_MS", default_value_t = DEFAULT_INTERPOLATION_DELAY_MS)]
    interpolation_delay_ms: u64,

    /// Frames per second
    #[arg(short, long, default_value_t = 60)]
    frame_rate: u32,

    /// Where movement comes from
    #[arg(long, value_enum, default_value_t = InputMode::Wander)]
    input: InputMode,

    /// Seed for the wandering input
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn to_config(&self) -> ClientConfig {
        let interpolation_delay = Duration::from_millis(self.interpolation_delay_ms);
        let defaults = ClientConfig::default();
        ClientConfig {
            server_host: self.host.clone(),
            server_port: self.port,
            inbound_delay: Duration::from_millis(self.inbound_delay_ms),
            outbound_delay: Duration::from_millis(self.outbound_delay_ms),
            interpolation_delay,
            retention: defaults.retention.max(interpolation_delay * 2),
            frame_rate: self.frame_rate,
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.to_config();
    info!(
        "Delays {:?} in / {:?} out, interpolating {:?} behind",
        config.inbound_delay, config.outbound_delay, config.interpolation_delay
    );

    let client = Client::connect(config).await?;
    let renderer = LogRenderer::new(client.player_id(), u64::from(args.frame_rate));
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, leaving the session...");
        }
    };

    let report = match args.input {
        InputMode::Idle => client.run(IdleInput, renderer, shutdown).await?,
        InputMode::Wander => {
            let frames_per_turn = args.frame_rate.max(1);
            client
                .run(WanderInput::new(args.seed, frames_per_turn), renderer, shutdown)
                .await?
        }
    };

    if let Some(frame) = &report.final_frame {
        for player in &frame.players {
            info!("Player {} finished with {} points", player.id, player.score);
        }
    }
    Ok(())
}
