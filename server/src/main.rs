use clap::Parser;
use log::info;
use server::config::{EndPolicy, ServerConfig, WorldConfig};
use server::network::Server;
use shared::{
    DEFAULT_ARTIFICIAL_DELAY_MS, DEFAULT_COIN_COUNT, DEFAULT_PLAYER_COUNT, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT, DEFAULT_TICK_RATE, PICKUP_RADIUS, PLAYER_SPEED, WORLD_HEIGHT,
    WORLD_WIDTH,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both sockets to
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = DEFAULT_SERVER_HOST)]
    host: String,

    /// Session (TCP) port
    #[arg(short, long, env = "SERVER_PORT", default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// State (UDP) port, defaults to the session port + 1
    #[arg(long, env = "SERVER_UDP_PORT")]
    udp_port: Option<u16>,

    /// Players required before the session starts
    #[arg(short = 'n', long, env = "PLAYER_COUNT", default_value_t = DEFAULT_PLAYER_COUNT)]
    players: usize,

    /// Simulation ticks per second
    #[arg(short, long, env = "TICK_RATE", default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Delay applied to every received intent
    #[arg(long, env = "SERVER_INBOUND_DELAY_MS", default_value_t = DEFAULT_ARTIFICIAL_DELAY_MS)]
    inbound_delay_ms: u64,

    /// Delay applied to every sent snapshot
    #[arg(long, env = "SERVER_OUTBOUND_DELAY_MS", default_value_t = DEFAULT_ARTIFICIAL_DELAY_MS)]
    outbound_delay_ms: u64,

    /// Send only every Nth snapshot
    #[arg(long, default_value_t = 1)]
    broadcast_every: u32,

    /// End the session once fewer players remain; 0 never ends it
    #[arg(long, default_value_t = 1)]
    min_players: usize,

    #[arg(long, env = "ARENA_WIDTH", default_value_t = WORLD_WIDTH)]
    width: f32,

    #[arg(long, env = "ARENA_HEIGHT", default_value_t = WORLD_HEIGHT)]
    height: f32,

    /// Units per second at full intent
    #[arg(long, env = "PLAYER_SPEED", default_value_t = PLAYER_SPEED)]
    speed: f32,

    #[arg(long, env = "PICKUP_RADIUS", default_value_t = PICKUP_RADIUS)]
    pickup_radius: f32,

    /// Coins placed at session start
    #[arg(long, default_value_t = DEFAULT_COIN_COUNT)]
    coins: usize,

    /// Spawn an extra coin every N milliseconds
    #[arg(long)]
    coin_spawn_ms: Option<u64>,

    /// Seed for spawn placement
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let world = WorldConfig {
            width: self.width,
            height: self.height,
            player_speed: self.speed,
            pickup_radius: self.pickup_radius,
            coin_count: self.coins,
            coin_spawn_interval: self.coin_spawn_ms.map(Duration::from_millis),
            ..WorldConfig::default()
        };

        ServerConfig {
            udp_port: self.udp_port.unwrap_or(self.port.wrapping_add(1)),
            host: self.host,
            port: self.port,
            player_count: self.players,
            tick_rate: self.tick_rate,
            inbound_delay: Duration::from_millis(self.inbound_delay_ms),
            outbound_delay: Duration::from_millis(self.outbound_delay_ms),
            broadcast_every: self.broadcast_every,
            end_policy: EndPolicy {
                min_players: self.min_players,
            },
            seed: self.seed,
            world,
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

    let config = Args::parse().into_config();
    info!(
        "Starting server for {} players, delays {:?} in / {:?} out",
        config.player_count, config.inbound_delay, config.outbound_delay
    );

    let server = Server::bind(config).await?;
    let final_state = server
        .run(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        })
        .await?;

    if let Some(snapshot) = final_state {
        for player in &snapshot.players {
            info!("Player {} finished with {} points", player.id, player.score);
        }
    }

    // Let connection tasks flush the end notice before the runtime stops.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
