use clap::Parser;
use log::info;
use server::clock::{Clock, MonotonicClock};
use server::config::{DispatchPolicy, ServerConfig};
use server::directory::RoomDirectory;
use server::game::TransformHandler;
use server::room::Room;
use server::store::{Database, FileDatabase, MemoryDatabase, PlayerSnapshot};
use server::sweeper::TimeoutSweeper;
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments. Flags override values from the config file.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Server IP address to bind rooms to
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Port of the first room; further rooms use the following ports
    #[clap(short, long)]
    port: Option<u16>,
    /// Shed datagrams beyond this many concurrent handlers per room
    #[clap(long, conflicts_with = "queue_capacity")]
    max_tasks: Option<usize>,
    /// Queue up to this many datagrams per room instead of shedding
    #[clap(long)]
    queue_capacity: Option<usize>,
    /// Evict players silent for longer than this
    #[clap(long)]
    session_timeout_ms: Option<i64>,
    /// Directory for persisted player snapshots
    #[clap(long)]
    data_dir: Option<PathBuf>,
}

fn apply_overrides(config: &mut ServerConfig, args: Args) {
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_tasks) = args.max_tasks {
        config.policy = DispatchPolicy::Shed { max_tasks };
    }
    if let Some(capacity) = args.queue_capacity {
        config.policy = DispatchPolicy::Queue { capacity };
    }
    if let Some(timeout) = args.session_timeout_ms {
        config.session_timeout_ms = timeout;
    }
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir;
    }
}

/// Main-method of the room server.
/// Loads configuration, starts every room and the timeout sweeper, then runs until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    apply_overrides(&mut config, args);
    config.validate()?;

    let player_store: Arc<dyn Database<i64, PlayerSnapshot>> = match &config.data_dir {
        Some(dir) => Arc::new(FileDatabase::<i64, PlayerSnapshot>::open(dir.join("players"))?),
        None => Arc::new(MemoryDatabase::<i64, PlayerSnapshot>::new()),
    };
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let game = Arc::new(TransformHandler::new());
    let directory = Arc::new(RoomDirectory::new());

    for (index, room_config) in config.room_configs().into_iter().enumerate() {
        let room = Room::new(
            room_config,
            Arc::clone(&player_store),
            Arc::clone(&clock),
            game.clone(),
        )?;
        room.start(config.room_addr(index)?).await?;
        directory.register(room)?;
    }

    for info in directory.list_infos() {
        info!(
            "Room {} ({}) ready for {} players",
            info.id, info.name, info.max_player_count
        );
    }

    let sweeper = TimeoutSweeper::start(
        Arc::clone(&directory),
        config.sweep_interval(),
        config.session_timeout_ms,
    );

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");

    sweeper.stop().await;
    directory.shutdown().await;

    Ok(())
}
