use clap::Parser;
use client::network::{RoomClient, ServerEvent};
use client::ClientError;
use log::{info, warn};
use rand::Rng;
use shared::{ConnectResult, DisconnectReason, PlayerTransform, Token};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Player id granted by the control plane
    #[arg(short = 'p', long)]
    player_id: i64,

    /// Base64 connect token granted by the control plane
    #[arg(short = 't', long)]
    token: String,

    /// Transform updates per second
    #[arg(short = 'r', long, default_value = "20")]
    tick_rate: u32,

    /// How long to stay connected, in seconds
    #[arg(short = 'd', long, default_value = "10")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let token = Token::from_base64(&args.token).ok_or("token must be 32 bytes of base64")?;

    let mut client = RoomClient::bind(args.server).await?;
    info!("Connecting to {} as player {}", args.server, args.player_id);

    let result = client
        .connect(args.player_id, token, Duration::from_secs(3))
        .await?;
    if result != ConnectResult::Success {
        return Err(ClientError::Rejected(result).into());
    }

    let mut ticker = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stop = sleep(Duration::from_secs(args.duration));
    tokio::pin!(stop);

    let mut rng = rand::thread_rng();
    let mut transform = PlayerTransform::default();
    let mut kicked = false;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                // Random walk on the ground plane
                transform.x += rng.gen_range(-0.5..0.5);
                transform.z += rng.gen_range(-0.5..0.5);
                client.send_transform(transform).await?;
            }
            event = client.recv_event(Duration::from_secs(3600)) => match event {
                Ok(ServerEvent::Transformed { player_id, transform }) => {
                    info!("Player {} at ({:.2}, {:.2}, {:.2})", player_id, transform.x, transform.y, transform.z);
                }
                Ok(ServerEvent::Disconnected(reason)) => {
                    warn!("Disconnected by room: {:?}", reason);
                    kicked = true;
                    break;
                }
                Ok(other) => info!("Room event: {:?}", other),
                Err(e) => warn!("Bad datagram from room: {}", e),
            }
        }
    }

    if !kicked {
        client.disconnect(DisconnectReason::Requested).await?;
        match client.recv_event(Duration::from_secs(1)).await {
            Ok(ServerEvent::Disconnected(reason)) => info!("Left room ({:?})", reason),
            Ok(other) => info!("Left room, last event: {:?}", other),
            Err(e) => warn!("No disconnect confirmation: {}", e),
        }
    }

    Ok(())
}
