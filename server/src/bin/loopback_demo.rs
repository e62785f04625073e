//! Runs the whole join flow in one process over loopback: accounts, room
//! discovery, join tickets, UDP handshake, transform relay and shutdown.

use clap::Parser;
use client::network::{RoomClient, ServerEvent};
use server::clock::{Clock, MonotonicClock};
use server::config::DispatchPolicy;
use server::control::{
    Account, ControlPlane, GetRoomInfosResult, JoinRoomResult, SignInResult, SignUpResult,
};
use server::directory::RoomDirectory;
use server::game::{TransformHandler, MIN_TRANSFORM_DELAY_MS};
use server::room::{Room, RoomConfig};
use server::store::{MemoryDatabase, PlayerSnapshot};
use shared::{ConnectResult, DisconnectReason, PlayerTransform};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of players joining the room
    #[arg(short = 'n', long, default_value = "3")]
    players: usize,

    /// Transform updates each player sends
    #[arg(short = 'u', long, default_value = "5")]
    updates: usize,

    /// Use the bounded queue instead of shedding
    #[arg(long)]
    queued: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let policy = if args.queued {
        DispatchPolicy::Queue { capacity: 256 }
    } else {
        DispatchPolicy::Shed { max_tasks: 64 }
    };

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let directory = Arc::new(RoomDirectory::new());
    let room = Room::new(
        RoomConfig {
            id: 1,
            name: "Demo Room".to_string(),
            max_players: args.players.max(1),
            policy,
        },
        Arc::new(MemoryDatabase::<i64, PlayerSnapshot>::new()),
        clock,
        Arc::new(TransformHandler::new()),
    )?;
    let room_addr = room.start("127.0.0.1:0".parse()?).await?;
    directory.register(room)?;
    println!("Room 1 listening on {}", room_addr);

    let control = ControlPlane::new(
        Arc::new(MemoryDatabase::<String, Account>::new()),
        Arc::new(MemoryDatabase::<String, i64>::new()),
        Arc::clone(&directory),
    );

    let mut clients = Vec::with_capacity(args.players);
    for index in 0..args.players {
        let username = format!("player_{}", index);
        if control.sign_up(&username, "passhash", "player@demo.local") != SignUpResult::Success {
            return Err(format!("sign up failed for {}", username).into());
        }

        let (result, access_token) = control.sign_in(&username, "passhash");
        let access_token = match (result, access_token) {
            (SignInResult::Success, Some(token)) => token,
            (other, _) => return Err(format!("sign in failed: {:?}", other).into()),
        };

        let (result, infos) = control.get_room_infos(&username, &access_token);
        if result != GetRoomInfosResult::Success {
            return Err(format!("room listing failed: {:?}", result).into());
        }
        println!("{} sees {} room(s)", username, infos.len());

        let (result, grant) = control.join_room(&username, &access_token, 1);
        let (info, connect_token) = match (result, grant) {
            (JoinRoomResult::Success, Some(grant)) => grant,
            (other, _) => return Err(format!("join failed: {:?}", other).into()),
        };
        let player_id = control
            .account(&username)
            .map(|account| account.id)
            .ok_or("account vanished")?;
        println!(
            "{} joined {} ({}/{}) as player {}",
            username, info.name, info.player_count, info.max_player_count, player_id
        );

        let mut client = RoomClient::bind(room_addr).await?;
        let result = client
            .connect(player_id, connect_token, Duration::from_secs(2))
            .await?;
        if result != ConnectResult::Success {
            return Err(format!("connect refused: {:?}", result).into());
        }
        println!("{} connected over UDP from {}", username, client.local_addr()?);
        clients.push(client);
    }

    let pacing = Duration::from_millis(MIN_TRANSFORM_DELAY_MS as u64 + 10);
    for step in 0..args.updates {
        for (index, client) in clients.iter().enumerate() {
            let transform = PlayerTransform::at(index as f32, 0.0, step as f32);
            client.send_transform(transform).await?;
        }
        sleep(pacing).await;
    }

    for (index, client) in clients.iter().enumerate() {
        let mut relayed = 0;
        while let Ok(event) = client.recv_event(Duration::from_millis(100)).await {
            if let ServerEvent::Transformed { .. } = event {
                relayed += 1;
            }
        }
        println!("player_{} received {} relayed transforms", index, relayed);
    }

    for (index, client) in clients.iter_mut().enumerate() {
        client.disconnect(DisconnectReason::Requested).await?;
        match client.recv_event(Duration::from_secs(1)).await? {
            ServerEvent::Disconnected(reason) => {
                println!("player_{} left ({:?})", index, reason)
            }
            other => println!("player_{} got {:?} instead of a disconnect", index, other),
        }
    }

    directory.shutdown().await;
    println!("Demo finished");
    Ok(())
}
