mod config;
mod events;
mod server;
mod simulation;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use config::ServerConfig;
use events::ServerEvent;
use server::GameServer;

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "salvo-server")]
#[command(about = "Salvo game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = salvo::net::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 16)]
    max_players: usize,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a player is dropped")]
    timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_players: args.max_players,
        peer_timeout: Duration::from_secs(args.timeout),
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Server started on {}", server.local_addr());

    let mut last_stats = Instant::now();
    loop {
        server.tick_once();

        for event in server.drain_events() {
            log_event(event);
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            let stats = server.stats();
            info!(
                "Tick {}: {}/{} players ({} synced), {} entities, {} packets out, {} in, {} resent",
                stats.tick,
                stats.player_count,
                stats.max_players,
                stats.connected_count,
                stats.entity_count,
                stats.network_stats.packets_sent,
                stats.network_stats.packets_received,
                stats.network_stats.messages_resent
            );
        }

        thread::sleep(Duration::from_millis(1));
    }
}

fn log_event(event: ServerEvent) {
    match event {
        ServerEvent::PlayerJoined { player, addr, name } => {
            info!("{} joined from {} as {}", name, addr, player);
        }
        ServerEvent::PlayerLeft {
            player,
            name,
            reason,
        } => {
            info!("{} ({}) {}", name, player, reason.as_str());
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            warn!("Connection denied to {}: {}", addr, reason);
        }
        ServerEvent::Chat { player, text } => {
            info!("[{}] {}", player, text);
        }
        ServerEvent::Error { message } => {
            error!("{}", message);
        }
    }
}
