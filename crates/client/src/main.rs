mod client;
mod config;
mod input;
mod session;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use client::GameClient;
use config::ClientConfig;
use salvo::net::{ConnectionConfig, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Headless salvo client")]
struct Args {
    #[arg(
        short,
        long,
        help = "Server address to connect to (e.g., 127.0.0.1:27016)"
    )]
    server: Option<String>,

    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 30, help = "Input messages per second")]
    input_rate: u32,

    #[arg(short, long, help = "Disconnect after this many seconds")]
    duration: Option<u64>,

    #[arg(short, long, help = "Chat line to send once connected")]
    chat: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = args
        .server
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));

    let connection_config = ConnectionConfig {
        player_name: args.name,
        ..Default::default()
    };
    let config = ClientConfig {
        tick_rate: args.tick_rate,
        input_rate: args.input_rate,
        run_for: args.duration.map(Duration::from_secs),
    };

    let mut client = GameClient::connect(&server, connection_config, config)
        .with_context(|| format!("failed to connect to {}", server))?;
    if let Some(text) = args.chat {
        client.say_when_connected(&text);
    }

    client.run()
}
