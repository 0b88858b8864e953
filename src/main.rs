#![allow(dead_code)]

mod bot;
mod calc;
mod coins;
mod config;
mod exchange;
mod orders;
mod positions;
mod prices;
mod ticker;
mod trading;
mod types;
mod wallet;

use crate::bot::{watch_prices, Bot};
use crate::coins::Coins;
use crate::config::{load_api_keys, load_config, UserConfig};
use crate::exchange::bybit::Bybit;
use crate::exchange::stream::{run_private_stream, run_ticker_stream};
use crate::exchange::{Exchange, SendSyncError};
use crate::wallet::poll_wallet;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

const EVENT_BUFFER: usize = 1024;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the bot configuration
    #[clap(long, global = true, default_value = "config.hjson")]
    config: PathBuf,
    /// Path to the API keys file
    #[clap(long, global = true, default_value = "api-keys.json")]
    api_keys: PathBuf,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the live trading bot
    Live {
        #[clap(long)]
        user: String,
    },
    /// Streams tickers and logs price snapshots
    Prices {
        /// Snapshot interval, defaults to the configured one
        #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
    /// Writes the tradeable symbols as JSON
    Coins {
        #[clap(long, default_value = "symbols.json")]
        output: PathBuf,
    },
}

fn init_exchange(user_config: &UserConfig) -> Result<Box<dyn Exchange>, SendSyncError> {
    match user_config.exchange.as_str() {
        "bybit" => Ok(Box::new(Bybit::new(user_config))),
        _ => Err(format!("Unsupported exchange: {}", user_config.exchange).into()),
    }
}

async fn run_live(cli: &Cli, user: &str) -> Result<(), SendSyncError> {
    let config = load_config(&cli.config)?;
    let api_keys = load_api_keys(&cli.api_keys)?;
    let user_config = api_keys
        .get(user)
        .ok_or("User not found in api-keys.json")?
        .clone();
    let exchange = init_exchange(&user_config)?;
    let wallet_interval = Duration::from_millis(config.live.wallet_poll_ms);

    let mut bot = Bot::new(config, exchange.clone_box());
    bot.init().await?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(run_ticker_stream(bot.symbols().to_vec(), tx.clone()));
    tokio::spawn(run_private_stream(user_config, tx.clone()));
    tokio::spawn(poll_wallet(exchange, wallet_interval, tx));

    bot.run(rx).await
}

async fn run_prices(cli: &Cli, interval_ms: Option<u64>) -> Result<(), SendSyncError> {
    let live = load_config(&cli.config)?.live;
    let coins = Coins::fetch(&Bybit::public(), &live).await?;
    let symbols = coins.symbols();
    let interval = Duration::from_millis(interval_ms.unwrap_or(live.snapshot_interval_ms));

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(run_ticker_stream(symbols.clone(), tx));
    watch_prices(symbols, live, interval, rx).await
}

async fn export_coins(cli: &Cli, output: &Path) -> anyhow::Result<()> {
    let live = load_config(&cli.config).map_err(anyhow::Error::msg)?.live;
    let coins = Coins::fetch(&Bybit::public(), &live)
        .await
        .map_err(anyhow::Error::msg)?;
    coins.write_symbols(output)
}

#[tokio::main]
async fn main() -> Result<(), SendSyncError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Live { user } => run_live(&cli, user).await?,
        Commands::Prices { interval_ms } => run_prices(&cli, *interval_ms).await?,
        Commands::Coins { output } => export_coins(&cli, output).await?,
    }

    Ok(())
}
