mod logging;
use logging::init_logging;
mod app_config;
mod app_provider;

mod serve;
use serve::ServeArgs;

mod tail;
use tail::TailArgs;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use dotenvy::dotenv;
use feed::{FeedHandle, SystemClock};
use std::sync::Arc;
use tracing::info;
use types::Network;

/// Largest power of ten that fits a 256-bit token amount.
const MAX_TOKEN_DECIMALS: i64 = 77;

/// Commands for the pepescan application
#[derive(Debug, Parser)]
#[clap(name = "pepescan", author, version, about)]
pub(crate) struct Args {
    /// Websocket URL of the RPC node that provides the blockchain data
    #[clap(short, long, env)]
    pub rpc_url: Option<String>,

    #[clap(short, long, env, value_enum)]
    /// Network to read transfers from (e.g. mainnet, sepolia)
    /// If flag is set - rpc_url is not required
    pub network: Option<Network>,

    #[clap(long, env, default_value = config::PEPE_ADDRESS)]
    /// Address of the ERC-20 token contract
    pub token_address: String,

    #[clap(long, env, default_value = "PEPE")]
    pub token_symbol: String,

    #[clap(long, env, default_value = "18", value_parser = clap::value_parser!(u32).range(0..=MAX_TOKEN_DECIMALS))]
    /// Decimals used to scale raw transfer values
    pub token_decimals: u32,

    #[clap(long, env, default_value = "100")]
    /// Number of most recent blocks loaded on startup
    pub history_blocks: u64,

    #[clap(long, env = "QUERY_FROM")]
    /// Only load and follow transfers sent by this address
    pub from: Option<String>,

    #[clap(long, env = "QUERY_TO")]
    /// Only load and follow transfers received by this address
    pub to: Option<String>,

    #[clap(long, env = "COIN_MARKET_CAP_KEY", hide_env_values = true)]
    /// CoinMarketCap API key used by the market cap endpoint
    pub cmc_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
#[command(subcommand_help_heading = "PepeScan live transfer explorer")]
pub enum Commands {
    /// Serve the transfer table and its HTTP API
    Serve(ServeArgs),

    /// Print the transfer table to the terminal as it changes
    Tail(TailArgs),

    /// Generate shell completions
    Completions {
        #[clap(value_enum)]
        shell: Shell,
    },
}

impl Args {
    pub(crate) async fn exec(&self) -> anyhow::Result<()> {
        if let Commands::Completions { shell } = &self.command {
            let mut command = Args::command();
            let name = command.get_name().to_string();
            generate(*shell, &mut command, name, &mut std::io::stdout());
            return Ok(());
        }

        let config = self.load_config();
        let source = app_provider::connect(&config).await?;
        let contract = app_provider::token_contract(&config)?;
        let feed = FeedHandle::start(&config, source, contract, Arc::new(SystemClock))?;
        info!(token = %config.token.symbol, "Following transfers");

        let result = match &self.command {
            Commands::Serve(serve_args) => {
                serve_args
                    .exec(feed.clone(), self.market_cap_config())
                    .await
            }
            Commands::Tail(tail_args) => tail_args.exec(feed.clone()).await,
            Commands::Completions { .. } => Ok(()),
        };
        feed.shutdown().await;
        result
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let cmd = Args::parse();
    cmd.exec().await
}
