use std::time::Duration;

/// PEPE token contract on Ethereum mainnet.
pub const PEPE_ADDRESS: &str = "0x6982508145454Ce325dDbE47a25d4ec3d2311933";

#[derive(Debug, Clone)]
pub struct Config {
    /// Websocket URL of the RPC node that provides the blockchain data
    pub rpc_url: String,

    /// Token whose transfers are displayed
    pub token: TokenConfig,

    /// Number of most recent blocks loaded by the historical backfill
    pub history_blocks: u64,

    /// Exact sender filter applied by the node to the backfill and the subscription
    pub query_sender: Option<String>,

    /// Exact recipient filter applied by the node to the backfill and the subscription
    pub query_recipient: Option<String>,

    /// How often the shared clock and therefore every displayed age is refreshed
    pub tick_interval: Duration,

    /// Retry policy for chain queries and block timestamp lookups
    pub retry: RetryPolicy,

    /// Delay before a dropped live subscription is re-established
    pub resubscribe_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rpc_url: String::new(),
            token: TokenConfig::default(),
            history_blocks: 100,
            query_sender: None,
            query_recipient: None,
            tick_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            resubscribe_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub address: String,
    pub symbol: String,
    /// Raw values are divided by 10^decimals before display
    pub decimals: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            address: PEPE_ADDRESS.to_string(),
            symbol: "PEPE".to_string(),
            decimals: 18,
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given zero based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct MarketCapConfig {
    /// CoinMarketCap `cryptocurrency/info` endpoint
    pub endpoint: String,
    pub slug: String,
    /// CoinMarketCap id of the asset inside the response `data` object
    pub asset_id: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for MarketCapConfig {
    fn default() -> Self {
        MarketCapConfig {
            endpoint: "https://pro-api.coinmarketcap.com/v2/cryptocurrency/info".to_string(),
            slug: "pepe".to_string(),
            asset_id: "24478".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}
