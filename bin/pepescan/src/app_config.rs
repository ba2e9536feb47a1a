use config::{Config, MarketCapConfig, TokenConfig};
use types::Network;

use crate::Args;

impl Args {
    pub fn load_config(&self) -> Config {
        let mut config = Config {
            rpc_url: Network::default().url(),
            token: TokenConfig {
                address: self.token_address.clone(),
                symbol: self.token_symbol.clone(),
                decimals: self.token_decimals,
            },
            history_blocks: self.history_blocks.max(1),
            query_sender: non_empty(&self.from),
            query_recipient: non_empty(&self.to),
            ..Config::default()
        };

        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }

        if let Some(network) = &self.network {
            config.rpc_url = network.url();
        }

        config
    }

    pub fn market_cap_config(&self) -> MarketCapConfig {
        MarketCapConfig {
            api_key: non_empty(&self.cmc_api_key),
            ..MarketCapConfig::default()
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
