use anyhow::Context;
use config::Config;
use contracts::{parse_address, TokenContract};
use erc20::Erc20;
use provider::ChainSource;
use std::sync::Arc;
use ws_provider::WsProvider;

pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn ChainSource>> {
    let provider = WsProvider::connect(config.rpc_url.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", config.rpc_url))?;
    Ok(Arc::new(provider))
}

pub fn token_contract(config: &Config) -> anyhow::Result<Arc<dyn TokenContract>> {
    let address = parse_address(&config.token.address)
        .with_context(|| format!("Invalid token address {}", config.token.address))?;
    Ok(Arc::new(Erc20::new(
        address,
        config.token.symbol.clone(),
        config.token.decimals,
    )))
}
