//! Market capitalisation of the tracked token, in millions of US dollars.
//!
//! Values come from the CoinMarketCap `cryptocurrency/info` endpoint and are
//! rendered with grouped thousands and at most three fraction digits.

use config::MarketCapConfig;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use types::group_digits;

const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";
const FRACTION_DIGITS: u32 = 3;

/// Body returned to clients. `data` is `"error"` when the lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketCapResponse {
    pub data: String,
}

#[derive(Debug, Error)]
pub enum MarketCapError {
    #[error("Missing CoinMarketCap API key")]
    MissingApiKey,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("No market cap for asset {0} in response")]
    MissingValue(String),
    #[error("Market cap {0} is not representable")]
    InvalidValue(f64),
}

pub struct MarketCapClient {
    http: reqwest::Client,
    config: MarketCapConfig,
}

impl MarketCapClient {
    pub fn new(config: MarketCapConfig) -> Result<Self, MarketCapError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(MarketCapClient { http, config })
    }

    /// Self reported market cap in millions, formatted for display.
    pub async fn fetch_millions(&self) -> Result<String, MarketCapError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(MarketCapError::MissingApiKey)?;

        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&[("slug", self.config.slug.as_str())])
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MarketCapError::Status(response.status()));
        }

        let body: Value = response.json().await?;
        let market_cap = extract_market_cap(&body, &self.config.asset_id)?;
        debug!(market_cap, "Fetched market cap");
        format_millions(market_cap)
    }

    /// Never fails: any error is logged and reported as `"error"`.
    pub async fn market_cap(&self) -> MarketCapResponse {
        match self.fetch_millions().await {
            Ok(data) => MarketCapResponse { data },
            Err(e) => {
                warn!("Market cap lookup failed: {}", e);
                MarketCapResponse {
                    data: "error".to_string(),
                }
            }
        }
    }
}

pub fn extract_market_cap(body: &Value, asset_id: &str) -> Result<f64, MarketCapError> {
    body.get("data")
        .and_then(|data| data.get(asset_id))
        .and_then(|asset| asset.get("self_reported_market_cap"))
        .and_then(Value::as_f64)
        .ok_or_else(|| MarketCapError::MissingValue(asset_id.to_string()))
}

/// `1_234_567_890.5` becomes `"1,234.568"`.
pub fn format_millions(market_cap: f64) -> Result<String, MarketCapError> {
    let millions = Decimal::from_f64(market_cap)
        .ok_or(MarketCapError::InvalidValue(market_cap))?
        / Decimal::from(1_000_000);
    let rounded = millions.round_dp(FRACTION_DIGITS).normalize();

    let text = rounded.abs().to_string();
    let (integer, fraction) = match text.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (text.as_str(), None),
    };
    let mut out = String::new();
    if rounded.is_sign_negative() && !rounded.is_zero() {
        out.push('-');
    }
    out.push_str(&group_digits(integer));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    Ok(out)
}
