use std::str::FromStr;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::types::AssetPriceConfig;
use super::source::{OraclePrice, OracleSource};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: String,
    volume: String,
}

/// Binance 현물 시세 오라클 소스
pub struct BinanceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl BinanceSource {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl OracleSource for BinanceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn supports(&self, asset: &AssetPriceConfig) -> bool {
        asset.binance_symbol.is_some()
    }

    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice> {
        let pair = asset
            .binance_symbol
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no binance symbol for {}", asset.symbol))?;

        let url = format!("{}/api/v3/ticker/24hr", self.endpoint);
        let ticker: Ticker24h = self
            .client
            .get(&url)
            .query(&[("symbol", pair)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = Decimal::from_str(&ticker.last_price)?;
        if price <= Decimal::ZERO {
            return Err(anyhow::anyhow!("non-positive binance price for {}", pair));
        }

        debug!("Binance price for {} ({}): ${}", asset.symbol, ticker.symbol, price);

        let reading = OraclePrice::new(self.name(), price, 0.9);
        reading.validate()?;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_parsing() {
        let body = r#"{"symbol":"ETHUSDT","lastPrice":"2834.53000000","volume":"123456.7"}"#;
        let ticker: Ticker24h = serde_json::from_str(body).unwrap();
        assert_eq!(ticker.symbol, "ETHUSDT");
        assert_eq!(Decimal::from_str(&ticker.last_price).unwrap(), Decimal::new(283453, 2));
    }
}
