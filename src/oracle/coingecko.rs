use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::AssetPriceConfig;
use super::source::{OraclePrice, OracleSource};

/// CoinGecko simple-price 오라클 소스
///
/// 무료 API라 지연과 갱신 주기가 길어 신뢰도를 가장 낮게 둔다.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    endpoint: String,
}

impl CoinGeckoSource {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl OracleSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    fn supports(&self, asset: &AssetPriceConfig) -> bool {
        asset.coingecko_id.is_some()
    }

    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice> {
        let coin_id = asset
            .coingecko_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no coingecko id for {}", asset.symbol))?;

        let url = format!("{}/api/v3/simple/price", self.endpoint);
        let body: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&url)
            .query(&[("ids", coin_id), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let usd = body
            .get(coin_id)
            .and_then(|m| m.get("usd"))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no usd price in coingecko response for {}", coin_id))?;

        if usd <= 0.0 {
            return Err(anyhow::anyhow!("non-positive coingecko price for {}", coin_id));
        }

        debug!("CoinGecko price for {}: ${}", asset.symbol, usd);

        let reading = OraclePrice::new(self.name(), Decimal::try_from(usd)?, 0.8);
        reading.validate()?;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_requires_coin_id() {
        let source = CoinGeckoSource::new("https://api.coingecko.com".to_string());
        let mut asset = AssetPriceConfig {
            symbol: "WETH".to_string(),
            chain_id: 1,
            chainlink_address: None,
            uniswap_pool_address: None,
            pyth_price_id: None,
            binance_symbol: None,
            coingecko_id: None,
            is_active: true,
            priority: 2,
            min_confidence: 0.8,
            max_deviation: 0.02,
        };
        assert!(!source.supports(&asset));

        asset.coingecko_id = Some("ethereum".to_string());
        assert!(source.supports(&asset));
    }

    #[test]
    fn test_response_shape_parsing() {
        let body = r#"{"ethereum":{"usd":2834.53}}"#;
        let parsed: HashMap<String, HashMap<String, f64>> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["ethereum"]["usd"], 2834.53);
    }
}
