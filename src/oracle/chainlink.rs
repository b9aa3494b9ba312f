use std::collections::HashMap;
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::{Http, Provider},
    types::{Address, I256, U256},
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;
use chrono::Utc;

use crate::constants::CHAINLINK_MAX_AGE_SECS;
use crate::types::AssetPriceConfig;
use super::source::{OraclePrice, OracleSource};

const AGGREGATOR_ABI: &str = r#"[
    {
        "inputs": [],
        "name": "latestRoundData",
        "outputs": [
            {"internalType": "uint80", "name": "roundId", "type": "uint80"},
            {"internalType": "int256", "name": "answer", "type": "int256"},
            {"internalType": "uint256", "name": "startedAt", "type": "uint256"},
            {"internalType": "uint256", "name": "updatedAt", "type": "uint256"},
            {"internalType": "uint80", "name": "answeredInRound", "type": "uint80"}
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "decimals",
        "outputs": [{"internalType": "uint8", "name": "", "type": "uint8"}],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

/// Chainlink aggregator 오라클 소스
///
/// 자산 설정의 `chainlink_address`에 등록된 피드를 조회한다.
pub struct ChainlinkSource {
    providers: HashMap<u64, Arc<Provider<Http>>>,
    decimals_cache: RwLock<HashMap<Address, u8>>,
    max_age_secs: u64,
}

impl ChainlinkSource {
    pub fn new(providers: HashMap<u64, Arc<Provider<Http>>>) -> Self {
        Self {
            providers,
            decimals_cache: RwLock::new(HashMap::new()),
            max_age_secs: CHAINLINK_MAX_AGE_SECS,
        }
    }

    /// aggregator에서 최신 라운드 데이터 조회
    async fn latest_round(
        &self,
        provider: Arc<Provider<Http>>,
        feed: Address,
    ) -> Result<(Decimal, u64)> {
        let abi: Abi = serde_json::from_str(AGGREGATOR_ABI)?;
        let contract = Contract::new(feed, abi, provider);

        let decimals = match self.decimals_cache.read().await.get(&feed) {
            Some(d) => *d,
            None => {
                let d: u8 = contract.method("decimals", ())?.call().await?;
                self.decimals_cache.write().await.insert(feed, d);
                d
            }
        };

        let (_, answer, _, updated_at, _): (u128, I256, U256, U256, u128) =
            contract.method("latestRoundData", ())?.call().await?;

        if answer <= I256::zero() {
            return Err(anyhow::anyhow!("non-positive answer from feed {:?}", feed));
        }

        let raw = answer.unsigned_abs().as_u128() as f64 / 10f64.powi(decimals as i32);
        let price = Decimal::try_from(raw)?;

        Ok((price, updated_at.as_u64()))
    }
}

#[async_trait]
impl OracleSource for ChainlinkSource {
    fn name(&self) -> &'static str {
        "chainlink"
    }

    fn supports(&self, asset: &AssetPriceConfig) -> bool {
        asset.chainlink_address.is_some() && self.providers.contains_key(&asset.chain_id)
    }

    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice> {
        let feed = asset
            .chainlink_address
            .ok_or_else(|| anyhow::anyhow!("no chainlink feed for {}", asset.symbol))?;
        let provider = self
            .providers
            .get(&asset.chain_id)
            .ok_or_else(|| anyhow::anyhow!("no provider for chain {}", asset.chain_id))?
            .clone();

        let (price, updated_at) = self.latest_round(provider, feed).await?;

        // 오래된 라운드는 소스 차원에서 거부
        let now = Utc::now().timestamp() as u64;
        if now.saturating_sub(updated_at) > self.max_age_secs {
            return Err(anyhow::anyhow!(
                "stale round for {}: updated {}s ago",
                asset.symbol,
                now.saturating_sub(updated_at)
            ));
        }

        debug!("Chainlink price for {}: ${}", asset.symbol, price);

        let mut reading = OraclePrice::new(self.name(), price, 0.95);
        reading.timestamp = updated_at;
        reading.validate()?;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(chainlink: Option<Address>) -> AssetPriceConfig {
        AssetPriceConfig {
            symbol: "WETH".to_string(),
            chain_id: 1,
            chainlink_address: chainlink,
            uniswap_pool_address: None,
            pyth_price_id: None,
            binance_symbol: None,
            coingecko_id: None,
            is_active: true,
            priority: 1,
            min_confidence: 0.8,
            max_deviation: 0.02,
        }
    }

    #[test]
    fn test_supports_requires_feed_and_provider() {
        let mut providers = HashMap::new();
        providers.insert(
            1u64,
            Arc::new(Provider::<Http>::try_from("http://localhost:8545").unwrap()),
        );
        let source = ChainlinkSource::new(providers);

        assert!(source.supports(&asset(Some(Address::zero()))));
        assert!(!source.supports(&asset(None)));

        let mut other_chain = asset(Some(Address::zero()));
        other_chain.chain_id = 42161;
        assert!(!source.supports(&other_chain));
    }
}
