use std::collections::HashMap;
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    abi::Abi,
    contract::Contract,
    providers::{Http, Provider},
    types::{Address, U256},
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::AssetPriceConfig;
use super::source::{OraclePrice, OracleSource};

const POOL_ABI: &str = r#"[
    {
        "inputs": [],
        "name": "slot0",
        "outputs": [
            {"internalType": "uint160", "name": "sqrtPriceX96", "type": "uint160"},
            {"internalType": "int24", "name": "tick", "type": "int24"},
            {"internalType": "uint16", "name": "observationIndex", "type": "uint16"},
            {"internalType": "uint16", "name": "observationCardinality", "type": "uint16"},
            {"internalType": "uint16", "name": "observationCardinalityNext", "type": "uint16"},
            {"internalType": "uint8", "name": "feeProtocol", "type": "uint8"},
            {"internalType": "bool", "name": "unlocked", "type": "bool"}
        ],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "token0",
        "outputs": [{"internalType": "address", "name": "", "type": "address"}],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "token1",
        "outputs": [{"internalType": "address", "name": "", "type": "address"}],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

const ERC20_ABI: &str = r#"[
    {
        "inputs": [],
        "name": "decimals",
        "outputs": [{"internalType": "uint8", "name": "", "type": "uint8"}],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [],
        "name": "symbol",
        "outputs": [{"internalType": "string", "name": "", "type": "string"}],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

/// 풀 토큰 메타데이터 (최초 조회 후 캐시)
#[derive(Debug, Clone)]
struct PoolMeta {
    token0_symbol: String,
    token1_symbol: String,
    decimals0: u8,
    decimals1: u8,
}

/// Uniswap V3 풀 현물가 오라클 소스
///
/// 자산 설정의 `uniswap_pool_address` 풀에서 slot0을 읽어 현물 가격을 계산한다.
/// 풀의 반대쪽 토큰은 USD 스테이블이어야 한다.
pub struct UniswapPoolSource {
    providers: HashMap<u64, Arc<Provider<Http>>>,
    pool_meta_cache: RwLock<HashMap<Address, PoolMeta>>,
}

impl UniswapPoolSource {
    pub fn new(providers: HashMap<u64, Arc<Provider<Http>>>) -> Self {
        Self {
            providers,
            pool_meta_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn pool_meta(
        &self,
        provider: Arc<Provider<Http>>,
        pool_address: Address,
    ) -> Result<PoolMeta> {
        if let Some(meta) = self.pool_meta_cache.read().await.get(&pool_address) {
            return Ok(meta.clone());
        }

        let pool_abi: Abi = serde_json::from_str(POOL_ABI)?;
        let pool = Contract::new(pool_address, pool_abi, provider.clone());

        let token0: Address = pool.method("token0", ())?.call().await?;
        let token1: Address = pool.method("token1", ())?.call().await?;

        let erc20_abi: Abi = serde_json::from_str(ERC20_ABI)?;
        let t0 = Contract::new(token0, erc20_abi.clone(), provider.clone());
        let t1 = Contract::new(token1, erc20_abi, provider);

        let meta = PoolMeta {
            token0_symbol: t0.method::<_, String>("symbol", ())?.call().await?,
            token1_symbol: t1.method::<_, String>("symbol", ())?.call().await?,
            decimals0: t0.method::<_, u8>("decimals", ())?.call().await?,
            decimals1: t1.method::<_, u8>("decimals", ())?.call().await?,
        };

        self.pool_meta_cache
            .write()
            .await
            .insert(pool_address, meta.clone());
        Ok(meta)
    }

    /// sqrtPriceX96 → token0 1개당 token1 가격 (소수점 보정 포함)
    ///
    /// sqrtPriceX96은 uint160이라 u128을 넘을 수 있으므로 limb 단위로 변환한다.
    fn price_from_sqrt(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
        let sqrt_price = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
        let raw = sqrt_price * sqrt_price;
        raw * 10f64.powi(decimals0 as i32 - decimals1 as i32)
    }
}

/// U256 → f64 근사 변환
fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

#[async_trait]
impl OracleSource for UniswapPoolSource {
    fn name(&self) -> &'static str {
        "uniswap"
    }

    fn supports(&self, asset: &AssetPriceConfig) -> bool {
        asset.uniswap_pool_address.is_some() && self.providers.contains_key(&asset.chain_id)
    }

    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice> {
        let pool_address = asset
            .uniswap_pool_address
            .ok_or_else(|| anyhow::anyhow!("no uniswap pool for {}", asset.symbol))?;
        let provider = self
            .providers
            .get(&asset.chain_id)
            .ok_or_else(|| anyhow::anyhow!("no provider for chain {}", asset.chain_id))?
            .clone();

        let meta = self.pool_meta(provider.clone(), pool_address).await?;

        let pool_abi: Abi = serde_json::from_str(POOL_ABI)?;
        let pool = Contract::new(pool_address, pool_abi, provider);
        let (sqrt_price_x96, _, _, _, _, _, _): (U256, i32, u16, u16, u16, u8, bool) =
            pool.method("slot0", ())?.call().await?;

        if sqrt_price_x96.is_zero() {
            return Err(anyhow::anyhow!("pool {:?} has zero sqrt price", pool_address));
        }

        let price0_in_1 =
            Self::price_from_sqrt(sqrt_price_x96, meta.decimals0, meta.decimals1);

        // 자산이 token0이면 그대로, token1이면 역수
        let symbol = asset.symbol.to_uppercase();
        let price = if meta.token0_symbol.to_uppercase() == symbol {
            price0_in_1
        } else if meta.token1_symbol.to_uppercase() == symbol {
            1.0 / price0_in_1
        } else {
            return Err(anyhow::anyhow!(
                "pool {:?} holds {}/{}, not {}",
                pool_address,
                meta.token0_symbol,
                meta.token1_symbol,
                asset.symbol
            ));
        };

        if !price.is_finite() || price <= 0.0 {
            return Err(anyhow::anyhow!("invalid pool price for {}", asset.symbol));
        }

        debug!("Uniswap pool price for {}: ${:.4}", asset.symbol, price);

        let reading = OraclePrice::new(self.name(), Decimal::try_from(price)?, 0.85);
        reading.validate()?;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_sqrt_same_decimals() {
        // sqrtPriceX96 = 2^96 → 가격 1.0
        let sqrt = U256::from(2u128.pow(96));
        let price = UniswapPoolSource::price_from_sqrt(sqrt, 18, 18);
        assert!((price - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_from_sqrt_beyond_u128() {
        // uint160 범위의 sqrtPriceX96은 u128을 넘어도 패닉 없이 변환돼야 한다
        let sqrt = U256::from(2u8).pow(U256::from(130u8));
        let price = UniswapPoolSource::price_from_sqrt(sqrt, 18, 18);
        let expected = 2f64.powi(68);
        assert!((price - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_price_from_sqrt_decimal_adjustment() {
        // 같은 sqrt 값이라도 소수점 차이(18 vs 6)를 보정해야 한다
        let sqrt = U256::from(2u128.pow(96));
        let price = UniswapPoolSource::price_from_sqrt(sqrt, 18, 6);
        assert!((price - 1e12).abs() / 1e12 < 1e-9);
    }
}
