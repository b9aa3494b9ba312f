use std::sync::Arc;

use ethers::types::U256;
use tracing::warn;

use crate::blockchain::ChainClient;
use crate::config::ChainConfig;
use crate::constants::{gwei, MAX_PRIORITY_FEE_GWEI, MIN_PRIORITY_FEE_GWEI};
use crate::types::{FeeData, GasEstimate, GasTier};

/// EIP-1559 가스 견적기
///
/// fee history의 50퍼센타일 priority fee 중앙값을 티어 배율로 조정하고,
/// max fee는 (base × 2 + priority)에 안전 배율을 곱해 잡는다.
/// RPC가 죽어 있으면 체인 설정의 고정 gwei 값으로 폴백한다.
pub struct GasEstimator {
    client: Arc<ChainClient>,
    chain: ChainConfig,
    multiplier: f64,
}

impl GasEstimator {
    pub fn new(client: Arc<ChainClient>, chain: ChainConfig, multiplier: f64) -> Self {
        Self {
            client,
            chain,
            multiplier,
        }
    }

    /// 현재 체인 수수료 스냅샷 (Standard 티어 기준)
    pub async fn fee_data(&self) -> FeeData {
        let (base_fee, priority_fee) = self.current_fees(GasTier::Standard).await;
        let max_fee = scale(base_fee * 2 + priority_fee, self.multiplier);
        FeeData {
            gas_price: base_fee + priority_fee,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            last_base_fee_per_gas: base_fee,
        }
    }

    pub async fn estimate(&self, tier: GasTier, gas_limit: u64) -> GasEstimate {
        let (base_fee, priority_fee) = self.current_fees(tier).await;
        let max_fee = scale(base_fee * 2 + priority_fee, self.multiplier);
        GasEstimate {
            gas_limit,
            gas_price: base_fee + priority_fee,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            total_cost: U256::from(gas_limit) * max_fee,
        }
    }

    async fn current_fees(&self, tier: GasTier) -> (U256, U256) {
        let base_fee = match self.client.latest_base_fee().await {
            Ok(fee) => fee,
            Err(e) => {
                warn!(
                    "⛽ Base fee query failed on chain {}, using fallback {} gwei: {}",
                    self.chain.chain_id, self.chain.fallback_gas_price_gwei, e
                );
                gwei(self.chain.fallback_gas_price_gwei)
            }
        };

        let raw_priority = match self.client.recent_priority_fees().await {
            Ok(fees) => median_fee(&fees)
                .unwrap_or_else(|| gwei(self.chain.fallback_priority_fee_gwei)),
            Err(e) => {
                warn!(
                    "⛽ Fee history query failed on chain {}, using fallback {} gwei: {}",
                    self.chain.chain_id, self.chain.fallback_priority_fee_gwei, e
                );
                gwei(self.chain.fallback_priority_fee_gwei)
            }
        };

        (base_fee, apply_tier(raw_priority, tier))
    }
}

/// 정렬 후 중앙값. 짝수 개면 가운데 두 값의 평균.
pub fn median_fee(fees: &[U256]) -> Option<U256> {
    if fees.is_empty() {
        return None;
    }
    let mut sorted = fees.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}

/// 티어 배율 적용 후 [1, 50] gwei로 클램프
pub fn apply_tier(priority_fee: U256, tier: GasTier) -> U256 {
    let scaled = priority_fee * U256::from(tier.priority_multiplier()) / U256::from(100u64);
    scaled
        .max(gwei(MIN_PRIORITY_FEE_GWEI))
        .min(gwei(MAX_PRIORITY_FEE_GWEI))
}

fn scale(value: U256, multiplier: f64) -> U256 {
    let pct = (multiplier * 100.0).round() as u64;
    value * U256::from(pct) / U256::from(100u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::constants::GAS_PRICE_MULTIPLIER;

    #[test]
    fn test_median_fee() {
        assert_eq!(median_fee(&[]), None);
        assert_eq!(median_fee(&[gwei(3)]), Some(gwei(3)));
        assert_eq!(
            median_fee(&[gwei(5), gwei(1), gwei(3)]),
            Some(gwei(3))
        );
        // 짝수 개는 가운데 두 값 평균
        assert_eq!(
            median_fee(&[gwei(2), gwei(4)]),
            Some(gwei(3))
        );
    }

    #[test]
    fn test_tier_multipliers_and_clamp() {
        let two = gwei(2);
        assert_eq!(apply_tier(two, GasTier::Safe), gwei(2));
        assert_eq!(
            apply_tier(two, GasTier::Standard),
            U256::from(2_200_000_000u64)
        );
        assert_eq!(
            apply_tier(two, GasTier::Fast),
            U256::from(2_500_000_000u64)
        );

        // 하한 1 gwei, 상한 50 gwei
        assert_eq!(apply_tier(U256::from(1u64), GasTier::Safe), gwei(1));
        assert_eq!(apply_tier(gwei(100), GasTier::Fast), gwei(50));
    }

    #[tokio::test]
    async fn test_mock_estimate() {
        std::env::set_var("API_MODE", "mock");

        let config = Config::default();
        let chain = config.chains[0].clone();
        let client = Arc::new(
            crate::blockchain::ChainClient::connect(&chain, None)
                .await
                .unwrap(),
        );
        let estimator = GasEstimator::new(client, chain, GAS_PRICE_MULTIPLIER);

        // mock: base 15 gwei, priority 2 gwei
        let estimate = estimator.estimate(GasTier::Safe, 550_000).await;
        assert_eq!(estimate.max_priority_fee_per_gas, gwei(2));
        // (15*2 + 2) * 1.15 = 36.8 gwei
        assert_eq!(
            estimate.max_fee_per_gas,
            U256::from(36_800_000_000u64)
        );
        assert_eq!(
            estimate.total_cost,
            U256::from(550_000u64) * U256::from(36_800_000_000u64)
        );
    }
}
