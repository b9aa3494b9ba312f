use std::env;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use ethers::types::{Address, Bytes, H256, U256};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use tokio::time::{sleep, Duration};

use crate::types::{ArbitrageRoute, FlashLoanParams, StrategyKind, SwapStep};

/// Mock 모드 여부 (API_MODE=mock)
///
/// mock 모드에서는 체인/오라클 호출이 전부 인프로세스 시뮬레이션으로
/// 대체되어 RPC 키 없이 드라이런을 돌릴 수 있다.
pub fn is_mock_mode() -> bool {
    env::var("API_MODE").unwrap_or_default() == "mock"
}

/// Mock 체인 파라미터 (환경변수로 조정 가능)
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub chain_id: u64,
    pub base_fee: u64,
    pub priority_fee: u64,
    pub gas_used: u64,
    pub starting_nonce: u64,
    pub native_balance_eth: u64,
    pub network_latency_ms: u64,
    /// 제출 후 revert로 끝나는 비율 (기본 0 = 결정적 성공)
    pub revert_rate: f64,
    /// 초기 send_transaction 실패 주입 횟수 (기본 0)
    pub send_failures: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn get_mock_config() -> MockConfig {
    MockConfig {
        chain_id: env_parse("MOCK_CHAIN_ID", 1337),
        base_fee: env_parse("MOCK_BASE_FEE", 15_000_000_000u64),
        priority_fee: env_parse("MOCK_PRIORITY_FEE", 2_000_000_000u64),
        gas_used: env_parse("MOCK_GAS_USED", 320_000u64),
        starting_nonce: env_parse("MOCK_STARTING_NONCE", 0u64),
        native_balance_eth: env_parse("MOCK_NATIVE_BALANCE_ETH", 10u64),
        network_latency_ms: env_parse("MOCK_NETWORK_LATENCY", 10u64),
        revert_rate: env_parse("MOCK_REVERT_RATE", 0.0f64),
        send_failures: env_parse("MOCK_SEND_FAILURES", 0u64),
    }
}

/// Mock RPC 왕복 지연 시뮬레이션
pub async fn mock_latency() {
    let base = get_mock_config().network_latency_ms;
    sleep(Duration::from_millis(base + fastrand::u64(0..base.max(1)))).await;
}

static MOCK_BLOCK_NUMBER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(19_000_000));

/// 호출할 때마다 증가하는 mock 블록 번호
pub fn next_mock_block() -> u64 {
    MOCK_BLOCK_NUMBER.fetch_add(1, Ordering::SeqCst)
}

/// 무작위 mock 트랜잭션 해시
pub fn mock_tx_hash() -> H256 {
    let mut bytes = [0u8; 32];
    for b in bytes.iter_mut() {
        *b = fastrand::u8(..);
    }
    H256::from(bytes)
}

pub fn mock_native_balance() -> U256 {
    U256::from(get_mock_config().native_balance_eth) * U256::exp10(18)
}

/// 드라이런용 무작위 후보 경로 (기대 수익 $5~$50, 시한 2분)
pub fn mock_route(chain_id: u64) -> ArbitrageRoute {
    let weth = Address::repeat_byte(0xc0);
    let usdc = Address::repeat_byte(0xa0);
    let profit = Decimal::from(fastrand::u32(5..50));
    ArbitrageRoute {
        id: format!("mock-{}", uuid::Uuid::new_v4()),
        chain_id,
        strategy: StrategyKind::DexArbitrage,
        flash_loan: FlashLoanParams {
            provider: "aave_v3".to_string(),
            token: weth,
            amount: U256::exp10(18) * U256::from(fastrand::u64(1..10)),
        },
        steps: vec![
            SwapStep {
                dex: 0,
                token_in: weth,
                token_out: usdc,
                calldata: Bytes::from(vec![0x00]),
                min_out: U256::one(),
            },
            SwapStep {
                dex: 1,
                token_in: usdc,
                token_out: weth,
                calldata: Bytes::from(vec![0x01]),
                min_out: U256::one(),
            },
        ],
        symbols: vec![],
        expected_profit_usd: profit,
        min_profit_usd: Decimal::from(5),
        min_profit_wei: U256::from(1_000_000_000_000_000u64),
        max_slippage_bps: 30,
        deadline: Utc::now().timestamp() as u64 + 120,
        profit_token: weth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_block_number_monotonic() {
        let a = next_mock_block();
        let b = next_mock_block();
        assert!(b > a);
    }

    #[test]
    fn test_mock_config_defaults() {
        let config = get_mock_config();
        assert_eq!(config.base_fee, 15_000_000_000);
        assert_eq!(config.revert_rate, 0.0);
        assert_eq!(config.send_failures, 0);
    }

    #[test]
    fn test_mock_tx_hash_unique() {
        assert_ne!(mock_tx_hash(), mock_tx_hash());
    }
}
