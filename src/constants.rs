use ethers::types::U256;

// Price consensus
pub const PRICE_CACHE_TTL_SECS: u64 = 30;
pub const ASSET_CONFIG_REFRESH_SECS: u64 = 300;
pub const MIN_ORACLE_CONFIDENCE: f64 = 0.8;
pub const MAX_PRICE_DEVIATION: f64 = 0.02; // 2%
pub const MIN_ORACLES_REQUIRED: usize = 2;
pub const ORACLE_QUERY_TIMEOUT_MS: u64 = 5_000;

// Per-source staleness bounds (seconds)
pub const CHAINLINK_MAX_AGE_SECS: u64 = 3_600;
pub const PYTH_MAX_AGE_SECS: u64 = 60;

// Execution
pub const MAX_CONCURRENT_EXECUTIONS: usize = 40;
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY_MS: u64 = 5_000;
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const CONFIRMATION_TIMEOUT_SECS: u64 = 60;
pub const MAX_BATCH_SIZE: usize = 40;
pub const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 30;

// Slippage ceiling (basis points)
pub const MAX_SLIPPAGE_BPS: u32 = 50;

// Gas
pub const GAS_PRICE_MULTIPLIER: f64 = 1.15;
pub const DEFAULT_GAS_LIMIT: u64 = 550_000;
pub const BATCH_GAS_LIMIT_PER_ROUTE: u64 = 350_000;
pub const MIN_PRIORITY_FEE_GWEI: u64 = 1;
pub const MAX_PRIORITY_FEE_GWEI: u64 = 50;
pub const DEFAULT_PRIORITY_FEE_GWEI: u64 = 2;
pub const FEE_HISTORY_BLOCKS: u64 = 10;

// Default oracle endpoints
pub const PYTH_HERMES_URL: &str = "https://hermes.pyth.network";
pub const BINANCE_API_URL: &str = "https://api.binance.com";
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com";

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

// Helper to format native amounts for logs
pub fn format_native_amount(wei: U256) -> String {
    let eth = wei.as_u128() as f64 / 1e18;
    format!("{:.6} ETH", eth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_conversion() {
        assert_eq!(gwei(1), U256::from(1_000_000_000u64));
        assert_eq!(gwei(50), U256::from(50_000_000_000u64));
    }

    #[test]
    fn test_native_amount_formatting() {
        let one_eth = U256::from(1_000_000_000_000_000_000u64);
        assert!(format_native_amount(one_eth).contains("1.000000"));

        let half_eth = U256::from(500_000_000_000_000_000u64);
        assert!(format_native_amount(half_eth).contains("0.500000"));
    }
}
