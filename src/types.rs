use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use ethers::types::{Address, Bytes, H256, U256};
use chrono::{DateTime, Utc};

/// Strategy tag carried by routes, used for route-store filtering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    DexArbitrage,
    Triangular,
    CrossDex,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::DexArbitrage => write!(f, "DexArbitrage"),
            StrategyKind::Triangular => write!(f, "Triangular"),
            StrategyKind::CrossDex => write!(f, "CrossDex"),
        }
    }
}

/// One swap hop inside a route, forwarded verbatim to the arbitrage contract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapStep {
    pub dex: u8,
    pub token_in: Address,
    pub token_out: Address,
    pub calldata: Bytes,
    pub min_out: U256,
}

/// Flash-loan parameters for a route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlashLoanParams {
    pub provider: String,
    pub token: Address,
    pub amount: U256,
}

/// Candidate route supplied by the external route store, read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitrageRoute {
    pub id: String,
    pub chain_id: u64,
    pub strategy: StrategyKind,
    pub flash_loan: FlashLoanParams,
    pub steps: Vec<SwapStep>,
    /// Symbols whose consensus prices must validate before submission
    pub symbols: Vec<String>,
    pub expected_profit_usd: Decimal,
    pub min_profit_usd: Decimal,
    /// Minimum acceptable profit in wei, passed to the contract
    pub min_profit_wei: U256,
    pub max_slippage_bps: u32,
    /// Absolute unix-seconds deadline after which the route must not be submitted
    pub deadline: u64,
    pub profit_token: Address,
}

impl ArbitrageRoute {
    pub fn is_expired(&self, now_unix: u64) -> bool {
        now_unix >= self.deadline
    }

    pub fn seconds_to_deadline(&self, now_unix: u64) -> i64 {
        self.deadline as i64 - now_unix as i64
    }
}

/// Route-store query filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteFilter {
    pub is_active: Option<bool>,
    pub is_profitable: Option<bool>,
    pub min_profit_usd: Option<Decimal>,
    pub strategy: Option<StrategyKind>,
}

/// Per-(chain, symbol) oracle configuration row, refreshed from the config store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetPriceConfig {
    pub symbol: String,
    pub chain_id: u64,
    pub chainlink_address: Option<Address>,
    pub uniswap_pool_address: Option<Address>,
    pub pyth_price_id: Option<String>,
    pub binance_symbol: Option<String>,
    pub coingecko_id: Option<String>,
    pub is_active: bool,
    /// 1 = critical asset
    pub priority: u8,
    pub min_confidence: f64,
    pub max_deviation: f64,
}

impl AssetPriceConfig {
    /// Assets with no oracle identifiers are never queried
    pub fn has_any_oracle(&self) -> bool {
        self.chainlink_address.is_some()
            || self.uniswap_pool_address.is_some()
            || self.pyth_price_id.is_some()
            || self.binance_symbol.is_some()
            || self.coingecko_id.is_some()
    }
}

/// Per-attempt execution state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Validating,
    Submitting,
    PendingConfirmation,
    Confirmed,
    Reverted,
    TimedOut,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Validating => write!(f, "VALIDATING"),
            ExecutionStatus::Submitting => write!(f, "SUBMITTING"),
            ExecutionStatus::PendingConfirmation => write!(f, "PENDING_CONFIRMATION"),
            ExecutionStatus::Confirmed => write!(f, "CONFIRMED"),
            ExecutionStatus::Reverted => write!(f, "REVERTED"),
            ExecutionStatus::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Gas price tier requested from the estimator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GasTier {
    Safe,
    Standard,
    Fast,
}

impl GasTier {
    /// Multiplier applied to the estimated priority fee
    pub fn priority_multiplier(&self) -> u64 {
        match self {
            GasTier::Safe => 100,
            GasTier::Standard => 110,
            GasTier::Fast => 125,
        }
    }
}

/// Gas estimation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub gas_price: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub total_cost: U256,
}

/// Fee data snapshot from the chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeData {
    pub gas_price: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub last_base_fee_per_gas: U256,
}

/// Final record of one route execution, appended to the result sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionResult {
    pub id: String,
    pub route_id: String,
    pub wallet: Address,
    pub chain_id: u64,
    pub status: ExecutionStatus,
    pub success: bool,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<U256>,
    pub realized_profit_usd: Option<Decimal>,
    pub expected_profit_usd: Decimal,
    pub execution_ms: u64,
    pub retry_count: u32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionResult {
    pub fn failure(
        route: &ArbitrageRoute,
        wallet: Address,
        status: ExecutionStatus,
        error: &EngineError,
        retry_count: u32,
        execution_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            route_id: route.id.clone(),
            wallet,
            chain_id: route.chain_id,
            status,
            success: false,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            effective_gas_price: None,
            realized_profit_usd: None,
            expected_profit_usd: route.expected_profit_usd,
            execution_ms,
            retry_count,
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
            notes: None,
            timestamp: Utc::now(),
        }
    }
}

/// Error types
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Asset not configured: {symbol} on chain {chain_id}")]
    AssetNotConfigured { symbol: String, chain_id: u64 },

    #[error("Asset disabled: {symbol} on chain {chain_id}")]
    AssetDisabled { symbol: String, chain_id: u64 },

    #[error("Route {route_id} expired at {deadline}")]
    RouteExpired { route_id: String, deadline: u64 },

    #[error("Slippage {requested_bps} bps exceeds ceiling {max_bps} bps")]
    SlippageTooHigh { requested_bps: u32, max_bps: u32 },

    #[error("Price validation failed for {symbol}: confidence {confidence:.3} < required {required:.3}")]
    PriceValidationFailed {
        symbol: String,
        confidence: f64,
        required: f64,
    },

    #[error("Insufficient gas balance on {wallet:?}: have {balance}, need {required}")]
    InsufficientGasBalance {
        wallet: Address,
        balance: U256,
        required: U256,
    },

    #[error("RPC timeout: {0}")]
    RpcTimeout(String),

    #[error("Nonce conflict on {wallet:?} at nonce {nonce}")]
    NonceConflict { wallet: Address, nonce: u64 },

    #[error("No price available for {symbol} on chain {chain_id}")]
    NoPriceAvailable { symbol: String, chain_id: u64 },

    #[error("Transaction reverted: {reason}")]
    TransactionReverted { reason: String },

    #[error("Circuit breaker open for wallet {wallet:?} ({failure_count} failures)")]
    CircuitBreakerOpen { wallet: Address, failure_count: u32 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Transient failures are retried with backoff; everything else fails the route
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::RpcTimeout(_)
                | EngineError::NonceConflict { .. }
                | EngineError::NoPriceAvailable { .. }
                | EngineError::Network(_)
        )
    }

    /// Short code recorded in result-sink rows
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AssetNotConfigured { .. } => "ASSET_NOT_CONFIGURED",
            EngineError::AssetDisabled { .. } => "ASSET_DISABLED",
            EngineError::RouteExpired { .. } => "ROUTE_EXPIRED",
            EngineError::SlippageTooHigh { .. } => "SLIPPAGE_TOO_HIGH",
            EngineError::PriceValidationFailed { .. } => "PRICE_VALIDATION_FAILED",
            EngineError::InsufficientGasBalance { .. } => "INSUFFICIENT_GAS_BALANCE",
            EngineError::RpcTimeout(_) => "RPC_TIMEOUT",
            EngineError::NonceConflict { .. } => "NONCE_CONFLICT",
            EngineError::NoPriceAvailable { .. } => "NO_PRICE_AVAILABLE",
            EngineError::TransactionReverted { .. } => "TRANSACTION_REVERTED",
            EngineError::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            EngineError::Network(_) => "NETWORK_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_route(deadline: u64) -> ArbitrageRoute {
        ArbitrageRoute {
            id: "route-1".to_string(),
            chain_id: 1,
            strategy: StrategyKind::DexArbitrage,
            flash_loan: FlashLoanParams {
                provider: "aave_v3".to_string(),
                token: Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap(),
                amount: U256::from(10_000_000_000_000_000_000u128),
            },
            steps: vec![],
            symbols: vec!["WETH".to_string(), "USDC".to_string()],
            expected_profit_usd: Decimal::new(2500, 2),
            min_profit_usd: Decimal::new(1000, 2),
            min_profit_wei: U256::from(5_000_000_000_000_000u64),
            max_slippage_bps: 30,
            deadline,
            profit_token: Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap(),
        }
    }

    #[test]
    fn test_route_expiry() {
        let route = sample_route(1_000);
        assert!(!route.is_expired(999));
        assert!(route.is_expired(1_000));
        assert!(route.is_expired(1_001));
        assert_eq!(route.seconds_to_deadline(900), 100);
        assert_eq!(route.seconds_to_deadline(1_100), -100);
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::RpcTimeout("read timeout".into()).is_transient());
        assert!(EngineError::NonceConflict {
            wallet: Address::zero(),
            nonce: 7
        }
        .is_transient());
        assert!(EngineError::NoPriceAvailable {
            symbol: "WETH".into(),
            chain_id: 1
        }
        .is_transient());

        assert!(!EngineError::RouteExpired {
            route_id: "r".into(),
            deadline: 0
        }
        .is_transient());
        assert!(!EngineError::TransactionReverted {
            reason: "slippage".into()
        }
        .is_transient());
        assert!(!EngineError::CircuitBreakerOpen {
            wallet: Address::zero(),
            failure_count: 5
        }
        .is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::RouteExpired {
                route_id: "r".into(),
                deadline: 0
            }
            .code(),
            "ROUTE_EXPIRED"
        );
        assert_eq!(
            EngineError::CircuitBreakerOpen {
                wallet: Address::zero(),
                failure_count: 5
            }
            .code(),
            "CIRCUIT_BREAKER_OPEN"
        );
    }

    #[test]
    fn test_failure_result_shape() {
        let route = sample_route(1_000);
        let err = EngineError::RouteExpired {
            route_id: route.id.clone(),
            deadline: route.deadline,
        };
        let result = TransactionResult::failure(
            &route,
            Address::zero(),
            ExecutionStatus::Validating,
            &err,
            0,
            12,
        );

        assert!(!result.success);
        assert_eq!(result.route_id, "route-1");
        assert_eq!(result.status, ExecutionStatus::Validating);
        assert_eq!(result.error_code.as_deref(), Some("ROUTE_EXPIRED"));
        assert!(result.tx_hash.is_none());
        assert_eq!(result.retry_count, 0);
    }

    #[test]
    fn test_asset_config_oracle_presence() {
        let mut config = AssetPriceConfig {
            symbol: "WETH".to_string(),
            chain_id: 1,
            chainlink_address: None,
            uniswap_pool_address: None,
            pyth_price_id: None,
            binance_symbol: None,
            coingecko_id: None,
            is_active: true,
            priority: 1,
            min_confidence: 0.8,
            max_deviation: 0.02,
        };
        assert!(!config.has_any_oracle());

        config.binance_symbol = Some("ETHUSDT".to_string());
        assert!(config.has_any_oracle());
    }
}
