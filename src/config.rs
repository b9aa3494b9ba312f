use serde::{Deserialize, Serialize};
use anyhow::Result;
use ethers::types::H160;

use crate::constants;
use crate::types::AssetPriceConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub block_time: u64,
    #[serde(default)]
    pub arbitrage_contract: Option<H160>,
    /// Batch entry point; falls back to single-route submission when absent
    #[serde(default)]
    pub batch_contract: Option<H160>,
    /// Fallback gas price (gwei) when fee history is unreachable
    #[serde(default = "default_fallback_gas_gwei")]
    pub fallback_gas_price_gwei: u64,
    #[serde(default = "default_fallback_priority_gwei")]
    pub fallback_priority_fee_gwei: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub address: H160,
    /// 개인키를 담은 환경변수 이름 (키 원문은 설정 파일에 두지 않음)
    pub private_key_env: String,
    pub chain_id: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_config_refresh_secs")]
    pub config_refresh_secs: u64, // 자산 설정 갱신 간격 (초)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_deviation")]
    pub max_deviation: f64,
    #[serde(default = "default_min_oracles")]
    pub min_oracles: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64, // 오라클 호출 타임아웃 (밀리초)
    /// Confidence blend weights: source count / deviation / per-source confidence
    #[serde(default = "default_weight_sources")]
    pub weight_sources: f64,
    #[serde(default = "default_weight_deviation")]
    pub weight_deviation: f64,
    #[serde(default = "default_weight_source_confidence")]
    pub weight_source_confidence: f64,
    #[serde(default = "default_pyth_endpoint")]
    pub pyth_endpoint: String,
    #[serde(default = "default_binance_endpoint")]
    pub binance_endpoint: String,
    #[serde(default = "default_coingecko_endpoint")]
    pub coingecko_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64, // 재시도 기본 지연 (지수 백오프의 밑)
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32, // 슬리피지 허용 상한 (basis points)
    #[serde(default = "default_gas_multiplier")]
    pub gas_price_multiplier: f64,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Build and validate but never broadcast
    #[serde(default)]
    pub simulation_mode: bool,
    #[serde(default = "default_batch_enabled")]
    pub batch_enabled: bool,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize, // 동시 실행 상한
    /// "least_loaded" or "round_robin"
    #[serde(default = "default_assignment")]
    pub assignment: String,
    #[serde(default = "default_route_poll_secs")]
    pub route_poll_interval_secs: u64,
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: f64,
    #[serde(default)]
    pub auto_scale: bool,
    #[serde(default = "default_scale_up_queue_depth")]
    pub scale_up_queue_depth: usize,
    #[serde(default = "default_max_concurrent_ceiling")]
    pub max_concurrent_ceiling: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_status_interval_secs")]
    pub status_report_interval_secs: u64,
    #[serde(default = "default_api_enabled")]
    pub api_enabled: bool,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub wallets: Vec<WalletConfig>,
    pub consensus: ConsensusConfig,
    pub execution: ExecutionConfig,
    pub orchestrator: OrchestratorConfig,
    pub monitoring: MonitoringConfig,
    /// Seed rows for the in-memory asset config store (mock mode / tests)
    #[serde(default)]
    pub assets: Vec<AssetPriceConfig>,
}

fn default_fallback_gas_gwei() -> u64 {
    30
}

fn default_fallback_priority_gwei() -> u64 {
    constants::DEFAULT_PRIORITY_FEE_GWEI
}

fn default_cache_ttl_secs() -> u64 {
    constants::PRICE_CACHE_TTL_SECS
}

fn default_config_refresh_secs() -> u64 {
    constants::ASSET_CONFIG_REFRESH_SECS
}

fn default_min_confidence() -> f64 {
    constants::MIN_ORACLE_CONFIDENCE
}

fn default_max_deviation() -> f64 {
    constants::MAX_PRICE_DEVIATION
}

fn default_min_oracles() -> usize {
    constants::MIN_ORACLES_REQUIRED
}

fn default_query_timeout_ms() -> u64 {
    constants::ORACLE_QUERY_TIMEOUT_MS
}

fn default_weight_sources() -> f64 {
    0.3
}

fn default_weight_deviation() -> f64 {
    0.4
}

fn default_weight_source_confidence() -> f64 {
    0.3
}

fn default_pyth_endpoint() -> String {
    constants::PYTH_HERMES_URL.to_string()
}

fn default_binance_endpoint() -> String {
    constants::BINANCE_API_URL.to_string()
}

fn default_coingecko_endpoint() -> String {
    constants::COINGECKO_API_URL.to_string()
}

fn default_max_retries() -> u32 {
    constants::MAX_RETRY_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    constants::RETRY_DELAY_MS
}

fn default_breaker_threshold() -> u32 {
    constants::CIRCUIT_BREAKER_THRESHOLD
}

fn default_confirmation_timeout_secs() -> u64 {
    constants::CONFIRMATION_TIMEOUT_SECS
}

fn default_max_slippage_bps() -> u32 {
    constants::MAX_SLIPPAGE_BPS
}

fn default_gas_multiplier() -> f64 {
    constants::GAS_PRICE_MULTIPLIER
}

fn default_gas_limit() -> u64 {
    constants::DEFAULT_GAS_LIMIT
}

fn default_batch_enabled() -> bool {
    true
}

fn default_max_batch_size() -> usize {
    constants::MAX_BATCH_SIZE
}

fn default_max_concurrent() -> usize {
    constants::MAX_CONCURRENT_EXECUTIONS
}

fn default_assignment() -> String {
    "least_loaded".to_string()
}

fn default_route_poll_secs() -> u64 {
    10
}

fn default_min_profit_usd() -> f64 {
    5.0
}

fn default_scale_up_queue_depth() -> usize {
    20
}

fn default_max_concurrent_ceiling() -> usize {
    100
}

fn default_shutdown_timeout_secs() -> u64 {
    constants::SHUTDOWN_DRAIN_TIMEOUT_SECS
}

fn default_status_interval_secs() -> u64 {
    60
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8700
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 정합성 검사: 지갑이 참조하는 체인이 실제로 정의되어 있어야 한다
    pub fn validate(&self) -> Result<()> {
        for wallet in &self.wallets {
            if !self.chains.iter().any(|c| c.chain_id == wallet.chain_id) {
                anyhow::bail!(
                    "wallet {:?} references unknown chain {}",
                    wallet.address,
                    wallet.chain_id
                );
            }
        }
        if self.orchestrator.max_concurrent == 0 {
            anyhow::bail!("orchestrator.max_concurrent must be at least 1");
        }
        if self.orchestrator.max_concurrent_ceiling < self.orchestrator.max_concurrent {
            anyhow::bail!("orchestrator.max_concurrent_ceiling below max_concurrent");
        }
        Ok(())
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn default() -> Self {
        Self {
            chains: vec![ChainConfig {
                chain_id: 1,
                name: "mainnet".to_string(),
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
                block_time: 12,
                arbitrage_contract: None,
                batch_contract: None,
                fallback_gas_price_gwei: 30,
                fallback_priority_fee_gwei: constants::DEFAULT_PRIORITY_FEE_GWEI,
            }],
            wallets: Vec::new(),
            consensus: ConsensusConfig {
                cache_ttl_secs: constants::PRICE_CACHE_TTL_SECS,
                config_refresh_secs: constants::ASSET_CONFIG_REFRESH_SECS,
                min_confidence: constants::MIN_ORACLE_CONFIDENCE,
                max_deviation: constants::MAX_PRICE_DEVIATION,
                min_oracles: constants::MIN_ORACLES_REQUIRED,
                query_timeout_ms: constants::ORACLE_QUERY_TIMEOUT_MS,
                weight_sources: 0.3,
                weight_deviation: 0.4,
                weight_source_confidence: 0.3,
                pyth_endpoint: constants::PYTH_HERMES_URL.to_string(),
                binance_endpoint: constants::BINANCE_API_URL.to_string(),
                coingecko_endpoint: constants::COINGECKO_API_URL.to_string(),
            },
            execution: ExecutionConfig {
                max_retries: constants::MAX_RETRY_ATTEMPTS,
                retry_delay_ms: constants::RETRY_DELAY_MS,
                circuit_breaker_threshold: constants::CIRCUIT_BREAKER_THRESHOLD,
                confirmation_timeout_secs: constants::CONFIRMATION_TIMEOUT_SECS,
                max_slippage_bps: constants::MAX_SLIPPAGE_BPS,
                gas_price_multiplier: constants::GAS_PRICE_MULTIPLIER,
                default_gas_limit: constants::DEFAULT_GAS_LIMIT,
                simulation_mode: false,
                batch_enabled: true,
                max_batch_size: constants::MAX_BATCH_SIZE,
            },
            orchestrator: OrchestratorConfig {
                max_concurrent: constants::MAX_CONCURRENT_EXECUTIONS,
                assignment: "least_loaded".to_string(),
                route_poll_interval_secs: 10,
                min_profit_usd: 5.0,
                auto_scale: false,
                scale_up_queue_depth: 20,
                max_concurrent_ceiling: 100,
                shutdown_timeout_secs: constants::SHUTDOWN_DRAIN_TIMEOUT_SECS,
            },
            monitoring: MonitoringConfig {
                status_report_interval_secs: 60,
                api_enabled: true,
                api_host: "127.0.0.1".to_string(),
                api_port: 8700,
            },
            assets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.circuit_breaker_threshold, 5);
        assert_eq!(config.orchestrator.max_concurrent, 40);
        assert_eq!(config.consensus.cache_ttl_secs, 30);
    }

    #[test]
    fn test_wallet_chain_reference_checked() {
        let mut config = Config::default();
        config.wallets.push(WalletConfig {
            address: ethers::types::H160::zero(),
            private_key_env: "ARBX_PK_0".to_string(),
            chain_id: 999,
            enabled: true,
        });
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_toml() {
        let toml_str = r#"
            [[chains]]
            chain_id = 1
            name = "mainnet"
            rpc_url = "http://localhost:8545"
            block_time = 12

            [[wallets]]
            address = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e"
            private_key_env = "ARBX_PK_0"
            chain_id = 1
            enabled = true

            [consensus]
            cache_ttl_secs = 15

            [execution]
            max_retries = 2

            [orchestrator]
            max_concurrent = 8

            [monitoring]
            api_enabled = false
        "#;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, toml_str).await.unwrap();

        let config = Config::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.consensus.cache_ttl_secs, 15);
        // untouched fields fall back to defaults
        assert_eq!(config.consensus.min_oracles, 2);
        assert_eq!(config.execution.max_retries, 2);
        assert_eq!(config.execution.retry_delay_ms, 5_000);
        assert_eq!(config.orchestrator.max_concurrent, 8);
        assert!(!config.monitoring.api_enabled);
        assert_eq!(config.wallets.len(), 1);
    }
}
