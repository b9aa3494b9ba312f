use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::types::{ArbitrageRoute, AssetPriceConfig, RouteFilter, TransactionResult};
use super::{AssetConfigStore, ResultSink, RouteStore};

/// 인메모리 경로 저장소
///
/// 테스트와 mock 모드에서 실제 시트 기반 저장소를 대신한다.
/// fetch는 큐 소비 방식: 필터에 맞는 경로는 꺼내고, 나머지는 남긴다.
pub struct InMemoryRouteStore {
    routes: Mutex<Vec<ArbitrageRoute>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, route: ArbitrageRoute) {
        self.routes.lock().await.push(route);
    }

    pub async fn len(&self) -> usize {
        self.routes.lock().await.len()
    }

    fn matches(route: &ArbitrageRoute, filter: &RouteFilter) -> bool {
        if let Some(min_profit) = filter.min_profit_usd {
            if route.expected_profit_usd < min_profit {
                return false;
            }
        }
        if let Some(true) = filter.is_profitable {
            if route.expected_profit_usd < route.min_profit_usd {
                return false;
            }
        }
        if let Some(strategy) = filter.strategy {
            if route.strategy != strategy {
                return false;
            }
        }
        true
    }
}

impl Default for InMemoryRouteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn fetch_routes(&self, filter: &RouteFilter) -> Result<Vec<ArbitrageRoute>> {
        let mut routes = self.routes.lock().await;
        let mut matched = Vec::new();
        let mut kept = Vec::new();

        for route in routes.drain(..) {
            if Self::matches(&route, filter) {
                matched.push(route);
            } else {
                kept.push(route);
            }
        }
        *routes = kept;

        if !matched.is_empty() {
            debug!("Route store returned {} candidate routes", matched.len());
        }
        Ok(matched)
    }
}

/// 인메모리 자산 설정 저장소
pub struct InMemoryAssetConfigStore {
    configs: RwLock<Vec<AssetPriceConfig>>,
}

impl InMemoryAssetConfigStore {
    pub fn new(configs: Vec<AssetPriceConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    pub async fn replace(&self, configs: Vec<AssetPriceConfig>) {
        *self.configs.write().await = configs;
    }
}

#[async_trait]
impl AssetConfigStore for InMemoryAssetConfigStore {
    async fn load_asset_configs(&self) -> Result<Vec<AssetPriceConfig>> {
        Ok(self.configs.read().await.clone())
    }
}

/// 인메모리 결과 싱크
pub struct InMemoryResultSink {
    results: Mutex<Vec<TransactionResult>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
        }
    }

    pub async fn results(&self) -> Vec<TransactionResult> {
        self.results.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }
}

impl Default for InMemoryResultSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn append(&self, result: &TransactionResult) -> Result<()> {
        self.results.lock().await.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};
    use rust_decimal::Decimal;

    use crate::types::{FlashLoanParams, StrategyKind};

    fn route(id: &str, profit: Decimal) -> ArbitrageRoute {
        ArbitrageRoute {
            id: id.to_string(),
            chain_id: 1,
            strategy: StrategyKind::DexArbitrage,
            flash_loan: FlashLoanParams {
                provider: "aave_v3".to_string(),
                token: Address::zero(),
                amount: U256::from(1_000u64),
            },
            steps: vec![],
            symbols: vec!["WETH".to_string()],
            expected_profit_usd: profit,
            min_profit_usd: Decimal::from(5),
            min_profit_wei: U256::zero(),
            max_slippage_bps: 30,
            deadline: u64::MAX,
            profit_token: Address::zero(),
        }
    }

    #[tokio::test]
    async fn test_route_store_filters_and_consumes() {
        let store = InMemoryRouteStore::new();
        store.push(route("big", Decimal::from(50))).await;
        store.push(route("small", Decimal::from(2))).await;

        let filter = RouteFilter {
            min_profit_usd: Some(Decimal::from(10)),
            ..Default::default()
        };
        let matched = store.fetch_routes(&filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "big");

        // 매칭되지 않은 경로는 남고, 꺼낸 경로는 소비된다
        assert_eq!(store.len().await, 1);
        let again = store.fetch_routes(&filter).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_profitable_filter_uses_route_minimum() {
        let store = InMemoryRouteStore::new();
        let mut below_min = route("below", Decimal::from(3));
        below_min.min_profit_usd = Decimal::from(10);
        store.push(below_min).await;

        let filter = RouteFilter {
            is_profitable: Some(true),
            ..Default::default()
        };
        assert!(store.fetch_routes(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_sink_appends() {
        let sink = InMemoryResultSink::new();
        let r = route("r1", Decimal::from(20));
        let err = crate::types::EngineError::RouteExpired {
            route_id: r.id.clone(),
            deadline: 0,
        };
        let result = TransactionResult::failure(
            &r,
            Address::zero(),
            crate::types::ExecutionStatus::Validating,
            &err,
            0,
            5,
        );
        sink.append(&result).await.unwrap();
        sink.append(&result).await.unwrap();
        assert_eq!(sink.len().await, 2);
    }
}
