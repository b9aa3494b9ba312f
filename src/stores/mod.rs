pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ArbitrageRoute, AssetPriceConfig, RouteFilter, TransactionResult};

pub use memory::{InMemoryAssetConfigStore, InMemoryResultSink, InMemoryRouteStore};

/// 외부 경로 저장소 (읽기 전용)
///
/// 경로 탐색 엔진이 채워 넣은 후보 경로를 필터 조건으로 조회한다.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// 필터에 맞는 후보 경로를 가져온다. 반환된 경로는 저장소에서 소비된다.
    async fn fetch_routes(&self, filter: &RouteFilter) -> Result<Vec<ArbitrageRoute>>;
}

/// 자산 오라클 설정 저장소 (읽기 전용)
#[async_trait]
pub trait AssetConfigStore: Send + Sync {
    /// (chain_id, symbol)별 오라클 설정 전체 테이블
    async fn load_asset_configs(&self) -> Result<Vec<AssetPriceConfig>>;
}

/// 실행 결과 기록 싱크 (쓰기 전용)
///
/// 모든 경로 실행은 성공/실패와 무관하게 정확히 한 건의 결과를 남긴다.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, result: &TransactionResult) -> Result<()>;
}
