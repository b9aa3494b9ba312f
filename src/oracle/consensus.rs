use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::ConsensusConfig;
use crate::stores::AssetConfigStore;
use crate::types::{AssetPriceConfig, EngineError, EngineResult};
use super::source::{OraclePrice, OracleSource};

/// 합의 결과. (chain_id, symbol)별로 캐시된다.
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub chain_id: u64,
    /// 수집된 소스 가격의 중간값
    pub price: Decimal,
    /// "consensus" (2개 이상) 또는 단일 소스 이름
    pub source: String,
    pub confidence: f64,
    /// 모집단 표준편차 / 평균. 소스가 2개 미만이면 0.
    pub deviation: f64,
    pub sources_used: usize,
    /// 응답 소스가 없어 만료된 캐시 값을 돌려준 경우
    pub degraded: bool,
    /// 편차가 자산의 max_deviation을 넘은 soft rejection 표식
    pub deviation_exceeded: bool,
    pub timestamp: u64,
}

impl PriceUpdate {
    pub fn age_ms(&self, now_unix_ms: u64) -> u64 {
        now_unix_ms.saturating_sub(self.timestamp * 1_000)
    }
}

/// get_price 호출별 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceOptions {
    pub min_confidence: Option<f64>,
    pub max_age_ms: Option<u64>,
}

/// 다중 소스 가격 합의 서비스
///
/// 자산 설정이 허용하는 모든 오라클 소스에 동시에 질의하고,
/// 중간값/편차/신뢰도로 축약한 결과를 TTL 캐시에 보관한다.
pub struct PriceConsensusService {
    sources: Vec<Arc<dyn OracleSource>>,
    config_store: Arc<dyn AssetConfigStore>,
    settings: ConsensusConfig,
    asset_configs: Arc<RwLock<HashMap<(u64, String), AssetPriceConfig>>>,
    cache: Arc<RwLock<HashMap<(u64, String), PriceUpdate>>>,
    update_tx: broadcast::Sender<PriceUpdate>,
    is_running: Arc<AtomicBool>,
}

impl PriceConsensusService {
    pub fn new(
        sources: Vec<Arc<dyn OracleSource>>,
        config_store: Arc<dyn AssetConfigStore>,
        settings: ConsensusConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            sources,
            config_store,
            settings,
            asset_configs: Arc::new(RwLock::new(HashMap::new())),
            cache: Arc::new(RwLock::new(HashMap::new())),
            update_tx,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 가격 갱신 알림 구독 (메트릭/로깅 옵저버용)
    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.update_tx.subscribe()
    }

    /// 설정 저장소에서 자산 테이블을 다시 읽는다
    pub async fn refresh_configs(&self) -> anyhow::Result<usize> {
        let rows = self.config_store.load_asset_configs().await?;
        let mut table = HashMap::with_capacity(rows.len());
        for row in rows {
            table.insert((row.chain_id, row.symbol.clone()), row);
        }
        let count = table.len();
        *self.asset_configs.write().await = table;
        debug!("Asset config table refreshed: {} rows", count);
        Ok(count)
    }

    /// 주기적 설정 갱신 태스크 시작
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        self.refresh_configs().await?;
        self.is_running.store(true, Ordering::SeqCst);

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                service.settings.config_refresh_secs.max(1),
            ));
            interval.tick().await; // 첫 tick은 즉시 발화하므로 건너뛴다
            while service.is_running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = service.refresh_configs().await {
                    warn!("⚠️ Asset config refresh failed: {}", e);
                }
            }
        });

        info!(
            "✅ Price consensus service started ({} sources, ttl {}s)",
            self.sources.len(),
            self.settings.cache_ttl_secs
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// 합의 가격 조회
    ///
    /// 캐시가 신선하면 그대로 반환하고, 아니면 모든 해당 소스에 병렬 질의한다.
    /// 응답 소스가 없으면 만료된 캐시로 degraded 폴백한다.
    /// min_confidence 옵션은 캐시 히트와 degraded 폴백을 포함한 모든
    /// 반환 경로에 적용된다.
    pub async fn get_price(
        &self,
        symbol: &str,
        chain_id: u64,
        options: PriceOptions,
    ) -> EngineResult<PriceUpdate> {
        let key = (chain_id, symbol.to_string());
        let asset = {
            let configs = self.asset_configs.read().await;
            configs
                .get(&key)
                .cloned()
                .ok_or_else(|| EngineError::AssetNotConfigured {
                    symbol: symbol.to_string(),
                    chain_id,
                })?
        };

        if !asset.is_active {
            return Err(EngineError::AssetDisabled {
                symbol: symbol.to_string(),
                chain_id,
            });
        }

        let max_age_ms = options
            .max_age_ms
            .unwrap_or(self.settings.cache_ttl_secs * 1_000);
        let now_ms = Utc::now().timestamp_millis() as u64;

        if let Some(cached) = self.cache.read().await.get(&key) {
            if cached.age_ms(now_ms) < max_age_ms {
                return enforce_min_confidence(cached.clone(), options.min_confidence);
            }
        }

        // 오라클 식별자가 하나도 없는 자산은 질의하지 않는다
        if !asset.has_any_oracle() {
            let stale = self.stale_fallback(&key, &asset).await?;
            return enforce_min_confidence(stale, options.min_confidence);
        }

        let readings = self.collect_readings(&asset).await;
        if readings.is_empty() {
            let stale = self.stale_fallback(&key, &asset).await?;
            return enforce_min_confidence(stale, options.min_confidence);
        }

        let update = self.reduce(&asset, readings);
        if update.deviation_exceeded {
            warn!(
                "⚠️ Price deviation for {} on chain {}: {:.4} > {:.4} (soft rejection)",
                symbol, chain_id, update.deviation, asset.max_deviation
            );
        }

        self.cache.write().await.insert(key, update.clone());
        let _ = self.update_tx.send(update.clone());

        enforce_min_confidence(update, options.min_confidence)
    }

    /// 해당 자산을 지원하는 모든 소스에 동시 질의
    async fn collect_readings(&self, asset: &AssetPriceConfig) -> Vec<OraclePrice> {
        let per_source_timeout = Duration::from_millis(self.settings.query_timeout_ms);

        let queries = self
            .sources
            .iter()
            .filter(|s| s.supports(asset))
            .map(|source| {
                let source = Arc::clone(source);
                let asset = asset.clone();
                async move {
                    match timeout(per_source_timeout, source.fetch_price(&asset)).await {
                        Ok(Ok(price)) => Some(price),
                        Ok(Err(e)) => {
                            debug!("Source {} rejected {}: {}", source.name(), asset.symbol, e);
                            None
                        }
                        Err(_) => {
                            debug!(
                                "Source {} timed out for {} after {}ms",
                                source.name(),
                                asset.symbol,
                                per_source_timeout.as_millis()
                            );
                            None
                        }
                    }
                }
            })
            .collect::<Vec<_>>();

        join_all(queries).await.into_iter().flatten().collect()
    }

    /// 수집된 판독값을 하나의 합의 결과로 축약
    fn reduce(&self, asset: &AssetPriceConfig, readings: Vec<OraclePrice>) -> PriceUpdate {
        let prices: Vec<Decimal> = readings.iter().map(|r| r.price).collect();
        let price = median(&prices);
        let deviation = relative_deviation(&prices);
        let source_confidences: Vec<f64> = readings.iter().map(|r| r.confidence).collect();
        let confidence = self.blend_confidence(readings.len(), deviation, asset, &source_confidences);

        let source = if readings.len() > 1 {
            "consensus".to_string()
        } else {
            readings[0].source.clone()
        };

        PriceUpdate {
            symbol: asset.symbol.clone(),
            chain_id: asset.chain_id,
            price,
            source,
            confidence,
            deviation,
            sources_used: readings.len(),
            degraded: false,
            deviation_exceeded: deviation > asset.max_deviation,
            timestamp: Utc::now().timestamp() as u64,
        }
    }

    /// 신뢰도 = 가중 혼합(소스 수 / 편차 페널티 / 소스 자체 신뢰도)
    ///
    /// 소스 수 계수는 min_oracles + 1개부터 1.0으로 포화한다.
    /// 가중치는 설정값이며 합으로 정규화해서 쓴다.
    fn blend_confidence(
        &self,
        source_count: usize,
        deviation: f64,
        asset: &AssetPriceConfig,
        source_confidences: &[f64],
    ) -> f64 {
        let w_sources = self.settings.weight_sources.max(0.0);
        let w_deviation = self.settings.weight_deviation.max(0.0);
        let w_source_conf = self.settings.weight_source_confidence.max(0.0);
        let total = w_sources + w_deviation + w_source_conf;
        if total <= 0.0 {
            return 0.0;
        }

        let saturation = self.settings.min_oracles.saturating_add(1).max(1) as f64;
        let source_factor = (source_count as f64 / saturation).min(1.0);

        let max_deviation = if asset.max_deviation > 0.0 {
            asset.max_deviation
        } else {
            self.settings.max_deviation
        };
        let deviation_factor = (1.0 - deviation / max_deviation).clamp(0.0, 1.0);

        let mean_source_conf = if source_confidences.is_empty() {
            0.0
        } else {
            source_confidences.iter().sum::<f64>() / source_confidences.len() as f64
        };

        let blended = (w_sources * source_factor
            + w_deviation * deviation_factor
            + w_source_conf * mean_source_conf)
            / total;
        blended.clamp(0.0, 1.0)
    }

    /// 응답 소스가 없을 때: 만료된 캐시가 있으면 degraded로 반환
    async fn stale_fallback(
        &self,
        key: &(u64, String),
        asset: &AssetPriceConfig,
    ) -> EngineResult<PriceUpdate> {
        if let Some(stale) = self.cache.read().await.get(key) {
            warn!(
                "⚠️ No oracle responses for {} on chain {}, serving stale price (age {}s)",
                asset.symbol,
                asset.chain_id,
                Utc::now().timestamp() as u64 - stale.timestamp
            );
            let mut degraded = stale.clone();
            degraded.degraded = true;
            return Ok(degraded);
        }

        Err(EngineError::NoPriceAvailable {
            symbol: asset.symbol.clone(),
            chain_id: asset.chain_id,
        })
    }
}

fn enforce_min_confidence(
    update: PriceUpdate,
    required: Option<f64>,
) -> EngineResult<PriceUpdate> {
    if let Some(required) = required {
        if update.confidence < required {
            return Err(EngineError::PriceValidationFailed {
                symbol: update.symbol.clone(),
                confidence: update.confidence,
                required,
            });
        }
    }
    Ok(update)
}

/// 중간값: 짝수 개수면 가운데 두 값의 평균
pub fn median(prices: &[Decimal]) -> Decimal {
    let mut sorted = prices.to_vec();
    sorted.sort();

    let n = sorted.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / Decimal::from(2)
    } else {
        sorted[n / 2]
    }
}

/// 모집단 표준편차 / 평균. 2개 미만이면 0으로 정의된다.
pub fn relative_deviation(prices: &[Decimal]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }

    use rust_decimal::prelude::ToPrimitive;
    let values: Vec<f64> = prices.iter().map(|p| p.to_f64().unwrap_or(0.0)).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean
}
