use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Path,
    routing::{get, post},
    Json, Router,
};
use ethers::types::Address;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::config::MonitoringConfig;
use crate::executor::CircuitBreakerState;
use crate::oracle::{PriceConsensusService, PriceOptions};
use crate::orchestrator::{ExecutionStats, ParallelOrchestrator};

/// 운영용 상태/제어 API
///
/// 헬스체크, 실행 통계, 브레이커 조회/리셋, 합의 가격 조회를 노출한다.
#[derive(Clone)]
pub struct ApiServer {
    settings: MonitoringConfig,
    orchestrator: Arc<ParallelOrchestrator>,
    consensus: Arc<PriceConsensusService>,
}

#[derive(Serialize)]
struct StatsResponse {
    is_running: bool,
    stats: ExecutionStats,
    breakers: Vec<CircuitBreakerState>,
}

#[derive(serde::Deserialize)]
struct BreakerResetPayload {
    /// 없으면 전체 지갑 리셋
    wallet: Option<String>,
}

impl ApiServer {
    pub fn new(
        settings: MonitoringConfig,
        orchestrator: Arc<ParallelOrchestrator>,
        consensus: Arc<PriceConsensusService>,
    ) -> Self {
        Self {
            settings,
            orchestrator,
            consensus,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let orch_stats = self.orchestrator.clone();
        let orch_reset = self.orchestrator.clone();
        let consensus = self.consensus.clone();

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route(
                "/api/health",
                get(|| async {
                    Json(json!({"ok": true, "version": env!("CARGO_PKG_VERSION")}))
                }),
            )
            .route("/api/stats", get(move || get_stats(orch_stats.clone())))
            .route(
                "/api/breakers/reset",
                post(move |payload| reset_breakers(orch_reset.clone(), payload)),
            )
            .route(
                "/api/price/:chain_id/:symbol",
                get(move |Path((chain_id, symbol)): Path<(u64, String)>| {
                    get_price(consensus.clone(), chain_id, symbol)
                }),
            )
            .layer(cors);

        let host = std::net::IpAddr::from_str(&self.settings.api_host)
            .unwrap_or(std::net::IpAddr::from([127, 0, 0, 1]));
        let addr = SocketAddr::from((host, self.settings.api_port));
        tracing::info!("🛰️ API server listening on http://{}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
                tracing::error!("API server error: {}", e);
            }
        });

        Ok(())
    }
}

async fn get_stats(orchestrator: Arc<ParallelOrchestrator>) -> Json<StatsResponse> {
    Json(StatsResponse {
        is_running: orchestrator.is_running(),
        stats: orchestrator.stats().await,
        breakers: orchestrator.breaker_snapshots(),
    })
}

async fn reset_breakers(
    orchestrator: Arc<ParallelOrchestrator>,
    Json(payload): Json<BreakerResetPayload>,
) -> Json<serde_json::Value> {
    let wallet = match payload.wallet.as_deref() {
        Some(raw) => match Address::from_str(raw) {
            Ok(addr) => Some(addr),
            Err(_) => return Json(json!({"ok": false, "error": "invalid wallet address"})),
        },
        None => None,
    };
    let count = orchestrator.reset_breakers(wallet);
    Json(json!({"ok": true, "reset": count}))
}

async fn get_price(
    consensus: Arc<PriceConsensusService>,
    chain_id: u64,
    symbol: String,
) -> Json<serde_json::Value> {
    match consensus
        .get_price(&symbol, chain_id, PriceOptions::default())
        .await
    {
        Ok(update) => Json(json!({"ok": true, "price": update})),
        Err(e) => Json(json!({"ok": false, "error": e.to_string(), "code": e.code()})),
    }
}
