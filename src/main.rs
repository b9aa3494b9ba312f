use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use ethers::types::H160;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbx::api::ApiServer;
use arbx::blockchain::{ChainClient, RpcPool};
use arbx::config::{Config, WalletConfig};
use arbx::executor::{NonceSequencer, RouteExecutor};
use arbx::mocks;
use arbx::oracle::{
    BinanceSource, ChainlinkSource, CoinGeckoSource, OracleSource, PriceConsensusService,
    PythSource, UniswapPoolSource,
};
use arbx::orchestrator::ParallelOrchestrator;
use arbx::stores::{
    InMemoryAssetConfigStore, InMemoryResultSink, InMemoryRouteStore, ResultSink, RouteStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("arbx")
        .version(env!("CARGO_PKG_VERSION"))
        .author("arbx team <dev@arbx.io>")
        .about("⚡ 멀티체인 아비트라지 실행 엔진")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("simulation")
                .long("simulation")
                .help("시뮬레이션 모드 (검증/견적까지만 수행, 브로드캐스트 안 함)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("mock 모드 (체인/오라클 호출 전부 인프로세스 시뮬레이션)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("mock") {
        env::set_var("API_MODE", "mock");
    }
    let _ = dotenvy::dotenv();

    let log_level = matches.get_one::<String>("log-level").unwrap();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config_path = matches.get_one::<String>("config").unwrap();
    info!("📋 설정 파일 로드 중: {}", config_path);
    let mut config = match Config::load(config_path).await {
        Ok(config) => config,
        Err(e) if mocks::is_mock_mode() => {
            warn!(
                "⚠️ 설정 파일 로드 실패({}), mock 기본 설정으로 진행: {}",
                config_path, e
            );
            Config::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("설정 파일 로드 실패: {}", config_path))
        }
    };

    if matches.get_flag("simulation") {
        warn!("🧪 시뮬레이션 모드 활성화 - 트랜잭션을 브로드캐스트하지 않습니다");
        config.execution.simulation_mode = true;
    }

    // mock 모드에서 지갑이 없으면 드라이런용 지갑을 하나 넣는다
    if mocks::is_mock_mode() && config.wallets.is_empty() {
        config.wallets.push(WalletConfig {
            address: H160::repeat_byte(0xee),
            private_key_env: "ARBX_PK_MOCK".to_string(),
            chain_id: config.chains[0].chain_id,
            enabled: true,
        });
    }
    config.validate()?;
    info!("✅ 설정 로드 완료: {}개 체인, {}개 지갑", config.chains.len(), config.wallets.len());

    // 체인별 조회용 클라이언트 풀 (논스 시딩, 오라클 Provider 공유)
    let mut pool = RpcPool::new();
    for chain in &config.chains {
        let client = ChainClient::connect(chain, None)
            .await
            .with_context(|| format!("체인 {} RPC 연결 실패", chain.chain_id))?;
        pool.add(Arc::new(client));
    }
    let pool = Arc::new(pool);

    // 오라클 소스 및 합의 서비스
    let providers = pool.providers();
    let sources: Vec<Arc<dyn OracleSource>> = vec![
        Arc::new(ChainlinkSource::new(providers.clone())),
        Arc::new(UniswapPoolSource::new(providers)),
        Arc::new(PythSource::new(config.consensus.pyth_endpoint.clone())),
        Arc::new(BinanceSource::new(config.consensus.binance_endpoint.clone())),
        Arc::new(CoinGeckoSource::new(config.consensus.coingecko_endpoint.clone())),
    ];
    let config_store = Arc::new(InMemoryAssetConfigStore::new(config.assets.clone()));
    let consensus = Arc::new(PriceConsensusService::new(
        sources,
        config_store,
        config.consensus.clone(),
    ));
    consensus.start().await?;

    let nonces = Arc::new(NonceSequencer::new(pool.clone()));
    let sink: Arc<dyn ResultSink> = Arc::new(InMemoryResultSink::new());
    let route_store = Arc::new(InMemoryRouteStore::new());

    // 지갑 워커 구성. 키는 설정이 가리키는 환경변수에서만 읽는다.
    let mut workers = Vec::new();
    for wallet in config.wallets.iter().filter(|w| w.enabled) {
        let chain = config
            .chain(wallet.chain_id)
            .cloned()
            .with_context(|| format!("지갑이 참조하는 체인 {} 없음", wallet.chain_id))?;
        let key = env::var(&wallet.private_key_env).ok();
        if key.is_none() {
            if mocks::is_mock_mode() || config.execution.simulation_mode {
                warn!(
                    "⚠️ {} 미설정, 지갑 {:?}는 서명 없이 동작 (mock/simulation)",
                    wallet.private_key_env, wallet.address
                );
            } else {
                anyhow::bail!("환경변수 {}에 지갑 키가 없습니다", wallet.private_key_env);
            }
        }
        let client = Arc::new(ChainClient::connect(&chain, key.as_deref()).await?);
        workers.push(Arc::new(RouteExecutor::new(
            chain,
            client,
            wallet.address,
            consensus.clone(),
            nonces.clone(),
            sink.clone(),
            config.execution.clone(),
        )));
    }
    info!("👛 지갑 워커 {}개 준비 완료", workers.len());

    let orchestrator = Arc::new(ParallelOrchestrator::new(
        workers,
        route_store.clone() as Arc<dyn RouteStore>,
        sink.clone(),
        config.orchestrator.clone(),
        config.execution.clone(),
    ));
    orchestrator.start();

    // mock 모드: 주기적으로 가짜 후보 경로를 저장소에 흘린다
    if mocks::is_mock_mode() {
        let store = route_store.clone();
        let chain_id = config.chains[0].chain_id;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(tokio::time::Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let route = mocks::mock_route(chain_id);
                info!("🎭 Mock route seeded: {} (${})", route.id, route.expected_profit_usd);
                store.push(route).await;
            }
        });
    }

    if config.monitoring.api_enabled {
        ApiServer::new(
            config.monitoring.clone(),
            orchestrator.clone(),
            consensus.clone(),
        )
        .start()
        .await?;
    }

    // 종료 신호: 큐 드레인 후 종료
    let orch_for_shutdown = orchestrator.clone();
    let consensus_for_shutdown = consensus.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 종료 신호 수신, 큐 드레인 중...");
                consensus_for_shutdown.stop();
                orch_for_shutdown.stop().await;
                std::process::exit(0);
            }
            Err(e) => {
                error!("❌ 신호 처리 오류: {}", e);
                std::process::exit(1);
            }
        }
    });

    info!("🎯 실행 엔진이 시작되었습니다");

    // 주기 상태 리포트
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(
        config.monitoring.status_report_interval_secs.max(1),
    ));
    loop {
        ticker.tick().await;
        let stats = orchestrator.stats().await;
        info!("📊 실행 통계:");
        info!(
            "  🔄 시도 {} / 성공 {} / 실패 {} (큐 {}건, 실행 중 {}/{})",
            stats.attempted,
            stats.succeeded,
            stats.failed,
            stats.queue_depth,
            stats.in_flight,
            stats.max_concurrent
        );
        info!(
            "  💰 누적 수익 ${} | 가스 {} wei | 평균 {:.1}ms | 브레이커 trip {}",
            stats.total_profit_usd,
            stats.total_gas_cost_wei,
            stats.avg_execution_ms,
            stats.breaker_trips
        );
    }
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════════════════╗
    ║                                                          ║
    ║  ⚡ arbx - 멀티체인 아비트라지 실행 엔진                 ║
    ║                                                          ║
    ║  • 다중 오라클 가격 합의 (Chainlink/Uniswap/Pyth/CEX)    ║
    ║  • 지갑별 논스 직렬화 + 서킷 브레이커                    ║
    ║  • 세마포어 기반 병렬 실행 오케스트레이터                ║
    ║  • 같은 체인 경로 배치 제출                              ║
    ║                                                          ║
    ╚══════════════════════════════════════════════════════════╝
    "#
    );
}
