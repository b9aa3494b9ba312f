use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ethers::types::Address;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex, Notify, Semaphore};
use tokio::time::{interval, sleep, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ExecutionConfig, OrchestratorConfig};
use crate::executor::{CircuitBreakerState, RouteExecutor};
use crate::stores::{ResultSink, RouteStore};
use crate::types::{ArbitrageRoute, ExecutionStatus, RouteFilter, TransactionResult};

const SCALE_STEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assignment {
    LeastLoaded,
    RoundRobin,
}

struct QueuedJob {
    routes: Vec<ArbitrageRoute>,
    done: Option<oneshot::Sender<Vec<TransactionResult>>>,
}

/// 제출한 잡의 완료 핸들
///
/// await하면 경로별 결과를 받는다. 핸들을 버려도 실행은 계속되고
/// 결과는 싱크에만 남는다.
pub struct ExecutionHandle {
    rx: oneshot::Receiver<Vec<TransactionResult>>,
}

impl ExecutionHandle {
    pub async fn wait(self) -> Vec<TransactionResult> {
        self.rx.await.unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    attempted: u64,
    succeeded: u64,
    failed: u64,
    total_profit_usd: Decimal,
    total_gas_cost_wei: u128,
    avg_execution_ms: f64,
}

/// 실행 통계 스냅샷 (운영 API 노출용)
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_profit_usd: Decimal,
    pub total_gas_cost_wei: u128,
    pub avg_execution_ms: f64,
    pub queue_depth: usize,
    pub queue_high_water: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub breaker_trips: u64,
}

/// 병렬 실행 오케스트레이터
///
/// 경로 저장소를 폴링해 실행 잡을 만들고, 세마포어로 동시 실행을
/// 제한하면서 지갑 워커에 분배한다. 같은 체인의 경로 여러 건은
/// 배치 잡으로 묶는다. 정지 시에는 큐를 드레인하고, 시한을 넘긴
/// 잔여 잡은 포기 처리로 기록한다.
pub struct ParallelOrchestrator {
    workers: Vec<Arc<RouteExecutor>>,
    worker_loads: Vec<Arc<AtomicUsize>>,
    rr_cursor: AtomicUsize,
    assignment: Assignment,
    semaphore: Arc<Semaphore>,
    max_permits: AtomicUsize,
    queue: Mutex<VecDeque<QueuedJob>>,
    queue_high_water: AtomicUsize,
    route_store: Arc<dyn RouteStore>,
    sink: Arc<dyn ResultSink>,
    settings: OrchestratorConfig,
    execution: ExecutionConfig,
    stats: Mutex<StatsInner>,
    is_running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    notify: Notify,
}

impl ParallelOrchestrator {
    pub fn new(
        workers: Vec<Arc<RouteExecutor>>,
        route_store: Arc<dyn RouteStore>,
        sink: Arc<dyn ResultSink>,
        settings: OrchestratorConfig,
        execution: ExecutionConfig,
    ) -> Self {
        let assignment = match settings.assignment.as_str() {
            "round_robin" => Assignment::RoundRobin,
            _ => Assignment::LeastLoaded,
        };
        let worker_loads = workers
            .iter()
            .map(|_| Arc::new(AtomicUsize::new(0)))
            .collect();
        let max_concurrent = settings.max_concurrent.max(1);
        Self {
            workers,
            worker_loads,
            rr_cursor: AtomicUsize::new(0),
            assignment,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: AtomicUsize::new(max_concurrent),
            queue: Mutex::new(VecDeque::new()),
            queue_high_water: AtomicUsize::new(0),
            route_store,
            sink,
            settings,
            execution,
            stats: Mutex::new(StatsInner::default()),
            is_running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            notify: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn current_max_concurrent(&self) -> usize {
        self.max_permits.load(Ordering::SeqCst)
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn start(self: &Arc<Self>) {
        self.is_running.store(true, Ordering::SeqCst);
        info!(
            "🎬 Orchestrator started: {} workers, {} concurrent slots ({:?} assignment)",
            self.workers.len(),
            self.current_max_concurrent(),
            self.assignment
        );

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch_loop().await });

        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.poll_loop().await });
    }

    /// 실행 잡 제출. 한 잡의 경로들은 전부 같은 체인이어야 한다.
    ///
    /// 반환된 핸들은 잡이 디스패치되어 끝까지 처리된 뒤 경로별 결과로 풀린다.
    pub async fn submit(&self, routes: Vec<ArbitrageRoute>) -> ExecutionHandle {
        let (done, rx) = oneshot::channel();
        if routes.is_empty() {
            let _ = done.send(Vec::new());
            return ExecutionHandle { rx };
        }
        let depth = {
            let mut queue = self.queue.lock().await;
            queue.push_back(QueuedJob {
                routes,
                done: Some(done),
            });
            queue.len()
        };
        self.queue_high_water.fetch_max(depth, Ordering::SeqCst);
        self.maybe_scale_up(depth);
        self.notify.notify_one();
        ExecutionHandle { rx }
    }

    /// 큐 드레인 후 정지. 시한을 넘긴 잔여 잡은 포기 처리로 기록한다.
    pub async fn stop(&self) {
        info!("🛑 Orchestrator stopping, draining queue...");
        self.is_running.store(false, Ordering::SeqCst);
        self.notify.notify_one();

        let deadline = Instant::now() + Duration::from_secs(self.settings.shutdown_timeout_secs);
        loop {
            let queued = self.queue.lock().await.len();
            let active = self.active.load(Ordering::SeqCst);
            if queued == 0 && active == 0 {
                info!("✅ Drain complete");
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            self.notify.notify_one();
            sleep(Duration::from_millis(50)).await;
        }

        let abandoned: Vec<QueuedJob> = self.queue.lock().await.drain(..).collect();
        let count: usize = abandoned.iter().map(|j| j.routes.len()).sum();
        warn!("⏰ Drain timed out, abandoning {} queued routes", count);
        for mut job in abandoned {
            let mut results = Vec::with_capacity(job.routes.len());
            for route in &job.routes {
                let result = abandoned_result(route);
                if let Err(e) = self.sink.append(&result).await {
                    warn!("Result sink append failed for route {}: {}", route.id, e);
                }
                let mut stats = self.stats.lock().await;
                stats.attempted += 1;
                stats.failed += 1;
                results.push(result);
            }
            if let Some(done) = job.done.take() {
                let _ = done.send(results);
            }
        }
    }

    pub async fn stats(&self) -> ExecutionStats {
        let inner = self.stats.lock().await;
        ExecutionStats {
            attempted: inner.attempted,
            succeeded: inner.succeeded,
            failed: inner.failed,
            total_profit_usd: inner.total_profit_usd,
            total_gas_cost_wei: inner.total_gas_cost_wei,
            avg_execution_ms: inner.avg_execution_ms,
            queue_depth: self.queue.lock().await.len(),
            queue_high_water: self.queue_high_water.load(Ordering::SeqCst),
            in_flight: self.active.load(Ordering::SeqCst),
            max_concurrent: self.current_max_concurrent(),
            breaker_trips: self
                .workers
                .iter()
                .map(|w| w.breaker_state().trip_count)
                .sum(),
        }
    }

    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerState> {
        self.workers.iter().map(|w| w.breaker_state()).collect()
    }

    /// 지갑 지정 리셋, None이면 전체
    pub fn reset_breakers(&self, wallet: Option<Address>) -> usize {
        let mut count = 0;
        for worker in &self.workers {
            if wallet.map_or(true, |w| worker.wallet() == w) {
                worker.reset_breaker();
                count += 1;
            }
        }
        count
    }

    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            let job = self.queue.lock().await.pop_front();
            match job {
                Some(job) => self.dispatch(job).await,
                None => {
                    if !self.is_running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.maybe_scale_down();
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = sleep(Duration::from_millis(100)) => {}
                    }
                }
            }
        }
        debug!("Dispatcher loop exited");
    }

    async fn dispatch(self: &Arc<Self>, mut job: QueuedJob) {
        let chain_id = job.routes[0].chain_id;
        let Some(idx) = self.pick_worker(chain_id) else {
            warn!("No worker for chain {}, dropping {} routes", chain_id, job.routes.len());
            let mut results = Vec::with_capacity(job.routes.len());
            for route in &job.routes {
                let result = unroutable_result(route);
                if let Err(e) = self.sink.append(&result).await {
                    warn!("Result sink append failed for route {}: {}", route.id, e);
                }
                results.push(result);
            }
            {
                let mut stats = self.stats.lock().await;
                stats.attempted += job.routes.len() as u64;
                stats.failed += job.routes.len() as u64;
            }
            if let Some(done) = job.done.take() {
                let _ = done.send(results);
            }
            return;
        };

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // 세마포어가 닫히는 일은 없다
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        self.worker_loads[idx].fetch_add(1, Ordering::SeqCst);

        let worker = self.workers[idx].clone();
        let load = self.worker_loads[idx].clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let results = if job.routes.len() > 1 {
                worker.execute_batch(&job.routes).await
            } else {
                vec![worker.execute_route(&job.routes[0]).await]
            };
            this.record_results(&results).await;
            load.fetch_sub(1, Ordering::SeqCst);
            this.active.fetch_sub(1, Ordering::SeqCst);
            if let Some(done) = job.done.take() {
                let _ = done.send(results);
            }
            drop(permit);
        });
    }

    fn pick_worker(&self, chain_id: u64) -> Option<usize> {
        let candidates: Vec<usize> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.chain_id() == chain_id)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        match self.assignment {
            Assignment::RoundRobin => {
                let cursor = self.rr_cursor.fetch_add(1, Ordering::SeqCst);
                Some(candidates[cursor % candidates.len()])
            }
            Assignment::LeastLoaded => candidates
                .into_iter()
                .min_by_key(|&i| self.worker_loads[i].load(Ordering::SeqCst)),
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(
            self.settings.route_poll_interval_secs.max(1),
        ));
        while self.is_running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }
            let filter = RouteFilter {
                is_profitable: Some(true),
                min_profit_usd: Decimal::from_f64(self.settings.min_profit_usd),
                ..Default::default()
            };
            match self.route_store.fetch_routes(&filter).await {
                Ok(routes) if !routes.is_empty() => {
                    info!("📥 {} candidate routes pulled from store", routes.len());
                    self.enqueue_routes(routes).await;
                }
                Ok(_) => {}
                Err(e) => warn!("Route store poll failed: {}", e),
            }
        }
        debug!("Poll loop exited");
    }

    /// 체인별로 묶고, 배치가 켜져 있으면 같은 체인 경로를 청크로 묶는다
    async fn enqueue_routes(&self, routes: Vec<ArbitrageRoute>) {
        let mut by_chain: HashMap<u64, Vec<ArbitrageRoute>> = HashMap::new();
        for route in routes {
            by_chain.entry(route.chain_id).or_default().push(route);
        }
        for (_, group) in by_chain {
            if self.execution.batch_enabled && group.len() >= 2 {
                for chunk in group.chunks(self.execution.max_batch_size.max(1)) {
                    self.submit(chunk.to_vec()).await;
                }
            } else {
                for route in group {
                    self.submit(vec![route]).await;
                }
            }
        }
    }

    fn maybe_scale_up(&self, depth: usize) {
        if !self.settings.auto_scale || depth < self.settings.scale_up_queue_depth {
            return;
        }
        let current = self.max_permits.load(Ordering::SeqCst);
        if current >= self.settings.max_concurrent_ceiling {
            return;
        }
        let step = SCALE_STEP.min(self.settings.max_concurrent_ceiling - current);
        self.semaphore.add_permits(step);
        self.max_permits.fetch_add(step, Ordering::SeqCst);
        info!(
            "📈 Scaled up to {} concurrent slots (queue depth {})",
            current + step,
            depth
        );
    }

    /// 큐가 빌 때 기본 동시성으로 되돌린다
    fn maybe_scale_down(&self) {
        if !self.settings.auto_scale {
            return;
        }
        let current = self.max_permits.load(Ordering::SeqCst);
        let base = self.settings.max_concurrent.max(1);
        if current <= base {
            return;
        }
        let mut released = 0;
        while released < current - base {
            match self.semaphore.try_acquire() {
                Ok(permit) => {
                    permit.forget();
                    released += 1;
                }
                Err(_) => break,
            }
        }
        if released > 0 {
            self.max_permits.fetch_sub(released, Ordering::SeqCst);
            info!("📉 Scaled down to {} concurrent slots", current - released);
        }
    }

    async fn record_results(&self, results: &[TransactionResult]) {
        let mut stats = self.stats.lock().await;
        for result in results {
            stats.attempted += 1;
            if result.success {
                stats.succeeded += 1;
                if let Some(profit) = result.realized_profit_usd {
                    stats.total_profit_usd += profit;
                }
            } else {
                stats.failed += 1;
            }
            if let (Some(gas), Some(price)) = (result.gas_used, result.effective_gas_price) {
                stats.total_gas_cost_wei += gas as u128 * price.as_u128();
            }
            let n = stats.attempted as f64;
            stats.avg_execution_ms =
                (stats.avg_execution_ms * (n - 1.0) + result.execution_ms as f64) / n;
        }
    }
}

/// 드레인 시한을 넘겨 실행하지 못한 경로의 기록
fn abandoned_result(route: &ArbitrageRoute) -> TransactionResult {
    TransactionResult {
        id: Uuid::new_v4().to_string(),
        route_id: route.id.clone(),
        wallet: Address::zero(),
        chain_id: route.chain_id,
        status: ExecutionStatus::TimedOut,
        success: false,
        tx_hash: None,
        block_number: None,
        gas_used: None,
        effective_gas_price: None,
        realized_profit_usd: None,
        expected_profit_usd: route.expected_profit_usd,
        execution_ms: 0,
        retry_count: 0,
        error_code: Some("SHUTDOWN_ABANDONED".to_string()),
        error_message: Some("orchestrator stopped before execution".to_string()),
        notes: None,
        timestamp: Utc::now(),
    }
}

fn unroutable_result(route: &ArbitrageRoute) -> TransactionResult {
    TransactionResult {
        id: Uuid::new_v4().to_string(),
        route_id: route.id.clone(),
        wallet: Address::zero(),
        chain_id: route.chain_id,
        status: ExecutionStatus::Validating,
        success: false,
        tx_hash: None,
        block_number: None,
        gas_used: None,
        effective_gas_price: None,
        realized_profit_usd: None,
        expected_profit_usd: route.expected_profit_usd,
        execution_ms: 0,
        retry_count: 0,
        error_code: Some("NO_WORKER_FOR_CHAIN".to_string()),
        error_message: Some(format!("no enabled wallet on chain {}", route.chain_id)),
        notes: None,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    use crate::blockchain::{ChainClient, RpcPool};
    use crate::config::Config;
    use crate::executor::NonceSequencer;
    use crate::oracle::PriceConsensusService;
    use crate::stores::{InMemoryAssetConfigStore, InMemoryResultSink, InMemoryRouteStore};
    use crate::types::{FlashLoanParams, StrategyKind, SwapStep};

    fn test_route(deadline: u64) -> ArbitrageRoute {
        ArbitrageRoute {
            id: Uuid::new_v4().to_string(),
            chain_id: 1,
            strategy: StrategyKind::DexArbitrage,
            flash_loan: FlashLoanParams {
                provider: "aave_v3".to_string(),
                token: Address::repeat_byte(0x01),
                amount: U256::exp10(18),
            },
            steps: vec![SwapStep {
                dex: 0,
                token_in: Address::repeat_byte(0x01),
                token_out: Address::repeat_byte(0x02),
                calldata: ethers::types::Bytes::from(vec![0x01]),
                min_out: U256::one(),
            }],
            symbols: vec![],
            expected_profit_usd: Decimal::from(25),
            min_profit_usd: Decimal::from(5),
            min_profit_wei: U256::one(),
            max_slippage_bps: 30,
            deadline,
            profit_token: Address::repeat_byte(0x01),
        }
    }

    fn live_route() -> ArbitrageRoute {
        test_route(Utc::now().timestamp() as u64 + 300)
    }

    struct Harness {
        orchestrator: Arc<ParallelOrchestrator>,
        sink: Arc<InMemoryResultSink>,
        route_store: Arc<InMemoryRouteStore>,
    }

    async fn harness(
        wallet_count: usize,
        mutate: impl FnOnce(&mut OrchestratorConfig, &mut ExecutionConfig),
    ) -> Harness {
        std::env::set_var("API_MODE", "mock");

        let config = Config::default();
        let mut chain = config.chains[0].clone();
        chain.arbitrage_contract = Some(Address::repeat_byte(0xcc));
        chain.batch_contract = Some(Address::repeat_byte(0xdd));

        let client = Arc::new(ChainClient::connect(&chain, None).await.unwrap());
        let mut pool = RpcPool::new();
        pool.add(client.clone());
        let nonces = Arc::new(NonceSequencer::new(Arc::new(pool)));

        let consensus = Arc::new(PriceConsensusService::new(
            vec![],
            Arc::new(InMemoryAssetConfigStore::new(vec![])),
            config.consensus.clone(),
        ));
        consensus.refresh_configs().await.unwrap();

        let mut orch_settings = config.orchestrator.clone();
        orch_settings.route_poll_interval_secs = 1;
        let mut exec_settings = config.execution.clone();
        exec_settings.retry_delay_ms = 5;
        mutate(&mut orch_settings, &mut exec_settings);

        let sink = Arc::new(InMemoryResultSink::new());
        let workers = (0..wallet_count)
            .map(|i| {
                Arc::new(RouteExecutor::new(
                    chain.clone(),
                    client.clone(),
                    Address::repeat_byte(0xe0 + i as u8),
                    consensus.clone(),
                    nonces.clone(),
                    sink.clone() as Arc<dyn ResultSink>,
                    exec_settings.clone(),
                ))
            })
            .collect();

        let route_store = Arc::new(InMemoryRouteStore::new());
        let orchestrator = Arc::new(ParallelOrchestrator::new(
            workers,
            route_store.clone() as Arc<dyn RouteStore>,
            sink.clone() as Arc<dyn ResultSink>,
            orch_settings,
            exec_settings,
        ));
        Harness {
            orchestrator,
            sink,
            route_store,
        }
    }

    #[tokio::test]
    async fn test_submitted_jobs_drain_on_stop() {
        let h = harness(2, |_, _| {}).await;
        h.orchestrator.start();

        for _ in 0..3 {
            h.orchestrator.submit(vec![live_route()]).await;
        }
        h.orchestrator.stop().await;

        assert_eq!(h.sink.len().await, 3);
        let stats = h.orchestrator.stats().await;
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.avg_execution_ms > 0.0);
    }

    #[tokio::test]
    async fn test_submit_handle_resolves_with_results() {
        let h = harness(1, |_, _| {}).await;
        h.orchestrator.start();

        let handle = h.orchestrator.submit(vec![live_route()]).await;
        let results = handle.wait().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);

        // 워커 없는 체인도 핸들로 실패 결과를 돌려받는다
        let mut route = live_route();
        route.chain_id = 42161;
        let handle = h.orchestrator.submit(vec![route]).await;
        let results = handle.wait().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_code.as_deref(), Some("NO_WORKER_FOR_CHAIN"));

        h.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_expired_queued_route_recorded_as_expired() {
        let h = harness(1, |_, _| {}).await;
        h.orchestrator.start();

        h.orchestrator.submit(vec![test_route(1_000)]).await;
        h.orchestrator.stop().await;

        let results = h.sink.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_code.as_deref(), Some("ROUTE_EXPIRED"));
    }

    #[tokio::test]
    async fn test_round_robin_spreads_across_wallets() {
        let h = harness(2, |o, _| o.assignment = "round_robin".to_string()).await;
        h.orchestrator.start();

        for _ in 0..4 {
            h.orchestrator.submit(vec![live_route()]).await;
        }
        h.orchestrator.stop().await;

        let results = h.sink.results().await;
        let wallets: std::collections::HashSet<Address> =
            results.iter().map(|r| r.wallet).collect();
        assert_eq!(wallets.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_loop_pulls_profitable_routes() {
        let h = harness(1, |o, e| {
            o.route_poll_interval_secs = 1;
            e.batch_enabled = false;
        })
        .await;

        h.route_store.push(live_route()).await;
        let mut unprofitable = live_route();
        unprofitable.expected_profit_usd = Decimal::from(1);
        h.route_store.push(unprofitable).await;

        h.orchestrator.start();
        sleep(Duration::from_millis(1_500)).await;
        h.orchestrator.stop().await;

        // 기대 수익이 최소 기준(5 USD) 미만인 경로는 큐에 오르지 않는다
        assert_eq!(h.sink.len().await, 1);
        assert!(h.sink.results().await[0].success);
    }

    #[tokio::test]
    async fn test_batch_grouping_same_chain() {
        let h = harness(1, |_, _| {}).await;
        h.orchestrator.start();

        // 같은 체인 3건은 배치 한 건으로 나간다
        h.orchestrator
            .submit(vec![live_route(), live_route(), live_route()])
            .await;
        h.orchestrator.stop().await;

        let results = h.sink.results().await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        let hashes: std::collections::HashSet<_> =
            results.iter().map(|r| r.tx_hash.unwrap()).collect();
        assert_eq!(hashes.len(), 1);
    }

    #[tokio::test]
    async fn test_no_worker_for_chain_is_recorded() {
        let h = harness(1, |_, _| {}).await;
        h.orchestrator.start();

        let mut route = live_route();
        route.chain_id = 42161;
        h.orchestrator.submit(vec![route]).await;
        h.orchestrator.stop().await;

        let results = h.sink.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_code.as_deref(), Some("NO_WORKER_FOR_CHAIN"));
        assert_eq!(h.orchestrator.stats().await.failed, 1);
    }

    #[tokio::test]
    async fn test_autoscale_grows_with_queue_depth() {
        let h = harness(1, |o, _| {
            o.max_concurrent = 2;
            o.auto_scale = true;
            o.scale_up_queue_depth = 3;
            o.max_concurrent_ceiling = 10;
        })
        .await;

        // 디스패처가 돌기 전에 깊이를 쌓는다
        for _ in 0..4 {
            h.orchestrator.submit(vec![live_route()]).await;
        }
        assert!(h.orchestrator.current_max_concurrent() > 2);
        assert!(h.orchestrator.current_max_concurrent() <= 10);

        h.orchestrator.start();
        h.orchestrator.stop().await;
        assert_eq!(h.sink.len().await, 4);
    }

    #[tokio::test]
    async fn test_breaker_reset_via_orchestrator() {
        let h = harness(2, |_, _| {}).await;
        h.orchestrator.start();

        // 한 워커만 임계치까지 실패시킨다 (round robin이 아니므로 least loaded가 분산할
        // 수 있어 전체 리셋 경로로 검증)
        for _ in 0..12 {
            h.orchestrator.submit(vec![test_route(1_000)]).await;
        }
        h.orchestrator.stop().await;

        let tripped = h
            .orchestrator
            .breaker_snapshots()
            .iter()
            .filter(|s| s.is_open)
            .count();
        assert!(tripped >= 1);

        let reset = h.orchestrator.reset_breakers(None);
        assert_eq!(reset, 2);
        assert!(h
            .orchestrator
            .breaker_snapshots()
            .iter()
            .all(|s| !s.is_open));
    }
}
