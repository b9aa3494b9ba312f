use std::sync::Arc;

use chrono::Utc;
use ethers::abi::{Abi, Token};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, H256,
    TransactionReceipt, U256, U64,
};
use once_cell::sync::Lazy;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::blockchain::ChainClient;
use crate::config::{ChainConfig, ExecutionConfig};
use crate::constants::{format_native_amount, BATCH_GAS_LIMIT_PER_ROUTE, MIN_ORACLE_CONFIDENCE};
use crate::oracle::{PriceConsensusService, PriceOptions};
use crate::stores::ResultSink;
use crate::types::{
    ArbitrageRoute, EngineError, EngineResult, ExecutionStatus, GasEstimate, GasTier,
    TransactionResult,
};

use super::breaker::{CircuitBreaker, CircuitBreakerState};
use super::gas::GasEstimator;
use super::nonce::NonceSequencer;

/// 아비트라지 컨트랙트 진입점 ABI
///
/// executeArbitrage는 단일 경로, executeBatch는 같은 체인의 경로 묶음을 받는다.
static ARBITRAGE_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "name": "executeArbitrage",
            "type": "function",
            "stateMutability": "nonpayable",
            "inputs": [
                {"name": "asset", "type": "address"},
                {"name": "amount", "type": "uint256"},
                {
                    "name": "steps",
                    "type": "tuple[]",
                    "components": [
                        {"name": "dex", "type": "uint8"},
                        {"name": "tokenIn", "type": "address"},
                        {"name": "tokenOut", "type": "address"},
                        {"name": "data", "type": "bytes"},
                        {"name": "minOut", "type": "uint256"}
                    ]
                },
                {"name": "minProfit", "type": "uint256"},
                {"name": "deadline", "type": "uint256"}
            ],
            "outputs": []
        },
        {
            "name": "executeBatch",
            "type": "function",
            "stateMutability": "nonpayable",
            "inputs": [
                {
                    "name": "routes",
                    "type": "tuple[]",
                    "components": [
                        {"name": "asset", "type": "address"},
                        {"name": "amount", "type": "uint256"},
                        {
                            "name": "steps",
                            "type": "tuple[]",
                            "components": [
                                {"name": "dex", "type": "uint8"},
                                {"name": "tokenIn", "type": "address"},
                                {"name": "tokenOut", "type": "address"},
                                {"name": "data", "type": "bytes"},
                                {"name": "minOut", "type": "uint256"}
                            ]
                        },
                        {"name": "minProfit", "type": "uint256"},
                        {"name": "deadline", "type": "uint256"}
                    ]
                }
            ],
            "outputs": []
        },
        {
            "name": "ArbitrageExecuted",
            "type": "event",
            "anonymous": false,
            "inputs": [
                {"name": "routeId", "type": "bytes32", "indexed": true},
                {"name": "profit", "type": "uint256", "indexed": false}
            ]
        }
    ]))
    .expect("static abi")
});

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 단일 지갑에 묶인 경로 실행기
///
/// 검증 → 논스 할당 → 가스 견적 → 제출 → 확인까지의 전체 수명주기를 담당한다.
/// execute_route는 실패해도 항상 TransactionResult를 돌려주고
/// 결과 싱크에 정확히 한 건을 기록한다.
pub struct RouteExecutor {
    chain: ChainConfig,
    client: Arc<ChainClient>,
    wallet: Address,
    consensus: Arc<PriceConsensusService>,
    nonces: Arc<NonceSequencer>,
    gas: GasEstimator,
    breaker: CircuitBreaker,
    sink: Arc<dyn ResultSink>,
    settings: ExecutionConfig,
}

impl RouteExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: ChainConfig,
        client: Arc<ChainClient>,
        wallet: Address,
        consensus: Arc<PriceConsensusService>,
        nonces: Arc<NonceSequencer>,
        sink: Arc<dyn ResultSink>,
        settings: ExecutionConfig,
    ) -> Self {
        let gas = GasEstimator::new(
            client.clone(),
            chain.clone(),
            settings.gas_price_multiplier,
        );
        let breaker = CircuitBreaker::new(wallet, settings.circuit_breaker_threshold);
        Self {
            chain,
            client,
            wallet,
            consensus,
            nonces,
            gas,
            breaker,
            sink,
            settings,
        }
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        self.breaker.snapshot()
    }

    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    /// 경로 하나를 실행한다. 어떤 경로로 끝나든 싱크에 결과 한 건을 남긴다.
    pub async fn execute_route(&self, route: &ArbitrageRoute) -> TransactionResult {
        let started = Instant::now();
        info!(
            "🚀 Executing route {} on chain {} ({}, expected ${})",
            route.id, route.chain_id, route.strategy, route.expected_profit_usd
        );

        // 열린 브레이커는 시도 자체를 차단하고, 추가 실패로 집계하지 않는다
        if let Err(e) = self.breaker.check() {
            let result = TransactionResult::failure(
                route,
                self.wallet,
                ExecutionStatus::Validating,
                &e,
                0,
                elapsed_ms(started),
            );
            self.record(&result).await;
            return result;
        }

        let mut attempt: u32 = 0;
        let result = loop {
            attempt += 1;
            match self.attempt_once(route, attempt, started).await {
                Ok(result) => break result,
                Err(e) => {
                    if e.is_transient() && attempt < self.settings.max_retries {
                        let delay = backoff_delay(attempt, self.settings.retry_delay_ms);
                        warn!(
                            "🔁 Attempt {}/{} failed for route {} ({}), retrying in {:?}",
                            attempt,
                            self.settings.max_retries,
                            route.id,
                            e.code(),
                            delay
                        );
                        sleep(delay).await;
                        continue;
                    }
                    self.breaker.record_failure();
                    break TransactionResult::failure(
                        route,
                        self.wallet,
                        failure_status(&e),
                        &e,
                        attempt - 1,
                        elapsed_ms(started),
                    );
                }
            }
        };

        self.record(&result).await;
        result
    }

    /// 같은 체인의 경로 묶음을 executeBatch 한 건으로 제출한다.
    ///
    /// 검증에 실패한 경로는 개별 실패로 기록하고 나머지만 묶는다.
    /// 유효 경로가 하나뿐이거나 배치 컨트랙트가 없으면 단건 실행으로 폴백.
    pub async fn execute_batch(&self, routes: &[ArbitrageRoute]) -> Vec<TransactionResult> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(routes.len());

        if let Err(e) = self.breaker.check() {
            for route in routes {
                let result = TransactionResult::failure(
                    route,
                    self.wallet,
                    ExecutionStatus::Validating,
                    &e,
                    0,
                    elapsed_ms(started),
                );
                self.record(&result).await;
                results.push(result);
            }
            return results;
        }

        let mut valid = Vec::new();
        for route in routes {
            match self.validate(route).await {
                Ok(()) => valid.push(route.clone()),
                Err(e) => {
                    self.breaker.record_failure();
                    let result = TransactionResult::failure(
                        route,
                        self.wallet,
                        ExecutionStatus::Validating,
                        &e,
                        0,
                        elapsed_ms(started),
                    );
                    self.record(&result).await;
                    results.push(result);
                }
            }
        }

        let batch_contract = match self.chain.batch_contract {
            Some(addr) if valid.len() >= 2 => addr,
            _ => {
                for route in &valid {
                    results.push(self.execute_route(route).await);
                }
                return results;
            }
        };

        match self.submit_batch(&valid, batch_contract, started).await {
            Ok(batch_results) => {
                if batch_results.iter().all(|r| r.success) {
                    self.breaker.record_success();
                } else {
                    // 배치는 원자적이므로 실패도 한 건으로 집계한다
                    self.breaker.record_failure();
                }
                for result in &batch_results {
                    self.record(result).await;
                }
                results.extend(batch_results);
            }
            Err(e) => {
                self.breaker.record_failure();
                for route in &valid {
                    let result = TransactionResult::failure(
                        route,
                        self.wallet,
                        failure_status(&e),
                        &e,
                        0,
                        elapsed_ms(started),
                    );
                    self.record(&result).await;
                    results.push(result);
                }
            }
        }
        results
    }

    async fn attempt_once(
        &self,
        route: &ArbitrageRoute,
        attempt: u32,
        started: Instant,
    ) -> EngineResult<TransactionResult> {
        self.validate(route).await?;

        let contract = self.chain.arbitrage_contract.ok_or_else(|| {
            EngineError::Config(format!(
                "no arbitrage contract configured for chain {}",
                self.chain.chain_id
            ))
        })?;
        let calldata = encode_execute(route)?;

        let gas_limit = self.resolve_gas_limit(contract, &calldata).await;
        let estimate = self.gas.estimate(GasTier::Standard, gas_limit).await;

        let balance = self
            .client
            .get_native_balance(self.wallet)
            .await
            .map_err(|e| EngineError::Network(format!("balance query failed: {}", e)))?;
        if balance < estimate.total_cost {
            warn!(
                "⛽ Wallet {:?} holds {} but worst-case gas is {}",
                self.wallet,
                format_native_amount(balance),
                format_native_amount(estimate.total_cost)
            );
            return Err(EngineError::InsufficientGasBalance {
                wallet: self.wallet,
                balance,
                required: estimate.total_cost,
            });
        }

        // 큐 대기나 재시도 지연 중에 시한이 지났을 수 있다.
        // 논스를 태우기 전에 확인해야 만료 경로가 논스 갭을 남기지 않는다.
        let now = Utc::now().timestamp() as u64;
        if route.is_expired(now) {
            return Err(EngineError::RouteExpired {
                route_id: route.id.clone(),
                deadline: route.deadline,
            });
        }

        let nonce = self.nonces.next_nonce(route.chain_id, self.wallet).await?;

        if self.settings.simulation_mode {
            info!(
                "🧪 Simulation: route {} validated, nonce {}, gas {} @ {} wei (not broadcast)",
                route.id, nonce, estimate.gas_limit, estimate.max_fee_per_gas
            );
            self.breaker.record_success();
            return Ok(self.simulated_result(route, attempt, started, &estimate));
        }

        let tx = build_eip1559(route, contract, self.wallet, calldata, nonce, &estimate);
        let hash = match self.client.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => {
                // 브로드캐스트가 확인되지 않았으므로 할당한 논스를 체인 기준으로 되돌린다
                let _ = self.nonces.resync(route.chain_id, self.wallet).await;
                return Err(classify_send_error(&e, self.wallet, nonce));
            }
        };
        info!(
            "📤 Route {} submitted: {:?} (nonce {}, attempt {})",
            route.id, hash, nonce, attempt
        );

        self.confirm(route, hash, attempt, started, &estimate).await
    }

    async fn submit_batch(
        &self,
        routes: &[ArbitrageRoute],
        batch_contract: Address,
        started: Instant,
    ) -> EngineResult<Vec<TransactionResult>> {
        let chain_id = routes[0].chain_id;
        let calldata = encode_batch(routes)?;
        let gas_limit = BATCH_GAS_LIMIT_PER_ROUTE * routes.len() as u64;
        let estimate = self.gas.estimate(GasTier::Standard, gas_limit).await;
        let nonce = self.nonces.next_nonce(chain_id, self.wallet).await?;

        if self.settings.simulation_mode {
            info!(
                "🧪 Simulation: batch of {} routes validated, nonce {} (not broadcast)",
                routes.len(),
                nonce
            );
            return Ok(routes
                .iter()
                .map(|r| self.simulated_result(r, 1, started, &estimate))
                .collect());
        }

        let tx = Eip1559TransactionRequest::new()
            .to(batch_contract)
            .from(self.wallet)
            .data(calldata)
            .nonce(nonce)
            .gas(estimate.gas_limit)
            .max_fee_per_gas(estimate.max_fee_per_gas)
            .max_priority_fee_per_gas(estimate.max_priority_fee_per_gas)
            .chain_id(chain_id);
        let hash = match self.client.send_transaction(TypedTransaction::Eip1559(tx)).await {
            Ok(hash) => hash,
            Err(e) => {
                let _ = self.nonces.resync(chain_id, self.wallet).await;
                return Err(classify_send_error(&e, self.wallet, nonce));
            }
        };
        info!(
            "📦 Batch of {} routes submitted: {:?} (nonce {})",
            routes.len(),
            hash,
            nonce
        );

        let receipt = self
            .client
            .wait_for_receipt(
                hash,
                Duration::from_secs(self.settings.confirmation_timeout_secs),
                RECEIPT_POLL_INTERVAL,
            )
            .await
            .map_err(|e| EngineError::Network(format!("receipt poll failed: {}", e)))?;

        let per_route_gas = receipt
            .as_ref()
            .and_then(|r| r.gas_used)
            .map(|g| (g / U256::from(routes.len() as u64)).as_u64());

        Ok(routes
            .iter()
            .map(|route| {
                let mut result = match &receipt {
                    Some(r) if r.status == Some(U64::one()) => self.confirmed_result(
                        route,
                        hash,
                        1,
                        started,
                        r,
                        Some(route.expected_profit_usd),
                        Some("batch submission, per-route profit not parsed".to_string()),
                    ),
                    Some(r) => self.reverted_result(route, hash, 1, started, r),
                    None => self.timed_out_result(route, hash, 1, started),
                };
                result.gas_used = per_route_gas;
                result
            })
            .collect())
    }

    /// 제출 전 검증: 시한, 슬리피지 상한, 합의 가격 신뢰도
    async fn validate(&self, route: &ArbitrageRoute) -> EngineResult<()> {
        let now = Utc::now().timestamp() as u64;
        if route.is_expired(now) {
            return Err(EngineError::RouteExpired {
                route_id: route.id.clone(),
                deadline: route.deadline,
            });
        }

        if route.max_slippage_bps > self.settings.max_slippage_bps {
            return Err(EngineError::SlippageTooHigh {
                requested_bps: route.max_slippage_bps,
                max_bps: self.settings.max_slippage_bps,
            });
        }

        for symbol in &route.symbols {
            let update = self
                .consensus
                .get_price(
                    symbol,
                    route.chain_id,
                    PriceOptions {
                        min_confidence: Some(MIN_ORACLE_CONFIDENCE),
                        max_age_ms: None,
                    },
                )
                .await?;
            if update.degraded {
                warn!(
                    "⚠️ Route {} validated against degraded price for {} (age-expired cache)",
                    route.id, symbol
                );
            }
        }
        Ok(())
    }

    async fn confirm(
        &self,
        route: &ArbitrageRoute,
        hash: H256,
        attempt: u32,
        started: Instant,
        _estimate: &GasEstimate,
    ) -> EngineResult<TransactionResult> {
        let receipt = self
            .client
            .wait_for_receipt(
                hash,
                Duration::from_secs(self.settings.confirmation_timeout_secs),
                RECEIPT_POLL_INTERVAL,
            )
            .await
            .map_err(|e| EngineError::Network(format!("receipt poll failed: {}", e)))?;

        match receipt {
            Some(r) if r.status == Some(U64::one()) => {
                self.breaker.record_success();
                let (realized, notes) = match parse_realized_profit(&r) {
                    Some(wei) => self.realized_usd(route, wei).await,
                    None => (
                        Some(route.expected_profit_usd),
                        Some("profit event missing, recorded expected value".to_string()),
                    ),
                };
                info!(
                    "✅ Route {} confirmed in block {:?} (gas {:?})",
                    route.id,
                    r.block_number.map(|b| b.as_u64()),
                    r.gas_used.map(|g| g.as_u64())
                );
                Ok(self.confirmed_result(route, hash, attempt, started, &r, realized, notes))
            }
            Some(r) => {
                self.breaker.record_failure();
                warn!("❌ Route {} reverted on chain: {:?}", route.id, hash);
                Ok(self.reverted_result(route, hash, attempt, started, &r))
            }
            None => {
                self.breaker.record_failure();
                warn!(
                    "⏰ Route {} unconfirmed after {}s: {:?}",
                    route.id, self.settings.confirmation_timeout_secs, hash
                );
                Ok(self.timed_out_result(route, hash, attempt, started))
            }
        }
    }

    /// 온체인 profit(wei)을 합의 가격으로 USD 환산. 가격이 없으면 기대값으로 폴백.
    async fn realized_usd(
        &self,
        route: &ArbitrageRoute,
        profit_wei: U256,
    ) -> (Option<Decimal>, Option<String>) {
        let Some(symbol) = route.symbols.first() else {
            return (
                Some(route.expected_profit_usd),
                Some("no symbol for profit conversion, recorded expected value".to_string()),
            );
        };
        match self
            .consensus
            .get_price(symbol, route.chain_id, PriceOptions::default())
            .await
        {
            Ok(update) => {
                let amount = Decimal::from_f64(profit_wei.as_u128() as f64 / 1e18)
                    .unwrap_or_default();
                (Some(amount * update.price), None)
            }
            Err(_) => (
                Some(route.expected_profit_usd),
                Some("price unavailable for profit conversion, recorded expected value".to_string()),
            ),
        }
    }

    async fn resolve_gas_limit(&self, contract: Address, calldata: &Bytes) -> u64 {
        let probe = Eip1559TransactionRequest::new()
            .to(contract)
            .from(self.wallet)
            .data(calldata.clone());
        match self
            .client
            .estimate_gas(&TypedTransaction::Eip1559(probe))
            .await
        {
            // 20% 버퍼
            Ok(estimated) => (estimated.as_u64()).saturating_mul(12) / 10,
            Err(e) => {
                warn!(
                    "⛽ Gas estimation failed, using default {}: {}",
                    self.settings.default_gas_limit, e
                );
                self.settings.default_gas_limit
            }
        }
    }

    fn confirmed_result(
        &self,
        route: &ArbitrageRoute,
        hash: H256,
        attempt: u32,
        started: Instant,
        receipt: &TransactionReceipt,
        realized: Option<Decimal>,
        notes: Option<String>,
    ) -> TransactionResult {
        TransactionResult {
            id: Uuid::new_v4().to_string(),
            route_id: route.id.clone(),
            wallet: self.wallet,
            chain_id: route.chain_id,
            status: ExecutionStatus::Confirmed,
            success: true,
            tx_hash: Some(hash),
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used.map(|g| g.as_u64()),
            effective_gas_price: receipt.effective_gas_price,
            realized_profit_usd: realized,
            expected_profit_usd: route.expected_profit_usd,
            execution_ms: elapsed_ms(started),
            retry_count: attempt - 1,
            error_code: None,
            error_message: None,
            notes,
            timestamp: Utc::now(),
        }
    }

    fn reverted_result(
        &self,
        route: &ArbitrageRoute,
        hash: H256,
        attempt: u32,
        started: Instant,
        receipt: &TransactionReceipt,
    ) -> TransactionResult {
        let err = EngineError::TransactionReverted {
            reason: "execution reverted (status 0)".to_string(),
        };
        let mut result = TransactionResult::failure(
            route,
            self.wallet,
            ExecutionStatus::Reverted,
            &err,
            attempt - 1,
            elapsed_ms(started),
        );
        result.tx_hash = Some(hash);
        result.block_number = receipt.block_number.map(|b| b.as_u64());
        result.gas_used = receipt.gas_used.map(|g| g.as_u64());
        result.effective_gas_price = receipt.effective_gas_price;
        result
    }

    fn timed_out_result(
        &self,
        route: &ArbitrageRoute,
        hash: H256,
        attempt: u32,
        started: Instant,
    ) -> TransactionResult {
        let err = EngineError::RpcTimeout(format!(
            "no receipt within {}s",
            self.settings.confirmation_timeout_secs
        ));
        let mut result = TransactionResult::failure(
            route,
            self.wallet,
            ExecutionStatus::TimedOut,
            &err,
            attempt - 1,
            elapsed_ms(started),
        );
        result.tx_hash = Some(hash);
        result
    }

    fn simulated_result(
        &self,
        route: &ArbitrageRoute,
        attempt: u32,
        started: Instant,
        estimate: &GasEstimate,
    ) -> TransactionResult {
        TransactionResult {
            id: Uuid::new_v4().to_string(),
            route_id: route.id.clone(),
            wallet: self.wallet,
            chain_id: route.chain_id,
            status: ExecutionStatus::Confirmed,
            success: true,
            tx_hash: None,
            block_number: None,
            gas_used: Some(estimate.gas_limit),
            effective_gas_price: Some(estimate.max_fee_per_gas),
            realized_profit_usd: Some(route.expected_profit_usd),
            expected_profit_usd: route.expected_profit_usd,
            execution_ms: elapsed_ms(started),
            retry_count: attempt - 1,
            error_code: None,
            error_message: None,
            notes: Some("simulation mode, not broadcast".to_string()),
            timestamp: Utc::now(),
        }
    }

    async fn record(&self, result: &TransactionResult) {
        if let Err(e) = self.sink.append(result).await {
            warn!("Result sink append failed for route {}: {}", result.route_id, e);
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// 지수 백오프: base × 2^(attempt-1)
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// 제출 단계 오류를 엔진 오류로 분류
pub fn classify_send_error(error: &anyhow::Error, wallet: Address, nonce: u64) -> EngineError {
    let msg = error.to_string().to_lowercase();
    if msg.contains("nonce too low")
        || msg.contains("already known")
        || msg.contains("replacement transaction underpriced")
    {
        EngineError::NonceConflict { wallet, nonce }
    } else if msg.contains("timeout") || msg.contains("timed out") {
        EngineError::RpcTimeout(msg)
    } else {
        EngineError::Network(msg)
    }
}

/// 실패가 어느 단계에서 났는지로 결과 상태를 정한다
fn failure_status(error: &EngineError) -> ExecutionStatus {
    match error {
        EngineError::RouteExpired { .. }
        | EngineError::SlippageTooHigh { .. }
        | EngineError::PriceValidationFailed { .. }
        | EngineError::AssetNotConfigured { .. }
        | EngineError::AssetDisabled { .. }
        | EngineError::NoPriceAvailable { .. }
        | EngineError::InsufficientGasBalance { .. }
        | EngineError::CircuitBreakerOpen { .. }
        | EngineError::Config(_) => ExecutionStatus::Validating,
        _ => ExecutionStatus::Submitting,
    }
}

fn step_tokens(route: &ArbitrageRoute) -> Token {
    Token::Array(
        route
            .steps
            .iter()
            .map(|s| {
                Token::Tuple(vec![
                    Token::Uint(U256::from(s.dex)),
                    Token::Address(s.token_in),
                    Token::Address(s.token_out),
                    Token::Bytes(s.calldata.to_vec()),
                    Token::Uint(s.min_out),
                ])
            })
            .collect(),
    )
}

fn encode_execute(route: &ArbitrageRoute) -> EngineResult<Bytes> {
    let input = ARBITRAGE_ABI
        .function("executeArbitrage")
        .and_then(|f| {
            f.encode_input(&[
                Token::Address(route.flash_loan.token),
                Token::Uint(route.flash_loan.amount),
                step_tokens(route),
                Token::Uint(route.min_profit_wei),
                Token::Uint(U256::from(route.deadline)),
            ])
        })
        .map_err(|e| EngineError::Config(format!("calldata encoding failed: {}", e)))?;
    Ok(Bytes::from(input))
}

fn encode_batch(routes: &[ArbitrageRoute]) -> EngineResult<Bytes> {
    let entries = routes
        .iter()
        .map(|route| {
            Token::Tuple(vec![
                Token::Address(route.flash_loan.token),
                Token::Uint(route.flash_loan.amount),
                step_tokens(route),
                Token::Uint(route.min_profit_wei),
                Token::Uint(U256::from(route.deadline)),
            ])
        })
        .collect();
    let input = ARBITRAGE_ABI
        .function("executeBatch")
        .and_then(|f| f.encode_input(&[Token::Array(entries)]))
        .map_err(|e| EngineError::Config(format!("batch calldata encoding failed: {}", e)))?;
    Ok(Bytes::from(input))
}

fn build_eip1559(
    route: &ArbitrageRoute,
    contract: Address,
    wallet: Address,
    calldata: Bytes,
    nonce: u64,
    estimate: &GasEstimate,
) -> TypedTransaction {
    TypedTransaction::Eip1559(
        Eip1559TransactionRequest::new()
            .to(contract)
            .from(wallet)
            .data(calldata)
            .nonce(nonce)
            .gas(estimate.gas_limit)
            .max_fee_per_gas(estimate.max_fee_per_gas)
            .max_priority_fee_per_gas(estimate.max_priority_fee_per_gas)
            .chain_id(route.chain_id),
    )
}

/// ArbitrageExecuted(bytes32,uint256) 로그에서 실현 profit(wei) 추출
pub fn parse_realized_profit(receipt: &TransactionReceipt) -> Option<U256> {
    let event = ARBITRAGE_ABI.event("ArbitrageExecuted").ok()?;
    let topic = event.signature();
    receipt
        .logs
        .iter()
        .find(|log| log.topics.first() == Some(&topic))
        .filter(|log| log.data.len() >= 32)
        .map(|log| U256::from_big_endian(&log.data[..32]))
}
