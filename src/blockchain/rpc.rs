use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, TransactionReceipt, H256,
        U256, U64,
    },
};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ChainConfig;
use crate::constants::FEE_HISTORY_BLOCKS;
use crate::mocks;

/// 단일 체인용 RPC 클라이언트
///
/// 조회는 HTTP Provider, 전송은 SignerMiddleware로 처리한다.
/// mock 모드에서는 모든 호출이 인프로세스 시뮬레이션으로 대체된다.
pub struct ChainClient {
    chain_id: u64,
    name: String,
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerMiddleware<Arc<Provider<Http>>, LocalWallet>>>,
    wallet_address: Option<Address>,
    /// mock 모드 전용: 남은 send_transaction 실패 주입 횟수
    mock_send_failures: AtomicU64,
}

impl ChainClient {
    pub async fn connect(config: &ChainConfig, private_key: Option<&str>) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(config.rpc_url.as_str())?);

        if !mocks::is_mock_mode() {
            let reported = provider.get_chainid().await?.as_u64();
            if reported != config.chain_id {
                return Err(anyhow!(
                    "rpc endpoint for {} reports chain {} (expected {})",
                    config.name,
                    reported,
                    config.chain_id
                ));
            }
        }

        let (signer, wallet_address) = match private_key {
            Some(pk) => {
                let wallet: LocalWallet = pk
                    .trim_start_matches("0x")
                    .parse()
                    .map_err(|e| anyhow!("invalid private key: {}", e))?;
                let wallet = wallet.with_chain_id(config.chain_id);
                let address = wallet.address();
                info!("🔑 Wallet bound to chain {}: {:?}", config.chain_id, address);
                (
                    Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet))),
                    Some(address),
                )
            }
            None => {
                warn!(
                    "⚠️ No private key for chain {} - read-only client",
                    config.chain_id
                );
                (None, None)
            }
        };

        Ok(Self {
            chain_id: config.chain_id,
            name: config.name.clone(),
            provider,
            signer,
            wallet_address,
            mock_send_failures: AtomicU64::new(mocks::get_mock_config().send_failures),
        })
    }

    /// mock 모드에서 앞으로 count번의 send_transaction을 실패시킨다
    pub fn set_mock_send_failures(&self, count: u64) {
        self.mock_send_failures.store(count, Ordering::SeqCst);
    }

    pub fn mock_send_failures_remaining(&self) -> u64 {
        self.mock_send_failures.load(Ordering::SeqCst)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn wallet_address(&self) -> Option<Address> {
        self.wallet_address
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// 네이티브 토큰 잔액
    pub async fn get_native_balance(&self, address: Address) -> Result<U256> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            return Ok(mocks::mock_native_balance());
        }
        Ok(self.provider.get_balance(address, None).await?)
    }

    /// pending 기준 트랜잭션 카운트 (논스 시딩용)
    pub async fn get_pending_nonce(&self, address: Address) -> Result<u64> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            return Ok(mocks::get_mock_config().starting_nonce);
        }
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await?;
        Ok(nonce.as_u64())
    }

    /// 최신 블록의 base fee
    pub async fn latest_base_fee(&self) -> Result<U256> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            return Ok(U256::from(mocks::get_mock_config().base_fee));
        }
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await?
            .ok_or_else(|| anyhow!("no latest block from chain {}", self.chain_id))?;
        block
            .base_fee_per_gas
            .ok_or_else(|| anyhow!("chain {} has no base fee (pre-1559?)", self.chain_id))
    }

    /// 최근 블록들의 priority fee 중앙값 샘플 (fee_history 50퍼센타일)
    pub async fn recent_priority_fees(&self) -> Result<Vec<U256>> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            let fee = U256::from(mocks::get_mock_config().priority_fee);
            return Ok(vec![fee; FEE_HISTORY_BLOCKS as usize]);
        }
        let history = self
            .provider
            .fee_history(FEE_HISTORY_BLOCKS, BlockNumber::Latest, &[50.0])
            .await?;
        Ok(history
            .reward
            .into_iter()
            .filter_map(|percentiles| percentiles.into_iter().next())
            .collect())
    }

    /// legacy 경로용 gas price
    pub async fn gas_price(&self) -> Result<U256> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            let mock = mocks::get_mock_config();
            return Ok(U256::from(mock.base_fee + mock.priority_fee));
        }
        Ok(self.provider.get_gas_price().await?)
    }

    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            return Ok(U256::from(mocks::get_mock_config().gas_used));
        }
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    /// 서명 후 브로드캐스트. 해시만 반환하고 확인은 기다리지 않는다.
    pub async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            let inject = self
                .mock_send_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if inject {
                return Err(anyhow!("request timed out"));
            }
            let hash = mocks::mock_tx_hash();
            debug!("🎭 Mock submission on chain {}: {:?}", self.chain_id, hash);
            return Ok(hash);
        }

        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| anyhow!("no signer bound to chain {} client", self.chain_id))?;
        let pending = signer.send_transaction(tx, None).await?;
        let hash = *pending;
        debug!("📤 Transaction broadcast on {}: {:?}", self.name, hash);
        Ok(hash)
    }

    pub async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        if mocks::is_mock_mode() {
            mocks::mock_latency().await;
            return Ok(Some(mock_receipt(hash)));
        }
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    /// 영수증 폴링. 시한 내에 확인되지 않으면 Ok(None).
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<TransactionReceipt>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.get_receipt(hash).await? {
                return Ok(Some(receipt));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(poll_interval.min(deadline - Instant::now())).await;
        }
    }
}

fn mock_receipt(hash: H256) -> TransactionReceipt {
    let mock = mocks::get_mock_config();
    let reverted = mock.revert_rate > 0.0 && fastrand::f64() < mock.revert_rate;
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(mocks::next_mock_block())),
        gas_used: Some(U256::from(mock.gas_used)),
        effective_gas_price: Some(U256::from(mock.base_fee + mock.priority_fee)),
        status: Some(if reverted { U64::zero() } else { U64::one() }),
        ..Default::default()
    }
}

/// 체인별 클라이언트 풀
pub struct RpcPool {
    clients: HashMap<u64, Arc<ChainClient>>,
}

impl RpcPool {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn add(&mut self, client: Arc<ChainClient>) {
        info!("✅ Chain {} client registered", client.chain_id());
        self.clients.insert(client.chain_id(), client);
    }

    pub fn get(&self, chain_id: u64) -> Option<Arc<ChainClient>> {
        self.clients.get(&chain_id).cloned()
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.clients.keys().copied().collect()
    }

    /// 각 체인의 조회용 Provider 핸들 (오라클 소스 생성용)
    pub fn providers(&self) -> HashMap<u64, Arc<Provider<Http>>> {
        self.clients
            .iter()
            .map(|(id, c)| (*id, c.provider()))
            .collect()
    }
}

impl Default for RpcPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn chain_config() -> ChainConfig {
        Config::default().chains[0].clone()
    }

    #[tokio::test]
    async fn test_mock_client_roundtrip() {
        std::env::set_var("API_MODE", "mock");

        let client = ChainClient::connect(&chain_config(), None).await.unwrap();
        assert_eq!(client.chain_id(), 1);

        let balance = client.get_native_balance(Address::zero()).await.unwrap();
        assert!(balance > U256::zero());

        let base_fee = client.latest_base_fee().await.unwrap();
        assert_eq!(base_fee, U256::from(15_000_000_000u64));

        let hash = client
            .send_transaction(TypedTransaction::default())
            .await
            .unwrap();
        let receipt = client
            .wait_for_receipt(hash, Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap()
            .expect("mock receipt");
        assert_eq!(receipt.status, Some(U64::one()));
    }

    #[tokio::test]
    async fn test_pool_lookup() {
        std::env::set_var("API_MODE", "mock");

        let mut pool = RpcPool::new();
        let client = ChainClient::connect(&chain_config(), None).await.unwrap();
        pool.add(Arc::new(client));

        assert!(pool.get(1).is_some());
        assert!(pool.get(42161).is_none());
        assert_eq!(pool.chain_ids(), vec![1]);
    }
}
