use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::blockchain::RpcPool;
use crate::types::{EngineError, EngineResult};

#[derive(Debug, Default)]
struct WalletNonce {
    next: Option<u64>,
}

/// 지갑별 논스 할당기
///
/// 지갑마다 별도 Mutex를 두어 같은 지갑의 할당은 직렬화하고
/// 다른 지갑끼리는 서로 블로킹하지 않는다. 첫 할당 시 체인의
/// pending 카운트로 시딩하고, 이후에는 로컬 카운터만 증가시킨다.
pub struct NonceSequencer {
    pool: Arc<RpcPool>,
    wallets: Mutex<HashMap<(u64, Address), Arc<Mutex<WalletNonce>>>>,
}

impl NonceSequencer {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        Self {
            pool,
            wallets: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, chain_id: u64, address: Address) -> Arc<Mutex<WalletNonce>> {
        let mut wallets = self.wallets.lock().await;
        wallets
            .entry((chain_id, address))
            .or_insert_with(|| Arc::new(Mutex::new(WalletNonce::default())))
            .clone()
    }

    /// 다음 논스 할당. 같은 지갑의 동시 호출은 겹치지 않는 값을 받는다.
    pub async fn next_nonce(&self, chain_id: u64, address: Address) -> EngineResult<u64> {
        let slot = self.slot(chain_id, address).await;
        let mut state = slot.lock().await;

        if state.next.is_none() {
            let seeded = self.seed_from_chain(chain_id, address).await?;
            info!(
                "🔢 Nonce seeded for {:?} on chain {}: {}",
                address, chain_id, seeded
            );
            state.next = Some(seeded);
        }

        let nonce = state.next.unwrap_or_default();
        state.next = Some(nonce + 1);
        debug!("Nonce {} allocated to {:?} on chain {}", nonce, address, chain_id);
        Ok(nonce)
    }

    /// 논스 충돌 후 체인 상태로 재동기화
    pub async fn resync(&self, chain_id: u64, address: Address) -> EngineResult<u64> {
        let slot = self.slot(chain_id, address).await;
        let mut state = slot.lock().await;

        let seeded = self.seed_from_chain(chain_id, address).await?;
        info!(
            "🔄 Nonce resynced for {:?} on chain {}: {}",
            address, chain_id, seeded
        );
        state.next = Some(seeded);
        Ok(seeded)
    }

    async fn seed_from_chain(&self, chain_id: u64, address: Address) -> EngineResult<u64> {
        let client = self
            .pool
            .get(chain_id)
            .ok_or_else(|| EngineError::Config(format!("no rpc client for chain {}", chain_id)))?;
        client
            .get_pending_nonce(address)
            .await
            .map_err(|e| EngineError::Network(format!("nonce seed failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::blockchain::ChainClient;
    use crate::config::Config;

    async fn mock_sequencer() -> Arc<NonceSequencer> {
        std::env::set_var("API_MODE", "mock");
        let chain = Config::default().chains[0].clone();
        let client = ChainClient::connect(&chain, None).await.unwrap();
        let mut pool = RpcPool::new();
        pool.add(Arc::new(client));
        Arc::new(NonceSequencer::new(Arc::new(pool)))
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let sequencer = mock_sequencer().await;
        let wallet = Address::repeat_byte(0x11);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let seq = sequencer.clone();
            handles.push(tokio::spawn(
                async move { seq.next_nonce(1, wallet).await },
            ));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let nonce = handle.await.unwrap().unwrap();
            assert!(seen.insert(nonce), "duplicate nonce {}", nonce);
        }
        // mock 시드는 0에서 시작하므로 정확히 0..20이어야 한다
        assert_eq!(seen, (0..20).collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn test_wallets_do_not_share_counters() {
        let sequencer = mock_sequencer().await;
        let a = Address::repeat_byte(0x22);
        let b = Address::repeat_byte(0x33);

        assert_eq!(sequencer.next_nonce(1, a).await.unwrap(), 0);
        assert_eq!(sequencer.next_nonce(1, a).await.unwrap(), 1);
        assert_eq!(sequencer.next_nonce(1, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resync_rewinds_to_chain_state() {
        let sequencer = mock_sequencer().await;
        let wallet = Address::repeat_byte(0x44);

        for _ in 0..5 {
            sequencer.next_nonce(1, wallet).await.unwrap();
        }
        // mock 체인의 pending 카운트는 항상 0
        assert_eq!(sequencer.resync(1, wallet).await.unwrap(), 0);
        assert_eq!(sequencer.next_nonce(1, wallet).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_chain_rejected() {
        let sequencer = mock_sequencer().await;
        let err = sequencer
            .next_nonce(999, Address::zero())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
