use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::types::{EngineError, EngineResult};

/// 지갑별 서킷 브레이커 상태 스냅샷 (API 노출용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub wallet: Address,
    pub is_open: bool,
    pub failure_count: u32,
    pub threshold: u32,
    pub trip_count: u64,
    pub opened_at: Option<DateTime<Utc>>,
}

/// 연속 실패 누적으로 열리는 지갑별 서킷 브레이커
///
/// 임계치에 도달하면 열리고, 이후 모든 실행 시도를 거부한다.
/// 자동 복구는 없다. 운영자가 원인을 확인하고 수동으로 reset해야 닫힌다.
pub struct CircuitBreaker {
    wallet: Address,
    threshold: u32,
    failure_count: AtomicU32,
    is_open: AtomicBool,
    trip_count: AtomicU64,
    opened_at: Mutex<Option<DateTime<Utc>>>,
}

impl CircuitBreaker {
    pub fn new(wallet: Address, threshold: u32) -> Self {
        Self {
            wallet,
            threshold: threshold.max(1),
            failure_count: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            trip_count: AtomicU64::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// 실행 전 게이트. 열려 있으면 CircuitBreakerOpen.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_open.load(Ordering::SeqCst) {
            return Err(EngineError::CircuitBreakerOpen {
                wallet: self.wallet,
                failure_count: self.failure_count.load(Ordering::SeqCst),
            });
        }
        Ok(())
    }

    /// 실패 기록. 이 호출로 브레이커가 열렸으면 true.
    pub fn record_failure(&self) -> bool {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.threshold && !self.is_open.swap(true, Ordering::SeqCst) {
            self.trip_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut opened) = self.opened_at.lock() {
                *opened = Some(Utc::now());
            }
            error!(
                "🚨 Circuit breaker OPEN for {:?} after {} consecutive failures",
                self.wallet, count
            );
            return true;
        }
        false
    }

    /// 성공 확정 시 연속 실패 카운터 리셋
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
    }

    /// 수동 리셋 (운영자 API 경유)
    pub fn reset(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let was_open = self.is_open.swap(false, Ordering::SeqCst);
        if let Ok(mut opened) = self.opened_at.lock() {
            *opened = None;
        }
        if was_open {
            info!("✅ Circuit breaker manually reset for {:?}", self.wallet);
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            wallet: self.wallet,
            is_open: self.is_open.load(Ordering::SeqCst),
            failure_count: self.failure_count.load(Ordering::SeqCst),
            threshold: self.threshold,
            trip_count: self.trip_count.load(Ordering::SeqCst),
            opened_at: self.opened_at.lock().ok().and_then(|g| *g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(Address::zero(), 5);

        for i in 1..=4 {
            assert!(!breaker.record_failure(), "opened early at failure {}", i);
            assert!(breaker.check().is_ok());
        }
        assert!(breaker.record_failure());
        assert!(breaker.is_open());

        let err = breaker.check().unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_BREAKER_OPEN");
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new(Address::zero(), 3);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        // 카운터가 0으로 돌아갔으므로 다시 3번 실패해야 열린다
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_no_automatic_recovery() {
        let breaker = CircuitBreaker::new(Address::zero(), 1);
        breaker.record_failure();
        assert!(breaker.is_open());

        // 성공 기록도 열린 브레이커를 닫지 못한다
        breaker.record_success();
        assert!(breaker.is_open());

        breaker.reset();
        assert!(!breaker.is_open());
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn test_snapshot_tracks_trips() {
        let breaker = CircuitBreaker::new(Address::repeat_byte(0xaa), 2);
        breaker.record_failure();
        breaker.record_failure();

        let state = breaker.snapshot();
        assert!(state.is_open);
        assert_eq!(state.failure_count, 2);
        assert_eq!(state.trip_count, 1);
        assert!(state.opened_at.is_some());

        breaker.reset();
        let state = breaker.snapshot();
        assert!(!state.is_open);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.trip_count, 1);
        assert!(state.opened_at.is_none());
    }
}
