//! 멀티체인 아비트라지 실행 엔진
//!
//! 경로 저장소에서 후보 경로를 받아 오라클 합의 가격으로 검증하고,
//! 지갑 워커 풀에서 동시성 제한 하에 온체인 실행한다.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod constants;
pub mod executor;
pub mod mocks;
pub mod oracle;
pub mod orchestrator;
pub mod stores;
pub mod types;

pub use config::Config;
pub use orchestrator::ParallelOrchestrator;
pub use types::{EngineError, EngineResult};
