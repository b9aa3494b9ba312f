use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use chrono::Utc;

use crate::types::AssetPriceConfig;

/// 단일 오라클 소스가 반환하는 가격 데이터
#[derive(Debug, Clone, PartialEq)]
pub struct OraclePrice {
    /// 소스 이름 ("chainlink", "pyth" 등)
    pub source: String,
    /// USD 가격
    pub price: Decimal,
    /// 유닉스 타임스탬프 (초)
    pub timestamp: u64,
    /// 소스 자체 신뢰도 (0.0 ~ 1.0)
    pub confidence: f64,
}

impl OraclePrice {
    pub fn new(source: &str, price: Decimal, confidence: f64) -> Self {
        Self {
            source: source.to_string(),
            price,
            timestamp: Utc::now().timestamp() as u64,
            confidence,
        }
    }

    /// 가격이 만료되었는지 확인
    pub fn is_stale(&self, max_age_secs: u64) -> bool {
        let now = Utc::now().timestamp() as u64;
        now.saturating_sub(self.timestamp) > max_age_secs
    }

    /// 가격 유효성 검증: 양수 가격, 0~1 신뢰도, 미래 타임스탬프 금지
    pub fn validate(&self) -> Result<()> {
        if self.price <= Decimal::ZERO {
            return Err(anyhow::anyhow!("invalid price: zero or negative"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow::anyhow!("invalid confidence: must be between 0 and 1"));
        }
        let now = Utc::now().timestamp() as u64;
        if self.timestamp > now + 60 {
            return Err(anyhow::anyhow!("invalid timestamp: price is from the future"));
        }
        Ok(())
    }
}

/// 오라클 소스 트레이트
///
/// 소스마다 자체 staleness/sanity 검사를 적용하고, 거부 시 에러를 반환한다.
/// 합의 서비스는 에러를 "응답 없음"으로 취급한다.
#[async_trait]
pub trait OracleSource: Send + Sync {
    /// 소스 이름
    fn name(&self) -> &'static str;

    /// 이 자산 설정으로 조회 가능한지 (필요한 식별자가 있는지)
    fn supports(&self, asset: &AssetPriceConfig) -> bool;

    /// 자산의 USD 가격 조회
    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_staleness() {
        let mut price = OraclePrice::new("test", Decimal::from(100), 0.9);
        assert!(!price.is_stale(30));

        price.timestamp -= 60;
        assert!(price.is_stale(30));
        assert!(!price.is_stale(120));
    }

    #[test]
    fn test_price_validation() {
        let good = OraclePrice::new("test", Decimal::from(100), 0.9);
        assert!(good.validate().is_ok());

        let negative = OraclePrice::new("test", Decimal::from(-1), 0.9);
        assert!(negative.validate().is_err());

        let bad_confidence = OraclePrice::new("test", Decimal::from(100), 1.5);
        assert!(bad_confidence.validate().is_err());

        let mut future = OraclePrice::new("test", Decimal::from(100), 0.9);
        future.timestamp += 3_600;
        assert!(future.validate().is_err());
    }
}
