use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use chrono::Utc;

use crate::constants::PYTH_MAX_AGE_SECS;
use crate::types::AssetPriceConfig;
use super::source::{OraclePrice, OracleSource};

#[derive(Debug, Deserialize)]
struct PythFeedResponse {
    id: String,
    price: PythPriceData,
}

#[derive(Debug, Deserialize)]
struct PythPriceData {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

/// Pyth Hermes REST 오라클 소스
///
/// `latest_price_feeds` 엔드포인트에서 설정된 price id의 피드를 조회한다.
pub struct PythSource {
    client: reqwest::Client,
    endpoint: String,
}

impl PythSource {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// 정수 가수 × 10^expo 를 Decimal로 정규화
    fn normalize(mantissa: i64, expo: i32) -> Decimal {
        if expo <= 0 {
            Decimal::new(mantissa, (-expo) as u32)
        } else {
            Decimal::from(mantissa) * Decimal::from(10i64.pow(expo as u32))
        }
    }
}

#[async_trait]
impl OracleSource for PythSource {
    fn name(&self) -> &'static str {
        "pyth"
    }

    fn supports(&self, asset: &AssetPriceConfig) -> bool {
        asset.pyth_price_id.is_some()
    }

    async fn fetch_price(&self, asset: &AssetPriceConfig) -> Result<OraclePrice> {
        let price_id = asset
            .pyth_price_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no pyth price id for {}", asset.symbol))?;

        let url = format!("{}/api/latest_price_feeds", self.endpoint);
        let feeds: Vec<PythFeedResponse> = self
            .client
            .get(&url)
            .query(&[("ids[]", price_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let feed = feeds
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty pyth response for {}", price_id))?;

        let now = Utc::now().timestamp();
        let age = now.saturating_sub(feed.price.publish_time);
        if age > PYTH_MAX_AGE_SECS as i64 {
            return Err(anyhow::anyhow!(
                "stale pyth feed {} (published {}s ago)",
                feed.id,
                age
            ));
        }

        let mantissa: i64 = feed.price.price.parse()?;
        let conf: i64 = feed.price.conf.parse()?;
        if mantissa <= 0 {
            return Err(anyhow::anyhow!("non-positive pyth price for {}", asset.symbol));
        }

        let price = Self::normalize(mantissa, feed.price.expo);
        // conf는 가격과 같은 지수의 신뢰 구간 폭: 좁을수록 신뢰도가 높다
        let conf_ratio = conf as f64 / mantissa as f64;
        let confidence = (1.0 - conf_ratio).clamp(0.0, 0.99);

        debug!(
            "Pyth price for {}: ${} (conf ratio {:.5})",
            asset.symbol, price, conf_ratio
        );

        let mut reading = OraclePrice::new(self.name(), price, confidence);
        reading.timestamp = feed.price.publish_time as u64;
        reading.validate()?;
        Ok(reading)
    }
}
