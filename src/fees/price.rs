//! Price Feed
//!
//! External pricing input of the fee aggregate.

use async_trait::async_trait;

use crate::error::{ApiError, Result};

// == Price Feed Trait ==
/// Source of the native token price in USD.
///
/// Failures must be reported as [`ApiError::UpstreamUnavailable`].
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn native_usd_price(&self) -> Result<f64>;
}

/// Rejects prices no aggregate should be computed from.
pub fn check_price(price: f64) -> Result<f64> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ApiError::upstream(format!(
            "price feed returned invalid price {}",
            price
        )))
    }
}

// == Static Price Feed ==
/// Price feed answering with a fixed, configured price.
#[derive(Debug, Clone, Copy)]
pub struct StaticPriceFeed {
    price: f64,
}

impl StaticPriceFeed {
    pub fn new(price: f64) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn native_usd_price(&self) -> Result<f64> {
        check_price(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_price() {
        let feed = StaticPriceFeed::new(2500.5);
        assert_eq!(feed.native_usd_price().await.unwrap(), 2500.5);
    }

    #[tokio::test]
    async fn test_invalid_price_is_upstream_error() {
        let err = StaticPriceFeed::new(f64::NAN)
            .native_usd_price()
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_unavailable");
        assert!(check_price(-1.0).is_err());
    }
}
