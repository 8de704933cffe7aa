//! Fees Module
//!
//! The fee aggregate, its external price input and the service that keeps
//! it in sync with processed events.

mod model;
mod price;
mod retry;
mod service;

pub use model::{fee_of, BlockPosition, FeeInfo};
pub use price::{check_price, PriceFeed, StaticPriceFeed};
pub use retry::RetryPolicy;
pub use service::{FeeService, DEFAULT_COMPUTE_TIMEOUT, DEFAULT_FEE_TTL, FEE_INFO_CACHE};
