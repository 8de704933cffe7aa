//! Fee Model
//!
//! The fee aggregate and the fold that derives it from processed events.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::events::Event;

/// Wei per native token
const WEI_PER_NATIVE: f64 = 1e18;

// == Block Position ==
/// Canonical chain position of the last applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPosition {
    pub block_number: u64,
    pub block_index: u32,
}

// == Fee Info ==
/// Fee aggregate of one contract.
///
/// Wei amounts are serialized as decimal strings so they survive JSON
/// consumers without 128-bit integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInfo {
    pub contract: String,
    /// Processed events folded into this aggregate
    pub event_count: u64,
    #[serde(with = "decimal_string")]
    pub total_fee_wei: u128,
    #[serde(with = "decimal_string")]
    pub average_fee_wei: u128,
    pub last_position: Option<BlockPosition>,
    pub native_usd_price: f64,
    pub total_fee_usd: f64,
}

impl FeeInfo {
    // == Fold ==
    /// Folds processed events, in canonical order, into an aggregate.
    ///
    /// Deterministic for the same events and price. Fees were validated at
    /// ingestion, so an unreadable fee here is an internal error.
    pub fn from_events(contract: &str, events: &[Event], native_usd_price: f64) -> Result<Self> {
        let mut total: u128 = 0;
        let mut last_position = None;

        for event in events {
            let fee = fee_of(&event.payload).map_err(|message| {
                ApiError::internal(format!("stored event {}: {}", event.id, message))
            })?;
            total = total.checked_add(fee).ok_or_else(|| {
                ApiError::internal(format!("fee total of {} overflows", contract))
            })?;
            last_position = Some(BlockPosition {
                block_number: event.block_number,
                block_index: event.block_index,
            });
        }

        let event_count = events.len() as u64;
        let average_fee_wei = if event_count == 0 {
            0
        } else {
            total / u128::from(event_count)
        };

        Ok(Self {
            contract: contract.to_string(),
            event_count,
            total_fee_wei: total,
            average_fee_wei,
            last_position,
            native_usd_price,
            total_fee_usd: total as f64 / WEI_PER_NATIVE * native_usd_price,
        })
    }
}

// == Fee Extraction ==
/// Reads the `fee` field (wei) of an event payload.
///
/// Absent or null fees count as zero; decimal strings and non-negative
/// integers are accepted.
pub fn fee_of(payload: &serde_json::Value) -> std::result::Result<u128, String> {
    match payload.get("fee") {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::String(text)) => text
            .parse::<u128>()
            .map_err(|_| format!("fee {:?} is not a non-negative integer", text)),
        Some(serde_json::Value::Number(number)) => number
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| format!("fee {} is not a non-negative integer", number)),
        Some(other) => Err(format!("fee must be a string or integer, got {}", other)),
    }
}

mod decimal_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventId, RawEvent};
    use chrono::Utc;
    use serde_json::json;

    fn event(id: u64, block_number: u64, payload: serde_json::Value) -> Event {
        let raw = RawEvent {
            contract: "0xA".to_string(),
            tx_hash: format!("t{}", id),
            block_number,
            block_index: 0,
            payload,
        };
        Event::from_raw(EventId(id), raw, Utc::now())
    }

    #[test]
    fn test_fee_of_variants() {
        assert_eq!(fee_of(&json!({})), Ok(0));
        assert_eq!(fee_of(&json!({ "fee": null })), Ok(0));
        assert_eq!(fee_of(&json!({ "fee": "1000000000000000000000" })), Ok(10u128.pow(21)));
        assert_eq!(fee_of(&json!({ "fee": 25 })), Ok(25));
        assert!(fee_of(&json!({ "fee": -1 })).is_err());
        assert!(fee_of(&json!({ "fee": "1.5" })).is_err());
        assert!(fee_of(&json!({ "fee": [1] })).is_err());
    }

    #[test]
    fn test_fold_totals() {
        let events = vec![
            event(1, 10, json!({ "fee": "1000000000000000000" })),
            event(2, 11, json!({ "fee": "3000000000000000000" })),
            event(3, 12, json!({})),
        ];

        let info = FeeInfo::from_events("0xA", &events, 2000.0).unwrap();

        assert_eq!(info.event_count, 3);
        assert_eq!(info.total_fee_wei, 4 * 10u128.pow(18));
        assert_eq!(info.average_fee_wei, 4 * 10u128.pow(18) / 3);
        assert_eq!(
            info.last_position,
            Some(BlockPosition {
                block_number: 12,
                block_index: 0
            })
        );
        assert!((info.total_fee_usd - 8000.0).abs() < 1e-6);
    }

    #[test]
    fn test_fold_empty() {
        let info = FeeInfo::from_events("0xA", &[], 1.0).unwrap();
        assert_eq!(info.event_count, 0);
        assert_eq!(info.average_fee_wei, 0);
        assert!(info.last_position.is_none());
    }

    #[test]
    fn test_fold_is_replayable() {
        let events = vec![event(1, 10, json!({ "fee": 5 })), event(2, 11, json!({ "fee": 7 }))];
        let a = FeeInfo::from_events("0xA", &events, 3.0).unwrap();
        let b = FeeInfo::from_events("0xA", &events, 3.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wei_serialized_as_string() {
        let events = vec![event(1, 10, json!({ "fee": "340282366920938463463374607431768211455" }))];
        let info = FeeInfo::from_events("0xA", &events, 0.0).unwrap();

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value["totalFeeWei"],
            json!("340282366920938463463374607431768211455")
        );

        let back: FeeInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, info);
    }
}
