//! Inbound payload decoding and validation.
//!
//! Payloads are JSON documents carrying the whole order aggregate. Every
//! attribute is required; unknown fields are ignored.

use chrono::SubsecRound;

use crate::error::DecodeError;
use crate::model::{Order, Timestamp};

/// Decode and validate a raw message payload into an [`Order`].
pub fn decode_order(payload: &[u8]) -> Result<Order, DecodeError> {
    let mut order: Order =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;

    validate(&order)?;
    order.date_created = normalize_timestamp(order.date_created);
    Ok(order)
}

/// Truncate to the microsecond precision the relational store keeps, so a
/// freshly decoded order equals its own read-back.
pub fn normalize_timestamp(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(6)
}

fn validate(order: &Order) -> Result<(), DecodeError> {
    if order.order_uid.trim().is_empty() {
        return Err(DecodeError::InvalidField {
            field: "order_uid".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use proptest::prelude::*;

    const MODEL: &str = r#"{
      "order_uid": "b563feb7b2b84b6test",
      "track_number": "WBILMTESTTRACK",
      "entry": "WBIL",
      "delivery": {
        "name": "Test Testov",
        "phone": "+9720000000",
        "zip": "2639809",
        "city": "Kiryat Mozkin",
        "address": "Ploshad Mira 15",
        "region": "Kraiot",
        "email": "test@gmail.com"
      },
      "payment": {
        "transaction": "b563feb7b2b84b6test",
        "request_id": "",
        "currency": "USD",
        "provider": "wbpay",
        "amount": 1817,
        "payment_dt": 1637907727,
        "bank": "alpha",
        "delivery_cost": 1500,
        "goods_total": 317,
        "custom_fee": 0
      },
      "items": [
        {
          "chrt_id": 9934930,
          "track_number": "WBILMTESTTRACK",
          "price": 453,
          "rid": "ab4219087a764ae0btest",
          "name": "Mascaras",
          "sale": 30,
          "size": "0",
          "total_price": 317,
          "nm_id": 2389212,
          "brand": "Vivienne Sabo",
          "status": 202
        }
      ],
      "locale": "en",
      "internal_signature": "",
      "customer_id": "test",
      "delivery_service": "meest",
      "shardkey": "9",
      "sm_id": 99,
      "date_created": "2021-11-26T06:22:19.123456789Z",
      "oof_shard": "1"
    }"#;

    #[test]
    fn test_decode_model_order() {
        let order = decode_order(MODEL.as_bytes()).unwrap();
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
    }

    #[test]
    fn test_decode_truncates_to_micros() {
        let order = decode_order(MODEL.as_bytes()).unwrap();
        assert_eq!(order.date_created.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_missing_nested_field_is_malformed() {
        let mut value: serde_json::Value = serde_json::from_str(MODEL).unwrap();
        value["payment"]
            .as_object_mut()
            .unwrap()
            .remove("currency");
        let bytes = serde_json::to_vec(&value).unwrap();

        let err = decode_order(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { ref reason } if reason.contains("currency")));
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = decode_order(b"order please").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_blank_order_uid_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(MODEL).unwrap();
        value["order_uid"] = serde_json::Value::String("   ".to_string());
        let bytes = serde_json::to_vec(&value).unwrap();

        let err = decode_order(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidField {
                field: "order_uid".to_string(),
                reason: "must not be empty".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut value: serde_json::Value = serde_json::from_str(MODEL).unwrap();
        value["delivery"]["Delivery_id"] = serde_json::json!(7);
        value["extra"] = serde_json::json!({"nested": true});
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(decode_order(&bytes).is_ok());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(normalize_timestamp(ts), ts);
        assert_eq!(normalize_timestamp(normalize_timestamp(ts)), ts);
    }

    proptest! {
        /// Any strict prefix of a valid payload is rejected as malformed.
        #[test]
        fn prop_truncated_payload_rejected(cut in 0usize..MODEL.len()) {
            let bytes = &MODEL.as_bytes()[..cut];
            let result = decode_order(bytes);
            prop_assert!(matches!(result, Err(DecodeError::Malformed { .. })), "expected Malformed, got {:?}", result);
        }
    }
}
