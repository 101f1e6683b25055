//! orderline Test Utilities
//!
//! Shared test infrastructure for the orderline workspace:
//! - Proptest generators for the order aggregate
//! - Fixtures and JSON payloads
//! - Assertions over the error taxonomy

// Re-export mocks from their source crate
pub use orderline_storage::{MockConnector, MockStore, OrderCache, RecordingSleeper};

pub use orderline_core::{
    Delivery, Item, Order, OrderError, OrderResult, Payment, StoreError, Timestamp, WriteStage,
};

pub use fixtures::{order_payload, sample_order};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for order aggregates.
    //!
    //! Generated timestamps carry microsecond precision, the resolution the
    //! store keeps, so generated orders survive a store round trip unchanged.

    use super::*;
    use chrono::DateTime;
    use proptest::prelude::*;

    pub fn arb_order_uid() -> impl Strategy<Value = String> {
        "[a-z0-9]{8,24}"
    }

    fn arb_text() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 @.+-]{0,16}"
    }

    /// Timestamp between 2020 and 2030 with microsecond precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64, 0u32..1_000_000u32).prop_filter_map(
            "timestamp out of range",
            |(secs, micros)| DateTime::from_timestamp(secs, micros * 1_000),
        )
    }

    pub fn arb_delivery() -> impl Strategy<Value = Delivery> {
        (
            arb_text(),
            arb_text(),
            "[0-9]{5,7}",
            arb_text(),
            arb_text(),
            arb_text(),
            arb_text(),
        )
            .prop_map(|(name, phone, zip, city, address, region, email)| Delivery {
                name,
                phone,
                zip,
                city,
                address,
                region,
                email,
            })
    }

    pub fn arb_payment() -> impl Strategy<Value = Payment> {
        (
            arb_text(),
            arb_text(),
            "[A-Z]{3}",
            arb_text(),
            0i64..1_000_000,
            any::<i64>(),
            arb_text(),
            0i64..100_000,
            0i64..1_000_000,
            0i64..10_000,
        )
            .prop_map(
                |(
                    transaction,
                    request_id,
                    currency,
                    provider,
                    amount,
                    payment_dt,
                    bank,
                    delivery_cost,
                    goods_total,
                    custom_fee,
                )| Payment {
                    transaction,
                    request_id,
                    currency,
                    provider,
                    amount,
                    payment_dt,
                    bank,
                    delivery_cost,
                    goods_total,
                    custom_fee,
                },
            )
    }

    pub fn arb_item() -> impl Strategy<Value = Item> {
        (
            any::<i64>(),
            arb_text(),
            0i64..100_000,
            arb_text(),
            arb_text(),
            0i64..100,
            arb_text(),
            0i64..100_000,
            any::<i64>(),
            arb_text(),
            0i64..1_000,
        )
            .prop_map(
                |(chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status)| {
                    Item {
                        chrt_id,
                        track_number,
                        price,
                        rid,
                        name,
                        sale,
                        size,
                        total_price,
                        nm_id,
                        brand,
                        status,
                    }
                },
            )
    }

    /// Complete order with zero to four items.
    pub fn arb_order() -> impl Strategy<Value = Order> {
        (
            (
                arb_order_uid(),
                arb_text(),
                arb_text(),
                "[a-z]{2}",
                arb_text(),
                arb_text(),
                arb_text(),
                "[0-9]{1,2}",
                "[0-9]{1,2}",
            ),
            (any::<i64>(), arb_timestamp()),
            arb_delivery(),
            arb_payment(),
            proptest::collection::vec(arb_item(), 0..5),
        )
            .prop_map(
                |(
                    (
                        order_uid,
                        track_number,
                        entry,
                        locale,
                        internal_signature,
                        customer_id,
                        delivery_service,
                        shardkey,
                        oof_shard,
                    ),
                    (sm_id, date_created),
                    delivery,
                    payment,
                    items,
                )| Order {
                    order_uid,
                    track_number,
                    entry,
                    delivery,
                    payment,
                    items,
                    locale,
                    internal_signature,
                    customer_id,
                    delivery_service,
                    shardkey,
                    sm_id,
                    date_created,
                    oof_shard,
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fixed orders and payloads.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// The reference order message, as producers publish it.
    pub const MODEL_PAYLOAD: &str = r#"{
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
  "date_created": "2021-11-26T06:22:19Z",
  "oof_shard": "1"
}"#;

    /// The reference order with `order_uid` (and transaction) replaced.
    pub fn sample_order(order_uid: &str) -> Order {
        Order {
            order_uid: order_uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                phone: "+9720000000".to_string(),
                zip: "2639809".to_string(),
                city: "Kiryat Mozkin".to_string(),
                address: "Ploshad Mira 15".to_string(),
                region: "Kraiot".to_string(),
                email: "test@gmail.com".to_string(),
            },
            payment: Payment {
                transaction: order_uid.to_string(),
                request_id: String::new(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1637907727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![Item {
                chrt_id: 9934930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2389212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }],
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
            oof_shard: "1".to_string(),
        }
    }

    /// JSON message body for `order`.
    pub fn order_payload(order: &Order) -> Vec<u8> {
        serde_json::to_vec(order).expect("Order serializes to JSON")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over [`OrderResult`] outcomes.

    use super::*;

    pub fn assert_decode_error<T: std::fmt::Debug>(result: &OrderResult<T>) {
        assert!(
            matches!(result, Err(OrderError::Decode(_))),
            "Expected decode error, got {:?}",
            result
        );
    }

    /// Transactional write failure: rolled back, nothing visible.
    pub fn assert_write_error<T: std::fmt::Debug>(result: &OrderResult<T>) {
        assert!(
            matches!(result, Err(OrderError::Store(err)) if err.is_write_error()),
            "Expected store write error, got {:?}",
            result
        );
    }

    pub fn assert_duplicate<T: std::fmt::Debug>(result: &OrderResult<T>) {
        assert!(
            matches!(result, Err(OrderError::Store(StoreError::DuplicateOrder { .. }))),
            "Expected duplicate order error, got {:?}",
            result
        );
    }

    /// No order row and no orphaned child rows.
    pub async fn assert_store_empty(store: &MockStore) {
        assert_eq!(store.order_count().await, 0, "orders");
        assert_eq!(store.delivery_count().await, 0, "delivery");
        assert_eq!(store.payment_count().await, 0, "payment");
        assert_eq!(store.item_count().await, 0, "items");
        assert_eq!(store.order_item_count().await, 0, "orders_items");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::decode_order;
    use proptest::prelude::*;

    #[test]
    fn test_model_payload_matches_sample_order() {
        let decoded = decode_order(fixtures::MODEL_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(decoded, sample_order("b563feb7b2b84b6test"));
    }

    proptest! {
        #[test]
        fn prop_generated_orders_decode_unchanged(order in generators::arb_order()) {
            let decoded = decode_order(&order_payload(&order)).unwrap();
            prop_assert_eq!(decoded, order);
        }
    }
}
