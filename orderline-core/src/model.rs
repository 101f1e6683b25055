//! Order aggregate
//!
//! An [`Order`] owns exactly one [`Delivery`], one [`Payment`] and zero or
//! more [`Item`]s. The aggregate is persisted and cached as one unit. Store
//! surrogate ids never appear here: the only external key is `order_uid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Natural key of an order, supplied by the upstream producer.
pub type OrderId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// ROOT AGGREGATE
// ============================================================================

/// Order root with its owned delivery, payment and item set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: OrderId,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: Timestamp,
    pub oof_shard: String,
}

impl Order {
    /// Identifier used as the cache and lookup key.
    pub fn id(&self) -> &str {
        &self.order_uid
    }
}

// ============================================================================
// OWNED ENTITIES
// ============================================================================

/// Recipient contact and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Transaction and financial facts of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds as sent by the payment provider.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// Single line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}
