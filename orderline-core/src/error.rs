//! Error types for orderline operations

use std::fmt;
use thiserror::Error;

/// Step of the order write transaction at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStage {
    Begin,
    Delivery,
    Payment,
    Item,
    OrderItem,
    Order,
    Commit,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteStage::Begin => "begin",
            WriteStage::Delivery => "delivery",
            WriteStage::Payment => "payment",
            WriteStage::Item => "item",
            WriteStage::OrderItem => "order_item",
            WriteStage::Order => "order",
            WriteStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Inbound payload errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed order payload: {reason}")]
    Malformed { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Could not connect to store after {attempts} attempts: {reason}")]
    ConnectFailed { attempts: u32, reason: String },

    #[error("Write of order {order_uid} failed at {stage}: {reason}")]
    WriteFailed {
        order_uid: String,
        stage: WriteStage,
        reason: String,
    },

    #[error("Order {order_uid} already exists")]
    DuplicateOrder { order_uid: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Stored row for order {order_uid} is corrupt: {reason}")]
    CorruptRow { order_uid: String, reason: String },
}

impl StoreError {
    /// True for failures of the transactional write path. The transaction
    /// was rolled back and nothing of the order is visible.
    pub fn is_write_error(&self) -> bool {
        matches!(
            self,
            StoreError::WriteFailed { .. } | StoreError::DuplicateOrder { .. }
        )
    }

    /// True when the store could not be reached at all.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, StoreError::ConnectFailed { .. })
    }
}

/// Message stream errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Failed to fetch message: {reason}")]
    Fetch { reason: String },

    #[error("Failed to commit offset {offset} on partition {partition}: {reason}")]
    Commit {
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("Message stream closed")]
    Closed,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all orderline errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for orderline operations.
pub type OrderResult<T> = Result<T, OrderError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

// =============================================================================
// TESTS
// =============================================================================
