use crate::domain::order::OrderStatus;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketError>;

/// Error taxonomy for the marketplace core.
///
/// Validation and permission errors abort an operation before any write.
/// `PaymentFailure` is the one exception: a release or refund that fails
/// after the order transition has been decided is surfaced through the
/// order's payment status instead of aborting the transition.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("payment failure: {0}")]
    PaymentFailure(String),

    /// A guarded commit lost an optimistic-concurrency race. Services retry
    /// the whole read-modify-write cycle on this error.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }
}
