use crate::domain::{EscrowId, OrderId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    Released,
}

/// Funds debited from a buyer and held against one order until they are
/// released to sellers or the order is refunded.
///
/// `released_amount` is the cumulative outflow granted so far; it can grow
/// across several partial releases (one per seller) but never exceeds
/// `amount`. The status flips to `Released` on the first outflow and stays
/// there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: EscrowId,
    pub buyer_id: UserId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub released_amount: Decimal,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl EscrowRecord {
    pub fn new(buyer_id: impl Into<UserId>, order_id: OrderId, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer_id: buyer_id.into(),
            order_id,
            amount,
            released_amount: Decimal::ZERO,
            status: EscrowStatus::Held,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Escrow still available for release.
    pub fn remaining(&self) -> Decimal {
        self.amount - self.released_amount
    }

    /// Marks the whole amount as settled. Used when the order is refunded
    /// and the record must not grant anything further.
    pub fn close(&mut self) {
        self.released_amount = self.amount;
        self.status = EscrowStatus::Released;
        self.updated_at = Utc::now();
    }

    /// Takes up to `requested` out of the record and returns the amount
    /// actually granted, clamped to what is left. The caller decides
    /// whether a clamped grant is worth a warning.
    pub fn consume(&mut self, requested: Decimal) -> Decimal {
        let granted = requested.min(self.remaining());
        if granted <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.released_amount += granted;
        self.status = EscrowStatus::Released;
        self.updated_at = Utc::now();
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_consume_within_amount() {
        let mut record = EscrowRecord::new("alice", Uuid::new_v4(), dec!(100.0));
        let granted = record.consume(dec!(60.0));
        assert_eq!(granted, dec!(60.0));
        assert_eq!(record.remaining(), dec!(40.0));
        assert_eq!(record.status, EscrowStatus::Released);
    }

    #[test]
    fn test_consume_clamps_to_remaining() {
        let mut record = EscrowRecord::new("alice", Uuid::new_v4(), dec!(100.0));
        record.consume(dec!(80.0));

        let granted = record.consume(dec!(50.0));
        assert_eq!(granted, dec!(20.0));
        assert_eq!(record.remaining(), dec!(0.0));
        assert_eq!(record.released_amount, dec!(100.0));
    }

    #[test]
    fn test_consume_exhausted_grants_nothing() {
        let mut record = EscrowRecord::new("alice", Uuid::new_v4(), dec!(10.0));
        record.consume(dec!(10.0));

        assert_eq!(record.consume(dec!(1.0)), dec!(0.0));
        assert_eq!(record.released_amount, dec!(10.0));
    }

    #[test]
    fn test_new_record_is_held() {
        let record = EscrowRecord::new("alice", Uuid::new_v4(), dec!(5.0));
        assert_eq!(record.status, EscrowStatus::Held);
        assert_eq!(record.remaining(), dec!(5.0));
    }
}
