use crate::domain::{OrderId, TransactionId, UserId};
use crate::domain::money::Amount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Escrow,
    EscrowRelease,
    Refund,
    Transfer,
    DirectPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Failed,
    Cancelled,
}

/// One ledger entry. The ledger is append-only: entries are never mutated
/// after commit (withdrawal review would flip `status`, but that workflow
/// lives outside this crate).
///
/// `amount` is signed from the perspective of `user_id`: negative for
/// debits, positive for credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub order_id: Option<OrderId>,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn credit(
        user_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: Amount,
        order_id: Option<OrderId>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(user_id, kind, amount.value(), order_id, description)
    }

    pub fn debit(
        user_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: Amount,
        order_id: Option<OrderId>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(user_id, kind, -amount.value(), order_id, description)
    }

    fn build(
        user_id: impl Into<UserId>,
        kind: TransactionKind,
        amount: Decimal,
        order_id: Option<OrderId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            amount,
            order_id,
            status: TransactionStatus::Completed,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn pending(mut self) -> Self {
        self.status = TransactionStatus::Pending;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_debit_is_negative_credit_is_positive() {
        let amount = Amount::new(dec!(42.0)).unwrap();
        let debit = Transaction::debit("alice", TransactionKind::Escrow, amount, None, "hold");
        let credit = Transaction::credit("bob", TransactionKind::EscrowRelease, amount, None, "pay");

        assert_eq!(debit.amount, dec!(-42.0));
        assert_eq!(credit.amount, dec!(42.0));
        assert_eq!(debit.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionKind::DirectPayment).unwrap();
        assert_eq!(json, "\"direct_payment\"");
        let json = serde_json::to_string(&TransactionKind::EscrowRelease).unwrap();
        assert_eq!(json, "\"escrow_release\"");
    }

    #[test]
    fn test_pending_marker() {
        let amount = Amount::new(dec!(5.0)).unwrap();
        let tx = Transaction::debit("bob", TransactionKind::Withdrawal, amount, None, "payout")
            .pending();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }
}
