use crate::domain::UserId;
use crate::domain::money::{Amount, Balance};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's wallet. There is exactly one wallet per user: the record is
/// keyed by the user id, so duplication is ruled out by construction
/// rather than by a lookup that could race.
///
/// The balance only ever changes through `credit` and `debit`, and every
/// such change is paired with exactly one ledger transaction committed in
/// the same atomic batch by the calling service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency tag; bumped by the store on every commit.
    #[serde(default)]
    pub version: u64,
}

impl Wallet {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            balance: Balance::ZERO,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
        self.updated_at = Utc::now();
    }

    /// Debits the wallet, failing with `InsufficientFunds` if the balance
    /// would go negative. The balance is left untouched on failure.
    pub fn debit(&mut self, amount: Amount) -> Result<(), MarketError> {
        let requested: Balance = amount.into();
        if self.balance >= requested {
            self.balance -= requested;
            self.updated_at = Utc::now();
            Ok(())
        } else {
            Err(MarketError::InsufficientFunds {
                required: amount.value(),
                available: self.balance.value(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(v: rust_decimal::Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    #[test]
    fn test_new_wallet_is_empty() {
        let wallet = Wallet::new("alice");
        assert_eq!(wallet.balance, Balance::ZERO);
        assert_eq!(wallet.version, 0);
    }

    #[test]
    fn test_credit_increases_balance() {
        let mut wallet = Wallet::new("alice");
        wallet.credit(amount(dec!(25.50)));
        wallet.credit(amount(dec!(4.50)));
        assert_eq!(wallet.balance, Balance::new(dec!(30.00)));
    }

    #[test]
    fn test_debit_success() {
        let mut wallet = Wallet::new("alice");
        wallet.credit(amount(dec!(10.0)));
        wallet.debit(amount(dec!(4.0))).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(6.0)));
    }

    #[test]
    fn test_debit_insufficient_funds_leaves_balance() {
        let mut wallet = Wallet::new("alice");
        wallet.credit(amount(dec!(10.0)));

        let err = wallet.debit(amount(dec!(10.5))).unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientFunds { required, available }
                if required == dec!(10.5) && available == dec!(10.0)
        ));
        assert_eq!(wallet.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut wallet = Wallet::new("alice");
        wallet.credit(amount(dec!(10.0)));
        wallet.debit(amount(dec!(10.0))).unwrap();
        assert_eq!(wallet.balance, Balance::ZERO);
    }
}
