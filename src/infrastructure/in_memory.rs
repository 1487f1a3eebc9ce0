use crate::domain::escrow::EscrowRecord;
use crate::domain::order::{Dispute, Order, Suborder};
use crate::domain::ports::{BatchWrite, Guard, MarketStore, WriteBatch};
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::wallet::Wallet;
use crate::domain::{OrderId, SuborderId, UserId};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    wallets: HashMap<UserId, Wallet>,
    orders: HashMap<OrderId, Order>,
    suborders: HashMap<SuborderId, Suborder>,
    escrows: HashMap<OrderId, EscrowRecord>,
    transactions: Vec<Transaction>,
    disputes: Vec<Dispute>,
    product_sold: HashMap<String, u64>,
    buyer_completions: HashMap<UserId, u64>,
}

/// A thread-safe in-memory store.
///
/// All tables sit behind one `RwLock`, so a commit holds the single write
/// lock while it checks guards and applies writes: batches are atomic and
/// serialized against each other. Ideal for tests and the replay binary's
/// default mode.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn stored_version(&self, guard: &Guard) -> u64 {
        match guard {
            Guard::Wallet { user_id, .. } => {
                self.wallets.get(user_id).map(|w| w.version).unwrap_or(0)
            }
            Guard::Order { id, .. } => self.orders.get(id).map(|o| o.version).unwrap_or(0),
            Guard::Suborder { id, .. } => self.suborders.get(id).map(|s| s.version).unwrap_or(0),
            Guard::Escrow { order_id, .. } => {
                self.escrows.get(order_id).map(|e| e.version).unwrap_or(0)
            }
        }
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.get(user_id).cloned())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.values().cloned().collect())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn suborder(&self, id: SuborderId) -> Result<Option<Suborder>> {
        let tables = self.tables.read().await;
        Ok(tables.suborders.get(&id).cloned())
    }

    async fn suborders_of(&self, order_id: OrderId) -> Result<Vec<Suborder>> {
        let tables = self.tables.read().await;
        let mut suborders: Vec<Suborder> = tables
            .suborders
            .values()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect();
        suborders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(suborders)
    }

    async fn suborders_for_seller(&self, seller_id: &str) -> Result<Vec<Suborder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .suborders
            .values()
            .filter(|s| s.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn escrow_for_order(&self, order_id: OrderId) -> Result<Option<EscrowRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.escrows.get(&order_id).cloned())
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_transaction(
        &self,
        user_id: &str,
        order_id: OrderId,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .rev()
            .find(|t| {
                t.user_id == user_id
                    && t.order_id == Some(order_id)
                    && t.kind == kind
                    && t.status == TransactionStatus::Completed
            })
            .cloned())
    }

    async fn disputes_for_order(&self, order_id: OrderId) -> Result<Vec<Dispute>> {
        let tables = self.tables.read().await;
        Ok(tables
            .disputes
            .iter()
            .filter(|d| d.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn product_sold(&self, product_id: &str) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.product_sold.get(product_id).copied().unwrap_or(0))
    }

    async fn buyer_completions(&self, buyer_id: &str) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.buyer_completions.get(buyer_id).copied().unwrap_or(0))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut tables = self.tables.write().await;
        for guard in &batch.guards {
            let stored = tables.stored_version(guard);
            let expected = match guard {
                Guard::Wallet { version, .. }
                | Guard::Order { version, .. }
                | Guard::Suborder { version, .. }
                | Guard::Escrow { version, .. } => *version,
            };
            if stored != expected {
                return Err(MarketError::Conflict(format!(
                    "{guard:?}: expected version {expected}, found {stored}"
                )));
            }
        }
        for write in batch.writes {
            match write {
                BatchWrite::Wallet(mut wallet) => {
                    wallet.version =
                        tables.wallets.get(&wallet.user_id).map(|w| w.version).unwrap_or(0) + 1;
                    tables.wallets.insert(wallet.user_id.clone(), wallet);
                }
                BatchWrite::Order(mut order) => {
                    order.version =
                        tables.orders.get(&order.id).map(|o| o.version).unwrap_or(0) + 1;
                    tables.orders.insert(order.id, order);
                }
                BatchWrite::Suborder(mut suborder) => {
                    suborder.version =
                        tables.suborders.get(&suborder.id).map(|s| s.version).unwrap_or(0) + 1;
                    tables.suborders.insert(suborder.id, suborder);
                }
                BatchWrite::Escrow(mut escrow) => {
                    escrow.version = tables
                        .escrows
                        .get(&escrow.order_id)
                        .map(|e| e.version)
                        .unwrap_or(0)
                        + 1;
                    tables.escrows.insert(escrow.order_id, escrow);
                }
                BatchWrite::Transaction(tx) => tables.transactions.push(tx),
                BatchWrite::Dispute(dispute) => tables.disputes.push(dispute),
                BatchWrite::BumpProductSold { product_id, quantity } => {
                    *tables.product_sold.entry(product_id).or_insert(0) += quantity;
                }
                BatchWrite::BumpBuyerCompleted { buyer_id } => {
                    *tables.buyer_completions.entry(buyer_id).or_insert(0) += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn wallet_with(user: &str, balance: rust_decimal::Decimal) -> Wallet {
        let mut wallet = Wallet::new(user);
        wallet
            .credit(crate::domain::money::Amount::new(balance).unwrap());
        wallet
    }

    #[tokio::test]
    async fn test_commit_bumps_versions() {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.guard_wallet("alice", 0).put_wallet(Wallet::new("alice"));
        store.commit(batch).await.unwrap();

        let stored = store.wallet("alice").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);

        let mut batch = WriteBatch::new();
        batch.guard_wallet("alice", 1).put_wallet(stored);
        store.commit(batch).await.unwrap();
        assert_eq!(store.wallet("alice").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_stale_guard_rejects_whole_batch() {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put_wallet(wallet_with("alice", dec!(10.0)));
        store.commit(batch).await.unwrap();

        // stale read: version 0 while the record is at 1
        let mut batch = WriteBatch::new();
        batch
            .guard_wallet("alice", 0)
            .put_wallet(wallet_with("alice", dec!(99.0)))
            .put_wallet(Wallet::new("bob"));
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));

        let alice = store.wallet("alice").await.unwrap().unwrap();
        assert_eq!(alice.balance.value(), dec!(10.0));
        assert!(store.wallet("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guard_expecting_absence() {
        let store = InMemoryStore::new();
        let order_id = Uuid::new_v4();
        let record = EscrowRecord::new("alice", order_id, dec!(5.0));

        let mut batch = WriteBatch::new();
        batch.guard_escrow(order_id, 0).put_escrow(record.clone());
        store.commit(batch).await.unwrap();

        // a second create against the same order must lose
        let mut batch = WriteBatch::new();
        batch.guard_escrow(order_id, 0).put_escrow(record);
        assert!(matches!(
            store.commit(batch).await,
            Err(MarketError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_find_transaction_matches_kind_and_order() {
        let store = InMemoryStore::new();
        let order_id = Uuid::new_v4();
        let amount = crate::domain::money::Amount::new(dec!(10.0)).unwrap();

        let mut batch = WriteBatch::new();
        batch
            .put_transaction(Transaction::debit(
                "alice",
                TransactionKind::Escrow,
                amount,
                Some(order_id),
                "hold",
            ))
            .put_transaction(Transaction::credit(
                "bob",
                TransactionKind::EscrowRelease,
                amount,
                Some(order_id),
                "release",
            ));
        store.commit(batch).await.unwrap();

        let found = store
            .find_transaction("bob", order_id, TransactionKind::EscrowRelease)
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_transaction("bob", order_id, TransactionKind::Refund)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_counters_accumulate() {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .bump_product_sold("keyboard", 2)
            .bump_product_sold("keyboard", 3)
            .bump_buyer_completed("alice");
        store.commit(batch).await.unwrap();

        assert_eq!(store.product_sold("keyboard").await.unwrap(), 5);
        assert_eq!(store.buyer_completions("alice").await.unwrap(), 1);
        assert_eq!(store.product_sold("mouse").await.unwrap(), 0);
    }
}
