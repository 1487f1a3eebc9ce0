use crate::domain::escrow::EscrowRecord;
use crate::domain::order::{Dispute, Order, Suborder};
use crate::domain::ports::{BatchWrite, Guard, MarketStore, WriteBatch};
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::wallet::Wallet;
use crate::domain::{OrderId, SuborderId};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for wallet records.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for main orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for per-seller suborders.
pub const CF_SUBORDERS: &str = "suborders";
/// Column Family for escrow records, keyed by order id.
pub const CF_ESCROWS: &str = "escrows";
/// Column Family for the transaction ledger.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for delivery disputes.
pub const CF_DISPUTES: &str = "disputes";
/// Column Family for sold/completion counters.
pub const CF_STATS: &str = "stats";

/// A persistent store implementation using RocksDB.
///
/// Each record type lives in its own Column Family with serde_json
/// values. Guarded commits serialize through one mutex: the guard
/// versions are read, checked, and the whole batch is written through a
/// single RocksDB `WriteBatch`, so a batch lands atomically or not at
/// all even across process restarts.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path,
    /// ensuring all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_WALLETS,
            CF_ORDERS,
            CF_SUBORDERS,
            CF_ESCROWS,
            CF_TRANSACTIONS,
            CF_DISPUTES,
            CF_STATS,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| MarketError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::Storage(format!("column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        let bytes = self
            .db
            .get_cf(cf, key)
            .map_err(|e| MarketError::Storage(e.to_string()))?;
        match bytes {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| MarketError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| MarketError::Storage(e.to_string()))?;
            values.push(
                serde_json::from_slice(&value)
                    .map_err(|e| MarketError::Serialization(e.to_string()))?,
            );
        }
        Ok(values)
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| MarketError::Serialization(e.to_string()))
    }

    fn counter(&self, key: &str) -> Result<u64> {
        let cf = self.cf(CF_STATS)?;
        let bytes = self
            .db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| MarketError::Storage(e.to_string()))?;
        Ok(bytes
            .and_then(|b| <[u8; 8]>::try_from(b.as_slice()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0))
    }

    fn guard_version(&self, guard: &Guard) -> Result<u64> {
        Ok(match guard {
            Guard::Wallet { user_id, .. } => self
                .get_json::<Wallet>(CF_WALLETS, user_id.as_bytes())?
                .map(|w| w.version)
                .unwrap_or(0),
            Guard::Order { id, .. } => self
                .get_json::<Order>(CF_ORDERS, id.as_bytes())?
                .map(|o| o.version)
                .unwrap_or(0),
            Guard::Suborder { id, .. } => self
                .get_json::<Suborder>(CF_SUBORDERS, id.as_bytes())?
                .map(|s| s.version)
                .unwrap_or(0),
            Guard::Escrow { order_id, .. } => self
                .get_json::<EscrowRecord>(CF_ESCROWS, order_id.as_bytes())?
                .map(|e| e.version)
                .unwrap_or(0),
        })
    }
}

#[async_trait]
impl MarketStore for RocksDbStore {
    async fn wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, user_id.as_bytes())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.scan_json(CF_WALLETS)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, id.as_bytes())
    }

    async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan_json(CF_ORDERS)?;
        orders.retain(|o| o.buyer_id == buyer_id);
        Ok(orders)
    }

    async fn suborder(&self, id: SuborderId) -> Result<Option<Suborder>> {
        self.get_json(CF_SUBORDERS, id.as_bytes())
    }

    async fn suborders_of(&self, order_id: OrderId) -> Result<Vec<Suborder>> {
        let mut suborders: Vec<Suborder> = self.scan_json(CF_SUBORDERS)?;
        suborders.retain(|s| s.order_id == order_id);
        suborders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(suborders)
    }

    async fn suborders_for_seller(&self, seller_id: &str) -> Result<Vec<Suborder>> {
        let mut suborders: Vec<Suborder> = self.scan_json(CF_SUBORDERS)?;
        suborders.retain(|s| s.seller_id == seller_id);
        Ok(suborders)
    }

    async fn escrow_for_order(&self, order_id: OrderId) -> Result<Option<EscrowRecord>> {
        self.get_json(CF_ESCROWS, order_id.as_bytes())
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self.scan_json(CF_TRANSACTIONS)?;
        txs.retain(|t| t.user_id == user_id);
        Ok(txs)
    }

    async fn find_transaction(
        &self,
        user_id: &str,
        order_id: OrderId,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>> {
        let txs: Vec<Transaction> = self.scan_json(CF_TRANSACTIONS)?;
        Ok(txs
            .into_iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.order_id == Some(order_id)
                    && t.kind == kind
                    && t.status == TransactionStatus::Completed
            })
            .max_by_key(|t| t.created_at))
    }

    async fn disputes_for_order(&self, order_id: OrderId) -> Result<Vec<Dispute>> {
        let mut disputes: Vec<Dispute> = self.scan_json(CF_DISPUTES)?;
        disputes.retain(|d| d.order_id == order_id);
        Ok(disputes)
    }

    async fn product_sold(&self, product_id: &str) -> Result<u64> {
        self.counter(&format!("sold:{product_id}"))
    }

    async fn buyer_completions(&self, buyer_id: &str) -> Result<u64> {
        self.counter(&format!("completed:{buyer_id}"))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let _lock = self.commit_lock.lock().await;

        for guard in &batch.guards {
            let stored = self.guard_version(guard)?;
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

        let mut wb = rocksdb::WriteBatch::default();
        for write in batch.writes {
            match write {
                BatchWrite::Wallet(mut wallet) => {
                    wallet.version = self
                        .get_json::<Wallet>(CF_WALLETS, wallet.user_id.as_bytes())?
                        .map(|w| w.version)
                        .unwrap_or(0)
                        + 1;
                    wb.put_cf(
                        self.cf(CF_WALLETS)?,
                        wallet.user_id.as_bytes().to_vec(),
                        Self::encode(&wallet)?,
                    );
                }
                BatchWrite::Order(mut order) => {
                    order.version = self
                        .get_json::<Order>(CF_ORDERS, order.id.as_bytes())?
                        .map(|o| o.version)
                        .unwrap_or(0)
                        + 1;
                    wb.put_cf(self.cf(CF_ORDERS)?, order.id.as_bytes(), Self::encode(&order)?);
                }
                BatchWrite::Suborder(mut suborder) => {
                    suborder.version = self
                        .get_json::<Suborder>(CF_SUBORDERS, suborder.id.as_bytes())?
                        .map(|s| s.version)
                        .unwrap_or(0)
                        + 1;
                    wb.put_cf(
                        self.cf(CF_SUBORDERS)?,
                        suborder.id.as_bytes(),
                        Self::encode(&suborder)?,
                    );
                }
                BatchWrite::Escrow(mut escrow) => {
                    escrow.version = self
                        .get_json::<EscrowRecord>(CF_ESCROWS, escrow.order_id.as_bytes())?
                        .map(|e| e.version)
                        .unwrap_or(0)
                        + 1;
                    wb.put_cf(
                        self.cf(CF_ESCROWS)?,
                        escrow.order_id.as_bytes(),
                        Self::encode(&escrow)?,
                    );
                }
                BatchWrite::Transaction(tx) => {
                    wb.put_cf(self.cf(CF_TRANSACTIONS)?, tx.id.as_bytes(), Self::encode(&tx)?);
                }
                BatchWrite::Dispute(dispute) => {
                    wb.put_cf(
                        self.cf(CF_DISPUTES)?,
                        dispute.id.as_bytes(),
                        Self::encode(&dispute)?,
                    );
                }
                BatchWrite::BumpProductSold { product_id, quantity } => {
                    let key = format!("sold:{product_id}");
                    let next = self.counter(&key)? + quantity;
                    wb.put_cf(self.cf(CF_STATS)?, key.as_bytes(), next.to_be_bytes());
                }
                BatchWrite::BumpBuyerCompleted { buyer_id } => {
                    let key = format!("completed:{buyer_id}");
                    let next = self.counter(&key)? + 1;
                    wb.put_cf(self.cf(CF_STATS)?, key.as_bytes(), next.to_be_bytes());
                }
            }
        }

        self.db
            .write(wb)
            .map_err(|e| MarketError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_WALLETS, CF_ORDERS, CF_SUBORDERS, CF_ESCROWS, CF_TRANSACTIONS, CF_DISPUTES, CF_STATS] {
            assert!(store.db.cf_handle(name).is_some(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let order_id = Uuid::new_v4();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let mut wallet = Wallet::new("alice");
            wallet.credit(Amount::new(dec!(42.0)).unwrap());
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet("alice", 0)
                .put_wallet(wallet)
                .put_escrow(EscrowRecord::new("alice", order_id, dec!(10.0)))
                .bump_product_sold("keyboard", 3);
            store.commit(batch).await.unwrap();
        }

        let store = RocksDbStore::open(dir.path()).unwrap();
        let wallet = store.wallet("alice").await.unwrap().unwrap();
        assert_eq!(wallet.balance.value(), dec!(42.0));
        assert_eq!(wallet.version, 1);

        let escrow = store.escrow_for_order(order_id).await.unwrap().unwrap();
        assert_eq!(escrow.amount, dec!(10.0));
        assert_eq!(store.product_sold("keyboard").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stale_guard_rejected() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut batch = WriteBatch::new();
        batch.guard_wallet("alice", 0).put_wallet(Wallet::new("alice"));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.guard_wallet("alice", 0).put_wallet(Wallet::new("alice"));
        assert!(matches!(
            store.commit(batch).await,
            Err(MarketError::Conflict(_))
        ));
    }
}
