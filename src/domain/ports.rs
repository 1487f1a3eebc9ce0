use super::escrow::EscrowRecord;
use super::order::{Dispute, Order, Suborder};
use super::transaction::{Transaction, TransactionKind};
use super::wallet::Wallet;
use super::{OrderId, SuborderId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn MarketStore>;
pub type DispatcherHandle = Arc<dyn NotificationDispatcher>;

/// Persistence port. Reads return snapshots carrying the version the
/// record had at read time; all mutations go through `commit`, which
/// applies a whole batch atomically or not at all.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn wallet(&self, user_id: &str) -> Result<Option<Wallet>>;
    async fn wallets(&self) -> Result<Vec<Wallet>>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;
    async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>>;

    async fn suborder(&self, id: SuborderId) -> Result<Option<Suborder>>;
    async fn suborders_of(&self, order_id: OrderId) -> Result<Vec<Suborder>>;
    async fn suborders_for_seller(&self, seller_id: &str) -> Result<Vec<Suborder>>;

    async fn escrow_for_order(&self, order_id: OrderId) -> Result<Option<EscrowRecord>>;

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>>;
    /// Ledger probe used for idempotency: the newest completed entry
    /// matching the exact (user, order, kind) triple, if any.
    async fn find_transaction(
        &self,
        user_id: &str,
        order_id: OrderId,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>>;

    async fn disputes_for_order(&self, order_id: OrderId) -> Result<Vec<Dispute>>;

    async fn product_sold(&self, product_id: &str) -> Result<u64>;
    async fn buyer_completions(&self, buyer_id: &str) -> Result<u64>;

    /// Applies every write in the batch, or none if any guard fails.
    /// A failed guard surfaces as `MarketError::Conflict`.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// Expected-version check evaluated inside `commit`. Version 0 means the
/// record must not exist yet; stored records always carry version >= 1
/// because every commit bumps them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Wallet { user_id: UserId, version: u64 },
    Order { id: OrderId, version: u64 },
    Suborder { id: SuborderId, version: u64 },
    /// Escrow records are keyed by order; at most one exists per order.
    Escrow { order_id: OrderId, version: u64 },
}

#[derive(Debug, Clone)]
pub enum BatchWrite {
    Wallet(Wallet),
    Order(Order),
    Suborder(Suborder),
    Escrow(EscrowRecord),
    Transaction(Transaction),
    Dispute(Dispute),
    BumpProductSold { product_id: String, quantity: u64 },
    BumpBuyerCompleted { buyer_id: UserId },
}

/// A unit of work against the store. Guards pin the versions the caller
/// read; writes land together once every guard holds.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub guards: Vec<Guard>,
    pub writes: Vec<BatchWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty() && self.writes.is_empty()
    }

    pub fn guard_wallet(&mut self, user_id: impl Into<UserId>, version: u64) -> &mut Self {
        self.guards.push(Guard::Wallet {
            user_id: user_id.into(),
            version,
        });
        self
    }

    pub fn guard_order(&mut self, id: OrderId, version: u64) -> &mut Self {
        self.guards.push(Guard::Order { id, version });
        self
    }

    pub fn guard_suborder(&mut self, id: SuborderId, version: u64) -> &mut Self {
        self.guards.push(Guard::Suborder { id, version });
        self
    }

    pub fn guard_escrow(&mut self, order_id: OrderId, version: u64) -> &mut Self {
        self.guards.push(Guard::Escrow { order_id, version });
        self
    }

    pub fn put_wallet(&mut self, wallet: Wallet) -> &mut Self {
        self.writes.push(BatchWrite::Wallet(wallet));
        self
    }

    pub fn put_order(&mut self, order: Order) -> &mut Self {
        self.writes.push(BatchWrite::Order(order));
        self
    }

    pub fn put_suborder(&mut self, suborder: Suborder) -> &mut Self {
        self.writes.push(BatchWrite::Suborder(suborder));
        self
    }

    pub fn put_escrow(&mut self, escrow: EscrowRecord) -> &mut Self {
        self.writes.push(BatchWrite::Escrow(escrow));
        self
    }

    pub fn put_transaction(&mut self, tx: Transaction) -> &mut Self {
        self.writes.push(BatchWrite::Transaction(tx));
        self
    }

    pub fn put_dispute(&mut self, dispute: Dispute) -> &mut Self {
        self.writes.push(BatchWrite::Dispute(dispute));
        self
    }

    pub fn bump_product_sold(&mut self, product_id: impl Into<String>, quantity: u64) -> &mut Self {
        self.writes.push(BatchWrite::BumpProductSold {
            product_id: product_id.into(),
            quantity,
        });
        self
    }

    pub fn bump_buyer_completed(&mut self, buyer_id: impl Into<UserId>) -> &mut Self {
        self.writes.push(BatchWrite::BumpBuyerCompleted {
            buyer_id: buyer_id.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderPlaced,
    SuborderCreated,
    StatusChanged,
    PaymentReceived,
    OrderCancelled,
    DeliveryDenied,
    OrderCompleted,
}

/// Out-of-band message to a buyer or seller. Delivery is best effort and
/// never blocks or rolls back the commit that produced it.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub order_id: OrderId,
    pub message: String,
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, note: Notification);
}
