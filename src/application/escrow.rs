use crate::application::retry_conflicts;
use crate::domain::OrderId;
use crate::domain::escrow::EscrowRecord;
use crate::domain::money::Amount;
use crate::domain::ports::{StoreHandle, WriteBatch};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::domain::wallet::Wallet;
use crate::error::Result;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Moves purchase money: buyer wallet into escrow at order time, escrow
/// out to sellers or back to the buyer afterwards.
///
/// Every operation is idempotent per (user, order): the ledger is probed
/// before money moves, so a retried or replayed call becomes a no-op
/// instead of a double payment.
pub struct EscrowService {
    store: StoreHandle,
    retries: u32,
}

impl EscrowService {
    pub fn new(store: StoreHandle, retries: u32) -> Self {
        Self { store, retries }
    }

    /// Debits the buyer and holds the amount against the order. Calling
    /// again for the same order returns the existing record untouched.
    pub async fn hold(
        &self,
        buyer_id: &str,
        order_id: OrderId,
        amount: Amount,
    ) -> Result<EscrowRecord> {
        retry_conflicts(self.retries, || async move {
            if let Some(existing) = self.store.escrow_for_order(order_id).await? {
                debug!(%order_id, "escrow already held for order");
                return Ok(existing);
            }
            let mut wallet = self.load_wallet(buyer_id).await?;
            let wallet_seen = wallet.version;
            wallet.debit(amount)?;
            let mut record = EscrowRecord::new(buyer_id, order_id, amount.value());
            let tx = Transaction::debit(
                buyer_id,
                TransactionKind::Escrow,
                amount,
                Some(order_id),
                format!("Escrow hold for order {order_id}"),
            );
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet(buyer_id, wallet_seen)
                .guard_escrow(order_id, 0)
                .put_wallet(wallet)
                .put_escrow(record.clone())
                .put_transaction(tx);
            self.store.commit(batch).await?;
            record.version = 1;
            info!(%order_id, buyer_id, amount = %amount.value(), "escrow held");
            Ok(record)
        })
        .await
    }

    /// Pays a seller their part of an order: product total plus delivery
    /// share, clamped to what is left in escrow. Without an escrow record
    /// the seller is paid directly instead. Returns the amount actually
    /// credited; zero when this seller was already paid or the escrow is
    /// empty.
    pub async fn release(
        &self,
        seller_id: &str,
        order_id: OrderId,
        product_total: Decimal,
        delivery_share: Decimal,
    ) -> Result<Decimal> {
        let requested = Amount::new(product_total + delivery_share)?;
        retry_conflicts(self.retries, || async move {
            if let Some(prior) = self.find_payout(seller_id, order_id).await? {
                debug!(
                    %order_id,
                    seller_id,
                    prior = %prior.amount,
                    "seller already paid for this order, skipping release"
                );
                return Ok(Decimal::ZERO);
            }
            let Some(mut record) = self.store.escrow_for_order(order_id).await? else {
                warn!(%order_id, seller_id, "no escrow record for order, paying seller directly");
                return self
                    .pay(
                        seller_id,
                        requested,
                        TransactionKind::DirectPayment,
                        order_id,
                        format!("Direct payment for order {order_id}"),
                        WriteBatch::new(),
                    )
                    .await;
            };

            let record_seen = record.version;
            let granted = record.consume(requested.value());
            if granted <= Decimal::ZERO {
                warn!(%order_id, seller_id, "escrow exhausted, nothing to release");
                return Ok(Decimal::ZERO);
            }
            if granted < requested.value() {
                warn!(
                    %order_id,
                    seller_id,
                    requested = %requested.value(),
                    granted = %granted,
                    "release clamped to remaining escrow"
                );
            }
            let mut batch = WriteBatch::new();
            batch.guard_escrow(order_id, record_seen).put_escrow(record);
            let granted = self
                .pay(
                    seller_id,
                    Amount::new(granted)?,
                    TransactionKind::EscrowRelease,
                    order_id,
                    format!("Escrow release for order {order_id}"),
                    batch,
                )
                .await?;
            info!(%order_id, seller_id, amount = %granted, "escrow released to seller");
            Ok(granted)
        })
        .await
    }

    /// Returns the full cancellation amount to the buyer, no questions
    /// asked: the escrow record is closed but not consulted for the
    /// figure. Idempotent per (buyer, order).
    pub async fn refund(
        &self,
        buyer_id: &str,
        order_id: OrderId,
        amount: Amount,
        description: &str,
    ) -> Result<Decimal> {
        retry_conflicts(self.retries, || async move {
            let mut batch = WriteBatch::new();
            if !self
                .stage_refund(&mut batch, buyer_id, order_id, amount, description)
                .await?
            {
                return Ok(Decimal::ZERO);
            }
            self.store.commit(batch).await?;
            info!(%order_id, buyer_id, amount = %amount.value(), "escrow refunded to buyer");
            Ok(amount.value())
        })
        .await
    }

    /// Gives the buyer back the part of the escrow their cancelled items
    /// were holding, consuming the record like a release does. Used at
    /// order completion; the platform tax stays behind.
    pub async fn refund_remainder(
        &self,
        buyer_id: &str,
        order_id: OrderId,
        requested: Amount,
        description: &str,
    ) -> Result<Decimal> {
        retry_conflicts(self.retries, || async move {
            if self
                .store
                .find_transaction(buyer_id, order_id, TransactionKind::Refund)
                .await?
                .is_some()
            {
                debug!(%order_id, buyer_id, "order already refunded, skipping");
                return Ok(Decimal::ZERO);
            }
            let Some(mut record) = self.store.escrow_for_order(order_id).await? else {
                warn!(%order_id, buyer_id, "no escrow record for order, refunding directly");
                return self
                    .pay(
                        buyer_id,
                        requested,
                        TransactionKind::Refund,
                        order_id,
                        description.to_owned(),
                        WriteBatch::new(),
                    )
                    .await;
            };

            let record_seen = record.version;
            let granted = record.consume(requested.value());
            if granted <= Decimal::ZERO {
                warn!(%order_id, buyer_id, "escrow exhausted, nothing left to refund");
                return Ok(Decimal::ZERO);
            }
            if granted < requested.value() {
                warn!(
                    %order_id,
                    buyer_id,
                    requested = %requested.value(),
                    granted = %granted,
                    "refund clamped to remaining escrow"
                );
            }
            let mut batch = WriteBatch::new();
            batch.guard_escrow(order_id, record_seen).put_escrow(record);
            let granted = self
                .pay(
                    buyer_id,
                    Amount::new(granted)?,
                    TransactionKind::Refund,
                    order_id,
                    description.to_owned(),
                    batch,
                )
                .await?;
            info!(%order_id, buyer_id, amount = %granted, "cancelled portion refunded to buyer");
            Ok(granted)
        })
        .await
    }

    /// Appends the refund writes to a caller's batch so the refund can
    /// land in the same commit as an order cancellation. Returns false
    /// when the ledger shows the refund already happened.
    pub(crate) async fn stage_refund(
        &self,
        batch: &mut WriteBatch,
        buyer_id: &str,
        order_id: OrderId,
        amount: Amount,
        description: &str,
    ) -> Result<bool> {
        if self
            .store
            .find_transaction(buyer_id, order_id, TransactionKind::Refund)
            .await?
            .is_some()
        {
            debug!(%order_id, buyer_id, "order already refunded, skipping");
            return Ok(false);
        }
        if let Some(mut record) = self.store.escrow_for_order(order_id).await? {
            if record.released_amount > Decimal::ZERO {
                warn!(
                    %order_id,
                    released = %record.released_amount,
                    "refunding an order whose escrow was partly released already"
                );
            }
            let record_seen = record.version;
            record.close();
            batch.guard_escrow(order_id, record_seen).put_escrow(record);
        } else {
            warn!(%order_id, buyer_id, "no escrow record for order, refunding directly");
        }
        let mut wallet = self.load_wallet(buyer_id).await?;
        let wallet_seen = wallet.version;
        wallet.credit(amount);
        let tx = Transaction::credit(
            buyer_id,
            TransactionKind::Refund,
            amount,
            Some(order_id),
            description,
        );
        batch
            .guard_wallet(buyer_id, wallet_seen)
            .put_wallet(wallet)
            .put_transaction(tx);
        Ok(true)
    }

    /// Credits a wallet and appends the matching ledger entry on top of
    /// whatever the caller already staged, then commits.
    async fn pay(
        &self,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        order_id: OrderId,
        description: String,
        mut batch: WriteBatch,
    ) -> Result<Decimal> {
        let mut wallet = self.load_wallet(user_id).await?;
        let wallet_seen = wallet.version;
        wallet.credit(amount);
        let tx = Transaction::credit(user_id, kind, amount, Some(order_id), description);
        batch
            .guard_wallet(user_id, wallet_seen)
            .put_wallet(wallet)
            .put_transaction(tx);
        self.store.commit(batch).await?;
        Ok(amount.value())
    }

    async fn find_payout(
        &self,
        seller_id: &str,
        order_id: OrderId,
    ) -> Result<Option<Transaction>> {
        if let Some(tx) = self
            .store
            .find_transaction(seller_id, order_id, TransactionKind::EscrowRelease)
            .await?
        {
            return Ok(Some(tx));
        }
        self.store
            .find_transaction(seller_id, order_id, TransactionKind::DirectPayment)
            .await
    }

    async fn load_wallet(&self, user_id: &str) -> Result<Wallet> {
        Ok(self
            .store
            .wallet(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id)))
    }
}
