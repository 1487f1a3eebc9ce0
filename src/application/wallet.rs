use crate::application::retry_conflicts;
use crate::domain::OrderId;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{StoreHandle, WriteBatch};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::domain::wallet::Wallet;
use crate::error::{MarketError, Result};
use tracing::info;

/// Wallet operations. Every balance change writes the wallet and exactly
/// one ledger transaction in the same guarded batch.
pub struct WalletService {
    store: StoreHandle,
    retries: u32,
}

impl WalletService {
    pub fn new(store: StoreHandle, retries: u32) -> Self {
        Self { store, retries }
    }

    /// Creates the user's wallet if it does not exist yet. Racing creates
    /// converge on whichever record won the commit.
    pub async fn init(&self, user_id: &str, role: &str) -> Result<Wallet> {
        if let Some(wallet) = self.store.wallet(user_id).await? {
            return Ok(wallet);
        }
        let mut wallet = Wallet::new(user_id);
        let mut batch = WriteBatch::new();
        batch.guard_wallet(user_id, 0).put_wallet(wallet.clone());
        match self.store.commit(batch).await {
            Ok(()) => {
                wallet.version = 1;
                info!(user_id, role, "wallet created");
                Ok(wallet)
            }
            Err(MarketError::Conflict(_)) => self
                .store
                .wallet(user_id)
                .await?
                .ok_or_else(|| MarketError::not_found(format!("wallet for {user_id}"))),
            Err(e) => Err(e),
        }
    }

    /// Current wallet snapshot; a user never touched before reads as a
    /// fresh zero-balance wallet.
    pub async fn wallet(&self, user_id: &str) -> Result<Wallet> {
        self.load_or_new(user_id).await
    }

    pub async fn balance(&self, user_id: &str) -> Result<Balance> {
        Ok(self.wallet(user_id).await?.balance)
    }

    pub async fn credit(
        &self,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        order_id: Option<OrderId>,
        description: &str,
    ) -> Result<Wallet> {
        retry_conflicts(self.retries, || async move {
            let mut wallet = self.load_or_new(user_id).await?;
            let seen = wallet.version;
            wallet.credit(amount);
            let tx = Transaction::credit(user_id, kind, amount, order_id, description);
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet(user_id, seen)
                .put_wallet(wallet.clone())
                .put_transaction(tx);
            self.store.commit(batch).await?;
            wallet.version = seen + 1;
            Ok(wallet)
        })
        .await
    }

    pub async fn debit(
        &self,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        order_id: Option<OrderId>,
        description: &str,
    ) -> Result<Wallet> {
        retry_conflicts(self.retries, || async move {
            let mut wallet = self.load_or_new(user_id).await?;
            let seen = wallet.version;
            wallet.debit(amount)?;
            let tx = Transaction::debit(user_id, kind, amount, order_id, description);
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet(user_id, seen)
                .put_wallet(wallet.clone())
                .put_transaction(tx);
            self.store.commit(batch).await?;
            wallet.version = seen + 1;
            Ok(wallet)
        })
        .await
    }

    /// Off-platform payout request. The balance is reduced immediately;
    /// the ledger entry stays Pending for the out-of-band review step.
    pub async fn withdraw(&self, user_id: &str, amount: Amount) -> Result<Transaction> {
        retry_conflicts(self.retries, || async move {
            let mut wallet = self.load_or_new(user_id).await?;
            let seen = wallet.version;
            wallet.debit(amount)?;
            let tx = Transaction::debit(
                user_id,
                TransactionKind::Withdrawal,
                amount,
                None,
                "Withdrawal request",
            )
            .pending();
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet(user_id, seen)
                .put_wallet(wallet)
                .put_transaction(tx.clone());
            self.store.commit(batch).await?;
            info!(user_id, amount = %amount.value(), "withdrawal requested, pending review");
            Ok(tx)
        })
        .await
    }

    /// Moves money between two wallets atomically, with a ledger entry on
    /// each side.
    pub async fn transfer(&self, from: &str, to: &str, amount: Amount) -> Result<()> {
        if from == to {
            return Err(MarketError::validation(
                "transfer source and target are the same wallet",
            ));
        }
        retry_conflicts(self.retries, || async move {
            let mut source = self.load_or_new(from).await?;
            let mut target = self.load_or_new(to).await?;
            let (source_seen, target_seen) = (source.version, target.version);
            source.debit(amount)?;
            target.credit(amount);
            let outgoing = Transaction::debit(
                from,
                TransactionKind::Transfer,
                amount,
                None,
                format!("Transfer to {to}"),
            );
            let incoming = Transaction::credit(
                to,
                TransactionKind::Transfer,
                amount,
                None,
                format!("Transfer from {from}"),
            );
            let mut batch = WriteBatch::new();
            batch
                .guard_wallet(from, source_seen)
                .guard_wallet(to, target_seen)
                .put_wallet(source)
                .put_wallet(target)
                .put_transaction(outgoing)
                .put_transaction(incoming);
            self.store.commit(batch).await
        })
        .await
    }

    /// Ledger history for one user, newest first.
    pub async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let mut txs = self.store.transactions_for(user_id).await?;
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    /// Every known wallet, ordered by user id.
    pub async fn all(&self) -> Result<Vec<Wallet>> {
        let mut wallets = self.store.wallets().await?;
        wallets.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(wallets)
    }

    async fn load_or_new(&self, user_id: &str) -> Result<Wallet> {
        Ok(self
            .store
            .wallet(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id)))
    }
}
