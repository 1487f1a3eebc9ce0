use crate::application::orders::OrderService;
use crate::application::wallet::WalletService;
use crate::config::Config;
use crate::domain::money::Amount;
use crate::domain::order::{OrderItem, OrderStatus, PaymentMethod};
use crate::domain::ports::{DispatcherHandle, StoreHandle};
use crate::domain::transaction::TransactionKind;
use crate::domain::wallet::Wallet;
use crate::domain::{OrderId, UserId};
use crate::error::{MarketError, Result};
use crate::interfaces::csv::command_reader::{CommandRow, OpKind};
use std::collections::HashMap;

struct Cart {
    buyer: UserId,
    items: Vec<OrderItem>,
}

/// Applies a stream of CSV commands to the services. Order labels from
/// the file are mapped to the real order ids as orders get placed, so a
/// later row can reference an earlier order by its label.
pub struct Replay {
    wallets: WalletService,
    orders: OrderService,
    carts: HashMap<String, Cart>,
    labels: HashMap<String, OrderId>,
}

impl Replay {
    pub fn new(store: StoreHandle, dispatcher: DispatcherHandle, config: Config) -> Self {
        Self {
            wallets: WalletService::new(store.clone(), config.commit_retries),
            orders: OrderService::new(store, dispatcher, config),
            carts: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, row: CommandRow) -> Result<()> {
        match row.op {
            OpKind::Deposit => {
                let amount = Amount::new(
                    row.amount
                        .ok_or_else(|| MarketError::validation("deposit requires an amount"))?,
                )?;
                self.wallets
                    .credit(&row.actor, amount, TransactionKind::Deposit, None, "Wallet deposit")
                    .await?;
            }
            OpKind::Item => {
                let price = row
                    .amount
                    .ok_or_else(|| MarketError::validation("item requires a price"))?;
                let quantity = row.quantity.unwrap_or(1);
                let seller = (!row.seller.is_empty()).then(|| row.seller.clone());
                let cart = self.carts.entry(row.order.clone()).or_insert_with(|| Cart {
                    buyer: row.actor.clone(),
                    items: Vec::new(),
                });
                cart.items.push(OrderItem::new(
                    row.product.clone(),
                    seller,
                    row.product,
                    price,
                    quantity,
                ));
            }
            OpKind::Place => {
                let cart = self.carts.remove(&row.order).ok_or_else(|| {
                    MarketError::validation(format!("no items staged for order '{}'", row.order))
                })?;
                let method = if row.note.is_empty() {
                    PaymentMethod::Wallet
                } else {
                    row.note.parse().map_err(MarketError::Validation)?
                };
                let order = self
                    .orders
                    .place_order(&cart.buyer, cart.items, "address on file", method)
                    .await?;
                self.labels.insert(row.order, order.id);
            }
            OpKind::Seller => {
                let order_id = self.order_id(&row.order)?;
                let suborders = self.orders.suborders(order_id).await?;
                let suborder = suborders
                    .iter()
                    .find(|s| s.seller_id == row.actor)
                    .ok_or_else(|| {
                        MarketError::not_found(format!(
                            "suborder of seller {} in order '{}'",
                            row.actor, row.order
                        ))
                    })?;
                let (status, reason) = match row.note.split_once(':') {
                    Some((status, reason)) => (status.trim(), Some(reason.trim())),
                    None => (row.note.trim(), None),
                };
                let status: OrderStatus = status.parse().map_err(MarketError::Validation)?;
                self.orders
                    .update_seller_status(suborder.id, &row.actor, status, reason)
                    .await?;
            }
            OpKind::Confirm => {
                let order_id = self.order_id(&row.order)?;
                self.orders.confirm_delivery(order_id, &row.actor).await?;
            }
            OpKind::Deny => {
                let order_id = self.order_id(&row.order)?;
                let reason = (!row.note.is_empty()).then_some(row.note.as_str());
                self.orders.deny_delivery(order_id, &row.actor, reason).await?;
            }
            OpKind::Cancel => {
                let order_id = self.order_id(&row.order)?;
                self.orders.cancel_order(order_id, &row.actor, &row.note).await?;
            }
        }
        Ok(())
    }

    /// Final wallet snapshot for the report.
    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.wallets.all().await
    }

    fn order_id(&self, label: &str) -> Result<OrderId> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| MarketError::not_found(format!("order '{label}'")))
    }
}
