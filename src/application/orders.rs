use crate::application::escrow::EscrowService;
use crate::application::retry_conflicts;
use crate::application::splitter::{delivery_shares, split_order};
use crate::config::Config;
use crate::domain::money::Amount;
use crate::domain::order::{
    Dispute, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Suborder,
};
use crate::domain::ports::{
    DispatcherHandle, Notification, NotificationKind, StoreHandle, WriteBatch,
};
use crate::domain::{OrderId, SuborderId};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Drives the order lifecycle: placement and split, seller progress,
/// buyer confirmation or denial, and cancellation, with the money side
/// delegated to the escrow service.
pub struct OrderService {
    store: StoreHandle,
    escrow: EscrowService,
    dispatcher: DispatcherHandle,
    config: Config,
}

struct SellerUpdate {
    suborder: Suborder,
    auto_cancelled: bool,
}

impl OrderService {
    pub fn new(store: StoreHandle, dispatcher: DispatcherHandle, config: Config) -> Self {
        let escrow = EscrowService::new(store.clone(), config.commit_retries);
        Self {
            store,
            escrow,
            dispatcher,
            config,
        }
    }

    /// Validates and stores a new order together with its per-seller
    /// suborders, then holds the wallet payment when that method was
    /// chosen. A buyer who cannot cover the total still gets the order;
    /// its payment stays pending.
    pub async fn place_order(
        &self,
        buyer_id: &str,
        items: Vec<OrderItem>,
        shipping_address: &str,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        if items.is_empty() {
            return Err(MarketError::validation("order must contain at least one item"));
        }
        if shipping_address.trim().is_empty() {
            return Err(MarketError::validation("shipping address must not be empty"));
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(MarketError::validation(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
            if item.price <= Decimal::ZERO {
                return Err(MarketError::validation(format!(
                    "price for product {} must be positive",
                    item.product_id
                )));
            }
        }

        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
        let tax = self.config.tax_for(subtotal);
        let mut order = Order::new(
            buyer_id,
            items,
            shipping_address,
            payment_method,
            self.config.shipping_cost,
            tax,
        );
        let suborders = split_order(&order)?;

        let mut batch = WriteBatch::new();
        batch.guard_order(order.id, 0).put_order(order.clone());
        for suborder in &suborders {
            batch.put_suborder(suborder.clone());
        }
        self.store.commit(batch).await?;
        order.version = 1;
        info!(
            order_id = %order.id,
            buyer_id,
            total = %order.total,
            suborders = suborders.len(),
            "order placed"
        );

        self.notify(
            buyer_id,
            NotificationKind::OrderPlaced,
            order.id,
            format!("Order {} placed, total {}", order.id, order.total),
        );
        for suborder in &suborders {
            self.notify(
                &suborder.seller_id,
                NotificationKind::SuborderCreated,
                order.id,
                format!(
                    "New suborder for order {}: {} item(s), total {}",
                    order.id,
                    suborder.items.len(),
                    suborder.total
                ),
            );
        }

        if payment_method == PaymentMethod::Wallet {
            order = self.hold_payment(order).await?;
        }
        Ok(order)
    }

    /// Seller-side transition of one suborder. The main order follows:
    /// its status becomes the least-advanced non-cancelled suborder, and
    /// when every suborder is cancelled the whole order cancels and the
    /// buyer is refunded.
    pub async fn update_seller_status(
        &self,
        suborder_id: SuborderId,
        actor: &str,
        new_status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Suborder> {
        if new_status == OrderStatus::Cancelled
            && reason.map(str::trim).is_none_or(str::is_empty)
        {
            return Err(MarketError::validation("cancellation requires a reason"));
        }

        let update = retry_conflicts(self.config.commit_retries, || {
            self.try_seller_update(suborder_id, actor, new_status, reason)
        })
        .await?;

        let suborder = &update.suborder;
        let message = match suborder.status {
            OrderStatus::Delivered => format!(
                "Items from {} for order {} were delivered, please confirm receipt",
                suborder.seller_id, suborder.order_id
            ),
            OrderStatus::Cancelled => format!(
                "Seller {} cancelled their part of order {}: {}",
                suborder.seller_id,
                suborder.order_id,
                suborder.cancellation_reason.as_deref().unwrap_or("no reason given")
            ),
            status => format!(
                "Items from {} for order {} are now {}",
                suborder.seller_id, suborder.order_id, status
            ),
        };
        self.notify(
            &suborder.buyer_id,
            NotificationKind::StatusChanged,
            suborder.order_id,
            message,
        );
        if update.auto_cancelled {
            self.notify(
                &suborder.buyer_id,
                NotificationKind::OrderCancelled,
                suborder.order_id,
                format!(
                    "Order {} was cancelled: every seller cancelled their items",
                    suborder.order_id
                ),
            );
        }
        Ok(update.suborder)
    }

    /// Buyer accepts the goods: suborders complete, sellers are paid
    /// their totals plus delivery shares, and whatever was held for
    /// cancelled items goes back to the buyer. Payout failures do not
    /// block completion; they leave the payment marked failed.
    pub async fn confirm_delivery(&self, order_id: OrderId, actor: &str) -> Result<Order> {
        let order = self.load_order(order_id).await?;
        self.ensure_buyer(&order, actor, "confirm delivery of")?;
        if order.status != OrderStatus::Delivered {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Completed,
            });
        }

        let suborders = self.store.suborders_of(order_id).await?;
        let shares = delivery_shares(order.shipping_cost, &suborders);

        let mut payment_failed = false;
        let mut unpaid_sellers: Vec<String> = Vec::new();
        for suborder in &suborders {
            if suborder.status == OrderStatus::Cancelled {
                continue;
            }
            let share = shares.get(&suborder.id).copied().unwrap_or(Decimal::ZERO);
            if let Err(e) = self
                .escrow
                .release(&suborder.seller_id, order_id, suborder.total, share)
                .await
            {
                error!(
                    %order_id,
                    seller_id = %suborder.seller_id,
                    error = %e,
                    "seller payout failed during completion"
                );
                payment_failed = true;
                unpaid_sellers.push(suborder.seller_id.clone());
            }
        }

        if order.escrow_id.is_some() {
            let cancelled_portion: Decimal = suborders
                .iter()
                .filter(|s| s.status == OrderStatus::Cancelled)
                .map(|s| s.total + shares.get(&s.id).copied().unwrap_or(Decimal::ZERO))
                .sum();
            if cancelled_portion > Decimal::ZERO
                && let Err(e) = self
                    .escrow
                    .refund_remainder(
                        &order.buyer_id,
                        order_id,
                        Amount::new(cancelled_portion)?,
                        &format!("Refund for cancelled items in order {order_id}"),
                    )
                    .await
            {
                error!(%order_id, error = %e, "buyer refund failed during completion");
                payment_failed = true;
            }
        }

        let payment_status = if payment_failed {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Completed
        };

        let updated = retry_conflicts(self.config.commit_retries, || {
            self.try_complete(order_id, actor, payment_status)
        })
        .await?;

        info!(%order_id, payment = ?updated.payment_status, "order completed");
        self.notify(
            actor,
            NotificationKind::OrderCompleted,
            order_id,
            format!("Order {order_id} completed, thank you for confirming"),
        );
        for suborder in &suborders {
            if suborder.status == OrderStatus::Cancelled
                || unpaid_sellers.contains(&suborder.seller_id)
            {
                continue;
            }
            self.notify(
                &suborder.seller_id,
                NotificationKind::PaymentReceived,
                order_id,
                format!("Funds for order {order_id} were released to your wallet"),
            );
        }
        Ok(updated)
    }

    /// Buyer rejects the goods: the order and its delivered suborders go
    /// back to shipped, the delivery is flagged as disputed, and a
    /// dispute record is opened for support.
    pub async fn deny_delivery(
        &self,
        order_id: OrderId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Order> {
        let updated = retry_conflicts(self.config.commit_retries, || {
            self.try_deny(order_id, actor, reason)
        })
        .await?;

        warn!(%order_id, "delivery denied by buyer, dispute opened");
        let suborders = self.store.suborders_of(order_id).await?;
        for suborder in &suborders {
            if suborder.status == OrderStatus::Shipped {
                self.notify(
                    &suborder.seller_id,
                    NotificationKind::DeliveryDenied,
                    order_id,
                    format!("Buyer denied delivery of order {order_id}, please follow up"),
                );
            }
        }
        // Disputes are worked off a queue keyed by this recipient.
        self.notify(
            "support",
            NotificationKind::DeliveryDenied,
            order_id,
            format!("Dispute opened on order {order_id}"),
        );
        Ok(updated)
    }

    /// Buyer backs out before delivery. Everything non-terminal cascades
    /// to cancelled and held money comes back, all in one commit.
    pub async fn cancel_order(&self, order_id: OrderId, actor: &str, reason: &str) -> Result<Order> {
        if reason.trim().is_empty() {
            return Err(MarketError::validation("cancellation requires a reason"));
        }
        let updated = retry_conflicts(self.config.commit_retries, || {
            self.try_cancel(order_id, actor, reason)
        })
        .await?;

        info!(%order_id, actor, "order cancelled by buyer");
        self.notify(
            actor,
            NotificationKind::OrderCancelled,
            order_id,
            format!("Order {order_id} cancelled: {reason}"),
        );
        let suborders = self.store.suborders_of(order_id).await?;
        for suborder in &suborders {
            self.notify(
                &suborder.seller_id,
                NotificationKind::OrderCancelled,
                order_id,
                format!("Order {order_id} was cancelled by the buyer"),
            );
        }
        Ok(updated)
    }

    /// Hides the order from the buyer's listing. Purely cosmetic.
    pub async fn hide_order(&self, order_id: OrderId, actor: &str) -> Result<Order> {
        retry_conflicts(self.config.commit_retries, || async move {
            let mut order = self.load_order(order_id).await?;
            self.ensure_buyer(&order, actor, "hide")?;
            if order.is_hidden {
                return Ok(order);
            }
            let seen = order.version;
            order.is_hidden = true;
            order.updated_at = chrono::Utc::now();
            let mut batch = WriteBatch::new();
            batch.guard_order(order_id, seen).put_order(order.clone());
            self.store.commit(batch).await?;
            order.version = seen + 1;
            Ok(order)
        })
        .await
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        self.load_order(order_id).await
    }

    /// Buyer's order history, newest first, hidden orders filtered out.
    pub async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>> {
        let mut orders = self.store.orders_for_buyer(buyer_id).await?;
        orders.retain(|order| !order.is_hidden);
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn suborders(&self, order_id: OrderId) -> Result<Vec<Suborder>> {
        self.store.suborders_of(order_id).await
    }

    pub async fn suborders_for_seller(&self, seller_id: &str) -> Result<Vec<Suborder>> {
        let mut suborders = self.store.suborders_for_seller(seller_id).await?;
        suborders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(suborders)
    }

    async fn hold_payment(&self, order: Order) -> Result<Order> {
        let amount = Amount::new(order.total)?;
        let order_id = order.id;
        let record = match self.escrow.hold(&order.buyer_id, order_id, amount).await {
            Ok(record) => record,
            Err(MarketError::InsufficientFunds { required, available }) => {
                warn!(
                    %order_id,
                    %required,
                    %available,
                    "buyer cannot cover the order, leaving payment pending"
                );
                return Ok(order);
            }
            Err(e) => return Err(e),
        };

        let updated = retry_conflicts(self.config.commit_retries, || {
            let record_id = record.id;
            let record_amount = record.amount;
            async move {
                let mut order = self.load_order(order_id).await?;
                if order.payment_status == PaymentStatus::HeldInEscrow {
                    return Ok(order);
                }
                let seen = order.version;
                order.payment_status = PaymentStatus::HeldInEscrow;
                order.held_amount = Some(record_amount);
                order.escrow_id = Some(record_id);
                order.updated_at = chrono::Utc::now();
                let mut batch = WriteBatch::new();
                batch.guard_order(order_id, seen).put_order(order.clone());
                self.store.commit(batch).await?;
                order.version = seen + 1;
                Ok(order)
            }
        })
        .await?;

        self.notify(
            &updated.buyer_id,
            NotificationKind::PaymentReceived,
            order_id,
            format!("Payment of {} held in escrow for order {order_id}", record.amount),
        );
        Ok(updated)
    }

    async fn try_seller_update(
        &self,
        suborder_id: SuborderId,
        actor: &str,
        new_status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<SellerUpdate> {
        let mut suborder = self.load_suborder(suborder_id).await?;
        if suborder.seller_id != actor {
            return Err(MarketError::permission(format!(
                "user {actor} is not the seller of suborder {suborder_id}"
            )));
        }
        if !suborder.status.seller_may_move_to(new_status) {
            return Err(MarketError::InvalidTransition {
                from: suborder.status,
                to: new_status,
            });
        }
        let mut order = self.load_order(suborder.order_id).await?;
        let (suborder_seen, order_seen) = (suborder.version, order.version);

        suborder.set_status(new_status, reason);
        order.mirror_seller_items(&suborder.seller_id, new_status, reason);

        let mut siblings = self.store.suborders_of(order.id).await?;
        for sibling in &mut siblings {
            if sibling.id == suborder.id {
                *sibling = suborder.clone();
            }
        }

        let mut batch = WriteBatch::new();
        batch
            .guard_suborder(suborder_id, suborder_seen)
            .guard_order(order.id, order_seen);

        let mut auto_cancelled = false;
        match derive_status(&siblings) {
            None => {
                auto_cancelled = true;
                order.set_status(OrderStatus::Cancelled, actor);
                if refund_due(&order) {
                    let amount = Amount::new(order.refundable_amount())?;
                    self.escrow
                        .stage_refund(
                            &mut batch,
                            &order.buyer_id,
                            order.id,
                            amount,
                            &format!("Refund for cancelled order {}", order.id),
                        )
                        .await?;
                    order.payment_status = PaymentStatus::Refunded;
                }
                info!(order_id = %order.id, "all suborders cancelled, order cancelled");
            }
            Some(derived) if derived != order.status => {
                order.set_status(derived, actor);
            }
            Some(_) => {}
        }

        batch.put_suborder(suborder.clone()).put_order(order);
        self.store.commit(batch).await?;
        suborder.version = suborder_seen + 1;
        info!(
            %suborder_id,
            seller_id = actor,
            status = %new_status,
            "suborder status updated"
        );
        Ok(SellerUpdate {
            suborder,
            auto_cancelled,
        })
    }

    async fn try_complete(
        &self,
        order_id: OrderId,
        actor: &str,
        payment_status: PaymentStatus,
    ) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        self.ensure_buyer(&order, actor, "confirm delivery of")?;
        if order.status != OrderStatus::Delivered {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Completed,
            });
        }
        let order_seen = order.version;
        let mut batch = WriteBatch::new();
        batch.guard_order(order_id, order_seen);

        for mut suborder in self.store.suborders_of(order_id).await? {
            if suborder.status.is_terminal() {
                continue;
            }
            let seen = suborder.version;
            suborder.set_status(OrderStatus::Completed, None);
            order.mirror_seller_items(&suborder.seller_id, OrderStatus::Completed, None);
            for item in &suborder.items {
                batch.bump_product_sold(item.product_id.clone(), u64::from(item.quantity));
            }
            batch.guard_suborder(suborder.id, seen).put_suborder(suborder);
        }

        order.set_status(OrderStatus::Completed, actor);
        order.payment_status = payment_status;
        batch.put_order(order.clone()).bump_buyer_completed(actor);
        self.store.commit(batch).await?;
        order.version = order_seen + 1;
        Ok(order)
    }

    async fn try_deny(
        &self,
        order_id: OrderId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        self.ensure_buyer(&order, actor, "deny delivery of")?;
        if order.status != OrderStatus::Delivered {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Shipped,
            });
        }
        let order_seen = order.version;
        let note = reason.unwrap_or("Buyer denied receiving the delivery");
        let mut batch = WriteBatch::new();
        batch.guard_order(order_id, order_seen);

        for mut suborder in self.store.suborders_of(order_id).await? {
            if suborder.status != OrderStatus::Delivered {
                continue;
            }
            let seen = suborder.version;
            suborder.set_status(OrderStatus::Shipped, None);
            suborder.push_note(format!("Buyer denied delivery: {note}"));
            order.mirror_seller_items(&suborder.seller_id, OrderStatus::Shipped, None);
            batch.guard_suborder(suborder.id, seen).put_suborder(suborder);
        }

        order.set_status(OrderStatus::Shipped, actor);
        order.delivery_disputed = true;
        let dispute = Dispute::new(order_id, actor, note);
        batch.put_order(order.clone()).put_dispute(dispute);
        self.store.commit(batch).await?;
        order.version = order_seen + 1;
        Ok(order)
    }

    async fn try_cancel(&self, order_id: OrderId, actor: &str, reason: &str) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        self.ensure_buyer(&order, actor, "cancel")?;
        if !order.status.buyer_may_cancel() {
            return Err(MarketError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let order_seen = order.version;
        let mut batch = WriteBatch::new();
        batch.guard_order(order_id, order_seen);

        for mut suborder in self.store.suborders_of(order_id).await? {
            if suborder.status.is_terminal() {
                continue;
            }
            let seen = suborder.version;
            suborder.set_status(OrderStatus::Cancelled, Some(reason));
            order.mirror_seller_items(&suborder.seller_id, OrderStatus::Cancelled, Some(reason));
            batch.guard_suborder(suborder.id, seen).put_suborder(suborder);
        }

        order.set_status(OrderStatus::Cancelled, actor);
        if refund_due(&order) {
            let amount = Amount::new(order.refundable_amount())?;
            self.escrow
                .stage_refund(
                    &mut batch,
                    actor,
                    order_id,
                    amount,
                    &format!("Refund for cancelled order {order_id}"),
                )
                .await?;
            order.payment_status = PaymentStatus::Refunded;
        }
        batch.put_order(order.clone());
        self.store.commit(batch).await?;
        order.version = order_seen + 1;
        Ok(order)
    }

    fn ensure_buyer(&self, order: &Order, actor: &str, action: &str) -> Result<()> {
        if order.buyer_id != actor {
            return Err(MarketError::permission(format!(
                "only the buyer may {action} order {}",
                order.id
            )));
        }
        Ok(())
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("order {order_id}")))
    }

    async fn load_suborder(&self, suborder_id: SuborderId) -> Result<Suborder> {
        self.store
            .suborder(suborder_id)
            .await?
            .ok_or_else(|| MarketError::not_found(format!("suborder {suborder_id}")))
    }

    fn notify(&self, recipient: &str, kind: NotificationKind, order_id: OrderId, message: String) {
        self.dispatcher.dispatch(Notification {
            recipient: recipient.to_owned(),
            kind,
            order_id,
            message,
        });
    }
}

/// Main order status is the least-advanced non-cancelled suborder, capped
/// at delivered: the final hop to completed belongs to the buyer. `None`
/// means every suborder was cancelled.
fn derive_status(suborders: &[Suborder]) -> Option<OrderStatus> {
    suborders
        .iter()
        .filter_map(|s| s.status.progress_rank())
        .min()
        .map(|rank| OrderStatus::from_progress(rank.min(3)))
}

fn refund_due(order: &Order) -> bool {
    matches!(
        order.payment_status,
        PaymentStatus::HeldInEscrow | PaymentStatus::Paid
    )
}
