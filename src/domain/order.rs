use crate::domain::{DisputeId, EscrowId, OrderId, SuborderId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle states shared by orders and suborders.
///
/// Sellers advance a suborder along `pending -> confirmed -> shipped ->
/// delivered` and may cancel up to and including `shipped`. The last hop,
/// `delivered -> completed`, belongs to the buyer alone (delivery
/// confirmation); `delivered -> shipped` is the buyer-denial companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Whether a seller may move a suborder from `self` to `to`.
    pub fn seller_may_move_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
        )
    }

    /// Whether the buyer may cancel the whole order from `self`.
    pub fn buyer_may_cancel(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Shipped
        )
    }

    /// Position along the forward path, used to derive the main order's
    /// status from its suborders. `Cancelled` sits outside the path.
    pub fn progress_rank(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Completed => Some(4),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn from_progress(rank: u8) -> OrderStatus {
        match rank {
            0 => OrderStatus::Pending,
            1 => OrderStatus::Confirmed,
            2 => OrderStatus::Shipped,
            3 => OrderStatus::Delivered,
            _ => OrderStatus::Completed,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    HeldInEscrow,
    Paid,
    Refunded,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Wallet,
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(PaymentMethod::Wallet),
            "cash_on_delivery" | "cod" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// One entry of an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub updated_by: UserId,
    pub at: DateTime<Utc>,
}

/// A line item as snapshotted from the catalog at order time. The core
/// trusts this snapshot and never re-fetches price or seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub seller_id: Option<UserId>,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub image_ref: Option<String>,
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<String>,
        seller_id: Option<UserId>,
        name: impl Into<String>,
        price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            seller_id,
            name: name.into(),
            price,
            quantity,
            image_ref: None,
            status: OrderStatus::Pending,
            cancellation_reason: None,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// The buyer-facing order. Splitting produces one suborder per seller;
/// the main record keeps the full item list, the money figures, and the
/// payment lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Amount actually moved into escrow at hold time. Set once and never
    /// recomputed; refunds and releases prefer it over `total`.
    pub held_amount: Option<Decimal>,
    pub escrow_id: Option<EscrowId>,
    pub status_history: Vec<StatusChange>,
    pub delivery_disputed: bool,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Order {
    pub fn new(
        buyer_id: impl Into<UserId>,
        items: Vec<OrderItem>,
        shipping_address: impl Into<String>,
        payment_method: PaymentMethod,
        shipping_cost: Decimal,
        tax: Decimal,
    ) -> Self {
        let buyer_id = buyer_id.into();
        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
        let total = subtotal + shipping_cost + tax;
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer_id: buyer_id.clone(),
            items,
            shipping_address: shipping_address.into(),
            payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            subtotal,
            shipping_cost,
            tax,
            total,
            held_amount: None,
            escrow_id: None,
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                updated_by: buyer_id,
                at: now,
            }],
            delivery_disputed: false,
            is_hidden: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn set_status(&mut self, status: OrderStatus, updated_by: impl Into<UserId>) {
        self.status = status;
        self.updated_at = Utc::now();
        self.status_history.push(StatusChange {
            status,
            updated_by: updated_by.into(),
            at: self.updated_at,
        });
    }

    /// Amount to return to the buyer on cancellation: what was actually
    /// held, falling back to the order total when escrow was never taken.
    pub fn refundable_amount(&self) -> Decimal {
        self.held_amount.unwrap_or(self.total)
    }

    /// Copies a suborder's status onto the main order's items belonging
    /// to that seller.
    pub fn mirror_seller_items(
        &mut self,
        seller_id: &str,
        status: OrderStatus,
        reason: Option<&str>,
    ) {
        for item in &mut self.items {
            if item.seller_id.as_deref() == Some(seller_id) {
                item.status = status;
                if status == OrderStatus::Cancelled {
                    item.cancellation_reason = reason.map(str::to_owned);
                }
            }
        }
    }
}

/// A note appended to a suborder on every transition, visible to the
/// seller alongside the current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuborderNote {
    pub message: String,
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

/// The slice of an order belonging to one seller, advanced independently
/// through the seller's side of the status graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suborder {
    pub id: SuborderId,
    pub order_id: OrderId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub notifications: Vec<SuborderNote>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Suborder {
    pub fn new(
        order_id: OrderId,
        seller_id: impl Into<UserId>,
        buyer_id: impl Into<UserId>,
        items: Vec<OrderItem>,
    ) -> Self {
        let total = items.iter().map(OrderItem::line_total).sum();
        let now = Utc::now();
        let mut suborder = Self {
            id: Uuid::new_v4(),
            order_id,
            seller_id: seller_id.into(),
            buyer_id: buyer_id.into(),
            items,
            total,
            status: OrderStatus::Pending,
            notifications: Vec::new(),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        suborder.push_note("Suborder created, awaiting seller confirmation");
        suborder
    }

    pub fn push_note(&mut self, message: impl Into<String>) {
        self.notifications.push(SuborderNote {
            message: message.into(),
            status: self.status,
            at: Utc::now(),
        });
    }

    /// Applies a transition and records it: item statuses are mirrored and
    /// a note is appended.
    pub fn set_status(&mut self, status: OrderStatus, reason: Option<&str>) {
        self.status = status;
        self.updated_at = Utc::now();
        if status == OrderStatus::Cancelled {
            self.cancellation_reason = reason.map(str::to_owned);
        }
        for item in &mut self.items {
            item.status = status;
            if status == OrderStatus::Cancelled {
                item.cancellation_reason = reason.map(str::to_owned);
            }
        }
        let note = match reason {
            Some(r) => format!("Status changed to {status}: {r}"),
            None => format!("Status changed to {status}"),
        };
        self.push_note(note);
    }
}

/// Opened when a buyer denies delivery; handed to support out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
}

impl Dispute {
    pub fn new(order_id: OrderId, buyer_id: impl Into<UserId>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            buyer_id: buyer_id.into(),
            reason: reason.into(),
            opened_at: Utc::now(),
        }
    }
}
