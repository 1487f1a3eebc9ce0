use crate::domain::SuborderId;
use crate::domain::order::{Order, OrderItem, Suborder};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Groups an order's items by seller, one suborder per seller, preserving
/// the order in which sellers first appear in the item list.
///
/// Items without a seller cannot be fulfilled; they are left on the main
/// order and logged. An order where no item names a seller is rejected.
pub fn split_order(order: &Order) -> Result<Vec<Suborder>> {
    let mut groups: Vec<(String, Vec<OrderItem>)> = Vec::new();

    for item in &order.items {
        let Some(seller_id) = item.seller_id.clone() else {
            warn!(
                order_id = %order.id,
                product_id = %item.product_id,
                "item has no seller, leaving it out of fulfilment"
            );
            continue;
        };
        match groups.iter_mut().find(|(seller, _)| *seller == seller_id) {
            Some((_, items)) => items.push(item.clone()),
            None => groups.push((seller_id, vec![item.clone()])),
        }
    }

    if groups.is_empty() {
        return Err(MarketError::validation(
            "order has no items with a seller attached",
        ));
    }

    Ok(groups
        .into_iter()
        .map(|(seller_id, items)| Suborder::new(order.id, seller_id, order.buyer_id.clone(), items))
        .collect())
}

/// Splits a flat shipping cost across suborders in proportion to their
/// totals, rounded to cents. Expects the complete suborder set of one
/// order: the last share is adjusted so the shares sum exactly to
/// `shipping_cost`.
pub fn delivery_shares(
    shipping_cost: Decimal,
    suborders: &[Suborder],
) -> HashMap<SuborderId, Decimal> {
    let mut shares = HashMap::new();
    let goods_total: Decimal = suborders.iter().map(|s| s.total).sum();
    if suborders.is_empty() || shipping_cost <= Decimal::ZERO || goods_total <= Decimal::ZERO {
        for suborder in suborders {
            shares.insert(suborder.id, Decimal::ZERO);
        }
        return shares;
    }

    let mut allocated = Decimal::ZERO;
    for (i, suborder) in suborders.iter().enumerate() {
        let share = if i + 1 == suborders.len() {
            shipping_cost - allocated
        } else {
            (shipping_cost * suborder.total / goods_total).round_dp(2)
        };
        allocated += share;
        shares.insert(suborder.id, share.max(Decimal::ZERO));
    }
    shares
}
