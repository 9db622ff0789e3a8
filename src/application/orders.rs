//! Order reads and the fulfilment lifecycle after payment.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::{CommissionEntry, EntryStatus, Order, OrderStatus};
use crate::domain::ports::OrderQuery;
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub vendor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OrderService {
    ctx: Context,
}

impl OrderService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Customers see their own orders, vendors the orders holding their lines, admins everything.
    pub async fn list(&self, actor: &Actor, filter: OrderFilter) -> Result<Vec<Order>> {
        let mut query = OrderQuery { status: filter.status, from: filter.from, to: filter.to, ..Default::default() };
        if actor.is_admin() {
            query.vendor_id = filter.vendor_id;
        } else if actor.is_vendor() {
            query.vendor_id = Some(actor.user_id);
        } else {
            query.customer_id = Some(actor.user_id);
        }
        self.ctx.stores.orders.list(&query).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Order> {
        let order = self.load(id).await?;
        let visible = actor.is_admin()
            || order.customer_id() == actor.user_id
            || (actor.is_vendor() && order.contains_vendor(actor.user_id));
        // Hidden orders read as missing.
        if visible { Ok(order) } else { Err(EcommerceError::not_found("Order")) }
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn ship(&self, actor: &Actor, id: Uuid, tracking: Option<String>) -> Result<Order> {
        let mut order = self.fulfilment_target(actor, id).await?;
        let expected = order.status();
        order.ship(tracking.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))?;
        self.ctx.stores.orders.save(&order, expected).await?;
        self.ctx.events.publish(order.take_events()).await;
        info!(order_id = %id, "order shipped");
        Ok(order)
    }

    #[tracing::instrument(skip(self, actor))]
    pub async fn deliver(&self, actor: &Actor, id: Uuid) -> Result<Order> {
        let mut order = self.fulfilment_target(actor, id).await?;
        let expected = order.status();
        order.deliver()?;
        self.ctx.stores.orders.save(&order, expected).await?;
        self.ctx.events.publish(order.take_events()).await;
        info!(order_id = %id, "order delivered");
        Ok(order)
    }

    /// Customers may cancel their own unpaid orders; admins any order up to Paid.
    /// Stock is restored, open commission entries are voided and settled ones reversed.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel(&self, actor: &Actor, id: Uuid, reason: Option<String>) -> Result<Order> {
        let mut order = self.get(actor, id).await?;
        if !actor.is_admin() {
            if order.customer_id() != actor.user_id {
                return Err(EcommerceError::forbidden("only the customer or an administrator can cancel"));
            }
            if !matches!(order.status(), OrderStatus::PendingPayment | OrderStatus::PaymentReview) {
                warn!(order_id = %id, status = order.status().as_str(), "customer cancellation refused");
                return Err(EcommerceError::forbidden("paid orders can only be cancelled by an administrator"));
            }
        }

        let expected = order.status();
        let restock = order.cancel()?;
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            order.set_notes(Some(reason));
        }
        let entries = commission_unwind(self.ctx.stores.commissions.entries_for_order(id).await?);
        self.ctx.stores.orders.cancel(&order, expected, &restock, &entries).await?;
        for (product_id, _) in &restock { self.ctx.caches.products.remove(product_id); }
        self.ctx.events.publish(order.take_events()).await;
        info!(order_id = %id, restocked = restock.len(), entries = entries.len(), "order cancelled");
        Ok(order)
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.ctx.stores.orders.get(id).await?.ok_or_else(|| EcommerceError::not_found("Order"))
    }

    /// Admins, or the single vendor of a directly paid order, move it through fulfilment.
    async fn fulfilment_target(&self, actor: &Actor, id: Uuid) -> Result<Order> {
        actor.require_vendor_or_admin()?;
        let order = self.get(actor, id).await?;
        if actor.is_vendor() && order.vendor_ids() != [actor.user_id] {
            return Err(EcommerceError::forbidden("orders with several vendors are fulfilled by the platform"));
        }
        Ok(order)
    }
}

/// Open entries become void; settled sale entries get a mirror reversal.
fn commission_unwind(entries: Vec<CommissionEntry>) -> Vec<CommissionEntry> {
    entries.into_iter().filter_map(|mut entry| match entry.status {
        EntryStatus::Open => {
            entry.status = EntryStatus::Void;
            Some(entry)
        }
        EntryStatus::Settled => Some(CommissionEntry::reversal_of(&entry)),
        EntryStatus::Void => None,
    }).collect()
}
