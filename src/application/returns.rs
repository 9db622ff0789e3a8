//! Customer return requests and their resolution.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::{CommissionEntry, EntryKind, EntryStatus, Order, ReturnError, ReturnRequest, ReturnStatus};
use crate::domain::ports::ReturnQuery;
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone, Default)]
pub struct ReturnFilter {
    pub order_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
}

#[derive(Clone)]
pub struct ReturnService {
    ctx: Context,
}

impl ReturnService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    #[tracing::instrument(skip(self, actor, reason))]
    pub async fn request(&self, actor: &Actor, order_id: Uuid, line_id: Uuid, quantity: u32, reason: &str) -> Result<ReturnRequest> {
        let order = self.load_order(order_id).await?;
        if order.customer_id() != actor.user_id {
            return Err(EcommerceError::not_found("Order"));
        }
        let pending = self.ctx.stores.returns.pending_quantity(line_id).await?;
        let mut request = ReturnRequest::open(&order, line_id, quantity, reason, pending, self.ctx.config.return_window_days, Utc::now())
            .map_err(|e| {
                warn!(%order_id, %line_id, error = %e, "return request refused");
                e
            })?;
        self.ctx.stores.returns.insert(&request).await?;
        self.ctx.events.publish(request.take_events()).await;
        info!(return_id = %request.id, %order_id, quantity, refund = %request.refund, "return requested");
        Ok(request)
    }

    /// Customers see their own requests, vendors those on their lines, admins all.
    pub async fn list(&self, actor: &Actor, filter: ReturnFilter) -> Result<Vec<ReturnRequest>> {
        let mut query = ReturnQuery { order_id: filter.order_id, status: filter.status, ..Default::default() };
        if actor.is_vendor() {
            query.vendor_id = Some(actor.user_id);
        } else if !actor.is_admin() {
            query.customer_id = Some(actor.user_id);
        }
        self.ctx.stores.returns.list(&query).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<ReturnRequest> {
        let request = self.ctx.stores.returns.get(id).await?.ok_or_else(|| EcommerceError::not_found("Return request"))?;
        let visible = actor.is_admin()
            || request.customer_id == actor.user_id
            || (actor.is_vendor() && request.vendor_id == actor.user_id);
        if visible { Ok(request) } else { Err(EcommerceError::not_found("Return request")) }
    }

    /// Approves in one transaction: the stored order line records the returned units, stock
    /// comes back when `restock` is set and the vendor's commission is reversed. A second
    /// approval of the same request finds it resolved and writes nothing.
    #[tracing::instrument(skip(self, actor, note))]
    pub async fn approve(&self, actor: &Actor, id: Uuid, restock: bool, note: Option<String>) -> Result<ReturnRequest> {
        let mut request = self.resolvable(actor, id).await?;
        let order = self.load_order(request.order_id).await?;
        let line = order.line(request.line_id).cloned().ok_or(ReturnError::LineNotFound)?;
        request.approve(actor.user_id, restock, note)?;

        let original = self.ctx.stores.commissions.entries_for_order(order.id()).await?
            .into_iter()
            .find(|e| e.kind == EntryKind::Sale && e.vendor_id == line.vendor_id && e.status != EntryStatus::Void);
        let reversal = original.as_ref().map(|sale| CommissionEntry::for_return(&order, &line, &request.refund, Some(sale)));
        let restock_item = restock.then_some((request.product_id, request.quantity));

        let order = self.ctx.stores.returns.approve(&request, restock_item, reversal.as_ref()).await?;
        if restock { self.ctx.caches.products.remove(&request.product_id); }
        self.ctx.events.publish(request.take_events()).await;
        info!(return_id = %id, refund = %request.refund, restock, order_status = order.status().as_str(), "return approved");
        Ok(request)
    }

    #[tracing::instrument(skip(self, actor, note))]
    pub async fn reject(&self, actor: &Actor, id: Uuid, note: Option<String>) -> Result<ReturnRequest> {
        let mut request = self.resolvable(actor, id).await?;
        request.reject(actor.user_id, note)?;
        self.ctx.stores.returns.save(&request).await?;
        self.ctx.events.publish(request.take_events()).await;
        info!(return_id = %id, "return rejected");
        Ok(request)
    }

    async fn resolvable(&self, actor: &Actor, id: Uuid) -> Result<ReturnRequest> {
        actor.require_vendor_or_admin()?;
        let request = self.get(actor, id).await?;
        actor.require_vendor(request.vendor_id)?;
        if !request.is_open() { return Err(ReturnError::AlreadyResolved.into()); }
        Ok(request)
    }

    async fn load_order(&self, id: Uuid) -> Result<Order> {
        self.ctx.stores.orders.get(id).await?.ok_or_else(|| EcommerceError::not_found("Order"))
    }
}
