//! Periodic vendor liquidations over open commission entries.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::{day_bounds, Actor, Context};
use crate::domain::aggregates::{CommissionEntry, EntryStatus, Settlement, SettlementError, SettlementStatus};
use crate::domain::ports::EntryQuery;
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct SettlementService {
    ctx: Context,
}

impl SettlementService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Liquidates one vendor's open entries dated within `from..=to`.
    #[tracing::instrument(skip(self, actor))]
    pub async fn liquidate(&self, actor: &Actor, vendor_id: Uuid, from: NaiveDate, to: NaiveDate) -> Result<Settlement> {
        actor.require_admin()?;
        let entries = self.open_entries(Some(vendor_id), from, to).await?;
        self.settle(actor, vendor_id, from, to, &entries).await
    }

    /// Liquidates every vendor with open entries in the period.
    #[tracing::instrument(skip(self, actor))]
    pub async fn liquidate_all(&self, actor: &Actor, from: NaiveDate, to: NaiveDate) -> Result<Vec<Settlement>> {
        actor.require_admin()?;
        if from > to { return Err(SettlementError::InvalidPeriod.into()); }
        let entries = self.open_entries(None, from, to).await?;
        let vendors: BTreeSet<Uuid> = entries.iter().map(|e| e.vendor_id).collect();
        let mut settlements = Vec::with_capacity(vendors.len());
        for vendor_id in vendors {
            match self.settle(actor, vendor_id, from, to, &entries).await {
                Ok(settlement) => settlements.push(settlement),
                Err(EcommerceError::Settlement(SettlementError::NothingToSettle)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(count = settlements.len(), "bulk liquidation finished");
        Ok(settlements)
    }

    pub async fn list(&self, actor: &Actor, vendor_id: Option<Uuid>, status: Option<SettlementStatus>) -> Result<Vec<Settlement>> {
        actor.require_vendor_or_admin()?;
        self.ctx.stores.settlements.list(actor.vendor_scope(vendor_id), status).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Settlement> {
        actor.require_vendor_or_admin()?;
        let settlement = self.ctx.stores.settlements.get(id).await?.ok_or_else(|| EcommerceError::not_found("Settlement"))?;
        actor.require_vendor(settlement.vendor_id)?;
        Ok(settlement)
    }

    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<Settlement> {
        self.transition(actor, id, |s| s.approve()).await
    }

    pub async fn mark_paid(&self, actor: &Actor, id: Uuid, reference: &str) -> Result<Settlement> {
        self.transition(actor, id, |s| s.mark_paid(reference)).await
    }

    /// Releases the settled entries back to open.
    pub async fn cancel(&self, actor: &Actor, id: Uuid, notes: Option<String>) -> Result<Settlement> {
        self.transition(actor, id, |s| s.cancel(notes)).await
    }

    async fn transition(&self, actor: &Actor, id: Uuid, apply: impl FnOnce(&mut Settlement) -> std::result::Result<(), SettlementError>) -> Result<Settlement> {
        actor.require_admin()?;
        let mut settlement = self.get(actor, id).await?;
        apply(&mut settlement).map_err(|e| {
            warn!(settlement_id = %id, error = %e, "settlement transition refused");
            e
        })?;
        self.ctx.stores.settlements.save(&settlement).await?;
        self.ctx.events.publish(settlement.take_events()).await;
        info!(settlement_id = %id, status = settlement.status.as_str(), "settlement updated");
        Ok(settlement)
    }

    async fn settle(&self, actor: &Actor, vendor_id: Uuid, from: NaiveDate, to: NaiveDate, entries: &[CommissionEntry]) -> Result<Settlement> {
        let mut settlement = Settlement::liquidate(vendor_id, from, to, entries, &self.ctx.config.currency, actor.user_id)?;
        self.ctx.stores.settlements.create(&settlement).await?;
        self.ctx.events.publish(settlement.take_events()).await;
        info!(settlement_id = %settlement.id, %vendor_id, balance = %settlement.balance, direction = ?settlement.direction(), "vendor liquidated");
        Ok(settlement)
    }

    async fn open_entries(&self, vendor_id: Option<Uuid>, from: NaiveDate, to: NaiveDate) -> Result<Vec<CommissionEntry>> {
        let (start, end) = day_bounds(from, to);
        let query = EntryQuery { vendor_id, status: Some(EntryStatus::Open), from: Some(start), to: Some(end) };
        self.ctx.stores.commissions.list_entries(&query).await
    }
}
