//! Commission rules and the ledger of per-order entries.

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::{CommissionEntry, CommissionRule, CommissionScope, RateTable};
use crate::domain::ports::EntryQuery;
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct CommissionService {
    ctx: Context,
}

impl CommissionService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn list_rules(&self, actor: &Actor) -> Result<Vec<CommissionRule>> {
        actor.require_admin()?;
        self.ctx.stores.commissions.list_rules().await
    }

    /// Creates or replaces the rule for `scope`.
    #[tracing::instrument(skip(self, actor))]
    pub async fn set_rule(&self, actor: &Actor, scope: CommissionScope, rate: Decimal, active: bool) -> Result<CommissionRule> {
        actor.require_admin()?;
        match scope {
            CommissionScope::Vendor { vendor_id } => match self.ctx.stores.users.get(vendor_id).await? {
                Some(user) if user.is_vendor() => {}
                _ => return Err(EcommerceError::validation("vendor_id must reference a vendor")),
            },
            CommissionScope::Category { category_id } => {
                self.ctx.stores.categories.get(category_id).await?.ok_or_else(|| EcommerceError::not_found("Category"))?;
            }
            CommissionScope::Default => {}
        }
        let mut rule = CommissionRule::new(scope, rate)?;
        rule.active = active;
        if let Some(existing) = self.ctx.stores.commissions.list_rules().await?.into_iter().find(|r| r.scope == scope) {
            rule.id = existing.id;
        }
        self.ctx.stores.commissions.save_rule(&rule).await?;
        info!(scope = %scope.key(), %rate, "commission rule saved");
        Ok(rule)
    }

    pub async fn delete_rule(&self, actor: &Actor, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        if !self.ctx.stores.commissions.delete_rule(id).await? {
            return Err(EcommerceError::not_found("Commission rule"));
        }
        info!(rule_id = %id, "commission rule deleted");
        Ok(())
    }

    /// Effective rates: stored rules over the configured fallback.
    pub async fn rate_table(&self) -> Result<RateTable> {
        let rules = self.ctx.stores.commissions.list_rules().await?;
        Ok(RateTable::from_rules(&rules, self.ctx.config.default_commission_rate))
    }

    /// Vendors only see their own entries.
    pub async fn list_entries(&self, actor: &Actor, mut query: EntryQuery) -> Result<Vec<CommissionEntry>> {
        actor.require_vendor_or_admin()?;
        query.vendor_id = actor.vendor_scope(query.vendor_id);
        self.ctx.stores.commissions.list_entries(&query).await
    }
}
