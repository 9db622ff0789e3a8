//! Coupon administration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::promotion::normalize_code;
use crate::domain::aggregates::{DiscountKind, Promotion};
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct PromotionInput {
    pub code: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub vendor_id: Option<Uuid>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    pub active: bool,
}

#[derive(Clone)]
pub struct PromotionService {
    ctx: Context,
}

impl PromotionService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn list(&self, actor: &Actor) -> Result<Vec<Promotion>> {
        actor.require_admin()?;
        self.ctx.stores.promotions.list().await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Promotion> {
        actor.require_admin()?;
        self.ctx.stores.promotions.get(id).await?.ok_or_else(|| EcommerceError::not_found("Promotion"))
    }

    #[tracing::instrument(skip(self, actor, input), fields(code = %input.code))]
    pub async fn create(&self, actor: &Actor, input: PromotionInput) -> Result<Promotion> {
        actor.require_admin()?;
        let mut promotion = Promotion::new(&input.code, input.kind, input.value);
        self.apply(&mut promotion, input).await?;
        self.ctx.stores.promotions.save(&promotion).await?;
        info!(promotion_id = %promotion.id, code = %promotion.code, "promotion created");
        Ok(promotion)
    }

    #[tracing::instrument(skip(self, actor, input))]
    pub async fn update(&self, actor: &Actor, id: Uuid, input: PromotionInput) -> Result<Promotion> {
        let mut promotion = self.get(actor, id).await?;
        promotion.code = normalize_code(&input.code);
        promotion.kind = input.kind;
        promotion.value = input.value;
        self.apply(&mut promotion, input).await?;
        self.ctx.stores.promotions.save(&promotion).await?;
        info!(promotion_id = %id, "promotion updated");
        // Usage is counted by checkout; return the stored counter rather than the one read above.
        self.get(actor, id).await
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        if !self.ctx.stores.promotions.delete(id).await? {
            return Err(EcommerceError::not_found("Promotion"));
        }
        info!(promotion_id = %id, "promotion deleted");
        Ok(())
    }

    async fn apply(&self, promotion: &mut Promotion, input: PromotionInput) -> Result<()> {
        if promotion.code.is_empty() || promotion.code.chars().any(char::is_whitespace) {
            return Err(EcommerceError::validation("coupon code must be a single word"));
        }
        if input.value <= Decimal::ZERO || (input.kind == DiscountKind::Percentage && input.value > Decimal::ONE_HUNDRED) {
            return Err(EcommerceError::validation("discount value is out of range"));
        }
        if let (Some(start), Some(end)) = (input.starts_at, input.ends_at) {
            if end <= start { return Err(EcommerceError::validation("promotion must end after it starts")); }
        }
        if let Some(other) = self.ctx.stores.promotions.find_by_code(&promotion.code).await? {
            if other.id != promotion.id {
                return Err(EcommerceError::Conflict(format!("Coupon code {} is already in use", promotion.code)));
            }
        }
        promotion.description = input.description;
        promotion.min_subtotal = input.min_subtotal;
        promotion.vendor_id = input.vendor_id;
        if let Some(start) = input.starts_at { promotion.starts_at = start; }
        promotion.ends_at = input.ends_at;
        promotion.max_uses = input.max_uses;
        promotion.active = input.active;
        Ok(())
    }
}
