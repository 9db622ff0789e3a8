//! Promotion (coupon) Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{round2, Money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind { Percentage, FixedAmount }

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::FixedAmount => "fixed_amount" }
    }
}

impl FromStr for DiscountKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed_amount" => Ok(Self::FixedAmount),
            other => Err(format!("unknown discount kind '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    /// When set, only this vendor's lines are discounted.
    pub vendor_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    pub times_used: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    pub fn new(code: &str, kind: DiscountKind, value: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), code: normalize_code(code), description: None, kind, value, min_subtotal: None,
            vendor_id: None, starts_at: now, ends_at: None, max_uses: None, times_used: 0, active: true, created_at: now,
        }
    }

    /// Checks whether the coupon can be applied to `eligible_subtotal` at `now`.
    pub fn validate(&self, now: DateTime<Utc>, eligible_subtotal: Decimal) -> Result<(), PromotionError> {
        if !self.active { return Err(PromotionError::Inactive); }
        if now < self.starts_at { return Err(PromotionError::NotStarted); }
        if self.ends_at.is_some_and(|end| now > end) { return Err(PromotionError::Expired); }
        if self.max_uses.is_some_and(|max| self.times_used >= max) { return Err(PromotionError::Exhausted); }
        if eligible_subtotal <= Decimal::ZERO { return Err(PromotionError::NotApplicable); }
        if let Some(min) = self.min_subtotal {
            if eligible_subtotal < min { return Err(PromotionError::BelowMinimum { minimum: min }); }
        }
        Ok(())
    }

    /// Discount on an eligible subtotal, never larger than the subtotal itself.
    pub fn discount_on(&self, eligible: &Money) -> Money {
        let raw = match self.kind {
            DiscountKind::Percentage => eligible.amount() * self.value.min(Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED,
            DiscountKind::FixedAmount => self.value,
        };
        let raw = round2(raw.max(Decimal::ZERO));
        Money::new(raw, eligible.currency()).min(eligible)
    }

    pub fn applies_to_vendor(&self, vendor_id: Uuid) -> bool {
        self.vendor_id.map_or(true, |v| v == vendor_id)
    }
}

pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionError { Inactive, NotStarted, Expired, Exhausted, NotApplicable, BelowMinimum { minimum: Decimal } }
impl std::error::Error for PromotionError {}
impl std::fmt::Display for PromotionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "Coupon is not active"),
            Self::NotStarted => write!(f, "Coupon is not valid yet"),
            Self::Expired => write!(f, "Coupon has expired"),
            Self::Exhausted => write!(f, "Coupon usage limit reached"),
            Self::NotApplicable => write!(f, "Coupon does not apply to any item in the cart"),
            Self::BelowMinimum { minimum } => write!(f, "Coupon requires a minimum subtotal of {minimum}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_discount() {
        let p = Promotion::new("verano10", DiscountKind::Percentage, dec!(10));
        assert_eq!(p.code, "VERANO10");
        assert_eq!(p.discount_on(&Money::new(dec!(55.55), "PEN")).amount(), dec!(5.56));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let p = Promotion::new("MENOS50", DiscountKind::FixedAmount, dec!(50));
        assert_eq!(p.discount_on(&Money::new(dec!(30), "PEN")).amount(), dec!(30));
    }

    #[test]
    fn test_validate_window_and_usage() {
        let now = Utc::now();
        let mut p = Promotion::new("X", DiscountKind::FixedAmount, dec!(5));
        p.starts_at = now - Duration::days(2);
        p.ends_at = Some(now - Duration::days(1));
        assert_eq!(p.validate(now, dec!(100)), Err(PromotionError::Expired));
        p.ends_at = None;
        p.max_uses = Some(1);
        p.times_used = 1;
        assert_eq!(p.validate(now, dec!(100)), Err(PromotionError::Exhausted));
        p.max_uses = None;
        p.min_subtotal = Some(dec!(200));
        assert_eq!(p.validate(now, dec!(100)), Err(PromotionError::BelowMinimum { minimum: dec!(200) }));
        assert!(p.validate(now, dec!(250)).is_ok());
    }
}
