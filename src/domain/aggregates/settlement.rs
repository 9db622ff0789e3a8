//! Commission settlement (PagoComision / liquidación) Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::commission::{CommissionEntry, EntryStatus};
use crate::domain::events::{DomainEvent, SettlementEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus { #[default] Pending, Approved, Paid, Cancelled }

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Paid => "paid", Self::Cancelled => "cancelled" }
    }
}

impl FromStr for SettlementStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown settlement status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection { PlatformPaysVendor, VendorPaysPlatform }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub period_from: NaiveDate,
    pub period_to: NaiveDate,
    pub entry_ids: Vec<Uuid>,
    pub gross: Money,
    pub shipping: Money,
    pub commission: Money,
    pub platform_collected: Money,
    pub vendor_collected: Money,
    /// `platform_collected - commission`; negative when the vendor owes the platform.
    pub balance: Money,
    pub status: SettlementStatus,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Settlement {
    /// Liquidates the given open entries of one vendor.
    pub fn liquidate(vendor_id: Uuid, period_from: NaiveDate, period_to: NaiveDate, entries: &[CommissionEntry], currency: &str, created_by: Uuid) -> Result<Self, SettlementError> {
        if period_from > period_to { return Err(SettlementError::InvalidPeriod); }
        let entries: Vec<&CommissionEntry> = entries.iter()
            .filter(|e| e.vendor_id == vendor_id && e.status == EntryStatus::Open)
            .collect();
        if entries.is_empty() { return Err(SettlementError::NothingToSettle); }

        let zero = Money::zero(currency);
        let sum = |f: &dyn Fn(&CommissionEntry) -> Money| entries.iter().fold(zero.clone(), |acc, e| acc.add(&f(e)).unwrap_or(acc));
        let gross = sum(&|e| e.gross.clone());
        let shipping = sum(&|e| e.shipping.clone());
        let commission = sum(&|e| e.commission.clone());
        let platform_collected = sum(&|e| e.platform_collected());
        let vendor_collected = sum(&|e| e.vendor_collected());
        let balance = platform_collected.subtract(&commission).unwrap_or_else(|_| zero.clone());

        let id = Uuid::now_v7();
        let mut settlement = Self {
            id, vendor_id, period_from, period_to, entry_ids: entries.iter().map(|e| e.id).collect(),
            gross, shipping, commission, platform_collected, vendor_collected, balance, status: SettlementStatus::Pending,
            payment_reference: None, notes: None, created_by, created_at: Utc::now(), approved_at: None, paid_at: None,
            cancelled_at: None, events: vec![],
        };
        settlement.raise_event(DomainEvent::Settlement(SettlementEvent::Created { settlement_id: id, vendor_id, balance: settlement.balance.amount() }));
        Ok(settlement)
    }

    pub fn direction(&self) -> SettlementDirection {
        if self.balance.is_negative() { SettlementDirection::VendorPaysPlatform } else { SettlementDirection::PlatformPaysVendor }
    }

    /// Absolute amount that changes hands.
    pub fn amount_due(&self) -> Money {
        if self.balance.is_negative() { self.balance.negate() } else { self.balance.clone() }
    }

    pub fn approve(&mut self) -> Result<(), SettlementError> {
        self.expect(&[SettlementStatus::Pending], "approve")?;
        self.status = SettlementStatus::Approved;
        self.approved_at = Some(Utc::now());
        self.raise_event(DomainEvent::Settlement(SettlementEvent::Approved { settlement_id: self.id }));
        Ok(())
    }

    pub fn mark_paid(&mut self, reference: &str) -> Result<(), SettlementError> {
        self.expect(&[SettlementStatus::Approved], "pay")?;
        let reference = reference.trim();
        if reference.is_empty() { return Err(SettlementError::MissingReference); }
        self.status = SettlementStatus::Paid;
        self.payment_reference = Some(reference.to_string());
        self.paid_at = Some(Utc::now());
        self.raise_event(DomainEvent::Settlement(SettlementEvent::Paid { settlement_id: self.id, reference: reference.to_string() }));
        Ok(())
    }

    pub fn cancel(&mut self, notes: Option<String>) -> Result<(), SettlementError> {
        self.expect(&[SettlementStatus::Pending, SettlementStatus::Approved], "cancel")?;
        self.status = SettlementStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        if notes.is_some() { self.notes = notes; }
        self.raise_event(DomainEvent::Settlement(SettlementEvent::Cancelled { settlement_id: self.id }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }

    fn expect(&self, allowed: &[SettlementStatus], action: &'static str) -> Result<(), SettlementError> {
        if allowed.contains(&self.status) { Ok(()) }
        else { Err(SettlementError::InvalidTransition { from: self.status, action }) }
    }
}

/// Persistence-side constructor; no events are raised.
#[allow(clippy::too_many_arguments)]
impl Settlement {
    pub fn restore(
        id: Uuid, vendor_id: Uuid, period_from: NaiveDate, period_to: NaiveDate, entry_ids: Vec<Uuid>,
        gross: Money, shipping: Money, commission: Money, platform_collected: Money, vendor_collected: Money,
        balance: Money, status: SettlementStatus, payment_reference: Option<String>, notes: Option<String>,
        created_by: Uuid, created_at: DateTime<Utc>, approved_at: Option<DateTime<Utc>>, paid_at: Option<DateTime<Utc>>,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id, vendor_id, period_from, period_to, entry_ids, gross, shipping, commission, platform_collected,
            vendor_collected, balance, status, payment_reference, notes, created_by, created_at, approved_at, paid_at,
            cancelled_at, events: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError { InvalidPeriod, NothingToSettle, MissingReference, InvalidTransition { from: SettlementStatus, action: &'static str } }
impl std::error::Error for SettlementError {}
impl std::fmt::Display for SettlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPeriod => write!(f, "Period start is after period end"),
            Self::NothingToSettle => write!(f, "No open commission entries in the period"),
            Self::MissingReference => write!(f, "Payment reference is required"),
            Self::InvalidTransition { from, action } => write!(f, "Cannot {action} a settlement in status {}", from.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::commission::{EntryKind, EntryLine};
    use crate::domain::aggregates::order::PaymentRouting;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn entry(vendor_id: Uuid, routing: PaymentRouting, gross: Decimal, shipping: Decimal, commission: Decimal) -> CommissionEntry {
        CommissionEntry {
            id: Uuid::now_v7(), order_id: Uuid::now_v7(), order_number: "V-1".into(), vendor_id, routing, kind: EntryKind::Sale,
            lines: vec![EntryLine { line_id: Uuid::now_v7(), base: Money::new(gross, "PEN"), rate: dec!(10), commission: Money::new(commission, "PEN") }],
            gross: Money::new(gross, "PEN"), shipping: Money::new(shipping, "PEN"), commission: Money::new(commission, "PEN"),
            status: EntryStatus::Open, settlement_id: None, occurred_at: Utc::now(),
        }
    }

    fn period() -> (NaiveDate, NaiveDate) {
        (NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), NaiveDate::from_ymd_opt(2025, 1, 31).unwrap())
    }

    #[test]
    fn test_platform_pays_vendor() {
        let vendor = Uuid::now_v7();
        let (from, to) = period();
        let entries = vec![
            entry(vendor, PaymentRouting::Platform, dec!(200), dec!(10), dec!(20)),
            entry(vendor, PaymentRouting::DirectToVendor { vendor_id: vendor }, dec!(100), dec!(5), dec!(10)),
        ];
        let s = Settlement::liquidate(vendor, from, to, &entries, "PEN", Uuid::now_v7()).unwrap();
        assert_eq!(s.platform_collected.amount(), dec!(210));
        assert_eq!(s.vendor_collected.amount(), dec!(105));
        assert_eq!(s.commission.amount(), dec!(30));
        assert_eq!(s.balance.amount(), dec!(180));
        assert_eq!(s.direction(), SettlementDirection::PlatformPaysVendor);
    }

    #[test]
    fn test_vendor_pays_platform_on_direct_sales() {
        let vendor = Uuid::now_v7();
        let (from, to) = period();
        let entries = vec![entry(vendor, PaymentRouting::DirectToVendor { vendor_id: vendor }, dec!(300), dec!(0), dec!(30))];
        let s = Settlement::liquidate(vendor, from, to, &entries, "PEN", Uuid::now_v7()).unwrap();
        assert_eq!(s.direction(), SettlementDirection::VendorPaysPlatform);
        assert_eq!(s.amount_due().amount(), dec!(30));
    }

    #[test]
    fn test_lifecycle() {
        let vendor = Uuid::now_v7();
        let (from, to) = period();
        let entries = vec![entry(vendor, PaymentRouting::Platform, dec!(50), dec!(0), dec!(5))];
        let mut s = Settlement::liquidate(vendor, from, to, &entries, "PEN", Uuid::now_v7()).unwrap();
        assert_eq!(s.mark_paid("OP-1"), Err(SettlementError::InvalidTransition { from: SettlementStatus::Pending, action: "pay" }));
        s.approve().unwrap();
        assert_eq!(s.mark_paid("  "), Err(SettlementError::MissingReference));
        s.mark_paid("OP-1").unwrap();
        assert!(s.cancel(None).is_err());
        assert_eq!(s.take_events().len(), 3);
    }

    #[test]
    fn test_nothing_to_settle() {
        let (from, to) = period();
        assert_eq!(Settlement::liquidate(Uuid::now_v7(), from, to, &[], "PEN", Uuid::now_v7()).unwrap_err(), SettlementError::NothingToSettle);
    }
}
