//! Commission rules (ConfiguracionComision) and per-order commission entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::order::{LineItem, Order, PaymentRouting};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommissionScope {
    Default,
    Vendor { vendor_id: Uuid },
    Category { category_id: Uuid },
}

impl CommissionScope {
    /// Unique key per scope; at most one rule exists per key.
    pub fn key(&self) -> String {
        match self {
            Self::Default => "default".to_string(),
            Self::Vendor { vendor_id } => format!("vendor:{vendor_id}"),
            Self::Category { category_id } => format!("category:{category_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: Uuid,
    pub scope: CommissionScope,
    /// Percentage in `[0, 100]`.
    pub rate: Decimal,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl CommissionRule {
    pub fn new(scope: CommissionScope, rate: Decimal) -> Result<Self, CommissionError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED { return Err(CommissionError::RateOutOfRange(rate)); }
        Ok(Self { id: Uuid::now_v7(), scope, rate, active: true, updated_at: Utc::now() })
    }
}

/// Resolved rates. Precedence: vendor, then category, then default.
#[derive(Clone, Debug)]
pub struct RateTable {
    default_rate: Decimal,
    vendors: HashMap<Uuid, Decimal>,
    categories: HashMap<Uuid, Decimal>,
}

impl RateTable {
    pub fn from_rules(rules: &[CommissionRule], fallback: Decimal) -> Self {
        let mut table = Self { default_rate: fallback, vendors: HashMap::new(), categories: HashMap::new() };
        for rule in rules.iter().filter(|r| r.active) {
            match rule.scope {
                CommissionScope::Default => table.default_rate = rule.rate,
                CommissionScope::Vendor { vendor_id } => { table.vendors.insert(vendor_id, rule.rate); }
                CommissionScope::Category { category_id } => { table.categories.insert(category_id, rule.rate); }
            }
        }
        table
    }

    pub fn rate_for(&self, vendor_id: Uuid, category_id: Option<Uuid>) -> Decimal {
        self.vendors.get(&vendor_id).copied()
            .or_else(|| category_id.and_then(|c| self.categories.get(&c).copied()))
            .unwrap_or(self.default_rate)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind { Sale, Reversal }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus { Open, Settled, Void }

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Open => "open", Self::Settled => "settled", Self::Void => "void" }
    }
}

impl FromStr for EntryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "settled" => Ok(Self::Settled),
            "void" => Ok(Self::Void),
            other => Err(format!("unknown entry status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryLine {
    pub line_id: Uuid,
    pub base: Money,
    pub rate: Decimal,
    pub commission: Money,
}

/// What one vendor earned (or gave back) on one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub vendor_id: Uuid,
    pub routing: PaymentRouting,
    pub kind: EntryKind,
    pub lines: Vec<EntryLine>,
    pub gross: Money,
    pub shipping: Money,
    pub commission: Money,
    pub status: EntryStatus,
    pub settlement_id: Option<Uuid>,
    /// Moment the entry counts for settlement periods.
    pub occurred_at: DateTime<Utc>,
}

impl CommissionEntry {
    /// One sale entry per vendor present in a freshly paid order.
    pub fn for_paid_order(order: &Order, rates: &RateTable, category_of: impl Fn(Uuid) -> Option<Uuid>) -> Vec<Self> {
        let occurred_at = order.paid_at().unwrap_or_else(Utc::now);
        order.vendor_ids().into_iter().map(|vendor_id| {
            let lines: Vec<EntryLine> = order.lines_for_vendor(vendor_id).map(|line| {
                let rate = rates.rate_for(vendor_id, category_of(line.product_id));
                let base = line.net();
                EntryLine { line_id: line.id, commission: base.percent(rate), base, rate }
            }).collect();
            Self::assemble(order, vendor_id, EntryKind::Sale, lines, order.shipping_for_vendor(vendor_id), occurred_at)
        }).collect()
    }

    /// Negative entry cancelling the refunded part of `line`, at the rate used on the original sale.
    pub fn for_return(order: &Order, line: &LineItem, refund: &Money, original: Option<&CommissionEntry>) -> Self {
        let rate = original
            .and_then(|e| e.lines.iter().find(|l| l.line_id == line.id))
            .map_or(Decimal::ZERO, |l| l.rate);
        let base = refund.negate();
        let lines = vec![EntryLine { line_id: line.id, commission: base.percent(rate), base, rate }];
        Self::assemble(order, line.vendor_id, EntryKind::Reversal, lines, Money::zero(order.currency()), Utc::now())
    }

    /// Mirror image of a settled entry, used when a paid order is cancelled after liquidation.
    pub fn reversal_of(entry: &CommissionEntry) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id: entry.order_id,
            order_number: entry.order_number.clone(),
            vendor_id: entry.vendor_id,
            routing: entry.routing,
            kind: EntryKind::Reversal,
            lines: entry.lines.iter().map(|l| EntryLine { line_id: l.line_id, base: l.base.negate(), rate: l.rate, commission: l.commission.negate() }).collect(),
            gross: entry.gross.negate(),
            shipping: entry.shipping.negate(),
            commission: entry.commission.negate(),
            status: EntryStatus::Open,
            settlement_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Money the platform holds for this entry: everything paid into platform accounts.
    pub fn platform_collected(&self) -> Money {
        match self.routing {
            PaymentRouting::Platform => self.gross.add(&self.shipping).unwrap_or_else(|_| self.gross.clone()),
            PaymentRouting::DirectToVendor { .. } => Money::zero(self.gross.currency()),
        }
    }

    pub fn vendor_collected(&self) -> Money {
        match self.routing {
            PaymentRouting::Platform => Money::zero(self.gross.currency()),
            PaymentRouting::DirectToVendor { .. } => self.gross.add(&self.shipping).unwrap_or_else(|_| self.gross.clone()),
        }
    }

    fn assemble(order: &Order, vendor_id: Uuid, kind: EntryKind, lines: Vec<EntryLine>, shipping: Money, occurred_at: DateTime<Utc>) -> Self {
        let zero = Money::zero(order.currency());
        let gross = lines.iter().fold(zero.clone(), |acc, l| acc.add(&l.base).unwrap_or(acc));
        let commission = lines.iter().fold(zero, |acc, l| acc.add(&l.commission).unwrap_or(acc));
        Self {
            id: Uuid::now_v7(), order_id: order.id(), order_number: order.order_number().to_string(), vendor_id,
            routing: order.routing(), kind, lines, gross, shipping, commission, status: EntryStatus::Open,
            settlement_id: None, occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionError { RateOutOfRange(Decimal) }
impl std::error::Error for CommissionError {}
impl std::fmt::Display for CommissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::RateOutOfRange(rate) => write!(f, "Commission rate {rate} must be between 0 and 100") }
    }
}
