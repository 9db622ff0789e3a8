//! Sales reports for the back office and the vendor panel.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

use super::{day_bounds, Actor, Context};
use crate::domain::aggregates::{CommissionEntry, EntryStatus, Order};
use crate::domain::ports::{EntryQuery, OrderQuery};
use crate::domain::value_objects::round2;
use crate::error::Result;

const REPORT_TTL: Duration = Duration::from_secs(2 * 60);
const TOP_PRODUCTS: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// `None` for the whole marketplace.
    pub vendor_id: Option<Uuid>,
    pub currency: String,
    pub orders: u64,
    pub gross: Decimal,
    pub discounts: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub commission: Decimal,
    pub by_vendor: Vec<VendorSales>,
    pub by_status: BTreeMap<String, u64>,
    pub top_products: Vec<ProductSales>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorSales {
    pub vendor_id: Uuid,
    pub orders: u64,
    /// Line totals after discounts.
    pub gross: Decimal,
    pub commission: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub units: u32,
    pub revenue: Decimal,
}

#[derive(Clone)]
pub struct ReportService {
    ctx: Context,
}

impl ReportService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Admins report on everything (or one vendor); vendors only on their own lines.
    pub async fn sales(&self, actor: &Actor, from: NaiveDate, to: NaiveDate, vendor_id: Option<Uuid>) -> Result<SalesReport> {
        actor.require_vendor_or_admin()?;
        let vendor_id = actor.vendor_scope(vendor_id);
        let key = format!("sales:{}:{from}:{to}", vendor_id.map_or_else(|| "all".to_string(), |v| v.to_string()));
        if let Some(hit) = self.ctx.caches.reports.get(&key) {
            return Ok(hit);
        }

        let (start, end) = day_bounds(from, to);
        let orders = self.ctx.stores.orders
            .list(&OrderQuery { vendor_id, from: Some(start), to: Some(end), ..Default::default() })
            .await?;
        let entries = self.ctx.stores.commissions
            .list_entries(&EntryQuery { vendor_id, from: Some(start), to: Some(end), ..Default::default() })
            .await?;

        let report = build_report(from, to, vendor_id, &self.ctx.config.currency, &orders, &entries);
        self.ctx.caches.reports.insert(key, report.clone(), REPORT_TTL);
        Ok(report)
    }
}

fn build_report(from: NaiveDate, to: NaiveDate, scope: Option<Uuid>, currency: &str, orders: &[Order], entries: &[CommissionEntry]) -> SalesReport {
    let mut report = SalesReport {
        from, to, vendor_id: scope, currency: currency.to_string(), orders: 0, gross: Decimal::ZERO,
        discounts: Decimal::ZERO, shipping: Decimal::ZERO, total: Decimal::ZERO, commission: Decimal::ZERO,
        by_vendor: vec![], by_status: BTreeMap::new(), top_products: vec![],
    };
    let mut vendors: BTreeMap<Uuid, VendorSales> = BTreeMap::new();
    let mut products: HashMap<Uuid, ProductSales> = HashMap::new();

    for order in orders {
        *report.by_status.entry(order.status().as_str().to_string()).or_default() += 1;
        if !order.status().is_sale() { continue; }
        report.orders += 1;

        let lines: Vec<_> = order.items().iter().filter(|l| scope.map_or(true, |v| l.vendor_id == v)).collect();
        let gross: Decimal = lines.iter().map(|l| l.total.amount()).sum();
        let discounts: Decimal = lines.iter().map(|l| l.discount.amount()).sum();
        let shipping = match scope {
            Some(vendor_id) => order.shipping_for_vendor(vendor_id).amount(),
            None => order.shipping().amount(),
        };
        report.gross += gross;
        report.discounts += discounts;
        report.shipping += shipping;
        report.total += gross - discounts + shipping;

        let mut seen = vec![];
        for line in &lines {
            let vendor = vendors.entry(line.vendor_id).or_insert_with(|| VendorSales {
                vendor_id: line.vendor_id, orders: 0, gross: Decimal::ZERO, commission: Decimal::ZERO, net: Decimal::ZERO,
            });
            if !seen.contains(&line.vendor_id) {
                vendor.orders += 1;
                seen.push(line.vendor_id);
            }
            vendor.gross += line.net().amount();

            let product = products.entry(line.product_id).or_insert_with(|| ProductSales {
                product_id: line.product_id, name: line.name.clone(), units: 0, revenue: Decimal::ZERO,
            });
            product.units += line.quantity;
            product.revenue += line.net().amount();
        }
    }

    for entry in entries.iter().filter(|e| e.status != EntryStatus::Void) {
        report.commission += entry.commission.amount();
        if let Some(vendor) = vendors.get_mut(&entry.vendor_id) {
            vendor.commission += entry.commission.amount();
        }
    }

    report.by_vendor = vendors.into_values().map(|mut v| {
        v.gross = round2(v.gross);
        v.commission = round2(v.commission);
        v.net = v.gross - v.commission;
        v
    }).collect();

    let mut top: Vec<ProductSales> = products.into_values().collect();
    top.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| b.revenue.cmp(&a.revenue)).then_with(|| a.name.cmp(&b.name)));
    top.truncate(TOP_PRODUCTS);
    report.top_products = top;
    report.commission = round2(report.commission);
    report
}
