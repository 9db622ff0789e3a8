//! Order (Venta) Aggregate

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::{Cart, VendorShipping};
use crate::domain::value_objects::Money;
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) order_number: String,
    pub(crate) customer_id: Uuid,
    pub(crate) email: String,
    pub(crate) status: OrderStatus,
    pub(crate) payment: PaymentStatus,
    pub(crate) routing: PaymentRouting,
    pub(crate) items: Vec<LineItem>,
    pub(crate) shipping_lines: Vec<VendorShipping>,
    pub(crate) subtotal: Money,
    pub(crate) discount: Money,
    pub(crate) shipping: Money,
    pub(crate) total: Money,
    pub(crate) coupon_code: Option<String>,
    pub(crate) shipping_address: Address,
    pub(crate) notes: Option<String>,
    pub(crate) tracking_number: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) paid_at: Option<DateTime<Utc>>,
    pub(crate) delivered_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
    /// Share of the order coupon allocated to this line.
    pub discount: Money,
    pub returned_quantity: u32,
}

impl LineItem {
    /// Amount actually paid for the line.
    pub fn net(&self) -> Money { self.total.subtract(&self.discount).unwrap_or_else(|_| self.total.clone()) }
    pub fn returnable(&self) -> u32 { self.quantity.saturating_sub(self.returned_quantity) }
    /// Refund owed for `qty` units of this line.
    pub fn refund_for(&self, qty: u32) -> Money { self.net().share(Decimal::from(qty), Decimal::from(self.quantity)) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub recipient: String,
    pub phone: Option<String>,
    pub street: String,
    pub district: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub reference: Option<String>,
    pub country: String,
}

/// Where the customer deposits the money.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum PaymentRouting {
    Platform,
    DirectToVendor { vendor_id: Uuid },
}

impl PaymentRouting {
    pub fn vendor(&self) -> Option<Uuid> {
        match self { Self::Platform => None, Self::DirectToVendor { vendor_id } => Some(*vendor_id) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] PendingPayment, PaymentReview, Paid, Shipped, Delivered, Cancelled, Returned }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PaymentReview => "payment_review",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }

    /// Statuses that count as a sale on reports.
    pub fn is_sale(&self) -> bool { matches!(self, Self::Paid | Self::Shipped | Self::Delivered | Self::Returned) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "payment_review" => Ok(Self::PaymentReview),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "returned" => Ok(Self::Returned),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Submitted, Verified, Rejected }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Submitted => "submitted", Self::Verified => "verified", Self::Rejected => "rejected" }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// `V-YYYYMMDD-NNNNNN`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    format!("V-{}-{:06}", now.format("%Y%m%d"), rand::thread_rng().gen_range(0..1_000_000u32))
}

/// Splits `discount` over `totals` pro-rata. Every share but the last is rounded down to
/// the cent; the remainder goes to the last line and spills backwards when a line is too
/// small to hold it. Shares never exceed their line and always sum to `discount` as long
/// as `discount` fits in the lines.
fn allocate_discount(discount: Decimal, totals: &[Decimal]) -> Vec<Decimal> {
    let base: Decimal = totals.iter().sum();
    if totals.is_empty() || base <= Decimal::ZERO { return vec![Decimal::ZERO; totals.len()]; }
    let last = totals.len() - 1;
    let mut shares: Vec<Decimal> = totals.iter().enumerate().map(|(n, total)| {
        if n == last { Decimal::ZERO }
        else { (discount * total / base).round_dp_with_strategy(2, RoundingStrategy::ToZero).min(*total) }
    }).collect();
    let mut left = discount - shares.iter().sum::<Decimal>();
    for n in (0..totals.len()).rev() {
        if left <= Decimal::ZERO { break; }
        let extra = left.min(totals[n] - shares[n]);
        shares[n] += extra;
        left -= extra;
    }
    shares
}

impl Order {
    /// Builds an order from a checked-out cart. The cart's coupon discount is spread over
    /// the eligible lines pro-rata; the rounding remainder lands on the last eligible line.
    pub fn from_cart(order_number: String, customer_id: Uuid, email: impl Into<String>, cart: &Cart, shipping_address: Address, routing: PaymentRouting) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        let currency = cart.currency();
        let discount = cart.discount();
        let coupon = cart.coupon();

        let mut items: Vec<LineItem> = cart.items().iter().map(|i| LineItem {
            id: Uuid::now_v7(), product_id: i.product_id, vendor_id: i.vendor_id, name: i.name.clone(), sku: i.sku.clone(),
            quantity: i.quantity, unit_price: i.unit_price.clone(), total: i.line_total(), discount: Money::zero(currency),
            returned_quantity: 0,
        }).collect();

        if !discount.is_zero() {
            let eligible: Vec<usize> = items.iter().enumerate()
                .filter(|(_, l)| coupon.map_or(true, |c| c.applies_to_vendor(l.vendor_id)))
                .map(|(idx, _)| idx).collect();
            let totals: Vec<Decimal> = eligible.iter().map(|&idx| items[idx].total.amount()).collect();
            for (&idx, share) in eligible.iter().zip(allocate_discount(discount.amount(), &totals)) {
                items[idx].discount = Money::new(share, currency);
            }
        }

        let now = Utc::now();
        let id = Uuid::now_v7();
        let mut order = Self {
            id, order_number, customer_id, email: email.into(), status: OrderStatus::PendingPayment, payment: PaymentStatus::Pending,
            routing, items, shipping_lines: cart.shipping_breakdown(), subtotal: cart.subtotal().clone(), discount,
            shipping: cart.shipping_total(), total: cart.total(), coupon_code: coupon.map(|c| c.code.clone()),
            shipping_address, notes: None, tracking_number: None, created_at: now, updated_at: now, paid_at: None,
            delivered_at: None, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, customer_id, total: order.total.amount() }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn email(&self) -> &str { &self.email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment }
    pub fn routing(&self) -> PaymentRouting { self.routing }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn shipping_lines(&self) -> &[VendorShipping] { &self.shipping_lines }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn total(&self) -> &Money { &self.total }
    pub fn currency(&self) -> &str { self.total.currency() }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }

    pub fn set_notes(&mut self, notes: Option<String>) { self.notes = notes; self.touch(); }

    pub fn vendor_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = vec![];
        for item in &self.items { if !ids.contains(&item.vendor_id) { ids.push(item.vendor_id); } }
        ids
    }

    pub fn contains_vendor(&self, vendor_id: Uuid) -> bool { self.items.iter().any(|i| i.vendor_id == vendor_id) }

    pub fn lines_for_vendor(&self, vendor_id: Uuid) -> impl Iterator<Item = &LineItem> {
        self.items.iter().filter(move |i| i.vendor_id == vendor_id)
    }

    pub fn shipping_for_vendor(&self, vendor_id: Uuid) -> Money {
        self.shipping_lines.iter().find(|s| s.vendor_id == vendor_id).map(|s| s.amount.clone())
            .unwrap_or_else(|| Money::zero(self.currency()))
    }

    pub fn line(&self, line_id: Uuid) -> Option<&LineItem> { self.items.iter().find(|l| l.id == line_id) }

    pub fn submit_payment(&mut self, proof_id: Uuid) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::PendingPayment], "submit payment")?;
        self.status = OrderStatus::PaymentReview;
        self.payment = PaymentStatus::Submitted;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentSubmitted { order_id: self.id, proof_id }));
        Ok(())
    }

    pub fn verify_payment(&mut self) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::PaymentReview], "verify payment")?;
        self.status = OrderStatus::Paid;
        self.payment = PaymentStatus::Verified;
        self.paid_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn reject_payment(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::PaymentReview], "reject payment")?;
        self.status = OrderStatus::PendingPayment;
        self.payment = PaymentStatus::Rejected;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentRejected { order_id: self.id, reason: reason.into() }));
        Ok(())
    }

    pub fn ship(&mut self, tracking: Option<String>) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::Paid], "ship")?;
        self.status = OrderStatus::Shipped;
        self.tracking_number = tracking.clone();
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, tracking }));
        Ok(())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::Shipped], "deliver")?;
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id }));
        Ok(())
    }

    /// Cancels the order and returns the `(product_id, quantity)` pairs to put back in stock.
    pub fn cancel(&mut self) -> Result<Vec<(Uuid, u32)>, OrderError> {
        self.expect(&[OrderStatus::PendingPayment, OrderStatus::PaymentReview, OrderStatus::Paid], "cancel")?;
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(self.items.iter().filter(|i| i.returnable() > 0).map(|i| (i.product_id, i.returnable())).collect())
    }

    /// Records `qty` returned units on a line; the order becomes `Returned` once nothing is left.
    pub fn register_return(&mut self, line_id: Uuid, qty: u32) -> Result<(), OrderError> {
        self.expect(&[OrderStatus::Delivered], "register a return")?;
        let line = self.items.iter_mut().find(|l| l.id == line_id).ok_or(OrderError::LineNotFound)?;
        if qty == 0 || qty > line.returnable() {
            return Err(OrderError::ReturnQuantityExceeded { returnable: line.returnable() });
        }
        line.returned_quantity += qty;
        if self.items.iter().all(|l| l.returnable() == 0) { self.status = OrderStatus::Returned; }
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }

    fn expect(&self, allowed: &[OrderStatus], action: &'static str) -> Result<(), OrderError> {
        if allowed.contains(&self.status) { Ok(()) }
        else { Err(OrderError::InvalidTransition { from: self.status, action }) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, LineNotFound, InvalidTransition { from: OrderStatus, action: &'static str }, ReturnQuantityExceeded { returnable: u32 } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::LineNotFound => write!(f, "Order line not found"),
            Self::InvalidTransition { from, action } => write!(f, "Cannot {action} an order in status {}", from.as_str()),
            Self::ReturnQuantityExceeded { returnable } => write!(f, "Only {returnable} units can be returned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::{CartItem, CartOwner};
    use crate::domain::aggregates::promotion::{DiscountKind, Promotion};
    use rust_decimal_macros::dec;

    fn cart_with(lines: &[(Uuid, Decimal, u32)]) -> Cart {
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        for (vendor, price, qty) in lines {
            cart.add_item(CartItem {
                product_id: Uuid::now_v7(), vendor_id: *vendor, name: "Widget".into(), sku: "W1".into(), quantity: *qty,
                unit_price: Money::new(*price, "PEN"), shipping_cost: Money::new(dec!(5), "PEN"),
            }, 100).unwrap();
        }
        cart
    }

    fn order_from(cart: &Cart) -> Order {
        Order::from_cart("V-20250101-000001".into(), Uuid::now_v7(), "test@example.com", cart, Address::default(), PaymentRouting::Platform).unwrap()
    }

    #[test]
    fn test_order_workflow() {
        let cart = cart_with(&[(Uuid::now_v7(), dec!(10), 2)]);
        let mut order = order_from(&cart);
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        order.submit_payment(Uuid::now_v7()).unwrap();
        order.verify_payment().unwrap();
        assert!(order.paid_at().is_some());
        order.ship(Some("TRK1".into())).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        order.deliver().unwrap();
        assert_eq!(order.take_events().len(), 5);
    }

    #[test]
    fn test_rejected_payment_can_be_resubmitted() {
        let mut order = order_from(&cart_with(&[(Uuid::now_v7(), dec!(10), 1)]));
        order.submit_payment(Uuid::now_v7()).unwrap();
        order.reject_payment("blurry").unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Rejected);
        assert!(order.submit_payment(Uuid::now_v7()).is_ok());
    }

    #[test]
    fn test_cannot_ship_unpaid() {
        let mut order = order_from(&cart_with(&[(Uuid::now_v7(), dec!(10), 1)]));
        assert_eq!(order.ship(None), Err(OrderError::InvalidTransition { from: OrderStatus::PendingPayment, action: "ship" }));
    }

    #[test]
    fn test_discount_allocation_sums_to_order_discount() {
        let (v1, v2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = cart_with(&[(v1, dec!(33.33), 1), (v2, dec!(33.33), 1), (v1, dec!(33.34), 1)]);
        cart.apply_coupon(Promotion::new("TEN", DiscountKind::FixedAmount, dec!(10)), Utc::now()).unwrap();
        let order = order_from(&cart);
        let allocated: Decimal = order.items().iter().map(|l| l.discount.amount()).sum();
        assert_eq!(allocated, dec!(10));
        assert_eq!(order.total().amount(), order.subtotal().amount() - dec!(10) + order.shipping().amount());
    }

    #[test]
    fn test_discount_never_exceeds_a_tiny_last_line() {
        let vendor = Uuid::now_v7();
        let mut cart = cart_with(&[(vendor, dec!(1), 1), (vendor, dec!(1), 1), (vendor, dec!(1), 1), (vendor, dec!(1), 1), (vendor, dec!(0.01), 1)]);
        cart.apply_coupon(Promotion::new("CENTAVOS", DiscountKind::FixedAmount, dec!(0.07)), Utc::now()).unwrap();
        let order = order_from(&cart);

        let shares: Vec<Decimal> = order.items().iter().map(|l| l.discount.amount()).collect();
        assert_eq!(shares.iter().sum::<Decimal>(), dec!(0.07));
        for line in order.items() {
            assert!(line.discount.amount() >= Decimal::ZERO);
            assert!(line.net().amount() <= line.total.amount());
        }
        assert_eq!(shares, vec![dec!(0.01), dec!(0.01), dec!(0.01), dec!(0.03), dec!(0.01)]);
    }

    #[test]
    fn test_allocate_discount_rounds_down_before_the_last_line() {
        assert_eq!(allocate_discount(dec!(1), &[dec!(1), dec!(1), dec!(1)]), vec![dec!(0.33), dec!(0.33), dec!(0.34)]);
        assert_eq!(allocate_discount(dec!(0.05), &[dec!(0.02), dec!(0.02), dec!(0.01)]), vec![dec!(0.02), dec!(0.02), dec!(0.01)]);
        assert_eq!(allocate_discount(dec!(5), &[]), Vec::<Decimal>::new());
    }

    #[test]
    fn test_cancel_returns_restock() {
        let mut order = order_from(&cart_with(&[(Uuid::now_v7(), dec!(10), 3)]));
        let restock = order.cancel().unwrap();
        assert_eq!(restock.len(), 1);
        assert_eq!(restock[0].1, 3);
        assert!(order.cancel().is_err());
    }

    #[test]
    fn test_full_return_marks_order_returned() {
        let mut order = order_from(&cart_with(&[(Uuid::now_v7(), dec!(10), 2)]));
        order.submit_payment(Uuid::now_v7()).unwrap();
        order.verify_payment().unwrap();
        order.ship(None).unwrap();
        order.deliver().unwrap();
        let line = order.items()[0].id;
        assert_eq!(order.register_return(line, 3), Err(OrderError::ReturnQuantityExceeded { returnable: 2 }));
        order.register_return(line, 1).unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        order.register_return(line, 1).unwrap();
        assert_eq!(order.status(), OrderStatus::Returned);
    }

    #[test]
    fn test_refund_for_partial_line() {
        let line = LineItem {
            id: Uuid::now_v7(), product_id: Uuid::now_v7(), vendor_id: Uuid::now_v7(), name: "A".into(), sku: "A".into(),
            quantity: 3, unit_price: Money::new(dec!(10), "PEN"), total: Money::new(dec!(30), "PEN"),
            discount: Money::new(dec!(3), "PEN"), returned_quantity: 0,
        };
        assert_eq!(line.refund_for(1).amount(), dec!(9));
    }
}
