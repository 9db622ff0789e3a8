//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;
use crate::domain::aggregates::promotion::{Promotion, PromotionError};
use crate::domain::value_objects::Money;

/// Who a cart belongs to: an anonymous browser session or a signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum CartOwner { Session(String), User(Uuid) }

impl CartOwner {
    /// Stable string key used by stores.
    pub fn key(&self) -> String {
        match self { Self::Session(s) => format!("session:{s}"), Self::User(id) => format!("user:{id}") }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.split_once(':')? {
            ("session", s) if !s.is_empty() => Some(Self::Session(s.to_string())),
            ("user", id) => Uuid::parse_str(id).ok().map(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.key()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: Uuid,
    owner: CartOwner,
    items: Vec<CartItem>,
    coupon: Option<Promotion>,
    subtotal: Money,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub shipping_cost: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Shipping charged once per vendor parcel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorShipping { pub vendor_id: Uuid, pub amount: Money }

impl Cart {
    pub fn new(owner: CartOwner, currency: &str) -> Self {
        Self {
            id: Uuid::now_v7(), owner, items: vec![], coupon: None, subtotal: Money::zero(currency),
            currency: currency.to_string(), created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    pub fn restore(id: Uuid, owner: CartOwner, currency: &str, items: Vec<CartItem>, coupon: Option<Promotion>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        let mut cart = Self { id, owner, items, coupon, subtotal: Money::zero(currency), currency: currency.to_string(), created_at, updated_at };
        cart.subtotal = cart.sum(|_| true);
        cart
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner(&self) -> &CartOwner { &self.owner }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn coupon(&self) -> Option<&Promotion> { self.coupon.as_ref() }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn unit_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items.iter().find(|i| i.product_id == product_id).map_or(0, |i| i.quantity)
    }

    /// Adds `item`, merging with an existing line for the same product.
    /// `available` is the product's current stock.
    pub fn add_item(&mut self, item: CartItem, available: u32) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if item.unit_price.currency() != self.currency { return Err(CartError::CurrencyMismatch); }
        let wanted = self.quantity_of(item.product_id) + item.quantity;
        if wanted > available {
            return Err(CartError::InsufficientStock { product_id: item.product_id, available });
        }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = wanted;
            existing.unit_price = item.unit_price;
            existing.shipping_cost = item.shipping_cost;
            existing.name = item.name;
        } else {
            self.items.push(item);
        }
        self.recalculate();
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: Uuid, quantity: u32, available: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity > available { return Err(CartError::InsufficientStock { product_id, available }); }
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.coupon = None; self.recalculate(); }

    /// Folds an anonymous cart into this one. Quantities are summed and clamped to
    /// `available(product_id)`; returns the products whose quantity was reduced.
    /// This cart's coupon wins; otherwise the other cart's coupon carries over.
    pub fn merge(&mut self, other: Cart, available: impl Fn(Uuid) -> u32) -> Vec<Uuid> {
        let mut clamped = vec![];
        for item in other.items {
            let stock = available(item.product_id);
            let wanted = self.quantity_of(item.product_id) + item.quantity;
            let granted = wanted.min(stock);
            if granted < wanted { clamped.push(item.product_id); }
            if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
                existing.quantity = granted;
            } else if granted > 0 {
                self.items.push(CartItem { quantity: granted, ..item });
            }
        }
        self.items.retain(|i| i.quantity > 0);
        if self.coupon.is_none() { self.coupon = other.coupon; }
        self.recalculate();
        clamped
    }

    /// Subtotal of the lines a coupon applies to.
    pub fn eligible_subtotal(&self, promotion: &Promotion) -> Money {
        self.sum(|i| promotion.applies_to_vendor(i.vendor_id))
    }

    pub fn apply_coupon(&mut self, promotion: Promotion, now: DateTime<Utc>) -> Result<Money, PromotionError> {
        let eligible = self.eligible_subtotal(&promotion);
        promotion.validate(now, eligible.amount())?;
        let discount = promotion.discount_on(&eligible);
        self.coupon = Some(promotion);
        self.touch();
        Ok(discount)
    }

    pub fn remove_coupon(&mut self) -> Option<Promotion> {
        let removed = self.coupon.take();
        self.touch();
        removed
    }

    /// Current coupon discount. Zero when the cart no longer meets the coupon's minimum.
    pub fn discount(&self) -> Money {
        match &self.coupon {
            Some(c) => {
                let eligible = self.eligible_subtotal(c);
                if c.min_subtotal.is_some_and(|min| eligible.amount() < min) { Money::zero(&self.currency) }
                else { c.discount_on(&eligible) }
            }
            None => Money::zero(&self.currency),
        }
    }

    /// One charge per vendor: the highest shipping cost among that vendor's lines.
    pub fn shipping_breakdown(&self) -> Vec<VendorShipping> {
        let mut order: Vec<Uuid> = vec![];
        let mut highest: HashMap<Uuid, Money> = HashMap::new();
        for item in &self.items {
            match highest.entry(item.vendor_id) {
                Entry::Occupied(mut current) => {
                    if item.shipping_cost.amount() > current.get().amount() { current.insert(item.shipping_cost.clone()); }
                }
                Entry::Vacant(slot) => { order.push(item.vendor_id); slot.insert(item.shipping_cost.clone()); }
            }
        }
        order.into_iter().filter_map(|vendor_id| highest.remove(&vendor_id).map(|amount| VendorShipping { vendor_id, amount })).collect()
    }

    pub fn shipping_total(&self) -> Money {
        self.shipping_breakdown().iter().fold(Money::zero(&self.currency), |acc, s| acc.add(&s.amount).unwrap_or(acc))
    }

    /// `subtotal - discount + shipping`
    pub fn total(&self) -> Money {
        let after_discount = self.subtotal.subtract(&self.discount()).unwrap_or_else(|_| self.subtotal.clone());
        after_discount.add(&self.shipping_total()).unwrap_or(after_discount)
    }

    pub fn vendors(&self) -> Vec<Uuid> { self.shipping_breakdown().into_iter().map(|s| s.vendor_id).collect() }

    pub fn summary(&self) -> CartSummary {
        CartSummary {
            cart_id: self.id,
            items: self.items.iter().map(|i| CartLineView { item: i.clone(), line_total: i.line_total() }).collect(),
            unit_count: self.unit_count(),
            subtotal: self.subtotal.clone(),
            coupon_code: self.coupon.as_ref().map(|c| c.code.clone()),
            discount: self.discount(),
            shipping: self.shipping_breakdown(),
            shipping_total: self.shipping_total(),
            total: self.total(),
        }
    }

    fn sum(&self, include: impl Fn(&CartItem) -> bool) -> Money {
        self.items.iter().filter(|i| include(i)).fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc))
    }

    fn recalculate(&mut self) {
        self.subtotal = self.sum(|_| true);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub item: CartItem,
    pub line_total: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartSummary {
    pub cart_id: Uuid,
    pub items: Vec<CartLineView>,
    pub unit_count: u32,
    pub subtotal: Money,
    pub coupon_code: Option<String>,
    pub discount: Money,
    pub shipping: Vec<VendorShipping>,
    pub shipping_total: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError { ItemNotFound, InvalidQuantity, CurrencyMismatch, ProductUnavailable, InsufficientStock { product_id: Uuid, available: u32 } }
impl std::error::Error for CartError {}
impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::ProductUnavailable => write!(f, "Product is not available"),
            Self::InsufficientStock { available, .. } => write!(f, "Only {available} units in stock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::promotion::DiscountKind;
    use rust_decimal_macros::dec;

    fn item(product_id: Uuid, vendor_id: Uuid, qty: u32, price: rust_decimal::Decimal, shipping: rust_decimal::Decimal) -> CartItem {
        CartItem {
            product_id, vendor_id, name: "Widget".into(), sku: "W1".into(), quantity: qty,
            unit_price: Money::new(price, "PEN"), shipping_cost: Money::new(shipping, "PEN"),
        }
    }

    #[test]
    fn test_cart_operations() {
        let (p1, v1) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::Session("abc".into()), "PEN");
        cart.add_item(item(p1, v1, 2, dec!(10), dec!(0)), 10).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.subtotal().amount(), dec!(20));
        cart.add_item(item(p1, v1, 1, dec!(10), dec!(0)), 10).unwrap();
        assert_eq!(cart.items()[0].quantity, 3); // Merged
    }

    #[test]
    fn test_add_item_respects_stock() {
        let (p1, v1) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::Session("abc".into()), "PEN");
        cart.add_item(item(p1, v1, 2, dec!(10), dec!(0)), 3).unwrap();
        let err = cart.add_item(item(p1, v1, 2, dec!(10), dec!(0)), 3).unwrap_err();
        assert_eq!(err, CartError::InsufficientStock { product_id: p1, available: 3 });
        assert_eq!(cart.quantity_of(p1), 2);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let (p1, v1) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        cart.add_item(item(p1, v1, 2, dec!(10), dec!(0)), 5).unwrap();
        cart.update_quantity(p1, 0, 5).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.update_quantity(p1, 1, 5), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_shipping_once_per_vendor() {
        let (v1, v2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        cart.add_item(item(Uuid::now_v7(), v1, 1, dec!(10), dec!(8)), 5).unwrap();
        cart.add_item(item(Uuid::now_v7(), v1, 1, dec!(10), dec!(12)), 5).unwrap();
        cart.add_item(item(Uuid::now_v7(), v2, 1, dec!(10), dec!(5)), 5).unwrap();
        let breakdown = cart.shipping_breakdown();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].amount.amount(), dec!(12));
        assert_eq!(cart.shipping_total().amount(), dec!(17));
    }

    #[test]
    fn test_total_is_subtotal_minus_discount_plus_shipping() {
        let v1 = Uuid::now_v7();
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        cart.add_item(item(Uuid::now_v7(), v1, 2, dec!(50), dec!(10)), 5).unwrap();
        let coupon = Promotion::new("DIEZ", DiscountKind::Percentage, dec!(10));
        let discount = cart.apply_coupon(coupon, Utc::now()).unwrap();
        assert_eq!(discount.amount(), dec!(10));
        assert_eq!(cart.total().amount(), dec!(100) - dec!(10) + dec!(10));
    }

    #[test]
    fn test_vendor_scoped_coupon() {
        let (v1, v2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        cart.add_item(item(Uuid::now_v7(), v1, 1, dec!(100), dec!(0)), 5).unwrap();
        cart.add_item(item(Uuid::now_v7(), v2, 1, dec!(40), dec!(0)), 5).unwrap();
        let mut coupon = Promotion::new("V2", DiscountKind::Percentage, dec!(50));
        coupon.vendor_id = Some(v2);
        cart.apply_coupon(coupon, Utc::now()).unwrap();
        assert_eq!(cart.discount().amount(), dec!(20));
    }

    #[test]
    fn test_discount_drops_below_minimum() {
        let (p1, v1) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        cart.add_item(item(p1, v1, 3, dec!(50), dec!(0)), 5).unwrap();
        let mut coupon = Promotion::new("MIN100", DiscountKind::FixedAmount, dec!(15));
        coupon.min_subtotal = Some(dec!(100));
        cart.apply_coupon(coupon, Utc::now()).unwrap();
        cart.update_quantity(p1, 1, 5).unwrap();
        assert!(cart.discount().is_zero());
    }

    #[test]
    fn test_merge_clamps_to_stock() {
        let (p1, p2, v1) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let mut user_cart = Cart::new(CartOwner::User(Uuid::now_v7()), "PEN");
        user_cart.add_item(item(p1, v1, 2, dec!(10), dec!(0)), 10).unwrap();
        let mut anon = Cart::new(CartOwner::Session("s".into()), "PEN");
        anon.add_item(item(p1, v1, 3, dec!(10), dec!(0)), 10).unwrap();
        anon.add_item(item(p2, v1, 1, dec!(5), dec!(0)), 10).unwrap();
        anon.apply_coupon(Promotion::new("ANON", DiscountKind::FixedAmount, dec!(1)), Utc::now()).unwrap();

        let clamped = user_cart.merge(anon, |id| if id == p1 { 4 } else { 10 });
        assert_eq!(clamped, vec![p1]);
        assert_eq!(user_cart.quantity_of(p1), 4);
        assert_eq!(user_cart.quantity_of(p2), 1);
        assert_eq!(user_cart.coupon().map(|c| c.code.as_str()), Some("ANON"));
    }
}
