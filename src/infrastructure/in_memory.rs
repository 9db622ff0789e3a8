use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{
    AccountOwner, BankAccount, Cart, CartOwner, Category, CommissionEntry, CommissionRule, EntryStatus, Order, OrderStatus,
    Product, Promotion, PromotionError, ReturnError, ReturnRequest, Role, Settlement, SettlementStatus, User,
};
use crate::domain::aggregates::promotion::normalize_code;
use crate::domain::aggregates::user::normalize_email;
use crate::domain::ports::{
    BankAccountRepository, CartRepository, CategoryRepository, CommissionRepository, EntryQuery, OrderQuery,
    OrderRepository, ProductQuery, ProductRepository, PromotionRepository, ReturnQuery, ReturnRepository,
    SettlementRepository, UserRepository,
};
use crate::error::{EcommerceError, Result};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    bank_accounts: HashMap<Uuid, BankAccount>,
    promotions: HashMap<Uuid, Promotion>,
    carts: HashMap<String, Cart>,
    orders: HashMap<Uuid, Order>,
    rules: HashMap<Uuid, CommissionRule>,
    entries: HashMap<Uuid, CommissionEntry>,
    settlements: HashMap<Uuid, Settlement>,
    returns: HashMap<Uuid, ReturnRequest>,
}

impl State {
    /// Applies stock changes only if every decrement fits.
    fn take_stock(&mut self, wanted: &[(Uuid, u32)]) -> Result<()> {
        for (product_id, qty) in wanted {
            let product = self.products.get(product_id).ok_or_else(|| EcommerceError::not_found("Product"))?;
            if product.stock.value() < *qty {
                return Err(EcommerceError::InsufficientStock { product: product.name.clone(), available: product.stock.value() });
            }
        }
        for (product_id, qty) in wanted {
            if let Some(product) = self.products.get_mut(product_id) {
                product.remove_inventory(*qty)?;
                product.take_events();
            }
        }
        Ok(())
    }

    /// Conflict unless the stored order still sits in `expected`.
    fn check_order(&self, id: Uuid, expected: OrderStatus) -> Result<()> {
        let stored = self.orders.get(&id).ok_or_else(|| EcommerceError::not_found("Order"))?;
        if stored.status() != expected { return Err(EcommerceError::stale("Order")); }
        Ok(())
    }

    fn coupon_available(&self, code: &str) -> Result<()> {
        let promotion = self.promotions.values().find(|p| p.code == code).ok_or(PromotionError::Inactive)?;
        if promotion.max_uses.is_some_and(|max| promotion.times_used >= max) {
            return Err(PromotionError::Exhausted.into());
        }
        Ok(())
    }

    fn restock(&mut self, items: &[(Uuid, u32)]) {
        for (product_id, qty) in items {
            if let Some(product) = self.products.get_mut(product_id) {
                product.add_inventory(*qty);
                product.take_events();
            }
        }
    }
}

/// A thread-safe in-memory store implementing every repository port.
///
/// One `RwLock` guards all tables, so multi-aggregate writes are atomic.
/// Used by tests and when no `DATABASE_URL` is configured.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(EcommerceError::Conflict(format!("Email {} is already registered", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(EcommerceError::Conflict(format!("Email {} is already registered", user.email)));
        }
        match state.users.get_mut(&user.id) {
            Some(existing) => { *existing = user.clone(); Ok(()) }
            None => Err(EcommerceError::not_found("User")),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        Ok(self.state.read().await.users.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().filter(|u| role.map_or(true, |r| u.role == r)).cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn save(&self, category: &Category) -> Result<()> {
        self.state.write().await.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut categories: Vec<Category> = state.categories.values().filter(|c| include_inactive || c.active).cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.categories.remove(&id).is_some())
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn save(&self, product: &Product) -> Result<()> {
        self.state.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let state = self.state.read().await;
        let search = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matches: Vec<&Product> = state.products.values()
            .filter(|p| query.include_inactive || p.is_active())
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| query.vendor_id.map_or(true, |v| p.vendor_id == v))
            .filter(|p| search.as_ref().map_or(true, |s| p.name.to_lowercase().contains(s) || p.description.to_lowercase().contains(s)))
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len() as u64;
        let page = matches.into_iter().skip(query.offset()).take(query.per_page as usize).cloned().collect();
        Ok((page, total))
    }

    async fn count_in_category(&self, category_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.products.values().filter(|p| p.category_id == Some(category_id)).count() as u64)
    }
}

#[async_trait]
impl BankAccountRepository for InMemoryStore {
    async fn save(&self, account: &BankAccount) -> Result<()> {
        self.state.write().await.bank_accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BankAccount>> {
        Ok(self.state.read().await.bank_accounts.get(&id).cloned())
    }

    async fn list(&self, owner: Option<AccountOwner>, active_only: bool) -> Result<Vec<BankAccount>> {
        let state = self.state.read().await;
        let mut accounts: Vec<BankAccount> = state.bank_accounts.values()
            .filter(|a| owner.map_or(true, |o| a.owner == o))
            .filter(|a| !active_only || a.active)
            .cloned().collect();
        accounts.sort_by(|a, b| a.bank_name.cmp(&b.bank_name).then(a.created_at.cmp(&b.created_at)));
        Ok(accounts)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.bank_accounts.remove(&id).is_some())
    }
}

#[async_trait]
impl PromotionRepository for InMemoryStore {
    async fn save(&self, promotion: &Promotion) -> Result<()> {
        let mut state = self.state.write().await;
        if state.promotions.values().any(|p| p.code == promotion.code && p.id != promotion.id) {
            return Err(EcommerceError::Conflict(format!("Coupon code {} already exists", promotion.code)));
        }
        let mut stored = promotion.clone();
        if let Some(existing) = state.promotions.get(&promotion.id) { stored.times_used = existing.times_used; }
        state.promotions.insert(promotion.id, stored);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Promotion>> {
        Ok(self.state.read().await.promotions.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        let code = normalize_code(code);
        Ok(self.state.read().await.promotions.values().find(|p| p.code == code).cloned())
    }

    async fn list(&self) -> Result<Vec<Promotion>> {
        let state = self.state.read().await;
        let mut promotions: Vec<Promotion> = state.promotions.values().cloned().collect();
        promotions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(promotions)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.promotions.remove(&id).is_some())
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn get(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&owner.key()).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        self.state.write().await.carts.insert(cart.owner().key(), cart.clone());
        Ok(())
    }

    async fn delete(&self, owner: &CartOwner) -> Result<()> {
        self.state.write().await.carts.remove(&owner.key());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn place(&self, order: &Order, cart_owner: &CartOwner) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(EcommerceError::Conflict(format!("Order number {} is taken", order.order_number())));
        }
        if let Some(code) = order.coupon_code() { state.coupon_available(code)?; }
        let wanted: Vec<(Uuid, u32)> = order.items().iter().map(|i| (i.product_id, i.quantity)).collect();
        state.take_stock(&wanted)?;
        if let Some(code) = order.coupon_code() {
            if let Some(promotion) = state.promotions.values_mut().find(|p| p.code == code) {
                promotion.times_used += 1;
            }
        }
        state.orders.insert(order.id(), order.clone());
        state.carts.remove(&cart_owner.key());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(order.id(), expected)?;
        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state.orders.values()
            .filter(|o| query.customer_id.map_or(true, |c| o.customer_id() == c))
            .filter(|o| query.vendor_id.map_or(true, |v| o.contains_vendor(v)))
            .filter(|o| query.status.map_or(true, |s| o.status() == s))
            .filter(|o| query.from.map_or(true, |from| o.created_at() >= from))
            .filter(|o| query.to.map_or(true, |to| o.created_at() <= to))
            .cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn record_payment(&self, order: &Order, expected: OrderStatus, entries: &[CommissionEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(order.id(), expected)?;
        state.orders.insert(order.id(), order.clone());
        for entry in entries { state.entries.insert(entry.id, entry.clone()); }
        Ok(())
    }

    async fn cancel(&self, order: &Order, expected: OrderStatus, restock: &[(Uuid, u32)], entries: &[CommissionEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(order.id(), expected)?;
        state.restock(restock);
        state.orders.insert(order.id(), order.clone());
        for entry in entries { state.entries.insert(entry.id, entry.clone()); }
        Ok(())
    }
}

#[async_trait]
impl CommissionRepository for InMemoryStore {
    async fn list_rules(&self) -> Result<Vec<CommissionRule>> {
        let state = self.state.read().await;
        let mut rules: Vec<CommissionRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(rules)
    }

    async fn save_rule(&self, rule: &CommissionRule) -> Result<()> {
        let mut state = self.state.write().await;
        state.rules.retain(|id, r| r.scope != rule.scope || *id == rule.id);
        state.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.rules.remove(&id).is_some())
    }

    async fn entries_for_order(&self, order_id: Uuid) -> Result<Vec<CommissionEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<CommissionEntry> = state.entries.values().filter(|e| e.order_id == order_id).cloned().collect();
        entries.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(entries)
    }

    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<CommissionEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<CommissionEntry> = state.entries.values()
            .filter(|e| query.vendor_id.map_or(true, |v| e.vendor_id == v))
            .filter(|e| query.status.map_or(true, |s| e.status == s))
            .filter(|e| query.from.map_or(true, |from| e.occurred_at >= from))
            .filter(|e| query.to.map_or(true, |to| e.occurred_at <= to))
            .cloned().collect();
        entries.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(entries)
    }
}

#[async_trait]
impl SettlementRepository for InMemoryStore {
    async fn create(&self, settlement: &Settlement) -> Result<()> {
        let mut state = self.state.write().await;
        let all_open = settlement.entry_ids.iter()
            .all(|id| state.entries.get(id).is_some_and(|e| e.status == EntryStatus::Open));
        if !all_open {
            return Err(EcommerceError::Conflict("Some commission entries were already settled".into()));
        }
        for id in &settlement.entry_ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.status = EntryStatus::Settled;
                entry.settlement_id = Some(settlement.id);
            }
        }
        state.settlements.insert(settlement.id, settlement.clone());
        Ok(())
    }

    async fn save(&self, settlement: &Settlement) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.settlements.contains_key(&settlement.id) { return Err(EcommerceError::not_found("Settlement")); }
        if settlement.status == SettlementStatus::Cancelled {
            for entry in state.entries.values_mut().filter(|e| e.settlement_id == Some(settlement.id)) {
                entry.status = EntryStatus::Open;
                entry.settlement_id = None;
            }
        }
        state.settlements.insert(settlement.id, settlement.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Settlement>> {
        Ok(self.state.read().await.settlements.get(&id).cloned())
    }

    async fn list(&self, vendor_id: Option<Uuid>, status: Option<SettlementStatus>) -> Result<Vec<Settlement>> {
        let state = self.state.read().await;
        let mut settlements: Vec<Settlement> = state.settlements.values()
            .filter(|s| vendor_id.map_or(true, |v| s.vendor_id == v))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned().collect();
        settlements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(settlements)
    }
}

#[async_trait]
impl ReturnRepository for InMemoryStore {
    async fn insert(&self, request: &ReturnRequest) -> Result<()> {
        self.state.write().await.returns.insert(request.id, request.clone());
        Ok(())
    }

    async fn save(&self, request: &ReturnRequest) -> Result<()> {
        let mut state = self.state.write().await;
        match state.returns.get_mut(&request.id) {
            Some(existing) if existing.is_open() => { *existing = request.clone(); Ok(()) }
            Some(_) => Err(ReturnError::AlreadyResolved.into()),
            None => Err(EcommerceError::not_found("Return request")),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        Ok(self.state.read().await.returns.get(&id).cloned())
    }

    async fn list(&self, query: &ReturnQuery) -> Result<Vec<ReturnRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<ReturnRequest> = state.returns.values()
            .filter(|r| query.customer_id.map_or(true, |c| r.customer_id == c))
            .filter(|r| query.vendor_id.map_or(true, |v| r.vendor_id == v))
            .filter(|r| query.order_id.map_or(true, |o| r.order_id == o))
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .cloned().collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    async fn pending_quantity(&self, line_id: Uuid) -> Result<u32> {
        let state = self.state.read().await;
        Ok(state.returns.values().filter(|r| r.line_id == line_id && r.is_open()).map(|r| r.quantity).sum())
    }

    async fn approve(&self, request: &ReturnRequest, restock: Option<(Uuid, u32)>, reversal: Option<&CommissionEntry>) -> Result<Order> {
        let mut state = self.state.write().await;
        match state.returns.get(&request.id) {
            Some(stored) if !stored.is_open() => return Err(ReturnError::AlreadyResolved.into()),
            Some(_) => {}
            None => return Err(EcommerceError::not_found("Return request")),
        }
        let mut order = state.orders.get(&request.order_id).cloned().ok_or_else(|| EcommerceError::not_found("Order"))?;
        order.register_return(request.line_id, request.quantity)?;
        if let Some(item) = restock { state.restock(&[item]); }
        state.returns.insert(request.id, request.clone());
        state.orders.insert(order.id(), order.clone());
        if let Some(entry) = reversal { state.entries.insert(entry.id, entry.clone()); }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, CartItem, DiscountKind, PaymentRouting};
    use chrono::Utc;
    use crate::domain::value_objects::{Money, Sku};
    use rust_decimal_macros::dec;

    async fn seeded_product(store: &InMemoryStore, stock: u32) -> Product {
        let mut product = Product::create(Uuid::now_v7(), Sku::new("LAMP-1").unwrap(), "Lamp", Money::new(dec!(25), "PEN"));
        product.add_inventory(stock);
        product.publish().unwrap();
        ProductRepository::save(store, &product).await.unwrap();
        product
    }

    fn order_for(product: &Product, qty: u32, owner: &CartOwner) -> Order {
        let mut cart = Cart::new(owner.clone(), "PEN");
        cart.add_item(CartItem {
            product_id: product.id, vendor_id: product.vendor_id, name: product.name.clone(), sku: product.sku.to_string(),
            quantity: qty, unit_price: product.price.clone(), shipping_cost: product.shipping_cost.clone(),
        }, qty).unwrap();
        Order::from_cart("V-1".into(), Uuid::now_v7(), "c@x.com", &cart, Address::default(), PaymentRouting::Platform).unwrap()
    }

    #[tokio::test]
    async fn test_place_decrements_stock_and_clears_cart() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 5).await;
        let owner = CartOwner::User(Uuid::now_v7());
        CartRepository::save(&store, &Cart::new(owner.clone(), "PEN")).await.unwrap();

        store.place(&order_for(&product, 3, &owner), &owner).await.unwrap();

        let stored = ProductRepository::get(&store, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock.value(), 2);
        assert!(CartRepository::get(&store, &owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_place_writes_nothing_on_shortfall() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 2).await;
        let owner = CartOwner::User(Uuid::now_v7());
        let order = order_for(&product, 3, &owner);

        let err = store.place(&order, &owner).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InsufficientStock { available: 2, .. }));
        assert!(OrderRepository::get(&store, order.id()).await.unwrap().is_none());
        assert_eq!(ProductRepository::get(&store, product.id).await.unwrap().unwrap().stock.value(), 2);
    }

    #[tokio::test]
    async fn test_place_rejects_duplicate_order_number() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 5).await;
        let owner = CartOwner::User(Uuid::now_v7());
        store.place(&order_for(&product, 1, &owner), &owner).await.unwrap();

        let err = store.place(&order_for(&product, 1, &owner), &owner).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert_eq!(ProductRepository::get(&store, product.id).await.unwrap().unwrap().stock.value(), 4);
    }

    #[tokio::test]
    async fn test_place_refuses_coupon_at_its_cap() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 5).await;
        let owner = CartOwner::User(Uuid::now_v7());
        let mut promotion = Promotion::new("ONCE", DiscountKind::FixedAmount, dec!(5));
        promotion.max_uses = Some(1);

        let mut cart = Cart::new(owner.clone(), "PEN");
        cart.add_item(CartItem {
            product_id: product.id, vendor_id: product.vendor_id, name: product.name.clone(), sku: product.sku.to_string(),
            quantity: 1, unit_price: product.price.clone(), shipping_cost: product.shipping_cost.clone(),
        }, 1).unwrap();
        cart.apply_coupon(promotion.clone(), Utc::now()).unwrap();
        promotion.times_used = 1;
        PromotionRepository::save(&store, &promotion).await.unwrap();
        let order = Order::from_cart("V-2".into(), Uuid::now_v7(), "c@x.com", &cart, Address::default(), PaymentRouting::Platform).unwrap();

        let err = store.place(&order, &owner).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Promotion(PromotionError::Exhausted)));
        assert_eq!(ProductRepository::get(&store, product.id).await.unwrap().unwrap().stock.value(), 5);
        assert!(OrderRepository::get(&store, order.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_promotion_update_keeps_usage_count() {
        let store = InMemoryStore::new();
        let mut promotion = Promotion::new("KEEP", DiscountKind::Percentage, dec!(10));
        promotion.times_used = 3;
        PromotionRepository::save(&store, &promotion).await.unwrap();

        promotion.times_used = 0;
        promotion.value = dec!(15);
        PromotionRepository::save(&store, &promotion).await.unwrap();

        let stored = PromotionRepository::get(&store, promotion.id).await.unwrap().unwrap();
        assert_eq!(stored.times_used, 3);
        assert_eq!(stored.value, dec!(15));
    }

    #[tokio::test]
    async fn test_stale_order_write_conflicts() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 5).await;
        let owner = CartOwner::User(Uuid::now_v7());
        let order = order_for(&product, 2, &owner);
        store.place(&order, &owner).await.unwrap();

        let mut cancelled = order.clone();
        let restock = cancelled.cancel().unwrap();
        store.cancel(&cancelled, OrderStatus::PendingPayment, &restock, &[]).await.unwrap();

        let mut paid = order.clone();
        paid.submit_payment(Uuid::now_v7()).unwrap();
        let err = OrderRepository::save(&store, &paid, OrderStatus::PendingPayment).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        let err = store.cancel(&cancelled, OrderStatus::PendingPayment, &restock, &[]).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));

        let stored = OrderRepository::get(&store, order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
        assert_eq!(ProductRepository::get(&store, product.id).await.unwrap().unwrap().stock.value(), 5);
    }

    #[tokio::test]
    async fn test_return_approval_applies_once() {
        let store = InMemoryStore::new();
        let product = seeded_product(&store, 5).await;
        let owner = CartOwner::User(Uuid::now_v7());
        let mut order = order_for(&product, 2, &owner);
        store.place(&order, &owner).await.unwrap();
        order.submit_payment(Uuid::now_v7()).unwrap();
        order.verify_payment().unwrap();
        order.ship(None).unwrap();
        order.deliver().unwrap();
        OrderRepository::save(&store, &order, OrderStatus::PendingPayment).await.unwrap();

        let line_id = order.items()[0].id;
        let mut request = ReturnRequest::open(&order, line_id, 1, "cracked shade", 0, 30, Utc::now()).unwrap();
        ReturnRepository::insert(&store, &request).await.unwrap();
        request.approve(Uuid::now_v7(), true, None).unwrap();

        let stored = store.approve(&request, Some((product.id, 1)), None).await.unwrap();
        assert_eq!(stored.items()[0].returned_quantity, 1);
        let err = store.approve(&request, Some((product.id, 1)), None).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Return(ReturnError::AlreadyResolved)));

        let stored = OrderRepository::get(&store, order.id()).await.unwrap().unwrap();
        assert_eq!(stored.items()[0].returned_quantity, 1);
        assert_eq!(ProductRepository::get(&store, product.id).await.unwrap().unwrap().stock.value(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = InMemoryStore::new();
        UserRepository::insert(&store, &User::new("a@x.com", "A", String::new(), Role::Customer)).await.unwrap();
        let err = UserRepository::insert(&store, &User::new("A@X.com", "B", String::new(), Role::Customer)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
    }
}
