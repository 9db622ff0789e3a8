use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::{
    AccountOwner, Address, BankAccount, Cart, CartItem, CartOwner, Category, CommissionEntry, CommissionRule,
    CommissionScope, EntryKind, EntryStatus, LineItem, Order, OrderStatus, PaymentRouting, Product, Promotion,
    PromotionError, ReturnError, ReturnRequest, Role, Settlement, SettlementStatus, User, VendorShipping,
};
use crate::domain::aggregates::commission::EntryLine;
use crate::domain::aggregates::promotion::normalize_code;
use crate::domain::aggregates::user::normalize_email;
use crate::domain::ports::{
    BankAccountRepository, CartRepository, CategoryRepository, CommissionRepository, EntryQuery, OrderQuery,
    OrderRepository, ProductQuery, ProductRepository, PromotionRepository, ReturnQuery, ReturnRepository,
    SettlementRepository, UserRepository,
};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{EcommerceError, Result};

/// Postgres-backed store implementing every repository port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(EcommerceError::storage)
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(EcommerceError::Storage)
}

fn to_u32(value: i32) -> u32 { u32::try_from(value).unwrap_or(0) }

fn to_i32(value: u32) -> i32 { i32::try_from(value).unwrap_or(i32::MAX) }

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, email: String, full_name: String, password_hash: String, role: String, store_name: Option<String>,
    phone: Option<String>, active: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> Result<User> {
        Ok(User {
            id: self.id, email: self.email, full_name: self.full_name, password_hash: self.password_hash,
            role: parse(&self.role)?, store_name: self.store_name, phone: self.phone, active: self.active,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid, name: String, slug: String, description: Option<String>, parent_id: Option<Uuid>, active: bool,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, slug: r.slug, description: r.description, parent_id: r.parent_id, active: r.active, created_at: r.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, vendor_id: Uuid, category_id: Option<Uuid>, sku: String, name: String, description: String,
    price: Decimal, compare_at_price: Option<Decimal>, shipping_cost: Decimal, currency: String, stock: i32,
    status: String, images: Vec<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_domain(self) -> Result<Product> {
        let currency = self.currency.as_str();
        Ok(Product {
            id: self.id, vendor_id: self.vendor_id, category_id: self.category_id, sku: Sku::new(self.sku)?,
            name: self.name, description: self.description, price: Money::new(self.price, currency),
            compare_at_price: self.compare_at_price.map(|p| Money::new(p, currency)),
            shipping_cost: Money::new(self.shipping_cost, currency), stock: Quantity::new(to_u32(self.stock)),
            status: parse(&self.status)?, images: self.images, created_at: self.created_at, updated_at: self.updated_at,
            events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct BankAccountRow {
    id: Uuid, vendor_id: Option<Uuid>, bank_name: String, holder_name: String, account_number: String,
    cci: Option<String>, currency: String, active: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<BankAccountRow> for BankAccount {
    fn from(r: BankAccountRow) -> Self {
        BankAccount {
            id: r.id, owner: AccountOwner::from_vendor(r.vendor_id), bank_name: r.bank_name, holder_name: r.holder_name,
            account_number: r.account_number, cci: r.cci, currency: r.currency, active: r.active,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: Uuid, code: String, description: Option<String>, kind: String, value: Decimal, min_subtotal: Option<Decimal>,
    vendor_id: Option<Uuid>, starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>, max_uses: Option<i32>,
    times_used: i32, active: bool, created_at: DateTime<Utc>,
}

impl PromotionRow {
    fn into_domain(self) -> Result<Promotion> {
        Ok(Promotion {
            id: self.id, code: self.code, description: self.description, kind: parse(&self.kind)?, value: self.value,
            min_subtotal: self.min_subtotal, vendor_id: self.vendor_id, starts_at: self.starts_at, ends_at: self.ends_at,
            max_uses: self.max_uses.map(to_u32), times_used: to_u32(self.times_used), active: self.active,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    owner_key: String, id: Uuid, currency: String, coupon_code: Option<String>, created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid, vendor_id: Uuid, name: String, sku: String, quantity: i32, unit_price: Decimal,
    shipping_cost: Decimal,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, customer_id: Uuid, email: String, status: String, payment_status: String,
    routing_vendor_id: Option<Uuid>, subtotal: Decimal, discount: Decimal, shipping: Decimal, total: Decimal,
    currency: String, coupon_code: Option<String>, shipping_address: Json<Address>, notes: Option<String>,
    tracking_number: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>, delivered_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, vendor_id: Uuid, name: String, sku: String, quantity: i32,
    unit_price: Decimal, total: Decimal, discount: Decimal, returned_quantity: i32,
}

#[derive(sqlx::FromRow)]
struct OrderShippingRow { order_id: Uuid, vendor_id: Uuid, amount: Decimal }

#[derive(sqlx::FromRow)]
struct RuleRow { id: Uuid, scope: Json<CommissionScope>, rate: Decimal, active: bool, updated_at: DateTime<Utc> }

impl From<RuleRow> for CommissionRule {
    fn from(r: RuleRow) -> Self {
        CommissionRule { id: r.id, scope: r.scope.0, rate: r.rate, active: r.active, updated_at: r.updated_at }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid, order_id: Uuid, order_number: String, vendor_id: Uuid, routing_vendor_id: Option<Uuid>, kind: String,
    lines: Json<Vec<EntryLine>>, gross: Decimal, shipping: Decimal, commission: Decimal, currency: String,
    status: String, settlement_id: Option<Uuid>, occurred_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_domain(self) -> Result<CommissionEntry> {
        let currency = self.currency.as_str();
        let kind = match self.kind.as_str() {
            "sale" => EntryKind::Sale,
            "reversal" => EntryKind::Reversal,
            other => return Err(EcommerceError::Storage(format!("unknown entry kind '{other}'"))),
        };
        Ok(CommissionEntry {
            id: self.id, order_id: self.order_id, order_number: self.order_number, vendor_id: self.vendor_id,
            routing: routing_from(self.routing_vendor_id), kind, lines: self.lines.0,
            gross: Money::new(self.gross, currency), shipping: Money::new(self.shipping, currency),
            commission: Money::new(self.commission, currency), status: parse(&self.status)?,
            settlement_id: self.settlement_id, occurred_at: self.occurred_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettlementRow {
    id: Uuid, vendor_id: Uuid, period_from: NaiveDate, period_to: NaiveDate, entry_ids: Vec<Uuid>, gross: Decimal,
    shipping: Decimal, commission: Decimal, platform_collected: Decimal, vendor_collected: Decimal, balance: Decimal,
    currency: String, status: String, payment_reference: Option<String>, notes: Option<String>, created_by: Uuid,
    created_at: DateTime<Utc>, approved_at: Option<DateTime<Utc>>, paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl SettlementRow {
    fn into_domain(self) -> Result<Settlement> {
        let c = self.currency.as_str();
        Ok(Settlement::restore(
            self.id, self.vendor_id, self.period_from, self.period_to, self.entry_ids, Money::new(self.gross, c),
            Money::new(self.shipping, c), Money::new(self.commission, c), Money::new(self.platform_collected, c),
            Money::new(self.vendor_collected, c), Money::new(self.balance, c), parse(&self.status)?,
            self.payment_reference, self.notes, self.created_by, self.created_at, self.approved_at, self.paid_at,
            self.cancelled_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid, order_id: Uuid, line_id: Uuid, product_id: Uuid, vendor_id: Uuid, customer_id: Uuid, quantity: i32,
    reason: String, refund: Decimal, currency: String, status: String, restock: bool, requested_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>, resolved_by: Option<Uuid>, resolution_note: Option<String>,
}

impl ReturnRow {
    fn into_domain(self) -> Result<ReturnRequest> {
        Ok(ReturnRequest::restore(
            self.id, self.order_id, self.line_id, self.product_id, self.vendor_id, self.customer_id, to_u32(self.quantity),
            self.reason, Money::new(self.refund, &self.currency), parse(&self.status)?, self.restock, self.requested_at,
            self.resolved_at, self.resolved_by, self.resolution_note,
        ))
    }
}

fn routing_from(vendor_id: Option<Uuid>) -> PaymentRouting {
    vendor_id.map_or(PaymentRouting::Platform, |vendor_id| PaymentRouting::DirectToVendor { vendor_id })
}

fn entry_kind(kind: EntryKind) -> &'static str {
    match kind { EntryKind::Sale => "sale", EntryKind::Reversal => "reversal" }
}

// ---------------------------------------------------------------------------
// Shared statements
// ---------------------------------------------------------------------------

async fn upsert_entry(conn: &mut PgConnection, e: &CommissionEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO commission_entries (id, order_id, order_number, vendor_id, routing_vendor_id, kind, lines, gross, shipping, commission, currency, status, settlement_id, occurred_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, settlement_id = EXCLUDED.settlement_id")
        .bind(e.id).bind(e.order_id).bind(&e.order_number).bind(e.vendor_id).bind(e.routing.vendor())
        .bind(entry_kind(e.kind)).bind(Json(&e.lines)).bind(e.gross.amount()).bind(e.shipping.amount())
        .bind(e.commission.amount()).bind(e.gross.currency()).bind(e.status.as_str()).bind(e.settlement_id)
        .bind(e.occurred_at)
        .execute(&mut *conn).await?;
    Ok(())
}

/// Writes the order header only while the stored row is still in `expected`.
async fn update_order(conn: &mut PgConnection, order: &Order, expected: OrderStatus) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, notes = $4, tracking_number = $5, updated_at = $6, paid_at = $7, delivered_at = $8 \
         WHERE id = $1 AND status = $9")
        .bind(order.id).bind(order.status.as_str()).bind(order.payment.as_str()).bind(&order.notes)
        .bind(&order.tracking_number).bind(order.updated_at).bind(order.paid_at).bind(order.delivered_at)
        .bind(expected.as_str())
        .execute(&mut *conn).await?;
    if updated.rows_affected() == 0 { return Err(EcommerceError::stale("Order")); }
    Ok(())
}

async fn restock(conn: &mut PgConnection, items: &[(Uuid, u32)]) -> Result<()> {
    for (product_id, qty) in items {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id).bind(to_i32(*qty))
            .execute(&mut *conn).await?;
    }
    Ok(())
}

impl PgStore {
    async fn load_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY position")
            .bind(&ids).fetch_all(&self.pool).await?;
        let shipping = sqlx::query_as::<_, OrderShippingRow>("SELECT order_id, vendor_id, amount FROM order_shipping WHERE order_id = ANY($1) ORDER BY position")
            .bind(&ids).fetch_all(&self.pool).await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemRow>> = HashMap::new();
        for item in items { items_by_order.entry(item.order_id).or_default().push(item); }
        let mut shipping_by_order: HashMap<Uuid, Vec<OrderShippingRow>> = HashMap::new();
        for line in shipping { shipping_by_order.entry(line.order_id).or_default().push(line); }

        rows.into_iter().map(|r| {
            let c = r.currency.clone();
            let items = items_by_order.remove(&r.id).unwrap_or_default().into_iter().map(|i| LineItem {
                id: i.id, product_id: i.product_id, vendor_id: i.vendor_id, name: i.name, sku: i.sku,
                quantity: to_u32(i.quantity), unit_price: Money::new(i.unit_price, &c), total: Money::new(i.total, &c),
                discount: Money::new(i.discount, &c), returned_quantity: to_u32(i.returned_quantity),
            }).collect();
            let shipping_lines = shipping_by_order.remove(&r.id).unwrap_or_default().into_iter()
                .map(|s| VendorShipping { vendor_id: s.vendor_id, amount: Money::new(s.amount, &c) }).collect();
            Ok(Order {
                id: r.id, order_number: r.order_number, customer_id: r.customer_id, email: r.email,
                status: parse(&r.status)?, payment: parse(&r.payment_status)?, routing: routing_from(r.routing_vendor_id),
                items, shipping_lines, subtotal: Money::new(r.subtotal, &c), discount: Money::new(r.discount, &c),
                shipping: Money::new(r.shipping, &c), total: Money::new(r.total, &c), coupon_code: r.coupon_code,
                shipping_address: r.shipping_address.0, notes: r.notes, tracking_number: r.tracking_number,
                created_at: r.created_at, updated_at: r.updated_at, paid_at: r.paid_at, delivered_at: r.delivered_at,
                events: vec![],
            })
        }).collect()
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, u: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, email, full_name, password_hash, role, store_name, phone, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(u.id).bind(&u.email).bind(&u.full_name).bind(&u.password_hash).bind(u.role.as_str())
            .bind(&u.store_name).bind(&u.phone).bind(u.active).bind(u.created_at).bind(u.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, u: &User) -> Result<()> {
        let updated = sqlx::query("UPDATE users SET email = $2, full_name = $3, password_hash = $4, role = $5, store_name = $6, phone = $7, active = $8, updated_at = $9 WHERE id = $1")
            .bind(u.id).bind(&u.email).bind(&u.full_name).bind(&u.password_hash).bind(u.role.as_str())
            .bind(&u.store_name).bind(&u.phone).bind(u.active).bind(u.updated_at)
            .execute(&self.pool).await?;
        if updated.rows_affected() == 0 { return Err(EcommerceError::not_found("User")); }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(UserRow::into_domain).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1").bind(normalize_email(email))
            .fetch_optional(&self.pool).await?.map(UserRow::into_domain).transpose()
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE ($1::text IS NULL OR role = $1) ORDER BY email")
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool).await?.into_iter().map(UserRow::into_domain).collect()
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn save(&self, c: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, parent_id, active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (id) DO UPDATE SET name = $2, slug = $3, description = $4, parent_id = $5, active = $6")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.active).bind(c.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(Category::from))
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Category>> {
        Ok(sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE $1 OR active ORDER BY name")
            .bind(include_inactive).fetch_all(&self.pool).await?.into_iter().map(Category::from).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn save(&self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, vendor_id, category_id, sku, name, description, price, compare_at_price, shipping_cost, currency, stock, status, images, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (id) DO UPDATE SET category_id = $3, sku = $4, name = $5, description = $6, price = $7, compare_at_price = $8, \
             shipping_cost = $9, stock = $11, status = $12, images = $13, updated_at = $15")
            .bind(p.id).bind(p.vendor_id).bind(p.category_id).bind(p.sku.as_str()).bind(&p.name).bind(&p.description)
            .bind(p.price.amount()).bind(p.compare_at_price.as_ref().map(|m| m.amount())).bind(p.shipping_cost.amount())
            .bind(p.price.currency()).bind(to_i32(p.stock.value())).bind(p.status.as_str()).bind(&p.images)
            .bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(ProductRow::into_domain).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)").bind(ids)
            .fetch_all(&self.pool).await?.into_iter().map(ProductRow::into_domain).collect()
    }

    async fn list(&self, q: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        const FILTER: &str = "($1::uuid IS NULL OR category_id = $1) AND ($2::uuid IS NULL OR vendor_id = $2) \
                              AND ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3) AND ($4 OR status = 'active')";
        let pattern = q.search.as_ref().map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT * FROM products WHERE {FILTER} ORDER BY created_at DESC LIMIT $5 OFFSET $6"))
            .bind(q.category_id).bind(q.vendor_id).bind(&pattern).bind(q.include_inactive)
            .bind(i64::from(q.per_page)).bind(q.offset() as i64)
            .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products WHERE {FILTER}"))
            .bind(q.category_id).bind(q.vendor_id).bind(&pattern).bind(q.include_inactive)
            .fetch_one(&self.pool).await?;
        let products = rows.into_iter().map(ProductRow::into_domain).collect::<Result<Vec<_>>>()?;
        Ok((products, u64::try_from(total.0).unwrap_or(0)))
    }

    async fn count_in_category(&self, category_id: Uuid) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE category_id = $1").bind(category_id)
            .fetch_one(&self.pool).await?;
        Ok(u64::try_from(count.0).unwrap_or(0))
    }
}

#[async_trait]
impl BankAccountRepository for PgStore {
    async fn save(&self, a: &BankAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO bank_accounts (id, vendor_id, bank_name, holder_name, account_number, cci, currency, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET vendor_id = $2, bank_name = $3, holder_name = $4, account_number = $5, cci = $6, currency = $7, active = $8, updated_at = $10")
            .bind(a.id).bind(a.owner.vendor()).bind(&a.bank_name).bind(&a.holder_name).bind(&a.account_number)
            .bind(&a.cci).bind(&a.currency).bind(a.active).bind(a.created_at).bind(a.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BankAccount>> {
        Ok(sqlx::query_as::<_, BankAccountRow>("SELECT * FROM bank_accounts WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(BankAccount::from))
    }

    async fn list(&self, owner: Option<AccountOwner>, active_only: bool) -> Result<Vec<BankAccount>> {
        let (filter_owner, vendor_id) = match owner {
            None => (false, None),
            Some(o) => (true, o.vendor()),
        };
        Ok(sqlx::query_as::<_, BankAccountRow>(
            "SELECT * FROM bank_accounts WHERE (NOT $1 OR vendor_id IS NOT DISTINCT FROM $2) AND (NOT $3 OR active) ORDER BY bank_name, created_at")
            .bind(filter_owner).bind(vendor_id).bind(active_only)
            .fetch_all(&self.pool).await?.into_iter().map(BankAccount::from).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM bank_accounts WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl PromotionRepository for PgStore {
    async fn save(&self, p: &Promotion) -> Result<()> {
        sqlx::query(
            "INSERT INTO promotions (id, code, description, kind, value, min_subtotal, vendor_id, starts_at, ends_at, max_uses, times_used, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO UPDATE SET code = $2, description = $3, kind = $4, value = $5, min_subtotal = $6, vendor_id = $7, \
             starts_at = $8, ends_at = $9, max_uses = $10, active = $12")
            .bind(p.id).bind(&p.code).bind(&p.description).bind(p.kind.as_str()).bind(p.value).bind(p.min_subtotal)
            .bind(p.vendor_id).bind(p.starts_at).bind(p.ends_at).bind(p.max_uses.map(to_i32)).bind(to_i32(p.times_used))
            .bind(p.active).bind(p.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Promotion>> {
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(PromotionRow::into_domain).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions WHERE code = $1").bind(normalize_code(code))
            .fetch_optional(&self.pool).await?.map(PromotionRow::into_domain).transpose()
    }

    async fn list(&self) -> Result<Vec<Promotion>> {
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?.into_iter().map(PromotionRow::into_domain).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM promotions WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn get(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let key = owner.key();
        let Some(row) = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE owner_key = $1").bind(&key)
            .fetch_optional(&self.pool).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, CartItemRow>("SELECT product_id, vendor_id, name, sku, quantity, unit_price, shipping_cost FROM cart_items WHERE owner_key = $1 ORDER BY position")
            .bind(&key).fetch_all(&self.pool).await?;
        let coupon = match &row.coupon_code {
            Some(code) => PromotionRepository::find_by_code(self, code).await?,
            None => None,
        };
        let c = row.currency.as_str();
        let items = items.into_iter().map(|i| CartItem {
            product_id: i.product_id, vendor_id: i.vendor_id, name: i.name, sku: i.sku, quantity: to_u32(i.quantity),
            unit_price: Money::new(i.unit_price, c), shipping_cost: Money::new(i.shipping_cost, c),
        }).collect();
        let owner = CartOwner::from_key(&row.owner_key).unwrap_or_else(|| owner.clone());
        Ok(Some(Cart::restore(row.id, owner, c, items, coupon, row.created_at, row.updated_at)))
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        let key = cart.owner().key();
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO carts (owner_key, id, currency, coupon_code, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6) \
                     ON CONFLICT (owner_key) DO UPDATE SET id = $2, currency = $3, coupon_code = $4, updated_at = $6")
            .bind(&key).bind(cart.id()).bind(cart.currency()).bind(cart.coupon().map(|c| c.code.clone()))
            .bind(cart.created_at()).bind(cart.updated_at())
            .execute(&mut *tx).await?;
        sqlx::query("DELETE FROM cart_items WHERE owner_key = $1").bind(&key).execute(&mut *tx).await?;
        for (position, i) in cart.items().iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (owner_key, position, product_id, vendor_id, name, sku, quantity, unit_price, shipping_cost) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(&key).bind(position as i32).bind(i.product_id).bind(i.vendor_id).bind(&i.name).bind(&i.sku)
                .bind(to_i32(i.quantity)).bind(i.unit_price.amount()).bind(i.shipping_cost.amount())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, owner: &CartOwner) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE owner_key = $1").bind(owner.key()).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn place(&self, order: &Order, cart_owner: &CartOwner) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in &order.items {
            let updated = sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2")
                .bind(item.product_id).bind(to_i32(item.quantity))
                .execute(&mut *tx).await?;
            if updated.rows_affected() == 0 {
                let current: Option<(String, i32)> = sqlx::query_as("SELECT name, stock FROM products WHERE id = $1")
                    .bind(item.product_id).fetch_optional(&mut *tx).await?;
                return Err(match current {
                    Some((product, stock)) => EcommerceError::InsufficientStock { product, available: to_u32(stock) },
                    None => EcommerceError::not_found("Product"),
                });
            }
        }
        if let Some(code) = &order.coupon_code {
            let taken = sqlx::query("UPDATE promotions SET times_used = times_used + 1 WHERE code = $1 AND (max_uses IS NULL OR times_used < max_uses)")
                .bind(code).execute(&mut *tx).await?;
            if taken.rows_affected() == 0 {
                let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM promotions WHERE code = $1").bind(code).fetch_optional(&mut *tx).await?;
                return Err(if exists.is_some() { PromotionError::Exhausted } else { PromotionError::Inactive }.into());
            }
        }
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, email, status, payment_status, routing_vendor_id, subtotal, discount, shipping, total, currency, coupon_code, shipping_address, notes, tracking_number, created_at, updated_at, paid_at, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)")
            .bind(order.id).bind(&order.order_number).bind(order.customer_id).bind(&order.email)
            .bind(order.status.as_str()).bind(order.payment.as_str()).bind(order.routing.vendor())
            .bind(order.subtotal.amount()).bind(order.discount.amount()).bind(order.shipping.amount()).bind(order.total.amount())
            .bind(order.total.currency()).bind(&order.coupon_code).bind(Json(&order.shipping_address)).bind(&order.notes)
            .bind(&order.tracking_number).bind(order.created_at).bind(order.updated_at).bind(order.paid_at).bind(order.delivered_at)
            .execute(&mut *tx).await?;
        for (position, i) in order.items.iter().enumerate() {
            sqlx::query("INSERT INTO order_items (id, order_id, position, product_id, vendor_id, name, sku, quantity, unit_price, total, discount, returned_quantity) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
                .bind(i.id).bind(order.id).bind(position as i32).bind(i.product_id).bind(i.vendor_id).bind(&i.name).bind(&i.sku)
                .bind(to_i32(i.quantity)).bind(i.unit_price.amount()).bind(i.total.amount()).bind(i.discount.amount())
                .bind(to_i32(i.returned_quantity))
                .execute(&mut *tx).await?;
        }
        for (position, s) in order.shipping_lines.iter().enumerate() {
            sqlx::query("INSERT INTO order_shipping (order_id, vendor_id, position, amount) VALUES ($1, $2, $3, $4)")
                .bind(order.id).bind(s.vendor_id).bind(position as i32).bind(s.amount.amount())
                .execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM carts WHERE owner_key = $1").bind(cart_owner.key()).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_all(&self.pool).await?;
        Ok(self.load_orders(rows).await?.into_iter().next())
    }

    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_order(&mut tx, order, expected).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, q: &OrderQuery) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders o WHERE ($1::uuid IS NULL OR o.customer_id = $1) \
             AND ($2::uuid IS NULL OR EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.vendor_id = $2)) \
             AND ($3::text IS NULL OR o.status = $3) AND ($4::timestamptz IS NULL OR o.created_at >= $4) \
             AND ($5::timestamptz IS NULL OR o.created_at <= $5) ORDER BY o.created_at DESC")
            .bind(q.customer_id).bind(q.vendor_id).bind(q.status.map(|s| s.as_str())).bind(q.from).bind(q.to)
            .fetch_all(&self.pool).await?;
        self.load_orders(rows).await
    }

    async fn record_payment(&self, order: &Order, expected: OrderStatus, entries: &[CommissionEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_order(&mut tx, order, expected).await?;
        for entry in entries { upsert_entry(&mut tx, entry).await?; }
        tx.commit().await?;
        Ok(())
    }

    async fn cancel(&self, order: &Order, expected: OrderStatus, items: &[(Uuid, u32)], entries: &[CommissionEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_order(&mut tx, order, expected).await?;
        restock(&mut tx, items).await?;
        for entry in entries { upsert_entry(&mut tx, entry).await?; }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CommissionRepository for PgStore {
    async fn list_rules(&self) -> Result<Vec<CommissionRule>> {
        Ok(sqlx::query_as::<_, RuleRow>("SELECT id, scope, rate, active, updated_at FROM commission_rules ORDER BY updated_at")
            .fetch_all(&self.pool).await?.into_iter().map(CommissionRule::from).collect())
    }

    async fn save_rule(&self, r: &CommissionRule) -> Result<()> {
        sqlx::query("INSERT INTO commission_rules (id, scope_key, scope, rate, active, updated_at) VALUES ($1, $2, $3, $4, $5, $6) \
                     ON CONFLICT (scope_key) DO UPDATE SET rate = $4, active = $5, updated_at = $6")
            .bind(r.id).bind(r.scope.key()).bind(Json(&r.scope)).bind(r.rate).bind(r.active).bind(r.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM commission_rules WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn entries_for_order(&self, order_id: Uuid) -> Result<Vec<CommissionEntry>> {
        sqlx::query_as::<_, EntryRow>("SELECT * FROM commission_entries WHERE order_id = $1 ORDER BY occurred_at")
            .bind(order_id).fetch_all(&self.pool).await?.into_iter().map(EntryRow::into_domain).collect()
    }

    async fn list_entries(&self, q: &EntryQuery) -> Result<Vec<CommissionEntry>> {
        sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM commission_entries WHERE ($1::uuid IS NULL OR vendor_id = $1) AND ($2::text IS NULL OR status = $2) \
             AND ($3::timestamptz IS NULL OR occurred_at >= $3) AND ($4::timestamptz IS NULL OR occurred_at <= $4) ORDER BY occurred_at")
            .bind(q.vendor_id).bind(q.status.map(|s| s.as_str())).bind(q.from).bind(q.to)
            .fetch_all(&self.pool).await?.into_iter().map(EntryRow::into_domain).collect()
    }
}

#[async_trait]
impl SettlementRepository for PgStore {
    async fn create(&self, s: &Settlement) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO settlements (id, vendor_id, period_from, period_to, entry_ids, gross, shipping, commission, platform_collected, vendor_collected, balance, currency, status, payment_reference, notes, created_by, created_at, approved_at, paid_at, cancelled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)")
            .bind(s.id).bind(s.vendor_id).bind(s.period_from).bind(s.period_to).bind(&s.entry_ids)
            .bind(s.gross.amount()).bind(s.shipping.amount()).bind(s.commission.amount()).bind(s.platform_collected.amount())
            .bind(s.vendor_collected.amount()).bind(s.balance.amount()).bind(s.balance.currency()).bind(s.status.as_str())
            .bind(&s.payment_reference).bind(&s.notes).bind(s.created_by).bind(s.created_at).bind(s.approved_at)
            .bind(s.paid_at).bind(s.cancelled_at)
            .execute(&mut *tx).await?;
        let claimed = sqlx::query("UPDATE commission_entries SET status = $3, settlement_id = $1 WHERE id = ANY($2) AND status = $4")
            .bind(s.id).bind(&s.entry_ids).bind(EntryStatus::Settled.as_str()).bind(EntryStatus::Open.as_str())
            .execute(&mut *tx).await?;
        if claimed.rows_affected() != s.entry_ids.len() as u64 {
            return Err(EcommerceError::Conflict("Some commission entries were already settled".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, s: &Settlement) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE settlements SET status = $2, payment_reference = $3, notes = $4, approved_at = $5, paid_at = $6, cancelled_at = $7 WHERE id = $1")
            .bind(s.id).bind(s.status.as_str()).bind(&s.payment_reference).bind(&s.notes).bind(s.approved_at)
            .bind(s.paid_at).bind(s.cancelled_at)
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 { return Err(EcommerceError::not_found("Settlement")); }
        if s.status == SettlementStatus::Cancelled {
            sqlx::query("UPDATE commission_entries SET status = $2, settlement_id = NULL WHERE settlement_id = $1")
                .bind(s.id).bind(EntryStatus::Open.as_str())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Settlement>> {
        sqlx::query_as::<_, SettlementRow>("SELECT * FROM settlements WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(SettlementRow::into_domain).transpose()
    }

    async fn list(&self, vendor_id: Option<Uuid>, status: Option<SettlementStatus>) -> Result<Vec<Settlement>> {
        sqlx::query_as::<_, SettlementRow>("SELECT * FROM settlements WHERE ($1::uuid IS NULL OR vendor_id = $1) AND ($2::text IS NULL OR status = $2) ORDER BY created_at DESC")
            .bind(vendor_id).bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool).await?.into_iter().map(SettlementRow::into_domain).collect()
    }
}

#[async_trait]
impl ReturnRepository for PgStore {
    async fn insert(&self, r: &ReturnRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO return_requests (id, order_id, line_id, product_id, vendor_id, customer_id, quantity, reason, refund, currency, status, restock, requested_at, resolved_at, resolved_by, resolution_note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(r.id).bind(r.order_id).bind(r.line_id).bind(r.product_id).bind(r.vendor_id).bind(r.customer_id)
            .bind(to_i32(r.quantity)).bind(&r.reason).bind(r.refund.amount()).bind(r.refund.currency())
            .bind(r.status.as_str()).bind(r.restock).bind(r.requested_at).bind(r.resolved_at).bind(r.resolved_by)
            .bind(&r.resolution_note)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn save(&self, r: &ReturnRequest) -> Result<()> {
        let updated = sqlx::query("UPDATE return_requests SET status = $2, restock = $3, resolved_at = $4, resolved_by = $5, resolution_note = $6 WHERE id = $1 AND status = 'requested'")
            .bind(r.id).bind(r.status.as_str()).bind(r.restock).bind(r.resolved_at).bind(r.resolved_by).bind(&r.resolution_note)
            .execute(&self.pool).await?;
        if updated.rows_affected() == 0 { return Err(ReturnError::AlreadyResolved.into()); }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(ReturnRow::into_domain).transpose()
    }

    async fn list(&self, q: &ReturnQuery) -> Result<Vec<ReturnRequest>> {
        sqlx::query_as::<_, ReturnRow>(
            "SELECT * FROM return_requests WHERE ($1::uuid IS NULL OR customer_id = $1) AND ($2::uuid IS NULL OR vendor_id = $2) \
             AND ($3::uuid IS NULL OR order_id = $3) AND ($4::text IS NULL OR status = $4) ORDER BY requested_at DESC")
            .bind(q.customer_id).bind(q.vendor_id).bind(q.order_id).bind(q.status.map(|s| s.as_str()))
            .fetch_all(&self.pool).await?.into_iter().map(ReturnRow::into_domain).collect()
    }

    async fn pending_quantity(&self, line_id: Uuid) -> Result<u32> {
        let pending: (Option<i64>,) = sqlx::query_as("SELECT SUM(quantity)::bigint FROM return_requests WHERE line_id = $1 AND status = 'requested'")
            .bind(line_id).fetch_one(&self.pool).await?;
        Ok(pending.0.and_then(|p| u32::try_from(p).ok()).unwrap_or(0))
    }

    async fn approve(&self, r: &ReturnRequest, restock_item: Option<(Uuid, u32)>, reversal: Option<&CommissionEntry>) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE return_requests SET status = $2, restock = $3, resolved_at = $4, resolved_by = $5, resolution_note = $6 WHERE id = $1 AND status = 'requested'")
            .bind(r.id).bind(r.status.as_str()).bind(r.restock).bind(r.resolved_at).bind(r.resolved_by).bind(&r.resolution_note)
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 { return Err(ReturnError::AlreadyResolved.into()); }

        let line = sqlx::query("UPDATE order_items SET returned_quantity = returned_quantity + $3 WHERE id = $1 AND order_id = $2 AND returned_quantity + $3 <= quantity")
            .bind(r.line_id).bind(r.order_id).bind(to_i32(r.quantity))
            .execute(&mut *tx).await?;
        if line.rows_affected() == 0 { return Err(EcommerceError::stale("Order")); }
        // Fully returned orders move to 'returned'; the header only changes while still delivered.
        let header = sqlx::query(
            "UPDATE orders SET updated_at = NOW(), status = CASE WHEN EXISTS \
             (SELECT 1 FROM order_items WHERE order_id = $1 AND returned_quantity < quantity) THEN status ELSE 'returned' END \
             WHERE id = $1 AND status = 'delivered'")
            .bind(r.order_id).execute(&mut *tx).await?;
        if header.rows_affected() == 0 { return Err(EcommerceError::stale("Order")); }

        if let Some(item) = restock_item { restock(&mut tx, &[item]).await?; }
        if let Some(entry) = reversal { upsert_entry(&mut tx, entry).await?; }
        tx.commit().await?;
        OrderRepository::get(self, r.order_id).await?.ok_or_else(|| EcommerceError::not_found("Order"))
    }
}
