//! Persistence and integration ports. Every multi-aggregate write is a single
//! method so implementations can make it atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::aggregates::{
    AccountOwner, BankAccount, Cart, CartOwner, Category, CommissionEntry, CommissionRule, EntryStatus, Order,
    OrderStatus, PaymentProof, Product, Promotion, ReturnRequest, ReturnStatus, Role, Settlement, SettlementStatus, User,
};
use super::events::DomainEvent;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub search: Option<String>,
    /// Include drafts and archived products (back-office listings).
    pub include_inactive: bool,
    pub page: u32,
    pub per_page: u32,
}

impl ProductQuery {
    pub fn offset(&self) -> usize { (self.page.max(1) as usize - 1) * self.per_page as usize }
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub vendor_id: Option<Uuid>,
    pub status: Option<EntryStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReturnQuery {
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with a conflict when the email is taken.
    async fn insert(&self, user: &User) -> Result<()>;
    async fn update(&self, user: &User) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list(&self, role: Option<Role>) -> Result<Vec<User>>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn save(&self, category: &Category) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Category>>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<Category>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn save(&self, product: &Product) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Product>>;
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    /// Page of products plus the total number of matches.
    async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)>;
    async fn count_in_category(&self, category_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait BankAccountRepository: Send + Sync {
    async fn save(&self, account: &BankAccount) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<BankAccount>>;
    async fn list(&self, owner: Option<AccountOwner>, active_only: bool) -> Result<Vec<BankAccount>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PromotionRepository: Send + Sync {
    /// Fails with a conflict when another promotion uses the code. The usage counter of
    /// an existing promotion is left alone; only checkouts move it.
    async fn save(&self, promotion: &Promotion) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Promotion>>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>>;
    async fn list(&self) -> Result<Vec<Promotion>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get(&self, owner: &CartOwner) -> Result<Option<Cart>>;
    async fn save(&self, cart: &Cart) -> Result<()>;
    async fn delete(&self, owner: &CartOwner) -> Result<()>;
}

/// Order writes are compare-and-set: `expected` is the status the caller loaded the order
/// in, and a stored order that has moved on since fails with a conflict and writes nothing.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Decrements stock for every line (failing with `InsufficientStock` and writing
    /// nothing on any shortfall), takes one use of the coupon (failing with
    /// `PromotionError::Exhausted` once its cap is reached), stores the order and deletes
    /// the checked-out cart. A taken order number is a conflict.
    async fn place(&self, order: &Order, cart_owner: &CartOwner) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>>;
    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<()>;
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>>;
    /// Stores a verified payment together with its commission entries.
    async fn record_payment(&self, order: &Order, expected: OrderStatus, entries: &[CommissionEntry]) -> Result<()>;
    /// Stores a cancellation, restocks `(product_id, quantity)` pairs and upserts the
    /// voided or reversing commission entries.
    async fn cancel(&self, order: &Order, expected: OrderStatus, restock: &[(Uuid, u32)], entries: &[CommissionEntry]) -> Result<()>;
}

#[async_trait]
pub trait CommissionRepository: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<CommissionRule>>;
    /// Upsert keyed by scope.
    async fn save_rule(&self, rule: &CommissionRule) -> Result<()>;
    async fn delete_rule(&self, id: Uuid) -> Result<bool>;
    async fn entries_for_order(&self, order_id: Uuid) -> Result<Vec<CommissionEntry>>;
    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<CommissionEntry>>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Stores the settlement and marks its entries settled. Fails with a conflict if
    /// any entry is no longer open.
    async fn create(&self, settlement: &Settlement) -> Result<()>;
    /// Updates status fields; a cancelled settlement releases its entries back to open.
    async fn save(&self, settlement: &Settlement) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Settlement>>;
    async fn list(&self, vendor_id: Option<Uuid>, status: Option<SettlementStatus>) -> Result<Vec<Settlement>>;
}

#[async_trait]
pub trait ReturnRepository: Send + Sync {
    async fn insert(&self, request: &ReturnRequest) -> Result<()>;
    /// Stores a resolution; conflict when the stored request is no longer open.
    async fn save(&self, request: &ReturnRequest) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<ReturnRequest>>;
    async fn list(&self, query: &ReturnQuery) -> Result<Vec<ReturnRequest>>;
    /// Units of a line sitting in open requests.
    async fn pending_quantity(&self, line_id: Uuid) -> Result<u32>;
    /// Approval in one transaction: the request (conflict unless still open), the returned
    /// units on the stored delivered order, optional restock and the reversing commission
    /// entry. Returns the order as stored afterwards.
    async fn approve(&self, request: &ReturnRequest, restock: Option<(Uuid, u32)>, reversal: Option<&CommissionEntry>) -> Result<Order>;
}

/// Deposit proof files and their JSON sidecars.
#[async_trait]
pub trait ProofStorage: Send + Sync {
    async fn store(&self, proof: &PaymentProof, bytes: &[u8]) -> Result<()>;
    async fn update(&self, proof: &PaymentProof) -> Result<()>;
    async fn get(&self, order_id: Uuid, proof_id: Uuid) -> Result<Option<PaymentProof>>;
    async fn list(&self, order_id: Uuid) -> Result<Vec<PaymentProof>>;
    async fn read_file(&self, proof: &PaymentProof) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, events: Vec<DomainEvent>);
}
