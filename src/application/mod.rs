//! Use cases. Each service owns the ports it needs behind `Arc<dyn ..>` and is cheap to clone.

pub mod auth;
pub mod bank_accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod commissions;
pub mod orders;
pub mod payments;
pub mod promotions;
pub mod reports;
pub mod returns;
pub mod settlements;
pub mod users;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::aggregates::{Category, Product, Role, User};
use crate::domain::ports::{
    BankAccountRepository, CartRepository, CategoryRepository, CommissionRepository, EventPublisher, OrderRepository,
    ProductRepository, PromotionRepository, ProofStorage, ReturnRepository, SettlementRepository, UserRepository,
};
use crate::error::{EcommerceError, Result};
use crate::infrastructure::cache::TtlCache;

pub use auth::{AuthService, LoginOutcome};
pub use bank_accounts::BankAccountService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::{CheckoutReceipt, CheckoutService};
pub use commissions::CommissionService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use promotions::PromotionService;
pub use reports::{ReportService, SalesReport};
pub use returns::ReturnService;
pub use settlements::SettlementService;
pub use users::UserService;

/// Every repository port, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub bank_accounts: Arc<dyn BankAccountRepository>,
    pub promotions: Arc<dyn PromotionRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub commissions: Arc<dyn CommissionRepository>,
    pub settlements: Arc<dyn SettlementRepository>,
    pub returns: Arc<dyn ReturnRepository>,
}

impl Stores {
    pub fn from_store<S>(store: S) -> Self
    where
        S: UserRepository + CategoryRepository + ProductRepository + BankAccountRepository + PromotionRepository
            + CartRepository + OrderRepository + CommissionRepository + SettlementRepository + ReturnRepository
            + Clone + 'static,
    {
        let shared = Arc::new(store);
        Self {
            users: shared.clone(),
            categories: shared.clone(),
            products: shared.clone(),
            bank_accounts: shared.clone(),
            promotions: shared.clone(),
            carts: shared.clone(),
            orders: shared.clone(),
            commissions: shared.clone(),
            settlements: shared.clone(),
            returns: shared,
        }
    }
}

/// Read caches, evicted by the services that write the underlying data.
#[derive(Default)]
pub struct Caches {
    pub categories: TtlCache<String, Vec<Category>>,
    pub products: TtlCache<Uuid, Product>,
    pub reports: TtlCache<String, SalesReport>,
    /// Bearer token to user id.
    pub sessions: TtlCache<String, Uuid>,
}

impl Caches {
    /// Drops expired entries from every cache; returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.categories.purge_expired() + self.products.purge_expired() + self.reports.purge_expired() + self.sessions.purge_expired()
    }

    /// Purges on a fixed interval so tokens that are never presented again still go away.
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 { tracing::debug!(purged, "expired cache entries dropped"); }
            }
        })
    }
}

/// The authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Self { user_id: user.id, role: user.role, email: user.email.clone() }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn is_vendor(&self) -> bool { self.role == Role::Vendor }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(EcommerceError::forbidden("administrators only")) }
    }

    pub fn require_vendor_or_admin(&self) -> Result<()> {
        if self.is_admin() || self.is_vendor() { Ok(()) } else { Err(EcommerceError::forbidden("vendors only")) }
    }

    /// Admins act for any vendor; vendors only for themselves.
    pub fn require_vendor(&self, vendor_id: Uuid) -> Result<()> {
        if self.is_admin() || (self.is_vendor() && self.user_id == vendor_id) { Ok(()) }
        else { Err(EcommerceError::forbidden("this belongs to another vendor")) }
    }

    /// Vendor filter for listings: vendors are pinned to themselves.
    pub fn vendor_scope(&self, requested: Option<Uuid>) -> Option<Uuid> {
        if self.is_vendor() { Some(self.user_id) } else { requested }
    }
}

/// Everything the services share.
#[derive(Clone)]
pub struct Context {
    pub stores: Stores,
    pub proofs: Arc<dyn ProofStorage>,
    pub events: Arc<dyn EventPublisher>,
    pub caches: Arc<Caches>,
    pub config: Arc<AppConfig>,
}

impl Context {
    pub fn new(stores: Stores, proofs: Arc<dyn ProofStorage>, events: Arc<dyn EventPublisher>, config: AppConfig) -> Self {
        Self { stores, proofs, events, caches: Arc::new(Caches::default()), config: Arc::new(config) }
    }
}

/// All use cases, wired over one context.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub users: UserService,
    pub catalog: CatalogService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub commissions: CommissionService,
    pub settlements: SettlementService,
    pub returns: ReturnService,
    pub bank_accounts: BankAccountService,
    pub promotions: PromotionService,
    pub reports: ReportService,
}

impl Services {
    pub fn new(ctx: Context) -> Self {
        let cart = CartService::new(ctx.clone());
        let bank_accounts = BankAccountService::new(ctx.clone());
        let commissions = CommissionService::new(ctx.clone());
        Self {
            auth: AuthService::new(ctx.clone(), cart.clone()),
            users: UserService::new(ctx.clone()),
            catalog: CatalogService::new(ctx.clone()),
            checkout: CheckoutService::new(ctx.clone(), bank_accounts.clone()),
            orders: OrderService::new(ctx.clone()),
            payments: PaymentService::new(ctx.clone(), commissions.clone()),
            settlements: SettlementService::new(ctx.clone()),
            returns: ReturnService::new(ctx.clone()),
            promotions: PromotionService::new(ctx.clone()),
            reports: ReportService::new(ctx),
            cart,
            bank_accounts,
            commissions,
        }
    }
}

/// Inclusive UTC bounds covering whole days `from..=to`.
pub fn day_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from.and_time(NaiveTime::MIN).and_utc();
    let end = to.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::nanoseconds(1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_cover_whole_days() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) = day_bounds(day, day);
        assert_eq!(start.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert_eq!(end.date_naive(), day);
        assert!(end - start < Duration::days(1));
    }

    #[test]
    fn test_purge_expired_covers_every_cache() {
        let caches = Caches::default();
        caches.sessions.insert("stale-token".into(), Uuid::now_v7(), std::time::Duration::ZERO);
        caches.sessions.insert("live-token".into(), Uuid::now_v7(), std::time::Duration::from_secs(60));
        caches.categories.insert("categories:all".into(), vec![], std::time::Duration::ZERO);
        assert_eq!(caches.purge_expired(), 2);
        assert_eq!(caches.sessions.len(), 1);
        assert!(caches.categories.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_drops_unread_sessions() {
        let caches = Arc::new(Caches::default());
        caches.sessions.insert("abandoned".into(), Uuid::now_v7(), std::time::Duration::from_millis(5));
        let sweeper = caches.clone().spawn_sweeper(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        sweeper.abort();
        assert!(caches.sessions.is_empty());
    }

    #[test]
    fn test_vendor_scope() {
        let vendor = Actor { user_id: Uuid::now_v7(), role: Role::Vendor, email: "v@x.com".into() };
        let admin = Actor { user_id: Uuid::now_v7(), role: Role::Admin, email: "a@x.com".into() };
        let other = Uuid::now_v7();
        assert_eq!(vendor.vendor_scope(Some(other)), Some(vendor.user_id));
        assert_eq!(admin.vendor_scope(Some(other)), Some(other));
        assert!(vendor.require_vendor(other).is_err());
        assert!(admin.require_vendor(other).is_ok());
    }
}
