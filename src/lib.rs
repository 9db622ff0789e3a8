//! Simone storefront
//!
//! Multi-vendor marketplace backend paid by bank deposit.
//!
//! ## Features
//! - Catalog with categories, vendor products and stock
//! - Session and user carts with merge on login, coupons and per-vendor shipping
//! - Checkout with payment routing to the platform or straight to the vendor
//! - Deposit proof upload with a JSON metadata sidecar and manual review
//! - Commission rules, per-order commission entries and vendor settlements
//! - Order fulfilment, cancellation and returns
//! - Back office for users, bank accounts, promotions and sales reports

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use api::{router, AppState};
pub use application::{Context, Services, Stores};
pub use config::AppConfig;
pub use error::{EcommerceError, Result};
