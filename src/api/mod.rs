//! JSON HTTP surface. Handlers stay thin: decode, validate, call a service.

pub mod backoffice;
pub mod dto;
pub mod error;
pub mod extract;
pub mod storefront;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::application::Services;
use crate::config::AppConfig;

pub use error::{ApiError, ApiResult};

/// Room left for the form's text fields and multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(services: Services, config: Arc<AppConfig>) -> Self { Self { services, config } }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_proof_bytes + MULTIPART_OVERHEAD);

    let storefront = Router::new()
        .route("/auth/register", post(storefront::register))
        .route("/auth/login", post(storefront::login))
        .route("/auth/logout", post(storefront::logout))
        .route("/auth/me", get(storefront::me))
        .route("/categories", get(storefront::list_categories))
        .route("/categories/:id", get(storefront::get_category))
        .route("/products", get(storefront::list_products))
        .route("/products/:id", get(storefront::get_product))
        .route("/cart", get(storefront::get_cart).delete(storefront::clear_cart))
        .route("/cart/items", post(storefront::add_to_cart))
        .route("/cart/items/:product_id", put(storefront::update_cart_item).delete(storefront::remove_cart_item))
        .route("/cart/coupon", post(storefront::apply_coupon).delete(storefront::remove_coupon))
        .route("/checkout", post(storefront::checkout))
        .route("/orders", get(storefront::my_orders))
        .route("/orders/:id", get(storefront::get_order))
        .route("/orders/:id/cancel", post(storefront::cancel_order))
        .route("/orders/:id/proofs", get(storefront::list_proofs).post(storefront::upload_proof).layer(upload_limit))
        .route("/orders/:id/proofs/:proof_id", get(storefront::download_proof))
        .route("/returns", get(storefront::my_returns).post(storefront::request_return))
        .route("/returns/:id", get(storefront::get_return));

    let backoffice = Router::new()
        .route("/users", get(backoffice::list_users).post(backoffice::create_user))
        .route("/users/:id", get(backoffice::get_user).put(backoffice::update_user).delete(backoffice::deactivate_user))
        .route("/categories", get(backoffice::list_categories).post(backoffice::create_category))
        .route("/categories/:id", put(backoffice::update_category).delete(backoffice::delete_category))
        .route("/products", get(backoffice::list_products).post(backoffice::create_product))
        .route("/products/:id", get(backoffice::get_product).put(backoffice::update_product).delete(backoffice::archive_product))
        .route("/products/:id/stock", post(backoffice::adjust_stock))
        .route("/products/:id/publish", post(backoffice::publish_product))
        .route("/orders", get(backoffice::list_orders))
        .route("/orders/:id", get(storefront::get_order))
        .route("/orders/:id/ship", post(backoffice::ship_order))
        .route("/orders/:id/deliver", post(backoffice::deliver_order))
        .route("/orders/:id/cancel", post(storefront::cancel_order))
        .route("/orders/:id/proofs", get(storefront::list_proofs))
        .route("/orders/:id/proofs/:proof_id", get(storefront::download_proof))
        .route("/orders/:id/proofs/:proof_id/review", post(backoffice::review_proof))
        .route("/returns", get(backoffice::list_returns))
        .route("/returns/:id", get(storefront::get_return))
        .route("/returns/:id/approve", post(backoffice::approve_return))
        .route("/returns/:id/reject", post(backoffice::reject_return))
        .route("/bank-accounts", get(backoffice::list_bank_accounts).post(backoffice::save_bank_account))
        .route("/bank-accounts/:id", get(backoffice::get_bank_account).delete(backoffice::delete_bank_account))
        .route("/promotions", get(backoffice::list_promotions).post(backoffice::create_promotion))
        .route("/promotions/:id", get(backoffice::get_promotion).put(backoffice::update_promotion).delete(backoffice::delete_promotion))
        .route("/commissions/rules", get(backoffice::list_rules).put(backoffice::set_rule))
        .route("/commissions/rules/:id", delete(backoffice::delete_rule))
        .route("/commissions/entries", get(backoffice::list_entries))
        .route("/settlements", get(backoffice::list_settlements).post(backoffice::liquidate))
        .route("/settlements/:id", get(backoffice::get_settlement))
        .route("/settlements/:id/approve", post(backoffice::approve_settlement))
        .route("/settlements/:id/pay", post(backoffice::pay_settlement))
        .route("/settlements/:id/cancel", post(backoffice::cancel_settlement))
        .route("/reports/sales", get(backoffice::sales_report));

    Router::new()
        .route("/health", get(storefront::health))
        .nest("/api/v1", storefront.nest("/backoffice", backoffice))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}
