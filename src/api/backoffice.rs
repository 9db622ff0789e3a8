//! Back-office handlers for administrators and vendors. Role checks live in the services.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use super::dto::*;
use super::error::ApiResult;
use super::extract::AuthUser;
use super::AppState;
use crate::application::catalog::ProductPage;
use crate::application::orders::OrderFilter;
use crate::application::returns::ReturnFilter;
use crate::application::SalesReport;
use crate::domain::aggregates::{
    BankAccount, Category, CommissionEntry, CommissionRule, Order, PaymentProof, Product, Promotion, ReturnRequest,
    Settlement, User,
};
use crate::domain::ports::EntryQuery;

// users

pub async fn list_users(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<RoleFilter>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(s.services.users.list(&actor, p.role).await?))
}

pub async fn get_user(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    Ok(Json(s.services.users.get(&actor, id).await?))
}

pub async fn create_user(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<UserRequest>) -> ApiResult<(StatusCode, Json<User>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.users.create(&actor, r.into()).await?)))
}

pub async fn update_user(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>, Json(r): Json<UserRequest>) -> ApiResult<Json<User>> {
    r.validate()?;
    Ok(Json(s.services.users.update(&actor, id, r.into()).await?))
}

pub async fn deactivate_user(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    Ok(Json(s.services.users.deactivate(&actor, id).await?))
}

// categories

pub async fn list_categories(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<IncludeInactive>) -> ApiResult<Json<Vec<Category>>> {
    actor.require_vendor_or_admin()?;
    Ok(Json(s.services.catalog.list_categories(p.include_inactive).await?))
}

pub async fn create_category(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<CategoryRequest>) -> ApiResult<(StatusCode, Json<Category>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_category(&actor, r.into()).await?)))
}

pub async fn update_category(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(r): Json<CategoryRequest>,
) -> ApiResult<Json<Category>> {
    r.validate()?;
    Ok(Json(s.services.catalog.update_category(&actor, id, r.into()).await?))
}

pub async fn delete_category(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.catalog.delete_category(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// products

pub async fn list_products(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<ProductListParams>) -> ApiResult<Json<ProductPage>> {
    Ok(Json(s.services.catalog.list_managed_products(&actor, p.into()).await?))
}

pub async fn get_product(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.managed_product(&actor, id).await?))
}

pub async fn create_product(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<ProductRequest>) -> ApiResult<(StatusCode, Json<Product>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_product(&actor, r.into()).await?)))
}

pub async fn update_product(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(r): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    r.validate()?;
    Ok(Json(s.services.catalog.update_product(&actor, id, r.into()).await?))
}

pub async fn adjust_stock(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>, Json(r): Json<StockRequest>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.adjust_stock(&actor, id, r.delta).await?))
}

pub async fn publish_product(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.publish_product(&actor, id).await?))
}

/// Products are archived rather than removed; past orders still point at them.
pub async fn archive_product(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.archive_product(&actor, id).await?))
}

// orders and payments

pub async fn list_orders(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<OrderListParams>) -> ApiResult<Json<Vec<Order>>> {
    actor.require_vendor_or_admin()?;
    let filter = OrderFilter { status: p.status, vendor_id: p.vendor, from: p.from, to: p.to };
    Ok(Json(s.services.orders.list(&actor, filter).await?))
}

pub async fn ship_order(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ShipRequest>>,
) -> ApiResult<Json<Order>> {
    let tracking = body.and_then(|Json(b)| b.tracking_number);
    Ok(Json(s.services.orders.ship(&actor, id, tracking).await?))
}

pub async fn deliver_order(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.services.orders.deliver(&actor, id).await?))
}

pub async fn review_proof(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((order_id, proof_id)): Path<(Uuid, Uuid)>,
    Json(r): Json<ReviewRequest>,
) -> ApiResult<Json<PaymentProof>> {
    r.validate()?;
    Ok(Json(s.services.payments.review(&actor, order_id, proof_id, r.accept, r.note).await?))
}

// returns

pub async fn list_returns(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<ReturnListParams>) -> ApiResult<Json<Vec<ReturnRequest>>> {
    actor.require_vendor_or_admin()?;
    Ok(Json(s.services.returns.list(&actor, ReturnFilter { order_id: p.order_id, status: p.status }).await?))
}

pub async fn approve_return(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(r): Json<ApproveReturnRequest>,
) -> ApiResult<Json<ReturnRequest>> {
    r.validate()?;
    Ok(Json(s.services.returns.approve(&actor, id, r.restock, r.note).await?))
}

pub async fn reject_return(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(r): Json<NoteRequest>,
) -> ApiResult<Json<ReturnRequest>> {
    r.validate()?;
    Ok(Json(s.services.returns.reject(&actor, id, r.note).await?))
}

// bank accounts

pub async fn list_bank_accounts(State(s): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<Vec<BankAccount>>> {
    Ok(Json(s.services.bank_accounts.list(&actor).await?))
}

pub async fn get_bank_account(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<BankAccount>> {
    Ok(Json(s.services.bank_accounts.get(&actor, id).await?))
}

pub async fn save_bank_account(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<BankAccountRequest>) -> ApiResult<Json<BankAccount>> {
    r.validate()?;
    Ok(Json(s.services.bank_accounts.save(&actor, r.into()).await?))
}

pub async fn delete_bank_account(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.bank_accounts.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// promotions

pub async fn list_promotions(State(s): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<Vec<Promotion>>> {
    Ok(Json(s.services.promotions.list(&actor).await?))
}

pub async fn get_promotion(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Promotion>> {
    Ok(Json(s.services.promotions.get(&actor, id).await?))
}

pub async fn create_promotion(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<PromotionRequest>) -> ApiResult<(StatusCode, Json<Promotion>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.promotions.create(&actor, r.into()).await?)))
}

pub async fn update_promotion(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(r): Json<PromotionRequest>,
) -> ApiResult<Json<Promotion>> {
    r.validate()?;
    Ok(Json(s.services.promotions.update(&actor, id, r.into()).await?))
}

pub async fn delete_promotion(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.promotions.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// commissions

pub async fn list_rules(State(s): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<Vec<CommissionRule>>> {
    Ok(Json(s.services.commissions.list_rules(&actor).await?))
}

pub async fn set_rule(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<CommissionRuleRequest>) -> ApiResult<Json<CommissionRule>> {
    Ok(Json(s.services.commissions.set_rule(&actor, r.scope, r.rate, r.active).await?))
}

pub async fn delete_rule(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.commissions.delete_rule(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_entries(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<EntryListParams>) -> ApiResult<Json<Vec<CommissionEntry>>> {
    let query = EntryQuery { vendor_id: p.vendor, status: p.status, from: p.from, to: p.to };
    Ok(Json(s.services.commissions.list_entries(&actor, query).await?))
}

// settlements

/// With a `vendor_id` one settlement is created; without it every vendor with open entries is liquidated.
pub async fn liquidate(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<PeriodRequest>) -> ApiResult<(StatusCode, Json<Vec<Settlement>>)> {
    let settlements = match r.vendor_id {
        Some(vendor_id) => vec![s.services.settlements.liquidate(&actor, vendor_id, r.from, r.to).await?],
        None => s.services.settlements.liquidate_all(&actor, r.from, r.to).await?,
    };
    Ok((StatusCode::CREATED, Json(settlements)))
}

pub async fn list_settlements(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<SettlementListParams>) -> ApiResult<Json<Vec<Settlement>>> {
    Ok(Json(s.services.settlements.list(&actor, p.vendor, p.status).await?))
}

pub async fn get_settlement(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Settlement>> {
    Ok(Json(s.services.settlements.get(&actor, id).await?))
}

pub async fn approve_settlement(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Settlement>> {
    Ok(Json(s.services.settlements.approve(&actor, id).await?))
}

pub async fn pay_settlement(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>, Json(r): Json<PayRequest>) -> ApiResult<Json<Settlement>> {
    r.validate()?;
    Ok(Json(s.services.settlements.mark_paid(&actor, id, &r.reference).await?))
}

pub async fn cancel_settlement(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<Json<Settlement>> {
    let note = body.map(|Json(b)| b).unwrap_or_default();
    note.validate()?;
    Ok(Json(s.services.settlements.cancel(&actor, id, note.note).await?))
}

// reports

pub async fn sales_report(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<ReportParams>) -> ApiResult<Json<SalesReport>> {
    Ok(Json(s.services.reports.sales(&actor, p.from, p.to, p.vendor).await?))
}
