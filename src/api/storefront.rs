//! Customer-facing handlers: sign-in, catalog, cart, checkout, orders, proofs and returns.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::dto::*;
use super::error::ApiResult;
use super::extract::{AuthUser, Bearer, CartCaller, CartSession};
use super::AppState;
use crate::application::catalog::ProductPage;
use crate::application::orders::OrderFilter;
use crate::application::payments::ProofUpload;
use crate::application::returns::ReturnFilter;
use crate::application::{CheckoutReceipt, LoginOutcome};
use crate::domain::aggregates::{CartSummary, Category, Order, PaymentProof, Product, ReturnRequest, User};
use crate::error::EcommerceError;

// auth

pub async fn register(State(s): State<AppState>, Json(r): Json<RegisterRequest>) -> ApiResult<(StatusCode, Json<User>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.auth.register(r.into()).await?)))
}

pub async fn login(State(s): State<AppState>, CartSession(session): CartSession, Json(r): Json<LoginRequest>) -> ApiResult<Json<LoginOutcome>> {
    r.validate()?;
    Ok(Json(s.services.auth.login(&r.email, &r.password, session).await?))
}

pub async fn logout(State(s): State<AppState>, Bearer(token): Bearer) -> StatusCode {
    s.services.auth.logout(&token);
    StatusCode::NO_CONTENT
}

pub async fn me(State(s): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<User>> {
    Ok(Json(s.services.auth.current_user(&actor).await?))
}

// catalog

pub async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(s.services.catalog.list_categories(false).await?))
}

pub async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Category>> {
    let category = s.services.catalog.get_category(id).await?;
    if !category.active { return Err(EcommerceError::not_found("Category").into()); }
    Ok(Json(category))
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ProductListParams>) -> ApiResult<Json<ProductPage>> {
    Ok(Json(s.services.catalog.list_products(p.into()).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.product_detail(id).await?))
}

// cart

pub async fn get_cart(State(s): State<AppState>, CartCaller(owner): CartCaller) -> ApiResult<Json<CartSummary>> {
    Ok(Json(s.services.cart.summary(&owner).await?))
}

pub async fn add_to_cart(State(s): State<AppState>, CartCaller(owner): CartCaller, Json(r): Json<AddItemRequest>) -> ApiResult<Json<CartSummary>> {
    r.validate()?;
    Ok(Json(s.services.cart.add(&owner, r.product_id, r.quantity).await?))
}

pub async fn update_cart_item(
    State(s): State<AppState>,
    CartCaller(owner): CartCaller,
    Path(product_id): Path<Uuid>,
    Json(r): Json<UpdateItemRequest>,
) -> ApiResult<Json<CartSummary>> {
    r.validate()?;
    Ok(Json(s.services.cart.update(&owner, product_id, r.quantity).await?))
}

pub async fn remove_cart_item(State(s): State<AppState>, CartCaller(owner): CartCaller, Path(product_id): Path<Uuid>) -> ApiResult<Json<CartSummary>> {
    Ok(Json(s.services.cart.remove(&owner, product_id).await?))
}

pub async fn clear_cart(State(s): State<AppState>, CartCaller(owner): CartCaller) -> ApiResult<StatusCode> {
    s.services.cart.clear(&owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_coupon(State(s): State<AppState>, CartCaller(owner): CartCaller, Json(r): Json<CouponRequest>) -> ApiResult<Json<CartSummary>> {
    r.validate()?;
    Ok(Json(s.services.cart.apply_coupon(&owner, &r.code).await?))
}

pub async fn remove_coupon(State(s): State<AppState>, CartCaller(owner): CartCaller) -> ApiResult<Json<CartSummary>> {
    Ok(Json(s.services.cart.remove_coupon(&owner).await?))
}

// checkout and orders

pub async fn checkout(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<CheckoutRequest>) -> ApiResult<(StatusCode, Json<CheckoutReceipt>)> {
    r.validate()?;
    let receipt = s.services.checkout.checkout(&actor, r.shipping_address.into(), r.notes).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn my_orders(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<OrderListParams>) -> ApiResult<Json<Vec<Order>>> {
    let filter = OrderFilter { status: p.status, vendor_id: None, from: p.from, to: p.to };
    Ok(Json(s.services.orders.list(&actor, filter).await?))
}

pub async fn get_order(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.services.orders.get(&actor, id).await?))
}

pub async fn cancel_order(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<Json<Order>> {
    let note = body.map(|Json(b)| b).unwrap_or_default();
    note.validate()?;
    Ok(Json(s.services.orders.cancel(&actor, id, note.note).await?))
}

/// Multipart form: `bank_account_id`, `operation_number`, `amount`, `deposited_on`
/// (YYYY-MM-DD) and the `file` itself.
pub async fn upload_proof(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(order_id): Path<Uuid>,
    mut form: Multipart,
) -> ApiResult<(StatusCode, Json<PaymentProof>)> {
    let mut bank_account_id = None;
    let mut operation_number = None;
    let mut amount = None;
    let mut deposited_on = None;
    let mut file = None;

    while let Some(field) = form.next_field().await.map_err(|e| EcommerceError::validation(e.body_text()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(|e| EcommerceError::validation(e.body_text()))?;
                file = Some((original_name, content_type, bytes.to_vec()));
            }
            "bank_account_id" | "operation_number" | "amount" | "deposited_on" => {
                let text = field.text().await.map_err(|e| EcommerceError::validation(e.body_text()))?;
                let text = text.trim().to_string();
                match name.as_str() {
                    "bank_account_id" => bank_account_id = Some(parse_field::<Uuid>(&name, &text)?),
                    "amount" => amount = Some(parse_field::<Decimal>(&name, &text)?),
                    "deposited_on" => deposited_on = Some(parse_field::<NaiveDate>(&name, &text)?),
                    _ => operation_number = Some(text),
                }
            }
            _ => {}
        }
    }

    let (original_name, content_type, bytes) = file.ok_or_else(|| EcommerceError::validation("file is required"))?;
    let upload = ProofUpload {
        bank_account_id: bank_account_id.ok_or_else(|| EcommerceError::validation("bank_account_id is required"))?,
        operation_number: operation_number.ok_or_else(|| EcommerceError::validation("operation_number is required"))?,
        amount: amount.ok_or_else(|| EcommerceError::validation("amount is required"))?,
        deposited_on: deposited_on.ok_or_else(|| EcommerceError::validation("deposited_on is required"))?,
        original_name,
        content_type,
        bytes,
    };
    let proof = s.services.payments.upload(&actor, order_id, upload).await?;
    Ok((StatusCode::CREATED, Json(proof)))
}

fn parse_field<T: std::str::FromStr>(name: &str, text: &str) -> Result<T, EcommerceError> {
    text.parse().map_err(|_| EcommerceError::validation(format!("{name} is malformed")))
}

pub async fn list_proofs(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(order_id): Path<Uuid>) -> ApiResult<Json<Vec<PaymentProof>>> {
    Ok(Json(s.services.payments.list(&actor, order_id).await?))
}

pub async fn download_proof(
    State(s): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((order_id, proof_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let (proof, bytes) = s.services.payments.download(&actor, order_id, proof_id).await?;
    let disposition = format!("inline; filename=\"{}\"", proof.file_name);
    Ok(([(header::CONTENT_TYPE, proof.content_type), (header::CONTENT_DISPOSITION, disposition)], bytes))
}

// returns

pub async fn request_return(State(s): State<AppState>, AuthUser(actor): AuthUser, Json(r): Json<ReturnRequestBody>) -> ApiResult<(StatusCode, Json<ReturnRequest>)> {
    r.validate()?;
    let request = s.services.returns.request(&actor, r.order_id, r.line_id, r.quantity, &r.reason).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn my_returns(State(s): State<AppState>, AuthUser(actor): AuthUser, Query(p): Query<ReturnListParams>) -> ApiResult<Json<Vec<ReturnRequest>>> {
    Ok(Json(s.services.returns.list(&actor, ReturnFilter { order_id: p.order_id, status: p.status }).await?))
}

pub async fn get_return(State(s): State<AppState>, AuthUser(actor): AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<ReturnRequest>> {
    Ok(Json(s.services.returns.get(&actor, id).await?))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "simone-storefront" }))
}
