//! Request bodies and query strings.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::application::auth::Registration;
use crate::application::bank_accounts::BankAccountInput;
use crate::application::catalog::{CategoryInput, ListFilter, ProductInput};
use crate::application::promotions::PromotionInput;
use crate::application::users::UserInput;
use crate::domain::aggregates::{Address, CommissionScope, DiscountKind, EntryStatus, OrderStatus, ReturnStatus, Role, SettlementStatus};

fn yes() -> bool { true }

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

impl From<RegisterRequest> for Registration {
    fn from(r: RegisterRequest) -> Self {
        Self { email: r.email, full_name: r.full_name, password: r.password, phone: r.phone }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub vendor: Option<Uuid>,
    pub search: Option<String>,
}

impl From<ProductListParams> for ListFilter {
    fn from(p: ProductListParams) -> Self {
        Self { category_id: p.category, vendor_id: p.vendor, search: p.search, page: p.page, per_page: p.per_page }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct IncludeInactive {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default = "yes")]
    pub active: bool,
}

impl From<CategoryRequest> for CategoryInput {
    fn from(r: CategoryRequest) -> Self {
        Self { name: r.name, description: r.description, parent_id: r.parent_id, active: r.active }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    pub vendor_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub images: Vec<String>,
    #[serde(default)]
    pub publish: bool,
}

impl From<ProductRequest> for ProductInput {
    fn from(r: ProductRequest) -> Self {
        Self {
            vendor_id: r.vendor_id, category_id: r.category_id, sku: r.sku, name: r.name, description: r.description,
            price: r.price, compare_at_price: r.compare_at_price, shipping_cost: r.shipping_cost, stock: r.stock,
            images: r.images, publish: r.publish,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    /// Positive adds units, negative removes them.
    pub delta: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    pub district: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub region: Option<String>,
    pub reference: Option<String>,
    pub country: Option<String>,
}

impl From<AddressRequest> for Address {
    fn from(r: AddressRequest) -> Self {
        Self {
            recipient: r.recipient, phone: r.phone, street: r.street, district: r.district, city: r.city,
            region: r.region, reference: r.reference, country: r.country.unwrap_or_else(|| "PE".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: AddressRequest,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,
    pub vendor: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default, Validate)]
pub struct NoteRequest {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ShipRequest {
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    pub accept: bool,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequestBody {
    pub order_id: Uuid,
    pub line_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(length(min = 3, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnListParams {
    pub order_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveReturnRequest {
    #[serde(default = "yes")]
    pub restock: bool,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    pub role: Role,
    #[validate(length(max = 128))]
    pub password: Option<String>,
    #[validate(length(max = 120))]
    pub store_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "yes")]
    pub active: bool,
}

impl From<UserRequest> for UserInput {
    fn from(r: UserRequest) -> Self {
        Self {
            email: r.email, full_name: r.full_name, role: r.role, password: r.password, store_name: r.store_name,
            phone: r.phone, active: r.active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleFilter {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BankAccountRequest {
    pub id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub bank_name: String,
    #[validate(length(min = 1, max = 120))]
    pub holder_name: String,
    #[validate(length(min = 6, max = 30))]
    pub account_number: String,
    pub cci: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default = "yes")]
    pub active: bool,
}

impl From<BankAccountRequest> for BankAccountInput {
    fn from(r: BankAccountRequest) -> Self {
        Self {
            id: r.id, vendor_id: r.vendor_id, bank_name: r.bank_name, holder_name: r.holder_name,
            account_number: r.account_number, cci: r.cci, currency: r.currency.map(|c| c.to_uppercase()), active: r.active,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PromotionRequest {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub vendor_id: Option<Uuid>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    #[serde(default = "yes")]
    pub active: bool,
}

impl From<PromotionRequest> for PromotionInput {
    fn from(r: PromotionRequest) -> Self {
        Self {
            code: r.code, description: r.description, kind: r.kind, value: r.value, min_subtotal: r.min_subtotal,
            vendor_id: r.vendor_id, starts_at: r.starts_at, ends_at: r.ends_at, max_uses: r.max_uses, active: r.active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommissionRuleRequest {
    pub scope: CommissionScope,
    pub rate: Decimal,
    #[serde(default = "yes")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct EntryListParams {
    pub vendor: Option<Uuid>,
    pub status: Option<EntryStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodRequest {
    pub vendor_id: Option<Uuid>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SettlementListParams {
    pub vendor: Option<Uuid>,
    pub status: Option<SettlementStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayRequest {
    #[validate(length(min = 1, max = 100))]
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub vendor: Option<Uuid>,
}
