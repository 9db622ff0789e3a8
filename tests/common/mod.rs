//! Shared fixtures: services over the in-memory store with proofs in a temp dir.
#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use simone_storefront::application::auth::hash_password;
use simone_storefront::application::bank_accounts::BankAccountInput;
use simone_storefront::application::catalog::ProductInput;
use simone_storefront::application::payments::ProofUpload;
use simone_storefront::application::{Actor, CheckoutReceipt};
use simone_storefront::domain::aggregates::{Address, BankAccount, CartOwner, PaymentProof, PaymentRouting, Product, Role, User};
use simone_storefront::infrastructure::{InMemoryStore, LocalProofStorage, LogPublisher};
use simone_storefront::{AppConfig, AppState, Context, Services, Stores};

pub const PASSWORD: &str = "password123";

pub struct Harness {
    pub services: Services,
    pub ctx: Context,
    pub admin: Actor,
    pub vendor: Actor,
    pub other_vendor: Actor,
    pub customer: Actor,
    pub uploads: TempDir,
}

impl Harness {
    pub fn state(&self) -> AppState {
        AppState::new(self.services.clone(), self.ctx.config.clone())
    }
}

pub async fn harness() -> Harness {
    let uploads = tempfile::tempdir().expect("temp dir");
    let config = AppConfig { upload_dir: uploads.path().to_path_buf(), ..AppConfig::default() };
    let ctx = Context::new(
        Stores::from_store(InMemoryStore::new()),
        Arc::new(LocalProofStorage::new(uploads.path())),
        Arc::new(LogPublisher),
        config,
    );
    let services = Services::new(ctx.clone());

    let hash = hash_password(PASSWORD).expect("hash");
    let admin = seed_user(&ctx, "admin@simone.pe", Role::Admin, None, &hash).await;
    let vendor = seed_user(&ctx, "tienda@simone.pe", Role::Vendor, Some("Tienda Uno"), &hash).await;
    let other_vendor = seed_user(&ctx, "otra@simone.pe", Role::Vendor, Some("Tienda Dos"), &hash).await;
    let customer = seed_user(&ctx, "cliente@simone.pe", Role::Customer, None, &hash).await;

    Harness {
        services,
        ctx,
        admin: Actor::from_user(&admin),
        vendor: Actor::from_user(&vendor),
        other_vendor: Actor::from_user(&other_vendor),
        customer: Actor::from_user(&customer),
        uploads,
    }
}

async fn seed_user(ctx: &Context, email: &str, role: Role, store_name: Option<&str>, hash: &str) -> User {
    let mut user = User::new(email, email.split('@').next().unwrap_or(email), hash.to_string(), role);
    user.store_name = store_name.map(str::to_string);
    ctx.stores.users.insert(&user).await.expect("seed user");
    user
}

pub async fn product(h: &Harness, vendor_id: Uuid, price: Decimal, shipping: Decimal, stock: u32) -> Product {
    let input = ProductInput {
        vendor_id: Some(vendor_id),
        category_id: None,
        sku: format!("SKU-{}", &Uuid::now_v7().simple().to_string()[24..]),
        name: format!("Producto {price}"),
        description: String::new(),
        price,
        compare_at_price: None,
        shipping_cost: shipping,
        stock,
        images: vec![],
        publish: true,
    };
    h.services.catalog.create_product(&h.admin, input).await.expect("create product")
}

pub async fn platform_account(h: &Harness) -> BankAccount {
    bank_account(h, None).await
}

pub async fn vendor_account(h: &Harness, vendor_id: Uuid) -> BankAccount {
    bank_account(h, Some(vendor_id)).await
}

async fn bank_account(h: &Harness, vendor_id: Option<Uuid>) -> BankAccount {
    let input = BankAccountInput {
        id: None,
        vendor_id,
        bank_name: "BCP".into(),
        holder_name: "Simone SAC".into(),
        account_number: "191-2345678-0-12".into(),
        cci: None,
        currency: None,
        active: true,
    };
    h.services.bank_accounts.save(&h.admin, input).await.expect("bank account")
}

pub fn address() -> Address {
    Address {
        recipient: "Ana Quispe".into(),
        street: "Av. Arequipa 123".into(),
        city: "Lima".into(),
        country: "PE".into(),
        ..Address::default()
    }
}

/// Fills the customer's cart and checks out.
pub async fn place_order(h: &Harness, lines: &[(Uuid, u32)]) -> CheckoutReceipt {
    let owner = CartOwner::User(h.customer.user_id);
    for (product_id, qty) in lines {
        h.services.cart.add(&owner, *product_id, *qty).await.expect("add to cart");
    }
    h.services.checkout.checkout(&h.customer, address(), None).await.expect("checkout")
}

pub fn deposit(account: &BankAccount, amount: Decimal) -> ProofUpload {
    ProofUpload {
        bank_account_id: account.id,
        operation_number: "OP-000123".into(),
        amount,
        deposited_on: Utc::now().date_naive(),
        original_name: Some("voucher.png".into()),
        content_type: "image/png".into(),
        bytes: vec![0x89, b'P', b'N', b'G', 1, 2, 3, 4],
    }
}

/// Uploads a full deposit into `account` and has the right reviewer accept it.
pub async fn pay(h: &Harness, receipt: &CheckoutReceipt, account: &BankAccount) -> PaymentProof {
    let order = &receipt.order;
    let proof = h.services.payments
        .upload(&h.customer, order.id(), deposit(account, order.total().amount()))
        .await
        .expect("upload proof");
    let reviewer = match order.routing() {
        PaymentRouting::Platform => &h.admin,
        PaymentRouting::DirectToVendor { vendor_id } if vendor_id == h.vendor.user_id => &h.vendor,
        PaymentRouting::DirectToVendor { .. } => &h.other_vendor,
    };
    h.services.payments.review(reviewer, order.id(), proof.id, true, None).await.expect("accept proof")
}

/// Pays, ships and delivers an order.
pub async fn deliver(h: &Harness, receipt: &CheckoutReceipt, account: &BankAccount) {
    pay(h, receipt, account).await;
    let id = receipt.order.id();
    h.services.orders.ship(&h.admin, id, Some("TRK-1".into())).await.expect("ship");
    h.services.orders.deliver(&h.admin, id).await.expect("deliver");
}
