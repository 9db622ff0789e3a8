//! Categories and products: storefront reads (cached) and back-office writes.

use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::{Category, Product, ProductStatus};
use crate::domain::ports::ProductQuery;
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{EcommerceError, Result};

const CATEGORY_TTL: Duration = Duration::from_secs(10 * 60);
const PRODUCT_TTL: Duration = Duration::from_secs(5 * 60);
const CATEGORY_PREFIX: &str = "categories:";
pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ProductInput {
    /// Only honoured for administrators; vendors always own what they create.
    pub vendor_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub shipping_cost: Decimal,
    pub stock: u32,
    pub images: Vec<String>,
    pub publish: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone)]
pub struct CatalogService {
    ctx: Context,
}

impl CatalogService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn list_categories(&self, include_inactive: bool) -> Result<Vec<Category>> {
        let key = format!("{CATEGORY_PREFIX}{}", if include_inactive { "all" } else { "active" });
        if let Some(hit) = self.ctx.caches.categories.get(&key) {
            return Ok(hit);
        }
        let categories = self.ctx.stores.categories.list(include_inactive).await?;
        self.ctx.caches.categories.insert(key, categories.clone(), CATEGORY_TTL);
        Ok(categories)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.ctx.stores.categories.get(id).await?.ok_or_else(|| EcommerceError::not_found("Category"))
    }

    #[tracing::instrument(skip(self, actor, input), fields(name = %input.name))]
    pub async fn create_category(&self, actor: &Actor, input: CategoryInput) -> Result<Category> {
        actor.require_admin()?;
        self.check_parent(None, input.parent_id).await?;
        let mut category = Category::new(&input.name, input.description, input.parent_id);
        if category.slug.is_empty() { return Err(EcommerceError::validation("category name is required")); }
        category.active = input.active;
        self.ctx.stores.categories.save(&category).await?;
        self.ctx.caches.categories.remove_prefix(CATEGORY_PREFIX);
        info!(category_id = %category.id, "category created");
        Ok(category)
    }

    #[tracing::instrument(skip(self, actor, input))]
    pub async fn update_category(&self, actor: &Actor, id: Uuid, input: CategoryInput) -> Result<Category> {
        actor.require_admin()?;
        let mut category = self.get_category(id).await?;
        self.check_parent(Some(id), input.parent_id).await?;
        category.rename(&input.name);
        if category.slug.is_empty() { return Err(EcommerceError::validation("category name is required")); }
        category.description = input.description;
        category.parent_id = input.parent_id;
        category.active = input.active;
        self.ctx.stores.categories.save(&category).await?;
        self.ctx.caches.categories.remove_prefix(CATEGORY_PREFIX);
        info!(category_id = %id, "category updated");
        Ok(category)
    }

    /// Refused while any product still references the category.
    #[tracing::instrument(skip(self, actor))]
    pub async fn delete_category(&self, actor: &Actor, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        let in_use = self.ctx.stores.products.count_in_category(id).await?;
        if in_use > 0 {
            warn!(category_id = %id, in_use, "category delete refused");
            return Err(EcommerceError::Conflict(format!("Category still has {in_use} products")));
        }
        if !self.ctx.stores.categories.delete(id).await? {
            return Err(EcommerceError::not_found("Category"));
        }
        self.ctx.caches.categories.remove_prefix(CATEGORY_PREFIX);
        info!(category_id = %id, "category deleted");
        Ok(())
    }

    /// Storefront listing: active products only.
    pub async fn list_products(&self, filter: ListFilter) -> Result<ProductPage> {
        self.query_products(filter, false).await
    }

    /// Back-office listing; vendors only see their own products.
    pub async fn list_managed_products(&self, actor: &Actor, mut filter: ListFilter) -> Result<ProductPage> {
        actor.require_vendor_or_admin()?;
        filter.vendor_id = actor.vendor_scope(filter.vendor_id);
        self.query_products(filter, true).await
    }

    /// Storefront detail, cached. Products that are not active read as missing.
    pub async fn product_detail(&self, id: Uuid) -> Result<Product> {
        let product = match self.ctx.caches.products.get(&id) {
            Some(hit) => hit,
            None => {
                let product = self.load_product(id).await?;
                self.ctx.caches.products.insert(id, product.clone(), PRODUCT_TTL);
                product
            }
        };
        if product.is_active() { Ok(product) } else { Err(EcommerceError::not_found("Product")) }
    }

    pub async fn managed_product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        let product = self.load_product(id).await?;
        actor.require_vendor(product.vendor_id)?;
        Ok(product)
    }

    #[tracing::instrument(skip(self, actor, input), fields(sku = %input.sku))]
    pub async fn create_product(&self, actor: &Actor, input: ProductInput) -> Result<Product> {
        actor.require_vendor_or_admin()?;
        let vendor_id = if actor.is_admin() {
            input.vendor_id.ok_or_else(|| EcommerceError::validation("vendor_id is required"))?
        } else {
            actor.user_id
        };
        self.check_vendor(vendor_id).await?;
        self.check_category(input.category_id).await?;

        let currency = self.ctx.config.currency.clone();
        let mut product = Product::create(vendor_id, Sku::new(input.sku.as_str())?, input.name.trim(), Money::new(input.price, &currency));
        apply_details(&mut product, &input, &currency)?;
        if input.stock > 0 { product.add_inventory(input.stock); }
        if input.publish { product.publish()?; }
        self.ctx.stores.products.save(&product).await?;
        self.ctx.events.publish(product.take_events()).await;
        info!(product_id = %product.id, %vendor_id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, actor, input))]
    pub async fn update_product(&self, actor: &Actor, id: Uuid, input: ProductInput) -> Result<Product> {
        let mut product = self.managed_product(actor, id).await?;
        self.check_category(input.category_id).await?;
        let currency = product.price.currency().to_string();
        product.sku = Sku::new(input.sku.as_str())?;
        product.name = input.name.trim().to_string();
        product.update_price(Money::new(input.price, &currency))?;
        apply_details(&mut product, &input, &currency)?;
        product.stock = Quantity::new(input.stock);
        if input.publish && !product.is_active() { product.publish()?; }
        self.persist(&mut product).await?;
        info!(product_id = %id, "product updated");
        Ok(product)
    }

    /// Adds (positive) or removes (negative) units; stock never goes below zero.
    #[tracing::instrument(skip(self, actor))]
    pub async fn adjust_stock(&self, actor: &Actor, id: Uuid, delta: i64) -> Result<Product> {
        let mut product = self.managed_product(actor, id).await?;
        let amount = u32::try_from(delta.unsigned_abs()).map_err(|_| EcommerceError::validation("stock change is too large"))?;
        if delta >= 0 { product.add_inventory(amount) } else { product.remove_inventory(amount)? }
        self.persist(&mut product).await?;
        info!(product_id = %id, delta, stock = product.stock.value(), "stock adjusted");
        Ok(product)
    }

    pub async fn publish_product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        let mut product = self.managed_product(actor, id).await?;
        product.publish()?;
        self.persist(&mut product).await?;
        info!(product_id = %id, "product published");
        Ok(product)
    }

    /// Products are archived rather than deleted so past orders keep their references.
    pub async fn archive_product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        let mut product = self.managed_product(actor, id).await?;
        product.archive();
        self.persist(&mut product).await?;
        info!(product_id = %id, "product archived");
        Ok(product)
    }

    async fn persist(&self, product: &mut Product) -> Result<()> {
        self.ctx.stores.products.save(product).await?;
        self.ctx.caches.products.remove(&product.id);
        self.ctx.events.publish(product.take_events()).await;
        Ok(())
    }

    async fn query_products(&self, filter: ListFilter, include_inactive: bool) -> Result<ProductPage> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let query = ProductQuery {
            category_id: filter.category_id,
            vendor_id: filter.vendor_id,
            search: filter.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            include_inactive,
            page,
            per_page,
        };
        let (data, total) = self.ctx.stores.products.list(&query).await?;
        Ok(ProductPage { data, total, page, per_page })
    }

    async fn load_product(&self, id: Uuid) -> Result<Product> {
        self.ctx.stores.products.get(id).await?.ok_or_else(|| EcommerceError::not_found("Product"))
    }

    async fn check_vendor(&self, vendor_id: Uuid) -> Result<()> {
        match self.ctx.stores.users.get(vendor_id).await? {
            Some(user) if user.is_vendor() && user.active => Ok(()),
            _ => Err(EcommerceError::validation("vendor_id must reference an active vendor")),
        }
    }

    async fn check_category(&self, category_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = category_id {
            self.get_category(id).await?;
        }
        Ok(())
    }

    async fn check_parent(&self, id: Option<Uuid>, parent_id: Option<Uuid>) -> Result<()> {
        let Some(mut cursor) = parent_id else { return Ok(()) };
        loop {
            if Some(cursor) == id { return Err(EcommerceError::validation("a category cannot be its own ancestor")); }
            match self.get_category(cursor).await?.parent_id {
                Some(next) => cursor = next,
                None => return Ok(()),
            }
        }
    }
}

fn apply_details(product: &mut Product, input: &ProductInput, currency: &str) -> Result<()> {
    if input.shipping_cost < Decimal::ZERO {
        return Err(EcommerceError::validation("shipping cost cannot be negative"));
    }
    if input.compare_at_price.is_some_and(|p| p < input.price) {
        return Err(EcommerceError::validation("compare-at price must not be below the price"));
    }
    product.category_id = input.category_id;
    product.description = input.description.trim().to_string();
    product.compare_at_price = input.compare_at_price.map(|p| Money::new(p, currency));
    product.shipping_cost = Money::new(input.shipping_cost, currency);
    product.images = input.images.clone();
    if product.status == ProductStatus::Active && (product.price.is_zero() || product.name.is_empty()) {
        product.status = ProductStatus::Draft;
    }
    Ok(())
}
