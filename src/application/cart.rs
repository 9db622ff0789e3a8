//! Cart use cases for anonymous sessions and signed-in customers.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::Context;
use crate::domain::aggregates::{Cart, CartError, CartItem, CartOwner, CartSummary, Product};
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct CartService {
    ctx: Context,
}

impl CartService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// The owner's cart, or a fresh empty one (not persisted until it changes).
    pub async fn load(&self, owner: &CartOwner) -> Result<Cart> {
        Ok(self.ctx.stores.carts.get(owner).await?.unwrap_or_else(|| Cart::new(owner.clone(), &self.ctx.config.currency)))
    }

    pub async fn summary(&self, owner: &CartOwner) -> Result<CartSummary> {
        Ok(self.load(owner).await?.summary())
    }

    #[tracing::instrument(skip(self))]
    pub async fn add(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> Result<CartSummary> {
        let product = self.purchasable(product_id).await?;
        let mut cart = self.load(owner).await?;
        let item = CartItem {
            product_id,
            vendor_id: product.vendor_id,
            name: product.name.clone(),
            sku: product.sku.to_string(),
            quantity,
            unit_price: product.price.clone(),
            shipping_cost: product.shipping_cost.clone(),
        };
        cart.add_item(item, product.stock.value())?;
        self.ctx.stores.carts.save(&cart).await?;
        info!(owner = %owner, %product_id, quantity, "item added to cart");
        Ok(cart.summary())
    }

    /// Quantity 0 removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> Result<CartSummary> {
        let mut cart = self.load(owner).await?;
        let available = if quantity == 0 { 0 } else { self.purchasable(product_id).await?.stock.value() };
        cart.update_quantity(product_id, quantity, available)?;
        self.ctx.stores.carts.save(&cart).await?;
        Ok(cart.summary())
    }

    pub async fn remove(&self, owner: &CartOwner, product_id: Uuid) -> Result<CartSummary> {
        let mut cart = self.load(owner).await?;
        cart.remove_item(product_id)?;
        self.ctx.stores.carts.save(&cart).await?;
        Ok(cart.summary())
    }

    pub async fn clear(&self, owner: &CartOwner) -> Result<()> {
        self.ctx.stores.carts.delete(owner).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, owner: &CartOwner, code: &str) -> Result<CartSummary> {
        let promotion = self.ctx.stores.promotions.find_by_code(code).await?
            .ok_or_else(|| EcommerceError::not_found("Coupon"))?;
        let mut cart = self.load(owner).await?;
        if cart.is_empty() { return Err(EcommerceError::validation("cart is empty")); }
        let discount = cart.apply_coupon(promotion, Utc::now()).map_err(|e| {
            warn!(owner = %owner, code, error = %e, "coupon refused");
            e
        })?;
        self.ctx.stores.carts.save(&cart).await?;
        info!(owner = %owner, code, %discount, "coupon applied");
        Ok(cart.summary())
    }

    pub async fn remove_coupon(&self, owner: &CartOwner) -> Result<CartSummary> {
        let mut cart = self.load(owner).await?;
        if cart.remove_coupon().is_some() {
            self.ctx.stores.carts.save(&cart).await?;
        }
        Ok(cart.summary())
    }

    /// Folds an anonymous cart into the user's, clamping quantities to current stock.
    /// The anonymous cart is deleted. Returns the products that were clamped.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, anonymous: CartOwner, user_id: Uuid) -> Result<Vec<Uuid>> {
        let Some(guest) = self.ctx.stores.carts.get(&anonymous).await? else { return Ok(vec![]) };
        let owner = CartOwner::User(user_id);
        let mut cart = self.load(&owner).await?;

        let ids: Vec<Uuid> = guest.items().iter().map(|i| i.product_id).collect();
        let stock: HashMap<Uuid, u32> = self.ctx.stores.products.get_many(&ids).await?
            .into_iter()
            .map(|p| (p.id, if p.is_active() { p.stock.value() } else { 0 }))
            .collect();
        let clamped = cart.merge(guest, |id| stock.get(&id).copied().unwrap_or(0));

        self.ctx.stores.carts.save(&cart).await?;
        self.ctx.stores.carts.delete(&anonymous).await?;
        if !clamped.is_empty() {
            warn!(%user_id, clamped = clamped.len(), "cart merge reduced quantities to stock");
        }
        info!(%user_id, items = cart.item_count(), "anonymous cart merged");
        Ok(clamped)
    }

    async fn purchasable(&self, product_id: Uuid) -> Result<Product> {
        let product = self.ctx.stores.products.get(product_id).await?.ok_or_else(|| EcommerceError::not_found("Product"))?;
        if !product.is_active() { return Err(CartError::ProductUnavailable.into()); }
        Ok(product)
    }
}
