//! Turns the signed-in customer's cart into an order awaiting a bank deposit.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{Actor, BankAccountService, Context};
use crate::domain::aggregates::order::generate_order_number;
use crate::domain::aggregates::{Address, BankAccount, Cart, CartError, CartOwner, Order, PaymentRouting};
use crate::error::{EcommerceError, Result};

const ORDER_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    /// Where the customer should deposit.
    pub bank_accounts: Vec<BankAccount>,
    /// Set when the cart's coupon could no longer be honoured.
    pub coupon_dropped: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    ctx: Context,
    bank_accounts: BankAccountService,
}

impl CheckoutService {
    pub fn new(ctx: Context, bank_accounts: BankAccountService) -> Self { Self { ctx, bank_accounts } }

    /// Paid straight to the vendor when the cart holds a single vendor with an active
    /// bank account; everything else goes through the platform.
    pub async fn decide_routing(&self, cart: &Cart) -> Result<PaymentRouting> {
        let vendors = cart.vendors();
        if let [vendor_id] = vendors.as_slice() {
            let routing = PaymentRouting::DirectToVendor { vendor_id: *vendor_id };
            if !self.bank_accounts.for_routing(routing).await?.is_empty() {
                return Ok(routing);
            }
        }
        Ok(PaymentRouting::Platform)
    }

    #[tracing::instrument(skip(self, actor, address, notes), fields(customer_id = %actor.user_id))]
    pub async fn checkout(&self, actor: &Actor, address: Address, notes: Option<String>) -> Result<CheckoutReceipt> {
        if address.recipient.trim().is_empty() || address.street.trim().is_empty() || address.city.trim().is_empty() {
            return Err(EcommerceError::validation("recipient, street and city are required"));
        }
        let owner = CartOwner::User(actor.user_id);
        let mut cart = self.ctx.stores.carts.get(&owner).await?.ok_or_else(|| EcommerceError::validation("cart is empty"))?;
        if cart.is_empty() { return Err(EcommerceError::validation("cart is empty")); }

        let ids: Vec<_> = cart.items().iter().map(|i| i.product_id).collect();
        let products = self.ctx.stores.products.get_many(&ids).await?;
        if products.len() != ids.len() || products.iter().any(|p| !p.is_active()) {
            return Err(CartError::ProductUnavailable.into());
        }

        let mut coupon_dropped = self.revalidate_coupon(&mut cart).await?;
        let routing = self.decide_routing(&cart).await?;

        // The coupon use is taken with the stock, so a coupon that ran out since it was
        // revalidated is dropped and the order placed without it.
        let mut collisions = 0;
        let mut order = loop {
            let mut order = Order::from_cart(generate_order_number(Utc::now()), actor.user_id, actor.email.clone(), &cart, address.clone(), routing)?;
            order.set_notes(notes.clone().filter(|n| !n.trim().is_empty()));
            match self.ctx.stores.orders.place(&order, &owner).await {
                Ok(()) => break order,
                Err(EcommerceError::Conflict(reason)) if collisions + 1 < ORDER_NUMBER_ATTEMPTS => {
                    collisions += 1;
                    warn!(%reason, attempt = collisions, "order number collision, retrying");
                }
                Err(EcommerceError::Promotion(reason)) if cart.coupon().is_some() => {
                    let code = cart.remove_coupon().map(|c| c.code);
                    warn!(code = ?code, %reason, "coupon ran out during checkout, dropped");
                    coupon_dropped = code;
                }
                Err(e) => {
                    warn!(error = %e, "checkout failed");
                    return Err(e);
                }
            }
        };

        for id in &ids { self.ctx.caches.products.remove(id); }
        self.ctx.events.publish(order.take_events()).await;
        let bank_accounts = self.bank_accounts.for_routing(routing).await?;
        info!(order_id = %order.id(), order_number = order.order_number(), total = %order.total(), ?routing, "order placed");
        Ok(CheckoutReceipt { order, bank_accounts, coupon_dropped })
    }

    /// Re-reads the coupon (usage counters move) and drops it when no longer valid.
    async fn revalidate_coupon(&self, cart: &mut Cart) -> Result<Option<String>> {
        let Some(code) = cart.coupon().map(|c| c.code.clone()) else { return Ok(None) };
        let fresh = self.ctx.stores.promotions.find_by_code(&code).await?;
        let outcome = match fresh {
            Some(promotion) => cart.apply_coupon(promotion, Utc::now()).map(|_| ()).map_err(|e| e.to_string()),
            None => Err("coupon no longer exists".to_string()),
        };
        match outcome {
            Ok(()) => Ok(None),
            Err(reason) => {
                warn!(%code, %reason, "coupon dropped at checkout");
                cart.remove_coupon();
                Ok(Some(code))
            }
        }
    }
}
