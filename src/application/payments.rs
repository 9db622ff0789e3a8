//! Bank-deposit proofs: customer upload and reviewer decision.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Actor, CommissionService, Context};
use crate::domain::aggregates::payment_proof::extension_for;
use crate::domain::aggregates::{AccountOwner, CommissionEntry, Order, OrderStatus, PaymentProof, PaymentRouting, ProofStatus};
use crate::domain::value_objects::Money;
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub bank_account_id: Uuid,
    pub operation_number: String,
    pub amount: Decimal,
    pub deposited_on: NaiveDate,
    pub original_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PaymentService {
    ctx: Context,
    commissions: CommissionService,
}

impl PaymentService {
    pub fn new(ctx: Context, commissions: CommissionService) -> Self { Self { ctx, commissions } }

    /// Stores the proof file with its JSON sidecar and moves the order to review.
    #[tracing::instrument(skip(self, actor, upload), fields(size = upload.bytes.len()))]
    pub async fn upload(&self, actor: &Actor, order_id: Uuid, upload: ProofUpload) -> Result<PaymentProof> {
        let mut order = self.load(order_id).await?;
        if order.customer_id() != actor.user_id {
            return Err(EcommerceError::not_found("Order"));
        }
        if order.status() != OrderStatus::PendingPayment {
            return Err(EcommerceError::Conflict(format!("Order is {} and does not accept a proof", order.status().as_str())));
        }

        let ext = extension_for(&upload.content_type)
            .ok_or_else(|| EcommerceError::validation("proof must be a JPEG, PNG or PDF file"))?;
        if upload.bytes.is_empty() {
            return Err(EcommerceError::validation("proof file is empty"));
        }
        if upload.bytes.len() > self.ctx.config.max_proof_bytes {
            warn!(size = upload.bytes.len(), limit = self.ctx.config.max_proof_bytes, "oversized proof refused");
            return Err(EcommerceError::validation(format!("proof file exceeds {} bytes", self.ctx.config.max_proof_bytes)));
        }
        let operation_number = upload.operation_number.trim().to_string();
        if operation_number.is_empty() {
            return Err(EcommerceError::validation("operation number is required"));
        }
        if upload.amount <= Decimal::ZERO {
            return Err(EcommerceError::validation("deposited amount must be positive"));
        }
        if upload.deposited_on > Utc::now().date_naive() {
            return Err(EcommerceError::validation("deposit date cannot be in the future"));
        }

        let account = self.ctx.stores.bank_accounts.get(upload.bank_account_id).await?
            .ok_or_else(|| EcommerceError::not_found("Bank account"))?;
        let expected_owner = AccountOwner::from_vendor(order.routing().vendor());
        if !account.active || account.owner != expected_owner {
            return Err(EcommerceError::validation("deposit must go to one of the accounts listed for this order"));
        }

        let id = Uuid::now_v7();
        let proof = PaymentProof {
            id,
            order_id,
            order_number: order.order_number().to_string(),
            bank_account_id: account.id,
            operation_number,
            amount: Money::new(upload.amount, order.currency()),
            deposited_on: upload.deposited_on,
            file_name: format!("{id}.{ext}"),
            original_name: upload.original_name,
            content_type: upload.content_type.to_lowercase(),
            size_bytes: upload.bytes.len() as u64,
            uploaded_by: actor.user_id,
            uploaded_at: Utc::now(),
            status: ProofStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
        };
        let previous = order.clone();
        order.submit_payment(id)?;
        // Claim the order before writing the file so two uploads cannot both land.
        self.ctx.stores.orders.save(&order, OrderStatus::PendingPayment).await?;
        if let Err(e) = self.ctx.proofs.store(&proof, &upload.bytes).await {
            warn!(%order_id, error = %e, "proof write failed, releasing order");
            self.ctx.stores.orders.save(&previous, OrderStatus::PaymentReview).await?;
            return Err(e);
        }
        self.ctx.events.publish(order.take_events()).await;
        info!(%order_id, proof_id = %id, amount = %proof.amount, "payment proof uploaded");
        Ok(proof)
    }

    pub async fn list(&self, actor: &Actor, order_id: Uuid) -> Result<Vec<PaymentProof>> {
        let order = self.load(order_id).await?;
        self.require_viewer(actor, &order)?;
        self.ctx.proofs.list(order_id).await
    }

    pub async fn download(&self, actor: &Actor, order_id: Uuid, proof_id: Uuid) -> Result<(PaymentProof, Vec<u8>)> {
        let order = self.load(order_id).await?;
        self.require_viewer(actor, &order)?;
        let proof = self.proof(order_id, proof_id).await?;
        let bytes = self.ctx.proofs.read_file(&proof).await?;
        Ok((proof, bytes))
    }

    /// Accepting needs the deposit to cover the order total; it marks the order paid and
    /// books one commission entry per vendor. Rejecting sends the order back to pending payment.
    #[tracing::instrument(skip(self, actor, note))]
    pub async fn review(&self, actor: &Actor, order_id: Uuid, proof_id: Uuid, accept: bool, note: Option<String>) -> Result<PaymentProof> {
        let mut order = self.load(order_id).await?;
        match order.routing() {
            PaymentRouting::Platform => actor.require_admin()?,
            PaymentRouting::DirectToVendor { vendor_id } => actor.require_vendor(vendor_id)?,
        }
        let mut proof = self.proof(order_id, proof_id).await?;
        if !proof.is_pending() {
            return Err(EcommerceError::Conflict("Proof was already reviewed".into()));
        }
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let expected = order.status();

        if accept {
            if !proof.covers(order.total()) {
                warn!(%order_id, deposited = %proof.amount, total = %order.total(), "short deposit");
                return Err(EcommerceError::validation(format!("deposit of {} does not cover the order total of {}", proof.amount, order.total())));
            }
            order.verify_payment()?;
            let entries = self.entries_for(&order).await?;
            self.ctx.stores.orders.record_payment(&order, expected, &entries).await?;
            info!(%order_id, entries = entries.len(), "payment verified");
        } else {
            let reason = note.clone().unwrap_or_else(|| "Deposit could not be verified".to_string());
            order.reject_payment(reason)?;
            self.ctx.stores.orders.save(&order, expected).await?;
            warn!(%order_id, %proof_id, "payment proof rejected");
        }

        proof.review(actor.user_id, accept, note);
        self.ctx.proofs.update(&proof).await?;
        self.ctx.events.publish(order.take_events()).await;
        Ok(proof)
    }

    async fn entries_for(&self, order: &Order) -> Result<Vec<CommissionEntry>> {
        let rates = self.commissions.rate_table().await?;
        let ids: Vec<Uuid> = order.items().iter().map(|i| i.product_id).collect();
        let categories: HashMap<Uuid, Option<Uuid>> = self.ctx.stores.products.get_many(&ids).await?
            .into_iter().map(|p| (p.id, p.category_id)).collect();
        Ok(CommissionEntry::for_paid_order(order, &rates, |product_id| categories.get(&product_id).copied().flatten()))
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.ctx.stores.orders.get(order_id).await?.ok_or_else(|| EcommerceError::not_found("Order"))
    }

    async fn proof(&self, order_id: Uuid, proof_id: Uuid) -> Result<PaymentProof> {
        self.ctx.proofs.get(order_id, proof_id).await?.ok_or_else(|| EcommerceError::not_found("Payment proof"))
    }

    fn require_viewer(&self, actor: &Actor, order: &Order) -> Result<()> {
        let allowed = actor.is_admin()
            || order.customer_id() == actor.user_id
            || order.routing().vendor() == Some(actor.user_id);
        if allowed { Ok(()) } else { Err(EcommerceError::not_found("Order")) }
    }
}
