//! Bank accounts that receive deposits: the platform's and each vendor's.

use tracing::info;
use uuid::Uuid;

use super::{Actor, Context};
use crate::domain::aggregates::bank_account::strip_separators;
use crate::domain::aggregates::{AccountOwner, BankAccount, PaymentRouting};
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct BankAccountInput {
    /// Present to update an existing account.
    pub id: Option<Uuid>,
    /// `None` is a platform account. Ignored for vendors, who always own theirs.
    pub vendor_id: Option<Uuid>,
    pub bank_name: String,
    pub holder_name: String,
    pub account_number: String,
    pub cci: Option<String>,
    pub currency: Option<String>,
    pub active: bool,
}

#[derive(Clone)]
pub struct BankAccountService {
    ctx: Context,
}

impl BankAccountService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Admins see every account; vendors their own.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<BankAccount>> {
        actor.require_vendor_or_admin()?;
        let owner = if actor.is_vendor() { Some(AccountOwner::Vendor { vendor_id: actor.user_id }) } else { None };
        self.ctx.stores.bank_accounts.list(owner, false).await
    }

    /// Active accounts a customer may deposit into for the given routing.
    pub async fn for_routing(&self, routing: PaymentRouting) -> Result<Vec<BankAccount>> {
        let owner = AccountOwner::from_vendor(routing.vendor());
        self.ctx.stores.bank_accounts.list(Some(owner), true).await
    }

    /// Creates or updates an account.
    #[tracing::instrument(skip(self, actor, input))]
    pub async fn save(&self, actor: &Actor, input: BankAccountInput) -> Result<BankAccount> {
        actor.require_vendor_or_admin()?;
        let owner = if actor.is_admin() { AccountOwner::from_vendor(input.vendor_id) } else { AccountOwner::Vendor { vendor_id: actor.user_id } };
        if let AccountOwner::Vendor { vendor_id } = owner {
            match self.ctx.stores.users.get(vendor_id).await? {
                Some(user) if user.is_vendor() => {}
                _ => return Err(EcommerceError::validation("vendor_id must reference a vendor")),
            }
        }

        let number = strip_separators(&input.account_number);
        if !(6..=20).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(EcommerceError::validation("account number must have 6 to 20 digits"));
        }
        let cci = input.cci.as_deref().map(strip_separators).filter(|c| !c.is_empty());
        if cci.as_ref().is_some_and(|c| c.len() != 20 || !c.chars().all(|ch| ch.is_ascii_digit())) {
            return Err(EcommerceError::validation("CCI must have 20 digits"));
        }
        if input.bank_name.trim().is_empty() || input.holder_name.trim().is_empty() {
            return Err(EcommerceError::validation("bank and holder names are required"));
        }
        let currency = input.currency.unwrap_or_else(|| self.ctx.config.currency.clone());

        let mut account = match input.id {
            Some(id) => {
                let existing = self.get(actor, id).await?;
                BankAccount { id: existing.id, created_at: existing.created_at, ..BankAccount::new(owner, &input.bank_name, &input.holder_name, &number, &currency) }
            }
            None => BankAccount::new(owner, &input.bank_name, &input.holder_name, &number, &currency),
        };
        account.cci = cci;
        account.active = input.active;
        self.ctx.stores.bank_accounts.save(&account).await?;
        info!(account_id = %account.id, number = %account.masked_number(), "bank account saved");
        Ok(account)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<BankAccount> {
        actor.require_vendor_or_admin()?;
        let account = self.ctx.stores.bank_accounts.get(id).await?.ok_or_else(|| EcommerceError::not_found("Bank account"))?;
        match account.owner {
            AccountOwner::Platform => actor.require_admin()?,
            AccountOwner::Vendor { vendor_id } => actor.require_vendor(vendor_id)?,
        }
        Ok(account)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
        self.get(actor, id).await?;
        self.ctx.stores.bank_accounts.delete(id).await?;
        info!(account_id = %id, "bank account deleted");
        Ok(())
    }
}
