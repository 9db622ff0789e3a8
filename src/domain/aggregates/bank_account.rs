//! Bank account (CuentaBancaria) Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountOwner {
    Platform,
    Vendor { vendor_id: Uuid },
}

impl AccountOwner {
    pub fn vendor(&self) -> Option<Uuid> {
        match self { Self::Platform => None, Self::Vendor { vendor_id } => Some(*vendor_id) }
    }

    pub fn from_vendor(vendor_id: Option<Uuid>) -> Self {
        vendor_id.map_or(Self::Platform, |vendor_id| Self::Vendor { vendor_id })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub owner: AccountOwner,
    pub bank_name: String,
    pub holder_name: String,
    pub account_number: String,
    /// Interbank account code.
    pub cci: Option<String>,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn new(owner: AccountOwner, bank_name: &str, holder_name: &str, account_number: &str, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), owner, bank_name: bank_name.trim().to_string(), holder_name: holder_name.trim().to_string(),
            account_number: strip_separators(account_number), cci: None, currency: currency.to_uppercase(), active: true,
            created_at: now, updated_at: now,
        }
    }

    /// Last four digits, for receipts and logs.
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self.account_number.chars().collect();
        let visible: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("****{visible}")
    }
}

/// Drops spaces and dashes people type into account numbers.
pub fn strip_separators(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}
