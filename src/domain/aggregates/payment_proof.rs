//! Bank-deposit proof submitted by a customer. The metadata travels as a JSON
//! sidecar next to the uploaded file.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("application/pdf", "pdf"),
];

/// File extension for an accepted content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES.iter().find(|(ct, _)| ct.eq_ignore_ascii_case(content_type)).map(|(_, ext)| *ext)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus { #[default] Pending, Accepted, Rejected }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub bank_account_id: Uuid,
    pub operation_number: String,
    pub amount: Money,
    pub deposited_on: NaiveDate,
    /// Stored file name, `<id>.<ext>`.
    pub file_name: String,
    pub original_name: Option<String>,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub status: ProofStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
}

impl PaymentProof {
    pub fn is_pending(&self) -> bool { self.status == ProofStatus::Pending }

    /// Whether the deposited amount covers `total`.
    pub fn covers(&self, total: &Money) -> bool {
        self.amount.currency() == total.currency() && self.amount.amount() >= total.amount()
    }

    pub fn review(&mut self, reviewer: Uuid, accepted: bool, note: Option<String>) {
        self.status = if accepted { ProofStatus::Accepted } else { ProofStatus::Rejected };
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(Utc::now());
        self.review_note = note;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("IMAGE/PNG"), Some("png"));
        assert_eq!(extension_for("image/gif"), None);
    }
}
