//! Local filesystem storage for deposit proofs.
//!
//! Layout: `<root>/<order_id>/<proof_id>.<ext>` with the metadata in
//! `<root>/<order_id>/<proof_id>.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::aggregates::PaymentProof;
use crate::domain::ports::ProofStorage;
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct LocalProofStorage {
    root: PathBuf,
}

impl LocalProofStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn order_dir(&self, order_id: Uuid) -> PathBuf {
        self.root.join(order_id.to_string())
    }

    fn sidecar_path(&self, order_id: Uuid, proof_id: Uuid) -> PathBuf {
        self.order_dir(order_id).join(format!("{proof_id}.json"))
    }

    /// The stored name comes from our own metadata, but only its final component is used.
    fn file_path(&self, proof: &PaymentProof) -> Result<PathBuf> {
        let name = Path::new(&proof.file_name).file_name()
            .ok_or_else(|| EcommerceError::storage(format!("invalid stored file name '{}'", proof.file_name)))?;
        Ok(self.order_dir(proof.order_id).join(name))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProofStorage for LocalProofStorage {
    async fn store(&self, proof: &PaymentProof, bytes: &[u8]) -> Result<()> {
        let dir = self.order_dir(proof.order_id);
        fs::create_dir_all(&dir).await?;
        Self::write_atomic(&self.file_path(proof)?, bytes).await?;
        let json = serde_json::to_vec_pretty(proof)?;
        Self::write_atomic(&self.sidecar_path(proof.order_id, proof.id), &json).await?;
        tracing::debug!(order_id = %proof.order_id, proof_id = %proof.id, size = bytes.len(), "stored deposit proof");
        Ok(())
    }

    async fn update(&self, proof: &PaymentProof) -> Result<()> {
        let path = self.sidecar_path(proof.order_id, proof.id);
        if fs::metadata(&path).await.is_err() {
            return Err(EcommerceError::not_found("Payment proof"));
        }
        let json = serde_json::to_vec_pretty(proof)?;
        Self::write_atomic(&path, &json).await
    }

    async fn get(&self, order_id: Uuid, proof_id: Uuid) -> Result<Option<PaymentProof>> {
        match fs::read(self.sidecar_path(order_id, proof_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, order_id: Uuid) -> Result<Vec<PaymentProof>> {
        let mut dir = match fs::read_dir(self.order_dir(order_id)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut proofs = vec![];
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") { continue; }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<PaymentProof>(&bytes) {
                Ok(proof) => proofs.push(proof),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable proof sidecar"),
            }
        }
        proofs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(proofs)
    }

    async fn read_file(&self, proof: &PaymentProof) -> Result<Vec<u8>> {
        match fs::read(self.file_path(proof)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EcommerceError::not_found("Payment proof file")),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProofStatus;
    use crate::domain::value_objects::Money;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn proof(order_id: Uuid) -> PaymentProof {
        let id = Uuid::now_v7();
        PaymentProof {
            id, order_id, order_number: "V-1".into(), bank_account_id: Uuid::now_v7(), operation_number: "000123".into(),
            amount: Money::new(dec!(150), "PEN"), deposited_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            file_name: format!("{id}.png"), original_name: Some("voucher.png".into()), content_type: "image/png".into(),
            size_bytes: 4, uploaded_by: Uuid::now_v7(), uploaded_at: Utc::now(), status: ProofStatus::Pending,
            reviewed_by: None, reviewed_at: None, review_note: None,
        }
    }

    #[tokio::test]
    async fn test_store_writes_file_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalProofStorage::new(dir.path());
        let order_id = Uuid::now_v7();
        let p = proof(order_id);
        storage.store(&p, b"\x89PNG").await.unwrap();

        let sidecar = dir.path().join(order_id.to_string()).join(format!("{}.json", p.id));
        assert!(sidecar.exists());
        assert_eq!(storage.get(order_id, p.id).await.unwrap(), Some(p.clone()));
        assert_eq!(storage.read_file(&p).await.unwrap(), b"\x89PNG");
        assert_eq!(storage.list(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_rewrites_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalProofStorage::new(dir.path());
        let mut p = proof(Uuid::now_v7());
        storage.store(&p, b"data").await.unwrap();
        p.review(Uuid::now_v7(), false, Some("ilegible".into()));
        storage.update(&p).await.unwrap();
        let stored = storage.get(p.order_id, p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProofStatus::Rejected);
        assert_eq!(stored.review_note.as_deref(), Some("ilegible"));
    }

    #[tokio::test]
    async fn test_list_unknown_order_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalProofStorage::new(dir.path());
        assert!(storage.list(Uuid::now_v7()).await.unwrap().is_empty());
    }
}
