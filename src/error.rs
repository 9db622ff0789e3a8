use thiserror::Error;

use crate::domain::aggregates::{
    CartError, CommissionError, OrderError, ProductError, PromotionError, ReturnError, SettlementError,
};
use crate::domain::value_objects::{MoneyError, SkuError};

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Insufficient stock for {product}: {available} available")]
    InsufficientStock { product: String, available: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Return(#[from] ReturnError),

    #[error(transparent)]
    Commission(#[from] CommissionError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("Invalid SKU: {0}")]
    Sku(#[from] SkuError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EcommerceError {
    pub fn not_found(entity: &'static str) -> Self { Self::NotFound { entity } }
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }
    pub fn forbidden(message: impl Into<String>) -> Self { Self::Forbidden(message.into()) }
    pub fn storage(message: impl ToString) -> Self { Self::Storage(message.to_string()) }
    /// A guarded write found the record in a different state than the caller read.
    pub fn stale(entity: &'static str) -> Self { Self::Conflict(format!("{entity} was changed by another request")) }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::not_found("Record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
            other => Self::storage(other),
        }
    }
}

impl From<serde_json::Error> for EcommerceError {
    fn from(e: serde_json::Error) -> Self { Self::storage(e) }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
