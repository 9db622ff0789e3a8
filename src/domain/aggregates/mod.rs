//! Aggregates module
pub mod bank_account;
pub mod cart;
pub mod category;
pub mod commission;
pub mod devolution;
pub mod order;
pub mod payment_proof;
pub mod product;
pub mod promotion;
pub mod settlement;
pub mod user;

pub use bank_account::{AccountOwner, BankAccount};
pub use cart::{Cart, CartError, CartItem, CartOwner, CartSummary, VendorShipping};
pub use category::Category;
pub use commission::{CommissionEntry, CommissionError, CommissionRule, CommissionScope, EntryKind, EntryStatus, RateTable};
pub use devolution::{ReturnError, ReturnRequest, ReturnStatus};
pub use order::{Address, LineItem, Order, OrderError, OrderStatus, PaymentRouting, PaymentStatus};
pub use payment_proof::{PaymentProof, ProofStatus};
pub use product::{Product, ProductError, ProductStatus};
pub use promotion::{DiscountKind, Promotion, PromotionError};
pub use settlement::{Settlement, SettlementDirection, SettlementError, SettlementStatus};
pub use user::{Role, User};
