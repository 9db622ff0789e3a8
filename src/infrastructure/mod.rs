//! Adapters behind the domain ports.

pub mod cache;
pub mod events;
pub mod in_memory;
pub mod postgres;
pub mod proof_storage;

pub use cache::TtlCache;
pub use events::{LogPublisher, NatsPublisher};
pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use proof_storage::LocalProofStorage;
