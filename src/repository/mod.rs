pub mod cache_repository;
pub mod database;
pub mod delta_repository;
pub mod ledger_repository;
pub mod models;

pub use cache_repository::CacheRepository;
pub use database::Database;
pub use delta_repository::DeltaRepository;
pub use ledger_repository::{LedgerRepository, LedgerStore};
pub use models::{AddressDelta, LedgerTransaction, Wallet};
