pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod mutation;
pub mod paging;
pub mod repo;
pub mod service;

// Re-export commonly used items for tests / external users
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use repo::CardStore;
pub use service::CardService;
