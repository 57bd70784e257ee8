//! Infrastructure layer: configuration, persistence and seed data.

pub mod config;
pub mod db;
pub mod seed;
pub mod store;

pub use config::{AppConfig, ConfigError, StoreBackend};
pub use seed::seed_demo_data;
pub use store::{
    InMemoryStore, MovementFilter, Page, Pagination, PostgresStore, ProductFilter,
    ProductRepository, StockLedger, Store, StoreError, StoreResult, UserCredentials, UserFilter,
    UserRepository,
};
