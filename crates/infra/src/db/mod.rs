//! Postgres wiring: pool construction and schema migrations.

pub mod connection;
pub mod migrations;

pub use connection::{connect, health_check};
pub use migrations::run_migrations;
