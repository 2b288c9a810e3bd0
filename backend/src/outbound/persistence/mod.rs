//! PostgreSQL persistence adapters using Diesel.
//!
//! Row structs and table definitions stay private to this module; callers
//! only see [`DieselIdempotencyStore`] and the pool types.
//!
//! # Example
//!
//! ```ignore
//! use backend::outbound::persistence::{DbPool, DieselIdempotencyStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/fitlog")).await?;
//! let store = DieselIdempotencyStore::new(pool);
//! ```

mod diesel_idempotency_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_idempotency_store::DieselIdempotencyStore;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
