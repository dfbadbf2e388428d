//! Persistence layer for durable task processing
//!
//! This module provides:
//! - [`TaskQueue`] trait for at-least-once job delivery with leases
//! - [`StatusStore`] trait for task records with non-regressing upserts
//! - [`InMemoryStore`] implementing both, for tests and database-less runs
//! - [`PostgresStore`] implementing both, for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{ClaimedJob, StatusStore, StoreError, TaskQueue};
