//! SQLite backend for the Till finance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The natural-key upserts are
//! `INSERT … ON CONFLICT … DO UPDATE` statements against the unique
//! constraints declared in the schema.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
