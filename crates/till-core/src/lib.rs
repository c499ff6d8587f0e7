//! Core types and trait definitions for the Till ingestion pipeline.
//!
//! This crate is deliberately free of CSV, database, and runtime
//! dependencies. Every other crate depends on it.

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod job;
pub mod kpi;
pub mod ledger;
pub mod mapping;
pub mod source;
pub mod store;

pub use error::{Error, Result};
pub use source::SourceType;
