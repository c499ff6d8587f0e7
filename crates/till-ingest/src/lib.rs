//! CSV import pipeline, domain upserters and KPI aggregation for Till.
//!
//! Generic over any [`till_core::store::FinanceStore`]:
//!
//! - [`Ingestor`] accepts uploads and runs the import job state machine.
//! - [`upsert`] turns validated rows into natural-key upserts.
//! - [`AggregationEngine`] recomputes per-day KPI rows.
//! - [`WorkerPool`] drains queued jobs in the background.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Arc::new(SqliteStore::open("till.db").await?);
//! let ingestor = Ingestor::new(store.clone());
//! let job = ingestor.start_import(request).await?;
//! ingestor.process_stored(job.job_id).await?;
//! AggregationEngine::new(store).refresh_aggregates(job.location_id).await?;
//! ```

pub mod aggregate;
pub mod error;
pub mod mappings;
pub mod pipeline;
pub mod upsert;
pub mod worker;

pub use aggregate::{AggregationEngine, RefreshSummary};
pub use error::{IngestError, Result};
pub use pipeline::{Ingestor, JobDetail, ProcessOutcome, StartImport, content_hash};
pub use worker::{ImportQueue, WorkerPool, spawn_refresh_timer};

#[cfg(test)]
mod tests;
