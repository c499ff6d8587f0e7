//! CSV field mapping and row validation for Till imports.
//!
//! A [`RowReader`] turns the bytes of an export into [`ParsedRow`]s: each row
//! is mapped from raw headers to logical fields by a [`FieldMapper`], then
//! resolved against the source type's field schema into either a typed
//! [`SourceRecord`] or a list of validation messages.
//!
//! This crate performs no I/O beyond reading the supplied input and knows
//! nothing about storage.

pub mod error;
pub mod field;
pub mod formats;
pub mod mapper;
pub mod reader;
pub mod record;

pub use error::{Error, Result};
pub use mapper::{FieldMapper, default_column_map, default_mappings};
pub use reader::{ParsedRow, RowOutcome, RowReader, classify};
pub use record::{InventoryRow, LaborRow, SalesRow, SourceRecord};
