//! Error types for the till-csv reader.
//!
//! Only file-level failures are errors. Problems with individual rows are
//! reported on the row itself and never abort a read.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("file has no header row")]
  MissingHeader,

  #[error("failed to read CSV headers: {0}")]
  Header(#[from] csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
