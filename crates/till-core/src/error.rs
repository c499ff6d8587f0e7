//! Error types for `till-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown source type: {0:?}")]
  UnknownSourceType(String),

  #[error("unknown job status: {0:?}")]
  UnknownJobStatus(String),

  #[error("unknown anomaly severity: {0:?}")]
  UnknownSeverity(String),

  /// A money or count calculation left the representable range.
  #[error("arithmetic overflow computing {0}")]
  Overflow(&'static str),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
