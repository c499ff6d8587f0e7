//! Error type for `till-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] till_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored date, time or decimal column did not parse.
  #[error("column decode error: {0}")]
  Decode(String),

  /// A job transition was requested for a job that does not exist or has
  /// already reached a terminal state.
  #[error("job {0} does not exist or has already finished")]
  JobNotActive(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
