//! Error type for `till-ingest`.

use thiserror::Error;
use till_core::{SourceType, job::ImportJob};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
  /// The same bytes were already imported successfully for this location.
  #[error("file was already imported by job {}", existing.job_id)]
  Duplicate { existing: Box<ImportJob> },

  #[error("import job not found: {0}")]
  JobNotFound(Uuid),

  #[error("mapping profile not found: {0}")]
  MappingNotFound(Uuid),

  #[error("mapping profile {mapping_id} is for {found} files, not {expected}")]
  MappingSourceMismatch {
    mapping_id: Uuid,
    found:      SourceType,
    expected:   SourceType,
  },

  #[error("invalid mapping profile: {0}")]
  InvalidMapping(String),

  #[error("import queue is closed")]
  QueueClosed,

  #[error(transparent)]
  Csv(#[from] till_csv::Error),

  #[error(transparent)]
  Core(#[from] till_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IngestError {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Problems with the file or its mapping rather than with the system;
  /// these fail the job instead of aborting the caller.
  pub fn is_structural(&self) -> bool {
    matches!(
      self,
      Self::Csv(_) | Self::MappingNotFound(_) | Self::MappingSourceMismatch { .. }
    )
  }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
