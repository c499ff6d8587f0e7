//! Import jobs and the anomalies recorded against them.
//!
//! A job is the audit record of one ingestion attempt. It is created in
//! `pending`, claimed into `processing` by exactly one worker, and ends in
//! `completed` or `failed`. Jobs are never deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, SourceType};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of an [`ImportJob`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl JobStatus {
  /// `completed` and `failed` are final; nothing transitions out of them.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Completed | Self::Failed)
  }
}

// ─── Job ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
  pub job_id:         Uuid,
  pub source_type:    SourceType,
  pub status:         JobStatus,
  pub file_name:      String,
  /// Lowercase hex SHA-256 of the uploaded bytes.
  pub file_hash:      String,
  pub total_rows:     u64,
  pub processed_rows: u64,
  pub error_rows:     u64,
  pub location_id:    Uuid,
  pub mapping_id:     Option<Uuid>,
  pub created_by:     Uuid,
  pub created_at:     DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
  pub error_message:  Option<String>,
}

impl ImportJob {
  /// The short hash prefix used to derive per-row source identifiers.
  pub fn hash_prefix(&self) -> &str {
    let end = self.file_hash.len().min(8);
    &self.file_hash[..end]
  }
}

/// Input to [`crate::store::FinanceStore::create_job`]. Identity, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewImportJob {
  pub source_type: SourceType,
  pub file_name:   String,
  pub file_hash:   String,
  pub location_id: Uuid,
  pub mapping_id:  Option<Uuid>,
  pub created_by:  Uuid,
}

/// Row counters carried by a job while and after it is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
  pub total:     u64,
  pub processed: u64,
  pub errors:    u64,
}

impl RowCounts {
  /// Every row is accounted for exactly once.
  pub fn is_balanced(&self) -> bool {
    self.processed + self.errors == self.total
  }
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
}

/// A recorded defect in one input row. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportAnomaly {
  pub anomaly_id:  Uuid,
  pub job_id:      Uuid,
  pub line_number: u64,
  pub severity:    Severity,
  pub message:     String,
  /// JSON object of header → raw cell value, when the row could be read.
  pub raw_data:    Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnomaly {
  pub job_id:      Uuid,
  pub line_number: u64,
  pub severity:    Severity,
  pub message:     String,
  pub raw_data:    Option<String>,
}

impl NewAnomaly {
  pub fn error(job_id: Uuid, line_number: u64, message: impl Into<String>) -> Self {
    Self {
      job_id,
      line_number,
      severity: Severity::Error,
      message: message.into(),
      raw_data: None,
    }
  }

  /// Attach the raw row as a JSON object. An empty row attaches nothing.
  pub fn with_raw(mut self, raw: &BTreeMap<String, String>) -> Result<Self> {
    if !raw.is_empty() {
      self.raw_data = Some(serde_json::to_string(raw)?);
    }
    Ok(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_states() {
    assert!(!JobStatus::Pending.is_terminal());
    assert!(!JobStatus::Processing.is_terminal());
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
  }

  #[test]
  fn status_round_trips_through_strings() {
    assert_eq!(JobStatus::Processing.as_ref(), "processing");
    assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
    assert!("done".parse::<JobStatus>().is_err());
  }

  #[test]
  fn raw_row_is_serialised_as_json_object() {
    let mut raw = BTreeMap::new();
    raw.insert("Date".to_owned(), "2024-03-01".to_owned());
    raw.insert("Total".to_owned(), "abc".to_owned());

    let anomaly = NewAnomaly::error(Uuid::nil(), 3, "bad")
      .with_raw(&raw)
      .unwrap();
    let value: serde_json::Value =
      serde_json::from_str(anomaly.raw_data.as_deref().unwrap()).unwrap();
    assert_eq!(value["Total"], "abc");
  }

  #[test]
  fn balanced_counts() {
    let counts = RowCounts { total: 24, processed: 22, errors: 2 };
    assert!(counts.is_balanced());
    assert!(!RowCounts { total: 3, processed: 1, errors: 1 }.is_balanced());
  }
}
