//! Mapping profiles: saved translations from a source system's column
//! headers to the pipeline's logical field names.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SourceType;

/// A named, source-type-scoped column mapping. Independent of any job, so
/// one profile serves every export from the same source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingProfile {
  pub mapping_id:  Uuid,
  pub name:        String,
  pub source_type: SourceType,
  pub location_id: Uuid,
  /// Raw column header → logical field name.
  pub column_map:  BTreeMap<String, String>,
  /// Logical field name → value used when a file lacks that field.
  pub defaults:    BTreeMap<String, String>,
  pub created_by:  Uuid,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::FinanceStore::create_mapping`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMappingProfile {
  pub name:        String,
  pub source_type: SourceType,
  pub location_id: Uuid,
  pub column_map:  BTreeMap<String, String>,
  #[serde(default)]
  pub defaults:    BTreeMap<String, String>,
  pub created_by:  Uuid,
}
