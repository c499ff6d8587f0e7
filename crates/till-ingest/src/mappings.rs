//! Mapping profile management.

use std::collections::BTreeMap;

use till_core::{
  SourceType,
  mapping::{MappingProfile, NewMappingProfile},
  store::FinanceStore,
};
use tracing::info;
use uuid::Uuid;

use crate::{IngestError, Result, pipeline::Ingestor};

/// Reject profiles that could never map a row.
pub fn validate_mapping(input: &NewMappingProfile) -> Result<()> {
  if input.name.trim().is_empty() {
    return Err(IngestError::InvalidMapping("name must not be empty".into()));
  }
  if input.column_map.is_empty() {
    return Err(IngestError::InvalidMapping("column map must not be empty".into()));
  }
  if let Some((header, _)) = input
    .column_map
    .iter()
    .find(|(header, field)| header.trim().is_empty() || field.trim().is_empty())
  {
    return Err(IngestError::InvalidMapping(format!(
      "column map entry {header:?} has an empty header or field"
    )));
  }
  Ok(())
}

impl<S: FinanceStore> Ingestor<S> {
  pub async fn create_mapping(&self, mut input: NewMappingProfile) -> Result<MappingProfile> {
    validate_mapping(&input)?;
    input.name = input.name.trim().to_owned();

    let profile = self
      .store
      .create_mapping(input)
      .await
      .map_err(IngestError::store)?;
    info!(
      mapping_id = %profile.mapping_id,
      source_type = %profile.source_type,
      name = %profile.name,
      "mapping profile created"
    );
    Ok(profile)
  }

  pub async fn get_mapping(&self, mapping_id: Uuid) -> Result<MappingProfile> {
    self
      .store
      .get_mapping(mapping_id)
      .await
      .map_err(IngestError::store)?
      .ok_or(IngestError::MappingNotFound(mapping_id))
  }

  pub async fn list_mappings(
    &self,
    location_id: Uuid,
    source_type: Option<SourceType>,
  ) -> Result<Vec<MappingProfile>> {
    self
      .store
      .list_mappings(location_id, source_type)
      .await
      .map_err(IngestError::store)
  }

  /// Jobs that reference the profile keep the id; processing them later
  /// fails with [`IngestError::MappingNotFound`].
  pub async fn delete_mapping(&self, mapping_id: Uuid) -> Result<()> {
    let deleted = self
      .store
      .delete_mapping(mapping_id)
      .await
      .map_err(IngestError::store)?;
    if !deleted {
      return Err(IngestError::MappingNotFound(mapping_id));
    }
    info!(%mapping_id, "mapping profile deleted");
    Ok(())
  }

  /// The built-in column maps used when an import names no profile.
  pub fn default_mappings(&self) -> BTreeMap<SourceType, BTreeMap<String, String>> {
    till_csv::default_mappings()
  }
}
