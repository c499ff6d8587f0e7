//! Field mapper: raw header → logical field resolution.

use std::collections::BTreeMap;

use strum::IntoEnumIterator as _;
use till_core::{SourceType, mapping::MappingProfile};

const SALES_COLUMNS: &[(&str, &str)] = &[
  ("Date", "date"),
  ("Time", "time"),
  ("Total", "total"),
  ("Subtotal", "subtotal"),
  ("Tax", "tax"),
  ("Discounts", "discounts"),
  ("Comps", "comps"),
  ("Payment Method", "payment_method"),
  ("Channel", "channel"),
  ("Server", "server"),
  ("Transaction ID", "transaction_id"),
  ("Covers", "covers"),
];

const LABOR_COLUMNS: &[(&str, &str)] = &[
  ("Period Start", "period_start"),
  ("Period End", "period_end"),
  ("Employee", "employee_name"),
  ("Hours Worked", "hours_worked"),
  ("Hourly Rate", "hourly_rate"),
  ("Total Wages", "total_wages"),
  ("Super", "superannuation"),
  ("Tax Withheld", "tax_withheld"),
];

const INVENTORY_COLUMNS: &[(&str, &str)] = &[
  ("Snapshot Date", "snapshot_date"),
  ("Item Name", "item_name"),
  ("Category", "category"),
  ("Quantity", "quantity"),
  ("Unit", "unit"),
  ("Unit Cost", "unit_cost"),
  ("Total Value", "total_value"),
];

/// The built-in header → field map used when an import names no profile.
pub fn default_column_map(source_type: SourceType) -> &'static [(&'static str, &'static str)] {
  match source_type {
    SourceType::Sales => SALES_COLUMNS,
    SourceType::Labor => LABOR_COLUMNS,
    SourceType::Inventory => INVENTORY_COLUMNS,
  }
}

/// Built-in maps for every source type, for display next to saved profiles.
pub fn default_mappings() -> BTreeMap<SourceType, BTreeMap<String, String>> {
  SourceType::iter()
    .map(|source| {
      let columns = default_column_map(source)
        .iter()
        .map(|(header, field)| ((*header).to_owned(), (*field).to_owned()))
        .collect();
      (source, columns)
    })
    .collect()
}

/// Resolves logical fields for one source type. Never fails: a required
/// field that cannot be found is reported later, by validation.
#[derive(Debug, Clone)]
pub struct FieldMapper {
  source_type: SourceType,
  column_map:  BTreeMap<String, String>,
  defaults:    BTreeMap<String, String>,
}

impl FieldMapper {
  /// Use `profile` when given, otherwise the built-in map for `source_type`.
  pub fn new(source_type: SourceType, profile: Option<&MappingProfile>) -> Self {
    match profile {
      Some(profile) => Self {
        source_type,
        column_map: profile
          .column_map
          .iter()
          .map(|(header, field)| (header.trim().to_owned(), field.trim().to_owned()))
          .collect(),
        defaults: profile.defaults.clone(),
      },
      None => Self {
        source_type,
        column_map: default_column_map(source_type)
          .iter()
          .map(|(header, field)| ((*header).to_owned(), (*field).to_owned()))
          .collect(),
        defaults: BTreeMap::new(),
      },
    }
  }

  pub fn source_type(&self) -> SourceType { self.source_type }

  /// Map a raw row (header → value) to logical fields (field → value).
  ///
  /// Only non-empty cells are mapped. Fields still absent afterwards take the
  /// profile's default value, if it has one.
  pub fn map(&self, raw: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut mapped = BTreeMap::new();

    for (header, field) in &self.column_map {
      if let Some(value) = raw.get(header)
        && !value.is_empty()
      {
        mapped.insert(field.clone(), value.clone());
      }
    }

    for (field, value) in &self.defaults {
      mapped
        .entry(field.clone())
        .or_insert_with(|| value.clone());
    }

    mapped
  }
}
