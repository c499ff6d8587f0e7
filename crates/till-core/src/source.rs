//! Source types: the fixed set of export schemas the pipeline understands.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The kind of export a file contains. Each source type has its own logical
/// fields, validation rules, and domain upserter.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceType {
  /// Point-of-sale transactions.
  #[serde(alias = "pos")]
  Sales,
  /// Payroll periods.
  #[serde(alias = "payroll")]
  Labor,
  /// Stock-take snapshots.
  Inventory,
}

impl FromStr for SourceType {
  type Err = Error;

  /// Accepts the canonical names plus the `pos` / `payroll` spellings used by
  /// older exports.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "sales" | "pos" => Ok(Self::Sales),
      "labor" | "labour" | "payroll" => Ok(Self::Labor),
      "inventory" => Ok(Self::Inventory),
      other => Err(Error::UnknownSourceType(other.to_owned())),
    }
  }
}
