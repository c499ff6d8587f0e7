//! Logical field schemas and the typed values they resolve to.
//!
//! Every source type declares its logical fields once: name, value kind, and
//! whether the field is required. Mapped strings are resolved against that
//! schema exactly once, so downstream code only ever sees typed values.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use till_core::SourceType;

use crate::formats::{ParsedDate, parse_amount, parse_count, parse_date, parse_time};

// ─── Schema ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  Date,
  /// Parsed leniently: an unreadable time is dropped, not reported.
  Time,
  Amount,
  Count,
  Text,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
  pub name:     &'static str,
  pub kind:     FieldKind,
  pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
  FieldSpec { name, kind, required: true }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
  FieldSpec { name, kind, required: false }
}

const SALES_FIELDS: &[FieldSpec] = &[
  required("date", FieldKind::Date),
  required("total", FieldKind::Amount),
  optional("time", FieldKind::Time),
  optional("subtotal", FieldKind::Amount),
  optional("tax", FieldKind::Amount),
  optional("discounts", FieldKind::Amount),
  optional("comps", FieldKind::Amount),
  optional("covers", FieldKind::Count),
  optional("payment_method", FieldKind::Text),
  optional("channel", FieldKind::Text),
  optional("server", FieldKind::Text),
  optional("transaction_id", FieldKind::Text),
];

const LABOR_FIELDS: &[FieldSpec] = &[
  required("period_start", FieldKind::Date),
  required("period_end", FieldKind::Date),
  required("total_wages", FieldKind::Amount),
  optional("superannuation", FieldKind::Amount),
  optional("tax_withheld", FieldKind::Amount),
  optional("employee_name", FieldKind::Text),
];

const INVENTORY_FIELDS: &[FieldSpec] = &[
  required("snapshot_date", FieldKind::Date),
  required("item_name", FieldKind::Text),
  required("quantity", FieldKind::Amount),
  required("unit_cost", FieldKind::Amount),
  optional("category", FieldKind::Text),
  optional("unit", FieldKind::Text),
];

/// The logical fields of `source_type`, required fields first.
pub fn schema(source_type: SourceType) -> &'static [FieldSpec] {
  match source_type {
    SourceType::Sales => SALES_FIELDS,
    SourceType::Labor => LABOR_FIELDS,
    SourceType::Inventory => INVENTORY_FIELDS,
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A mapped cell resolved to the kind its logical field declares.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
  Date(ParsedDate),
  Time(NaiveTime),
  Amount(Decimal),
  Count(i64),
  Text(String),
}

impl FieldKind {
  fn resolve(self, raw: &str) -> Option<FieldValue> {
    match self {
      Self::Date => parse_date(raw).map(FieldValue::Date),
      Self::Time => parse_time(raw).map(FieldValue::Time),
      Self::Amount => parse_amount(raw).map(FieldValue::Amount),
      Self::Count => parse_count(raw).map(FieldValue::Count),
      Self::Text => Some(FieldValue::Text(raw.to_owned())),
    }
  }

  fn describe_failure(self, field: &str, raw: &str) -> Option<String> {
    match self {
      Self::Date => Some(format!("invalid date format for {field}: {raw}")),
      Self::Amount => Some(format!("invalid numeric value for {field}: {raw}")),
      Self::Count => Some(format!("invalid integer value for {field}: {raw}")),
      Self::Time | Self::Text => None,
    }
  }
}

/// Typed values of one row, keyed by logical field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedFields(BTreeMap<&'static str, FieldValue>);

impl TypedFields {
  /// Resolve mapped strings against the schema of `source_type`.
  ///
  /// Returns the values that resolved plus one message per missing required
  /// field and per unparseable value.
  pub fn resolve(
    source_type: SourceType,
    mapped: &BTreeMap<String, String>,
  ) -> (Self, Vec<String>) {
    let mut values = BTreeMap::new();
    let mut errors = Vec::new();

    for spec in schema(source_type) {
      let raw = mapped
        .get(spec.name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty());

      let Some(raw) = raw else {
        if spec.required {
          errors.push(format!("missing required field: {}", spec.name));
        }
        continue;
      };

      match spec.kind.resolve(raw) {
        Some(value) => {
          values.insert(spec.name, value);
        }
        None => errors.extend(spec.kind.describe_failure(spec.name, raw)),
      }
    }

    (Self(values), errors)
  }

  pub fn date(&self, name: &str) -> Option<ParsedDate> {
    match self.0.get(name)? {
      FieldValue::Date(d) => Some(*d),
      _ => None,
    }
  }

  pub fn time(&self, name: &str) -> Option<NaiveTime> {
    match self.0.get(name)? {
      FieldValue::Time(t) => Some(*t),
      _ => None,
    }
  }

  pub fn amount(&self, name: &str) -> Option<Decimal> {
    match self.0.get(name)? {
      FieldValue::Amount(a) => Some(*a),
      _ => None,
    }
  }

  pub fn count(&self, name: &str) -> Option<i64> {
    match self.0.get(name)? {
      FieldValue::Count(n) => Some(*n),
      _ => None,
    }
  }

  pub fn text(&self, name: &str) -> Option<String> {
    match self.0.get(name)? {
      FieldValue::Text(s) => Some(s.clone()),
      _ => None,
    }
  }
}
