//! Typed records produced from valid rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use till_core::SourceType;

use crate::{field::TypedFields, formats::ParsedDate};

#[derive(Debug, Clone, PartialEq)]
pub struct SalesRow {
  pub date:           ParsedDate,
  /// The separate `time` cell, when it parsed.
  pub time:           Option<NaiveTime>,
  pub total:          Decimal,
  pub subtotal:       Option<Decimal>,
  pub tax:            Option<Decimal>,
  pub discounts:      Option<Decimal>,
  pub comps:          Option<Decimal>,
  pub covers:         Option<i64>,
  pub payment_method: Option<String>,
  pub channel:        Option<String>,
  pub server:         Option<String>,
  pub transaction_id: Option<String>,
}

impl SalesRow {
  /// Date plus the `time` cell, else the date's own time, else midnight.
  pub fn occurred_at(&self) -> NaiveDateTime { self.date.at(self.time) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaborRow {
  pub period_start:   NaiveDate,
  pub period_end:     NaiveDate,
  pub total_wages:    Decimal,
  pub superannuation: Option<Decimal>,
  pub tax_withheld:   Option<Decimal>,
  pub employee_name:  Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
  pub snapshot_date: NaiveDate,
  pub item_name:     String,
  pub category:      Option<String>,
  pub quantity:      Decimal,
  pub unit:          Option<String>,
  pub unit_cost:     Decimal,
}

/// A validated row of any source type.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
  Sales(SalesRow),
  Labor(LaborRow),
  Inventory(InventoryRow),
}

impl SourceRecord {
  pub fn source_type(&self) -> SourceType {
    match self {
      Self::Sales(_) => SourceType::Sales,
      Self::Labor(_) => SourceType::Labor,
      Self::Inventory(_) => SourceType::Inventory,
    }
  }

  /// Checks that span more than one field. Run only over values that
  /// resolved, so a field that failed to parse is not reported twice.
  pub(crate) fn cross_check(source_type: SourceType, typed: &TypedFields) -> Vec<String> {
    let mut errors = Vec::new();
    if source_type == SourceType::Labor
      && let (Some(start), Some(end)) = (typed.date("period_start"), typed.date("period_end"))
      && end.date < start.date
    {
      errors.push("period_end precedes period_start".to_owned());
    }
    errors
  }

  /// Build the typed record from fields that resolved without error.
  pub(crate) fn build(source_type: SourceType, typed: &TypedFields) -> Result<Self, String> {
    let record = match source_type {
      SourceType::Sales => Self::Sales(SalesRow {
        date:           need("date", typed.date("date"))?,
        time:           typed.time("time"),
        total:          need("total", typed.amount("total"))?,
        subtotal:       typed.amount("subtotal"),
        tax:            typed.amount("tax"),
        discounts:      typed.amount("discounts"),
        comps:          typed.amount("comps"),
        covers:         typed.count("covers"),
        payment_method: typed.text("payment_method"),
        channel:        typed.text("channel"),
        server:         typed.text("server"),
        transaction_id: typed.text("transaction_id"),
      }),
      SourceType::Labor => Self::Labor(LaborRow {
        period_start:   need("period_start", typed.date("period_start"))?.date,
        period_end:     need("period_end", typed.date("period_end"))?.date,
        total_wages:    need("total_wages", typed.amount("total_wages"))?,
        superannuation: typed.amount("superannuation"),
        tax_withheld:   typed.amount("tax_withheld"),
        employee_name:  typed.text("employee_name"),
      }),
      SourceType::Inventory => Self::Inventory(InventoryRow {
        snapshot_date: need("snapshot_date", typed.date("snapshot_date"))?.date,
        item_name:     need("item_name", typed.text("item_name"))?,
        category:      typed.text("category"),
        quantity:      need("quantity", typed.amount("quantity"))?,
        unit:          typed.text("unit"),
        unit_cost:     need("unit_cost", typed.amount("unit_cost"))?,
      }),
    };
    Ok(record)
  }
}

fn need<T>(field: &str, value: Option<T>) -> Result<T, String> {
  value.ok_or_else(|| format!("missing required field: {field}"))
}
