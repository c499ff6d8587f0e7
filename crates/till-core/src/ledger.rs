//! Normalized business facts produced by ingestion, and the reference data
//! they point at.
//!
//! Every domain record carries a natural key distinct from its generated id.
//! Writes are insert-or-update on that key, so re-importing the same logical
//! transaction converges instead of duplicating.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Import-source tag stamped on every record written by the CSV pipeline.
pub const CSV_IMPORT_SOURCE: &str = "csv-import";

// ─── Reference data ──────────────────────────────────────────────────────────

/// A service channel (dine-in, takeaway, delivery, …) of one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
  pub channel_id:   Uuid,
  pub location_id:  Uuid,
  /// Lowercase slug; unique per location.
  pub code:         String,
  pub display_name: String,
}

/// Lowercase, with spaces and underscores folded to `-`.
pub fn channel_code(name: &str) -> String {
  name
    .trim()
    .to_lowercase()
    .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("-")
}

/// A named time-of-day window used to bucket transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Daypart {
  pub daypart_id:   Uuid,
  pub code:         String,
  pub display_name: String,
  pub start_time:   NaiveTime,
  pub end_time:     NaiveTime,
}

impl Daypart {
  /// Half-open membership: `start ≤ t < end`.
  pub fn contains(&self, t: NaiveTime) -> bool {
    self.start_time <= t && t < self.end_time
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDaypart {
  pub code:         String,
  pub display_name: String,
  pub start_time:   NaiveTime,
  pub end_time:     NaiveTime,
}

/// The first window containing `t`, if any. A time outside every window is
/// not an error; the caller leaves the daypart unset.
pub fn resolve_daypart(dayparts: &[Daypart], t: NaiveTime) -> Option<&Daypart> {
  dayparts.iter().find(|d| d.contains(t))
}

/// A menu item with the recipe cost used for COGS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
  pub menu_item_id: Uuid,
  pub location_id:  Uuid,
  pub name:         String,
  pub recipe_cost:  Decimal,
}

#[derive(Debug, Clone)]
pub struct NewMenuItem {
  pub location_id: Uuid,
  pub name:        String,
  pub recipe_cost: Decimal,
}

/// One line of a sale; unique on (sale, menu item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
  pub sale_id:      Uuid,
  pub menu_item_id: Uuid,
  pub quantity:     Decimal,
}

/// A sale line joined to its menu item's recipe cost.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleLineCost {
  pub sale_id:     Uuid,
  pub quantity:    Decimal,
  pub recipe_cost: Decimal,
}

impl SaleLineCost {
  pub fn cost(&self) -> Result<Decimal> {
    self
      .quantity
      .checked_mul(self.recipe_cost)
      .ok_or(Error::Overflow("sale line cost"))
  }
}

// ─── Sales ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
  pub sale_id:        Uuid,
  pub location_id:    Uuid,
  pub import_source:  String,
  pub source_id:      String,
  pub channel_id:     Option<Uuid>,
  pub daypart_id:     Option<Uuid>,
  /// Venue-local wall-clock time of the transaction.
  pub occurred_at:    NaiveDateTime,
  pub subtotal:       Decimal,
  pub tax:            Decimal,
  pub discounts:      Decimal,
  pub comps:          Decimal,
  pub total:          Decimal,
  pub payment_method: Option<String>,
  /// Guest count; `None` means the export did not say.
  pub covers:         Option<i64>,
  pub updated_at:     DateTime<Utc>,
}

impl Sale {
  pub fn business_date(&self) -> NaiveDate { self.occurred_at.date() }
}

/// Input to [`crate::store::FinanceStore::upsert_sale`]. Natural key:
/// (`location_id`, `import_source`, `source_id`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
  pub location_id:    Uuid,
  pub import_source:  String,
  pub source_id:      String,
  pub channel_id:     Option<Uuid>,
  pub daypart_id:     Option<Uuid>,
  pub occurred_at:    NaiveDateTime,
  pub subtotal:       Decimal,
  pub tax:            Decimal,
  pub discounts:      Decimal,
  pub comps:          Decimal,
  pub total:          Decimal,
  pub payment_method: Option<String>,
  pub covers:         Option<i64>,
}

// ─── Payroll ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollPeriod {
  pub payroll_id:     Uuid,
  pub location_id:    Uuid,
  pub start_date:     NaiveDate,
  pub end_date:       NaiveDate,
  pub labor_cost:     Decimal,
  pub superannuation: Decimal,
  pub tax_withheld:   Decimal,
  pub import_source:  String,
  pub updated_at:     DateTime<Utc>,
}

impl PayrollPeriod {
  /// Calendar days covered, inclusive of both ends.
  pub fn days(&self) -> i64 { (self.end_date - self.start_date).num_days() + 1 }

  pub fn covers_date(&self, date: NaiveDate) -> bool {
    self.start_date <= date && date <= self.end_date
  }

  /// The period's labor cost spread evenly across its calendar days. Day of
  /// week is not weighted.
  pub fn daily_labor_cost(&self) -> Decimal {
    match self.days() {
      days if days > 0 => self.labor_cost / Decimal::from(days),
      _ => Decimal::ZERO,
    }
  }
}

/// Natural key: (`location_id`, `start_date`, `end_date`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayrollPeriod {
  pub location_id:    Uuid,
  pub start_date:     NaiveDate,
  pub end_date:       NaiveDate,
  pub labor_cost:     Decimal,
  pub superannuation: Decimal,
  pub tax_withheld:   Decimal,
  pub import_source:  String,
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
  pub snapshot_id:   Uuid,
  pub location_id:   Uuid,
  pub snapshot_date: NaiveDate,
  pub item_name:     String,
  pub category:      Option<String>,
  pub quantity:      Decimal,
  pub unit:          String,
  pub unit_cost:     Decimal,
  pub total_value:   Decimal,
  pub import_source: String,
  pub updated_at:    DateTime<Utc>,
}

/// Natural key: (`location_id`, `snapshot_date`, `item_name`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewInventorySnapshot {
  pub location_id:   Uuid,
  pub snapshot_date: NaiveDate,
  pub item_name:     String,
  pub category:      Option<String>,
  pub quantity:      Decimal,
  pub unit:          String,
  pub unit_cost:     Decimal,
  pub total_value:   Decimal,
  pub import_source: String,
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn hm(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

  fn window(code: &str, start: NaiveTime, end: NaiveTime) -> Daypart {
    Daypart {
      daypart_id: Uuid::new_v4(),
      code: code.into(),
      display_name: code.into(),
      start_time: start,
      end_time: end,
    }
  }

  fn service_day() -> Vec<Daypart> {
    vec![
      window("breakfast", hm(7, 0), hm(11, 0)),
      window("lunch", hm(11, 0), hm(15, 0)),
      window("dinner", hm(15, 0), hm(20, 0)),
    ]
  }

  #[test]
  fn daypart_windows_are_half_open() {
    let dayparts = service_day();
    let code = |t| resolve_daypart(&dayparts, t).map(|d| d.code.as_str());

    assert_eq!(code(hm(13, 30)), Some("lunch"));
    assert_eq!(code(hm(14, 59)), Some("lunch"));
    assert_eq!(code(hm(15, 0)), Some("dinner"));
    assert_eq!(code(hm(7, 0)), Some("breakfast"));
    assert_eq!(code(hm(20, 0)), None);
    assert_eq!(code(hm(3, 15)), None);
  }

  #[test]
  fn channel_codes_are_slugs() {
    assert_eq!(channel_code("Dine In"), "dine-in");
    assert_eq!(channel_code("  UBER_eats "), "uber-eats");
    assert_eq!(channel_code("Take -  Away"), "take-away");
  }

  #[test]
  fn payroll_cost_is_spread_over_calendar_days() {
    let period = PayrollPeriod {
      payroll_id:     Uuid::nil(),
      location_id:    Uuid::nil(),
      start_date:     NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
      end_date:       NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
      labor_cost:     dec!(2100.00),
      superannuation: Decimal::ZERO,
      tax_withheld:   Decimal::ZERO,
      import_source:  CSV_IMPORT_SOURCE.into(),
      updated_at:     Utc::now(),
    };

    assert_eq!(period.days(), 7);
    assert_eq!(period.daily_labor_cost(), dec!(300));
    assert!(period.covers_date(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
    assert!(!period.covers_date(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()));
  }
}
