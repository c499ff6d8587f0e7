//! KPI aggregates: per-day, per-channel, per-daypart financial rollups.
//!
//! Aggregates are derived data. They are recomputed wholesale by the
//! aggregation engine and never patched incrementally.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Round a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
  amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `a + b`, or an overflow error naming `what`.
pub fn add_money(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal> {
  a.checked_add(b).ok_or(Error::Overflow(what))
}

/// `a − b`, or an overflow error naming `what`.
pub fn sub_money(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal> {
  a.checked_sub(b).ok_or(Error::Overflow(what))
}

/// `labor_cost / revenue × 100`, or zero when there is no revenue.
pub fn labor_pct(labor_cost: Decimal, revenue: Decimal) -> Result<Decimal> {
  if revenue <= Decimal::ZERO {
    return Ok(Decimal::ZERO);
  }
  labor_cost
    .checked_div(revenue)
    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
    .map(round_money)
    .ok_or(Error::Overflow("labor percentage"))
}

/// Revenue per cover, or zero when there are no covers.
pub fn average_check(revenue: Decimal, covers: i64) -> Decimal {
  if covers > 0 {
    round_money(revenue / Decimal::from(covers))
  } else {
    Decimal::ZERO
  }
}

// ─── Aggregate row ───────────────────────────────────────────────────────────

/// Identity of an aggregate row. An absent channel or daypart is a key value
/// of its own, not a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KpiKey {
  pub date:        NaiveDate,
  pub location_id: Uuid,
  pub channel_id:  Option<Uuid>,
  pub daypart_id:  Option<Uuid>,
}

/// The measured inputs of an aggregate; everything else is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KpiInputs {
  pub revenue:    Decimal,
  pub cogs:       Decimal,
  pub labor_cost: Decimal,
  pub opex:       Decimal,
  pub covers:     i64,
  pub discounts:  Decimal,
  pub comps:      Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiAggregate {
  pub date:         NaiveDate,
  pub location_id:  Uuid,
  pub channel_id:   Option<Uuid>,
  pub daypart_id:   Option<Uuid>,
  pub revenue:      Decimal,
  pub cogs:         Decimal,
  pub gross_margin: Decimal,
  pub labor_cost:   Decimal,
  pub labor_pct:    Decimal,
  pub opex:         Decimal,
  pub net_profit:   Decimal,
  pub covers:       i64,
  pub avg_check:    Decimal,
  pub discounts:    Decimal,
  pub comps:        Decimal,
  /// When this row was last successfully recomputed; not when its inputs
  /// last changed.
  pub freshness:    DateTime<Utc>,
}

impl KpiAggregate {
  /// Build a row from its inputs, deriving margin, profit, and ratios.
  pub fn derive(key: KpiKey, inputs: KpiInputs, freshness: DateTime<Utc>) -> Result<Self> {
    let revenue = round_money(inputs.revenue);
    let cogs = round_money(inputs.cogs);
    let labor_cost = round_money(inputs.labor_cost);
    let opex = round_money(inputs.opex);
    let gross_margin = sub_money(revenue, cogs, "gross margin")?;
    let net_profit = sub_money(gross_margin, labor_cost, "net profit")
      .and_then(|profit| sub_money(profit, opex, "net profit"))?;

    Ok(Self {
      date: key.date,
      location_id: key.location_id,
      channel_id: key.channel_id,
      daypart_id: key.daypart_id,
      revenue,
      cogs,
      gross_margin,
      labor_cost,
      labor_pct: labor_pct(labor_cost, revenue)?,
      opex,
      net_profit,
      covers: inputs.covers,
      avg_check: average_check(revenue, inputs.covers),
      discounts: round_money(inputs.discounts),
      comps: round_money(inputs.comps),
      freshness,
    })
  }

  pub fn key(&self) -> KpiKey {
    KpiKey {
      date:        self.date,
      location_id: self.location_id,
      channel_id:  self.channel_id,
      daypart_id:  self.daypart_id,
    }
  }
}

// ─── Totals ──────────────────────────────────────────────────────────────────

/// A rollup over any set of aggregate rows. Ratios are recomputed from the
/// sums rather than averaged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiTotals {
  pub revenue:      Decimal,
  pub cogs:         Decimal,
  pub gross_margin: Decimal,
  pub labor_cost:   Decimal,
  pub labor_pct:    Decimal,
  pub opex:         Decimal,
  pub net_profit:   Decimal,
  pub covers:       i64,
  pub avg_check:    Decimal,
  pub discounts:    Decimal,
  pub comps:        Decimal,
  pub freshness:    Option<DateTime<Utc>>,
}

impl KpiTotals {
  pub fn rollup<'a>(rows: impl IntoIterator<Item = &'a KpiAggregate>) -> Result<Self> {
    let mut totals = Self::default();
    for row in rows {
      totals.revenue = add_money(totals.revenue, row.revenue, "total revenue")?;
      totals.cogs = add_money(totals.cogs, row.cogs, "total cogs")?;
      totals.gross_margin = add_money(totals.gross_margin, row.gross_margin, "total gross margin")?;
      totals.labor_cost = add_money(totals.labor_cost, row.labor_cost, "total labor cost")?;
      totals.opex = add_money(totals.opex, row.opex, "total opex")?;
      totals.net_profit = add_money(totals.net_profit, row.net_profit, "total net profit")?;
      totals.covers = totals
        .covers
        .checked_add(row.covers)
        .ok_or(Error::Overflow("total covers"))?;
      totals.discounts = add_money(totals.discounts, row.discounts, "total discounts")?;
      totals.comps = add_money(totals.comps, row.comps, "total comps")?;
      totals.freshness = totals.freshness.max(Some(row.freshness));
    }
    totals.labor_pct = labor_pct(totals.labor_cost, totals.revenue)?;
    totals.avg_check = average_check(totals.revenue, totals.covers);
    Ok(totals)
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn key() -> KpiKey {
    KpiKey {
      date:        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      location_id: Uuid::nil(),
      channel_id:  None,
      daypart_id:  None,
    }
  }

  #[test]
  fn derives_margin_profit_and_ratios() {
    let row = KpiAggregate::derive(
      key(),
      KpiInputs {
        revenue: dec!(1000.00),
        cogs: dec!(280.00),
        labor_cost: dec!(300.00),
        covers: 40,
        ..Default::default()
      },
      Utc::now(),
    )
    .unwrap();

    assert_eq!(row.gross_margin, dec!(720.00));
    assert_eq!(row.net_profit, dec!(420.00));
    assert_eq!(row.labor_pct, dec!(30.00));
    assert_eq!(row.avg_check, dec!(25.00));
  }

  #[test]
  fn zero_revenue_gives_zero_labor_pct() {
    let row = KpiAggregate::derive(
      key(),
      KpiInputs { labor_cost: dec!(300.00), ..Default::default() },
      Utc::now(),
    )
    .unwrap();

    assert_eq!(row.labor_pct, Decimal::ZERO);
    assert_eq!(row.avg_check, Decimal::ZERO);
    assert_eq!(row.net_profit, dec!(-300.00));
  }

  #[test]
  fn money_rounds_half_away_from_zero() {
    assert_eq!(round_money(dec!(0.125)), dec!(0.13));
    assert_eq!(round_money(dec!(-0.125)), dec!(-0.13));
    assert_eq!(labor_pct(dec!(1), dec!(3)).unwrap(), dec!(33.33));
  }

  #[test]
  fn totals_recompute_ratios_from_sums() {
    let now = Utc::now();
    let a = KpiAggregate::derive(
      key(),
      KpiInputs { revenue: dec!(600), labor_cost: dec!(90), covers: 20, ..Default::default() },
      now,
    )
    .unwrap();
    let b = KpiAggregate::derive(
      key(),
      KpiInputs { revenue: dec!(400), labor_cost: dec!(210), covers: 20, ..Default::default() },
      now,
    )
    .unwrap();

    let totals = KpiTotals::rollup([&a, &b]).unwrap();
    assert_eq!(totals.revenue, dec!(1000));
    assert_eq!(totals.labor_pct, dec!(30.00));
    assert_eq!(totals.avg_check, dec!(25.00));
    assert_eq!(totals.freshness, Some(now));
  }

  #[test]
  fn ratio_past_the_decimal_range_is_an_error() {
    assert!(matches!(
      labor_pct(Decimal::MAX, dec!(0.01)),
      Err(Error::Overflow("labor percentage"))
    ));

    let err = KpiAggregate::derive(
      key(),
      KpiInputs { revenue: Decimal::MIN, cogs: Decimal::MAX, ..Default::default() },
      Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Overflow("gross margin")));
  }

  #[test]
  fn totals_past_the_decimal_range_are_an_error() {
    let row = KpiAggregate::derive(
      key(),
      KpiInputs { revenue: Decimal::MAX, ..Default::default() },
      Utc::now(),
    )
    .unwrap();
    assert!(matches!(
      KpiTotals::rollup([&row, &row]),
      Err(Error::Overflow("total revenue"))
    ));
  }
}
