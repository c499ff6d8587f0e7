//! Aggregation engine: per-day KPI rows by channel and daypart.
//!
//! Every run recomputes a day from the ledger and replaces that day's rows
//! wholesale. Nothing is patched incrementally, so re-running over unchanged
//! data reproduces the same rows with a newer freshness timestamp.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use till_core::{
  kpi::{KpiAggregate, KpiInputs, KpiKey, KpiTotals, add_money, round_money, sub_money},
  ledger::{PayrollPeriod, Sale, SaleLineCost},
  store::FinanceStore,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{IngestError, Result};

type GroupKey = (Option<Uuid>, Option<Uuid>);

/// Outcome of [`AggregationEngine::refresh_aggregates`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
  pub location_id:    Uuid,
  pub first_day:      Option<NaiveDate>,
  pub last_day:       Option<NaiveDate>,
  pub days_refreshed: u64,
  pub days_failed:    u64,
  pub rows_written:   u64,
}

// ─── Computation ─────────────────────────────────────────────────────────────

/// Labor of `date`: each covering period's cost spread over its calendar
/// days, summed and rounded to cents.
pub fn day_labor(payroll: &[PayrollPeriod], date: NaiveDate) -> Result<Decimal> {
  let mut labor = Decimal::ZERO;
  for period in payroll.iter().filter(|p| p.covers_date(date)) {
    labor = add_money(labor, period.daily_labor_cost(), "daily labor cost")?;
  }
  Ok(round_money(labor))
}

/// Split `total` across `revenues` in proportion, evenly when there is no
/// positive revenue. The last share takes the rounding remainder so the
/// shares always sum to `total`.
pub fn apportion(total: Decimal, revenues: &[Decimal]) -> Result<Vec<Decimal>> {
  let Some(last) = revenues.len().checked_sub(1) else {
    return Ok(Vec::new());
  };
  let mut day_revenue = Decimal::ZERO;
  for revenue in revenues {
    day_revenue = add_money(day_revenue, *revenue, "day revenue")?;
  }
  let count = Decimal::from(revenues.len());

  let mut assigned = Decimal::ZERO;
  let mut shares = Vec::with_capacity(revenues.len());
  for (i, revenue) in revenues.iter().enumerate() {
    let share = if i == last {
      sub_money(total, assigned, "labor share")?
    } else if day_revenue > Decimal::ZERO {
      total
        .checked_mul(*revenue)
        .and_then(|weighted| weighted.checked_div(day_revenue))
        .map(round_money)
        .ok_or(till_core::Error::Overflow("labor share"))?
    } else {
      round_money(total / count)
    };
    assigned = add_money(assigned, share, "labor share")?;
    shares.push(share);
  }
  Ok(shares)
}

/// Compute the aggregate rows of one (location, date) from its ledger.
///
/// Sales are grouped by (channel, daypart). A day with labor but no sales
/// yields one location-wide row; a day with neither yields nothing. Sums
/// that leave the decimal range fail the whole day.
pub fn compute_day(
  location_id: Uuid,
  date: NaiveDate,
  sales: &[Sale],
  line_costs: &[SaleLineCost],
  payroll: &[PayrollPeriod],
  freshness: DateTime<Utc>,
) -> Result<Vec<KpiAggregate>> {
  let mut groups: BTreeMap<GroupKey, KpiInputs> = BTreeMap::new();
  let mut sale_groups: HashMap<Uuid, GroupKey> = HashMap::with_capacity(sales.len());

  for sale in sales {
    let key = (sale.channel_id, sale.daypart_id);
    sale_groups.insert(sale.sale_id, key);

    let inputs = groups.entry(key).or_default();
    inputs.revenue = add_money(inputs.revenue, sale.total, "revenue")?;
    inputs.discounts = add_money(inputs.discounts, sale.discounts, "discounts")?;
    inputs.comps = add_money(inputs.comps, sale.comps, "comps")?;
    inputs.covers = inputs
      .covers
      .checked_add(sale.covers.unwrap_or(1))
      .ok_or(till_core::Error::Overflow("covers"))?;
  }

  for line in line_costs {
    if let Some(key) = sale_groups.get(&line.sale_id)
      && let Some(inputs) = groups.get_mut(key)
    {
      inputs.cogs = add_money(inputs.cogs, line.cost()?, "cogs")?;
    }
  }

  if groups.is_empty() && payroll.iter().any(|p| p.covers_date(date)) {
    groups.insert((None, None), KpiInputs::default());
  }

  let revenues: Vec<Decimal> = groups.values().map(|g| g.revenue).collect();
  let shares = apportion(day_labor(payroll, date)?, &revenues)?;

  let mut rows = Vec::with_capacity(groups.len());
  for (((channel_id, daypart_id), inputs), labor_cost) in groups.into_iter().zip(shares) {
    let key = KpiKey { date, location_id, channel_id, daypart_id };
    rows.push(KpiAggregate::derive(key, KpiInputs { labor_cost, ..inputs }, freshness)?);
  }
  Ok(rows)
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct AggregationEngine<S> {
  store: Arc<S>,
}

impl<S: FinanceStore> AggregationEngine<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Recompute and replace the rows of one day. Returns the number of rows
  /// now stored for that day.
  pub async fn refresh_day(&self, location_id: Uuid, date: NaiveDate) -> Result<usize> {
    let sales = self
      .store
      .sales_for_day(location_id, date)
      .await
      .map_err(IngestError::store)?;
    let line_costs = self
      .store
      .sale_line_costs_for_day(location_id, date)
      .await
      .map_err(IngestError::store)?;
    let payroll = self
      .store
      .payroll_periods_covering(location_id, date)
      .await
      .map_err(IngestError::store)?;

    let rows = compute_day(location_id, date, &sales, &line_costs, &payroll, Utc::now())?;
    let count = rows.len();

    self
      .store
      .replace_day_aggregates(location_id, date, rows)
      .await
      .map_err(IngestError::store)?;

    debug!(%location_id, %date, sales = sales.len(), rows = count, "day aggregated");
    Ok(count)
  }

  /// Refresh every calendar day from the earliest to the latest sale date.
  /// A day that fails is logged and skipped; the rest still run.
  pub async fn refresh_aggregates(&self, location_id: Uuid) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary { location_id, ..Default::default() };

    let range = self
      .store
      .sale_date_range(location_id)
      .await
      .map_err(IngestError::store)?;
    let Some((first, last)) = range else {
      debug!(%location_id, "no sales to aggregate");
      return Ok(summary);
    };
    summary.first_day = Some(first);
    summary.last_day = Some(last);

    for date in first.iter_days().take_while(|d| *d <= last) {
      match self.refresh_day(location_id, date).await {
        Ok(rows) => {
          summary.days_refreshed += 1;
          summary.rows_written += rows as u64;
        }
        Err(err) => {
          warn!(%location_id, %date, error = %err, "aggregation failed for day");
          summary.days_failed += 1;
        }
      }
    }

    info!(
      %location_id,
      %first,
      %last,
      days = summary.days_refreshed,
      failed = summary.days_failed,
      rows = summary.rows_written,
      "aggregates refreshed"
    );
    Ok(summary)
  }

  /// Stored rows with `start ≤ date ≤ end`.
  pub async fn list_aggregates(
    &self,
    location_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<KpiAggregate>> {
    self
      .store
      .list_aggregates(location_id, start, end)
      .await
      .map_err(IngestError::store)
  }

  pub async fn totals(
    &self,
    location_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<KpiTotals> {
    let rows = self.list_aggregates(location_id, start, end).await?;
    Ok(KpiTotals::rollup(&rows)?)
  }
}
