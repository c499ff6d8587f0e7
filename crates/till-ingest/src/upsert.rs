//! Domain upserters: validated rows → normalized records.
//!
//! Every write is an insert-or-update on the record's natural key, so
//! importing corrected data for the same transactions updates in place.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use till_core::{
  Error as CoreError, SourceType,
  job::ImportJob,
  kpi::{add_money, sub_money},
  ledger::{
    CSV_IMPORT_SOURCE, Daypart, InventorySnapshot, NewInventorySnapshot,
    NewPayrollPeriod, NewSale, PayrollPeriod, Sale, resolve_daypart,
  },
  store::FinanceStore,
};
use till_csv::{InventoryRow, LaborRow, SalesRow};
use uuid::Uuid;

use crate::{IngestError, Result};

const DEFAULT_UNIT: &str = "ea";

// ─── Derived fields ──────────────────────────────────────────────────────────

/// The row's transaction id when the export has one, otherwise an id made
/// from the file hash prefix and the source line.
pub fn sale_source_id(row: &SalesRow, hash_prefix: &str, line_number: u64) -> String {
  match &row.transaction_id {
    Some(id) => id.clone(),
    None => format!("{hash_prefix}-{line_number}"),
  }
}

/// `total − tax` unless the export states a subtotal. Missing tax is zero.
pub fn derive_subtotal(row: &SalesRow) -> Result<Decimal> {
  match row.subtotal {
    Some(subtotal) => Ok(subtotal),
    None => Ok(sub_money(row.total, row.tax.unwrap_or_default(), "subtotal")?),
  }
}

pub fn sale_record(
  row: &SalesRow,
  location_id: Uuid,
  source_id: String,
  channel_id: Option<Uuid>,
  dayparts: &[Daypart],
) -> Result<NewSale> {
  let daypart_id = row
    .time
    .or(row.date.time)
    .and_then(|t| resolve_daypart(dayparts, t))
    .map(|d| d.daypart_id);

  Ok(NewSale {
    location_id,
    import_source: CSV_IMPORT_SOURCE.to_owned(),
    source_id,
    channel_id,
    daypart_id,
    occurred_at: row.occurred_at(),
    subtotal: derive_subtotal(row)?,
    tax: row.tax.unwrap_or_default(),
    discounts: row.discounts.unwrap_or_default(),
    comps: row.comps.unwrap_or_default(),
    total: row.total,
    payment_method: row.payment_method.clone(),
    covers: row.covers,
  })
}

pub fn inventory_record(row: &InventoryRow, location_id: Uuid) -> Result<NewInventorySnapshot> {
  let total_value = row
    .quantity
    .checked_mul(row.unit_cost)
    .ok_or(CoreError::Overflow("inventory value"))?;

  Ok(NewInventorySnapshot {
    location_id,
    snapshot_date: row.snapshot_date,
    item_name: row.item_name.clone(),
    category: row.category.clone(),
    quantity: row.quantity,
    unit: row.unit.clone().unwrap_or_else(|| DEFAULT_UNIT.to_owned()),
    unit_cost: row.unit_cost,
    total_value,
    import_source: CSV_IMPORT_SOURCE.to_owned(),
  })
}

// ─── Payroll batching ────────────────────────────────────────────────────────

/// The rows of one file that share a pay period, summed into one write.
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollGroup {
  pub start_date:     NaiveDate,
  pub end_date:       NaiveDate,
  pub labor_cost:     Decimal,
  pub superannuation: Decimal,
  pub tax_withheld:   Decimal,
  /// Line number and raw cells of every contributing row.
  pub rows:           Vec<(u64, BTreeMap<String, String>)>,
}

impl PayrollGroup {
  pub fn record(&self, location_id: Uuid) -> NewPayrollPeriod {
    NewPayrollPeriod {
      location_id,
      start_date: self.start_date,
      end_date: self.end_date,
      labor_cost: self.labor_cost,
      superannuation: self.superannuation,
      tax_withheld: self.tax_withheld,
      import_source: CSV_IMPORT_SOURCE.to_owned(),
    }
  }
}

/// Per-employee payroll rows collected by period.
#[derive(Debug, Default)]
pub struct PayrollBatch {
  periods: BTreeMap<(NaiveDate, NaiveDate), PayrollGroup>,
}

impl PayrollBatch {
  /// Add one row to its period. A row whose amounts would overflow the
  /// period's sums is rejected and leaves the batch unchanged.
  pub fn add(
    &mut self,
    line_number: u64,
    raw: &BTreeMap<String, String>,
    row: &LaborRow,
  ) -> Result<()> {
    let key = (row.period_start, row.period_end);
    let (labor_cost, superannuation, tax_withheld) = match self.periods.get(&key) {
      Some(group) => (group.labor_cost, group.superannuation, group.tax_withheld),
      None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };
    let labor_cost = add_money(labor_cost, row.total_wages, "payroll labor cost")?;
    let superannuation = add_money(
      superannuation,
      row.superannuation.unwrap_or_default(),
      "payroll superannuation",
    )?;
    let tax_withheld = add_money(
      tax_withheld,
      row.tax_withheld.unwrap_or_default(),
      "payroll tax withheld",
    )?;

    let group = self.periods.entry(key).or_insert_with(|| PayrollGroup {
      start_date:     row.period_start,
      end_date:       row.period_end,
      labor_cost:     Decimal::ZERO,
      superannuation: Decimal::ZERO,
      tax_withheld:   Decimal::ZERO,
      rows:           Vec::new(),
    });
    group.labor_cost = labor_cost;
    group.superannuation = superannuation;
    group.tax_withheld = tax_withheld;
    group.rows.push((line_number, raw.clone()));
    Ok(())
  }

  pub fn into_groups(self) -> impl Iterator<Item = PayrollGroup> {
    self.periods.into_values()
  }
}

// ─── Upserter ────────────────────────────────────────────────────────────────

/// Writes the records of one job. Holds the job-scoped lookups (dayparts
/// and channels already resolved) so they are fetched once per file.
pub struct Upserter<'a, S> {
  store:       &'a S,
  location_id: Uuid,
  hash_prefix: String,
  dayparts:    Vec<Daypart>,
  channels:    HashMap<String, Uuid>,
}

impl<'a, S: FinanceStore> Upserter<'a, S> {
  pub async fn for_job(store: &'a S, job: &ImportJob) -> Result<Self> {
    let dayparts = match job.source_type {
      SourceType::Sales => store.list_dayparts().await.map_err(IngestError::store)?,
      SourceType::Labor | SourceType::Inventory => Vec::new(),
    };

    Ok(Self {
      store,
      location_id: job.location_id,
      hash_prefix: job.hash_prefix().to_owned(),
      dayparts,
      channels: HashMap::new(),
    })
  }

  pub async fn upsert_sale(&mut self, line_number: u64, row: &SalesRow) -> Result<Sale> {
    let channel_id = match &row.channel {
      Some(name) => Some(self.channel_id(name).await?),
      None => None,
    };
    let source_id = sale_source_id(row, &self.hash_prefix, line_number);
    let record = sale_record(row, self.location_id, source_id, channel_id, &self.dayparts)?;

    self
      .store
      .upsert_sale(record)
      .await
      .map_err(IngestError::store)
  }

  pub async fn upsert_payroll(&self, group: &PayrollGroup) -> Result<PayrollPeriod> {
    self
      .store
      .upsert_payroll_period(group.record(self.location_id))
      .await
      .map_err(IngestError::store)
  }

  pub async fn upsert_inventory(&self, row: &InventoryRow) -> Result<InventorySnapshot> {
    self
      .store
      .upsert_inventory_snapshot(inventory_record(row, self.location_id)?)
      .await
      .map_err(IngestError::store)
  }

  async fn channel_id(&mut self, name: &str) -> Result<Uuid> {
    let key = name.trim().to_lowercase();
    if let Some(id) = self.channels.get(&key) {
      return Ok(*id);
    }

    let channel = self
      .store
      .find_or_create_channel(self.location_id, name.to_owned())
      .await
      .map_err(IngestError::store)?;
    self.channels.insert(key, channel.channel_id);
    Ok(channel.channel_id)
  }
}
