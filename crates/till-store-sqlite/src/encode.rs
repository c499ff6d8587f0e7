//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Instants are stored as fixed-width RFC 3339 UTC strings so that text
//! order is time order. Venue-local dates, times and date-times use their ISO
//! forms. Decimals are stored as canonical text, never as REAL. UUIDs are
//! hyphenated lowercase strings.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use till_core::{
  SourceType,
  job::{ImportAnomaly, ImportJob, JobStatus, Severity},
  kpi::KpiAggregate,
  ledger::{
    Channel, Daypart, InventorySnapshot, MenuItem, PayrollPeriod, Sale,
    SaleLineCost,
  },
  mapping::MappingProfile,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

/// `''` stands for "no value" in key columns that cannot be NULL.
pub fn encode_key(id: Option<Uuid>) -> String { id.map(encode_uuid).unwrap_or_default() }

pub fn decode_key(s: &str) -> Result<Option<Uuid>> {
  if s.is_empty() { Ok(None) } else { decode_uuid(s).map(Some) }
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::from_str(s).map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::from_str(s).map_err(|e| Error::Decode(format!("time {s:?}: {e}")))
}

pub fn encode_local(dt: NaiveDateTime) -> String {
  dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

pub fn decode_local(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::from_str(s).map_err(|e| Error::Decode(format!("local time {s:?}: {e}")))
}

pub fn encode_dec(d: Decimal) -> String { d.to_string() }

pub fn decode_dec(s: &str) -> Result<Decimal> {
  Decimal::from_str(s).map_err(|e| Error::Decode(format!("decimal {s:?}: {e}")))
}

fn decode_status(s: &str) -> Result<JobStatus> {
  s.parse()
    .map_err(|_| till_core::Error::UnknownJobStatus(s.to_owned()).into())
}

fn decode_severity(s: &str) -> Result<Severity> {
  s.parse()
    .map_err(|_| till_core::Error::UnknownSeverity(s.to_owned()).into())
}

fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or_default() }

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

// ─── Import jobs ─────────────────────────────────────────────────────────────

pub const JOB_COLUMNS: &str = "job_id, source_type, status, file_name, file_hash, \
   total_rows, processed_rows, error_rows, location_id, mapping_id, created_by, \
   created_at, completed_at, error_message";

/// Raw strings read directly from an `import_jobs` row.
pub struct RawJob {
  pub job_id:         String,
  pub source_type:    String,
  pub status:         String,
  pub file_name:      String,
  pub file_hash:      String,
  pub total_rows:     i64,
  pub processed_rows: i64,
  pub error_rows:     i64,
  pub location_id:    String,
  pub mapping_id:     Option<String>,
  pub created_by:     String,
  pub created_at:     String,
  pub completed_at:   Option<String>,
  pub error_message:  Option<String>,
}

impl RawJob {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:         row.get(0)?,
      source_type:    row.get(1)?,
      status:         row.get(2)?,
      file_name:      row.get(3)?,
      file_hash:      row.get(4)?,
      total_rows:     row.get(5)?,
      processed_rows: row.get(6)?,
      error_rows:     row.get(7)?,
      location_id:    row.get(8)?,
      mapping_id:     row.get(9)?,
      created_by:     row.get(10)?,
      created_at:     row.get(11)?,
      completed_at:   row.get(12)?,
      error_message:  row.get(13)?,
    })
  }

  pub fn into_job(self) -> Result<ImportJob> {
    Ok(ImportJob {
      job_id:         decode_uuid(&self.job_id)?,
      source_type:    SourceType::from_str(&self.source_type)?,
      status:         decode_status(&self.status)?,
      file_name:      self.file_name,
      file_hash:      self.file_hash,
      total_rows:     decode_count(self.total_rows),
      processed_rows: decode_count(self.processed_rows),
      error_rows:     decode_count(self.error_rows),
      location_id:    decode_uuid(&self.location_id)?,
      mapping_id:     decode_opt_uuid(self.mapping_id.as_deref())?,
      created_by:     decode_uuid(&self.created_by)?,
      created_at:     decode_dt(&self.created_at)?,
      completed_at:   self.completed_at.as_deref().map(decode_dt).transpose()?,
      error_message:  self.error_message,
    })
  }
}

pub const ANOMALY_COLUMNS: &str =
  "anomaly_id, job_id, line_number, severity, message, raw_data, created_at";

pub struct RawAnomaly {
  pub anomaly_id:  String,
  pub job_id:      String,
  pub line_number: i64,
  pub severity:    String,
  pub message:     String,
  pub raw_data:    Option<String>,
  pub created_at:  String,
}

impl RawAnomaly {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      anomaly_id:  row.get(0)?,
      job_id:      row.get(1)?,
      line_number: row.get(2)?,
      severity:    row.get(3)?,
      message:     row.get(4)?,
      raw_data:    row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_anomaly(self) -> Result<ImportAnomaly> {
    Ok(ImportAnomaly {
      anomaly_id:  decode_uuid(&self.anomaly_id)?,
      job_id:      decode_uuid(&self.job_id)?,
      line_number: decode_count(self.line_number),
      severity:    decode_severity(&self.severity)?,
      message:     self.message,
      raw_data:    self.raw_data,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Mapping profiles ────────────────────────────────────────────────────────

pub const MAPPING_COLUMNS: &str = "mapping_id, name, source_type, location_id, \
   column_map, defaults, created_by, created_at, updated_at";

pub fn encode_string_map(map: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub struct RawMapping {
  pub mapping_id:  String,
  pub name:        String,
  pub source_type: String,
  pub location_id: String,
  pub column_map:  String,
  pub defaults:    String,
  pub created_by:  String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawMapping {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      mapping_id:  row.get(0)?,
      name:        row.get(1)?,
      source_type: row.get(2)?,
      location_id: row.get(3)?,
      column_map:  row.get(4)?,
      defaults:    row.get(5)?,
      created_by:  row.get(6)?,
      created_at:  row.get(7)?,
      updated_at:  row.get(8)?,
    })
  }

  pub fn into_mapping(self) -> Result<MappingProfile> {
    Ok(MappingProfile {
      mapping_id:  decode_uuid(&self.mapping_id)?,
      name:        self.name,
      source_type: SourceType::from_str(&self.source_type)?,
      location_id: decode_uuid(&self.location_id)?,
      column_map:  serde_json::from_str(&self.column_map)?,
      defaults:    serde_json::from_str(&self.defaults)?,
      created_by:  decode_uuid(&self.created_by)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Reference data ──────────────────────────────────────────────────────────

pub const CHANNEL_COLUMNS: &str = "channel_id, location_id, code, display_name";

pub struct RawChannel {
  pub channel_id:   String,
  pub location_id:  String,
  pub code:         String,
  pub display_name: String,
}

impl RawChannel {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      channel_id:   row.get(0)?,
      location_id:  row.get(1)?,
      code:         row.get(2)?,
      display_name: row.get(3)?,
    })
  }

  pub fn into_channel(self) -> Result<Channel> {
    Ok(Channel {
      channel_id:   decode_uuid(&self.channel_id)?,
      location_id:  decode_uuid(&self.location_id)?,
      code:         self.code,
      display_name: self.display_name,
    })
  }
}

pub const DAYPART_COLUMNS: &str = "daypart_id, code, display_name, start_time, end_time";

pub struct RawDaypart {
  pub daypart_id:   String,
  pub code:         String,
  pub display_name: String,
  pub start_time:   String,
  pub end_time:     String,
}

impl RawDaypart {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      daypart_id:   row.get(0)?,
      code:         row.get(1)?,
      display_name: row.get(2)?,
      start_time:   row.get(3)?,
      end_time:     row.get(4)?,
    })
  }

  pub fn into_daypart(self) -> Result<Daypart> {
    Ok(Daypart {
      daypart_id:   decode_uuid(&self.daypart_id)?,
      code:         self.code,
      display_name: self.display_name,
      start_time:   decode_time(&self.start_time)?,
      end_time:     decode_time(&self.end_time)?,
    })
  }
}

pub const MENU_ITEM_COLUMNS: &str = "menu_item_id, location_id, name, recipe_cost";

pub struct RawMenuItem {
  pub menu_item_id: String,
  pub location_id:  String,
  pub name:         String,
  pub recipe_cost:  String,
}

impl RawMenuItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      menu_item_id: row.get(0)?,
      location_id:  row.get(1)?,
      name:         row.get(2)?,
      recipe_cost:  row.get(3)?,
    })
  }

  pub fn into_menu_item(self) -> Result<MenuItem> {
    Ok(MenuItem {
      menu_item_id: decode_uuid(&self.menu_item_id)?,
      location_id:  decode_uuid(&self.location_id)?,
      name:         self.name,
      recipe_cost:  decode_dec(&self.recipe_cost)?,
    })
  }
}

pub struct RawSaleLineCost {
  pub sale_id:     String,
  pub quantity:    String,
  pub recipe_cost: String,
}

impl RawSaleLineCost {
  pub fn into_cost(self) -> Result<SaleLineCost> {
    Ok(SaleLineCost {
      sale_id:     decode_uuid(&self.sale_id)?,
      quantity:    decode_dec(&self.quantity)?,
      recipe_cost: decode_dec(&self.recipe_cost)?,
    })
  }
}

// ─── Domain records ──────────────────────────────────────────────────────────

pub const SALE_COLUMNS: &str = "sale_id, location_id, import_source, source_id, \
   channel_id, daypart_id, occurred_at, subtotal, tax, discounts, comps, total, \
   payment_method, covers, updated_at";

pub struct RawSale {
  pub sale_id:        String,
  pub location_id:    String,
  pub import_source:  String,
  pub source_id:      String,
  pub channel_id:     Option<String>,
  pub daypart_id:     Option<String>,
  pub occurred_at:    String,
  pub subtotal:       String,
  pub tax:            String,
  pub discounts:      String,
  pub comps:          String,
  pub total:          String,
  pub payment_method: Option<String>,
  pub covers:         Option<i64>,
  pub updated_at:     String,
}

impl RawSale {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sale_id:        row.get(0)?,
      location_id:    row.get(1)?,
      import_source:  row.get(2)?,
      source_id:      row.get(3)?,
      channel_id:     row.get(4)?,
      daypart_id:     row.get(5)?,
      occurred_at:    row.get(6)?,
      subtotal:       row.get(7)?,
      tax:            row.get(8)?,
      discounts:      row.get(9)?,
      comps:          row.get(10)?,
      total:          row.get(11)?,
      payment_method: row.get(12)?,
      covers:         row.get(13)?,
      updated_at:     row.get(14)?,
    })
  }

  pub fn into_sale(self) -> Result<Sale> {
    Ok(Sale {
      sale_id:        decode_uuid(&self.sale_id)?,
      location_id:    decode_uuid(&self.location_id)?,
      import_source:  self.import_source,
      source_id:      self.source_id,
      channel_id:     decode_opt_uuid(self.channel_id.as_deref())?,
      daypart_id:     decode_opt_uuid(self.daypart_id.as_deref())?,
      occurred_at:    decode_local(&self.occurred_at)?,
      subtotal:       decode_dec(&self.subtotal)?,
      tax:            decode_dec(&self.tax)?,
      discounts:      decode_dec(&self.discounts)?,
      comps:          decode_dec(&self.comps)?,
      total:          decode_dec(&self.total)?,
      payment_method: self.payment_method,
      covers:         self.covers,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const PAYROLL_COLUMNS: &str = "payroll_id, location_id, start_date, end_date, \
   labor_cost, superannuation, tax_withheld, import_source, updated_at";

pub struct RawPayroll {
  pub payroll_id:     String,
  pub location_id:    String,
  pub start_date:     String,
  pub end_date:       String,
  pub labor_cost:     String,
  pub superannuation: String,
  pub tax_withheld:   String,
  pub import_source:  String,
  pub updated_at:     String,
}

impl RawPayroll {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      payroll_id:     row.get(0)?,
      location_id:    row.get(1)?,
      start_date:     row.get(2)?,
      end_date:       row.get(3)?,
      labor_cost:     row.get(4)?,
      superannuation: row.get(5)?,
      tax_withheld:   row.get(6)?,
      import_source:  row.get(7)?,
      updated_at:     row.get(8)?,
    })
  }

  pub fn into_period(self) -> Result<PayrollPeriod> {
    Ok(PayrollPeriod {
      payroll_id:     decode_uuid(&self.payroll_id)?,
      location_id:    decode_uuid(&self.location_id)?,
      start_date:     decode_date(&self.start_date)?,
      end_date:       decode_date(&self.end_date)?,
      labor_cost:     decode_dec(&self.labor_cost)?,
      superannuation: decode_dec(&self.superannuation)?,
      tax_withheld:   decode_dec(&self.tax_withheld)?,
      import_source:  self.import_source,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const INVENTORY_COLUMNS: &str = "snapshot_id, location_id, snapshot_date, \
   item_name, category, quantity, unit, unit_cost, total_value, import_source, \
   updated_at";

pub struct RawInventory {
  pub snapshot_id:   String,
  pub location_id:   String,
  pub snapshot_date: String,
  pub item_name:     String,
  pub category:      Option<String>,
  pub quantity:      String,
  pub unit:          String,
  pub unit_cost:     String,
  pub total_value:   String,
  pub import_source: String,
  pub updated_at:    String,
}

impl RawInventory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:   row.get(0)?,
      location_id:   row.get(1)?,
      snapshot_date: row.get(2)?,
      item_name:     row.get(3)?,
      category:      row.get(4)?,
      quantity:      row.get(5)?,
      unit:          row.get(6)?,
      unit_cost:     row.get(7)?,
      total_value:   row.get(8)?,
      import_source: row.get(9)?,
      updated_at:    row.get(10)?,
    })
  }

  pub fn into_snapshot(self) -> Result<InventorySnapshot> {
    Ok(InventorySnapshot {
      snapshot_id:   decode_uuid(&self.snapshot_id)?,
      location_id:   decode_uuid(&self.location_id)?,
      snapshot_date: decode_date(&self.snapshot_date)?,
      item_name:     self.item_name,
      category:      self.category,
      quantity:      decode_dec(&self.quantity)?,
      unit:          self.unit,
      unit_cost:     decode_dec(&self.unit_cost)?,
      total_value:   decode_dec(&self.total_value)?,
      import_source: self.import_source,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

// ─── KPI aggregates ──────────────────────────────────────────────────────────

pub const AGGREGATE_COLUMNS: &str = "date, location_id, channel_key, daypart_key, \
   revenue, cogs, gross_margin, labor_cost, labor_pct, opex, net_profit, covers, \
   avg_check, discounts, comps, freshness";

pub struct RawAggregate {
  pub date:         String,
  pub location_id:  String,
  pub channel_key:  String,
  pub daypart_key:  String,
  pub revenue:      String,
  pub cogs:         String,
  pub gross_margin: String,
  pub labor_cost:   String,
  pub labor_pct:    String,
  pub opex:         String,
  pub net_profit:   String,
  pub covers:       i64,
  pub avg_check:    String,
  pub discounts:    String,
  pub comps:        String,
  pub freshness:    String,
}

impl RawAggregate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      date:         row.get(0)?,
      location_id:  row.get(1)?,
      channel_key:  row.get(2)?,
      daypart_key:  row.get(3)?,
      revenue:      row.get(4)?,
      cogs:         row.get(5)?,
      gross_margin: row.get(6)?,
      labor_cost:   row.get(7)?,
      labor_pct:    row.get(8)?,
      opex:         row.get(9)?,
      net_profit:   row.get(10)?,
      covers:       row.get(11)?,
      avg_check:    row.get(12)?,
      discounts:    row.get(13)?,
      comps:        row.get(14)?,
      freshness:    row.get(15)?,
    })
  }

  pub fn into_aggregate(self) -> Result<KpiAggregate> {
    Ok(KpiAggregate {
      date:         decode_date(&self.date)?,
      location_id:  decode_uuid(&self.location_id)?,
      channel_id:   decode_key(&self.channel_key)?,
      daypart_id:   decode_key(&self.daypart_key)?,
      revenue:      decode_dec(&self.revenue)?,
      cogs:         decode_dec(&self.cogs)?,
      gross_margin: decode_dec(&self.gross_margin)?,
      labor_cost:   decode_dec(&self.labor_cost)?,
      labor_pct:    decode_dec(&self.labor_pct)?,
      opex:         decode_dec(&self.opex)?,
      net_profit:   decode_dec(&self.net_profit)?,
      covers:       self.covers,
      avg_check:    decode_dec(&self.avg_check)?,
      discounts:    decode_dec(&self.discounts)?,
      comps:        decode_dec(&self.comps)?,
      freshness:    decode_dt(&self.freshness)?,
    })
  }
}
