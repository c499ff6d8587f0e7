//! [`SqliteStore`], the SQLite implementation of [`FinanceStore`].

use std::{collections::HashSet, path::Path};

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use till_core::{
  SourceType,
  job::{ImportAnomaly, ImportJob, JobStatus, NewAnomaly, NewImportJob, RowCounts},
  kpi::KpiAggregate,
  ledger::{
    Channel, Daypart, InventorySnapshot, MenuItem, NewDaypart,
    NewInventorySnapshot, NewMenuItem, NewPayrollPeriod, NewSale,
    PayrollPeriod, Sale, SaleLine, SaleLineCost, channel_code,
  },
  mapping::{MappingProfile, NewMappingProfile},
  store::FinanceStore,
};

use crate::{
  Error, Result,
  encode::{
    AGGREGATE_COLUMNS, ANOMALY_COLUMNS, CHANNEL_COLUMNS, DAYPART_COLUMNS,
    INVENTORY_COLUMNS, JOB_COLUMNS, MAPPING_COLUMNS, MENU_ITEM_COLUMNS,
    PAYROLL_COLUMNS, RawAggregate, RawAnomaly, RawChannel, RawDaypart,
    RawInventory, RawJob, RawMapping, RawMenuItem, RawPayroll, RawSale,
    RawSaleLineCost, SALE_COLUMNS, decode_date, encode_count, encode_date,
    encode_dec, encode_dt, encode_key, encode_local, encode_string_map,
    encode_time, encode_uuid,
  },
  schema::SCHEMA,
};

const ACTIVE_STATUSES: &str = "('pending', 'processing')";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Till finance store backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_job(&self, sql: String, params: Vec<Value>) -> Result<Option<ImportJob>> {
    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params_from_iter(params), RawJob::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }

  async fn query_jobs(&self, sql: String, params: Vec<Value>) -> Result<Vec<ImportJob>> {
    let raws: Vec<RawJob> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawJob::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawJob::into_job).collect()
  }
}

// ─── FinanceStore impl ───────────────────────────────────────────────────────

impl FinanceStore for SqliteStore {
  type Error = Error;

  // ── Import jobs ───────────────────────────────────────────────────────────

  async fn create_job(&self, input: NewImportJob, payload: Vec<u8>) -> Result<ImportJob> {
    let job = ImportJob {
      job_id:         Uuid::new_v4(),
      source_type:    input.source_type,
      status:         JobStatus::Pending,
      file_name:      input.file_name,
      file_hash:      input.file_hash,
      total_rows:     0,
      processed_rows: 0,
      error_rows:     0,
      location_id:    input.location_id,
      mapping_id:     input.mapping_id,
      created_by:     input.created_by,
      created_at:     Utc::now(),
      completed_at:   None,
      error_message:  None,
    };

    let id_str      = encode_uuid(job.job_id);
    let source_str  = job.source_type.as_ref().to_owned();
    let status_str  = job.status.as_ref().to_owned();
    let file_name   = job.file_name.clone();
    let file_hash   = job.file_hash.clone();
    let location    = encode_uuid(job.location_id);
    let mapping     = job.mapping_id.map(encode_uuid);
    let created_by  = encode_uuid(job.created_by);
    let created_at  = encode_dt(job.created_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO import_jobs (
             job_id, source_type, status, file_name, file_hash,
             location_id, mapping_id, created_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str, source_str, status_str, file_name, file_hash,
            location, mapping, created_by, created_at,
          ],
        )?;
        tx.execute(
          "INSERT INTO import_payloads (job_id, content) VALUES (?1, ?2)",
          rusqlite::params![id_str, payload],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(job)
  }

  async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>> {
    self
      .query_job(
        format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE job_id = ?1"),
        vec![encode_uuid(job_id).into()],
      )
      .await
  }

  async fn latest_job_by_hash(
    &self,
    location_id: Uuid,
    file_hash: String,
  ) -> Result<Option<ImportJob>> {
    self
      .query_job(
        format!(
          "SELECT {JOB_COLUMNS} FROM import_jobs
           WHERE location_id = ?1 AND file_hash = ?2
           ORDER BY created_at DESC, rowid DESC
           LIMIT 1"
        ),
        vec![encode_uuid(location_id).into(), file_hash.into()],
      )
      .await
  }

  async fn list_jobs(&self, location_id: Uuid, limit: usize) -> Result<Vec<ImportJob>> {
    self
      .query_jobs(
        format!(
          "SELECT {JOB_COLUMNS} FROM import_jobs
           WHERE location_id = ?1
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2"
        ),
        vec![
          encode_uuid(location_id).into(),
          i64::try_from(limit).unwrap_or(i64::MAX).into(),
        ],
      )
      .await
  }

  async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<ImportJob>> {
    self
      .query_jobs(
        format!(
          "SELECT {JOB_COLUMNS} FROM import_jobs
           WHERE status = ?1
           ORDER BY created_at ASC, rowid ASC"
        ),
        vec![status.as_ref().to_owned().into()],
      )
      .await
  }

  async fn job_payload(&self, job_id: Uuid) -> Result<Option<Vec<u8>>> {
    let id_str = encode_uuid(job_id);

    let payload = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT content FROM import_payloads WHERE job_id = ?1",
            rusqlite::params![id_str],
            |row| row.get::<_, Vec<u8>>(0),
          )
          .optional()?)
      })
      .await?;

    Ok(payload)
  }

  async fn claim_job(&self, job_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(job_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE import_jobs SET status = ?2 WHERE job_id = ?1 AND status = ?3",
          rusqlite::params![
            id_str,
            JobStatus::Processing.as_ref(),
            JobStatus::Pending.as_ref(),
          ],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn record_progress(&self, job_id: Uuid, counts: RowCounts) -> Result<()> {
    let id_str = encode_uuid(job_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE import_jobs
           SET total_rows = ?2, processed_rows = ?3, error_rows = ?4
           WHERE job_id = ?1 AND status = ?5",
          rusqlite::params![
            id_str,
            encode_count(counts.total),
            encode_count(counts.processed),
            encode_count(counts.errors),
            JobStatus::Processing.as_ref(),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn complete_job(&self, job_id: Uuid, counts: RowCounts) -> Result<ImportJob> {
    let id_str = encode_uuid(job_id);
    let now    = encode_dt(Utc::now());

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          &format!(
            "UPDATE import_jobs
             SET status = ?2, total_rows = ?3, processed_rows = ?4,
                 error_rows = ?5, completed_at = ?6
             WHERE job_id = ?1 AND status IN {ACTIVE_STATUSES}"
          ),
          rusqlite::params![
            id_str,
            JobStatus::Completed.as_ref(),
            encode_count(counts.total),
            encode_count(counts.processed),
            encode_count(counts.errors),
            now,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        tx.execute(
          "DELETE FROM import_payloads WHERE job_id = ?1",
          rusqlite::params![id_str],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE job_id = ?1"),
          rusqlite::params![id_str],
          RawJob::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.ok_or(Error::JobNotActive(job_id))?.into_job()
  }

  async fn fail_job(&self, job_id: Uuid, message: String) -> Result<()> {
    let id_str = encode_uuid(job_id);
    let now    = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          &format!(
            "UPDATE import_jobs
             SET status = ?2, error_message = ?3, completed_at = ?4
             WHERE job_id = ?1 AND status IN {ACTIVE_STATUSES}"
          ),
          rusqlite::params![id_str, JobStatus::Failed.as_ref(), message, now],
        )?;
        tx.execute(
          "DELETE FROM import_payloads WHERE job_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.commit()?;
        Ok(changed)
      })
      .await?;

    if changed == 0 {
      return Err(Error::JobNotActive(job_id));
    }
    Ok(())
  }

  async fn record_anomaly(&self, input: NewAnomaly) -> Result<ImportAnomaly> {
    let anomaly = ImportAnomaly {
      anomaly_id:  Uuid::new_v4(),
      job_id:      input.job_id,
      line_number: input.line_number,
      severity:    input.severity,
      message:     input.message,
      raw_data:    input.raw_data,
      created_at:  Utc::now(),
    };

    let id_str   = encode_uuid(anomaly.anomaly_id);
    let job_str  = encode_uuid(anomaly.job_id);
    let line     = encode_count(anomaly.line_number);
    let severity = anomaly.severity.as_ref().to_owned();
    let message  = anomaly.message.clone();
    let raw_data = anomaly.raw_data.clone();
    let at_str   = encode_dt(anomaly.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO import_anomalies ({ANOMALY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          ),
          rusqlite::params![id_str, job_str, line, severity, message, raw_data, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(anomaly)
  }

  async fn anomalies_for_job(&self, job_id: Uuid) -> Result<Vec<ImportAnomaly>> {
    let job_str = encode_uuid(job_id);

    let raws: Vec<RawAnomaly> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ANOMALY_COLUMNS} FROM import_anomalies
           WHERE job_id = ?1
           ORDER BY line_number ASC, rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![job_str], RawAnomaly::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnomaly::into_anomaly).collect()
  }

  // ── Mapping profiles ──────────────────────────────────────────────────────

  async fn create_mapping(&self, input: NewMappingProfile) -> Result<MappingProfile> {
    let now = Utc::now();
    let profile = MappingProfile {
      mapping_id:  Uuid::new_v4(),
      name:        input.name,
      source_type: input.source_type,
      location_id: input.location_id,
      column_map:  input.column_map,
      defaults:    input.defaults,
      created_by:  input.created_by,
      created_at:  now,
      updated_at:  now,
    };

    let id_str     = encode_uuid(profile.mapping_id);
    let name       = profile.name.clone();
    let source_str = profile.source_type.as_ref().to_owned();
    let location   = encode_uuid(profile.location_id);
    let column_map = encode_string_map(&profile.column_map)?;
    let defaults   = encode_string_map(&profile.defaults)?;
    let created_by = encode_uuid(profile.created_by);
    let at_str     = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO mapping_profiles ({MAPPING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"
          ),
          rusqlite::params![
            id_str, name, source_str, location, column_map, defaults,
            created_by, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(profile)
  }

  async fn get_mapping(&self, mapping_id: Uuid) -> Result<Option<MappingProfile>> {
    let id_str = encode_uuid(mapping_id);

    let raw: Option<RawMapping> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MAPPING_COLUMNS} FROM mapping_profiles WHERE mapping_id = ?1"),
            rusqlite::params![id_str],
            RawMapping::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMapping::into_mapping).transpose()
  }

  async fn list_mappings(
    &self,
    location_id: Uuid,
    source_type: Option<SourceType>,
  ) -> Result<Vec<MappingProfile>> {
    let location   = encode_uuid(location_id);
    let source_str = source_type.map(|s| s.as_ref().to_owned());

    let raws: Vec<RawMapping> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MAPPING_COLUMNS} FROM mapping_profiles
           WHERE location_id = ?1 AND (?2 IS NULL OR source_type = ?2)
           ORDER BY source_type ASC, name ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location, source_str], RawMapping::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMapping::into_mapping).collect()
  }

  async fn delete_mapping(&self, mapping_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(mapping_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM mapping_profiles WHERE mapping_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Reference data ────────────────────────────────────────────────────────

  async fn find_or_create_channel(&self, location_id: Uuid, name: String) -> Result<Channel> {
    let name       = name.trim().to_owned();
    let code       = channel_code(&name);
    let channel_id = encode_uuid(Uuid::new_v4());
    let location   = encode_uuid(location_id);

    let raw: RawChannel = self
      .conn
      .call(move |conn| {
        let existing = conn
          .query_row(
            &format!(
              "SELECT {CHANNEL_COLUMNS} FROM service_channels
               WHERE location_id = ?1 AND lower(display_name) = lower(?2)
               LIMIT 1"
            ),
            rusqlite::params![location, name],
            RawChannel::from_row,
          )
          .optional()?;
        if let Some(raw) = existing {
          return Ok(raw);
        }

        // Another writer may have created the same code in the meantime; the
        // unique key turns that into a no-op and the read below finds it.
        conn.execute(
          "INSERT INTO service_channels (channel_id, location_id, code, display_name)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (location_id, code) DO NOTHING",
          rusqlite::params![channel_id, location, code, name],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {CHANNEL_COLUMNS} FROM service_channels
             WHERE location_id = ?1 AND code = ?2"
          ),
          rusqlite::params![location, code],
          RawChannel::from_row,
        )?)
      })
      .await?;

    raw.into_channel()
  }

  async fn list_channels(&self, location_id: Uuid) -> Result<Vec<Channel>> {
    let location = encode_uuid(location_id);

    let raws: Vec<RawChannel> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CHANNEL_COLUMNS} FROM service_channels
           WHERE location_id = ?1
           ORDER BY display_name ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location], RawChannel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChannel::into_channel).collect()
  }

  async fn upsert_daypart(&self, input: NewDaypart) -> Result<Daypart> {
    let id_str = encode_uuid(Uuid::new_v4());
    let start  = encode_time(input.start_time);
    let end    = encode_time(input.end_time);

    let raw: RawDaypart = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO dayparts ({DAYPART_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (code) DO UPDATE SET
               display_name = excluded.display_name,
               start_time   = excluded.start_time,
               end_time     = excluded.end_time
             RETURNING {DAYPART_COLUMNS}"
          ),
          rusqlite::params![id_str, input.code, input.display_name, start, end],
          RawDaypart::from_row,
        )?)
      })
      .await?;

    raw.into_daypart()
  }

  async fn list_dayparts(&self) -> Result<Vec<Daypart>> {
    let raws: Vec<RawDaypart> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DAYPART_COLUMNS} FROM dayparts ORDER BY start_time ASC, code ASC"
        ))?;
        let rows = stmt
          .query_map([], RawDaypart::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDaypart::into_daypart).collect()
  }

  async fn upsert_menu_item(&self, input: NewMenuItem) -> Result<MenuItem> {
    let id_str   = encode_uuid(Uuid::new_v4());
    let location = encode_uuid(input.location_id);
    let cost     = encode_dec(input.recipe_cost);

    let raw: RawMenuItem = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO menu_items ({MENU_ITEM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (location_id, name) DO UPDATE SET
               recipe_cost = excluded.recipe_cost
             RETURNING {MENU_ITEM_COLUMNS}"
          ),
          rusqlite::params![id_str, location, input.name, cost],
          RawMenuItem::from_row,
        )?)
      })
      .await?;

    raw.into_menu_item()
  }

  async fn upsert_sale_line(&self, line: SaleLine) -> Result<()> {
    let sale_str = encode_uuid(line.sale_id);
    let item_str = encode_uuid(line.menu_item_id);
    let quantity = encode_dec(line.quantity);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sale_lines (sale_id, menu_item_id, quantity)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (sale_id, menu_item_id) DO UPDATE SET
             quantity = excluded.quantity",
          rusqlite::params![sale_str, item_str, quantity],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  // ── Domain upserts ────────────────────────────────────────────────────────

  async fn upsert_sale(&self, input: NewSale) -> Result<Sale> {
    let id_str        = encode_uuid(Uuid::new_v4());
    let location      = encode_uuid(input.location_id);
    let channel       = input.channel_id.map(encode_uuid);
    let daypart       = input.daypart_id.map(encode_uuid);
    let occurred_at   = encode_local(input.occurred_at);
    let business_date = encode_date(input.occurred_at.date());
    let subtotal      = encode_dec(input.subtotal);
    let tax           = encode_dec(input.tax);
    let discounts     = encode_dec(input.discounts);
    let comps         = encode_dec(input.comps);
    let total         = encode_dec(input.total);
    let updated_at    = encode_dt(Utc::now());

    let raw: RawSale = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO sales (
               sale_id, location_id, import_source, source_id, channel_id,
               daypart_id, occurred_at, business_date, subtotal, tax,
               discounts, comps, total, payment_method, covers, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT (location_id, import_source, source_id) DO UPDATE SET
               channel_id     = excluded.channel_id,
               daypart_id     = excluded.daypart_id,
               occurred_at    = excluded.occurred_at,
               business_date  = excluded.business_date,
               subtotal       = excluded.subtotal,
               tax            = excluded.tax,
               discounts      = excluded.discounts,
               comps          = excluded.comps,
               total          = excluded.total,
               payment_method = excluded.payment_method,
               covers         = excluded.covers,
               updated_at     = excluded.updated_at
             RETURNING {SALE_COLUMNS}"
          ),
          rusqlite::params![
            id_str,
            location,
            input.import_source,
            input.source_id,
            channel,
            daypart,
            occurred_at,
            business_date,
            subtotal,
            tax,
            discounts,
            comps,
            total,
            input.payment_method,
            input.covers,
            updated_at,
          ],
          RawSale::from_row,
        )?)
      })
      .await?;

    raw.into_sale()
  }

  async fn upsert_payroll_period(&self, input: NewPayrollPeriod) -> Result<PayrollPeriod> {
    let id_str         = encode_uuid(Uuid::new_v4());
    let location       = encode_uuid(input.location_id);
    let start          = encode_date(input.start_date);
    let end            = encode_date(input.end_date);
    let labor_cost     = encode_dec(input.labor_cost);
    let superannuation = encode_dec(input.superannuation);
    let tax_withheld   = encode_dec(input.tax_withheld);
    let updated_at     = encode_dt(Utc::now());

    let raw: RawPayroll = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO payroll_periods ({PAYROLL_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (location_id, start_date, end_date) DO UPDATE SET
               labor_cost     = excluded.labor_cost,
               superannuation = excluded.superannuation,
               tax_withheld   = excluded.tax_withheld,
               import_source  = excluded.import_source,
               updated_at     = excluded.updated_at
             RETURNING {PAYROLL_COLUMNS}"
          ),
          rusqlite::params![
            id_str, location, start, end, labor_cost, superannuation,
            tax_withheld, input.import_source, updated_at,
          ],
          RawPayroll::from_row,
        )?)
      })
      .await?;

    raw.into_period()
  }

  async fn upsert_inventory_snapshot(
    &self,
    input: NewInventorySnapshot,
  ) -> Result<InventorySnapshot> {
    let id_str      = encode_uuid(Uuid::new_v4());
    let location    = encode_uuid(input.location_id);
    let date        = encode_date(input.snapshot_date);
    let quantity    = encode_dec(input.quantity);
    let unit_cost   = encode_dec(input.unit_cost);
    let total_value = encode_dec(input.total_value);
    let updated_at  = encode_dt(Utc::now());

    let raw: RawInventory = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO inventory_snapshots ({INVENTORY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (location_id, snapshot_date, item_name) DO UPDATE SET
               category      = excluded.category,
               quantity      = excluded.quantity,
               unit          = excluded.unit,
               unit_cost     = excluded.unit_cost,
               total_value   = excluded.total_value,
               import_source = excluded.import_source,
               updated_at    = excluded.updated_at
             RETURNING {INVENTORY_COLUMNS}"
          ),
          rusqlite::params![
            id_str,
            location,
            date,
            input.item_name,
            input.category,
            quantity,
            input.unit,
            unit_cost,
            total_value,
            input.import_source,
            updated_at,
          ],
          RawInventory::from_row,
        )?)
      })
      .await?;

    raw.into_snapshot()
  }

  // ── Ledger reads ──────────────────────────────────────────────────────────

  async fn sales_for_day(&self, location_id: Uuid, date: NaiveDate) -> Result<Vec<Sale>> {
    let location = encode_uuid(location_id);
    let day      = encode_date(date);

    let raws: Vec<RawSale> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SALE_COLUMNS} FROM sales
           WHERE location_id = ?1 AND business_date = ?2
           ORDER BY occurred_at ASC, source_id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location, day], RawSale::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSale::into_sale).collect()
  }

  async fn sale_date_range(&self, location_id: Uuid) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let location = encode_uuid(location_id);

    let (first, last): (Option<String>, Option<String>) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MIN(business_date), MAX(business_date) FROM sales WHERE location_id = ?1",
          rusqlite::params![location],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?)
      })
      .await?;

    match (first, last) {
      (Some(first), Some(last)) => Ok(Some((decode_date(&first)?, decode_date(&last)?))),
      _ => Ok(None),
    }
  }

  async fn sale_line_costs_for_day(
    &self,
    location_id: Uuid,
    date: NaiveDate,
  ) -> Result<Vec<SaleLineCost>> {
    let location = encode_uuid(location_id);
    let day      = encode_date(date);

    let raws: Vec<RawSaleLineCost> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sl.sale_id, sl.quantity, mi.recipe_cost
           FROM sale_lines sl
           JOIN sales s       ON s.sale_id = sl.sale_id
           JOIN menu_items mi ON mi.menu_item_id = sl.menu_item_id
           WHERE s.location_id = ?1 AND s.business_date = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![location, day], |row| {
            Ok(RawSaleLineCost {
              sale_id:     row.get(0)?,
              quantity:    row.get(1)?,
              recipe_cost: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSaleLineCost::into_cost).collect()
  }

  async fn payroll_periods_covering(
    &self,
    location_id: Uuid,
    date: NaiveDate,
  ) -> Result<Vec<PayrollPeriod>> {
    let location = encode_uuid(location_id);
    let day      = encode_date(date);

    let raws: Vec<RawPayroll> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PAYROLL_COLUMNS} FROM payroll_periods
           WHERE location_id = ?1 AND start_date <= ?2 AND end_date >= ?2
           ORDER BY start_date ASC, end_date ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location, day], RawPayroll::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPayroll::into_period).collect()
  }

  async fn inventory_for_date(
    &self,
    location_id: Uuid,
    snapshot_date: NaiveDate,
  ) -> Result<Vec<InventorySnapshot>> {
    let location = encode_uuid(location_id);
    let day      = encode_date(snapshot_date);

    let raws: Vec<RawInventory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INVENTORY_COLUMNS} FROM inventory_snapshots
           WHERE location_id = ?1 AND snapshot_date = ?2
           ORDER BY item_name ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location, day], RawInventory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInventory::into_snapshot).collect()
  }

  // ── KPI aggregates ────────────────────────────────────────────────────────

  async fn replace_day_aggregates(
    &self,
    location_id: Uuid,
    date: NaiveDate,
    rows: Vec<KpiAggregate>,
  ) -> Result<()> {
    let location = encode_uuid(location_id);
    let day      = encode_date(date);

    let pruned = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut keep = HashSet::new();

        for row in &rows {
          let channel_key = encode_key(row.channel_id);
          let daypart_key = encode_key(row.daypart_id);
          tx.execute(
            &format!(
              "INSERT INTO kpi_aggregates ({AGGREGATE_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
               ON CONFLICT (date, location_id, channel_key, daypart_key) DO UPDATE SET
                 revenue      = excluded.revenue,
                 cogs         = excluded.cogs,
                 gross_margin = excluded.gross_margin,
                 labor_cost   = excluded.labor_cost,
                 labor_pct    = excluded.labor_pct,
                 opex         = excluded.opex,
                 net_profit   = excluded.net_profit,
                 covers       = excluded.covers,
                 avg_check    = excluded.avg_check,
                 discounts    = excluded.discounts,
                 comps        = excluded.comps,
                 freshness    = excluded.freshness"
            ),
            rusqlite::params![
              day,
              location,
              channel_key,
              daypart_key,
              encode_dec(row.revenue),
              encode_dec(row.cogs),
              encode_dec(row.gross_margin),
              encode_dec(row.labor_cost),
              encode_dec(row.labor_pct),
              encode_dec(row.opex),
              encode_dec(row.net_profit),
              row.covers,
              encode_dec(row.avg_check),
              encode_dec(row.discounts),
              encode_dec(row.comps),
              encode_dt(row.freshness),
            ],
          )?;
          keep.insert((channel_key, daypart_key));
        }

        let existing = {
          let mut stmt = tx.prepare(
            "SELECT channel_key, daypart_key FROM kpi_aggregates
             WHERE date = ?1 AND location_id = ?2",
          )?;
          stmt
            .query_map(rusqlite::params![day, location], |row| {
              Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut pruned = 0;
        for (channel_key, daypart_key) in existing {
          if keep.contains(&(channel_key.clone(), daypart_key.clone())) {
            continue;
          }
          pruned += tx.execute(
            "DELETE FROM kpi_aggregates
             WHERE date = ?1 AND location_id = ?2 AND channel_key = ?3 AND daypart_key = ?4",
            rusqlite::params![day, location, channel_key, daypart_key],
          )?;
        }

        tx.commit()?;
        Ok(pruned)
      })
      .await?;

    if pruned > 0 {
      tracing::debug!(%location_id, %date, pruned, "removed stale aggregate rows");
    }
    Ok(())
  }

  async fn list_aggregates(
    &self,
    location_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<KpiAggregate>> {
    let location = encode_uuid(location_id);
    let start    = encode_date(start);
    let end      = encode_date(end);

    let raws: Vec<RawAggregate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AGGREGATE_COLUMNS} FROM kpi_aggregates
           WHERE location_id = ?1 AND date BETWEEN ?2 AND ?3
           ORDER BY date ASC, channel_key ASC, daypart_key ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![location, start, end], RawAggregate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAggregate::into_aggregate).collect()
  }
}
