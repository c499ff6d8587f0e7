//! The `FinanceStore` trait.
//!
//! Implemented by storage backends (e.g. `till-store-sqlite`). The ingestion
//! pipeline, upserters and aggregation engine depend on this abstraction, not
//! on any concrete backend.
//!
//! Backends must enforce the natural-key uniqueness constraints documented on
//! each upsert: they are the only concurrency mechanism the pipeline relies
//! on.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  SourceType,
  job::{ImportAnomaly, ImportJob, JobStatus, NewAnomaly, NewImportJob, RowCounts},
  kpi::KpiAggregate,
  ledger::{
    Channel, Daypart, InventorySnapshot, MenuItem, NewDaypart,
    NewInventorySnapshot, NewMenuItem, NewPayrollPeriod, NewSale,
    PayrollPeriod, Sale, SaleLine, SaleLineCost,
  },
  mapping::{MappingProfile, NewMappingProfile},
};

/// Abstraction over a Till storage backend.
///
/// All methods return `Send` futures so the trait can be used from tokio
/// worker tasks.
pub trait FinanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Import jobs ───────────────────────────────────────────────────────

  /// Persist a new `pending` job together with the uploaded bytes.
  fn create_job(
    &self,
    input: NewImportJob,
    payload: Vec<u8>,
  ) -> impl Future<Output = Result<ImportJob, Self::Error>> + Send + '_;

  fn get_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<Option<ImportJob>, Self::Error>> + Send + '_;

  /// The most recently created job for `file_hash` at `location_id`.
  fn latest_job_by_hash(
    &self,
    location_id: Uuid,
    file_hash: String,
  ) -> impl Future<Output = Result<Option<ImportJob>, Self::Error>> + Send + '_;

  /// Jobs of a location, newest first.
  fn list_jobs(
    &self,
    location_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ImportJob>, Self::Error>> + Send + '_;

  /// Jobs in `status`, oldest first.
  fn list_jobs_by_status(
    &self,
    status: JobStatus,
  ) -> impl Future<Output = Result<Vec<ImportJob>, Self::Error>> + Send + '_;

  /// The uploaded bytes of a job that has not yet finished.
  fn job_payload(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + '_;

  /// Atomically move a job from `pending` to `processing`.
  ///
  /// Returns `false` (and changes nothing) when the job is in any other
  /// state, so at most one caller ever wins the claim.
  fn claim_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Persist running counters of a `processing` job.
  fn record_progress(
    &self,
    job_id: Uuid,
    counts: RowCounts,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark a job `completed` with its final counters and drop its payload.
  fn complete_job(
    &self,
    job_id: Uuid,
    counts: RowCounts,
  ) -> impl Future<Output = Result<ImportJob, Self::Error>> + Send + '_;

  /// Mark a job `failed` with a message and drop its payload.
  fn fail_job(
    &self,
    job_id: Uuid,
    message: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn record_anomaly(
    &self,
    input: NewAnomaly,
  ) -> impl Future<Output = Result<ImportAnomaly, Self::Error>> + Send + '_;

  /// Anomalies of a job ordered by line number.
  fn anomalies_for_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ImportAnomaly>, Self::Error>> + Send + '_;

  // ── Mapping profiles ──────────────────────────────────────────────────

  fn create_mapping(
    &self,
    input: NewMappingProfile,
  ) -> impl Future<Output = Result<MappingProfile, Self::Error>> + Send + '_;

  fn get_mapping(
    &self,
    mapping_id: Uuid,
  ) -> impl Future<Output = Result<Option<MappingProfile>, Self::Error>> + Send + '_;

  /// Profiles of a location ordered by source type then name.
  fn list_mappings(
    &self,
    location_id: Uuid,
    source_type: Option<SourceType>,
  ) -> impl Future<Output = Result<Vec<MappingProfile>, Self::Error>> + Send + '_;

  /// Returns `false` if no such profile existed.
  fn delete_mapping(
    &self,
    mapping_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Reference data ────────────────────────────────────────────────────

  /// Case-insensitive lookup of a channel by name; created on first sight.
  /// Unique on (location, code), so concurrent callers converge on one row.
  fn find_or_create_channel(
    &self,
    location_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<Channel, Self::Error>> + Send + '_;

  fn list_channels(
    &self,
    location_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Channel>, Self::Error>> + Send + '_;

  /// Insert or update a daypart keyed by `code`.
  fn upsert_daypart(
    &self,
    input: NewDaypart,
  ) -> impl Future<Output = Result<Daypart, Self::Error>> + Send + '_;

  /// All dayparts ordered by start time.
  fn list_dayparts(
    &self,
  ) -> impl Future<Output = Result<Vec<Daypart>, Self::Error>> + Send + '_;

  /// Insert or update a menu item keyed by (location, name).
  fn upsert_menu_item(
    &self,
    input: NewMenuItem,
  ) -> impl Future<Output = Result<MenuItem, Self::Error>> + Send + '_;

  /// Insert or update a sale line keyed by (sale, menu item).
  fn upsert_sale_line(
    &self,
    line: SaleLine,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Domain upserts ────────────────────────────────────────────────────

  /// Insert or update keyed by (location, import source, source id).
  fn upsert_sale(
    &self,
    input: NewSale,
  ) -> impl Future<Output = Result<Sale, Self::Error>> + Send + '_;

  /// Insert or update keyed by (location, start date, end date).
  fn upsert_payroll_period(
    &self,
    input: NewPayrollPeriod,
  ) -> impl Future<Output = Result<PayrollPeriod, Self::Error>> + Send + '_;

  /// Insert or update keyed by (location, snapshot date, item name).
  fn upsert_inventory_snapshot(
    &self,
    input: NewInventorySnapshot,
  ) -> impl Future<Output = Result<InventorySnapshot, Self::Error>> + Send + '_;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// Sales of one business date, oldest first.
  fn sales_for_day(
    &self,
    location_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<Sale>, Self::Error>> + Send + '_;

  /// Earliest and latest business dates with sales, if any.
  fn sale_date_range(
    &self,
    location_id: Uuid,
  ) -> impl Future<Output = Result<Option<(NaiveDate, NaiveDate)>, Self::Error>>
  + Send
  + '_;

  /// Lines of the day's sales joined to their recipe costs.
  fn sale_line_costs_for_day(
    &self,
    location_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<SaleLineCost>, Self::Error>> + Send + '_;

  /// Payroll periods whose inclusive range contains `date`.
  fn payroll_periods_covering(
    &self,
    location_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<PayrollPeriod>, Self::Error>> + Send + '_;

  fn inventory_for_date(
    &self,
    location_id: Uuid,
    snapshot_date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<InventorySnapshot>, Self::Error>> + Send + '_;

  // ── KPI aggregates ────────────────────────────────────────────────────

  /// Replace the aggregate rows of one (location, date) in a single
  /// transaction: every row in `rows` is upserted with all columns
  /// overwritten, and any existing row of that date whose key is absent from
  /// `rows` is removed.
  fn replace_day_aggregates(
    &self,
    location_id: Uuid,
    date: NaiveDate,
    rows: Vec<KpiAggregate>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Aggregates with `start ≤ date ≤ end`, ordered by date then key.
  fn list_aggregates(
    &self,
    location_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
  ) -> impl Future<Output = Result<Vec<KpiAggregate>, Self::Error>> + Send + '_;
}
