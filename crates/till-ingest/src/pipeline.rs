//! Ingestion pipeline: the import job state machine.
//!
//! `pending` → `processing` → `completed` | `failed`. A job is claimed by a
//! conditional status update in the store, so exactly one caller processes
//! it; every other caller sees [`ProcessOutcome::Skipped`].

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use sha2::{Digest, Sha256};
use till_core::{
  SourceType,
  job::{ImportAnomaly, ImportJob, JobStatus, NewAnomaly, NewImportJob, RowCounts},
  mapping::MappingProfile,
  store::FinanceStore,
};
use till_csv::{FieldMapper, RowOutcome, RowReader, SourceRecord};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  IngestError, Result,
  upsert::{PayrollBatch, Upserter},
};

pub const DEFAULT_PROGRESS_EVERY: u64 = 500;

/// Message stored on jobs found mid-flight at startup.
pub const INTERRUPTED: &str = "interrupted before completion";

/// Lowercase hex SHA-256 of an upload.
pub fn content_hash(content: &[u8]) -> String {
  hex::encode(Sha256::digest(content))
}

// ─── Requests and outcomes ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StartImport {
  pub source_type: SourceType,
  /// Already sanitized by the caller.
  pub file_name:   String,
  pub content:     Vec<u8>,
  pub location_id: Uuid,
  pub mapping_id:  Option<Uuid>,
  pub user_id:     Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProcessOutcome {
  Completed { job: ImportJob },
  /// The file could not be processed at all; no rows were written.
  Failed { job_id: Uuid, message: String },
  /// The job was not `pending`, so this call did nothing.
  Skipped { job_id: Uuid, status: JobStatus },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
  pub job:       ImportJob,
  pub anomalies: Vec<ImportAnomaly>,
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

pub struct Ingestor<S> {
  pub(crate) store: Arc<S>,
  progress_every:   u64,
}

impl<S: FinanceStore> Ingestor<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, progress_every: DEFAULT_PROGRESS_EVERY }
  }

  /// Persist running counters every `rows` rows. Zero is treated as one.
  pub fn with_progress_every(mut self, rows: u64) -> Self {
    self.progress_every = rows.max(1);
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Accept an upload: hash it, reject it if identical bytes already
  /// completed for this location, otherwise persist a `pending` job with its
  /// payload.
  ///
  /// A prior job for the same bytes that failed, or is still pending, does
  /// not block a new one.
  pub async fn start_import(&self, req: StartImport) -> Result<ImportJob> {
    let file_hash = content_hash(&req.content);

    let prior = self
      .store
      .latest_job_by_hash(req.location_id, file_hash.clone())
      .await
      .map_err(IngestError::store)?;
    if let Some(existing) = prior
      && existing.status == JobStatus::Completed
    {
      info!(
        job_id = %existing.job_id,
        file_name = %req.file_name,
        "rejected duplicate upload"
      );
      return Err(IngestError::Duplicate { existing: Box::new(existing) });
    }

    let job = self
      .store
      .create_job(
        NewImportJob {
          source_type: req.source_type,
          file_name:   req.file_name,
          file_hash,
          location_id: req.location_id,
          mapping_id:  req.mapping_id,
          created_by:  req.user_id,
        },
        req.content,
      )
      .await
      .map_err(IngestError::store)?;

    info!(
      job_id = %job.job_id,
      source_type = %job.source_type,
      file_name = %job.file_name,
      hash = %job.hash_prefix(),
      "import job created"
    );
    Ok(job)
  }

  /// Process a job from the payload stored when it was started.
  pub async fn process_stored(&self, job_id: Uuid) -> Result<ProcessOutcome> {
    let payload = self
      .store
      .job_payload(job_id)
      .await
      .map_err(IngestError::store)?;

    match payload {
      Some(content) => self.process_import(job_id, &content).await,
      None => {
        // Finished jobs have no payload; only a pending one is a problem.
        if !self.claim(job_id).await? {
          return self.skipped(job_id).await;
        }
        let message = "import payload missing".to_owned();
        warn!(%job_id, "pending import has no payload");
        self
          .store
          .fail_job(job_id, message.clone())
          .await
          .map_err(IngestError::store)?;
        Ok(ProcessOutcome::Failed { job_id, message })
      }
    }
  }

  /// Run a `pending` job over `content` to completion.
  ///
  /// File-level problems (unreadable header, mapping errors) mark the job
  /// `failed` and are reported as [`ProcessOutcome::Failed`]. Store
  /// failures are returned as errors after a best-effort attempt to fail
  /// the job.
  pub async fn process_import(&self, job_id: Uuid, content: &[u8]) -> Result<ProcessOutcome> {
    if !self.claim(job_id).await? {
      return self.skipped(job_id).await;
    }
    let job = self.load_job(job_id).await?;
    info!(%job_id, source_type = %job.source_type, bytes = content.len(), "processing import");

    match self.run(&job, content).await {
      Ok(counts) => {
        let job = self
          .store
          .complete_job(job_id, counts)
          .await
          .map_err(IngestError::store)?;
        info!(
          %job_id,
          total = counts.total,
          processed = counts.processed,
          errors = counts.errors,
          "import completed"
        );
        Ok(ProcessOutcome::Completed { job })
      }
      Err(err) if err.is_structural() => {
        let message = err.to_string();
        warn!(%job_id, error = %message, "import failed");
        self
          .store
          .fail_job(job_id, message.clone())
          .await
          .map_err(IngestError::store)?;
        Ok(ProcessOutcome::Failed { job_id, message })
      }
      Err(err) => {
        warn!(%job_id, error = %err, "import aborted");
        if let Err(fail_err) = self.store.fail_job(job_id, err.to_string()).await {
          warn!(%job_id, error = %fail_err, "could not mark job failed");
        }
        Err(err)
      }
    }
  }

  pub async fn get_job(&self, job_id: Uuid) -> Result<JobDetail> {
    let job = self.load_job(job_id).await?;
    let anomalies = self
      .store
      .anomalies_for_job(job_id)
      .await
      .map_err(IngestError::store)?;
    Ok(JobDetail { job, anomalies })
  }

  /// Jobs of a location, newest first.
  pub async fn list_jobs(&self, location_id: Uuid, limit: usize) -> Result<Vec<ImportJob>> {
    self
      .store
      .list_jobs(location_id, limit)
      .await
      .map_err(IngestError::store)
  }

  /// Settle jobs left behind by a previous process.
  ///
  /// Jobs still `processing` lost their worker and are failed. Returns the
  /// ids of `pending` jobs, oldest first, for the caller to enqueue again.
  pub async fn recover(&self) -> Result<Vec<Uuid>> {
    let orphaned = self
      .store
      .list_jobs_by_status(JobStatus::Processing)
      .await
      .map_err(IngestError::store)?;
    for job in orphaned {
      warn!(job_id = %job.job_id, file_name = %job.file_name, "failing interrupted import");
      self
        .store
        .fail_job(job.job_id, INTERRUPTED.to_owned())
        .await
        .map_err(IngestError::store)?;
    }

    let pending = self.pending_jobs().await?;
    if !pending.is_empty() {
      info!(count = pending.len(), "resuming pending imports");
    }
    Ok(pending)
  }

  /// Ids of jobs waiting to be processed, oldest first.
  pub async fn pending_jobs(&self) -> Result<Vec<Uuid>> {
    let pending = self
      .store
      .list_jobs_by_status(JobStatus::Pending)
      .await
      .map_err(IngestError::store)?;
    Ok(pending.into_iter().map(|job| job.job_id).collect())
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  async fn claim(&self, job_id: Uuid) -> Result<bool> {
    self
      .store
      .claim_job(job_id)
      .await
      .map_err(IngestError::store)
  }

  async fn load_job(&self, job_id: Uuid) -> Result<ImportJob> {
    self
      .store
      .get_job(job_id)
      .await
      .map_err(IngestError::store)?
      .ok_or(IngestError::JobNotFound(job_id))
  }

  async fn skipped(&self, job_id: Uuid) -> Result<ProcessOutcome> {
    let job = self.load_job(job_id).await?;
    debug!(%job_id, status = %job.status, "job not pending; skipped");
    Ok(ProcessOutcome::Skipped { job_id, status: job.status })
  }

  async fn resolve_mapping(&self, job: &ImportJob) -> Result<Option<MappingProfile>> {
    let Some(mapping_id) = job.mapping_id else {
      return Ok(None);
    };

    let profile = self
      .store
      .get_mapping(mapping_id)
      .await
      .map_err(IngestError::store)?
      .ok_or(IngestError::MappingNotFound(mapping_id))?;

    if profile.source_type != job.source_type {
      return Err(IngestError::MappingSourceMismatch {
        mapping_id,
        found: profile.source_type,
        expected: job.source_type,
      });
    }
    Ok(Some(profile))
  }

  /// Every row of `content` ends up either written or recorded as an
  /// anomaly; the returned counts always balance.
  async fn run(&self, job: &ImportJob, content: &[u8]) -> Result<RowCounts> {
    let profile = self.resolve_mapping(job).await?;
    let mapper = FieldMapper::new(job.source_type, profile.as_ref());
    let reader = RowReader::new(content, mapper)?;
    let mut upserter = Upserter::for_job(self.store.as_ref(), job).await?;
    let mut payroll = PayrollBatch::default();
    let mut counts = RowCounts::default();

    for row in reader {
      counts.total += 1;
      let line = row.line_number;

      if let Some(message) = row.error_message() {
        debug!(job_id = %job.job_id, line, %message, "row rejected");
        self.record_anomaly(job.job_id, line, message, &row.raw).await?;
        counts.errors += 1;
      } else if let RowOutcome::Valid(record) = row.outcome {
        // Labor rows are counted once their pay period is written.
        let written = match record {
          SourceRecord::Labor(labor) => payroll.add(line, &row.raw, &labor).map(|()| false),
          SourceRecord::Sales(sale) => upserter.upsert_sale(line, &sale).await.map(|_| true),
          SourceRecord::Inventory(item) => upserter.upsert_inventory(&item).await.map(|_| true),
        };
        match written {
          Ok(true) => counts.processed += 1,
          Ok(false) => {}
          Err(err) => {
            warn!(job_id = %job.job_id, line, error = %err, "row write failed");
            self.record_anomaly(job.job_id, line, err.to_string(), &row.raw).await?;
            counts.errors += 1;
          }
        }
      }

      if counts.total % self.progress_every == 0 {
        self
          .store
          .record_progress(job.job_id, counts)
          .await
          .map_err(IngestError::store)?;
      }
    }

    for group in payroll.into_groups() {
      let rows = group.rows.len() as u64;
      match upserter.upsert_payroll(&group).await {
        Ok(period) => {
          debug!(
            job_id = %job.job_id,
            start = %period.start_date,
            end = %period.end_date,
            rows,
            "payroll period written"
          );
          counts.processed += rows;
        }
        Err(err) => {
          warn!(
            job_id = %job.job_id,
            start = %group.start_date,
            end = %group.end_date,
            error = %err,
            "payroll period write failed"
          );
          let message = err.to_string();
          for (line, raw) in &group.rows {
            self.record_anomaly(job.job_id, *line, message.clone(), raw).await?;
          }
          counts.errors += rows;
        }
      }
    }

    debug_assert!(counts.is_balanced(), "unbalanced row counts: {counts:?}");
    Ok(counts)
  }

  async fn record_anomaly(
    &self,
    job_id: Uuid,
    line_number: u64,
    message: String,
    raw: &BTreeMap<String, String>,
  ) -> Result<()> {
    let anomaly = NewAnomaly::error(job_id, line_number, message).with_raw(raw)?;
    self
      .store
      .record_anomaly(anomaly)
      .await
      .map_err(IngestError::store)?;
    Ok(())
  }
}
