//! Background import workers.
//!
//! A bounded queue of job ids drained by a fixed number of tokio tasks. The
//! queue carries ids only; the bytes come from the payload persisted with
//! the job, and the job's status in the store is the only state the workers
//! share.

use std::{sync::Arc, time::Duration};

use till_core::store::FinanceStore;
use tokio::{
  sync::{Mutex, mpsc},
  task::JoinHandle,
  time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  IngestError, Result,
  aggregate::AggregationEngine,
  pipeline::{Ingestor, ProcessOutcome},
};

/// Sending half of the import queue.
#[derive(Debug, Clone)]
pub struct ImportQueue {
  tx: mpsc::Sender<Uuid>,
}

impl ImportQueue {
  /// Wait for room on the queue, then hand `job_id` to the workers.
  pub async fn enqueue(&self, job_id: Uuid) -> Result<()> {
    self
      .tx
      .send(job_id)
      .await
      .map_err(|_| IngestError::QueueClosed)?;
    debug!(%job_id, "job enqueued");
    Ok(())
  }

  /// Hand `job_id` to the workers if there is room. Returns `false` when the
  /// queue is full.
  pub fn try_enqueue(&self, job_id: Uuid) -> Result<bool> {
    match self.tx.try_send(job_id) {
      Ok(()) => {
        debug!(%job_id, "job enqueued");
        Ok(true)
      }
      Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
      Err(mpsc::error::TrySendError::Closed(_)) => Err(IngestError::QueueClosed),
    }
  }

  /// No ids are waiting for a worker.
  pub fn is_idle(&self) -> bool { self.tx.capacity() == self.tx.max_capacity() }
}

pub struct WorkerPool {
  queue:   ImportQueue,
  handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  /// Start `workers` tasks (at least one) over a queue holding up to
  /// `queue_depth` ids. Aggregates of a job's location are refreshed after
  /// each completed job.
  pub fn spawn<S>(
    ingestor: Arc<Ingestor<S>>,
    engine: Arc<AggregationEngine<S>>,
    workers: usize,
    queue_depth: usize,
  ) -> Self
  where
    S: FinanceStore + 'static,
  {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers.max(1))
      .map(|worker| {
        let rx = Arc::clone(&rx);
        let ingestor = Arc::clone(&ingestor);
        let engine = Arc::clone(&engine);
        tokio::spawn(run_worker(worker, rx, ingestor, engine))
      })
      .collect();

    Self { queue: ImportQueue { tx }, handles }
  }

  pub fn queue(&self) -> &ImportQueue { &self.queue }

  /// Close the queue and wait for the workers to drain it. Ids already
  /// queued are still processed. Clones of the queue handle keep it open,
  /// so drop them first.
  pub async fn shutdown(self) {
    drop(self.queue);
    for handle in self.handles {
      if let Err(err) = handle.await {
        error!(error = %err, "import worker panicked");
      }
    }
  }
}

async fn run_worker<S: FinanceStore>(
  worker: usize,
  rx: Arc<Mutex<mpsc::Receiver<Uuid>>>,
  ingestor: Arc<Ingestor<S>>,
  engine: Arc<AggregationEngine<S>>,
) {
  info!(worker, "import worker started");

  loop {
    let next = rx.lock().await.recv().await;
    let Some(job_id) = next else { break };

    match ingestor.process_stored(job_id).await {
      Ok(ProcessOutcome::Completed { job }) => {
        if let Err(err) = engine.refresh_aggregates(job.location_id).await {
          warn!(worker, %job_id, error = %err, "aggregate refresh failed");
        }
      }
      Ok(ProcessOutcome::Failed { .. }) => {}
      Ok(ProcessOutcome::Skipped { status, .. }) => {
        debug!(worker, %job_id, %status, "job already handled");
      }
      Err(err) => error!(worker, %job_id, error = %err, "import job errored"),
    }
  }

  info!(worker, "import worker stopped");
}

/// Refresh a location's aggregates every `period`, starting one period from
/// now. Runs until the returned task is aborted.
pub fn spawn_refresh_timer<S>(
  engine: Arc<AggregationEngine<S>>,
  location_id: Uuid,
  period: Duration,
) -> JoinHandle<()>
where
  S: FinanceStore + 'static,
{
  tokio::spawn(async move {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    timer.tick().await;

    loop {
      timer.tick().await;
      if let Err(err) = engine.refresh_aggregates(location_id).await {
        warn!(%location_id, error = %err, "scheduled aggregate refresh failed");
      }
    }
  })
}
