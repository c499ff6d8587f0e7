//! `till`: operator CLI and background worker for Till imports.
//!
//! # Usage
//!
//! ```text
//! till import sales exports/pos-2024-03.csv
//! till import labor payroll.csv --mapping 5f0c…
//! till jobs --limit 10
//! till job <job-id>
//! till refresh
//! till aggregates 2024-03-01 2024-03-31 --totals
//! till mapping add "Square POS" sales --column "Sale Date=date" --column "Gross=total"
//! till run
//! ```
//!
//! Configuration is read from `till.toml` (or `--config`) and `TILL_*`
//! environment variables.

mod config;

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use till_core::{SourceType, mapping::NewMappingProfile};
use till_ingest::{
  AggregationEngine, Ingestor, ProcessOutcome, StartImport, WorkerPool, spawn_refresh_timer,
};
use till_store_sqlite::SqliteStore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::{WorkerConfig, seed_dayparts};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "till", version, about = "Till CSV import worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "till.toml")]
  config: PathBuf,

  /// Location to act on; overrides `location_id` from the config.
  #[arg(long, global = true)]
  location: Option<Uuid>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import a CSV export.
  Import {
    /// sales, labor or inventory (`pos` and `payroll` also accepted).
    source_type: SourceType,
    file:        PathBuf,
    /// Saved mapping profile to read the file with.
    #[arg(long)]
    mapping:     Option<Uuid>,
    /// Identity recorded as the job's initiator.
    #[arg(long, default_value_t = Uuid::nil())]
    user:        Uuid,
    /// Only create the job; a running `till run` picks it up.
    #[arg(long)]
    defer:       bool,
  },
  /// List recent import jobs, newest first.
  Jobs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// Show one job with its anomalies.
  Job { job_id: Uuid },
  /// Recompute KPI aggregates for the location.
  Refresh,
  /// Print stored KPI aggregates for a date range.
  Aggregates {
    start:  NaiveDate,
    end:    NaiveDate,
    /// Print one rollup instead of every row.
    #[arg(long)]
    totals: bool,
  },
  /// Manage mapping profiles.
  Mapping {
    #[command(subcommand)]
    action: MappingCommand,
  },
  /// Process queued jobs in the background until interrupted.
  Run {
    /// Drain the jobs pending at startup, then exit.
    #[arg(long)]
    once: bool,
  },
}

#[derive(Subcommand)]
enum MappingCommand {
  /// Save a profile from `HEADER=field` pairs.
  Add {
    name:        String,
    source_type: SourceType,
    #[arg(long = "column", value_name = "HEADER=FIELD", value_parser = parse_pair, required = true)]
    columns:     Vec<(String, String)>,
    #[arg(long = "default", value_name = "FIELD=VALUE", value_parser = parse_pair)]
    defaults:    Vec<(String, String)>,
    #[arg(long, default_value_t = Uuid::nil())]
    user:        Uuid,
  },
  /// List saved profiles.
  List { source_type: Option<SourceType> },
  /// Show the built-in column maps.
  Defaults,
  /// Delete a profile.
  Delete { mapping_id: Uuid },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
  Ok((key.trim().to_owned(), value.trim().to_owned()))
}

// ─── Application ──────────────────────────────────────────────────────────────

struct App {
  config:   WorkerConfig,
  ingestor: Arc<Ingestor<SqliteStore>>,
  engine:   Arc<AggregationEngine<SqliteStore>>,
}

impl App {
  async fn open(config: WorkerConfig) -> Result<Self> {
    let store = SqliteStore::open(&config.store_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", config.store_path))?;
    seed_dayparts(&store, &config.dayparts).await?;

    let store = Arc::new(store);
    Ok(Self {
      ingestor: Arc::new(
        Ingestor::new(Arc::clone(&store)).with_progress_every(config.progress_every),
      ),
      engine: Arc::new(AggregationEngine::new(store)),
      config,
    })
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = WorkerConfig::load(&cli.config)?;
  let app = App::open(config).await?;

  match cli.command {
    Command::Import { source_type, file, mapping, user, defer } => {
      let location_id = app.config.location(cli.location)?;
      import(&app, location_id, source_type, &file, mapping, user, defer).await
    }
    Command::Jobs { limit } => {
      let location_id = app.config.location(cli.location)?;
      print_json(&app.ingestor.list_jobs(location_id, limit).await?)
    }
    Command::Job { job_id } => print_json(&app.ingestor.get_job(job_id).await?),
    Command::Refresh => {
      let location_id = app.config.location(cli.location)?;
      print_json(&app.engine.refresh_aggregates(location_id).await?)
    }
    Command::Aggregates { start, end, totals } => {
      let location_id = app.config.location(cli.location)?;
      if totals {
        print_json(&app.engine.totals(location_id, start, end).await?)
      } else {
        print_json(&app.engine.list_aggregates(location_id, start, end).await?)
      }
    }
    Command::Mapping { action } => mapping(&app, cli.location, action).await,
    Command::Run { once } => {
      let location_id = app.config.location(cli.location)?;
      run(&app, location_id, once).await
    }
  }
}

async fn import(
  app: &App,
  location_id: Uuid,
  source_type: SourceType,
  file: &Path,
  mapping_id: Option<Uuid>,
  user_id: Uuid,
  defer: bool,
) -> Result<()> {
  let content = tokio::fs::read(file)
    .await
    .with_context(|| format!("failed to read {}", file.display()))?;
  let file_name = file
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .context("import path has no file name")?;

  let job = app
    .ingestor
    .start_import(StartImport {
      source_type,
      file_name,
      content,
      location_id,
      mapping_id,
      user_id,
    })
    .await?;

  if defer {
    return print_json(&job);
  }

  let outcome = app.ingestor.process_stored(job.job_id).await?;
  if let ProcessOutcome::Completed { job } = &outcome {
    app.engine.refresh_aggregates(job.location_id).await?;
  }
  print_json(&outcome)
}

async fn mapping(app: &App, location: Option<Uuid>, action: MappingCommand) -> Result<()> {
  match action {
    MappingCommand::Add { name, source_type, columns, defaults, user } => {
      let profile = app
        .ingestor
        .create_mapping(NewMappingProfile {
          name,
          source_type,
          location_id: app.config.location(location)?,
          column_map: columns.into_iter().collect(),
          defaults: defaults.into_iter().collect(),
          created_by: user,
        })
        .await?;
      print_json(&profile)
    }
    MappingCommand::List { source_type } => {
      let location_id = app.config.location(location)?;
      print_json(&app.ingestor.list_mappings(location_id, source_type).await?)
    }
    MappingCommand::Defaults => {
      let defaults: BTreeMap<String, BTreeMap<String, String>> = app
        .ingestor
        .default_mappings()
        .into_iter()
        .map(|(source, columns)| (source.to_string(), columns))
        .collect();
      print_json(&defaults)
    }
    MappingCommand::Delete { mapping_id } => {
      app.ingestor.delete_mapping(mapping_id).await?;
      println!("deleted {mapping_id}");
      Ok(())
    }
  }
}

/// Settle jobs from a previous run, then feed pending jobs to the worker
/// pool until Ctrl-C (or, with `once`, until the backlog is drained).
async fn run(app: &App, location_id: Uuid, once: bool) -> Result<()> {
  let pool = WorkerPool::spawn(
    Arc::clone(&app.ingestor),
    Arc::clone(&app.engine),
    app.config.workers,
    app.config.queue_depth,
  );
  for job_id in app.ingestor.recover().await? {
    pool.queue().enqueue(job_id).await?;
  }

  if once {
    pool.shutdown().await;
    return Ok(());
  }

  let refresh = app.config.refresh_interval_secs.map(|secs| {
    spawn_refresh_timer(Arc::clone(&app.engine), location_id, Duration::from_secs(secs))
  });

  info!(
    workers = app.config.workers,
    %location_id,
    "worker running; press Ctrl-C to stop"
  );
  let mut poll = tokio::time::interval(Duration::from_secs(app.config.poll_interval_secs.max(1)));
  poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
  poll.tick().await;

  loop {
    tokio::select! {
      signal = tokio::signal::ctrl_c() => {
        signal.context("failed to listen for Ctrl-C")?;
        break;
      }
      _ = poll.tick() => {
        // Wait for earlier ids to be picked up so none is queued twice.
        if !pool.queue().is_idle() {
          continue;
        }
        match app.ingestor.pending_jobs().await {
          Ok(pending) => {
            for job_id in pending {
              if !pool.queue().try_enqueue(job_id)? {
                debug!("import queue full; deferring to next poll");
                break;
              }
            }
          }
          Err(err) => warn!(error = %err, "failed to poll for pending jobs"),
        }
      }
    }
  }

  info!("shutting down");
  if let Some(refresh) = refresh {
    refresh.abort();
  }
  pool.shutdown().await;
  Ok(())
}
