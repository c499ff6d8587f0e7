//! Worker configuration: `till.toml` overlaid with `TILL_*` variables.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use till_core::{ledger::NewDaypart, store::FinanceStore};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  /// Venue whose imports this worker handles; `--location` overrides it.
  pub location_id:           Option<Uuid>,
  #[serde(default = "default_workers")]
  pub workers:               usize,
  #[serde(default = "default_queue_depth")]
  pub queue_depth:           usize,
  #[serde(default = "default_progress_every")]
  pub progress_every:        u64,
  /// Periodic aggregate refresh while `run` is active; off when unset.
  pub refresh_interval_secs: Option<u64>,
  /// How often `run` looks for jobs queued by other processes.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs:    u64,
  #[serde(default = "default_dayparts")]
  pub dayparts:              Vec<DaypartConfig>,
}

/// One daypart window; times are `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Deserialize)]
pub struct DaypartConfig {
  pub code:  String,
  pub name:  String,
  pub start: String,
  pub end:   String,
}

fn default_store_path() -> PathBuf { PathBuf::from("till.db") }
fn default_workers() -> usize { 2 }
fn default_queue_depth() -> usize { 64 }
fn default_progress_every() -> u64 { till_ingest::pipeline::DEFAULT_PROGRESS_EVERY }
fn default_poll_interval() -> u64 { 5 }

fn default_dayparts() -> Vec<DaypartConfig> {
  [
    ("breakfast", "Breakfast", "07:00", "11:00"),
    ("lunch", "Lunch", "11:00", "15:00"),
    ("dinner", "Dinner", "15:00", "20:00"),
  ]
  .into_iter()
  .map(|(code, name, start, end)| DaypartConfig {
    code:  code.to_owned(),
    name:  name.to_owned(),
    start: start.to_owned(),
    end:   end.to_owned(),
  })
  .collect()
}

impl WorkerConfig {
  /// Read `path` if it exists, then apply `TILL_*` environment overrides.
  pub fn load(path: &Path) -> Result<Self> {
    ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(::config::Environment::with_prefix("TILL").try_parsing(true))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise WorkerConfig")
  }

  pub fn location(&self, flag: Option<Uuid>) -> Result<Uuid> {
    flag
      .or(self.location_id)
      .context("no location configured: set location_id or pass --location")
  }
}

impl DaypartConfig {
  fn to_new(&self) -> Result<NewDaypart> {
    let parse = |s: &str| {
      NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .with_context(|| format!("invalid time {s:?} for daypart {}", self.code))
    };
    let start_time = parse(&self.start)?;
    let end_time = parse(&self.end)?;
    anyhow::ensure!(
      start_time < end_time,
      "daypart {} ends before it starts",
      self.code
    );

    Ok(NewDaypart {
      code: self.code.clone(),
      display_name: self.name.clone(),
      start_time,
      end_time,
    })
  }
}

/// Upsert the configured daypart windows; safe to run on every start.
pub async fn seed_dayparts<S>(store: &S, dayparts: &[DaypartConfig]) -> Result<()>
where
  S: FinanceStore,
{
  for daypart in dayparts {
    store
      .upsert_daypart(daypart.to_new()?)
      .await
      .with_context(|| format!("failed to store daypart {}", daypart.code))?;
  }
  Ok(())
}
