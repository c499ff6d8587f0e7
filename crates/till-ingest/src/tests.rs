//! End-to-end tests of the import pipeline and aggregation over an
//! in-memory SQLite store.

use std::{collections::BTreeMap, fmt::Write as _, sync::Arc};

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use till_core::{
  SourceType,
  job::{ImportJob, JobStatus, Severity},
  ledger::{NewDaypart, NewMenuItem, SaleLine},
  mapping::NewMappingProfile,
  store::FinanceStore,
};
use till_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  AggregationEngine, IngestError, Ingestor, ProcessOutcome, StartImport, WorkerPool,
  pipeline::INTERRUPTED,
};

struct Harness {
  store:    Arc<SqliteStore>,
  ingestor: Ingestor<SqliteStore>,
  engine:   AggregationEngine<SqliteStore>,
  location: Uuid,
}

async fn harness() -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  for (code, start, end) in [("breakfast", 7, 11), ("lunch", 11, 15), ("dinner", 15, 20)] {
    store
      .upsert_daypart(NewDaypart {
        code:         code.into(),
        display_name: code.into(),
        start_time:   hm(start, 0),
        end_time:     hm(end, 0),
      })
      .await
      .unwrap();
  }

  Harness {
    ingestor: Ingestor::new(Arc::clone(&store)),
    engine: AggregationEngine::new(Arc::clone(&store)),
    store,
    location: Uuid::new_v4(),
  }
}

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).unwrap() }

fn hm(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

impl Harness {
  fn request(&self, source_type: SourceType, csv: &str, mapping_id: Option<Uuid>) -> StartImport {
    StartImport {
      source_type,
      file_name: format!("{source_type}.csv"),
      content: csv.as_bytes().to_vec(),
      location_id: self.location,
      mapping_id,
      user_id: Uuid::new_v4(),
    }
  }

  async fn start(&self, source_type: SourceType, csv: &str) -> ImportJob {
    self
      .ingestor
      .start_import(self.request(source_type, csv, None))
      .await
      .unwrap()
  }

  /// Start and process an import that is expected to complete.
  async fn import(&self, source_type: SourceType, csv: &str) -> ImportJob {
    let job = self.start(source_type, csv).await;
    match self.ingestor.process_stored(job.job_id).await.unwrap() {
      ProcessOutcome::Completed { job } => job,
      other => panic!("import did not complete: {other:?}"),
    }
  }

  async fn sales(&self, d: u32) -> Vec<till_core::ledger::Sale> {
    self.store.sales_for_day(self.location, day(d)).await.unwrap()
  }
}

// ─── Row disposition ─────────────────────────────────────────────────────────

#[tokio::test]
async fn rows_missing_a_date_become_anomalies_and_counts_balance() {
  let h = harness().await;
  let mut csv = String::from("Date,Time,Total,Tax,Transaction ID\n");
  for i in 1..=24 {
    let date = if i == 5 || i == 17 { "" } else { "2024-03-01" };
    writeln!(csv, "{date},12:00,10.00,1.00,TXN-{i}").unwrap();
  }

  let job = h.import(SourceType::Sales, &csv).await;
  assert_eq!(job.status, JobStatus::Completed);
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (24, 22, 2));
  assert!(job.completed_at.is_some());

  let detail = h.ingestor.get_job(job.job_id).await.unwrap();
  let lines: Vec<u64> = detail.anomalies.iter().map(|a| a.line_number).collect();
  assert_eq!(lines, vec![6, 18]);
  for anomaly in &detail.anomalies {
    assert_eq!(anomaly.severity, Severity::Error);
    assert_eq!(anomaly.message, "missing required field: date");
    assert!(anomaly.raw_data.as_deref().unwrap().contains("TXN-"));
  }

  assert_eq!(h.sales(1).await.len(), 22);
  assert_eq!(h.store.job_payload(job.job_id).await.unwrap(), None);
}

#[tokio::test]
async fn unparseable_total_is_one_anomaly_and_stays_out_of_aggregates() {
  let h = harness().await;
  let csv = "Date,Total,Tax\n2024-03-01,40.00,0\n2024-03-01,abc,0\n2024-03-01,60.00,0\n";

  let job = h.import(SourceType::Sales, csv).await;
  assert_eq!((job.processed_rows, job.error_rows), (2, 1));

  let anomalies = h.ingestor.get_job(job.job_id).await.unwrap().anomalies;
  assert_eq!(anomalies.len(), 1);
  assert_eq!(anomalies[0].line_number, 3);
  assert!(anomalies[0].message.contains("total"));

  h.engine.refresh_aggregates(h.location).await.unwrap();
  let rows = h.engine.list_aggregates(h.location, day(1), day(1)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].revenue, dec!(100.00));
}

#[tokio::test]
async fn file_with_only_bad_rows_still_completes() {
  let h = harness().await;
  let job = h
    .import(SourceType::Sales, "Date,Total\nyesterday,1\n,2\n")
    .await;

  assert_eq!(job.status, JobStatus::Completed);
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (2, 0, 2));
}

#[tokio::test]
async fn subtotal_is_derived_from_total_and_tax() {
  let h = harness().await;
  h.import(SourceType::Sales, "Date,Total,Tax\n2024-03-01,$110.00,10.00\n")
    .await;

  let sales = h.sales(1).await;
  assert_eq!(sales.len(), 1);
  assert_eq!(sales[0].subtotal, dec!(100.00));
  assert_eq!(sales[0].tax, dec!(10.00));
  assert_eq!(sales[0].discounts, Decimal::ZERO);
}

#[tokio::test]
async fn dayparts_are_resolved_from_time_of_day() {
  let h = harness().await;
  let csv = "Date,Time,Total,Transaction ID\n\
             2024-03-01,13:30,10,a\n\
             2024-03-01,14:59,10,b\n\
             2024-03-01,15:00,10,c\n\
             2024-03-01,03:00,10,d\n\
             2024-03-01,late,10,e\n";
  let job = h.import(SourceType::Sales, csv).await;
  assert_eq!(job.error_rows, 0);

  let codes: BTreeMap<Uuid, String> = h
    .store
    .list_dayparts()
    .await
    .unwrap()
    .into_iter()
    .map(|d| (d.daypart_id, d.code))
    .collect();
  let by_source: BTreeMap<String, Option<String>> = h
    .sales(1)
    .await
    .into_iter()
    .map(|s| (s.source_id, s.daypart_id.map(|id| codes[&id].clone())))
    .collect();

  assert_eq!(by_source["a"].as_deref(), Some("lunch"));
  assert_eq!(by_source["b"].as_deref(), Some("lunch"));
  assert_eq!(by_source["c"].as_deref(), Some("dinner"));
  assert_eq!(by_source["d"], None);
  assert_eq!(by_source["e"], None);
}

#[tokio::test]
async fn inventory_rows_become_snapshots() {
  let h = harness().await;
  let csv = "Snapshot Date,Item Name,Category,Quantity,Unit Cost\n\
             2024-03-01,Flour,Dry goods,12.5,$2.40\n\
             2024-03-01,Butter,,4,6.10\n";
  let job = h.import(SourceType::Inventory, csv).await;
  assert_eq!(job.processed_rows, 2);

  let snapshots = h.store.inventory_for_date(h.location, day(1)).await.unwrap();
  let flour = snapshots.iter().find(|s| s.item_name == "Flour").unwrap();
  assert_eq!(flour.total_value, dec!(30.00));
  assert_eq!(flour.unit, "ea");
  assert_eq!(flour.category.as_deref(), Some("Dry goods"));
}

// ─── Deduplication and convergence ───────────────────────────────────────────

#[tokio::test]
async fn identical_bytes_are_rejected_after_completion() {
  let h = harness().await;
  let csv = "Date,Total\n2024-03-01,25.00\n2024-03-01,35.00\n";
  let first = h.import(SourceType::Sales, csv).await;

  let err = h
    .ingestor
    .start_import(h.request(SourceType::Sales, csv, None))
    .await
    .unwrap_err();
  match err {
    IngestError::Duplicate { existing } => assert_eq!(existing.job_id, first.job_id),
    other => panic!("expected duplicate, got {other:?}"),
  }

  assert_eq!(h.ingestor.list_jobs(h.location, 10).await.unwrap().len(), 1);
  assert_eq!(h.sales(1).await.len(), 2);
}

#[tokio::test]
async fn corrected_reimport_updates_in_place() {
  let h = harness().await;
  h.import(
    SourceType::Sales,
    "Date,Total,Transaction ID\n2024-03-01,50.00,TXN-1\n2024-03-01,20.00,TXN-2\n",
  )
  .await;
  h.import(SourceType::Sales, "Date,Total,Transaction ID\n2024-03-01,55.00,TXN-1\n")
    .await;

  let sales = h.sales(1).await;
  assert_eq!(sales.len(), 2);
  let corrected = sales.iter().find(|s| s.source_id == "TXN-1").unwrap();
  assert_eq!(corrected.total, dec!(55.00));
}

#[tokio::test]
async fn racing_pending_jobs_for_the_same_file_converge() {
  let h = harness().await;
  let csv = "Date,Total\n2024-03-01,10\n2024-03-01,20\n2024-03-01,30\n";
  let a = h.start(SourceType::Sales, csv).await;
  let b = h.start(SourceType::Sales, csv).await;
  assert_ne!(a.job_id, b.job_id);

  let (ra, rb) = tokio::join!(
    h.ingestor.process_stored(a.job_id),
    h.ingestor.process_stored(b.job_id)
  );
  assert!(matches!(ra.unwrap(), ProcessOutcome::Completed { .. }));
  assert!(matches!(rb.unwrap(), ProcessOutcome::Completed { .. }));

  // Rows without a transaction id are keyed by hash prefix and line.
  let sales = h.sales(1).await;
  assert_eq!(sales.len(), 3);
  assert!(sales.iter().all(|s| s.source_id.starts_with(a.hash_prefix())));
}

#[tokio::test]
async fn a_job_is_processed_once() {
  let h = harness().await;
  let csv = "Date,Total\n2024-03-01,10\n";
  let job = h.start(SourceType::Sales, csv).await;

  let (first, second) = tokio::join!(
    h.ingestor.process_import(job.job_id, csv.as_bytes()),
    h.ingestor.process_import(job.job_id, csv.as_bytes())
  );
  let outcomes = [first.unwrap(), second.unwrap()];
  let completed = outcomes
    .iter()
    .filter(|o| matches!(o, ProcessOutcome::Completed { .. }))
    .count();
  assert_eq!(completed, 1);

  let again = h.ingestor.process_stored(job.job_id).await.unwrap();
  assert!(matches!(
    again,
    ProcessOutcome::Skipped { status: JobStatus::Completed, .. }
  ));
  assert_eq!(h.sales(1).await.len(), 1);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
  let h = harness().await;
  let err = h.ingestor.process_stored(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, IngestError::JobNotFound(_)));
}

// ─── Structural failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn empty_file_fails_the_job() {
  let h = harness().await;
  let job = h.start(SourceType::Sales, "").await;

  let outcome = h.ingestor.process_stored(job.job_id).await.unwrap();
  assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

  let job = h.ingestor.get_job(job.job_id).await.unwrap().job;
  assert_eq!(job.status, JobStatus::Failed);
  assert!(job.error_message.as_deref().unwrap().contains("header"));
}

#[tokio::test]
async fn mapping_for_another_source_fails_the_job() {
  let h = harness().await;
  let labor_profile = h
    .ingestor
    .create_mapping(NewMappingProfile {
      name:        "Xero payroll".into(),
      source_type: SourceType::Labor,
      location_id: h.location,
      column_map:  [("Start".to_owned(), "period_start".to_owned())].into(),
      defaults:    BTreeMap::new(),
      created_by:  Uuid::new_v4(),
    })
    .await
    .unwrap();

  let csv = "Date,Total\n2024-03-01,10\n";
  let job = h
    .ingestor
    .start_import(h.request(SourceType::Sales, csv, Some(labor_profile.mapping_id)))
    .await
    .unwrap();
  let outcome = h.ingestor.process_stored(job.job_id).await.unwrap();

  let ProcessOutcome::Failed { message, .. } = outcome else {
    panic!("expected failure, got {outcome:?}");
  };
  assert!(message.contains("mapping profile"));
  assert!(h.sales(1).await.is_empty());

  // A failed job does not block the same bytes from being imported again.
  h.import(SourceType::Sales, csv).await;
  assert_eq!(h.sales(1).await.len(), 1);
}

#[tokio::test]
async fn deleted_mapping_fails_the_job() {
  let h = harness().await;
  let profile = h
    .ingestor
    .create_mapping(NewMappingProfile {
      name:        "Square".into(),
      source_type: SourceType::Sales,
      location_id: h.location,
      column_map:  [("Sale Date".to_owned(), "date".to_owned())].into(),
      defaults:    BTreeMap::new(),
      created_by:  Uuid::new_v4(),
    })
    .await
    .unwrap();
  let job = h
    .ingestor
    .start_import(h.request(SourceType::Sales, "Sale Date\n2024-03-01\n", Some(profile.mapping_id)))
    .await
    .unwrap();

  h.ingestor.delete_mapping(profile.mapping_id).await.unwrap();
  assert!(matches!(
    h.ingestor.delete_mapping(profile.mapping_id).await,
    Err(IngestError::MappingNotFound(_))
  ));

  let outcome = h.ingestor.process_stored(job.job_id).await.unwrap();
  assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
}

#[tokio::test]
async fn saved_profile_maps_custom_headers_and_defaults() {
  let h = harness().await;
  let profile = h
    .ingestor
    .create_mapping(NewMappingProfile {
      name:        "Lightspeed".into(),
      source_type: SourceType::Sales,
      location_id: h.location,
      column_map:  [
        ("Sale Date".to_owned(), "date".to_owned()),
        ("Amount".to_owned(), "total".to_owned()),
        ("Outlet".to_owned(), "channel".to_owned()),
      ]
      .into(),
      defaults:    [("channel".to_owned(), "Dine In".to_owned())].into(),
      created_by:  Uuid::new_v4(),
    })
    .await
    .unwrap();

  let csv = "Sale Date,Amount,Outlet\n2024-03-01,12.00,\n2024-03-01,8.00,dine in\n";
  let job = h
    .ingestor
    .start_import(h.request(SourceType::Sales, csv, Some(profile.mapping_id)))
    .await
    .unwrap();
  let outcome = h.ingestor.process_stored(job.job_id).await.unwrap();
  assert!(matches!(outcome, ProcessOutcome::Completed { .. }));

  let channels = h.store.list_channels(h.location).await.unwrap();
  assert_eq!(channels.len(), 1);
  assert_eq!(channels[0].code, "dine-in");
  assert!(
    h.sales(1)
      .await
      .iter()
      .all(|s| s.channel_id == Some(channels[0].channel_id))
  );

  let listed = h
    .ingestor
    .list_mappings(h.location, Some(SourceType::Sales))
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
  assert!(h.ingestor.default_mappings().contains_key(&SourceType::Labor));
}

// ─── Recovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn recovery_fails_interrupted_jobs_and_returns_pending_ones() {
  let h = harness().await;
  let interrupted = h.start(SourceType::Sales, "Date,Total\n2024-03-01,1\n").await;
  assert!(h.store.claim_job(interrupted.job_id).await.unwrap());
  let waiting = h.start(SourceType::Sales, "Date,Total\n2024-03-01,2\n").await;

  let pending = h.ingestor.recover().await.unwrap();
  assert_eq!(pending, vec![waiting.job_id]);

  let failed = h.ingestor.get_job(interrupted.job_id).await.unwrap().job;
  assert_eq!(failed.status, JobStatus::Failed);
  assert_eq!(failed.error_message.as_deref(), Some(INTERRUPTED));

  let outcome = h.ingestor.process_stored(waiting.job_id).await.unwrap();
  assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn labor_percentage_joins_payroll_to_sales() {
  let h = harness().await;
  let payroll = h
    .import(
      SourceType::Labor,
      "Period Start,Period End,Employee,Total Wages,Super\n\
       2024-03-04,2024-03-10,Ann,1200.00,132.00\n\
       2024-03-04,2024-03-10,Bo,900.00,99.00\n",
    )
    .await;
  assert_eq!((payroll.processed_rows, payroll.error_rows), (2, 0));

  h.import(SourceType::Sales, "Date,Total\n2024-03-06,600.00\n2024-03-06,400.00\n")
    .await;

  let summary = h.engine.refresh_aggregates(h.location).await.unwrap();
  assert_eq!((summary.first_day, summary.last_day), (Some(day(6)), Some(day(6))));
  assert_eq!((summary.days_refreshed, summary.days_failed, summary.rows_written), (1, 0, 1));

  let rows = h.engine.list_aggregates(h.location, day(1), day(31)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].revenue, dec!(1000.00));
  assert_eq!(rows[0].labor_cost, dec!(300.00));
  assert_eq!(rows[0].labor_pct, dec!(30.00));
  assert_eq!(rows[0].covers, 2);
  assert_eq!(rows[0].net_profit, dec!(700.00));
}

#[tokio::test]
async fn labor_only_day_inside_the_sales_range_gets_a_row() {
  let h = harness().await;
  h.import(
    SourceType::Labor,
    "Period Start,Period End,Total Wages\n2024-03-05,2024-03-05,250.00\n",
  )
  .await;
  h.import(SourceType::Sales, "Date,Total\n2024-03-04,100\n2024-03-06,100\n")
    .await;

  let summary = h.engine.refresh_aggregates(h.location).await.unwrap();
  assert_eq!(summary.days_refreshed, 3);

  let rows = h.engine.list_aggregates(h.location, day(5), day(5)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!((rows[0].channel_id, rows[0].daypart_id), (None, None));
  assert_eq!(rows[0].revenue, Decimal::ZERO);
  assert_eq!(rows[0].labor_cost, dec!(250.00));
  assert_eq!(rows[0].labor_pct, Decimal::ZERO);
}

#[tokio::test]
async fn cogs_comes_from_recipe_costs_of_sale_lines() {
  let h = harness().await;
  h.import(SourceType::Sales, "Date,Total,Transaction ID\n2024-03-01,30.00,T1\n")
    .await;
  let sale = h.sales(1).await.remove(0);
  let burger = h
    .store
    .upsert_menu_item(NewMenuItem {
      location_id: h.location,
      name:        "Burger".into(),
      recipe_cost: dec!(4.25),
    })
    .await
    .unwrap();
  h.store
    .upsert_sale_line(SaleLine {
      sale_id:      sale.sale_id,
      menu_item_id: burger.menu_item_id,
      quantity:     dec!(2),
    })
    .await
    .unwrap();

  h.engine.refresh_aggregates(h.location).await.unwrap();
  let totals = h.engine.totals(h.location, day(1), day(1)).await.unwrap();
  assert_eq!(totals.cogs, dec!(8.50));
  assert_eq!(totals.gross_margin, dec!(21.50));
}

#[tokio::test]
async fn refreshing_twice_changes_only_freshness() {
  let h = harness().await;
  h.import(
    SourceType::Sales,
    "Date,Time,Total,Channel\n\
     2024-03-01,08:00,12.00,Dine In\n\
     2024-03-01,12:30,30.00,Takeaway\n\
     2024-03-02,18:00,45.00,Dine In\n",
  )
  .await;

  h.engine.refresh_aggregates(h.location).await.unwrap();
  let first = h.engine.list_aggregates(h.location, day(1), day(2)).await.unwrap();
  h.engine.refresh_aggregates(h.location).await.unwrap();
  let second = h.engine.list_aggregates(h.location, day(1), day(2)).await.unwrap();

  assert_eq!(first.len(), 3);
  assert_eq!(first.len(), second.len());
  for (a, b) in first.iter().zip(&second) {
    assert!(b.freshness >= a.freshness);
    assert_eq!(
      till_core::kpi::KpiAggregate { freshness: a.freshness, ..b.clone() },
      *a
    );
  }
}

#[tokio::test]
async fn groups_that_disappear_are_pruned() {
  let h = harness().await;
  h.import(
    SourceType::Sales,
    "Date,Total,Channel,Transaction ID\n2024-03-01,20.00,Dine In,T1\n",
  )
  .await;
  h.engine.refresh_aggregates(h.location).await.unwrap();

  h.import(
    SourceType::Sales,
    "Date,Total,Channel,Transaction ID\n2024-03-01,20.00,Takeaway,T1\n",
  )
  .await;
  h.engine.refresh_aggregates(h.location).await.unwrap();

  let takeaway = h
    .store
    .list_channels(h.location)
    .await
    .unwrap()
    .into_iter()
    .find(|c| c.code == "takeaway")
    .unwrap();
  let rows = h.engine.list_aggregates(h.location, day(1), day(1)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].channel_id, Some(takeaway.channel_id));
}

// ─── Worker pool ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn worker_pool_processes_queued_jobs_and_aggregates() {
  let h = harness().await;
  let a = h.start(SourceType::Sales, "Date,Total\n2024-03-01,10.00\n").await;
  let b = h.start(SourceType::Sales, "Date,Total\n2024-03-02,15.00\n").await;

  let pool = WorkerPool::spawn(
    Arc::new(Ingestor::new(Arc::clone(&h.store)).with_progress_every(1)),
    Arc::new(AggregationEngine::new(Arc::clone(&h.store))),
    2,
    4,
  );
  pool.queue().enqueue(a.job_id).await.unwrap();
  pool.queue().enqueue(b.job_id).await.unwrap();
  pool.shutdown().await;

  for id in [a.job_id, b.job_id] {
    let job = h.ingestor.get_job(id).await.unwrap().job;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_rows, 1);
  }
  let rows = h.engine.list_aggregates(h.location, day(1), day(2)).await.unwrap();
  assert_eq!(rows.len(), 2);
}

// ─── Out-of-range amounts ────────────────────────────────────────────────────

#[tokio::test]
async fn inventory_value_past_the_decimal_range_is_an_anomaly() {
  let h = harness().await;
  let csv = "Snapshot Date,Item Name,Quantity,Unit Cost\n\
             2024-03-01,Flour,100000000000000000000,1000000000000\n\
             2024-03-01,Butter,4,6.10\n";

  let job = h.import(SourceType::Inventory, csv).await;
  assert_eq!(job.status, JobStatus::Completed);
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (2, 1, 1));

  let anomalies = h.ingestor.get_job(job.job_id).await.unwrap().anomalies;
  assert_eq!(anomalies.len(), 1);
  assert_eq!(anomalies[0].line_number, 2);
  assert_eq!(anomalies[0].message, "arithmetic overflow computing inventory value");

  let snapshots = h.store.inventory_for_date(h.location, day(1)).await.unwrap();
  assert_eq!(snapshots.len(), 1);
  assert_eq!(snapshots[0].item_name, "Butter");
}

#[tokio::test]
async fn payroll_row_that_overflows_its_period_is_an_anomaly() {
  let h = harness().await;
  let csv = "Period Start,Period End,Total Wages\n\
             2024-03-04,2024-03-10,70000000000000000000000000000\n\
             2024-03-04,2024-03-10,70000000000000000000000000000\n";

  let job = h.import(SourceType::Labor, csv).await;
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (2, 1, 1));

  let anomalies = h.ingestor.get_job(job.job_id).await.unwrap().anomalies;
  assert_eq!(anomalies[0].line_number, 3);
  assert_eq!(anomalies[0].message, "arithmetic overflow computing payroll labor cost");
}

#[tokio::test]
async fn day_whose_revenue_overflows_is_skipped() {
  let h = harness().await;
  let job = h
    .import(
      SourceType::Sales,
      "Date,Total\n\
       2024-03-01,50000000000000000000000000000\n\
       2024-03-01,50000000000000000000000000000\n\
       2024-03-02,25.00\n",
    )
    .await;
  assert_eq!((job.processed_rows, job.error_rows), (3, 0));

  let summary = h.engine.refresh_aggregates(h.location).await.unwrap();
  assert_eq!((summary.days_refreshed, summary.days_failed), (1, 1));

  assert!(h.engine.list_aggregates(h.location, day(1), day(1)).await.unwrap().is_empty());
  let rows = h.engine.list_aggregates(h.location, day(2), day(2)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].revenue, dec!(25.00));
}

// ─── Write failures ──────────────────────────────────────────────────────────

mod refusing {
  use chrono::NaiveDate;
  use till_core::{
    SourceType,
    job::{ImportAnomaly, ImportJob, JobStatus, NewAnomaly, NewImportJob, RowCounts},
    kpi::KpiAggregate,
    ledger::{
      Channel, Daypart, InventorySnapshot, MenuItem, NewDaypart, NewInventorySnapshot,
      NewMenuItem, NewPayrollPeriod, NewSale, PayrollPeriod, Sale, SaleLine, SaleLineCost,
    },
    mapping::{MappingProfile, NewMappingProfile},
    store::FinanceStore,
  };
  use till_store_sqlite::SqliteStore;
  use uuid::Uuid;

  #[derive(Debug, thiserror::Error)]
  pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] till_store_sqlite::Error),
    #[error("write refused for {0}")]
    Refused(String),
  }

  type Result<T> = std::result::Result<T, Error>;

  /// SQLite store that refuses sales with one source id and payroll periods
  /// starting on one date.
  pub struct RefusingStore {
    pub inner:          SqliteStore,
    pub refused_sale:   String,
    pub refused_period: NaiveDate,
  }

  impl FinanceStore for RefusingStore {
    type Error = Error;

    async fn create_job(&self, input: NewImportJob, payload: Vec<u8>) -> Result<ImportJob> {
      Ok(self.inner.create_job(input, payload).await?)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>> {
      Ok(self.inner.get_job(job_id).await?)
    }

    async fn latest_job_by_hash(
      &self,
      location_id: Uuid,
      file_hash: String,
    ) -> Result<Option<ImportJob>> {
      Ok(self.inner.latest_job_by_hash(location_id, file_hash).await?)
    }

    async fn list_jobs(&self, location_id: Uuid, limit: usize) -> Result<Vec<ImportJob>> {
      Ok(self.inner.list_jobs(location_id, limit).await?)
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<ImportJob>> {
      Ok(self.inner.list_jobs_by_status(status).await?)
    }

    async fn job_payload(&self, job_id: Uuid) -> Result<Option<Vec<u8>>> {
      Ok(self.inner.job_payload(job_id).await?)
    }

    async fn claim_job(&self, job_id: Uuid) -> Result<bool> {
      Ok(self.inner.claim_job(job_id).await?)
    }

    async fn record_progress(&self, job_id: Uuid, counts: RowCounts) -> Result<()> {
      Ok(self.inner.record_progress(job_id, counts).await?)
    }

    async fn complete_job(&self, job_id: Uuid, counts: RowCounts) -> Result<ImportJob> {
      Ok(self.inner.complete_job(job_id, counts).await?)
    }

    async fn fail_job(&self, job_id: Uuid, message: String) -> Result<()> {
      Ok(self.inner.fail_job(job_id, message).await?)
    }

    async fn record_anomaly(&self, input: NewAnomaly) -> Result<ImportAnomaly> {
      Ok(self.inner.record_anomaly(input).await?)
    }

    async fn anomalies_for_job(&self, job_id: Uuid) -> Result<Vec<ImportAnomaly>> {
      Ok(self.inner.anomalies_for_job(job_id).await?)
    }

    async fn create_mapping(&self, input: NewMappingProfile) -> Result<MappingProfile> {
      Ok(self.inner.create_mapping(input).await?)
    }

    async fn get_mapping(&self, mapping_id: Uuid) -> Result<Option<MappingProfile>> {
      Ok(self.inner.get_mapping(mapping_id).await?)
    }

    async fn list_mappings(
      &self,
      location_id: Uuid,
      source_type: Option<SourceType>,
    ) -> Result<Vec<MappingProfile>> {
      Ok(self.inner.list_mappings(location_id, source_type).await?)
    }

    async fn delete_mapping(&self, mapping_id: Uuid) -> Result<bool> {
      Ok(self.inner.delete_mapping(mapping_id).await?)
    }

    async fn find_or_create_channel(&self, location_id: Uuid, name: String) -> Result<Channel> {
      Ok(self.inner.find_or_create_channel(location_id, name).await?)
    }

    async fn list_channels(&self, location_id: Uuid) -> Result<Vec<Channel>> {
      Ok(self.inner.list_channels(location_id).await?)
    }

    async fn upsert_daypart(&self, input: NewDaypart) -> Result<Daypart> {
      Ok(self.inner.upsert_daypart(input).await?)
    }

    async fn list_dayparts(&self) -> Result<Vec<Daypart>> {
      Ok(self.inner.list_dayparts().await?)
    }

    async fn upsert_menu_item(&self, input: NewMenuItem) -> Result<MenuItem> {
      Ok(self.inner.upsert_menu_item(input).await?)
    }

    async fn upsert_sale_line(&self, line: SaleLine) -> Result<()> {
      Ok(self.inner.upsert_sale_line(line).await?)
    }

    async fn upsert_sale(&self, input: NewSale) -> Result<Sale> {
      if input.source_id == self.refused_sale {
        return Err(Error::Refused(input.source_id));
      }
      Ok(self.inner.upsert_sale(input).await?)
    }

    async fn upsert_payroll_period(&self, input: NewPayrollPeriod) -> Result<PayrollPeriod> {
      if input.start_date == self.refused_period {
        return Err(Error::Refused(input.start_date.to_string()));
      }
      Ok(self.inner.upsert_payroll_period(input).await?)
    }

    async fn upsert_inventory_snapshot(
      &self,
      input: NewInventorySnapshot,
    ) -> Result<InventorySnapshot> {
      Ok(self.inner.upsert_inventory_snapshot(input).await?)
    }

    async fn sales_for_day(&self, location_id: Uuid, date: NaiveDate) -> Result<Vec<Sale>> {
      Ok(self.inner.sales_for_day(location_id, date).await?)
    }

    async fn sale_date_range(&self, location_id: Uuid) -> Result<Option<(NaiveDate, NaiveDate)>> {
      Ok(self.inner.sale_date_range(location_id).await?)
    }

    async fn sale_line_costs_for_day(
      &self,
      location_id: Uuid,
      date: NaiveDate,
    ) -> Result<Vec<SaleLineCost>> {
      Ok(self.inner.sale_line_costs_for_day(location_id, date).await?)
    }

    async fn payroll_periods_covering(
      &self,
      location_id: Uuid,
      date: NaiveDate,
    ) -> Result<Vec<PayrollPeriod>> {
      Ok(self.inner.payroll_periods_covering(location_id, date).await?)
    }

    async fn inventory_for_date(
      &self,
      location_id: Uuid,
      snapshot_date: NaiveDate,
    ) -> Result<Vec<InventorySnapshot>> {
      Ok(self.inner.inventory_for_date(location_id, snapshot_date).await?)
    }

    async fn replace_day_aggregates(
      &self,
      location_id: Uuid,
      date: NaiveDate,
      rows: Vec<KpiAggregate>,
    ) -> Result<()> {
      Ok(self.inner.replace_day_aggregates(location_id, date, rows).await?)
    }

    async fn list_aggregates(
      &self,
      location_id: Uuid,
      start: NaiveDate,
      end: NaiveDate,
    ) -> Result<Vec<KpiAggregate>> {
      Ok(self.inner.list_aggregates(location_id, start, end).await?)
    }
  }
}

async fn refusing_ingestor() -> (Ingestor<refusing::RefusingStore>, Uuid) {
  let store = refusing::RefusingStore {
    inner:          SqliteStore::open_in_memory().await.expect("in-memory store"),
    refused_sale:   "TXN-BAD".into(),
    refused_period: day(4),
  };
  (Ingestor::new(Arc::new(store)), Uuid::new_v4())
}

async fn process_csv<S: FinanceStore>(
  ingestor: &Ingestor<S>,
  location_id: Uuid,
  source_type: SourceType,
  csv: &str,
) -> ImportJob {
  let job = ingestor
    .start_import(StartImport {
      source_type,
      file_name: format!("{source_type}.csv"),
      content: csv.as_bytes().to_vec(),
      location_id,
      mapping_id: None,
      user_id: Uuid::new_v4(),
    })
    .await
    .unwrap();
  match ingestor.process_stored(job.job_id).await.unwrap() {
    ProcessOutcome::Completed { job } => job,
    other => panic!("import did not complete: {other:?}"),
  }
}

#[tokio::test]
async fn refused_sale_write_is_an_anomaly_and_the_rest_are_written() {
  let (ingestor, location) = refusing_ingestor().await;
  let csv = "Date,Total,Transaction ID\n\
             2024-03-01,10.00,TXN-1\n\
             2024-03-01,20.00,TXN-BAD\n\
             2024-03-01,30.00,TXN-3\n";

  let job = process_csv(&ingestor, location, SourceType::Sales, csv).await;
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (3, 2, 1));
  assert_eq!(job.processed_rows + job.error_rows, job.total_rows);

  let anomalies = ingestor.get_job(job.job_id).await.unwrap().anomalies;
  assert_eq!(anomalies.len(), 1);
  assert_eq!(anomalies[0].line_number, 3);
  assert_eq!(anomalies[0].message, "store error: write refused for TXN-BAD");
  assert!(anomalies[0].raw_data.as_deref().unwrap().contains("TXN-BAD"));

  let sales = ingestor.store().sales_for_day(location, day(1)).await.unwrap();
  assert_eq!(sales.len(), 2);
}

#[tokio::test]
async fn refused_payroll_period_marks_every_contributing_line() {
  let (ingestor, location) = refusing_ingestor().await;
  let csv = "Period Start,Period End,Employee,Total Wages\n\
             2024-03-04,2024-03-10,Ann,1200.00\n\
             2024-03-11,2024-03-17,Ann,1100.00\n\
             2024-03-04,2024-03-10,Bo,900.00\n";

  let job = process_csv(&ingestor, location, SourceType::Labor, csv).await;
  assert_eq!((job.total_rows, job.processed_rows, job.error_rows), (3, 1, 2));

  let anomalies = ingestor.get_job(job.job_id).await.unwrap().anomalies;
  let lines: Vec<u64> = anomalies.iter().map(|a| a.line_number).collect();
  assert_eq!(lines, vec![2, 4]);
  for anomaly in &anomalies {
    assert_eq!(anomaly.message, "store error: write refused for 2024-03-04");
  }

  let written = ingestor.store().payroll_periods_covering(location, day(12)).await.unwrap();
  assert_eq!(written.len(), 1);
  assert_eq!(written[0].labor_cost, dec!(1100.00));
  assert!(ingestor.store().payroll_periods_covering(location, day(5)).await.unwrap().is_empty());
}
