//! SQL schema for the Till SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// Decimals are stored as canonical text, instants as fixed-width RFC 3339,
/// and venue-local dates and times as ISO text so they sort lexically.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Jobs are never deleted.
CREATE TABLE IF NOT EXISTS import_jobs (
    job_id          TEXT PRIMARY KEY,
    source_type     TEXT NOT NULL,   -- 'sales' | 'labor' | 'inventory'
    status          TEXT NOT NULL,   -- 'pending' | 'processing' | 'completed' | 'failed'
    file_name       TEXT NOT NULL,
    file_hash       TEXT NOT NULL,
    total_rows      INTEGER NOT NULL DEFAULT 0,
    processed_rows  INTEGER NOT NULL DEFAULT 0,
    error_rows      INTEGER NOT NULL DEFAULT 0,
    location_id     TEXT NOT NULL,
    mapping_id      TEXT,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    completed_at    TEXT,
    error_message   TEXT
);

CREATE INDEX IF NOT EXISTS import_jobs_hash_idx   ON import_jobs(location_id, file_hash, created_at);
CREATE INDEX IF NOT EXISTS import_jobs_status_idx ON import_jobs(status, created_at);

-- Uploaded bytes of jobs that have not finished; dropped on completion.
CREATE TABLE IF NOT EXISTS import_payloads (
    job_id   TEXT PRIMARY KEY REFERENCES import_jobs(job_id),
    content  BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS import_anomalies (
    anomaly_id   TEXT PRIMARY KEY,
    job_id       TEXT NOT NULL REFERENCES import_jobs(job_id),
    line_number  INTEGER NOT NULL,
    severity     TEXT NOT NULL,   -- 'error' | 'warning'
    message      TEXT NOT NULL,
    raw_data     TEXT,            -- JSON object of header -> cell
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS import_anomalies_job_idx ON import_anomalies(job_id, line_number);

CREATE TABLE IF NOT EXISTS mapping_profiles (
    mapping_id   TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    source_type  TEXT NOT NULL,
    location_id  TEXT NOT NULL,
    column_map   TEXT NOT NULL,   -- JSON object
    defaults     TEXT NOT NULL DEFAULT '{}',
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS service_channels (
    channel_id    TEXT PRIMARY KEY,
    location_id   TEXT NOT NULL,
    code          TEXT NOT NULL,
    display_name  TEXT NOT NULL,
    UNIQUE (location_id, code)
);

CREATE TABLE IF NOT EXISTS dayparts (
    daypart_id    TEXT PRIMARY KEY,
    code          TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS menu_items (
    menu_item_id  TEXT PRIMARY KEY,
    location_id   TEXT NOT NULL,
    name          TEXT NOT NULL,
    recipe_cost   TEXT NOT NULL,
    UNIQUE (location_id, name)
);

CREATE TABLE IF NOT EXISTS sales (
    sale_id         TEXT PRIMARY KEY,
    location_id     TEXT NOT NULL,
    import_source   TEXT NOT NULL,
    source_id       TEXT NOT NULL,
    channel_id      TEXT REFERENCES service_channels(channel_id),
    daypart_id      TEXT REFERENCES dayparts(daypart_id),
    occurred_at     TEXT NOT NULL,   -- venue-local wall clock
    business_date   TEXT NOT NULL,   -- date part of occurred_at
    subtotal        TEXT NOT NULL,
    tax             TEXT NOT NULL,
    discounts       TEXT NOT NULL,
    comps           TEXT NOT NULL,
    total           TEXT NOT NULL,
    payment_method  TEXT,
    covers          INTEGER,
    updated_at      TEXT NOT NULL,
    UNIQUE (location_id, import_source, source_id)
);

CREATE INDEX IF NOT EXISTS sales_day_idx ON sales(location_id, business_date);

CREATE TABLE IF NOT EXISTS sale_lines (
    sale_id       TEXT NOT NULL REFERENCES sales(sale_id),
    menu_item_id  TEXT NOT NULL REFERENCES menu_items(menu_item_id),
    quantity      TEXT NOT NULL,
    PRIMARY KEY (sale_id, menu_item_id)
);

CREATE TABLE IF NOT EXISTS payroll_periods (
    payroll_id      TEXT PRIMARY KEY,
    location_id     TEXT NOT NULL,
    start_date      TEXT NOT NULL,
    end_date        TEXT NOT NULL,
    labor_cost      TEXT NOT NULL,
    superannuation  TEXT NOT NULL,
    tax_withheld    TEXT NOT NULL,
    import_source   TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (location_id, start_date, end_date)
);

CREATE TABLE IF NOT EXISTS inventory_snapshots (
    snapshot_id    TEXT PRIMARY KEY,
    location_id    TEXT NOT NULL,
    snapshot_date  TEXT NOT NULL,
    item_name      TEXT NOT NULL,
    category       TEXT,
    quantity       TEXT NOT NULL,
    unit           TEXT NOT NULL,
    unit_cost      TEXT NOT NULL,
    total_value    TEXT NOT NULL,
    import_source  TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (location_id, snapshot_date, item_name)
);

-- An absent channel or daypart is stored as '' so it takes part in the
-- primary key as a value of its own.
CREATE TABLE IF NOT EXISTS kpi_aggregates (
    date          TEXT NOT NULL,
    location_id   TEXT NOT NULL,
    channel_key   TEXT NOT NULL DEFAULT '',
    daypart_key   TEXT NOT NULL DEFAULT '',
    revenue       TEXT NOT NULL,
    cogs          TEXT NOT NULL,
    gross_margin  TEXT NOT NULL,
    labor_cost    TEXT NOT NULL,
    labor_pct     TEXT NOT NULL,
    opex          TEXT NOT NULL,
    net_profit    TEXT NOT NULL,
    covers        INTEGER NOT NULL,
    avg_check     TEXT NOT NULL,
    discounts     TEXT NOT NULL,
    comps         TEXT NOT NULL,
    freshness     TEXT NOT NULL,
    PRIMARY KEY (date, location_id, channel_key, daypart_key)
);

PRAGMA user_version = 1;
";
