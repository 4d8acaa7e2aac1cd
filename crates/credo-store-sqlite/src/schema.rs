//! SQL schema for the Credo SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 strings (microseconds, `Z` suffix),
/// so lexical order is chronological order and range predicates can use
/// the indexes directly.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS issuers (
    issuer_id   TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    ticker      TEXT UNIQUE,
    cik         TEXT,
    sector      TEXT,
    country     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Observation tables are strictly append-only.
-- No UPDATE or DELETE is ever issued against them.
-- Prices hold one bar per issuer per timestamp.
CREATE TABLE IF NOT EXISTS feature_snapshots (
    snapshot_id   TEXT PRIMARY KEY,
    issuer_id     TEXT NOT NULL REFERENCES issuers(issuer_id),
    ts            TEXT NOT NULL,
    feature_name  TEXT NOT NULL,
    value         REAL NOT NULL,
    source        TEXT
);

CREATE TABLE IF NOT EXISTS prices (
    price_id   TEXT PRIMARY KEY,
    issuer_id  TEXT NOT NULL REFERENCES issuers(issuer_id),
    ts         TEXT NOT NULL,
    open       REAL NOT NULL,
    high       REAL NOT NULL,
    low        REAL NOT NULL,
    close      REAL NOT NULL,
    volume     REAL NOT NULL,
    adj_close  REAL NOT NULL,
    UNIQUE (issuer_id, ts)
);

CREATE TABLE IF NOT EXISTS macro_observations (
    macro_id  TEXT PRIMARY KEY,
    ts        TEXT NOT NULL,
    key       TEXT NOT NULL,
    value     REAL NOT NULL,
    source    TEXT
);

-- content_hash is deliberately not unique: re-ingested content is kept and
-- excluded at scoring time.
CREATE TABLE IF NOT EXISTS events (
    event_id      TEXT PRIMARY KEY,
    issuer_id     TEXT NOT NULL REFERENCES issuers(issuer_id),
    ts            TEXT NOT NULL,
    event_type    TEXT NOT NULL,
    sentiment     REAL NOT NULL,
    weight        REAL NOT NULL,
    headline      TEXT NOT NULL,
    url           TEXT,
    content_hash  TEXT NOT NULL,
    source        TEXT
);

-- One row per issuer per cycle cutoff; never updated.
CREATE TABLE IF NOT EXISTS scores (
    score_id          TEXT PRIMARY KEY,
    issuer_id         TEXT NOT NULL REFERENCES issuers(issuer_id),
    ts                TEXT NOT NULL,
    score             REAL NOT NULL CHECK (score >= 0 AND score <= 100),
    bucket            TEXT NOT NULL,
    base              REAL NOT NULL,
    market            REAL NOT NULL,
    event_delta       REAL NOT NULL,
    macro_adj         REAL NOT NULL,
    model_version     TEXT NOT NULL REFERENCES models(model_version),
    explanation_json  TEXT NOT NULL,
    UNIQUE (issuer_id, ts)
);

CREATE TABLE IF NOT EXISTS models (
    model_version            TEXT PRIMARY KEY,
    model_type               TEXT NOT NULL,
    hyperparameters_json     TEXT NOT NULL,
    feature_importance_json  TEXT NOT NULL,
    registered_at            TEXT NOT NULL
);

-- Single-row pointer to the model new scores are written under.
CREATE TABLE IF NOT EXISTS current_model (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    model_version  TEXT NOT NULL REFERENCES models(model_version),
    activated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_subscriptions (
    subscription_id  TEXT PRIMARY KEY,
    issuer_id        TEXT NOT NULL REFERENCES issuers(issuer_id),
    threshold        REAL NOT NULL CHECK (threshold >= 0),
    active           INTEGER NOT NULL DEFAULT 1,
    email            TEXT,
    webhook_url      TEXT,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_history (
    alert_id         TEXT PRIMARY KEY,
    subscription_id  TEXT NOT NULL REFERENCES alert_subscriptions(subscription_id),
    issuer_id        TEXT NOT NULL REFERENCES issuers(issuer_id),
    alert_type       TEXT NOT NULL,   -- 'score_increase' | 'score_decrease'
    message          TEXT NOT NULL,
    score_change     REAL NOT NULL,
    triggered_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS features_lookup_idx ON feature_snapshots(issuer_id, feature_name, ts);
CREATE INDEX IF NOT EXISTS macro_lookup_idx    ON macro_observations(key, ts);
CREATE INDEX IF NOT EXISTS events_lookup_idx   ON events(issuer_id, ts);
CREATE INDEX IF NOT EXISTS events_hash_idx     ON events(issuer_id, content_hash);
CREATE INDEX IF NOT EXISTS alerts_dedupe_idx   ON alert_history(subscription_id, triggered_at);
CREATE INDEX IF NOT EXISTS alerts_recent_idx   ON alert_history(triggered_at);
CREATE INDEX IF NOT EXISTS subs_issuer_idx     ON alert_subscriptions(issuer_id);

PRAGMA user_version = 1;
";
