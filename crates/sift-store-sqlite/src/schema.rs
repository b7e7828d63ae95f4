//! SQL schema for the batch ledger.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per live batch execution. Dry runs are never recorded.
-- Only status, counters, summary and the two completion timestamps are
-- ever updated.
CREATE TABLE IF NOT EXISTS batch_jobs (
    job_id         TEXT PRIMARY KEY,
    agent_id       TEXT NOT NULL,
    status         TEXT NOT NULL,   -- RUNNING | COMPLETED | FAILED | ROLLED_BACK
    dry_run        INTEGER NOT NULL DEFAULT 0,
    started_at     TEXT NOT NULL,   -- RFC 3339 UTC
    completed_at   TEXT,
    rolled_back_at TEXT,
    deleted_count  INTEGER NOT NULL DEFAULT 0,
    moved_count    INTEGER NOT NULL DEFAULT 0,
    kept_count     INTEGER NOT NULL DEFAULT 0,
    error_count    INTEGER NOT NULL DEFAULT 0,
    summary        TEXT NOT NULL DEFAULT '{}'
);

-- Pre-mutation snapshots. Only moved_to_id and restored_at are ever updated.
CREATE TABLE IF NOT EXISTS batch_backups (
    job_id         TEXT NOT NULL REFERENCES batch_jobs(job_id),
    agent_id       TEXT NOT NULL,
    store          TEXT NOT NULL,   -- MEMORY | RULE | SKILL
    item_id        TEXT NOT NULL,
    operation      TEXT NOT NULL,   -- DELETE | MOVE
    original       TEXT NOT NULL,   -- JSON-encoded KnowledgeItem
    moved_to_store TEXT,
    moved_to_id    TEXT,
    created_at     TEXT NOT NULL,
    restored_at    TEXT,
    PRIMARY KEY (job_id, store, item_id)
);

CREATE INDEX IF NOT EXISTS batch_jobs_started_idx ON batch_jobs(started_at);
CREATE INDEX IF NOT EXISTS batch_jobs_agent_idx   ON batch_jobs(agent_id);

PRAGMA user_version = 2;
";

/// Brings a version 1 ledger up to version 2. Run before [`SCHEMA`].
pub const MIGRATE_V2: &str = "
ALTER TABLE batch_backups ADD COLUMN restored_at TEXT;
";
