//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Stored in `licenses.max_executions` for licenses without an execution bound.
pub const UNLIMITED_EXECUTIONS: i64 = -1;

/// Full DDL for the platform database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Tenants. `plan` is only changed by billing facts.
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    avatar      TEXT,
    plan        TEXT NOT NULL DEFAULT 'FREE',
    created_at  TEXT NOT NULL
);

-- Agents. ARCHIVED is a soft delete.
CREATE TABLE IF NOT EXISTS agents (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id),
    name            TEXT NOT NULL,
    description     TEXT,
    specialty       TEXT NOT NULL,
    complexity      TEXT NOT NULL DEFAULT 'BASIC',
    system_prompt   TEXT NOT NULL,
    instructions_json TEXT NOT NULL DEFAULT '{}',
    status          TEXT NOT NULL DEFAULT 'DRAFT',
    version         INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Execution ledger (append-only, see triggers below)
CREATE TABLE IF NOT EXISTS executions (
    id          TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL REFERENCES agents(id),
    user_id     TEXT NOT NULL REFERENCES users(id),
    input_json  TEXT NOT NULL DEFAULT '{}',
    output      TEXT,
    tokens      INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    success     INTEGER NOT NULL,
    error       TEXT,
    created_at  TEXT NOT NULL
);

-- License keys
CREATE TABLE IF NOT EXISTS licenses (
    id              TEXT PRIMARY KEY,
    key             TEXT NOT NULL UNIQUE,
    agent_id        TEXT NOT NULL REFERENCES agents(id),
    user_id         TEXT NOT NULL REFERENCES users(id),
    license_type    TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'ACTIVE',
    expires_at      TEXT,
    max_executions  INTEGER NOT NULL DEFAULT -1,
    used_executions INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    CHECK (max_executions = -1 OR used_executions <= max_executions)
);

-- Daily execution slots per user and UTC day. Admission claims a slot here
-- with one conditional update; the ledger row follows once the call settles.
CREATE TABLE IF NOT EXISTS daily_usage (
    user_id     TEXT NOT NULL REFERENCES users(id),
    day         TEXT NOT NULL,
    reserved    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, day)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agents_user_status ON agents(user_id, status);
CREATE INDEX IF NOT EXISTS idx_executions_user_created ON executions(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_executions_agent_created ON executions(agent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_licenses_user ON licenses(user_id);
"#;

/// Ledger immutability triggers.
pub const LEDGER_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS executions_no_update
BEFORE UPDATE ON executions
BEGIN
    SELECT RAISE(ABORT, 'executions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS executions_no_delete
BEFORE DELETE ON executions
BEGIN
    SELECT RAISE(ABORT, 'executions are append-only');
END;
"#;
