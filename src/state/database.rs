//! SQLite database wrapper with WAL mode and migration support.
//!
//! Ownership is part of every scoped lookup (`WHERE id = ? AND user_id = ?`),
//! so "absent" and "owned by someone else" are indistinguishable to callers.
//! Every bound that must hold under concurrency is enforced by a single
//! conditional statement here, never by a read followed by a write.

use crate::error::CoreResult;
use crate::state::schema;
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, email, name, avatar, plan, created_at";

const AGENT_COLUMNS: &str = "id, user_id, name, description, specialty, complexity, \
     system_prompt, instructions_json, status, version, created_at, updated_at";

const EXECUTION_COLUMNS: &str =
    "id, agent_id, user_id, input_json, output, tokens, duration_ms, success, error, created_at";

const LICENSE_COLUMNS: &str = "id, key, agent_id, user_id, license_type, status, expires_at, \
     max_executions, used_executions, created_at";

/// Aggregates over one agent's slice of the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionStats {
    pub total: u64,
    pub successful: u64,
    pub avg_duration_ms: Option<f64>,
    pub total_tokens: u64,
}

/// The platform database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers proceed while another instance writes
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Create the schema on first open.
    fn migrate(&mut self) -> CoreResult<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            let tx = self.conn.transaction()?;
            tx.execute_batch(schema::CREATE_SCHEMA)?;
            tx.execute_batch(schema::LEDGER_TRIGGERS)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
            tx.commit()?;
        }

        Ok(())
    }

    /// Run `f` in one IMMEDIATE transaction. Nothing `f` wrote survives an error.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> CoreResult<T>) -> CoreResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn insert_user(&self, user: &User) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO users (id, email, name, avatar, plan, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.name,
                user.avatar,
                user.plan.to_string(),
                format_ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], user_from_row)
            .optional()?)
    }

    /// Apply a subscription tier change. Returns false if the user is unknown.
    pub fn set_user_plan(&self, id: &str, plan: Plan) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET plan = ?2 WHERE id = ?1",
            params![id, plan.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Update profile fields; `None` leaves a field untouched.
    pub fn update_user_profile(
        &self,
        id: &str,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET name = COALESCE(?2, name), avatar = COALESCE(?3, avatar)
             WHERE id = ?1",
            params![id, name, avatar],
        )?;
        Ok(changed == 1)
    }

    pub fn user_stats(&self, id: &str) -> CoreResult<UserStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM agents WHERE user_id = ?1),
                (SELECT COUNT(*) FROM executions WHERE user_id = ?1),
                (SELECT COUNT(*) FROM licenses WHERE user_id = ?1)",
            params![id],
            |row| {
                Ok(UserStats {
                    agents_count: row.get(0)?,
                    executions_count: row.get(1)?,
                    licenses_count: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Insert an agent only while the owner's non-archived count is below `limit`.
    ///
    /// `None` means unbounded. Returns false when the bound rejected the insert.
    pub fn insert_agent_within(&self, agent: &Agent, limit: Option<u64>) -> CoreResult<bool> {
        let instructions = serde_json::to_string(&agent.instructions)?;
        let bound = limit.map(clamp_i64).unwrap_or(i64::MAX);

        let changed = self.conn.execute(
            &format!(
                "INSERT INTO agents ({AGENT_COLUMNS})
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
                 WHERE (SELECT COUNT(*) FROM agents
                        WHERE user_id = ?2 AND status != 'ARCHIVED') < ?13"
            ),
            params![
                agent.id,
                agent.user_id,
                agent.name,
                agent.description,
                agent.specialty,
                agent.complexity.to_string(),
                agent.system_prompt,
                instructions,
                agent.status.to_string(),
                agent.version,
                format_ts(&agent.created_at),
                format_ts(&agent.updated_at),
                bound,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Scoped lookup: the agent only if it exists and belongs to `owner_id`.
    pub fn find_agent_owned(&self, id: &str, owner_id: &str) -> CoreResult<Option<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1 AND user_id = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![id, owner_id], agent_from_row)
            .optional()?)
    }

    /// Count agents that occupy quota (everything but ARCHIVED).
    pub fn count_active_agents(&self, owner_id: &str) -> CoreResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE user_id = ?1 AND status != 'ARCHIVED'",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// List an owner's agents, newest update first. Returns the page and the total match count.
    pub fn list_agents(&self, owner_id: &str, query: &AgentQuery) -> CoreResult<(Vec<Agent>, u64)> {
        let status = query.status.map(|s| s.to_string());
        let pattern = query.search.as_deref().map(like_pattern);
        let limit = query.limit.max(1);
        let offset = query.page.max(1).saturating_sub(1).saturating_mul(limit);

        const FILTER: &str = "user_id = ?1
             AND (?2 IS NULL OR status = ?2)
             AND (?3 IS NULL OR specialty = ?3)
             AND (?4 IS NULL OR name LIKE ?4 ESCAPE '\\' OR description LIKE ?4 ESCAPE '\\')";

        let total: u64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM agents WHERE {FILTER}"),
            params![owner_id, status, query.specialty, pattern],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE {FILTER}
             ORDER BY updated_at DESC, rowid DESC LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt.query_map(
            params![
                owner_id,
                status,
                query.specialty,
                pattern,
                clamp_i64(limit),
                clamp_i64(offset)
            ],
            agent_from_row,
        )?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok((agents, total))
    }

    /// Overwrite an agent's editable fields, guarded by its previous version.
    ///
    /// Archived rows are never touched. Returns false if the guard did not match.
    pub fn update_agent(&self, agent: &Agent, expected_version: u32) -> CoreResult<bool> {
        let instructions = serde_json::to_string(&agent.instructions)?;
        let changed = self.conn.execute(
            "UPDATE agents SET
                name = ?3, description = ?4, specialty = ?5, complexity = ?6,
                system_prompt = ?7, instructions_json = ?8, status = ?9,
                version = ?10, updated_at = ?11
             WHERE id = ?1 AND user_id = ?2 AND version = ?12 AND status != 'ARCHIVED'",
            params![
                agent.id,
                agent.user_id,
                agent.name,
                agent.description,
                agent.specialty,
                agent.complexity.to_string(),
                agent.system_prompt,
                instructions,
                agent.status.to_string(),
                agent.version,
                format_ts(&agent.updated_at),
                expected_version,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Move an owned agent from `from` to `to` in one conditional update.
    pub fn transition_agent_status(
        &self,
        id: &str,
        owner_id: &str,
        from: AgentStatus,
        to: AgentStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE agents SET status = ?4, updated_at = ?5
             WHERE id = ?1 AND user_id = ?2 AND status = ?3",
            params![id, owner_id, from.to_string(), to.to_string(), format_ts(&at)],
        )?;
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Execution ledger
    // -----------------------------------------------------------------------

    /// Append one ledger row.
    pub fn insert_execution(&self, execution: &Execution) -> CoreResult<()> {
        let input = serde_json::to_string(&execution.input)?;
        self.conn.execute(
            &format!(
                "INSERT INTO executions ({EXECUTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                execution.id,
                execution.agent_id,
                execution.user_id,
                input,
                execution.output,
                clamp_i64(execution.tokens),
                clamp_i64(execution.duration_ms),
                execution.success,
                execution.error,
                format_ts(&execution.created_at),
            ],
        )?;
        Ok(())
    }

    /// Count a user's ledger rows at or after `since`.
    pub fn count_executions_since(&self, user_id: &str, since: DateTime<Utc>) -> CoreResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM executions WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, format_ts(&since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Claim one of the user's execution slots for the UTC day starting at `day_start`.
    ///
    /// The slot count never drops below the ledger rows already recorded that
    /// day, so rows written outside this path still count. The claim succeeds
    /// only while that count is below `limit`. Returns false when full.
    pub fn reserve_daily_execution(
        &self,
        user_id: &str,
        day_start: DateTime<Utc>,
        limit: u64,
    ) -> CoreResult<bool> {
        let day = day_start.format("%Y-%m-%d").to_string();
        self.conn.execute(
            "INSERT OR IGNORE INTO daily_usage (user_id, day, reserved) VALUES (?1, ?2, 0)",
            params![user_id, day],
        )?;

        let changed = self.conn.execute(
            "UPDATE daily_usage
             SET reserved = MAX(reserved, (SELECT COUNT(*) FROM executions
                                           WHERE user_id = ?1 AND created_at >= ?3)) + 1
             WHERE user_id = ?1 AND day = ?2
               AND MAX(reserved, (SELECT COUNT(*) FROM executions
                                  WHERE user_id = ?1 AND created_at >= ?3)) < ?4",
            params![user_id, day, format_ts(&day_start), clamp_i64(limit)],
        )?;
        Ok(changed == 1)
    }

    pub fn get_execution(&self, id: &str) -> CoreResult<Option<Execution>> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], execution_from_row)
            .optional()?)
    }

    pub fn execution_stats(&self, agent_id: &str) -> CoreResult<ExecutionStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(success), 0),
                    AVG(duration_ms),
                    COALESCE(SUM(tokens), 0)
             FROM executions WHERE agent_id = ?1",
            params![agent_id],
            |row| {
                Ok(ExecutionStats {
                    total: row.get(0)?,
                    successful: row.get(1)?,
                    avg_duration_ms: row.get(2)?,
                    total_tokens: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Most recent ledger rows for an agent, newest first.
    pub fn recent_executions(&self, agent_id: &str, limit: u64) -> CoreResult<Vec<ExecutionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, success, duration_ms, tokens FROM executions
             WHERE agent_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent_id, clamp_i64(limit)], |row| {
            Ok(ExecutionSummary {
                created_at: parse_ts(0, row.get(0)?)?,
                success: row.get(1)?,
                duration_ms: row.get(2)?,
                tokens: row.get(3)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    // -----------------------------------------------------------------------
    // Licenses
    // -----------------------------------------------------------------------

    pub fn insert_license(&self, license: &License) -> CoreResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO licenses ({LICENSE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                license.id,
                license.key,
                license.agent_id,
                license.user_id,
                license.license_type.to_string(),
                license.status.to_string(),
                license.expires_at.as_ref().map(format_ts),
                license
                    .max_executions
                    .map(clamp_i64)
                    .unwrap_or(schema::UNLIMITED_EXECUTIONS),
                clamp_i64(license.used_executions),
                format_ts(&license.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn license_key_exists(&self, key: &str) -> CoreResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM licenses WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn find_license_by_key(&self, key: &str) -> CoreResult<Option<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE key = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![key], license_from_row)
            .optional()?)
    }

    /// Scoped lookup: the license only if it exists and belongs to `owner_id`.
    pub fn find_license_owned(&self, id: &str, owner_id: &str) -> CoreResult<Option<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = ?1 AND user_id = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![id, owner_id], license_from_row)
            .optional()?)
    }

    pub fn list_licenses(&self, owner_id: &str) -> CoreResult<Vec<License>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LICENSE_COLUMNS} FROM licenses WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![owner_id], license_from_row)?;

        let mut licenses = Vec::new();
        for row in rows {
            licenses.push(row?);
        }
        Ok(licenses)
    }

    /// Compare-and-set on license status. Returns false if the status was not `from`.
    pub fn transition_license_status(
        &self,
        id: &str,
        from: LicenseStatus,
        to: LicenseStatus,
    ) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE licenses SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.to_string(), to.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Bump `used_executions` of an ACTIVE, unexpired license, only if the
    /// result stays within `max_executions`.
    ///
    /// Returns false when status, deadline or bound (or an unknown key)
    /// rejected the increment.
    pub fn increment_license_usage(&self, key: &str, now: DateTime<Utc>) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE licenses SET used_executions = used_executions + 1
             WHERE key = ?1
               AND status = 'ACTIVE'
               AND (expires_at IS NULL OR expires_at > ?2)
               AND (max_executions = -1 OR used_executions < max_executions)",
            params![key, format_ts(&now)],
        )?;
        Ok(changed == 1)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 in UTC, so text order matches time order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_label<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json(idx: usize, raw: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Build a LIKE pattern that matches `needle` literally anywhere.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        avatar: row.get(3)?,
        plan: parse_label(4, row.get(4)?)?,
        created_at: parse_ts(5, row.get(5)?)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        specialty: row.get(4)?,
        complexity: parse_label(5, row.get(5)?)?,
        system_prompt: row.get(6)?,
        instructions: parse_json(7, row.get(7)?)?,
        status: parse_label(8, row.get(8)?)?,
        version: row.get(9)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<Execution> {
    Ok(Execution {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        user_id: row.get(2)?,
        input: parse_json(3, row.get(3)?)?,
        output: row.get(4)?,
        tokens: row.get(5)?,
        duration_ms: row.get(6)?,
        success: row.get(7)?,
        error: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}

fn license_from_row(row: &Row<'_>) -> rusqlite::Result<License> {
    let max: i64 = row.get(7)?;
    Ok(License {
        id: row.get(0)?,
        key: row.get(1)?,
        agent_id: row.get(2)?,
        user_id: row.get(3)?,
        license_type: parse_label(4, row.get(4)?)?,
        status: parse_label(5, row.get(5)?)?,
        expires_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_ts(6, raw))
            .transpose()?,
        max_executions: u64::try_from(max).ok(),
        used_executions: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}
