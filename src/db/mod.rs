use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Storage location class for an artifact's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Remote,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "remote" => Self::Remote,
            _ => Self::Local,
        }
    }
}

/// Direction of a transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "send" => Some(Self::Send),
            "receive" => Some(Self::Receive),
            _ => None,
        }
    }
}

/// Outcome of a transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A file tracked by the bridge, independent of where its bytes live.
///
/// `locator` is the filename under the upload root for `Local` artifacts and
/// the remote object URL for `Remote` ones. `stored_name` always records the
/// generated on-disk spool name.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: String,
    pub stored_name: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub tier: Tier,
    pub locator: String,
    pub created_at: String,
}

/// A known recipient/sender, unique per `(address, is_group)`.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    pub address: String,
    pub is_group: bool,
    pub group_id: Option<String>,
    pub created_at: String,
}

/// One row of the append-only transfer journal.
#[derive(Debug, Clone, Serialize)]
pub struct TransferLogEntry {
    pub id: String,
    pub direction: Direction,
    pub artifact_id: String,
    pub contact_id: String,
    pub timestamp: String,
    pub outcome: Outcome,
    pub error_detail: Option<String>,
}

/// A journal row joined with the display names its ids point at.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(flatten)]
    pub entry: TransferLogEntry,
    pub artifact_name: String,
    pub contact_name: String,
}

/// Filters for journal queries. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub direction: Option<Direction>,
    pub outcome: Option<Outcome>,
    pub contact_id: Option<String>,
    pub artifact_id: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Row counts for the CLI status summary.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub artifacts: u64,
    pub contacts: u64,
    pub log_entries: u64,
}

/// SQLite-backed store for artifacts, contacts, and the transfer journal.
///
/// All access goes through one connection behind a mutex, so writes that
/// race on the same logical key (contact find-or-create in particular) are
/// serialized. Journal rows are never updated or deleted; referential
/// integrity of their ids is the caller's responsibility, not a schema
/// constraint.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to set SQLite pragmas")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY NOT NULL,
                stored_name TEXT NOT NULL,
                original_name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                tier TEXT NOT NULL DEFAULT 'local',
                locator TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_artifacts_created
                ON artifacts(created_at DESC, id DESC);

            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY NOT NULL,
                display_name TEXT NOT NULL,
                address TEXT NOT NULL,
                is_group INTEGER NOT NULL DEFAULT 0,
                group_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contacts_identity
                ON contacts(address, is_group);

            CREATE TABLE IF NOT EXISTS transfer_log (
                id TEXT PRIMARY KEY NOT NULL,
                direction TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error_detail TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_transfer_log_time
                ON transfer_log(timestamp DESC, id DESC);",
        )
        .context("Failed to initialize store schema")?;
        Ok(())
    }

    // ── Artifacts ─────────────────────────────────────────────

    pub fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO artifacts (id, stored_name, original_name, size_bytes, mime_type, tier, locator, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    artifact.id,
                    artifact.stored_name,
                    artifact.original_name,
                    artifact.size_bytes as i64,
                    artifact.mime_type,
                    artifact.tier.as_str(),
                    artifact.locator,
                    artifact.created_at,
                ],
            )
            .with_context(|| format!("Failed to insert artifact '{}'", artifact.original_name))?;
        Ok(())
    }

    pub fn get_artifact(&self, id: &str) -> Result<Option<Artifact>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, stored_name, original_name, size_bytes, mime_type, tier, locator, created_at
                 FROM artifacts WHERE id = ?1",
                params![id],
                Self::artifact_from_row,
            )
            .optional()
            .context("Failed to query artifact by id")
    }

    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, stored_name, original_name, size_bytes, mime_type, tier, locator, created_at
             FROM artifacts ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], Self::artifact_from_row)?;
        let mut artifacts = Vec::new();
        for row in rows {
            artifacts.push(row?);
        }
        Ok(artifacts)
    }

    /// Returns true if a row was deleted.
    pub fn delete_artifact(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM artifacts WHERE id = ?1", params![id])
            .context("Failed to delete artifact")?;
        Ok(rows > 0)
    }

    fn artifact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
        Ok(Artifact {
            id: row.get(0)?,
            stored_name: row.get(1)?,
            original_name: row.get(2)?,
            size_bytes: row.get::<_, i64>(3)? as u64,
            mime_type: row.get(4)?,
            tier: Tier::parse(&row.get::<_, String>(5)?),
            locator: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // ── Contacts ──────────────────────────────────────────────

    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO contacts (id, display_name, address, is_group, group_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    contact.id,
                    contact.display_name,
                    contact.address,
                    contact.is_group as i64,
                    contact.group_id,
                    contact.created_at,
                ],
            )
            .with_context(|| format!("Failed to insert contact '{}'", contact.display_name))?;
        Ok(())
    }

    pub fn get_contact(&self, id: &str) -> Result<Option<Contact>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, display_name, address, is_group, group_id, created_at
                 FROM contacts WHERE id = ?1",
                params![id],
                Self::contact_from_row,
            )
            .optional()
            .context("Failed to query contact by id")
    }

    pub fn get_contact_by_identity(&self, address: &str, is_group: bool) -> Result<Option<Contact>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, display_name, address, is_group, group_id, created_at
                 FROM contacts WHERE address = ?1 AND is_group = ?2",
                params![address, is_group as i64],
                Self::contact_from_row,
            )
            .optional()
            .context("Failed to query contact by identity")
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, display_name, address, is_group, group_id, created_at
             FROM contacts ORDER BY display_name, id",
        )?;
        let rows = stmt.query_map([], Self::contact_from_row)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Look up by `(address, is_group)` and create the row if absent, in one
    /// critical section. Two concurrent callers with the same identity
    /// converge on a single row.
    pub fn find_or_create_contact(
        &self,
        address: &str,
        display_name: &str,
        is_group: bool,
        group_id: Option<&str>,
    ) -> Result<Contact> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO contacts (id, display_name, address, is_group, group_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(address, is_group) DO NOTHING",
            params![
                uuid::Uuid::new_v4().to_string(),
                display_name,
                address,
                is_group as i64,
                group_id,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to upsert contact")?;
        conn.query_row(
            "SELECT id, display_name, address, is_group, group_id, created_at
             FROM contacts WHERE address = ?1 AND is_group = ?2",
            params![address, is_group as i64],
            Self::contact_from_row,
        )
        .context("Upserted contact row is missing")
    }

    /// Refresh only the display name (session sync keeps the rest).
    pub fn refresh_contact_name(&self, id: &str, display_name: &str) -> Result<()> {
        let rows = self
            .conn
            .lock()
            .execute(
                "UPDATE contacts SET display_name = ?1 WHERE id = ?2",
                params![display_name, id],
            )
            .context("Failed to refresh contact name")?;
        if rows == 0 {
            anyhow::bail!("No contact with id '{id}'");
        }
        Ok(())
    }

    /// Apply a partial update. Returns false if the contact does not exist.
    pub fn update_contact(
        &self,
        id: &str,
        display_name: Option<&str>,
        address: Option<&str>,
        is_group: Option<bool>,
        group_id: Option<Option<&str>>,
    ) -> Result<bool> {
        let mut sets: Vec<String> = Vec::new();
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1u32;

        if let Some(name) = display_name {
            sets.push(format!("display_name = ?{idx}"));
            bind_values.push(Box::new(name.to_string()));
            idx += 1;
        }
        if let Some(addr) = address {
            sets.push(format!("address = ?{idx}"));
            bind_values.push(Box::new(addr.to_string()));
            idx += 1;
        }
        if let Some(group) = is_group {
            sets.push(format!("is_group = ?{idx}"));
            bind_values.push(Box::new(group as i64));
            idx += 1;
        }
        if let Some(gid) = group_id {
            sets.push(format!("group_id = ?{idx}"));
            bind_values.push(Box::new(gid.map(|g| g.to_string())));
            idx += 1;
        }
        if sets.is_empty() {
            return Ok(self.get_contact(id)?.is_some());
        }

        let sql = format!("UPDATE contacts SET {} WHERE id = ?{idx}", sets.join(", "));
        bind_values.push(Box::new(id.to_string()));
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = self
            .conn
            .lock()
            .execute(&sql, params_ref.as_slice())
            .context("Failed to update contact")?;
        Ok(rows > 0)
    }

    pub fn delete_contact(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM contacts WHERE id = ?1", params![id])
            .context("Failed to delete contact")?;
        Ok(rows > 0)
    }

    fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
        Ok(Contact {
            id: row.get(0)?,
            display_name: row.get(1)?,
            address: row.get(2)?,
            is_group: row.get::<_, i64>(3)? != 0,
            group_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // ── Transfer journal ──────────────────────────────────────

    pub fn append_log(&self, entry: &TransferLogEntry) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO transfer_log (id, direction, artifact_id, contact_id, timestamp, outcome, error_detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id,
                    entry.direction.as_str(),
                    entry.artifact_id,
                    entry.contact_id,
                    entry.timestamp,
                    entry.outcome.as_str(),
                    entry.error_detail,
                ],
            )
            .context("Failed to append transfer log entry")?;
        Ok(())
    }

    pub fn get_log(&self, id: &str) -> Result<Option<LogRecord>> {
        self.conn
            .lock()
            .query_row(
                &format!("{LOG_SELECT} WHERE l.id = ?1"),
                params![id],
                Self::log_from_row,
            )
            .optional()
            .context("Failed to query log entry by id")
    }

    /// Filtered journal query, newest first.
    pub fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogRecord>> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1u32;

        if let Some(direction) = filter.direction {
            where_clauses.push(format!("l.direction = ?{idx}"));
            bind_values.push(Box::new(direction.as_str().to_string()));
            idx += 1;
        }
        if let Some(outcome) = filter.outcome {
            where_clauses.push(format!("l.outcome = ?{idx}"));
            bind_values.push(Box::new(outcome.as_str().to_string()));
            idx += 1;
        }
        if let Some(ref contact_id) = filter.contact_id {
            where_clauses.push(format!("l.contact_id = ?{idx}"));
            bind_values.push(Box::new(contact_id.clone()));
            idx += 1;
        }
        if let Some(ref artifact_id) = filter.artifact_id {
            where_clauses.push(format!("l.artifact_id = ?{idx}"));
            bind_values.push(Box::new(artifact_id.clone()));
            idx += 1;
        }
        if let Some(ref from) = filter.from {
            where_clauses.push(format!("l.timestamp >= ?{idx}"));
            bind_values.push(Box::new(from.clone()));
            idx += 1;
        }
        if let Some(ref until) = filter.until {
            where_clauses.push(format!("l.timestamp <= ?{idx}"));
            bind_values.push(Box::new(until.clone()));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };
        let sql = format!(
            "{LOG_SELECT}{where_sql} ORDER BY l.timestamp DESC, l.id DESC LIMIT ?{idx} OFFSET ?{}",
            idx + 1
        );
        bind_values.push(Box::new(i64::from(filter.limit.unwrap_or(100))));
        bind_values.push(Box::new(i64::from(filter.offset.unwrap_or(0))));

        let conn = self.conn.lock();
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_ref.as_slice(), Self::log_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Every journal row, newest first, for bulk export.
    pub fn export_logs(&self) -> Result<Vec<LogRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("{LOG_SELECT} ORDER BY l.timestamp DESC, l.id DESC"))?;
        let rows = stmt.query_map([], Self::log_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRecord> {
        let direction: String = row.get(1)?;
        let outcome: String = row.get(5)?;
        Ok(LogRecord {
            entry: TransferLogEntry {
                id: row.get(0)?,
                direction: Direction::parse(&direction).unwrap_or(Direction::Send),
                artifact_id: row.get(2)?,
                contact_id: row.get(3)?,
                timestamp: row.get(4)?,
                outcome: Outcome::parse(&outcome).unwrap_or(Outcome::Failed),
                error_detail: row.get(6)?,
            },
            artifact_name: row
                .get::<_, Option<String>>(7)?
                .unwrap_or_else(|| "Unknown".into()),
            contact_name: row
                .get::<_, Option<String>>(8)?
                .unwrap_or_else(|| "Unknown".into()),
        })
    }

    // ── Summary ───────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .context("Failed to count rows")
        };
        Ok(StoreStats {
            artifacts: count("SELECT COUNT(*) FROM artifacts")?,
            contacts: count("SELECT COUNT(*) FROM contacts")?,
            log_entries: count("SELECT COUNT(*) FROM transfer_log")?,
        })
    }
}

const LOG_SELECT: &str = "SELECT l.id, l.direction, l.artifact_id, l.contact_id, l.timestamp, l.outcome, l.error_detail,
        a.original_name, c.display_name
 FROM transfer_log l
 LEFT JOIN artifacts a ON a.id = l.artifact_id
 LEFT JOIN contacts c ON c.id = l.contact_id";
