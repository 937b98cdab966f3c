//! Repository Pattern for Database Abstraction
//!
//! This module provides trait-based repository abstractions to decouple the
//! dispatch engine from storage implementations, enabling:
//! - Easy testing with in-memory implementations
//! - Swappable storage backends
//! - Clear separation of concerns
//!
//! The engine requires read-your-writes consistency for a single campaign
//! within one process; both implementations provide it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::{
    Campaign, CampaignPage, CampaignStatus, DeliveryResult, MessagePayload, OutcomeLogEntry,
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository for campaign records
///
/// The Lifecycle Controller is the sole mutator; the scheduler and executor
/// read and update records only through controller-sanctioned calls.
pub trait CampaignRepository: Send + Sync {
    /// Insert or update a campaign record
    fn save(&self, campaign: &Campaign) -> Result<()>;

    /// Fetch a campaign by id
    fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>>;

    /// Fetch all campaigns with the given persisted status
    fn find_all_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Fetch one page of campaigns, newest first (page is 1-based)
    fn list(&self, page: usize, size: usize) -> Result<CampaignPage>;

    /// Remove a campaign record; returns whether a record existed
    fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Repository for append-only per-target outcome logs
pub trait OutcomeLogRepository: Send + Sync {
    /// Append a batch of outcome entries
    fn append_batch(&self, entries: &[OutcomeLogEntry]) -> Result<()>;

    /// Fetch all entries for a campaign in append order
    fn find_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<OutcomeLogEntry>>;

    /// Cascade-delete all entries for a campaign; returns removed count
    fn delete_by_campaign(&self, campaign_id: Uuid) -> Result<usize>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of both repositories
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) a SQLite store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS campaigns (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    targets TEXT NOT NULL,
                    schedule TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    success_count INTEGER NOT NULL DEFAULT 0,
                    failure_count INTEGER NOT NULL DEFAULT 0,
                    next_execute_time TEXT,
                    last_execute_time TEXT,
                    error_message TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_campaigns_status
                    ON campaigns(status);

                CREATE TABLE IF NOT EXISTS outcome_logs (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    campaign_id TEXT NOT NULL,
                    target TEXT NOT NULL,
                    result TEXT NOT NULL,
                    error_detail TEXT,
                    timestamp TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_outcome_logs_campaign
                    ON outcome_logs(campaign_id);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }
}

/// Intermediate row shape read inside the rusqlite closure
struct CampaignRow {
    id: String,
    name: String,
    payload: String,
    targets: String,
    schedule: String,
    status: String,
    success_count: i64,
    failure_count: i64,
    next_execute_time: Option<String>,
    last_execute_time: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CampaignRow {
    const COLUMNS: &'static str = "id, name, payload, targets, schedule, status, \
         success_count, failure_count, next_execute_time, last_execute_time, \
         error_message, created_at, updated_at";

    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            payload: row.get(2)?,
            targets: row.get(3)?,
            schedule: row.get(4)?,
            status: row.get(5)?,
            success_count: row.get(6)?,
            failure_count: row.get(7)?,
            next_execute_time: row.get(8)?,
            last_execute_time: row.get(9)?,
            error_message: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_campaign(self) -> Result<Campaign> {
        let payload: MessagePayload =
            serde_json::from_str(&self.payload).context("Corrupt payload column")?;
        let targets: Vec<String> =
            serde_json::from_str(&self.targets).context("Corrupt targets column")?;
        let status = CampaignStatus::parse(&self.status)
            .with_context(|| format!("Unknown campaign status '{}'", self.status))?;
        let id = Uuid::parse_str(&self.id).context("Corrupt campaign id")?;

        Ok(Campaign {
            id,
            name: self.name,
            payload,
            targets,
            schedule: self.schedule,
            status,
            success_count: self.success_count as u64,
            failure_count: self.failure_count as u64,
            next_execute_time: parse_instant(self.next_execute_time.as_deref()),
            last_execute_time: parse_instant(self.last_execute_time.as_deref()),
            error_message: self.error_message,
            created_at: parse_instant(Some(&self.created_at)).unwrap_or_else(Utc::now),
            updated_at: parse_instant(Some(&self.updated_at)).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_instant(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|v| {
        DateTime::parse_from_rfc3339(v)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

impl CampaignRepository for SqliteStore {
    fn save(&self, campaign: &Campaign) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let payload = serde_json::to_string(&campaign.payload)?;
        let targets = serde_json::to_string(&campaign.targets)?;

        conn.execute(
            r#"
                INSERT OR REPLACE INTO campaigns
                    (id, name, payload, targets, schedule, status,
                     success_count, failure_count, next_execute_time,
                     last_execute_time, error_message, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            params![
                campaign.id.to_string(),
                campaign.name,
                payload,
                targets,
                campaign.schedule,
                campaign.status.as_str(),
                campaign.success_count as i64,
                campaign.failure_count as i64,
                campaign.next_execute_time.map(|t| t.to_rfc3339()),
                campaign.last_execute_time.map(|t| t.to_rfc3339()),
                campaign.error_message,
                campaign.created_at.to_rfc3339(),
                campaign.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to save campaign")?;

        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM campaigns WHERE id = ?1",
            CampaignRow::COLUMNS
        );

        let row = conn
            .query_row(&query, params![id.to_string()], CampaignRow::read)
            .optional()
            .context("Failed to fetch campaign")?;

        row.map(CampaignRow::into_campaign).transpose()
    }

    fn find_all_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let conn = self.conn.lock().unwrap();
        let query = format!(
            "SELECT {} FROM campaigns WHERE status = ?1 ORDER BY created_at",
            CampaignRow::COLUMNS
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![status.as_str()], CampaignRow::read)?;

        let mut campaigns = Vec::new();
        for row in rows {
            campaigns.push(row?.into_campaign()?);
        }

        Ok(campaigns)
    }

    fn list(&self, page: usize, size: usize) -> Result<CampaignPage> {
        let page = page.max(1);
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM campaigns", [], |row| row.get(0))?;

        let query = format!(
            "SELECT {} FROM campaigns ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            CampaignRow::COLUMNS
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![size as i64, ((page - 1) * size) as i64],
            CampaignRow::read,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_campaign()?);
        }

        Ok(CampaignPage {
            items,
            page,
            size,
            total: total as usize,
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM campaigns WHERE id = ?1",
                params![id.to_string()],
            )
            .context("Failed to delete campaign")?;

        Ok(removed > 0)
    }
}

impl OutcomeLogRepository for SqliteStore {
    fn append_batch(&self, entries: &[OutcomeLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                    INSERT INTO outcome_logs
                        (campaign_id, target, result, error_detail, timestamp)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
            )?;

            for entry in entries {
                stmt.execute(params![
                    entry.campaign_id.to_string(),
                    entry.target,
                    entry.result.as_str(),
                    entry.error_detail,
                    entry.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit().context("Failed to append outcome batch")?;

        Ok(())
    }

    fn find_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<OutcomeLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT campaign_id, target, result, error_detail, timestamp
             FROM outcome_logs WHERE campaign_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![campaign_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (campaign_id, target, result, error_detail, timestamp) = row?;
            entries.push(OutcomeLogEntry {
                campaign_id: Uuid::parse_str(&campaign_id).context("Corrupt campaign id")?,
                target,
                result: DeliveryResult::parse(&result).unwrap_or(DeliveryResult::Failed),
                error_detail,
                timestamp: parse_instant(Some(&timestamp)).unwrap_or_else(Utc::now),
            });
        }

        Ok(entries)
    }

    fn delete_by_campaign(&self, campaign_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM outcome_logs WHERE campaign_id = ?1",
                params![campaign_id.to_string()],
            )
            .context("Failed to delete outcome logs")?;

        Ok(removed)
    }
}

// ============================================================================
// In-Memory Implementation (tests, ephemeral runs)
// ============================================================================

/// In-memory implementation of both repositories
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemoryStore {
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
    logs: RwLock<Vec<OutcomeLogEntry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CampaignRepository for MemoryStore {
    fn save(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .unwrap()
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().unwrap().get(&id).cloned())
    }

    fn find_all_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .read()
            .unwrap()
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    fn list(&self, page: usize, size: usize) -> Result<CampaignPage> {
        let page = page.max(1);
        let mut campaigns: Vec<Campaign> =
            self.campaigns.read().unwrap().values().cloned().collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = campaigns.len();
        let items = campaigns
            .into_iter()
            .skip((page - 1) * size)
            .take(size)
            .collect();

        Ok(CampaignPage {
            items,
            page,
            size,
            total,
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.campaigns.write().unwrap().remove(&id).is_some())
    }
}

impl OutcomeLogRepository for MemoryStore {
    fn append_batch(&self, entries: &[OutcomeLogEntry]) -> Result<()> {
        self.logs.write().unwrap().extend_from_slice(entries);
        Ok(())
    }

    fn find_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<OutcomeLogEntry>> {
        Ok(self
            .logs
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn delete_by_campaign(&self, campaign_id: Uuid) -> Result<usize> {
        let mut logs = self.logs.write().unwrap();
        let before = logs.len();
        logs.retain(|e| e.campaign_id != campaign_id);
        Ok(before - logs.len())
    }
}
