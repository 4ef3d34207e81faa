use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::config::HISTORY_MAX_LIMIT;
use crate::model::{AuditHistoryEntry, AuditReport, AuditStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewport {
    Desktop,
    Mobile,
}

impl Viewport {
    pub fn as_str(self) -> &'static str {
        match self {
            Viewport::Desktop => "desktop",
            Viewport::Mobile => "mobile",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.png", self.as_str())
    }
}

/// Where reports, screenshots and the audit history live.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist the report and return its URL.
    async fn store_report(&self, audit_id: &str, report: &AuditReport) -> anyhow::Result<String>;

    async fn load_report(&self, audit_id: &str) -> anyhow::Result<Option<AuditReport>>;

    /// Insert or replace the entry for `entry.audit_id`.
    async fn append_history(&self, entry: &AuditHistoryEntry) -> anyhow::Result<()>;

    /// Most recent first.
    async fn history(&self, limit: usize) -> anyhow::Result<Vec<AuditHistoryEntry>>;

    async fn store_screenshot(
        &self,
        audit_id: &str,
        viewport: Viewport,
        png: Bytes,
    ) -> anyhow::Result<String>;

    /// Deterministic URL the screenshot will be served from once stored.
    fn screenshot_url(&self, audit_id: &str, viewport: Viewport) -> String;

    /// Raw stored file for an audit, `None` when absent.
    async fn read_file(&self, audit_id: &str, file_name: &str) -> anyhow::Result<Option<Bytes>>;
}

// ============================================================================
// History database
// ============================================================================

pub struct HistoryDb {
    conn: Mutex<Connection>,
}

impl HistoryDb {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS audit_history (
                audit_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                hostname TEXT NOT NULL,
                overall_score INTEGER,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                report_url TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_history_created
                ON audit_history(created_at DESC);
            ",
        )?;
        Ok(())
    }

    pub fn upsert(&self, entry: &AuditHistoryEntry) -> anyhow::Result<()> {
        self.conn().execute(
            "INSERT INTO audit_history (audit_id, url, hostname, overall_score, status, created_at, report_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(audit_id) DO UPDATE SET
                overall_score = excluded.overall_score,
                status = excluded.status,
                report_url = excluded.report_url",
            params![
                entry.audit_id,
                entry.url,
                entry.hostname,
                entry.overall_score.map(i64::from),
                entry.status.as_str(),
                entry.created_at,
                entry.report_url,
            ],
        )?;
        Ok(())
    }

    /// Newest first, at most `HISTORY_MAX_LIMIT` rows.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<AuditHistoryEntry>> {
        let limit = limit.min(HISTORY_MAX_LIMIT);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT audit_id, url, hostname, overall_score, status, created_at, report_url
             FROM audit_history ORDER BY created_at DESC, audit_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let status: String = row.get(4)?;
            Ok(AuditHistoryEntry {
                audit_id: row.get(0)?,
                url: row.get(1)?,
                hostname: row.get(2)?,
                overall_score: row
                    .get::<_, Option<i64>>(3)?
                    .map(|s| s.clamp(0, 100) as u8),
                status: AuditStatus::parse(&status).unwrap_or(AuditStatus::Failed),
                created_at: row.get(5)?,
                report_url: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

// ============================================================================
// Local filesystem store
// ============================================================================

/// Files under `<root>/audits/<audit_id>/`, history in SQLite.
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
    db: HistoryDb,
}

impl LocalStore {
    pub fn open(
        root: impl Into<PathBuf>,
        db_path: &Path,
        public_base_url: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("audits"))?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            db: HistoryDb::open(db_path)?,
        })
    }

    fn audit_dir(&self, audit_id: &str) -> PathBuf {
        self.root.join("audits").join(audit_id)
    }

    fn file_url(&self, audit_id: &str, file_name: &str) -> String {
        format!("{}/audits/{}/{}", self.public_base_url, audit_id, file_name)
    }

    async fn write_file(&self, audit_id: &str, file_name: &str, data: &[u8]) -> anyhow::Result<()> {
        let dir = self.audit_dir(audit_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(file_name), data).await?;
        debug!(audit_id, file_name, bytes = data.len(), "Stored audit file");
        Ok(())
    }
}

#[async_trait]
impl ReportStore for LocalStore {
    async fn store_report(&self, audit_id: &str, report: &AuditReport) -> anyhow::Result<String> {
        let json = serde_json::to_vec_pretty(report)?;
        self.write_file(audit_id, "report.json", &json).await?;
        Ok(self.file_url(audit_id, "report"))
    }

    async fn load_report(&self, audit_id: &str) -> anyhow::Result<Option<AuditReport>> {
        match self.read_file(audit_id, "report.json").await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn append_history(&self, entry: &AuditHistoryEntry) -> anyhow::Result<()> {
        self.db.upsert(entry)
    }

    async fn history(&self, limit: usize) -> anyhow::Result<Vec<AuditHistoryEntry>> {
        self.db.recent(limit)
    }

    async fn store_screenshot(
        &self,
        audit_id: &str,
        viewport: Viewport,
        png: Bytes,
    ) -> anyhow::Result<String> {
        self.write_file(audit_id, &viewport.file_name(), &png).await?;
        Ok(self.screenshot_url(audit_id, viewport))
    }

    fn screenshot_url(&self, audit_id: &str, viewport: Viewport) -> String {
        self.file_url(audit_id, &viewport.file_name())
    }

    async fn read_file(&self, audit_id: &str, file_name: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.audit_dir(audit_id).join(file_name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
