use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::truncate_chars;

/// Longest OCR excerpt stored alongside a report.
pub const SNIPPET_LIMIT: usize = 100;

/// A report about to be saved. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub file_name: String,
    pub language: String,
    pub ocr_text_snippet: String,
    pub analysis_html: String,
    pub image_url: Option<String>,
}

impl NewReport {
    pub fn new(file_name: &str, language: &str, ocr_text: &str, analysis_html: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            language: language.to_string(),
            ocr_text_snippet: truncate_chars(ocr_text.trim(), SNIPPET_LIMIT).to_string(),
            analysis_html: analysis_html.to_string(),
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub file_name: String,
    pub language: String,
    pub ocr_text_snippet: String,
    pub analysis_html: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    FileName,
}

impl OrderField {
    fn column(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::FileName => "file_name",
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn append_record(&self, user_id: &str, report: NewReport) -> Result<ReportRecord>;
    async fn list_records(
        &self,
        user_id: &str,
        order_by: OrderField,
        descending: bool,
    ) -> Result<Vec<ReportRecord>>;
}

/// Per-user report history in SQLite.
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                language TEXT NOT NULL,
                ocr_text_snippet TEXT NOT NULL,
                analysis_html TEXT NOT NULL,
                image_url TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS reports_user_created ON reports (user_id, created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for SqliteHistory {
    async fn append_record(&self, user_id: &str, report: NewReport) -> Result<ReportRecord> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reports (user_id, file_name, language, ocr_text_snippet, analysis_html, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                report.file_name,
                report.language,
                report.ocr_text_snippet,
                report.analysis_html,
                report.image_url,
                created_at.timestamp_millis(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(user_id, id, "report saved");

        Ok(ReportRecord {
            id,
            file_name: report.file_name,
            language: report.language,
            ocr_text_snippet: report.ocr_text_snippet,
            analysis_html: report.analysis_html,
            image_url: report.image_url,
            created_at: millis_to_datetime(created_at.timestamp_millis()),
        })
    }

    async fn list_records(
        &self,
        user_id: &str,
        order_by: OrderField,
        descending: bool,
    ) -> Result<Vec<ReportRecord>> {
        let direction = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT id, file_name, language, ocr_text_snippet, analysis_html, image_url, created_at
             FROM reports WHERE user_id = ?1 ORDER BY {} {}, id {}",
            order_by.column(),
            direction,
            direction
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![user_id], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRecord> {
    Ok(ReportRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        language: row.get(2)?,
        ocr_text_snippet: row.get(3)?,
        analysis_html: row.get(4)?,
        image_url: row.get(5)?,
        created_at: millis_to_datetime(row.get(6)?),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}
