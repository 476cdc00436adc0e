//! Task history persistence.
//!
//! Small SQLite database recording every task that reached a terminal
//! status, so an operator can audit past sessions after the in-memory
//! queue is gone. Schema changes go through the schema_version table.

use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::error::FilerError;
use crate::types::{Task, TaskStatus};

const SCHEMA_VERSION: i64 = 1;

/// One persisted history row.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub task_id: String,
    pub pdf_path: String,
    pub selected_values: Vec<String>,
    pub status: String,
    pub error_msg: String,
    pub original_pdf_location: String,
    pub processed_pdf_location: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
}

pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    pub fn open(path: &Path) -> Result<Self, FilerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FilerError::Db(e.to_string()))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| FilerError::Db(format!("Could not open history database: {}", e)))?;
        let db = HistoryDb { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, FilerError> {
        let conn = Connection::open_in_memory().map_err(|e| FilerError::Db(e.to_string()))?;
        let db = HistoryDb { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), FilerError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
            )
            .map_err(|e| FilerError::Db(e.to_string()))?;
        let version: Option<i64> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .map_err(|e| FilerError::Db(e.to_string()))?;
        if version.unwrap_or(0) >= SCHEMA_VERSION {
            return Ok(());
        }
        info!(version = SCHEMA_VERSION, "initializing history schema");
        self.conn
            .execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS tasks (
                     task_id TEXT PRIMARY KEY,
                     pdf_path TEXT NOT NULL,
                     selected_values TEXT NOT NULL,
                     status TEXT NOT NULL,
                     error_msg TEXT NOT NULL DEFAULT '',
                     row_idx INTEGER,
                     original_hyperlink TEXT,
                     original_pdf_location TEXT NOT NULL,
                     processed_pdf_location TEXT,
                     start_time TEXT NOT NULL,
                     end_time TEXT
                 );
                 CREATE INDEX IF NOT EXISTS idx_tasks_start_time ON tasks(start_time);
                 INSERT INTO schema_version (version) VALUES (1);
                 COMMIT;",
            )
            .map_err(|e| FilerError::Db(e.to_string()))
    }

    /// Insert or replace the task's history row.
    pub fn record_task(&self, task: &Task) -> Result<(), FilerError> {
        let values = serde_json::to_string(&task.selected_values)
            .map_err(|e| FilerError::Db(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO tasks (
                     task_id, pdf_path, selected_values, status, error_msg, row_idx,
                     original_hyperlink, original_pdf_location, processed_pdf_location,
                     start_time, end_time
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    task.task_id,
                    task.pdf_path,
                    values,
                    task.status.as_str(),
                    task.error_msg,
                    task.row_idx.map(|i| i as i64),
                    task.original_hyperlink,
                    task.original_pdf_location,
                    task.processed_pdf_location,
                    task.start_time.to_rfc3339(),
                    task.end_time.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| FilerError::Db(e.to_string()))?;
        debug!(task = %task.task_id, status = %task.status, "history row written");
        Ok(())
    }

    /// Update just the status and error message of an existing row.
    pub fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error_msg: &str,
    ) -> Result<(), FilerError> {
        let changed = self
            .conn
            .execute(
                "UPDATE tasks SET status = ?1, error_msg = ?2 WHERE task_id = ?3",
                params![status.as_str(), error_msg, task_id],
            )
            .map_err(|e| FilerError::Db(e.to_string()))?;
        if changed == 0 {
            return Err(FilerError::Db(format!("no history row for task {}", task_id)));
        }
        Ok(())
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, FilerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT task_id, pdf_path, selected_values, status, error_msg,
                        original_pdf_location, processed_pdf_location, start_time, end_time
                 FROM tasks ORDER BY start_time DESC LIMIT ?1",
            )
            .map_err(|e| FilerError::Db(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let values_json: String = row.get(2)?;
                Ok(HistoryEntry {
                    task_id: row.get(0)?,
                    pdf_path: row.get(1)?,
                    selected_values: serde_json::from_str(&values_json).unwrap_or_default(),
                    status: row.get(3)?,
                    error_msg: row.get(4)?,
                    original_pdf_location: row.get(5)?,
                    processed_pdf_location: row.get(6)?,
                    start_time: row.get(7)?,
                    end_time: row.get(8)?,
                })
            })
            .map_err(|e| FilerError::Db(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| FilerError::Db(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_read_back() {
        let db = HistoryDb::open_in_memory().unwrap();
        let mut task = Task::new("/in/scan.pdf", vec!["Acme".to_string(), "Jan".to_string()]);
        task.status = TaskStatus::Completed;
        task.processed_pdf_location = Some("/out/ACME - JAN.pdf".to_string());
        db.record_task(&task).unwrap();

        let entries = db.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, task.task_id);
        assert_eq!(entries[0].status, "completed");
        assert_eq!(entries[0].selected_values, vec!["Acme", "Jan"]);
    }

    #[test]
    fn status_update_hits_existing_row_only() {
        let db = HistoryDb::open_in_memory().unwrap();
        let mut task = Task::new("/in/scan.pdf", vec![]);
        task.status = TaskStatus::Completed;
        db.record_task(&task).unwrap();

        db.update_status(&task.task_id, TaskStatus::Reverted, "").unwrap();
        let entries = db.recent(1).unwrap();
        assert_eq!(entries[0].status, "reverted");

        assert!(db.update_status("missing", TaskStatus::Failed, "x").is_err());
    }

    #[test]
    fn migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        drop(HistoryDb::open(&path).unwrap());
        let db = HistoryDb::open(&path).unwrap();
        assert!(db.recent(1).unwrap().is_empty());
    }
}
