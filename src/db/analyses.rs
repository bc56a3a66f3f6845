use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::agents::JsonMap;
use crate::errors::AgentError;
use crate::pipeline::{AnalysisRecord, StorageSink};
use super::Database;

const COLUMNS: &str =
    "task_id, commit_hash, approved, overall_score, payload_json, analysis_json, review_json, created_at";

impl Database {
    /// Insert or overwrite the record for `record.task_id`.
    pub fn insert_analysis(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        let conn = self.lock();
        conn.execute(
            &format!("INSERT OR REPLACE INTO analyses ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
            rusqlite::params![
                record.task_id,
                record.commit_hash,
                record.approved,
                record.overall_score,
                serde_json::to_string(&record.payload)?,
                serde_json::to_string(&record.analysis)?,
                serde_json::to_string(&record.review)?,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AgentError::Database(format!("Failed to insert analysis: {}", e)))?;
        debug!(task_id = %record.task_id, approved = record.approved, "Analysis stored");
        Ok(())
    }

    pub fn get_analysis(&self, task_id: &str) -> Result<Option<AnalysisRecord>, AgentError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM analyses WHERE task_id = ?1", COLUMNS))
            .map_err(|e| AgentError::Database(format!("Query failed: {}", e)))?;

        match stmt.query_row(rusqlite::params![task_id], read_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AgentError::Database(format!("Query error: {}", e))),
        }
    }

    /// Newest first. `approved` restricts to one decision.
    pub fn list_analyses(
        &self,
        approved: Option<bool>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AnalysisRecord>, AgentError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM analyses WHERE (?1 IS NULL OR approved = ?1) \
                 ORDER BY created_at DESC, task_id LIMIT ?2 OFFSET ?3",
                COLUMNS
            ))
            .map_err(|e| AgentError::Database(format!("Query failed: {}", e)))?;

        let rows = stmt
            .query_map(rusqlite::params![approved, limit as i64, offset as i64], read_row)
            .map_err(|e| AgentError::Database(format!("Query error: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| AgentError::Database(format!("Row error: {}", e)))?);
        }
        Ok(records)
    }

    pub fn count_analyses(&self) -> Result<usize, AgentError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))
            .map_err(|e| AgentError::Database(format!("Query error: {}", e)))?;
        Ok(count as usize)
    }

    async fn store_blocking(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        let db = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || db.insert_analysis(&record))
            .await
            .map_err(|e| AgentError::Internal(format!("storage task failed: {}", e)))?
            .map_err(|e| AgentError::Storage(e.to_string()))
    }
}

#[async_trait]
impl StorageSink for Database {
    async fn store_approved(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        self.store_blocking(record).await
    }

    async fn store_rejected(&self, record: &AnalysisRecord) -> Result<(), AgentError> {
        self.store_blocking(record).await
    }
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<AnalysisRecord> {
    let created_at: String = row.get(7)?;
    Ok(AnalysisRecord {
        task_id: row.get(0)?,
        commit_hash: row.get(1)?,
        approved: row.get(2)?,
        overall_score: row.get(3)?,
        payload: json_column(row.get(4)?),
        analysis: json_column(row.get(5)?),
        review: json_column(row.get(6)?),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

fn json_column(text: String) -> JsonMap {
    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => map,
        _ => JsonMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(task_id: &str, hash: &str, approved: bool, score: f64) -> AnalysisRecord {
        let payload = json!({"hash": hash, "message": "fix: handle empty diff"});
        let analysis = json!({"category": "bugfix", "summary": "Handle empty diff"});
        let review = json!({"overall_score": score, "approved": approved});
        AnalysisRecord::new(
            task_id,
            payload.as_object().unwrap(),
            analysis.as_object().unwrap(),
            review.as_object().unwrap(),
            approved,
        )
    }

    #[test]
    fn test_db_insert_and_get_analysis() {
        let db = Database::in_memory().unwrap();
        db.insert_analysis(&record("t1", "abc123", true, 0.91)).unwrap();

        let stored = db.get_analysis("t1").unwrap().unwrap();
        assert_eq!(stored.commit_hash, "abc123");
        assert!(stored.approved);
        assert_eq!(stored.overall_score, 0.91);
        assert_eq!(stored.analysis["category"], "bugfix");
        assert_eq!(stored.review["approved"], true);
    }

    #[test]
    fn test_db_get_missing_analysis() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_analysis("nope").unwrap().is_none());
    }

    #[test]
    fn test_db_list_filters_and_paginates() {
        let db = Database::in_memory().unwrap();
        for i in 0..4 {
            db.insert_analysis(&record(&format!("a{}", i), "h", true, 0.9)).unwrap();
        }
        db.insert_analysis(&record("r0", "h", false, 0.4)).unwrap();

        assert_eq!(db.list_analyses(None, 10, 0).unwrap().len(), 5);
        assert_eq!(db.list_analyses(Some(true), 10, 0).unwrap().len(), 4);
        assert_eq!(db.list_analyses(Some(false), 10, 0).unwrap()[0].task_id, "r0");
        assert_eq!(db.list_analyses(None, 2, 0).unwrap().len(), 2);
        assert_eq!(db.list_analyses(None, 10, 4).unwrap().len(), 1);
        assert_eq!(db.count_analyses().unwrap(), 5);
    }

    #[test]
    fn test_db_insert_replaces_same_task() {
        let db = Database::in_memory().unwrap();
        db.insert_analysis(&record("t1", "abc", false, 0.5)).unwrap();
        db.insert_analysis(&record("t1", "abc", true, 0.95)).unwrap();
        assert_eq!(db.count_analyses().unwrap(), 1);
        assert!(db.get_analysis("t1").unwrap().unwrap().approved);
    }

    #[tokio::test]
    async fn test_db_as_storage_sink() {
        let db = Database::in_memory().unwrap();
        let sink: &dyn StorageSink = &db;
        sink.store_approved(&record("t1", "abc", true, 0.9)).await.unwrap();
        sink.store_rejected(&record("t2", "def", false, 0.3)).await.unwrap();
        assert_eq!(db.list_analyses(Some(false), 10, 0).unwrap()[0].commit_hash, "def");
    }
}
