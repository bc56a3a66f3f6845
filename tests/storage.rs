use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use gitmentor::agents::JsonMap;
use gitmentor::db::Database;
use gitmentor::pipeline::{AnalysisRecord, StorageSink};

fn obj(value: serde_json::Value) -> JsonMap {
    value.as_object().cloned().unwrap()
}

fn record(task_id: &str, approved: bool) -> AnalysisRecord {
    AnalysisRecord::new(
        task_id,
        &obj(json!({"hash": format!("hash-{}", task_id), "message": "docs: update readme"})),
        &obj(json!({"summary": "Update readme", "category": "docs"})),
        &obj(json!({"approved": approved, "overall_score": if approved { 0.92 } else { 0.41 }})),
        approved,
    )
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("gitmentor.db");

    {
        let db = Database::new(&path).unwrap();
        let sink: Arc<dyn StorageSink> = Arc::new(db);
        sink.store_approved(&record("t1", true)).await.unwrap();
        sink.store_rejected(&record("t2", false)).await.unwrap();
    }

    let reopened = Database::new(&path).unwrap();
    assert_eq!(reopened.count_analyses().unwrap(), 2);

    let approved = reopened.get_analysis("t1").unwrap().unwrap();
    assert!(approved.approved);
    assert_eq!(approved.commit_hash, "hash-t1");
    assert_eq!(approved.overall_score, 0.92);
    assert_eq!(approved.payload["message"], "docs: update readme");

    let rejected = reopened.list_analyses(Some(false), 10, 0).unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].task_id, "t2");
}

#[tokio::test]
async fn test_concurrent_stores() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("gitmentor.db")).unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.store_approved(&record(&format!("t{}", i), true)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(db.count_analyses().unwrap(), 20);
    assert_eq!(db.list_analyses(None, 5, 0).unwrap().len(), 5);
}
