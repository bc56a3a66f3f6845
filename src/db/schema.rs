pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS analyses (
    task_id TEXT PRIMARY KEY,
    commit_hash TEXT NOT NULL,
    approved INTEGER NOT NULL,
    overall_score REAL NOT NULL DEFAULT 0.0,
    payload_json TEXT NOT NULL,
    analysis_json TEXT NOT NULL,
    review_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_commit ON analyses(commit_hash);
CREATE INDEX IF NOT EXISTS idx_analyses_approved ON analyses(approved);
";
