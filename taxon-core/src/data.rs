use crate::closure::ClosureSet;
use crate::reconcile::{COMBINED_CODE, ReconciledTable};
use crate::verify::LineageResult;
use rusqlite::{Connection, OptionalExtension, Result, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Ancestors,
    Nodes,
    Reconcile,
    Verify,
    Full,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Ancestors => "ancestors",
            RunKind::Nodes => "nodes",
            RunKind::Reconcile => "reconcile",
            RunKind::Verify => "verify",
            RunKind::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub inputs: String,
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    run_kind TEXT NOT NULL CHECK(run_kind IN ('ancestors', 'nodes', 'reconcile', 'verify', 'full')),
    inputs TEXT NOT NULL      -- JSON object of input paths and options
);

CREATE TABLE IF NOT EXISTS ancestor_edges (
    run_id TEXT NOT NULL,
    ancestor_id INTEGER NOT NULL,
    child_id INTEGER NOT NULL,
    FOREIGN KEY(run_id) REFERENCES pipeline_runs(id) ON DELETE CASCADE,
    PRIMARY KEY(run_id, ancestor_id, child_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_child ON ancestor_edges(run_id, child_id);

CREATE TABLE IF NOT EXISTS reconciled_rows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    combined_code TEXT,
    presence TEXT NOT NULL CHECK(presence IN ('both', 'left_only', 'right_only')),
    record TEXT NOT NULL,     -- JSON object of the full row
    FOREIGN KEY(run_id) REFERENCES pipeline_runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, row_index)
);

CREATE INDEX IF NOT EXISTS idx_reconciled_presence ON reconciled_rows(run_id, presence);

CREATE TABLE IF NOT EXISTS lineage_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    lineage_name TEXT NOT NULL,
    chain TEXT NOT NULL,      -- expected identifiers joined with ' → '
    closure_passed BOOLEAN NOT NULL,
    pointer_passed BOOLEAN NOT NULL,
    agreement TEXT NOT NULL,
    detail TEXT NOT NULL,     -- JSON of the full result
    FOREIGN KEY(run_id) REFERENCES pipeline_runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_lineage_run ON lineage_results(run_id);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, kind: RunKind, inputs: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let timestamp = current_timestamp();

        self.conn.execute(
            "INSERT INTO pipeline_runs (id, start_time, status, run_kind, inputs) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&run_id, timestamp, "running", kind.as_str(), inputs],
        )?;

        Ok(run_id)
    }

    pub fn complete_run(&self, run_id: &str) -> Result<()> {
        self.finish_run(run_id, "completed")
    }

    pub fn fail_run(&self, run_id: &str) -> Result<()> {
        self.finish_run(run_id, "failed")
    }

    fn finish_run(&self, run_id: &str, status: &str) -> Result<()> {
        let timestamp = current_timestamp();
        self.conn.execute(
            "UPDATE pipeline_runs SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status, timestamp, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunInfo>> {
        self.conn
            .query_row(
                "SELECT id, run_kind, status, start_time, end_time, inputs FROM pipeline_runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunInfo {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        status: row.get(2)?,
                        start_time: row.get(3)?,
                        end_time: row.get(4)?,
                        inputs: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_kind, status, start_time, end_time, inputs FROM pipeline_runs ORDER BY start_time, id",
        )?;

        let runs = stmt
            .query_map([], |row| {
                Ok(RunInfo {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    status: row.get(2)?,
                    start_time: row.get(3)?,
                    end_time: row.get(4)?,
                    inputs: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(runs)
    }

    // Artifacts
    pub fn insert_edges(&mut self, run_id: &str, closure: &ClosureSet) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ancestor_edges (run_id, ancestor_id, child_id) VALUES (?1, ?2, ?3)",
            )?;
            for edge in closure.edges() {
                stmt.execute(params![run_id, edge.ancestor_id, edge.descendant_id])?;
            }
        }
        tx.commit()?;
        Ok(closure.len())
    }

    pub fn insert_reconciled(&mut self, run_id: &str, reconciled: &ReconciledTable) -> Result<usize> {
        let table = reconciled.table();
        let code_col = table.column_index(COMBINED_CODE);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO reconciled_rows (run_id, row_index, combined_code, presence, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (row_index, row) in table.rows().iter().enumerate() {
                let record: serde_json::Map<String, serde_json::Value> = table
                    .headers()
                    .iter()
                    .zip(row)
                    .map(|(h, c)| (h.clone(), serde_json::json!(c)))
                    .collect();
                let presence = reconciled
                    .presence(row_index)
                    .map(|p| p.as_str())
                    .unwrap_or("right_only");
                stmt.execute(params![
                    run_id,
                    row_index as i64,
                    code_col.and_then(|c| table.cell(row_index, c)),
                    presence,
                    serde_json::Value::Object(record).to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(table.len())
    }

    pub fn insert_lineage_results(&mut self, run_id: &str, results: &[LineageResult]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO lineage_results (
                    run_id, lineage_name, chain, closure_passed, pointer_passed, agreement, detail
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for result in results {
                let agreement = serde_json::to_value(result.agreement)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let detail = serde_json::to_string(result).unwrap_or_default();
                stmt.execute(params![
                    run_id,
                    &result.lineage.name,
                    result.lineage.to_string(),
                    result.closure.passed,
                    result.pointer.passed,
                    agreement,
                    detail,
                ])?;
            }
        }
        tx.commit()?;
        Ok(results.len())
    }

    // Query methods
    pub fn count_edges(&self, run_id: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM ancestor_edges WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )
    }

    pub fn count_reconciled_by_presence(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT presence, COUNT(*) FROM reconciled_rows WHERE run_id = ?1 GROUP BY presence ORDER BY presence",
        )?;

        let counts = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        Ok(counts)
    }

    pub fn get_ancestors(&self, run_id: &str, child_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT ancestor_id FROM ancestor_edges WHERE run_id = ?1 AND child_id = ?2 AND ancestor_id != child_id ORDER BY ancestor_id",
        )?;

        let ancestors = stmt
            .query_map(params![run_id, child_id], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;

        Ok(ancestors)
    }

    pub fn get_lineage_results(&self, run_id: &str) -> Result<Vec<(String, bool, bool, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT lineage_name, closure_passed, pointer_passed, agreement FROM lineage_results WHERE run_id = ?1 ORDER BY id",
        )?;

        let results = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(results)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
