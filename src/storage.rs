//! Alert persistence.
//!
//! Each analysis run gets a row in `runs`; its alerts are appended to
//! `alerts` in log order and can be read back for later export.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::alert::{Alert, AlertKind};

/// Identifier of a stored analysis run.
pub type RunId = i64;

/// Summary row for a stored run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRecord {
    pub id: RunId,
    pub created_at: i64,
    pub source: String,
    pub fps: f64,
    /// `None` until the run is finished.
    pub frames_processed: Option<u64>,
    pub frames_skipped: Option<u64>,
}

pub trait AlertStore {
    fn begin_run(&mut self, source: &str, fps: f64) -> Result<RunId>;

    fn append_alerts(&mut self, run: RunId, alerts: &[Alert]) -> Result<()>;

    fn finish_run(&mut self, run: RunId, frames_processed: u64, frames_skipped: u64)
        -> Result<()>;

    fn read_alerts(&mut self, run: RunId) -> Result<Vec<Alert>>;

    fn latest_run(&mut self) -> Result<Option<RunRecord>>;
}

pub struct SqliteAlertStore {
    conn: Connection,
}

impl SqliteAlertStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open alert database {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS runs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              source TEXT NOT NULL,
              fps REAL NOT NULL,
              frames_processed INTEGER,
              frames_skipped INTEGER
            );

            CREATE TABLE IF NOT EXISTS alerts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              run_id INTEGER NOT NULL REFERENCES runs(id),
              frame_index INTEGER NOT NULL,
              time TEXT NOT NULL,
              kind_json TEXT NOT NULL,
              message TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_run ON alerts(run_id);
            "#,
        )?;
        Ok(())
    }

    fn run_exists(&self, run: RunId) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM runs WHERE id = ?1", params![run], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl AlertStore for SqliteAlertStore {
    fn begin_run(&mut self, source: &str, fps: f64) -> Result<RunId> {
        let created_at = now_s()? as i64;
        self.conn.execute(
            "INSERT INTO runs(created_at, source, fps) VALUES (?1, ?2, ?3)",
            params![created_at, source, fps],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn append_alerts(&mut self, run: RunId, alerts: &[Alert]) -> Result<()> {
        if !self.run_exists(run)? {
            return Err(anyhow!("unknown run {}", run));
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO alerts(run_id, frame_index, time, kind_json, message)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for alert in alerts {
                let frame_index = i64::try_from(alert.frame_index)
                    .map_err(|_| anyhow!("frame index exceeds i64 range"))?;
                stmt.execute(params![
                    run,
                    frame_index,
                    alert.time,
                    serde_json::to_string(&alert.kind)?,
                    alert.message()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn finish_run(
        &mut self,
        run: RunId,
        frames_processed: u64,
        frames_skipped: u64,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET frames_processed = ?1, frames_skipped = ?2 WHERE id = ?3",
            params![frames_processed as i64, frames_skipped as i64, run],
        )?;
        if updated == 0 {
            return Err(anyhow!("unknown run {}", run));
        }
        Ok(())
    }

    fn read_alerts(&mut self, run: RunId) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT frame_index, time, kind_json FROM alerts WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![run])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let frame_index: i64 = row.get(0)?;
            let time: String = row.get(1)?;
            let kind_json: String = row.get(2)?;
            let kind: AlertKind = serde_json::from_str(&kind_json)
                .with_context(|| format!("corrupt alert kind in run {}", run))?;
            out.push(Alert {
                frame_index: u64::try_from(frame_index)
                    .map_err(|_| anyhow!("corrupt alert: negative frame index"))?,
                time,
                kind,
            });
        }
        Ok(out)
    }

    fn latest_run(&mut self) -> Result<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT id, created_at, source, fps, frames_processed, frames_skipped
                FROM runs ORDER BY id DESC LIMIT 1
                "#,
                [],
                |row| {
                    let processed: Option<i64> = row.get(4)?;
                    let skipped: Option<i64> = row.get(5)?;
                    Ok(RunRecord {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        source: row.get(2)?,
                        fps: row.get(3)?,
                        frames_processed: processed.map(|n| n as u64),
                        frames_skipped: skipped.map(|n| n as u64),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

// ---- In-memory store ----

#[derive(Clone, Debug)]
struct InMemoryRun {
    record: RunRecord,
    alerts: Vec<Alert>,
}

/// Store that keeps runs in memory; useful for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAlertStore {
    runs: Vec<InMemoryRun>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn run_mut(&mut self, run: RunId) -> Result<&mut InMemoryRun> {
        self.runs
            .iter_mut()
            .find(|r| r.record.id == run)
            .ok_or_else(|| anyhow!("unknown run {}", run))
    }
}

impl AlertStore for InMemoryAlertStore {
    fn begin_run(&mut self, source: &str, fps: f64) -> Result<RunId> {
        let id = self.runs.len() as RunId + 1;
        self.runs.push(InMemoryRun {
            record: RunRecord {
                id,
                created_at: now_s()? as i64,
                source: source.to_string(),
                fps,
                frames_processed: None,
                frames_skipped: None,
            },
            alerts: Vec::new(),
        });
        Ok(id)
    }

    fn append_alerts(&mut self, run: RunId, alerts: &[Alert]) -> Result<()> {
        self.run_mut(run)?.alerts.extend_from_slice(alerts);
        Ok(())
    }

    fn finish_run(
        &mut self,
        run: RunId,
        frames_processed: u64,
        frames_skipped: u64,
    ) -> Result<()> {
        let entry = self.run_mut(run)?;
        entry.record.frames_processed = Some(frames_processed);
        entry.record.frames_skipped = Some(frames_skipped);
        Ok(())
    }

    fn read_alerts(&mut self, run: RunId) -> Result<Vec<Alert>> {
        Ok(self.run_mut(run)?.alerts.clone())
    }

    fn latest_run(&mut self) -> Result<Option<RunRecord>> {
        Ok(self.runs.last().map(|r| r.record.clone()))
    }
}

fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alerts() -> Vec<Alert> {
        vec![
            Alert::new(51, "00:02", AlertKind::Loitering),
            Alert::new(
                81,
                "00:03",
                AlertKind::ObjectAbandonment {
                    label: "suitcase".to_string(),
                },
            ),
        ]
    }

    fn exercise(store: &mut dyn AlertStore) {
        assert!(store.latest_run().unwrap().is_none());

        let run = store.begin_run("stub://lobby", 25.0).unwrap();
        store.append_alerts(run, &alerts()).unwrap();
        store.finish_run(run, 120, 2).unwrap();

        let latest = store.latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run);
        assert_eq!(latest.source, "stub://lobby");
        assert_eq!(latest.frames_processed, Some(120));
        assert_eq!(latest.frames_skipped, Some(2));
        assert_eq!(store.read_alerts(run).unwrap(), alerts());

        assert!(store.append_alerts(run + 100, &alerts()).is_err());
        assert!(store.finish_run(run + 100, 1, 0).is_err());
    }

    #[test]
    fn sqlite_store_round_trips_runs() {
        let mut store = SqliteAlertStore::open(":memory:").unwrap();
        exercise(&mut store);
    }

    #[test]
    fn in_memory_store_round_trips_runs() {
        let mut store = InMemoryAlertStore::new();
        exercise(&mut store);
    }

    #[test]
    fn runs_keep_alerts_separate() {
        let mut store = SqliteAlertStore::open(":memory:").unwrap();
        let first = store.begin_run("a.mp4", 25.0).unwrap();
        let second = store.begin_run("b.mp4", 30.0).unwrap();
        store.append_alerts(first, &alerts()).unwrap();
        store
            .append_alerts(second, &[Alert::new(3, "00:00", AlertKind::UnusualActivity)])
            .unwrap();

        assert_eq!(store.read_alerts(first).unwrap().len(), 2);
        assert_eq!(
            store.read_alerts(second).unwrap()[0].kind,
            AlertKind::UnusualActivity
        );
        assert!(store.latest_run().unwrap().unwrap().frames_processed.is_none());
    }
}
