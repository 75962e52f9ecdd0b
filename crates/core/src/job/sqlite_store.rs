//! SQLite-backed job store implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::registry;

use super::{
    ConversionOptions, ErrorDetail, JobError, JobRecord, JobStatus, JobStore, NewJob, SweptJob,
    TransitionPayload,
};

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str = "id, source_format, target_format, original_name, options, \
     input_path, status, error, result_ref, created_at, started_at, completed_at, updated_at";

/// Fixed-width UTC timestamp so SQL string comparison orders chronologically.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                source_format TEXT NOT NULL,
                target_format TEXT NOT NULL,
                original_name TEXT NOT NULL,
                options TEXT NOT NULL,
                input_path TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                result_ref TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_completed_at ON jobs(completed_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let id: String = row.get(0)?;
        let source_format: String = row.get(1)?;
        let target_format: String = row.get(2)?;
        let original_name: String = row.get(3)?;
        let options_json: String = row.get(4)?;
        let input_path: String = row.get(5)?;
        let status_str: String = row.get(6)?;
        let error_json: Option<String> = row.get(7)?;
        let result_ref: Option<String> = row.get(8)?;
        let created_at_str: String = row.get(9)?;
        let started_at_str: Option<String> = row.get(10)?;
        let completed_at_str: Option<String> = row.get(11)?;
        let updated_at_str: String = row.get(12)?;

        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        let options: ConversionOptions =
            serde_json::from_str(&options_json).unwrap_or_default();
        let error: Option<ErrorDetail> =
            error_json.and_then(|json| serde_json::from_str(&json).ok());
        let status = JobStatus::parse(&status_str).unwrap_or(JobStatus::Pending);

        Ok(JobRecord {
            id,
            source_format,
            target_format,
            original_name,
            options,
            input_path: PathBuf::from(input_path),
            status,
            error,
            result_ref,
            created_at: parse_ts(&created_at_str),
            started_at: started_at_str.as_deref().map(parse_ts),
            completed_at: completed_at_str.as_deref().map(parse_ts),
            updated_at: parse_ts(&updated_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<JobRecord>, JobError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", SELECT_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_record)
            .optional()
            .map_err(|e| JobError::Database(e.to_string()))
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, new_job: NewJob) -> Result<JobRecord, JobError> {
        let source = registry::normalize(&new_job.source_format);
        let target = registry::normalize(&new_job.target_format);

        // Rejected requests never enter the store.
        if !registry::supported(&source, &target) {
            return Err(JobError::UnsupportedFormat {
                source_format: source,
                target_format: target,
            });
        }

        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let options_json = serde_json::to_string(&new_job.options)
            .map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, source_format, target_format, original_name, options, \
             input_path, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                source,
                target,
                new_job.original_name,
                options_json,
                new_job.input_path.to_string_lossy(),
                JobStatus::Pending.as_str(),
                ts(&now),
                ts(&now),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(JobRecord {
            id,
            source_format: source,
            target_format: target,
            original_name: new_job.original_name,
            options: new_job.options,
            input_path: new_job.input_path,
            status: JobStatus::Pending,
            error: None,
            result_ref: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, id)
    }

    fn transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<JobRecord, JobError> {
        if !JobStatus::can_transition(from, to) {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                current: from,
                requested: to,
            });
        }

        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        // The WHERE id AND status clause is the compare-and-set: zero rows
        // means another writer got there first (or the job is gone).
        let rows = match (to, &payload) {
            (JobStatus::Running, TransitionPayload::None) => conn.execute(
                "UPDATE jobs SET status = ?1, started_at = ?2, updated_at = ?2 \
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), ts(&now), id, from.as_str()],
            ),
            (JobStatus::Succeeded, TransitionPayload::ResultRef(result_ref)) => conn.execute(
                "UPDATE jobs SET status = ?1, result_ref = ?2, completed_at = ?3, \
                 updated_at = ?3 WHERE id = ?4 AND status = ?5",
                params![to.as_str(), result_ref, ts(&now), id, from.as_str()],
            ),
            (JobStatus::Failed, TransitionPayload::Error(error)) => {
                let error_json = serde_json::to_string(error)
                    .map_err(|e| JobError::Database(e.to_string()))?;
                conn.execute(
                    "UPDATE jobs SET status = ?1, error = ?2, completed_at = ?3, \
                     updated_at = ?3 WHERE id = ?4 AND status = ?5",
                    params![to.as_str(), error_json, ts(&now), id, from.as_str()],
                )
            }
            (JobStatus::Pending, TransitionPayload::None) => conn.execute(
                "UPDATE jobs SET status = ?1, started_at = NULL, updated_at = ?2 \
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), ts(&now), id, from.as_str()],
            ),
            (JobStatus::Expired, TransitionPayload::None) => conn.execute(
                "UPDATE jobs SET status = ?1, result_ref = NULL, updated_at = ?2 \
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), ts(&now), id, from.as_str()],
            ),
            _ => {
                return Err(JobError::Database(format!(
                    "transition payload does not match target status {}",
                    to
                )));
            }
        }
        .map_err(|e| JobError::Database(e.to_string()))?;

        if rows == 0 {
            return match Self::fetch(&conn, id)? {
                None => Err(JobError::NotFound(id.to_string())),
                Some(record) => Err(JobError::InvalidTransition {
                    job_id: id.to_string(),
                    current: record.status,
                    requested: to,
                }),
            };
        }

        Self::fetch(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<SweptJob>, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let sql = "SELECT id, status, result_ref, input_path FROM jobs \
                   WHERE status IN ('succeeded', 'failed') \
                   AND completed_at IS NOT NULL AND completed_at < ?";
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let candidates: Vec<(String, String, Option<String>, String)> = stmt
            .query_map(params![ts(&cutoff)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|e| JobError::Database(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut swept = Vec::new();
        for (id, status, result_ref, input_path) in candidates {
            // Per-row CAS keeps a concurrent transition from being clobbered.
            let rows = conn
                .execute(
                    "UPDATE jobs SET status = 'expired', result_ref = NULL, updated_at = ?1 \
                     WHERE id = ?2 AND status = ?3",
                    params![ts(&now), id, status],
                )
                .map_err(|e| JobError::Database(e.to_string()))?;

            if rows == 1 {
                swept.push(SweptJob {
                    job_id: id,
                    result_ref,
                    input_path: PathBuf::from(input_path),
                });
            }
        }

        Ok(swept)
    }

    fn list_stalled(
        &self,
        status: JobStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM jobs WHERE status = ? AND updated_at < ? \
             ORDER BY updated_at ASC LIMIT 500",
            SELECT_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![status.as_str(), ts(&older_than)], Self::row_to_record)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| JobError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    fn count(&self, status: JobStatus) -> Result<i64, JobError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?",
            params![status.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }
}
