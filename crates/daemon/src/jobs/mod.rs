use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::{parse_timestamp, timestamp, Database};

pub mod processor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobType {
    AssembleVideo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: f64,
    pub payload: Option<Value>,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct JobManager {
    db: Arc<Database>,
}

fn invalid_text(column: usize) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, "TEXT".to_string(), rusqlite::types::Type::Text)
}

impl JobManager {
    pub fn new(db: Arc<Database>) -> Self {
        JobManager { db }
    }

    pub fn create_job(&self, job_type: JobType, payload: Option<Value>) -> Result<i64> {
        let now = timestamp(Utc::now());
        let job_type_str = serde_json::to_string(&job_type)?;
        let status_str = serde_json::to_string(&JobStatus::Pending)?;
        let payload_str = payload.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO jobs (type, status, progress, payload_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![job_type_str, status_str, 0.0, payload_str, now, now],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, status, progress, payload_json, result_json, created_at, updated_at FROM jobs WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], |row| {
            let job_type_str: String = row.get(1)?;
            let status_str: String = row.get(2)?;
            let payload_str: Option<String> = row.get(4)?;
            let result_str: Option<String> = row.get(5)?;
            let created_at_str: String = row.get(6)?;
            let updated_at_str: String = row.get(7)?;

            let job_type = serde_json::from_str(&job_type_str).map_err(|_| invalid_text(1))?;
            let status = serde_json::from_str(&status_str).map_err(|_| invalid_text(2))?;
            let payload = payload_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|_| invalid_text(4))?;
            let result = result_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|_| invalid_text(5))?;

            Ok(Job {
                id: row.get(0)?,
                job_type,
                status,
                progress: row.get(3)?,
                payload,
                result,
                created_at: parse_timestamp(&created_at_str, 6)?,
                updated_at: parse_timestamp(&updated_at_str, 7)?,
            })
        })?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn update_job_status(&self, id: i64, status: JobStatus, progress: Option<f64>) -> Result<()> {
        let now = timestamp(Utc::now());
        let status_str = serde_json::to_string(&status)?;

        let conn = self.db.conn()?;
        if let Some(prog) = progress {
            conn.execute(
                "UPDATE jobs SET status = ?1, progress = ?2, updated_at = ?3 WHERE id = ?4",
                params![status_str, prog, now, id],
            )?;
        } else {
            conn.execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str, now, id],
            )?;
        }

        Ok(())
    }

    /// Mark a job finished and store its result document.
    pub fn finish_job(&self, id: i64, status: JobStatus, result: &Value) -> Result<()> {
        let now = timestamp(Utc::now());
        let status_str = serde_json::to_string(&status)?;
        let result_str = serde_json::to_string(result)?;

        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE jobs SET status = ?1, progress = 1.0, result_json = ?2, updated_at = ?3 WHERE id = ?4",
            params![status_str, result_str, now, id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_lifecycle_round_trips_through_the_database() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let jobs = JobManager::new(db);

        let id = jobs
            .create_job(JobType::AssembleVideo, Some(json!({ "video_id": 3 })))
            .unwrap();
        let job = jobs.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.payload, Some(json!({ "video_id": 3 })));
        assert!(job.result.is_none());

        jobs.update_job_status(id, JobStatus::Running, Some(0.25)).unwrap();
        assert_eq!(jobs.get_job(id).unwrap().unwrap().progress, 0.25);

        jobs.finish_job(id, JobStatus::Completed, &json!({ "video_url": "https://x/y.mp4" }))
            .unwrap();
        let job = jobs.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result.unwrap()["video_url"], "https://x/y.mp4");

        assert!(jobs.get_job(id + 100).unwrap().is_none());
    }
}
