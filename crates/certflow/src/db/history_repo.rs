//! Status history repository: the append-only audit trail.
//!
//! Rows are only ever inserted; the store rejects UPDATE and DELETE on both
//! history tables. Reads return rows in insertion order.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::DatabaseError;

/// A job status history row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryRow {
    pub id: i64,
    pub job_id: String,
    /// `None` for the creation record.
    pub previous_status: Option<String>,
    pub new_status: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: String,
}

impl JobHistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            previous_status: row.get("previous_status")?,
            new_status: row.get("new_status")?,
            actor: row.get("actor")?,
            reason: row.get("reason")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A survey status history row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyHistoryRow {
    pub id: i64,
    pub survey_id: String,
    pub previous_status: String,
    pub new_status: String,
    pub submission_count: u32,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: String,
}

impl SurveyHistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            survey_id: row.get("survey_id")?,
            previous_status: row.get("previous_status")?,
            new_status: row.get("new_status")?,
            submission_count: row.get("submission_count")?,
            actor: row.get("actor")?,
            reason: row.get("reason")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Appends one job history row.
pub fn append_job(
    conn: &Connection,
    job_id: &str,
    previous_status: Option<&str>,
    new_status: &str,
    actor: &str,
    reason: Option<&str>,
    created_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_status_history
             (job_id, previous_status, new_status, actor, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![job_id, previous_status, new_status, actor, reason, created_at],
    )?;
    Ok(())
}

/// Appends one survey history row.
#[allow(clippy::too_many_arguments)]
pub fn append_survey(
    conn: &Connection,
    survey_id: &str,
    previous_status: &str,
    new_status: &str,
    submission_count: u32,
    actor: &str,
    reason: Option<&str>,
    created_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO survey_status_history (survey_id, previous_status, new_status,
         submission_count, actor, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            survey_id,
            previous_status,
            new_status,
            submission_count,
            actor,
            reason,
            created_at
        ],
    )?;
    Ok(())
}

/// Lists a job's history in the order it was committed.
pub fn list_job(conn: &Connection, job_id: &str) -> Result<Vec<JobHistoryRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM job_status_history WHERE job_id = ?1 ORDER BY id ASC")?;
    let rows = stmt
        .query_map(params![job_id], JobHistoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lists a survey's history in the order it was committed.
pub fn list_survey(
    conn: &Connection,
    survey_id: &str,
) -> Result<Vec<SurveyHistoryRow>, DatabaseError> {
    let mut stmt = conn
        .prepare("SELECT * FROM survey_status_history WHERE survey_id = ?1 ORDER BY id ASC")?;
    let rows = stmt
        .query_map(params![survey_id], SurveyHistoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
