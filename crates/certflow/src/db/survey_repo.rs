//! Survey repository: row access for the `surveys` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw survey row from the database.
#[derive(Debug, Clone)]
pub struct SurveyRow {
    pub id: String,
    pub job_id: String,
    pub status: String,
    pub submission_count: u32,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub attendance_photo_ref: Option<String>,
    pub survey_statement: Option<String>,
    pub checklist: Option<String>,
    pub started_at: Option<String>,
    pub submitted_at: Option<String>,
    pub declared_by: Option<String>,
    pub declared_at: Option<String>,
    pub finalized_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SurveyRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            status: row.get("status")?,
            submission_count: row.get("submission_count")?,
            gps_latitude: row.get("gps_latitude")?,
            gps_longitude: row.get("gps_longitude")?,
            attendance_photo_ref: row.get("attendance_photo_ref")?,
            survey_statement: row.get("survey_statement")?,
            checklist: row.get("checklist")?,
            started_at: row.get("started_at")?,
            submitted_at: row.get("submitted_at")?,
            declared_by: row.get("declared_by")?,
            declared_at: row.get("declared_at")?,
            finalized_at: row.get("finalized_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new survey row.
pub fn insert(conn: &Connection, survey: &SurveyRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO surveys (id, job_id, status, submission_count, gps_latitude,
         gps_longitude, attendance_photo_ref, survey_statement, checklist, started_at,
         submitted_at, declared_by, declared_at, finalized_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            survey.id,
            survey.job_id,
            survey.status,
            survey.submission_count,
            survey.gps_latitude,
            survey.gps_longitude,
            survey.attendance_photo_ref,
            survey.survey_statement,
            survey.checklist,
            survey.started_at,
            survey.submitted_at,
            survey.declared_by,
            survey.declared_at,
            survey.finalized_at,
            survey.created_at,
            survey.updated_at,
        ],
    )?;
    Ok(())
}

/// Finds a survey by its ID without taking the write lock.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<SurveyRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM surveys WHERE id = ?1",
            params![id],
            SurveyRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds the survey attached to a job, if one has been opened.
pub fn find_by_job_id(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<SurveyRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM surveys WHERE job_id = ?1",
            params![job_id],
            SurveyRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Claims the row for a read-modify-write. See [`super::job_repo::lock_for_update`].
pub fn lock_for_update(conn: &Connection, id: &str) -> Result<Option<SurveyRow>, DatabaseError> {
    let touched = conn.execute(
        "UPDATE surveys SET updated_at = updated_at WHERE id = ?1",
        params![id],
    )?;
    if touched == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

/// Writes the lifecycle columns of a survey: status, submission counter
/// and the status-specific timestamps.
pub fn update_lifecycle(conn: &Connection, survey: &SurveyRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE surveys SET status = ?2, submission_count = ?3, started_at = ?4,
         submitted_at = ?5, declared_by = ?6, declared_at = ?7, finalized_at = ?8,
         updated_at = ?9
         WHERE id = ?1",
        params![
            survey.id,
            survey.status,
            survey.submission_count,
            survey.started_at,
            survey.submitted_at,
            survey.declared_by,
            survey.declared_at,
            survey.finalized_at,
            survey.updated_at,
        ],
    )?;
    Ok(())
}

/// Stores the serialized checklist answers.
pub fn record_checklist(
    conn: &Connection,
    id: &str,
    checklist: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE surveys SET checklist = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, checklist, updated_at],
    )?;
    Ok(())
}

/// Stores the on-site attendance evidence.
pub fn record_proof(
    conn: &Connection,
    id: &str,
    latitude: f64,
    longitude: f64,
    photo_ref: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE surveys SET gps_latitude = ?2, gps_longitude = ?3,
         attendance_photo_ref = ?4, updated_at = ?5
         WHERE id = ?1",
        params![id, latitude, longitude, photo_ref, updated_at],
    )?;
    Ok(())
}

/// Stores the surveyor's closing statement.
pub fn record_statement(
    conn: &Connection,
    id: &str,
    statement: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE surveys SET survey_statement = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, statement, updated_at],
    )?;
    Ok(())
}
