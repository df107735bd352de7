//! Job repository: row access for the `jobs` table.
//!
//! Functions take a `&Connection` so they compose inside whatever
//! transaction the caller holds. Status columns are written only by the
//! lifecycle coordinator.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub requires_survey: bool,
    pub assigned_surveyor: Option<String>,
    pub generated_certificate: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            requires_survey: row.get("requires_survey")?,
            assigned_surveyor: row.get("assigned_surveyor")?,
            generated_certificate: row.get("generated_certificate")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, status, requires_survey, assigned_surveyor,
         generated_certificate, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            job.id,
            job.status,
            job.requires_survey,
            job.assigned_surveyor,
            job.generated_certificate,
            job.created_by,
            job.created_at,
            job.updated_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID without taking the write lock.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Claims the row for a read-modify-write and returns its current state.
///
/// SQLite has no `SELECT ... FOR UPDATE`; a no-op write on the row takes
/// the RESERVED lock so no other writer can interleave before commit.
pub fn lock_for_update(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let touched = conn.execute(
        "UPDATE jobs SET updated_at = updated_at WHERE id = ?1",
        params![id],
    )?;
    if touched == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

/// Updates only the status and updated_at of a job.
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, updated_at],
    )?;
    Ok(())
}

/// Records the surveyor assigned to a job.
pub fn set_assigned_surveyor(
    conn: &Connection,
    id: &str,
    surveyor: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET assigned_surveyor = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, surveyor, updated_at],
    )?;
    Ok(())
}

/// Links a certificate to a job. Returns `false` if the job already has one.
pub fn link_certificate(
    conn: &Connection,
    id: &str,
    certificate_id: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET generated_certificate = ?2, updated_at = ?3
         WHERE id = ?1 AND generated_certificate IS NULL",
        params![id, certificate_id, updated_at],
    )?;
    Ok(changed == 1)
}
