//! Certificate repository: at most one issued certificate per job.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::DatabaseError;

/// A raw certificate row from the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRow {
    pub id: String,
    pub job_id: String,
    pub certificate_number: String,
    pub issued_by: String,
    pub issued_at: String,
}

impl CertificateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            certificate_number: row.get("certificate_number")?,
            issued_by: row.get("issued_by")?,
            issued_at: row.get("issued_at")?,
        })
    }
}

/// Inserts a certificate. The `job_id` column is unique.
pub fn insert(conn: &Connection, cert: &CertificateRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO certificates (id, job_id, certificate_number, issued_by, issued_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            cert.id,
            cert.job_id,
            cert.certificate_number,
            cert.issued_by,
            cert.issued_at,
        ],
    )?;
    Ok(())
}

/// Finds the certificate issued for a job.
pub fn find_by_job_id(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<CertificateRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM certificates WHERE job_id = ?1",
            params![job_id],
            CertificateRow::from_row,
        )
        .optional()?;
    Ok(row)
}
