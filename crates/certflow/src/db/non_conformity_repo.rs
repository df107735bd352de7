//! Non-conformity repository: defects raised against a job during survey.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw non-conformity row from the database.
#[derive(Debug, Clone)]
pub struct NonConformityRow {
    pub id: String,
    pub job_id: String,
    pub description: String,
    pub status: String,
    pub raised_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NonConformityRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            description: row.get("description")?,
            status: row.get("status")?,
            raised_by: row.get("raised_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new non-conformity row.
pub fn insert(conn: &Connection, nc: &NonConformityRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO non_conformities (id, job_id, description, status, raised_by,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            nc.id,
            nc.job_id,
            nc.description,
            nc.status,
            nc.raised_by,
            nc.created_at,
            nc.updated_at,
        ],
    )?;
    Ok(())
}

/// Finds a non-conformity by its ID.
pub fn find_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<NonConformityRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM non_conformities WHERE id = ?1",
            params![id],
            NonConformityRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Updates the status of a non-conformity. Returns `false` if it does not exist.
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE non_conformities SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, updated_at],
    )?;
    Ok(changed == 1)
}

/// Counts the job's non-conformities whose status is not one of `settled`.
pub fn count_excluding(
    conn: &Connection,
    job_id: &str,
    settled: &[&str],
) -> Result<u32, DatabaseError> {
    let placeholders: Vec<String> = (0..settled.len()).map(|i| format!("?{}", i + 2)).collect();
    let sql = if settled.is_empty() {
        "SELECT COUNT(*) FROM non_conformities WHERE job_id = ?1".to_string()
    } else {
        format!(
            "SELECT COUNT(*) FROM non_conformities WHERE job_id = ?1 AND status NOT IN ({})",
            placeholders.join(", ")
        )
    };

    let mut param_values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(settled.len() + 1);
    param_values.push(&job_id);
    for status in settled {
        param_values.push(status);
    }

    let count: u32 = conn.query_row(&sql, param_values.as_slice(), |r| r.get(0))?;
    Ok(count)
}

/// Lists every non-conformity raised against a job, oldest first.
pub fn list_by_job(
    conn: &Connection,
    job_id: &str,
) -> Result<Vec<NonConformityRow>, DatabaseError> {
    let mut stmt = conn
        .prepare("SELECT * FROM non_conformities WHERE job_id = ?1 ORDER BY created_at, id")?;
    let rows = stmt
        .query_map(params![job_id], NonConformityRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{job_repo, Database};

    fn seed(conn: &Connection) -> Result<(), DatabaseError> {
        job_repo::insert(
            conn,
            &job_repo::JobRow {
                id: "job-1".to_string(),
                status: "IN_PROGRESS".to_string(),
                requires_survey: true,
                assigned_surveyor: None,
                generated_certificate: None,
                created_by: "admin-1".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )?;
        for (id, status) in [("nc-1", "OPEN"), ("nc-2", "RESOLVED"), ("nc-3", "IN_PROGRESS")] {
            insert(
                conn,
                &NonConformityRow {
                    id: id.to_string(),
                    job_id: "job-1".to_string(),
                    description: "Corroded railing".to_string(),
                    status: status.to_string(),
                    raised_by: "surveyor-1".to_string(),
                    created_at: "2026-01-01T00:00:00Z".to_string(),
                    updated_at: "2026-01-01T00:00:00Z".to_string(),
                },
            )?;
        }
        Ok(())
    }

    #[test]
    fn test_count_excluding_settled() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn)?;
            assert_eq!(count_excluding(conn, "job-1", &["CLOSED", "RESOLVED"])?, 2);
            assert_eq!(count_excluding(conn, "job-1", &[])?, 3);
            assert_eq!(count_excluding(conn, "job-2", &["CLOSED", "RESOLVED"])?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_status() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn)?;
            assert!(update_status(conn, "nc-1", "CLOSED", "2026-01-02T00:00:00Z")?);
            assert!(!update_status(conn, "nc-missing", "CLOSED", "2026-01-02T00:00:00Z")?);
            assert_eq!(find_by_id(conn, "nc-1")?.unwrap().status, "CLOSED");
            assert_eq!(list_by_job(conn, "job-1")?.len(), 3);
            Ok(())
        })
        .unwrap();
    }
}
