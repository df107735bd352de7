//! Payment repository: fees recorded against a job.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw payment row from the database.
#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: String,
    pub job_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub settled_by: Option<String>,
    pub settled_at: Option<String>,
    pub created_at: String,
}

impl PaymentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            amount_cents: row.get("amount_cents")?,
            status: row.get("status")?,
            settled_by: row.get("settled_by")?,
            settled_at: row.get("settled_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a new payment row.
pub fn insert(conn: &Connection, payment: &PaymentRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO payments (id, job_id, amount_cents, status, settled_by, settled_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            payment.id,
            payment.job_id,
            payment.amount_cents,
            payment.status,
            payment.settled_by,
            payment.settled_at,
            payment.created_at,
        ],
    )?;
    Ok(())
}

/// Finds a payment by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<PaymentRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM payments WHERE id = ?1",
            params![id],
            PaymentRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Claims the payment row for a read-modify-write.
pub fn lock_for_update(conn: &Connection, id: &str) -> Result<Option<PaymentRow>, DatabaseError> {
    let touched = conn.execute(
        "UPDATE payments SET created_at = created_at WHERE id = ?1",
        params![id],
    )?;
    if touched == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

/// Marks a payment settled. Returns `false` if it was not pending.
pub fn mark_settled(
    conn: &Connection,
    id: &str,
    settled_by: &str,
    settled_at: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE payments SET status = 'SETTLED', settled_by = ?2, settled_at = ?3
         WHERE id = ?1 AND status = 'PENDING'",
        params![id, settled_by, settled_at],
    )?;
    Ok(changed == 1)
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
                status: "FINALIZED".to_string(),
                requires_survey: false,
                assigned_surveyor: None,
                generated_certificate: None,
                created_by: "admin-1".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )?;
        insert(
            conn,
            &PaymentRow {
                id: "pay-1".to_string(),
                job_id: "job-1".to_string(),
                amount_cents: 125_000,
                status: "PENDING".to_string(),
                settled_by: None,
                settled_at: None,
                created_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )
    }

    #[test]
    fn test_mark_settled_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn)?;
            assert!(mark_settled(conn, "pay-1", "finance-1", "2026-01-04T00:00:00Z")?);
            assert!(!mark_settled(conn, "pay-1", "finance-2", "2026-01-04T00:00:01Z")?);

            let found = find_by_id(conn, "pay-1")?.unwrap();
            assert_eq!(found.status, "SETTLED");
            assert_eq!(found.settled_by.as_deref(), Some("finance-1"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_lock_missing_payment() {
        let db = Database::open_in_memory().unwrap();
        let found = db.transaction(|tx| lock_for_update(tx, "nope")).unwrap();
        assert!(found.is_none());
    }
}
