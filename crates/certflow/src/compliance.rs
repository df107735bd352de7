//! Cross-entity predicates consulted before certificates are issued and
//! payments settled.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::non_conformity_repo::NonConformityRow;
use crate::db::{certificate_repo, job_repo, non_conformity_repo, survey_repo, DatabaseError};
use crate::error::LifecycleError;
use crate::lifecycle::job_machine::UnknownStatus;
use crate::lifecycle::{EntityKind, Survey, SurveyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NonConformityStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl NonConformityStatus {
    pub const ALL: [NonConformityStatus; 4] = [
        NonConformityStatus::Open,
        NonConformityStatus::InProgress,
        NonConformityStatus::Resolved,
        NonConformityStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NonConformityStatus::Open => "OPEN",
            NonConformityStatus::InProgress => "IN_PROGRESS",
            NonConformityStatus::Resolved => "RESOLVED",
            NonConformityStatus::Closed => "CLOSED",
        }
    }

    /// Whether this status still blocks finalization and certification.
    pub fn is_open(self) -> bool {
        !matches!(self, NonConformityStatus::Resolved | NonConformityStatus::Closed)
    }
}

impl fmt::Display for NonConformityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NonConformityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(NonConformityStatus::Open),
            "IN_PROGRESS" => Ok(NonConformityStatus::InProgress),
            "RESOLVED" => Ok(NonConformityStatus::Resolved),
            "CLOSED" => Ok(NonConformityStatus::Closed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A defect raised against a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonConformity {
    pub id: String,
    pub job_id: String,
    pub description: String,
    pub status: NonConformityStatus,
    pub raised_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<NonConformityRow> for NonConformity {
    type Error = DatabaseError;

    fn try_from(row: NonConformityRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "non_conformities.status",
                value: row.status.clone(),
            })?;
        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            description: row.description,
            status,
            raised_by: row.raised_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Source of the open defect count for a job. Reads through the caller's
/// connection so the count is taken inside the caller's transaction.
pub trait NonConformityLedger: Send + Sync {
    fn count_open(&self, conn: &Connection, job_id: &str) -> Result<u32, DatabaseError>;
}

/// Ledger backed by the `non_conformities` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreLedger;

impl NonConformityLedger for StoreLedger {
    fn count_open(&self, conn: &Connection, job_id: &str) -> Result<u32, DatabaseError> {
        let settled: Vec<&str> = NonConformityStatus::ALL
            .into_iter()
            .filter(|status| !status.is_open())
            .map(NonConformityStatus::as_str)
            .collect();
        non_conformity_repo::count_excluding(conn, job_id, &settled)
    }
}

/// Stateless guard predicates. They never write.
#[derive(Clone)]
pub struct ComplianceGuards {
    ledger: Arc<dyn NonConformityLedger>,
}

impl ComplianceGuards {
    pub fn new(ledger: Arc<dyn NonConformityLedger>) -> Self {
        Self { ledger }
    }

    pub fn open_non_conformity_count(
        &self,
        conn: &Connection,
        job_id: &str,
    ) -> Result<u32, LifecycleError> {
        Ok(self.ledger.count_open(conn, job_id)?)
    }

    /// True when the job's survey is FINALIZED and carries its GPS fix and
    /// attendance photo.
    pub fn is_survey_finalized(
        &self,
        conn: &Connection,
        job_id: &str,
    ) -> Result<bool, LifecycleError> {
        let Some(row) = survey_repo::find_by_job_id(conn, job_id)? else {
            return Ok(false);
        };
        let survey = Survey::try_from(row)?;
        Ok(survey.status == SurveyStatus::Finalized && survey.has_attendance_evidence())
    }

    pub fn has_existing_certificate(
        &self,
        conn: &Connection,
        job_id: &str,
    ) -> Result<bool, LifecycleError> {
        let job = job_repo::find_by_id(conn, job_id)?.ok_or_else(|| LifecycleError::NotFound {
            entity: EntityKind::Job.as_str(),
            id: job_id.to_string(),
        })?;
        if job.generated_certificate.is_some() {
            return Ok(true);
        }
        Ok(certificate_repo::find_by_job_id(conn, job_id)?.is_some())
    }
}

impl Default for ComplianceGuards {
    fn default() -> Self {
        Self::new(Arc::new(StoreLedger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::ErrorKind;

    fn seed_job(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO jobs
                 (id, status, requires_survey, created_by, created_at, updated_at)
             VALUES (?1, 'PAYMENT_DONE', 1, 'admin',
                 '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [id],
        )
        .unwrap();
    }

    fn seed_nc(conn: &Connection, id: &str, status: &str) {
        non_conformity_repo::insert(
            conn,
            &NonConformityRow {
                id: id.to_string(),
                job_id: "job-1".to_string(),
                description: "Missing fire extinguisher".to_string(),
                status: status.to_string(),
                raised_by: "surveyor-1".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )
        .unwrap();
    }

    #[test]
    fn open_count_ignores_settled_defects() {
        let db = Database::open_in_memory().unwrap();
        let guards = ComplianceGuards::default();
        db.with_conn(|conn| {
            seed_job(conn, "job-1");
            seed_nc(conn, "nc-1", "OPEN");
            seed_nc(conn, "nc-2", "IN_PROGRESS");
            seed_nc(conn, "nc-3", "RESOLVED");
            seed_nc(conn, "nc-4", "CLOSED");
            assert_eq!(guards.open_non_conformity_count(conn, "job-1").unwrap(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn survey_not_finalized_without_survey() {
        let db = Database::open_in_memory().unwrap();
        let guards = ComplianceGuards::default();
        db.with_conn(|conn| {
            seed_job(conn, "job-1");
            assert!(!guards.is_survey_finalized(conn, "job-1").unwrap());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn finalized_survey_needs_evidence() {
        let db = Database::open_in_memory().unwrap();
        let guards = ComplianceGuards::default();
        db.with_conn(|conn| {
            seed_job(conn, "job-1");
            conn.execute(
                "INSERT INTO surveys
                     (id, job_id, status, submission_count, created_at, updated_at)
                 VALUES ('s-1', 'job-1', 'FINALIZED', 1,
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )?;
            assert!(!guards.is_survey_finalized(conn, "job-1").unwrap());

            survey_repo::record_proof(
                conn,
                "s-1",
                10.0,
                20.0,
                "photos/p.jpg",
                "2026-01-02T00:00:00Z",
            )?;
            assert!(guards.is_survey_finalized(conn, "job-1").unwrap());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn existing_certificate_detection() {
        let db = Database::open_in_memory().unwrap();
        let guards = ComplianceGuards::default();
        db.with_conn(|conn| {
            seed_job(conn, "job-1");
            assert!(!guards.has_existing_certificate(conn, "job-1").unwrap());

            certificate_repo::insert(
                conn,
                &certificate_repo::CertificateRow {
                    id: "cert-1".to_string(),
                    job_id: "job-1".to_string(),
                    certificate_number: "CERT-2026-ABCDEF12".to_string(),
                    issued_by: "admin-1".to_string(),
                    issued_at: "2026-01-03T00:00:00Z".to_string(),
                },
            )?;
            assert!(guards.has_existing_certificate(conn, "job-1").unwrap());

            let err = guards.has_existing_certificate(conn, "job-404").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn status_parsing() {
        assert_eq!(
            "IN_PROGRESS".parse::<NonConformityStatus>().unwrap(),
            NonConformityStatus::InProgress
        );
        assert!("DONE".parse::<NonConformityStatus>().is_err());
    }

    #[test]
    fn only_resolved_and_closed_are_settled() {
        let open: Vec<_> = NonConformityStatus::ALL
            .into_iter()
            .filter(|status| status.is_open())
            .collect();
        assert_eq!(
            open,
            vec![NonConformityStatus::Open, NonConformityStatus::InProgress]
        );
    }
}
