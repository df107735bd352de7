//! Certificate issuance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::certificate_repo::{self, CertificateRow};
use crate::db::{job_repo, DatabaseError};
use crate::error::LifecycleError;
use crate::lifecycle::coordinator::lock_job;
use crate::lifecycle::model::{format_timestamp, parse_timestamp};
use crate::lifecycle::{EntityKind, Job, JobStatus, LifecycleCoordinator, TransitionOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub job_id: String,
    pub certificate_number: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = DatabaseError;

    fn try_from(row: CertificateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            issued_at: parse_timestamp("certificates.issued_at", &row.issued_at)?,
            id: row.id,
            job_id: row.job_id,
            certificate_number: row.certificate_number,
            issued_by: row.issued_by,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub job: Job,
}

/// `CERT-<year>-<8 hex digits>`.
fn certificate_number(issued_at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("CERT-{}-{}", issued_at.format("%Y"), suffix.to_uppercase())
}

/// Issues the job's certificate and moves the job to CERTIFIED.
///
/// Checks run inside the transaction before anything is written: no
/// existing certificate (Conflict), job in PAYMENT_DONE, a finalized survey
/// for survey-backed jobs, and no open non-conformities (PreconditionFailed).
/// The certificate row, the job link and the status change commit together.
pub fn issue_certificate(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<IssuedCertificate, LifecycleError> {
    let _span = tracing::info_span!("certificate.issue", job_id, actor).entered();
    let guards = coordinator.guards();

    coordinator.run(opts, |ctx| {
        let job = lock_job(ctx, job_id)?;

        if guards.has_existing_certificate(ctx, &job.id)? {
            return Err(LifecycleError::Conflict {
                entity: EntityKind::Job.as_str(),
                id: job.id,
                reason: "a certificate has already been issued".to_string(),
            });
        }

        if job.status != JobStatus::PaymentDone {
            return Err(LifecycleError::PreconditionFailed(format!(
                "job '{}' must be PAYMENT_DONE to issue a certificate, found {}",
                job.id, job.status
            )));
        }

        if job.requires_survey && !guards.is_survey_finalized(ctx, &job.id)? {
            return Err(LifecycleError::PreconditionFailed(format!(
                "job '{}' has no finalized survey with attendance evidence",
                job.id
            )));
        }

        let open = guards.open_non_conformity_count(ctx, &job.id)?;
        if open > 0 {
            return Err(LifecycleError::PreconditionFailed(format!(
                "job '{}' has {} open non-conformities",
                job.id, open
            )));
        }

        let now = Utc::now();
        let certificate = Certificate {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            certificate_number: certificate_number(now),
            issued_by: actor.to_string(),
            issued_at: now,
        };
        certificate_repo::insert(
            ctx,
            &CertificateRow {
                id: certificate.id.clone(),
                job_id: certificate.job_id.clone(),
                certificate_number: certificate.certificate_number.clone(),
                issued_by: certificate.issued_by.clone(),
                issued_at: format_timestamp(now),
            },
        )?;

        if !job_repo::link_certificate(ctx, &job.id, &certificate.id, &format_timestamp(now))? {
            return Err(LifecycleError::Conflict {
                entity: EntityKind::Job.as_str(),
                id: job.id,
                reason: "certificate link already set".to_string(),
            });
        }

        let reason = format!("certificate {} issued", certificate.certificate_number);
        let job = coordinator.transition_job(
            &job.id,
            JobStatus::Certified,
            actor,
            Some(&reason),
            TransitionOptions::within(ctx),
        )?;

        tracing::info!(
            certificate_number = %certificate.certificate_number,
            "certificate issued"
        );

        Ok(IssuedCertificate { certificate, job })
    })
}

/// The job's certificate, if one was issued.
pub fn find_certificate(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    opts: TransitionOptions<'_>,
) -> Result<Option<Certificate>, LifecycleError> {
    let row = coordinator.read(opts, |conn| certificate_repo::find_by_job_id(conn, job_id))?;
    Ok(row.map(Certificate::try_from).transpose()?)
}
