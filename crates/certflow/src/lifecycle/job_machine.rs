use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::{EntityKind, Job};
use crate::error::LifecycleError;

/// The thirteen states a certification job moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    DocumentVerified,
    Approved,
    Assigned,
    SurveyAuthorized,
    InProgress,
    SurveyDone,
    Reviewed,
    ReworkRequested,
    Finalized,
    PaymentDone,
    Certified,
    Rejected,
}

impl JobStatus {
    pub const ALL: [JobStatus; 13] = [
        JobStatus::Created,
        JobStatus::DocumentVerified,
        JobStatus::Approved,
        JobStatus::Assigned,
        JobStatus::SurveyAuthorized,
        JobStatus::InProgress,
        JobStatus::SurveyDone,
        JobStatus::Reviewed,
        JobStatus::ReworkRequested,
        JobStatus::Finalized,
        JobStatus::PaymentDone,
        JobStatus::Certified,
        JobStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::DocumentVerified => "DOCUMENT_VERIFIED",
            JobStatus::Approved => "APPROVED",
            JobStatus::Assigned => "ASSIGNED",
            JobStatus::SurveyAuthorized => "SURVEY_AUTHORIZED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::SurveyDone => "SURVEY_DONE",
            JobStatus::Reviewed => "REVIEWED",
            JobStatus::ReworkRequested => "REWORK_REQUESTED",
            JobStatus::Finalized => "FINALIZED",
            JobStatus::PaymentDone => "PAYMENT_DONE",
            JobStatus::Certified => "CERTIFIED",
            JobStatus::Rejected => "REJECTED",
        }
    }

    /// CERTIFIED and REJECTED jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Certified | JobStatus::Rejected)
    }

    /// Outgoing edges of the job transition graph.
    pub fn allowed_targets(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Created => &[DocumentVerified, Rejected],
            DocumentVerified => &[Approved, Rejected],
            Approved => &[Assigned, Rejected, Finalized],
            Assigned => &[SurveyAuthorized, Rejected],
            SurveyAuthorized => &[InProgress, Rejected],
            InProgress => &[SurveyDone, ReworkRequested, Rejected],
            SurveyDone => &[Reviewed, ReworkRequested, Finalized, Rejected],
            Reviewed => &[ReworkRequested, Finalized, Rejected],
            ReworkRequested => &[InProgress, SurveyDone, Rejected],
            Finalized => &[PaymentDone],
            PaymentDone => &[Certified],
            Certified | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, target: JobStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Outcome of validating a job transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStep {
    /// Target equals the current status; nothing is written.
    Unchanged,
    Apply { from: JobStatus, to: JobStatus },
}

/// Validates job transitions against the fixed graph.
pub struct JobStateMachine;

impl JobStateMachine {
    /// Checks a request arriving through the public entry point.
    ///
    /// Order: terminal status, the survey bypass guard on FINALIZED, the
    /// same-state shortcut, then the edge table.
    pub fn plan(job: &Job, target: JobStatus, actor: &str) -> Result<JobStep, LifecycleError> {
        Self::check_terminal(job)?;

        if target == JobStatus::Finalized {
            if job.requires_survey {
                return Err(LifecycleError::Forbidden {
                    actor: actor.to_string(),
                    action: format!(
                        "finalize job '{}' directly; it requires a finalized survey",
                        job.id
                    ),
                });
            }
            // Without a survey the only public route is APPROVED -> FINALIZED.
            if !matches!(job.status, JobStatus::Approved | JobStatus::Finalized) {
                return Err(LifecycleError::Forbidden {
                    actor: actor.to_string(),
                    action: format!(
                        "finalize job '{}' from {}; only APPROVED jobs finalize directly",
                        job.id, job.status
                    ),
                });
            }
        }

        Self::check_edge(job, target)
    }

    /// Checks a request made by the survey synchronisation path, which is
    /// allowed to drive survey-backed jobs into FINALIZED.
    pub(crate) fn plan_sync(job: &Job, target: JobStatus) -> Result<JobStep, LifecycleError> {
        Self::check_terminal(job)?;

        if target == JobStatus::Finalized && !job.requires_survey {
            return Err(LifecycleError::PreconditionFailed(format!(
                "job '{}' has no survey to finalize it",
                job.id
            )));
        }

        Self::check_edge(job, target)
    }

    fn check_terminal(job: &Job) -> Result<(), LifecycleError> {
        if job.status.is_terminal() {
            return Err(LifecycleError::TerminalStateViolation {
                entity: EntityKind::Job.as_str(),
                id: job.id.clone(),
                status: job.status.to_string(),
            });
        }
        Ok(())
    }

    fn check_edge(job: &Job, target: JobStatus) -> Result<JobStep, LifecycleError> {
        if target == job.status {
            return Ok(JobStep::Unchanged);
        }
        if !job.status.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                entity: EntityKind::Job.as_str(),
                id: job.id.clone(),
                from: job.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(JobStep::Apply {
            from: job.status,
            to: target,
        })
    }
}
