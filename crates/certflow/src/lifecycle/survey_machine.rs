use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actors::Role;
use super::job_machine::{JobStatus, UnknownStatus};
use super::model::{EntityKind, Survey};
use crate::error::LifecycleError;

/// States of the on-site survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurveyStatus {
    NotStarted,
    Started,
    ChecklistSubmitted,
    ProofUploaded,
    Submitted,
    ReworkRequired,
    Finalized,
}

impl SurveyStatus {
    pub const ALL: [SurveyStatus; 7] = [
        SurveyStatus::NotStarted,
        SurveyStatus::Started,
        SurveyStatus::ChecklistSubmitted,
        SurveyStatus::ProofUploaded,
        SurveyStatus::Submitted,
        SurveyStatus::ReworkRequired,
        SurveyStatus::Finalized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SurveyStatus::NotStarted => "NOT_STARTED",
            SurveyStatus::Started => "STARTED",
            SurveyStatus::ChecklistSubmitted => "CHECKLIST_SUBMITTED",
            SurveyStatus::ProofUploaded => "PROOF_UPLOADED",
            SurveyStatus::Submitted => "SUBMITTED",
            SurveyStatus::ReworkRequired => "REWORK_REQUIRED",
            SurveyStatus::Finalized => "FINALIZED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SurveyStatus::Finalized
    }

    pub fn allowed_targets(self) -> &'static [SurveyStatus] {
        use SurveyStatus::*;
        match self {
            NotStarted => &[Started],
            Started => &[ChecklistSubmitted],
            ChecklistSubmitted => &[ProofUploaded],
            ProofUploaded => &[Submitted],
            Submitted => &[ReworkRequired, Finalized],
            ReworkRequired => &[ChecklistSubmitted, ProofUploaded, Submitted],
            Finalized => &[],
        }
    }

    pub fn can_transition_to(self, target: SurveyStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// The job status a survey entering `self` pulls its job into, if any.
    pub fn job_sync_target(self) -> Option<JobStatus> {
        match self {
            SurveyStatus::Started => Some(JobStatus::InProgress),
            SurveyStatus::Submitted => Some(JobStatus::SurveyDone),
            SurveyStatus::ReworkRequired => Some(JobStatus::ReworkRequested),
            SurveyStatus::Finalized => Some(JobStatus::Finalized),
            _ => None,
        }
    }
}

impl fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SurveyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SurveyStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// State outside the survey row that its guards consult. Gathered by the
/// coordinator while it holds the locks.
#[derive(Debug, Clone, Copy)]
pub struct SurveyFacts {
    pub actor_role: Option<Role>,
    pub job_status: JobStatus,
    pub open_non_conformities: u32,
}

pub struct SurveyStateMachine;

impl SurveyStateMachine {
    /// Validates moving `survey` to `target`.
    ///
    /// The finalize capability is checked before anything else, so a
    /// non-manager asking for FINALIZED is refused whatever the survey's state.
    /// Same-state requests are conflicts: survey steps are not idempotent.
    pub fn plan(
        survey: &Survey,
        target: SurveyStatus,
        actor: &str,
        facts: &SurveyFacts,
    ) -> Result<(), LifecycleError> {
        if target == SurveyStatus::Finalized
            && !facts.actor_role.is_some_and(Role::can_finalize_survey)
        {
            return Err(LifecycleError::Forbidden {
                actor: actor.to_string(),
                action: format!("finalize survey '{}'", survey.id),
            });
        }

        if survey.status.is_terminal() {
            return Err(LifecycleError::TerminalStateViolation {
                entity: EntityKind::Survey.as_str(),
                id: survey.id.clone(),
                status: survey.status.to_string(),
            });
        }

        if target == survey.status {
            return Err(LifecycleError::Conflict {
                entity: EntityKind::Survey.as_str(),
                id: survey.id.clone(),
                reason: format!("survey is already {}", target),
            });
        }

        if !survey.status.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                entity: EntityKind::Survey.as_str(),
                id: survey.id.clone(),
                from: survey.status.to_string(),
                to: target.to_string(),
            });
        }

        match target {
            SurveyStatus::Submitted if !survey.has_attendance_evidence() => {
                Err(LifecycleError::PreconditionFailed(format!(
                    "survey '{}' needs an attendance photo and GPS coordinates before submission",
                    survey.id
                )))
            }
            SurveyStatus::ReworkRequired
                if matches!(
                    facts.job_status,
                    JobStatus::Finalized | JobStatus::PaymentDone | JobStatus::Certified
                ) =>
            {
                Err(LifecycleError::Conflict {
                    entity: EntityKind::Survey.as_str(),
                    id: survey.id.clone(),
                    reason: format!("job '{}' is already {}", survey.job_id, facts.job_status),
                })
            }
            SurveyStatus::Finalized if facts.open_non_conformities > 0 => {
                Err(LifecycleError::PreconditionFailed(format!(
                    "job '{}' has {} open non-conformities",
                    survey.job_id, facts.open_non_conformities
                )))
            }
            _ => Ok(()),
        }
    }

    /// Moves a validated survey to `target`, stamping the status-specific
    /// fields.
    pub fn apply(survey: &mut Survey, target: SurveyStatus, actor: &str, now: DateTime<Utc>) {
        match target {
            SurveyStatus::Started => {
                survey.started_at.get_or_insert(now);
            }
            SurveyStatus::Submitted => {
                survey.submission_count += 1;
                survey.submitted_at = Some(now);
                survey.declared_by = Some(actor.to_string());
                survey.declared_at = Some(now);
            }
            SurveyStatus::Finalized => {
                survey.finalized_at = Some(now);
            }
            _ => {}
        }
        survey.status = target;
        survey.updated_at = now;
    }
}
