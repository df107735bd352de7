//! Survey field work: each step stores its evidence and moves the survey in
//! one transaction.

use chrono::Utc;

use crate::db::survey_repo;
use crate::error::LifecycleError;
use crate::lifecycle::coordinator::lock_survey;
use crate::lifecycle::model::format_timestamp;
use crate::lifecycle::{
    GpsCoordinates, LifecycleCoordinator, Survey, SurveyStatus, TransitionOptions, TxContext,
};

fn not_blank(value: &str, what: &str) -> Result<(), LifecycleError> {
    if value.trim().is_empty() {
        return Err(LifecycleError::PreconditionFailed(format!(
            "{} must not be empty",
            what
        )));
    }
    Ok(())
}

fn advance(
    coordinator: &LifecycleCoordinator,
    ctx: &TxContext<'_>,
    survey_id: &str,
    target: SurveyStatus,
    actor: &str,
    reason: Option<&str>,
) -> Result<Survey, LifecycleError> {
    coordinator.transition_survey(survey_id, target, actor, reason, TransitionOptions::within(ctx))
}

/// Opens the job's survey if needed and starts it. The job moves to
/// IN_PROGRESS.
pub fn start_survey(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    coordinator.run(opts, |ctx| {
        let survey = coordinator.open_survey(job_id, actor, TransitionOptions::within(ctx))?;
        advance(coordinator, ctx, &survey.id, SurveyStatus::Started, actor, None)
    })
}

/// Stores the checklist answers, which must be a non-empty JSON object.
pub fn submit_checklist(
    coordinator: &LifecycleCoordinator,
    survey_id: &str,
    checklist: &serde_json::Value,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    if !checklist.as_object().is_some_and(|answers| !answers.is_empty()) {
        return Err(LifecycleError::PreconditionFailed(
            "checklist must be a non-empty JSON object".to_string(),
        ));
    }

    coordinator.run(opts, |ctx| {
        let survey = lock_survey(ctx, survey_id)?;
        survey_repo::record_checklist(
            ctx,
            &survey.id,
            &checklist.to_string(),
            &format_timestamp(Utc::now()),
        )?;
        advance(coordinator, ctx, &survey.id, SurveyStatus::ChecklistSubmitted, actor, None)
    })
}

/// Stores the attendance photo reference and GPS fix taken on site.
pub fn upload_proof(
    coordinator: &LifecycleCoordinator,
    survey_id: &str,
    gps: GpsCoordinates,
    photo_ref: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    if !gps.is_valid() {
        return Err(LifecycleError::PreconditionFailed(format!(
            "GPS coordinates out of range: ({}, {})",
            gps.latitude, gps.longitude
        )));
    }
    not_blank(photo_ref, "attendance photo reference")?;

    coordinator.run(opts, |ctx| {
        let survey = lock_survey(ctx, survey_id)?;
        survey_repo::record_proof(
            ctx,
            &survey.id,
            gps.latitude,
            gps.longitude,
            photo_ref,
            &format_timestamp(Utc::now()),
        )?;
        advance(coordinator, ctx, &survey.id, SurveyStatus::ProofUploaded, actor, None)
    })
}

/// Records the surveyor's statement and submits the survey for review.
pub fn declare_survey(
    coordinator: &LifecycleCoordinator,
    survey_id: &str,
    statement: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    not_blank(statement, "survey statement")?;

    coordinator.run(opts, |ctx| {
        let survey = lock_survey(ctx, survey_id)?;
        survey_repo::record_statement(
            ctx,
            &survey.id,
            statement.trim(),
            &format_timestamp(Utc::now()),
        )?;
        advance(coordinator, ctx, &survey.id, SurveyStatus::Submitted, actor, None)
    })
}

/// Sends a submitted survey back to the surveyor.
pub fn request_rework(
    coordinator: &LifecycleCoordinator,
    survey_id: &str,
    reason: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    not_blank(reason, "rework reason")?;
    coordinator.transition_survey(
        survey_id,
        SurveyStatus::ReworkRequired,
        actor,
        Some(reason),
        opts,
    )
}

pub fn finalize_survey(
    coordinator: &LifecycleCoordinator,
    survey_id: &str,
    actor: &str,
    reason: Option<&str>,
    opts: TransitionOptions<'_>,
) -> Result<Survey, LifecycleError> {
    coordinator.transition_survey(survey_id, SurveyStatus::Finalized, actor, reason, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_rejected() {
        assert!(not_blank("  ", "statement").is_err());
        assert!(not_blank("Hull inspected", "statement").is_ok());
    }
}
