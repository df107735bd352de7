//! Non-conformity ledger operations.

use chrono::Utc;
use uuid::Uuid;

use crate::compliance::{NonConformity, NonConformityStatus};
use crate::db::non_conformity_repo::{self, NonConformityRow};
use crate::error::LifecycleError;
use crate::lifecycle::coordinator::lock_job;
use crate::lifecycle::model::format_timestamp;
use crate::lifecycle::{LifecycleCoordinator, TransitionOptions};

const ENTITY: &str = "NON_CONFORMITY";

/// Records a new OPEN defect against a job.
pub fn raise(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    description: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<NonConformity, LifecycleError> {
    if description.trim().is_empty() {
        return Err(LifecycleError::PreconditionFailed(
            "non-conformity description must not be empty".to_string(),
        ));
    }

    coordinator.run(opts, |ctx| {
        let job = lock_job(ctx, job_id)?;
        let now = format_timestamp(Utc::now());
        let row = NonConformityRow {
            id: Uuid::new_v4().to_string(),
            job_id: job.id,
            description: description.trim().to_string(),
            status: NonConformityStatus::Open.as_str().to_string(),
            raised_by: actor.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        non_conformity_repo::insert(ctx, &row)?;
        tracing::info!(nc_id = %row.id, job_id = %row.job_id, actor, "non-conformity raised");
        Ok(NonConformity::try_from(row)?)
    })
}

pub fn set_status(
    coordinator: &LifecycleCoordinator,
    nc_id: &str,
    status: NonConformityStatus,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<NonConformity, LifecycleError> {
    coordinator.run(opts, |ctx| {
        let updated = non_conformity_repo::update_status(
            ctx,
            nc_id,
            status.as_str(),
            &format_timestamp(Utc::now()),
        )?;
        if !updated {
            return Err(LifecycleError::NotFound {
                entity: ENTITY,
                id: nc_id.to_string(),
            });
        }
        tracing::info!(nc_id, status = %status, actor, "non-conformity status changed");

        let row = non_conformity_repo::find_by_id(ctx, nc_id)?.ok_or_else(|| {
            LifecycleError::NotFound {
                entity: ENTITY,
                id: nc_id.to_string(),
            }
        })?;
        Ok(NonConformity::try_from(row)?)
    })
}

pub fn list_for_job(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    opts: TransitionOptions<'_>,
) -> Result<Vec<NonConformity>, LifecycleError> {
    let rows = coordinator.read(opts, |conn| non_conformity_repo::list_by_job(conn, job_id))?;
    Ok(rows
        .into_iter()
        .map(NonConformity::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}
