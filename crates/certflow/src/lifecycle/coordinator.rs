//! Transactional orchestration of job and survey transitions.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::actors::{ActorDirectory, Role};
use super::events::{EventObserver, LifecycleBroadcaster, LifecycleEvent, TracingObserver};
use super::job_machine::{JobStateMachine, JobStatus, JobStep};
use super::model::{format_timestamp, EntityKind, Job, Survey};
use super::survey_machine::{SurveyFacts, SurveyStateMachine, SurveyStatus};
use super::tx::{TransitionOptions, TxContext};
use crate::compliance::{ComplianceGuards, NonConformityLedger};
use crate::config::CertflowConfig;
use crate::db::history_repo::{self, JobHistoryRow, SurveyHistoryRow};
use crate::db::{job_repo, survey_repo, Database, DatabaseError};
use crate::error::{CertflowError, LifecycleError};

/// Sole writer of job and survey status.
///
/// Every operation locks the rows it touches, validates through the state
/// machines, writes the new status and its history row, and queues a
/// [`LifecycleEvent`]. Operations either join the transaction passed in
/// [`TransitionOptions`] or run in one they own. Queued events reach the
/// observers only after the owning transaction commits.
pub struct LifecycleCoordinator {
    db: Database,
    actors: Arc<dyn ActorDirectory>,
    guards: ComplianceGuards,
    broadcaster: LifecycleBroadcaster,
    observers: Vec<Arc<dyn EventObserver>>,
}

impl LifecycleCoordinator {
    pub fn new(db: Database, actors: Arc<dyn ActorDirectory>) -> Self {
        Self::with_broadcaster(db, actors, LifecycleBroadcaster::default())
    }

    /// Opens the configured database and wires the broadcaster capacity.
    pub fn open(
        config: &CertflowConfig,
        actors: Arc<dyn ActorDirectory>,
    ) -> Result<Self, CertflowError> {
        let path = config.database_path()?;
        let db = Database::open(
            &path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )?;
        Ok(Self::with_broadcaster(
            db,
            actors,
            LifecycleBroadcaster::new(config.events.channel_capacity),
        ))
    }

    fn with_broadcaster(
        db: Database,
        actors: Arc<dyn ActorDirectory>,
        broadcaster: LifecycleBroadcaster,
    ) -> Self {
        Self {
            db,
            actors,
            guards: ComplianceGuards::default(),
            observers: vec![Arc::new(TracingObserver), Arc::new(broadcaster.clone())],
            broadcaster,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn NonConformityLedger>) -> Self {
        self.guards = ComplianceGuards::new(ledger);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn guards(&self) -> &ComplianceGuards {
        &self.guards
    }

    pub fn actor_role(&self, actor_id: &str) -> Option<Role> {
        self.actors.actor_role(actor_id)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.broadcaster.subscribe()
    }

    /// Runs `f` in a transaction owned by the coordinator.
    ///
    /// Commits when `f` succeeds and then dispatches the lifecycle events
    /// produced inside it. Any error rolls everything back.
    pub fn in_transaction<T, F>(&self, f: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, LifecycleError>,
    {
        let (value, events) = self.db.transaction(|tx| {
            let ctx = TxContext::new(tx);
            let value = f(&ctx)?;
            Ok::<_, LifecycleError>((value, ctx.into_events()))
        })?;

        self.dispatch(&events);
        Ok(value)
    }

    pub(crate) fn run<T, F>(&self, opts: TransitionOptions<'_>, f: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(&TxContext<'_>) -> Result<T, LifecycleError>,
    {
        match opts.transaction {
            Some(ctx) => ctx.step(|| f(ctx)),
            None => self.in_transaction(f),
        }
    }

    // ─── Creation ───────────────────────────────────────────────────────────

    /// Inserts a CREATED job and its creation history record.
    pub fn create_job(
        &self,
        requires_survey: bool,
        actor: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Job, LifecycleError> {
        let _span = tracing::info_span!("lifecycle.create_job", requires_survey, actor).entered();

        self.run(opts, |ctx| {
            let now = Utc::now();
            let job = Job {
                id: Uuid::new_v4().to_string(),
                status: JobStatus::Created,
                requires_survey,
                assigned_surveyor: None,
                generated_certificate: None,
                created_by: actor.to_string(),
                created_at: now,
                updated_at: now,
            };

            job_repo::insert(ctx, &job.to_row())?;
            history_repo::append_job(
                ctx,
                &job.id,
                None,
                job.status.as_str(),
                actor,
                None,
                &format_timestamp(now),
            )?;
            ctx.defer(job_event(&job, None, actor, None, now));

            Ok(job)
        })
    }

    /// Returns the job's survey, creating it in NOT_STARTED on first use.
    pub fn open_survey(
        &self,
        job_id: &str,
        actor: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Survey, LifecycleError> {
        let _span = tracing::info_span!("lifecycle.open_survey", job_id, actor).entered();

        self.run(opts, |ctx| {
            let job = lock_job(ctx, job_id)?;
            if !job.requires_survey {
                return Err(LifecycleError::PreconditionFailed(format!(
                    "job '{}' does not require a survey",
                    job.id
                )));
            }

            if let Some(row) = survey_repo::find_by_job_id(ctx, &job.id)? {
                return Ok(Survey::try_from(row)?);
            }

            if job.status.is_terminal() {
                return Err(LifecycleError::TerminalStateViolation {
                    entity: EntityKind::Job.as_str(),
                    id: job.id,
                    status: job.status.to_string(),
                });
            }

            let now = Utc::now();
            let survey = Survey {
                id: Uuid::new_v4().to_string(),
                job_id: job.id.clone(),
                status: SurveyStatus::NotStarted,
                submission_count: 0,
                gps: None,
                attendance_photo_ref: None,
                survey_statement: None,
                checklist: None,
                started_at: None,
                submitted_at: None,
                declared_by: None,
                declared_at: None,
                finalized_at: None,
                created_at: now,
                updated_at: now,
            };
            survey_repo::insert(ctx, &survey.to_row())?;
            tracing::debug!(survey_id = %survey.id, job_id = %job.id, "survey opened");

            Ok(survey)
        })
    }

    /// Records the surveyor and moves the job to ASSIGNED.
    pub fn assign_surveyor(
        &self,
        job_id: &str,
        surveyor_id: &str,
        actor: &str,
        reason: Option<&str>,
        opts: TransitionOptions<'_>,
    ) -> Result<Job, LifecycleError> {
        let _span =
            tracing::info_span!("lifecycle.assign_surveyor", job_id, surveyor_id, actor).entered();

        if !self
            .actors
            .actor_role(surveyor_id)
            .is_some_and(Role::can_perform_survey)
        {
            return Err(LifecycleError::PreconditionFailed(format!(
                "actor '{}' is not a surveyor",
                surveyor_id
            )));
        }

        self.run(opts, |ctx| {
            let mut job = lock_job(ctx, job_id)?;
            let step = JobStateMachine::plan(&job, JobStatus::Assigned, actor)?;

            let now = Utc::now();
            job_repo::set_assigned_surveyor(ctx, &job.id, surveyor_id, &format_timestamp(now))?;
            job.assigned_surveyor = Some(surveyor_id.to_string());
            job.updated_at = now;

            apply_job_step(ctx, job, step, actor, reason)
        })
    }

    // ─── Transitions ────────────────────────────────────────────────────────

    /// Moves a job to `target` through the public, permission-checked path.
    ///
    /// Requesting the job's current status succeeds without writing history,
    /// but only after the terminal and FINALIZED checks have passed.
    pub fn transition_job(
        &self,
        job_id: &str,
        target: JobStatus,
        actor: &str,
        reason: Option<&str>,
        opts: TransitionOptions<'_>,
    ) -> Result<Job, LifecycleError> {
        let _span = tracing::info_span!(
            "lifecycle.transition_job",
            job_id,
            target = %target,
            actor
        )
        .entered();

        self.run(opts, |ctx| {
            let job = lock_job(ctx, job_id)?;
            let step = JobStateMachine::plan(&job, target, actor)?;
            apply_job_step(ctx, job, step, actor, reason)
        })
        .inspect_err(|e| tracing::debug!(error = %e, "job transition rejected"))
    }

    /// Moves a survey to `target` and pulls its job along in the same
    /// transaction.
    pub fn transition_survey(
        &self,
        survey_id: &str,
        target: SurveyStatus,
        actor: &str,
        reason: Option<&str>,
        opts: TransitionOptions<'_>,
    ) -> Result<Survey, LifecycleError> {
        let _span = tracing::info_span!(
            "lifecycle.transition_survey",
            survey_id,
            target = %target,
            actor
        )
        .entered();

        self.run(opts, |ctx| {
            let mut survey = lock_survey(ctx, survey_id)?;
            let job = lock_job(ctx, &survey.job_id)?;

            let facts = SurveyFacts {
                actor_role: self.actors.actor_role(actor),
                job_status: job.status,
                open_non_conformities: self.guards.open_non_conformity_count(ctx, &job.id)?,
            };
            SurveyStateMachine::plan(&survey, target, actor, &facts)?;

            let from = survey.status;
            let now = Utc::now();
            SurveyStateMachine::apply(&mut survey, target, actor, now);

            survey_repo::update_lifecycle(ctx, &survey.to_row())?;
            history_repo::append_survey(
                ctx,
                &survey.id,
                from.as_str(),
                target.as_str(),
                survey.submission_count,
                actor,
                reason,
                &format_timestamp(now),
            )?;
            ctx.defer(LifecycleEvent {
                entity: EntityKind::Survey,
                entity_id: survey.id.clone(),
                job_id: survey.job_id.clone(),
                from: Some(from.to_string()),
                to: target.to_string(),
                actor: actor.to_string(),
                reason: reason.map(str::to_string),
                submission_count: Some(survey.submission_count),
                timestamp: now,
            });

            self.sync_job_from_survey(ctx, &survey.job_id, target, actor)?;

            Ok(survey)
        })
        .inspect_err(|e| tracing::debug!(error = %e, "survey transition rejected"))
    }

    /// Applies the job transition implied by a survey entering
    /// `survey_status`. Skips the public FINALIZED guard, so it stays
    /// private to `transition_survey`.
    fn sync_job_from_survey(
        &self,
        ctx: &TxContext<'_>,
        job_id: &str,
        survey_status: SurveyStatus,
        actor: &str,
    ) -> Result<Option<Job>, LifecycleError> {
        let Some(target) = survey_status.job_sync_target() else {
            return Ok(None);
        };

        let job = lock_job(ctx, job_id)?;
        let step = JobStateMachine::plan_sync(&job, target)?;
        let reason = format!("synchronized from survey {}", survey_status);
        apply_job_step(ctx, job, step, actor, Some(&reason)).map(Some)
    }

    // ─── Reads ──────────────────────────────────────────────────────────────
    //
    // Outside a transaction these take the database lock for the duration of
    // the query and may return state another writer is about to change.
    // Pass `TransitionOptions::within(ctx)` to read inside an open one.

    /// Runs a read against the joined transaction, or on its own.
    pub(crate) fn read<T, F>(&self, opts: TransitionOptions<'_>, f: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        match opts.transaction {
            Some(ctx) => Ok(f(ctx.conn())?),
            None => Ok(self.db.with_conn(f)?),
        }
    }

    pub fn job(&self, job_id: &str, opts: TransitionOptions<'_>) -> Result<Job, LifecycleError> {
        let row = self
            .read(opts, |conn| job_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| not_found(EntityKind::Job, job_id))?;
        Ok(Job::try_from(row)?)
    }

    pub fn survey(
        &self,
        survey_id: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Survey, LifecycleError> {
        let row = self
            .read(opts, |conn| survey_repo::find_by_id(conn, survey_id))?
            .ok_or_else(|| not_found(EntityKind::Survey, survey_id))?;
        Ok(Survey::try_from(row)?)
    }

    pub fn survey_for_job(
        &self,
        job_id: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Option<Survey>, LifecycleError> {
        let row = self.read(opts, |conn| survey_repo::find_by_job_id(conn, job_id))?;
        Ok(row.map(Survey::try_from).transpose()?)
    }

    pub fn job_history(
        &self,
        job_id: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Vec<JobHistoryRow>, LifecycleError> {
        self.read(opts, |conn| history_repo::list_job(conn, job_id))
    }

    pub fn survey_history(
        &self,
        survey_id: &str,
        opts: TransitionOptions<'_>,
    ) -> Result<Vec<SurveyHistoryRow>, LifecycleError> {
        self.read(opts, |conn| history_repo::list_survey(conn, survey_id))
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    fn dispatch(&self, events: &[LifecycleEvent]) {
        for event in events {
            for observer in &self.observers {
                // The transition has committed; a faulty observer must not
                // turn it into an error or stop the remaining observers.
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| observer.on_lifecycle_event(event)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(
                        error = %e,
                        entity_id = %event.entity_id,
                        to = %event.to,
                        "lifecycle observer failed"
                    ),
                    Err(payload) => tracing::error!(
                        panic = %panic_message(&*payload),
                        entity_id = %event.entity_id,
                        to = %event.to,
                        "lifecycle observer panicked"
                    ),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

pub(crate) fn not_found(entity: EntityKind, id: &str) -> LifecycleError {
    LifecycleError::NotFound {
        entity: entity.as_str(),
        id: id.to_string(),
    }
}

pub(crate) fn lock_job(ctx: &TxContext<'_>, job_id: &str) -> Result<Job, LifecycleError> {
    let row =
        job_repo::lock_for_update(ctx, job_id)?.ok_or_else(|| not_found(EntityKind::Job, job_id))?;
    Ok(Job::try_from(row)?)
}

pub(crate) fn lock_survey(ctx: &TxContext<'_>, survey_id: &str) -> Result<Survey, LifecycleError> {
    let row = survey_repo::lock_for_update(ctx, survey_id)?
        .ok_or_else(|| not_found(EntityKind::Survey, survey_id))?;
    Ok(Survey::try_from(row)?)
}

fn apply_job_step(
    ctx: &TxContext<'_>,
    mut job: Job,
    step: JobStep,
    actor: &str,
    reason: Option<&str>,
) -> Result<Job, LifecycleError> {
    let JobStep::Apply { from, to } = step else {
        tracing::debug!(job_id = %job.id, status = %job.status, "job already in requested status");
        return Ok(job);
    };

    let now = Utc::now();
    let ts = format_timestamp(now);
    job.status = to;
    job.updated_at = now;

    job_repo::update_status(ctx, &job.id, to.as_str(), &ts)?;
    history_repo::append_job(
        ctx,
        &job.id,
        Some(from.as_str()),
        to.as_str(),
        actor,
        reason,
        &ts,
    )?;
    ctx.defer(job_event(&job, Some(from), actor, reason, now));

    Ok(job)
}

fn job_event(
    job: &Job,
    from: Option<JobStatus>,
    actor: &str,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> LifecycleEvent {
    LifecycleEvent {
        entity: EntityKind::Job,
        entity_id: job.id.clone(),
        job_id: job.id.clone(),
        from: from.map(|s| s.to_string()),
        to: job.status.to_string(),
        actor: actor.to_string(),
        reason: reason.map(str::to_string),
        submission_count: None,
        timestamp: at,
    }
}
