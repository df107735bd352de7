//! Test harness for isolated lifecycle scenarios.
//!
//! Every `TestHarness` owns its own database (in memory by default, or a
//! file under a temp directory) and a coordinator wired with the standard
//! actors below.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use certflow::db::{history_repo, survey_repo};
use certflow::flows::{self, field_work};
use certflow::lifecycle::{
    EventObserver, GpsCoordinates, InMemoryActorDirectory, Job, JobStatus, LifecycleCoordinator,
    LifecycleEvent, ObserverError, Role, Survey, SurveyStatus, TransitionOptions,
};
use certflow::{Database, LifecycleError};

use super::builders::{ChecklistBuilder, GpsBuilder};

pub const ADMIN: &str = "admin-1";
pub const SURVEYOR: &str = "surveyor-1";
pub const TECH_MANAGER: &str = "tm-1";
pub const CLIENT: &str = "client-1";

pub fn opts() -> TransitionOptions<'static> {
    TransitionOptions::default()
}

/// Collects every event it is handed.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventObserver for RecordingObserver {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) -> Result<(), ObserverError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Rejects every event.
pub struct FailingObserver;

impl EventObserver for FailingObserver {
    fn on_lifecycle_event(&self, _event: &LifecycleEvent) -> Result<(), ObserverError> {
        Err(ObserverError::new("failing", "webhook endpoint unreachable"))
    }
}

/// Panics on every event.
pub struct PanickingObserver;

impl EventObserver for PanickingObserver {
    fn on_lifecycle_event(&self, _event: &LifecycleEvent) -> Result<(), ObserverError> {
        panic!("observer bug");
    }
}

pub struct TestHarness {
    temp_dir: Option<TempDir>,
    pub coordinator: LifecycleCoordinator,
    pub recorder: Arc<RecordingObserver>,
    pub actors: Arc<InMemoryActorDirectory>,
}

impl TestHarness {
    /// In-memory database.
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        Self::with_database(db, None)
    }

    /// File-backed database in a temp directory.
    pub fn with_file_db() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("data").join("certflow.db");
        let db = Database::open(&path, Duration::from_secs(5)).expect("Failed to open database");
        Self::with_database(db, Some(temp_dir))
    }

    fn with_database(db: Database, temp_dir: Option<TempDir>) -> Self {
        let actors = Arc::new(
            InMemoryActorDirectory::new()
                .with_actor(ADMIN, Role::Administrator)
                .with_actor(SURVEYOR, Role::Surveyor)
                .with_actor(TECH_MANAGER, Role::TechnicalManager)
                .with_actor(CLIENT, Role::Client),
        );
        let recorder = Arc::new(RecordingObserver::default());
        let coordinator = LifecycleCoordinator::new(db, actors.clone())
            .with_observer(recorder.clone());

        Self {
            temp_dir,
            coordinator,
            recorder,
            actors,
        }
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|d| d.path().join("data").join("certflow.db"))
    }

    // ─── Jobs ──────────────────────────────────────────────────────────────

    pub fn create_job(&self, requires_survey: bool) -> Job {
        self.coordinator
            .create_job(requires_survey, ADMIN, opts())
            .expect("Failed to create job")
    }

    pub fn transition_job(&self, job_id: &str, target: JobStatus) -> Result<Job, LifecycleError> {
        self.coordinator
            .transition_job(job_id, target, ADMIN, None, opts())
    }

    pub fn advance_job(&self, job_id: &str, path: &[JobStatus]) -> Job {
        let mut job = self.coordinator.job(job_id, opts()).expect("job exists");
        for status in path {
            job = self
                .transition_job(job_id, *status)
                .unwrap_or_else(|e| panic!("{} -> {} failed: {}", job.status, status, e));
        }
        job
    }

    /// A job without a survey, moved to APPROVED.
    pub fn approved_job(&self) -> Job {
        let job = self.create_job(false);
        self.advance_job(&job.id, &[JobStatus::DocumentVerified, JobStatus::Approved])
    }

    /// A survey-backed job assigned to the standard surveyor and authorized.
    pub fn authorized_survey_job(&self) -> Job {
        let job = self.create_job(true);
        self.advance_job(&job.id, &[JobStatus::DocumentVerified, JobStatus::Approved]);
        self.coordinator
            .assign_surveyor(&job.id, SURVEYOR, ADMIN, None, opts())
            .expect("Failed to assign surveyor");
        self.advance_job(&job.id, &[JobStatus::SurveyAuthorized])
    }

    pub fn job_status(&self, job_id: &str) -> JobStatus {
        self.coordinator.job(job_id, opts()).expect("job exists").status
    }

    pub fn job_history_len(&self, job_id: &str) -> usize {
        self.coordinator.job_history(job_id, opts()).expect("history").len()
    }

    /// Overwrites a job's status without going through the coordinator.
    /// Only for arranging states no legal path reaches.
    pub fn force_job_status(&self, job_id: &str, status: JobStatus) {
        self.coordinator
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE jobs SET status = ?2 WHERE id = ?1",
                    [job_id, status.as_str()],
                )?;
                Ok(())
            })
            .expect("Failed to force job status");
    }

    pub fn force_survey_status(&self, survey_id: &str, status: SurveyStatus) {
        self.coordinator
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE surveys SET status = ?2 WHERE id = ?1",
                    [survey_id, status.as_str()],
                )?;
                Ok(())
            })
            .expect("Failed to force survey status");
    }

    // ─── Surveys ───────────────────────────────────────────────────────────

    pub fn survey_status(&self, survey_id: &str) -> SurveyStatus {
        self.coordinator.survey(survey_id, opts()).expect("survey exists").status
    }

    pub fn survey_history_len(&self, survey_id: &str) -> usize {
        self.coordinator
            .survey_history(survey_id, opts())
            .expect("history")
            .len()
    }

    pub fn survey_finalized_rows(&self, survey_id: &str) -> usize {
        self.coordinator
            .database()
            .with_conn(|conn| history_repo::list_survey(conn, survey_id))
            .expect("history")
            .iter()
            .filter(|row| row.new_status == "FINALIZED")
            .count()
    }

    /// Started survey on an authorized job.
    pub fn started_survey(&self) -> (Job, Survey) {
        let job = self.authorized_survey_job();
        let survey = field_work::start_survey(&self.coordinator, &job.id, SURVEYOR, opts())
            .expect("Failed to start survey");
        (job, survey)
    }

    /// Survey with checklist, proof and statement: SUBMITTED, job SURVEY_DONE.
    pub fn submitted_survey(&self) -> (Job, Survey) {
        let (job, survey) = self.started_survey();
        field_work::submit_checklist(
            &self.coordinator,
            &survey.id,
            &ChecklistBuilder::new().item("hull", "ok").item("lifeboats", "ok").build(),
            SURVEYOR,
            opts(),
        )
        .expect("Failed to submit checklist");
        self.upload_proof(&survey.id, GpsBuilder::hamburg().build())
            .expect("Failed to upload proof");
        let survey = field_work::declare_survey(
            &self.coordinator,
            &survey.id,
            "Vessel inspected; no findings.",
            SURVEYOR,
            opts(),
        )
        .expect("Failed to declare survey");
        (job, survey)
    }

    /// Survey FINALIZED by the technical manager; job FINALIZED.
    pub fn finalized_survey(&self) -> (Job, Survey) {
        let (job, survey) = self.submitted_survey();
        let survey =
            field_work::finalize_survey(&self.coordinator, &survey.id, TECH_MANAGER, None, opts())
                .expect("Failed to finalize survey");
        (self.coordinator.job(&job.id, opts()).expect("job exists"), survey)
    }

    pub fn upload_proof(
        &self,
        survey_id: &str,
        gps: GpsCoordinates,
    ) -> Result<Survey, LifecycleError> {
        field_work::upload_proof(
            &self.coordinator,
            survey_id,
            gps,
            "photos/attendance.jpg",
            SURVEYOR,
            opts(),
        )
    }

    /// Removes the attendance evidence behind the coordinator's back.
    pub fn clear_evidence(&self, survey_id: &str) {
        self.coordinator
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE surveys SET gps_latitude = NULL, gps_longitude = NULL,
                     attendance_photo_ref = NULL WHERE id = ?1",
                    [survey_id],
                )?;
                Ok(())
            })
            .expect("Failed to clear evidence");
    }

    pub fn stored_survey(&self, survey_id: &str) -> survey_repo::SurveyRow {
        self.coordinator
            .database()
            .with_conn(|conn| survey_repo::find_by_id(conn, survey_id))
            .expect("query")
            .expect("survey exists")
    }

    // ─── Payments ──────────────────────────────────────────────────────────

    /// Job in PAYMENT_DONE, survey-backed or not.
    pub fn paid_job(&self, requires_survey: bool) -> Job {
        let job = if requires_survey {
            self.finalized_survey().0
        } else {
            let job = self.approved_job();
            self.advance_job(&job.id, &[JobStatus::Finalized])
        };
        let payment = flows::record_payment(&self.coordinator, &job.id, 125_000, ADMIN, opts())
            .expect("Failed to record payment");
        flows::settle_payment(&self.coordinator, &payment.id, ADMIN, opts())
            .expect("Failed to settle payment")
            .job
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
