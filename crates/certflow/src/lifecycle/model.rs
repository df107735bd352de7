//! Domain views of the job and survey rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job_machine::JobStatus;
use super::survey_machine::SurveyStatus;
use crate::db::job_repo::JobRow;
use crate::db::survey_repo::SurveyRow;
use crate::db::DatabaseError;

/// The two entities whose status the coordinator owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Job,
    Survey,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Job => "JOB",
            EntityKind::Survey => "SURVEY",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certification job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Fixed at creation.
    pub requires_survey: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_surveyor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_certificate: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "jobs.status",
                value: row.status.clone(),
            })?;

        Ok(Self {
            status,
            requires_survey: row.requires_survey,
            assigned_surveyor: row.assigned_surveyor,
            generated_certificate: row.generated_certificate,
            created_at: parse_timestamp("jobs.created_at", &row.created_at)?,
            updated_at: parse_timestamp("jobs.updated_at", &row.updated_at)?,
            created_by: row.created_by,
            id: row.id,
        })
    }
}

impl Job {
    pub(crate) fn to_row(&self) -> JobRow {
        JobRow {
            id: self.id.clone(),
            status: self.status.as_str().to_string(),
            requires_survey: self.requires_survey,
            assigned_surveyor: self.assigned_surveyor.clone(),
            generated_certificate: self.generated_certificate.clone(),
            created_by: self.created_by.clone(),
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
        }
    }
}

/// Position reported by the surveyor's device at the vessel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The on-site inspection attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: String,
    pub job_id: String,
    pub status: SurveyStatus,
    pub submission_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsCoordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_photo_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Survey {
    /// Whether the attendance photo and GPS fix required for submission are present.
    pub fn has_attendance_evidence(&self) -> bool {
        self.gps.is_some()
            && self
                .attendance_photo_ref
                .as_deref()
                .is_some_and(|photo| !photo.trim().is_empty())
    }

    pub(crate) fn to_row(&self) -> SurveyRow {
        SurveyRow {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            status: self.status.as_str().to_string(),
            submission_count: self.submission_count,
            gps_latitude: self.gps.map(|g| g.latitude),
            gps_longitude: self.gps.map(|g| g.longitude),
            attendance_photo_ref: self.attendance_photo_ref.clone(),
            survey_statement: self.survey_statement.clone(),
            checklist: self.checklist.as_ref().map(|c| c.to_string()),
            started_at: self.started_at.map(format_timestamp),
            submitted_at: self.submitted_at.map(format_timestamp),
            declared_by: self.declared_by.clone(),
            declared_at: self.declared_at.map(format_timestamp),
            finalized_at: self.finalized_at.map(format_timestamp),
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
        }
    }
}

impl TryFrom<SurveyRow> for Survey {
    type Error = DatabaseError;

    fn try_from(row: SurveyRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SurveyStatus>()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "surveys.status",
                value: row.status.clone(),
            })?;

        let gps = match (row.gps_latitude, row.gps_longitude) {
            (Some(latitude), Some(longitude)) => Some(GpsCoordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        let checklist = row
            .checklist
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "surveys.checklist",
                value: row.checklist.clone().unwrap_or_default(),
            })?;

        Ok(Self {
            status,
            gps,
            checklist,
            submission_count: row.submission_count,
            started_at: parse_optional_timestamp("surveys.started_at", row.started_at.as_deref())?,
            submitted_at: parse_optional_timestamp(
                "surveys.submitted_at",
                row.submitted_at.as_deref(),
            )?,
            declared_at: parse_optional_timestamp(
                "surveys.declared_at",
                row.declared_at.as_deref(),
            )?,
            finalized_at: parse_optional_timestamp(
                "surveys.finalized_at",
                row.finalized_at.as_deref(),
            )?,
            created_at: parse_timestamp("surveys.created_at", &row.created_at)?,
            updated_at: parse_timestamp("surveys.updated_at", &row.updated_at)?,
            declared_by: row.declared_by,
            attendance_photo_ref: row.attendance_photo_ref,
            survey_statement: row.survey_statement,
            job_id: row.job_id,
            id: row.id,
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_timestamp(
    column: &'static str,
    s: &str,
) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            column,
            value: s.to_string(),
        })
}

pub(crate) fn parse_optional_timestamp(
    column: &'static str,
    s: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.map(|value| parse_timestamp(column, value)).transpose()
}
