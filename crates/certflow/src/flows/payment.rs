//! Payment recording and settlement.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::payment_repo::{self, PaymentRow};
use crate::db::DatabaseError;
use crate::error::LifecycleError;
use crate::lifecycle::coordinator::lock_job;
use crate::lifecycle::model::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::lifecycle::{Job, JobStatus, LifecycleCoordinator, TransitionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Settled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Settled => "SETTLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub job_id: String,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "PENDING" => PaymentStatus::Pending,
            "SETTLED" => PaymentStatus::Settled,
            _ => {
                return Err(DatabaseError::InvalidValue {
                    column: "payments.status",
                    value: row.status,
                })
            }
        };
        Ok(Self {
            status,
            settled_at: parse_optional_timestamp("payments.settled_at", row.settled_at.as_deref())?,
            created_at: parse_timestamp("payments.created_at", &row.created_at)?,
            id: row.id,
            job_id: row.job_id,
            amount_cents: row.amount_cents,
            settled_by: row.settled_by,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SettledPayment {
    pub payment: Payment,
    pub job: Job,
}

/// Records a pending payment against a job.
pub fn record_payment(
    coordinator: &LifecycleCoordinator,
    job_id: &str,
    amount_cents: i64,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<Payment, LifecycleError> {
    if amount_cents <= 0 {
        return Err(LifecycleError::PreconditionFailed(format!(
            "payment amount must be positive, got {}",
            amount_cents
        )));
    }

    coordinator.run(opts, |ctx| {
        let job = lock_job(ctx, job_id)?;
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            job_id: job.id,
            amount_cents,
            status: PaymentStatus::Pending,
            settled_by: None,
            settled_at: None,
            created_at: now,
        };
        payment_repo::insert(
            ctx,
            &PaymentRow {
                id: payment.id.clone(),
                job_id: payment.job_id.clone(),
                amount_cents,
                status: payment.status.as_str().to_string(),
                settled_by: None,
                settled_at: None,
                created_at: format_timestamp(now),
            },
        )?;
        tracing::debug!(payment_id = %payment.id, job_id, actor, "payment recorded");
        Ok(payment)
    })
}

/// Settles a pending payment and moves its job from FINALIZED to PAYMENT_DONE.
pub fn settle_payment(
    coordinator: &LifecycleCoordinator,
    payment_id: &str,
    actor: &str,
    opts: TransitionOptions<'_>,
) -> Result<SettledPayment, LifecycleError> {
    let _span = tracing::info_span!("payment.settle", payment_id, actor).entered();

    coordinator.run(opts, |ctx| {
        let row = payment_repo::lock_for_update(ctx, payment_id)?
            .ok_or_else(|| LifecycleError::NotFound {
                entity: "PAYMENT",
                id: payment_id.to_string(),
            })?;
        let mut payment = Payment::try_from(row)?;

        if payment.status == PaymentStatus::Settled {
            return Err(LifecycleError::Conflict {
                entity: "PAYMENT",
                id: payment.id,
                reason: "payment is already settled".to_string(),
            });
        }

        let job = lock_job(ctx, &payment.job_id)?;
        if job.status != JobStatus::Finalized {
            return Err(LifecycleError::PreconditionFailed(format!(
                "job '{}' must be FINALIZED to settle payment, found {}",
                job.id, job.status
            )));
        }

        let now = Utc::now();
        if !payment_repo::mark_settled(ctx, &payment.id, actor, &format_timestamp(now))? {
            return Err(LifecycleError::Conflict {
                entity: "PAYMENT",
                id: payment.id,
                reason: "payment is already settled".to_string(),
            });
        }

        let job = coordinator.transition_job(
            &job.id,
            JobStatus::PaymentDone,
            actor,
            Some("payment settled"),
            TransitionOptions::within(ctx),
        )?;

        payment.status = PaymentStatus::Settled;
        payment.settled_by = Some(actor.to_string());
        payment.settled_at = Some(now);

        Ok(SettledPayment { payment, job })
    })
}

pub fn find_payment(
    coordinator: &LifecycleCoordinator,
    payment_id: &str,
    opts: TransitionOptions<'_>,
) -> Result<Payment, LifecycleError> {
    let row = coordinator
        .read(opts, |conn| payment_repo::find_by_id(conn, payment_id))?
        .ok_or_else(|| LifecycleError::NotFound {
            entity: "PAYMENT",
            id: payment_id.to_string(),
        })?;
    Ok(Payment::try_from(row)?)
}
