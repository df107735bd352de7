//! Lifecycle events and the observers they are dispatched to after commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use super::model::EntityKind;

/// One committed status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub entity: EntityKind,
    pub entity_id: String,
    pub job_id: String,
    /// `None` for the creation record of a job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Survey events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_count: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Error, Debug)]
#[error("Observer '{observer}' failed: {message}")]
pub struct ObserverError {
    pub observer: String,
    pub message: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            message: message.into(),
        }
    }
}

/// Receives committed lifecycle events. Errors are logged by the
/// dispatcher and never reach the caller of the transition.
pub trait EventObserver: Send + Sync {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) -> Result<(), ObserverError>;
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) -> Result<(), ObserverError> {
        tracing::info!(
            entity = %event.entity,
            entity_id = %event.entity_id,
            job_id = %event.job_id,
            from = event.from.as_deref().unwrap_or("-"),
            to = %event.to,
            actor = %event.actor,
            reason = event.reason.as_deref().unwrap_or(""),
            submission_count = event.submission_count,
            "lifecycle transition"
        );
        Ok(())
    }
}

/// Broadcasts lifecycle events for streaming.
#[derive(Clone)]
pub struct LifecycleBroadcaster {
    sender: Arc<broadcast::Sender<LifecycleEvent>>,
}

impl LifecycleBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: LifecycleEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventObserver for LifecycleBroadcaster {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) -> Result<(), ObserverError> {
        if self.receiver_count() > 0 {
            self.send(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> LifecycleEvent {
        LifecycleEvent {
            entity: EntityKind::Survey,
            entity_id: "survey-1".to_string(),
            job_id: "job-1".to_string(),
            from: Some("PROOF_UPLOADED".to_string()),
            to: "SUBMITTED".to_string(),
            actor: "surveyor-1".to_string(),
            reason: None,
            submission_count: Some(1),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn broadcaster_delivers_to_subscribers() {
        let broadcaster = LifecycleBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        broadcaster.on_lifecycle_event(&event()).unwrap();

        let received = rx.try_recv().unwrap();
        assert_eq!(received.entity_id, "survey-1");
        assert_eq!(received.submission_count, Some(1));
    }

    #[test]
    fn broadcaster_without_subscribers_is_fine() {
        let broadcaster = LifecycleBroadcaster::default();
        assert_eq!(broadcaster.receiver_count(), 0);
        broadcaster.on_lifecycle_event(&event()).unwrap();

        // Late subscribers only see what is sent after they joined.
        let mut rx = broadcaster.subscribe();
        assert!(rx.try_recv().is_err());
        broadcaster.on_lifecycle_event(&event()).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn event_serializes_camel_case() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["entity"], "SURVEY");
        assert_eq!(json["entityId"], "survey-1");
        assert_eq!(json["submissionCount"], 1);
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn tracing_observer_never_fails() {
        assert!(TracingObserver.on_lifecycle_event(&event()).is_ok());
    }
}
