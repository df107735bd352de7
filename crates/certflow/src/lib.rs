pub mod compliance;
pub mod config;
pub mod db;
pub mod error;
pub mod flows;
pub mod lifecycle;
pub mod logging;

pub use compliance::{
    ComplianceGuards, NonConformity, NonConformityLedger, NonConformityStatus, StoreLedger,
};
pub use config::{load_config, CertflowConfig};
pub use db::{Database, DatabaseError};
pub use error::{CertflowError, ConfigError, ErrorKind, LifecycleError, Result};
pub use lifecycle::{
    ActorDirectory, EventObserver, InMemoryActorDirectory, Job, JobStatus, LifecycleCoordinator,
    LifecycleEvent, Role, Survey, SurveyStatus, TransitionOptions, TxContext,
};
