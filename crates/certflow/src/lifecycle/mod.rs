//! The job and survey lifecycle engine.
//!
//! Two coupled state machines with fixed transition graphs, driven by the
//! [`LifecycleCoordinator`], which is the only component that writes status
//! columns or history rows.

pub mod actors;
pub mod coordinator;
pub mod events;
pub mod job_machine;
pub mod model;
pub mod survey_machine;
pub mod tx;

pub use actors::{ActorDirectory, InMemoryActorDirectory, Role};
pub use coordinator::LifecycleCoordinator;
pub use events::{
    EventObserver, LifecycleBroadcaster, LifecycleEvent, ObserverError, TracingObserver,
};
pub use job_machine::{JobStateMachine, JobStatus, JobStep};
pub use model::{EntityKind, GpsCoordinates, Job, Survey};
pub use survey_machine::{SurveyFacts, SurveyStateMachine, SurveyStatus};
pub use tx::{TransitionOptions, TxContext};
