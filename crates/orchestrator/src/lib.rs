//! The generation job state machine.
//!
//! Drives a claimed job from `Processing` to a terminal state: provider
//! invocation (synchronous for images, submit/poll/fetch for video),
//! artifact materialization in object storage, asset publication, and
//! the refund-or-not decision on failure.
//!
//! The orchestrator holds its collaborators behind the ports in
//! [`ports`], so tests drive the whole machine with in-memory fakes;
//! [`pg`] provides the Postgres-backed production adapters.

pub mod config;
pub mod orchestrator;
pub mod pg;
pub mod ports;
pub mod recovery;

pub use config::OrchestratorConfig;
pub use orchestrator::{GenerationOrchestrator, OrchestrateError};
pub use ports::{AssetPublisher, CreditLedger, JobStore, PublishError};
pub use recovery::RecoverySweeper;
