//! Worker process internals: the pending-job dispatcher.
//!
//! The recovery sweep lives in `lumen-orchestrator`; this crate wires
//! both loops to real collaborators in `main.rs`.

pub mod dispatcher;

pub use dispatcher::JobDispatcher;
