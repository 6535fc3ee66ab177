//! Pure domain logic shared by every other crate.
//!
//! No I/O, no async, no internal dependencies. Pricing and validation
//! live here so that the API, the orchestrator, and tests all agree on
//! the same numbers.

pub mod error;
pub mod pricing;
pub mod types;
pub mod validation;
