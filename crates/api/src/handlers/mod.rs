//! HTTP request handlers.

pub mod generations;
