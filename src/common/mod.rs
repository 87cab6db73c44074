//! Shared utilities for the session layer.

pub mod retry;

pub use retry::{exponential_backoff, with_retry_if};
