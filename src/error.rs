//! Error types for the orchestration core.
//!
//! Each subsystem boundary gets its own [`thiserror`] enum; the top-level
//! [`Runner::run`](crate::runner::Runner::run) composes them into
//! [`anyhow::Error`] for the caller.

use thiserror::Error;

/// Errors raised while turning an [`Invocation`](crate::model::Invocation)
/// into resolved task-runner arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("invocation {invocation}: {field} conflicts with request attributes: {detail}")]
    InvalidDependencies {
        invocation: String,
        field: String,
        detail: String,
    },
}

/// Errors raised by a [`TaskRunnerClient`](crate::client::TaskRunnerClient)
/// implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("launch failed: {0}")]
    Launch(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("bot probe failed: {0}")]
    Probe(String),
    #[error("structural request error: {0}")]
    Structural(String),
}

/// Fatal errors returned from the top-level driver.
///
/// Cancellation is deliberately not a variant here: a cancelled run returns
/// its accumulated partial responses rather than an error (see the Runner's
/// poll loop).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("structural request error: {0}")]
    StructuralRequest(String),
    #[error("fatal error launching task: {0}")]
    Launch(ClientError),
    #[error("fatal error fetching task result: {0}")]
    Fetch(ClientError),
}
