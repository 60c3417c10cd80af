//! The task-runner backend seen by the core.
//!
//! The concrete wire protocol behind this trait (a build-dispatch service,
//! a queue, whatever) is out of scope; the core only depends on this
//! narrow surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::args::TaskArgs;
use crate::error::ClientError;
use crate::model::{Lifecycle, TaskHandle, Verdict};

pub type ClientResult<T> = Result<T, ClientError>;

/// Outcome of fetching a task's current state.
#[derive(Debug, Clone)]
pub struct FetchedResult {
    pub lifecycle: Lifecycle,
    /// Present once the task has produced a structured test result.
    pub verdict: Option<Verdict>,
}

/// Abstract remote task-runner service.
///
/// Implementations must be `Send + Sync`: the [`Runner`](crate::runner::Runner)
/// may fetch results for multiple live tasks concurrently within one poll
/// cycle.
#[async_trait]
pub trait TaskRunnerClient: Send + Sync {
    /// Probes whether any bot can satisfy the given dimensions.
    async fn bot_exists(&self, dimensions: &HashMap<String, String>) -> ClientResult<bool>;

    /// Launches a new task, returning a handle to it.
    async fn launch_task(&self, args: &TaskArgs) -> ClientResult<TaskHandle>;

    /// Fetches the current state of a previously launched task.
    async fn fetch_result(&self, handle: &TaskHandle) -> ClientResult<FetchedResult>;

    /// Human-facing URL for a task handle.
    fn url(&self, handle: &TaskHandle) -> String {
        handle.url.clone()
    }

    /// Backend identifier for a task handle.
    fn backend_id(&self, handle: &TaskHandle) -> String {
        handle.backend_id.clone()
    }
}

/// Lets an `Arc<dyn TaskRunnerClient>` (or `Arc<ScriptedClient>` in tests)
/// stand in for the client directly, so a caller can keep a handle to it
/// alongside the one moved into [`Runner`](crate::runner::Runner).
#[async_trait]
impl<T: TaskRunnerClient + ?Sized> TaskRunnerClient for Arc<T> {
    async fn bot_exists(&self, dimensions: &HashMap<String, String>) -> ClientResult<bool> {
        (**self).bot_exists(dimensions).await
    }

    async fn launch_task(&self, args: &TaskArgs) -> ClientResult<TaskHandle> {
        (**self).launch_task(args).await
    }

    async fn fetch_result(&self, handle: &TaskHandle) -> ClientResult<FetchedResult> {
        (**self).fetch_result(handle).await
    }

    fn url(&self, handle: &TaskHandle) -> String {
        (**self).url(handle)
    }

    fn backend_id(&self, handle: &TaskHandle) -> String {
        (**self).backend_id(handle)
    }
}
