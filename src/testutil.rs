//! In-memory test doubles for [`TaskRunnerClient`] and [`BuildSender`].
//!
//! Never linked into the production binary; gated behind `#[cfg(any(test,
//! feature = "testutil"))]` so integration tests in `tests/` can use it too.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::args::TaskArgs;
use crate::build::BuildSender;
use crate::client::{ClientResult, FetchedResult, TaskRunnerClient};
use crate::model::TaskHandle;

/// A scripted response for one `fetch_result` call.
#[derive(Debug, Clone)]
pub struct ScriptedFetch {
    pub lifecycle: crate::model::Lifecycle,
    pub verdict: Option<crate::model::Verdict>,
}

/// A [`TaskRunnerClient`] that plays back a finite, ordered sequence of
/// responses per task handle. Exhausting an invocation's script is an
/// assertion failure (a panic), never a silent default, so a test that
/// mis-scripts its scenario fails loudly instead of passing by accident.
pub struct ScriptedClient {
    bot_exists: bool,
    /// Keyed by task name; shared across every attempt launched for that
    /// name, since a retry reuses the same `task_name` with a fresh handle.
    scripts: Mutex<HashMap<String, Vec<ScriptedFetch>>>,
    /// backend_id -> task_name, recorded at launch so `fetch_result` can
    /// find the right queue.
    handles: Mutex<HashMap<String, String>>,
    launch_count: Mutex<usize>,
    fetch_count: Mutex<usize>,
    bot_exists_count: Mutex<usize>,
}

impl ScriptedClient {
    pub fn new(bot_exists: bool) -> Self {
        Self {
            bot_exists,
            scripts: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            launch_count: Mutex::new(0),
            fetch_count: Mutex::new(0),
            bot_exists_count: Mutex::new(0),
        }
    }

    /// Registers the ordered fetch script for a given task name. Each
    /// `fetch_result` call for any attempt of that task pops the next
    /// entry; exhausting the list panics rather than defaulting.
    pub fn push_script(&self, task_name: impl Into<String>, script: Vec<ScriptedFetch>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_name.into(), script);
    }

    pub fn launch_count(&self) -> usize {
        *self.launch_count.lock().unwrap()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }

    pub fn bot_exists_count(&self) -> usize {
        *self.bot_exists_count.lock().unwrap()
    }
}

#[async_trait]
impl TaskRunnerClient for ScriptedClient {
    async fn bot_exists(&self, _dimensions: &HashMap<String, String>) -> ClientResult<bool> {
        *self.bot_exists_count.lock().unwrap() += 1;
        Ok(self.bot_exists)
    }

    async fn launch_task(&self, args: &TaskArgs) -> ClientResult<TaskHandle> {
        let mut count = self.launch_count.lock().unwrap();
        let backend_id = format!("{}-{}", args.task_name, *count);
        *count += 1;
        self.handles
            .lock()
            .unwrap()
            .insert(backend_id.clone(), args.task_name.clone());
        Ok(TaskHandle {
            backend_id: backend_id.clone(),
            url: format!("https://tasks.example/{backend_id}"),
        })
    }

    async fn fetch_result(&self, handle: &TaskHandle) -> ClientResult<FetchedResult> {
        *self.fetch_count.lock().unwrap() += 1;
        let task_name = self
            .handles
            .lock()
            .unwrap()
            .get(&handle.backend_id)
            .cloned()
            .unwrap_or_else(|| panic!("unknown handle {}", handle.backend_id));
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(&task_name)
            .unwrap_or_else(|| panic!("no script registered for task {task_name}"));
        if script.is_empty() {
            panic!(
                "script exhausted for {task_name}: test scenario under-scripted an invocation's attempts"
            );
        }
        let next = script.remove(0);
        Ok(FetchedResult {
            lifecycle: next.lifecycle,
            verdict: next.verdict,
        })
    }
}

/// A [`BuildSender`] that records each publish call for assertions.
#[derive(Default)]
pub struct RecordingSender {
    publish_count: Mutex<usize>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock().unwrap()
    }
}

#[async_trait]
impl BuildSender for RecordingSender {
    async fn publish(&self) {
        *self.publish_count.lock().unwrap() += 1;
    }
}
