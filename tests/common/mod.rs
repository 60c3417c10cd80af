//! Shared fixtures for the end-to-end scenario tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use labrunner::model::{
    Environment, HardwareAttributes, Invocation, InvocationRetryPolicy, Lifecycle, ManagedPool,
    Pool, RequestParams, RequestRetryPolicy, Scheduling, SoftwareAttributes, Verdict,
};
use labrunner::runner::ExecuteRequest;
use labrunner::testutil::ScriptedFetch;

/// Shorthand for scripting one `fetch_result` response onto a `ScriptedClient`.
pub fn testutil_fetch(lifecycle: Lifecycle, verdict: Option<Verdict>) -> ScriptedFetch {
    ScriptedFetch { lifecycle, verdict }
}

pub fn invocation(id: &str, allow_retries: bool, max_retries: i32) -> Invocation {
    Invocation {
        id: id.to_string(),
        display_name: Some(id.to_string()),
        environment: Environment::Client,
        dependencies: Vec::new(),
        result_keyvals: HashMap::new(),
        retry: InvocationRetryPolicy {
            allow: allow_retries,
            max: max_retries,
        },
        test_args: Vec::new(),
    }
}

pub fn invocation_with_dependencies(id: &str, dependencies: Vec<String>) -> Invocation {
    Invocation {
        dependencies,
        ..invocation(id, false, 0)
    }
}

pub fn request_params(allow_retries: bool, max_retries: i32) -> RequestParams {
    RequestParams {
        software: SoftwareAttributes::default(),
        hardware: HardwareAttributes::default(),
        scheduling: Scheduling {
            pool: Pool::Managed {
                pool: ManagedPool::Cq,
            },
            priority: Some(0),
            qs_account: None,
        },
        retry: RequestRetryPolicy {
            allow: allow_retries,
            max: max_retries,
        },
        max_duration: Duration::from_secs(3600),
        decorations: HashMap::new(),
        tags: Vec::new(),
        freeform_dimensions: HashMap::from([(
            "freeform-key".to_string(),
            "freeform-value".to_string(),
        )]),
        tracking_issue: None,
    }
}

pub fn request(tag: &str, params: RequestParams, invocations: Vec<Invocation>) -> ExecuteRequest {
    ExecuteRequest {
        tag: tag.to_string(),
        params,
        invocations,
        deadline: None,
    }
}

/// An in-memory `tracing` writer so scenario tests can assert on specific
/// log lines without going through stdout capture.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).contains(needle)
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Installs a capturing subscriber for the duration of the returned guard.
/// Tests that need log assertions should keep the guard alive until after
/// the run completes.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::new();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
