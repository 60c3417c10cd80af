//! Core data model: invocations, requests, attempts and their accumulated
//! responses.
//!
//! This mirrors the shape of a remote build-dispatch request: a request
//! carries many invocations, each invocation accumulates an ordered,
//! append-only chain of attempts as the task-runner backend launches and
//! retries it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One test to run, independent of any particular attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub display_name: Option<String>,
    pub environment: Environment,
    /// Dependency labels such as `model:eve` or `cr50:pvt`.
    pub dependencies: Vec<String>,
    pub result_keyvals: HashMap<String, String>,
    pub retry: InvocationRetryPolicy,
    pub test_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvocationRetryPolicy {
    pub allow: bool,
    /// 0 means unlimited.
    pub max: i32,
}

impl InvocationRetryPolicy {
    /// Resolves the configured maximum into a comparable budget: `None`
    /// disables retries entirely, `Some(i32::MAX)` means unlimited.
    pub fn resolved_max(&self) -> Option<i32> {
        if !self.allow {
            return None;
        }
        Some(if self.max == 0 { i32::MAX } else { self.max })
    }
}

/// Request-level scheduling pool: either a managed pool drawn from a known
/// enum of pools, or an unmanaged pool addressed by name.
///
/// Encoded as an explicit tagged union rather than a free-form map, per the
/// platform's convention for polymorphic scheduling/provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pool {
    Managed { pool: ManagedPool },
    Unmanaged { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManagedPool {
    Cq,
    Bvt,
    Suites,
    Cts,
}

#[derive(Debug, Clone)]
pub struct Scheduling {
    pub pool: Pool,
    /// Exactly one of `priority` / `qs_account` may be set; both set is a
    /// structural request error (see [`crate::args`]).
    pub priority: Option<i32>,
    pub qs_account: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SoftwareAttributes {
    pub build_target: Option<String>,
    pub chromeos_build: Option<String>,
    pub ro_firmware_build: Option<String>,
    pub rw_firmware_build: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HardwareAttributes {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestRetryPolicy {
    pub allow: bool,
    /// 0 means unlimited.
    pub max: i32,
}

impl RequestRetryPolicy {
    pub fn resolved_max(&self) -> i32 {
        if !self.allow {
            0
        } else if self.max == 0 {
            i32::MAX
        } else {
            self.max
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestParams {
    pub software: SoftwareAttributes,
    pub hardware: HardwareAttributes,
    pub scheduling: Scheduling,
    pub retry: RequestRetryPolicy,
    pub max_duration: Duration,
    pub decorations: HashMap<String, String>,
    pub tags: Vec<String>,
    pub freeform_dimensions: HashMap<String, String>,
    pub tracking_issue: Option<String>,
}

/// Opaque reference to a launched remote task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub backend_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Unspecified,
    Failed,
    NoVerdict,
    Passed,
    PassedOnRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Pending,
    Running,
    Completed,
    Aborted,
    Cancelled,
    Rejected,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Lifecycle::Completed | Lifecycle::Cancelled | Lifecycle::Aborted | Lifecycle::Rejected
        )
    }
}

/// One invocation/task pair.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub index: u32,
    pub handle: TaskHandle,
    pub lifecycle: Lifecycle,
    pub verdict: Verdict,
}

impl Attempt {
    pub fn is_terminal(&self) -> bool {
        self.lifecycle.is_terminal()
    }
}

/// Whether a terminal verdict should trigger a retry attempt.
///
/// Pure function of the verdict alone; anything outside the five known
/// verdicts is a programming error in the caller.
pub fn needs_retry(verdict: Verdict) -> bool {
    match verdict {
        Verdict::Unspecified | Verdict::Failed => true,
        Verdict::NoVerdict | Verdict::Passed | Verdict::PassedOnRetry => false,
    }
}

/// Accumulated state for a single invocation: its attempt chain plus,
/// when the invocation could never be scheduled, the dimensions that
/// rejected it.
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub invocation_id: String,
    pub runnable: bool,
    pub rejected_dimensions: HashMap<String, String>,
    pub attempts: Vec<Attempt>,
}

impl InvocationResponse {
    pub fn rejected(invocation_id: impl Into<String>, dimensions: HashMap<String, String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            runnable: false,
            rejected_dimensions: dimensions,
            attempts: Vec::new(),
        }
    }

    pub fn runnable(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            runnable: true,
            rejected_dimensions: HashMap::new(),
            attempts: Vec::new(),
        }
    }

    pub fn push_attempt(&mut self, attempt: Attempt) {
        debug_assert_eq!(attempt.index as usize, self.attempts.len());
        self.attempts.push(attempt);
    }

    pub fn latest_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn latest_attempt_mut(&mut self) -> Option<&mut Attempt> {
        self.attempts.last_mut()
    }

    /// True once no further attempts can be appended: the invocation was
    /// never runnable, or its latest attempt is terminal and did not
    /// trigger a retry.
    pub fn is_terminal(&self, retry_pending: bool) -> bool {
        if !self.runnable {
            return true;
        }
        match self.latest_attempt() {
            None => false,
            Some(a) => a.is_terminal() && !retry_pending,
        }
    }

    /// Derives this invocation's overall verdict from its attempt chain.
    ///
    /// A first-attempt pass is `Passed`; a pass preceded by any
    /// non-passing attempt is `PassedOnRetry`; anything else is `Failed`.
    /// A never-runnable invocation has no meaningful verdict.
    pub fn overall_verdict(&self) -> Verdict {
        if !self.runnable {
            return Verdict::Unspecified;
        }
        match self.attempts.last() {
            None => Verdict::Unspecified,
            Some(last) => match last.verdict {
                Verdict::Passed if self.attempts.len() == 1 => Verdict::Passed,
                Verdict::Passed => Verdict::PassedOnRetry,
                Verdict::NoVerdict => Verdict::NoVerdict,
                _ => Verdict::Failed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(index: u32, lifecycle: Lifecycle, verdict: Verdict) -> Attempt {
        Attempt {
            index,
            handle: TaskHandle {
                backend_id: format!("task-{index}"),
                url: format!("https://tasks.example/task-{index}"),
            },
            lifecycle,
            verdict,
        }
    }

    #[test]
    fn needs_retry_is_pure_over_terminal_verdicts() {
        assert!(needs_retry(Verdict::Unspecified));
        assert!(needs_retry(Verdict::Failed));
        assert!(!needs_retry(Verdict::NoVerdict));
        assert!(!needs_retry(Verdict::Passed));
        assert!(!needs_retry(Verdict::PassedOnRetry));
    }

    #[test]
    fn first_attempt_pass_is_plain_passed() {
        let mut response = InvocationResponse::runnable("inv-1");
        response.push_attempt(attempt(0, Lifecycle::Completed, Verdict::Passed));
        assert_eq!(response.overall_verdict(), Verdict::Passed);
    }

    #[test]
    fn pass_after_failure_is_passed_on_retry() {
        let mut response = InvocationResponse::runnable("inv-1");
        response.push_attempt(attempt(0, Lifecycle::Completed, Verdict::Failed));
        response.push_attempt(attempt(1, Lifecycle::Completed, Verdict::Passed));
        assert_eq!(response.overall_verdict(), Verdict::PassedOnRetry);
    }

    #[test]
    fn no_verdict_is_not_a_failure() {
        let mut response = InvocationResponse::runnable("inv-1");
        response.push_attempt(attempt(0, Lifecycle::Completed, Verdict::NoVerdict));
        assert_eq!(response.overall_verdict(), Verdict::NoVerdict);
        assert!(!needs_retry(response.overall_verdict()));
    }

    #[test]
    fn rejected_invocation_is_terminal_with_no_attempts() {
        let response = InvocationResponse::rejected(
            "inv-1",
            HashMap::from([("freeform-key".to_string(), "freeform-value".to_string())]),
        );
        assert!(response.is_terminal(false));
        assert_eq!(response.overall_verdict(), Verdict::Unspecified);
        assert!(response.attempts.is_empty());
    }

    #[test]
    fn live_invocation_is_not_terminal() {
        let mut response = InvocationResponse::runnable("inv-1");
        response.push_attempt(attempt(0, Lifecycle::Running, Verdict::Unspecified));
        assert!(!response.is_terminal(false));
    }

    #[test]
    fn retry_policy_zero_max_means_unlimited_when_allowed() {
        let policy = InvocationRetryPolicy { allow: true, max: 0 };
        assert_eq!(policy.resolved_max(), Some(i32::MAX));
    }

    #[test]
    fn retry_policy_disallowed_has_no_budget() {
        let policy = InvocationRetryPolicy {
            allow: false,
            max: 5,
        };
        assert_eq!(policy.resolved_max(), None);
    }
}
