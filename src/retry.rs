//! Per-request retry budgeting.
//!
//! Tracks a global retry count for a request alongside a per-invocation
//! count, both checked against configured maxima before a new attempt is
//! launched.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{InvocationRetryPolicy, RequestRetryPolicy};

#[derive(Debug, Clone, Copy)]
struct Counter {
    max: i32,
    count: i32,
}

impl Counter {
    fn can_retry(&self) -> bool {
        self.count < self.max
    }
}

/// Which budget refused a retry, so callers can log precisely instead of
/// conflating the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// The invocation's own `max_retries` is exhausted (or it was never
    /// registered, e.g. an id the caller doesn't recognize).
    PerInvocation,
    /// The request-wide budget is exhausted, independent of this
    /// invocation's own remaining allowance.
    Global,
}

/// Retry bookkeeping for one request.
///
/// Not `Send`-shared: owned exclusively by the
/// [`RequestTaskSet`](crate::request::RequestTaskSet) that constructs it.
pub struct RetryCounter {
    global: Counter,
    per_invocation: HashMap<String, Counter>,
}

impl RetryCounter {
    pub fn new(request_policy: &RequestRetryPolicy) -> Self {
        Self {
            global: Counter {
                max: request_policy.resolved_max(),
                count: 0,
            },
            per_invocation: HashMap::new(),
        }
    }

    /// Registers an invocation's own retry policy. Must be called once per
    /// invocation before the first [`Self::can_retry`] check for it.
    pub fn register(&mut self, invocation_id: &str, policy: &InvocationRetryPolicy) {
        let max = policy.resolved_max().unwrap_or(0);
        self.per_invocation
            .insert(invocation_id.to_string(), Counter { max, count: 0 });
    }

    /// Whether `invocation_id` may still be retried under both its own
    /// budget and the request-wide budget. `Err` names which budget was
    /// the deciding factor.
    pub fn can_retry(&self, invocation_id: &str) -> Result<(), RetryLimit> {
        let Some(inv) = self.per_invocation.get(invocation_id) else {
            return Err(RetryLimit::PerInvocation);
        };
        if !inv.can_retry() {
            debug!(invocation = invocation_id, "Hit the test retry limit");
            return Err(RetryLimit::PerInvocation);
        }
        if !self.global.can_retry() {
            debug!(invocation = invocation_id, "Hit the task set retry limit");
            return Err(RetryLimit::Global);
        }
        Ok(())
    }

    /// Records that a retry was launched for `invocation_id`.
    pub fn notify_retry(&mut self, invocation_id: &str) {
        self.global.count += 1;
        if let Some(inv) = self.per_invocation.get_mut(invocation_id) {
            inv.count += 1;
        }
    }

    pub fn global_count(&self) -> i32 {
        self.global.count
    }

    pub fn invocation_count(&self, invocation_id: &str) -> i32 {
        self.per_invocation
            .get(invocation_id)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allow: bool, max: i32) -> InvocationRetryPolicy {
        InvocationRetryPolicy { allow, max }
    }

    fn request_policy(allow: bool, max: i32) -> RequestRetryPolicy {
        RequestRetryPolicy { allow, max }
    }

    #[test]
    fn disallowed_retry_has_zero_budget() {
        let mut counter = RetryCounter::new(&request_policy(true, 10));
        counter.register("t1", &policy(false, 0));
        assert_eq!(counter.can_retry("t1"), Err(RetryLimit::PerInvocation));
    }

    #[test]
    fn per_invocation_budget_is_enforced() {
        let mut counter = RetryCounter::new(&request_policy(true, 10));
        counter.register("t1", &policy(true, 1));
        assert!(counter.can_retry("t1").is_ok());
        counter.notify_retry("t1");
        assert_eq!(counter.can_retry("t1"), Err(RetryLimit::PerInvocation));
    }

    #[test]
    fn global_budget_is_enforced_across_invocations() {
        let mut counter = RetryCounter::new(&request_policy(true, 1));
        counter.register("t1", &policy(true, 5));
        counter.register("t2", &policy(true, 5));

        assert!(counter.can_retry("t1").is_ok());
        counter.notify_retry("t1");

        assert_eq!(counter.can_retry("t2"), Err(RetryLimit::Global));
    }

    #[test]
    fn zero_max_means_unlimited_when_allowed() {
        let mut counter = RetryCounter::new(&request_policy(true, 0));
        counter.register("t1", &policy(true, 0));
        for _ in 0..50 {
            assert!(counter.can_retry("t1").is_ok());
            counter.notify_retry("t1");
        }
    }

    #[test]
    fn unregistered_invocation_cannot_retry() {
        let counter = RetryCounter::new(&request_policy(true, 10));
        assert_eq!(counter.can_retry("unknown"), Err(RetryLimit::PerInvocation));
    }
}
