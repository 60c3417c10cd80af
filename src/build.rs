//! Structured progress publication.
//!
//! The core never talks to a concrete build UI directly: it mutates an
//! in-memory step tree and asks a [`BuildSender`] to publish it. The sender
//! is defined entirely by the embedding caller.

use std::collections::HashMap;

use async_trait::async_trait;

/// Publishes the current in-memory build record to whatever host the
/// caller has wired up. Takes no arguments: the record it publishes is the
/// one owned by the [`BuildUpdater`] that calls it.
#[async_trait]
pub trait BuildSender: Send + Sync {
    async fn publish(&self);
}

/// A sender that discards every publish. Useful for tests that don't care
/// about progress output.
pub struct NullSender;

#[async_trait]
impl BuildSender for NullSender {
    async fn publish(&self) {}
}

/// One invocation's progress within a request step.
#[derive(Debug, Clone, Default)]
pub struct InvocationStep {
    pub invocation_id: String,
    /// `(attempt_index, url)` pairs, oldest first; the summary is rebuilt
    /// from this list on every new attempt, never mutated in place.
    links: Vec<(u32, String)>,
}

impl InvocationStep {
    fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            links: Vec::new(),
        }
    }

    pub fn record_attempt(&mut self, index: u32, url: String) {
        self.links.push((index, url));
    }

    /// Renders the step summary: a link to the latest attempt followed by
    /// numbered links to every attempt, oldest first. Append-only: no
    /// rendered link is ever removed once added.
    pub fn summary(&self) -> String {
        let Some((_, latest_url)) = self.links.last() else {
            return String::new();
        };
        let mut out = format!("[latest attempt]({latest_url})");
        for (index, url) in &self.links {
            out.push_str(&format!(" [{index}]({url})"));
        }
        out
    }
}

/// One request's progress: a named step containing one sub-step per
/// invocation.
pub struct RequestStep {
    pub tag: String,
    pub invocations: HashMap<String, InvocationStep>,
    closed: bool,
}

impl RequestStep {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            invocations: HashMap::new(),
            closed: false,
        }
    }

    /// Idempotent: calling this more than once is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Owns the in-memory step tree and drives a [`BuildSender`].
///
/// The tree holds only immutable snapshots (attempt index, url, invocation
/// id) passed in by callers; it never stores a pointer back into core
/// orchestration state, so no cycle between the build record and the
/// request/invocation state machines can form.
pub struct BuildUpdater<S: BuildSender> {
    sender: S,
    requests: HashMap<String, RequestStep>,
}

impl<S: BuildSender> BuildUpdater<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            requests: HashMap::new(),
        }
    }

    /// Opens a request step and one invocation sub-step per id, if not
    /// already open.
    pub fn open_request(&mut self, tag: &str, invocation_ids: impl IntoIterator<Item = String>) {
        let step = self
            .requests
            .entry(tag.to_string())
            .or_insert_with(|| RequestStep::new(tag));
        for id in invocation_ids {
            step.invocations
                .entry(id.clone())
                .or_insert_with(|| InvocationStep::new(id));
        }
    }

    /// Appends a new attempt link to an invocation's step.
    pub fn record_attempt(&mut self, tag: &str, invocation_id: &str, index: u32, url: String) {
        if let Some(step) = self.requests.get_mut(tag) {
            step.invocations
                .entry(invocation_id.to_string())
                .or_insert_with(|| InvocationStep::new(invocation_id))
                .record_attempt(index, url);
        }
    }

    pub fn close_request(&mut self, tag: &str) {
        if let Some(step) = self.requests.get_mut(tag) {
            step.close();
        }
    }

    pub fn request(&self, tag: &str) -> Option<&RequestStep> {
        self.requests.get(tag)
    }

    /// Publishes the current snapshot through the configured sender.
    pub async fn publish(&self) {
        self.sender.publish().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_summary_is_append_only() {
        let mut step = InvocationStep::new("inv-1");
        assert_eq!(step.summary(), "");

        step.record_attempt(0, "https://task/0".to_string());
        assert_eq!(step.summary(), "[latest attempt](https://task/0) [0](https://task/0)");

        step.record_attempt(1, "https://task/1".to_string());
        assert_eq!(
            step.summary(),
            "[latest attempt](https://task/1) [0](https://task/0) [1](https://task/1)"
        );
    }

    #[test]
    fn close_is_idempotent() {
        let mut step = RequestStep::new("req-1");
        assert!(!step.is_closed());
        step.close();
        step.close();
        assert!(step.is_closed());
    }

    #[tokio::test]
    async fn open_request_creates_invocation_steps() {
        let mut updater = BuildUpdater::new(NullSender);
        updater.open_request("req-1", ["inv-1".to_string(), "inv-2".to_string()]);
        let req = updater.request("req-1").unwrap();
        assert_eq!(req.invocations.len(), 2);
    }
}
