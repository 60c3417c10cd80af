//! Top-level driver: launches every request's invocations, then polls all
//! of them at a fixed cadence until every request is terminal or the
//! caller cancels.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::{ParentingContext, WorkerConfig};
use crate::build::{BuildSender, BuildUpdater};
use crate::client::TaskRunnerClient;
use crate::config::RunnerConfig;
use crate::error::RunError;
use crate::model::{Invocation, Lifecycle, RequestParams, Verdict};
use crate::request::RequestTaskSet;

/// One request submitted to the orchestrator.
pub struct ExecuteRequest {
    pub tag: String,
    pub params: RequestParams,
    pub invocations: Vec<Invocation>,
    /// Absolute deadline for the whole request; defaults to
    /// `now + config.default_attempt_timeout()` when unset.
    pub deadline: Option<DateTime<Utc>>,
}

/// One attempt's result, as recorded against a single invocation.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub invocation_id: String,
    pub attempt_index: u32,
    pub lifecycle: Lifecycle,
    pub verdict: Verdict,
    pub url: Option<String>,
}

/// One invocation's overall outcome, derived from its full attempt chain.
#[derive(Debug, Clone)]
pub struct ConsolidatedResult {
    pub invocation_id: String,
    pub lifecycle: Lifecycle,
    pub verdict: Verdict,
    pub rejected_dimensions: HashMap<String, String>,
}

/// Consolidated outcome for one request.
#[derive(Debug, Clone)]
pub struct ExecuteResponse {
    pub tag: String,
    /// Every attempt ever launched, across every invocation.
    pub results: Vec<TaskResult>,
    /// One entry per invocation, grouping its attempts into a final
    /// lifecycle/verdict.
    pub consolidated: Vec<ConsolidatedResult>,
    pub lifecycle: Lifecycle,
    pub verdict: Verdict,
}

/// Drives every `RequestTaskSet` to completion.
pub struct Runner<C: TaskRunnerClient, S: BuildSender> {
    client: C,
    build: BuildUpdater<S>,
    config: RunnerConfig,
}

impl<C: TaskRunnerClient, S: BuildSender> Runner<C, S> {
    pub fn new(client: C, sender: S, config: RunnerConfig) -> Self {
        Self {
            client,
            build: BuildUpdater::new(sender),
            config,
        }
    }

    /// Runs every request to completion (or until `cancel` fires),
    /// returning one [`ExecuteResponse`] per request tag.
    pub async fn run(
        &mut self,
        requests: Vec<ExecuteRequest>,
        build_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, ExecuteResponse>, RunError> {
        let mut sets = Vec::with_capacity(requests.len());

        for request in requests {
            let deadline = request.deadline.unwrap_or_else(|| {
                let fallback = ChronoDuration::from_std(self.config.default_attempt_timeout())
                    .unwrap_or_else(|_| ChronoDuration::zero());
                Utc::now() + fallback
            });
            let parenting = ParentingContext {
                parent_build_id: build_id.to_string(),
                parent_task_id: String::new(),
                request_uid: request.tag.clone(),
                deadline,
            };

            let (set, outcomes) = RequestTaskSet::new(
                request.tag.clone(),
                &request.invocations,
                request.params,
                self.config.worker(),
                parenting,
                &self.client,
            )
            .await
            .map_err(|e| {
                if is_structural(&e) {
                    RunError::StructuralRequest(e.to_string())
                } else {
                    RunError::Launch(e)
                }
            })?;

            self.build.open_request(
                &set.tag,
                request.invocations.iter().map(|i| i.id.clone()),
            );
            for outcome in outcomes {
                if !outcome.rejected {
                    if let Some(url) = outcome.attempt_url {
                        self.build.record_attempt(&set.tag, &outcome.invocation_id, 0, url);
                    }
                }
            }
            sets.push(set);
        }
        self.build.publish().await;

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.tick().await; // first tick fires immediately

        loop {
            if sets.iter().all(|s| s.is_done()) {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("run cancelled; leaving live tasks running");
                    for set in &mut sets {
                        set.abandon_live();
                    }
                    break;
                }
                _ = interval.tick() => {
                    for set in &mut sets {
                        if set.is_done() {
                            continue;
                        }
                        let new_attempts = set.advance(&self.client).await.map_err(RunError::Fetch)?;
                        for (invocation_id, index, url) in new_attempts {
                            self.build.record_attempt(&set.tag, &invocation_id, index, url);
                        }
                        if set.is_done() {
                            self.build.close_request(&set.tag);
                        }
                    }
                    self.build.publish().await;
                }
            }
        }

        self.build.publish().await;

        let mut responses = HashMap::new();
        for set in &sets {
            responses.insert(set.tag.clone(), synthesize(set, &self.client));
        }
        Ok(responses)
    }
}

/// A structural request error always comes from [`RequestTaskSet::new`]'s
/// upfront precondition check; all other `ClientError`s from that call are
/// transient launch failures.
fn is_structural(e: &crate::error::ClientError) -> bool {
    matches!(e, crate::error::ClientError::Structural(_))
}

fn synthesize(set: &RequestTaskSet, client: &dyn TaskRunnerClient) -> ExecuteResponse {
    let mut results = Vec::new();
    let mut consolidated = Vec::new();
    let mut any_live = false;

    for response in set.responses() {
        for attempt in &response.attempts {
            results.push(TaskResult {
                invocation_id: response.invocation_id.clone(),
                attempt_index: attempt.index,
                lifecycle: attempt.lifecycle,
                verdict: attempt.verdict,
                url: Some(client.url(&attempt.handle)),
            });
        }

        let last = response.latest_attempt();
        let lifecycle = if !response.runnable {
            Lifecycle::Rejected
        } else {
            match last {
                Some(a) if !a.is_terminal() => {
                    any_live = true;
                    Lifecycle::Running
                }
                Some(a) => a.lifecycle,
                None => Lifecycle::Pending,
            }
        };
        consolidated.push(ConsolidatedResult {
            invocation_id: response.invocation_id.clone(),
            lifecycle,
            verdict: response.overall_verdict(),
            rejected_dimensions: response.rejected_dimensions.clone(),
        });
    }

    let lifecycle = if any_live {
        Lifecycle::Aborted
    } else {
        Lifecycle::Completed
    };
    let verdict = if any_live {
        Verdict::Failed
    } else if consolidated.iter().all(|r| {
        matches!(
            r.verdict,
            Verdict::Passed | Verdict::PassedOnRetry | Verdict::NoVerdict
        )
    }) {
        Verdict::Passed
    } else {
        Verdict::Failed
    };

    if any_live {
        warn!(tag = %set.tag, "request left with live tasks at return");
    }

    ExecuteResponse {
        tag: set.tag.clone(),
        results,
        consolidated,
        lifecycle,
        verdict,
    }
}
