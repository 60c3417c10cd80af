//! Per-request state engine: tracks every invocation's attempt chain,
//! launches initial attempts, and advances live tasks each poll cycle.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{info, warn};

use crate::args::{self, ParentingContext, WorkerConfig};
use crate::client::TaskRunnerClient;
use crate::error::{ArgsError, ClientError};
use crate::model::{
    Attempt, Invocation, InvocationResponse, Lifecycle, RequestParams, Verdict, needs_retry,
};
use crate::retry::{RetryCounter, RetryLimit};
use crate::validate;

/// One request's worth of invocations, mid-flight.
pub struct RequestTaskSet {
    pub tag: String,
    order: Vec<String>,
    responses: HashMap<String, InvocationResponse>,
    live: HashMap<String, crate::model::TaskHandle>,
    retry: RetryCounter,
    params: RequestParams,
    worker: WorkerConfig,
    parenting: ParentingContext,
    /// Input invocations, kept around so a retry can regenerate args fresh
    /// rather than reusing a stale logdog URL/timeout from an earlier
    /// attempt.
    invocations: HashMap<String, Invocation>,
}

/// One invocation's freshly-launched first attempt, or its immediate
/// rejection; used by [`RequestTaskSet::new`] to report which invocations
/// the caller should record progress for up front.
pub struct InitialOutcome {
    pub invocation_id: String,
    pub rejected: bool,
    pub attempt_url: Option<String>,
}

impl RequestTaskSet {
    /// Validates and launches the initial attempt for every invocation.
    ///
    /// A request whose `scheduling` sets both a `qs_account` and a
    /// non-zero `priority` is a structural error and is rejected outright,
    /// before any invocation is touched.
    pub async fn new(
        tag: String,
        invocations: &[Invocation],
        params: RequestParams,
        worker: WorkerConfig,
        parenting: ParentingContext,
        client: &dyn TaskRunnerClient,
    ) -> Result<(Self, Vec<InitialOutcome>), ClientError> {
        if params.scheduling.qs_account.is_some()
            && params.scheduling.priority.is_some_and(|p| p != 0)
        {
            return Err(ClientError::Structural(
                "qs_account and a non-zero priority cannot both be set".to_string(),
            ));
        }

        let mut retry = RetryCounter::new(&params.retry);
        let order: Vec<String> = invocations.iter().map(|i| i.id.clone()).collect();
        let mut responses = HashMap::new();
        let mut live = HashMap::new();
        let mut stored = HashMap::new();
        let mut outcomes = Vec::with_capacity(invocations.len());

        for invocation in invocations {
            retry.register(&invocation.id, &invocation.retry);
            stored.insert(invocation.id.clone(), invocation.clone());

            let task_args = match args::generate(invocation, &params, &worker, &parenting) {
                Ok(a) => a,
                Err(e) => {
                    warn!(invocation = %invocation.id, error = %e, "rejected: invalid dependencies");
                    let response = InvocationResponse::rejected(
                        invocation.id.clone(),
                        rejected_dimensions_for(&e),
                    );
                    outcomes.push(InitialOutcome {
                        invocation_id: invocation.id.clone(),
                        rejected: true,
                        attempt_url: None,
                    });
                    responses.insert(invocation.id.clone(), response);
                    continue;
                }
            };

            let validation = validate::validate(client, &task_args).await?;
            if !validation.runnable {
                info!(invocation = %invocation.id, "rejected: no capable bot");
                responses.insert(
                    invocation.id.clone(),
                    InvocationResponse::rejected(
                        invocation.id.clone(),
                        validation.rejected_dimensions,
                    ),
                );
                outcomes.push(InitialOutcome {
                    invocation_id: invocation.id.clone(),
                    rejected: true,
                    attempt_url: None,
                });
                continue;
            }

            let handle = client.launch_task(&task_args).await?;
            let url = handle.url.clone();
            let mut response = InvocationResponse::runnable(invocation.id.clone());
            response.push_attempt(Attempt {
                index: 0,
                handle: handle.clone(),
                lifecycle: Lifecycle::Running,
                verdict: Verdict::Unspecified,
            });
            responses.insert(invocation.id.clone(), response);
            live.insert(invocation.id.clone(), handle);
            outcomes.push(InitialOutcome {
                invocation_id: invocation.id.clone(),
                rejected: false,
                attempt_url: Some(url),
            });
        }

        Ok((
            Self {
                tag,
                order,
                responses,
                live,
                retry,
                params,
                worker,
                parenting,
                invocations: stored,
            },
            outcomes,
        ))
    }

    pub fn is_done(&self) -> bool {
        self.live.is_empty()
    }

    pub fn live_invocation_ids(&self) -> impl Iterator<Item = &String> {
        self.live.keys()
    }

    /// Fetches every live task's current state concurrently, then applies
    /// the results back in invocation-insertion order so retry decisions
    /// are deterministic regardless of which fetch resolved first.
    ///
    /// Returns the ids of invocations that just launched a fresh retry
    /// attempt, in order, so the caller can publish build updates for them.
    pub async fn advance(
        &mut self,
        client: &dyn TaskRunnerClient,
    ) -> Result<Vec<(String, u32, String)>, ClientError> {
        let ids: Vec<String> = self.order.iter().filter(|id| self.live.contains_key(*id)).cloned().collect();
        let fetches = join_all(ids.iter().map(|id| {
            let handle = self.live[id].clone();
            async move { client.fetch_result(&handle).await }
        }))
        .await;

        let mut new_attempts = Vec::new();

        for (id, fetched) in ids.into_iter().zip(fetches) {
            let fetched = fetched?;
            let Some(response) = self.responses.get_mut(&id) else {
                continue;
            };
            let Some(attempt) = response.latest_attempt_mut() else {
                continue;
            };
            attempt.lifecycle = fetched.lifecycle;
            if let Some(verdict) = fetched.verdict {
                attempt.verdict = verdict;
            }

            if !attempt.lifecycle.is_terminal() {
                continue;
            }

            let verdict = attempt.verdict;
            match needs_retry(verdict).then(|| self.retry.can_retry(&id)) {
                Some(Ok(())) => {
                    let next_index = response.attempts.len() as u32;
                    let task_args = self.relaunch_args(&id)?;
                    info!(invocation = %id, "Retrying {id}");
                    let handle = client.launch_task(&task_args).await?;
                    let url = handle.url.clone();
                    response.push_attempt(Attempt {
                        index: next_index,
                        handle: handle.clone(),
                        lifecycle: Lifecycle::Running,
                        verdict: Verdict::Unspecified,
                    });
                    self.live.insert(id.clone(), handle);
                    self.retry.notify_retry(&id);
                    new_attempts.push((id.clone(), next_index, url));
                }
                Some(Err(RetryLimit::Global)) => {
                    info!(invocation = %id, "Hit the task set retry limit");
                    self.live.remove(&id);
                }
                Some(Err(RetryLimit::PerInvocation)) | None => {
                    self.live.remove(&id);
                }
            }
        }

        Ok(new_attempts)
    }

    /// Marks every still-live invocation as aborted without touching its
    /// last observed lifecycle, for the cancellation path: a cancelled run
    /// returns its partial state rather than synthesizing a terminal one.
    pub fn abandon_live(&mut self) {
        self.live.clear();
    }

    fn relaunch_args(&self, invocation_id: &str) -> Result<crate::args::TaskArgs, ClientError> {
        let invocation = self
            .invocations
            .get(invocation_id)
            .ok_or_else(|| ClientError::Launch(format!("no invocation registered for {invocation_id}")))?;
        args::generate(invocation, &self.params, &self.worker, &self.parenting)
            .map_err(|e| ClientError::Launch(e.to_string()))
    }

    pub fn responses(&self) -> impl Iterator<Item = &InvocationResponse> {
        self.order.iter().filter_map(|id| self.responses.get(id))
    }

    pub fn ordered_ids(&self) -> &[String] {
        &self.order
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn parenting(&self) -> &ParentingContext {
        &self.parenting
    }
}

/// Maps an args-generation rejection to the single offending field/detail
/// pair, matching the shape a `BotExists` rejection's dimensions map
/// already carries.
fn rejected_dimensions_for(e: &ArgsError) -> HashMap<String, String> {
    match e {
        ArgsError::InvalidDependencies { field, detail, .. } => {
            HashMap::from([(field.clone(), detail.clone())])
        }
    }
}
