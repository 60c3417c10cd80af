//! # labrunner
//!
//! A test-execution orchestrator for a distributed hardware-lab test
//! platform. Clients submit a request made of one or more test
//! invocations; the orchestrator drives each invocation through a remote
//! task-runner backend, retries it under a configurable budget, and
//! publishes live progress to a build record.
//!
//! ## Architecture
//!
//! The crate is organized around the request-level state engine and the
//! driver that polls it:
//!
//! ### Data model ([`model`])
//!
//! [`model::Invocation`], [`model::RequestParams`], [`model::Attempt`] and
//! [`model::InvocationResponse`] describe one test, one request's
//! parameters, one execution of a test, and the accumulated chain of
//! executions for a test, respectively.
//!
//! ### Args and validation ([`args`], [`validate`])
//!
//! [`args::generate`] resolves an invocation into task-runner arguments or
//! rejects it with the conflicting dependency; [`validate::validate`] then
//! asks the backend whether any bot can actually run it.
//!
//! ### Retry budgeting ([`retry`])
//!
//! [`retry::RetryCounter`] enforces both a per-invocation and a
//! request-wide cap on retries.
//!
//! ### Request state engine ([`request`])
//!
//! [`request::RequestTaskSet`] owns one request's invocations end to end:
//! initial launch, per-cycle advancement, and retry decisions.
//!
//! ### Driver ([`runner`])
//!
//! [`runner::Runner`] polls every request's task set at a fixed cadence
//! until all are terminal or the caller cancels.
//!
//! ### Progress publication ([`build`])
//!
//! [`build::BuildUpdater`] mutates an in-memory step tree and asks a
//! [`build::BuildSender`] to publish it after every pass.
//!
//! ### External interfaces ([`client`])
//!
//! [`client::TaskRunnerClient`] is the only way the core talks to the
//! remote backend that actually schedules tasks onto devices.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use tokio_util::sync::CancellationToken;
//!
//! use labrunner::config::RunnerConfig;
//! use labrunner::model::{
//!     Environment, HardwareAttributes, InvocationRetryPolicy, ManagedPool, Pool,
//!     RequestRetryPolicy, Scheduling, SoftwareAttributes,
//! };
//! use labrunner::model::{Invocation, RequestParams};
//! use labrunner::runner::{ExecuteRequest, Runner};
//! use labrunner::testutil::{RecordingSender, ScriptedClient};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = ScriptedClient::new(true);
//! let sender = RecordingSender::new();
//! let mut runner = Runner::new(client, sender, RunnerConfig::default());
//!
//! let invocation = Invocation {
//!     id: "inv-1".to_string(),
//!     display_name: Some("inv-1".to_string()),
//!     environment: Environment::Client,
//!     dependencies: Vec::new(),
//!     result_keyvals: HashMap::new(),
//!     retry: InvocationRetryPolicy { allow: false, max: 0 },
//!     test_args: Vec::new(),
//! };
//! let params = RequestParams {
//!     software: SoftwareAttributes::default(),
//!     hardware: HardwareAttributes::default(),
//!     scheduling: Scheduling {
//!         pool: Pool::Managed { pool: ManagedPool::Cq },
//!         priority: Some(0),
//!         qs_account: None,
//!     },
//!     retry: RequestRetryPolicy { allow: false, max: 0 },
//!     max_duration: std::time::Duration::from_secs(60),
//!     decorations: HashMap::new(),
//!     tags: Vec::new(),
//!     freeform_dimensions: HashMap::new(),
//!     tracking_issue: None,
//! };
//! let request = ExecuteRequest {
//!     tag: "req-1".to_string(),
//!     params,
//!     invocations: vec![invocation],
//!     deadline: None,
//! };
//! let _responses = runner.run(vec![request], "build-1", &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod build;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod request;
pub mod retry;
pub mod runner;
pub mod validate;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::RunnerConfig;
pub use error::RunError;
pub use model::{Invocation, InvocationResponse, RequestParams};
pub use runner::{ConsolidatedResult, ExecuteRequest, ExecuteResponse, Runner, TaskResult};
