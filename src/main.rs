//! labrunner demo CLI.
//!
//! This binary is a thin demonstration harness, not the orchestrator's
//! real front-end: a production deployment wires `Runner` up to a real
//! `TaskRunnerClient`/`BuildSender` pair and a full request decoder, both
//! outside this crate's scope. Here we run a single scripted invocation
//! against the in-memory test doubles so the crate is runnable out of the
//! box.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use labrunner::config::{self, RunnerConfig};
use labrunner::model::{
    Environment, HardwareAttributes, Invocation, InvocationRetryPolicy, ManagedPool, Pool,
    RequestParams, RequestRetryPolicy, Scheduling, SoftwareAttributes,
};
use labrunner::runner::{ExecuteRequest, Runner};
use labrunner::testutil::{RecordingSender, ScriptedClient};

#[derive(Parser)]
#[command(name = "labrunner")]
#[command(about = "Demonstration harness for the test-execution orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Optional runner config file (see RunnerConfig for the schema).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Name of the invocation to run against the scripted client.
    #[arg(short, long, default_value = "demo-test")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runner_config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => RunnerConfig::default().with_poll_interval(std::time::Duration::from_millis(50)),
    };

    let client = ScriptedClient::new(true);
    client.push_script(
        &cli.name,
        vec![labrunner::testutil::ScriptedFetch {
            lifecycle: labrunner::model::Lifecycle::Completed,
            verdict: Some(labrunner::model::Verdict::Passed),
        }],
    );
    let sender = RecordingSender::new();
    let mut runner = Runner::new(client, sender, runner_config);

    let invocation = Invocation {
        id: cli.name.clone(),
        display_name: Some(cli.name.clone()),
        environment: Environment::Client,
        dependencies: Vec::new(),
        result_keyvals: HashMap::new(),
        retry: InvocationRetryPolicy {
            allow: false,
            max: 0,
        },
        test_args: Vec::new(),
    };
    let params = RequestParams {
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
            allow: false,
            max: 0,
        },
        max_duration: std::time::Duration::from_secs(60),
        decorations: HashMap::new(),
        tags: Vec::new(),
        freeform_dimensions: HashMap::new(),
        tracking_issue: None,
    };
    let request = ExecuteRequest {
        tag: "demo".to_string(),
        params,
        invocations: vec![invocation],
        deadline: None,
    };

    info!("running demo request against the scripted client");
    let responses = runner
        .run(
            vec![request],
            "demo-build",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await?;

    for (tag, response) in &responses {
        println!(
            "request {tag}: lifecycle={:?} verdict={:?}",
            response.lifecycle, response.verdict
        );
        for result in &response.consolidated {
            println!(
                "  {} -> lifecycle={:?} verdict={:?}",
                result.invocation_id, result.lifecycle, result.verdict
            );
        }
    }

    Ok(())
}
