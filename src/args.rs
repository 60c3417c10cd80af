//! Resolves an invocation plus request parameters into task-runner
//! arguments, or rejects it with the offending dependency fields.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::error::ArgsError;
use crate::model::{Invocation, Pool, RequestParams};

/// Platform-wide configuration for args generation: constant across
/// requests, unlike `RequestParams` which is per-request.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub luci_project: String,
    pub logdog_host: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            luci_project: "cros".to_string(),
            logdog_host: "logs.chromium.org".to_string(),
        }
    }
}

/// Context describing where in the build hierarchy a set of tasks is being
/// launched from.
#[derive(Debug, Clone)]
pub struct ParentingContext {
    pub parent_build_id: String,
    pub parent_task_id: String,
    pub request_uid: String,
    /// Absolute deadline for the parent build; no attempt launched under
    /// this context should be given a timeout past it.
    pub deadline: DateTime<Utc>,
}

/// Fully-resolved arguments ready to hand to
/// [`TaskRunnerClient::launch_task`](crate::client::TaskRunnerClient::launch_task).
#[derive(Debug, Clone)]
pub struct TaskArgs {
    pub task_name: String,
    pub client_test: bool,
    pub test_args: Vec<String>,
    pub keyvals: HashMap<String, String>,
    /// Logdog annotation stream URL for this attempt's command record.
    /// Generated fresh on every call to [`generate`] so that, per attempt,
    /// it is unique even when every other input is unchanged (a retry of
    /// the same invocation still gets its own stream).
    pub logdog_url: String,
    pub dimensions: HashMap<String, String>,
    pub provisionable_dimensions: HashMap<String, String>,
    pub parent_task_id: String,
    pub parent_request_uid: String,
    pub priority: Option<i32>,
    pub tags: Vec<String>,
    /// Absolute per-attempt timeout: `now + request.max_duration`, clamped
    /// to the parenting context's deadline, whichever comes first.
    pub timeout: DateTime<Utc>,
}

const RECOGNIZED_LABEL_PREFIXES: &[&str] = &["board", "model", "cr50"];
const IGNORED_LABEL_PREFIXES: &[&str] = &["label"];

/// Turns one invocation into resolved task arguments.
///
/// Returns `Err(ArgsError::InvalidDependencies)` when the invocation's
/// dependency labels conflict with the request's software/hardware
/// attributes, or carry an unrecognized label the platform cannot
/// schedule on.
///
/// Called fresh for every attempt, including retries: the logdog URL and
/// absolute timeout are derived from the moment of the call, not cached
/// from the invocation's first attempt.
pub fn generate(
    invocation: &Invocation,
    request: &RequestParams,
    worker: &WorkerConfig,
    parenting: &ParentingContext,
) -> Result<TaskArgs, ArgsError> {
    for dep in &invocation.dependencies {
        let Some((prefix, value)) = dep.split_once(':') else {
            continue;
        };
        match prefix {
            "board" => {
                if let Some(target) = &request.software.build_target {
                    if target != value {
                        return Err(ArgsError::InvalidDependencies {
                            invocation: invocation.id.clone(),
                            field: "board".to_string(),
                            detail: format!(
                                "invocation requires board:{value} but request build target is {target}"
                            ),
                        });
                    }
                }
            }
            "model" => {
                if let Some(model) = &request.hardware.model {
                    if model != value {
                        return Err(ArgsError::InvalidDependencies {
                            invocation: invocation.id.clone(),
                            field: "model".to_string(),
                            detail: format!(
                                "invocation requires model:{value} but request model is {model}"
                            ),
                        });
                    }
                }
            }
            other
                if !RECOGNIZED_LABEL_PREFIXES.contains(&other)
                    && !IGNORED_LABEL_PREFIXES.contains(&other) =>
            {
                return Err(ArgsError::InvalidDependencies {
                    invocation: invocation.id.clone(),
                    field: "dependencies".to_string(),
                    detail: format!("unrecognized dependency label: {dep}"),
                });
            }
            _ => {}
        }
    }

    let dimensions = dimensions_from(invocation, request);
    let provisionable_dimensions = provisionable_dimensions(request);
    let keyvals = keyvals_for(invocation, request, parenting);
    let logdog_url = format!(
        "https://{}/logs/{}/{}",
        worker.logdog_host,
        worker.luci_project,
        Uuid::new_v4()
    );

    let mut tags = request.tags.clone();
    tags.push(format!("parent_buildbucket_id:{}", parenting.parent_build_id));
    tags.push(format!("luci_project:{}", worker.luci_project));
    tags.push(format!("log_location:{logdog_url}+/annotations"));
    if let Some(qs_account) = &request.scheduling.qs_account {
        tags.push(format!("qs_account:{qs_account}"));
    }
    for (k, v) in &request.decorations {
        tags.push(format!("{k}:{v}"));
    }

    let requested_deadline = Utc::now()
        + ChronoDuration::from_std(request.max_duration).unwrap_or_else(|_| ChronoDuration::zero());
    let timeout = requested_deadline.min(parenting.deadline);

    Ok(TaskArgs {
        task_name: invocation
            .display_name
            .clone()
            .unwrap_or_else(|| invocation.id.clone()),
        client_test: invocation.environment == crate::model::Environment::Client,
        test_args: invocation.test_args.clone(),
        keyvals,
        logdog_url,
        dimensions,
        provisionable_dimensions,
        parent_task_id: parenting.parent_task_id.clone(),
        parent_request_uid: parenting.request_uid.clone(),
        priority: request.scheduling.priority,
        tags,
        timeout,
    })
}

fn dimensions_from(
    invocation: &Invocation,
    request: &RequestParams,
) -> HashMap<String, String> {
    let mut dims = request.freeform_dimensions.clone();
    if let Some(target) = &request.software.build_target {
        dims.insert("label-board".to_string(), target.clone());
    }
    if let Some(model) = &request.hardware.model {
        dims.insert("label-model".to_string(), model.clone());
    }
    match &request.scheduling.pool {
        Pool::Managed { pool } => {
            dims.insert("label-pool".to_string(), format!("{pool:?}").to_lowercase());
        }
        Pool::Unmanaged { name } => {
            dims.insert("label-pool".to_string(), name.clone());
        }
    }
    for dep in &invocation.dependencies {
        if let Some((prefix, value)) = dep.split_once(':') {
            if prefix == "cr50" {
                dims.insert("label-cr50-phase".to_string(), value.to_string());
            }
        }
    }
    dims
}

fn provisionable_dimensions(request: &RequestParams) -> HashMap<String, String> {
    let mut dims = HashMap::new();
    if let Some(build) = &request.software.chromeos_build {
        dims.insert(
            "provisionable-cros-version".to_string(),
            build.clone(),
        );
    }
    if let Some(build) = &request.software.ro_firmware_build {
        dims.insert(
            "provisionable-fwro-version".to_string(),
            build.clone(),
        );
    }
    if let Some(build) = &request.software.rw_firmware_build {
        dims.insert(
            "provisionable-fwrw-version".to_string(),
            build.clone(),
        );
    }
    dims
}

fn keyvals_for(
    invocation: &Invocation,
    request: &RequestParams,
    parenting: &ParentingContext,
) -> HashMap<String, String> {
    let mut keyvals = request.decorations.clone();
    for (k, v) in &invocation.result_keyvals {
        keyvals.entry(k.clone()).or_insert_with(|| v.clone());
    }
    if !parenting.parent_task_id.is_empty() {
        keyvals.insert("parent_job_id".to_string(), parenting.parent_task_id.clone());
    }
    let label = invocation.display_name.clone().unwrap_or_else(|| {
        let suite = keyvals
            .get("suite")
            .cloned()
            .unwrap_or_else(|| "cros_test_platform".to_string());
        match &request.software.chromeos_build {
            Some(build) => format!("{build}/{suite}/{}", invocation.id),
            None => invocation.id.clone(),
        }
    });
    keyvals.insert("label".to_string(), label);
    keyvals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Environment, HardwareAttributes, InvocationRetryPolicy, ManagedPool, RequestRetryPolicy,
        Scheduling, SoftwareAttributes,
    };
    use std::time::Duration;

    fn base_request() -> RequestParams {
        RequestParams {
            software: SoftwareAttributes {
                build_target: Some("eve".to_string()),
                chromeos_build: Some("eve-release/R100".to_string()),
                ro_firmware_build: None,
                rw_firmware_build: None,
            },
            hardware: HardwareAttributes {
                model: Some("eve".to_string()),
            },
            scheduling: Scheduling {
                pool: Pool::Managed {
                    pool: ManagedPool::Cq,
                },
                priority: Some(50),
                qs_account: None,
            },
            retry: RequestRetryPolicy {
                allow: true,
                max: 1,
            },
            max_duration: Duration::from_secs(3600),
            decorations: HashMap::new(),
            tags: Vec::new(),
            freeform_dimensions: HashMap::new(),
            tracking_issue: None,
        }
    }

    fn base_invocation() -> Invocation {
        Invocation {
            id: "inv-1".to_string(),
            display_name: None,
            environment: Environment::Client,
            dependencies: vec!["board:eve".to_string(), "model:eve".to_string()],
            result_keyvals: HashMap::new(),
            retry: InvocationRetryPolicy {
                allow: true,
                max: 1,
            },
            test_args: Vec::new(),
        }
    }

    fn worker() -> WorkerConfig {
        WorkerConfig::default()
    }

    fn parenting() -> ParentingContext {
        ParentingContext {
            parent_build_id: "123".to_string(),
            parent_task_id: "456".to_string(),
            request_uid: "req-1".to_string(),
            deadline: Utc::now() + ChronoDuration::hours(4),
        }
    }

    #[test]
    fn generates_args_for_matching_dependencies() {
        let args = generate(&base_invocation(), &base_request(), &worker(), &parenting()).unwrap();
        assert_eq!(args.dimensions["label-board"], "eve");
        assert_eq!(args.dimensions["label-model"], "eve");
        assert_eq!(
            args.keyvals["label"],
            "eve-release/R100/cros_test_platform/inv-1"
        );
        assert_eq!(args.keyvals["parent_job_id"], "456");
    }

    #[test]
    fn rejects_board_conflict() {
        let mut invocation = base_invocation();
        invocation.dependencies = vec!["board:kevin".to_string()];
        let err = generate(&invocation, &base_request(), &worker(), &parenting()).unwrap_err();
        assert!(matches!(err, ArgsError::InvalidDependencies { field, .. } if field == "board"));
    }

    #[test]
    fn rejects_unrecognized_label() {
        let mut invocation = base_invocation();
        invocation.dependencies = vec!["freeform-key:freeform-value".to_string()];
        let err = generate(&invocation, &base_request(), &worker(), &parenting()).unwrap_err();
        assert!(matches!(err, ArgsError::InvalidDependencies { .. }));
    }

    #[test]
    fn label_falls_back_to_suite_and_build() {
        let mut invocation = base_invocation();
        invocation.result_keyvals.insert("suite".to_string(), "bvt".to_string());
        let args = generate(&invocation, &base_request(), &worker(), &parenting()).unwrap();
        assert_eq!(args.keyvals["label"], "eve-release/R100/bvt/inv-1");
    }

    #[test]
    fn tags_include_log_location_pointing_at_the_logdog_url() {
        let args = generate(&base_invocation(), &base_request(), &worker(), &parenting()).unwrap();
        let expected = format!("log_location:{}+/annotations", args.logdog_url);
        assert!(args.tags.contains(&expected));
    }

    #[test]
    fn logdog_url_is_unique_across_calls() {
        let first = generate(&base_invocation(), &base_request(), &worker(), &parenting()).unwrap();
        let second = generate(&base_invocation(), &base_request(), &worker(), &parenting()).unwrap();
        assert_ne!(first.logdog_url, second.logdog_url);
    }

    #[test]
    fn timeout_is_clamped_to_the_parenting_deadline() {
        let mut ctx = parenting();
        ctx.deadline = Utc::now() + ChronoDuration::seconds(10);
        let args = generate(&base_invocation(), &base_request(), &worker(), &ctx).unwrap();
        assert_eq!(args.timeout, ctx.deadline);
    }
}
