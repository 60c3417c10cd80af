//! Decides whether a resolved set of task arguments can actually be
//! scheduled on the available fleet.

use std::collections::HashMap;

use tracing::debug;

use crate::args::TaskArgs;
use crate::client::TaskRunnerClient;
use crate::error::ClientError;

/// Outcome of validating one invocation's resolved arguments.
pub struct Validation {
    pub runnable: bool,
    pub rejected_dimensions: HashMap<String, String>,
}

impl Validation {
    pub fn runnable() -> Self {
        Self {
            runnable: true,
            rejected_dimensions: HashMap::new(),
        }
    }

    pub fn rejected(dimensions: HashMap<String, String>) -> Self {
        Self {
            runnable: false,
            rejected_dimensions: dimensions,
        }
    }
}

/// Checks whether the fleet has at least one bot that can satisfy `args`'
/// static dimensions.
pub async fn validate(
    client: &dyn TaskRunnerClient,
    args: &TaskArgs,
) -> Result<Validation, ClientError> {
    let exists = client.bot_exists(&args.dimensions).await?;
    if exists {
        Ok(Validation::runnable())
    } else {
        debug!(dimensions = ?args.dimensions, "no capable bot found");
        Ok(Validation::rejected(args.dimensions.clone()))
    }
}
