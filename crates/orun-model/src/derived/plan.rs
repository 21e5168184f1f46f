use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ENV_ENTRYPOINT, ENV_LIBRARY_PATH, WorkerEnv};

/// Container runtime environment resolved for the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentPlan {
    /// Library search path exported to every worker.
    pub library_path: String,
    /// Script that wraps the worker command; absent outside debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<PathBuf>,
}

impl EnvironmentPlan {
    /// Plan entries as worker environment.
    pub fn to_env(&self) -> WorkerEnv {
        let mut env = WorkerEnv::single(ENV_LIBRARY_PATH, self.library_path.clone());
        if let Some(entrypoint) = &self.entrypoint {
            env.push(ENV_ENTRYPOINT, entrypoint.to_string_lossy());
        }
        env
    }
}
