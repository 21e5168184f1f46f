use serde::{Deserialize, Serialize};

use crate::{
    ENV_LOCAL_RANK, ENV_LOCAL_WORLD_SIZE, ENV_NODE_RANK, ENV_RANK, ENV_WORLD_SIZE, WorkerEnv,
};

/// Position of one worker process within the distributed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankIdentity {
    pub rank: u32,
    pub world_size: u32,
    pub local_rank: u32,
    pub local_world_size: u32,
    pub node_rank: u32,
}

impl RankIdentity {
    /// Rank-specific environment entries.
    pub fn to_env(&self) -> WorkerEnv {
        WorkerEnv::new()
            .with(ENV_RANK, self.rank.to_string())
            .with(ENV_WORLD_SIZE, self.world_size.to_string())
            .with(ENV_LOCAL_RANK, self.local_rank.to_string())
            .with(ENV_LOCAL_WORLD_SIZE, self.local_world_size.to_string())
            .with(ENV_NODE_RANK, self.node_rank.to_string())
    }
}
