//! Environment variable names exported to worker processes.

pub const ENV_RANK: &str = "RANK";
pub const ENV_WORLD_SIZE: &str = "WORLD_SIZE";
pub const ENV_LOCAL_RANK: &str = "LOCAL_RANK";
pub const ENV_LOCAL_WORLD_SIZE: &str = "LOCAL_WORLD_SIZE";
pub const ENV_NODE_RANK: &str = "NODE_RANK";

pub const ENV_MASTER_ADDR: &str = "MASTER_ADDR";
pub const ENV_MASTER_PORT: &str = "MASTER_PORT";

pub const ENV_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const ENV_ENTRYPOINT: &str = "ORUN_ENTRYPOINT";

pub const ENV_LEARNING_RATE: &str = "LEARNING_RATE";
pub const ENV_WARMUP_STEPS: &str = "WARMUP_STEPS";
pub const ENV_LR_MILESTONES: &str = "LR_MILESTONES";
pub const ENV_LR_DECAY: &str = "LR_DECAY";
pub const ENV_GLOBAL_BATCH_SIZE: &str = "GLOBAL_BATCH_SIZE";
pub const ENV_LOCAL_BATCH_SIZE: &str = "LOCAL_BATCH_SIZE";

/// Default rendezvous port for collective initialization.
pub const DEFAULT_MASTER_PORT: u16 = 29500;
