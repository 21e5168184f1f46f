mod kv;
pub use kv::KeyValue;

mod worker_env;
pub use worker_env::WorkerEnv;

mod flag;
pub use flag::Flag;

mod constants;
pub use constants::*;

mod job_context;
pub use job_context::JobContext;

mod rank;
pub use rank::RankIdentity;

/// Unix timestamp in seconds, as reported by the platform.
pub type UnixSeconds = i64;

/// Job identifier assigned by the platform.
pub type JobId = String;
