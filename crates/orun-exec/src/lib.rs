mod error;
pub use error::ExecError;

pub mod group;
pub use group::{GroupOutcome, MemberExit, WorkerGroup};

pub mod proc;
pub use proc::{Output, ProcConfig};

pub mod util;

