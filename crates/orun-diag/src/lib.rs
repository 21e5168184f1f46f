mod error;
pub use error::DiagError;

pub mod monitor;
pub use monitor::{BackgroundMonitor, MonitorHandle};

pub mod snapshot;
pub use snapshot::{SnapshotPhase, SnapshotProbe};

pub mod postmortem;
pub use postmortem::PostMortem;

mod manager;
pub use manager::{Diagnostics, DiagnosticsConfig, JobExit, JobHooks};

mod signal;
pub use signal::TerminationWatch;

pub mod report;
