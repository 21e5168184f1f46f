use serde::{Deserialize, Serialize};

/// Diagnostic collector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorKind {
    /// Background kernel-log tail, one collector per node.
    KernelLog,
    /// Point-in-time resource snapshot, run synchronously.
    ResourceSnapshot,
}

impl MonitorKind {
    /// Short symbolic identifier used in logs and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::KernelLog => "kernel-log",
            MonitorKind::ResourceSnapshot => "resource-snapshot",
        }
    }
}

/// Lifecycle state of a background monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorState {
    /// Enable flag is off; every operation is a no-op.
    Disabled,
    /// Spawn in progress.
    Starting,
    /// Collector process is alive and owned by the manager.
    Running,
    /// Collector was stopped or confirmed dead.
    Stopped,
    /// Collector could not be started; the job runs without it.
    Failed,
}

impl MonitorState {
    /// Returns `true` if a live process may be attached to this state.
    pub fn is_live(&self) -> bool {
        matches!(self, MonitorState::Starting | MonitorState::Running)
    }

    /// Returns `true` if no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorState::Disabled | MonitorState::Stopped | MonitorState::Failed
        )
    }
}
