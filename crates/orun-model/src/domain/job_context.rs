use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Flag, JobId, UnixSeconds};

/// Snapshot of the job as granted by the platform at submission time.
///
/// Built once before anything is launched and read-only afterwards.
/// Every component receives it by shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    /// Platform job identifier.
    pub job_id: JobId,
    /// Human readable job name, used to key log files.
    pub job_name: String,
    /// Number of nodes in the allocation.
    pub nodes: u32,
    /// Worker processes per node.
    pub tasks_per_node: u32,
    /// Index of the node this orchestrator runs on.
    pub node_index: u32,
    /// Partition the job was submitted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// Reservation the job runs in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<String>,
    /// Expanded host names of the allocation, in platform order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodelist: Vec<String>,
    /// Wrap workers with the debug entrypoint.
    #[serde(default)]
    pub debug_mode: Flag,
    /// Tail the kernel log on every node for the lifetime of the job.
    #[serde(default)]
    pub kernel_log_monitor: Flag,
    /// Take resource snapshots around the launch.
    #[serde(default)]
    pub memory_snapshot: Flag,
    /// Wall-clock limit of the allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<Duration>,
    /// Allocation start, if the platform reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<UnixSeconds>,
    /// Allocation end, if the platform reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<UnixSeconds>,
    /// Appended to the collective launch command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_launch_args: Vec<String>,
    /// Appended to the worker command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_entrypoint_args: Vec<String>,
}

impl JobContext {
    /// Minimal single-node context; everything optional is left empty.
    pub fn new(job_id: impl Into<JobId>, nodes: u32, tasks_per_node: u32) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: "orun".to_string(),
            nodes,
            tasks_per_node,
            node_index: 0,
            partition: None,
            reservation: None,
            nodelist: Vec::new(),
            debug_mode: Flag::OFF,
            kernel_log_monitor: Flag::OFF,
            memory_snapshot: Flag::OFF,
            time_limit: None,
            start_time: None,
            end_time: None,
            extra_launch_args: Vec::new(),
            extra_entrypoint_args: Vec::new(),
        }
    }

    pub fn with_reservation(mut self, reservation: impl Into<String>) -> Self {
        self.reservation = Some(reservation.into());
        self
    }

    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = Flag::new(enabled);
        self
    }

    pub fn with_nodelist(mut self, nodes: Vec<String>) -> Self {
        self.nodelist = nodes;
        self
    }

    /// Total rank count across the allocation.
    #[inline]
    pub fn world_size(&self) -> u32 {
        self.nodes.saturating_mul(self.tasks_per_node)
    }

    /// Host used as the rendezvous address for collective initialization.
    pub fn master_node(&self) -> Option<&str> {
        self.nodelist.first().map(String::as_str)
    }

    /// End of the allocation window, if it can be determined.
    pub fn deadline(&self) -> Option<UnixSeconds> {
        if let Some(end) = self.end_time {
            return Some(end);
        }
        match (self.start_time, self.time_limit) {
            (Some(start), Some(limit)) => {
                let limit = i64::try_from(limit.as_secs()).unwrap_or(i64::MAX);
                Some(start.saturating_add(limit))
            }
            _ => None,
        }
    }

    /// Wall-clock time left in the allocation at `now`; zero once the window has closed.
    pub fn remaining_at(&self, now: UnixSeconds) -> Option<Duration> {
        self.deadline()
            .map(|end| Duration::from_secs(end.saturating_sub(now).max(0) as u64))
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_id.trim().is_empty() {
            return Err(ConfigError::MissingField("job id"));
        }
        if self.nodes == 0 {
            return Err(ConfigError::invalid("nodes", "0", "must be at least 1"));
        }
        if self.tasks_per_node == 0 {
            return Err(ConfigError::invalid(
                "tasks per node",
                "0",
                "must be at least 1",
            ));
        }
        if self.node_index >= self.nodes {
            return Err(ConfigError::invalid(
                "node index",
                self.node_index.to_string(),
                format!("must be below node count {}", self.nodes),
            ));
        }
        if !self.nodelist.is_empty() && self.nodelist.len() != self.nodes as usize {
            return Err(ConfigError::InvalidNodelist(format!(
                "{} hosts listed for {} nodes",
                self.nodelist.len(),
                self.nodes
            )));
        }
        Ok(())
    }
}
