//! Loading the [`JobContext`] from platform metadata.
//!
//! Slurm publishes job metadata in `SLURM_*` variables; submission-time switches use `ORUN_*` overrides.
//! Required fields that are missing or malformed are configuration errors.
//! Switches never are: anything unrecognised reads as "off".
use std::time::Duration;

use orun_model::{ConfigError, Flag, JobContext};
use tracing::debug;

use crate::nodelist;

pub const VAR_JOB_ID: &str = "SLURM_JOB_ID";
pub const VAR_JOB_NAME: &str = "SLURM_JOB_NAME";
pub const VAR_NUM_NODES: &str = "SLURM_JOB_NUM_NODES";
pub const VAR_NNODES: &str = "SLURM_NNODES";
pub const VAR_TASKS_PER_NODE: &str = "SLURM_NTASKS_PER_NODE";
pub const VAR_NODE_ID: &str = "SLURM_NODEID";
pub const VAR_PARTITION: &str = "SLURM_JOB_PARTITION";
pub const VAR_RESERVATION: &str = "SLURM_JOB_RESERVATION";
pub const VAR_NODELIST: &str = "SLURM_JOB_NODELIST";
pub const VAR_START_TIME: &str = "SLURM_JOB_START_TIME";
pub const VAR_END_TIME: &str = "SLURM_JOB_END_TIME";

pub const VAR_TIME_LIMIT_MINUTES: &str = "ORUN_TIME_LIMIT_MINUTES";
pub const VAR_ENABLE_DEBUGGING: &str = "ORUN_ENABLE_DEBUGGING";
pub const VAR_ENABLE_KERNEL_LOG_MONITOR: &str = "ORUN_ENABLE_KERNEL_LOG_MONITOR";
pub const VAR_ENABLE_MEMORY_SNAPSHOT: &str = "ORUN_ENABLE_MEMORY_SNAPSHOT";
pub const VAR_EXTRA_LAUNCH_ARGS: &str = "ORUN_EXTRA_LAUNCH_ARGS";
pub const VAR_EXTRA_ENTRYPOINT_ARGS: &str = "ORUN_EXTRA_ENTRYPOINT_ARGS";

/// Build and validate a context from a variable lookup.
pub fn from_lookup<F>(lookup: F) -> Result<JobContext, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let job_id = get(VAR_JOB_ID).ok_or(ConfigError::MissingField("job id"))?;
    let nodes_raw = get(VAR_NUM_NODES)
        .or_else(|| get(VAR_NNODES))
        .ok_or(ConfigError::MissingField("nodes"))?;
    let nodes = parse_num("nodes", &nodes_raw)?;
    let tasks_raw = get(VAR_TASKS_PER_NODE).ok_or(ConfigError::MissingField("tasks per node"))?;
    let tasks_per_node = parse_tasks_per_node(&tasks_raw)?;

    let mut ctx = JobContext::new(job_id, nodes, tasks_per_node);
    if let Some(name) = get(VAR_JOB_NAME) {
        ctx.job_name = name;
    }
    if let Some(raw) = get(VAR_NODE_ID) {
        ctx.node_index = parse_num("node index", &raw)?;
    }
    ctx.partition = get(VAR_PARTITION);
    ctx.reservation = get(VAR_RESERVATION);
    if let Some(raw) = get(VAR_NODELIST) {
        ctx.nodelist = nodelist::expand(&raw, nodes.max(1) as usize)?;
    }
    if let Some(raw) = get(VAR_START_TIME) {
        ctx.start_time = Some(parse_num("start time", &raw)?);
    }
    if let Some(raw) = get(VAR_END_TIME) {
        ctx.end_time = Some(parse_num("end time", &raw)?);
    }
    if let Some(raw) = get(VAR_TIME_LIMIT_MINUTES) {
        let minutes: u64 = parse_num("time limit", &raw)?;
        let secs = minutes
            .checked_mul(60)
            .filter(|s| i64::try_from(*s).is_ok())
            .ok_or_else(|| ConfigError::invalid("time limit", &raw, "out of range"))?;
        ctx.time_limit = Some(Duration::from_secs(secs));
    }

    ctx.debug_mode = Flag::parse_lenient(lookup(VAR_ENABLE_DEBUGGING).as_deref(), Flag::OFF);
    ctx.kernel_log_monitor =
        Flag::parse_lenient(lookup(VAR_ENABLE_KERNEL_LOG_MONITOR).as_deref(), Flag::OFF);
    ctx.memory_snapshot =
        Flag::parse_lenient(lookup(VAR_ENABLE_MEMORY_SNAPSHOT).as_deref(), Flag::ON);

    ctx.extra_launch_args = split_args(lookup(VAR_EXTRA_LAUNCH_ARGS));
    ctx.extra_entrypoint_args = split_args(lookup(VAR_EXTRA_ENTRYPOINT_ARGS));

    ctx.validate()?;
    debug!(
        target: "orun.core.context",
        job_id = %ctx.job_id,
        nodes = ctx.nodes,
        tasks_per_node = ctx.tasks_per_node,
        node_index = ctx.node_index,
        "job context loaded"
    );
    Ok(ctx)
}

/// Build from the current process environment.
pub fn from_env() -> Result<JobContext, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Parse a tasks-per-node value, accepting Slurm's compressed `8(x2)` form.
///
/// Heterogeneous layouts (`8,4`) take the first count.
pub fn parse_tasks_per_node(raw: &str) -> Result<u32, ConfigError> {
    let first = raw
        .split(',')
        .next()
        .unwrap_or_default()
        .split('(')
        .next()
        .unwrap_or_default();
    let n: u32 = parse_num("tasks per node", first)?;
    Ok(n)
}

fn parse_num<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, raw, "expected an integer"))
}

fn split_args(raw: Option<String>) -> Vec<String> {
    raw.map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (VAR_JOB_ID, "5150"),
            (VAR_NUM_NODES, "2"),
            (VAR_TASKS_PER_NODE, "8(x2)"),
        ]
    }

    #[test]
    fn minimal_context_defaults() {
        let ctx = from_lookup(lookup_from(&base())).unwrap();
        assert_eq!(ctx.job_id, "5150");
        assert_eq!(ctx.job_name, "orun");
        assert_eq!(ctx.nodes, 2);
        assert_eq!(ctx.tasks_per_node, 8);
        assert_eq!(ctx.node_index, 0);
        assert!(!ctx.debug_mode.is_enabled());
        assert!(!ctx.kernel_log_monitor.is_enabled());
        assert!(ctx.memory_snapshot.is_enabled());
        assert!(ctx.reservation.is_none());
        assert!(ctx.extra_launch_args.is_empty());
    }

    #[test]
    fn full_context() {
        let mut vars = base();
        vars.extend([
            (VAR_JOB_NAME, "fold"),
            (VAR_NODE_ID, "1"),
            (VAR_PARTITION, "batch"),
            (VAR_RESERVATION, "legacy"),
            (VAR_NODELIST, "nid[007-008]"),
            (VAR_START_TIME, "1700000000"),
            (VAR_END_TIME, "1700003600"),
            (VAR_TIME_LIMIT_MINUTES, "60"),
            (VAR_ENABLE_DEBUGGING, "1"),
            (VAR_ENABLE_KERNEL_LOG_MONITOR, "yes"),
            (VAR_ENABLE_MEMORY_SNAPSHOT, "0"),
            (VAR_EXTRA_LAUNCH_ARGS, "--mpi=pmix  --cpu-bind=none"),
            (VAR_EXTRA_ENTRYPOINT_ARGS, "--seed 7"),
        ]);
        let ctx = from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(ctx.job_name, "fold");
        assert_eq!(ctx.node_index, 1);
        assert_eq!(ctx.partition.as_deref(), Some("batch"));
        assert_eq!(ctx.reservation.as_deref(), Some("legacy"));
        assert_eq!(ctx.nodelist, vec!["nid007", "nid008"]);
        assert_eq!(ctx.end_time, Some(1_700_003_600));
        assert_eq!(ctx.time_limit, Some(Duration::from_secs(3600)));
        assert!(ctx.debug_mode.is_enabled());
        assert!(ctx.kernel_log_monitor.is_enabled());
        assert!(!ctx.memory_snapshot.is_enabled());
        assert_eq!(ctx.extra_launch_args, vec!["--mpi=pmix", "--cpu-bind=none"]);
        assert_eq!(ctx.extra_entrypoint_args, vec!["--seed", "7"]);
    }

    #[test]
    fn malformed_flags_read_as_off() {
        let mut vars = base();
        vars.push((VAR_ENABLE_DEBUGGING, "definitely"));
        let ctx = from_lookup(lookup_from(&vars)).unwrap();
        assert!(!ctx.debug_mode.is_enabled());
    }

    #[test]
    fn nnodes_is_accepted_as_fallback() {
        let vars = [
            (VAR_JOB_ID, "1"),
            (VAR_NNODES, "3"),
            (VAR_TASKS_PER_NODE, "4"),
        ];
        assert_eq!(from_lookup(lookup_from(&vars)).unwrap().nodes, 3);
    }

    #[test]
    fn missing_required_fields_fail() {
        let vars = [(VAR_NUM_NODES, "2"), (VAR_TASKS_PER_NODE, "8")];
        assert_eq!(
            from_lookup(lookup_from(&vars)),
            Err(ConfigError::MissingField("job id"))
        );

        let vars = [(VAR_JOB_ID, "1"), (VAR_NUM_NODES, "2")];
        assert_eq!(
            from_lookup(lookup_from(&vars)),
            Err(ConfigError::MissingField("tasks per node"))
        );
    }

    #[test]
    fn malformed_required_fields_fail() {
        let vars = [
            (VAR_JOB_ID, "1"),
            (VAR_NUM_NODES, "two"),
            (VAR_TASKS_PER_NODE, "8"),
        ];
        assert!(matches!(
            from_lookup(lookup_from(&vars)),
            Err(ConfigError::InvalidField { field: "nodes", .. })
        ));
    }

    #[test]
    fn nodelist_must_match_node_count() {
        let mut vars = base();
        vars.push((VAR_NODELIST, "nid[001-003]"));
        assert!(matches!(
            from_lookup(lookup_from(&vars)),
            Err(ConfigError::InvalidNodelist(_))
        ));
    }

    #[test]
    fn oversized_time_limit_is_rejected() {
        for raw in ["18446744073709551615", "200000000000000000"] {
            let mut vars = base();
            vars.push((VAR_TIME_LIMIT_MINUTES, raw));
            assert!(matches!(
                from_lookup(lookup_from(&vars)),
                Err(ConfigError::InvalidField { field: "time limit", .. })
            ));
        }
    }

    #[test]
    fn tasks_per_node_forms() {
        assert_eq!(parse_tasks_per_node("8"), Ok(8));
        assert_eq!(parse_tasks_per_node("4(x3)"), Ok(4));
        assert_eq!(parse_tasks_per_node("8,4"), Ok(8));
        assert!(parse_tasks_per_node("x").is_err());
    }
}
