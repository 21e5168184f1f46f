//! Per-rank identity derivation.
use orun_model::{ConfigError, JobContext, RankIdentity};

/// Identities of the ranks hosted on the context's node, in local-rank order.
pub fn node_ranks(ctx: &JobContext) -> Vec<RankIdentity> {
    let world_size = ctx.world_size();
    (0..ctx.tasks_per_node)
        .map(|local_rank| RankIdentity {
            rank: ctx.node_index * ctx.tasks_per_node + local_rank,
            world_size,
            local_rank,
            local_world_size: ctx.tasks_per_node,
            node_rank: ctx.node_index,
        })
        .collect()
}

/// Identity of a single task as reported by the platform's collective launcher.
///
/// `lookup` resolves platform variables (`SLURM_PROCID` and friends).
pub fn from_platform<F>(lookup: F) -> Result<RankIdentity, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let rank = required_u32(&lookup, "SLURM_PROCID", "rank")?;
    let world_size = required_u32(&lookup, "SLURM_NTASKS", "world size")?;
    let local_rank = required_u32(&lookup, "SLURM_LOCALID", "local rank")?;
    let local_world_size = match lookup("SLURM_NTASKS_PER_NODE") {
        Some(raw) => crate::context::parse_tasks_per_node(&raw)?,
        None => required_u32(&lookup, "SLURM_TASKS_PER_NODE", "local world size")?,
    };
    let node_rank = match lookup("SLURM_NODEID") {
        Some(raw) => parse_u32("node rank", &raw)?,
        None => 0,
    };

    if rank >= world_size {
        return Err(ConfigError::invalid(
            "rank",
            rank.to_string(),
            format!("must be below world size {world_size}"),
        ));
    }
    if local_rank >= local_world_size {
        return Err(ConfigError::invalid(
            "local rank",
            local_rank.to_string(),
            format!("must be below local world size {local_world_size}"),
        ));
    }

    Ok(RankIdentity {
        rank,
        world_size,
        local_rank,
        local_world_size,
        node_rank,
    })
}

fn required_u32<F>(lookup: &F, var: &str, field: &'static str) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var).ok_or(ConfigError::MissingField(field))?;
    parse_u32(field, &raw)
}

fn parse_u32(field: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, raw, "expected a non-negative integer"))
}
