//! Command-line interface of the `orun` binary.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

mod commands;
pub use commands::{exit_code, run};

/// Distributed training job orchestrator.
#[derive(Parser, Debug)]
#[command(name = "orun")]
#[command(version)]
#[command(about = "Launch distributed training workers inside a batch allocation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log format (text, json, journald). Overrides ORUN_LOG_FORMAT.
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log filter directive (e.g. `info`, `orun.diag=debug,info`). Overrides ORUN_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker group with diagnostics around it.
    Launch(LaunchArgs),

    /// Per-task shim: export the rank identity and exec the worker.
    #[command(hide = true)]
    Rank(RankArgs),

    /// Print the resolved environment plan and schedule as JSON.
    Plan(PlanArgs),

    /// Summarise GPU memory before and after a job from its snapshot log.
    MemReport(MemReportArgs),

    /// Print one `<host> | used | reserved | free | total` line per local GPU.
    MemProbe(MemProbeArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    /// Plain processes on this node.
    Local,
    /// Slurm `srun` / `sbatch`.
    Slurm,
}

/// Options shared by `launch` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Samples per rank per optimizer step.
    #[arg(long, env = "ORUN_LOCAL_BATCH_SIZE")]
    pub local_batch_size: u32,

    #[arg(long, value_enum, env = "ORUN_PLATFORM", default_value = "slurm")]
    pub platform: PlatformKind,

    /// Rendezvous port exported as MASTER_PORT.
    #[arg(long, env = "ORUN_MASTER_PORT", default_value_t = orun_model::DEFAULT_MASTER_PORT)]
    pub master_port: u16,

    /// Training command, after `--`.
    #[arg(last = true, required = true, num_args = 1..)]
    pub worker: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Directory for the `.dmesg.log`, `.snapshot.log` and `.mem` artifacts.
    #[arg(long, env = "ORUN_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Kernel-log collector command.
    #[arg(long, default_value = "dmesg --follow --ctime")]
    pub kernel_log_cmd: String,

    /// Resource snapshot command. Defaults to `orun mem-probe`.
    #[arg(long)]
    pub snapshot_cmd: Option<String>,

    /// Seconds per snapshot before it is abandoned.
    #[arg(long, default_value_t = 60)]
    pub snapshot_timeout: u64,

    /// Seconds after submission before the post-mortem job may start.
    #[arg(long, default_value_t = 90)]
    pub post_mortem_delay: u64,

    /// Seconds between SIGTERM and SIGKILL when stopping processes.
    #[arg(long, default_value_t = 10)]
    pub grace: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RankArgs {
    /// Worker command, after `--`.
    #[arg(last = true, required = true, num_args = 1..)]
    pub worker: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MemReportArgs {
    /// Snapshot log (`<name>_<id>.snapshot.log`).
    pub log: PathBuf,

    /// Marker separating start and end collections.
    #[arg(long, default_value = orun_diag::report::DEFAULT_SEPARATOR)]
    pub separator: String,

    /// Emit JSON instead of tables.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MemProbeArgs {
    /// Seconds before the query is abandoned.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
