use std::time::Duration;

use anyhow::Context;
use orun_core::{CommandLine, LogLayout, Platform, context, system};
use orun_diag::{
    Diagnostics, DiagnosticsConfig, TerminationWatch,
    report::{self, MemoryReport},
};
use orun_model::ConfigError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    Cli, Commands, JobArgs, LaunchArgs, MemProbeArgs, MemReportArgs, PlatformKind, RankArgs,
};
use crate::{
    error::{EXIT_CONFIG, LaunchError},
    launcher::{LaunchOptions, Launcher},
};

/// Run the parsed command and return the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Launch(args) => launch(args).await,
        Commands::Rank(args) => rank(args),
        Commands::Plan(args) => plan(&args.job),
        Commands::MemReport(args) => mem_report(&args),
        Commands::MemProbe(args) => mem_probe(&args).await,
    }
}

/// Exit code for an error that escaped [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<LaunchError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    1
}

fn platform(kind: PlatformKind) -> Platform {
    match kind {
        PlatformKind::Local => Platform::Local,
        PlatformKind::Slurm => Platform::slurm(),
    }
}

fn launcher(job: &JobArgs, grace: Duration) -> Result<Launcher, LaunchError> {
    let worker = CommandLine::from_argv(&job.worker)
        .ok_or(ConfigError::MissingField("worker command"))?;
    let ctx = context::from_env()?;
    let mut opts =
        LaunchOptions::new(worker, job.local_batch_size).with_platform(platform(job.platform));
    opts.master_port = job.master_port;
    opts.grace = grace;
    Ok(Launcher::new(ctx, opts)?)
}

async fn launch(args: LaunchArgs) -> anyhow::Result<i32> {
    let launcher = launcher(&args.job, Duration::from_secs(args.grace))?;
    let platform = platform(args.job.platform);

    let layout = LogLayout::new(&args.log_dir, launcher.context());
    debug!(
        target: "orun.launch",
        dir = %layout.dir().display(),
        stem = layout.stem(),
        "diagnostic artifacts"
    );
    let defaults = DiagnosticsConfig::default();
    let diag_cfg = DiagnosticsConfig {
        kernel_log: CommandLine::parse(&args.kernel_log_cmd),
        snapshot: match &args.snapshot_cmd {
            Some(cmd) => CommandLine::parse(cmd),
            None => defaults.snapshot,
        },
        snapshot_timeout: Duration::from_secs(args.snapshot_timeout),
        post_mortem_delay: Duration::from_secs(args.post_mortem_delay),
        grace: Duration::from_secs(args.grace),
    };
    let diagnostics = Diagnostics::new(launcher.context(), &platform, &layout, &diag_cfg);

    let cancel = CancellationToken::new();
    let watch = TerminationWatch::install(cancel.clone()).context("installing signal handlers")?;

    let code = launcher.launch(&diagnostics, &cancel).await?;
    if let Some(signal) = watch.received() {
        warn!(target: "orun.launch", signal, code, "job interrupted");
    }
    Ok(code)
}

fn rank(args: RankArgs) -> anyhow::Result<i32> {
    let worker = CommandLine::from_argv(&args.worker)
        .ok_or(ConfigError::MissingField("worker command"))?;
    Ok(crate::rank::exec(&worker, |k| std::env::var(k).ok())?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanView<'a> {
    job_id: &'a str,
    platform: &'static str,
    world_size: u32,
    master_addr: &'a str,
    plan: &'a orun_model::EnvironmentPlan,
    schedule: &'a orun_model::Schedule,
    worker: Vec<String>,
    env: &'a orun_model::WorkerEnv,
}

fn plan(job: &JobArgs) -> anyhow::Result<i32> {
    let launcher = launcher(job, Duration::ZERO)?;
    let env = launcher.base_env();
    let view = PlanView {
        job_id: &launcher.context().job_id,
        platform: platform(job.platform).kind(),
        world_size: launcher.context().world_size(),
        master_addr: launcher.master_addr(),
        plan: launcher.plan(),
        schedule: launcher.schedule(),
        worker: launcher.worker_command().argv(),
        env: &env,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(0)
}

fn mem_report(args: &MemReportArgs) -> anyhow::Result<i32> {
    let report = MemoryReport::from_log(&args.log, &args.separator)?;
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }
    Ok(0)
}

async fn mem_probe(args: &MemProbeArgs) -> anyhow::Result<i32> {
    let cmd = report::probe::query_command();
    let lines = report::probe::run(&cmd, system::hostname(), Duration::from_secs(args.timeout))
        .await
        .context("querying GPU memory")?;
    for line in lines {
        println!("{line}");
    }
    Ok(0)
}
