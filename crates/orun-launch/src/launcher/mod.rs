//! Worker group launch.
//!
//! The launcher owns no diagnostics itself; it only sees the [`JobHooks`] seam and calls
//! `start` before the workers and `finish` after them on every path.
use std::time::Duration;

use orun_core::{CommandLine, Platform, Resolver, rank, schedule, system};
use orun_diag::{JobExit, JobHooks};
use orun_exec::{ProcConfig, WorkerGroup};
use orun_model::{
    ConfigError, DEFAULT_MASTER_PORT, ENV_LOCAL_BATCH_SIZE, ENV_MASTER_ADDR, ENV_MASTER_PORT,
    EnvironmentPlan, JobContext, RankIdentity, Schedule, WorkerEnv,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{EXIT_INTERRUPTED, EXIT_SPAWN, LaunchError};

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub platform: Platform,
    /// Samples per rank per step.
    pub local_batch_size: u32,
    pub master_port: u16,
    /// SIGTERM to SIGKILL delay when tearing ranks down.
    pub grace: Duration,
    /// Training command run by every rank.
    pub worker: CommandLine,
    /// Per-task shim used under a collective launcher; receives the worker command as trailing arguments.
    pub rank_shim: CommandLine,
    pub resolver: Resolver,
}

impl LaunchOptions {
    pub fn new(worker: CommandLine, local_batch_size: u32) -> Self {
        Self {
            platform: Platform::Local,
            local_batch_size,
            master_port: DEFAULT_MASTER_PORT,
            grace: Duration::from_secs(10),
            worker,
            rank_shim: default_rank_shim(),
            resolver: Resolver::default(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

/// `<this binary> rank --`
pub fn default_rank_shim() -> CommandLine {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "orun".to_string());
    CommandLine::new(exe).arg("rank").arg("--")
}

pub struct Launcher {
    ctx: JobContext,
    opts: LaunchOptions,
    plan: EnvironmentPlan,
    schedule: Schedule,
}

impl Launcher {
    /// Validate the context and derive everything the workers need. Nothing is spawned yet.
    pub fn new(ctx: JobContext, opts: LaunchOptions) -> Result<Self, ConfigError> {
        ctx.validate()?;
        if opts.local_batch_size == 0 {
            return Err(ConfigError::invalid(
                "local batch size",
                "0",
                "must be positive",
            ));
        }
        let plan = opts.resolver.resolve(&ctx);
        let global = schedule::global_batch_size(opts.local_batch_size, ctx.world_size())?;
        let schedule = schedule::derive(global)?;
        Ok(Self {
            ctx,
            opts,
            plan,
            schedule,
        })
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn plan(&self) -> &EnvironmentPlan {
        &self.plan
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn master_addr(&self) -> &str {
        self.ctx.master_node().unwrap_or_else(|| system::hostname())
    }

    /// Entries shared by every rank.
    pub fn base_env(&self) -> WorkerEnv {
        self.plan
            .to_env()
            .merged(&self.schedule.to_env())
            .with(ENV_MASTER_ADDR, self.master_addr())
            .with(ENV_MASTER_PORT, self.opts.master_port.to_string())
            .with(ENV_LOCAL_BATCH_SIZE, self.opts.local_batch_size.to_string())
    }

    pub fn rank_env(&self, id: &RankIdentity) -> WorkerEnv {
        self.base_env().merged(&id.to_env())
    }

    /// Worker argv after entrypoint wrapping and extra arguments.
    pub fn worker_command(&self) -> CommandLine {
        let cmd = match &self.plan.entrypoint {
            Some(entrypoint) => {
                CommandLine::new(entrypoint.to_string_lossy()).wrapping(&self.opts.worker)
            }
            None => self.opts.worker.clone(),
        };
        cmd.args(self.ctx.extra_entrypoint_args.iter().cloned())
    }

    /// Processes started by this node.
    pub fn group(&self) -> WorkerGroup {
        let worker = self.worker_command();
        let members = match &self.opts.platform {
            Platform::Local => rank::node_ranks(&self.ctx)
                .iter()
                .map(|id| ProcConfig::from_command(&worker).with_env(self.rank_env(id)))
                .collect(),
            platform @ Platform::Slurm(_) => {
                let per_task = self.opts.rank_shim.clone().wrapping(&worker);
                vec![
                    ProcConfig::from_command(&platform.worker_group(&self.ctx, &per_task))
                        .with_env(self.base_env()),
                ]
            }
        };
        WorkerGroup::new(members).with_grace(self.opts.grace)
    }

    /// Run the job and return the process exit code.
    ///
    /// `hooks.finish` runs on every path that reaches the workers, including spawn failure and cancellation.
    #[instrument(level = "info", skip_all, fields(job = %self.ctx.job_id, platform = self.opts.platform.kind()))]
    pub async fn launch(
        &self,
        hooks: &dyn JobHooks,
        cancel: &CancellationToken,
    ) -> Result<i32, LaunchError> {
        info!(
            target: "orun.launch",
            world_size = self.ctx.world_size(),
            global_batch_size = self.schedule.global_batch_size,
            lr = self.schedule.lr,
            debug = self.plan.entrypoint.is_some(),
            "launching workers"
        );
        hooks.start().await;

        if cancel.is_cancelled() {
            warn!(target: "orun.launch", "cancelled before launch");
            hooks
                .finish(JobExit::Interrupted {
                    code: EXIT_INTERRUPTED,
                })
                .await;
            return Ok(EXIT_INTERRUPTED);
        }

        let outcome = match self.group().run(cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                hooks.finish(JobExit::Completed { code: EXIT_SPAWN }).await;
                return Err(e.into());
            }
        };

        let exit = if outcome.interrupted {
            JobExit::Interrupted {
                code: outcome.exit_code,
            }
        } else {
            JobExit::Completed {
                code: outcome.exit_code,
            }
        };
        hooks.finish(exit).await;

        info!(target: "orun.launch", code = outcome.exit_code, interrupted = outcome.interrupted, "job finished");
        Ok(outcome.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use orun_core::resolver::DEBUG_ENTRYPOINT;
    use orun_model::{ENV_ENTRYPOINT, ENV_LIBRARY_PATH, ENV_RANK, Flag};

    use super::*;

    fn ctx() -> JobContext {
        let mut ctx =
            JobContext::new("77", 2, 4).with_nodelist(vec!["nid010".into(), "nid011".into()]);
        ctx.node_index = 1;
        ctx
    }

    fn opts() -> LaunchOptions {
        LaunchOptions::new(CommandLine::new("python").arg("train.py"), 32)
    }

    #[test]
    fn base_env_combines_plan_schedule_and_rendezvous() {
        let launcher = Launcher::new(ctx(), opts()).unwrap();
        let env = launcher.base_env();

        assert_eq!(env.get("GLOBAL_BATCH_SIZE"), Some("256"));
        assert_eq!(env.get("LEARNING_RATE"), Some("0.002"));
        assert_eq!(env.get("WARMUP_STEPS"), Some("0"));
        assert_eq!(env.get("LR_MILESTONES"), Some("4096,8192"));
        assert_eq!(env.get(ENV_MASTER_ADDR), Some("nid010"));
        assert_eq!(env.get(ENV_MASTER_PORT), Some("29500"));
        assert_eq!(env.get(ENV_LOCAL_BATCH_SIZE), Some("32"));
        assert!(env.get(ENV_LIBRARY_PATH).is_some());
        assert_eq!(env.get(ENV_ENTRYPOINT), None);
    }

    #[test]
    fn local_group_has_one_member_per_local_rank() {
        let launcher = Launcher::new(ctx(), opts()).unwrap();
        let group = launcher.group();
        assert_eq!(group.len(), 4);

        let ranks = rank::node_ranks(launcher.context());
        let env = launcher.rank_env(&ranks[2]);
        assert_eq!(env.get(ENV_RANK), Some("6"));
    }

    #[test]
    fn debug_mode_wraps_worker_and_appends_extra_args() {
        let mut ctx = ctx().with_debug_mode(true);
        ctx.extra_entrypoint_args = vec!["--seed".into(), "1".into()];
        let launcher = Launcher::new(ctx, opts()).unwrap();

        assert_eq!(
            launcher.worker_command().argv(),
            vec![DEBUG_ENTRYPOINT, "python", "train.py", "--seed", "1"]
        );
        assert_eq!(launcher.base_env().get(ENV_ENTRYPOINT), Some(DEBUG_ENTRYPOINT));
    }

    #[test]
    fn slurm_group_is_a_single_collective_launch() {
        let mut ctx = ctx();
        ctx.extra_launch_args = vec!["--mpi=pmix".into()];
        let mut opts = opts().with_platform(Platform::slurm());
        opts.rank_shim = CommandLine::new("orun").arg("rank").arg("--");
        let launcher = Launcher::new(ctx, opts).unwrap();

        let group = launcher.group();
        assert_eq!(group.len(), 1);
        let shim = CommandLine::new("orun")
            .arg("rank")
            .arg("--")
            .wrapping(&launcher.worker_command());
        let argv = Platform::slurm()
            .worker_group(launcher.context(), &shim)
            .argv();
        assert!(argv.contains(&"--ntasks=8".to_string()));
        assert!(argv.contains(&"--mpi=pmix".to_string()));
        assert_eq!(&argv[argv.len() - 4..], ["rank", "--", "python", "train.py"]);
    }

    #[test]
    fn invalid_inputs_are_configuration_errors() {
        assert!(Launcher::new(ctx(), LaunchOptions::new(CommandLine::new("x"), 0)).is_err());

        let mut bad = ctx();
        bad.node_index = 5;
        assert!(Launcher::new(bad, opts()).is_err());

        let mut flags = ctx();
        flags.kernel_log_monitor = Flag::ON;
        assert!(Launcher::new(flags, opts()).is_ok());
    }
}
