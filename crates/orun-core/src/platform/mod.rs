//! Composition of platform launch commands.
//!
//! The orchestrator never implements cross-node coordination itself.
//! Anything that must run on every node, or outlive the allocation, is phrased as a command for the platform's collective launcher (`srun`) or batch submitter (`sbatch`).
//! [`Platform::Local`] runs everything as plain local processes, which is what single-node runs and tests use.
use std::{fmt, path::Path, time::Duration};

use orun_model::JobContext;

/// Program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a whitespace separated command string. Returns `None` for blank input.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Build from an argv vector. Returns `None` if it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `inner` (program and args) as trailing arguments of `self`.
    pub fn wrapping(self, inner: &CommandLine) -> Self {
        self.arg(inner.program.clone()).args(inner.args.iter().cloned())
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Single shell string with POSIX quoting.
    pub fn to_shell(&self) -> String {
        self.argv()
            .iter()
            .map(|s| shell_quote(s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:,+@%".contains(&b));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Slurm front-end programs.
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    pub srun: String,
    pub sbatch: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            srun: "srun".to_string(),
            sbatch: "sbatch".to_string(),
        }
    }
}

/// Where processes are launched.
#[derive(Debug, Clone)]
pub enum Platform {
    /// Plain local processes on the current node.
    Local,
    /// Slurm collective launch and batch submission.
    Slurm(SlurmConfig),
}

impl Platform {
    pub fn slurm() -> Self {
        Platform::Slurm(SlurmConfig::default())
    }

    /// Short symbolic identifier.
    pub fn kind(&self) -> &'static str {
        match self {
            Platform::Local => "local",
            Platform::Slurm(_) => "slurm",
        }
    }

    /// Whether per-node output lines are prefixed with the task index (`0: ...`).
    pub fn labels_output(&self) -> bool {
        matches!(self, Platform::Slurm(_))
    }

    /// Run `cmd` once on every node of the allocation, next to the main job step.
    ///
    /// `time_bound` caps the step at the given wall-clock time (rounded up to whole minutes, at least one).
    pub fn per_node(
        &self,
        ctx: &JobContext,
        cmd: &CommandLine,
        time_bound: Option<Duration>,
    ) -> CommandLine {
        match self {
            Platform::Local => cmd.clone(),
            Platform::Slurm(cfg) => {
                let mut srun = CommandLine::new(&cfg.srun)
                    .arg("--overlap")
                    .arg(format!("--nodes={}", ctx.nodes))
                    .arg(format!("--ntasks={}", ctx.nodes))
                    .arg("--ntasks-per-node=1")
                    .arg("--label");
                if let Some(bound) = time_bound {
                    srun = srun.arg(format!("--time={}", minutes_ceil(bound)));
                }
                srun.wrapping(cmd)
            }
        }
    }

    /// Run `cmd` as the worker process group: one task per rank across the allocation.
    pub fn worker_group(&self, ctx: &JobContext, cmd: &CommandLine) -> CommandLine {
        match self {
            Platform::Local => cmd.clone(),
            Platform::Slurm(cfg) => CommandLine::new(&cfg.srun)
                .arg(format!("--nodes={}", ctx.nodes))
                .arg(format!("--ntasks={}", ctx.world_size()))
                .arg(format!("--ntasks-per-node={}", ctx.tasks_per_node))
                .arg("--kill-on-bad-exit=1")
                .args(ctx.extra_launch_args.iter().cloned())
                .wrapping(cmd),
        }
    }

    /// Batch submission of `cmd` on the job's partition, reservation and node list, deferred by `delay` and ordered after the current job.
    ///
    /// Returns `None` where no batch scheduler exists.
    pub fn deferred_submission(
        &self,
        ctx: &JobContext,
        cmd: &CommandLine,
        delay: Duration,
        output: &Path,
    ) -> Option<CommandLine> {
        let Platform::Slurm(cfg) = self else {
            return None;
        };

        let mut sbatch = CommandLine::new(&cfg.sbatch)
            .arg("--parsable")
            .arg(format!("--job-name={}-postmortem", ctx.job_name))
            .arg(format!("--nodes={}", ctx.nodes))
            .arg("--ntasks-per-node=1")
            .arg("--time=5")
            .arg(format!("--begin=now+{}", delay.as_secs().max(1)))
            .arg(format!("--dependency=afterany:{}", ctx.job_id))
            .arg(format!("--output={}", output.display()));
        if let Some(partition) = &ctx.partition {
            sbatch = sbatch.arg(format!("--partition={partition}"));
        }
        if let Some(reservation) = &ctx.reservation {
            sbatch = sbatch.arg(format!("--reservation={reservation}"));
        }
        if !ctx.nodelist.is_empty() {
            sbatch = sbatch.arg(format!("--nodelist={}", ctx.nodelist.join(",")));
        }

        let step = CommandLine::new(&cfg.srun)
            .arg("--ntasks-per-node=1")
            .arg("--label")
            .wrapping(cmd);
        Some(sbatch.arg(format!("--wrap={}", step.to_shell())))
    }
}

fn minutes_ceil(d: Duration) -> u64 {
    d.as_secs().div_ceil(60).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> JobContext {
        let mut ctx = JobContext::new("4242", 2, 8)
            .with_reservation("legacy")
            .with_nodelist(vec!["nid001".into(), "nid002".into()]);
        ctx.job_name = "fold".into();
        ctx.partition = Some("batch".into());
        ctx
    }

    #[test]
    fn parse_splits_whitespace() {
        let cmd = CommandLine::parse("  dmesg  --follow ").unwrap();
        assert_eq!(cmd.program, "dmesg");
        assert_eq!(cmd.args, vec!["--follow"]);
        assert!(CommandLine::parse("   ").is_none());
    }

    #[test]
    fn shell_quoting() {
        let cmd = CommandLine::new("sh").arg("-c").arg("echo 'hi' $X");
        assert_eq!(cmd.to_shell(), r#"sh -c 'echo '\''hi'\'' $X'"#);
    }

    #[test]
    fn local_platform_runs_commands_verbatim() {
        let cmd = CommandLine::new("dmesg").arg("--follow");
        let p = Platform::Local;
        assert_eq!(p.per_node(&ctx(), &cmd, Some(Duration::from_secs(90))), cmd);
        assert_eq!(p.worker_group(&ctx(), &cmd), cmd);
        assert!(
            p.deferred_submission(&ctx(), &cmd, Duration::from_secs(60), Path::new("x.mem"))
                .is_none()
        );
    }

    #[test]
    fn per_node_is_bounded_in_whole_minutes() {
        let cmd = CommandLine::new("dmesg").arg("--follow");
        let srun = Platform::slurm().per_node(&ctx(), &cmd, Some(Duration::from_secs(61)));
        assert_eq!(srun.program, "srun");
        assert!(srun.args.contains(&"--ntasks-per-node=1".to_string()));
        assert!(srun.args.contains(&"--nodes=2".to_string()));
        assert!(srun.args.contains(&"--time=2".to_string()));
        assert_eq!(&srun.args[srun.args.len() - 2..], &["dmesg", "--follow"]);
    }

    #[test]
    fn per_node_bound_never_rounds_to_zero() {
        let cmd = CommandLine::new("true");
        let srun = Platform::slurm().per_node(&ctx(), &cmd, Some(Duration::ZERO));
        assert!(srun.args.contains(&"--time=1".to_string()));
    }

    #[test]
    fn worker_group_spans_the_allocation() {
        let mut ctx = ctx();
        ctx.extra_launch_args = vec!["--mpi=pmix".into()];
        let cmd = CommandLine::new("orun").arg("rank").arg("--").arg("python");
        let srun = Platform::slurm().worker_group(&ctx, &cmd);
        assert_eq!(
            srun.argv(),
            vec![
                "srun",
                "--nodes=2",
                "--ntasks=16",
                "--ntasks-per-node=8",
                "--kill-on-bad-exit=1",
                "--mpi=pmix",
                "orun",
                "rank",
                "--",
                "python",
            ]
        );
    }

    #[test]
    fn deferred_submission_targets_the_same_allocation() {
        let cmd = CommandLine::new("orun").arg("mem-probe");
        let sbatch = Platform::slurm()
            .deferred_submission(
                &ctx(),
                &cmd,
                Duration::from_secs(120),
                Path::new("/logs/fold_4242.mem"),
            )
            .unwrap();
        assert_eq!(sbatch.program, "sbatch");
        for expected in [
            "--partition=batch",
            "--reservation=legacy",
            "--nodelist=nid001,nid002",
            "--dependency=afterany:4242",
            "--begin=now+120",
            "--output=/logs/fold_4242.mem",
            "--wrap=srun --ntasks-per-node=1 --label orun mem-probe",
        ] {
            assert!(sbatch.args.contains(&expected.to_string()), "{expected}");
        }
    }
}
