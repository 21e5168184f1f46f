use std::path::{Path, PathBuf};

use orun_model::{JobContext, MonitorKind};

/// Plain-text artifact locations, keyed by `<job name>_<job id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    dir: PathBuf,
    stem: String,
}

impl LogLayout {
    pub fn new(dir: impl Into<PathBuf>, ctx: &JobContext) -> Self {
        Self {
            dir: dir.into(),
            stem: format!("{}_{}", sanitize(&ctx.job_name), sanitize(&ctx.job_id)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Output of a monitor kind.
    pub fn monitor_log(&self, kind: MonitorKind) -> PathBuf {
        match kind {
            MonitorKind::KernelLog => self.dir.join(format!("{}.dmesg.log", self.stem)),
            MonitorKind::ResourceSnapshot => self.dir.join(format!("{}.snapshot.log", self.stem)),
        }
    }

    /// Output of the delayed post-mortem snapshot.
    pub fn post_mortem_log(&self) -> PathBuf {
        self.dir.join(format!("{}.mem", self.stem))
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
