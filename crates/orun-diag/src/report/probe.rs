//! Local GPU memory probe backing `orun mem-probe`.
use std::time::Duration;

use orun_core::CommandLine;
use orun_exec::{Output, ProcConfig, util::exit_code};
use tokio::io::AsyncReadExt;

use crate::error::DiagError;

/// `nvidia-smi` query printing used, reserved, free and total MiB per GPU.
pub fn query_command() -> CommandLine {
    CommandLine::new("nvidia-smi")
        .arg("--query-gpu=memory.used,memory.reserved,memory.free,memory.total")
        .arg("--format=csv,noheader,nounits")
}

/// Turn the CSV query output into `<host> | <n>MiB | ...` lines.
pub fn format_lines(host: &str, csv: &str) -> Result<Vec<String>, DiagError> {
    csv.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, line)| {
            let values = line
                .split(',')
                .map(|v| v.trim().parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DiagError::Parse {
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            if values.len() != 4 {
                return Err(DiagError::Parse {
                    line: i + 1,
                    reason: format!("expected 4 columns, got {}", values.len()),
                });
            }
            let cols: Vec<String> = values.iter().map(|v| format!("{v}MiB")).collect();
            Ok(format!("{host} | {}", cols.join(" | ")))
        })
        .collect()
}

/// Run `cmd` and format its output for `host`.
pub async fn run(
    cmd: &CommandLine,
    host: &str,
    timeout: Duration,
) -> Result<Vec<String>, DiagError> {
    let mut child = ProcConfig::from_command(cmd)
        .with_stdout(Output::Piped)
        .spawn()?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| DiagError::Io("probe stdout was not captured".into()))?;

    let collect = async {
        let mut out = String::new();
        stdout.read_to_string(&mut out).await?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((out, status))
    };
    let collected = tokio::time::timeout(timeout, collect).await;
    let (out, status) = match collected {
        Ok(done) => done?,
        Err(_) => {
            let _ = child.start_kill();
            return Err(DiagError::Timeout {
                what: "memory probe",
                after: timeout,
            });
        }
    };
    match exit_code(status) {
        0 => format_lines(host, &out),
        code => Err(DiagError::ExitCode {
            what: "memory probe",
            code,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_gpu() {
        let lines = format_lines("nid001", "1200, 0, 79000, 81559\n3, 0, 81000, 81559\n").unwrap();
        assert_eq!(
            lines,
            vec![
                "nid001 | 1200MiB | 0MiB | 79000MiB | 81559MiB",
                "nid001 | 3MiB | 0MiB | 81000MiB | 81559MiB",
            ]
        );
    }

    #[test]
    fn rejects_unexpected_columns() {
        let err = format_lines("h", "1, 2, 3\n").unwrap_err();
        assert!(matches!(err, DiagError::Parse { line: 1, .. }));
        assert!(format_lines("h", "[N/A], 1, 2, 3").is_err());
    }

    #[tokio::test]
    async fn runs_query_command() {
        let cmd = CommandLine::new("echo").arg("5, 0, 95, 100");
        let lines = run(&cmd, "h", Duration::from_secs(5)).await.unwrap();
        assert_eq!(lines, vec!["h | 5MiB | 0MiB | 95MiB | 100MiB"]);
    }
}
