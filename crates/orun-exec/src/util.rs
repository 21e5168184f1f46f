use std::{process::ExitStatus, time::Duration};

use tokio::process::Child;
use tracing::{debug, trace};

/// Deliver `signal` to the whole process group led by `pid`.
///
/// Children are spawned as group leaders, so this reaches `srun` and everything it forked.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
pub fn signal_group(_pid: u32, _signal: i32) -> std::io::Result<()> {
    Err(std::io::Error::other("process groups are not supported"))
}

/// SIGTERM the child's group, wait up to `grace`, then SIGKILL.
///
/// Returns the final exit status; an already exited child is simply reaped.
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            if let Some(pid) = child.id() {
                trace!(target: "orun.exec.util", pid, "sending SIGTERM to process group");
                let _ = signal_group(pid, libc::SIGTERM);
            }
        } else {
            let _ = child.start_kill();
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            debug!(target: "orun.exec.util", ?grace, "grace exceeded; killing");
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                let _ = signal_group(pid, libc::SIGKILL);
            }
            child.kill().await?;
            child.wait().await
        }
    }
}

/// Normalise an exit status to a shell-style code (`128 + signo` for signal deaths).
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map(|s| 128 + s).unwrap_or(1)
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn exit_code_passes_through_plain_codes() {
        let status = Command::new("sh").arg("-c").arg("exit 7").status().await.unwrap();
        assert_eq!(exit_code(status), 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_graceful_terminates_group_and_maps_signal() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let status = kill_graceful(&mut child, Duration::from_secs(5)).await.unwrap();
        assert_eq!(exit_code(status), 128 + libc::SIGTERM);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_graceful_escalates_when_term_is_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; while :; do sleep 1; done")
            .process_group(0)
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = kill_graceful(&mut child, Duration::from_millis(300)).await.unwrap();
        assert_eq!(exit_code(status), 128 + libc::SIGKILL);
    }

    #[tokio::test]
    async fn kill_graceful_reaps_exited_child() {
        let mut child = Command::new("true").spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = kill_graceful(&mut child, Duration::from_secs(1)).await.unwrap();
        assert!(status.success());
    }
}
