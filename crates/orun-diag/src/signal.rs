use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Turns termination signals into cancellation of a token.
///
/// Catches SIGTERM, SIGINT, SIGHUP and SIGQUIT. The first one cancels the token; later ones are logged.
/// SIGKILL cannot be caught; the monitor deadline covers that case.
pub struct TerminationWatch {
    token: CancellationToken,
    received: Arc<AtomicI32>,
    task: JoinHandle<()>,
}

impl TerminationWatch {
    /// Install the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut hup = signal(SignalKind::hangup())?;
        let mut quit = signal(SignalKind::quit())?;

        let received = Arc::new(AtomicI32::new(0));
        let task = {
            let token = token.clone();
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                loop {
                    let signo = tokio::select! {
                        Some(()) = term.recv() => libc::SIGTERM,
                        Some(()) = int.recv() => libc::SIGINT,
                        Some(()) = hup.recv() => libc::SIGHUP,
                        Some(()) = quit.recv() => libc::SIGQUIT,
                        else => break,
                    };
                    if received
                        .compare_exchange(0, signo, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        info!(target: "orun.diag.signal", signal = signo, "termination requested");
                        token.cancel();
                    } else {
                        warn!(target: "orun.diag.signal", signal = signo, "already terminating");
                    }
                }
            })
        };

        Ok(Self {
            token,
            received,
            task,
        })
    }

    #[cfg(not(unix))]
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        let received = Arc::new(AtomicI32::new(0));
        let task = {
            let token = token.clone();
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    received.store(2, Ordering::Release);
                    token.cancel();
                }
            })
        };
        Ok(Self {
            token,
            received,
            task,
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// First signal received, if any.
    pub fn received(&self) -> Option<i32> {
        match self.received.load(Ordering::Acquire) {
            0 => None,
            s => Some(s),
        }
    }
}

impl Drop for TerminationWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn first_signal_cancels_and_is_recorded() {
        let token = CancellationToken::new();
        let watch = TerminationWatch::install(token.clone()).unwrap();
        assert_eq!(watch.received(), None);

        unsafe {
            libc::kill(libc::getpid(), libc::SIGHUP);
        }
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        assert_eq!(watch.received(), Some(libc::SIGHUP));

        unsafe {
            libc::kill(libc::getpid(), libc::SIGHUP);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(watch.received(), Some(libc::SIGHUP));
        assert!(watch.token().is_cancelled());
    }
}
