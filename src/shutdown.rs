//! Signal handling for `sync` and `sweep`.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a shared
//! [`CancellationToken`]: the pipeline stops before its next file and the
//! sweeper before its next pass. A second signal exits at once with
//! [`FORCED_EXIT_CODE`].

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
pub(crate) const FORCED_EXIT_CODE: i32 = 130;

/// What a received signal asks for, given how many came before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    Drain,
    Exit,
}

fn escalate(received: &AtomicU32) -> Escalation {
    if received.fetch_add(1, Ordering::SeqCst) == 0 {
        Escalation::Drain
    } else {
        Escalation::Exit
    }
}

/// Registered signal streams, created up front so a registration failure is
/// reported to the caller.
struct Signals {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hup: tokio::signal::unix::Signal,
}

impl Signals {
    fn register() -> anyhow::Result<Self> {
        #[cfg(unix)]
        {
            use anyhow::Context;
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                term: signal(SignalKind::terminate()).context("Failed to register SIGTERM")?,
                hup: signal(SignalKind::hangup()).context("Failed to register SIGHUP")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal. `false` means no more can arrive.
    async fn next(&mut self) -> bool {
        #[cfg(unix)]
        {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res.is_ok(),
                got = self.term.recv() => got.is_some(),
                got = self.hup.recv() => got.is_some(),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.is_ok()
        }
    }
}

/// Install signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut signals = Signals::register()?;

    let handler_token = token.clone();
    tokio::spawn(async move {
        let received = AtomicU32::new(0);
        while signals.next().await {
            match escalate(&received) {
                Escalation::Drain => {
                    tracing::info!("Received shutdown signal, finishing current file...");
                    tracing::info!("Press Ctrl+C again to force exit");
                    handler_token.cancel();
                }
                Escalation::Exit => {
                    tracing::warn!("Force exit requested");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
        tracing::debug!("Signal listener closed");
    });

    Ok(token)
}
