//! sd_notify integration for the long-running sweeper.
//!
//! Every method is a no-op when `enabled` is false or off Linux, so callers
//! never need `#[cfg]` of their own.

/// Service-manager states the sweeper reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice<'a> {
    Ready,
    Stopping,
    Status(&'a str),
    Watchdog,
}

/// Set from `--notify-systemd`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`, sent once the sweeper starts its first pass.
    pub(crate) fn notify_ready(&self) {
        self.send(Notice::Ready);
    }

    /// `STOPPING=1`, sent when the pass loop exits.
    pub(crate) fn notify_stopping(&self) {
        self.send(Notice::Stopping);
    }

    /// `STATUS=<msg>`, the last pass summary.
    pub(crate) fn notify_status(&self, msg: &str) {
        self.send(Notice::Status(msg));
    }

    /// `WATCHDOG=1`, once per pass.
    pub(crate) fn notify_watchdog(&self) {
        self.send(Notice::Watchdog);
    }

    fn send(&self, notice: Notice<'_>) {
        if self.enabled {
            deliver(notice);
        }
    }
}

#[cfg(target_os = "linux")]
fn deliver(notice: Notice<'_>) {
    use sd_notify::NotifyState;

    let state = match notice {
        Notice::Ready => NotifyState::Ready,
        Notice::Stopping => NotifyState::Stopping,
        Notice::Status(msg) => NotifyState::Status(msg),
        Notice::Watchdog => NotifyState::Watchdog,
    };
    if let Err(e) = sd_notify::notify(false, &[state]) {
        tracing::debug!(error = %e, ?notice, "sd_notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn deliver(_notice: Notice<'_>) {}
