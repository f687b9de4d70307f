use crate::ps::{self, ListError, ProcessRecord, ToolMatcher};
use crate::sys::{CommandRunner, ListingSource};
use crate::terminate::{KillSignal, OsProcessControl, ProcessControl, TerminateError, Terminator};
use crate::toolchain::ToolchainVersion;

// ---------------------------------------------------------------------------
// Signal policy
// ---------------------------------------------------------------------------

/// Signal tried first for every pid before falling back to `Kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPolicy {
    pub preferred: KillSignal,
}

impl SignalPolicy {
    pub fn new(preferred: KillSignal) -> Self {
        Self { preferred }
    }

    /// Toolchains from 7.0 on shut instruments down cleanly on `QUIT`; older
    /// ones get `TERM`.
    pub fn for_toolchain(version: &ToolchainVersion) -> Self {
        if version.at_least(7, 0) {
            Self::new(KillSignal::Quit)
        } else {
            Self::new(KillSignal::Term)
        }
    }
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self::new(KillSignal::Term)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct KillReport {
    /// Pids confirmed gone, with the signal that finished them.
    pub terminated: Vec<(u32, KillSignal)>,
    /// Pids that survived the unconditional kill or could not be signalled.
    pub failed: Vec<(u32, TerminateError)>,
}

impl KillReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<S = CommandRunner, C = OsProcessControl> {
    source: S,
    matcher: ToolMatcher,
    terminator: Terminator<C>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(CommandRunner, ToolMatcher::default(), Terminator::default())
    }
}

impl<S: ListingSource, C: ProcessControl> Supervisor<S, C> {
    pub fn new(source: S, matcher: ToolMatcher, terminator: Terminator<C>) -> Self {
        Self {
            source,
            matcher,
            terminator,
        }
    }

    pub fn processes(&self) -> Result<Vec<ProcessRecord>, ListError> {
        ps::list_matching(&self.source, &self.matcher)
    }

    pub fn is_running(&self) -> Result<bool, ListError> {
        Ok(!self.processes()?.is_empty())
    }

    /// Terminates every running instance, lowest pid first. Each pid gets the
    /// policy's signal with a full polling budget, then `Kill` if it survives.
    /// A failure on one pid does not stop the others.
    pub fn kill_all(&self, policy: SignalPolicy) -> Result<KillReport, ListError> {
        let mut report = KillReport::default();
        for record in self.processes()? {
            match self.stop_pid(record.pid, policy.preferred) {
                Ok(signal) => report.terminated.push((record.pid, signal)),
                Err(error) => {
                    tracing::error!(pid = record.pid, %error, "could not terminate process");
                    report.failed.push((record.pid, error));
                }
            }
        }
        Ok(report)
    }

    fn stop_pid(&self, pid: u32, preferred: KillSignal) -> Result<KillSignal, TerminateError> {
        match self.terminator.terminate(pid, preferred) {
            Ok(true) => return Ok(preferred),
            Ok(false) if preferred.is_unconditional() => {
                return Err(TerminateError::Exhausted {
                    pid,
                    signal: preferred,
                });
            }
            Ok(false) => {}
            Err(error) if preferred.is_unconditional() => return Err(error),
            Err(error) => {
                tracing::warn!(pid, %error, "preferred signal failed");
            }
        }

        tracing::info!(pid, from = %preferred, "escalating to KILL");
        if self.terminator.terminate(pid, KillSignal::Kill)? {
            Ok(KillSignal::Kill)
        } else {
            Err(TerminateError::Exhausted {
                pid,
                signal: KillSignal::Kill,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
