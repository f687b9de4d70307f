use crate::sys::{self, Delivery, Signal};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_ATTEMPTS: u32 = 20;
pub const DEFAULT_INTERVAL_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    #[error("failed to send {signal} to {pid}: {source}")]
    Signal {
        pid: u32,
        signal: KillSignal,
        source: io::Error,
    },
    #[error("failed to probe {pid}: {source}")]
    Probe { pid: u32, source: io::Error },
    #[error("process {pid} survived {signal}")]
    Exhausted { pid: u32, signal: KillSignal },
}

// ---------------------------------------------------------------------------
// KillSignal
// ---------------------------------------------------------------------------

/// Termination signals, ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KillSignal {
    Quit,
    Term,
    Kill,
}

impl KillSignal {
    pub fn is_unconditional(self) -> bool {
        self == KillSignal::Kill
    }

    pub fn as_os_signal(self) -> Signal {
        match self {
            KillSignal::Quit => Signal::SIGQUIT,
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillSignal::Quit => write!(f, "QUIT"),
            KillSignal::Term => write!(f, "TERM"),
            KillSignal::Kill => write!(f, "KILL"),
        }
    }
}

impl FromStr for KillSignal {
    type Err = TerminateError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let upper = name.trim().to_uppercase();
        let normalized = upper.strip_prefix("SIG").unwrap_or(&upper);
        match normalized {
            "QUIT" | "3" => Ok(KillSignal::Quit),
            "TERM" | "15" => Ok(KillSignal::Term),
            "KILL" | "9" => Ok(KillSignal::Kill),
            _ => Err(TerminateError::InvalidSignal(name.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Process control seam
// ---------------------------------------------------------------------------

pub trait ProcessControl {
    fn send(&self, pid: u32, signal: KillSignal) -> io::Result<Delivery>;
    fn is_alive(&self, pid: u32) -> io::Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessControl;

impl ProcessControl for OsProcessControl {
    fn send(&self, pid: u32, signal: KillSignal) -> io::Result<Delivery> {
        sys::send_signal(pid, signal.as_os_signal())
    }

    fn is_alive(&self, pid: u32) -> io::Result<bool> {
        sys::check_pid(pid)
    }
}

// ---------------------------------------------------------------------------
// Terminator
// ---------------------------------------------------------------------------

/// Sends one signal and waits, within a fixed polling budget, for the target
/// to disappear.
#[derive(Debug, Clone)]
pub struct Terminator<C = OsProcessControl> {
    control: C,
    attempts: u32,
    interval: Duration,
}

impl Default for Terminator<OsProcessControl> {
    fn default() -> Self {
        Self::new(OsProcessControl)
    }
}

impl<C: ProcessControl> Terminator<C> {
    pub fn new(control: C) -> Self {
        Self {
            control,
            attempts: DEFAULT_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        }
    }

    pub fn with_budget(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Returns `Ok(true)` once `pid` is confirmed gone, `Ok(false)` if it is
    /// still alive after the polling budget. A pid that is already gone counts
    /// as terminated and receives no signal.
    pub fn terminate(&self, pid: u32, signal: KillSignal) -> Result<bool, TerminateError> {
        if !self.probe(pid)? {
            tracing::debug!(pid, "process already gone");
            return Ok(true);
        }

        let delivery = self
            .control
            .send(pid, signal)
            .map_err(|source| TerminateError::Signal {
                pid,
                signal,
                source,
            })?;
        if delivery == Delivery::NoSuchProcess {
            tracing::debug!(pid, %signal, "process exited before signal delivery");
            return Ok(true);
        }
        tracing::debug!(pid, %signal, "sent signal");

        for _ in 0..self.attempts {
            std::thread::sleep(self.interval);
            if !self.probe(pid)? {
                tracing::info!(pid, %signal, "process terminated");
                return Ok(true);
            }
        }

        tracing::warn!(pid, %signal, attempts = self.attempts, "process survived signal");
        Ok(false)
    }

    fn probe(&self, pid: u32) -> Result<bool, TerminateError> {
        self.control
            .is_alive(pid)
            .map_err(|source| TerminateError::Probe { pid, source })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
