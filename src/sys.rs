use std::io;
use std::path::Path;
use std::process::Command;

// =========================================================================
// Unix implementation
// =========================================================================

#[cfg(unix)]
mod platform {
    use super::*;
    use std::os::unix::process::CommandExt;

    pub use nix::sys::signal::Signal;

    /// Outcome of handing a signal to the kernel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Delivery {
        Sent,
        NoSuchProcess,
    }

    /// Pids outside `1..=i32::MAX` would address process groups or every
    /// process, so they are refused.
    fn os_pid(pid: u32) -> io::Result<nix::unistd::Pid> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(nix::unistd::Pid::from_raw(raw)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pid {pid} is out of range"),
            )),
        }
    }

    pub fn send_signal(pid: u32, signal: Signal) -> io::Result<Delivery> {
        match nix::sys::signal::kill(os_pid(pid)?, signal) {
            Ok(()) => Ok(Delivery::Sent),
            Err(nix::errno::Errno::ESRCH) => Ok(Delivery::NoSuchProcess),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    pub fn check_pid(pid: u32) -> io::Result<bool> {
        match nix::sys::signal::kill(os_pid(pid)?, None) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            // Exists, but owned by someone else
            Err(nix::errno::Errno::EPERM) => Ok(true),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    pub fn configure_detached_cmd(cmd: &mut Command) {
        cmd.process_group(0);
    }
}

// =========================================================================
// Fallback for targets without POSIX signals
// =========================================================================

#[cfg(not(unix))]
mod platform {
    use super::*;

    #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Signal {
        SIGQUIT,
        SIGTERM,
        SIGKILL,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Delivery {
        Sent,
        NoSuchProcess,
    }

    pub fn send_signal(_pid: u32, _signal: Signal) -> io::Result<Delivery> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signals are not supported on this platform",
        ))
    }

    pub fn check_pid(_pid: u32) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "liveness probes are not supported on this platform",
        ))
    }

    pub fn configure_detached_cmd(_cmd: &mut Command) {}
}

pub use platform::*;

// =========================================================================
// External commands
// =========================================================================

/// Runs `program args...` to completion and returns its stdout.
///
/// A non-zero exit is an error carrying the program's stderr.
pub fn capture_stdout(program: &str, args: &[&str]) -> io::Result<String> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "`{program} {}` exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Source of text produced by an external listing command.
///
/// The OS-backed implementation is [`CommandRunner`]; tests substitute canned
/// output.
pub trait ListingSource {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandRunner;

impl ListingSource for CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        capture_stdout(program, args)
    }
}

/// Opens `path` for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
