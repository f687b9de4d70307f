use crate::sys;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("invalid environment pair `{0}`, expected KEY=VALUE")]
    InvalidEnv(String),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },
}

/// Everything needed to start `instruments` against one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub launcher: String,
    pub device: String,
    pub trace_dir: Option<PathBuf>,
    pub template: String,
    pub bundle: String,
    pub env: Vec<(String, String)>,
    pub extra_args: Vec<String>,
    pub log_file: PathBuf,
}

impl LaunchOptions {
    /// Arguments passed to the launcher, starting with the tool name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            crate::ps::TOOL_NAME.to_string(),
            "-w".to_string(),
            self.device.clone(),
        ];
        if let Some(ref trace_dir) = self.trace_dir {
            args.push("-D".to_string());
            args.push(trace_dir.to_string_lossy().into_owned());
        }
        args.push("-t".to_string());
        args.push(self.template.clone());
        args.push(self.bundle.clone());
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(key.clone());
            args.push(value.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.launcher);
        cmd.args(self.args());
        cmd
    }
}

/// Splits a shell-quoted argument string.
pub fn parse_extra_args(input: &str) -> Result<Vec<String>, LaunchError> {
    shell_words::split(input).map_err(|e| LaunchError::InvalidArgs(e.to_string()))
}

pub fn parse_env_pair(pair: &str) -> Result<(String, String), LaunchError> {
    let Some((key, value)) = pair.split_once('=') else {
        return Err(LaunchError::InvalidEnv(pair.to_string()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(LaunchError::InvalidEnv(pair.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Starts the tool in its own process group with stdout and stderr appended
/// to the log file, and returns its pid without waiting for it.
pub fn spawn_detached(options: &LaunchOptions) -> Result<u32, LaunchError> {
    let log_error = |source| LaunchError::LogFile {
        path: options.log_file.clone(),
        source,
    };
    let stdout = sys::open_log_file(&options.log_file).map_err(log_error)?;
    let stderr = stdout.try_clone().map_err(log_error)?;

    let mut cmd = options.command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    sys::configure_detached_cmd(&mut cmd);

    let mut child = cmd.spawn().map_err(|source| LaunchError::SpawnFailed {
        program: options.launcher.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::info!(pid, device = %options.device, log = %options.log_file.display(), "launched instruments");

    // Reap on exit so the pid does not linger as a zombie
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}
