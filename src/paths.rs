use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "RUN_LOOP_DATA_DIR";
pub const DATA_DIR_NAME: &str = ".run-loop";

#[derive(Debug, thiserror::Error)]
pub enum PathsError {
    #[error("could not determine home directory")]
    NoHomeDirectory,
}

#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    /// `$RUN_LOOP_DATA_DIR` when set, otherwise `~/.run-loop`.
    pub fn new() -> Result<Self, PathsError> {
        if let Ok(path) = std::env::var(DATA_DIR_ENV) {
            return Ok(Self {
                data_dir: PathBuf::from(path),
            });
        }
        let Some(home) = dirs::home_dir() else {
            return Err(PathsError::NoHomeDirectory);
        };
        Ok(Self {
            data_dir: home.join(DATA_DIR_NAME),
        })
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { data_dir: base }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn host_cache_dir(&self) -> PathBuf {
        self.data_dir.join("host-cache")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn tool_log(&self) -> PathBuf {
        self.log_dir().join("instruments.log")
    }
}
