use crate::sys::ListingSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("invalid toolchain version: {0}")]
    InvalidVersion(String),
    #[error("could not detect toolchain version: {0}")]
    Detect(#[from] std::io::Error),
}

/// Version of the installed developer toolchain (Xcode). Decides which
/// listing format and which shutdown signal apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolchainVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolchainVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= Self::new(major, minor, 0)
    }

    /// Asks `xcodebuild` which toolchain is active.
    pub fn detect(source: &dyn ListingSource) -> Result<Self, ToolchainError> {
        let output = source.run("xcrun", &["xcodebuild", "-version"])?;
        parse_xcodebuild_output(&output)
    }
}

/// Reads the `Xcode X.Y[.Z]` line of `xcodebuild -version` output.
pub fn parse_xcodebuild_output(output: &str) -> Result<ToolchainVersion, ToolchainError> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Xcode "))
        .ok_or_else(|| ToolchainError::InvalidVersion(output.trim().to_string()))?
        .parse()
}

impl FromStr for ToolchainVersion {
    type Err = ToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ToolchainError::InvalidVersion(s.to_string());
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
