use crate::sys::ListingSource;
use crate::toolchain::ToolchainVersion;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+(?:\.\d+)?").unwrap());

/// Bracketed CoreSimulator UDID: `[8-4-4-4-12]` hex.
static SIMULATOR_UDID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})\]",
    )
    .unwrap()
});

/// Bracketed hardware UDID: 40 hex digits, or the newer `8-16` hex form.
static DEVICE_UDID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([0-9A-Fa-f]{40}|[0-9A-Fa-f]{8}-[0-9A-Fa-f]{16})\]").unwrap()
});

static LEGACY_SIMULATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?) - Simulator - (.+)$").unwrap());

/// Marks a simulator listed together with its paired companion device.
pub const PAIRED_MARKER: &str = " + ";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no device listing format is known for {0}")]
    UnsupportedFormat(String),
    #[error("failed to list devices: {0}")]
    Command(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A simulator or physical device. Two devices are equal when their
/// identifiers are.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub name: String,
    pub os_version: String,
    pub identifier: String,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// Listing layout emitted by `instruments -s devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// `<name> - Simulator - <version>`, no identifiers.
    Legacy,
    /// `<name> (<version>[, <extra>]) [<udid>]`.
    Modern,
}

impl FormatKind {
    pub fn for_toolchain(version: &ToolchainVersion) -> Result<Self, DeviceError> {
        if version.at_least(6, 0) {
            Ok(FormatKind::Modern)
        } else if version.at_least(5, 0) {
            Ok(FormatKind::Legacy)
        } else {
            Err(DeviceError::UnsupportedFormat(format!("toolchain {version}")))
        }
    }
}

impl FromStr for FormatKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(FormatKind::Legacy),
            "modern" => Ok(FormatKind::Modern),
            _ => Err(DeviceError::UnsupportedFormat(format!("format `{s}`"))),
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Legacy => write!(f, "legacy"),
            FormatKind::Modern => write!(f, "modern"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Simulator,
    Physical,
}

// ---------------------------------------------------------------------------
// Line parsers
// ---------------------------------------------------------------------------

fn first_version(line: &str) -> Option<String> {
    VERSION.find(line).map(|m| m.as_str().to_string())
}

fn name_before_paren(line: &str) -> Option<String> {
    let name = line.split('(').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// `<name> - Simulator - <version>`; the whole line, surrounding whitespace
/// included, doubles as identifier.
pub fn parse_legacy_simulator(line: &str) -> Option<Device> {
    let text = line.trim();
    let caps = LEGACY_SIMULATOR.captures(text)?;
    let os_version = first_version(text)?;
    Some(Device {
        name: caps[1].trim().to_string(),
        os_version,
        identifier: line.to_string(),
    })
}

/// A bracketed simulator UDID or the legacy layout; paired entries never
/// qualify.
pub fn parse_modern_simulator(line: &str) -> Option<Device> {
    let text = line.trim();
    if text.contains(PAIRED_MARKER) {
        return None;
    }
    let Some(caps) = SIMULATOR_UDID.captures(text) else {
        return parse_legacy_simulator(line);
    };
    Some(Device {
        name: name_before_paren(text)?,
        os_version: first_version(text)?,
        identifier: caps[1].to_string(),
    })
}

/// Hardware devices need a well-formed bracketed UDID.
pub fn parse_physical_device(line: &str) -> Option<Device> {
    let line = line.trim();
    let caps = DEVICE_UDID.captures(line)?;
    Some(Device {
        name: name_before_paren(line)?,
        os_version: first_version(line)?,
        identifier: caps[1].to_string(),
    })
}

fn line_parser(format: FormatKind, kind: DeviceKind) -> fn(&str) -> Option<Device> {
    match (kind, format) {
        (DeviceKind::Physical, _) => parse_physical_device,
        (DeviceKind::Simulator, FormatKind::Legacy) => parse_legacy_simulator,
        (DeviceKind::Simulator, FormatKind::Modern) => parse_modern_simulator,
    }
}

/// Maps every recognizable line of `raw` to a [`Device`], in listing order.
pub fn parse(raw: &str, format: FormatKind, kind: DeviceKind) -> Vec<Device> {
    let parse_line = line_parser(format, kind);
    raw.lines()
        .filter_map(|line| {
            let device = parse_line(line);
            if device.is_none() && !line.trim().is_empty() {
                tracing::trace!(line, %format, "skipping device line");
            }
            device
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

pub fn list_devices(
    source: &dyn ListingSource,
    format: FormatKind,
    kind: DeviceKind,
) -> Result<Vec<Device>, DeviceError> {
    let raw = source.run("xcrun", &["instruments", "-s", "devices"])?;
    let devices = parse(&raw, format, kind);
    tracing::debug!(count = devices.len(), ?kind, %format, "listed devices");
    Ok(devices)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
