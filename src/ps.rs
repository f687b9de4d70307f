use crate::sys::ListingSource;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const PS_PROGRAM: &str = "ps";
pub const PS_ARGS: [&str; 3] = ["x", "-o", "pid,command"];

pub const TOOL_NAME: &str = "instruments";
/// Present in the command line of the real binary, absent from shell
/// wrappers such as `xcrun instruments ...` that launch it.
pub const TOOL_EXECUTABLE_MARKER: &str = "/usr/bin/instruments";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to list processes: {0}")]
    Command(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command_line: String,
}

/// Which lines of a process listing count as the supervised tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMatcher {
    pub name: String,
    pub executable_marker: String,
}

impl Default for ToolMatcher {
    fn default() -> Self {
        Self {
            name: TOOL_NAME.to_string(),
            executable_marker: TOOL_EXECUTABLE_MARKER.to_string(),
        }
    }
}

impl ToolMatcher {
    pub fn matches(&self, command_line: &str) -> bool {
        command_line.contains(&self.name)
            && command_line.contains(&self.executable_marker)
            && !is_filter_process(command_line)
    }
}

fn is_filter_process(command_line: &str) -> bool {
    command_line
        .split_whitespace()
        .next()
        .is_some_and(|program| program == "grep" || program.ends_with("/grep"))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses one `<pid> <command...>` line. Header lines, blank lines and lines
/// whose pid is not in `1..=i32::MAX` yield `None`.
pub fn parse_line(line: &str) -> Option<ProcessRecord> {
    let mut tokens = line.split_whitespace();
    let pid: i32 = tokens.next()?.parse().ok()?;
    if pid <= 0 {
        return None;
    }
    let pid = pid as u32;
    let command_line = tokens.collect::<Vec<_>>().join(" ");
    if command_line.is_empty() {
        return None;
    }
    Some(ProcessRecord { pid, command_line })
}

/// Extracts the tool's processes from raw listing text, sorted by pid and
/// deduplicated.
pub fn parse_listing(text: &str, matcher: &ToolMatcher) -> Vec<ProcessRecord> {
    let mut records: Vec<ProcessRecord> = text
        .lines()
        .filter_map(|line| {
            let record = parse_line(line);
            if record.is_none() && !line.trim().is_empty() {
                tracing::trace!(line, "skipping unparseable process line");
            }
            record
        })
        .filter(|record| matcher.matches(&record.command_line))
        .collect();

    records.sort();
    records.dedup_by_key(|record| record.pid);
    records
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Runs the process listing and returns every instance of the tool, excluding
/// the calling process itself.
pub fn list_matching(
    source: &dyn ListingSource,
    matcher: &ToolMatcher,
) -> Result<Vec<ProcessRecord>, ListError> {
    let text = source.run(PS_PROGRAM, &PS_ARGS)?;
    let own_pid = std::process::id();
    let records: Vec<ProcessRecord> = parse_listing(&text, matcher)
        .into_iter()
        .filter(|record| record.pid != own_pid)
        .collect();
    tracing::debug!(count = records.len(), tool = %matcher.name, "listed tool processes");
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
