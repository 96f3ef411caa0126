//! Crash diagnostics and the file-request side of the fix conversation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// Headline used when a failure produced no text at all.
pub const UNKNOWN_ERROR: &str = "Unknown error";

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"File "(.*?)", line (\d+)"#).expect("frame pattern is valid")
    })
}

fn request_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Please show me ([\w\.]+)").expect("request pattern is valid")
    })
}

fn command_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*COMMAND:\s*(.+?)\s*$").expect("command pattern is valid")
    })
}

/// What a crash report says about the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosedCrash {
    /// Last non-empty line of the report
    pub headline: String,
    /// Base name of the file in the innermost stack frame
    pub culprit_file: Option<String>,
    /// Line number of that frame
    pub line: Option<u32>,
}

/// Extract the headline and culprit file from crash output.
///
/// The culprit comes from the last `File "<path>", line <n>` frame, which is
/// where the error was raised.
pub fn diagnose(output: &str) -> DiagnosedCrash {
    let frame = frame_pattern().captures_iter(output).last();
    let culprit_file = frame.as_ref().and_then(|c| c.get(1)).and_then(|m| {
        Path::new(m.as_str())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    });
    let line = frame
        .as_ref()
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse().ok());

    let headline = output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .last()
        .unwrap_or(UNKNOWN_ERROR)
        .to_string();

    DiagnosedCrash {
        headline,
        culprit_file,
        line,
    }
}

/// File names the model asked to see, in order.
pub fn requested_files(reply: &str) -> Vec<String> {
    request_pattern()
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Corrected run command proposed by the model with a `COMMAND:` line.
pub fn requested_command(reply: &str) -> Option<String> {
    command_pattern()
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('`').trim().to_string())
        .filter(|cmd| !cmd.is_empty())
}

/// Locate `name` in the project: directly under `root`, else by base name
/// anywhere in the tree.
pub fn find_project_file(root: &Path, name: &str) -> Option<PathBuf> {
    let direct = root.join(name);
    if direct.is_file() {
        return Some(direct);
    }

    let base = Path::new(name).file_name()?;
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == base)
        .map(|e| e.into_path())
}

/// Contents of a project file, or `None` when it is missing, unreadable or
/// empty.
pub fn load_project_file(root: &Path, name: &str) -> Option<String> {
    let path = find_project_file(root, name)?;
    match std::fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            debug!("{:?} is empty", path);
            None
        }
        Err(e) => {
            debug!("Cannot read {:?}: {}", path, e);
            None
        }
    }
}
