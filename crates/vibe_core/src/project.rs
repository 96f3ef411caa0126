//! Generated project trees and writing them to disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vibe_patch::extract_code;

use crate::error::{CoreError, CoreResult};

/// Relative path to file content or to a nested directory, in the order the
/// model produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectSpec {
    entries: Map<String, Value>,
}

impl ProjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(path.into(), Value::String(content.into()));
        self
    }

    /// Add a nested directory.
    pub fn dir(mut self, name: impl Into<String>, spec: ProjectSpec) -> Self {
        self.entries.insert(name.into(), Value::Object(spec.entries));
        self
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the model's generation output.
    ///
    /// The output must be a JSON object, optionally wrapped in a markdown
    /// fence.
    pub fn parse(response: &str) -> CoreResult<Self> {
        let body = extract_code(response);
        let value: Value = serde_json::from_str(body.trim())
            .map_err(|e| CoreError::GenerationParse(e.to_string()))?;

        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(CoreError::GenerationParse(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<Map<String, Value>> for ProjectSpec {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Whether `name` stays inside the directory it is joined to.
fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Write `spec` under `root`.
///
/// Directories are created as needed and existing files overwritten. Entries
/// that are neither text nor objects, or whose names would escape `root`,
/// are skipped. Nothing is rolled back when a write fails part way.
/// Returns the files written, in order.
pub fn materialize(root: &Path, spec: &ProjectSpec) -> CoreResult<Vec<PathBuf>> {
    fs::create_dir_all(root).map_err(|source| CoreError::Materialize {
        path: root.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    write_entries(root, &spec.entries, &mut written)?;
    info!("Project created at {:?} ({} files)", root, written.len());
    Ok(written)
}

fn write_entries(
    dir: &Path,
    entries: &Map<String, Value>,
    written: &mut Vec<PathBuf>,
) -> CoreResult<()> {
    for (name, content) in entries {
        if !is_contained(name) {
            warn!("Skipping entry outside the project: {}", name);
            continue;
        }
        let path = dir.join(name);

        match content {
            Value::String(text) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|source| CoreError::Materialize {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                fs::write(&path, text).map_err(|source| CoreError::Materialize {
                    path: path.clone(),
                    source,
                })?;
                debug!("Wrote {:?}", path);
                written.push(path);
            }
            Value::Object(children) => {
                fs::create_dir_all(&path).map_err(|source| CoreError::Materialize {
                    path: path.clone(),
                    source,
                })?;
                write_entries(&path, children, written)?;
            }
            other => warn!("Unexpected content type for {}: {}", name, json_kind(other)),
        }
    }
    Ok(())
}
