//! Diffing block sets and merging them into a base file.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blocks::{BlockMap, BlockSyntax, CodeBlock, IMPORTS_BLOCK};
use crate::error::{PatchError, PatchResult};

/// Blocks to insert or overwrite, in the order they appear in the new source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    blocks: BlockMap,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: CodeBlock) {
        self.blocks.insert(block);
    }

    pub fn get(&self, name: &str) -> Option<&CodeBlock> {
        self.blocks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains(name)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks.names()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter()
    }
}

impl FromIterator<CodeBlock> for PatchSet {
    fn from_iter<T: IntoIterator<Item = CodeBlock>>(iter: T) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

/// What happened to a patched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PatchOutcome {
    /// Changed or new blocks were merged in
    Merged { blocks: Vec<String> },
    /// The replacement had no blocks and was written wholesale
    Replaced,
    /// Nothing differed
    Unchanged,
}

/// Block-level diff and merge for one language.
#[derive(Debug, Clone, Default)]
pub struct StructuralPatcher {
    syntax: BlockSyntax,
}

impl StructuralPatcher {
    pub fn new(syntax: BlockSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> &BlockSyntax {
        &self.syntax
    }

    pub fn parse(&self, source: &str) -> BlockMap {
        self.syntax.parse(source)
    }

    /// Blocks of `new` that are absent from `old` or differ textually.
    ///
    /// Blocks only present in `old` are never reported: patches do not delete.
    pub fn diff(&self, old: &BlockMap, new: &BlockMap) -> PatchSet {
        new.iter()
            .filter(|block| old.get(&block.name).map_or(true, |o| o.body != block.body))
            .cloned()
            .collect()
    }

    pub fn diff_sources(&self, old: &str, new: &str) -> PatchSet {
        self.diff(&self.parse(old), &self.parse(new))
    }

    /// Merge `patch` into `base`.
    ///
    /// A patched block replaces the original at its opening line; the old
    /// continuation is skipped while lines are empty or start with exactly
    /// one indent unit. Irregularly indented bodies may therefore be removed
    /// only partially. Entries whose name appears nowhere in `base` are
    /// appended at the end. Missing import lines are inserted after the last
    /// top-level import.
    pub fn apply(&self, base: &str, patch: &PatchSet) -> String {
        let indent = self.syntax.indent();
        let newline = if base.contains("\r\n") { "\r\n" } else { "\n" };
        let mut lines: Vec<String> = Vec::new();
        let mut skipping = false;

        for line in base.lines() {
            if let Some(name) = self.syntax.block_name(line) {
                if name != IMPORTS_BLOCK {
                    if let Some(block) = patch.get(name) {
                        lines.extend(block.body.iter().cloned());
                        skipping = true;
                        continue;
                    }
                }
            }

            if skipping {
                if line.is_empty() || line.starts_with(indent) {
                    continue;
                }
                skipping = false;
            }

            lines.push(line.to_string());
        }

        if let Some(imports) = patch.get(IMPORTS_BLOCK) {
            self.merge_imports(base, imports, &mut lines);
        }

        for block in patch.iter().filter(|b| !b.is_imports()) {
            if !base.contains(block.name.as_str()) {
                debug!("Appending new block '{}'", block.name);
                lines.extend(block.body.iter().cloned());
            }
        }

        let mut patched = lines.join(newline);
        if base.ends_with('\n') {
            patched.push_str(newline);
        }
        patched
    }

    fn merge_imports(&self, base: &str, imports: &CodeBlock, lines: &mut Vec<String>) {
        let existing: Vec<&str> = base.lines().map(str::trim).collect();
        let mut missing: Vec<String> = Vec::new();
        for line in &imports.body {
            let trimmed = line.trim();
            if !trimmed.is_empty()
                && !existing.contains(&trimmed)
                && !missing.iter().any(|m| m == trimmed)
            {
                missing.push(trimmed.to_string());
            }
        }
        if missing.is_empty() {
            return;
        }

        debug!("Adding {} import line(s)", missing.len());
        let position = lines
            .iter()
            .rposition(|l| self.syntax.is_import(l) && !l.starts_with(char::is_whitespace))
            .map_or(0, |i| i + 1);
        for (offset, line) in missing.into_iter().enumerate() {
            lines.insert(position + offset, line);
        }
    }

    /// Patch `base` with the code carried by an LLM `reply`.
    ///
    /// A reply without any blocks (a flat script) replaces the file as a
    /// whole, since there is nothing to merge by name.
    pub fn patch_source(&self, base: &str, reply: &str) -> (String, PatchOutcome) {
        let code = extract_code(reply);
        let new_blocks = self.parse(&code);

        if new_blocks.is_empty() {
            if code.trim().is_empty() || code.trim() == base.trim() {
                return (base.to_string(), PatchOutcome::Unchanged);
            }
            let mut replaced = code.trim_end().to_string();
            replaced.push('\n');
            return (replaced, PatchOutcome::Replaced);
        }

        let patch = self.diff(&self.parse(base), &new_blocks);
        if patch.is_empty() {
            return (base.to_string(), PatchOutcome::Unchanged);
        }

        let names = patch.names().iter().map(|n| n.to_string()).collect();
        (self.apply(base, &patch), PatchOutcome::Merged { blocks: names })
    }

    /// Load `path`, patch it with `reply` and save it.
    pub fn patch_file(&self, path: &Path, reply: &str) -> PatchResult<PatchOutcome> {
        if !path.is_file() {
            return Err(PatchError::FileNotFound(path.to_path_buf()));
        }
        if extract_code(reply).trim().is_empty() {
            return Err(PatchError::EmptyReplacement(path.display().to_string()));
        }

        let base = fs::read_to_string(path)?;
        let (patched, outcome) = self.patch_source(&base, reply);

        match &outcome {
            PatchOutcome::Unchanged => info!("No block changes for {:?}", path),
            PatchOutcome::Replaced => {
                fs::write(path, &patched)?;
                info!("Replaced {:?} wholesale", path);
            }
            PatchOutcome::Merged { blocks } => {
                fs::write(path, &patched)?;
                info!("Patched {:?} ({})", path, blocks.join(", "));
            }
        }
        Ok(outcome)
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[\w+#.\-]*[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
    })
}

/// Code carried by an LLM reply: the first fenced block, or the whole reply.
pub fn extract_code(reply: &str) -> String {
    match fence_pattern().captures(reply).and_then(|c| c.get(1)) {
        Some(code) => code.as_str().to_string(),
        None => reply.to_string(),
    }
}
