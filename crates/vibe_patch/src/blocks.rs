//! Splitting source text into named blocks.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Name of the aggregate entry collecting every import line of a file.
pub const IMPORTS_BLOCK: &str = "_imports";

/// A named, contiguous unit of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Declared identifier, or [`IMPORTS_BLOCK`]
    pub name: String,
    /// Lines of the block, opening line included
    pub body: Vec<String>,
}

impl CodeBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
        }
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Whether this is the import aggregate rather than a declaration.
    pub fn is_imports(&self) -> bool {
        self.name == IMPORTS_BLOCK
    }

    /// Body joined with newlines.
    pub fn text(&self) -> String {
        self.body.join("\n")
    }
}

/// Blocks of one file keyed by name, in first-seen order.
///
/// Inserting a name that already exists replaces its body but keeps its
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMap {
    blocks: Vec<CodeBlock>,
    index: HashMap<String, usize>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block; a same-named block is overwritten.
    pub fn insert(&mut self, block: CodeBlock) {
        match self.index.get(&block.name) {
            Some(&i) => self.blocks[i] = block,
            None => {
                self.index.insert(block.name.clone(), self.blocks.len());
                self.blocks.push(block);
            }
        }
    }

    fn push_import(&mut self, line: &str) {
        match self.index.get(IMPORTS_BLOCK) {
            Some(&i) => self.blocks[i].body.push(line.to_string()),
            None => self.insert(CodeBlock::new(IMPORTS_BLOCK).with_lines([line])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CodeBlock> {
        self.index.get(name).map(|&i| &self.blocks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }
}

impl FromIterator<CodeBlock> for BlockMap {
    fn from_iter<T: IntoIterator<Item = CodeBlock>>(iter: T) -> Self {
        let mut map = Self::new();
        for block in iter {
            map.insert(block);
        }
        map
    }
}

/// How declarations and imports are recognized in a language.
#[derive(Debug, Clone)]
pub struct BlockSyntax {
    block_keywords: Vec<String>,
    import_keywords: Vec<String>,
    indent: String,
    opener: Regex,
}

impl BlockSyntax {
    /// Build a syntax from keyword lists and the one-level indent unit.
    pub fn new(block_keywords: &[&str], import_keywords: &[&str], indent: &str) -> Self {
        let alternatives = block_keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let opener = Regex::new(&format!(r"^(?:{})\s+(\w+)", alternatives))
            .expect("escaped keywords form a valid pattern");

        Self {
            block_keywords: block_keywords.iter().map(|k| k.to_string()).collect(),
            import_keywords: import_keywords.iter().map(|k| k.to_string()).collect(),
            indent: indent.to_string(),
            opener,
        }
    }

    /// `def`/`class` blocks, `import`/`from` imports, four-space indent.
    pub fn python() -> Self {
        Self::new(&["def", "class"], &["import", "from"], "    ")
    }

    pub fn block_keywords(&self) -> &[String] {
        &self.block_keywords
    }

    /// The fixed indent unit used when skipping a replaced block.
    pub fn indent(&self) -> &str {
        &self.indent
    }

    /// Name declared by `line` when it opens a block.
    pub fn block_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        let trimmed = line.trim();
        self.opener
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Whether `line` is an import statement.
    pub fn is_import(&self, line: &str) -> bool {
        let trimmed = line.trim();
        self.import_keywords.iter().any(|k| {
            trimmed
                .strip_prefix(k.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
        })
    }

    /// Split `source` into blocks.
    ///
    /// Lines before the first declaration that are not imports belong to no
    /// block and are dropped. Import lines always go to the aggregate, even
    /// when they sit inside a declaration.
    pub fn parse(&self, source: &str) -> BlockMap {
        let mut map = BlockMap::new();
        let mut current: Option<CodeBlock> = None;

        for line in source.lines() {
            if let Some(name) = self.block_name(line) {
                if let Some(done) = current.take() {
                    map.insert(done);
                }
                current = Some(CodeBlock::new(name).with_lines([line]));
            } else if self.is_import(line) {
                map.push_import(line);
            } else if let Some(block) = current.as_mut() {
                block.body.push(line.to_string());
            }
        }

        if let Some(done) = current {
            map.insert(done);
        }
        map
    }
}

impl Default for BlockSyntax {
    fn default() -> Self {
        Self::python()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_name_detection() {
        let syntax = BlockSyntax::python();
        assert_eq!(syntax.block_name("def main():"), Some("main"));
        assert_eq!(syntax.block_name("    def method(self):"), Some("method"));
        assert_eq!(syntax.block_name("class Game(object):"), Some("Game"));
        assert_eq!(syntax.block_name("define = 3"), None);
        assert_eq!(syntax.block_name("classes = []"), None);
        assert_eq!(syntax.block_name("def (broken"), None);
        assert_eq!(syntax.block_name("# def commented()"), None);
    }

    #[test]
    fn test_import_detection() {
        let syntax = BlockSyntax::python();
        assert!(syntax.is_import("import os"));
        assert!(syntax.is_import("from typing import List"));
        assert!(syntax.is_import("    import json"));
        assert!(!syntax.is_import("imported = True"));
        assert!(!syntax.is_import("fromage = 'brie'"));
    }

    #[test]
    fn test_parse_blocks_and_imports() {
        let source = "\
import os
from sys import argv

def greet(name):
    return 'hi ' + name

class Counter:
    def __init__(self):
        self.n = 0
";
        let blocks = BlockSyntax::python().parse(source);

        assert_eq!(blocks.names(), vec!["_imports", "greet", "Counter", "__init__"]);
        assert_eq!(
            blocks.get(IMPORTS_BLOCK).unwrap().body,
            vec!["import os", "from sys import argv"]
        );
        assert_eq!(
            blocks.get("greet").unwrap().body,
            vec!["def greet(name):", "    return 'hi ' + name", ""]
        );
        // No nesting: the method opens its own block and ends the class.
        assert_eq!(blocks.get("Counter").unwrap().body, vec!["class Counter:"]);
        assert_eq!(
            blocks.get("__init__").unwrap().text(),
            "    def __init__(self):\n        self.n = 0"
        );
    }

    #[test]
    fn test_leading_statements_are_dropped() {
        let source = "x = 1\nprint(x)\ndef f():\n    pass\n";
        let blocks = BlockSyntax::python().parse(source);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks.get("f").unwrap().body, vec!["def f():", "    pass"]);
    }

    #[test]
    fn test_trailing_statements_join_last_block() {
        let source = "def f():\n    return 1\n\nprint(f())\n";
        let blocks = BlockSyntax::python().parse(source);
        assert_eq!(
            blocks.get("f").unwrap().body,
            vec!["def f():", "    return 1", "", "print(f())"]
        );
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let source = "def f():\n    return 1\ndef g():\n    pass\ndef f():\n    return 2\n";
        let blocks = BlockSyntax::python().parse(source);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks.names(), vec!["f", "g"]);
        assert_eq!(blocks.get("f").unwrap().body, vec!["def f():", "    return 2"]);
    }

    #[test]
    fn test_nested_import_goes_to_aggregate() {
        let source = "def load():\n    import json\n    return json\n";
        let blocks = BlockSyntax::python().parse(source);
        assert_eq!(
            blocks.get("load").unwrap().body,
            vec!["def load():", "    return json"]
        );
        assert_eq!(blocks.get(IMPORTS_BLOCK).unwrap().body, vec!["    import json"]);
    }

    #[test]
    fn test_custom_syntax() {
        let js = BlockSyntax::new(&["function", "class"], &["import"], "  ");
        let blocks = js.parse("import fs from 'fs';\nfunction run() {\n  go();\n}\n");
        assert_eq!(blocks.names(), vec!["_imports", "run"]);
        assert_eq!(js.indent(), "  ");
        assert_eq!(js.block_keywords(), &["function".to_string(), "class".to_string()]);
    }

    #[test]
    fn test_empty_source() {
        assert!(BlockSyntax::python().parse("").is_empty());
    }
}
