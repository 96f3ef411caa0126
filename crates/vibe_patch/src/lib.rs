//! # vibe_patch
//!
//! Structural patching of generated source files.
//!
//! A file is split into named *blocks*: a function or type declaration and
//! every line that follows it up to the next declaration. Imports are
//! collected into a single `_imports` aggregate. Two block sets are diffed by
//! name, and the changed or new blocks are merged back into the original
//! text. Identity is purely name-based: there is no scope tracking, and the
//! later of two same-named blocks wins.
//!
//! # Example
//!
//! ```rust
//! use vibe_patch::{BlockSyntax, PatchSet, StructuralPatcher};
//!
//! let base = "def add(a, b):\n    return a - b\n";
//! let fixed = "def add(a, b):\n    return a + b\n";
//!
//! let patcher = StructuralPatcher::new(BlockSyntax::python());
//! let patch: PatchSet = patcher.diff_sources(base, fixed);
//! assert_eq!(patch.len(), 1);
//! assert_eq!(patcher.apply(base, &patch), fixed);
//! ```

pub mod blocks;
pub mod error;
pub mod patch;

pub use blocks::{BlockMap, BlockSyntax, CodeBlock, IMPORTS_BLOCK};
pub use error::{PatchError, PatchResult};
pub use patch::{extract_code, PatchOutcome, PatchSet, StructuralPatcher};
