//! Cross-step source references of the form `subtask-<N>/<file>[#<section>]`.
//!
//! A reference may appear anywhere in a source string, so `./subtask-2/out.md`
//! and `iteration-1/subtask-2/out.md` both point at step 2.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

lazy_static! {
    static ref SOURCE_REF: Regex =
        Regex::new(r"subtask-(\d+)/([^#]+)(?:#(.+))?").expect("source reference pattern");
}

/// Whether `path` names a file below its base directory: relative, with no
/// `..` segments
pub fn is_contained(path: &str) -> bool {
    let mut named = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    named
}

/// A parsed reference to an earlier subtask's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Referenced subtask's sequence number; 0 when the digits overflow `u32`
    pub step: u32,
    /// Step number exactly as written in the source
    pub digits: String,
    /// File path relative to the referenced subtask's directory
    pub file: String,
    /// Optional markdown section id
    pub section: Option<String>,
}

impl SourceRef {
    /// Parse a source string; `None` for sources that are not step references.
    ///
    /// Step numbers too large for `u32` parse as step 0, which no plan can
    /// satisfy. `digits` keeps the original text for diagnostics.
    pub fn parse(source: &str) -> Option<Self> {
        let caps = SOURCE_REF.captures(source.trim())?;
        let digits = caps[1].to_string();
        Some(Self {
            step: digits.parse().unwrap_or(0),
            digits,
            file: caps[2].trim_end().to_string(),
            section: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    /// Location of the referenced file inside an iteration workspace
    pub fn resolve(&self, iteration_dir: &Path) -> PathBuf {
        iteration_dir
            .join(format!("subtask-{}", self.step))
            .join(&self.file)
    }
}
