//! Core input types handed over by the file enumerator and import analyzer

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Source language, detected from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project file as reported by the file enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Project-relative path
    pub path: PathBuf,
    pub language: Language,
    /// Modification signal (mtime or digest). Only used to detect change.
    #[serde(default)]
    pub stamp: Option<u64>,
}

impl SourceFile {
    /// Creates a source file with the language detected from its extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let language = Language::from_path(&path);
        Self {
            path,
            language,
            stamp: None,
        }
    }

    pub fn with_stamp(mut self, stamp: u64) -> Self {
        self.stamp = Some(stamp);
        self
    }
}

/// A raw import as extracted from one source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportReference {
    /// The importing file
    pub source: PathBuf,
    /// Raw module or path string, exactly as written
    pub module: String,
    /// Number of leading relative markers, when the analyzer already counted them
    #[serde(default)]
    pub relative_depth: Option<usize>,
}

impl ImportReference {
    pub fn new(source: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            module: module.into(),
            relative_depth: None,
        }
    }

    pub fn relative(source: impl Into<PathBuf>, module: impl Into<String>, depth: usize) -> Self {
        Self {
            source: source.into(),
            module: module.into(),
            relative_depth: Some(depth),
        }
    }
}

/// Collapses `.` and `..` components lexically.
///
/// Returns `None` when the path climbs above the project root or is absolute,
/// since neither can name an in-project file.
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
