use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::{Language, SourceFile};

pub fn walk_directory(path: &Path, ignore_patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(path);

    // Override globs: "!pattern" excludes, a bare pattern would whitelist
    let mut override_builder = ignore::overrides::OverrideBuilder::new(path);
    for pattern in ignore_patterns {
        override_builder.add(&format!("!{}", pattern))?;
    }
    let overrides = override_builder.build()?;

    builder.overrides(overrides);

    // Standard gitignore is on by default.
    builder.standard_filters(true);

    let walker = builder.build();
    let mut files = Vec::new();

    for result in walker {
        match result {
            Ok(entry) => {
                if entry.file_type().is_some_and(|ft| ft.is_file()) {
                    files.push(entry.into_path());
                }
            }
            Err(err) => warn!(error = %err, "error walking directory"),
        }
    }

    files.sort();
    Ok(files)
}

/// Modification time in nanoseconds, so edits within the same second differ.
fn get_modified_time(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
}

/// Source files below `root` in a supported language, with project-relative
/// paths and modification stamps.
pub fn discover_sources(root: &Path, ignore_patterns: &[String]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for path in walk_directory(root, ignore_patterns)? {
        if Language::from_path(&path) == Language::Unknown {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let mut file = SourceFile::new(relative);
        file.stamp = get_modified_time(&path);
        sources.push(file);
    }
    Ok(sources)
}
