use std::path::Path;

use crate::core::SourceFile;

/// Build priority for graph truncation.
///
/// Heuristics:
/// 1. Entry Points (700): main.rs, lib.rs, index.ts, __init__.py
/// 2. Core Logic (600): core/, app/, model/, src/
/// 3. Default (500)
/// 4. Utilities (400): util/, common/, helper/
/// 5. Tests / Examples / Benches (100)
///
/// Higher score = kept first when the graph is capped.
pub fn priority_score(path: &Path) -> i32 {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let components: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    let dirs = &components[..components.len().saturating_sub(1)];
    let in_dir = |names: &[&str]| dirs.iter().any(|d| names.contains(&d.as_str()));

    let is_test = in_dir(&["test", "tests", "__tests__", "spec", "bench", "benches", "examples", "fixtures"])
        || filename.starts_with("test_")
        || filename.contains("_test.")
        || filename.contains(".test.")
        || filename.contains(".spec.");

    let mut score = if is_test {
        100
    } else if matches!(
        filename.as_str(),
        "main.rs" | "lib.rs" | "mod.rs" | "main.go" | "main.py" | "__init__.py" | "index.js" | "index.ts" | "index.tsx"
    ) {
        700
    } else if in_dir(&["core", "app", "model", "models", "schema", "src", "lib"]) {
        600
    } else if in_dir(&["util", "utils", "common", "helper", "helpers"]) {
        400
    } else {
        500
    };

    // Subtract 10 points per depth level to prefer high-level files
    let depth = i32::try_from(components.len()).unwrap_or(i32::MAX / 10);
    score -= depth * 10;

    score
}

/// Orders files by descending priority, ties broken by path.
pub fn prioritize(files: &mut [SourceFile]) {
    files.sort_by(|a, b| {
        priority_score(&b.path)
            .cmp(&priority_score(&a.path))
            .then_with(|| a.path.cmp(&b.path))
    });
}
