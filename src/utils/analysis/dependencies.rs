use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::core::{ImportReference, Language, SourceFile};
use crate::error::{FailureKind, FileFailure};

/// Produces the raw imports of one file.
///
/// Implementations run on worker threads, so they must be `Send + Sync`.
pub trait ImportAnalyzer: Send + Sync {
    fn analyze(&self, file: &SourceFile) -> Result<Vec<ImportReference>, FileFailure>;

    /// Identifies the analyzer's inputs for cache fingerprinting.
    ///
    /// Analyzers that read from disk can rely on file stamps and return the
    /// default. Analyzers holding imports in memory must describe them here.
    fn signature(&self) -> String {
        String::new()
    }
}

/// Precomputed imports keyed by file. Files without an entry import nothing.
impl ImportAnalyzer for HashMap<PathBuf, Vec<ImportReference>> {
    fn analyze(&self, file: &SourceFile) -> Result<Vec<ImportReference>, FileFailure> {
        Ok(self.get(&file.path).cloned().unwrap_or_default())
    }

    fn signature(&self) -> String {
        let ordered: BTreeMap<&PathBuf, &Vec<ImportReference>> = self.iter().collect();
        let mut context = md5::Context::new();
        for (path, imports) in ordered {
            context.consume(path.to_string_lossy().as_bytes());
            for import in imports {
                context.consume([0u8]);
                context.consume(import.module.as_bytes());
                context.consume(import.relative_depth.unwrap_or(0).to_le_bytes());
            }
            context.consume([0xffu8]);
        }
        format!("{:x}", context.finalize())
    }
}

/// Reads files under `root` and extracts imports with tree-sitter.
#[derive(Debug, Clone)]
pub struct TreeSitterImportAnalyzer {
    root: PathBuf,
}

impl TreeSitterImportAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImportAnalyzer for TreeSitterImportAnalyzer {
    fn analyze(&self, file: &SourceFile) -> Result<Vec<ImportReference>, FileFailure> {
        if file.language == Language::Unknown {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(self.root.join(&file.path))
            .map_err(|e| FileFailure::new(&file.path, FailureKind::Io, e.to_string()))?;
        let extension = file.path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let imports = extract_imports(&content, extension)
            .map_err(|message| FileFailure::new(&file.path, FailureKind::Parse, message))?;

        Ok(imports
            .into_iter()
            .map(|module| ImportReference::new(&file.path, module))
            .collect())
    }

    fn signature(&self) -> String {
        format!("tree-sitter:{}", self.root.display())
    }
}

/// Extracts import statements from file content.
/// Returns the sorted, deduplicated module names/paths.
///
/// Rust `use` groups become one path per item and Python `from m import a, b`
/// becomes `m.a` and `m.b`, so a name that is itself a module still gets its
/// own edge.
pub fn extract_imports(content: &str, extension: &str) -> Result<Vec<String>, String> {
    let mut imports = Vec::new();
    let mut parser = Parser::new();

    let (language, query_str) = match extension {
        "rs" => (
            tree_sitter_rust::LANGUAGE.into(),
            r#"
            (use_declaration argument: (_) @import)
            (mod_item name: (_) @import)
            "#,
        ),
        "py" | "pyi" => (
            tree_sitter_python::LANGUAGE.into(),
            r#"
            (import_statement name: (_) @import)
            (import_from_statement module_name: (_)) @from
            "#,
        ),
        "js" | "jsx" | "mjs" | "cjs" => (
            tree_sitter_javascript::LANGUAGE.into(),
            r#"
            (import_statement source: (string) @import)
            (call_expression function: (identifier) @func arguments: (arguments (string) @import) (#eq? @func "require"))
             "#,
        ),
        "ts" | "mts" | "cts" => (
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            r#"
            (import_statement source: (string) @import)
            (call_expression function: (identifier) @func arguments: (arguments (string) @import) (#eq? @func "require"))
             "#,
        ),
        "tsx" => (
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            r#"
            (import_statement source: (string) @import)
            (call_expression function: (identifier) @func arguments: (arguments (string) @import) (#eq? @func "require"))
             "#,
        ),
        "go" => (
            tree_sitter_go::LANGUAGE.into(),
            r#"
            (import_spec path: (_) @import)
             "#,
        ),
        _ => return Ok(imports),
    };

    parser
        .set_language(&language)
        .map_err(|e| format!("grammar rejected: {e}"))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;

    let query = Query::new(&language, query_str).map_err(|e| format!("query error: {e:?}"))?;

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), content.as_bytes());

    while let Some(m) = matches.next() {
        for capture in m.captures {
            // Skip the @func capture of require(...)
            let capture_name = query.capture_names()[capture.index as usize];
            if capture_name == "from" {
                imports.extend(from_import_modules(capture.node, content.as_bytes()));
                continue;
            }
            if capture_name != "import" {
                continue;
            }

            if let Ok(text) = capture.node.utf8_text(content.as_bytes()) {
                if extension == "rs" {
                    imports.extend(expand_use_tree(text));
                    continue;
                }
                let mut clean_text = text
                    .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                    .to_string();
                if extension == "py" || extension == "pyi" {
                    if let Some(idx) = clean_text.find(" as ") {
                        clean_text.truncate(idx);
                    }
                }
                if !clean_text.is_empty() {
                    imports.push(clean_text);
                }
            }
        }
    }

    imports.sort();
    imports.dedup();
    Ok(imports)
}

/// `from m import a, b as c` as `m.a` and `m.b`; a wildcard keeps `m`.
fn from_import_modules(node: Node<'_>, source: &[u8]) -> Vec<String> {
    let Some(module) = node
        .child_by_field_name("module_name")
        .and_then(|n| n.utf8_text(source).ok())
    else {
        return Vec::new();
    };

    let mut cursor = node.walk();
    let names: Vec<&str> = node
        .children_by_field_name("name", &mut cursor)
        .filter_map(|name| {
            let name = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")?
            } else {
                name
            };
            name.utf8_text(source).ok()
        })
        .collect();

    if names.is_empty() {
        return vec![module.to_string()];
    }
    names
        .into_iter()
        .map(|name| {
            if module.ends_with('.') {
                format!("{module}{name}")
            } else {
                format!("{module}.{name}")
            }
        })
        .collect()
}

/// Flattens a Rust use tree: `a::{b, c::{d, self}}` gives `a::b`, `a::c::d`
/// and `a::c`. Aliases are dropped.
fn expand_use_tree(tree: &str) -> Vec<String> {
    let tree = tree.split_whitespace().collect::<Vec<_>>().join(" ");
    let Some(open) = tree.find('{') else {
        let path = tree.split(" as ").next().unwrap_or(&tree).trim();
        return if path.is_empty() {
            Vec::new()
        } else {
            vec![path.to_string()]
        };
    };

    let prefix = tree[..open].trim().trim_end_matches("::");
    let body = &tree[open + 1..];
    let body = body.strip_suffix('}').unwrap_or(body);

    let mut paths = Vec::new();
    for item in split_top_level(body) {
        if item == "self" {
            if !prefix.is_empty() {
                paths.push(prefix.to_string());
            }
            continue;
        }
        for sub in expand_use_tree(item) {
            if prefix.is_empty() {
                paths.push(sub);
            } else {
                paths.push(format!("{prefix}::{sub}"));
            }
        }
    }
    paths
}

/// Splits on commas outside nested braces.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(body[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}
