//! Import resolution
//!
//! Turns a raw import string into an in-project file path, or decides it is
//! external. The walk is generic (anchor, relative markers, prefix fallback);
//! language rules live behind [`LanguageResolver`] so new languages plug in
//! without touching the builder.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{ImportReference, Language, normalize_path};

/// Where a module path starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Project root
    Root,
    /// Walk up this many levels from the importing file (1 = its directory)
    Relative(usize),
    /// A specific project-relative directory
    Dir(PathBuf),
}

/// A parsed import: where to start and which path segments to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub anchor: Anchor,
    pub segments: Vec<String>,
}

impl ModuleSpec {
    pub fn new(anchor: Anchor, segments: Vec<String>) -> Self {
        Self { anchor, segments }
    }
}

/// Language-specific resolution rules.
pub trait LanguageResolver: Send + Sync {
    fn language(&self) -> Language;

    /// Parses a raw module string.
    ///
    /// `Ok(None)` means the import is external to the project. `Err` means the
    /// reference is malformed.
    fn parse(&self, module: &str, importer: &Path) -> Result<Option<ModuleSpec>, String>;

    /// Maps a candidate base path onto a known file (suffixes, index files).
    fn locate(&self, base: &Path, known: &BTreeSet<PathBuf>) -> Option<PathBuf>;

    /// Whether trailing segments may name a symbol rather than a file
    /// (`crate::a::Item`, `pkg.mod.func`).
    fn allows_prefix_fallback(&self) -> bool {
        false
    }
}

/// Resolution outcome for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Internal(PathBuf),
    External,
}

/// Per-language resolver table.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<Language, Arc<dyn LanguageResolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<_> = self.resolvers.keys().collect();
        languages.sort();
        f.debug_struct("ResolverRegistry")
            .field("languages", &languages)
            .finish()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Rust, Python, JavaScript/TypeScript and Go rules.
    pub fn with_defaults(go_module: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RustResolver));
        registry.register(Arc::new(PythonResolver));
        registry.register(Arc::new(ScriptResolver::new(Language::JavaScript)));
        registry.register(Arc::new(ScriptResolver::new(Language::TypeScript)));
        registry.register(Arc::new(GoResolver::new(go_module)));
        registry
    }

    /// Adds or replaces the resolver for its language.
    pub fn register(&mut self, resolver: Arc<dyn LanguageResolver>) {
        self.resolvers.insert(resolver.language(), resolver);
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn LanguageResolver>> {
        self.resolvers.get(&language)
    }

    /// Resolves `reference` against the set of files in the graph.
    pub fn resolve(
        &self,
        reference: &ImportReference,
        language: Language,
        known: &BTreeSet<PathBuf>,
    ) -> Result<Resolution, String> {
        if reference.module.trim().is_empty() && reference.relative_depth.is_none() {
            return Err("empty import reference".to_string());
        }

        let Some(resolver) = self.get(language) else {
            return Ok(Resolution::External);
        };

        let Some(mut spec) = resolver.parse(reference.module.trim(), &reference.source)? else {
            return Ok(Resolution::External);
        };
        if let Some(depth) = reference.relative_depth.filter(|d| *d > 0) {
            spec.anchor = Anchor::Relative(depth);
        }

        let Some(base) = anchor_dir(&spec.anchor, &reference.source) else {
            // Climbs above the project root
            return Ok(Resolution::External);
        };

        // A relative import naming only symbols (`from . import x`,
        // `use super::Item`) falls back to the anchor module itself
        let len = spec.segments.len();
        let shortest = match (&spec.anchor, resolver.allows_prefix_fallback()) {
            (_, false) => len,
            (Anchor::Relative(_), true) => 0,
            (_, true) => len.min(1),
        };
        for take in (shortest..=len).rev() {
            let mut candidate = base.clone();
            for segment in &spec.segments[..take] {
                candidate.push(segment);
            }
            let Some(candidate) = normalize_path(&candidate) else {
                continue;
            };
            if let Some(found) = resolver.locate(&candidate, known) {
                if found != reference.source {
                    return Ok(Resolution::Internal(found));
                }
            }
        }

        Ok(Resolution::External)
    }
}

fn anchor_dir(anchor: &Anchor, importer: &Path) -> Option<PathBuf> {
    match anchor {
        Anchor::Root => Some(PathBuf::new()),
        Anchor::Dir(dir) => Some(dir.clone()),
        Anchor::Relative(depth) => {
            let mut dir = importer.to_path_buf();
            for _ in 0..*depth {
                if !dir.pop() {
                    return None;
                }
            }
            Some(dir)
        }
    }
}

fn first_known(candidates: impl IntoIterator<Item = PathBuf>, known: &BTreeSet<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|c| known.contains(c))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Rust module rules.
///
/// `crate::a::b` starts at the nearest enclosing `src/`, `super::`/`self::`
/// walk module directories, a bare identifier is a child module (`mod foo;`)
/// and any other path (`std::..`, `serde::..`) is another crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustResolver;

impl RustResolver {
    /// `mod.rs`, `lib.rs` and `main.rs` own their directory.
    fn owns_directory(importer: &Path) -> bool {
        matches!(
            importer.file_name().and_then(|f| f.to_str()),
            Some("mod.rs" | "lib.rs" | "main.rs")
        )
    }

    /// Directory holding the children of the importing module.
    fn module_dir(importer: &Path) -> PathBuf {
        if Self::owns_directory(importer) {
            importer.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            importer.with_extension("")
        }
    }

    fn crate_src(importer: &Path) -> PathBuf {
        importer
            .ancestors()
            .skip(1)
            .find(|dir| dir.file_name().is_some_and(|n| n == "src"))
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

impl LanguageResolver for RustResolver {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn parse(&self, module: &str, importer: &Path) -> Result<Option<ModuleSpec>, String> {
        // Groups are expanded at extraction; a leftover `{` or alias only
        // needs the path part
        let module = module.split(['{', ' ']).next().unwrap_or(module);
        let mut segments: Vec<&str> = module
            .split("::")
            .filter(|s| !s.is_empty() && *s != "*")
            .collect();
        if segments.is_empty() {
            return Err(format!("malformed rust path `{module}`"));
        }

        let anchor = match segments[0] {
            "crate" => {
                segments.remove(0);
                Anchor::Dir(Self::crate_src(importer))
            }
            "self" => {
                segments.remove(0);
                Anchor::Dir(Self::module_dir(importer))
            }
            "super" => {
                let mut depth = if Self::owns_directory(importer) { 2 } else { 1 };
                segments.remove(0);
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    depth += 1;
                }
                Anchor::Relative(depth)
            }
            _ if segments.len() == 1 => Anchor::Dir(Self::module_dir(importer)),
            _ => return Ok(None),
        };

        Ok(Some(ModuleSpec::new(
            anchor,
            segments.into_iter().map(str::to_string).collect(),
        )))
    }

    fn locate(&self, base: &Path, known: &BTreeSet<PathBuf>) -> Option<PathBuf> {
        if base.as_os_str().is_empty() {
            return None;
        }
        first_known([with_suffix(base, ".rs"), base.join("mod.rs")], known)
    }

    fn allows_prefix_fallback(&self) -> bool {
        true
    }
}

/// Python module rules: leading dots are relative depth, the rest is dotted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonResolver;

impl LanguageResolver for PythonResolver {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, module: &str, _importer: &Path) -> Result<Option<ModuleSpec>, String> {
        let dots = module.chars().take_while(|c| *c == '.').count();
        let rest = &module[dots..];
        let segments: Vec<String> = rest
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if dots == 0 && segments.is_empty() {
            return Err(format!("malformed python module `{module}`"));
        }
        let anchor = if dots > 0 {
            Anchor::Relative(dots)
        } else {
            Anchor::Root
        };
        Ok(Some(ModuleSpec::new(anchor, segments)))
    }

    fn locate(&self, base: &Path, known: &BTreeSet<PathBuf>) -> Option<PathBuf> {
        let mut candidates = vec![base.join("__init__.py")];
        if !base.as_os_str().is_empty() {
            candidates.insert(0, with_suffix(base, ".py"));
        }
        first_known(candidates, known)
    }

    fn allows_prefix_fallback(&self) -> bool {
        true
    }
}

const SCRIPT_SUFFIXES: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".d.ts"];
const SCRIPT_INDEXES: &[&str] = &["index.ts", "index.tsx", "index.js", "index.jsx"];

/// JavaScript and TypeScript path rules.
///
/// `./` and `../` are relative, `/` is the project root, bare specifiers are
/// packages. A directory stands in for its `index` file.
#[derive(Debug, Clone, Copy)]
pub struct ScriptResolver {
    language: Language,
}

impl ScriptResolver {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl LanguageResolver for ScriptResolver {
    fn language(&self) -> Language {
        self.language
    }

    fn parse(&self, module: &str, _importer: &Path) -> Result<Option<ModuleSpec>, String> {
        let (anchor, rest) = if let Some(rest) = module.strip_prefix('/') {
            (Anchor::Root, rest)
        } else if module == "." || module == ".." || module.starts_with("./") || module.starts_with("../") {
            let mut depth = 1;
            let mut rest = module;
            loop {
                if let Some(r) = rest.strip_prefix("./") {
                    rest = r;
                } else if let Some(r) = rest.strip_prefix("../") {
                    rest = r;
                    depth += 1;
                } else if rest == "." {
                    rest = "";
                } else if rest == ".." {
                    rest = "";
                    depth += 1;
                } else {
                    break;
                }
            }
            (Anchor::Relative(depth), rest)
        } else {
            return Ok(None);
        };

        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Some(ModuleSpec::new(anchor, segments)))
    }

    fn locate(&self, base: &Path, known: &BTreeSet<PathBuf>) -> Option<PathBuf> {
        let mut candidates = Vec::with_capacity(1 + SCRIPT_SUFFIXES.len() + SCRIPT_INDEXES.len());
        if !base.as_os_str().is_empty() {
            candidates.push(base.to_path_buf());
            candidates.extend(SCRIPT_SUFFIXES.iter().map(|s| with_suffix(base, s)));
        }
        candidates.extend(SCRIPT_INDEXES.iter().map(|i| base.join(i)));
        first_known(candidates, known)
    }
}

/// Go package rules.
///
/// Only imports under the project's module path are internal. A package
/// directory stands in for its first non-test `.go` file.
#[derive(Debug, Clone, Default)]
pub struct GoResolver {
    module: Option<String>,
}

impl GoResolver {
    pub fn new(module: Option<String>) -> Self {
        Self { module }
    }
}

impl LanguageResolver for GoResolver {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, module: &str, _importer: &Path) -> Result<Option<ModuleSpec>, String> {
        let Some(prefix) = self.module.as_deref() else {
            return Ok(None);
        };
        let rest = if module == prefix {
            ""
        } else if let Some(rest) = module.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            rest
        } else {
            return Ok(None);
        };
        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Some(ModuleSpec::new(Anchor::Root, segments)))
    }

    fn locate(&self, base: &Path, known: &BTreeSet<PathBuf>) -> Option<PathBuf> {
        // Paths under `base` sort contiguously right after it
        known
            .range::<Path, _>((Bound::Excluded(base), Bound::Unbounded))
            .take_while(|f| f.starts_with(base))
            .filter(|f| f.parent() == Some(base))
            .filter(|f| f.extension().is_some_and(|e| e == "go"))
            .find(|f| {
                !f.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_test.go"))
            })
            .cloned()
    }
}
