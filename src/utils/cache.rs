//! Graph cache for one analysis session
//!
//! Holds the most recently published build. A build is reused while the
//! file set, modification stamps and import source are unchanged; anything
//! else triggers a full rebuild. Readers holding an older `Arc` keep a valid
//! snapshot after the swap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::core::SourceFile;
use crate::error::Result;
use crate::utils::analysis::builder::{BuildOutcome, GraphBuilder};
use crate::utils::analysis::dependencies::ImportAnalyzer;

#[derive(Debug)]
struct Published {
    /// `None` when the build must not be reused (incomplete or caching off)
    fingerprint: Option<String>,
    outcome: Arc<BuildOutcome>,
}

#[derive(Debug)]
pub struct GraphCache {
    enabled: bool,
    published: RwLock<Option<Published>>,
    build_lock: Mutex<()>,
    builds: AtomicUsize,
}

impl GraphCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            published: RwLock::new(None),
            build_lock: Mutex::new(()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Identifies a build input: sorted paths, languages, stamps and the
    /// analyzer signature.
    pub fn fingerprint(files: &[SourceFile], analyzer: &dyn ImportAnalyzer) -> String {
        let mut ordered: Vec<&SourceFile> = files.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));

        let mut context = md5::Context::new();
        for file in ordered {
            context.consume(file.path.to_string_lossy().as_bytes());
            context.consume([0u8]);
            context.consume(file.language.as_str().as_bytes());
            context.consume([0u8]);
            match file.stamp {
                Some(stamp) => context.consume(stamp.to_le_bytes()),
                None => context.consume(b"-"),
            }
            context.consume([0xffu8]);
        }
        context.consume(analyzer.signature().as_bytes());
        format!("{:x}", context.finalize())
    }

    /// Returns the cached build for this input, or builds and publishes a new one.
    ///
    /// Only one rebuild runs at a time. Incomplete builds are returned but
    /// never reused.
    pub fn get_or_build(
        &self,
        files: &[SourceFile],
        analyzer: Arc<dyn ImportAnalyzer>,
        builder: &GraphBuilder,
    ) -> Result<Arc<BuildOutcome>> {
        let fingerprint = Self::fingerprint(files, analyzer.as_ref());
        if let Some(hit) = self.lookup(&fingerprint) {
            debug!(fingerprint = %fingerprint, "graph cache hit");
            return Ok(hit);
        }

        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have built the same input while we waited
        if let Some(hit) = self.lookup(&fingerprint) {
            return Ok(hit);
        }

        let outcome = Arc::new(builder.build(files, analyzer)?);
        self.builds.fetch_add(1, Ordering::Relaxed);

        let reusable = self.enabled && outcome.is_complete();
        if !outcome.is_complete() {
            debug!("not caching incomplete graph build");
        }

        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        *published = Some(Published {
            fingerprint: reusable.then_some(fingerprint),
            outcome: Arc::clone(&outcome),
        });
        Ok(outcome)
    }

    fn lookup(&self, fingerprint: &str) -> Option<Arc<BuildOutcome>> {
        if !self.enabled {
            return None;
        }
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        published
            .as_ref()
            .filter(|p| p.fingerprint.as_deref() == Some(fingerprint))
            .map(|p| Arc::clone(&p.outcome))
    }

    /// Latest published build, reusable or not
    pub fn current(&self) -> Option<Arc<BuildOutcome>> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        published.as_ref().map(|p| Arc::clone(&p.outcome))
    }

    /// Drops the published build so the next call rebuilds.
    pub fn invalidate(&self) {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        *published = None;
    }

    /// Number of real builds run so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::core::ImportReference;
    use crate::error::FileFailure;
    use crate::utils::analysis::builder::BuildOptions;
    use crate::utils::analysis::resolve::ResolverRegistry;

    fn builder(budget: Option<Duration>) -> GraphBuilder {
        GraphBuilder::new(
            Arc::new(ResolverRegistry::with_defaults(None)),
            BuildOptions {
                max_graph_size: 100,
                max_workers: 2,
                time_budget: budget,
            },
        )
    }

    fn fixture() -> (Vec<SourceFile>, Arc<dyn ImportAnalyzer>) {
        let files = vec![SourceFile::new("a.py"), SourceFile::new("b.py")];
        let mut imports: HashMap<PathBuf, Vec<ImportReference>> = HashMap::new();
        imports.insert(PathBuf::from("a.py"), vec![ImportReference::new("a.py", "b")]);
        (files, Arc::new(imports))
    }

    struct Sleepy;

    impl ImportAnalyzer for Sleepy {
        fn analyze(&self, _file: &SourceFile) -> std::result::Result<Vec<ImportReference>, FileFailure> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_unchanged_input_is_reused() -> anyhow::Result<()> {
        let cache = GraphCache::new(true);
        let builder = builder(None);
        let (files, analyzer) = fixture();

        let first = cache.get_or_build(&files, Arc::clone(&analyzer), &builder)?;
        let second = cache.get_or_build(&files, analyzer, &builder)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.builds(), 1);
        Ok(())
    }

    #[test]
    fn test_changed_stamp_rebuilds() -> anyhow::Result<()> {
        let cache = GraphCache::new(true);
        let builder = builder(None);
        let (files, analyzer) = fixture();

        let first = cache.get_or_build(&files, Arc::clone(&analyzer), &builder)?;
        let touched: Vec<SourceFile> = files
            .iter()
            .cloned()
            .map(|f| f.with_stamp(42))
            .collect();
        let second = cache.get_or_build(&touched, analyzer, &builder)?;

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.graph.same_topology(&second.graph));
        assert_ne!(first.graph.version(), second.graph.version());
        // The old snapshot stays readable
        assert_eq!(first.graph.edge_count(), 1);
        Ok(())
    }

    #[test]
    fn test_changed_imports_rebuild() -> anyhow::Result<()> {
        let cache = GraphCache::new(true);
        let builder = builder(None);
        let (files, analyzer) = fixture();
        cache.get_or_build(&files, analyzer, &builder)?;

        let empty: Arc<dyn ImportAnalyzer> = Arc::new(HashMap::<PathBuf, Vec<ImportReference>>::new());
        let rebuilt = cache.get_or_build(&files, empty, &builder)?;
        assert_eq!(rebuilt.graph.edge_count(), 0);
        assert_eq!(cache.builds(), 2);
        Ok(())
    }

    #[test]
    fn test_invalidate_forces_rebuild() -> anyhow::Result<()> {
        let cache = GraphCache::new(true);
        let builder = builder(None);
        let (files, analyzer) = fixture();

        cache.get_or_build(&files, Arc::clone(&analyzer), &builder)?;
        cache.invalidate();
        assert!(cache.current().is_none());
        cache.get_or_build(&files, analyzer, &builder)?;
        assert_eq!(cache.builds(), 2);
        Ok(())
    }

    #[test]
    fn test_disabled_cache_always_builds() -> anyhow::Result<()> {
        let cache = GraphCache::new(false);
        let builder = builder(None);
        let (files, analyzer) = fixture();

        cache.get_or_build(&files, Arc::clone(&analyzer), &builder)?;
        cache.get_or_build(&files, analyzer, &builder)?;
        assert_eq!(cache.builds(), 2);
        assert!(cache.current().is_some());
        Ok(())
    }

    #[test]
    fn test_incomplete_build_not_reused() -> anyhow::Result<()> {
        let cache = GraphCache::new(true);
        let builder = builder(Some(Duration::from_millis(50)));
        let files = vec![SourceFile::new("a.py")];
        let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(Sleepy);

        let first = cache.get_or_build(&files, Arc::clone(&analyzer), &builder)?;
        assert!(first.incomplete);
        assert!(cache.current().is_some());

        cache.get_or_build(&files, analyzer, &builder)?;
        assert_eq!(cache.builds(), 2);
        Ok(())
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let analyzer = HashMap::<PathBuf, Vec<ImportReference>>::new();
        let forward = [SourceFile::new("a.py"), SourceFile::new("b.py")];
        let backward = [SourceFile::new("b.py"), SourceFile::new("a.py")];
        assert_eq!(
            GraphCache::fingerprint(&forward, &analyzer),
            GraphCache::fingerprint(&backward, &analyzer)
        );
    }
}
