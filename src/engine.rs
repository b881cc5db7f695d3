//! The discovery engine (§3, §5) — owns one root path's cache and ties the
//! scanner, evaluator, and resolver into the public `discover`/`explain`
//! operations.
//!
//! The engine owns no executor of its own; every method here is `async fn`
//! driven by the caller's `tokio` runtime (§5 — a single logical thread of
//! control, not a background pool).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::cache::CacheManager;
use crate::config::Configuration;
use crate::error::{CandidateSummary, DiscoveryError, NoMatchReport};
use crate::evaluator::ScoredCandidate;
use crate::exports::{Export, ExportKind, ExportsCache};
use crate::resolver;
use crate::scanner;
use crate::signature::{cache_key, normalize, NameMatch, NormalizedSignature, Signature, TargetType};

const EXPORTS_CACHE_CAPACITY: usize = 100;

fn unix_mtime(candidate: &crate::evaluator::Candidate) -> Option<u64> {
    candidate
        .modified
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

/// A cache record with no recorded mtime trusts the path unconditionally
/// (mtime was unavailable when it was written); otherwise the on-disk mtime
/// must still match (§4.6's "force a fresh load if mtime changed").
fn mtime_unchanged(meta: &std::fs::Metadata, recorded: Option<u64>) -> bool {
    let Some(recorded) = recorded else { return true };
    let Ok(modified) = meta.modified() else { return true };
    let Ok(secs) = modified.duration_since(std::time::UNIX_EPOCH) else { return true };
    secs.as_secs() == recorded
}

/// Alternate export names among the given candidates — a re-export's local
/// alias (`export { Impl as Y }`) differs from the declaration's own name;
/// those are the "aliases (if resolvable)" a `NoMatch` diagnostic can offer.
fn collect_aliases<'a>(candidates: impl Iterator<Item = &'a ScoredCandidate>) -> Vec<String> {
    let mut aliases = Vec::new();
    for sc in candidates {
        let Some(metadata) = &sc.candidate.exports else { continue };
        for export in &metadata.exports {
            if let Some(alias) = &export.name {
                if alias != &export.info.name && !aliases.contains(alias) {
                    aliases.push(alias.clone());
                }
            }
        }
    }
    aliases
}

fn export_kind_to_target_type(kind: ExportKind) -> Option<TargetType> {
    match kind {
        ExportKind::Class => Some(TargetType::Class),
        ExportKind::Function => Some(TargetType::Function),
        ExportKind::Object => Some(TargetType::Object),
        ExportKind::Unknown => None,
    }
}

/// The export on `top`'s candidate that overlaps the signature's
/// methods/properties the most — the best guess at "what the caller actually
/// meant", when nothing satisfied every requirement.
fn best_export_on<'a>(top: &'a ScoredCandidate, signature: &NormalizedSignature) -> Option<&'a Export> {
    let metadata = top.candidate.exports.as_ref()?;
    metadata.exports.iter().max_by_key(|export| {
        let methods = signature.methods.iter().filter(|m| export.info.methods.contains(*m)).count();
        let properties = signature.properties.iter().filter(|p| export.info.properties.contains(*p)).count();
        methods + properties
    })
}

/// Derive a suggested signature from the top-ranked candidate's *actual*
/// exported shape (§7: "suggested signature derived from the top
/// candidate's metadata"), not from re-echoing the caller's own signature.
fn suggest_from_candidate(top: &ScoredCandidate, signature: &NormalizedSignature) -> Option<Signature> {
    let export = best_export_on(top, signature)?;
    Some(Signature {
        name: Some(NameMatch::Literal(export.info.name.clone())),
        target_type: export_kind_to_target_type(export.info.kind),
        exports: None,
        methods: export.info.methods.iter().cloned().collect(),
        properties: export.info.properties.iter().cloned().collect(),
        extends: export.info.base_class.clone(),
        instanceof: None,
        custom: Default::default(),
    })
}

/// The result of `explain`: what was found, and the full ranked candidate set
/// that produced it — useful for debugging a near-miss (§4.6's diagnostic
/// intent, generalized to the success path too).
#[derive(Debug)]
pub struct ExplainReport {
    pub resolved: Option<PathBuf>,
    pub candidates: Vec<CandidateSummary>,
}

/// One discovery root. Holds the cache manager and the exports-analysis
/// memoization table; both are scoped to this root for its lifetime.
pub struct Engine {
    root: PathBuf,
    config: Configuration,
    cache: CacheManager,
    exports_cache: Arc<ExportsCache>,
}

impl Engine {
    /// Build a new engine rooted at `root`. Canonicalizes the path so cache
    /// keys and relative paths stay stable regardless of how the caller
    /// spelled it, and eagerly loads the persistent cache tier.
    pub async fn new(root: impl Into<PathBuf>, config: Configuration) -> std::io::Result<Self> {
        let root = scanner::canonicalize_root(&root.into())?;
        let cache = CacheManager::new(config.cache.clone(), &root);
        cache.load().await;
        let exports_cache = Arc::new(ExportsCache::new(EXPORTS_CACHE_CAPACITY));
        Ok(Self { root, config, cache, exports_cache })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn rank(mut scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }

    async fn scan_and_rank(&self, signature: &NormalizedSignature) -> Vec<ScoredCandidate> {
        let scored = scanner::scan(&self.root, signature, &self.config, &self.exports_cache).await;
        for sc in &scored {
            self.cache.track_loaded_file(&sc.candidate.file_name).await;
        }
        Self::rank(scored)
    }

    /// Locate the file that structurally matches `signature` (§4's end-to-end
    /// contract). A cache hit whose target file no longer exists is treated
    /// as a miss and the entry is dropped, not silently trusted.
    #[instrument(skip(self, signature), fields(root = %self.root.display()))]
    pub async fn discover(&self, signature: Signature) -> Result<PathBuf, DiscoveryError> {
        let normalized = normalize(signature);
        let key = cache_key(&normalized);

        if let Some(record) = self.cache.get(&key).await {
            let candidate_path = self.root.join(&record.rel_path);
            match tokio::fs::metadata(&candidate_path).await {
                Ok(meta) if mtime_unchanged(&meta, record.mtime) => {
                    debug!(path = %record.rel_path, "cache hit");
                    return Ok(candidate_path);
                }
                Ok(_) => {
                    debug!(path = %record.rel_path, "cached target's mtime changed, invalidating");
                }
                Err(_) => {
                    debug!(path = %record.rel_path, "cached target no longer exists, invalidating");
                }
            }
            self.cache.invalidate(&key).await;
        }

        let ranked = self.scan_and_rank(&normalized).await;

        match resolver::resolve(ranked.clone(), &normalized, &self.config).await {
            Some(resolution) => {
                let mtime = unix_mtime(&resolution.candidate);
                self.cache
                    .put(key, resolution.candidate.rel_path.clone(), resolution.access.clone(), resolution.score, mtime)
                    .await;
                Ok(self.root.join(&resolution.candidate.rel_path))
            }
            None => Err(DiscoveryError::NoMatch(Self::build_no_match_report(&normalized, ranked))),
        }
    }

    fn build_no_match_report(normalized: &NormalizedSignature, ranked: Vec<ScoredCandidate>) -> NoMatchReport {
        let top_candidates = ranked
            .iter()
            .take(3)
            .map(|sc| CandidateSummary {
                rel_path: sc.candidate.rel_path.clone(),
                score: sc.score,
                breakdown: sc.breakdown.clone(),
            })
            .collect();

        let aliases = collect_aliases(ranked.iter().take(3));
        let suggested_signature = ranked.first().and_then(|top| suggest_from_candidate(top, normalized));

        NoMatchReport { signature: normalized.original.clone(), top_candidates, aliases, suggested_signature }
    }

    /// Run the full scan + scoring pipeline and report what was found,
    /// without the success/failure framing `discover` imposes — useful when a
    /// caller wants to see every candidate's breakdown regardless of outcome.
    pub async fn explain(&self, signature: Signature) -> ExplainReport {
        let normalized = normalize(signature);
        let ranked = self.scan_and_rank(&normalized).await;
        let resolved = resolver::resolve(ranked.clone(), &normalized, &self.config)
            .await
            .map(|r| self.root.join(&r.candidate.rel_path));

        ExplainReport {
            resolved,
            candidates: ranked
                .into_iter()
                .map(|sc| CandidateSummary {
                    rel_path: sc.candidate.rel_path,
                    score: sc.score,
                    breakdown: sc.breakdown,
                })
                .collect(),
        }
    }

    /// Drop both cache tiers for this root (the public `clearCache`
    /// operation, §4.7).
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

/// Per-root engine memoization (§3's ownership invariant: one engine per
/// canonical root path, reused across calls rather than rebuilt).
#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<PathBuf, Arc<Engine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(
        &self,
        root: impl Into<PathBuf>,
        config: Configuration,
    ) -> std::io::Result<Arc<Engine>> {
        let canonical = scanner::canonicalize_root(&root.into())?;
        let mut guard = self.engines.lock().await;
        if let Some(existing) = guard.get(&canonical) {
            return Ok(existing.clone());
        }
        let engine = Arc::new(Engine::new(canonical.clone(), config).await?);
        guard.insert(canonical, engine.clone());
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(path: &std::path::Path, content: &str) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn discover_finds_and_caches_a_match() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("src/UserService.js"),
            "module.exports = class UserService { login() {} };",
        )
        .await;

        let engine = Engine::new(dir.path(), Configuration::default()).await.unwrap();
        let sig = Signature::new().with_name("UserService");
        let path = engine.discover(sig).await.unwrap();
        assert!(path.ends_with("src/UserService.js"));

        // Second call should hit the cache and still resolve to the same file.
        let sig2 = Signature::new().with_name("UserService");
        let path2 = engine.discover(sig2).await.unwrap();
        assert_eq!(path, path2);
    }

    #[tokio::test]
    async fn discover_reports_no_match_with_candidates() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/Other.js"), "module.exports = class Other {};").await;

        let engine = Engine::new(dir.path(), Configuration::default()).await.unwrap();
        let sig = Signature::new().with_name("NoSuchThing");
        let err = engine.discover(sig).await.unwrap_err();
        match err {
            DiscoveryError::NoMatch(report) => {
                assert!(format!("{report}").contains("No match found"));
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_invalidated_when_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("src/Moved.js");
        write(&target, "module.exports = class Moved { run() {} };").await;

        let engine = Engine::new(dir.path(), Configuration::default()).await.unwrap();
        let sig = Signature::new().with_name("Moved");
        let first = engine.discover(sig).await.unwrap();
        assert!(first.ends_with("src/Moved.js"));

        tokio::fs::remove_file(&target).await.unwrap();

        let sig2 = Signature::new().with_name("Moved");
        let result = engine.discover(sig2).await;
        assert!(result.is_err(), "deleted target should no longer resolve from a stale cache entry");
    }

    #[tokio::test]
    async fn registry_reuses_engine_for_same_root() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::new();
        let a = registry.get_or_create(dir.path(), Configuration::default()).await.unwrap();
        let b = registry.get_or_create(dir.path(), Configuration::default()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
