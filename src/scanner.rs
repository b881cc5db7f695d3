//! File-system scanner (§4.2) — a cooperative, bounded-concurrency recursive
//! walk that feeds candidate paths to the evaluator.
//!
//! The pipeline runs on a single logical thread of control (§5): concurrency
//! here means "in flight", not "on a different CPU" — a `tokio::sync::Semaphore`
//! caps how many directory reads and file evaluations are outstanding at once,
//! and every unit of work still executes on the caller's runtime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::config::Configuration;
use crate::evaluator::{self, ScoredCandidate};
use crate::exports::ExportsCache;
use crate::signature::NormalizedSignature;

fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name != "." && file_name != ".."
}

fn has_allowed_extension(file_name: &str, extensions: &[String]) -> bool {
    extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
}

/// Files this path-shaped heuristic treats as "not a discovery candidate even
/// though the extension matches" — type declarations, test files, backups,
/// and numbered/"copy" duplicates (§4.2).
fn is_excluded_by_name(file_name: &str) -> bool {
    if file_name.ends_with(".d.ts") || file_name.contains(".test.") || file_name.contains(".spec.") {
        return true;
    }
    if file_name.ends_with(".backup") {
        return true;
    }
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    is_copy_suffixed(stem)
}

/// Matches a stem ending in ` copy`, ` copy <digits>`, or ` <digits>` —
/// filenames left behind by "save a copy"/"duplicate file" operations.
fn is_copy_suffixed(stem: &str) -> bool {
    let Some(last_space) = stem.rfind(' ') else { return false };
    let (head, tail) = (&stem[..last_space], &stem[last_space + 1..]);
    if tail == "copy" {
        return true;
    }
    if let Some(rest) = tail.strip_prefix("copy") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit())
}

/// Recursively scan `root`, evaluating every matching file against `signature`
/// and returning every candidate that scored above the configured minimum.
/// Scan errors on individual entries (permission denied, symlink cycles
/// reported by the OS, races where a file disappears mid-walk) are logged and
/// skipped rather than aborting the whole scan.
pub async fn scan(
    root: &Path,
    signature: &NormalizedSignature,
    config: &Configuration,
    exports_cache: &Arc<ExportsCache>,
) -> Vec<ScoredCandidate> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut results = Vec::new();
    walk_dir_inner(root, root, 0, signature, config, exports_cache, &semaphore, &mut results).await;
    results
}

/// Async fns can't directly recurse (the compiler can't size the resulting
/// future), so the recursive call is boxed by hand — the idiomatic pattern in
/// the absence of a dedicated recursion-helper crate.
fn walk_dir<'a>(
    root: &'a Path,
    dir: &'a Path,
    depth: u32,
    signature: &'a NormalizedSignature,
    config: &'a Configuration,
    exports_cache: &'a Arc<ExportsCache>,
    semaphore: &'a Arc<Semaphore>,
    out: &'a mut Vec<ScoredCandidate>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(walk_dir_inner(root, dir, depth, signature, config, exports_cache, semaphore, out))
}

async fn walk_dir_inner(
    root: &Path,
    dir: &Path,
    depth: u32,
    signature: &NormalizedSignature,
    config: &Configuration,
    exports_cache: &Arc<ExportsCache>,
    semaphore: &Arc<Semaphore>,
    out: &mut Vec<ScoredCandidate>,
) {
    if depth > config.max_depth {
        trace!(path = %dir.display(), depth, "max depth reached, pruning");
        return;
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "could not read directory, skipping");
            return;
        }
    };

    let mut subdirs = Vec::new();
    let mut files = Vec::new();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "error reading directory entry, stopping this directory");
                break;
            }
        };

        let file_name = entry.file_name().to_string_lossy().to_string();
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if is_hidden(&file_name) || config.skip_directories.contains(&file_name) {
                trace!(dir = %file_name, "skipping directory");
                continue;
            }
            subdirs.push(entry.path());
        } else if file_type.is_file() {
            if !has_allowed_extension(&file_name, &config.extensions) {
                continue;
            }
            if is_excluded_by_name(&file_name) {
                continue;
            }
            files.push(entry.path());
        }
    }

    // Each file's evaluation is spawned as its own task rather than awaited
    // in place, so up to `config.concurrency` of them are genuinely in flight
    // together instead of running one-at-a-time behind the semaphore.
    let mut handles = Vec::with_capacity(files.len());
    for file_path in files {
        let Ok(rel_path) = file_path.strip_prefix(root) else { continue };
        let rel_path = rel_path.to_string_lossy().to_string();

        let permit = Arc::clone(semaphore).acquire_owned().await.expect("semaphore never closed");
        let signature = signature.clone();
        let config = config.clone();
        let exports_cache = Arc::clone(exports_cache);
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            evaluator::evaluate(&file_path, &rel_path, &signature, &config, &exports_cache).await
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Some(scored)) => {
                debug!(path = %scored.candidate.rel_path, score = scored.score, "candidate scored");
                out.push(scored);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "candidate evaluation task panicked"),
        }
    }

    for subdir in subdirs {
        walk_dir(root, &subdir, depth + 1, signature, config, exports_cache, semaphore, out).await;
    }
}

/// Resolve a root path to its canonical absolute form, for stable relative
/// paths regardless of how the caller spelled the root.
pub fn canonicalize_root(root: &Path) -> std::io::Result<PathBuf> {
    root.canonicalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::signature::{normalize, Signature};

    async fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn scan_finds_matching_file_and_skips_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(&root.join("src/UserService.js"), "module.exports = class UserService { login() {} };").await;
        write(&root.join("node_modules/pkg/UserService.js"), "module.exports = class UserService { login() {} };").await;

        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService"));
        let cache = Arc::new(ExportsCache::default());

        let results = scan(root, &sig, &config, &cache).await;
        assert_eq!(results.len(), 1, "node_modules should be skipped");
        assert_eq!(results[0].candidate.rel_path, "src/UserService.js");
    }

    #[tokio::test]
    async fn scan_excludes_declaration_and_test_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(&root.join("UserService.d.ts"), "export class UserService {}").await;
        write(&root.join("UserService.test.js"), "module.exports = class UserService {};").await;
        write(&root.join("UserService.js"), "module.exports = class UserService { login() {} };").await;

        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService"));
        let cache = Arc::new(ExportsCache::default());

        let results = scan(root, &sig, &config, &cache).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.rel_path, "UserService.js");
    }

    #[tokio::test]
    async fn scan_excludes_backup_and_copy_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(&root.join("UserService.js.backup"), "module.exports = class UserService {};").await;
        write(&root.join("UserService copy.js"), "module.exports = class UserService {};").await;
        write(&root.join("UserService copy 2.js"), "module.exports = class UserService {};").await;
        write(&root.join("UserService.js"), "module.exports = class UserService { login() {} };").await;

        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService"));
        let cache = Arc::new(ExportsCache::default());

        let results = scan(root, &sig, &config, &cache).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.rel_path, "UserService.js");
    }

    #[tokio::test]
    async fn scan_respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("a/b/c/d/e/f/g/h/i/j/k/Deep.js"), "module.exports = class Deep {};").await;

        let mut config = Configuration::default();
        config.max_depth = 2;
        let sig = normalize(Signature::new());
        let cache = Arc::new(ExportsCache::default());

        let results = scan(root, &sig, &config, &cache).await;
        assert!(results.is_empty(), "file beyond max_depth should not be reached");
    }
}
