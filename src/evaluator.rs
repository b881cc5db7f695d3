//! Candidate evaluator (§4.5) — turns a filesystem path the scanner found into
//! a scored [`Candidate`], or discards it early when a cheap pre-filter already
//! rules it out.
//!
//! Pipeline: name pre-filter -> read content -> stat mtime -> analyze exports
//! -> score -> keep iff score exceeds `scoring.minCandidateScore`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::Configuration;
use crate::exports::{ExportsCache, ExportsMetadata};
use crate::scoring::ScoreBreakdown;
use crate::signature::{NameMatch, NormalizedSignature};

/// A file that survived the pre-filter and was fully evaluated.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub file_name: String,
    pub extension: String,
    pub content: String,
    pub exports: Option<ExportsMetadata>,
    pub modified: Option<SystemTime>,
}

/// A scored candidate, ready for the resolver.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: i64,
    pub breakdown: ScoreBreakdown,
}

/// Split `camelCase`/`PascalCase`/`snake_case`/`kebab-case` identifiers into
/// lowercase tokens, so `"userService"` and `"user-service"` both tokenize to
/// `["user", "service"]` for the cheap name pre-filter.
fn tokenize(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == '.' || ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.push(ch.to_ascii_lowercase());
        prev_lower = ch.is_lowercase() || ch.is_numeric();
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Quick, allocation-light rejection before touching the filesystem: if the
/// signature names a literal and the file's tokenized stem shares no token
/// with it, there is no point reading the file at all (§4.5 step 1).
fn passes_name_prefilter(file_stem: &str, signature: &NormalizedSignature) -> bool {
    let Some(NameMatch::Literal(lit)) = &signature.original.name else {
        return true; // no literal name, or a regex — can't cheaply pre-filter.
    };
    let target_tokens = tokenize(lit);
    if target_tokens.is_empty() {
        return true;
    }
    let file_tokens = tokenize(file_stem);
    target_tokens.iter().any(|t| file_tokens.contains(t))
}

/// Evaluate one candidate file against a signature. Returns `None` when the
/// file is filtered out (pre-filter miss, unreadable, or scored at/below
/// `minCandidateScore`) rather than an error — an unevaluable file is simply
/// absent from the result set (§4.5).
pub async fn evaluate(
    abs_path: &Path,
    rel_path: &str,
    signature: &NormalizedSignature,
    config: &Configuration,
    exports_cache: &ExportsCache,
) -> Option<ScoredCandidate> {
    let file_name = abs_path.file_name()?.to_str()?.to_string();
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&file_name);

    if !passes_name_prefilter(stem, signature) {
        return None;
    }

    const FILE_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
    let content = match tokio::time::timeout(FILE_READ_TIMEOUT, tokio::fs::read_to_string(abs_path)).await {
        Ok(Ok(content)) => content,
        Ok(Err(_)) => {
            tracing::trace!(
                error = %crate::error::InternalError::FileUnreadable(abs_path.to_path_buf()),
                "skipping unreadable candidate"
            );
            return None;
        }
        Err(_) => {
            tracing::warn!(
                path = %abs_path.display(),
                error = %crate::error::InternalError::Timeout("file read"),
                "candidate read timed out, skipping"
            );
            return None;
        }
    };
    let metadata = tokio::fs::metadata(abs_path).await.ok();
    let modified = metadata.and_then(|m| m.modified().ok());

    let extension = abs_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let exports = exports_cache.analyze(&content, &file_name);

    let candidate = Candidate {
        rel_path: rel_path.to_string(),
        abs_path: abs_path.to_path_buf(),
        file_name,
        extension,
        content,
        exports,
        modified,
    };

    let (score, breakdown) = crate::scoring::score_candidate(&candidate, signature, &config.scoring);
    if score <= config.scoring.min_candidate_score {
        return None;
    }

    Some(ScoredCandidate { candidate, score, breakdown })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_camel_case() {
        assert_eq!(tokenize("userService"), vec!["user", "service"]);
        assert_eq!(tokenize("UserService"), vec!["user", "service"]);
        assert_eq!(tokenize("user-service"), vec!["user", "service"]);
        assert_eq!(tokenize("user_service"), vec!["user", "service"]);
    }

    #[test]
    fn prefilter_accepts_shared_token() {
        let sig = crate::signature::normalize(crate::signature::Signature::new().with_name("UserService"));
        assert!(passes_name_prefilter("UserServiceImpl", &sig));
        assert!(passes_name_prefilter("user-service", &sig));
    }

    #[test]
    fn prefilter_rejects_unrelated_name() {
        let sig = crate::signature::normalize(crate::signature::Signature::new().with_name("UserService"));
        assert!(!passes_name_prefilter("PaymentGateway", &sig));
    }

    #[test]
    fn prefilter_passes_through_when_no_literal_name() {
        let sig = crate::signature::normalize(crate::signature::Signature::new());
        assert!(passes_name_prefilter("anything", &sig));
    }

    #[tokio::test]
    async fn evaluate_rejects_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("Unrelated.js");
        tokio::fs::write(&file_path, "module.exports = {};").await.unwrap();

        let mut config = Configuration::default();
        config.scoring.min_candidate_score = 10_000; // unreachable threshold
        let sig = crate::signature::normalize(crate::signature::Signature::new().with_name("UserService"));
        let cache = ExportsCache::default();

        let result = evaluate(&file_path, "Unrelated.js", &sig, &config, &cache).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn evaluate_accepts_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("UserService.js");
        tokio::fs::write(&file_path, "module.exports = class UserService { login() {} };").await.unwrap();

        let config = Configuration::default();
        let sig = crate::signature::normalize(crate::signature::Signature::new().with_name("UserService"));
        let cache = ExportsCache::default();

        let result = evaluate(&file_path, "UserService.js", &sig, &config, &cache).await;
        assert!(result.is_some());
        assert!(result.unwrap().score > 0);
    }
}
