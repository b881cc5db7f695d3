//! Candidate resolver (§4.6) — orders scored candidates, re-validates each
//! against the signature's structural requirements and the security gate, and
//! returns the first candidate that passes.
//!
//! There is no embedded JS/TS runtime to "load" a candidate's module value
//! against (§4.6.2 in the original model); validation instead re-checks the
//! already-extracted [`crate::exports::ExportInfo`] directly.

use crate::config::{Configuration, SecurityConfig};
use crate::evaluator::{Candidate, ScoredCandidate};
use crate::exports::{AccessDescriptor, ExportKind};
use crate::signature::{NameMatch, NormalizedSignature, TargetType};

/// One resolved result: the winning candidate plus why it won.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub candidate: Candidate,
    pub score: i64,
    pub access: AccessDescriptor,
}

/// Order candidates score descending; ties broken by the caller's declared
/// extension preference order (earlier entries in `extensions` win), then by
/// relative path for determinism.
fn order_candidates(mut scored: Vec<ScoredCandidate>, config: &Configuration) -> Vec<ScoredCandidate> {
    let ext_rank = |ext: &str| config.extensions.iter().position(|e| e == ext).unwrap_or(usize::MAX);
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| ext_rank(&a.candidate.extension).cmp(&ext_rank(&b.candidate.extension)))
            .then_with(|| a.candidate.rel_path.cmp(&b.candidate.rel_path))
    });
    scored
}

/// Blocked-token safety gate (§4.6's "unsafe candidate" rejection): content
/// containing a configured dangerous token is disqualified regardless of how
/// well it scored.
fn passes_security_gate(
    candidate: &Candidate,
    security: &SecurityConfig,
) -> Result<(), crate::error::InternalError> {
    if security.allow_unsafe_requires {
        return Ok(());
    }
    for token in &security.blocked_tokens {
        if candidate.content.contains(token.as_str()) {
            return Err(crate::error::InternalError::UnsafeCandidate { token: token.clone() });
        }
    }
    Ok(())
}

/// Find the export on this candidate that structurally satisfies the
/// signature (name, type, methods, properties all present).
fn find_structural_match<'a>(
    candidate: &'a Candidate,
    signature: &NormalizedSignature,
) -> Option<&'a crate::exports::Export> {
    let metadata = candidate.exports.as_ref()?;
    metadata.exports.iter().find(|export| {
        let name_ok = match &signature.name {
            Some(name @ NameMatch::Literal(_)) => {
                name.matches_exact(&export.info.name)
                    || export.name.as_deref().is_some_and(|n| name.matches_exact(n))
            }
            Some(NameMatch::Regex(re)) => re.is_match(&export.info.name),
            None => true,
        };
        let type_ok = match signature.target_type {
            Some(TargetType::Class) => export.info.kind == ExportKind::Class,
            Some(TargetType::Function) => export.info.kind == ExportKind::Function,
            Some(TargetType::Object) => export.info.kind == ExportKind::Object,
            Some(TargetType::Module) | None => true,
        };
        // §4.6.1: when `signature.exports` names a specific export, a
        // *named* access must match it exactly; direct/default access is
        // unaffected (there is no name to check it against).
        let exports_ok = match (&signature.exports, &export.access) {
            (Some(expected), AccessDescriptor::Named(name)) => name == expected,
            _ => true,
        };
        name_ok
            && type_ok
            && exports_ok
            && signature.methods.iter().all(|m| export.info.methods.contains(m))
            && signature.properties.iter().all(|p| export.info.properties.contains(p))
    })
}

/// Re-expressed runtime validation (§4.6.2 Open Question): `extends` and
/// `instanceof` are both checked against the statically-extracted base class
/// chain, since neither can be checked by constructing a live instance. A
/// class satisfies `instanceof` here on the strength of its constructor body
/// having been scanned for `this.*` assignments by the exports analyzer —
/// the closest static proxy for "this looks like a real instance".
fn validate_inheritance(export: &crate::exports::Export, signature: &NormalizedSignature) -> bool {
    if let Some(expected) = &signature.extends {
        if export.info.base_class.as_deref() != Some(expected.as_str()) {
            return false;
        }
    }
    if let Some(expected) = &signature.instanceof {
        if export.info.kind != ExportKind::Class {
            return false;
        }
        if export.info.base_class.as_deref() != Some(expected.as_str()) && export.info.name != *expected {
            return false;
        }
    }
    true
}

/// Returns the winning export's access descriptor plus the
/// `scoring.target.exactName` bonus (§6.1) — applied here, at validation
/// time, rather than during the evaluator's scoring pass, since it depends
/// on which export actually satisfied the signature, not just file content.
fn validate_candidate(
    candidate: &Candidate,
    signature: &NormalizedSignature,
    security: &SecurityConfig,
    exact_name_bonus: i64,
) -> Option<(AccessDescriptor, i64)> {
    if let Err(reason) = passes_security_gate(candidate, security) {
        tracing::debug!(path = %candidate.rel_path, error = %reason, "candidate rejected by security gate");
        return None;
    }

    let export = find_structural_match(candidate, signature)?;
    if !validate_inheritance(export, signature) {
        return None;
    }

    let bonus = match &signature.name {
        Some(NameMatch::Literal(lit)) if export.info.name == *lit => exact_name_bonus,
        _ => 0,
    };
    Some((export.access.clone(), bonus))
}

/// Split score-descending-ordered candidates into contiguous groups of equal
/// score — a "tie bucket" (§4.6). Candidates are already sorted by score, so
/// equal scores are always adjacent.
fn score_buckets(ordered: &[ScoredCandidate]) -> Vec<&[ScoredCandidate]> {
    let mut buckets = Vec::new();
    let mut start = 0;
    for i in 1..=ordered.len() {
        if i == ordered.len() || ordered[i].score != ordered[start].score {
            buckets.push(&ordered[start..i]);
            start = i;
        }
    }
    buckets
}

/// Resolve the winning candidate. Candidates are grouped into score-tie
/// buckets first (§4.6); within a bucket, up to five candidates are
/// validated concurrently, but a bucket is only attempted once every
/// strictly-higher-scored bucket has fully failed — a lower-scored candidate
/// is never consulted while a higher-scored one might still resolve (§5(iii)).
pub async fn resolve(
    scored: Vec<ScoredCandidate>,
    signature: &NormalizedSignature,
    config: &Configuration,
) -> Option<Resolution> {
    const BATCH_SIZE: usize = 5;
    let ordered = order_candidates(scored, config);
    let exact_name_bonus = config.scoring.target_exact_name;

    for bucket in score_buckets(&ordered) {
        for batch in bucket.chunks(BATCH_SIZE) {
            let checks: Vec<_> = batch
                .iter()
                .map(|sc| {
                    let candidate = sc.candidate.clone();
                    let signature = signature.clone();
                    let security = config.security.clone();
                    tokio::spawn(async move { validate_candidate(&candidate, &signature, &security, exact_name_bonus) })
                })
                .collect();

            let mut outcomes: Vec<Option<(AccessDescriptor, i64)>> = Vec::with_capacity(checks.len());
            for check in checks {
                outcomes.push(check.await.ok().flatten());
            }

            for (i, sc) in batch.iter().enumerate() {
                if let Some((access, bonus)) = outcomes[i].take() {
                    return Some(Resolution { candidate: sc.candidate.clone(), score: sc.score + bonus, access });
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, SecurityConfig};
    use crate::scoring::ScoreBreakdown;
    use crate::signature::{normalize, Signature};
    use std::path::PathBuf;

    fn scored(rel_path: &str, content: &str, score: i64) -> ScoredCandidate {
        let file_name = rel_path.rsplit('/').next().unwrap().to_string();
        ScoredCandidate {
            candidate: Candidate {
                rel_path: rel_path.to_string(),
                abs_path: PathBuf::from(rel_path),
                extension: rel_path.rsplit_once('.').map(|(_, e)| format!(".{e}")).unwrap_or_default(),
                content: content.to_string(),
                exports: crate::exports::analyze(content, &file_name),
                file_name,
                modified: None,
            },
            score,
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[tokio::test]
    async fn tied_bucket_resolves_before_lower_scored_candidate_is_consulted() {
        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService"));

        let candidates = vec![
            scored("src/Mismatch.js", "module.exports = class UserService { logout() {} };", 60),
            scored("src/Winner.js", "module.exports = class UserService { login() {} };", 60),
            scored("src/LowerScored.js", "module.exports = class UserService { login() {} };", 10),
        ];

        let resolution = resolve(candidates, &sig, &config).await.unwrap();
        assert_eq!(resolution.candidate.rel_path, "src/Winner.js", "the passing member of the tied bucket must win");
    }

    #[test]
    fn score_buckets_group_equal_scores_contiguously() {
        let config = Configuration::default();
        let ordered = order_candidates(
            vec![
                scored("src/a.js", "module.exports = {};", 50),
                scored("src/b.js", "module.exports = {};", 50),
                scored("src/c.js", "module.exports = {};", 10),
            ],
            &config,
        );
        let buckets = score_buckets(&ordered);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].len(), 2);
        assert_eq!(buckets[1].len(), 1);
    }

    #[tokio::test]
    async fn highest_score_wins() {
        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService"));

        let candidates = vec![
            scored("src/UserService.js", "module.exports = class UserService { login() {} };", 10),
            scored("src/UserServiceImpl.js", "module.exports = class UserService { login() {} };", 50),
        ];

        let resolution = resolve(candidates, &sig, &config).await.unwrap();
        assert_eq!(resolution.candidate.rel_path, "src/UserServiceImpl.js");
    }

    #[tokio::test]
    async fn structural_mismatch_is_skipped_in_favor_of_next() {
        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("UserService").with_methods(["logout"]));

        let candidates = vec![
            scored("src/Best.js", "module.exports = class UserService { login() {} };", 90),
            scored("src/Second.js", "module.exports = class UserService { login() { } logout() {} };", 40),
        ];

        let resolution = resolve(candidates, &sig, &config).await.unwrap();
        assert_eq!(resolution.candidate.rel_path, "src/Second.js", "must have the required `logout` method");
    }

    #[tokio::test]
    async fn blocked_token_disqualifies_regardless_of_score() {
        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("Danger"));

        let candidates = vec![scored(
            "src/Danger.js",
            "module.exports = class Danger { run() { child_process.exec('rm -rf /'); } };",
            100,
        )];

        let resolution = resolve(candidates, &sig, &config).await;
        assert!(resolution.is_none());
    }

    #[tokio::test]
    async fn extends_gate_requires_matching_base_class() {
        let config = Configuration::default();
        let sig = normalize(Signature::new().with_name("Repository").with_extends("BaseRepository"));

        let candidates = vec![
            scored("src/Wrong.js", "class Other {}\nmodule.exports = class Repository extends Other {};", 80),
            scored(
                "src/Right.js",
                "class BaseRepository {}\nmodule.exports = class Repository extends BaseRepository {};",
                40,
            ),
        ];

        let resolution = resolve(candidates, &sig, &config).await.unwrap();
        assert_eq!(resolution.candidate.rel_path, "src/Right.js");
    }

    #[tokio::test]
    async fn exact_name_bonus_applied_at_validation_time() {
        let mut config = Configuration::default();
        config.scoring.target_exact_name = 100;
        let sig = normalize(Signature::new().with_name("UserService"));

        let candidates = vec![scored("src/UserService.js", "module.exports = class UserService { login() {} };", 10)];

        let resolution = resolve(candidates, &sig, &config).await.unwrap();
        assert_eq!(resolution.score, 110, "exact literal-name match should add the configured bonus");
    }

    #[test]
    fn order_candidates_breaks_ties_by_path() {
        let config = Configuration::default();
        let candidates = vec![
            scored("src/b.js", "module.exports = {};", 10),
            scored("src/a.js", "module.exports = {};", 10),
        ];
        let ordered = order_candidates(candidates, &config);
        assert_eq!(ordered[0].candidate.rel_path, "src/a.js");
    }
}
