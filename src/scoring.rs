//! Scoring engine (§4.4) — combines nine independent contribution categories
//! into a single candidate score: path, extension, file name, type hints,
//! method mentions, export shape, name mentions, user-supplied custom
//! scorers, and recency.
//!
//! Every category is additive and independently explainable; [`ScoreBreakdown`]
//! preserves the per-category contribution so [`crate::error::NoMatchReport`]
//! can show its work.

use crate::config::ScoringConfig;
use crate::evaluator::Candidate;
use crate::exports::{AccessDescriptor, ExportKind};
use crate::signature::{NameMatch, NormalizedSignature, TargetType};

/// Ordered per-category contributions, in evaluation order. Categories that
/// contributed zero are still recorded, so a caller can see what was checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown(pub Vec<(String, i64)>);

impl ScoreBreakdown {
    fn push(&mut self, category: &str, contribution: i64) {
        self.0.push((category.to_string(), contribution));
    }

    pub fn total(&self) -> i64 {
        self.0.iter().map(|(_, v)| v).sum()
    }
}

fn score_path(candidate: &Candidate, config: &ScoringConfig) -> i64 {
    let mut total = 0;
    for (pattern, weight) in &config.paths.positive {
        total += pattern.contribution(&candidate.rel_path, *weight);
    }
    for (pattern, weight) in &config.paths.negative {
        total += pattern.contribution(&candidate.rel_path, *weight);
    }
    total
}

fn score_extension(candidate: &Candidate, config: &ScoringConfig) -> i64 {
    config.extensions.get(&candidate.extension).copied().unwrap_or(0)
}

/// A signature name can be matched against a file's stem with decreasing
/// confidence: exact, case-insensitive, substring, or an explicit regex.
fn score_file_name(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    let Some(name) = &signature.original.name else { return 0 };
    let stem = candidate
        .file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(&candidate.file_name);

    match name {
        NameMatch::Regex(re) => {
            if re.is_match(&candidate.file_name) || re.is_match(stem) {
                config.file_name.regex_match
            } else {
                0
            }
        }
        NameMatch::Literal(lit) => {
            if stem == lit.as_str() {
                config.file_name.exact_match
            } else if stem.eq_ignore_ascii_case(lit) {
                config.file_name.case_insensitive
            } else if stem.to_lowercase().contains(&lit.to_lowercase()) {
                config.file_name.partial_match
            } else {
                0
            }
        }
    }
}

/// Cheap, content-level heuristics for "this file probably defines a class /
/// function / module-level export", independent of whether AST parsing
/// succeeded (§4.4 — type hints run even when export analysis later fails).
fn score_type_hints(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    let Some(target) = &signature.original.target_type else { return 0 };
    let hinted = match target {
        TargetType::Class => candidate.content.contains("class "),
        TargetType::Function => {
            candidate.content.contains("function ") || candidate.content.contains("=>")
        }
        TargetType::Module | TargetType::Object => {
            candidate.content.contains("module.exports") || candidate.content.contains("export default")
        }
    };
    if hinted {
        config.type_hints.get(target.as_str()).copied().unwrap_or(0)
    } else {
        0
    }
}

/// Count word-boundary-bounded occurrences of `needle` in `content` (§4.4
/// categories 5/7) — a plain substring count would let a required method
/// `"add"` inflate on `"address"`, or a signature name `"Log"` match inside
/// `"Logger"`.
fn count_mentions(content: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let pattern = format!(r"\b{}\b", regex::escape(needle));
    match regex::Regex::new(&pattern) {
        Ok(re) => re.find_iter(content).count(),
        Err(_) => content.matches(needle).count(),
    }
}

fn score_method_mentions(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    let mut total = 0i64;
    for method in &signature.methods {
        let mentions = count_mentions(&candidate.content, method).min(config.methods.max_mentions as usize);
        total += mentions as i64 * config.methods.per_mention;
    }
    total
}

fn score_name_mentions(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    let NameMatch::Literal(lit) = (match &signature.original.name {
        Some(n) => n,
        None => return 0,
    }) else {
        return 0;
    };
    let mentions = count_mentions(&candidate.content, lit).min(config.names.max_mentions as usize);
    mentions as i64 * config.names.per_mention
}

/// Does any statically-extracted export on this candidate structurally match
/// the signature (by name, and by method/property subset when present)?
fn matching_export<'a>(candidate: &'a Candidate, signature: &NormalizedSignature) -> Option<&'a crate::exports::Export> {
    let metadata = candidate.exports.as_ref()?;
    metadata.exports.iter().find(|export| {
        let name_ok = match &signature.original.name {
            Some(name @ NameMatch::Literal(_)) => {
                name.matches_exact(&export.info.name)
                    || export.name.as_deref().is_some_and(|n| name.matches_exact(n))
            }
            Some(NameMatch::Regex(re)) => re.is_match(&export.info.name),
            None => true,
        };
        if !name_ok {
            return false;
        }
        let type_ok = match &signature.original.target_type {
            Some(TargetType::Class) => export.info.kind == ExportKind::Class,
            Some(TargetType::Function) => export.info.kind == ExportKind::Function,
            Some(TargetType::Object) => export.info.kind == ExportKind::Object,
            Some(TargetType::Module) | None => true,
        };
        if !type_ok {
            return false;
        }
        signature.methods.iter().all(|m| export.info.methods.contains(m))
            && signature.properties.iter().all(|p| export.info.properties.contains(p))
    })
}

/// Category 6 (§4.4): only contributes when `signature.exports` names a
/// specific export; the matched export's named access must equal it exactly.
fn score_exports(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    let Some(expected) = &signature.exports else { return 0 };
    match matching_export(candidate, signature).map(|e| &e.access) {
        Some(AccessDescriptor::Direct) => config.exports.module_exports,
        Some(AccessDescriptor::Default) => config.exports.default_export,
        Some(AccessDescriptor::Named(name)) if name == expected => config.exports.named_export,
        _ => 0,
    }
}

fn score_custom(candidate: &Candidate, signature: &NormalizedSignature, config: &ScoringConfig) -> i64 {
    config
        .custom
        .iter()
        .map(|scorer| scorer(candidate, &signature.original, &candidate.content))
        .sum()
}

/// Exponential decay from `modified` toward `max_bonus`, halving every
/// `half_life_hours`. Candidates with no known modification time score zero
/// (never penalized for missing metadata).
fn score_recency(candidate: &Candidate, config: &ScoringConfig) -> i64 {
    if config.recency.max_bonus == 0 {
        return 0;
    }
    let Some(modified) = candidate.modified else { return 0 };
    let Ok(age) = modified.elapsed() else { return 0 };
    let age_hours = age.as_secs_f64() / 3600.0;
    if config.recency.half_life_hours <= 0.0 {
        return 0;
    }
    let decay = 0.5f64.powf(age_hours / config.recency.half_life_hours);
    ((config.recency.max_bonus as f64) * decay).round() as i64
}

/// Run every scoring category against a single candidate, returning the total
/// score and the breakdown that produced it.
pub fn score_candidate(
    candidate: &Candidate,
    signature: &NormalizedSignature,
    config: &ScoringConfig,
) -> (i64, ScoreBreakdown) {
    let mut breakdown = ScoreBreakdown::default();

    breakdown.push("path", score_path(candidate, config));
    breakdown.push("extension", score_extension(candidate, config));
    breakdown.push("fileName", score_file_name(candidate, signature, config));
    breakdown.push("typeHints", score_type_hints(candidate, signature, config));
    breakdown.push("methods", score_method_mentions(candidate, signature, config));
    breakdown.push("exports", score_exports(candidate, signature, config));
    breakdown.push("names", score_name_mentions(candidate, signature, config));
    breakdown.push("custom", score_custom(candidate, signature, config));
    breakdown.push("recency", score_recency(candidate, config));

    (breakdown.total(), breakdown)
}
