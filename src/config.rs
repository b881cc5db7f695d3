//! The configuration schema the engine consumes (§6.1).
//!
//! This module defines the shape; loading it from multiple sources (env vars,
//! layered files, CLI overlay) is explicitly out of scope (§1) and left to the
//! host application. [`Configuration::from_toml_str`] is provided as a single-source
//! convenience, not a multi-source merge.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::evaluator::Candidate;
use crate::signature::Signature;

/// A path-scoring pattern: either a literal substring or a user-supplied
/// callable. Config files can only ever express the substring form — callables
/// are attached programmatically, matching how the original system's JSON/TOML
/// config can't carry function values either.
#[derive(Clone)]
pub enum PathPattern {
    Substring(String),
    Callable(Arc<dyn Fn(&str) -> i64 + Send + Sync>),
}

impl PathPattern {
    pub fn substring(s: impl Into<String>) -> Self {
        PathPattern::Substring(s.into())
    }

    pub fn callable(f: impl Fn(&str) -> i64 + Send + Sync + 'static) -> Self {
        PathPattern::Callable(Arc::new(f))
    }

    pub(crate) fn contribution(&self, path: &str, weight: i64) -> i64 {
        match self {
            PathPattern::Substring(pat) => {
                if path.contains(pat.as_str()) {
                    weight
                } else {
                    0
                }
            }
            PathPattern::Callable(f) => f(path),
        }
    }
}

impl std::fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathPattern::Substring(s) => write!(f, "PathPattern::Substring({s:?})"),
            PathPattern::Callable(_) => write!(f, "PathPattern::Callable(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(PathPattern::Substring(s))
    }
}

impl Serialize for PathPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PathPattern::Substring(s) => serializer.serialize_str(s),
            PathPattern::Callable(_) => serializer.serialize_str("<callable>"),
        }
    }
}

/// A user-supplied scoring function, invoked as `(candidate, signature, content)`.
/// Exceptions (panics are not caught — a poisoned scorer is treated as a caller
/// bug) are not expected; errors are logged and the contribution is zero.
pub type CustomScorer = Arc<dyn Fn(&Candidate, &Signature, &str) -> i64 + Send + Sync>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameWeights {
    pub exact_match: i64,
    pub case_insensitive: i64,
    pub partial_match: i64,
    pub regex_match: i64,
}

impl Default for FileNameWeights {
    fn default() -> Self {
        Self { exact_match: 50, case_insensitive: 30, partial_match: 15, regex_match: 40 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionWeights {
    pub per_mention: i64,
    pub max_mentions: u32,
}

impl Default for MentionWeights {
    fn default() -> Self {
        Self { per_mention: 5, max_mentions: 5 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWeights {
    pub module_exports: i64,
    pub named_export: i64,
    pub default_export: i64,
}

impl Default for ExportWeights {
    fn default() -> Self {
        Self { module_exports: 25, named_export: 20, default_export: 15 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecencyWeights {
    pub max_bonus: i64,
    pub half_life_hours: f64,
}

impl Default for RecencyWeights {
    fn default() -> Self {
        Self { max_bonus: 0, half_life_hours: 168.0 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathWeights {
    #[serde(default)]
    pub positive: Vec<(PathPattern, i64)>,
    #[serde(default)]
    pub negative: Vec<(PathPattern, i64)>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    #[serde(default)]
    pub min_candidate_score: i64,
    #[serde(default)]
    pub paths: PathWeights,
    #[serde(default)]
    pub extensions: std::collections::HashMap<String, i64>,
    #[serde(default)]
    pub type_hints: std::collections::HashMap<String, i64>,
    #[serde(default)]
    pub file_name: FileNameWeights,
    #[serde(default)]
    pub methods: MentionWeights,
    #[serde(default)]
    pub exports: ExportWeights,
    #[serde(default)]
    pub names: MentionWeights,
    /// Applied at validation time, not scored during the evaluator pass —
    /// see `resolver::validate_candidate`.
    #[serde(default)]
    pub target_exact_name: i64,
    #[serde(default)]
    pub recency: RecencyWeights,
    /// Not serde-deserializable — attached programmatically.
    #[serde(skip)]
    pub custom: Vec<CustomScorer>,
}

impl std::fmt::Debug for ScoringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringConfig")
            .field("min_candidate_score", &self.min_candidate_score)
            .field("paths", &self.paths)
            .field("extensions", &self.extensions)
            .field("type_hints", &self.type_hints)
            .field("file_name", &self.file_name)
            .field("methods", &self.methods)
            .field("exports", &self.exports)
            .field("names", &self.names)
            .field("target_exact_name", &self.target_exact_name)
            .field("recency", &self.recency)
            .field("custom", &format!("<{} custom scorer(s)>", self.custom.len()))
            .finish()
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut extensions = std::collections::HashMap::new();
        extensions.insert(".ts".to_string(), 10);
        extensions.insert(".tsx".to_string(), 10);
        extensions.insert(".js".to_string(), 0);
        extensions.insert(".jsx".to_string(), 0);

        let mut type_hints = std::collections::HashMap::new();
        type_hints.insert("class".to_string(), 15);
        type_hints.insert("function".to_string(), 15);
        type_hints.insert("module".to_string(), 10);

        Self {
            min_candidate_score: 0,
            paths: PathWeights::default(),
            extensions,
            type_hints,
            file_name: FileNameWeights::default(),
            methods: MentionWeights::default(),
            exports: ExportWeights::default(),
            names: MentionWeights::default(),
            target_exact_name: 0,
            recency: RecencyWeights::default(),
            custom: Vec::new(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_file() -> String {
    ".discovery-cache.json".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_file")]
    pub file: String,
    /// Seconds; 0 means "no TTL" (§9 resolves the source's mixed seconds/ms
    /// semantics in favor of seconds-with-zero-meaning-unset).
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub log_warnings: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: ".discovery-cache.json".to_string(),
            ttl: 0,
            log_warnings: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default)]
    pub allow_unsafe_requires: bool,
    #[serde(default = "SecurityConfig::default_blocked_tokens")]
    pub blocked_tokens: Vec<String>,
}

impl SecurityConfig {
    fn default_blocked_tokens() -> Vec<String> {
        vec!["process.exit(".to_string(), "child_process".to_string(), "eval(".to_string()]
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_unsafe_requires: false,
            blocked_tokens: vec![
                "process.exit(".to_string(),
                "child_process".to_string(),
                "eval(".to_string(),
            ],
        }
    }
}

/// The merged configuration object the engine consumes, under the `discovery`
/// namespace (§6.1).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub extensions: Vec<String>,
    pub max_depth: u32,
    pub skip_directories: HashSet<String>,
    pub concurrency: usize,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            extensions: vec![".ts".into(), ".tsx".into(), ".js".into(), ".jsx".into()],
            max_depth: 10,
            skip_directories: [
                "node_modules",
                ".git",
                "dist",
                "build",
                "coverage",
                ".next",
                "vendor",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            concurrency: 8,
            scoring: ScoringConfig::default(),
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Configuration {
    /// Parse a single TOML document into a `Configuration`, falling back to
    /// defaults for any field it doesn't set. Not a substitute for the
    /// excluded multi-source config loader — just a convenience for the
    /// common "one `.discovery.toml`" case.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize, Default)]
        struct Wrapper {
            #[serde(default)]
            discovery: Option<PartialConfig>,
        }
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct PartialConfig {
            extensions: Option<Vec<String>>,
            max_depth: Option<u32>,
            skip_directories: Option<HashSet<String>>,
            concurrency: Option<usize>,
            scoring: Option<ScoringConfig>,
            cache: Option<CacheConfig>,
            security: Option<SecurityConfig>,
        }

        let wrapper: Wrapper = toml::from_str(content).map_err(|e| e)?;
        let mut cfg = Configuration::default();
        if let Some(partial) = wrapper.discovery {
            if let Some(v) = partial.extensions {
                cfg.extensions = v;
            }
            if let Some(v) = partial.max_depth {
                cfg.max_depth = v;
            }
            if let Some(v) = partial.skip_directories {
                cfg.skip_directories = v;
            }
            if let Some(v) = partial.concurrency {
                cfg.concurrency = v;
            }
            if let Some(v) = partial.scoring {
                cfg.scoring = v;
            }
            if let Some(v) = partial.cache {
                cfg.cache = v;
            }
            if let Some(v) = partial.security {
                cfg.security = v;
            }
        }
        Ok(cfg)
    }

    pub fn with_custom_scorer(mut self, scorer: CustomScorer) -> Self {
        self.scoring.custom.push(scorer);
        self
    }

    pub fn with_positive_path_pattern(mut self, pattern: PathPattern, weight: i64) -> Self {
        self.scoring.paths.positive.push((pattern, weight));
        self
    }

    pub fn with_negative_path_pattern(mut self, pattern: PathPattern, weight: i64) -> Self {
        self.scoring.paths.negative.push((pattern, weight));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Configuration::default();
        assert!(cfg.max_depth >= 1);
        assert!(cfg.concurrency >= 1);
        assert!(cfg.skip_directories.contains("node_modules"));
    }

    #[test]
    fn from_toml_overrides_subset() {
        let toml = r#"
            [discovery]
            maxDepth = 4
            concurrency = 2
        "#;
        let cfg = Configuration::from_toml_str(toml).unwrap();
        assert_eq!(cfg.max_depth, 4);
        assert_eq!(cfg.concurrency, 2);
        assert!(!cfg.extensions.is_empty(), "unset fields keep defaults");
    }

    #[test]
    fn from_toml_merges_cache_and_security_tables() {
        let toml = r#"
            [discovery.cache]
            enabled = false
            file = "custom-cache.json"
            ttl = 60
            logWarnings = true

            [discovery.security]
            allowUnsafeRequires = true
        "#;
        let cfg = Configuration::from_toml_str(toml).unwrap();
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.file, "custom-cache.json");
        assert_eq!(cfg.cache.ttl, 60);
        assert!(cfg.security.allow_unsafe_requires);
        assert_eq!(
            cfg.security.blocked_tokens,
            SecurityConfig::default_blocked_tokens(),
            "an explicit [discovery.security] table with no blockedTokens key still gets the default list, not an empty one"
        );
    }

    #[test]
    fn from_toml_merges_partial_scoring_table() {
        let toml = r#"
            [discovery.scoring]
            minCandidateScore = 5
        "#;
        let cfg = Configuration::from_toml_str(toml).unwrap();
        assert_eq!(cfg.scoring.min_candidate_score, 5);
        assert_eq!(cfg.scoring.file_name.exact_match, FileNameWeights::default().exact_match);
    }

    #[test]
    fn path_pattern_substring_matches() {
        let p = PathPattern::substring("/tests/");
        assert_eq!(p.contribution("/repo/tests/foo.ts", -40), -40);
        assert_eq!(p.contribution("/repo/src/foo.ts", -40), 0);
    }
}
