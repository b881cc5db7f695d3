//! Public and internal error types for the discovery pipeline.
//!
//! Only [`DiscoveryError::InvalidSignature`] and [`DiscoveryError::NoMatch`] ever
//! cross the public API boundary (see §7 of the spec). Every other failure kind is
//! recovered locally at its operation site and folded into "this candidate doesn't
//! count" rather than propagated.

use std::fmt;
use std::path::PathBuf;

use crate::scoring::ScoreBreakdown;
use crate::signature::Signature;

/// Errors that can cross the public `discover`/`explain` boundary.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The caller's signature was not a well-formed structural description.
    #[error("invalid signature: {detail}\n  example: {example}")]
    InvalidSignature { detail: String, example: &'static str },

    /// The scan and every candidate resolution attempt failed.
    #[error("{0}")]
    NoMatch(NoMatchReport),
}

impl DiscoveryError {
    pub fn invalid_signature(detail: impl Into<String>) -> Self {
        DiscoveryError::InvalidSignature {
            detail: detail.into(),
            example: r#"{ name: "UserService", type: "class", methods: ["login"] }"#,
        }
    }
}

/// One candidate's ranking, kept around for `NoMatch` diagnostics.
#[derive(Debug, Clone)]
pub struct CandidateSummary {
    pub rel_path: String,
    pub score: i64,
    pub breakdown: ScoreBreakdown,
}

/// The diagnostic payload attached to a failed discovery.
///
/// Kept as a structured type (rather than a bare string) so callers can
/// introspect it programmatically; [`fmt::Display`] renders the multi-line
/// guidance text described in §7.
#[derive(Debug, Clone)]
pub struct NoMatchReport {
    pub signature: Signature,
    /// Exactly the top 3 candidates, with score breakdowns.
    pub top_candidates: Vec<CandidateSummary>,
    /// Alternate export names found on the scanned candidates that resolve
    /// to the same declaration the signature seems to be after (e.g. an
    /// `export { X as Y }` alias) — empty when none could be resolved.
    pub aliases: Vec<String>,
    pub suggested_signature: Option<Signature>,
}

impl fmt::Display for NoMatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "No match found for signature: {}", self.signature.describe())?;
        if self.top_candidates.is_empty() {
            writeln!(f, "  (no candidates scored above the minimum threshold)")?;
        } else {
            writeln!(f, "  top candidates:")?;
            for c in &self.top_candidates {
                writeln!(f, "    {} (score {})", c.rel_path, c.score)?;
                for (category, contribution) in &c.breakdown.0 {
                    writeln!(f, "      {category}: {contribution}")?;
                }
            }
        }
        if !self.aliases.is_empty() {
            writeln!(f, "  aliases: {}", self.aliases.join(", "))?;
        }
        if let Some(s) = &self.suggested_signature {
            writeln!(f, "  suggested signature: {}", s.describe())?;
        }
        writeln!(f, "  troubleshooting:")?;
        writeln!(f, "    - confirm the target file's extension is in `extensions`")?;
        writeln!(f, "    - confirm no ancestor directory is in `skipDirectories`")?;
        writeln!(f, "    - loosen `methods`/`properties` if the export is still partial")?;
        Ok(())
    }
}

impl std::error::Error for NoMatchReport {}

/// Internal, recoverable failures. None of these are part of the public API;
/// they are converted into "treat this file/step as absent" at their call site.
#[derive(Debug)]
pub(crate) enum InternalError {
    FileUnreadable(PathBuf),
    ParseFailed,
    CacheIoError(String),
    Timeout(&'static str),
    UnsafeCandidate { token: String },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalError::FileUnreadable(p) => write!(f, "unreadable file: {}", p.display()),
            InternalError::ParseFailed => write!(f, "parse failed"),
            InternalError::CacheIoError(msg) => write!(f, "cache I/O error: {msg}"),
            InternalError::Timeout(op) => write!(f, "timed out during {op}"),
            InternalError::UnsafeCandidate { token } => {
                write!(f, "candidate rejected: blocked token `{token}` present")
            }
        }
    }
}
