//! Language plugin extension point (§6.4).
//!
//! The engine ships exactly one analyzer — the JS/TS analyzer in
//! [`crate::exports`] — wired in directly rather than behind this trait, since
//! there is nothing to pick between yet. `LanguagePlugin` documents the seam a
//! second source ecosystem would plug into; it has no implementations.

use crate::exports::ExportsMetadata;

/// A pluggable per-language exports analyzer.
///
/// `extensions()` declares which file extensions this plugin claims; the
/// scanner would route matching files to `analyze` instead of the built-in
/// JS/TS path. Adding a plugin system for languages beyond the primary
/// ecosystem is explicitly out of scope (§1's Non-goals) — this trait exists
/// so that boundary is a documented seam, not a silent limitation.
pub trait LanguagePlugin: Send + Sync {
    /// File extensions this plugin handles, including the leading dot
    /// (e.g. `".py"`).
    fn extensions(&self) -> &[&str];

    /// Analyze file content, mirroring [`crate::exports::analyze`]'s contract:
    /// `None` on parse failure, never a propagated error.
    fn analyze(&self, content: &str, file_name: &str) -> Option<ExportsMetadata>;
}
