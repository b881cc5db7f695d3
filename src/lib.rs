//! Signature-based code discovery.
//!
//! Given a structural description of something a JS/TS module exports — a
//! class with certain methods, a function with a certain name, a default
//! export shaped like an object — [`Engine::discover`] scans a source tree
//! and returns the file that exports it. The description survives file moves,
//! renames, and refactors that a plain path lookup wouldn't.
//!
//! ```no_run
//! use sigfind::{Configuration, Engine, Signature};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new("./src", Configuration::default()).await?;
//! let path = engine.discover(Signature::new().with_name("UserService").with_methods(["login"])).await?;
//! println!("found at {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! This crate emits [`tracing`] events for its pipeline stages; installing a
//! subscriber (`tracing_subscriber::fmt()` or otherwise) is the host
//! application's job, not this crate's.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod exports;
pub mod plugin;
pub mod resolver;
pub mod scanner;
pub mod scoring;
pub mod signature;

pub use cache::{CacheManager, ResolutionRecord};
pub use config::Configuration;
pub use engine::{Engine, EngineRegistry, ExplainReport};
pub use error::{CandidateSummary, DiscoveryError, NoMatchReport};
pub use evaluator::{Candidate, ScoredCandidate};
pub use exports::{AccessDescriptor, Export, ExportKind, ExportsCache, ExportsMetadata};
pub use plugin::LanguagePlugin;
pub use resolver::Resolution;
pub use scoring::ScoreBreakdown;
pub use signature::{NameMatch, NormalizedSignature, Signature, TargetType};
