//! Resolve scholarly article records to full-text PDF links
//!
//! A journal's publisher profile (from the registry) names a strategy and a
//! URL template; strategies build candidate links and optionally verify them
//! over HTTP. A cache in front of the whole chain keeps repeat lookups free.

pub mod article;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod papers;
pub mod settings;

pub use article::ArticleRecord;
pub use engine::Engine;
pub use error::{Failure, ReasonCode};
pub use papers::{ResolutionOutcome, ResolveOptions};
