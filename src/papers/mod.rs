//! Full-text link resolution for scholarly articles
//!
//! Resolution runs as a priority chain, short-circuiting on the first URL:
//! 1. Repository mirror (Europe PMC) when the article has a PMC id
//! 2. Identifier-in-URL shortcuts for a handful of journals
//! 3. Prefix families (PLoS)
//! 4. The journal's publisher profile from the registry, via the dispatcher
//!
//! Results are `(url, reason)` pairs; the cache layer in [`cache`] sits in
//! front of the chain.

pub mod cache;
pub mod crossref;
pub mod dispatcher;
pub mod resolver;
pub mod strategies;
pub mod verify;

use crate::error::{Failure, ReasonCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call knobs shared by every strategy
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Fetch each candidate and confirm it is a PDF; `false` builds links offline
    pub verify: bool,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Overrides the browser user agent sent while verifying
    pub user_agent: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            verify: true,
            timeout: Duration::from_secs(verify::DEFAULT_TIMEOUT_SECS),
            max_redirects: verify::DEFAULT_MAX_REDIRECTS,
            user_agent: None,
        }
    }
}

impl ResolveOptions {
    /// Construction only, no network access
    pub fn offline() -> Self {
        Self { verify: false, ..Default::default() }
    }

    pub fn verifier(&self) -> verify::Verifier {
        let verifier = verify::Verifier::new(self.timeout, self.max_redirects);
        match &self.user_agent {
            Some(agent) => verifier.with_user_agent(agent.clone()),
            None => verifier,
        }
    }
}

/// Terminal result of a resolution: a URL, or a classified reason, or a URL
/// with an advisory reason
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub url: Option<String>,
    pub reason: Option<String>,
}

impl ResolutionOutcome {
    pub fn found(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), reason: None }
    }

    pub fn found_with_advisory(url: impl Into<String>, advisory: Option<String>) -> Self {
        Self { url: Some(url.into()), reason: advisory }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { url: None, reason: Some(reason.into()) }
    }

    pub fn from_failure(failure: &Failure) -> Self {
        Self::failed(failure.to_string())
    }

    pub fn is_found(&self) -> bool {
        self.url.as_deref().map(|u| !u.is_empty()).unwrap_or(false)
    }

    /// Code of the reason, if the reason is classified
    pub fn code(&self) -> Option<ReasonCode> {
        self.reason.as_deref().and_then(ReasonCode::parse)
    }
}

/// Attempt/success counters per resolution stage
#[derive(Debug, Default, Clone)]
pub struct ResolutionStats {
    pub mirror_success: u32,
    pub mirror_attempts: u32,
    pub shortcut_success: u32,
    pub shortcut_attempts: u32,
    pub prefix_success: u32,
    pub prefix_attempts: u32,
    pub publisher_success: u32,
    pub publisher_attempts: u32,
    pub cache_hits: u32,
}

impl ResolutionStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = ResolutionOutcome::found("http://x/a.pdf");
        assert!(ok.is_found());
        assert_eq!(ok.code(), None);

        let miss = ResolutionOutcome::from_failure(&Failure::missing("DOI"));
        assert!(!miss.is_found());
        assert_eq!(miss.reason.as_deref(), Some("MISSING: DOI"));
        assert_eq!(miss.code(), Some(ReasonCode::Missing));
    }

    #[test]
    fn test_empty_url_is_not_found() {
        let outcome = ResolutionOutcome { url: Some(String::new()), reason: None };
        assert!(!outcome.is_found());
    }

    #[test]
    fn test_default_options() {
        let opts = ResolveOptions::default();
        assert!(opts.verify);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.max_redirects, 3);
        assert!(!ResolveOptions::offline().verify);
    }
}
