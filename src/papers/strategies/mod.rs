//! Resolution strategies
//!
//! A strategy turns an article plus its publisher profile into a candidate
//! link. Profiles name their strategy by id; [`StrategyTable`] maps those ids
//! to plain functions so nothing is looked up by reflection at runtime.

pub mod generic;
pub mod plos;
pub mod pmc;
pub mod template;

use super::crossref::LinkHints;
use super::verify::Verifier;
use super::ResolveOptions;
use crate::article::ArticleRecord;
use crate::db::{PublisherProfile, Registry};
use crate::error::StrategyError;
use std::collections::HashMap;

/// Id of the strategy that short-circuits to `PAYWALL`
pub const PAYWALL_STRATEGY: &str = "the_paywall_shuffle";

/// Everything a strategy may consult besides the article itself
pub struct StrategyContext<'a> {
    pub registry: &'a Registry,
    pub profile: &'a PublisherProfile,
    pub verifier: &'a Verifier,
    pub hints: &'a dyn LinkHints,
    pub options: &'a ResolveOptions,
}

/// A constructed link, optionally with a soft advisory reason
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub url: String,
    pub advisory: Option<String>,
}

impl StrategyOutput {
    pub fn with_advisory(url: impl Into<String>, advisory: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            advisory: Some(advisory.into()),
        }
    }
}

impl From<String> for StrategyOutput {
    fn from(url: String) -> Self {
        Self { url, advisory: None }
    }
}

pub type StrategyFn =
    fn(&StrategyContext<'_>, &ArticleRecord) -> Result<StrategyOutput, StrategyError>;

/// Strategy id -> function, filled once at startup
#[derive(Clone, Default)]
pub struct StrategyTable {
    entries: HashMap<&'static str, StrategyFn>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in strategy registered
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("the_doi_slide", generic::the_doi_slide);
        table.register("the_vip_shake", generic::the_vip_shake);
        table.register("the_pii_polka", generic::the_pii_polka);
        table.register("the_pmid_pogo", generic::the_pmid_pogo);
        table.register(PAYWALL_STRATEGY, plos::the_paywall_shuffle);
        table.register("the_pmc_twist", pmc::the_pmc_twist_strategy);
        table.register("the_plos_pogo", plos::the_plos_pogo);
        table
    }

    /// Add or replace a strategy; publisher-specific plugins come in here
    pub fn register(&mut self, id: &'static str, strategy: StrategyFn) {
        self.entries.insert(id, strategy);
    }

    pub fn get(&self, id: &str) -> Option<StrategyFn> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
