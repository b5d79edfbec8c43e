//! Link Resolver - Priority-based fallback chain
//!
//! Tries sources in order, returning on the first URL:
//! 1. Europe PMC mirror (articles with a PMC id)
//! 2. Identifier-in-URL shortcuts (small fixed table)
//! 3. PLoS prefix family
//! 4. Registry profile via the dispatcher
//!
//! When nothing produces a URL, the last non-empty reason wins.

use super::cache::ArticleResolver;
use super::dispatcher::Dispatcher;
use super::strategies::plos::{is_plos_journal, plos_link, PLOS_BASE};
use super::strategies::pmc::{the_pmc_twist, EUROPE_PMC};
use super::strategies::template::fill_template;
use super::strategies::StrategyOutput;
use super::{ResolutionOutcome, ResolutionStats, ResolveOptions};
use crate::article::ArticleRecord;
use crate::db::{journal_key, FormatParams};
use crate::error::{Failure, StrategyError};

/// Journals whose PDFs are addressed directly by an article identifier
const SHORTCUTS: &[(&str, &str)] = &[
    ("j biol chem", "https://www.jbc.org/article/{pii}/pdf"),
    ("mol cell proteomics", "https://www.mcponline.org/article/{pii}/pdf"),
    ("j lipid res", "https://www.jlr.org/article/{pii}/pdf"),
    ("nucleic acids res", "https://academic.oup.com/nar/article-pdf/doi/{doi}"),
];

fn shortcut_template(journal: &str) -> Option<&'static str> {
    let key = journal_key(journal);
    SHORTCUTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, template)| *template)
}

/// Link resolver that tries multiple sources in priority order
pub struct LinkResolver {
    pub stats: ResolutionStats,
    dispatcher: Dispatcher,
    pmc_base: String,
    plos_base: String,
}

impl LinkResolver {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            stats: ResolutionStats::new(),
            dispatcher,
            pmc_base: EUROPE_PMC.to_string(),
            plos_base: PLOS_BASE.to_string(),
        }
    }

    pub fn with_pmc_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.pmc_base = base_url.into();
        self
    }

    pub fn with_plos_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.plos_base = base_url.into();
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get statistics summary
    pub fn get_stats(&self) -> &ResolutionStats {
        &self.stats
    }

    /// Run the chain once. Never fails: every outcome is a `(url, reason)` pair.
    pub fn resolve(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        if article.journal.trim().is_empty() {
            return ResolutionOutcome::from_failure(&Failure::missing("journal name"));
        }

        let verifier = options.verifier();
        let mut last_reason: Option<String> = None;
        // set once a journal-specific stage owned the journal
        let mut journal_handled = false;

        // 1. Repository mirror
        if article.pmc_number().is_some() {
            self.stats.mirror_attempts += 1;
            let outcome = normalize(the_pmc_twist(article, &self.pmc_base, &verifier, options), article, "the_pmc_twist");
            if outcome.is_found() {
                self.stats.mirror_success += 1;
                return outcome;
            }
            tracing::debug!(pmid = article.pmid().unwrap_or(""), "mirror failed: {:?}", outcome.reason);
            keep_reason(&mut last_reason, outcome);
        }

        // 2. Identifier shortcuts
        if let Some(template) = shortcut_template(&article.journal) {
            journal_handled = true;
            self.stats.shortcut_attempts += 1;
            let result = shortcut_link(article, template, &verifier, options);
            let outcome = normalize(result, article, "shortcut");
            if outcome.is_found() {
                self.stats.shortcut_success += 1;
                return outcome;
            }
            keep_reason(&mut last_reason, outcome);
        }

        // 3. Prefix family
        if is_plos_journal(&article.journal) {
            journal_handled = true;
            self.stats.prefix_attempts += 1;
            let outcome = normalize(plos_link(article, &self.plos_base, &verifier, options), article, "the_plos_pogo");
            if outcome.is_found() {
                self.stats.prefix_success += 1;
                return outcome;
            }
            keep_reason(&mut last_reason, outcome);
        }

        // 4. Registry profile
        match self.dispatcher.handler_for(&article.journal) {
            Ok(Some(handler)) => {
                self.stats.publisher_attempts += 1;
                let outcome = handler.resolve(article, options);
                if outcome.is_found() {
                    self.stats.publisher_success += 1;
                    return outcome;
                }
                keep_reason(&mut last_reason, outcome);
            }
            Ok(None) if !journal_handled => {
                last_reason = Some(
                    Failure::no_format(format!("No URL format for Journal {}", article.journal)).to_string(),
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(journal = %article.journal, "registry lookup failed: {}", e);
                last_reason = Some(Failure::tx_error(format!("registry lookup failed: {}", e)).to_string());
            }
        }

        ResolutionOutcome {
            url: None,
            reason: Some(last_reason.unwrap_or_else(|| {
                Failure::no_format(format!("No URL format for Journal {}", article.journal)).to_string()
            })),
        }
    }
}

impl ArticleResolver for LinkResolver {
    fn resolve(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        LinkResolver::resolve(self, article, options)
    }
}

fn shortcut_link(
    article: &ArticleRecord,
    template: &str,
    verifier: &super::verify::Verifier,
    options: &ResolveOptions,
) -> Result<StrategyOutput, StrategyError> {
    let mut params = FormatParams::new();
    for (key, value) in [("pii", article.pii()), ("pmid", article.pmid()), ("doi", article.doi())] {
        if let Some(v) = value {
            params.insert(key.to_string(), v.to_string());
        }
    }
    let url = fill_template(template, &params).map_err(Failure::missing)?;
    if !options.verify {
        return Ok(url.into());
    }
    Ok(verifier.verify_pdf(&url)?.into())
}

/// Same contract the dispatcher enforces, for the built-in stages
fn normalize(
    result: Result<StrategyOutput, StrategyError>,
    article: &ArticleRecord,
    stage: &str,
) -> ResolutionOutcome {
    match result {
        Ok(output) => ResolutionOutcome::found_with_advisory(output.url, output.advisory),
        Err(StrategyError::Classified(failure)) => ResolutionOutcome::from_failure(&failure),
        Err(e) => {
            tracing::error!(
                pmid = article.pmid().unwrap_or(""),
                journal = %article.journal,
                strategy = stage,
                "unclassified failure: {}",
                e
            );
            ResolutionOutcome::from_failure(&Failure::tx_error(e.to_string()))
        }
    }
}

fn keep_reason(last: &mut Option<String>, outcome: ResolutionOutcome) {
    if let Some(reason) = outcome.reason.filter(|r| !r.trim().is_empty()) {
        *last = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::parse_config;
    use crate::db::Registry;
    use crate::error::ReasonCode;
    use crate::papers::crossref::NoHints;
    use crate::papers::strategies::StrategyTable;
    use chrono::{Duration as ChronoDuration, Local};
    use httpmock::prelude::*;
    use std::sync::Arc;

    const REGISTRY: &str = r#"
        [[publisher]]
        name = "HighWire"
        strategy = "the_vip_shake"
        url_template = "http://{host}/content/{volume}/{issue}/{firstPage}.full.pdf"
        journals = [{ name = "Brain", host = "brain.example.org" }]
    "#;

    fn resolver() -> LinkResolver {
        let registry = Registry::in_memory_unseeded().unwrap();
        registry.rebuild(&parse_config(REGISTRY).unwrap(), false).unwrap();
        LinkResolver::new(Dispatcher::new(
            Arc::new(registry),
            StrategyTable::standard(),
            Arc::new(NoHints),
        ))
    }

    fn brain_article() -> ArticleRecord {
        ArticleRecord {
            journal: "Brain".to_string(),
            volume: Some("137".to_string()),
            issue: Some("4".to_string()),
            first_page: Some("1020".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_journal() {
        let outcome = resolver().resolve(&ArticleRecord::default(), &ResolveOptions::offline());
        assert_eq!(outcome, ResolutionOutcome::failed("MISSING: journal name"));
    }

    #[test]
    fn test_unknown_journal_is_noformat() {
        let outcome = resolver().resolve(&ArticleRecord::new("J Nowhere"), &ResolveOptions::offline());
        assert_eq!(outcome, ResolutionOutcome::failed("NOFORMAT: No URL format for Journal J Nowhere"));
    }

    #[test]
    fn test_registry_stage() {
        let mut r = resolver();
        let outcome = r.resolve(&brain_article(), &ResolveOptions::offline());
        assert_eq!(outcome.url.as_deref(), Some("http://brain.example.org/content/137/4/1020.full.pdf"));
        assert_eq!(r.stats.publisher_attempts, 1);
        assert_eq!(r.stats.publisher_success, 1);
        assert_eq!(r.stats.mirror_attempts, 0);
    }

    #[test]
    fn test_mirror_wins_first() {
        let server = MockServer::start();
        let render = server.mock(|when, then| {
            when.method(GET).path("/articles/PMC42");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.7");
        });

        let mut r = resolver().with_pmc_base_url(server.base_url());
        let mut article = brain_article();
        article.pmcid = Some("PMC42".to_string());

        let outcome = r.resolve(&article, &ResolveOptions::default());
        assert_eq!(outcome.url, Some(format!("{}/articles/PMC42?pdf=render", server.base_url())));
        assert_eq!(r.stats.mirror_success, 1);
        assert_eq!(r.stats.publisher_attempts, 0);
        render.assert();
    }

    #[test]
    fn test_embargoed_mirror_falls_through() {
        let mut r = resolver();
        let mut article = brain_article();
        article.pmcid = Some("PMC42".to_string());
        article.release_date = Some(Local::now().date_naive() + ChronoDuration::days(10));

        let outcome = r.resolve(&article, &ResolveOptions::offline());
        assert!(outcome.is_found());
        assert_eq!(r.stats.mirror_attempts, 1);
        assert_eq!(r.stats.mirror_success, 0);
        assert_eq!(r.stats.publisher_success, 1);
    }

    #[test]
    fn test_malformed_pmcid_skips_mirror() {
        let mut r = resolver();
        let mut article = brain_article();
        article.pmcid = Some("P€1".to_string());

        let outcome = r.resolve(&article, &ResolveOptions::offline());
        assert!(outcome.is_found());
        assert_eq!(r.stats.mirror_attempts, 0);
        assert_eq!(r.stats.publisher_success, 1);
    }

    #[test]
    fn test_last_reason_for_unknown_journal() {
        let mut article = ArticleRecord::new("J Nowhere");
        article.pmcid = Some("PMC42".to_string());
        article.release_date = Some(Local::now().date_naive() + ChronoDuration::days(10));

        let outcome = resolver().resolve(&article, &ResolveOptions::offline());
        assert_eq!(outcome.code(), Some(ReasonCode::NoFormat));
    }

    #[test]
    fn test_shortcut_stage() {
        let mut r = resolver();
        let mut article = ArticleRecord::new("J Biol Chem");
        assert_eq!(
            r.resolve(&article, &ResolveOptions::offline()),
            ResolutionOutcome::failed("MISSING: pii")
        );

        article.pii = Some("S0021-9258(19)52451-6".to_string());
        let outcome = r.resolve(&article, &ResolveOptions::offline());
        assert_eq!(outcome.url.as_deref(), Some("https://www.jbc.org/article/S0021-9258(19)52451-6/pdf"));
        assert_eq!(r.stats.shortcut_attempts, 2);
        assert_eq!(r.stats.shortcut_success, 1);
    }

    #[test]
    fn test_plos_stage() {
        let mut r = resolver();
        let mut article = ArticleRecord::new("PLoS One");
        article.doi = Some("10.1371/journal.pone.0001234".to_string());
        let outcome = r.resolve(&article, &ResolveOptions::offline());
        assert_eq!(
            outcome.url.as_deref(),
            Some("https://journals.plos.org/plosone/article/file?id=10.1371/journal.pone.0001234&type=printable")
        );
        assert_eq!(r.stats.prefix_success, 1);
    }

    #[test]
    fn test_plos_reason_is_kept_when_registry_has_nothing() {
        let outcome = resolver().resolve(&ArticleRecord::new("PLoS One"), &ResolveOptions::offline());
        assert_eq!(outcome, ResolutionOutcome::failed("MISSING: DOI"));
    }
}
