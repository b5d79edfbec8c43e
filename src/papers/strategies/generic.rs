//! Generic template strategies
//!
//! Each family checks that the article carries the fields its template
//! needs, fills the profile's primary template, and returns it as-is when
//! verification is off. With verification on, secondary and then legacy
//! templates are tried in order and the first verified PDF wins.

use super::template::{article_params, fill_template};
use super::{StrategyContext, StrategyOutput};
use crate::article::ArticleRecord;
use crate::error::{Failure, StrategyError};

/// Placeholders filled from the article; an empty one means missing input
const ARTICLE_FIELDS: &[&str] = &["doi", "pmid", "pmcid", "pii", "volume", "issue", "firstPage"];

const BLOCKED_ADVISORY: &str = "unverified: publisher rejects automated checks";

/// DOI template family
pub fn the_doi_slide(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    let doi = article.doi().ok_or_else(|| Failure::missing("DOI"))?;
    if ctx.profile.is_blocked() {
        return blocked_link(ctx, article, doi);
    }
    construct(ctx, article)
}

/// Volume/issue/page template family
pub fn the_vip_shake(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    if article.vip().is_none() {
        return Err(Failure::missing("vip").into());
    }
    construct(ctx, article)
}

/// Publisher item identifier in the path
pub fn the_pii_polka(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    if article.pii().is_none() {
        return Err(Failure::missing("pii").into());
    }
    construct(ctx, article)
}

/// PubMed id in the path
pub fn the_pmid_pogo(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    if article.pmid().is_none() {
        return Err(Failure::missing("pmid").into());
    }
    construct(ctx, article)
}

fn construct(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    let params = article_params(ctx, article)?;
    let url = primary_url(ctx, &params)?;

    if !ctx.options.verify {
        return Ok(url.into());
    }

    let mut last = match ctx.verifier.verify_pdf(&url) {
        Ok(found) => return Ok(found.into()),
        Err(failure) => failure,
    };

    let secondary = ctx.profile.secondary_templates();
    let legacy = ctx.profile.legacy_templates();
    for template in secondary.into_iter().chain(legacy) {
        let candidate = match fill_template(template, &params) {
            Ok(candidate) => candidate,
            Err(key) => {
                tracing::debug!(publisher = %ctx.profile.name, template, "skipping template, no value for {{{}}}", key);
                continue;
            }
        };
        match ctx.verifier.verify_pdf(&candidate) {
            Ok(found) => return Ok(found.into()),
            Err(failure) => {
                tracing::debug!(url = %candidate, "fallback candidate rejected: {}", failure);
                last = failure;
            }
        }
    }

    Err(last.into())
}

fn primary_url(
    ctx: &StrategyContext<'_>,
    params: &crate::db::FormatParams,
) -> Result<String, StrategyError> {
    let template = ctx.profile.primary_template().ok_or_else(|| {
        StrategyError::Template(format!("{} has no URL template", ctx.profile.name))
    })?;
    fill_template(template, params).map_err(|key| {
        if ARTICLE_FIELDS.contains(&key.as_str()) {
            Failure::missing(key).into()
        } else {
            StrategyError::Template(format!(
                "{}: no value for {{{}}} in {}",
                ctx.profile.name, key, template
            ))
        }
    })
}

/// Blocked publishers: CrossRef hints, then the bare template, never verified.
/// Offline construction skips the hint lookup.
fn blocked_link(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
    doi: &str,
) -> Result<StrategyOutput, StrategyError> {
    let hints = if ctx.options.verify {
        ctx.hints.pdf_links(doi)
    } else {
        Ok(Vec::new())
    };
    match hints {
        Ok(links) => {
            if let Some(first) = links.into_iter().next() {
                return Ok(StrategyOutput::with_advisory(first, BLOCKED_ADVISORY));
            }
        }
        Err(e) => {
            tracing::warn!(doi, publisher = %ctx.profile.name, "CrossRef link hints failed: {}", e);
        }
    }

    let params = article_params(ctx, article)?;
    let url = primary_url(ctx, &params)?;
    Ok(StrategyOutput::with_advisory(url, BLOCKED_ADVISORY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::parse_config;
    use crate::db::Registry;
    use crate::error::ReasonCode;
    use crate::papers::crossref::{CrossrefClient, LinkHints, NoHints};
    use crate::papers::strategies::StrategyFn;
    use crate::papers::ResolveOptions;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedHints(Vec<String>);

    impl LinkHints for FixedHints {
        fn pdf_links(&self, _doi: &str) -> Result<Vec<String>, StrategyError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FailingHints {
        calls: AtomicUsize,
    }

    impl LinkHints for FailingHints {
        fn pdf_links(&self, _doi: &str) -> Result<Vec<String>, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StrategyError::Unexpected("crossref down".to_string()))
        }
    }

    fn registry(toml: &str) -> Registry {
        let registry = Registry::in_memory_unseeded().unwrap();
        registry.rebuild(&parse_config(toml).unwrap(), false).unwrap();
        registry
    }

    fn run(
        registry: &Registry,
        strategy: StrategyFn,
        article: &ArticleRecord,
        options: &ResolveOptions,
        hints: &dyn LinkHints,
    ) -> Result<StrategyOutput, StrategyError> {
        let profile = registry
            .lookup_publisher_for_journal(&article.journal)
            .unwrap()
            .unwrap();
        let verifier = options.verifier();
        let ctx = StrategyContext {
            registry,
            profile: &profile,
            verifier: &verifier,
            hints,
            options,
        };
        strategy(&ctx, article)
    }

    fn quick_options() -> ResolveOptions {
        ResolveOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
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

    const VIP_REGISTRY: &str = r#"
        [[publisher]]
        name = "HighWire"
        strategy = "the_vip_shake"
        url_template = "http://{host}/content/{volume}/{issue}/{firstPage}.full.pdf"
        journals = [{ name = "Brain", host = "brain.example.org" }, "Hostless"]
    "#;

    #[test]
    fn test_vip_offline_construction() {
        let reg = registry(VIP_REGISTRY);
        let out = run(&reg, the_vip_shake, &brain_article(), &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(out.url, "http://brain.example.org/content/137/4/1020.full.pdf");
        assert_eq!(out.advisory, None);
    }

    #[test]
    fn test_vip_offline_is_idempotent() {
        let reg = registry(VIP_REGISTRY);
        let mut article = brain_article();
        article.volume = Some("137(4)".to_string());
        article.issue = None;
        article.first_page = None;
        article.pages = Some("1020-34".to_string());

        let first = run(&reg, the_vip_shake, &article, &ResolveOptions::offline(), &NoHints).unwrap();
        let second = run(&reg, the_vip_shake, &article, &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.url, "http://brain.example.org/content/137/4/1020.full.pdf");
    }

    #[test]
    fn test_vip_missing_fields() {
        let reg = registry(VIP_REGISTRY);
        let mut article = brain_article();
        article.issue = None;
        let err = run(&reg, the_vip_shake, &article, &ResolveOptions::offline(), &NoHints).unwrap_err();
        assert_eq!(err.to_string(), "MISSING: vip");
    }

    #[test]
    fn test_vip_without_host_is_template_error() {
        let reg = registry(VIP_REGISTRY);
        let mut article = brain_article();
        article.journal = "Hostless".to_string();
        let err = run(&reg, the_vip_shake, &article, &ResolveOptions::offline(), &NoHints).unwrap_err();
        assert!(matches!(err, StrategyError::Template(_)), "{:?}", err);
    }

    const DOI_REGISTRY: &str = r#"
        [[publisher]]
        name = "Springer"
        strategy = "the_doi_slide"
        url_template = "https://link.springer.com/content/pdf/{doi}.pdf"
        journals = ["Hum Genet"]

        [[publisher]]
        name = "Wiley"
        strategy = "the_doi_slide"
        url_template = "https://onlinelibrary.wiley.com/doi/pdfdirect/{doi}"
        blocked = true
        journals = ["Ann Neurol"]
    "#;

    #[test]
    fn test_doi_missing() {
        let reg = registry(DOI_REGISTRY);
        let err = run(&reg, the_doi_slide, &ArticleRecord::new("Hum Genet"), &ResolveOptions::offline(), &NoHints)
            .unwrap_err();
        assert!(err.to_string().starts_with("MISSING:"));
    }

    #[test]
    fn test_doi_offline() {
        let reg = registry(DOI_REGISTRY);
        let mut article = ArticleRecord::new("Hum Genet");
        article.doi = Some("10.1007/s00439-015-1234-5".to_string());
        let out = run(&reg, the_doi_slide, &article, &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(out.url, "https://link.springer.com/content/pdf/10.1007/s00439-015-1234-5.pdf");
    }

    #[test]
    fn test_blocked_prefers_crossref_hint() {
        let reg = registry(DOI_REGISTRY);
        let mut article = ArticleRecord::new("Ann Neurol");
        article.doi = Some("10.1002/ana.1".to_string());
        let hints = FixedHints(vec!["https://hint.example.org/ana.1.pdf".to_string()]);

        // verify=true still performs no request for blocked publishers
        let out = run(&reg, the_doi_slide, &article, &quick_options(), &hints).unwrap();
        assert_eq!(out.url, "https://hint.example.org/ana.1.pdf");
        assert!(out.advisory.is_some());
    }

    #[test]
    fn test_blocked_falls_back_to_template_when_hints_fail() {
        let reg = registry(DOI_REGISTRY);
        let mut article = ArticleRecord::new("Ann Neurol");
        article.doi = Some("10.1002/ana.1".to_string());
        let hints = FailingHints::default();

        let out = run(&reg, the_doi_slide, &article, &quick_options(), &hints).unwrap();
        assert_eq!(out.url, "https://onlinelibrary.wiley.com/doi/pdfdirect/10.1002/ana.1");
        assert_eq!(hints.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocked_offline_makes_no_crossref_request() {
        let server = MockServer::start();
        let works = server.mock(|when, then| {
            when.method(GET).path("/works/10.1002/ana.1");
            then.status(200).header("content-type", "application/json").body(
                r#"{"message":{"link":[{"URL":"https://hint.example.org/ana.1.pdf","content-type":"application/pdf"}]}}"#,
            );
        });
        let crossref = CrossrefClient::with_base_url(server.base_url(), None, Duration::from_secs(5)).unwrap();

        let reg = registry(DOI_REGISTRY);
        let mut article = ArticleRecord::new("Ann Neurol");
        article.doi = Some("10.1002/ana.1".to_string());

        let out = run(&reg, the_doi_slide, &article, &ResolveOptions::offline(), &crossref).unwrap();
        assert_eq!(out.url, "https://onlinelibrary.wiley.com/doi/pdfdirect/10.1002/ana.1");
        assert_eq!(out.advisory.as_deref(), Some(BLOCKED_ADVISORY));
        works.assert_hits(0);

        let out = run(&reg, the_doi_slide, &article, &quick_options(), &crossref).unwrap();
        assert_eq!(out.url, "https://hint.example.org/ana.1.pdf");
        works.assert_hits(1);
    }

    fn mock_registry(server: &MockServer) -> Registry {
        registry(&format!(
            r#"
            [[publisher]]
            name = "Mock Press"
            strategy = "the_doi_slide"
            url_template = "http://{{host}}/primary/{{doi}}"
            secondary_templates = ["http://{{host}}/secondary/{{doi}}", "http://{{widget}}/never"]
            legacy_templates = ["http://{{host}}/legacy/{{doi}}"]
            journals = [{{ name = "J Mock", host = "{}" }}]
            "#,
            server.address()
        ))
    }

    fn mock_article() -> ArticleRecord {
        let mut article = ArticleRecord::new("J Mock");
        article.doi = Some("10.5555/abc".to_string());
        article
    }

    #[test]
    fn test_verify_falls_through_to_secondary() {
        let server = MockServer::start();
        let primary = server.mock(|when, then| {
            when.method(GET).path("/primary/10.5555/abc");
            then.status(404);
        });
        let secondary = server.mock(|when, then| {
            when.method(GET).path("/secondary/10.5555/abc");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.5 fake");
        });
        let legacy = server.mock(|when, then| {
            when.method(GET).path("/legacy/10.5555/abc");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.5 fake");
        });

        let reg = mock_registry(&server);
        let out = run(&reg, the_doi_slide, &mock_article(), &quick_options(), &NoHints).unwrap();
        assert_eq!(out.url, format!("http://{}/secondary/10.5555/abc", server.address()));
        primary.assert();
        secondary.assert();
        legacy.assert_hits(0);
    }

    #[test]
    fn test_verify_reports_last_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/primary/10.5555/abc");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/secondary/10.5555/abc");
            then.status(401);
        });
        server.mock(|when, then| {
            when.method(GET).path("/legacy/10.5555/abc");
            then.status(403);
        });

        let reg = mock_registry(&server);
        let err = run(&reg, the_doi_slide, &mock_article(), &quick_options(), &NoHints).unwrap_err();
        match err {
            StrategyError::Classified(failure) => {
                assert_eq!(failure.code, ReasonCode::Denied);
                assert!(failure.detail.contains("forbidden"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_offline_skips_fallbacks_and_network() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.path_contains("/");
            then.status(500);
        });

        let reg = mock_registry(&server);
        let out = run(&reg, the_doi_slide, &mock_article(), &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(out.url, format!("http://{}/primary/10.5555/abc", server.address()));
        any.assert_hits(0);
    }

    #[test]
    fn test_pii_and_pmid_families() {
        let reg = registry(
            r#"
            [[publisher]]
            name = "Elsevier"
            strategy = "the_pii_polka"
            url_template = "https://www.sciencedirect.com/science/article/pii/{pii}/pdfft"
            journals = ["Neuron"]

            [[publisher]]
            name = "PMID Press"
            strategy = "the_pmid_pogo"
            url_template = "https://pmid.example.org/pdf/{pmid}"
            journals = ["J Pmid"]
            "#,
        );

        let mut neuron = ArticleRecord::new("Neuron");
        let err = run(&reg, the_pii_polka, &neuron, &ResolveOptions::offline(), &NoHints).unwrap_err();
        assert_eq!(err.to_string(), "MISSING: pii");
        neuron.pii = Some("S0896-6273(14)00123-4".to_string());
        let out = run(&reg, the_pii_polka, &neuron, &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(out.url, "https://www.sciencedirect.com/science/article/pii/S0896-6273(14)00123-4/pdfft");

        let mut article = ArticleRecord::new("J Pmid");
        let err = run(&reg, the_pmid_pogo, &article, &ResolveOptions::offline(), &NoHints).unwrap_err();
        assert_eq!(err.to_string(), "MISSING: pmid");
        article.pmid = Some("12345".to_string());
        let out = run(&reg, the_pmid_pogo, &article, &ResolveOptions::offline(), &NoHints).unwrap();
        assert_eq!(out.url, "https://pmid.example.org/pdf/12345");
    }
}
