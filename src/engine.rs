//! Resolution engine
//!
//! Owns the registry handle, the CrossRef client, the strategy table and the
//! cache. Built once by the caller from [`Settings`] (or piece by piece) and
//! passed around explicitly.

use crate::article::ArticleRecord;
use crate::db::Registry;
use crate::error::EngineError;
use crate::papers::cache::{CacheStore, CachedResolver, RetryPolicy};
use crate::papers::crossref::{CrossrefClient, LinkHints};
use crate::papers::dispatcher::Dispatcher;
use crate::papers::resolver::LinkResolver;
use crate::papers::strategies::StrategyTable;
use crate::papers::{ResolutionOutcome, ResolutionStats, ResolveOptions};
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    registry: Arc<Registry>,
    resolver: CachedResolver<LinkResolver>,
    options: ResolveOptions,
}

impl Engine {
    /// Open the registry and cache named by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        Self::open(settings, true)
    }

    /// Like [`Engine::from_settings`]; `use_cache = false` resolves every call fresh
    pub fn open(settings: &Settings, use_cache: bool) -> Result<Self, EngineError> {
        let registry_path = settings.registry_db_path();
        tracing::debug!(registry = %registry_path.display(), cache = %settings.cache_dir.display(), "opening engine");

        let registry = Arc::new(Registry::open(&registry_path)?);
        let options = options_from(settings);
        let hints: Arc<dyn LinkHints> = Arc::new(CrossrefClient::new(
            settings.crossref_mailto.as_deref(),
            options.timeout,
        )?);
        let store = if use_cache {
            Some(CacheStore::open(settings.cache_db_path())?)
        } else {
            None
        };
        let policy = RetryPolicy {
            retry_errors: settings.retry_errors,
            retry_paywall: settings.retry_paywall,
        };

        Ok(Self::new(registry, StrategyTable::standard(), hints, store, policy, options))
    }

    pub fn new(
        registry: Arc<Registry>,
        strategies: StrategyTable,
        hints: Arc<dyn LinkHints>,
        store: Option<CacheStore>,
        policy: RetryPolicy,
        options: ResolveOptions,
    ) -> Self {
        let resolver = LinkResolver::new(Dispatcher::new(registry.clone(), strategies, hints));
        Self::with_resolver(registry, resolver, store, policy, options)
    }

    /// Assemble around an already-configured resolver
    pub fn with_resolver(
        registry: Arc<Registry>,
        resolver: LinkResolver,
        store: Option<CacheStore>,
        policy: RetryPolicy,
        options: ResolveOptions,
    ) -> Self {
        let resolver = match store {
            Some(store) => CachedResolver::new(resolver, store, policy),
            None => CachedResolver::uncached(resolver, policy),
        };
        Self {
            registry,
            resolver,
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.resolver.set_policy(policy);
    }

    /// Resolve with the engine's default options
    pub fn resolve(&mut self, article: &ArticleRecord) -> ResolutionOutcome {
        let options = self.options.clone();
        self.resolve_with(article, &options)
    }

    pub fn resolve_with(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        self.resolver.resolve(article, options)
    }

    pub fn stats(&self) -> ResolutionStats {
        let mut stats = self.resolver.inner().get_stats().clone();
        stats.cache_hits = self.resolver.hits;
        stats
    }
}

pub fn options_from(settings: &Settings) -> ResolveOptions {
    ResolveOptions {
        verify: settings.verify,
        timeout: Duration::from_secs(settings.timeout_secs),
        max_redirects: settings.max_redirects,
        user_agent: settings.user_agent.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::parse_config;
    use crate::papers::crossref::NoHints;
    use httpmock::prelude::*;

    fn mock_engine(server: &MockServer, store: Option<CacheStore>) -> Engine {
        let registry = Registry::in_memory_unseeded().unwrap();
        registry
            .rebuild(
                &parse_config(&format!(
                    r#"
                    [[publisher]]
                    name = "HighWire"
                    strategy = "the_vip_shake"
                    url_template = "http://{{host}}/content/{{volume}}/{{issue}}/{{firstPage}}.full.pdf"
                    journals = [{{ name = "Brain", host = "{}" }}]
                    "#,
                    server.address()
                ))
                .unwrap(),
                false,
            )
            .unwrap();
        Engine::new(
            Arc::new(registry),
            StrategyTable::standard(),
            Arc::new(NoHints),
            store,
            RetryPolicy::default(),
            ResolveOptions::default(),
        )
    }

    fn brain_article() -> ArticleRecord {
        ArticleRecord {
            journal: "Brain".to_string(),
            pmid: Some("24000000".to_string()),
            volume: Some("137".to_string()),
            issue: Some("4".to_string()),
            first_page: Some("1020".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_verified_result_is_served_from_cache() {
        let server = MockServer::start();
        let pdf = server.mock(|when, then| {
            when.method(GET).path("/content/137/4/1020.full.pdf");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.4");
        });

        let mut engine = mock_engine(&server, Some(CacheStore::in_memory().unwrap()));
        let first = engine.resolve(&brain_article());
        let second = engine.resolve(&brain_article());

        assert!(first.is_found());
        assert_eq!(first, second);
        pdf.assert_hits(1);
        assert_eq!(engine.stats().cache_hits, 1);
        assert_eq!(engine.stats().publisher_success, 1);
    }

    #[test]
    fn test_without_store_every_call_is_fresh() {
        let server = MockServer::start();
        let pdf = server.mock(|when, then| {
            when.method(GET).path("/content/137/4/1020.full.pdf");
            then.status(200).header("content-type", "application/pdf").body("%PDF-1.4");
        });

        let mut engine = mock_engine(&server, None);
        engine.resolve(&brain_article());
        engine.resolve(&brain_article());
        pdf.assert_hits(2);
    }

    #[test]
    fn test_from_settings_seeds_registry_in_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            cache_dir: dir.path().to_path_buf(),
            verify: false,
            ..Default::default()
        };

        let mut engine = Engine::from_settings(&settings).unwrap();
        assert!(dir.path().join("registry.db").exists());
        assert!(dir.path().join("findit.db").exists());
        assert!(engine.registry().count_publishers().unwrap() > 0);

        let outcome = engine.resolve(&ArticleRecord::new("Journal Of Nothing"));
        assert_eq!(outcome.reason.as_deref(), Some("NOFORMAT: No URL format for Journal Journal Of Nothing"));
    }
}
