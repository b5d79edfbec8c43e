//! Profile -> strategy dispatch
//!
//! The dispatcher is the one place that turns strategy results into the
//! uniform `(url, reason)` shape. Classified failures (and plugin messages
//! that already lead with a reason code) pass through as their reason
//! string; anything else is logged with full context and becomes
//! `TXERROR`. Nothing here caches.

use super::crossref::LinkHints;
use super::strategies::{StrategyContext, StrategyFn, StrategyTable, PAYWALL_STRATEGY};
use super::{ResolutionOutcome, ResolveOptions};
use crate::article::ArticleRecord;
use crate::db::{PublisherProfile, Registry};
use crate::error::{Failure, ReasonCode, RegistryError, StrategyError};
use std::sync::Arc;

pub struct Dispatcher {
    registry: Arc<Registry>,
    strategies: StrategyTable,
    hints: Arc<dyn LinkHints>,
}

#[derive(Clone, Copy)]
enum HandlerKind {
    Strategy(StrategyFn),
    /// Known access wall: answer `PAYWALL` without any request
    Paywall,
    /// Profile names a strategy id nobody registered
    Unregistered,
}

/// A journal's profile bound to its strategy, ready to run
pub struct Handler<'a> {
    dispatcher: &'a Dispatcher,
    profile: PublisherProfile,
    kind: HandlerKind,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, strategies: StrategyTable, hints: Arc<dyn LinkHints>) -> Self {
        Self {
            registry,
            strategies,
            hints,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn strategies(&self) -> &StrategyTable {
        &self.strategies
    }

    /// `None` when the journal has no active profile
    pub fn handler_for(&self, journal: &str) -> Result<Option<Handler<'_>>, RegistryError> {
        let Some(profile) = self.registry.lookup_publisher_for_journal(journal)? else {
            return Ok(None);
        };

        let kind = if profile.strategy_id == PAYWALL_STRATEGY {
            HandlerKind::Paywall
        } else {
            match self.strategies.get(&profile.strategy_id) {
                Some(strategy) => HandlerKind::Strategy(strategy),
                None => HandlerKind::Unregistered,
            }
        };

        Ok(Some(Handler {
            dispatcher: self,
            profile,
            kind,
        }))
    }
}

impl Handler<'_> {
    pub fn profile(&self) -> &PublisherProfile {
        &self.profile
    }

    pub fn is_paywall(&self) -> bool {
        matches!(self.kind, HandlerKind::Paywall)
    }

    pub fn resolve(&self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        let strategy = match self.kind {
            HandlerKind::Paywall => return ResolutionOutcome::from_failure(&Failure::paywall()),
            HandlerKind::Unregistered => {
                let message = format!("no strategy registered as '{}'", self.profile.strategy_id);
                return self.unexpected(article, &message);
            }
            HandlerKind::Strategy(strategy) => strategy,
        };

        let verifier = options.verifier();
        let ctx = StrategyContext {
            registry: &self.dispatcher.registry,
            profile: &self.profile,
            verifier: &verifier,
            hints: self.dispatcher.hints.as_ref(),
            options,
        };

        match strategy(&ctx, article) {
            Ok(output) if output.url.trim().is_empty() => {
                self.unexpected(article, "strategy returned an empty URL")
            }
            Ok(output) => {
                tracing::debug!(
                    pmid = article.pmid().unwrap_or(""),
                    journal = %article.journal,
                    strategy = %self.profile.strategy_id,
                    url = %output.url,
                    "link constructed"
                );
                ResolutionOutcome::found_with_advisory(output.url, output.advisory)
            }
            Err(StrategyError::Unexpected(message)) if ReasonCode::parse(&message).is_some() => {
                self.classified(article, &Failure::from_reason(&message))
            }
            Err(StrategyError::Classified(failure)) => self.classified(article, &failure),
            Err(e) => self.unexpected(article, &e.to_string()),
        }
    }

    fn classified(&self, article: &ArticleRecord, failure: &Failure) -> ResolutionOutcome {
        tracing::debug!(
            pmid = article.pmid().unwrap_or(""),
            journal = %article.journal,
            strategy = %self.profile.strategy_id,
            "{}",
            failure
        );
        ResolutionOutcome::from_failure(failure)
    }

    fn unexpected(&self, article: &ArticleRecord, message: &str) -> ResolutionOutcome {
        tracing::error!(
            pmid = article.pmid().unwrap_or(""),
            journal = %article.journal,
            publisher = %self.profile.name,
            strategy = %self.profile.strategy_id,
            "unclassified strategy failure: {}",
            message
        );
        ResolutionOutcome::from_failure(&Failure::tx_error(message))
    }
}
