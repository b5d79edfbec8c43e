//! Europe PMC repository mirror
//!
//! Articles with a PMC id are served by Europe PMC's PDF renderer, whatever
//! the publisher. The server redirects to the stored PDF.
//! URL format: https://europepmc.org/articles/PMC{id}?pdf=render

use super::{StrategyContext, StrategyOutput};
use crate::article::ArticleRecord;
use crate::error::{Failure, StrategyError};
use crate::papers::verify::Verifier;
use crate::papers::ResolveOptions;
use chrono::{Local, NaiveDate};

pub const EUROPE_PMC: &str = "https://europepmc.org";

/// Mirror link for a PMC article; `base_url` is swappable for tests
pub fn the_pmc_twist(
    article: &ArticleRecord,
    base_url: &str,
    verifier: &Verifier,
    options: &ResolveOptions,
) -> Result<StrategyOutput, StrategyError> {
    let pmc = article.pmc_number().ok_or_else(|| Failure::missing("pmcid"))?;

    if let Some(release) = article.release_date {
        if is_embargoed(release, Local::now().date_naive()) {
            return Err(Failure::denied(format!("PMC embargo until {}", release)).into());
        }
    }

    let url = format!("{}/articles/PMC{}?pdf=render", base_url.trim_end_matches('/'), pmc);
    if !options.verify {
        return Ok(url.into());
    }
    Ok(verifier.verify_pdf(&url)?.into())
}

/// Table entry for profiles that route every journal through the mirror
pub fn the_pmc_twist_strategy(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    let base = ctx.profile.base_url.as_deref().unwrap_or(EUROPE_PMC);
    the_pmc_twist(article, base, ctx.verifier, ctx.options)
}

fn is_embargoed(release: NaiveDate, today: NaiveDate) -> bool {
    release > today
}
