//! PLoS journal family and the paywall short-circuit

use super::{StrategyContext, StrategyOutput};
use crate::article::ArticleRecord;
use crate::db::journal_key;
use crate::error::{Failure, StrategyError};
use crate::papers::verify::Verifier;
use crate::papers::ResolveOptions;

pub const PLOS_BASE: &str = "https://journals.plos.org";

/// Journal name prefix routed to [`plos_link`]
pub const PLOS_PREFIX: &str = "plos";

/// Normalized journal name -> journals.plos.org site slug
const PLOS_SLUGS: &[(&str, &str)] = &[
    ("plos one", "plosone"),
    ("plos biol", "plosbiology"),
    ("plos biology", "plosbiology"),
    ("plos med", "plosmedicine"),
    ("plos medicine", "plosmedicine"),
    ("plos comput biol", "ploscompbiol"),
    ("plos computational biology", "ploscompbiol"),
    ("plos genet", "plosgenetics"),
    ("plos genetics", "plosgenetics"),
    ("plos pathog", "plospathogens"),
    ("plos pathogens", "plospathogens"),
    ("plos negl trop dis", "plosntds"),
    ("plos neglected tropical diseases", "plosntds"),
];

pub fn plos_slug(journal: &str) -> Option<&'static str> {
    let key = journal_key(journal);
    PLOS_SLUGS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, slug)| *slug)
}

pub fn is_plos_journal(journal: &str) -> bool {
    journal_key(journal).starts_with(PLOS_PREFIX)
}

/// Printable PDF for a PLoS article, addressed by DOI
pub fn plos_link(
    article: &ArticleRecord,
    base_url: &str,
    verifier: &Verifier,
    options: &ResolveOptions,
) -> Result<StrategyOutput, StrategyError> {
    let slug = plos_slug(&article.journal).ok_or_else(|| {
        Failure::no_format(format!("No URL format for Journal {}", article.journal))
    })?;
    let doi = article.doi().ok_or_else(|| Failure::missing("DOI"))?;

    let url = format!(
        "{}/{}/article/file?id={}&type=printable",
        base_url.trim_end_matches('/'),
        slug,
        doi
    );
    if !options.verify {
        return Ok(url.into());
    }
    Ok(verifier.verify_pdf(&url)?.into())
}

pub fn the_plos_pogo(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    let base = ctx.profile.base_url.as_deref().unwrap_or(PLOS_BASE);
    plos_link(article, base, ctx.verifier, ctx.options)
}

/// Profiles known to sit behind an access wall; never touches the network
pub fn the_paywall_shuffle(
    _ctx: &StrategyContext<'_>,
    _article: &ArticleRecord,
) -> Result<StrategyOutput, StrategyError> {
    Err(Failure::paywall().into())
}
