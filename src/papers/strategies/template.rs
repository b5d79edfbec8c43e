//! `{placeholder}` substitution for URL templates

use super::StrategyContext;
use crate::article::ArticleRecord;
use crate::db::seed::PLACEHOLDER_RE;
use crate::db::FormatParams;
use crate::error::StrategyError;

/// Fill every `{name}` in `template`; `Err` carries the first unfilled name
pub fn fill_template(template: &str, params: &FormatParams) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = params
            .get(name.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| name.as_str().to_string())?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Substitution values for one article under one profile.
///
/// Article fields come first (after squaring), then the profile's base host
/// as `{host}`, then the registry's per-journal parameters, which win.
pub fn article_params(
    ctx: &StrategyContext<'_>,
    article: &ArticleRecord,
) -> Result<FormatParams, StrategyError> {
    let squared = article.squared();
    let mut params = FormatParams::new();

    let mut put = |key: &str, value: Option<&str>| {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            params.insert(key.to_string(), v.to_string());
        }
    };
    put("doi", article.doi());
    put("pmid", article.pmid());
    put("pii", article.pii());
    put("pmcid", article.pmc_number());
    put("volume", squared.volume.as_deref());
    put("issue", squared.issue.as_deref());
    put("firstPage", squared.first_page.as_deref());

    if let Some(host) = ctx.profile.base_host() {
        params.insert("host".to_string(), host);
    }
    if let Some(journal_params) = ctx.registry.lookup_journal_params(&article.journal)? {
        params.extend(journal_params);
    }
    Ok(params)
}
