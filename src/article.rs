//! Article records supplied by the caller
//!
//! Strategies read these; the only transformation allowed is the
//! volume/issue/page squaring in [`ArticleRecord::squared`], which works on
//! a copy.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifying facts about one article
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub journal: String,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    /// Publisher item identifier (e.g. ScienceDirect PII)
    pub pii: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    /// Raw page range, used when `first_page` is absent
    pub pages: Option<String>,
    /// PMC release date; a future date means the mirror copy is embargoed
    pub release_date: Option<NaiveDate>,
}

impl ArticleRecord {
    pub fn new(journal: impl Into<String>) -> Self {
        Self {
            journal: journal.into(),
            ..Default::default()
        }
    }

    /// Numeric cache key, if the article has a usable PMID
    pub fn cache_key(&self) -> Option<i64> {
        non_empty(&self.pmid).and_then(|p| p.parse::<i64>().ok())
    }

    pub fn doi(&self) -> Option<&str> {
        non_empty(&self.doi)
    }

    pub fn pmid(&self) -> Option<&str> {
        non_empty(&self.pmid)
    }

    pub fn pii(&self) -> Option<&str> {
        non_empty(&self.pii)
    }

    /// PMC id without the `PMC` prefix
    pub fn pmc_number(&self) -> Option<&str> {
        let raw = non_empty(&self.pmcid)?;
        let digits = match raw.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("pmc") => &raw[3..],
            _ => raw,
        };
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            Some(digits)
        } else {
            None
        }
    }

    /// Copy with volume/issue/first page coerced into canonical shape.
    ///
    /// - `volume = "137(4)"` with no issue becomes volume `137`, issue `4`
    /// - issue part designators (`4 Pt 2`, `4 Suppl 1`) reduce to `4`
    /// - first page falls back to the start of `pages` (`1020-34` -> `1020`)
    pub fn squared(&self) -> ArticleRecord {
        let mut out = self.clone();

        let mut volume = non_empty(&self.volume).map(str::to_string);
        let mut issue = non_empty(&self.issue).map(str::to_string);

        if let Some(vol) = volume.clone() {
            if let Some((head, rest)) = vol.split_once('(') {
                let inner = rest.trim_end_matches(')').trim();
                volume = Some(head.trim().to_string());
                if issue.is_none() && !inner.is_empty() {
                    issue = Some(inner.to_string());
                }
            }
        }

        if let Some(iss) = issue.clone() {
            let iss = iss.trim_start_matches('(').trim_end_matches(')');
            let lead = iss.split_whitespace().next().unwrap_or("");
            let lowered = lead.to_ascii_lowercase();
            // "Suppl 2" alone keeps its number; "4 Suppl" keeps the 4
            issue = if lowered.starts_with("suppl") || lowered.starts_with("pt") {
                Some(iss.split_whitespace().collect::<Vec<_>>().join(" "))
            } else if lead.is_empty() {
                None
            } else {
                Some(lead.to_string())
            };
        }

        let first_page = non_empty(&self.first_page)
            .map(str::to_string)
            .or_else(|| {
                non_empty(&self.pages).and_then(|p| {
                    p.split(['-', '\u{2013}', ','])
                        .next()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                })
            });

        out.volume = volume.filter(|v| !v.is_empty());
        out.issue = issue.filter(|i| !i.is_empty());
        out.first_page = first_page;
        out
    }

    /// `(volume, issue, first_page)` if all three are present after squaring
    pub fn vip(&self) -> Option<(String, String, String)> {
        let sq = self.squared();
        match (sq.volume, sq.issue, sq.first_page) {
            (Some(v), Some(i), Some(p)) => Some((v, i, p)),
            _ => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
