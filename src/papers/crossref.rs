//! CrossRef link hints
//!
//! CrossRef works records may carry full-text links deposited by the
//! publisher. They are only consulted for profiles marked blocked, where
//! direct verification is pointless, and never during offline construction.
//! API docs: https://api.crossref.org/swagger-ui/index.html

use crate::error::StrategyError;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const CROSSREF_API: &str = "https://api.crossref.org";

/// Source of candidate PDF links for a DOI. No hints is an empty list, not an error.
pub trait LinkHints: Send + Sync {
    fn pdf_links(&self, doi: &str) -> Result<Vec<String>, StrategyError>;
}

/// Hint source that never has anything; used for offline runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHints;

impl LinkHints for NoHints {
    fn pdf_links(&self, _doi: &str) -> Result<Vec<String>, StrategyError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: Work,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(default)]
    link: Vec<WorkLink>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkLink {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "content-type", default)]
    pub content_type: Option<String>,
    #[serde(rename = "intended-application", default)]
    pub intended_application: Option<String>,
}

/// CrossRef REST client
pub struct CrossrefClient {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefClient {
    /// `mailto` puts requests in CrossRef's polite pool
    pub fn new(mailto: Option<&str>, timeout: Duration) -> Result<Self, StrategyError> {
        Self::with_base_url(CROSSREF_API, mailto, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        mailto: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StrategyError> {
        let user_agent = match mailto {
            Some(email) if !email.is_empty() => {
                format!("articlelink/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email)
            }
            _ => format!("articlelink/{}", env!("CARGO_PKG_VERSION")),
        };
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.is_empty()).map(str::to_string),
        })
    }
}

impl LinkHints for CrossrefClient {
    fn pdf_links(&self, doi: &str) -> Result<Vec<String>, StrategyError> {
        let mut url = format!("{}/works/{}", self.base_url, doi);
        if let Some(email) = &self.mailto {
            url.push_str(&format!("?mailto={}", urlencoding::encode(email)));
        }
        let response = self.client.get(&url).send()?;

        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StrategyError::Unexpected(format!(
                "CrossRef returned status {} for {}",
                response.status(),
                doi
            )));
        }

        let works: WorksResponse = response.json()?;
        Ok(pdf_links_from(&works.message.link))
    }
}

/// PDF links first, then links of unspecified type; text-mining-only
/// duplicates are kept since they are often the only direct link
pub fn pdf_links_from(links: &[WorkLink]) -> Vec<String> {
    let is_pdf = |l: &&WorkLink| {
        l.content_type
            .as_deref()
            .map(|ct| ct.contains("pdf"))
            .unwrap_or(false)
    };
    let is_unspecified = |l: &&WorkLink| {
        l.content_type.as_deref().map(|ct| ct == "unspecified").unwrap_or(true)
    };

    let mut urls: Vec<String> = links.iter().filter(is_pdf).map(|l| l.url.clone()).collect();
    for link in links.iter().filter(is_unspecified) {
        if !urls.contains(&link.url) {
            urls.push(link.url.clone());
        }
    }
    urls
}
