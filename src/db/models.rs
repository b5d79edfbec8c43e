use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-journal template parameters, e.g. `{"host": "brain.oxfordjournals.org"}`
pub type FormatParams = BTreeMap<String, String>;

/// Known shapes of the auxiliary profile configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigShape {
    /// Overrides the profile's `url_template` column
    Primary { template: String },
    /// Tried in order after the primary template when verifying
    Secondary { templates: Vec<String> },
    /// Old URL layouts, tried last
    Legacy { templates: Vec<String> },
    /// Per-journal parameter overrides keyed by journal name
    JournalParams { params: BTreeMap<String, FormatParams> },
    /// Publisher rejects automated verification
    Blocked { note: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherProfile {
    pub id: i64,
    pub name: String,
    #[serde(rename = "strategyId")]
    pub strategy_id: String,
    #[serde(rename = "urlTemplate")]
    pub url_template: Option<String>,
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "structuredConfig")]
    pub structured_config: Vec<ConfigShape>,
    pub active: bool,
    pub notes: Option<String>,
}

impl PublisherProfile {
    /// Template to use first: an explicit `Primary` shape wins over the column
    pub fn primary_template(&self) -> Option<&str> {
        self.structured_config
            .iter()
            .find_map(|shape| match shape {
                ConfigShape::Primary { template } => Some(template.as_str()),
                _ => None,
            })
            .or(self.url_template.as_deref())
    }

    pub fn secondary_templates(&self) -> Vec<&str> {
        self.structured_config
            .iter()
            .filter_map(|shape| match shape {
                ConfigShape::Secondary { templates } => Some(templates),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn legacy_templates(&self) -> Vec<&str> {
        self.structured_config
            .iter()
            .filter_map(|shape| match shape {
                ConfigShape::Legacy { templates } => Some(templates),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn is_blocked(&self) -> bool {
        self.structured_config
            .iter()
            .any(|shape| matches!(shape, ConfigShape::Blocked { .. }))
    }

    /// Parameters carried in the profile for one journal
    pub fn journal_params(&self, journal: &str) -> Option<&FormatParams> {
        self.structured_config.iter().find_map(|shape| match shape {
            ConfigShape::JournalParams { params } => params.get(journal),
            _ => None,
        })
    }

    /// Host portion of `base_url`, used when no journal supplies `{host}`
    pub fn base_host(&self) -> Option<String> {
        let base = self.base_url.as_deref()?;
        url::Url::parse(base)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: i64,
    pub name: String,
    #[serde(rename = "publisherRef")]
    pub publisher_ref: i64,
    #[serde(rename = "formatParams")]
    pub format_params: Option<FormatParams>,
    pub aliases: Vec<String>,
    pub active: bool,
}

/// Counts reported by `articlelink-cli stats`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub publishers: usize,
    pub active_publishers: usize,
    pub journals: usize,
    pub aliases: usize,
    pub by_strategy: BTreeMap<String, usize>,
    pub canonical_snapshot: bool,
}
