//! Declarative publisher configuration
//!
//! One `[[publisher]]` table per publisher. Journals are either bare names
//! or tables carrying aliases and per-journal template parameters:
//!
//! ```toml
//! [[publisher]]
//! name = "Oxford Academic"
//! strategy = "the_vip_shake"
//! url_template = "http://{host}/content/{volume}/{issue}/{firstPage}.full.pdf"
//! journals = [
//!     "Brain",
//!     { name = "Cereb Cortex", aliases = ["Cerebral Cortex"], host = "cercor.oxfordjournals.org" },
//! ]
//! ```

use super::models::{ConfigShape, FormatParams};
use crate::error::RegistryError;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

/// Registry data shipped with the crate
pub const BUNDLED_PUBLISHERS: &str = include_str!("../../data/publishers.toml");

/// Placeholders every template may use
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "doi", "host", "volume", "issue", "firstPage", "pii", "pmid", "pmcid",
];

pub(crate) static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "publisher")]
    publishers: Vec<PublisherConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub name: String,
    pub strategy: String,
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub secondary_templates: Vec<String>,
    #[serde(default)]
    pub legacy_templates: Vec<String>,
    #[serde(default)]
    pub journal_params: BTreeMap<String, FormatParams>,
    #[serde(default)]
    pub journals: Vec<JournalConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JournalConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        aliases: Vec<String>,
        #[serde(default = "default_true")]
        active: bool,
        #[serde(flatten)]
        params: FormatParams,
    },
}

fn default_true() -> bool {
    true
}

impl JournalConfig {
    pub fn name(&self) -> &str {
        match self {
            JournalConfig::Name(name) => name,
            JournalConfig::Detailed { name, .. } => name,
        }
    }

    pub fn aliases(&self) -> &[String] {
        match self {
            JournalConfig::Name(_) => &[],
            JournalConfig::Detailed { aliases, .. } => aliases,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            JournalConfig::Name(_) => true,
            JournalConfig::Detailed { active, .. } => *active,
        }
    }

    pub fn params(&self) -> Option<&FormatParams> {
        match self {
            JournalConfig::Detailed { params, .. } if !params.is_empty() => Some(params),
            _ => None,
        }
    }
}

impl PublisherConfig {
    /// Structured config blob stored alongside the profile row
    pub fn shapes(&self) -> Vec<ConfigShape> {
        let mut shapes = Vec::new();
        if !self.secondary_templates.is_empty() {
            shapes.push(ConfigShape::Secondary {
                templates: self.secondary_templates.clone(),
            });
        }
        if !self.legacy_templates.is_empty() {
            shapes.push(ConfigShape::Legacy {
                templates: self.legacy_templates.clone(),
            });
        }
        if !self.journal_params.is_empty() {
            shapes.push(ConfigShape::JournalParams {
                params: self.journal_params.clone(),
            });
        }
        if self.blocked {
            shapes.push(ConfigShape::Blocked { note: self.notes.clone() });
        }
        shapes
    }

    fn templates(&self) -> impl Iterator<Item = &String> {
        self.url_template
            .iter()
            .chain(self.secondary_templates.iter())
            .chain(self.legacy_templates.iter())
    }
}

/// Parse one TOML document into publisher configs
pub fn parse_config(content: &str) -> Result<Vec<PublisherConfig>, RegistryError> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.publishers)
}

/// Load a config file, or every `*.toml` file in a directory (sorted by name)
pub fn load_config_path(path: &Path) -> Result<Vec<PublisherConfig>, RegistryError> {
    if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "toml").unwrap_or(false))
            .collect();
        files.sort();

        let mut configs = Vec::new();
        for file in files {
            let content = std::fs::read_to_string(&file)?;
            configs.extend(parse_config(&content)?);
        }
        Ok(configs)
    } else {
        let content = std::fs::read_to_string(path)?;
        parse_config(&content)
    }
}

pub fn bundled_config() -> Result<Vec<PublisherConfig>, RegistryError> {
    parse_config(BUNDLED_PUBLISHERS)
}

/// Collect every problem in a set of configs; empty means valid
pub fn validate_configs(configs: &[PublisherConfig], known_strategies: &[&str]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut owners: HashMap<String, &str> = HashMap::new();

    for publisher in configs {
        if publisher.name.trim().is_empty() {
            problems.push("publisher with empty name".to_string());
        }
        if !known_strategies.contains(&publisher.strategy.as_str()) {
            problems.push(format!(
                "{}: unknown strategy '{}'",
                publisher.name, publisher.strategy
            ));
        }

        for journal in &publisher.journals {
            let names = std::iter::once(journal.name()).chain(journal.aliases().iter().map(String::as_str));
            for name in names {
                let key = name.trim().to_lowercase();
                if let Some(previous) = owners.insert(key, &publisher.name) {
                    if previous != publisher.name {
                        problems.push(format!(
                            "{}: journal '{}' already owned by {}",
                            publisher.name, name, previous
                        ));
                    }
                }
            }
        }

        for template in publisher.templates() {
            for caps in PLACEHOLDER_RE.captures_iter(template) {
                let placeholder = &caps[1];
                let supplied_by_journal = publisher
                    .journals
                    .iter()
                    .any(|j| j.params().map(|p| p.contains_key(placeholder)).unwrap_or(false))
                    || publisher.journal_params.values().any(|p| p.contains_key(placeholder));
                if !KNOWN_PLACEHOLDERS.contains(&placeholder) && !supplied_by_journal {
                    problems.push(format!(
                        "{}: template uses unknown placeholder {{{}}}",
                        publisher.name, placeholder
                    ));
                }
            }

            if template.contains("{host}") && publisher.base_url.is_none() {
                for journal in &publisher.journals {
                    let has_host = journal.params().map(|p| p.contains_key("host")).unwrap_or(false)
                        || publisher
                            .journal_params
                            .get(journal.name())
                            .map(|p| p.contains_key("host"))
                            .unwrap_or(false);
                    if !has_host {
                        problems.push(format!(
                            "{}: journal '{}' has no host for template {}",
                            publisher.name,
                            journal.name(),
                            template
                        ));
                    }
                }
            }
        }
    }

    problems
}
