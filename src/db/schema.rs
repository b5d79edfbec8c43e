use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::Mutex;

use super::models::{ConfigShape, FormatParams, JournalEntry, PublisherProfile, RegistryStats};
use super::seed::{bundled_config, PublisherConfig};
use crate::error::RegistryError;

type Result<T> = std::result::Result<T, RegistryError>;

/// Journal -> publisher profile store
pub struct Registry {
    conn: Mutex<Connection>,
    path: String,
}

/// Lookup key for journal names and aliases: trimmed, whitespace collapsed,
/// trailing period dropped, lowercased
pub fn journal_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

impl Registry {
    /// Open (or create) a registry file, seeding it from bundled data if empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let registry = Self::open_unseeded(path)?;
        registry.seed_if_empty(bundled_config);
        Ok(registry)
    }

    /// Open without the first-use seeding step (administrative rebuilds)
    pub fn open_unseeded<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        let registry = Registry { conn: Mutex::new(conn), path: path_str };
        registry.init()?;
        Ok(registry)
    }

    pub fn in_memory() -> Result<Self> {
        let registry = Self::in_memory_unseeded()?;
        registry.seed_if_empty(bundled_config);
        Ok(registry)
    }

    pub fn in_memory_unseeded() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let registry = Registry { conn: Mutex::new(conn), path: ":memory:".to_string() };
        registry.init()?;
        Ok(registry)
    }

    pub fn get_path(&self) -> String {
        self.path.clone()
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // A file that is not a database fails here
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS publishers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                url_template TEXT,
                base_url TEXT,
                structured_config TEXT,
                notes TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS journals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL,
                publisher_id INTEGER NOT NULL REFERENCES publishers(id) ON DELETE CASCADE,
                format_params TEXT,
                aliases TEXT NOT NULL DEFAULT '[]',
                active INTEGER NOT NULL DEFAULT 1
            );

            -- One row per alias so alias lookups stay indexed
            CREATE TABLE IF NOT EXISTS journal_aliases (
                journal_id INTEGER NOT NULL REFERENCES journals(id) ON DELETE CASCADE,
                alias_key TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS registry_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_journals_name_key ON journals(name_key);
            CREATE INDEX IF NOT EXISTS idx_journal_aliases_key ON journal_aliases(alias_key);
            CREATE INDEX IF NOT EXISTS idx_publishers_name ON publishers(name);
            ",
        )?;

        Ok(())
    }

    /// First-use seeding. Skipped when the store already has a profile or is
    /// the canonical snapshot; failures leave the store empty but usable.
    pub fn seed_if_empty<F>(&self, source: F) -> bool
    where
        F: FnOnce() -> Result<Vec<PublisherConfig>>,
    {
        match self.is_canonical() {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(path = %self.path, "cannot read registry metadata: {}", e);
                return false;
            }
        }
        match self.count_publishers() {
            Ok(0) => {}
            Ok(_) => return false,
            Err(e) => {
                tracing::error!(path = %self.path, "cannot count registry profiles: {}", e);
                return false;
            }
        }

        let seeded = source().and_then(|configs| {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let journals = populate(&tx, &configs)?;
            tx.commit()?;
            Ok((configs.len(), journals))
        });

        match seeded {
            Ok((publishers, journals)) => {
                tracing::info!(path = %self.path, publishers, journals, "seeded publisher registry");
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path, "registry seeding failed, continuing with empty registry: {}", e);
                false
            }
        }
    }

    /// Replace every profile and journal with `configs` in one transaction
    pub fn rebuild(&self, configs: &[PublisherConfig], canonical: bool) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM journal_aliases", [])?;
        tx.execute("DELETE FROM journals", [])?;
        tx.execute("DELETE FROM publishers", [])?;
        let journals = populate(&tx, configs)?;
        if canonical {
            tx.execute(
                "INSERT OR REPLACE INTO registry_meta (key, value) VALUES ('snapshot', 'canonical')",
                [],
            )?;
        } else {
            tx.execute("DELETE FROM registry_meta WHERE key = 'snapshot'", [])?;
        }
        tx.commit()?;
        Ok(journals)
    }

    pub fn is_canonical(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM registry_meta WHERE key = 'snapshot'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref() == Some("canonical"))
    }

    pub fn count_publishers(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM publishers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    const PUBLISHER_COLUMNS: &'static str =
        "p.id, p.name, p.strategy_id, p.url_template, p.base_url, p.structured_config, p.active, p.notes";

    const JOURNAL_COLUMNS: &'static str =
        "j.id, j.name, j.publisher_id, j.format_params, j.aliases, j.active";

    /// Active profile for a journal: exact name match first, then aliases
    pub fn lookup_publisher_for_journal(&self, name: &str) -> Result<Option<PublisherProfile>> {
        let Some(journal) = self.lookup_journal(name)? else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                &format!(
                    "SELECT {} FROM publishers p WHERE p.id = ?1 AND p.active = 1",
                    Self::PUBLISHER_COLUMNS
                ),
                params![journal.publisher_ref],
                Self::row_to_publisher,
            )
            .optional()?;
        Ok(profile)
    }

    /// Active journal entry owned by an active publisher, same precedence
    pub fn lookup_journal(&self, name: &str) -> Result<Option<JournalEntry>> {
        let key = journal_key(name);
        if key.is_empty() {
            return Ok(None);
        }
        let conn = self.conn.lock().unwrap();

        let exact = conn
            .query_row(
                &format!(
                    "SELECT {} FROM journals j JOIN publishers p ON p.id = j.publisher_id
                     WHERE j.name_key = ?1 AND j.active = 1 AND p.active = 1
                     ORDER BY j.id LIMIT 1",
                    Self::JOURNAL_COLUMNS
                ),
                params![key],
                Self::row_to_journal,
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        let alias = conn
            .query_row(
                &format!(
                    "SELECT {} FROM journal_aliases a
                     JOIN journals j ON j.id = a.journal_id
                     JOIN publishers p ON p.id = j.publisher_id
                     WHERE a.alias_key = ?1 AND j.active = 1 AND p.active = 1
                     ORDER BY j.id LIMIT 1",
                    Self::JOURNAL_COLUMNS
                ),
                params![key],
                Self::row_to_journal,
            )
            .optional()?;
        Ok(alias)
    }

    /// Active profile by publisher display name
    pub fn lookup_publisher_profile(&self, publisher_name: &str) -> Result<Option<PublisherProfile>> {
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                &format!(
                    "SELECT {} FROM publishers p WHERE p.name = ?1 AND p.active = 1
                     ORDER BY p.id LIMIT 1",
                    Self::PUBLISHER_COLUMNS
                ),
                params![publisher_name],
                Self::row_to_publisher,
            )
            .optional()?;
        Ok(profile)
    }

    /// Per-journal template parameters: the journal row's own values, merged
    /// over any values its profile carries for that journal name
    pub fn lookup_journal_params(&self, name: &str) -> Result<Option<FormatParams>> {
        let Some(journal) = self.lookup_journal(name)? else {
            return Ok(None);
        };
        let profile = self.lookup_publisher_for_journal(name)?;

        let mut merged = FormatParams::new();
        if let Some(profile_params) = profile.as_ref().and_then(|p| p.journal_params(&journal.name)) {
            merged.extend(profile_params.clone());
        }
        if let Some(own) = journal.format_params {
            merged.extend(own);
        }

        Ok(if merged.is_empty() { None } else { Some(merged) })
    }

    pub fn list_all_journal_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM journals ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Every profile, inactive ones included
    pub fn list_publishers(&self) -> Result<Vec<PublisherProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM publishers p ORDER BY p.name",
            Self::PUBLISHER_COLUMNS
        ))?;
        let profiles = stmt
            .query_map([], Self::row_to_publisher)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(profiles)
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        let canonical_snapshot = self.is_canonical()?;
        let publishers = self.list_publishers()?;

        let conn = self.conn.lock().unwrap();
        let journals: i64 = conn.query_row("SELECT COUNT(*) FROM journals", [], |row| row.get(0))?;
        let aliases: i64 = conn.query_row("SELECT COUNT(*) FROM journal_aliases", [], |row| row.get(0))?;

        let mut stats = RegistryStats {
            publishers: publishers.len(),
            active_publishers: publishers.iter().filter(|p| p.active).count(),
            journals: journals as usize,
            aliases: aliases as usize,
            canonical_snapshot,
            ..Default::default()
        };
        for profile in &publishers {
            *stats.by_strategy.entry(profile.strategy_id.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Insert a single profile; returns its id
    pub fn insert_publisher(&self, profile: &PublisherProfile) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO publishers (name, strategy_id, url_template, base_url, structured_config, notes, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                profile.name,
                profile.strategy_id,
                profile.url_template,
                profile.base_url,
                serde_json::to_string(&profile.structured_config)?,
                profile.notes,
                profile.active,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a journal pointing at `publisher_id`; returns its id
    pub fn insert_journal(
        &self,
        publisher_id: i64,
        name: &str,
        aliases: &[String],
        format_params: Option<&FormatParams>,
        active: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        insert_journal_row(&conn, publisher_id, name, aliases, format_params, active)
    }

    fn row_to_publisher(row: &Row) -> rusqlite::Result<PublisherProfile> {
        let raw_config: Option<String> = row.get(5)?;
        let structured_config = match raw_config.as_deref() {
            Some(text) if !text.is_empty() => serde_json::from_str::<Vec<ConfigShape>>(text)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
            _ => Vec::new(),
        };
        Ok(PublisherProfile {
            id: row.get(0)?,
            name: row.get(1)?,
            strategy_id: row.get(2)?,
            url_template: row.get(3)?,
            base_url: row.get(4)?,
            structured_config,
            active: row.get(6)?,
            notes: row.get(7)?,
        })
    }

    fn row_to_journal(row: &Row) -> rusqlite::Result<JournalEntry> {
        let raw_params: Option<String> = row.get(3)?;
        let format_params = match raw_params.as_deref() {
            Some(text) if !text.is_empty() => Some(
                serde_json::from_str::<FormatParams>(text)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
            ),
            _ => None,
        };
        let raw_aliases: String = row.get(4)?;
        let aliases = serde_json::from_str::<Vec<String>>(&raw_aliases)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(JournalEntry {
            id: row.get(0)?,
            name: row.get(1)?,
            publisher_ref: row.get(2)?,
            format_params,
            aliases,
            active: row.get(5)?,
        })
    }
}

fn insert_journal_row(
    conn: &Connection,
    publisher_id: i64,
    name: &str,
    aliases: &[String],
    format_params: Option<&FormatParams>,
    active: bool,
) -> Result<i64> {
    let params_json = match format_params {
        Some(p) if !p.is_empty() => Some(serde_json::to_string(p)?),
        _ => None,
    };
    conn.execute(
        "INSERT INTO journals (name, name_key, publisher_id, format_params, aliases, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name.trim(),
            journal_key(name),
            publisher_id,
            params_json,
            serde_json::to_string(aliases)?,
            active,
        ],
    )?;
    let journal_id = conn.last_insert_rowid();
    for alias in aliases {
        let key = journal_key(alias);
        if key.is_empty() {
            continue;
        }
        conn.execute(
            "INSERT INTO journal_aliases (journal_id, alias_key) VALUES (?1, ?2)",
            params![journal_id, key],
        )?;
    }
    Ok(journal_id)
}

/// Write configs into an open transaction; returns the number of journals
fn populate(tx: &Transaction, configs: &[PublisherConfig]) -> Result<usize> {
    let mut journals = 0;
    for publisher in configs {
        tx.execute(
            "INSERT INTO publishers (name, strategy_id, url_template, base_url, structured_config, notes, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                publisher.name,
                publisher.strategy,
                publisher.url_template,
                publisher.base_url,
                serde_json::to_string(&publisher.shapes())?,
                publisher.notes,
                publisher.active,
            ],
        )?;
        let publisher_id = tx.last_insert_rowid();

        for journal in &publisher.journals {
            insert_journal_row(
                tx,
                publisher_id,
                journal.name(),
                journal.aliases(),
                journal.params(),
                journal.is_active(),
            )?;
            journals += 1;
        }
    }
    Ok(journals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::parse_config;

    fn profile(name: &str, strategy: &str) -> PublisherProfile {
        PublisherProfile {
            id: 0,
            name: name.to_string(),
            strategy_id: strategy.to_string(),
            url_template: Some("https://example.org/{doi}".to_string()),
            base_url: None,
            structured_config: Vec::new(),
            active: true,
            notes: None,
        }
    }

    #[test]
    fn test_open_seeds_empty_store() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.count_publishers().unwrap() > 0);
        let profile = registry.lookup_publisher_for_journal("Brain").unwrap().unwrap();
        assert_eq!(profile.strategy_id, "the_vip_shake");
    }

    #[test]
    fn test_seed_skipped_when_store_has_profiles() {
        let registry = Registry::in_memory_unseeded().unwrap();
        registry.insert_publisher(&profile("Only", "the_doi_slide")).unwrap();
        assert!(!registry.seed_if_empty(bundled_config));
        assert_eq!(registry.count_publishers().unwrap(), 1);
    }

    #[test]
    fn test_seed_skipped_for_canonical_snapshot() {
        let registry = Registry::in_memory_unseeded().unwrap();
        registry.rebuild(&[], true).unwrap();
        assert!(registry.is_canonical().unwrap());
        assert!(!registry.seed_if_empty(bundled_config));
        assert_eq!(registry.count_publishers().unwrap(), 0);
    }

    #[test]
    fn test_seed_failure_leaves_usable_empty_store() {
        let registry = Registry::in_memory_unseeded().unwrap();
        let seeded = registry.seed_if_empty(|| Err(RegistryError::Validation {
            message: "broken bundle".to_string(),
        }));
        assert!(!seeded);
        assert_eq!(registry.lookup_publisher_for_journal("Brain").unwrap(), None);
    }

    #[test]
    fn test_seeding_is_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let first = Registry::open(&path).unwrap().count_publishers().unwrap();
        let second = Registry::open(&path).unwrap().count_publishers().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        assert!(Registry::open(&path).is_err());
    }

    #[test]
    fn test_exact_match_beats_alias() {
        let registry = Registry::in_memory_unseeded().unwrap();
        let a = registry.insert_publisher(&profile("Direct Press", "the_doi_slide")).unwrap();
        let b = registry.insert_publisher(&profile("Alias Press", "the_pii_polka")).unwrap();
        // Alias row inserted first so id order cannot explain the result
        registry
            .insert_journal(b, "Gene Reports", &["Gene".to_string()], None, true)
            .unwrap();
        registry.insert_journal(a, "Gene", &[], None, true).unwrap();

        let found = registry.lookup_publisher_for_journal("Gene").unwrap().unwrap();
        assert_eq!(found.name, "Direct Press");

        let via_alias = registry.lookup_publisher_for_journal("gene reports").unwrap().unwrap();
        assert_eq!(via_alias.name, "Alias Press");
    }

    #[test]
    fn test_alias_lookup_and_normalization() {
        let registry = Registry::in_memory().unwrap();
        let profile = registry
            .lookup_publisher_for_journal("  cerebral   cortex. ")
            .unwrap()
            .unwrap();
        assert_eq!(profile.name, "Oxford Academic (HighWire)");
    }

    #[test]
    fn test_inactive_entries_are_invisible() {
        let registry = Registry::in_memory_unseeded().unwrap();
        let mut off = profile("Retired Press", "the_doi_slide");
        off.active = false;
        let off_id = registry.insert_publisher(&off).unwrap();
        registry.insert_journal(off_id, "Old J", &[], None, true).unwrap();

        let on_id = registry.insert_publisher(&profile("Live Press", "the_doi_slide")).unwrap();
        registry.insert_journal(on_id, "Dormant J", &[], None, false).unwrap();

        assert_eq!(registry.lookup_publisher_for_journal("Old J").unwrap(), None);
        assert_eq!(registry.lookup_publisher_for_journal("Dormant J").unwrap(), None);
        assert_eq!(registry.lookup_publisher_profile("Retired Press").unwrap(), None);
        assert!(registry.lookup_publisher_profile("Live Press").unwrap().is_some());
        assert_eq!(registry.list_publishers().unwrap().len(), 2);
    }

    #[test]
    fn test_lookup_journal_params() {
        let registry = Registry::in_memory().unwrap();
        let params = registry.lookup_journal_params("Brain").unwrap().unwrap();
        assert_eq!(params.get("host").map(String::as_str), Some("brain.oxfordjournals.org"));
        assert_eq!(registry.lookup_journal_params("Hum Genet").unwrap(), None);
        assert_eq!(registry.lookup_journal_params("Unknown J").unwrap(), None);
    }

    #[test]
    fn test_profile_level_journal_params_merge() {
        let registry = Registry::in_memory_unseeded().unwrap();
        let configs = parse_config(
            r#"
            [[publisher]]
            name = "Merged"
            strategy = "the_vip_shake"
            url_template = "http://{host}/{volume}/{issue}/{firstPage}"
            journal_params = { "J Merge" = { host = "profile.example.org", prefix = "jm" } }
            journals = [{ name = "J Merge", host = "journal.example.org" }]
            "#,
        )
        .unwrap();
        registry.rebuild(&configs, false).unwrap();

        let params = registry.lookup_journal_params("J Merge").unwrap().unwrap();
        assert_eq!(params.get("host").map(String::as_str), Some("journal.example.org"));
        assert_eq!(params.get("prefix").map(String::as_str), Some("jm"));
    }

    #[test]
    fn test_rebuild_replaces_contents_and_clears_canonical() {
        let registry = Registry::in_memory().unwrap();
        let configs = parse_config(
            r#"
            [[publisher]]
            name = "Solo"
            strategy = "the_doi_slide"
            url_template = "https://solo.example.org/{doi}"
            journals = ["Solo J"]
            "#,
        )
        .unwrap();

        assert_eq!(registry.rebuild(&configs, true).unwrap(), 1);
        assert!(registry.is_canonical().unwrap());
        assert_eq!(registry.list_all_journal_names().unwrap(), vec!["Solo J".to_string()]);
        assert_eq!(registry.lookup_publisher_for_journal("Brain").unwrap(), None);

        registry.rebuild(&configs, false).unwrap();
        assert!(!registry.is_canonical().unwrap());
    }

    #[test]
    fn test_stats() {
        let registry = Registry::in_memory().unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats.publishers, bundled_config().unwrap().len());
        assert!(stats.aliases > 0);
        assert!(stats.by_strategy.contains_key("the_doi_slide"));
        assert!(!stats.canonical_snapshot);
    }
}
