//! articlelink CLI - registry administration and one-off link resolution
//!
//! Usage: articlelink-cli [OPTIONS] <COMMAND>
//!
//! Supports JSON output for scripting. Every command exits 1 on failure.

use articlelink_lib::db::seed::{bundled_config, load_config_path, validate_configs, PublisherConfig};
use articlelink_lib::db::Registry;
use articlelink_lib::engine::Engine;
use articlelink_lib::papers::strategies::StrategyTable;
use articlelink_lib::settings::{default_settings_path, Settings};
use articlelink_lib::{logging, ArticleRecord};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "articlelink-cli")]
#[command(version, about = "Resolve article records to full-text PDF links", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Registry database path (default: shipped snapshot or <cache-dir>/registry.db)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Directory for the writable registry and the resolution cache
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Settings file (default: <config dir>/articlelink/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Output (and log) as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the registry from declarative publisher config
    Rebuild {
        /// TOML file or directory of *.toml files (default: bundled data)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Mark the result as the canonical shipped snapshot
        #[arg(long)]
        canonical: bool,
    },
    /// Registry statistics
    Stats,
    /// Show the profile a journal resolves to
    Lookup {
        journal: String,
    },
    /// List every publisher profile
    Publishers,
    /// Check a publisher config file or directory without touching the registry
    Validate {
        path: PathBuf,
    },
    /// Resolve one article to a link
    Resolve {
        #[arg(long)]
        journal: String,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        pmid: Option<String>,
        #[arg(long)]
        pmcid: Option<String>,
        #[arg(long)]
        pii: Option<String>,
        #[arg(long)]
        volume: Option<String>,
        #[arg(long)]
        issue: Option<String>,
        #[arg(long)]
        first_page: Option<String>,
        #[arg(long)]
        pages: Option<String>,
        /// Fetch candidates and confirm they are PDFs
        #[arg(long, conflicts_with = "offline")]
        verify: bool,
        /// Build links without any network access
        #[arg(long)]
        offline: bool,
        /// Re-resolve cached failures of every class
        #[arg(long)]
        retry_errors: bool,
        /// Skip the resolution cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<(), String> {
    // Handle completions first (no registry needed)
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "articlelink-cli", &mut std::io::stdout());
        return Ok(());
    }

    let settings = load_settings(&cli);
    let registry_path = settings.registry_db_path();
    tracing::debug!(registry = %registry_path.display(), "using registry");

    match cli.command {
        Commands::Rebuild { config, canonical } => {
            // an explicit target is created if it does not exist yet
            let target = settings.registry_path.clone().unwrap_or(registry_path);
            handle_rebuild(&target, config.as_deref(), canonical, cli.json)
        }
        Commands::Stats => handle_stats(&open_registry(&registry_path)?, cli.json),
        Commands::Lookup { journal } => handle_lookup(&open_registry(&registry_path)?, &journal, cli.json),
        Commands::Publishers => handle_publishers(&open_registry(&registry_path)?, cli.json),
        Commands::Validate { path } => handle_validate(&path, cli.json),
        Commands::Resolve {
            journal,
            doi,
            pmid,
            pmcid,
            pii,
            volume,
            issue,
            first_page,
            pages,
            verify,
            offline,
            retry_errors,
            no_cache,
        } => {
            let article = ArticleRecord {
                journal,
                doi,
                pmid,
                pmcid,
                pii,
                volume,
                issue,
                first_page,
                pages,
                release_date: None,
            };
            let mut settings = settings;
            if verify {
                settings.verify = true;
            }
            if offline {
                settings.verify = false;
            }
            if retry_errors {
                settings.retry_errors = true;
            }
            handle_resolve(&settings, &article, no_cache, cli.json)
        }
        Commands::Completions { .. } => unreachable!(),
    }
}

fn load_settings(cli: &Cli) -> Settings {
    let path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = Settings::load_with_env(&path);
    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if let Some(registry) = &cli.registry {
        settings.registry_path = Some(registry.clone());
    }
    settings
}

fn open_registry(path: &Path) -> Result<Registry, String> {
    Registry::open(path).map_err(|e| format!("Failed to open registry {}: {}", path.display(), e))
}

fn load_configs(config: Option<&Path>) -> Result<Vec<PublisherConfig>, String> {
    match config {
        Some(path) => load_config_path(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e)),
        None => bundled_config().map_err(|e| format!("Bundled registry data is invalid: {}", e)),
    }
}

fn check_configs(configs: &[PublisherConfig]) -> Vec<String> {
    let strategies = StrategyTable::standard();
    validate_configs(configs, &strategies.ids())
}

// ============================================================================
// Command Handlers
// ============================================================================

fn handle_rebuild(registry_path: &Path, config: Option<&Path>, canonical: bool, json: bool) -> Result<(), String> {
    let configs = load_configs(config)?;
    let problems = check_configs(&configs);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {}", problem);
        }
        return Err(format!("{} config problem(s), registry left unchanged", problems.len()));
    }

    let registry = Registry::open_unseeded(registry_path)
        .map_err(|e| format!("Failed to open registry {}: {}", registry_path.display(), e))?;
    let journals = registry
        .rebuild(&configs, canonical)
        .map_err(|e| format!("Rebuild failed: {}", e))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "registry": registry.get_path(),
                "publishers": configs.len(),
                "journals": journals,
                "canonical": canonical,
            })
        );
    } else {
        println!(
            "Rebuilt {} with {} publishers, {} journals{}",
            registry.get_path(),
            configs.len(),
            journals,
            if canonical { " (canonical snapshot)" } else { "" }
        );
    }
    Ok(())
}

fn handle_stats(registry: &Registry, json: bool) -> Result<(), String> {
    let stats = registry.stats().map_err(|e| e.to_string())?;
    if json {
        println!("{}", serde_json::to_string(&stats).unwrap_or_default());
        return Ok(());
    }

    println!("Registry: {}", registry.get_path());
    println!("  Publishers: {} ({} active)", stats.publishers, stats.active_publishers);
    println!("  Journals:   {}", stats.journals);
    println!("  Aliases:    {}", stats.aliases);
    println!("  Canonical:  {}", if stats.canonical_snapshot { "yes" } else { "no" });
    if !stats.by_strategy.is_empty() {
        println!("\nBy strategy:");
        for (strategy, count) in &stats.by_strategy {
            println!("  {:24} {}", strategy, count);
        }
    }
    Ok(())
}

fn handle_lookup(registry: &Registry, journal: &str, json: bool) -> Result<(), String> {
    let entry = registry.lookup_journal(journal).map_err(|e| e.to_string())?;
    let profile = registry.lookup_publisher_for_journal(journal).map_err(|e| e.to_string())?;
    let (Some(entry), Some(profile)) = (entry, profile) else {
        return Err(format!("No publisher registered for journal '{}'", journal));
    };
    let params = registry.lookup_journal_params(journal).map_err(|e| e.to_string())?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "journal": entry,
                "publisher": profile,
                "params": params,
            })
        );
        return Ok(());
    }

    println!("{} -> {}", entry.name, profile.name);
    println!("  Strategy: {}", profile.strategy_id);
    if let Some(template) = profile.primary_template() {
        println!("  Template: {}", template);
    }
    for template in profile.secondary_templates() {
        println!("  Fallback: {}", template);
    }
    for template in profile.legacy_templates() {
        println!("  Legacy:   {}", template);
    }
    if profile.is_blocked() {
        println!("  Blocked:  verification skipped");
    }
    if !entry.aliases.is_empty() {
        println!("  Aliases:  {}", entry.aliases.join(", "));
    }
    if let Some(params) = params {
        for (key, value) in params {
            println!("  {{{}}} = {}", key, value);
        }
    }
    Ok(())
}

fn handle_publishers(registry: &Registry, json: bool) -> Result<(), String> {
    let publishers = registry.list_publishers().map_err(|e| e.to_string())?;
    if json {
        println!("{}", serde_json::to_string(&publishers).unwrap_or_default());
        return Ok(());
    }

    for profile in &publishers {
        println!(
            "{:4} {:36} {:22}{}",
            profile.id,
            profile.name,
            profile.strategy_id,
            if profile.active { "" } else { " (inactive)" }
        );
    }
    eprintln!("{} publishers", publishers.len());
    Ok(())
}

fn handle_validate(path: &Path, json: bool) -> Result<(), String> {
    let configs = load_configs(Some(path))?;
    let problems = check_configs(&configs);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "publishers": configs.len(),
                "journals": configs.iter().map(|c| c.journals.len()).sum::<usize>(),
                "problems": problems,
            })
        );
    } else if problems.is_empty() {
        println!(
            "{}: {} publishers OK",
            path.display(),
            configs.len()
        );
    } else {
        for problem in &problems {
            println!("  {}", problem);
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("{} problem(s) found", problems.len()))
    }
}

fn handle_resolve(settings: &Settings, article: &ArticleRecord, no_cache: bool, json: bool) -> Result<(), String> {
    let mut engine = Engine::open(settings, !no_cache).map_err(|e| e.to_string())?;
    let outcome = engine.resolve(article);
    tracing::debug!(stats = ?engine.stats(), "resolution finished");

    if json {
        println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
    } else {
        if let Some(url) = &outcome.url {
            println!("{}", url);
        }
        if let Some(reason) = &outcome.reason {
            eprintln!("{}", reason);
        }
    }

    if outcome.is_found() {
        Ok(())
    } else {
        Err(outcome.reason.unwrap_or_else(|| "no link".to_string()))
    }
}
