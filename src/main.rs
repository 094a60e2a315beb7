// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

use panpost::config::{self, PanpostConfig};
use panpost::prompt;
use panpost::publish::mysql::MysqlBackend;
use panpost::publish::{SchemaStatus, WordPressStore};
use panpost::storage::baidu::BaiduPanClient;
use panpost::watcher::Watcher;

#[derive(Parser)]
#[command(
    name = "panpost",
    about = "Publish new Baidu Pan documents as WordPress posts"
)]
struct Cli {
    /// Config file (default: panpost.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask for credentials and connection parameters and write the config file
    Init,
    /// Watch the folder and publish new documents until stopped
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Create the WordPress posts table if it is missing
    Bootstrap,
    /// Show the documents in the watched folder without touching them
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let dir = panpost::work_dir()?;
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| config::config_path(&dir));

    match cli.command {
        Commands::Init => cmd_init(&config_file),
        Commands::Run { once } => cmd_run(&dir, &config_file, once),
        Commands::Bootstrap => cmd_bootstrap(&config_file),
        Commands::List => cmd_list(&dir, &config_file),
    }
}

/// Load the config file, or collect the required values interactively
/// when there is none. The flag tells whether the config came from the file.
fn resolve_config(config_file: &Path) -> Result<(PanpostConfig, bool)> {
    if let Some(config) = config::load_config(config_file)? {
        return Ok((config, true));
    }
    eprintln!(
        "No config at {}. Enter the settings for this run:",
        config_file.display()
    );
    let stdin = std::io::stdin();
    let config = prompt::prompt_config(&mut stdin.lock(), &mut std::io::stderr())?;
    Ok((config, false))
}

/// Build the storage client. Refreshed tokens are written back to
/// `token_file` when there is one.
fn connect_storage(config: &PanpostConfig, token_file: Option<&Path>) -> Result<BaiduPanClient> {
    let mut storage = BaiduPanClient::new(config.baidu.clone());
    if let Some(path) = token_file {
        storage = storage.persist_tokens_to(path.to_path_buf());
    }
    if config.baidu.access_token.is_empty() {
        storage
            .refresh_access_token()
            .context("Failed to obtain a Baidu Pan access token")?;
    }
    Ok(storage)
}

fn connect_store(config: &PanpostConfig) -> Result<WordPressStore<MysqlBackend>> {
    let backend = MysqlBackend::connect(&config.wordpress).with_context(|| {
        format!(
            "Failed to connect to MySQL at {}:{}",
            config.wordpress.host, config.wordpress.port
        )
    })?;
    Ok(WordPressStore::new(backend, &config.wordpress)?)
}

fn cmd_init(config_file: &Path) -> Result<()> {
    if config_file.exists() {
        println!("{} already exists, not overwriting.", config_file.display());
        return Ok(());
    }

    let stdin = std::io::stdin();
    let config = prompt::prompt_config(&mut stdin.lock(), &mut std::io::stdout())?;
    config::save_config(config_file, &config)?;
    println!();
    println!("Wrote {}", config_file.display());
    Ok(())
}

fn cmd_run(dir: &Path, config_file: &Path, once: bool) -> Result<()> {
    let (config, from_file) = resolve_config(config_file)?;
    panpost::log::init(config.log_file.as_deref())?;

    let storage = connect_storage(&config, from_file.then_some(config_file))?;
    let mut store = connect_store(&config)?;

    // A failed check is not fatal; publishing will report its own errors.
    if let Err(e) = store.ensure_schema() {
        error!("Database check failed: {e}");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("Failed to register SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("Failed to register SIGINT handler")?;

    let settings = config.poll_settings(dir);
    std::fs::create_dir_all(&settings.download_dir).with_context(|| {
        format!("Failed to create {}", settings.download_dir.display())
    })?;

    info!(
        "Watching {} every {}s (PID {})",
        settings.folder,
        settings.poll_interval.as_secs(),
        std::process::id()
    );
    let watcher = Watcher::new(settings);
    let max_cycles = once.then_some(1);
    let cycles = watcher.run(&storage, &mut store, &shutdown, max_cycles);

    store.close();
    info!("Stopped after {cycles} cycle(s)");
    Ok(())
}

fn cmd_bootstrap(config_file: &Path) -> Result<()> {
    let (config, _) = resolve_config(config_file)?;
    panpost::log::init(config.log_file.as_deref())?;

    let mut store = connect_store(&config)?;
    let status = store.ensure_schema()?;
    match status {
        SchemaStatus::Existing => println!("Table {} already exists.", store.table()),
        SchemaStatus::Created => println!("Created table {}.", store.table()),
    }
    store.close();
    Ok(())
}

fn cmd_list(dir: &Path, config_file: &Path) -> Result<()> {
    let (config, from_file) = resolve_config(config_file)?;
    panpost::log::init(config.log_file.as_deref())?;

    let storage = connect_storage(&config, from_file.then_some(config_file))?;
    let watcher = Watcher::new(config.poll_settings(dir));
    let now = chrono::Utc::now().timestamp();
    let (listed, fresh, stale) = watcher
        .scan(&storage, now)
        .with_context(|| format!("Failed to list {}", config.watch_folder))?;

    println!(
        "{listed} entries, {} documents ({} new, {} stale)",
        fresh.len() + stale.len(),
        fresh.len(),
        stale.len()
    );
    for file in &fresh {
        println!("  new    {:>6}s  {}", file.age(now), file.path);
    }
    for file in &stale {
        println!("  stale  {:>6}s  {}", file.age(now), file.path);
    }
    Ok(())
}
