use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use graftmonkey::config::Config;
use graftmonkey::database;
use graftmonkey::injector::InjectionEngine;
use graftmonkey::matcher::MatchEngine;
use graftmonkey::sandbox::QuickJsHost;
use graftmonkey::store::{InstallOutcome, ScriptStore};

#[derive(Parser)]
#[command(name = "gmk", about = "Manage and run user scripts", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install a user script from a file
    Install {
        file: PathBuf,
        /// Origin URL recorded for duplicate-install detection
        #[arg(long)]
        source: String,
    },
    /// List installed scripts
    List,
    /// Print one script as JSON
    Show { id: i64 },
    /// Enable a script
    Enable { id: i64 },
    /// Disable a script
    Disable { id: i64 },
    /// Remove a script and its patterns
    Uninstall { id: i64 },
    /// List the enabled scripts matching a URL
    Match { url: String },
    /// Simulate a navigation and run the matching scripts in QuickJS
    Inject { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = database::init_database(&config, config.auto_migrate).await?;
    let store = Arc::new(ScriptStore::new(db.pool().clone()));

    match cli.command {
        Command::Install { file, source } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match store.install(&raw, &source).await? {
                InstallOutcome::Installed(script) => println!(
                    "installed {} '{}' ({} pattern(s))",
                    script.id,
                    script.name,
                    script.patterns.len()
                ),
                InstallOutcome::Rejected => {
                    println!("not a user script: missing ==UserScript== header")
                }
            }
        }
        Command::List => {
            for script in store.get_all().await? {
                println!(
                    "{:>4}  {}  {}  [{}]  {}",
                    script.id,
                    if script.enabled { "enabled " } else { "disabled" },
                    script.name,
                    script.version,
                    script.source_uri
                );
            }
        }
        Command::Show { id } => {
            let script = store.get_by_id(id).await?;
            println!("{}", serde_json::to_string_pretty(&script)?);
        }
        Command::Enable { id } => store.set_enabled(id, true).await?,
        Command::Disable { id } => store.set_enabled(id, false).await?,
        Command::Uninstall { id } => store.uninstall(id).await?,
        Command::Match { url } => {
            let matcher = MatchEngine::new(Arc::clone(&store));
            for script in matcher.scripts_for_navigation(&url).await? {
                println!("{:>4}  {}", script.id, script.name);
            }
        }
        Command::Inject { url } => {
            let engine = InjectionEngine::new(
                MatchEngine::new(Arc::clone(&store)),
                Arc::clone(&store),
            );
            let decision = engine
                .document_created(0, &url, Box::new(QuickJsHost::new()))
                .await;
            println!("{} script(s) match", decision.matched);
            let report = engine.content_ready(0);
            println!("injected {}, failed {}", report.injected, report.failed);
        }
    }

    db.close().await;
    Ok(())
}
