use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use tracing::info;

use codex_index::db::Database;
use codex_index::indexer::Indexer;
use codex_index::mcp::CodexServer;
use codex_index::query::QueryEngine;
use codex_index::{daemon, discover_root, index_db_path, setup, watcher};

#[derive(Parser)]
#[command(
    name = "codex-index",
    about = "Local code intelligence: index, rank and query a source tree",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the project, register the MCP server, and write docs
    Init {
        path: Option<PathBuf>,
        #[arg(long)]
        verbose: bool,
    },
    /// Full re-index; prints stats as JSON
    Reindex {
        path: Option<PathBuf>,
        #[arg(long)]
        verbose: bool,
    },
    /// Re-index a single file by root-relative path
    ReindexFile { path: String },
    /// Ranked full-text symbol search
    Search {
        query: String,
        #[arg(long, default_value_t = 15)]
        limit: i64,
    },
    /// Symbols that call or reference a symbol
    Callers { symbol: String },
    /// Full context for one symbol
    Context { symbol: String },
    /// Files affected, directly or transitively, by editing a file
    Impact { file: String },
    /// Symbols a symbol depends on
    Deps { symbol: String },
    /// Top symbols by PageRank
    Rank {
        #[arg(long, default_value_t = 20)]
        top: i64,
    },
    /// Module partitions with sizes and cross-module dependencies
    Modules,
    /// Index statistics
    Stats,
    /// Human-readable project summary
    Brief,
    /// Pre-edit briefing for a file (hook)
    PreEdit { file: String },
    /// Silent single-file re-index (hook)
    PostEdit { file: String },
    /// Regenerate the CLAUDE.md index section
    GenerateDocs,
    /// Manage the external watcher process
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Long-lived MCP server over stdio
    Mcp,
    /// Remove configuration from the project root
    Uninstall,
    /// Watch loop run by `daemon start` (internal)
    #[command(hide = true)]
    Watch { path: PathBuf },
}

#[derive(Subcommand)]
enum DaemonAction {
    Start,
    Stop,
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { path, verbose } => {
            setup_logging(verbose);
            let root = resolve_path(path)?;
            let db = Database::open(&root)?;
            let stats = Indexer::new(&db).index_project(&root)?;
            setup::install(&root)?;
            setup::write_docs(&root, &QueryEngine::new(&db).brief()?)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Reindex { path, verbose } => {
            setup_logging(verbose);
            let root = match path {
                Some(p) => p.canonicalize().context("invalid path")?,
                None => discover_root(),
            };
            let db = Database::open(&root)?;
            let stats = Indexer::new(&db).index_project(&root)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::ReindexFile { path } => {
            setup_logging(false);
            let root = discover_root();
            let db = open_existing(&root)?;
            let changed = Indexer::new(&db).reindex_file(&root, &path)?;
            println!("{}", serde_json::json!({ "path": path, "changed": changed }));
        }
        Command::Search { query, limit } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let hits = QueryEngine::new(&db).search(&query, limit)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Callers { symbol } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let callers = QueryEngine::new(&db).callers(&symbol)?;
            println!("{}", serde_json::to_string_pretty(&callers)?);
        }
        Command::Context { symbol } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let view = QueryEngine::new(&db).context(&symbol)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Impact { file } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let entries = QueryEngine::new(&db).impact(&file, 10)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Deps { symbol } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let deps = QueryEngine::new(&db).dependencies(&symbol)?;
            println!("{}", serde_json::to_string_pretty(&deps)?);
        }
        Command::Rank { top } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let ranked = QueryEngine::new(&db).rank(top)?;
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Command::Modules => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let modules = QueryEngine::new(&db).modules()?;
            println!("{}", serde_json::to_string_pretty(&modules)?);
        }
        Command::Stats => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            let stats = QueryEngine::new(&db).stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Brief => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            print!("{}", QueryEngine::new(&db).brief()?);
        }
        Command::PreEdit { file } => {
            setup_logging(false);
            let db = open_existing(&discover_root())?;
            print!("{}", QueryEngine::new(&db).pre_edit(&file)?);
        }
        Command::PostEdit { file } => {
            setup_logging(false);
            let root = discover_root();
            let db = open_existing(&root)?;
            Indexer::new(&db).reindex_file(&root, &file)?;
        }
        Command::GenerateDocs => {
            setup_logging(false);
            let root = discover_root();
            let db = open_existing(&root)?;
            setup::write_docs(&root, &QueryEngine::new(&db).brief()?)?;
        }
        Command::Daemon { action } => {
            setup_logging(false);
            let root = discover_root();
            match action {
                DaemonAction::Start => {
                    let pid = daemon::start(&root)?;
                    println!("daemon started (pid {pid})");
                }
                DaemonAction::Stop => match daemon::stop(&root)? {
                    Some(pid) => println!("daemon stopped (pid {pid})"),
                    None => println!("daemon not running"),
                },
                DaemonAction::Status => match daemon::status(&root) {
                    Some(pid) => println!("daemon running (pid {pid})"),
                    None => println!("daemon not running"),
                },
            }
        }
        Command::Mcp => {
            setup_logging(true);
            run_mcp(discover_root())?;
        }
        Command::Uninstall => {
            setup_logging(false);
            setup::uninstall(&discover_root())?;
            println!("configuration removed");
        }
        Command::Watch { path } => {
            setup_logging(true);
            let root = path.canonicalize().context("invalid path")?;
            let db = Database::open(&root)?;
            watcher::watch_loop(&root, Arc::new(Mutex::new(db)))?;
        }
    }
    Ok(())
}

fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    path.canonicalize().context("invalid path")
}

/// Open the store only if an index already exists under this root.
fn open_existing(root: &Path) -> Result<Database> {
    if !index_db_path(root).exists() {
        anyhow::bail!(
            "no index found under {}; run `codex-index init` first",
            root.display()
        );
    }
    Database::open(root)
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "codex_index=info"
    } else {
        "codex_index=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Serve MCP over stdio with the in-process watcher alongside. The store is
/// checkpointed on shutdown so the WAL is flushed before the handle drops.
#[tokio::main]
async fn run_mcp(root: PathBuf) -> Result<()> {
    let db = Arc::new(Mutex::new(Database::open(&root)?));
    info!(root = %root.display(), "starting MCP server");

    {
        let db = Arc::clone(&db);
        let watch_root = root.clone();
        std::thread::Builder::new()
            .name("codex-watcher".into())
            .spawn(move || {
                if let Err(err) = watcher::watch_loop(&watch_root, db) {
                    tracing::error!(error = %err, "watcher stopped");
                }
            })
            .context("failed to spawn watcher thread")?;
    }

    let server = CodexServer::new(Arc::clone(&db), root);
    let running = server.serve(rmcp::transport::stdio()).await?;
    running.waiting().await?;

    if let Ok(db) = db.lock() {
        let _ = db.checkpoint();
    }
    info!("MCP server stopped");
    Ok(())
}
