use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;

mod commands;

#[derive(Parser)]
#[command(name = "sqc")]
#[command(about = "Sequence cursor CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Store one document and advance its queue's cursor (Postgres).
    Put {
        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Document JSON string
        #[arg(long, conflicts_with = "doc_file")]
        doc: Option<String>,

        /// Path to a document JSON file
        #[arg(long = "doc-file", conflicts_with = "doc")]
        doc_file: Option<String>,
    },

    /// Print the stored cursor of a queue (Postgres).
    Cursor {
        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[arg(long)]
        queue: String,
    },

    /// Re-run the scan from the stored cursor of a queue (Postgres).
    CatchUp {
        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[arg(long)]
        queue: String,
    },

    /// Replay arrivals through the oracle and an in-memory coordinator.
    Simulate {
        /// Comma-separated arrival order, e.g. 2,5,1,0
        #[arg(long, value_delimiter = ',', required = true)]
        arrivals: Vec<i64>,

        #[arg(long = "batch-size", default_value_t = 10)]
        batch_size: u32,

        /// Put every arrival at once instead of one after another
        #[arg(long, default_value_t = false)]
        concurrent: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status {
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Create the items and cursor tables if missing.
    Provision {
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status { config_paths } => {
                let cfg = commands::load_config(&config_paths)?;
                let pool = sqc_db::connect_from_env().await?;
                let s = sqc_db::status(&pool, &cfg.tables).await?;
                println!(
                    "db_ok={} has_items_table={} has_cursor_table={}",
                    s.ok, s.has_items_table, s.has_cursor_table
                );
            }
            DbCmd::Provision { config_paths } => {
                let cfg = commands::load_config(&config_paths)?;
                let pool = sqc_db::connect_from_env().await?;
                sqc_db::provision(&pool, &cfg.tables).await?;
                println!(
                    "provisioned=true items_table={} cursor_table={}",
                    cfg.tables.items, cfg.tables.cursor
                );
            }
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = sqc_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Put {
            config_paths,
            doc,
            doc_file,
        } => {
            let doc = load_doc(doc, doc_file)?;
            let autopilot = commands::pg_autopilot(&config_paths).await?;
            let outcome = autopilot.put_document(doc).await?;
            commands::print_put_outcome(&outcome);
        }

        Commands::Cursor {
            config_paths,
            queue,
        } => {
            let autopilot = commands::pg_autopilot(&config_paths).await?;
            println!("queue={} cursor={}", queue, autopilot.cursor(&queue).await);
        }

        Commands::CatchUp {
            config_paths,
            queue,
        } => {
            let autopilot = commands::pg_autopilot(&config_paths).await?;
            match autopilot.catch_up(&queue).await? {
                Some(change) => println!(
                    "advanced=true queue={} old={} new={}",
                    change.queue, change.old, change.new
                ),
                None => println!(
                    "advanced=false queue={} cursor={}",
                    queue,
                    autopilot.cursor(&queue).await
                ),
            }
        }

        Commands::Simulate {
            arrivals,
            batch_size,
            concurrent,
        } => {
            commands::simulate::run(&arrivals, batch_size, concurrent).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the key=value report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_doc(doc: Option<String>, doc_file: Option<String>) -> Result<Value> {
    match (doc, doc_file) {
        (Some(s), None) => serde_json::from_str(&s).context("parse --doc json"),
        (None, Some(path)) => {
            let s = fs::read_to_string(&path).with_context(|| format!("read doc file: {path}"))?;
            serde_json::from_str(&s).with_context(|| format!("parse doc file json: {path}"))
        }
        (None, None) => anyhow::bail!("one of --doc or --doc-file is required"),
        (Some(_), Some(_)) => anyhow::bail!("--doc and --doc-file are mutually exclusive"),
    }
}
