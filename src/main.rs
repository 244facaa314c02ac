//! factmill CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use factmill::{
    commands::{
        cmd_facts, cmd_ingest, cmd_init, cmd_list_documents, cmd_remove_document, cmd_status,
        print_document_completions, print_documents, print_facts_summary, print_ingest_summary,
        print_status_report, wait_for_terminal,
    },
    config::Config,
    error::Result,
    meta::MetaDb,
    pipeline::IngestOptions,
    progress::LogWriterFactory,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "factmill")]
#[command(version, about = "Document ingestion and knowledge-extraction pipeline", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize factmill configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Upload a document and start ingestion
    Ingest {
        /// Path to the file (txt, md, pdf, docx)
        file: PathBuf,

        /// Target knowledge base ID (a default base is used when unset)
        #[arg(short = 'k', long)]
        knowledge_base: Option<String>,

        /// Document title
        #[arg(short, long)]
        title: Option<String>,

        /// Document description
        #[arg(long)]
        description: Option<String>,

        /// Owner user ID
        #[arg(long, default_value = "local")]
        user: String,

        /// Workspace ID (content dedup is scoped per workspace)
        #[arg(long, default_value = "default")]
        workspace: String,

        /// Block until processing finishes instead of returning immediately
        #[arg(long)]
        wait: bool,
    },

    /// Re-run fact extraction on an ingested document
    Facts {
        /// Document ID (use 'factmill documents' to list)
        document_id: String,

        /// Target knowledge base ID
        #[arg(short = 'k', long)]
        knowledge_base: Option<String>,

        /// Block until fact extraction finishes
        #[arg(long)]
        wait: bool,
    },

    /// Show processing status for a document
    Status {
        /// Document ID
        document_id: String,

        /// Keep polling until processing finishes
        #[arg(long)]
        watch: bool,
    },

    /// List uploaded documents
    Documents {
        /// Workspace to list
        #[arg(long, default_value = "default")]
        workspace: String,

        /// Output only document IDs (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,

        /// Output document IDs with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Remove a document and all its derived data
    Remove {
        /// Document ID to remove
        document_id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().and_then(|p| p.parent()).map(PathBuf::from);
        let config = cmd_init(base_dir, force).await?;

        println!("✓ factmill initialized successfully");
        println!("  Config: {}", config.paths.config_file.display());
        println!("\nNext steps:");
        println!("  1. Edit the config to point at your LLM and embedding backend");
        println!("  2. Upload a document: factmill ingest ./notes.pdf --wait");
        println!("  3. Check progress: factmill status <document-id>");
        return Ok(());
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "factmill", &mut std::io::stdout());
        print_completion_extras(shell);
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            file,
            knowledge_base,
            title,
            description,
            user,
            workspace,
            wait,
        } => {
            let options = IngestOptions {
                user_id: user,
                workspace_id: workspace,
                knowledge_base_id: knowledge_base,
                title,
                description,
            };

            let summary = cmd_ingest(&config, &db, &file, options, wait).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_ingest_summary(&summary);
            }
        }

        Commands::Facts {
            document_id,
            knowledge_base,
            wait,
        } => {
            let summary = cmd_facts(&config, &db, &document_id, knowledge_base, wait).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_facts_summary(&summary);
            }
        }

        Commands::Status { document_id, watch } => {
            let report = if watch {
                wait_for_terminal(&config, &db, &document_id).await?
            } else {
                cmd_status(&config, &db, &document_id).await?
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status_report(&report);
            }
        }

        Commands::Documents {
            workspace,
            ids_only,
            completion,
        } => {
            let documents = cmd_list_documents(&db, &workspace).await?;

            if let Some(shell) = completion {
                print_document_completions(&documents, shell);
            } else if ids_only {
                for doc in &documents {
                    println!("{}", doc.id);
                }
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                print_documents(&documents);
            }
        }

        Commands::Remove { document_id } => {
            cmd_remove_document(&db, &document_id).await?;
            if cli.json {
                println!(r#"{{"status": "ok", "removed": "{}"}}"#, document_id);
            } else {
                println!("✓ Document '{}' removed", document_id);
            }
        }
    }

    Ok(())
}

fn print_completion_extras(shell: Shell) {
    match shell {
        Shell::Zsh => {
            println!();
            println!("{}", r#"# Dynamic completion for 'factmill remove' document IDs"#);
            println!("{}", r#"_factmill_document_ids() {"#);
            println!("{}", r#"    local -a entries"#);
            println!(
                "{}",
                r#"    entries=("${(@f)$(factmill documents --completion zsh 2>/dev/null)}")"#
            );
            println!("{}", r#"    _describe -t documents 'document ids' entries"#);
            println!("{}", r#"}"#);
            println!("{}", r#"compdef _factmill_document_ids 'factmill remove'"#);
        }
        Shell::Fish => {
            println!();
            println!("{}", r#"# Dynamic completion for 'factmill remove' document IDs"#);
            println!(
                "{}",
                r#"complete -c factmill -n '__fish_seen_subcommand_from remove' -a '(factmill documents --completion fish 2>/dev/null)'"#
            );
        }
        _ => {}
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'factmill init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
