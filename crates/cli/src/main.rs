//! cryslgen CLI, the main entry point.
//!
//! Commands:
//! - `explain`: Generate developer guides for one or more rules
//! - `example`: Generate a secure or insecure usage example from a payload
//! - `index`: Build or search the reference document index
//! - `deps`: Show dependency constraints, guarantees and the dependency graph
//! - `sections`: Split a `.crysl` file into its sections
//! - `init`: Write a default `cryslgen.toml`
//! - `doctor`: Check configuration and inputs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "cryslgen",
    about = "cryslgen: developer documentation and examples from CrySL rules",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./cryslgen.toml, then ~/.cryslgen/config.toml)
    #[arg(short, long, global = true, env = "CRYSLGEN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain CrySL rules by fully qualified class name
    Explain {
        #[arg(required = true)]
        classes: Vec<String>,

        #[arg(short, long, default_value = "English")]
        language: String,

        /// Regenerate even when a cached explanation exists
        #[arg(long)]
        fresh: bool,
    },

    /// Generate a usage example from a rule payload (JSON)
    Example {
        payload: PathBuf,

        /// Write a deliberately insecure counter-example
        #[arg(long)]
        insecure: bool,

        #[arg(short, long, default_value = "English")]
        language: String,
    },

    /// Reference document index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show what a rule depends on
    Deps {
        class: String,

        #[arg(long)]
        ensures_depth: Option<usize>,

        /// Print the sanitized dependency graph
        #[arg(long)]
        graph: bool,

        #[arg(short, long, default_value = "English")]
        language: String,
    },

    /// Split a CrySL file into sections
    Sections {
        file: PathBuf,

        /// Only accept headers at the start of a line
        #[arg(long)]
        strict: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write a default cryslgen.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose configuration and inputs
    Doctor,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index, or confirm the cached one is current
    Build,

    /// Search the index with free text
    Search {
        query: String,

        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so generated text on stdout stays clean.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Explain {
            classes,
            language,
            fresh,
        } => commands::explain::run(config_path, &classes, &language, fresh).await?,
        Commands::Example {
            payload,
            insecure,
            language,
        } => commands::example::run(config_path, &payload, insecure, &language).await?,
        Commands::Index { action } => match action {
            IndexAction::Build => commands::index::build(config_path).await?,
            IndexAction::Search { query, k } => commands::index::search(config_path, &query, k).await?,
        },
        Commands::Deps {
            class,
            ensures_depth,
            graph,
            language,
        } => commands::deps::run(config_path, &class, &language, ensures_depth, graph)?,
        Commands::Sections { file, strict, json } => commands::sections::run(&file, strict, json)?,
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
