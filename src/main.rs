use tvu_chat::config::ConfigStore;
use tvu_chat::logging::init_logging;
use tvu_chat::{check, config_get, config_list, config_set, prompt, render, resolve, sandbox_run, segments, tags, ResolveOptions};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tvu-chat", version, about = "Parse, render and run assistant action blocks")]
struct Cli {
    /// Use this config file instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log dispatch details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the segments found in assistant text
    Scan {
        /// Input file, or - for stdin
        input: PathBuf,
    },
    /// Print display markup for assistant text
    Render {
        /// Input file, or - for stdin
        input: PathBuf,
    },
    /// Report action blocks that would be rejected
    Check {
        /// Input file, or - for stdin
        input: PathBuf,
    },
    /// Run action blocks and print the text with results spliced in
    Resolve {
        /// Input file, or - for stdin
        input: PathBuf,
        /// Directory to use as the file workspace
        #[arg(long, conflicts_with = "sandbox")]
        workspace: Option<PathBuf>,
        /// Run file blocks in a hosted sandbox
        #[arg(long)]
        sandbox: bool,
        /// Dispatch each block as soon as it closes while reading input
        #[arg(long)]
        follow: bool,
    },
    /// Print the registered tags
    Tags,
    /// Print the protocol guide for the assistant system prompt
    Prompt,
    /// Run a source file in a hosted sandbox
    Run {
        file: PathBuf,
        #[arg(long, default_value = "python")]
        language: String,
    },
    /// Read or write stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one setting
    Get { key: String },
    /// Store one setting
    Set { key: String, value: String },
    /// Print every setting, secrets masked
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let load_store = || match &cli.config {
        Some(path) => ConfigStore::load(path),
        None => ConfigStore::load_default(),
    };

    match cli.command {
        Commands::Scan { input } => segments(&input),
        Commands::Render { input } => render(&input),
        Commands::Check { input } => check(&input),
        Commands::Resolve { input, workspace, sandbox, follow } => {
            let store = load_store()?;
            let opts = ResolveOptions { workspace, sandbox, follow };
            resolve(&input, &store, &opts).await
        }
        Commands::Tags => tags(),
        Commands::Prompt => prompt(),
        Commands::Run { file, language } => sandbox_run(&load_store()?, &file, &language).await,
        Commands::Config { action } => {
            let mut store = load_store()?;
            match action {
                ConfigAction::Get { key } => config_get(&store, &key),
                ConfigAction::Set { key, value } => config_set(&mut store, &key, &value),
                ConfigAction::List => config_list(&store),
            }
        }
    }
}
