//! nbwidget CLI - render and check notebook widget state.

#![allow(clippy::needless_pass_by_value, clippy::doc_markdown)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nbwidget::{
    check_notebook, create_widget_manager_with_config, describe, Document, ManagerConfig,
    ModelState, NotebookStateProvider,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nbwidget")]
#[command(about = "Render notebook widgets from saved widget state")]
#[command(version)]
struct Cli {
    /// Log manager activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one model and print the resulting HTML
    Render {
        /// Notebook widget-state JSON file
        state: PathBuf,

        /// Model id to render
        model_id: String,

        /// Manager configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the models in a widget-state file
    List {
        /// Notebook widget-state JSON file
        state: PathBuf,
    },

    /// Build every model and report the ones that fail
    Check {
        /// Notebook widget-state JSON file
        state: PathBuf,

        /// Manager configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_state(path: &Path) -> Result<NotebookStateProvider> {
    NotebookStateProvider::from_path(path)
        .with_context(|| format!("failed to load widget state from {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    match path {
        Some(path) => ManagerConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ManagerConfig::default()),
    }
}

async fn render(state: &Path, model_id: &str, config: Option<&Path>) -> Result<()> {
    let provider = load_state(state)?;
    let manager = create_widget_manager_with_config(provider, load_config(config)?);

    let document = Document::new();
    let container = document.create_element("div");
    container.set_attribute("id", "widget-container");
    document.body().append_child(&container)?;

    let view = manager.render(model_id, &container).await?;
    tracing::info!(model_id, view = %view.id(), "rendered");
    println!("{}", container.to_html());
    Ok(())
}

fn list(state: &Path) -> Result<()> {
    let provider = load_state(state)?;
    for id in provider.model_ids() {
        let Some(entry) = provider.get(&id) else {
            continue;
        };
        let described = describe(&ModelState::from(entry.clone()));
        let field = |name: &str| described[name].as_str().unwrap_or("-").to_string();
        println!(
            "{id}\t{}@{}\t{}\t{}",
            field("module"),
            field("version"),
            field("model"),
            field("view")
        );
    }
    Ok(())
}

async fn check(state: &Path, config: Option<&Path>) -> Result<()> {
    let provider = load_state(state)?;
    let ids = provider.model_ids();
    let manager = create_widget_manager_with_config(provider, load_config(config)?);

    let failures = check_notebook(&manager, &ids).await;
    for failure in &failures {
        eprintln!("✗ {failure}");
    }
    if !failures.is_empty() {
        bail!("{} of {} models failed", failures.len(), ids.len());
    }
    println!("✓ {} models OK", ids.len());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render {
            state,
            model_id,
            config,
        } => render(&state, &model_id, config.as_deref()).await,
        Commands::List { state } => list(&state),
        Commands::Check { state, config } => check(&state, config.as_deref()).await,
    }
}
