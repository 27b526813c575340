//! Quill CLI - run notebook cells and manage stored notebooks.

mod colors;
mod exec;
mod notebooks;
mod output;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quill_core::KernelConfig;
use quill_sync::NotebookStore;

const NOTEBOOKS_DIR_ENV: &str = "QUILL_NOTEBOOKS_DIR";

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Notebook kernel with magics, shell escapes and .ipynb storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding stored notebooks
    #[arg(long, global = true)]
    notebooks_dir: Option<PathBuf>,

    /// Working directory for executed code
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single cell
    Exec {
        /// Cell source, or `-` to read it from stdin
        code: String,

        /// Print the result payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute every code cell of a stored notebook and save the outputs
    Run {
        /// Notebook id
        id: String,
    },

    /// List stored notebooks, most recently modified first
    List,

    /// Print a stored notebook
    Show {
        /// Notebook id
        id: String,
    },

    /// Delete a stored notebook
    Delete {
        /// Notebook id
        id: String,
    },

    /// Create an empty notebook
    New {
        /// Notebook id
        id: String,

        /// Notebook title
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = KernelConfig::from_env();
    if let Some(cwd) = &cli.cwd {
        config = config.with_working_directory(cwd);
    }

    let code = match cli.command {
        Commands::Exec { code, json } => exec::execute(config, &code, json)?,
        Commands::Run { id } => run::execute(&open_store(cli.notebooks_dir)?, config, &id).await?,
        Commands::List => notebooks::list(&open_store(cli.notebooks_dir)?)?,
        Commands::Show { id } => notebooks::show(&open_store(cli.notebooks_dir)?, &id)?,
        Commands::Delete { id } => notebooks::delete(&open_store(cli.notebooks_dir)?, &id)?,
        Commands::New { id, title } => {
            notebooks::create(&open_store(cli.notebooks_dir)?, &id, title.as_deref())?
        }
    };

    Ok(code)
}

/// Open the notebook store: `--notebooks-dir`, then `QUILL_NOTEBOOKS_DIR`,
/// then the platform data directory.
fn open_store(flag: Option<PathBuf>) -> anyhow::Result<NotebookStore> {
    let dir = match flag.or_else(|| std::env::var_os(NOTEBOOKS_DIR_ENV).map(PathBuf::from)) {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("No data directory; pass --notebooks-dir"))?
            .join("quill")
            .join("notebooks"),
    };
    tracing::debug!("Notebook store at {}", dir.display());
    Ok(NotebookStore::new(dir)?)
}
