mod list;
mod process;
mod watch;

use clap::{Parser, Subcommand};
use nutpipe_core::config::{ContextConfig, ObjectRegistry};
use nutpipe_core::context::{Context, ContextBuilder};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "nutpipe",
    version,
    about = "Resolves, transforms and bundles front-end assets",
    long_about = "Nutpipe resolves heaps of scripts, stylesheets, images and pages from disk, \
                  archives or HTTP, then runs them through ordered engine chains (inspection, \
                  aggregation, compression, caching) described in a JSON configuration."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow once
    #[command(
        long_about = "Resolves the workflow's heap, executes its engine chain and prints the \
                            produced nuts. With --out, every produced nut and the nuts it \
                            references are written below the given directory."
    )]
    Process {
        /// JSON configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Workflow id
        #[arg(long)]
        workflow: String,
        /// Directory receiving the produced nuts
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// List the workflows of a configuration
    List {
        /// JSON configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Re-run a workflow whenever one of its resources changes
    #[command(
        long_about = "Runs the workflow, then polls every provider of its heap at the given \
                            interval. A detected change triggers a new run. Stops on Ctrl+C."
    )]
    Watch {
        /// JSON configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Workflow id
        #[arg(long)]
        workflow: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: i64,
        /// Directory receiving the produced nuts
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = nutpipe_core::logging::init_logging("cli", true);

    match cli.command {
        Commands::Process {
            config,
            workflow,
            out,
        } => process::run(&config, &workflow, out.as_deref()),
        Commands::List { config } => list::run(&config),
        Commands::Watch {
            config,
            workflow,
            interval,
            out,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch::run(config, workflow, interval, out))
        }
    }
}

pub(crate) fn load_context(config: &Path) -> nutpipe_core::Result<Context> {
    let config = ContextConfig::from_path(config)?;
    ContextBuilder::from_config(&config, &ObjectRegistry::with_builtins())?.build()
}
