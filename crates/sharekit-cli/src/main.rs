//! sharekit CLI - SharePoint Online from the command line
//!
//! Provides commands for:
//! - Looking up, creating, recycling and deleting lists
//! - Querying and adding list items
//! - Managing the site collection app catalog
//! - Viewing and editing the configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{apps::AppsCommand, config::ConfigCommand, lists::ListsCommand, Session};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "sharekit", version, about = "SharePoint Online client")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List operations
    #[command(subcommand)]
    Lists(ListsCommand),
    /// Site collection app catalog
    #[command(subcommand)]
    Apps(AppsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    fn session(&self) -> Session {
        Session {
            format: if self.json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            },
            quiet: self.quiet,
            config_path: self.config.clone(),
        }
    }
}

/// Filter directive: `-v` flags win over the configured level
fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, session: &Session) {
    let logging = session.load_config().map(|c| c.logging).unwrap_or_default();
    let filter = log_filter(cli.verbose, &logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let session = cli.session();
    init_tracing(&cli, &session);

    match &cli.command {
        Commands::Lists(cmd) => cmd.execute(&session).await,
        Commands::Apps(cmd) => cmd.execute(&session).await,
        Commands::Config(cmd) => cmd.execute(&session).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let session = cli.session();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            session.formatter().error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
