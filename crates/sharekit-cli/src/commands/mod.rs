//! CLI subcommands
//!
//! Every command receives a [`Session`] carrying the global flags; commands
//! that talk to SharePoint open a [`Context`] through [`Session::connect`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use sharekit_core::config::Config;
use sharekit_core::domain::ObjectId;
use sharekit_core::Context;
use sharekit_rest::RestTransport;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

pub mod apps;
pub mod config;
pub mod lists;

/// Global options shared by every subcommand
#[derive(Debug, Clone)]
pub struct Session {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

impl Session {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// Path of the configuration file in use
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the configuration; an explicit `--config` file must exist
    pub fn load_config(&self) -> Result<Config> {
        match &self.config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Ok(Config::load_or_default(&Config::default_path())),
        }
    }

    /// Opens a context against the configured site
    pub fn connect(&self) -> Result<Context> {
        let config = self.load_config()?;
        let errors = config.validate();
        if let Some(first) = errors.first() {
            anyhow::bail!("Invalid configuration: {first}");
        }
        let transport = RestTransport::from_config(&config)
            .context("Failed to set up the SharePoint transport")?;
        debug!(site = %config.site.url, "Connected");
        Ok(Context::new(Arc::new(transport)))
    }
}

/// JSON view of a materialized object's loaded properties
pub fn object_json(ctx: &Context, id: ObjectId) -> Result<serde_json::Value> {
    let object = ctx.object(id)?;
    Ok(object.properties()?.to_json())
}

/// One-line summary of an object for human output
pub fn describe(ctx: &Context, id: ObjectId, fields: &[&str]) -> Result<String> {
    let bag = ctx.object(id)?.properties()?;
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|field| {
            bag.get(field)
                .and_then(|v| v.to_key_string())
                .map(|v| format!("{field}={v}"))
        })
        .collect();
    Ok(parts.join("  "))
}
