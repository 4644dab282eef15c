//! `sharekit config` - view and manage the configuration file
//!
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Writes a starter file
//! 3. Sets individual values via dot-notation keys
//! 4. Validates the file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use sharekit_core::config::{Config, ConfigBuilder};
use tracing::info;

use super::Session;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the current configuration
    Show,
    /// Write a configuration file for a site
    Init {
        /// Absolute site URL, e.g. https://contoso.sharepoint.com/sites/dev
        site_url: String,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key (e.g. "transport.max_batch_size")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(session),
            ConfigCommand::Init { site_url, force } => execute_init(session, site_url, *force),
            ConfigCommand::Set { key, value } => execute_set(session, key, value),
            ConfigCommand::Validate => execute_validate(session),
        }
    }
}

fn execute_show(session: &Session) -> Result<()> {
    let formatter = session.formatter();
    let config_path = session.config_path();
    let mut config = session.load_config()?;
    if config.auth.access_token.is_some() {
        config.auth.access_token = Some("<redacted>".to_string());
    }
    info!(config_path = %config_path.display(), "Showing configuration");

    if session.format.is_json() {
        let json = serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_init(session: &Session, site_url: &str, force: bool) -> Result<()> {
    let formatter = session.formatter();
    let config_path = session.config_path();
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to replace it",
            config_path.display()
        );
    }

    let config = ConfigBuilder::new()
        .site_url(site_url)
        .build_validated()
        .map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::anyhow!("Invalid configuration: {}", messages.join("; "))
        })?;
    config.save(&config_path)?;
    info!(config_path = %config_path.display(), "Wrote configuration");

    if session.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Wrote {}", config_path.display()));
        formatter.info(&format!(
            "Export the access token in ${} or set auth.access_token",
            config.auth.token_env
        ));
    }
    Ok(())
}

fn execute_set(session: &Session, key: &str, value: &str) -> Result<()> {
    let formatter = session.formatter();
    let config_path = session.config_path();
    let mut config = Config::load_or_default(&config_path);
    info!(key, "Setting configuration value");

    apply_config_value(&mut config, key, value)?;
    let errors: Vec<String> = config
        .validate()
        .iter()
        .filter(|e| e.field == key)
        .map(ToString::to_string)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("Invalid value for '{key}': {}", errors.join("; "));
    }
    config.save(&config_path)?;

    if session.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key}"));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }
    Ok(())
}

fn execute_validate(session: &Session) -> Result<()> {
    let formatter = session.formatter();
    let config_path = session.config_path();
    let config = Config::load(&config_path)?;
    let errors = config.validate();
    info!(config_path = %config_path.display(), errors = errors.len(), "Validated configuration");

    if session.format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

/// Applies a dot-notation key/value pair to `config`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "site.url" => config.site.url = value.to_string(),

        "auth.access_token" => {
            config.auth.access_token = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "auth.token_env" => config.auth.token_env = value.to_string(),

        "transport.use_batch_endpoint" => {
            config.transport.use_batch_endpoint =
                value.parse::<bool>().context("Expected true or false")?;
        }
        "transport.max_batch_size" => {
            config.transport.max_batch_size =
                value.parse::<usize>().context("Expected a positive integer")?;
        }
        "transport.timeout_secs" => {
            config.transport.timeout_secs =
                value.parse::<u64>().context("Expected a positive integer")?;
        }
        "transport.user_agent" => config.transport.user_agent = value.to_string(),

        "rate_limiting.capacity" => {
            config.rate_limiting.capacity =
                value.parse::<u32>().context("Expected a positive integer")?;
        }
        "rate_limiting.refill_per_second" => {
            config.rate_limiting.refill_per_second =
                value.parse::<f64>().context("Expected a number")?;
        }
        "rate_limiting.max_retries" => {
            config.rate_limiting.max_retries =
                value.parse::<u32>().context("Expected a non-negative integer")?;
        }
        "rate_limiting.default_retry_after_secs" => {
            config.rate_limiting.default_retry_after_secs =
                value.parse::<u64>().context("Expected a positive integer")?;
        }

        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{key}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::output::OutputFormat;

    fn session(path: PathBuf) -> Session {
        Session {
            format: OutputFormat::Json,
            quiet: true,
            config_path: Some(path),
        }
    }

    #[test]
    fn test_apply_site_url() {
        let mut config = Config::default();
        apply_config_value(&mut config, "site.url", "https://contoso.sharepoint.com").unwrap();
        assert_eq!(config.site.url, "https://contoso.sharepoint.com");
    }

    #[test]
    fn test_apply_transport_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "transport.use_batch_endpoint", "false").unwrap();
        apply_config_value(&mut config, "transport.max_batch_size", "20").unwrap();
        assert!(!config.transport.use_batch_endpoint);
        assert_eq!(config.transport.max_batch_size, 20);
    }

    #[test]
    fn test_apply_access_token_none_clears() {
        let mut config = Config::default();
        config.auth.access_token = Some("existing".to_string());
        apply_config_value(&mut config, "auth.access_token", "none").unwrap();
        assert_eq!(config.auth.access_token, None);
    }

    #[test]
    fn test_apply_rate_limiting_refill() {
        let mut config = Config::default();
        apply_config_value(&mut config, "rate_limiting.refill_per_second", "2.5").unwrap();
        assert_eq!(config.rate_limiting.refill_per_second, 2.5);
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.root", "/tmp").is_err());
    }

    #[test]
    fn test_apply_invalid_number_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "transport.timeout_secs", "-5").is_err());
        assert!(apply_config_value(&mut config, "transport.use_batch_endpoint", "maybe").is_err());
    }

    #[test]
    fn test_init_then_set_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharekit").join("config.yaml");
        let session = session(path.clone());

        execute_init(&session, "https://contoso.sharepoint.com/sites/dev", false).unwrap();
        assert!(path.exists());
        assert!(execute_init(&session, "https://contoso.sharepoint.com/sites/dev", false).is_err());

        execute_set(&session, "transport.max_batch_size", "25").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.site.url, "https://contoso.sharepoint.com/sites/dev");
        assert_eq!(config.transport.max_batch_size, 25);

        execute_validate(&session).unwrap();
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let session = session(path.clone());
        execute_init(&session, "https://contoso.sharepoint.com", false).unwrap();

        let err = execute_set(&session, "transport.max_batch_size", "0").unwrap_err();

        assert!(err.to_string().contains("transport.max_batch_size"));
        assert_eq!(Config::load(&path).unwrap().transport.max_batch_size, 100);
    }
}
