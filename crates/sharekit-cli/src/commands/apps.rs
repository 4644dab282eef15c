//! `sharekit apps` - site collection app catalog

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use sharekit_core::model::InstallOutcome;
use sharekit_core::Context;
use tracing::info;
use uuid::Uuid;

use super::{describe, object_json, Session};

const APP_FIELDS: &[&str] = &["Title", "Id", "AppCatalogVersion", "InstalledVersion"];

#[derive(Debug, Subcommand)]
pub enum AppsCommand {
    /// Upload an .sppkg package to the catalog
    Add {
        path: PathBuf,
        /// Replace an existing package with the same name
        #[arg(long)]
        overwrite: bool,
    },
    /// List the apps available in the catalog
    List,
    /// Show one app by id or title
    Get(AppSelector),
    /// Deploy (trust) an app
    Deploy {
        id: Uuid,
        /// Make the app available to all sites without per-site install
        #[arg(long)]
        skip_feature_deployment: bool,
    },
    /// Install an app on the site
    Install { id: Uuid },
    /// Upgrade an installed app to the catalog version
    Upgrade { id: Uuid },
    /// Uninstall an app from the site
    Uninstall { id: Uuid },
    /// Retract a deployed app
    Retract { id: Uuid },
    /// Remove an app from the catalog
    Remove { id: Uuid },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct AppSelector {
    /// App id
    #[arg(long)]
    id: Option<Uuid>,
    /// App title
    #[arg(long)]
    title: Option<String>,
}

impl AppsCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let mut ctx = session.connect()?;
        match self {
            AppsCommand::Add { path, overwrite } => add(&mut ctx, session, path, *overwrite).await,
            AppsCommand::List => list(&mut ctx, session).await,
            AppsCommand::Get(selector) => get(&mut ctx, session, selector).await,
            AppsCommand::Deploy {
                id,
                skip_feature_deployment,
            } => {
                ctx.site_collection_app_manager()
                    .deploy_by_id(*id, *skip_feature_deployment)
                    .await?;
                report(session, "deployed", *id);
                Ok(())
            }
            AppsCommand::Install { id } => {
                let outcome = ctx.site_collection_app_manager().install_by_id(*id).await?;
                match outcome {
                    InstallOutcome::Installed => report(session, "installed", *id),
                    InstallOutcome::AlreadyInstalled => report(session, "already installed", *id),
                }
                Ok(())
            }
            AppsCommand::Upgrade { id } => {
                ctx.site_collection_app_manager().upgrade_by_id(*id).await?;
                report(session, "upgraded", *id);
                Ok(())
            }
            AppsCommand::Uninstall { id } => {
                ctx.site_collection_app_manager().uninstall_by_id(*id).await?;
                report(session, "uninstalled", *id);
                Ok(())
            }
            AppsCommand::Retract { id } => {
                ctx.site_collection_app_manager().retract_by_id(*id).await?;
                report(session, "retracted", *id);
                Ok(())
            }
            AppsCommand::Remove { id } => {
                ctx.site_collection_app_manager().remove_by_id(*id).await?;
                report(session, "removed", *id);
                Ok(())
            }
        }
    }
}

fn report(session: &Session, action: &str, id: Uuid) {
    info!(%id, action, "App lifecycle action completed");
    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&serde_json::json!({ "id": id.to_string(), "result": action }));
    } else {
        formatter.success(&format!("App {id} {action}"));
    }
}

async fn add(ctx: &mut Context, session: &Session, path: &Path, overwrite: bool) -> Result<()> {
    let app = ctx
        .site_collection_app_manager()
        .add_from_path(path, overwrite)
        .await
        .with_context(|| format!("Failed to add {}", path.display()))?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&object_json(ctx, app)?);
    } else {
        formatter.success(&format!("Added {}", path.display()));
        formatter.info(&describe(ctx, app, APP_FIELDS)?);
    }
    Ok(())
}

async fn list(ctx: &mut Context, session: &Session) -> Result<()> {
    let apps = ctx.site_collection_app_manager().get_available_apps().await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        let values = apps
            .iter()
            .map(|id| object_json(ctx, *id))
            .collect::<Result<Vec<_>>>()?;
        formatter.print_json(&serde_json::Value::Array(values));
    } else {
        formatter.success(&format!("{} apps in the catalog", apps.len()));
        for app in apps {
            formatter.info(&describe(ctx, app, APP_FIELDS)?);
        }
    }
    Ok(())
}

async fn get(ctx: &mut Context, session: &Session, selector: &AppSelector) -> Result<()> {
    let mut manager = ctx.site_collection_app_manager();
    let found = match (&selector.id, &selector.title) {
        (Some(id), _) => manager.get_available_app_by_id(*id).await?,
        (None, Some(title)) => manager.get_available_app_by_title(title).await?,
        (None, None) => anyhow::bail!("either --id or --title is required"),
    };
    let app = found.context("No such app in the catalog")?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&object_json(ctx, app)?);
    } else {
        formatter.success(&describe(ctx, app, &["Title", "Id"])?);
        for (name, value) in ctx.object(app)?.properties()?.iter() {
            formatter.info(&format!("{name}: {}", value.to_json()));
        }
    }
    Ok(())
}
