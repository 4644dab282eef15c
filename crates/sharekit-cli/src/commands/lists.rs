//! `sharekit lists` - list and list item operations

use anyhow::{Context as _, Result};
use clap::Subcommand;
use sharekit_core::domain::{ObjectId, PropertyBag, PropertySelector};
use sharekit_core::model::{CamlQueryOptions, ListTemplateType};
use sharekit_core::Context;
use tracing::info;

use super::{describe, object_json, Session};

const LIST_FIELDS: &[&str] = &["Id", "Title", "ItemCount", "BaseTemplate", "Created"];

#[derive(Debug, Subcommand)]
pub enum ListsCommand {
    /// Show every list of the site
    Ls,
    /// Show one list
    Get {
        /// List title
        title: String,
        /// Properties to load (e.g. "Title,RootFolder.ServerRelativeUrl")
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// Create a list
    Add {
        title: String,
        /// Base template: generic, library, tasks, ... or a numeric id
        #[arg(long, default_value = "generic")]
        template: String,
    },
    /// Delete a list permanently
    Delete { title: String },
    /// Move a list to the recycle bin
    Recycle { title: String },
    /// Query list items
    Items {
        title: String,
        /// Maximum number of items
        #[arg(long)]
        limit: Option<u32>,
        /// Full CAML view XML, overrides --limit
        #[arg(long)]
        view_xml: Option<String>,
    },
    /// Add an item with FIELD=VALUE pairs
    AddItem {
        title: String,
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

impl ListsCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let mut ctx = session.connect()?;
        match self {
            ListsCommand::Ls => ls(&mut ctx, session).await,
            ListsCommand::Get { title, select } => get(&mut ctx, session, title, select).await,
            ListsCommand::Add { title, template } => add(&mut ctx, session, title, template).await,
            ListsCommand::Delete { title } => delete(&mut ctx, session, title).await,
            ListsCommand::Recycle { title } => recycle(&mut ctx, session, title).await,
            ListsCommand::Items {
                title,
                limit,
                view_xml,
            } => items(&mut ctx, session, title, *limit, view_xml.as_deref()).await,
            ListsCommand::AddItem { title, fields } => add_item(&mut ctx, session, title, fields).await,
        }
    }
}

/// Parses `FIELD=VALUE`
fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{raw}'")),
    }
}

/// CAML view returning at most `limit` rows
fn view_xml(limit: Option<u32>) -> String {
    match limit {
        Some(n) => format!("<View><RowLimit>{n}</RowLimit></View>"),
        None => "<View/>".to_string(),
    }
}

async fn require_list(ctx: &mut Context, title: &str) -> Result<ObjectId> {
    ctx.get_list_by_title(title, PropertySelector::new())
        .await?
        .with_context(|| format!("List '{title}' does not exist"))
}

async fn ls(ctx: &mut Context, session: &Session) -> Result<()> {
    let selector = PropertySelector::parse(["Lists.Id", "Lists.Title", "Lists.ItemCount"])?;
    ctx.load_web(selector).await?;
    let lists = ctx.lists()?;
    info!(count = lists.len(), "Loaded lists");

    let formatter = session.formatter();
    if session.format.is_json() {
        let values = lists
            .iter()
            .map(|id| object_json(ctx, *id))
            .collect::<Result<Vec<_>>>()?;
        formatter.print_json(&serde_json::Value::Array(values));
    } else {
        formatter.success(&format!("{} lists", lists.len()));
        for id in lists {
            formatter.info(&describe(ctx, id, &["Title", "ItemCount", "Id"])?);
        }
    }
    Ok(())
}

async fn get(ctx: &mut Context, session: &Session, title: &str, select: &[String]) -> Result<()> {
    let selector = PropertySelector::parse(select.iter().map(String::as_str))?;
    let list = ctx
        .get_list_by_title(title, selector)
        .await?
        .with_context(|| format!("List '{title}' does not exist"))?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&object_json(ctx, list)?);
    } else {
        formatter.success(title);
        for (name, value) in ctx.object(list)?.properties()?.iter() {
            formatter.info(&format!("{name}: {}", value.to_json()));
        }
    }
    Ok(())
}

async fn add(ctx: &mut Context, session: &Session, title: &str, template: &str) -> Result<()> {
    let template: ListTemplateType = template.parse()?;
    let list = ctx.add_list(title, template).await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&object_json(ctx, list)?);
    } else {
        formatter.success(&format!("Created list '{title}'"));
        formatter.info(&describe(ctx, list, LIST_FIELDS)?);
    }
    Ok(())
}

async fn delete(ctx: &mut Context, session: &Session, title: &str) -> Result<()> {
    let list = require_list(ctx, title).await?;
    ctx.delete_list(list).await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&serde_json::json!({ "deleted": title }));
    } else {
        formatter.success(&format!("Deleted list '{title}'"));
    }
    Ok(())
}

async fn recycle(ctx: &mut Context, session: &Session, title: &str) -> Result<()> {
    let list = require_list(ctx, title).await?;
    let recycle_item = ctx.recycle_list(list).await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "recycled": title,
            "recycle_bin_item_id": recycle_item.to_string(),
        }));
    } else {
        formatter.success(&format!("Moved list '{title}' to the recycle bin"));
        formatter.info(&format!("Recycle bin item: {recycle_item}"));
    }
    Ok(())
}

async fn items(
    ctx: &mut Context,
    session: &Session,
    title: &str,
    limit: Option<u32>,
    view: Option<&str>,
) -> Result<()> {
    let list = require_list(ctx, title).await?;
    let query = CamlQueryOptions::from(view.map_or_else(|| view_xml(limit), str::to_string));
    let found = ctx.get_items_by_caml_query(list, query).await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        let values = found
            .iter()
            .map(|id| object_json(ctx, *id))
            .collect::<Result<Vec<_>>>()?;
        formatter.print_json(&serde_json::Value::Array(values));
    } else {
        formatter.success(&format!("{} items in '{title}'", found.len()));
        for id in found {
            formatter.info(&describe(ctx, id, &["ID", "Title"])?);
        }
    }
    Ok(())
}

async fn add_item(
    ctx: &mut Context,
    session: &Session,
    title: &str,
    fields: &[(String, String)],
) -> Result<()> {
    let list = require_list(ctx, title).await?;
    let values = fields
        .iter()
        .fold(PropertyBag::new(), |bag, (field, value)| bag.with(field.as_str(), value.as_str()));
    let item = ctx.add_list_item(list, values).await?;

    let formatter = session.formatter();
    if session.format.is_json() {
        formatter.print_json(&object_json(ctx, item)?);
    } else {
        formatter.success(&format!("Added item to '{title}'"));
        formatter.info(&describe(ctx, item, &["ID", "Title"])?);
    }
    Ok(())
}
