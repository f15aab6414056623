//! Conversation commands

use colored::Colorize;
use prettytable::{format, row, Table};

use super::{print_notices, CommandContext};
use crate::app_session::AppState;
use crate::cli::ConversationCommand;
use crate::error::{DifyChatError, Result};
use crate::models::{ConversationId, ConversationSummary};
use crate::workspace::Workspace;

/// Handle conversation commands
pub async fn handle_conversations(ctx: &CommandContext, command: ConversationCommand) -> Result<()> {
    let (workspace, mut notices) = ctx.workspace()?;

    let result = match command {
        ConversationCommand::List { app } => list(&workspace, app.as_deref()).await,
        ConversationCommand::Rename { app, id, name } => {
            rename(&workspace, &app, &id, &name).await
        }
        ConversationCommand::Delete { app, id } => delete(&workspace, &app, &id).await,
    };
    print_notices(&mut notices);
    result
}

/// Open `app_id` and fail unless it became ready
async fn open_ready(workspace: &Workspace, app_id: Option<&str>) -> Result<()> {
    match workspace.open_app(app_id, false).await? {
        AppState::Ready(_) => Ok(()),
        AppState::Failed { app_id, error } => Err(DifyChatError::Network(format!(
            "App {} could not be loaded: {}",
            app_id, error
        ))
        .into()),
        _ => Err(DifyChatError::Validation("No available apps".into()).into()),
    }
}

async fn list(workspace: &Workspace, app_id: Option<&str>) -> Result<()> {
    open_ready(workspace, app_id).await?;
    let app = workspace.require_app()?;
    let store = workspace.conversations();
    let active = store.active_id();

    let persisted: Vec<ConversationSummary> = store
        .conversations()
        .into_iter()
        .filter(|c| !c.is_temporary())
        .collect();

    println!("\nConversations of {}:\n", app.config.display_name().cyan());
    if persisted.is_empty() {
        println!("{}", "No conversations yet.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "".bold(),
        "ID".bold(),
        "Name".bold(),
        "Last Updated".bold()
    ]);
    for conversation in persisted {
        let marker = if active.as_ref() == Some(&conversation.id) {
            "*"
        } else {
            ""
        };
        let updated = chrono::DateTime::from_timestamp(conversation.updated_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![
            marker,
            conversation.id.to_string().cyan(),
            conversation.name,
            updated
        ]);
    }
    table.printstd();
    println!();
    Ok(())
}

async fn rename(workspace: &Workspace, app_id: &str, id: &str, name: &str) -> Result<()> {
    open_ready(workspace, Some(app_id)).await?;
    let id: ConversationId = id.parse()?;
    workspace.conversations().rename(&id, name).await
}

async fn delete(workspace: &Workspace, app_id: &str, id: &str) -> Result<()> {
    open_ready(workspace, Some(app_id)).await?;
    let id: ConversationId = id.parse()?;
    workspace.conversations().delete(&id).await?;
    println!("{}", format!("Deleted conversation {}", id).green());
    Ok(())
}
